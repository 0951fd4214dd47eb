//! Private duplex ports.
//!
//! A [`Port`] is one end of an in-process duplex channel. Two logically
//! independent pipes are bundled so each end can post to and receive from
//! the other. Ports are not `Clone`: handing one to a peer is a move, and
//! dropping one releases it, which the other end observes as `recv() == None`
//! once everything posted before the drop has been received.

use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

/// Messages carried on exchange and status ports.
#[derive(Debug)]
pub enum ExchangeMessage {
    /// Offering side's payload, with optional transferred ports.
    Offer {
        /// Offered data (un-normalized)
        data: Value,
        /// Nested ports transferred with the offer
        ports: Vec<Port>,
    },
    /// Accepting side's reply.
    Result {
        /// Reply data (un-normalized)
        data: Value,
    },
    /// Offering side confirms it received the result.
    Ack,
    /// Sent on the status port once a side's exchange has resolved.
    Done,
}

impl ExchangeMessage {
    /// Wire kind name, used in logs and errors.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Offer { .. } => "offer",
            Self::Result { .. } => "result",
            Self::Ack => "ack",
            Self::Done => "done",
        }
    }
}

/// Cloneable posting half of a [`Port`].
#[derive(Debug, Clone)]
pub struct PortSender {
    tx: mpsc::UnboundedSender<ExchangeMessage>,
}

impl PortSender {
    /// Post a message to the other end.
    ///
    /// Returns `false` when the other end is gone; like any datagram to a
    /// closed port, the message is silently dropped.
    pub fn post(&self, message: ExchangeMessage) -> bool {
        let kind = message.kind();
        let delivered = self.tx.send(message).is_ok();
        if !delivered {
            tracing::debug!(kind, "dropping message posted to a closed port");
        }
        delivered
    }

    /// Whether the other end has been dropped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// One end of a private duplex channel.
#[derive(Debug)]
pub struct Port {
    sender: PortSender,
    receiver: mpsc::UnboundedReceiver<ExchangeMessage>,
    // Dropped with this port; the other end's `peer_gone` then resolves.
    _alive: oneshot::Sender<()>,
    peer_gone: oneshot::Receiver<()>,
    peer_dropped: bool,
}

impl Port {
    /// Create a connected pair of ports.
    pub fn pair() -> (Port, Port) {
        let (left_tx, left_rx) = mpsc::unbounded_channel();
        let (right_tx, right_rx) = mpsc::unbounded_channel();
        let (left_alive, left_gone) = oneshot::channel();
        let (right_alive, right_gone) = oneshot::channel();

        let left = Port {
            sender: PortSender { tx: right_tx },
            receiver: left_rx,
            _alive: left_alive,
            peer_gone: right_gone,
            peer_dropped: false,
        };
        let right = Port {
            sender: PortSender { tx: left_tx },
            receiver: right_rx,
            _alive: right_alive,
            peer_gone: left_gone,
            peer_dropped: false,
        };
        (left, right)
    }

    /// Post a message to the other end.
    pub fn post(&self, message: ExchangeMessage) -> bool {
        self.sender.post(message)
    }

    /// Cloneable handle for posting from another task or callback.
    ///
    /// A handle does not keep this port alive: once the port is dropped the
    /// other end observes the disconnect, and posts through the handle are
    /// still delivered only if they were queued before that.
    pub fn sender(&self) -> PortSender {
        self.sender.clone()
    }

    /// Receive the next message; `None` once the other end is gone and
    /// nothing it posted is left.
    pub async fn recv(&mut self) -> Option<ExchangeMessage> {
        if !self.peer_dropped {
            tokio::select! {
                biased;
                message = self.receiver.recv() => return message,
                _ = &mut self.peer_gone => {}
            }
            self.peer_dropped = true;
        }
        self.receiver.try_recv().ok()
    }

    /// Receive a message if one is already queued.
    pub fn try_recv(&mut self) -> Option<ExchangeMessage> {
        self.receiver.try_recv().ok()
    }
}
