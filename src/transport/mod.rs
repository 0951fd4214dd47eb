//! Transport layer abstraction for the Cats handshake.
//!
//! The core never creates peers or moves bytes itself. A [`Transport`]
//! stands up the peer (a popup, a child process, an in-process task) and
//! returns a [`HandshakeChannel`] to it.
//!
//! # Guarantees a transport must give
//!
//! - Every delivered [`Envelope`] carries the sender's origin, stamped by
//!   the transport, never by the sender's payload.
//! - When the peer disappears without sending `Close`, the receiving half
//!   eventually yields `None`.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────┐                      ┌────────────────┐
//! │   Requester    │                      │  ServiceHost   │
//! └───────┬────────┘                      └───────▲────────┘
//!         │ establish_peer(target)                │ ServiceEndpoint
//!         ▼                                       │
//! ┌─────────────────────────────────────────────────────────┐
//! │            Transport (MemoryTransport, ...)             │
//! └─────────────────────────────────────────────────────────┘
//! ```

mod memory;

pub use memory::{Launcher, MemoryTransport};

use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::Result;
use crate::protocol::{Envelope, HandshakeMessage};

/// Where the requester's peer lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerTarget {
    /// Locator handed to the transport (e.g. a URL)
    pub locator: String,
    /// Origin the peer's messages are expected from
    pub origin: String,
}

impl PeerTarget {
    /// Target whose origin is derived from the locator.
    pub fn new(locator: impl Into<String>) -> Self {
        let locator = locator.into();
        let origin = origin_of(&locator);
        Self { locator, origin }
    }

    /// Override the expected origin.
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = origin.into();
        self
    }
}

/// Origin (`scheme://host[:port]`) of a locator.
///
/// Locators without a scheme are their own origin.
pub fn origin_of(locator: &str) -> String {
    match locator.find("://") {
        Some(scheme_end) => {
            let rest = &locator[scheme_end + 3..];
            let authority_end = rest
                .find(['/', '?', '#'])
                .map_or(locator.len(), |i| scheme_end + 3 + i);
            locator[..authority_end].to_string()
        }
        None => locator.to_string(),
    }
}

/// Posting half of a handshake channel; stamps the local origin.
#[derive(Debug, Clone)]
pub struct HandshakeSender {
    origin: String,
    tx: mpsc::UnboundedSender<Envelope>,
}

impl HandshakeSender {
    /// Origin stamped on outgoing envelopes.
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Sender on the same channel stamping `origin`, as after the peer
    /// navigates to another origin.
    pub fn with_origin(&self, origin: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            tx: self.tx.clone(),
        }
    }

    /// Send a message to the peer. Returns `false` if the peer is gone.
    pub fn send(&self, message: HandshakeMessage) -> bool {
        let kind = message.kind();
        let delivered = self
            .tx
            .send(Envelope {
                origin: self.origin.clone(),
                message,
            })
            .is_ok();
        if !delivered {
            tracing::debug!(kind, "peer gone; handshake message dropped");
        }
        delivered
    }
}

/// One side's view of the handshake: send to the peer, receive from it.
#[derive(Debug)]
pub struct HandshakeChannel {
    /// Outgoing half
    pub sender: HandshakeSender,
    /// Incoming half; `None` once the peer is lost
    pub receiver: mpsc::UnboundedReceiver<Envelope>,
}

impl HandshakeChannel {
    /// Connected pair; each side's messages are stamped with its origin.
    pub fn pair(
        left_origin: impl Into<String>,
        right_origin: impl Into<String>,
    ) -> (HandshakeChannel, HandshakeChannel) {
        let (to_right, right_rx) = mpsc::unbounded_channel();
        let (to_left, left_rx) = mpsc::unbounded_channel();

        let left = HandshakeChannel {
            sender: HandshakeSender {
                origin: left_origin.into(),
                tx: to_right,
            },
            receiver: left_rx,
        };
        let right = HandshakeChannel {
            sender: HandshakeSender {
                origin: right_origin.into(),
                tx: to_left,
            },
            receiver: right_rx,
        };
        (left, right)
    }
}

/// The service side's handshake channel, as handed over by a transport.
pub type ServiceEndpoint = HandshakeChannel;

/// Transport trait for pluggable peer backends.
///
/// Implementations stand up the peer and hand back the requester's half of
/// the handshake channel; the service half goes to the peer.
pub trait Transport: Send + Sync {
    /// Stand up the peer described by `target`.
    ///
    /// Failures here are configuration-class: the peer could not be reached.
    fn establish_peer(
        &self,
        target: &PeerTarget,
    ) -> Pin<Box<dyn Future<Output = Result<HandshakeChannel>> + Send + '_>>;

    /// Get the transport name for logging.
    fn name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_origin_of() {
        assert_eq!(
            origin_of("https://svc.example:8443/launch?x=1"),
            "https://svc.example:8443"
        );
        assert_eq!(origin_of("https://svc.example"), "https://svc.example");
        assert_eq!(origin_of("https://svc.example#frag"), "https://svc.example");
        assert_eq!(origin_of("local-service"), "local-service");
    }

    #[test]
    fn test_peer_target_origin_override() {
        let target =
            PeerTarget::new("https://launcher.example/go").with_origin("https://svc.example");
        assert_eq!(target.locator, "https://launcher.example/go");
        assert_eq!(target.origin, "https://svc.example");
    }

    #[tokio::test]
    async fn test_pair_stamps_origins() {
        let (mut left, mut right) = HandshakeChannel::pair("https://left", "https://right");

        assert!(left.sender.send(HandshakeMessage::Close));
        let envelope = right.receiver.recv().await.unwrap();
        assert_eq!(envelope.origin, "https://left");

        assert!(right.sender.send(HandshakeMessage::GetCapabilities));
        let envelope = left.receiver.recv().await.unwrap();
        assert_eq!(envelope.origin, "https://right");
        assert_eq!(envelope.message.kind(), "get-capabilities");
    }

    #[tokio::test]
    async fn test_peer_loss_is_observed() {
        let (mut left, right) = HandshakeChannel::pair("a", "b");
        drop(right);
        assert!(left.receiver.recv().await.is_none());
        assert!(!left.sender.send(HandshakeMessage::Close));
    }
}
