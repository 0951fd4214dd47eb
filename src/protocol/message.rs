//! Handshake messages.
//!
//! Defines what crosses the transport while the two parties negotiate, and
//! the connect selection that hands the requester its private ports.

use serde_json::Value;
use tokio::sync::mpsc;

use super::intent::{Cat, PeerIntent};
use crate::error::{CatsError, Result};
use crate::exchange::Port;

/// Handshake message kinds.
#[derive(Debug)]
pub enum HandshakeMessage {
    /// Service asks for the requester's capability list.
    GetCapabilities,
    /// Requester's `(side, form, having)` entries, plus the one-shot reply
    /// token the service answers through.
    CapabilitiesList {
        /// Raw entries; the receiver validates each one
        entries: Vec<Value>,
        /// Where the connect selection goes
        reply: ConnectReply,
    },
    /// The trusted peer origin moves to a new value.
    OriginChanged(String),
    /// Either side is done with the handshake.
    Close,
}

impl HandshakeMessage {
    /// Wire kind name.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::GetCapabilities => "get-capabilities",
            Self::CapabilitiesList { .. } => "capabilities-list",
            Self::OriginChanged(_) => "origin-changed",
            Self::Close => "close",
        }
    }
}

/// A handshake message together with its sender's origin, as stamped by the
/// transport.
#[derive(Debug)]
pub struct Envelope {
    /// Sender origin
    pub origin: String,
    /// Payload
    pub message: HandshakeMessage,
}

/// The service's selection, carrying the exchange and status ports.
///
/// Fields stay raw until the requester validates them.
#[derive(Debug)]
pub struct ConnectMessage {
    /// Selected side (the sender's own side)
    pub side: Value,
    /// Selected form
    pub form: Value,
    /// Selected metadata
    pub having: Value,
    /// Exactly two ports: exchange, then status
    pub ports: Vec<Port>,
}

impl ConnectMessage {
    /// Build a connect selection for `cat`.
    pub fn new(cat: &Cat, exchange: Port, status: Port) -> Self {
        Self {
            side: Value::String(cat.side().as_str().to_string()),
            form: Value::String(cat.form().to_string()),
            having: Value::Object(cat.having().clone()),
            ports: vec![exchange, status],
        }
    }

    /// Validate the selection, yielding the peer intent and the exchange and
    /// status ports.
    pub fn validate(self, origin: &str) -> Result<(PeerIntent, Port, Port)> {
        let peer = PeerIntent::parse(origin, &self.side, &self.form, &self.having)
            .map_err(CatsError::InvalidConnectMessage)?;

        let count = self.ports.len();
        let mut ports = self.ports.into_iter();
        match (ports.next(), ports.next(), ports.next()) {
            (Some(exchange), Some(status), None) => Ok((peer, exchange, status)),
            _ => Err(CatsError::InvalidConnectMessage(format!(
                "expected 2 ports, got {count}"
            ))),
        }
    }
}

/// One-shot token for answering a capabilities list.
///
/// Sending consumes the token, so it can only ever be used once.
#[derive(Debug)]
pub struct ConnectReply {
    tx: mpsc::UnboundedSender<ConnectMessage>,
}

impl ConnectReply {
    /// Token delivering into `tx`.
    pub fn new(tx: mpsc::UnboundedSender<ConnectMessage>) -> Self {
        Self { tx }
    }

    /// Deliver the selection. Returns `false` if the requester is gone.
    pub fn send(self, message: ConnectMessage) -> bool {
        self.tx.send(message).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::protocol::{normalize, Intent, Side};

    #[test]
    fn test_kinds() {
        assert_eq!(HandshakeMessage::GetCapabilities.kind(), "get-capabilities");
        assert_eq!(HandshakeMessage::Close.kind(), "close");
        assert_eq!(
            HandshakeMessage::OriginChanged("https://x".into()).kind(),
            "origin-changed"
        );
    }

    #[test]
    fn test_connect_for_cat_validates() {
        let cats = normalize(&[Intent::offering("text", "hi").with_meta("lang", "en")]);
        let (exchange, _exchange_peer) = Port::pair();
        let (status, _status_peer) = Port::pair();

        let message = ConnectMessage::new(&cats[0], exchange, status);
        let (peer, _, _) = message.validate("https://service.example").unwrap();

        assert_eq!(peer.origin, "https://service.example");
        assert_eq!(peer.side, Side::Offering);
        assert_eq!(peer.form, "text");
        assert_eq!(peer.having["lang"], json!("en"));
    }

    #[test]
    fn test_connect_requires_two_ports() {
        let (only, _other) = Port::pair();
        let message = ConnectMessage {
            side: json!("offering"),
            form: json!("text"),
            having: Value::Null,
            ports: vec![only],
        };
        assert!(matches!(
            message.validate("o"),
            Err(CatsError::InvalidConnectMessage(_))
        ));
    }

    #[test]
    fn test_connect_rejects_bad_shape() {
        let (a, _a) = Port::pair();
        let (b, _b) = Port::pair();
        let message = ConnectMessage {
            side: json!("offering"),
            form: json!(["text"]),
            having: json!({}),
            ports: vec![a, b],
        };
        assert!(matches!(
            message.validate("o"),
            Err(CatsError::InvalidConnectMessage(_))
        ));
    }

    #[test]
    fn test_reply_is_single_use() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let reply = ConnectReply::new(tx);
        let (a, _a) = Port::pair();
        let (b, _b) = Port::pair();
        let cats = normalize(&[Intent::accepting("text")]);

        assert!(reply.send(ConnectMessage::new(&cats[0], a, b)));
        // `reply` is consumed here; a second send does not compile.
        assert!(rx.try_recv().is_ok());
    }
}
