//! Cats protocol error types.
//!
//! # Error Classification
//!
//! Errors fall into three families, and callers are expected to treat them
//! differently:
//!
//! - **Configuration**: malformed intents, no peer target, unreachable peer.
//!   Detected before any message is exchanged and never worth retrying.
//! - **Protocol violations**: malformed handshake payloads, reuse of a
//!   single-shot resource, double posts. These fail the operation in flight.
//! - **Outcome failures**: callback errors and explicit cancellation reasons.
//!
//! A missing pairing on the service side is *not* an error; it resolves as
//! [`MatchResult::NotMatched`](crate::session::MatchResult::NotMatched).

use thiserror::Error;

/// Cats protocol errors.
#[derive(Error, Debug)]
pub enum CatsError {
    /// An intent declaration was not an object.
    #[error("Intent must be an object")]
    MatcherNotAnObject,

    /// An intent declared both or neither of `accepting` / `offering`.
    #[error("Intent must declare exactly one of accepting or offering")]
    MatcherSideAmbiguous,

    /// An intent form entry was not a string.
    #[error("Intent form must be a string")]
    MatcherFormNotAString,

    /// Requester has neither a target nor a launch behavior configured.
    #[error("Nothing to open: no target configured")]
    NothingToOpen,

    /// Primary operation invoked twice on a single-shot session.
    #[error("Session already opened")]
    AlreadyOpened,

    /// Connect message failed structural validation.
    #[error("Invalid connect message: {0}")]
    InvalidConnectMessage(String),

    /// A connect was already processed by this session.
    #[error("Session already connected")]
    AlreadyConnected,

    /// The peer committed to a selection none of our cats can serve.
    #[error("No matching connector for peer selection")]
    NoMatchingConnector,

    /// Offer was posted more than once on the same exchange.
    #[error("Offer already posted")]
    OfferAlreadyPosted,

    /// Result was posted more than once on the same exchange.
    #[error("Result already posted")]
    ResultAlreadyPosted,

    /// The one-shot handshake token was used twice.
    #[error("Handshake token already used")]
    TokenAlreadyUsed,

    /// A message arrived out of protocol order.
    #[error("Unexpected message: {0}")]
    UnexpectedMessage(String),

    /// Transport could not stand up or reach the peer.
    #[error("Peer unreachable: {0}")]
    PeerUnreachable(String),

    /// Session was cancelled with an explicit reason.
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// A producer or consumer callback failed.
    #[error("Callback error: {0}")]
    Callback(String),

    /// Configuration error.
    #[error("Config error: {0}")]
    Config(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CatsError {
    /// Whether the error is a configuration-class failure (never retried).
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::MatcherNotAnObject
                | Self::MatcherSideAmbiguous
                | Self::MatcherFormNotAString
                | Self::NothingToOpen
                | Self::PeerUnreachable(_)
                | Self::Config(_)
        )
    }

    /// Whether the error is a protocol violation by either party.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            Self::AlreadyOpened
                | Self::InvalidConnectMessage(_)
                | Self::AlreadyConnected
                | Self::NoMatchingConnector
                | Self::OfferAlreadyPosted
                | Self::ResultAlreadyPosted
                | Self::TokenAlreadyUsed
                | Self::UnexpectedMessage(_)
        )
    }
}

/// Result type alias for Cats operations
pub type Result<T> = std::result::Result<T, CatsError>;

impl From<toml::de::Error> for CatsError {
    fn from(err: toml::de::Error) -> Self {
        CatsError::Config(err.to_string())
    }
}
