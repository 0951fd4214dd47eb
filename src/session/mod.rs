//! Requester and service session state machines.
//!
//! A session is created once per exchange attempt and never reused.
//!
//! ```text
//!              open() / get_request()+open()
//!     [Created] ────────────────────────────> [Open]
//!         │                                     │
//!         │ cancel()                            │ exchange done, cancel(),
//!         │                                     │ peer lost, handshake window
//!         v                                     v
//!     [Complete] <──────────────────────────────┘
//! ```
//!
//! Entering `Complete` fires the session's closing signal and releases the
//! handshake channel and both ports.

mod registry;
mod requester;
mod service;

pub use registry::SessionRegistry;
pub use requester::Requester;
pub use service::{ServiceHost, ServiceRequest};

use serde::Serialize;

use crate::protocol::PeerIntent;

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// Constructed, primary operation not yet invoked
    Created,
    /// Primary operation running
    Open,
    /// Finished; resources released
    Complete,
}

impl SessionState {
    /// Check if the session has finished
    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Complete)
    }
}

/// Terminal outcome of a session's primary operation
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum MatchResult<T> {
    /// No pairing was made
    NotMatched,
    /// A pairing was made and the exchange produced `value`
    Matched {
        /// The peer's side of the pairing
        peer: PeerIntent,
        /// Exchange result
        value: T,
    },
}

impl<T> MatchResult<T> {
    /// Whether a pairing was made
    pub fn is_matched(&self) -> bool {
        matches!(self, Self::Matched { .. })
    }

    /// The matched peer, if any
    pub fn peer(&self) -> Option<&PeerIntent> {
        match self {
            Self::Matched { peer, .. } => Some(peer),
            Self::NotMatched => None,
        }
    }

    /// The exchange value, if any
    pub fn value(&self) -> Option<&T> {
        match self {
            Self::Matched { value, .. } => Some(value),
            Self::NotMatched => None,
        }
    }

    /// Consume into the exchange value, if any
    pub fn into_value(self) -> Option<T> {
        match self {
            Self::Matched { value, .. } => Some(value),
            Self::NotMatched => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::protocol::Side;

    #[test]
    fn test_match_result_accessors() {
        let peer = PeerIntent::new("https://svc.example", Side::Offering, "text");
        let matched = MatchResult::Matched {
            peer: peer.clone(),
            value: 7,
        };
        assert!(matched.is_matched());
        assert_eq!(matched.peer(), Some(&peer));
        assert_eq!(matched.value(), Some(&7));

        let none: MatchResult<i32> = MatchResult::NotMatched;
        assert!(!none.is_matched());
        assert!(none.into_value().is_none());
    }

    #[test]
    fn test_match_result_serialization() {
        let none: MatchResult<i32> = MatchResult::NotMatched;
        assert_eq!(serde_json::to_value(&none).unwrap(), json!({"outcome": "not_matched"}));

        let matched = MatchResult::Matched {
            peer: PeerIntent::new("o", Side::Accepting, "text"),
            value: json!(["hello"]),
        };
        let value = serde_json::to_value(&matched).unwrap();
        assert_eq!(value["outcome"], "matched");
        assert_eq!(value["peer"]["side"], "accepting");
        assert_eq!(value["value"], json!(["hello"]));
    }

    #[test]
    fn test_state_is_complete() {
        assert!(!SessionState::Created.is_complete());
        assert!(!SessionState::Open.is_complete());
        assert!(SessionState::Complete.is_complete());
    }
}
