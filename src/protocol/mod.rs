//! Cats capability negotiation.
//!
//! A requester and a service each declare [`Intent`]s. Normalization turns
//! them into single-form [`Cat`]s; the matcher pairs one of our cats with
//! one of the peer's declarations.
//!
//! # Handshake
//!
//! ```text
//! Requester                          Service
//!    |                                  |
//!    |   (transport stands up service)  |
//!    |                                  |
//!    |<-------- GET-CAPABILITIES -------|  service is ready
//!    |                                  |
//!    |--- CAPABILITIES-LIST (reply) --->|  (side, form, having) entries
//!    |                                  |  service runs the matcher
//!    |<-- CONNECT (exchange, status) ---|  via the one-shot reply token
//!    |                                  |
//!    |  requester runs the matcher on   |
//!    |  the single selection            |
//!    |                                  |
//!    |====== exchange sub-protocol =====|  offer / result / ack
//!    |                                  |
//!    |<------------ DONE -------------->|  on the status ports
//!    |------------- CLOSE ------------->|
//! ```
//!
//! ## Matching rule
//!
//! A pairing is eligible when the sides are opposite and the forms are equal
//! (case-sensitive). Among eligible pairings, the last one found in a
//! nested scan (own entries outer, peer options inner) is used.
//!
//! ## Intent behaviors
//!
//! | Behavior            | Accepting                       | Offering                       |
//! |---------------------|---------------------------------|--------------------------------|
//! | basic               | consumer value, optional reply  | literal value or producer      |
//! | posting             | consumer posts result itself    | producer posts offer itself    |
//! | connect             | raw exchange port               | raw exchange port              |

mod intent;
mod matcher;
mod message;

pub use intent::{
    intents_from_value, normalize, normalize_value, Behavior, Cat, Having, Intent, PeerIntent,
    Side,
};
pub use matcher::{find_match, is_eligible, Matchable};
pub use message::{ConnectMessage, ConnectReply, Envelope, HandshakeMessage};

/// Protocol version
pub const PROTOCOL_VERSION: &str = "1.0";

/// Default time a service waits for the requester's capability list
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 1000;
