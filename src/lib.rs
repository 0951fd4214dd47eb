//! # Cats - capability negotiation and data exchange between untrusting peers
//!
//! Two independent parties, a *requester* and a *service*, discover a
//! shared data-exchange capability and exchange a value through it, without
//! either trusting the other's code. They only talk over an origin-checked
//! asynchronous transport.
//!
//! ## Protocol Overview
//!
//! ```text
//! Requester                     Transport                      Service
//!    |                              |                              |
//!    |---- establish_peer --------->|------ stand up service ----->|
//!    |<----------------------- GET-CAPABILITIES -------------------|
//!    |------------------------ CAPABILITIES-LIST ----------------->|
//!    |<----------------------- CONNECT (2 ports) ------------------|
//!    |                              |                              |
//!    |======== offer / result / ack on the private exchange port ===|
//!    |<======= done / done on the private status port ============>|
//!    |------------------------ CLOSE ----------------------------->|
//! ```
//!
//! Both sides run the same deterministic matcher over their own inputs, so
//! they agree on the pairing without coordinating.
//!
//! ### Modules
//!
//! | Module        | Purpose                                              |
//! |---------------|------------------------------------------------------|
//! | [`protocol`]  | Intents, cats, matcher, handshake messages           |
//! | [`exchange`]  | Offer/result/ack sub-protocol, ports, closing signal |
//! | [`session`]   | Requester and service state machines                 |
//! | [`transport`] | Peer establishment and origin-stamped channels       |
//! | [`config`]    | TOML and environment configuration                   |
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use cats::{Intent, MemoryTransport, PeerTarget, Requester, RequesterConfig,
//!            ServiceConfig, ServiceHost, SessionRegistry};
//!
//! let target = PeerTarget::new("https://svc.example/pick");
//! let transport = MemoryTransport::new("https://app.example");
//! transport.register(&target, |endpoint| {
//!     let host = ServiceHost::new(endpoint, ServiceConfig::default());
//!     tokio::spawn(async move {
//!         if let Some(request) = host.get_request(Duration::from_secs(1)).await {
//!             let _ = request.open(&[Intent::offering("text", "hello")]).await;
//!         }
//!     });
//! });
//!
//! let requester = Requester::new(
//!     RequesterConfig::with_target("https://svc.example/pick"),
//!     Arc::new(transport),
//!     Arc::new(SessionRegistry::new()),
//! );
//! let outcome = requester.open(&[Intent::accepting("text")]).await?;
//! ```

pub mod config;
pub mod error;
pub mod exchange;
pub mod protocol;
pub mod session;
pub mod transport;

pub use config::{Config, LoggingConfig, RequesterConfig, ServiceConfig};
pub use error::{CatsError, Result};
pub use exchange::{ClosingSignal, DataArray, Offer, Port, PostOffer, PostResult};
pub use protocol::{find_match, normalize, normalize_value, Cat, Intent, PeerIntent, Side};
pub use session::{
    MatchResult, Requester, ServiceHost, ServiceRequest, SessionRegistry, SessionState,
};
pub use transport::{MemoryTransport, PeerTarget, Transport};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
