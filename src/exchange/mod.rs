//! Offer/result exchange sub-protocol.
//!
//! Runs over one private duplex [`Port`] plus a [`ClosingSignal`]. Each
//! direction is strictly ordered:
//!
//! ```text
//! Offering                         Accepting
//!    |                                |
//!    |-------- offer (data) -------->|  exactly once
//!    |                                |  consumer runs
//!    |<------- result (data) --------|  exactly once
//!    |                                |
//!    |-------- ack ----------------->|  accepting side may now resolve
//! ```
//!
//! Closing may fire at any point; every wait resolves promptly once it
//! does. A closing-triggered resolution never rejects: the offering side
//! resolves with empty data, the accepting side with whatever its consumer
//! settled on (or empty).
//!
//! The "done" datagram travels on a separate status port and is handled by
//! the session layer, not here.

mod accept;
mod closing;
mod data;
mod offer;
mod port;
mod post;

use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;

pub use accept::{receive, AutoReply, Offer};
pub use closing::ClosingSignal;
pub use data::DataArray;
pub use offer::{send, send_posting};
pub use port::{ExchangeMessage, Port, PortSender};
pub use post::{PostOffer, PostResult};

use crate::error::Result;
use crate::protocol::PeerIntent;

/// Producer callback for basic offering.
pub type ProducerFn =
    Arc<dyn Fn(PeerIntent, ClosingSignal) -> BoxFuture<'static, Result<Value>> + Send + Sync>;

/// Producer callback that may post the offer itself (e.g. to transfer ports).
pub type PostingProducerFn = Arc<
    dyn Fn(PeerIntent, ClosingSignal, PostOffer) -> BoxFuture<'static, Result<Value>>
        + Send
        + Sync,
>;

/// Consumer callback for basic accepting.
pub type ConsumerFn = Arc<
    dyn Fn(Offer, PeerIntent, ClosingSignal) -> BoxFuture<'static, Result<Value>> + Send + Sync,
>;

/// Consumer callback that may post the result itself.
pub type PostingConsumerFn = Arc<
    dyn Fn(Offer, PeerIntent, ClosingSignal, PostResult) -> BoxFuture<'static, Result<Value>>
        + Send
        + Sync,
>;

/// Direct control of the exchange port.
pub type Connector = Arc<
    dyn Fn(Port, PeerIntent, ClosingSignal) -> BoxFuture<'static, Result<DataArray>> + Send + Sync,
>;

/// What a basic offering side sends.
#[derive(Clone)]
pub enum Producer {
    /// A literal value.
    Value(Value),
    /// A callback invoked with the peer and closing signal.
    Callback(ProducerFn),
}

impl Producer {
    /// Producer from an async callback.
    pub fn callback<F, Fut>(f: F) -> Self
    where
        F: Fn(PeerIntent, ClosingSignal) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        Self::Callback(Arc::new(move |peer, closing| f(peer, closing).boxed()))
    }
}

impl std::fmt::Debug for Producer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Self::Callback(_) => f.write_str("Callback(..)"),
        }
    }
}

/// Box an async posting producer.
pub fn posting_producer<F, Fut>(f: F) -> PostingProducerFn
where
    F: Fn(PeerIntent, ClosingSignal, PostOffer) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    Arc::new(move |peer, closing, post| f(peer, closing, post).boxed())
}

/// Box an async consumer.
pub fn consumer<F, Fut>(f: F) -> ConsumerFn
where
    F: Fn(Offer, PeerIntent, ClosingSignal) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    Arc::new(move |offer, peer, closing| f(offer, peer, closing).boxed())
}

/// Box an async posting consumer.
pub fn posting_consumer<F, Fut>(f: F) -> PostingConsumerFn
where
    F: Fn(Offer, PeerIntent, ClosingSignal, PostResult) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    Arc::new(move |offer, peer, closing, post| f(offer, peer, closing, post).boxed())
}

/// Box an async connector.
pub fn connector<F, Fut>(f: F) -> Connector
where
    F: Fn(Port, PeerIntent, ClosingSignal) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<DataArray>> + Send + 'static,
{
    Arc::new(move |port, peer, closing| f(port, peer, closing).boxed())
}
