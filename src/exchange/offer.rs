//! Offering role: post once, then race the reply against closing.

use futures::future::{self, BoxFuture};
use serde_json::Value;
use tokio::select;

use super::{
    ClosingSignal, DataArray, ExchangeMessage, Port, PostOffer, PostingProducerFn, Producer,
};
use crate::error::{CatsError, Result};
use crate::protocol::PeerIntent;

/// Run the offering role with a basic producer.
///
/// The produced value is posted exactly once; the returned data is the
/// peer's normalized reply, or empty if `closing` fires first.
pub async fn send(
    producer: Producer,
    port: Port,
    peer: PeerIntent,
    closing: ClosingSignal,
) -> Result<DataArray> {
    let post = PostOffer::new(port.sender());
    let produced: BoxFuture<'static, Result<Value>> = match producer {
        Producer::Value(value) => Box::pin(future::ready(Ok(value))),
        Producer::Callback(produce) => produce(peer, closing.clone()),
    };
    drive(port, post, produced, closing).await
}

/// Run the offering role with a producer that posts the offer itself.
///
/// If the producer settles without posting, its value is posted for it.
pub async fn send_posting(
    producer: PostingProducerFn,
    port: Port,
    peer: PeerIntent,
    closing: ClosingSignal,
) -> Result<DataArray> {
    let post = PostOffer::new(port.sender());
    let produced = producer(peer, closing.clone(), post.clone());
    drive(port, post, produced, closing).await
}

async fn drive(
    mut port: Port,
    post: PostOffer,
    mut produced: BoxFuture<'static, Result<Value>>,
    closing: ClosingSignal,
) -> Result<DataArray> {
    let mut producing = true;

    loop {
        select! {
            biased;

            () = closing.fired() => {
                tracing::debug!("closing before reply; resolving empty");
                return Ok(DataArray::empty());
            }

            outcome = &mut produced, if producing => {
                producing = false;
                let value = outcome?;
                if !post.is_posted() {
                    post.post(value, Vec::new())?;
                }
            }

            message = port.recv() => match message {
                Some(ExchangeMessage::Result { data }) => {
                    port.post(ExchangeMessage::Ack);
                    return Ok(DataArray::normalize(data));
                }
                Some(other) => {
                    return Err(CatsError::UnexpectedMessage(format!(
                        "expected result, got {}",
                        other.kind()
                    )));
                }
                None => {
                    tracing::debug!("peer dropped exchange port before replying");
                    return Ok(DataArray::empty());
                }
            },
        }
    }
}
