//! Accepting role: one offer in, one result out, then wait for the ack.

use serde_json::Value;
use tokio::select;

use super::{ClosingSignal, DataArray, ExchangeMessage, Port, PostResult, PostingConsumerFn};
use crate::error::{CatsError, Result};
use crate::protocol::PeerIntent;

/// An offer as delivered to a consumer.
#[derive(Debug)]
pub struct Offer {
    /// Normalized offer data
    pub data: DataArray,
    /// Ports transferred with the offer; dropped (released) with the offer
    pub ports: Vec<Port>,
}

/// What to post when the consumer settles without posting a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoReply {
    /// Post the consumer's settled value.
    Settled,
    /// Post `null`; the consumer declared no reply.
    Null,
}

/// Run the accepting role.
///
/// Resolves with the consumer's normalized settled value once the result
/// has been acknowledged; after the ack this waits for the consumer even if
/// `closing` fires. If `closing` fires (or the peer drops the port) before
/// the ack, resolves immediately with what the consumer settled on so far,
/// or empty. A consumer error always rejects, even after a result was
/// posted.
pub async fn receive(
    consumer: PostingConsumerFn,
    auto_reply: AutoReply,
    mut port: Port,
    peer: PeerIntent,
    closing: ClosingSignal,
) -> Result<DataArray> {
    let offer = select! {
        biased;

        () = closing.fired() => return Ok(DataArray::empty()),

        message = port.recv() => match message {
            Some(ExchangeMessage::Offer { data, ports }) => Offer {
                data: DataArray::normalize(data),
                ports,
            },
            Some(other) => {
                return Err(CatsError::UnexpectedMessage(format!(
                    "expected offer, got {}",
                    other.kind()
                )));
            }
            None => return Ok(DataArray::empty()),
        },
    };

    let post = PostResult::new(port.sender());
    let mut consuming = consumer(offer, peer, closing.clone(), post.clone());
    let mut settled: Option<Value> = None;
    let mut acked = false;

    loop {
        if acked {
            // Past the ack, closing no longer cuts the consumer short.
            let value = match settled.take() {
                Some(value) => value,
                None => (&mut consuming).await?,
            };
            return Ok(DataArray::normalize(value));
        }

        select! {
            biased;

            () = closing.fired() => {
                if post.is_posted() && matches!(port.try_recv(), Some(ExchangeMessage::Ack)) {
                    acked = true;
                    continue;
                }
                tracing::debug!(settled = settled.is_some(), "closing before ack");
                return Ok(settled.map(DataArray::normalize).unwrap_or_default());
            }

            outcome = &mut consuming, if settled.is_none() => {
                let value = outcome?;
                if !post.is_posted() {
                    let reply = match auto_reply {
                        AutoReply::Settled => value.clone(),
                        AutoReply::Null => Value::Null,
                    };
                    post.post(reply)?;
                }
                settled = Some(value);
            }

            message = port.recv(), if !acked => match message {
                Some(ExchangeMessage::Ack) if post.is_posted() => acked = true,
                Some(other) => {
                    return Err(CatsError::UnexpectedMessage(format!(
                        "expected ack, got {}",
                        other.kind()
                    )));
                }
                None => {
                    tracing::debug!("peer dropped exchange port before ack");
                    return Ok(settled.map(DataArray::normalize).unwrap_or_default());
                }
            },
        }
    }
}
