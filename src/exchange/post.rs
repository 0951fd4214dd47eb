//! Single-use posting capabilities handed to producers and consumers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::Value;

use super::port::{ExchangeMessage, Port, PortSender};
use crate::error::{CatsError, Result};

#[derive(Debug)]
struct PostOnce {
    sender: PortSender,
    posted: AtomicBool,
}

impl PostOnce {
    fn new(sender: PortSender) -> Arc<Self> {
        Arc::new(Self {
            sender,
            posted: AtomicBool::new(false),
        })
    }

    /// Claim the slot; `false` if it was already claimed.
    fn claim(&self) -> bool {
        !self.posted.swap(true, Ordering::AcqRel)
    }

    fn is_posted(&self) -> bool {
        self.posted.load(Ordering::Acquire)
    }
}

/// Posts the offer of an exchange, at most once.
#[derive(Debug, Clone)]
pub struct PostOffer {
    inner: Arc<PostOnce>,
}

impl PostOffer {
    pub(crate) fn new(sender: PortSender) -> Self {
        Self {
            inner: PostOnce::new(sender),
        }
    }

    /// Post the offer together with any ports to transfer.
    ///
    /// A second call fails with [`CatsError::OfferAlreadyPosted`] and sends
    /// nothing.
    pub fn post(&self, data: impl Into<Value>, ports: Vec<Port>) -> Result<()> {
        if !self.inner.claim() {
            return Err(CatsError::OfferAlreadyPosted);
        }
        self.inner.sender.post(ExchangeMessage::Offer {
            data: data.into(),
            ports,
        });
        Ok(())
    }

    /// Whether the offer has been posted.
    pub fn is_posted(&self) -> bool {
        self.inner.is_posted()
    }
}

/// Posts the result of an exchange, at most once.
#[derive(Debug, Clone)]
pub struct PostResult {
    inner: Arc<PostOnce>,
}

impl PostResult {
    pub(crate) fn new(sender: PortSender) -> Self {
        Self {
            inner: PostOnce::new(sender),
        }
    }

    /// Post the result. A second call fails with
    /// [`CatsError::ResultAlreadyPosted`].
    pub fn post(&self, data: impl Into<Value>) -> Result<()> {
        if !self.inner.claim() {
            return Err(CatsError::ResultAlreadyPosted);
        }
        self.inner
            .sender
            .post(ExchangeMessage::Result { data: data.into() });
        Ok(())
    }

    /// Whether the result has been posted.
    pub fn is_posted(&self) -> bool {
        self.inner.is_posted()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_offer_posts_once() {
        let (local, mut remote) = Port::pair();
        let post = PostOffer::new(local.sender());

        post.post("first", Vec::new()).unwrap();
        assert!(matches!(
            post.clone().post("second", Vec::new()),
            Err(CatsError::OfferAlreadyPosted)
        ));

        match remote.try_recv() {
            Some(ExchangeMessage::Offer { data, .. }) => assert_eq!(data, json!("first")),
            other => panic!("unexpected {other:?}"),
        }
        assert!(remote.try_recv().is_none());
    }

    #[test]
    fn test_result_posts_once() {
        let (local, mut remote) = Port::pair();
        let post = PostResult::new(local.sender());
        assert!(!post.is_posted());

        post.post(json!({"ok": true})).unwrap();
        assert!(post.is_posted());
        assert!(matches!(
            post.post(Value::Null),
            Err(CatsError::ResultAlreadyPosted)
        ));

        assert!(matches!(
            remote.try_recv(),
            Some(ExchangeMessage::Result { .. })
        ));
        assert!(remote.try_recv().is_none());
    }
}
