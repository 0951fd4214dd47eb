//! Service session.
//!
//! A [`ServiceHost`] owns the service end of the handshake. The first
//! [`get_request`](ServiceHost::get_request) arms a single listener that
//! announces readiness and captures the first capability list as a
//! [`ServiceRequest`]; every later call returns that same request.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, info, info_span, Instrument};

use super::{MatchResult, SessionState};
use crate::config::ServiceConfig;
use crate::error::{CatsError, Result};
use crate::exchange::{ClosingSignal, DataArray, ExchangeMessage, Port};
use crate::protocol::{
    find_match, normalize, ConnectMessage, ConnectReply, Envelope, HandshakeMessage, Intent,
    PeerIntent,
};
use crate::transport::{HandshakeChannel, HandshakeSender, ServiceEndpoint};

/// The service side of one hosting page.
pub struct ServiceHost {
    config: ServiceConfig,
    endpoint: Mutex<Option<ServiceEndpoint>>,
    request: watch::Sender<Option<Arc<ServiceRequest>>>,
    teardown: ClosingSignal,
}

impl ServiceHost {
    /// Host the service end of a handshake channel.
    pub fn new(endpoint: ServiceEndpoint, config: ServiceConfig) -> Arc<Self> {
        let (request, _) = watch::channel(None);
        Arc::new(Self {
            config,
            endpoint: Mutex::new(Some(endpoint)),
            request,
            teardown: ClosingSignal::new(),
        })
    }

    /// Wait up to `timeout` for the requester's capability list.
    ///
    /// Returns the captured request immediately if there is one. Concurrent
    /// callers share one listener; a caller timing out does not stop it.
    pub async fn get_request(self: &Arc<Self>, timeout: Duration) -> Option<Arc<ServiceRequest>> {
        let mut rx = self.request.subscribe();
        let captured = rx.borrow().clone();
        if captured.is_some() {
            return captured;
        }

        let endpoint = self.endpoint.lock().take();
        if let Some(endpoint) = endpoint {
            tokio::spawn(Arc::clone(self).listen(endpoint));
        }

        let waited = tokio::time::timeout(timeout, rx.wait_for(Option::is_some)).await;
        match waited {
            Ok(Ok(request)) => request.clone(),
            Ok(Err(_)) => None,
            Err(_) => {
                debug!(?timeout, "no capability list before timeout");
                None
            }
        }
    }

    /// [`get_request`](Self::get_request) with the configured timeout.
    pub async fn get_request_default(self: &Arc<Self>) -> Option<Arc<ServiceRequest>> {
        self.get_request(self.config.request_timeout()).await
    }

    /// The hosting page is going away; in-flight exchanges close.
    pub fn teardown(&self) -> bool {
        self.teardown.fire()
    }

    /// Service configuration
    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    async fn listen(self: Arc<Self>, endpoint: ServiceEndpoint) {
        let HandshakeChannel {
            sender,
            mut receiver,
        } = endpoint;
        sender.send(HandshakeMessage::GetCapabilities);

        let mut captured: Option<Arc<ServiceRequest>> = None;
        loop {
            tokio::select! {
                biased;
                _ = self.teardown.fired() => {
                    sender.send(HandshakeMessage::Close);
                    break;
                }
                envelope = receiver.recv() => {
                    let Some(Envelope { origin, message }) = envelope else {
                        debug!("requester lost");
                        break;
                    };
                    if !self.config.allows(&origin) {
                        debug!(%origin, kind = message.kind(), "ignoring disallowed origin");
                        continue;
                    }
                    match message {
                        HandshakeMessage::CapabilitiesList { entries, reply }
                            if captured.is_none() =>
                        {
                            let request = Arc::new(ServiceRequest::new(
                                origin,
                                &entries,
                                reply,
                                sender.clone(),
                                self.teardown.clone(),
                            ));
                            info!(
                                origin = %request.origin,
                                options = request.peers.len(),
                                "request captured"
                            );
                            self.request.send_replace(Some(Arc::clone(&request)));
                            captured = Some(request);
                        }
                        HandshakeMessage::Close => {
                            debug!("requester closed handshake");
                            break;
                        }
                        other => debug!(kind = other.kind(), "ignoring handshake message"),
                    }
                }
            }
        }

        if let Some(request) = captured {
            request.closing.fire();
        }
    }
}

impl std::fmt::Debug for ServiceHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceHost")
            .field("config", &self.config)
            .field("captured", &self.request.borrow().is_some())
            .finish_non_exhaustive()
    }
}

/// A captured requester capability list, ready to be answered once.
pub struct ServiceRequest {
    origin: String,
    peers: Vec<PeerIntent>,
    token: Mutex<Option<ConnectReply>>,
    handshake: HandshakeSender,
    opened: AtomicBool,
    state: Mutex<SessionState>,
    closing: ClosingSignal,
    teardown: ClosingSignal,
}

impl ServiceRequest {
    fn new(
        origin: String,
        entries: &[serde_json::Value],
        reply: ConnectReply,
        handshake: HandshakeSender,
        teardown: ClosingSignal,
    ) -> Self {
        let peers = entries
            .iter()
            .filter_map(|entry| match PeerIntent::from_entry(&origin, entry) {
                Ok(peer) => Some(peer),
                Err(reason) => {
                    debug!(%reason, "dropping malformed capability entry");
                    None
                }
            })
            .collect();

        Self {
            origin,
            peers,
            token: Mutex::new(Some(reply)),
            handshake,
            opened: AtomicBool::new(false),
            state: Mutex::new(SessionState::Created),
            closing: ClosingSignal::new(),
            teardown,
        }
    }

    /// Requester origin
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// The requester's valid capability entries, in declared order
    pub fn peers(&self) -> &[PeerIntent] {
        &self.peers
    }

    /// Current lifecycle state
    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    /// This request's closing signal
    pub fn closing(&self) -> &ClosingSignal {
        &self.closing
    }

    /// Match `intents` against the requester's list and run the exchange.
    ///
    /// Single-shot. No eligible pairing resolves `NotMatched` and closes the
    /// handshake, so the requester resolves `NotMatched` too.
    pub async fn open(&self, intents: &[Intent]) -> Result<MatchResult<DataArray>> {
        if self.opened.swap(true, Ordering::SeqCst) {
            return Err(CatsError::AlreadyOpened);
        }
        *self.state.lock() = SessionState::Open;

        let span = info_span!("service_request", origin = %self.origin);
        let outcome = self.run(intents).instrument(span).await;
        *self.state.lock() = SessionState::Complete;
        outcome
    }

    async fn run(&self, intents: &[Intent]) -> Result<MatchResult<DataArray>> {
        let cats = normalize(intents);
        let Some((cat, peer)) = find_match(&cats, &self.peers) else {
            info!(cats = cats.len(), options = self.peers.len(), "no eligible pairing");
            self.handshake.send(HandshakeMessage::Close);
            return Ok(MatchResult::NotMatched);
        };
        let (cat, peer) = (cat.clone(), peer.clone());

        let reply = self
            .token
            .lock()
            .take()
            .ok_or(CatsError::TokenAlreadyUsed)?;
        let (exchange, exchange_remote) = Port::pair();
        let (mut status, status_remote) = Port::pair();
        if !reply.send(ConnectMessage::new(&cat, exchange_remote, status_remote)) {
            debug!("requester gone before connect");
        }
        info!(side = %cat.side(), form = cat.form(), "connect sent");

        let connecting = cat.connect(exchange, peer.clone(), self.closing.clone());
        tokio::pin!(connecting);
        let mut status_open = true;
        let mut hosted = true;

        let value = loop {
            tokio::select! {
                biased;
                value = &mut connecting => break value?,
                _ = self.teardown.fired(), if hosted => {
                    hosted = false;
                    self.closing.fire();
                }
                message = status.recv(), if status_open => match message {
                    Some(ExchangeMessage::Done) | None => {
                        status_open = false;
                        self.closing.fire();
                    }
                    Some(other) => debug!(kind = other.kind(), "ignoring status message"),
                },
            }
        };

        status.post(ExchangeMessage::Done);
        info!(items = value.len(), "exchange complete");
        Ok(MatchResult::Matched { peer, value })
    }
}

impl std::fmt::Debug for ServiceRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceRequest")
            .field("origin", &self.origin)
            .field("peers", &self.peers)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tokio::sync::mpsc;

    use super::*;
    use crate::protocol::Side;

    fn host(config: ServiceConfig) -> (Arc<ServiceHost>, HandshakeChannel) {
        let (requester, service) =
            HandshakeChannel::pair("https://app.example", "https://svc.example");
        (ServiceHost::new(service, config), requester)
    }

    fn list(
        entries: Vec<serde_json::Value>,
    ) -> (HandshakeMessage, mpsc::UnboundedReceiver<ConnectMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            HandshakeMessage::CapabilitiesList {
                entries,
                reply: ConnectReply::new(tx),
            },
            rx,
        )
    }

    #[tokio::test]
    async fn test_get_request_times_out() {
        let (host, _requester) = host(ServiceConfig::default());
        assert!(host.get_request(Duration::from_millis(20)).await.is_none());
    }

    #[tokio::test]
    async fn test_capture_drops_malformed_entries() {
        let (host, mut requester) = host(ServiceConfig::default());
        let pending = tokio::spawn({
            let host = Arc::clone(&host);
            async move { host.get_request(Duration::from_secs(2)).await }
        });

        let ready = requester.receiver.recv().await.unwrap();
        assert_eq!(ready.message.kind(), "get-capabilities");

        let (message, _connects) = list(vec![
            json!({"side": "accepting", "form": "text", "having": {}}),
            json!({"side": "accepting", "form": "text", "having": "nope"}),
            json!({"side": "diagonal", "form": "text"}),
            json!({"side": "offering", "form": 3}),
            json!("not an entry"),
        ]);
        requester.sender.send(message);

        let request = pending.await.unwrap().unwrap();
        assert_eq!(request.origin(), "https://app.example");
        assert_eq!(request.peers().len(), 1);
        assert_eq!(request.peers()[0].side, Side::Accepting);

        // Captured requests are returned immediately from then on.
        let again = host.get_request(Duration::from_millis(1)).await.unwrap();
        assert!(Arc::ptr_eq(&request, &again));
    }

    #[tokio::test]
    async fn test_disallowed_origin_is_ignored() {
        let config = ServiceConfig {
            request_timeout_ms: 50,
            allowed_origins: vec!["https://trusted.example".to_string()],
        };
        let (host, requester) = host(config);
        let (message, _connects) = list(vec![json!({"side": "accepting", "form": "text"})]);
        requester.sender.send(message);

        assert!(host.get_request_default().await.is_none());
    }

    #[tokio::test]
    async fn test_no_pairing_is_not_matched() {
        let (host, mut requester) = host(ServiceConfig::default());
        let (message, mut connects) = list(vec![json!({"side": "accepting", "form": "html"})]);
        requester.sender.send(message);

        let request = host.get_request(Duration::from_secs(2)).await.unwrap();
        let outcome = request.open(&[Intent::offering("text", "hello")]).await.unwrap();

        assert_eq!(outcome, MatchResult::NotMatched);
        assert!(connects.try_recv().is_err());
        let kinds: Vec<_> = [
            requester.receiver.recv().await.unwrap(),
            requester.receiver.recv().await.unwrap(),
        ]
        .iter()
        .map(|envelope| envelope.message.kind())
        .collect();
        assert_eq!(kinds, ["get-capabilities", "close"]);
        assert!(matches!(
            request.open(&[]).await,
            Err(CatsError::AlreadyOpened)
        ));
        assert_eq!(request.state(), SessionState::Complete);
    }

    #[tokio::test]
    async fn test_teardown_closes_inflight_exchange() {
        let (host, requester) = host(ServiceConfig::default());
        let (message, mut connects) = list(vec![json!({"side": "accepting", "form": "text"})]);
        requester.sender.send(message);
        let request = host.get_request(Duration::from_secs(2)).await.unwrap();

        let running = tokio::spawn({
            let request = Arc::clone(&request);
            async move { request.open(&[Intent::offering("text", "hello")]).await }
        });

        // Hold the connect (and its ports) without ever replying.
        let _connect = connects.recv().await.unwrap();
        host.teardown();

        let outcome = tokio::time::timeout(Duration::from_secs(2), running)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert!(outcome.is_matched());
        assert!(outcome.value().unwrap().is_empty());
        assert!(request.closing().is_fired());
    }
}
