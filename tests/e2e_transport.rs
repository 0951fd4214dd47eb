//! End-to-end transport layer tests.
//!
//! These tests verify that sessions only depend on the `Transport` trait:
//! the in-process transport routes by locator, and a custom transport can
//! stand in for it.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use cats::transport::HandshakeChannel;
use cats::{
    CatsError, Intent, MatchResult, MemoryTransport, PeerTarget, Requester, RequesterConfig,
    ServiceConfig, ServiceHost, SessionRegistry, Transport,
};
use serde_json::json;
use tokio::time::timeout;

/// Transport that runs a fixed offering service for every peer.
struct LoopbackTransport {
    launched: AtomicUsize,
}

impl Transport for LoopbackTransport {
    fn establish_peer(
        &self,
        target: &PeerTarget,
    ) -> Pin<Box<dyn Future<Output = cats::Result<HandshakeChannel>> + Send + '_>> {
        let origin = target.origin.clone();
        Box::pin(async move {
            self.launched.fetch_add(1, Ordering::SeqCst);
            let (requester, service) = HandshakeChannel::pair("loopback://app", origin);
            let host = ServiceHost::new(service, ServiceConfig::default());
            tokio::spawn(async move {
                if let Some(request) = host.get_request_default().await {
                    let _ = request.open(&[Intent::offering("ping", "pong")]).await;
                }
            });
            Ok(requester)
        })
    }

    fn name(&self) -> &'static str {
        "loopback"
    }
}

#[tokio::test]
async fn test_custom_transport_drives_session() {
    let transport = Arc::new(LoopbackTransport {
        launched: AtomicUsize::new(0),
    });
    let session = Requester::new(
        RequesterConfig::with_target("loopback://echo"),
        transport.clone(),
        Arc::new(SessionRegistry::new()),
    );

    let outcome = timeout(Duration::from_secs(5), session.open(&[Intent::accepting("ping")]))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(transport.launched.load(Ordering::SeqCst), 1);
    assert_eq!(outcome.peer().unwrap().origin, "loopback://echo");
    assert_eq!(outcome.value().unwrap().items(), [json!("pong")]);
}

#[tokio::test]
async fn test_memory_transport_routes_by_locator() {
    let transport = Arc::new(MemoryTransport::new("https://app.example"));
    for (locator, word) in [("https://a.example/x", "alpha"), ("https://b.example/y", "beta")] {
        transport.register(&PeerTarget::new(locator), move |endpoint| {
            let host = ServiceHost::new(endpoint, ServiceConfig::default());
            tokio::spawn(async move {
                if let Some(request) = host.get_request_default().await {
                    let _ = request.open(&[Intent::offering("word", word)]).await;
                }
            });
        });
    }

    let registry = Arc::new(SessionRegistry::new());
    let session = Requester::new(
        RequesterConfig::with_target("https://b.example/y"),
        transport.clone(),
        Arc::clone(&registry),
    );
    let outcome = timeout(Duration::from_secs(5), session.open(&[Intent::accepting("word")]))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(outcome.peer().unwrap().origin, "https://b.example");
    assert_eq!(outcome.value().unwrap().items(), [json!("beta")]);
}

#[tokio::test]
async fn test_unreachable_target_is_configuration_error() {
    let session = Requester::new(
        RequesterConfig::with_target("https://nobody.example"),
        Arc::new(MemoryTransport::new("https://app.example")),
        Arc::new(SessionRegistry::new()),
    );

    let err = session.open(&[Intent::accepting("text")]).await.unwrap_err();
    assert!(matches!(
        err,
        CatsError::PeerUnreachable(ref locator) if locator == "https://nobody.example"
    ));
    assert!(err.is_configuration());
}

#[tokio::test]
async fn test_service_loss_before_listing() {
    let transport = MemoryTransport::new("https://app.example");
    // The launched page disappears immediately.
    transport.register(&PeerTarget::new("https://gone.example"), drop);

    let session = Requester::new(
        RequesterConfig::with_target("https://gone.example"),
        Arc::new(transport),
        Arc::new(SessionRegistry::new()),
    );
    let outcome = timeout(Duration::from_secs(2), session.open(&[Intent::accepting("text")]))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(outcome, MatchResult::NotMatched);
}
