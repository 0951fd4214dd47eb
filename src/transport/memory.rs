//! In-process transport.
//!
//! Services register a [`Launcher`] under a locator. Establishing a peer
//! runs the launcher with a fresh service endpoint, the way opening a popup
//! loads the service page.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use parking_lot::RwLock;

use super::{HandshakeChannel, PeerTarget, ServiceEndpoint, Transport};
use crate::error::{CatsError, Result};

/// Starts a service on a fresh endpoint.
pub type Launcher = Arc<dyn Fn(ServiceEndpoint) + Send + Sync>;

/// Transport connecting requesters and services within one process.
pub struct MemoryTransport {
    /// Origin stamped on the requester's messages.
    origin: String,
    services: RwLock<HashMap<String, (String, Launcher)>>,
}

impl MemoryTransport {
    /// Create a transport for a requester running at `origin`.
    pub fn new(origin: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            services: RwLock::new(HashMap::new()),
        }
    }

    /// Register a service reachable at `target`.
    ///
    /// The service's messages are stamped with `target.origin`.
    pub fn register<F>(&self, target: &PeerTarget, launcher: F)
    where
        F: Fn(ServiceEndpoint) + Send + Sync + 'static,
    {
        self.services.write().insert(
            target.locator.clone(),
            (target.origin.clone(), Arc::new(launcher)),
        );
    }

    /// Requester origin.
    pub fn origin(&self) -> &str {
        &self.origin
    }
}

impl Transport for MemoryTransport {
    fn establish_peer(
        &self,
        target: &PeerTarget,
    ) -> Pin<Box<dyn Future<Output = Result<HandshakeChannel>> + Send + '_>> {
        let locator = target.locator.clone();

        Box::pin(async move {
            let (service_origin, launcher) = self
                .services
                .read()
                .get(&locator)
                .cloned()
                .ok_or_else(|| CatsError::PeerUnreachable(locator.clone()))?;

            let (requester, service) = HandshakeChannel::pair(&self.origin, service_origin);
            launcher(service);

            tracing::info!(%locator, "memory transport launched peer");
            Ok(requester)
        })
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
