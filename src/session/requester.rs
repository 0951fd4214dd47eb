//! Requester session.
//!
//! The requester stands up the peer, answers its capability request, and
//! runs the cat the service selects.
//!
//! ```text
//!  open()
//!    │ normalize intents, register (cancels the displaced session)
//!    │ transport.establish_peer(target)
//!    v
//!  handshake phase ── GET-CAPABILITIES ─> send CAPABILITIES-LIST
//!    │               ── ORIGIN-CHANGED ──> retarget (before listing only)
//!    │               ── CLOSE / lost ────> NotMatched
//!    │               ── window elapsed ──> NotMatched
//!    │ CONNECT (validated, matched)
//!    v
//!  exchange phase ─── peer DONE / status lost / CLOSE ─> fire closing
//!    │               ── second CONNECT ──> discarded (AlreadyConnected)
//!    │ connect resolves
//!    v
//!  post DONE, Matched { peer, value }
//! ```

use std::future::pending;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::{MatchResult, SessionRegistry, SessionState};
use crate::config::RequesterConfig;
use crate::error::{CatsError, Result};
use crate::exchange::{ClosingSignal, DataArray, ExchangeMessage};
use crate::protocol::{
    find_match, normalize, Cat, ConnectMessage, ConnectReply, Envelope, HandshakeMessage,
    Intent,
};
use crate::transport::{HandshakeChannel, HandshakeSender, Transport};

struct Inner {
    state: SessionState,
    opened: bool,
    reject_reason: Option<String>,
    handshake: Option<HandshakeSender>,
}

/// One requester exchange attempt.
pub struct Requester {
    id: Uuid,
    config: RequesterConfig,
    transport: Arc<dyn Transport>,
    registry: Arc<SessionRegistry>,
    closing: ClosingSignal,
    inner: Mutex<Inner>,
}

impl Requester {
    /// Create a session in the `Created` state.
    pub fn new(
        config: RequesterConfig,
        transport: Arc<dyn Transport>,
        registry: Arc<SessionRegistry>,
    ) -> Arc<Self> {
        Arc::new(Self {
            id: Uuid::new_v4(),
            config,
            transport,
            registry,
            closing: ClosingSignal::new(),
            inner: Mutex::new(Inner {
                state: SessionState::Created,
                opened: false,
                reject_reason: None,
                handshake: None,
            }),
        })
    }

    /// Session id
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Current lifecycle state
    pub fn state(&self) -> SessionState {
        self.inner.lock().state
    }

    /// The session's closing signal
    pub fn closing(&self) -> &ClosingSignal {
        &self.closing
    }

    /// Run the session: open the peer, negotiate, exchange.
    ///
    /// Single-shot; a second call fails with [`CatsError::AlreadyOpened`].
    /// A session cancelled before opening resolves with the cancellation
    /// outcome without contacting any peer.
    pub async fn open(self: &Arc<Self>, intents: &[Intent]) -> Result<MatchResult<DataArray>> {
        {
            let mut inner = self.inner.lock();
            if inner.opened {
                return Err(CatsError::AlreadyOpened);
            }
            inner.opened = true;
            if inner.state.is_complete() {
                drop(inner);
                return self.settle_unconnected();
            }
            inner.state = SessionState::Open;
        }

        let span = info_span!("requester", id = %self.id);
        let outcome = self.run(intents).instrument(span).await;
        self.complete();
        outcome
    }

    /// Force the session to `Complete`.
    ///
    /// With a reason, the outcome of [`open`](Self::open) becomes
    /// [`CatsError::Cancelled`]. Without one, an unconnected session resolves
    /// `NotMatched` and a running exchange finishes through its closing race.
    /// Returns `false` (and does nothing) once the session is complete.
    pub fn cancel(&self, reason: Option<&str>) -> bool {
        {
            let mut inner = self.inner.lock();
            if inner.state.is_complete() {
                return false;
            }
            if let Some(reason) = reason {
                inner.reject_reason = Some(reason.to_string());
            }
        }
        info!(id = %self.id, ?reason, "requester cancelled");
        self.complete();
        true
    }

    async fn run(self: &Arc<Self>, intents: &[Intent]) -> Result<MatchResult<DataArray>> {
        let cats = normalize(intents);
        let target = self.config.peer_target().ok_or(CatsError::NothingToOpen)?;

        if let Some(previous) = self.registry.swap(Arc::clone(self)) {
            if !Arc::ptr_eq(&previous, self) {
                debug!(previous = %previous.id(), "cancelling displaced session");
                previous.cancel(None);
            }
        }

        let channel = tokio::select! {
            biased;
            _ = self.closing.fired() => return self.settle_unconnected(),
            channel = self.transport.establish_peer(&target) => channel?,
        };
        info!(
            transport = self.transport.name(),
            locator = %target.locator,
            cats = cats.len(),
            "peer established"
        );

        let HandshakeChannel {
            sender,
            mut receiver,
        } = channel;
        self.inner.lock().handshake = Some(sender.clone());

        let (connect_tx, mut connect_rx) = mpsc::unbounded_channel::<ConnectMessage>();
        let mut trusted = target.origin.clone();
        let mut listed = false;

        let window = self.config.open_timeout();
        let deadline = async move {
            match window {
                Some(window) => tokio::time::sleep(window).await,
                None => pending::<()>().await,
            }
        };
        tokio::pin!(deadline);

        let (cat, peer, exchange, mut status) = loop {
            tokio::select! {
                biased;
                _ = self.closing.fired() => return self.settle_unconnected(),
                _ = &mut deadline => {
                    info!("handshake window elapsed");
                    return Ok(MatchResult::NotMatched);
                }
                Some(message) = connect_rx.recv() => {
                    let (peer, exchange, status) = message.validate(&trusted)?;
                    let cat = find_match(&cats, std::slice::from_ref(&peer))
                        .map(|(cat, _)| cat.clone())
                        .ok_or(CatsError::NoMatchingConnector)?;
                    break (cat, peer, exchange, status);
                }
                envelope = receiver.recv() => {
                    let Some(Envelope { origin, message }) = envelope else {
                        info!("peer lost before connect");
                        return Ok(MatchResult::NotMatched);
                    };
                    if origin != trusted {
                        debug!(%origin, kind = message.kind(), "ignoring untrusted origin");
                        continue;
                    }
                    match message {
                        HandshakeMessage::GetCapabilities => {
                            let entries = cats.iter().map(Cat::descriptor).collect();
                            let reply = ConnectReply::new(connect_tx.clone());
                            sender.send(HandshakeMessage::CapabilitiesList { entries, reply });
                            listed = true;
                        }
                        HandshakeMessage::OriginChanged(next) if !listed => {
                            debug!(from = %trusted, to = %next, "peer origin changed");
                            trusted = next;
                        }
                        HandshakeMessage::Close => {
                            info!("peer closed before connect");
                            return Ok(MatchResult::NotMatched);
                        }
                        other => debug!(kind = other.kind(), "ignoring handshake message"),
                    }
                }
            }
        };

        info!(side = %cat.side(), form = cat.form(), "connected");

        let connecting = cat.connect(exchange, peer.clone(), self.closing.clone());
        tokio::pin!(connecting);
        let mut status_open = true;
        let mut handshake_open = true;

        let value = loop {
            tokio::select! {
                biased;
                value = &mut connecting => break value?,
                message = status.recv(), if status_open => match message {
                    Some(ExchangeMessage::Done) | None => {
                        status_open = false;
                        self.closing.fire();
                    }
                    Some(other) => debug!(kind = other.kind(), "ignoring status message"),
                },
                envelope = receiver.recv(), if handshake_open => match envelope {
                    Some(Envelope { origin, message: HandshakeMessage::Close })
                        if origin == trusted =>
                    {
                        handshake_open = false;
                        self.closing.fire();
                    }
                    Some(Envelope { origin, message }) => {
                        debug!(%origin, kind = message.kind(), "ignoring handshake message");
                    }
                    None => {
                        handshake_open = false;
                        self.closing.fire();
                    }
                },
                Some(_superseded) = connect_rx.recv() => {
                    warn!(error = %CatsError::AlreadyConnected, "discarding second connect");
                }
            }
        };

        status.post(ExchangeMessage::Done);

        if let Some(reason) = self.inner.lock().reject_reason.clone() {
            return Err(CatsError::Cancelled(reason));
        }
        info!(items = value.len(), "exchange complete");
        Ok(MatchResult::Matched { peer, value })
    }

    /// Outcome of a session that completed without connecting.
    fn settle_unconnected(&self) -> Result<MatchResult<DataArray>> {
        match self.inner.lock().reject_reason.clone() {
            Some(reason) => Err(CatsError::Cancelled(reason)),
            None => Ok(MatchResult::NotMatched),
        }
    }

    /// Enter `Complete`: close the handshake, leave the registry, fire
    /// closing. Safe to call more than once.
    fn complete(&self) {
        let handshake = {
            let mut inner = self.inner.lock();
            inner.state = SessionState::Complete;
            inner.handshake.take()
        };
        if let Some(handshake) = handshake {
            handshake.send(HandshakeMessage::Close);
        }
        self.registry.clear(self);
        self.closing.fire();
    }
}

impl std::fmt::Debug for Requester {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Requester")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("transport", &self.transport.name())
            .finish_non_exhaustive()
    }
}
