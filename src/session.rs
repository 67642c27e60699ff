//! Per-hub session.
//!
//! A session owns the lifecycle of one hub connection and runs as its own
//! task. All of its transitions happen on that task, so they are strictly
//! sequential; sessions for different hubs never wait on each other.
//!
//! # State machine
//!
//! ```text
//!            credential set
//!   Idle ───────────────────► Connecting ──ok──► Ready ◄──┐
//!                                 │                │      │ reconnected
//!                                 │ fail           │ lost │ in place
//!                                 ▼                ▼      │
//!                             Reconnecting ◄───────┘──────┘
//!                              (backoff)  ──ok──► Ready
//!
//!   any state ──shutdown──► Closed
//!   any non-Idle state ──credential rotated──► Connecting (zero backoff)
//! ```
//!
//! The credential is read at the start of every attempt and never kept
//! beyond it. Every entry into `Ready` (including an in-place reconnect)
//! runs one full subscription pass on a separate task, so a slow remote call
//! never delays event routing.

// Rust guideline compliant 2026-02

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::constants;
use crate::credentials::{Credential, CredentialStore};
use crate::forwarder::{Forwarder, InboundEvent};
use crate::hub::HubKind;
use crate::registrar::{ActivationReport, Registrar};
use crate::transport::{Connector, Link, LinkEvent, LinkHandle};

/// Reconnection delay policy: exponential from a floor, capped at a ceiling,
/// with bounded random jitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    floor: Duration,
    ceiling: Duration,
    jitter: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(constants::RECONNECT_INITIAL_DELAY, constants::RECONNECT_MAX_DELAY)
    }
}

impl Backoff {
    /// Creates a policy with the default jitter.
    #[must_use]
    pub fn new(floor: Duration, ceiling: Duration) -> Self {
        Self {
            floor,
            ceiling: ceiling.max(floor),
            jitter: constants::RECONNECT_MAX_JITTER,
        }
    }

    /// Replaces the maximum jitter.
    #[must_use]
    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    /// Delay before retry number `attempt` (1-based), without jitter.
    #[must_use]
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(20);
        self.floor.saturating_mul(1 << exponent).min(self.ceiling)
    }

    /// Delay before retry number `attempt`, jittered and clamped to
    /// `[floor, ceiling]`.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let jitter_ms = u64::try_from(self.jitter.as_millis()).unwrap_or(u64::MAX);
        let jitter = Duration::from_millis(rand::random_range(0..=jitter_ms));
        (self.base_delay(attempt) + jitter).clamp(self.floor, self.ceiling)
    }
}

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// No credential yet; no transport exists.
    Idle,
    /// First attempt with the current credential.
    Connecting,
    /// Handshake done, subscriptions issued, events flowing.
    Ready,
    /// Waiting out a backoff delay or retrying after a failure.
    Reconnecting,
    /// Shut down. Terminal.
    Closed,
}

impl SessionState {
    /// Lowercase label for logs.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Ready => "ready",
            Self::Reconnecting => "reconnecting",
            Self::Closed => "closed",
        }
    }
}

/// Snapshot of a session, published on every transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionStatus {
    /// Hub the session serves.
    pub hub: HubKind,
    /// Current state.
    pub state: SessionState,
    /// Consecutive failed attempts since the last success or rotation.
    pub attempt: u32,
    /// Most recent connection failure, cleared on reaching `Ready`.
    pub last_error: Option<String>,
    /// When the session last became ready.
    pub last_ready_at: Option<DateTime<Utc>>,
    /// How many times the session has become ready.
    pub ready_count: u64,
    /// Delay of the pending retry while `Reconnecting`.
    pub retry_in_ms: Option<u64>,
}

impl SessionStatus {
    fn new(hub: HubKind) -> Self {
        Self {
            hub,
            state: SessionState::Idle,
            attempt: 0,
            last_error: None,
            last_ready_at: None,
            ready_count: 0,
            retry_in_ms: None,
        }
    }

    /// Whether events are currently flowing.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state == SessionState::Ready
    }
}

/// Why a phase of the worker loop ended.
#[derive(Debug)]
enum Exit {
    Shutdown,
    Rotated,
    Lost(String),
}

/// Everything a session needs, gathered before it is spawned.
#[derive(Debug)]
pub struct Session {
    hub: HubKind,
    connector: Arc<dyn Connector>,
    credentials: CredentialStore,
    registrar: Arc<Registrar>,
    forwarder: Forwarder,
    backoff: Backoff,
}

impl Session {
    /// Assembles a session for `hub`.
    #[must_use]
    pub fn new(
        hub: HubKind,
        connector: Arc<dyn Connector>,
        credentials: CredentialStore,
        registrar: Arc<Registrar>,
        forwarder: Forwarder,
        backoff: Backoff,
    ) -> Self {
        Self {
            hub,
            connector,
            credentials,
            registrar,
            forwarder,
            backoff,
        }
    }

    /// Starts the session's worker task. It runs until `cancel` fires.
    #[must_use]
    pub fn spawn(self, cancel: CancellationToken) -> SessionHandle {
        let (status_tx, status_rx) = watch::channel(SessionStatus::new(self.hub));
        let credential_rx = self.credentials.watch();
        let hub = self.hub;

        let worker = Worker {
            session: self,
            status: status_tx,
            credential_rx,
            cancel,
            attempt: 0,
        };

        SessionHandle {
            hub,
            status: status_rx,
            task: tokio::spawn(worker.run()),
        }
    }
}

/// Outside view of a running session.
#[derive(Debug)]
pub struct SessionHandle {
    hub: HubKind,
    status: watch::Receiver<SessionStatus>,
    task: JoinHandle<()>,
}

impl SessionHandle {
    /// Hub the session serves.
    #[must_use]
    pub fn hub(&self) -> HubKind {
        self.hub
    }

    /// Latest published snapshot.
    #[must_use]
    pub fn status(&self) -> SessionStatus {
        self.status.borrow().clone()
    }

    /// A receiver that is notified on every published snapshot.
    #[must_use]
    pub fn watch_status(&self) -> watch::Receiver<SessionStatus> {
        self.status.clone()
    }

    /// Waits until the session reports `Closed` (or its worker is gone).
    pub async fn closed(&self) {
        let mut status = self.status.clone();
        if status.wait_for(|s| s.state == SessionState::Closed).await.is_err() {
            log::warn!("[Session:{}] Worker ended without reporting closed", self.hub);
        }
    }

    /// Stops the worker task without waiting for a graceful close.
    pub fn abort(&self) {
        self.task.abort();
    }
}

struct Worker {
    session: Session,
    status: watch::Sender<SessionStatus>,
    credential_rx: watch::Receiver<Option<Credential>>,
    cancel: CancellationToken,
    attempt: u32,
}

impl Worker {
    async fn run(mut self) {
        let hub = self.session.hub;
        log::info!("[Session:{}] Started", hub);

        loop {
            let current = self.credential_rx.borrow_and_update().clone();
            let exit = match current {
                None => self.wait_for_credential().await,
                Some(credential) => self.connect_and_serve(credential).await,
            };

            match exit {
                Exit::Shutdown => break,
                Exit::Rotated => {
                    log::info!("[Session:{}] Credential changed, starting a fresh connection", hub);
                    self.attempt = 0;
                }
                Exit::Lost(reason) => {
                    self.attempt = self.attempt.saturating_add(1);
                    self.status.send_modify(|s| s.last_error = Some(reason));
                    match self.wait_before_retry().await {
                        None => {}
                        Some(Exit::Rotated) => {
                            log::info!("[Session:{}] Credential changed during backoff, retrying now", hub);
                            self.attempt = 0;
                        }
                        Some(_) => break,
                    }
                }
            }
        }

        self.status.send_modify(|s| {
            s.state = SessionState::Closed;
            s.retry_in_ms = None;
        });
        log::info!("[Session:{}] Closed", hub);
    }

    async fn wait_for_credential(&mut self) -> Exit {
        self.transition(SessionState::Idle, None);
        log::info!("[Session:{}] Waiting for a credential", self.session.hub);

        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Exit::Shutdown,
            changed = self.credential_rx.changed() => rotation(changed),
        }
    }

    async fn connect_and_serve(&mut self, credential: Credential) -> Exit {
        let hub = self.session.hub;
        let state = if self.attempt == 0 {
            SessionState::Connecting
        } else {
            SessionState::Reconnecting
        };
        self.transition(state, None);
        log::info!("[Session:{}] Connecting (attempt {})", hub, self.attempt + 1);

        let result = tokio::select! {
            biased;
            () = self.cancel.cancelled() => return Exit::Shutdown,
            changed = self.credential_rx.changed() => return rotation(changed),
            result = self.session.connector.connect(hub, &credential) => result,
        };

        match result {
            Ok(link) => self.serve(link).await,
            Err(e) => {
                if e.is_auth_failure() {
                    log::warn!(
                        "[Session:{}] Gateway refused the credential ({}); it has likely expired, \
                         retrying until a new one arrives",
                        hub,
                        e
                    );
                } else {
                    log::warn!("[Session:{}] Connection attempt failed: {}", hub, e);
                }
                Exit::Lost(e.to_string())
            }
        }
    }

    /// Runs the ready phase until the link is lost, replaced or shut down.
    /// The link is always closed before this returns.
    async fn serve(&mut self, link: Link) -> Exit {
        let hub = self.session.hub;
        let Link { handle, mut events } = link;

        self.attempt = 0;
        self.enter_ready();
        let mut activation = self.activate(&handle);

        let exit = 'serve: loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => break 'serve Exit::Shutdown,
                changed = self.credential_rx.changed() => break 'serve rotation(changed),
                event = events.recv() => match event {
                    Some(LinkEvent::Invocation { target, arguments }) => self.route(target, arguments),
                    Some(LinkEvent::Reconnected) => {
                        log::info!("[Session:{}] Transport reconnected in place", hub);
                        activation.abort();
                        self.enter_ready();
                        activation = self.activate(&handle);
                    }
                    Some(LinkEvent::Closed { reason }) => {
                        log::warn!("[Session:{}] Connection lost: {}", hub, reason);
                        break 'serve Exit::Lost(reason);
                    }
                    None => break 'serve Exit::Lost("event stream ended".to_string()),
                },
            }
        };

        activation.abort();
        drop(events);
        handle.close().await;
        exit
    }

    async fn wait_before_retry(&mut self) -> Option<Exit> {
        let delay = self.session.backoff.delay_for(self.attempt);
        let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self.transition(SessionState::Reconnecting, Some(delay_ms));
        log::info!(
            "[Session:{}] Reconnecting in {}ms (attempt {})",
            self.session.hub,
            delay_ms,
            self.attempt
        );

        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Some(Exit::Shutdown),
            changed = self.credential_rx.changed() => Some(rotation(changed)),
            () = tokio::time::sleep(delay) => None,
        }
    }

    fn transition(&self, state: SessionState, retry_in_ms: Option<u64>) {
        let attempt = self.attempt;
        self.status.send_modify(|s| {
            s.state = state;
            s.attempt = attempt;
            s.retry_in_ms = retry_in_ms;
        });
    }

    fn enter_ready(&self) {
        self.status.send_modify(|s| {
            s.state = SessionState::Ready;
            s.attempt = 0;
            s.last_error = None;
            s.last_ready_at = Some(Utc::now());
            s.ready_count += 1;
            s.retry_in_ms = None;
        });
        log::info!("[Session:{}] Ready", self.session.hub);
    }

    /// Starts one subscription pass in the background.
    fn activate(&self, handle: &Arc<dyn LinkHandle>) -> JoinHandle<ActivationReport> {
        let registrar = Arc::clone(&self.session.registrar);
        let handle = Arc::clone(handle);
        let hub = self.session.hub;
        tokio::spawn(async move { registrar.activate(hub, handle).await })
    }

    fn route(&self, target: String, arguments: Vec<Value>) {
        let hub = self.session.hub;
        if hub.binds(&target) {
            self.session
                .forwarder
                .dispatch(InboundEvent::from_invocation(hub, target, arguments));
        } else {
            log::debug!("[Session:{}] Ignoring unbound event {}", hub, target);
        }
    }
}

fn rotation(changed: Result<(), watch::error::RecvError>) -> Exit {
    match changed {
        Ok(()) => Exit::Rotated,
        // The store outlives every session; a dropped sender means teardown.
        Err(_) => Exit::Shutdown,
    }
}
