//! Bridge orchestration.
//!
//! [`Bridge`] wires the credential store, registrar and forwarder into one
//! session per configured hub and exposes the operations the control
//! endpoint needs: rotate the credential, report health, shut down.

// Rust guideline compliant 2026-02

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::constants;
use crate::credentials::{Credential, CredentialStore};
use crate::forwarder::{Forwarder, ForwarderStats, RoutingTable};
use crate::registrar::{Registrar, SubscriptionParams};
use crate::session::{Backoff, Session, SessionHandle, SessionState};
use crate::transport::Connector;

/// Overall health verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    /// Every session is ready.
    Ok,
    /// A credential is present but at least one session is not ready.
    Degraded,
    /// No credential has been supplied yet.
    WaitingForToken,
}

/// Per-session section of the health report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionHealth {
    /// Current lifecycle state.
    pub state: SessionState,
    /// Whether events are flowing.
    pub connected: bool,
    /// Consecutive failed attempts.
    pub attempt: u32,
    /// Most recent connection failure.
    pub last_error: Option<String>,
    /// When the session last became ready.
    pub last_ready_at: Option<DateTime<Utc>>,
    /// Delay of the pending retry, when reconnecting.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_in_ms: Option<u64>,
}

/// Body of `GET /health`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    /// Overall verdict.
    pub status: HealthStatus,
    /// Whether any credential has been set.
    pub credential_present: bool,
    /// Sessions keyed by hub name.
    pub sessions: BTreeMap<String, SessionHealth>,
    /// Delivery counters.
    pub forwarder: ForwarderStats,
}

/// Running bridge: one session per hub plus shared collaborators.
#[derive(Debug)]
pub struct Bridge {
    credentials: CredentialStore,
    forwarder: Forwarder,
    sessions: Vec<SessionHandle>,
    cancel: CancellationToken,
}

impl Bridge {
    /// Spawns a session for every configured hub.
    ///
    /// Sessions start idle unless the configuration carries an initial
    /// credential. Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the webhook HTTP client cannot be created.
    pub fn start(config: &Config, connector: Arc<dyn Connector>) -> Result<Self> {
        let credentials = CredentialStore::new(config.initial_token.as_deref().map(Credential::new));
        let registrar = Arc::new(Registrar::new(SubscriptionParams {
            account_id: config.account_id,
            contract_ids: config.contract_ids.clone(),
        }));
        let routes = RoutingTable::from_urls(
            config.user_webhook_url.as_deref(),
            config.market_webhook_url.as_deref(),
        );
        let forwarder = Forwarder::new(routes, config.forward_timeout)?;
        let backoff = Backoff::new(config.reconnect_initial, config.reconnect_max);
        let cancel = CancellationToken::new();

        if config.user_webhook_url.is_none() {
            log::warn!("[Bridge] USER_WEBHOOK_URL not set; user events will be dropped");
        }
        if config.market_webhook_url.is_none() {
            log::warn!("[Bridge] MARKET_WEBHOOK_URL not set; market events will be dropped");
        }

        let sessions = config
            .hubs
            .iter()
            .map(|&hub| {
                Session::new(
                    hub,
                    Arc::clone(&connector),
                    credentials.clone(),
                    Arc::clone(&registrar),
                    forwarder.clone(),
                    backoff,
                )
                .spawn(cancel.child_token())
            })
            .collect::<Vec<_>>();

        log::info!(
            "[Bridge] Started {} session(s), credential {}",
            sessions.len(),
            if credentials.is_present() { "present" } else { "absent" }
        );

        Ok(Self {
            credentials,
            forwarder,
            sessions,
            cancel,
        })
    }

    /// Replaces the credential and restarts every live session.
    ///
    /// Returns once the restarts have been initiated, with the number of
    /// sessions that will reconnect.
    pub fn update_token(&self, credential: Credential) -> usize {
        self.credentials.set(credential);
        self.sessions
            .iter()
            .filter(|s| s.status().state != SessionState::Closed)
            .count()
    }

    /// Current health of the bridge. Never fails.
    #[must_use]
    pub fn health(&self) -> HealthReport {
        let credential_present = self.credentials.is_present();
        let mut all_ready = true;

        let sessions = self
            .sessions
            .iter()
            .map(|handle| {
                let status = handle.status();
                all_ready &= status.is_connected();
                let health = SessionHealth {
                    state: status.state,
                    connected: status.is_connected(),
                    attempt: status.attempt,
                    last_error: status.last_error,
                    last_ready_at: status.last_ready_at,
                    retry_in_ms: status.retry_in_ms,
                };
                (handle.hub().to_string(), health)
            })
            .collect();

        let status = if !credential_present {
            HealthStatus::WaitingForToken
        } else if all_ready {
            HealthStatus::Ok
        } else {
            HealthStatus::Degraded
        };

        HealthReport {
            status,
            credential_present,
            sessions,
            forwarder: self.forwarder.stats(),
        }
    }

    /// Session handles, in configuration order.
    #[must_use]
    pub fn sessions(&self) -> &[SessionHandle] {
        &self.sessions
    }

    /// Cancels every session and waits for them to close their transports,
    /// then lets in-flight webhook deliveries finish.
    ///
    /// Sessions still running after the grace period are aborted. Deliveries
    /// get at most one forward timeout.
    pub async fn shutdown(&self) {
        log::info!("[Bridge] Shutting down {} session(s)", self.sessions.len());
        self.cancel.cancel();

        // Each session closes its own link within CLOSE_GRACE_PERIOD.
        let grace = constants::CLOSE_GRACE_PERIOD + constants::RECONNECT_INITIAL_DELAY;
        let all_closed = futures_util::future::join_all(self.sessions.iter().map(SessionHandle::closed));
        if tokio::time::timeout(grace, all_closed).await.is_err() {
            log::warn!("[Bridge] Sessions did not close within {}s, aborting", grace.as_secs());
            for session in &self.sessions {
                session.abort();
            }
        }
        self.forwarder.drain().await;
        log::info!("[Bridge] Shutdown complete");
    }
}
