//! Event forwarder.
//!
//! Delivers each inbound event to the webhook configured for its
//! classification with a single bounded POST. Delivery is best effort and at
//! most once: failures are logged and counted, never retried, queued or
//! reported back to the session that produced the event.

// Rust guideline compliant 2026-02

use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::task::TaskTracker;

use crate::constants;
use crate::hub::{EventClass, HubKind};

/// An event pushed by a hub, on its way to a webhook.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundEvent {
    /// Hub the event arrived on.
    pub hub: HubKind,
    /// Event name (e.g. `GatewayUserOrder`).
    pub name: String,
    /// Opaque payload.
    pub payload: Value,
}

impl InboundEvent {
    /// Builds an event from a hub invocation.
    ///
    /// A lone argument becomes the payload; otherwise the whole argument list
    /// does (market events carry the contract id before the data).
    #[must_use]
    pub fn from_invocation(hub: HubKind, name: impl Into<String>, mut arguments: Vec<Value>) -> Self {
        let payload = if arguments.len() == 1 {
            arguments.remove(0)
        } else {
            Value::Array(arguments)
        };
        Self {
            hub,
            name: name.into(),
            payload,
        }
    }
}

/// Destination URL per event classification.
#[derive(Debug, Clone, Default)]
pub struct RoutingTable {
    routes: HashMap<EventClass, String>,
}

impl RoutingTable {
    /// An empty table: every event is dropped.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Routes `class` to `url`, replacing any previous destination.
    #[must_use]
    pub fn route(mut self, class: EventClass, url: impl Into<String>) -> Self {
        self.routes.insert(class, url.into());
        self
    }

    /// Builds the table from optional per-class URLs.
    #[must_use]
    pub fn from_urls(user: Option<&str>, market: Option<&str>) -> Self {
        let mut table = Self::new();
        if let Some(url) = user {
            table = table.route(EventClass::User, url);
        }
        if let Some(url) = market {
            table = table.route(EventClass::Market, url);
        }
        table
    }

    /// Destination for an event name, if its class is routed.
    #[must_use]
    pub fn resolve(&self, event_name: &str) -> Option<&str> {
        EventClass::of(event_name).and_then(|class| self.routes.get(&class).map(String::as_str))
    }
}

/// Result of one delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForwardOutcome {
    /// The webhook answered with a success status.
    Delivered {
        /// HTTP status returned.
        status: u16,
    },
    /// No destination is configured for the event's class.
    NoRoute,
    /// The webhook answered with a non-success status.
    Rejected {
        /// HTTP status returned.
        status: u16,
        /// Response body, truncated for logging.
        body: String,
    },
    /// The request could not be completed (connect error, timeout).
    Failed {
        /// Error description.
        reason: String,
    },
}

/// Delivery counters since startup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ForwarderStats {
    /// Events accepted by a webhook.
    pub delivered: u64,
    /// Events a webhook rejected or that could not be sent.
    pub failed: u64,
    /// Events with no configured destination.
    pub dropped: u64,
}

#[derive(Debug, Default)]
struct Counters {
    delivered: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
}

/// Posts events to their webhooks.
///
/// Cheap to clone; clones share the HTTP client, counters and the set of
/// in-flight deliveries.
#[derive(Debug, Clone)]
pub struct Forwarder {
    client: reqwest::Client,
    routes: Arc<RoutingTable>,
    counters: Arc<Counters>,
    in_flight: TaskTracker,
    timeout: Duration,
}

impl Forwarder {
    /// Creates a forwarder whose POSTs time out after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(routes: RoutingTable, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            routes: Arc::new(routes),
            counters: Arc::default(),
            in_flight: TaskTracker::new(),
            timeout,
        })
    }

    /// Hands `event` off for delivery without waiting for it.
    pub fn dispatch(&self, event: InboundEvent) {
        let forwarder = self.clone();
        self.in_flight.spawn(async move {
            forwarder.forward(event).await;
        });
    }

    /// Waits for dispatched deliveries to finish, at most one POST timeout.
    ///
    /// Returns how many were still running when the wait gave up.
    pub async fn drain(&self) -> usize {
        self.in_flight.close();
        if tokio::time::timeout(self.timeout, self.in_flight.wait()).await.is_ok() {
            return 0;
        }
        let abandoned = self.in_flight.len();
        log::warn!("[Forwarder] Abandoning {} delivery(ies) still in flight", abandoned);
        abandoned
    }

    /// Makes a single delivery attempt for `event`.
    pub async fn forward(&self, event: InboundEvent) -> ForwardOutcome {
        let Some(url) = self.routes.resolve(&event.name) else {
            self.counters.dropped.fetch_add(1, Ordering::Relaxed);
            log::info!(
                "[Forwarder] No destination for {} from {} hub, dropping",
                event.name,
                event.hub
            );
            return ForwardOutcome::NoRoute;
        };

        let body = json!({ "type": event.name, "data": event.payload });

        let outcome = match self.client.post(url).json(&body).send().await {
            Ok(response) if response.status().is_success() => ForwardOutcome::Delivered {
                status: response.status().as_u16(),
            },
            Ok(response) => {
                let status = response.status().as_u16();
                let body = response.text().await.unwrap_or_default();
                ForwardOutcome::Rejected {
                    status,
                    body: truncate(&body, constants::LOGGED_BODY_LIMIT),
                }
            }
            Err(e) => ForwardOutcome::Failed {
                reason: e.to_string(),
            },
        };

        match &outcome {
            ForwardOutcome::Delivered { status } => {
                self.counters.delivered.fetch_add(1, Ordering::Relaxed);
                log::debug!("[Forwarder] {} delivered ({})", event.name, status);
            }
            ForwardOutcome::Rejected { status, body } => {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                log::warn!("[Forwarder] {} rejected with HTTP {}: {}", event.name, status, body);
            }
            ForwardOutcome::Failed { reason } => {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                log::warn!("[Forwarder] {} not delivered: {}", event.name, reason);
            }
            ForwardOutcome::NoRoute => {}
        }

        outcome
    }

    /// Current delivery counters.
    #[must_use]
    pub fn stats(&self) -> ForwarderStats {
        ForwarderStats {
            delivered: self.counters.delivered.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
        }
    }
}

fn truncate(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let mut short: String = text.chars().take(limit).collect();
    short.push_str("...");
    short
}
