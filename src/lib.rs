//! Hubbridge - real-time gateway hubs to HTTP webhooks.
//!
//! Keeps one long-lived streaming session per gateway hub, re-declares
//! subscriptions every time a session becomes ready, and forwards every
//! pushed event to the webhook configured for its classification. The
//! bearer credential is rotated at runtime through a small control endpoint.
//!
//! # Architecture
//!
//! ```text
//!   Control ──► CredentialStore ──rotation──► Session (user)   ──┐
//!   endpoint                                  Session (market) ──┤
//!                                                 │              │ events
//!                                         Registrar (on Ready)   ▼
//!                                                            Forwarder ──► webhooks
//! ```
//!
//! # Modules
//!
//! - [`session`] - per-hub connection state machine and backoff
//! - [`registrar`] - subscription calls issued on every ready transition
//! - [`forwarder`] - best-effort webhook delivery
//! - [`credentials`] - the rotating credential
//! - [`signalr`] - streaming client for the gateway
//! - [`bridge`] / [`control`] - orchestration and the HTTP control surface

// Rust guideline compliant 2026-02

pub mod bridge;
pub mod config;
pub mod constants;
pub mod control;
pub mod credentials;
pub mod error;
pub mod forwarder;
pub mod hub;
pub mod registrar;
pub mod session;
pub mod signalr;
pub mod transport;

// Re-export commonly used types
pub use bridge::{Bridge, HealthReport, HealthStatus};
pub use config::Config;
pub use credentials::{Credential, CredentialStore};
pub use forwarder::{Forwarder, ForwardOutcome, InboundEvent, RoutingTable};
pub use hub::{EventClass, HubKind};
pub use registrar::{ActivationReport, Registrar, SubscriptionParams};
pub use session::{Backoff, Session, SessionHandle, SessionState, SessionStatus};
pub use signalr::SignalRConnector;
pub use transport::{Connector, Link, LinkEvent, LinkHandle, TransportError};
