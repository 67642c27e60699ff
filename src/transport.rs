//! Transport seam between a session and a concrete streaming client.
//!
//! A [`Connector`] establishes one authenticated connection to a hub and
//! hands back a [`Link`]: a shared [`LinkHandle`] for remote calls and a
//! receiver of [`LinkEvent`]s. The session owns the link exclusively; other
//! components only ever see a cloned handle for the duration of a
//! subscription pass.
//!
//! ```text
//!   Session ──connect(hub, credential)──► Connector
//!      │                                     │
//!      │◄──────────── Link ──────────────────┘
//!      │   ├── handle: Arc<dyn LinkHandle>   invoke(), close()
//!      │   └── events: Receiver<LinkEvent>   Invocation / Reconnected / Closed
//! ```

// Rust guideline compliant 2026-02

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::credentials::Credential;
use crate::hub::HubKind;

/// Errors raised by a streaming transport.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    /// The connection could not be established (DNS, TCP, TLS, URL).
    #[error("connection failed: {0}")]
    Connect(String),
    /// The gateway answered the upgrade request with an HTTP error status.
    #[error("gateway rejected connection with HTTP {status}")]
    Rejected {
        /// HTTP status returned by the gateway.
        status: u16,
    },
    /// The hub protocol handshake failed.
    #[error("handshake failed: {0}")]
    Handshake(String),
    /// An operation did not complete in time.
    #[error("{0} timed out")]
    Timeout(&'static str),
    /// The connection is gone.
    #[error("connection closed")]
    Closed,
    /// The hub answered a remote call with an error.
    #[error("remote call failed: {0}")]
    Invocation(String),
}

impl TransportError {
    /// Whether the gateway refused the credential.
    ///
    /// The gateway only reports credential expiry this way.
    #[must_use]
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Self::Rejected { status: 401 | 403 })
    }
}

/// Something that happened on an established link.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    /// The hub pushed a named event.
    Invocation {
        /// Event name.
        target: String,
        /// Opaque event arguments.
        arguments: Vec<serde_json::Value>,
    },
    /// The transport re-established itself in place.
    ///
    /// Treated exactly like reaching the ready state.
    Reconnected,
    /// The transport is gone.
    Closed {
        /// Why the transport closed, for logs and health.
        reason: String,
    },
}

/// Shared operations on an established link.
#[async_trait]
pub trait LinkHandle: Send + Sync + std::fmt::Debug {
    /// Invokes a remote method and waits for its completion.
    async fn invoke(
        &self,
        method: &str,
        arguments: Vec<serde_json::Value>,
    ) -> Result<serde_json::Value, TransportError>;

    /// Closes the link, waiting at most the configured grace period.
    async fn close(&self);
}

/// One established connection to a hub.
#[derive(Debug)]
pub struct Link {
    /// Remote call and close operations.
    pub handle: Arc<dyn LinkHandle>,
    /// Events pushed by the hub. Ends (or yields `Closed`) when the
    /// transport goes away.
    pub events: mpsc::Receiver<LinkEvent>,
}

/// Establishes links to hubs.
#[async_trait]
pub trait Connector: Send + Sync + std::fmt::Debug + 'static {
    /// Opens an authenticated connection to `hub` using `credential`.
    async fn connect(&self, hub: HubKind, credential: &Credential) -> Result<Link, TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_failure_detection() {
        assert!(TransportError::Rejected { status: 401 }.is_auth_failure());
        assert!(TransportError::Rejected { status: 403 }.is_auth_failure());
        assert!(!TransportError::Rejected { status: 503 }.is_auth_failure());
        assert!(!TransportError::Closed.is_auth_failure());
    }

    #[test]
    fn test_error_display() {
        assert_eq!(
            TransportError::Rejected { status: 401 }.to_string(),
            "gateway rejected connection with HTTP 401"
        );
        assert_eq!(TransportError::Timeout("handshake").to_string(), "handshake timed out");
    }
}
