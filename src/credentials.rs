//! Credential store.
//!
//! Holds the current bearer credential for the gateway. Replacing it is a
//! single atomic swap that also wakes every session watching the store, so a
//! rotation is observed as one event no matter how many readers exist.
//!
//! Sessions read the credential lazily, at the start of each connection
//! attempt, and never keep a copy across attempts.

// Rust guideline compliant 2026-02

use std::sync::Arc;
use tokio::sync::watch;

/// An opaque bearer credential.
///
/// `Debug` never prints the value.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(Arc<str>);

impl Credential {
    /// Wraps a raw credential string.
    #[must_use]
    pub fn new(value: impl Into<Arc<str>>) -> Self {
        Self(value.into())
    }

    /// The raw credential, for embedding in a connection request.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Credential(<{} bytes>)", self.0.len())
    }
}

/// Shared holder of the current credential.
///
/// Cloning the store yields another handle onto the same value.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    tx: Arc<watch::Sender<Option<Credential>>>,
}

impl Default for CredentialStore {
    fn default() -> Self {
        Self::new(None)
    }
}

impl CredentialStore {
    /// Creates a store, optionally seeded with a credential.
    #[must_use]
    pub fn new(initial: Option<Credential>) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx: Arc::new(tx) }
    }

    /// Replaces the current credential and notifies every watcher.
    ///
    /// Setting the same value again still counts as a rotation.
    pub fn set(&self, credential: Credential) {
        self.tx.send_replace(Some(credential));
        log::info!(
            "[Credentials] Credential replaced, notifying {} session(s)",
            self.tx.receiver_count()
        );
    }

    /// Returns the current credential, or `None` if none was ever set.
    #[must_use]
    pub fn get(&self) -> Option<Credential> {
        self.tx.borrow().clone()
    }

    /// Whether a credential is currently present.
    #[must_use]
    pub fn is_present(&self) -> bool {
        self.tx.borrow().is_some()
    }

    /// Registers a new watcher.
    ///
    /// The returned receiver considers the current value already seen, so
    /// only subsequent replacements wake it.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<Option<Credential>> {
        self.tx.subscribe()
    }
}
