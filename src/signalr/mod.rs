//! SignalR streaming client for the gateway hubs.
//!
//! - [`protocol`]: JSON hub protocol frames
//! - [`socket`]: WebSocket halves over `tokio-tungstenite`
//! - [`connection`]: the [`Connector`](crate::transport::Connector) implementation

// Rust guideline compliant 2026-02

pub mod connection;
pub mod protocol;
pub mod socket;

pub use connection::SignalRConnector;
