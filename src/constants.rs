//! Application-wide constants for hubbridge.
//!
//! This module centralizes the timeouts, intervals and protocol names used by
//! the sessions, the streaming client and the control endpoint.
//!
//! # Categories
//!
//! - **Reconnection**: backoff floor, ceiling and jitter
//! - **Streaming**: handshake, keep-alive and invocation timeouts
//! - **Delivery**: webhook POST timeout
//! - **Control**: listening defaults and header names

// Rust guideline compliant 2026-02

use std::time::Duration;

// ============================================================================
// Reconnection
// ============================================================================

/// Delay before the first reconnection attempt after a transport failure.
pub const RECONNECT_INITIAL_DELAY: Duration = Duration::from_secs(1);

/// Upper bound on any reconnection delay.
///
/// Reconnection never gives up; once the delay reaches this ceiling every
/// further attempt waits exactly this long (plus bounded jitter).
pub const RECONNECT_MAX_DELAY: Duration = Duration::from_secs(30);

/// Maximum random jitter added to a reconnection delay.
///
/// The jittered delay is still clamped to [`RECONNECT_MAX_DELAY`].
pub const RECONNECT_MAX_JITTER: Duration = Duration::from_millis(1000);

// ============================================================================
// Streaming
// ============================================================================

/// Bound on opening a hub connection: TCP/TLS, the WebSocket upgrade and the
/// hub protocol handshake together.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// How long a remote call may wait for its completion frame.
pub const INVOCATION_TIMEOUT: Duration = Duration::from_secs(10);

/// Interval between client keep-alive pings.
pub const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(10);

/// A connection that has received nothing for this long is treated as broken.
pub const SERVER_TIMEOUT: Duration = Duration::from_secs(30);

/// Grace period for closing a transport during rotation or shutdown.
pub const CLOSE_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Buffered inbound events per connection before backpressure.
pub const EVENT_BUFFER: usize = 1024;

/// Default base URL of the gateway hubs.
pub const DEFAULT_HUB_URL: &str = "https://rtc.topstepx.com/hubs";

// ============================================================================
// Delivery
// ============================================================================

/// Timeout for a single webhook delivery attempt.
pub const FORWARD_TIMEOUT: Duration = Duration::from_secs(15);

/// Response bodies longer than this are truncated in delivery failure logs.
pub const LOGGED_BODY_LIMIT: usize = 512;

// ============================================================================
// Control
// ============================================================================

/// Default port of the control endpoint.
pub const DEFAULT_PORT: u16 = 8000;

/// Default bind address of the control endpoint.
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0";

/// Header carrying the optional shared secret on `POST /update-token`.
pub const CONTROL_SECRET_HEADER: &str = "x-control-secret";
