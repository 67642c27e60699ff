//! SignalR hub connection.
//!
//! [`SignalRConnector`] opens one WebSocket per hub (negotiation skipped, the
//! credential travels as `access_token` in the query string), performs the
//! JSON protocol handshake and spawns a background I/O task that owns the
//! socket for the rest of the connection's life.
//!
//! # Architecture
//!
//! ```text
//!   SignalRHandle ──Command──►  I/O task  ◄──frames── WebSocket
//!     invoke()                   │  pending invocations (id → reply)
//!     close()                    │  keep-alive ping / server timeout
//!                                └──LinkEvent──► Session
//! ```
//!
//! The task ends when the server closes, the socket errors, nothing arrives
//! for [`SERVER_TIMEOUT`](crate::constants::SERVER_TIMEOUT), or the handle
//! is closed. Outstanding invocations then fail with
//! [`TransportError::Closed`] and a final [`LinkEvent::Closed`] is emitted.

// Rust guideline compliant 2026-02

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::protocol::{self, HubMessage};
use super::socket::{self, WsFrame, WsReader, WsWriter};
use crate::constants;
use crate::credentials::Credential;
use crate::hub::HubKind;
use crate::transport::{Connector, Link, LinkEvent, LinkHandle, TransportError};

type Reply = oneshot::Sender<Result<Value, TransportError>>;

/// Request from a handle to the I/O task.
#[derive(Debug)]
enum Command {
    /// Send an invocation frame and route its completion to `reply`.
    Invoke {
        invocation_id: String,
        frame: String,
        reply: Reply,
    },
    /// The caller stopped waiting for this invocation.
    Forget { invocation_id: String },
}

/// Connects sessions to the gateway's SignalR hubs.
#[derive(Debug, Clone)]
pub struct SignalRConnector {
    base_url: String,
    handshake_timeout: Duration,
    invocation_timeout: Duration,
    keep_alive: Duration,
    server_timeout: Duration,
    close_grace: Duration,
}

impl SignalRConnector {
    /// Creates a connector for hubs under `base_url`
    /// (e.g. `https://rtc.topstepx.com/hubs`).
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            handshake_timeout: constants::HANDSHAKE_TIMEOUT,
            invocation_timeout: constants::INVOCATION_TIMEOUT,
            keep_alive: constants::KEEP_ALIVE_INTERVAL,
            server_timeout: constants::SERVER_TIMEOUT,
            close_grace: constants::CLOSE_GRACE_PERIOD,
        }
    }

    /// Overrides the keep-alive interval and the silence after which the
    /// connection is considered broken.
    #[must_use]
    pub fn keep_alive(mut self, interval: Duration, server_timeout: Duration) -> Self {
        self.keep_alive = interval;
        self.server_timeout = server_timeout;
        self
    }

    /// Overrides the handshake and remote call timeouts.
    #[must_use]
    pub fn timeouts(mut self, handshake: Duration, invocation: Duration) -> Self {
        self.handshake_timeout = handshake;
        self.invocation_timeout = invocation;
        self
    }

    /// Builds the WebSocket URL for `hub`, carrying `credential`.
    pub fn hub_url(&self, hub: HubKind, credential: &Credential) -> Result<url::Url, TransportError> {
        let base = socket::http_to_ws_scheme(self.base_url.trim_end_matches('/'));
        let mut url = url::Url::parse(&format!("{}/{}", base, hub.path()))
            .map_err(|e| TransportError::Connect(format!("invalid hub URL: {e}")))?;
        url.query_pairs_mut()
            .append_pair("access_token", credential.expose());
        Ok(url)
    }
}

#[async_trait]
impl Connector for SignalRConnector {
    async fn connect(&self, hub: HubKind, credential: &Credential) -> Result<Link, TransportError> {
        let url = self.hub_url(hub, credential)?;
        log::info!("[SignalR:{}] Connecting to {}", hub, socket::redact(&url));

        // A peer that accepts TCP but never answers the upgrade must not
        // hold the session in Connecting.
        let (writer, reader, leftover) = tokio::time::timeout(self.handshake_timeout, open(&url))
            .await
            .map_err(|_elapsed| TransportError::Timeout("connect"))??;

        log::debug!("[SignalR:{}] Handshake complete", hub);

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::channel(constants::EVENT_BUFFER);
        let cancel = CancellationToken::new();

        let io = IoLoop {
            hub,
            writer,
            reader,
            commands: command_rx,
            events: event_tx,
            cancel: cancel.clone(),
            pending: HashMap::new(),
            keep_alive: self.keep_alive,
            server_timeout: self.server_timeout,
        };
        let task = tokio::spawn(io.run(leftover));

        let handle = SignalRHandle {
            hub,
            commands: command_tx,
            next_id: AtomicU64::new(1),
            invocation_timeout: self.invocation_timeout,
            close_grace: self.close_grace,
            cancel,
            task: Mutex::new(Some(task)),
        };

        Ok(Link {
            handle: Arc::new(handle),
            events: event_rx,
        })
    }
}

/// Upgrade to WebSocket and complete the protocol handshake.
async fn open(url: &url::Url) -> Result<(WsWriter, WsReader, Vec<String>), TransportError> {
    let (mut writer, mut reader) = socket::connect(url).await?;
    writer.send_text(&protocol::handshake_request()).await?;
    let leftover = await_handshake(&mut writer, &mut reader).await?;
    Ok((writer, reader, leftover))
}

/// Wait for the handshake response, returning any frames that arrived in
/// the same message after it.
async fn await_handshake(
    writer: &mut WsWriter,
    reader: &mut WsReader,
) -> Result<Vec<String>, TransportError> {
    while let Some(frame) = reader.recv().await {
        match frame? {
            WsFrame::Text(text) => {
                let mut frames = protocol::split_frames(&text);
                let Some(response) = frames.next() else {
                    continue;
                };
                protocol::parse_handshake_response(response).map_err(TransportError::Handshake)?;
                return Ok(frames.map(ToString::to_string).collect());
            }
            WsFrame::Ping(data) => writer.send_pong(data).await?,
            WsFrame::Close { code, reason } => {
                return Err(TransportError::Handshake(format!(
                    "closed during handshake ({code}: {reason})"
                )));
            }
            WsFrame::Ignored => {}
        }
    }
    Err(TransportError::Closed)
}

/// Handle onto a live hub connection.
#[derive(Debug)]
struct SignalRHandle {
    hub: HubKind,
    commands: mpsc::UnboundedSender<Command>,
    next_id: AtomicU64,
    invocation_timeout: Duration,
    close_grace: Duration,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

#[async_trait]
impl LinkHandle for SignalRHandle {
    async fn invoke(&self, method: &str, arguments: Vec<Value>) -> Result<Value, TransportError> {
        let invocation_id = self.next_id.fetch_add(1, Ordering::Relaxed).to_string();
        let frame = protocol::encode_invocation(&invocation_id, method, &arguments);
        let (reply, response) = oneshot::channel();

        self.commands
            .send(Command::Invoke {
                invocation_id: invocation_id.clone(),
                frame,
                reply,
            })
            .map_err(|_closed| TransportError::Closed)?;

        match tokio::time::timeout(self.invocation_timeout, response).await {
            Ok(Ok(result)) => result,
            Ok(Err(_dropped)) => Err(TransportError::Closed),
            Err(_elapsed) => {
                let _ = self.commands.send(Command::Forget { invocation_id });
                Err(TransportError::Timeout("remote call"))
            }
        }
    }

    async fn close(&self) {
        self.cancel.cancel();
        let Some(mut task) = self.task.lock().await.take() else {
            return;
        };
        if tokio::time::timeout(self.close_grace, &mut task).await.is_err() {
            log::warn!(
                "[SignalR:{}] Close did not finish within {}s, aborting",
                self.hub,
                self.close_grace.as_secs()
            );
            task.abort();
        }
    }
}

impl Drop for SignalRHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// State owned by the background I/O task.
struct IoLoop {
    hub: HubKind,
    writer: WsWriter,
    reader: WsReader,
    commands: mpsc::UnboundedReceiver<Command>,
    events: mpsc::Sender<LinkEvent>,
    cancel: CancellationToken,
    pending: HashMap<String, Reply>,
    keep_alive: Duration,
    server_timeout: Duration,
}

impl IoLoop {
    async fn run(mut self, leftover: Vec<String>) {
        let reason = self.drive(leftover).await;
        log::info!("[SignalR:{}] Connection ended: {}", self.hub, reason);

        for (_, reply) in self.pending.drain() {
            let _ = reply.send(Err(TransportError::Closed));
        }
        // The session may be busy tearing down; never block on it here.
        let _ = self.events.try_send(LinkEvent::Closed { reason });
    }

    /// Pump frames until the connection ends. Returns the reason.
    async fn drive(&mut self, leftover: Vec<String>) -> String {
        for frame in &leftover {
            if let Some(reason) = self.dispatch(frame).await {
                return reason;
            }
        }

        let mut last_seen = Instant::now();
        let mut ping = tokio::time::interval_at(Instant::now() + self.keep_alive, self.keep_alive);
        ping.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    let _ = self.writer.send_text(&protocol::encode_close()).await;
                    let _ = self.writer.close().await;
                    return "closed by client".to_string();
                }

                frame = self.reader.recv() => {
                    last_seen = Instant::now();
                    match frame {
                        Some(Ok(WsFrame::Text(text))) => {
                            for frame in protocol::split_frames(&text) {
                                if let Some(reason) = self.dispatch(frame).await {
                                    return reason;
                                }
                            }
                        }
                        Some(Ok(WsFrame::Ping(data))) => {
                            if let Err(e) = self.writer.send_pong(data).await {
                                return e.to_string();
                            }
                        }
                        Some(Ok(WsFrame::Close { code, reason })) => {
                            return format!("server closed WebSocket ({code}: {reason})");
                        }
                        Some(Ok(WsFrame::Ignored)) => {}
                        Some(Err(e)) => return e.to_string(),
                        None => return "WebSocket stream ended".to_string(),
                    }
                }

                Some(command) = self.commands.recv() => {
                    match command {
                        Command::Invoke { invocation_id, frame, reply } => {
                            if let Err(e) = self.writer.send_text(&frame).await {
                                let _ = reply.send(Err(TransportError::Closed));
                                return e.to_string();
                            }
                            self.pending.insert(invocation_id, reply);
                        }
                        Command::Forget { invocation_id } => {
                            self.pending.remove(&invocation_id);
                        }
                    }
                }

                _ = ping.tick() => {
                    if last_seen.elapsed() >= self.server_timeout {
                        return format!(
                            "no frames from server for {}s",
                            last_seen.elapsed().as_secs()
                        );
                    }
                    if let Err(e) = self.writer.send_text(&protocol::encode_ping()).await {
                        return e.to_string();
                    }
                }
            }
        }
    }

    /// Act on one decoded frame. Returns a reason when the connection must end.
    async fn dispatch(&mut self, frame: &str) -> Option<String> {
        let message = match protocol::parse_message(frame) {
            Ok(message) => message,
            Err(e) => {
                log::warn!("[SignalR:{}] Ignoring frame: {}", self.hub, e);
                return None;
            }
        };

        match message {
            HubMessage::Invocation { target, arguments, .. } => {
                let event = LinkEvent::Invocation { target, arguments };
                // A full buffer must not keep close() waiting.
                tokio::select! {
                    biased;
                    () = self.cancel.cancelled() => return Some("closed by client".to_string()),
                    sent = self.events.send(event) => {
                        if sent.is_err() {
                            return Some("event receiver dropped".to_string());
                        }
                    }
                }
            }
            HubMessage::Completion { invocation_id, result, error } => {
                match self.pending.remove(&invocation_id) {
                    Some(reply) => {
                        let outcome = match error {
                            Some(error) => Err(TransportError::Invocation(error)),
                            None => Ok(result.unwrap_or(Value::Null)),
                        };
                        let _ = reply.send(outcome);
                    }
                    None => log::debug!(
                        "[SignalR:{}] Completion for unknown invocation {}",
                        self.hub,
                        invocation_id
                    ),
                }
            }
            HubMessage::Ping => {}
            HubMessage::Close { error, allow_reconnect } => {
                return Some(format!(
                    "server closed hub connection: {} (reconnect allowed: {})",
                    error.as_deref().unwrap_or("no reason given"),
                    allow_reconnect
                ));
            }
            HubMessage::Other(kind) => {
                log::trace!("[SignalR:{}] Unhandled frame type {}", self.hub, kind);
            }
        }
        None
    }
}
