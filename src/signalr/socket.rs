//! WebSocket transport for hub connections.
//!
//! Thin wrapper around `tokio-tungstenite` providing type-isolated
//! reader/writer halves, so the connection I/O loop never touches
//! `tungstenite` types directly.
//!
//! Hub URLs carry the credential in their query string. Nothing in this
//! module formats a full URL into an error or log line; use [`redact`].

// Rust guideline compliant 2026-02

use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite;

use crate::transport::TransportError;

/// Concrete WebSocket stream type (avoids repeating the generic everywhere).
type WsStream = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

/// Received WebSocket frame.
#[derive(Debug)]
pub enum WsFrame {
    /// UTF-8 text frame (hub protocol traffic).
    Text(String),
    /// Ping frame with payload.
    Ping(Vec<u8>),
    /// Close frame with status code and reason.
    Close {
        /// WebSocket close code (1000 = normal, 1005 = no code).
        code: u16,
        /// Human-readable close reason.
        reason: String,
    },
    /// Binary or pong frame; the JSON hub protocol never needs these.
    Ignored,
}

/// Write half of a WebSocket connection.
#[derive(Debug)]
pub struct WsWriter {
    sink: futures_util::stream::SplitSink<WsStream, tungstenite::Message>,
}

impl WsWriter {
    /// Send a UTF-8 text frame.
    pub async fn send_text(&mut self, text: &str) -> Result<(), TransportError> {
        self.sink
            .send(tungstenite::Message::Text(text.to_string()))
            .await
            .map_err(|e| TransportError::Connect(format!("send failed: {e}")))
    }

    /// Send a pong frame in response to a ping.
    pub async fn send_pong(&mut self, data: Vec<u8>) -> Result<(), TransportError> {
        self.sink
            .send(tungstenite::Message::Pong(data))
            .await
            .map_err(|e| TransportError::Connect(format!("pong failed: {e}")))
    }

    /// Send a close frame, flush and close the sink.
    pub async fn close(&mut self) -> Result<(), TransportError> {
        self.sink
            .close()
            .await
            .map_err(|e| TransportError::Connect(format!("close failed: {e}")))
    }
}

/// Read half of a WebSocket connection.
#[derive(Debug)]
pub struct WsReader {
    stream: futures_util::stream::SplitStream<WsStream>,
}

impl WsReader {
    /// Receive the next frame, returning `None` when the stream ends.
    pub async fn recv(&mut self) -> Option<Result<WsFrame, TransportError>> {
        let frame = match self.stream.next().await? {
            Ok(tungstenite::Message::Text(text)) => WsFrame::Text(text),
            Ok(tungstenite::Message::Ping(data)) => WsFrame::Ping(data),
            Ok(tungstenite::Message::Close(close_frame)) => {
                let (code, reason) = close_frame
                    .map(|cf| (cf.code.into(), cf.reason.to_string()))
                    .unwrap_or((1005, String::new()));
                WsFrame::Close { code, reason }
            }
            Ok(_) => WsFrame::Ignored,
            Err(e) => return Some(Err(TransportError::Connect(format!("read failed: {e}")))),
        };
        Some(Ok(frame))
    }
}

/// Connect to a hub WebSocket URL.
///
/// An HTTP error status on the upgrade (e.g. 401 for an expired credential)
/// is reported as [`TransportError::Rejected`].
pub async fn connect(url: &url::Url) -> Result<(WsWriter, WsReader), TransportError> {
    let (ws_stream, _response) = match tokio_tungstenite::connect_async(url.as_str()).await {
        Ok(pair) => pair,
        Err(tungstenite::Error::Http(response)) => {
            return Err(TransportError::Rejected {
                status: response.status().as_u16(),
            });
        }
        Err(e) => {
            return Err(TransportError::Connect(format!(
                "WebSocket connect to {} failed: {}",
                redact(url),
                e
            )));
        }
    };

    let (sink, stream) = ws_stream.split();

    Ok((WsWriter { sink }, WsReader { stream }))
}

/// Convert an HTTP(S) URL to WS(S) scheme.
///
/// Passes `ws://` and `wss://` through unchanged.
#[must_use]
pub fn http_to_ws_scheme(url: &str) -> String {
    if url.starts_with("wss://") || url.starts_with("ws://") {
        url.to_string()
    } else {
        url.replacen("https://", "wss://", 1)
            .replacen("http://", "ws://", 1)
    }
}

/// Render a URL without its query string or userinfo.
#[must_use]
pub fn redact(url: &url::Url) -> String {
    let mut shown = url.clone();
    shown.set_query(None);
    let _ = shown.set_username("");
    let _ = shown.set_password(None);
    if url.query().is_some() {
        format!("{shown}?<redacted>")
    } else {
        shown.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_to_ws_scheme_https() {
        assert_eq!(
            http_to_ws_scheme("https://rtc.example.com/hubs"),
            "wss://rtc.example.com/hubs"
        );
    }

    #[test]
    fn test_http_to_ws_scheme_http() {
        assert_eq!(
            http_to_ws_scheme("http://localhost:5000/hubs"),
            "ws://localhost:5000/hubs"
        );
    }

    #[test]
    fn test_http_to_ws_scheme_passthrough() {
        assert_eq!(
            http_to_ws_scheme("wss://rtc.example.com/hubs/user"),
            "wss://rtc.example.com/hubs/user"
        );
    }

    #[test]
    fn test_redact_hides_access_token() {
        let url = url::Url::parse("wss://rtc.example.com/hubs/user?access_token=abc.def.ghi").unwrap();
        let shown = redact(&url);
        assert_eq!(shown, "wss://rtc.example.com/hubs/user?<redacted>");
        assert!(!shown.contains("abc.def.ghi"));
    }

    #[test]
    fn test_redact_without_query() {
        let url = url::Url::parse("wss://rtc.example.com/hubs/market").unwrap();
        assert_eq!(redact(&url), "wss://rtc.example.com/hubs/market");
    }

    #[tokio::test]
    async fn test_connect_unreachable_host_returns_error() {
        let url = url::Url::parse("ws://127.0.0.1:1/hubs/user?access_token=secret").unwrap();
        let err = connect(&url).await.unwrap_err();
        assert!(matches!(err, TransportError::Connect(_)));
        assert!(!err.to_string().contains("secret"));
    }
}
