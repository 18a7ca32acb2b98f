//! Transport seam between the link actor and the network.
//!
//! A [`Connector`] turns an address into a [`Connection`]: a pair of
//! channels carrying decoded frames. The production connector speaks JSON
//! over WebSocket; tests plug in an in-memory server.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use mcsw_protocol::{ClientFrame, ServerFrame};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, trace, warn};

/// Errors establishing a transport.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// The address can never work (bad scheme, empty, ...).
    #[error("invalid address {address}: {reason}")]
    InvalidAddress { address: String, reason: String },

    /// The attempt failed; a later attempt may succeed.
    #[error("failed to connect to {address}: {reason}")]
    Connect { address: String, reason: String },

    #[error("connect attempt timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
}

/// What the transport reports back to the link.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportSignal {
    Frame(ServerFrame),
    /// The transport is gone (closed by either side or errored).
    Closed { reason: String },
}

/// An open transport.
///
/// Dropping `outbound` asks the transport to close.
#[derive(Debug)]
pub struct Connection {
    pub outbound: mpsc::UnboundedSender<ClientFrame>,
    pub inbound: mpsc::UnboundedReceiver<TransportSignal>,
}

/// Establishes transports to the media control server.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Opens a transport. Resolving `Ok` means the transport is open.
    async fn connect(&self, address: &str) -> Result<Connection, TransportError>;
}

/// JSON-over-WebSocket connector.
#[derive(Debug, Default, Clone, Copy)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, address: &str) -> Result<Connection, TransportError> {
        validate_address(address)?;

        let (ws, _response) = connect_async(address)
            .await
            .map_err(|e| TransportError::Connect {
                address: address.to_string(),
                reason: e.to_string(),
            })?;

        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        tokio::spawn(pump(ws, out_rx, in_tx));

        Ok(Connection {
            outbound: out_tx,
            inbound: in_rx,
        })
    }
}

/// Checks that `address` is a WebSocket URL.
pub fn validate_address(address: &str) -> Result<(), TransportError> {
    let invalid = |reason: &str| TransportError::InvalidAddress {
        address: address.to_string(),
        reason: reason.to_string(),
    };

    let rest = address
        .strip_prefix("ws://")
        .or_else(|| address.strip_prefix("wss://"))
        .ok_or_else(|| invalid("expected a ws:// or wss:// URL"))?;
    if rest.is_empty() || rest.starts_with('/') {
        return Err(invalid("missing host"));
    }
    Ok(())
}

type WsStream = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

/// Moves frames between the socket and the link until either side ends.
async fn pump(
    ws: WsStream,
    mut out_rx: mpsc::UnboundedReceiver<ClientFrame>,
    in_tx: mpsc::UnboundedSender<TransportSignal>,
) {
    let (mut ws_tx, mut ws_rx) = ws.split();

    let reason = loop {
        tokio::select! {
            frame = out_rx.recv() => {
                let Some(frame) = frame else {
                    let _ = ws_tx.close().await;
                    break "closed locally".to_string();
                };
                let text = match serde_json::to_string(&frame) {
                    Ok(text) => text,
                    Err(e) => {
                        warn!(error = %e, "Failed to encode frame, dropping it");
                        continue;
                    }
                };
                trace!(frame = %text, "Sending frame");
                if let Err(e) = ws_tx.send(Message::Text(text.into())).await {
                    break format!("send failed: {e}");
                }
            }
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ServerFrame>(text.as_str()) {
                            Ok(frame) => {
                                if in_tx.send(TransportSignal::Frame(frame)).is_err() {
                                    break "link dropped".to_string();
                                }
                            }
                            Err(e) => {
                                warn!(error = %e, "Ignoring undecodable frame");
                            }
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        break format!("closed by server: {frame:?}");
                    }
                    Some(Ok(_)) => {
                        // Ping/pong and binary frames carry nothing for us
                    }
                    Some(Err(e)) => break format!("receive failed: {e}"),
                    None => break "stream ended".to_string(),
                }
            }
        }
    };

    debug!(reason = %reason, "Transport closed");
    let _ = in_tx.send(TransportSignal::Closed { reason });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_address() {
        assert!(validate_address("ws://127.0.0.1:8020/mcs").is_ok());
        assert!(validate_address("wss://mcs.example.org").is_ok());
    }

    #[test]
    fn test_validate_address_rejects() {
        for bad in ["", "http://localhost", "ws://", "ws:///path", "127.0.0.1:8020"] {
            let err = validate_address(bad).unwrap_err();
            assert!(
                matches!(err, TransportError::InvalidAddress { .. }),
                "{bad} should be invalid"
            );
        }
    }

    #[tokio::test]
    async fn test_ws_connector_invalid_address_fails_fast() {
        let result = WsConnector.connect("not-a-url").await;
        assert!(matches!(result, Err(TransportError::InvalidAddress { .. })));
    }

    #[tokio::test]
    async fn test_ws_connector_refused() {
        // Port 9 on localhost is not expected to accept WebSocket upgrades.
        let result = WsConnector.connect("ws://127.0.0.1:9/").await;
        assert!(matches!(result, Err(TransportError::Connect { .. })));
    }
}
