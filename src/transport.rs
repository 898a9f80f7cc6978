//! The connector capability and the production websocket transport.
//!
//! A [`Connector`] dials one relay and hands back a [`Connection`]: a pair of
//! channels carrying decoded wire frames. The transport owns the socket and
//! its IO tasks; when either direction shuts down the channels close, which
//! is the session's disconnect signal.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use tracing::{debug, trace, warn};
use url::Url;

use crate::{
    defaults::{DIAL_TIMEOUT, WIRE_CHANNEL_CAP},
    proto::{ClientFrame, RelayFrame},
};

/// An established connection to one relay.
#[derive(Debug)]
pub struct Connection {
    /// Frames to write to the relay.
    pub outbound: mpsc::Sender<ClientFrame>,
    /// Frames read from the relay. `None` means the connection is gone.
    pub inbound: mpsc::Receiver<RelayFrame>,
}

/// Failure to establish a connection.
#[derive(Debug, thiserror::Error)]
pub enum DialError {
    /// The relay could not be reached.
    #[error("relay unreachable: {0}")]
    Unreachable(String),
    /// The websocket handshake or transport failed.
    #[error("websocket error: {0}")]
    Websocket(String),
    /// The dial did not complete within the dial timeout.
    #[error("dial timed out")]
    Timeout,
}

/// Capability to open a connection to a relay address.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Dials the relay at `url`.
    async fn dial(&self, url: &Url) -> Result<Connection, DialError>;
}

/// Websocket transport speaking JSON text frames.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn dial(&self, url: &Url) -> Result<Connection, DialError> {
        let (ws, _response) = tokio::time::timeout(DIAL_TIMEOUT, connect_async(url.as_str()))
            .await
            .map_err(|_| DialError::Timeout)?
            .map_err(|err| DialError::Websocket(err.to_string()))?;
        debug!(%url, "websocket connected");

        let (mut sink, mut stream) = ws.split();
        let (outbound, mut outbound_rx) = mpsc::channel::<ClientFrame>(WIRE_CHANNEL_CAP);
        let (inbound_tx, inbound) = mpsc::channel::<RelayFrame>(WIRE_CHANNEL_CAP);

        // Writer: drains the outbound channel into the socket. Ends when the
        // session drops its sender or the socket errors.
        let writer_url = url.clone();
        tokio::spawn(async move {
            while let Some(frame) = outbound_rx.recv().await {
                if let Err(err) = sink.send(Message::Text(frame.to_json())).await {
                    warn!(url = %writer_url, "websocket send failed: {err}");
                    break;
                }
            }
            let _ = sink.close().await;
        });

        // Reader: decodes text frames into the inbound channel. Dropping
        // `inbound_tx` at the end closes the channel and signals disconnect.
        let reader_url = url.clone();
        tokio::spawn(async move {
            while let Some(message) = stream.next().await {
                let message = match message {
                    Ok(message) => message,
                    Err(err) => {
                        warn!(url = %reader_url, "websocket read failed: {err}");
                        break;
                    }
                };
                match message {
                    Message::Text(text) => match RelayFrame::from_json(&text) {
                        Ok(frame) => {
                            if inbound_tx.send(frame).await.is_err() {
                                break;
                            }
                        }
                        Err(err) => trace!(url = %reader_url, "ignoring frame: {err}"),
                    },
                    Message::Close(_) => break,
                    // Pings are answered by tungstenite itself.
                    _ => {}
                }
            }
            debug!(url = %reader_url, "websocket closed");
        });

        Ok(Connection { outbound, inbound })
    }
}
