// ABOUTME: Transport adapter abstraction plus the websocket implementation used in production.
// ABOUTME: Each open() yields a fresh session and an ordered stream of inbound text frames.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use slackbot_core::ClientError;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

/// Buffered inbound frames per connection before the reader applies backpressure
const FRAME_BUFFER: usize = 256;

/// How long close() waits for the reader task to send its close frame
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// An open transport plus its inbound frames.
///
/// The frame receiver yields `None` once the remote side is gone.
pub struct TransportConnection {
    pub session: Box<dyn TransportSession>,
    pub frames: mpsc::Receiver<String>,
}

/// Opens message-framed connections.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn open(&self, url: &str) -> Result<TransportConnection, ClientError>;
}

/// A single open connection. Dropping it must release the underlying socket.
#[async_trait]
pub trait TransportSession: Send + Sync {
    async fn close(self: Box<Self>) -> Result<(), ClientError>;
}

// =============================================================================
// Websocket implementation
// =============================================================================

/// `Transport` over tokio-tungstenite.
#[derive(Debug, Clone, Default)]
pub struct WebSocketTransport;

impl WebSocketTransport {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn open(&self, url: &str) -> Result<TransportConnection, ClientError> {
        let (stream, _response) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(ClientError::transport)?;

        tracing::debug!(url = %url, "Websocket opened");

        let (tx, rx) = mpsc::channel(FRAME_BUFFER);
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(read_frames(stream, tx, shutdown.clone()));

        Ok(TransportConnection {
            session: Box::new(WebSocketSession {
                shutdown,
                task: Some(task),
            }),
            frames: rx,
        })
    }
}

struct WebSocketSession {
    shutdown: CancellationToken,
    task: Option<JoinHandle<()>>,
}

#[async_trait]
impl TransportSession for WebSocketSession {
    async fn close(mut self: Box<Self>) -> Result<(), ClientError> {
        self.shutdown.cancel();
        let Some(task) = self.task.take() else {
            return Ok(());
        };
        match tokio::time::timeout(CLOSE_TIMEOUT, task).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(ClientError::transport(e)),
            Err(_) => Err(ClientError::Transport(
                "timed out waiting for websocket to close".to_string(),
            )),
        }
    }
}

impl Drop for WebSocketSession {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Forward text frames to `tx` until the socket ends or `shutdown` fires.
async fn read_frames(
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    tx: mpsc::Sender<String>,
    shutdown: CancellationToken,
) {
    let (mut write, mut read) = stream.split();

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                let _ = write.send(WsMessage::Close(None)).await;
                tracing::debug!("Websocket closed locally");
                break;
            }
            frame = read.next() => match frame {
                Some(Ok(WsMessage::Text(text))) => {
                    if tx.send(text.to_string()).await.is_err() {
                        break;
                    }
                }
                Some(Ok(WsMessage::Ping(data))) => {
                    if write.send(WsMessage::Pong(data)).await.is_err() {
                        break;
                    }
                }
                Some(Ok(WsMessage::Close(frame))) => {
                    tracing::debug!(frame = ?frame, "Websocket closed by server");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "Websocket read failed");
                    break;
                }
                None => break,
            }
        }
    }
}
