//! Line-oriented TCP transport.
//!
//! Writes `LOGIN <username>` on connect, then treats every received line as
//! a message. EOF ends the session.

use std::sync::Arc;

use async_trait::async_trait;
use botfleet_core::TransportError;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{ConnectRequest, Connector, TransportEvent, TransportSession, TransportSink};

const EVENT_BUFFER: usize = 256;

/// [`Connector`] for plain newline-delimited TCP sessions.
#[derive(Clone, Debug, Default)]
pub struct TcpLineConnector;

impl TcpLineConnector {
    /// Create a connector.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for TcpLineConnector {
    async fn open(&self, request: &ConnectRequest) -> Result<TransportSession, TransportError> {
        let stream = TcpStream::connect((request.host.as_str(), request.port)).await?;
        let (read, write) = stream.into_split();
        let closed = CancellationToken::new();
        let sink = Arc::new(TcpLineSink {
            writer: Mutex::new(Some(write)),
            closed: closed.clone(),
        });
        sink.send(&format!("LOGIN {}", request.username)).await?;

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        drop(tokio::spawn(pump_lines(read, tx, closed)));
        Ok(TransportSession { events: rx, sink })
    }
}

async fn pump_lines(
    read: OwnedReadHalf,
    tx: mpsc::Sender<TransportEvent>,
    closed: CancellationToken,
) {
    if tx.send(TransportEvent::Connected).await.is_err() {
        return;
    }
    let mut lines = BufReader::new(read).lines();
    loop {
        let next = tokio::select! {
            () = closed.cancelled() => break,
            next = lines.next_line() => next,
        };
        let event = match next {
            Ok(Some(line)) => TransportEvent::Message(line),
            Ok(None) => {
                let _ = tx
                    .send(TransportEvent::Terminated("connection closed by remote".into()))
                    .await;
                break;
            }
            Err(e) => {
                let err = TransportError::from(e);
                if err.is_benign() {
                    TransportEvent::Error(err)
                } else {
                    let _ = tx.send(TransportEvent::Error(err.clone())).await;
                    let _ = tx.send(TransportEvent::Disconnected(err.message)).await;
                    break;
                }
            }
        };
        if tx.send(event).await.is_err() {
            break;
        }
    }
    debug!("tcp reader finished");
}

struct TcpLineSink {
    writer: Mutex<Option<OwnedWriteHalf>>,
    closed: CancellationToken,
}

#[async_trait]
impl TransportSink for TcpLineSink {
    async fn send(&self, message: &str) -> Result<(), TransportError> {
        let mut guard = self.writer.lock().await;
        let Some(writer) = guard.as_mut() else {
            return Err(TransportError::closed("session closed"));
        };
        let mut line = String::with_capacity(message.len() + 1);
        line.push_str(message);
        line.push('\n');
        writer.write_all(line.as_bytes()).await?;
        writer.flush().await?;
        Ok(())
    }

    async fn close(&self) {
        self.closed.cancel();
        if let Some(mut writer) = self.writer.lock().await.take() {
            let _ = writer.shutdown().await;
        }
    }
}

impl Drop for TcpLineSink {
    fn drop(&mut self) {
        self.closed.cancel();
    }
}
