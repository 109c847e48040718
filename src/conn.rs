//! Connection transport
//!
//! Splits one WebSocket into an inbound stream of envelopes and a buffered
//! outbound sink, each pumped by its own task so a slow reader never stalls
//! writes and vice versa. The write task pings on a fixed period; the read
//! task gives up when nothing arrives from the peer within the pong window.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::time::{timeout, Instant};

use crate::config::ConnConfig;
use crate::protocol::Envelope;

/// Counter for generating unique connection IDs.
static NEXT_CONN_ID: AtomicU64 = AtomicU64::new(1);

/// Capacity of the inbound queue; the read task waits when it is full.
const INBOUND_QUEUE_SIZE: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnId(u64);

impl fmt::Display for ConnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConnError {
    #[error("connection closed")]
    Closed,

    #[error("outbound queue full")]
    QueueFull,

    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Sending half. Cheap to clone; every clone feeds the same queue.
#[derive(Clone)]
pub struct ConnSender {
    id: ConnId,
    tx: mpsc::Sender<String>,
    shutdown: Arc<watch::Sender<bool>>,
}

impl fmt::Debug for ConnSender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnSender").field("id", &self.id).finish()
    }
}

impl ConnSender {
    pub fn id(&self) -> ConnId {
        self.id
    }

    /// Queue a message without waiting. A full queue means the peer is not
    /// keeping up, and the connection is dropped.
    pub fn send<T: Serialize>(&self, msg: &T) -> Result<(), ConnError> {
        if self.is_closed() {
            return Err(ConnError::Closed);
        }
        let json = serde_json::to_string(msg)?;
        match self.tx.try_send(json) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(conn = %self.id, "Outbound queue full, dropping connection");
                self.close();
                Err(ConnError::QueueFull)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(ConnError::Closed),
        }
    }

    /// Ask both pumps to stop. Messages already queued are still flushed.
    pub fn close(&self) {
        self.shutdown.send_replace(true);
    }

    pub fn is_closed(&self) -> bool {
        *self.shutdown.borrow()
    }
}

/// Receiving half: decoded envelopes in arrival order.
pub struct ConnReceiver {
    id: ConnId,
    rx: mpsc::Receiver<Envelope>,
}

impl ConnReceiver {
    pub fn id(&self) -> ConnId {
        self.id
    }

    /// Next envelope, or `None` once the connection is gone.
    pub async fn recv(&mut self) -> Option<Envelope> {
        self.rx.recv().await
    }
}

/// Start pumping `socket` and return its two halves.
pub fn spawn(socket: WebSocket, config: &ConnConfig) -> (ConnSender, ConnReceiver) {
    let id = ConnId(NEXT_CONN_ID.fetch_add(1, Ordering::Relaxed));
    let (sink, stream) = socket.split();
    let (out_tx, out_rx) = mpsc::channel(config.send_queue_size);
    let (in_tx, in_rx) = mpsc::channel(INBOUND_QUEUE_SIZE);
    let (shutdown, _) = watch::channel(false);
    let shutdown = Arc::new(shutdown);

    tracing::debug!(conn = %id, "Connection opened");

    tokio::spawn(read_pump(
        id,
        stream,
        in_tx,
        Arc::clone(&shutdown),
        config.clone(),
    ));
    tokio::spawn(write_pump(
        id,
        sink,
        out_rx,
        Arc::clone(&shutdown),
        config.clone(),
    ));

    (
        ConnSender {
            id,
            tx: out_tx,
            shutdown,
        },
        ConnReceiver { id, rx: in_rx },
    )
}

/// Resolves once either side has asked for the connection to close.
async fn close_requested(closed: &mut watch::Receiver<bool>) {
    let _ = closed.wait_for(|c| *c).await;
}

async fn read_pump(
    id: ConnId,
    mut stream: SplitStream<WebSocket>,
    inbound: mpsc::Sender<Envelope>,
    shutdown: Arc<watch::Sender<bool>>,
    config: ConnConfig,
) {
    let mut closed = shutdown.subscribe();

    loop {
        let frame = tokio::select! {
            _ = close_requested(&mut closed) => break,
            frame = timeout(config.pong_wait, stream.next()) => frame,
        };

        let msg = match frame {
            Err(_) => {
                tracing::warn!(conn = %id, "No response from peer within {:?}", config.pong_wait);
                break;
            }
            Ok(None) => break,
            Ok(Some(Err(e))) => {
                tracing::info!(conn = %id, "WebSocket read error: {}", e);
                break;
            }
            Ok(Some(Ok(msg))) => msg,
        };

        match msg {
            Message::Text(text) => {
                if text.len() > config.max_message_size {
                    tracing::warn!(
                        conn = %id,
                        "Message of {} bytes exceeds limit of {}",
                        text.len(),
                        config.max_message_size
                    );
                    break;
                }
                tracing::debug!(conn = %id, "Received message: {}", text.as_str());
                let envelope = match Envelope::parse(&text) {
                    Ok(env) => env,
                    Err(e) => {
                        tracing::warn!(conn = %id, "Protocol error: {}", e);
                        break;
                    }
                };
                if inbound.send(envelope).await.is_err() {
                    break;
                }
            }
            Message::Binary(_) => {
                tracing::warn!(conn = %id, "Protocol error: binary frames are not supported");
                break;
            }
            Message::Close(_) => break,
            // Any frame counts as liveness; pings are answered by the socket
            Message::Ping(_) | Message::Pong(_) => {}
        }
    }

    shutdown.send_replace(true);
    tracing::debug!(conn = %id, "Read pump finished");
}

async fn write_pump(
    id: ConnId,
    mut sink: SplitSink<WebSocket, Message>,
    mut outbound: mpsc::Receiver<String>,
    shutdown: Arc<watch::Sender<bool>>,
    config: ConnConfig,
) {
    let mut closed = shutdown.subscribe();
    let mut ticker =
        tokio::time::interval_at(Instant::now() + config.ping_period, config.ping_period);

    loop {
        tokio::select! {
            _ = close_requested(&mut closed) => break,
            msg = outbound.recv() => {
                let Some(text) = msg else { break };
                match timeout(config.write_wait, sink.send(Message::Text(text.into()))).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        tracing::info!(conn = %id, "WebSocket write error: {}", e);
                        break;
                    }
                    Err(_) => {
                        tracing::warn!(conn = %id, "Write timed out");
                        break;
                    }
                }
            }
            _ = ticker.tick() => {
                let ping = timeout(config.write_wait, sink.send(Message::Ping(Default::default())));
                if !matches!(ping.await, Ok(Ok(()))) {
                    tracing::info!(conn = %id, "Ping failed");
                    break;
                }
            }
        }
    }

    shutdown.send_replace(true);

    // Flush whatever was queued before the close request, bounded by one
    // write deadline, then say goodbye.
    let _ = timeout(config.write_wait, async {
        while let Ok(text) = outbound.try_recv() {
            if sink.send(Message::Text(text.into())).await.is_err() {
                return;
            }
        }
        let _ = sink.send(Message::Close(None)).await;
    })
    .await;

    tracing::debug!(conn = %id, "Connection closed");
}

/// The far end of an in-memory connection, standing in for a browser.
#[cfg(test)]
pub(crate) struct Peer {
    inbound: Option<mpsc::Sender<Envelope>>,
    outbound: mpsc::Receiver<String>,
    shutdown: Arc<watch::Sender<bool>>,
}

#[cfg(test)]
impl Peer {
    pub(crate) async fn send(&self, json: &str) {
        let env = Envelope::parse(json).expect("valid envelope");
        self.inbound
            .as_ref()
            .expect("peer still connected")
            .send(env)
            .await
            .expect("connection still reading");
    }

    /// Next outbound message as JSON, failing the test after a second.
    pub(crate) async fn next(&mut self) -> serde_json::Value {
        let text = timeout(std::time::Duration::from_secs(1), self.outbound.recv())
            .await
            .expect("timed out waiting for message")
            .expect("connection dropped");
        serde_json::from_str(&text).expect("valid json")
    }

    pub(crate) fn try_next(&mut self) -> Option<serde_json::Value> {
        self.outbound
            .try_recv()
            .ok()
            .map(|text| serde_json::from_str(&text).expect("valid json"))
    }

    pub(crate) fn disconnect(&mut self) {
        self.inbound = None;
    }

    pub(crate) fn is_closed(&self) -> bool {
        *self.shutdown.borrow()
    }

    pub(crate) async fn wait_closed(&self) {
        let mut closed = self.shutdown.subscribe();
        timeout(std::time::Duration::from_secs(1), closed.wait_for(|c| *c))
            .await
            .expect("timed out waiting for close")
            .expect("shutdown sender alive");
    }
}

/// An in-memory connection with no socket behind it.
#[cfg(test)]
pub(crate) fn loopback(send_queue_size: usize) -> (ConnSender, ConnReceiver, Peer) {
    let id = ConnId(NEXT_CONN_ID.fetch_add(1, Ordering::Relaxed));
    let (out_tx, out_rx) = mpsc::channel(send_queue_size);
    let (in_tx, in_rx) = mpsc::channel(INBOUND_QUEUE_SIZE);
    let shutdown = Arc::new(watch::channel(false).0);
    (
        ConnSender {
            id,
            tx: out_tx,
            shutdown: Arc::clone(&shutdown),
        },
        ConnReceiver { id, rx: in_rx },
        Peer {
            inbound: Some(in_tx),
            outbound: out_rx,
            shutdown,
        },
    )
}
