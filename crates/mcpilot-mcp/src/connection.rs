//! Newline-framed JSON-RPC connection over an arbitrary byte stream pair.
//!
//! A background receive task reads one line at a time and routes responses
//! to the request that is waiting for them. Each outstanding request owns a
//! oneshot channel registered in the pending table under its id; the receive
//! task fires it, the requester awaits it under a deadline.
//!
//! ```text
//!   request() ──► pending[id] = tx ──► write line ──► await rx (deadline)
//!                                                          ▲
//!   receive task ◄── read line ◄── child stdout            │
//!        └── response{id} ──► pending.remove(id).send() ───┘
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::error::{McpError, Result};
use crate::protocol::{
    IncomingMessage, JsonRpcError, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse,
};

/// Read half accepted by [`RpcConnection`].
pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
/// Write half accepted by [`RpcConnection`].
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

type PendingTable = Arc<Mutex<HashMap<u64, oneshot::Sender<JsonRpcResponse>>>>;
type SharedWriter = Arc<tokio::sync::Mutex<Option<BoxedWriter>>>;

/// Per-request wait policy.
#[derive(Debug, Clone, Copy)]
pub struct RequestOptions {
    /// Give up after this long.
    pub deadline: Duration,
    /// Log a warning if still waiting after this long.
    pub watchdog: Option<Duration>,
}

impl RequestOptions {
    /// Wait up to `deadline`, silently.
    pub fn deadline(deadline: Duration) -> Self {
        Self {
            deadline,
            watchdog: None,
        }
    }

    /// Warn once `threshold` has elapsed.
    pub fn with_watchdog(mut self, threshold: Duration) -> Self {
        self.watchdog = Some(threshold);
        self
    }
}

/// One JSON-RPC session over a byte stream pair.
pub struct RpcConnection {
    label: String,
    writer: SharedWriter,
    pending: PendingTable,
    next_id: AtomicU64,
    reader_alive: Arc<AtomicBool>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl RpcConnection {
    /// Wrap a stream pair and start the receive task.
    ///
    /// `label` shows up in log lines so multiple servers can be told apart.
    pub fn spawn(label: impl Into<String>, reader: BoxedReader, writer: BoxedWriter) -> Self {
        let label = label.into();
        let writer: SharedWriter = Arc::new(tokio::sync::Mutex::new(Some(writer)));
        let pending: PendingTable = Arc::new(Mutex::new(HashMap::new()));
        let reader_alive = Arc::new(AtomicBool::new(true));

        let handle = tokio::spawn(receive_loop(
            label.clone(),
            reader,
            Arc::clone(&pending),
            Arc::clone(&writer),
            Arc::clone(&reader_alive),
        ));

        Self {
            label,
            writer,
            pending,
            next_id: AtomicU64::new(1),
            reader_alive,
            reader: Mutex::new(Some(handle)),
        }
    }

    /// Send a request and wait for its response.
    ///
    /// A JSON-RPC error reply is still `Ok`: the caller decides what an error
    /// payload means. On timeout the pending entry is removed, so a response
    /// that shows up later is dropped by the receive task.
    pub async fn request(
        &self,
        method: &str,
        params: Option<Value>,
        opts: RequestOptions,
    ) -> Result<JsonRpcResponse> {
        if !self.reader_alive.load(Ordering::SeqCst) {
            return Err(McpError::ConnectionClosed);
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, mut rx) = oneshot::channel();
        self.pending.lock().insert(id, tx);

        let request = JsonRpcRequest::new(id, method, params);
        if let Err(e) = self.write_frame(&request).await {
            self.pending.lock().remove(&id);
            return Err(e);
        }

        let started = Instant::now();
        let label = &self.label;
        let wait = async move {
            if let Some(threshold) = opts.watchdog {
                tokio::select! {
                    res = &mut rx => return res,
                    _ = tokio::time::sleep(threshold) => {
                        tracing::warn!(
                            server = %label,
                            id,
                            method,
                            elapsed_secs = threshold.as_secs_f64(),
                            "still waiting for response"
                        );
                    }
                }
            }
            rx.await
        };

        match tokio::time::timeout(opts.deadline, wait).await {
            Ok(Ok(response)) => {
                tracing::debug!(
                    server = %self.label,
                    id,
                    method,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "received response"
                );
                Ok(response)
            }
            // Sender dropped: the receive loop ended and cleared the table.
            Ok(Err(_)) => Err(McpError::ConnectionClosed),
            Err(_) => {
                self.pending.lock().remove(&id);
                Err(McpError::Timeout(opts.deadline))
            }
        }
    }

    /// Send a notification; no response is expected.
    pub async fn notify(&self, method: &str, params: Option<Value>) -> Result<()> {
        self.write_frame(&JsonRpcNotification::new(method, params))
            .await
    }

    /// Abort the receive task and wait for it to finish.
    ///
    /// Every request still waiting fails with [`McpError::ConnectionClosed`].
    pub async fn cancel_receiver(&self) {
        let handle = self.reader.lock().take();
        if let Some(handle) = handle {
            handle.abort();
            if let Err(e) = handle.await
                && !e.is_cancelled()
            {
                tracing::warn!(server = %self.label, error = %e, "receive task panicked");
            }
        }
        self.reader_alive.store(false, Ordering::SeqCst);
        self.pending.lock().clear();
    }

    /// Shut down and drop the write half. Later sends fail with
    /// [`McpError::NotStarted`].
    pub async fn close_writer(&self) -> Result<()> {
        let writer = self.writer.lock().await.take();
        if let Some(mut writer) = writer {
            writer.shutdown().await?;
        }
        Ok(())
    }

    /// Whether the write half has been closed.
    pub async fn is_closed(&self) -> bool {
        self.writer.lock().await.is_none()
    }

    /// Number of requests waiting for a response.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    async fn write_frame<T: Serialize>(&self, message: &T) -> Result<()> {
        write_line(&self.writer, message).await?;
        tracing::trace!(server = %self.label, "sent frame");
        Ok(())
    }
}

impl Drop for RpcConnection {
    fn drop(&mut self) {
        if let Some(handle) = self.reader.get_mut().take() {
            handle.abort();
        }
    }
}

/// Serialize one message and write it as a single line.
async fn write_line<T: Serialize>(writer: &SharedWriter, message: &T) -> Result<()> {
    let mut line = serde_json::to_string(message)?;
    line.push('\n');

    let mut guard = writer.lock().await;
    let writer = guard.as_mut().ok_or(McpError::NotStarted)?;
    writer.write_all(line.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

async fn receive_loop(
    label: String,
    reader: BoxedReader,
    pending: PendingTable,
    writer: SharedWriter,
    alive: Arc<AtomicBool>,
) {
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => {
                tracing::debug!(server = %label, "server closed its output");
                break;
            }
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                if line.trim().is_empty() {
                    continue;
                }
                match IncomingMessage::parse(&line) {
                    Some(message) => route(&label, message, &pending, &writer),
                    None => tracing::trace!(server = %label, "ignoring non-JSON output line"),
                }
            }
            Err(e) => {
                tracing::warn!(server = %label, error = %e, "read failed");
                break;
            }
        }
    }

    alive.store(false, Ordering::SeqCst);
    pending.lock().clear();
}

fn route(label: &str, message: IncomingMessage, pending: &PendingTable, writer: &SharedWriter) {
    match message {
        IncomingMessage::Response(response) => {
            let waiter = response.id.as_u64().and_then(|id| pending.lock().remove(&id));
            match waiter {
                Some(tx) => {
                    // The requester may have timed out in between.
                    let _ = tx.send(response);
                }
                None => {
                    tracing::debug!(server = %label, id = %response.id, "no pending request for response");
                }
            }
        }
        IncomingMessage::Request { id, method } => {
            tracing::debug!(server = %label, %method, "rejecting server-initiated request");
            let reply = JsonRpcResponse::failure(id, JsonRpcError::method_not_found(&method));
            let writer = Arc::clone(writer);
            let label = label.to_string();
            tokio::spawn(async move {
                if let Err(e) = write_line(&writer, &reply).await {
                    tracing::warn!(server = %label, error = %e, "failed to reply to server request");
                }
            });
        }
        IncomingMessage::Notification { method } => {
            tracing::trace!(server = %label, %method, "ignoring notification");
        }
        IncomingMessage::Unrecognized => {
            tracing::trace!(server = %label, "ignoring unrecognized message");
        }
    }
}
