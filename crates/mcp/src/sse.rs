//! HTTP + Server-Sent Events transport.
//!
//! The client opens a long-lived `GET` stream. The first `endpoint` event
//! names the URL that client messages are `POST`ed to; JSON-RPC responses
//! come back as `message` events on the stream and are routed to the waiting
//! request by id.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::StreamExt;
use reqwest::Url;
use reqwest::header::ACCEPT;
use serde::Serialize;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::protocol::{
    JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, RequestId, ServerMessage,
};
use crate::transport::{Connector, Transport};

/// Default time to wait for the response to a single request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum size of a single buffered event (4MB).
const MAX_EVENT_SIZE: usize = 4 * 1024 * 1024;

type Pending = Arc<Mutex<HashMap<RequestId, oneshot::Sender<JsonRpcResponse>>>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ─────────────────────────────────────────────────────────────────────────────
// Event decoding
// ─────────────────────────────────────────────────────────────────────────────

/// A single dispatched SSE event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    /// Event name; `message` when the server did not set one.
    pub event: String,
    /// Data lines joined with `\n`.
    pub data: String,
}

/// Incremental decoder for a `text/event-stream` body.
///
/// Bytes may arrive split anywhere, including inside a UTF-8 sequence or
/// between the `\r` and `\n` of a line ending.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: String,
    utf8: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return every event completed by it.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<SseEvent> {
        self.utf8.extend_from_slice(bytes);
        loop {
            match std::str::from_utf8(&self.utf8) {
                Ok(text) => {
                    self.buffer.push_str(text);
                    self.utf8.clear();
                    break;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    self.buffer
                        .push_str(&String::from_utf8_lossy(&self.utf8[..valid]));
                    match e.error_len() {
                        // Invalid bytes are skipped.
                        Some(len) => {
                            self.utf8.drain(..valid + len);
                        }
                        // An incomplete trailing sequence waits for the next chunk.
                        None => {
                            self.utf8.drain(..valid);
                            break;
                        }
                    }
                }
            }
        }

        if self.buffer.contains('\r') {
            self.buffer = self.buffer.replace("\r\n", "\n");
        }

        let mut events = Vec::new();
        while let Some(pos) = self.buffer.find("\n\n") {
            let block: String = self.buffer.drain(..pos + 2).collect();
            if let Some(event) = parse_block(&block) {
                events.push(event);
            }
        }

        if self.buffer.len() > MAX_EVENT_SIZE {
            warn!(size = self.buffer.len(), "dropping oversized SSE event");
            self.buffer.clear();
        }

        events
    }
}

fn parse_block(block: &str) -> Option<SseEvent> {
    let mut event = None;
    let mut data: Vec<&str> = Vec::new();

    for line in block.lines() {
        if line.is_empty() || line.starts_with(':') {
            continue;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => event = Some(value.to_string()),
            "data" => data.push(value),
            _ => {}
        }
    }

    if data.is_empty() {
        return None;
    }

    Some(SseEvent {
        event: event.unwrap_or_else(|| "message".to_string()),
        data: data.join("\n"),
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Connector
// ─────────────────────────────────────────────────────────────────────────────

/// Connects to a tool host over HTTP + SSE.
#[derive(Debug, Clone)]
pub struct SseConnector {
    url: String,
    http: reqwest::Client,
    request_timeout: Duration,
}

impl SseConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            http: reqwest::Client::new(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    fn connect_error(&self, reason: impl ToString) -> Error {
        Error::Connect {
            url: self.url.clone(),
            reason: reason.to_string(),
        }
    }
}

impl Connector for SseConnector {
    type Transport = SseTransport;

    fn endpoint(&self) -> &str {
        &self.url
    }

    async fn connect(&self) -> Result<SseTransport> {
        let stream_url = Url::parse(&self.url).map_err(|e| self.connect_error(e))?;

        let response = self
            .http
            .get(stream_url.clone())
            .header(ACCEPT, "text/event-stream")
            .send()
            .await
            .map_err(|e| self.connect_error(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(self.connect_error(format!("stream request returned {status}")));
        }

        let pending = Pending::default();
        let closed = Arc::new(AtomicBool::new(false));
        let (endpoint_tx, endpoint_rx) = oneshot::channel();
        let reader = ReaderTask(tokio::spawn(read_stream(
            response,
            Arc::clone(&pending),
            Arc::clone(&closed),
            endpoint_tx,
        )));

        let endpoint = endpoint_rx
            .await
            .map_err(|_| self.connect_error("stream closed before the endpoint event"))?;
        let endpoint = stream_url
            .join(endpoint.trim())
            .map_err(|e| self.connect_error(format!("invalid endpoint {endpoint:?}: {e}")))?;

        debug!(stream = %stream_url, endpoint = %endpoint, "tool host stream open");

        Ok(SseTransport {
            http: self.http.clone(),
            endpoint,
            pending,
            reader,
            request_timeout: self.request_timeout,
            closed,
        })
    }
}

/// Aborts the stream reader when dropped.
#[derive(Debug)]
struct ReaderTask(JoinHandle<()>);

impl Drop for ReaderTask {
    fn drop(&mut self) {
        self.0.abort();
    }
}

async fn read_stream(
    response: reqwest::Response,
    pending: Pending,
    closed: Arc<AtomicBool>,
    endpoint_tx: oneshot::Sender<String>,
) {
    let mut endpoint_tx = Some(endpoint_tx);
    let mut decoder = SseDecoder::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let bytes = match chunk {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = %e, "tool host stream read failed");
                break;
            }
        };

        for event in decoder.push(&bytes) {
            match event.event.as_str() {
                "endpoint" => {
                    if let Some(tx) = endpoint_tx.take() {
                        let _ = tx.send(event.data);
                    }
                }
                "message" => dispatch(&pending, &event.data),
                other => debug!(event = other, "ignoring tool host event"),
            }
        }
    }

    debug!("tool host stream ended");
    // Mark closed before waking waiters so later requests fail fast.
    closed.store(true, Ordering::SeqCst);
    lock(&pending).clear();
}

fn dispatch(pending: &Pending, data: &str) {
    match serde_json::from_str::<ServerMessage>(data) {
        Ok(ServerMessage::Response(response)) => {
            let waiter = lock(pending).remove(&response.id);
            match waiter {
                Some(tx) => {
                    let _ = tx.send(response);
                }
                None => warn!(id = %response.id, "response for unknown request"),
            }
        }
        Ok(ServerMessage::Other { method, id: Some(id) }) => {
            debug!(method = %method, id = %id, "ignoring server request");
        }
        Ok(ServerMessage::Other { method, id: None }) => {
            debug!(method = %method, "ignoring server notification");
        }
        Err(e) => warn!(error = %e, "unparseable message from tool host"),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Transport
// ─────────────────────────────────────────────────────────────────────────────

/// An open SSE connection to a tool host.
#[derive(Debug)]
pub struct SseTransport {
    http: reqwest::Client,
    endpoint: Url,
    pending: Pending,
    reader: ReaderTask,
    request_timeout: Duration,
    closed: Arc<AtomicBool>,
}

impl SseTransport {
    async fn post(&self, body: &impl Serialize) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::Disconnected);
        }

        let response = self
            .http
            .post(self.endpoint.clone())
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::InvalidResponse(format!(
                "tool host rejected message with {status}"
            )));
        }
        Ok(())
    }
}

impl Transport for SseTransport {
    async fn request(&self, request: JsonRpcRequest) -> Result<JsonRpcResponse> {
        let id = request.id.clone();
        let (tx, rx) = oneshot::channel();
        lock(&self.pending).insert(id.clone(), tx);

        if let Err(e) = self.post(&request).await {
            lock(&self.pending).remove(&id);
            return Err(e);
        }

        match timeout(self.request_timeout, rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(Error::Disconnected),
            Err(_) => {
                lock(&self.pending).remove(&id);
                Err(Error::Timeout(request.method))
            }
        }
    }

    async fn notify(&self, notification: JsonRpcNotification) -> Result<()> {
        self.post(&notification).await
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.reader.0.abort();
        lock(&self.pending).clear();
        debug!(endpoint = %self.endpoint, "tool host stream closed");
    }
}
