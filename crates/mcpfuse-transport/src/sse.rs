//! SSE transport: a long-lived GET event stream paired with an auxiliary
//! POST endpoint discovered from the stream's first `endpoint` event.
//!
//! The frame-splitting idiom (`field:` / `value` pairs, blank-line delimited
//! events, multi-line `data:` joined with `\n`) is grounded on
//! `turbomcp-transport::http_sse_client::process_sse_event`. The
//! discovered-endpoint cell (`Arc<RwLock<Option<Url>>>`) and the
//! reconnect-free reader task follow the same file's
//! `message_endpoint`/`sse_connection_task` split.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use futures_util::StreamExt;
use mcpfuse_auth::OAuthProvider;
use mcpfuse_protocol::{Message, RequestId};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Client;
use tokio::sync::{oneshot, watch, RwLock};
use tracing::{debug, warn};
use url::Url;

use crate::error::{Result, TransportError};
use crate::trait_def::Transport;

const ENDPOINT_READY_TIMEOUT: Duration = Duration::from_secs(30);

/// One parsed SSE frame, collected across the lines between blank-line
/// delimiters.
#[derive(Debug, Default)]
struct SseFrame {
    event: Option<String>,
    data_lines: Vec<String>,
}

impl SseFrame {
    fn data(&self) -> Option<String> {
        if self.data_lines.is_empty() {
            None
        } else {
            Some(self.data_lines.join("\n"))
        }
    }
}

/// Splits a raw SSE byte stream into frames line by line, mutating `frame`
/// in place and calling `on_frame` whenever a blank line terminates one.
fn feed_line(frame: &mut SseFrame, line: &str, on_frame: &mut impl FnMut(SseFrame)) {
    if line.is_empty() {
        if frame.event.is_some() || !frame.data_lines.is_empty() {
            on_frame(std::mem::take(frame));
        }
        return;
    }
    if line.starts_with(':') {
        return; // comment line
    }
    let Some(colon) = line.find(':') else {
        return;
    };
    let field = &line[..colon];
    let value = line[colon + 1..].trim_start();
    match field {
        "event" => frame.event = Some(value.to_string()),
        "data" => frame.data_lines.push(value.to_string()),
        "id" | "retry" => {}
        other => debug!(field = other, "ignoring unknown sse field"),
    }
}

/// Deregisters a pending waiter on drop, regardless of whether the owning
/// `send_receive` future returned normally, errored, or was cancelled by the
/// caller dropping it.
struct WaiterGuard {
    pending: Arc<DashMap<RequestId, oneshot::Sender<Message>>>,
    id: RequestId,
}

impl WaiterGuard {
    fn register(pending: Arc<DashMap<RequestId, oneshot::Sender<Message>>>, id: RequestId) -> (Self, oneshot::Receiver<Message>) {
        let (tx, rx) = oneshot::channel();
        pending.insert(id.clone(), tx);
        (Self { pending, id }, rx)
    }
}

impl Drop for WaiterGuard {
    fn drop(&mut self) {
        self.pending.remove(&self.id);
    }
}

struct Inner {
    server_url: Url,
    client: Client,
    headers: HashMap<String, String>,
    auth: Option<Arc<OAuthProvider>>,
    endpoint: RwLock<Option<Url>>,
    pending: Arc<DashMap<RequestId, oneshot::Sender<Message>>>,
    ready_tx: watch::Sender<bool>,
    closed: AtomicBool,
    reader_task: std::sync::Mutex<Option<tokio::task::JoinHandle<()>>>,
}

/// SSE transport bound to one upstream URL.
pub struct SseTransport {
    inner: Arc<Inner>,
}

impl SseTransport {
    pub fn new(
        server_url: Url,
        client: Client,
        headers: HashMap<String, String>,
        auth: Option<Arc<OAuthProvider>>,
    ) -> Self {
        let (ready_tx, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                server_url,
                client,
                headers,
                auth,
                endpoint: RwLock::new(None),
                pending: Arc::new(DashMap::new()),
                ready_tx,
                closed: AtomicBool::new(false),
                reader_task: std::sync::Mutex::new(None),
            }),
        }
    }

    async fn connectivity_probe(&self) -> Result<reqwest::Response> {
        let mut map = HeaderMap::new();
        map.insert(reqwest::header::ACCEPT, HeaderValue::from_static("text/event-stream"));
        map.insert(reqwest::header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        map.insert(reqwest::header::CONNECTION, HeaderValue::from_static("keep-alive"));
        for (key, value) in &self.inner.headers {
            if let (Ok(name), Ok(val)) = (HeaderName::from_bytes(key.as_bytes()), HeaderValue::from_str(value)) {
                map.insert(name, val);
            }
        }
        if let Some(provider) = &self.inner.auth {
            if let Ok(token) = provider.get_access_token().await {
                if let Ok(val) = HeaderValue::from_str(&format!("Bearer {token}")) {
                    map.insert(reqwest::header::AUTHORIZATION, val);
                }
            }
        }

        let response = self
            .inner
            .client
            .get(self.inner.server_url.clone())
            .headers(map)
            .send()
            .await?;

        let status = response.status().as_u16();
        if let Some(classified) = TransportError::classify_status(status) {
            return Err(classified);
        }
        if !response.status().is_success() {
            return Err(TransportError::UnexpectedStatus { status });
        }
        Ok(response)
    }

    fn resolve_endpoint(server_url: &Url, raw: &str) -> Result<Url> {
        let resolved = server_url
            .join(raw)
            .map_err(|_| TransportError::OriginMismatch(raw.to_string()))?;
        if resolved.scheme() != server_url.scheme() || resolved.host() != server_url.host() {
            return Err(TransportError::OriginMismatch(raw.to_string()));
        }
        Ok(resolved)
    }

    fn spawn_reader(&self, response: reqwest::Response) {
        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(async move {
            let mut stream = response.bytes_stream();
            let mut buf = String::new();
            let mut frame = SseFrame::default();
            let mut endpoint_seen = false;

            while let Some(chunk) = stream.next().await {
                if inner.closed.load(Ordering::Acquire) {
                    break;
                }
                let chunk = match chunk {
                    Ok(c) => c,
                    Err(e) => {
                        warn!(error = %e, "sse stream read failed");
                        break;
                    }
                };
                buf.push_str(&String::from_utf8_lossy(&chunk));

                while let Some(pos) = buf.find('\n') {
                    let line = buf[..pos].trim_end_matches('\r').to_string();
                    buf.drain(..=pos);

                    let mut completed: Option<SseFrame> = None;
                    feed_line(&mut frame, &line, &mut |f| completed = Some(f));
                    let Some(completed) = completed else { continue };

                    let Some(data) = completed.data() else { continue };
                    let looks_like_url = data.starts_with('/') || Url::parse(&data).is_ok();
                    let is_endpoint_event = completed.event.as_deref() == Some("endpoint")
                        || (completed.event.is_none() && !endpoint_seen && looks_like_url);

                    if !endpoint_seen && is_endpoint_event {
                        match Self::resolve_endpoint(&inner.server_url, &data) {
                            Ok(url) => {
                                *inner.endpoint.write().await = Some(url);
                                endpoint_seen = true;
                                let _ = inner.ready_tx.send(true);
                            }
                            Err(e) => {
                                warn!(error = %e, "rejected sse endpoint event");
                            }
                        }
                        continue;
                    }

                    match Message::from_json(data.as_bytes()) {
                        Ok(message) => {
                            if let Some(id) = message.id.clone() {
                                if let Some((_, tx)) = inner.pending.remove(&id) {
                                    let _ = tx.send(message);
                                }
                            }
                        }
                        Err(e) => {
                            debug!(error = %e, "ignoring unparseable sse data frame");
                        }
                    }
                }
            }
            debug!("sse reader task exiting");
        });
        *self.inner.reader_task.lock().expect("reader_task mutex poisoned") = Some(task);
    }
}

#[async_trait]
impl Transport for SseTransport {
    async fn start(&self) -> Result<()> {
        let response = self.connectivity_probe().await?;
        self.spawn_reader(response);

        let mut ready_rx = self.inner.ready_tx.subscribe();
        if *ready_rx.borrow() {
            return Ok(());
        }
        tokio::time::timeout(ENDPOINT_READY_TIMEOUT, ready_rx.wait_for(|ready| *ready))
            .await
            .map_err(|_| TransportError::EndpointTimeout)?
            .map_err(|_| TransportError::Closed)?;
        Ok(())
    }

    async fn send_receive(&self, message: Message) -> Result<Message> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(TransportError::Closed);
        }

        let id = message
            .id
            .clone()
            .ok_or_else(|| TransportError::Decode("message has no id to correlate a response".to_string()))?;

        let (guard, rx) = WaiterGuard::register(Arc::clone(&self.inner.pending), id);

        let endpoint = self
            .inner
            .endpoint
            .read()
            .await
            .clone()
            .ok_or(TransportError::EndpointTimeout)?;

        let mut map = HeaderMap::new();
        map.insert(reqwest::header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        for (key, value) in &self.inner.headers {
            if let (Ok(name), Ok(val)) = (HeaderName::from_bytes(key.as_bytes()), HeaderValue::from_str(value)) {
                map.insert(name, val);
            }
        }
        if let Some(provider) = &self.inner.auth {
            if let Ok(token) = provider.get_access_token().await {
                if let Ok(val) = HeaderValue::from_str(&format!("Bearer {token}")) {
                    map.insert(reqwest::header::AUTHORIZATION, val);
                }
            }
        }

        let body = message.to_json().map_err(|e| TransportError::Decode(e.to_string()))?;
        let response = self.inner.client.post(endpoint).headers(map).body(body).send().await?;

        let status = response.status().as_u16();
        if let Some(classified) = TransportError::classify_status(status) {
            return Err(classified);
        }
        if !response.status().is_success() {
            return Err(TransportError::UnexpectedStatus { status });
        }

        let bytes = response.bytes().await?;
        if !bytes.is_empty() {
            if let Ok(message) = Message::from_json(&bytes) {
                return Ok(message);
            }
        }

        let message = rx.await.map_err(|_| TransportError::Closed)?;
        drop(guard);
        Ok(message)
    }

    async fn close(&self) {
        self.inner.closed.store(true, Ordering::Release);
        let task = self
            .inner
            .reader_task
            .lock()
            .expect("reader_task mutex poisoned")
            .take();
        if let Some(task) = task {
            task.abort();
        }
        self.inner.pending.clear();
    }
}
