//! The common contract both JSON-RPC transports implement.
//!
//! Grounded on `turbomcp-transport::core::Transport`: every method takes
//! `&self`, relying on interior mutability (`DashMap`, `RwLock`, atomics) in
//! implementors rather than requiring callers to hold `&mut`. This lets a
//! `Connection` hold an `Arc<dyn Transport>` and share it across concurrent
//! `send_receive` calls.

use std::sync::Arc;

use async_trait::async_trait;
use mcpfuse_protocol::Message;

use crate::error::Result;

/// Behavior shared by [`crate::http::HttpTransport`] and
/// [`crate::sse::SseTransport`].
#[async_trait]
pub trait Transport: Send + Sync {
    /// Establishes the connection, returning only once ready to send and
    /// receive. May fail with [`crate::error::TransportError::Unauthorised`],
    /// `NotFound`, or `MethodNotAllowed` so the selector can classify and
    /// react.
    async fn start(&self) -> Result<()>;

    /// Sends one request and returns its matching response, matched by
    /// JSON-RPC `id`. Fails with
    /// [`crate::error::TransportError::Closed`] if the transport has shut
    /// down, or `Cancelled` if the caller's future was dropped mid-call.
    async fn send_receive(&self, message: Message) -> Result<Message>;

    /// Idempotent release of all resources. Safe to call more than once and
    /// safe to call without a prior successful `start`.
    async fn close(&self);
}

/// Convenience alias for the trait object every `Connection` actually holds.
pub type DynTransport = Arc<dyn Transport>;
