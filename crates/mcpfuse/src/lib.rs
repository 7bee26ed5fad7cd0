//! Top-level facade: a single client surface over every configured
//! upstream MCP server, hiding the transport/auth/aggregation machinery
//! behind one `McpFuse` handle.
//!
//! Acts as a thin re-export and bootstrap layer over the
//! protocol/auth/transport/core split, the same role `turbomcp` plays over
//! its own `turbomcp-protocol`/`turbomcp-transport`/`turbomcp-server` split.

use std::sync::OnceLock;

use serde_json::Value;

pub use mcpfuse_core::{
    AggregatedTool, Config, ConnectionSnapshot, ConnectionState, Manager, ManagerError,
    StaticOAuthClient, UpstreamConfig,
};
pub use mcpfuse_protocol::{CallToolResult, ListToolsResult, ToolInfo};
pub use mcpfuse_transport::TransportStrategy;

static INSTANCE: OnceLock<McpFuse> = OnceLock::new();

/// Installs a `tracing-subscriber` `EnvFilter` subscriber reading from
/// `RUST_LOG` (default `info`). Safe to call more than once; later calls
/// are no-ops.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// The aggregating proxy's single client-facing handle: one merged tool
/// catalogue and one `execute_tool` entry point over every configured
/// upstream.
pub struct McpFuse {
    manager: Manager,
}

impl McpFuse {
    async fn connect(config: Config) -> Result<Self, ManagerError> {
        let manager = Manager::connect(config).await?;
        Ok(Self { manager })
    }

    /// Idempotently initializes the process-wide singleton from `config`.
    /// The first caller wins; subsequent calls (from any task) receive
    /// `Err` rather than silently reconfiguring a running instance, since
    /// every connection already carries live sockets and cached OAuth
    /// state tied to the first configuration.
    pub async fn ensure_initialised(config: Config) -> Result<&'static Self, ManagerError> {
        if let Some(existing) = INSTANCE.get() {
            return Ok(existing);
        }
        let instance = Self::connect(config).await?;
        match INSTANCE.set(instance) {
            Ok(()) => Ok(INSTANCE.get().expect("just inserted")),
            Err(_) => Ok(INSTANCE.get().expect("a racing caller already inserted one")),
        }
    }

    /// Returns the already-initialised singleton, if any.
    pub fn instance() -> Option<&'static Self> {
        INSTANCE.get()
    }

    /// The merged tool catalogue across every connected upstream.
    pub async fn list_tools(&self) -> Vec<AggregatedTool> {
        self.manager.list_tools().await
    }

    /// Status snapshot for every configured upstream.
    pub async fn list_connections(&self) -> Vec<ConnectionSnapshot> {
        self.manager.list_connections().await
    }

    /// Dispatches `tools/call` for a (possibly `<upstream>:`-prefixed) tool
    /// name.
    pub async fn execute_tool(&self, name: &str, arguments: Value) -> Result<Value, ManagerError> {
        self.manager.execute_tool(name, arguments).await
    }

    /// Closes every upstream connection. The singleton, once closed,
    /// cannot be reconnected; a fresh process is expected to call
    /// `ensure_initialised` again.
    pub async fn close(&self) {
        self.manager.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ensure_initialised_is_idempotent_across_callers() {
        let config = Config {
            upstreams: Vec::new(),
            ..Config::default()
        };
        let first = McpFuse::ensure_initialised(config.clone()).await.unwrap();
        let second = McpFuse::ensure_initialised(config).await.unwrap();
        assert!(std::ptr::eq(first, second));
    }
}
