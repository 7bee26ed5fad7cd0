//! Fans out one connection per configured upstream and aggregates the
//! resulting tool catalogues.
//!
//! The concurrent-connect-then-fail-fast-only-if-nothing-survived policy is
//! grounded on `MCPAggregateInitPolicy::StrictFailFast` in the roci
//! aggregate example, adapted here to tolerate individual upstream
//! failures rather than aborting the whole aggregate on the first one —
//! this crate only aborts when every upstream failed.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::aggregator::Aggregator;
use crate::config::Config;
use crate::connection::{Connection, ConnectionState};
use crate::error::{ManagerError, ManagerResult};

/// Read-only status for one configured upstream, as reported by
/// [`Manager::list_connections`].
#[derive(Debug, Clone)]
pub struct ConnectionSnapshot {
    pub name: String,
    pub state: ConnectionState,
    pub tool_count: usize,
}

/// Owns every upstream's [`Connection`] and the merged tool catalogue.
pub struct Manager {
    connections: HashMap<String, Arc<Connection>>,
    aggregator: RwLock<Aggregator>,
}

impl Manager {
    /// Validates `config`, launches one connector task per upstream
    /// concurrently, and waits for all to finish. An individual upstream
    /// failure is logged and that upstream is excluded from the ready set;
    /// the whole call only fails with
    /// [`ManagerError::AllUpstreamsFailed`] if none connected.
    pub async fn connect(config: Config) -> ManagerResult<Self> {
        config.validate()?;

        let total = config.upstreams.len();
        let callback_host = config.callback_host.clone();
        let callback_port = config.callback_port as u16;
        let cache_dir = config.cache_dir.clone();

        let tasks: Vec<_> = config
            .upstreams
            .into_iter()
            .map(|upstream_config| {
                let cache_dir = cache_dir.clone();
                let callback_host = callback_host.clone();
                tokio::spawn(async move {
                    let name = upstream_config.name.clone();
                    let connection = Connection::new(upstream_config, &cache_dir, callback_host, callback_port)?;
                    connection.connect().await?;
                    connection.list_tools().await?;
                    Ok::<_, crate::error::ConnectionError>((name, Arc::new(connection)))
                })
            })
            .collect();

        let mut connections = HashMap::new();
        for task in tasks {
            match task.await {
                Ok(Ok((name, connection))) => {
                    info!(upstream = %name, "upstream connected");
                    connections.insert(name, connection);
                }
                Ok(Err(e)) => {
                    warn!(error = %e, "upstream failed to connect, excluding from ready set");
                }
                Err(e) => {
                    warn!(error = %e, "connector task panicked");
                }
            }
        }

        if connections.is_empty() && total > 0 {
            return Err(ManagerError::AllUpstreamsFailed { count: total });
        }

        let aggregator = Self::rebuild_aggregator(&connections).await;

        Ok(Self {
            connections,
            aggregator: RwLock::new(aggregator),
        })
    }

    async fn rebuild_aggregator(connections: &HashMap<String, Arc<Connection>>) -> Aggregator {
        let mut catalogues = Vec::with_capacity(connections.len());
        for (name, connection) in connections {
            catalogues.push((name.clone(), connection.tools().await));
        }
        Aggregator::build(&catalogues)
    }

    /// The merged tool catalogue across every connected upstream.
    pub async fn list_tools(&self) -> Vec<crate::aggregator::AggregatedTool> {
        self.aggregator.read().await.tools().to_vec()
    }

    /// Read-only snapshot of every configured upstream's current state and
    /// tool count, polled by out-of-scope status surfaces.
    pub async fn list_connections(&self) -> Vec<ConnectionSnapshot> {
        let mut snapshots = Vec::with_capacity(self.connections.len());
        for (name, connection) in &self.connections {
            snapshots.push(ConnectionSnapshot {
                name: name.clone(),
                state: connection.state().await,
                tool_count: connection.tool_count().await,
            });
        }
        snapshots
    }

    /// Resolves `name` (optionally `<upstream>:`-prefixed) against the
    /// aggregator's routing table first, then a manual prefix against the
    /// live connection set, then single-connection dispatch, then gives up
    /// as ambiguous.
    pub async fn execute_tool(&self, name: &str, arguments: Value) -> ManagerResult<Value> {
        if let Some(route) = self.aggregator.read().await.route(name) {
            let connection = self
                .connections
                .get(&route.upstream)
                .ok_or_else(|| ManagerError::UnknownUpstream {
                    name: route.upstream.clone(),
                })?;
            return Ok(connection.execute_tool(&route.original_name, arguments).await?);
        }

        if let Some((prefix, rest)) = name.split_once(':') {
            if let Some(connection) = self.connections.get(prefix) {
                return Ok(connection.execute_tool(rest, arguments).await?);
            }
        }

        match self.connections.len() {
            0 => Err(ManagerError::UnknownTool { name: name.to_string() }),
            1 => {
                let connection = self.connections.values().next().expect("checked len == 1");
                Ok(connection.execute_tool(name, arguments).await?)
            }
            count => Err(ManagerError::AmbiguousToolName {
                name: name.to_string(),
                count,
            }),
        }
    }

    /// Closes every connection, logging (but not propagating) individual
    /// close failures since `Transport::close` is infallible.
    pub async fn close(&self) {
        for connection in self.connections.values() {
            connection.close().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UpstreamConfig;
    use mcpfuse_transport::TransportStrategy;

    #[tokio::test]
    async fn zero_upstreams_configured_connects_with_an_empty_ready_set() {
        let config = Config {
            upstreams: Vec::new(),
            ..Config::default()
        };
        let manager = Manager::connect(config).await.unwrap();
        assert!(manager.list_connections().await.is_empty());
        assert!(manager.list_tools().await.is_empty());
    }

    #[test]
    fn upstream_config_defaults_to_http_first() {
        let upstream = UpstreamConfig {
            name: "a".to_string(),
            url: "https://a.example/mcp".to_string(),
            transport_strategy: TransportStrategy::default(),
            static_client: None,
            headers: HashMap::new(),
            include_tools: Vec::new(),
            ignore_tools: Vec::new(),
        };
        assert_eq!(upstream.transport_strategy, TransportStrategy::HttpFirst);
    }

    #[tokio::test]
    async fn execute_tool_on_empty_manager_is_unknown_not_ambiguous() {
        let config = Config {
            upstreams: Vec::new(),
            ..Config::default()
        };
        let manager = Manager::connect(config).await.unwrap();
        let err = manager.execute_tool("anything", serde_json::json!({})).await.unwrap_err();
        assert!(matches!(err, ManagerError::UnknownTool { .. }));
    }
}
