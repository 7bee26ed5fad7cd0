//! Per-upstream connection state machine.
//!
//! The `Disconnected -> Connecting -> Authenticating? -> Connected ->
//! Listed` progression and the transport-rebuild-after-auth step are
//! grounded on the authorization-code flow in the xzatoma `auth-flow`
//! example; the `initialised`/tool-cache split mirrors
//! `turbomcp-client`'s pattern of gating RPCs behind an initialized flag
//! guarded by a lock rather than an enum walked by `&mut self`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use mcpfuse_auth::{OAuthProvider, ProviderConfig, StaticClientConfig, TokenStore};
use mcpfuse_protocol::{CallToolParams, Message, RequestId, ToolInfo};
use mcpfuse_transport::{HttpTransport, SseTransport, Transport, TransportError, TransportKind, TransportStrategy};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::UpstreamConfig;
use crate::error::{ConnectionError, ConnectionResult};
use crate::fingerprint::fingerprint;
use crate::filter::ToolFilter;

const LIST_TOOLS_TIMEOUT: Duration = Duration::from_secs(30);
const CALL_TOOL_TIMEOUT: Duration = Duration::from_secs(60);
const AUTH_TIMEOUT: Duration = Duration::from_secs(30);

/// Connection lifecycle, per §4.7.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Authenticating,
    Connected,
    Listed,
    Closed,
}

fn build_transport(
    kind: TransportKind,
    url: Url,
    client: reqwest::Client,
    headers: HashMap<String, String>,
    auth: Option<Arc<OAuthProvider>>,
) -> Arc<dyn Transport> {
    match kind {
        TransportKind::Http => Arc::new(HttpTransport::new(url, client, headers, auth)),
        TransportKind::Sse => Arc::new(SseTransport::new(url, client, headers, auth)),
    }
}

/// A single upstream MCP server: its configuration, auth provider, current
/// transport, and cached tool catalogue.
pub struct Connection {
    name: String,
    config: UpstreamConfig,
    url: Url,
    filter: ToolFilter,
    http_client: reqwest::Client,
    auth: Arc<OAuthProvider>,
    callback_host: String,
    callback_port: u16,
    state: RwLock<ConnectionState>,
    transport: RwLock<Option<Arc<dyn Transport>>>,
    transport_kind: RwLock<Option<TransportKind>>,
    tools: RwLock<Vec<ToolInfo>>,
    next_id: AtomicI64,
}

impl Connection {
    pub fn new(
        config: UpstreamConfig,
        cache_dir: &str,
        callback_host: String,
        callback_port: u16,
    ) -> ConnectionResult<Self> {
        let url = Url::parse(&config.url).map_err(|e| ConnectionError::Transport {
            upstream: config.name.clone(),
            source: TransportError::Url(e),
        })?;

        let filter = ToolFilter::compile(&config.include_tools, &config.ignore_tools).map_err(|e| {
            ConnectionError::Transport {
                upstream: config.name.clone(),
                source: TransportError::Decode(e.to_string()),
            }
        })?;

        let static_client_id = config.static_client.as_ref().map(|c| c.client_id.as_str());
        let fp = fingerprint(&config.url, &config.headers, static_client_id);

        let store = Arc::new(
            TokenStore::open(cache_dir)
                .map_err(|e| ConnectionError::AuthFailed {
                    upstream: config.name.clone(),
                    source: e,
                })?,
        );

        let redirect_uri = format!("http://{callback_host}:{callback_port}/callback");
        let provider_config = ProviderConfig {
            issuer: config.url.clone(),
            redirect_uri,
            scopes: Vec::new(),
            static_client: config.static_client.as_ref().map(|c| StaticClientConfig {
                client_id: c.client_id.clone(),
                client_secret: c.client_secret.clone(),
            }),
            resource: Some(config.url.clone()),
        };
        let auth = Arc::new(
            OAuthProvider::new(provider_config, fp, store).map_err(|e| ConnectionError::AuthFailed {
                upstream: config.name.clone(),
                source: e,
            })?,
        );

        Ok(Self {
            name: config.name.clone(),
            http_client: reqwest::Client::builder()
                .redirect(reqwest::redirect::Policy::none())
                .build()
                .expect("reqwest client builds with default settings"),
            auth,
            callback_host,
            callback_port,
            state: RwLock::new(ConnectionState::Disconnected),
            transport: RwLock::new(None),
            transport_kind: RwLock::new(None),
            tools: RwLock::new(Vec::new()),
            next_id: AtomicI64::new(1),
            filter,
            url,
            config,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn state(&self) -> ConnectionState {
        *self.state.read().await
    }

    pub async fn tool_count(&self) -> usize {
        self.tools.read().await.len()
    }

    fn next_request_id(&self) -> RequestId {
        RequestId::Number(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    async fn try_start(&self, kind: TransportKind) -> Result<(), TransportError> {
        let transport = build_transport(
            kind,
            self.url.clone(),
            self.http_client.clone(),
            self.config.headers.clone(),
            Some(Arc::clone(&self.auth)),
        );
        transport.start().await?;
        *self.transport.write().await = Some(transport);
        *self.transport_kind.write().await = Some(kind);
        Ok(())
    }

    /// Drives `Disconnected -> Connecting -> Authenticating? -> Connected`.
    pub async fn connect(&self) -> ConnectionResult<()> {
        *self.state.write().await = ConnectionState::Connecting;

        self.auth.initialise().await.map_err(|e| ConnectionError::AuthFailed {
            upstream: self.name.clone(),
            source: e,
        })?;

        let strategy = self.config.transport_strategy;
        let mut kind = strategy.initial_kind();

        let start_result = match self.try_start(kind).await {
            Ok(()) => Ok(()),
            Err(error) => {
                if let Some(fallback) = strategy.fallback_kind(kind, &error) {
                    info!(upstream = %self.name, ?kind, ?fallback, "falling back to alternate transport");
                    kind = fallback;
                    self.try_start(kind).await
                } else {
                    Err(error)
                }
            }
        };

        match start_result {
            Ok(()) => {
                *self.state.write().await = ConnectionState::Connected;
                Ok(())
            }
            Err(TransportError::Unauthorised) => {
                self.authenticate_and_retry(kind).await?;
                *self.state.write().await = ConnectionState::Connected;
                Ok(())
            }
            Err(source) => Err(ConnectionError::Transport {
                upstream: self.name.clone(),
                source,
            }),
        }
    }

    async fn authenticate_and_retry(&self, kind: TransportKind) -> ConnectionResult<()> {
        *self.state.write().await = ConnectionState::Authenticating;

        let mut server = mcpfuse_auth::CallbackServer::bind(self.callback_port)
            .await
            .map_err(|e| ConnectionError::AuthFailed {
                upstream: self.name.clone(),
                source: e,
            })?;

        let (auth_url, expected_state) =
            self.auth.get_authorization_url().await.map_err(|e| ConnectionError::AuthFailed {
                upstream: self.name.clone(),
                source: e,
            })?;

        if let Err(e) = webbrowser::open(&auth_url) {
            warn!(upstream = %self.name, error = %e, url = %auth_url, "failed to open browser, authorize manually at the logged url");
        }

        let (code, returned_state) = server
            .wait_for_code(AUTH_TIMEOUT, std::future::pending())
            .await
            .map_err(|e| ConnectionError::AuthFailed {
                upstream: self.name.clone(),
                source: e,
            })?;
        server.shutdown().await;

        if returned_state != expected_state {
            return Err(ConnectionError::Unauthorised {
                upstream: self.name.clone(),
            });
        }

        self.auth
            .exchange_code(&code, &returned_state)
            .await
            .map_err(|e| ConnectionError::AuthFailed {
                upstream: self.name.clone(),
                source: e,
            })?;

        self.try_start(kind).await.map_err(|source| ConnectionError::Transport {
            upstream: self.name.clone(),
            source,
        })
    }

    /// `Connected -> Listed`: fetches and caches `tools/list`, applying the
    /// upstream's include/ignore filter before storing the result.
    pub async fn list_tools(&self) -> ConnectionResult<()> {
        let transport = self.current_transport().await?;
        let request = Message::request(self.next_request_id(), "tools/list", Some(serde_json::json!({})));

        let response = tokio::time::timeout(LIST_TOOLS_TIMEOUT, transport.send_receive(request))
            .await
            .map_err(|_| ConnectionError::ListTimeout {
                upstream: self.name.clone(),
            })?
            .map_err(|source| ConnectionError::Transport {
                upstream: self.name.clone(),
                source,
            })?;

        let value = response.into_result().map_err(|e| ConnectionError::UpstreamError {
            upstream: self.name.clone(),
            code: e.code,
            message: e.message,
        })?;

        let parsed: mcpfuse_protocol::ListToolsResult = serde_json::from_value(value).map_err(|e| {
            ConnectionError::Transport {
                upstream: self.name.clone(),
                source: TransportError::Decode(e.to_string()),
            }
        })?;

        let filtered: Vec<ToolInfo> = parsed
            .tools
            .into_iter()
            .filter(|t| self.filter.allows(&t.name))
            .collect();

        *self.tools.write().await = filtered;
        *self.state.write().await = ConnectionState::Listed;
        debug!(upstream = %self.name, count = self.tools.read().await.len(), "listed tools");
        Ok(())
    }

    pub async fn tools(&self) -> Vec<ToolInfo> {
        self.tools.read().await.clone()
    }

    async fn current_transport(&self) -> ConnectionResult<Arc<dyn Transport>> {
        self.transport
            .read()
            .await
            .clone()
            .ok_or(ConnectionError::Closed {
                upstream: self.name.clone(),
            })
    }

    /// Sends `tools/call` for the already-unprefixed `tool_name`.
    pub async fn execute_tool(&self, tool_name: &str, arguments: Value) -> ConnectionResult<Value> {
        let transport = self.current_transport().await?;
        let params = CallToolParams {
            name: tool_name.to_string(),
            arguments,
        };
        let params = serde_json::to_value(params).map_err(|e| ConnectionError::Transport {
            upstream: self.name.clone(),
            source: TransportError::Decode(e.to_string()),
        })?;
        let request = Message::request(self.next_request_id(), "tools/call", Some(params));

        let response = tokio::time::timeout(CALL_TOOL_TIMEOUT, transport.send_receive(request))
            .await
            .map_err(|_| ConnectionError::CallTimeout {
                upstream: self.name.clone(),
                tool: tool_name.to_string(),
            })?
            .map_err(|source| ConnectionError::Transport {
                upstream: self.name.clone(),
                source,
            })?;

        response.into_result().map_err(|e| ConnectionError::UpstreamError {
            upstream: self.name.clone(),
            code: e.code,
            message: e.message,
        })
    }

    pub async fn close(&self) {
        if let Some(transport) = self.transport.write().await.take() {
            transport.close().await;
        }
        *self.state.write().await = ConnectionState::Closed;
    }
}
