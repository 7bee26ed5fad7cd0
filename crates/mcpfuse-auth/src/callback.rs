//! Loopback HTTP server that receives the OAuth authorization redirect.
//!
//! Grounded on the axum `Router`/`axum::serve` bootstrap in
//! `turbomcp-server::transport::http::run`, reduced to a single `/callback`
//! route with graceful shutdown instead of a long-lived MCP server.

use std::net::SocketAddr;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::response::{Html, IntoResponse};
use axum::routing::get;
use axum::Router;
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::error::{AuthError, Result};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

const SUCCESS_PAGE: &str = "<html><body><h1>Authorization complete</h1><p>You may close this window.</p></body></html>";
const ERROR_PAGE: &str = "<html><body><h1>Authorization failed</h1><p>You may close this window and retry.</p></body></html>";

#[derive(Debug, Deserialize)]
struct CallbackQuery {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

/// Outcome published by the `/callback` handler to whoever is waiting.
#[derive(Debug, Clone)]
pub enum CallbackOutcome {
    Code { code: String, state: String },
    Error { error: String, description: Option<String> },
}

#[derive(Clone)]
struct ServerState {
    sender: mpsc::Sender<CallbackOutcome>,
}

async fn handle_callback(
    State(state): State<ServerState>,
    Query(query): Query<CallbackQuery>,
) -> impl IntoResponse {
    if let Some(error) = query.error {
        warn!(error, "oauth provider returned an error to the callback");
        let _ = state
            .sender
            .send(CallbackOutcome::Error {
                error,
                description: query.error_description,
            })
            .await;
        return Html(ERROR_PAGE);
    }

    match (query.code, query.state) {
        (Some(code), Some(oauth_state)) if !code.is_empty() => {
            debug!("received authorization code on loopback callback");
            let _ = state
                .sender
                .send(CallbackOutcome::Code {
                    code,
                    state: oauth_state,
                })
                .await;
            Html(SUCCESS_PAGE)
        }
        _ => {
            let _ = state
                .sender
                .send(CallbackOutcome::Error {
                    error: "missing_code".to_string(),
                    description: Some("callback did not include an authorization code".to_string()),
                })
                .await;
            Html(ERROR_PAGE)
        }
    }
}

/// A running loopback callback server. Dropping this without calling
/// [`CallbackServer::shutdown`] aborts the listener task immediately.
pub struct CallbackServer {
    port: u16,
    outcomes: mpsc::Receiver<CallbackOutcome>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: tokio::task::JoinHandle<()>,
}

impl CallbackServer {
    /// Binds `127.0.0.1:{port}` (0 = any free port) and starts serving
    /// `/callback` in the background.
    pub async fn bind(port: u16) -> Result<Self> {
        let addr: SocketAddr = format!("127.0.0.1:{port}")
            .parse()
            .expect("127.0.0.1 with any port always parses");

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| AuthError::CallbackServer(e.to_string()))?;
        let bound_port = listener
            .local_addr()
            .map_err(|e| AuthError::CallbackServer(e.to_string()))?
            .port();

        let (sender, outcomes) = mpsc::channel(1);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let app = Router::new()
            .route("/callback", get(handle_callback))
            .with_state(ServerState { sender });

        info!(port = bound_port, "loopback oauth callback server listening");

        let task = tokio::spawn(async move {
            let server = axum::serve(listener, app).with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            });
            if let Err(e) = server.await {
                warn!(error = %e, "loopback callback server exited with an error");
            }
        });

        Ok(Self {
            port: bound_port,
            outcomes,
            shutdown_tx: Some(shutdown_tx),
            task,
        })
    }

    /// The actual bound port, useful when `bind(0)` was used.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Waits for the first callback outcome, honoring `timeout` and
    /// cancellation via `cancel`.
    pub async fn wait_for_code(
        &mut self,
        timeout: Duration,
        cancel: impl std::future::Future<Output = ()>,
    ) -> Result<(String, String)> {
        tokio::select! {
            outcome = self.outcomes.recv() => {
                match outcome {
                    Some(CallbackOutcome::Code { code, state }) => Ok((code, state)),
                    Some(CallbackOutcome::Error { error, description }) => {
                        Err(AuthError::CallbackError { error, description })
                    }
                    None => Err(AuthError::CallbackServer("callback channel closed".to_string())),
                }
            }
            _ = tokio::time::sleep(timeout) => Err(AuthError::CallbackTimeout),
            _ = cancel => Err(AuthError::Cancelled),
        }
    }

    /// Gracefully shuts the server down, waiting up to [`SHUTDOWN_GRACE`]
    /// for the serve task to exit before abandoning it.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        let _ = tokio::time::timeout(SHUTDOWN_GRACE, &mut self.task).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::pending;

    #[tokio::test]
    async fn delivers_code_and_state_on_success() {
        let mut server = CallbackServer::bind(0).await.unwrap();
        let port = server.port();

        let client = reqwest::Client::new();
        let url = format!("http://127.0.0.1:{port}/callback?code=abc&state=xyz");
        tokio::spawn(async move {
            let _ = client.get(url).send().await;
        });

        let (code, state) = server
            .wait_for_code(Duration::from_secs(5), pending())
            .await
            .unwrap();
        assert_eq!(code, "abc");
        assert_eq!(state, "xyz");
        server.shutdown().await;
    }

    #[tokio::test]
    async fn surfaces_provider_error() {
        let mut server = CallbackServer::bind(0).await.unwrap();
        let port = server.port();

        let client = reqwest::Client::new();
        let url = format!("http://127.0.0.1:{port}/callback?error=access_denied");
        tokio::spawn(async move {
            let _ = client.get(url).send().await;
        });

        let err = server
            .wait_for_code(Duration::from_secs(5), pending())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::CallbackError { .. }));
        server.shutdown().await;
    }

    #[tokio::test]
    async fn times_out_when_nothing_arrives() {
        let mut server = CallbackServer::bind(0).await.unwrap();
        let err = server
            .wait_for_code(Duration::from_millis(50), pending())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::CallbackTimeout));
        server.shutdown().await;
    }
}
