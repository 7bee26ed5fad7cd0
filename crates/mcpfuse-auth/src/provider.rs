//! OAuth provider: orchestrates discovery, dynamic registration, PKCE, and
//! token lifecycle behind a single lock.
//!
//! Grounded on `turbomcp-auth::oauth2::client::OAuth2Client` for the
//! exchange/refresh shape (built on the `oauth2` crate's typestate
//! `BasicClient`), adapted to this proxy's narrower contract: one upstream,
//! one client identity, tokens always loaded/saved through a `TokenStore`
//! keyed by connection fingerprint rather than kept purely in memory.

use std::sync::Arc;

use oauth2::basic::BasicClient;
use oauth2::{AuthUrl, ClientId, CsrfToken, RedirectUrl, Scope};
use subtle::ConstantTimeEq;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::dcr::{DcrClient, RegistrationRequest};
use crate::discovery::{MetadataFetcher, ServerMetadata};
use crate::error::{AuthError, Result};
use crate::pkce::PkceChallenge;
use crate::token_store::{StoredClient, StoredTokens, TokenStore};

/// Static, pre-registered client credentials supplied via configuration,
/// used instead of dynamic registration when present.
#[derive(Debug, Clone)]
pub struct StaticClientConfig {
    pub client_id: String,
    pub client_secret: Option<String>,
}

/// Configuration needed to stand up a provider for one upstream.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub issuer: String,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
    pub static_client: Option<StaticClientConfig>,
    pub resource: Option<String>,
}

struct Inner {
    metadata: Option<ServerMetadata>,
    client_id: Option<String>,
    client_secret: Option<String>,
    tokens: Option<StoredTokens>,
    pending_pkce: Option<PkceChallenge>,
    pending_state: Option<String>,
}

/// One upstream's OAuth state machine. All mutation goes through a single
/// `tokio::sync::Mutex` so `Initialise`, `GetAuthorizationURL`,
/// `ExchangeCode`, and `RefreshToken` never race each other.
pub struct OAuthProvider {
    config: ProviderConfig,
    fingerprint: String,
    fetcher: MetadataFetcher,
    dcr: DcrClient,
    store: Arc<TokenStore>,
    http: reqwest::Client,
    inner: Mutex<Inner>,
}

impl OAuthProvider {
    pub fn new(config: ProviderConfig, fingerprint: String, store: Arc<TokenStore>) -> Result<Self> {
        Ok(Self {
            config,
            fingerprint,
            fetcher: MetadataFetcher::new()?,
            dcr: DcrClient::new()?,
            store,
            http: reqwest::Client::builder()
                .redirect(reqwest::redirect::Policy::none())
                .build()?,
            inner: Mutex::new(Inner {
                metadata: None,
                client_id: None,
                client_secret: None,
                tokens: None,
                pending_pkce: None,
                pending_state: None,
            }),
        })
    }

    /// Loads cached tokens; refreshes if expired with a refresh token;
    /// otherwise ensures a client identity (static or dynamically
    /// registered) is available for an interactive flow.
    #[instrument(skip(self), fields(fingerprint = %self.fingerprint))]
    pub async fn initialise(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;

        if let Some(static_client) = &self.config.static_client {
            inner.client_id = Some(static_client.client_id.clone());
            inner.client_secret = static_client.client_secret.clone();
        } else if let Some(stored) = self.store.load_client(&self.fingerprint)? {
            inner.client_id = Some(stored.client_id);
            inner.client_secret = stored.client_secret;
        }

        if let Some(tokens) = self.store.load_tokens(&self.fingerprint)? {
            if !tokens.is_expired() {
                debug!("loaded valid cached tokens");
                inner.tokens = Some(tokens);
                return Ok(());
            }
            if let Some(refresh_token) = tokens.refresh_token.clone() {
                inner.tokens = Some(tokens);
                drop(inner);
                match self.refresh_token_locked(&refresh_token).await {
                    Ok(()) => return Ok(()),
                    Err(e) => {
                        warn!(error = %e, "cached refresh token failed, falling back to registration");
                    }
                }
                inner = self.inner.lock().await;
            }
        }

        if inner.client_id.is_some() {
            return Ok(());
        }

        let metadata = self.ensure_metadata(&mut inner).await?;
        let registration_endpoint = metadata
            .registration_endpoint
            .clone()
            .ok_or(AuthError::NoRegistrationSupported)?;

        let request = RegistrationRequest::native_client(
            "mcpfuse",
            &self.config.redirect_uri,
            &self.config.scopes,
        );
        let registered = self.dcr.register(&registration_endpoint, &request).await?;

        self.store.save_client(
            &self.fingerprint,
            StoredClient {
                client_id: registered.client_id.clone(),
                client_secret: registered.client_secret.clone(),
            },
        )?;

        inner.client_id = Some(registered.client_id);
        inner.client_secret = registered.client_secret;
        info!("registered dynamic oauth client");
        Ok(())
    }

    /// Generates a fresh PKCE pair and `state`, returning the authorization
    /// URL the interactive flow should open.
    pub async fn get_authorization_url(&self) -> Result<(String, String)> {
        let mut inner = self.inner.lock().await;
        let metadata = self.ensure_metadata(&mut inner).await?;
        let client_id = inner
            .client_id
            .clone()
            .ok_or(AuthError::NoRegistrationSupported)?;

        let pkce = PkceChallenge::generate();
        let state = crate::pkce::generate_state();

        let auth_url = AuthUrl::new(metadata.authorization_endpoint.clone())?;
        let redirect_url = RedirectUrl::new(self.config.redirect_uri.clone())?;
        let client = BasicClient::new(ClientId::new(client_id))
            .set_auth_uri(auth_url)
            .set_redirect_uri(redirect_url);

        let mut request = client
            .authorize_url(|| CsrfToken::new(state.clone()))
            .add_scopes(self.config.scopes.iter().cloned().map(Scope::new));

        if let Some(resource) = &self.config.resource {
            request = request.add_extra_param("resource", resource.clone());
        }
        request = request.add_extra_param("code_challenge", pkce.challenge.clone());
        request = request.add_extra_param("code_challenge_method", pkce.method);

        let (url, _csrf) = request.url();

        inner.pending_pkce = Some(pkce);
        inner.pending_state = Some(state.clone());

        Ok((url.to_string(), state))
    }

    /// Validates `state` against the one generated for the in-flight
    /// attempt, then exchanges `code` for tokens.
    #[instrument(skip(self, code), fields(fingerprint = %self.fingerprint))]
    pub async fn exchange_code(&self, code: &str, state: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;

        let expected_state = inner.pending_state.take().ok_or(AuthError::StateMismatch)?;
        let matches: bool = expected_state.as_bytes().ct_eq(state.as_bytes()).into();
        if !matches {
            return Err(AuthError::StateMismatch);
        }
        let pkce = inner.pending_pkce.take().ok_or(AuthError::PkceExpired)?;
        if pkce.is_expired() {
            return Err(AuthError::PkceExpired);
        }

        let metadata = self.ensure_metadata(&mut inner).await?;
        let client_id = inner
            .client_id
            .clone()
            .ok_or(AuthError::NoRegistrationSupported)?;

        let mut params = vec![
            ("grant_type", "authorization_code".to_string()),
            ("code", code.to_string()),
            ("redirect_uri", self.config.redirect_uri.clone()),
            ("client_id", client_id),
            ("code_verifier", pkce.verifier.clone()),
        ];
        if let Some(secret) = &inner.client_secret {
            params.push(("client_secret", secret.clone()));
        }

        let response = self
            .http
            .post(&metadata.token_endpoint)
            .form(&params)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::TokenExchangeFailed {
                status: status.as_u16(),
                body,
            });
        }

        let body: TokenResponseBody = response.json().await?;
        let tokens = self.persist_token_response(body)?;
        inner.tokens = Some(tokens);
        info!("exchanged authorization code for tokens");
        Ok(())
    }

    /// Refreshes the current access token using the stored refresh token.
    pub async fn refresh_token(&self) -> Result<()> {
        let refresh_token = {
            let inner = self.inner.lock().await;
            inner
                .tokens
                .as_ref()
                .and_then(|t| t.refresh_token.clone())
                .ok_or(AuthError::NoRefreshToken)?
        };
        self.refresh_token_locked(&refresh_token).await
    }

    async fn refresh_token_locked(&self, refresh_token: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let metadata = self.ensure_metadata(&mut inner).await?;
        let client_id = inner
            .client_id
            .clone()
            .ok_or(AuthError::NoRegistrationSupported)?;

        let mut params = vec![
            ("grant_type", "refresh_token".to_string()),
            ("refresh_token", refresh_token.to_string()),
            ("client_id", client_id),
        ];
        if let Some(secret) = &inner.client_secret {
            params.push(("client_secret", secret.clone()));
        }

        let response = self
            .http
            .post(&metadata.token_endpoint)
            .form(&params)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::TokenRefreshFailed {
                status: status.as_u16(),
                body,
            });
        }

        let mut body: TokenResponseBody = response.json().await?;
        if body.refresh_token.is_none() {
            body.refresh_token = Some(refresh_token.to_string());
        }
        let tokens = self.persist_token_response(body)?;
        inner.tokens = Some(tokens);
        debug!("refreshed access token");
        Ok(())
    }

    /// Returns the current access token, refreshing first if expired.
    /// **Fails with** [`AuthError::NoTokens`] if no usable token can be
    /// produced without launching an interactive flow.
    pub async fn get_access_token(&self) -> Result<String> {
        let needs_refresh = {
            let inner = self.inner.lock().await;
            match &inner.tokens {
                Some(t) if !t.is_expired() => return Ok(t.access_token.clone()),
                Some(t) if t.refresh_token.is_some() => true,
                _ => false,
            }
        };

        if needs_refresh {
            self.refresh_token().await?;
            let inner = self.inner.lock().await;
            return inner
                .tokens
                .as_ref()
                .map(|t| t.access_token.clone())
                .ok_or(AuthError::NoTokens);
        }

        Err(AuthError::NoTokens)
    }

    async fn ensure_metadata<'a>(&self, inner: &mut tokio::sync::MutexGuard<'a, Inner>) -> Result<ServerMetadata> {
        if let Some(metadata) = &inner.metadata {
            return Ok(metadata.clone());
        }
        let metadata = self.fetcher.fetch(&self.config.issuer).await?;
        inner.metadata = Some(metadata.clone());
        Ok(metadata)
    }

    fn persist_token_response(&self, body: TokenResponseBody) -> Result<StoredTokens> {
        let expires_at = body
            .expires_in
            .map(|secs| chrono::Utc::now() + chrono::Duration::seconds(secs));
        let tokens = StoredTokens {
            access_token: body.access_token,
            refresh_token: body.refresh_token,
            expires_at,
            scopes: body
                .scope
                .map(|s| s.split_whitespace().map(str::to_string).collect())
                .unwrap_or_default(),
        };
        self.store.save_tokens(&self.fingerprint, tokens.clone())?;
        Ok(tokens)
    }
}

#[derive(Debug, serde::Deserialize)]
struct TokenResponseBody {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    scope: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn metadata_body(server: &MockServer) -> serde_json::Value {
        serde_json::json!({
            "issuer": server.uri(),
            "authorization_endpoint": format!("{}/authorize", server.uri()),
            "token_endpoint": format!("{}/token", server.uri()),
            "registration_endpoint": format!("{}/register", server.uri()),
            "code_challenge_methods_supported": ["S256"],
        })
    }

    async fn provider_with_metadata(server: &MockServer) -> OAuthProvider {
        Mock::given(method("GET"))
            .and(path("/.well-known/oauth-authorization-server"))
            .respond_with(ResponseTemplate::new(200).set_body_json(metadata_body(server)))
            .mount(server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(TokenStore::open(dir.path()).unwrap());
        OAuthProvider::new(
            ProviderConfig {
                issuer: server.uri(),
                redirect_uri: "http://127.0.0.1:0/callback".to_string(),
                scopes: vec!["mcp:tools".to_string()],
                static_client: Some(StaticClientConfig {
                    client_id: "static-client".to_string(),
                    client_secret: None,
                }),
                resource: None,
            },
            "fp1".to_string(),
            store,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn initialise_with_static_client_skips_registration() {
        let server = MockServer::start().await;
        let provider = provider_with_metadata(&server).await;
        provider.initialise().await.unwrap();

        let inner = provider.inner.lock().await;
        assert_eq!(inner.client_id.as_deref(), Some("static-client"));
    }

    #[tokio::test]
    async fn exchange_code_rejects_state_mismatch() {
        let server = MockServer::start().await;
        let provider = provider_with_metadata(&server).await;
        provider.initialise().await.unwrap();
        provider.get_authorization_url().await.unwrap();

        let err = provider.exchange_code("somecode", "wrong-state").await.unwrap_err();
        assert!(matches!(err, AuthError::StateMismatch));
    }

    #[tokio::test]
    async fn exchange_code_succeeds_with_matching_state() {
        let server = MockServer::start().await;
        let provider = provider_with_metadata(&server).await;
        provider.initialise().await.unwrap();
        let (_, state) = provider.get_authorization_url().await.unwrap();

        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "at1",
                "refresh_token": "rt1",
                "expires_in": 3600,
            })))
            .mount(&server)
            .await;

        provider.exchange_code("auth-code", &state).await.unwrap();
        let token = provider.get_access_token().await.unwrap();
        assert_eq!(token, "at1");
    }

    #[tokio::test]
    async fn get_access_token_fails_without_any_tokens() {
        let server = MockServer::start().await;
        let provider = provider_with_metadata(&server).await;
        let err = provider.get_access_token().await.unwrap_err();
        assert!(matches!(err, AuthError::NoTokens));
    }
}
