//! RFC 8414 authorization server metadata discovery.
//!
//! Grounded on `turbomcp-auth::discovery::fetcher::DiscoveryFetcher`: tries
//! candidate discovery URLs in priority order, caches successful documents
//! in memory for the process lifetime, and only a 200 with decodable JSON
//! is treated as success — anything else moves to the next candidate.

use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::error::{AuthError, Result};

/// OAuth 2.0 Authorization Server Metadata (RFC 8414), narrowed to the
/// fields this proxy needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerMetadata {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    #[serde(default)]
    pub registration_endpoint: Option<String>,
    #[serde(default)]
    pub scopes_supported: Option<Vec<String>>,
    #[serde(default)]
    pub response_types_supported: Option<Vec<String>>,
    #[serde(default)]
    pub grant_types_supported: Option<Vec<String>>,
    #[serde(default)]
    pub code_challenge_methods_supported: Option<Vec<String>>,
    #[serde(default)]
    pub token_endpoint_auth_methods_supported: Option<Vec<String>>,
}

impl ServerMetadata {
    /// MCP assumes PKCE is required: true when S256 is explicitly advertised
    /// or when the server is silent about supported methods.
    pub fn supports_pkce(&self) -> bool {
        match &self.code_challenge_methods_supported {
            Some(methods) => methods.iter().any(|m| m == "S256"),
            None => true,
        }
    }

    /// Filters `requested` down to scopes the server actually advertises.
    /// If the server doesn't advertise a scope list, everything requested
    /// passes through unfiltered.
    pub fn validate_scopes(&self, requested: &[String]) -> Vec<String> {
        match &self.scopes_supported {
            Some(supported) => requested
                .iter()
                .filter(|s| supported.contains(s))
                .cloned()
                .collect(),
            None => requested.to_vec(),
        }
    }
}

/// Fetches and in-memory-caches [`ServerMetadata`] documents, keyed by
/// issuer URL.
pub struct MetadataFetcher {
    client: reqwest::Client,
    cache: Arc<DashMap<String, ServerMetadata>>,
}

impl MetadataFetcher {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(Self {
            client,
            cache: Arc::new(DashMap::new()),
        })
    }

    /// Fetches metadata for `issuer`, trying the MCP-specific well-known URL
    /// first and the RFC 8414 default second. Returns the cached document if
    /// one was already fetched successfully for this issuer.
    pub async fn fetch(&self, issuer: &str) -> Result<ServerMetadata> {
        if let Some(cached) = self.cache.get(issuer) {
            return Ok(cached.clone());
        }

        let issuer_url = Url::parse(issuer).map_err(|e| AuthError::InvalidIssuer(e.to_string()))?;

        let candidates = [
            self.build_discovery_url(&issuer_url, true),
            self.build_discovery_url(&issuer_url, false),
        ];

        for candidate in candidates {
            debug!(issuer, url = %candidate, "probing oauth discovery endpoint");
            match self.try_fetch(&candidate).await {
                Ok(metadata) => {
                    self.cache.insert(issuer.to_string(), metadata.clone());
                    return Ok(metadata);
                }
                Err(e) => {
                    debug!(issuer, url = %candidate, error = %e, "discovery candidate failed");
                }
            }
        }

        Err(AuthError::DiscoveryFailed {
            issuer: issuer.to_string(),
        })
    }

    fn build_discovery_url(&self, issuer: &Url, mcp_specific: bool) -> String {
        let mut url = issuer.clone();
        let path = url.path().trim_end_matches('/');

        let discovery_path = if mcp_specific {
            if path.is_empty() {
                "/.well-known/oauth-authorization-server".to_string()
            } else {
                format!("/.well-known/oauth-authorization-server{path}")
            }
        } else {
            "/.well-known/oauth-authorization-server".to_string()
        };

        url.set_path(&discovery_path);
        url.to_string()
    }

    async fn try_fetch(&self, url: &str) -> Result<ServerMetadata> {
        let response = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?;

        if response.status() != reqwest::StatusCode::OK {
            return Err(AuthError::DiscoveryFailed {
                issuer: url.to_string(),
            });
        }

        let metadata: ServerMetadata = response.json().await?;
        Ok(metadata)
    }
}

impl Default for MetadataFetcher {
    fn default() -> Self {
        Self::new().expect("failed to build discovery http client")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn metadata(issuer: &str) -> serde_json::Value {
        serde_json::json!({
            "issuer": issuer,
            "authorization_endpoint": format!("{issuer}/authorize"),
            "token_endpoint": format!("{issuer}/token"),
            "registration_endpoint": format!("{issuer}/register"),
            "code_challenge_methods_supported": ["S256"],
        })
    }

    #[tokio::test]
    async fn fetches_mcp_specific_endpoint_first() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/.well-known/oauth-authorization-server"))
            .respond_with(ResponseTemplate::new(200).set_body_json(metadata(&server.uri())))
            .mount(&server)
            .await;

        let fetcher = MetadataFetcher::new().unwrap();
        let result = fetcher.fetch(&server.uri()).await.unwrap();
        assert_eq!(result.issuer, server.uri());
        assert!(result.supports_pkce());
    }

    #[tokio::test]
    async fn second_fetch_uses_cache() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(metadata(&server.uri())))
            .expect(1)
            .mount(&server)
            .await;

        let fetcher = MetadataFetcher::new().unwrap();
        fetcher.fetch(&server.uri()).await.unwrap();
        fetcher.fetch(&server.uri()).await.unwrap();
    }

    #[test]
    fn supports_pkce_defaults_true_when_silent() {
        let meta = ServerMetadata {
            issuer: "https://example.com".into(),
            authorization_endpoint: "https://example.com/authorize".into(),
            token_endpoint: "https://example.com/token".into(),
            registration_endpoint: None,
            scopes_supported: None,
            response_types_supported: None,
            grant_types_supported: None,
            code_challenge_methods_supported: None,
            token_endpoint_auth_methods_supported: None,
        };
        assert!(meta.supports_pkce());
    }

    #[test]
    fn validate_scopes_filters_unsupported() {
        let meta = ServerMetadata {
            issuer: "https://example.com".into(),
            authorization_endpoint: "https://example.com/authorize".into(),
            token_endpoint: "https://example.com/token".into(),
            registration_endpoint: None,
            scopes_supported: Some(vec!["a".into(), "b".into()]),
            response_types_supported: None,
            grant_types_supported: None,
            code_challenge_methods_supported: None,
            token_endpoint_auth_methods_supported: None,
        };
        let requested = vec!["a".to_string(), "c".to_string()];
        assert_eq!(meta.validate_scopes(&requested), vec!["a".to_string()]);
    }
}
