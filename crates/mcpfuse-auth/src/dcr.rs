//! OAuth 2.0 Dynamic Client Registration (RFC 7591).
//!
//! Grounded on `turbomcp-auth::oauth2::dcr::{DcrClient, RegistrationRequest,
//! RegistrationResponse}`, narrowed to the single `register` operation this
//! proxy needs — it registers itself once per upstream and persists the
//! result, it never updates or deletes a registration.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{AuthError, Result};

/// Client metadata sent to the upstream's registration endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationRequest {
    pub redirect_uris: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_endpoint_auth_method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grant_types: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_types: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_uri: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

impl RegistrationRequest {
    /// A registration request for a public (no client secret) native
    /// application using the authorization code + PKCE grant, the only
    /// client type this proxy ever registers as.
    pub fn native_client(client_name: &str, redirect_uri: &str, scopes: &[String]) -> Self {
        Self {
            redirect_uris: vec![redirect_uri.to_string()],
            token_endpoint_auth_method: Some("none".to_string()),
            grant_types: Some(vec![
                "authorization_code".to_string(),
                "refresh_token".to_string(),
            ]),
            response_types: Some(vec!["code".to_string()]),
            client_name: Some(client_name.to_string()),
            client_uri: None,
            scope: if scopes.is_empty() {
                None
            } else {
                Some(scopes.join(" "))
            },
        }
    }
}

/// Client registration response per RFC 7591 Section 3.2.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RegistrationResponse {
    pub client_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret_expires_at: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id_issued_at: Option<u64>,
    #[serde(flatten)]
    pub metadata: HashMap<String, serde_json::Value>,
}

/// Registers this proxy as an OAuth client against an upstream's
/// `registration_endpoint`.
pub struct DcrClient {
    http: reqwest::Client,
}

impl DcrClient {
    pub fn new() -> Result<Self> {
        Ok(Self {
            http: reqwest::Client::builder().build()?,
        })
    }

    /// Submits `request` to `registration_endpoint`. Any non-2xx response is
    /// reported as [`AuthError::RegistrationFailed`] with the endpoint's body
    /// preserved for diagnostics.
    pub async fn register(
        &self,
        registration_endpoint: &str,
        request: &RegistrationRequest,
    ) -> Result<RegistrationResponse> {
        let response = self
            .http
            .post(registration_endpoint)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::RegistrationFailed {
                status: status.as_u16(),
                body,
            });
        }

        let registered: RegistrationResponse = response.json().await?;
        Ok(registered)
    }
}

impl Default for DcrClient {
    fn default() -> Self {
        Self::new().expect("failed to build dcr http client")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn registers_native_client_successfully() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/register"))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
                "client_id": "abc123",
                "client_id_issued_at": 1_700_000_000u64,
            })))
            .mount(&server)
            .await;

        let client = DcrClient::new().unwrap();
        let request = RegistrationRequest::native_client(
            "mcpfuse",
            "http://127.0.0.1:0/callback",
            &["mcp:tools".to_string()],
        );
        let response = client
            .register(&format!("{}/register", server.uri()), &request)
            .await
            .unwrap();

        assert_eq!(response.client_id, "abc123");
        assert!(response.client_secret.is_none());
    }

    #[tokio::test]
    async fn surfaces_registration_failure_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/register"))
            .respond_with(
                ResponseTemplate::new(400).set_body_string("invalid_client_metadata"),
            )
            .mount(&server)
            .await;

        let client = DcrClient::new().unwrap();
        let request = RegistrationRequest::native_client("mcpfuse", "http://127.0.0.1:0/cb", &[]);
        let err = client
            .register(&format!("{}/register", server.uri()), &request)
            .await
            .unwrap_err();

        assert!(matches!(err, AuthError::RegistrationFailed { status: 400, .. }));
    }
}
