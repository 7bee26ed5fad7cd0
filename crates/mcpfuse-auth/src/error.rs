use thiserror::Error;

/// Errors raised by discovery, dynamic registration, token lifecycle, and the
/// loopback callback server. Mirrors the focused-enum-per-crate convention of
/// `turbomcp-auth::discovery::fetcher::FetcherError`.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("pkce challenge expired")]
    PkceExpired,

    #[error("pkce verifier does not match challenge")]
    PkceMismatch,

    #[error("pkce method mismatch")]
    PkceMethodMismatch,

    #[error("unsupported pkce method: {0}")]
    UnsupportedPkceMethod(String),

    #[error("invalid issuer url: {0}")]
    InvalidIssuer(String),

    #[error("server metadata discovery failed at all candidate endpoints for {issuer}")]
    DiscoveryFailed { issuer: String },

    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("failed to decode json response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("dynamic client registration is not supported by this upstream")]
    NoRegistrationSupported,

    #[error("dynamic client registration failed: http {status}: {body}")]
    RegistrationFailed { status: u16, body: String },

    #[error("token exchange failed: http {status}: {body}")]
    TokenExchangeFailed { status: u16, body: String },

    #[error("token refresh failed: http {status}: {body}")]
    TokenRefreshFailed { status: u16, body: String },

    #[error("no refresh token available for this upstream")]
    NoRefreshToken,

    #[error("no usable token available without an interactive authorisation flow")]
    NoTokens,

    #[error("oauth callback reported an error: {error}{}", .description.as_ref().map(|d| format!(" ({d})")).unwrap_or_default())]
    CallbackError {
        error: String,
        description: Option<String>,
    },

    #[error("oauth callback state parameter did not match the generated value")]
    StateMismatch,

    #[error("oauth callback did not include an authorization code")]
    MissingCode,

    #[error("timed out waiting for the oauth authorization callback")]
    CallbackTimeout,

    #[error("loopback callback server failed: {0}")]
    CallbackServer(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("token cache io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid redirect or server url: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

pub type Result<T> = std::result::Result<T, AuthError>;
