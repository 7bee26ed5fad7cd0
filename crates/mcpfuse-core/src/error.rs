//! Error kinds for configuration validation, connection lifecycle, the
//! upstream manager, and tool aggregation.
//!
//! One focused `thiserror` enum per concern, the same split used between
//! `turbomcp-auth::discovery::fetcher::FetcherError` and
//! `turbomcp-transport::TransportError` rather than a single workspace
//! error type.

use mcpfuse_auth::AuthError;
use mcpfuse_transport::TransportError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("duplicate upstream name: {0}")]
    DuplicateUpstreamName(String),

    #[error("upstream {name} has an empty url")]
    EmptyUrl { name: String },

    #[error("upstream {name} url must use http or https, got: {scheme}")]
    InvalidScheme { name: String, scheme: String },

    #[error("invalid transport strategy for upstream {name}: {value}")]
    InvalidTransportStrategy { name: String, value: String },

    #[error("callback port {port} is out of range")]
    CallbackPortOutOfRange { port: u32 },

    #[error("url is not valid: {0}")]
    Url(#[from] url::ParseError),
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("upstream {upstream} requires authorisation")]
    Unauthorised { upstream: String },

    #[error("interactive authorisation for {upstream} timed out")]
    AuthTimeout { upstream: String },

    #[error("interactive authorisation for {upstream} failed: {source}")]
    AuthFailed {
        upstream: String,
        #[source]
        source: AuthError,
    },

    #[error("upstream {upstream} does not support dynamic client registration")]
    NoRegistrationSupported { upstream: String },

    #[error("transport error for upstream {upstream}: {source}")]
    Transport {
        upstream: String,
        #[source]
        source: TransportError,
    },

    #[error("listing tools for upstream {upstream} timed out")]
    ListTimeout { upstream: String },

    #[error("calling tool {tool} on upstream {upstream} timed out")]
    CallTimeout { upstream: String, tool: String },

    #[error("upstream {upstream} returned a json-rpc error {code}: {message}")]
    UpstreamError {
        upstream: String,
        code: i64,
        message: String,
    },

    #[error("connection to {upstream} is closed")]
    Closed { upstream: String },
}

pub type ConnectionResult<T> = std::result::Result<T, ConnectionError>;

#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("all {count} configured upstreams failed to connect")]
    AllUpstreamsFailed { count: usize },

    #[error("tool name {name} is ambiguous across {count} connected upstreams")]
    AmbiguousToolName { name: String, count: usize },

    #[error("no upstream named {name} is connected")]
    UnknownUpstream { name: String },

    #[error("no tool named {name} is exposed by any connected upstream")]
    UnknownTool { name: String },

    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

pub type ManagerResult<T> = std::result::Result<T, ManagerError>;

#[derive(Debug, Error)]
pub enum AggregatorError {
    #[error("invalid glob pattern {pattern}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

pub type AggregatorResult<T> = std::result::Result<T, AggregatorError>;
