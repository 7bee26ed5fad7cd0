//! Transport-level error kinds shared by the HTTP and SSE implementations.
//!
//! Mirrors `turbomcp-transport`'s `TransportError`: classified HTTP/protocol
//! failures carry enough structure for the selector (`crate::selector`) and
//! `mcpfuse-core::connection` to branch on `matches!` instead of parsing
//! strings.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, TransportError>;

#[derive(Debug, Error)]
pub enum TransportError {
    /// The upstream responded 401. The caller (`Connection`) should attempt
    /// the interactive OAuth flow and retry once.
    #[error("upstream returned unauthorised")]
    Unauthorised,

    /// The upstream responded 404. The selector may fall back to another
    /// transport kind depending on strategy.
    #[error("upstream returned not found")]
    NotFound,

    /// The upstream responded 405. The selector may fall back depending on
    /// strategy.
    #[error("upstream returned method not allowed")]
    MethodNotAllowed,

    /// The SSE `endpoint` event pointed at a URL whose scheme or host differs
    /// from the server URL.
    #[error("sse endpoint event failed origin check: {0}")]
    OriginMismatch(String),

    /// The endpoint-ready signal never fired before `Start` gave up.
    #[error("timed out waiting for the sse endpoint event")]
    EndpointTimeout,

    /// The transport (or the connection it belongs to) was closed; no
    /// further requests can be served.
    #[error("transport is closed")]
    Closed,

    /// A `SendReceive` call was cancelled by its caller before a response
    /// arrived. Does not tear down the transport.
    #[error("request was cancelled")]
    Cancelled,

    /// A frame or response body did not parse as a JSON-RPC message.
    #[error("failed to decode message: {0}")]
    Decode(String),

    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),

    #[error("unexpected http status {status}")]
    UnexpectedStatus { status: u16 },
}

impl TransportError {
    /// Classifies a response status into the specific variants the selector
    /// and connection state machine care about, or `None` for anything else.
    pub fn classify_status(status: u16) -> Option<Self> {
        match status {
            401 => Some(Self::Unauthorised),
            404 => Some(Self::NotFound),
            405 => Some(Self::MethodNotAllowed),
            _ => None,
        }
    }
}
