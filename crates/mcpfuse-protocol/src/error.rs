use thiserror::Error;

/// Errors raised while encoding or decoding a JSON-RPC envelope.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed json-rpc envelope: {0}")]
    Malformed(String),

    #[error("envelope is neither a request, a response, nor a notification")]
    Unclassifiable,

    #[error("json decode failed: {0}")]
    Decode(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ProtocolError>;
