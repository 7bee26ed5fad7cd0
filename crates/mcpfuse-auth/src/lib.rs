//! OAuth 2.0 client for MCP upstreams: PKCE, RFC 8414 discovery, RFC 7591
//! dynamic client registration, durable token persistence, and the loopback
//! callback server used during an interactive authorization flow.

pub mod callback;
pub mod dcr;
pub mod discovery;
pub mod error;
pub mod pkce;
pub mod provider;
pub mod token_store;

pub use callback::{CallbackOutcome, CallbackServer};
pub use dcr::{DcrClient, RegistrationRequest, RegistrationResponse};
pub use discovery::{MetadataFetcher, ServerMetadata};
pub use error::{AuthError, Result};
pub use pkce::{PkceChallenge, compute_s256_challenge, generate_state};
pub use provider::{OAuthProvider, ProviderConfig, StaticClientConfig};
pub use token_store::{StoredClient, StoredTokens, TokenStore};
