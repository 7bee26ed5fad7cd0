//! Configuration types for the proxy, validated once before the manager
//! fans out connections.
//!
//! Grounded on `turbomcp-proxy::config`'s plain `serde`-derived structs with
//! a manual `Default` impl; unlike that file this crate owns the only
//! validation pass (`Config::validate`), so ingestion (JSON, TOML, env) is
//! entirely the caller's concern.

use std::collections::HashMap;

use mcpfuse_transport::TransportStrategy;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};

/// Static OAuth client credentials, used instead of dynamic client
/// registration when an upstream already issued them out of band.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaticOAuthClient {
    pub client_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
}

/// Configuration for a single upstream MCP server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Unique within the configuration; used as the namespace prefix and
    /// for fingerprint derivation.
    pub name: String,

    pub url: String,

    #[serde(default)]
    pub transport_strategy: TransportStrategy,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub static_client: Option<StaticOAuthClient>,

    #[serde(default)]
    pub headers: HashMap<String, String>,

    #[serde(default)]
    pub include_tools: Vec<String>,

    #[serde(default)]
    pub ignore_tools: Vec<String>,
}

/// Top-level proxy configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub upstreams: Vec<UpstreamConfig>,

    #[serde(default = "default_callback_host")]
    pub callback_host: String,

    #[serde(default = "default_callback_port")]
    pub callback_port: u32,

    pub cache_dir: String,
}

fn default_callback_host() -> String {
    "localhost".to_string()
}

fn default_callback_port() -> u32 {
    38749
}

impl Default for Config {
    fn default() -> Self {
        Self {
            upstreams: Vec::new(),
            callback_host: default_callback_host(),
            callback_port: default_callback_port(),
            cache_dir: ".mcpfuse/cache".to_string(),
        }
    }
}

impl Config {
    /// Rejects duplicate upstream names, empty or non-http(s) URLs, and
    /// out-of-range callback ports. Run once before the manager fans out
    /// connections; individual fields are otherwise plain data.
    pub fn validate(&self) -> ConfigResult<()> {
        let mut seen = std::collections::HashSet::new();
        for upstream in &self.upstreams {
            if !seen.insert(upstream.name.as_str()) {
                return Err(ConfigError::DuplicateUpstreamName(upstream.name.clone()));
            }
            if upstream.url.trim().is_empty() {
                return Err(ConfigError::EmptyUrl {
                    name: upstream.name.clone(),
                });
            }
            let parsed = url::Url::parse(&upstream.url)?;
            if parsed.scheme() != "http" && parsed.scheme() != "https" {
                return Err(ConfigError::InvalidScheme {
                    name: upstream.name.clone(),
                    scheme: parsed.scheme().to_string(),
                });
            }
        }

        if !(1024..=65535).contains(&self.callback_port) {
            return Err(ConfigError::CallbackPortOutOfRange {
                port: self.callback_port,
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upstream(name: &str, url: &str) -> UpstreamConfig {
        UpstreamConfig {
            name: name.to_string(),
            url: url.to_string(),
            transport_strategy: TransportStrategy::default(),
            static_client: None,
            headers: HashMap::new(),
            include_tools: Vec::new(),
            ignore_tools: Vec::new(),
        }
    }

    fn base_config(upstreams: Vec<UpstreamConfig>) -> Config {
        Config {
            upstreams,
            ..Config::default()
        }
    }

    #[test]
    fn valid_config_passes() {
        let config = base_config(vec![upstream("a", "https://a.example/mcp")]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_duplicate_names() {
        let config = base_config(vec![
            upstream("a", "https://a.example/mcp"),
            upstream("a", "https://b.example/mcp"),
        ]);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::DuplicateUpstreamName(_))
        ));
    }

    #[test]
    fn rejects_empty_url() {
        let config = base_config(vec![upstream("a", "")]);
        assert!(matches!(config.validate(), Err(ConfigError::EmptyUrl { .. })));
    }

    #[test]
    fn rejects_non_http_scheme() {
        let config = base_config(vec![upstream("a", "ftp://a.example/mcp")]);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidScheme { .. })
        ));
    }

    #[test]
    fn rejects_out_of_range_callback_port() {
        let mut config = base_config(vec![upstream("a", "https://a.example/mcp")]);
        config.callback_port = 80;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::CallbackPortOutOfRange { .. })
        ));
    }
}
