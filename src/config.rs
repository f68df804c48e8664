use crate::error::ContextNetworkError;
use serde::{Deserialize, Serialize};
use std::{fs::read_to_string, path::Path};

pub const DEFAULT_MAX_DEPTH: usize = 10;
pub const DEFAULT_MAX_NODE_SIZE: usize = 10 * 1024 * 1024;
pub const DEFAULT_MAX_NETWORK_SIZE: usize = 1000;
pub const DEFAULT_TOKEN_MODEL: &str = "gpt-4";

/// Limits and token settings for a single network build.
///
/// The struct is treated as immutable once handed to the builder. Per-call overrides are made
/// with the `with_*` methods, which return an updated copy:
///
/// ```rust
/// use context_network::config::NetworkConfig;
///
/// let config = NetworkConfig::default()
///     .with_max_depth(4)
///     .with_max_tokens_per_network(Some(8_000));
/// assert_eq!(config.max_depth, 4);
/// assert_eq!(config.max_network_size, 1000);
/// ```
///
/// The same fields can be read from TOML, any missing key keeping its default:
///
/// ```toml
/// max_depth = 6
/// max_node_size = 65536
/// token_model = "claude-3"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Maximum number of nodes on any reference chain, root included.
    pub max_depth: usize,
    /// Maximum raw source size of one node, in bytes. Inclusive.
    pub max_node_size: usize,
    /// Maximum number of distinct nodes in the network. Inclusive.
    pub max_network_size: usize,
    pub max_tokens_per_node: Option<usize>,
    pub max_tokens_per_network: Option<usize>,
    /// Model identifier handed to the token counter.
    pub token_model: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        NetworkConfig {
            max_depth: DEFAULT_MAX_DEPTH,
            max_node_size: DEFAULT_MAX_NODE_SIZE,
            max_network_size: DEFAULT_MAX_NETWORK_SIZE,
            max_tokens_per_node: None,
            max_tokens_per_network: None,
            token_model: DEFAULT_TOKEN_MODEL.to_string(),
        }
    }
}

impl NetworkConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ContextNetworkError> {
        Ok(toml::from_str(content)?)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ContextNetworkError> {
        tracing::debug!("Reading network config from {:?}", path.as_ref());
        let content = read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn to_toml_string(&self) -> Result<String, ContextNetworkError> {
        Ok(toml::to_string(self)?)
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_max_node_size(mut self, max_node_size: usize) -> Self {
        self.max_node_size = max_node_size;
        self
    }

    pub fn with_max_network_size(mut self, max_network_size: usize) -> Self {
        self.max_network_size = max_network_size;
        self
    }

    pub fn with_max_tokens_per_node(mut self, max_tokens: Option<usize>) -> Self {
        self.max_tokens_per_node = max_tokens;
        self
    }

    pub fn with_max_tokens_per_network(mut self, max_tokens: Option<usize>) -> Self {
        self.max_tokens_per_network = max_tokens;
        self
    }

    pub fn with_token_model<S: Into<String>>(mut self, model: S) -> Self {
        self.token_model = model.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = NetworkConfig::default();
        assert_eq!(config.max_depth, 10);
        assert_eq!(config.max_node_size, 10 * 1024 * 1024);
        assert_eq!(config.max_network_size, 1000);
        assert_eq!(config.max_tokens_per_node, None);
        assert_eq!(config.max_tokens_per_network, None);
        assert_eq!(config.token_model, "gpt-4");
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = NetworkConfig::from_toml_str(
            r#"
max_depth = 3
max_tokens_per_node = 500
token_model = "claude-3-opus"
"#,
        )
        .unwrap();
        assert_eq!(config.max_depth, 3);
        assert_eq!(config.max_tokens_per_node, Some(500));
        assert_eq!(config.token_model, "claude-3-opus");
        assert_eq!(config.max_network_size, DEFAULT_MAX_NETWORK_SIZE);
    }

    #[test]
    fn test_invalid_toml_is_serialization_error() {
        let err = NetworkConfig::from_toml_str("max_depth = \"deep\"").unwrap_err();
        assert!(matches!(err, ContextNetworkError::Serialization(_)));
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = NetworkConfig::default()
            .with_max_node_size(2048)
            .with_max_tokens_per_network(Some(10));
        let text = config.to_toml_string().unwrap();
        assert_eq!(NetworkConfig::from_toml_str(&text).unwrap(), config);
    }
}
