use std::{fmt, io};

use regex::Error as RegexError;
use serde::{Deserialize, Serialize};
use serde_json::Error as JsonError;
use serde_yaml::Error as YamlError;
use thiserror::Error;

/// The resource a [`ContextNetworkError::NodeResourceLimitExceeded`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitKind {
    /// Raw byte size of a single node's source.
    NodeSize,
    /// Number of nodes in the network.
    NetworkSize,
    /// Tokens in a single node's rendered content.
    NodeTokens,
    /// Tokens summed over the network.
    NetworkTokens,
}

impl fmt::Display for LimitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            LimitKind::NodeSize => "node size (bytes)",
            LimitKind::NetworkSize => "network size (nodes)",
            LimitKind::NodeTokens => "node tokens",
            LimitKind::NetworkTokens => "network tokens",
        };
        f.write_str(label)
    }
}

fn fmt_location(location: &Option<(usize, usize)>) -> String {
    match location {
        Some((line, column)) => format!(" at line {line}, column {column}"),
        None => String::new(),
    }
}

fn fmt_suggestions(suggestions: &[String]) -> String {
    if suggestions.is_empty() {
        String::new()
    } else {
        format!(" (did you mean: {}?)", suggestions.join(", "))
    }
}

fn fmt_node(node: &Option<String>) -> String {
    match node {
        Some(id) => format!(" for node '{id}'"),
        None => String::new(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
pub enum ContextNetworkError {
    #[error("Format detection failed: {0}")]
    FormatDetection(String),
    #[error("Failed to parse {format} content in '{path}'{}: {message}", fmt_location(.location))]
    FormatParse {
        format: String,
        path: String,
        message: String,
        /// (line, column), 1-based, when the parser reports one
        location: Option<(usize, usize)>,
    },
    #[error("JSON conversion error: {0}")]
    JsonConversion(String),
    #[error("Malformed reference: {0}")]
    ReferenceSyntax(String),
    #[error("Reference '{path}' from '{referenced_from}' could not be resolved{}", fmt_suggestions(.suggestions))]
    NodeReferenceNotFound {
        path: String,
        referenced_from: String,
        suggestions: Vec<String>,
    },
    #[error("Path resolution error: {0}")]
    PathResolution(String),
    #[error("Reference cycle detected: {}", .cycle.join(" -> "))]
    NodeNetworkValidation { cycle: Vec<String> },
    #[error("Reference chain depth {depth} exceeds the maximum of {max_depth}")]
    NodeNetworkDepthExceeded { depth: usize, max_depth: usize },
    #[error("Resource limit exceeded{}: {kind} is {current}, maximum is {maximum}", fmt_node(.node))]
    NodeResourceLimitExceeded {
        node: Option<String>,
        kind: LimitKind,
        current: usize,
        maximum: usize,
    },
    #[error("Token counting error: {0}")]
    TokenCounting(String),
    #[error("File System error: {0}")]
    Io(String),
    #[error("(De)Serialization error: {0}")]
    Serialization(String),
}

impl ContextNetworkError {
    pub(crate) fn parse_error<F: fmt::Display, P: AsRef<str>, M: fmt::Display>(
        format: F,
        path: P,
        message: M,
        location: Option<(usize, usize)>,
    ) -> Self {
        ContextNetworkError::FormatParse {
            format: format.to_string(),
            path: path.as_ref().to_string(),
            message: message.to_string(),
            location,
        }
    }

    pub(crate) fn not_found<P: AsRef<str>, R: AsRef<str>>(path: P, referenced_from: R) -> Self {
        ContextNetworkError::NodeReferenceNotFound {
            path: path.as_ref().to_string(),
            referenced_from: referenced_from.as_ref().to_string(),
            suggestions: Vec::new(),
        }
    }

    /// True for the errors a missing or unreachable reference target produces.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ContextNetworkError::NodeReferenceNotFound { .. })
    }
}

impl From<io::Error> for ContextNetworkError {
    fn from(x: io::Error) -> Self {
        match x.kind() {
            io::ErrorKind::NotFound => ContextNetworkError::Io(format!("Not found: {x}")),
            io::ErrorKind::PermissionDenied => {
                ContextNetworkError::Io(format!("Permission denied: {x}"))
            }
            _ => ContextNetworkError::Io(format!("IOError: {}", x.kind())),
        }
    }
}

impl From<JsonError> for ContextNetworkError {
    fn from(src: JsonError) -> ContextNetworkError {
        ContextNetworkError::Serialization(format!("JSON (de)serialization error: {src}"))
    }
}

impl From<YamlError> for ContextNetworkError {
    fn from(src: YamlError) -> ContextNetworkError {
        ContextNetworkError::Serialization(format!("YAML (de)serialization error: {src}"))
    }
}

impl From<toml::de::Error> for ContextNetworkError {
    fn from(src: toml::de::Error) -> ContextNetworkError {
        ContextNetworkError::Serialization(format!("Toml deserialization error: {src}"))
    }
}

impl From<toml::ser::Error> for ContextNetworkError {
    fn from(src: toml::ser::Error) -> ContextNetworkError {
        ContextNetworkError::Serialization(format!("Toml serialization error: {src}"))
    }
}

impl From<RegexError> for ContextNetworkError {
    fn from(x: RegexError) -> Self {
        ContextNetworkError::Serialization(format!("Regex parse failed: {x}"))
    }
}

impl From<fmt::Error> for ContextNetworkError {
    fn from(x: fmt::Error) -> Self {
        ContextNetworkError::Serialization(format!("{x}"))
    }
}
