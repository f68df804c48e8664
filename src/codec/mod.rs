//! Format parsers that turn node sources into canonical JSON plus a reference list.
//!
//! ## Key Components
//!
//! - [`FormatParser`] - closed sum type over the four supported syntaxes
//! - [`FormatCodec`] - the contract every variant implements (`detect`, `parse`, `to_json`,
//!   `extract_references`)
//! - [`FormatParserRegistry`] - maps extensions and content signatures to a parser
//!
//! ## Built-in Codecs
//!
//! | Format   | Extensions               | Reference syntax                                   |
//! |----------|--------------------------|----------------------------------------------------|
//! | YAML     | `.yaml`, `.yml`          | `{ $ref: path, label: ... }` anywhere in the tree  |
//! | Markdown | `.md`, `.markdown`       | inline link `[label](path)`                        |
//! | Template | `.j2`, `.jinja`, `.jinja2` | `{# ref: path #}` and `{% include "path" %}`     |
//! | JSON     | `.json`                  | `{"type": "reference", "path": ..., "label": ...}` |
//!
//! Parsing never evaluates anything: templates stay verbatim and reference validity is only
//! established later, when the builder resolves each reference.
//!
//! ```rust
//! use context_network::codec::FormatParserRegistry;
//!
//! let registry = FormatParserRegistry::with_defaults();
//! let name = registry.detect_format("[Analysis](instructions/analyze.md)", "prompt.md").unwrap();
//! let parser = registry.get_parser(name).unwrap();
//! let parsed = parser.parse("[Analysis](instructions/analyze.md)", "prompt.md").unwrap();
//! let refs = parser.extract_references(&parsed).unwrap();
//! assert_eq!(refs[0].path, "instructions/analyze.md");
//! assert_eq!(refs[0].label.as_deref(), Some("Analysis"));
//! ```

use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

use crate::{
    error::ContextNetworkError,
    properties::{NodeFormat, NodeReference},
};

pub mod json;
pub mod md;
pub mod refs;
pub mod registry;
pub mod template;
pub mod yaml;

pub use json::JsonParser;
pub use md::{MarkdownDocument, MarkdownParser};
pub use registry::FormatParserRegistry;
pub use template::{TemplateDocument, TemplateParser};
pub use yaml::YamlParser;

/// Contract shared by every format variant.
pub trait FormatCodec {
    /// The format-native structured value produced by [`FormatCodec::parse`].
    type Parsed;

    fn format(&self) -> NodeFormat;

    /// Best-effort content sniffing, used only when the extension table has no match.
    fn detect(&self, content: &str, path: &str) -> bool;

    fn parse(&self, content: &str, path: &str) -> Result<Self::Parsed, ContextNetworkError>;

    fn to_json(&self, parsed: &Self::Parsed) -> Result<JsonValue, ContextNetworkError>;

    /// References in extraction order (stable, left to right / depth first).
    fn extract_references(
        &self,
        parsed: &Self::Parsed,
    ) -> Result<Vec<NodeReference>, ContextNetworkError>;

    /// Format-level metadata, such as Markdown front matter.
    fn metadata(
        &self,
        _parsed: &Self::Parsed,
    ) -> Result<BTreeMap<String, JsonValue>, ContextNetworkError> {
        Ok(BTreeMap::new())
    }
}

/// Parsed, format-native content. Each variant is produced by the matching [`FormatParser`].
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedContent {
    Yaml(serde_yaml::Value),
    Markdown(MarkdownDocument),
    Template(TemplateDocument),
    Json(JsonValue),
}

impl ParsedContent {
    pub fn format(&self) -> NodeFormat {
        match self {
            ParsedContent::Yaml(_) => NodeFormat::Yaml,
            ParsedContent::Markdown(_) => NodeFormat::Markdown,
            ParsedContent::Template(_) => NodeFormat::Template,
            ParsedContent::Json(_) => NodeFormat::Json,
        }
    }
}

/// The closed set of parser variants. New formats are added as new variants.
#[derive(Debug, Clone, PartialEq)]
pub enum FormatParser {
    Yaml(YamlParser),
    Markdown(MarkdownParser),
    Template(TemplateParser),
    Json(JsonParser),
}

fn mismatch(parser: NodeFormat, parsed: &ParsedContent) -> ContextNetworkError {
    ContextNetworkError::JsonConversion(format!(
        "{} content handed to the {} parser",
        parsed.format(),
        parser
    ))
}

impl FormatParser {
    pub fn for_format(format: NodeFormat) -> FormatParser {
        match format {
            NodeFormat::Yaml => FormatParser::Yaml(YamlParser),
            NodeFormat::Markdown => FormatParser::Markdown(MarkdownParser),
            NodeFormat::Template => FormatParser::Template(TemplateParser),
            NodeFormat::Json => FormatParser::Json(JsonParser),
        }
    }

    pub fn format(&self) -> NodeFormat {
        match self {
            FormatParser::Yaml(p) => p.format(),
            FormatParser::Markdown(p) => p.format(),
            FormatParser::Template(p) => p.format(),
            FormatParser::Json(p) => p.format(),
        }
    }

    pub fn detect(&self, content: &str, path: &str) -> bool {
        match self {
            FormatParser::Yaml(p) => p.detect(content, path),
            FormatParser::Markdown(p) => p.detect(content, path),
            FormatParser::Template(p) => p.detect(content, path),
            FormatParser::Json(p) => p.detect(content, path),
        }
    }

    pub fn parse(&self, content: &str, path: &str) -> Result<ParsedContent, ContextNetworkError> {
        Ok(match self {
            FormatParser::Yaml(p) => ParsedContent::Yaml(p.parse(content, path)?),
            FormatParser::Markdown(p) => ParsedContent::Markdown(p.parse(content, path)?),
            FormatParser::Template(p) => ParsedContent::Template(p.parse(content, path)?),
            FormatParser::Json(p) => ParsedContent::Json(p.parse(content, path)?),
        })
    }

    pub fn to_json(&self, parsed: &ParsedContent) -> Result<JsonValue, ContextNetworkError> {
        match (self, parsed) {
            (FormatParser::Yaml(p), ParsedContent::Yaml(v)) => p.to_json(v),
            (FormatParser::Markdown(p), ParsedContent::Markdown(v)) => p.to_json(v),
            (FormatParser::Template(p), ParsedContent::Template(v)) => p.to_json(v),
            (FormatParser::Json(p), ParsedContent::Json(v)) => p.to_json(v),
            (parser, parsed) => Err(mismatch(parser.format(), parsed)),
        }
    }

    pub fn extract_references(
        &self,
        parsed: &ParsedContent,
    ) -> Result<Vec<NodeReference>, ContextNetworkError> {
        match (self, parsed) {
            (FormatParser::Yaml(p), ParsedContent::Yaml(v)) => p.extract_references(v),
            (FormatParser::Markdown(p), ParsedContent::Markdown(v)) => p.extract_references(v),
            (FormatParser::Template(p), ParsedContent::Template(v)) => p.extract_references(v),
            (FormatParser::Json(p), ParsedContent::Json(v)) => p.extract_references(v),
            (parser, parsed) => Err(mismatch(parser.format(), parsed)),
        }
    }

    pub fn metadata(
        &self,
        parsed: &ParsedContent,
    ) -> Result<BTreeMap<String, JsonValue>, ContextNetworkError> {
        match (self, parsed) {
            (FormatParser::Yaml(p), ParsedContent::Yaml(v)) => p.metadata(v),
            (FormatParser::Markdown(p), ParsedContent::Markdown(v)) => p.metadata(v),
            (FormatParser::Template(p), ParsedContent::Template(v)) => p.metadata(v),
            (FormatParser::Json(p), ParsedContent::Json(v)) => p.metadata(v),
            (parser, parsed) => Err(mismatch(parser.format(), parsed)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mismatched_parsed_content_is_rejected() {
        let yaml = FormatParser::for_format(NodeFormat::Yaml);
        let json = FormatParser::for_format(NodeFormat::Json);
        let parsed = json.parse("{\"a\": 1}", "a.json").unwrap();
        let err = yaml.to_json(&parsed).unwrap_err();
        assert!(matches!(err, ContextNetworkError::JsonConversion(_)));
    }

    #[test]
    fn test_for_format_roundtrip() {
        for format in NodeFormat::ALL {
            assert_eq!(FormatParser::for_format(format).format(), format);
        }
    }
}
