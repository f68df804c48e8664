//! Node and reference types shared by the codecs, the builder and the renderer.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::{collections::BTreeMap, fmt, str::FromStr};
use url::Url;
use uuid::Uuid;

use crate::{codec::FormatParserRegistry, error::ContextNetworkError};

/// Prefix marking a reference (or node id) that names a node identifier instead of a path.
pub const ID_PREFIX: &str = "id:";

/// Prefix given to the generated ids of nodes that do not live on the filesystem.
pub const IN_MEMORY_PREFIX: &str = "mem:";

/// Metadata key holding a node's semantic label.
pub const SEMANTIC_TYPE_KEY: &str = "semantic_type";

/// Source syntax of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeFormat {
    Yaml,
    Markdown,
    Template,
    Json,
}

impl NodeFormat {
    pub const ALL: [NodeFormat; 4] = [
        NodeFormat::Yaml,
        NodeFormat::Markdown,
        NodeFormat::Template,
        NodeFormat::Json,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            NodeFormat::Yaml => "yaml",
            NodeFormat::Markdown => "markdown",
            NodeFormat::Template => "template",
            NodeFormat::Json => "json",
        }
    }

    /// Info string used when content of this format is fenced inside text output.
    pub fn fence_label(&self) -> &'static str {
        match self {
            NodeFormat::Yaml => "yaml",
            NodeFormat::Markdown => "markdown",
            NodeFormat::Template => "jinja",
            NodeFormat::Json => "json",
        }
    }

    /// Markdown and templates render to text; YAML and JSON render to structures.
    pub fn is_textual(&self) -> bool {
        matches!(self, NodeFormat::Markdown | NodeFormat::Template)
    }
}

impl fmt::Display for NodeFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for NodeFormat {
    type Err = ContextNetworkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "yaml" | "yml" => Ok(NodeFormat::Yaml),
            "markdown" | "md" => Ok(NodeFormat::Markdown),
            "template" | "jinja" | "jinja2" | "j2" => Ok(NodeFormat::Template),
            "json" => Ok(NodeFormat::Json),
            other => Err(ContextNetworkError::FormatDetection(format!(
                "unknown format name '{other}'"
            ))),
        }
    }
}

/// How a reference names its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReferenceType {
    File,
    Id,
    Uri,
}

impl ReferenceType {
    /// `id:` prefixed targets are ids, targets with a URL scheme are URIs, anything else is a file
    /// path.
    pub fn infer(path: &str) -> ReferenceType {
        if path.starts_with(ID_PREFIX) {
            ReferenceType::Id
        } else if has_url_scheme(path) {
            ReferenceType::Uri
        } else {
            ReferenceType::File
        }
    }
}

/// True when `path` parses as an absolute URL. Single letter schemes are treated as Windows drive
/// letters, not URLs.
pub fn has_url_scheme(path: &str) -> bool {
    match Url::parse(path) {
        Ok(url) => url.scheme().len() > 1,
        Err(_) => false,
    }
}

/// A reference as written in a node's source. Only checked when the builder resolves it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeReference {
    pub path: String,
    #[serde(rename = "type")]
    pub ref_type: ReferenceType,
    pub label: Option<String>,
}

impl NodeReference {
    pub fn new<P: Into<String>>(path: P, label: Option<String>) -> NodeReference {
        let path = path.into();
        NodeReference {
            ref_type: ReferenceType::infer(&path),
            path,
            label: label.filter(|l| !l.is_empty()),
        }
    }

    /// Label to display for this reference, falling back to the path.
    pub fn display_label(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.path)
    }
}

/// A unit of content in a [`NodeNetwork`](crate::network::NodeNetwork).
///
/// `children` holds the ids of resolved references, aligned index-for-index with `references`.
/// It is empty until the builder resolves the node and is never changed afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextNode {
    id: String,
    content: JsonValue,
    format: NodeFormat,
    semantic_type: Option<String>,
    references: Vec<NodeReference>,
    children: Vec<String>,
    metadata: BTreeMap<String, JsonValue>,
    source: String,
}

impl ContextNode {
    /// Parse `source` with the parser registered under `parser_name` and assemble a node.
    pub fn parse(
        id: String,
        source: String,
        parser_name: &str,
        registry: &FormatParserRegistry,
    ) -> Result<ContextNode, ContextNetworkError> {
        let parser = registry.get_parser(parser_name)?;
        let parsed = parser.parse(&source, &id)?;
        let content = parser.to_json(&parsed)?;
        let references = parser.extract_references(&parsed)?;
        let mut metadata = parser.metadata(&parsed)?;
        lift_metadata(&content, &mut metadata);
        let semantic_type = metadata
            .get(SEMANTIC_TYPE_KEY)
            .and_then(|v| v.as_str())
            .map(|s| s.to_string());
        tracing::debug!(
            "Parsed node '{}' as {} with {} reference(s)",
            id,
            parser.format(),
            references.len()
        );
        Ok(ContextNode {
            id,
            content,
            format: parser.format(),
            semantic_type,
            references,
            children: Vec::new(),
            metadata,
            source,
        })
    }

    /// Build a node that does not live on the filesystem. It receives a generated `mem:` id.
    pub fn from_text(
        source: &str,
        format: NodeFormat,
        registry: &FormatParserRegistry,
    ) -> Result<ContextNode, ContextNetworkError> {
        let id = format!("{IN_MEMORY_PREFIX}{}", Uuid::new_v4());
        ContextNode::parse(id, source.to_string(), format.name(), registry)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn content(&self) -> &JsonValue {
        &self.content
    }

    pub fn format(&self) -> NodeFormat {
        self.format
    }

    pub fn semantic_type(&self) -> Option<&str> {
        self.semantic_type.as_deref()
    }

    pub fn references(&self) -> &[NodeReference] {
        &self.references
    }

    pub fn children(&self) -> &[String] {
        &self.children
    }

    pub fn metadata(&self) -> &BTreeMap<String, JsonValue> {
        &self.metadata
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn raw_size(&self) -> usize {
        self.source.len()
    }

    /// The resolved node id for the first reference written as `path`, if resolved.
    pub fn resolved_child(&self, path: &str) -> Option<&str> {
        self.references
            .iter()
            .position(|r| r.path == path)
            .and_then(|idx| self.children.get(idx))
            .map(|s| s.as_str())
    }

    pub fn with_semantic_type<S: Into<String>>(mut self, semantic_type: S) -> Self {
        let semantic_type = semantic_type.into();
        self.metadata.insert(
            SEMANTIC_TYPE_KEY.to_string(),
            JsonValue::String(semantic_type.clone()),
        );
        self.semantic_type = Some(semantic_type);
        self
    }

    pub(crate) fn attach_children(&mut self, children: Vec<String>) {
        debug_assert_eq!(children.len(), self.references.len());
        self.children = children;
    }
}

/// Lift top-level `semantic_type` and `metadata` keys of structured content into the metadata bag.
/// Keys already present (for example from Markdown front matter) win.
fn lift_metadata(content: &JsonValue, metadata: &mut BTreeMap<String, JsonValue>) {
    let Some(object) = content.as_object() else {
        return;
    };
    if let Some(JsonValue::Object(extra)) = object.get("metadata") {
        merge_missing(metadata, extra);
    }
    if let Some(semantic_type @ JsonValue::String(_)) = object.get(SEMANTIC_TYPE_KEY) {
        metadata
            .entry(SEMANTIC_TYPE_KEY.to_string())
            .or_insert_with(|| semantic_type.clone());
    }
}

fn merge_missing(metadata: &mut BTreeMap<String, JsonValue>, extra: &Map<String, JsonValue>) {
    for (key, value) in extra {
        metadata
            .entry(key.clone())
            .or_insert_with(|| value.clone());
    }
}
