//! Rendering a node back into a target format, either inlining referenced content (`Full`) or
//! keeping compact pointers to it (`FileFirst`).
//!
//! Substitution is split into single-purpose strategies composed by one [`ReferenceInliner`]:
//!
//! - [`MarkdownLinkStrategy`] - `[label](path)` links in Markdown text
//! - [`TemplateRefStrategy`] - `{# ref: path #}` comments and literal includes in templates
//! - [`StructuredRefStrategy`] - `$ref` / reference objects in YAML and JSON structures
//!
//! Rendering is lenient where building is strict: a link that does not match any node in the
//! network is left as written. Text nodes are rendered in their own syntax and converted to the
//! target last. A child whose format differs from the target (JSON inside Markdown output,
//! Markdown inside template output) is embedded as a fenced code block tagged with the child's
//! format, placed on lines of its own.

use serde_json::Value as JsonValue;
use std::fmt;

use crate::{
    error::ContextNetworkError,
    network::NodeNetwork,
    properties::{ContextNode, NodeFormat},
};

pub mod strategy;

pub use strategy::{
    MarkdownLinkStrategy, ReferenceStrategy, StructuredRefStrategy, TemplateRefStrategy,
};

/// How references are rendered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum RenderMode {
    /// Substitute every resolvable reference with the referenced node's rendered content.
    #[default]
    Full,
    /// Replace references with compact pointers in the target syntax, without recursing.
    FileFirst,
}

impl fmt::Display for RenderMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderMode::Full => f.write_str("full"),
            RenderMode::FileFirst => f.write_str("file-first"),
        }
    }
}

impl std::str::FromStr for RenderMode {
    type Err = ContextNetworkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "full" | "inline" => Ok(RenderMode::Full),
            "file-first" | "file_first" | "filefirst" | "compact" => Ok(RenderMode::FileFirst),
            other => Err(ContextNetworkError::Serialization(format!(
                "unknown render mode '{other}'"
            ))),
        }
    }
}

/// Rendered output: text for Markdown and templates, a structure for YAML and JSON.
#[derive(Debug, Clone, PartialEq)]
pub enum Rendered {
    Text(String),
    Structured(JsonValue),
}

impl Rendered {
    /// Serialize as `format`. Structures become YAML or pretty-printed JSON.
    pub fn into_string(self, format: NodeFormat) -> Result<String, ContextNetworkError> {
        match self {
            Rendered::Text(text) => Ok(text),
            Rendered::Structured(value) => match format {
                NodeFormat::Yaml => Ok(serde_yaml::to_string(&value)?),
                _ => Ok(serde_json::to_string_pretty(&value)?),
            },
        }
    }

    pub fn into_value(self) -> JsonValue {
        match self {
            Rendered::Text(text) => JsonValue::String(text),
            Rendered::Structured(value) => value,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Rendered::Text(text) => Some(text),
            Rendered::Structured(_) => None,
        }
    }

    /// Shape `self`, produced in `from` format, for output as `target`.
    fn convert(self, from: NodeFormat, target: NodeFormat) -> Result<Rendered, ContextNetworkError> {
        Ok(match (self, target.is_textual()) {
            (Rendered::Text(text), true) => Rendered::Text(text),
            (Rendered::Structured(value), false) => Rendered::Structured(value),
            (structured @ Rendered::Structured(_), true) => {
                Rendered::Text(structured.into_string(from)?)
            }
            (Rendered::Text(text), false) => Rendered::Structured(JsonValue::String(text)),
        })
    }
}

/// Wrap `text` in a fenced code block tagged with `format`.
pub fn fenced(format: NodeFormat, text: &str) -> String {
    let fence = if text.contains("```") { "````" } else { "```" };
    format!(
        "{fence}{}\n{}\n{fence}",
        format.fence_label(),
        text.trim_end_matches('\n')
    )
}

/// Markdown source without a leading `---` front matter block.
pub fn strip_frontmatter(source: &str) -> &str {
    let Some(rest) = source.strip_prefix("---\n") else {
        return source;
    };
    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        offset += line.len();
        if line.trim_end() == "---" || line.trim_end() == "..." {
            return rest[offset..].trim_start_matches('\n');
        }
    }
    source
}

/// Text of an embedded node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Embedded {
    pub text: String,
    /// A fenced code block, which only parses as one when it starts and ends a line.
    pub block: bool,
}

/// Per-render state handed to the strategies.
pub struct InlineContext<'a> {
    inliner: &'a ReferenceInliner,
    network: Option<&'a NodeNetwork>,
    target: NodeFormat,
    mode: RenderMode,
    trail: Vec<String>,
}

impl<'a> InlineContext<'a> {
    pub fn target(&self) -> NodeFormat {
        self.target
    }

    pub fn mode(&self) -> RenderMode {
        self.mode
    }

    /// The node `path` refers to from `from`, if the network knows it.
    pub fn lookup(&self, from: &ContextNode, path: &str) -> Option<&'a ContextNode> {
        self.network.and_then(|network| network.lookup(path, Some(from)))
    }

    /// Id to use in a compact pointer: the resolved id when known, else the path as written.
    pub fn pointer_path(&self, from: &ContextNode, path: &str) -> String {
        self.lookup(from, path)
            .map(|node| node.id().to_string())
            .unwrap_or_else(|| path.to_string())
    }

    fn render_child(
        &mut self,
        child: &'a ContextNode,
    ) -> Result<Option<Rendered>, ContextNetworkError> {
        if self.trail.iter().any(|id| id == child.id()) {
            tracing::warn!(
                "Not inlining '{}' inside itself (render trail: {})",
                child.id(),
                self.trail.join(" -> ")
            );
            return Ok(None);
        }
        self.trail.push(child.id().to_string());
        let inliner = self.inliner;
        let rendered = inliner.render_node(child, self);
        self.trail.pop();
        rendered.map(Some)
    }

    /// Rendered text of the node `path` refers to, fenced when its format differs from the target.
    /// `None` leaves the reference literal.
    pub fn embed_text(
        &mut self,
        from: &ContextNode,
        path: &str,
    ) -> Result<Option<Embedded>, ContextNetworkError> {
        let Some(child) = self.lookup(from, path) else {
            tracing::debug!("No node for '{path}' in '{}', leaving it literal", from.id());
            return Ok(None);
        };
        let Some(rendered) = self.render_child(child)? else {
            return Ok(None);
        };
        let text = rendered.into_string(child.format())?;
        if child.format() == self.target {
            Ok(Some(Embedded {
                text: text.trim_end_matches('\n').to_string(),
                block: false,
            }))
        } else {
            Ok(Some(Embedded {
                text: fenced(child.format(), &text),
                block: true,
            }))
        }
    }

    /// Rendered value of the node `path` refers to: structures as-is, text as a string.
    pub fn embed_value(
        &mut self,
        from: &ContextNode,
        path: &str,
    ) -> Result<Option<JsonValue>, ContextNetworkError> {
        let Some(child) = self.lookup(from, path) else {
            tracing::debug!("No node for '{path}' in '{}', leaving it literal", from.id());
            return Ok(None);
        };
        Ok(self.render_child(child)?.map(Rendered::into_value))
    }

    pub(crate) fn is_nested(&self) -> bool {
        self.trail.len() > 1
    }
}

/// Composes the per-syntax strategies and renders nodes for a target format.
pub struct ReferenceInliner {
    strategies: Vec<Box<dyn ReferenceStrategy + Send + Sync>>,
}

impl Default for ReferenceInliner {
    fn default() -> Self {
        ReferenceInliner {
            strategies: vec![
                Box::new(MarkdownLinkStrategy),
                Box::new(TemplateRefStrategy),
                Box::new(StructuredRefStrategy),
            ],
        }
    }
}

impl fmt::Debug for ReferenceInliner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReferenceInliner")
            .field(
                "strategies",
                &self.strategies.iter().map(|s| s.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl ReferenceInliner {
    /// An inliner with no strategies. Every reference renders as written.
    pub fn empty() -> Self {
        ReferenceInliner {
            strategies: Vec::new(),
        }
    }

    pub fn with_strategy<S: ReferenceStrategy + Send + Sync + 'static>(mut self, strategy: S) -> Self {
        self.strategies.push(Box::new(strategy));
        self
    }

    /// Render `node` from `network` as `target`.
    pub fn inline_references(
        &self,
        node: &ContextNode,
        network: &NodeNetwork,
        target: NodeFormat,
        mode: RenderMode,
    ) -> Result<Rendered, ContextNetworkError> {
        self.render(node, Some(network), target, mode)
    }

    /// Render `node` without a network. Nothing can be inlined; in `FileFirst` mode references
    /// are still rewritten into the target's pointer syntax using the paths as written.
    pub fn render_standalone(
        &self,
        node: &ContextNode,
        target: NodeFormat,
        mode: RenderMode,
    ) -> Result<Rendered, ContextNetworkError> {
        self.render(node, None, target, mode)
    }

    fn render(
        &self,
        node: &ContextNode,
        network: Option<&NodeNetwork>,
        target: NodeFormat,
        mode: RenderMode,
    ) -> Result<Rendered, ContextNetworkError> {
        let mut ctx = InlineContext {
            inliner: self,
            network,
            target,
            mode,
            trail: vec![node.id().to_string()],
        };
        let own = self.render_node(node, &mut ctx)?;
        own.convert(node.format(), target)
    }

    /// Render `node` in its own format, applying every strategy that handles that format.
    fn render_node(
        &self,
        node: &ContextNode,
        ctx: &mut InlineContext<'_>,
    ) -> Result<Rendered, ContextNetworkError> {
        let mut content = match node.format() {
            NodeFormat::Markdown if ctx.is_nested() => {
                Rendered::Text(strip_frontmatter(node.source()).to_string())
            }
            format if format.is_textual() => Rendered::Text(node.source().to_string()),
            _ => Rendered::Structured(node.content().clone()),
        };
        for strategy in self.strategies.iter().filter(|s| s.handles(node.format())) {
            content = strategy.apply(node, content, ctx)?;
        }
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::FormatParserRegistry;
    use serde_json::json;

    #[test]
    fn test_fenced() {
        assert_eq!(
            fenced(NodeFormat::Json, "{\"a\": 1}\n"),
            "```json\n{\"a\": 1}\n```"
        );
        assert!(fenced(NodeFormat::Markdown, "```sh\nls\n```").starts_with("````markdown\n"));
    }

    #[test]
    fn test_strip_frontmatter() {
        assert_eq!(strip_frontmatter("---\na: 1\n---\n\n# Body\n"), "# Body\n");
        assert_eq!(strip_frontmatter("# Body\n"), "# Body\n");
        assert_eq!(strip_frontmatter("---\nunterminated\n"), "---\nunterminated\n");
    }

    #[test]
    fn test_convert_between_shapes() {
        let structured = Rendered::Structured(json!({"a": 1}));
        let text = structured
            .convert(NodeFormat::Yaml, NodeFormat::Markdown)
            .unwrap();
        assert_eq!(text, Rendered::Text("a: 1\n".to_string()));
        let value = Rendered::Text("hello".into())
            .convert(NodeFormat::Markdown, NodeFormat::Json)
            .unwrap();
        assert_eq!(value, Rendered::Structured(json!("hello")));
    }

    #[test]
    fn test_standalone_full_render_leaves_references() {
        let registry = FormatParserRegistry::with_defaults();
        let node = ContextNode::from_text(
            "See [Analysis](instructions/analyze.md).\n",
            NodeFormat::Markdown,
            &registry,
        )
        .unwrap();
        let rendered = ReferenceInliner::default()
            .render_standalone(&node, NodeFormat::Markdown, RenderMode::Full)
            .unwrap();
        assert_eq!(
            rendered.as_text(),
            Some("See [Analysis](instructions/analyze.md).\n")
        );
    }

    #[test]
    fn test_render_mode_names() {
        assert_eq!("file-first".parse::<RenderMode>().unwrap(), RenderMode::FileFirst);
        assert_eq!("full".parse::<RenderMode>().unwrap(), RenderMode::Full);
        assert_eq!(RenderMode::FileFirst.to_string(), "file-first");
        assert!("sideways".parse::<RenderMode>().is_err());
    }
}
