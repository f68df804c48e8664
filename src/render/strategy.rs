use serde_json::{Map, Value as JsonValue};
use std::ops::Range;

use crate::{
    codec::{
        md::is_external_link,
        refs::{structured_reference, RefShape},
        template::{scan_tags, tag_reference, TagKind},
        FormatCodec, MarkdownParser,
    },
    error::ContextNetworkError,
    properties::{ContextNode, NodeFormat},
    render::{Embedded, InlineContext, Rendered, RenderMode},
};

/// One reference syntax's substitution pass.
pub trait ReferenceStrategy {
    fn name(&self) -> &'static str;

    /// Whether this strategy rewrites content of nodes in `format`.
    fn handles(&self, format: NodeFormat) -> bool;

    /// Rewrite the references of `node` found in `content`, which is `node` rendered so far in
    /// its own format.
    fn apply(
        &self,
        node: &ContextNode,
        content: Rendered,
        ctx: &mut InlineContext<'_>,
    ) -> Result<Rendered, ContextNetworkError>;
}

/// Compact pointer to `path` in the syntax of a text target.
fn text_pointer(target: NodeFormat, path: &str, label: &str) -> String {
    match target {
        NodeFormat::Template => format!("{{# ref: {path} #}}"),
        _ => format!("[{label}]({path})"),
    }
}

/// Replacement text for one byte range of a node's source.
struct Edit {
    span: Range<usize>,
    text: String,
    block: bool,
}

impl Edit {
    fn inline(span: Range<usize>, text: String) -> Self {
        Edit {
            span,
            text,
            block: false,
        }
    }
}

impl From<(Range<usize>, Embedded)> for Edit {
    fn from((span, embedded): (Range<usize>, Embedded)) -> Self {
        Edit {
            span,
            text: embedded.text,
            block: embedded.block,
        }
    }
}

/// Replace byte ranges of `source`. `edits` must be sorted and non-overlapping. Block edits are
/// moved onto lines of their own.
fn splice(source: &str, edits: Vec<Edit>) -> String {
    let mut out = String::with_capacity(source.len());
    let mut cursor = 0;
    for edit in edits {
        out.push_str(&source[cursor..edit.span.start]);
        if edit.block && !out.is_empty() && !out.ends_with('\n') {
            out.push('\n');
        }
        out.push_str(&edit.text);
        let rest = &source[edit.span.end..];
        if edit.block && !rest.is_empty() && !rest.starts_with('\n') {
            out.push('\n');
        }
        cursor = edit.span.end;
    }
    out.push_str(&source[cursor..]);
    out
}

/// `[label](path)` links in Markdown.
///
/// Links are located with the Markdown parser, so links inside code spans and fenced blocks stay
/// untouched. Images, anchors and external URLs are never substituted.
#[derive(Debug, Clone, Copy, Default)]
pub struct MarkdownLinkStrategy;

impl ReferenceStrategy for MarkdownLinkStrategy {
    fn name(&self) -> &'static str {
        "markdown-link"
    }

    fn handles(&self, format: NodeFormat) -> bool {
        format == NodeFormat::Markdown
    }

    fn apply(
        &self,
        node: &ContextNode,
        content: Rendered,
        ctx: &mut InlineContext<'_>,
    ) -> Result<Rendered, ContextNetworkError> {
        let Rendered::Text(text) = content else {
            return Ok(content);
        };
        let document = match MarkdownParser.parse(&text, node.id()) {
            Ok(document) => document,
            Err(e) => {
                tracing::warn!("Leaving links of '{}' as written: {e}", node.id());
                return Ok(Rendered::Text(text));
            }
        };
        let mut edits = Vec::new();
        for link in document.links {
            let dest = link.dest.trim();
            if dest.is_empty() || dest.starts_with('#') || is_external_link(dest) {
                continue;
            }
            let edit = match ctx.mode() {
                RenderMode::Full => ctx
                    .embed_text(node, dest)?
                    .map(|embedded| Edit::from((link.span.clone(), embedded))),
                RenderMode::FileFirst => {
                    let label = if link.label.is_empty() {
                        dest
                    } else {
                        link.label.as_str()
                    };
                    let pointer = text_pointer(ctx.target(), &ctx.pointer_path(node, dest), label);
                    Some(Edit::inline(link.span.clone(), pointer))
                }
            };
            edits.extend(edit);
        }
        Ok(Rendered::Text(splice(&text, edits)))
    }
}

/// `{# ref: path #}` comments and literal `{% include "path" %}` statements in templates.
///
/// In `FileFirst` mode includes are kept as written for template targets, since they are already
/// that target's pointer syntax.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateRefStrategy;

impl ReferenceStrategy for TemplateRefStrategy {
    fn name(&self) -> &'static str {
        "template-ref"
    }

    fn handles(&self, format: NodeFormat) -> bool {
        format == NodeFormat::Template
    }

    fn apply(
        &self,
        node: &ContextNode,
        content: Rendered,
        ctx: &mut InlineContext<'_>,
    ) -> Result<Rendered, ContextNetworkError> {
        let Rendered::Text(text) = content else {
            return Ok(content);
        };
        let tags = match scan_tags(&text, node.id()) {
            Ok(tags) => tags,
            Err(e) => {
                tracing::warn!("Leaving template references of '{}' as written: {e}", node.id());
                return Ok(Rendered::Text(text));
            }
        };
        let mut edits = Vec::new();
        for tag in tags {
            let Ok(Some(path)) = tag_reference(&tag) else {
                continue;
            };
            let edit = match ctx.mode() {
                RenderMode::Full => ctx
                    .embed_text(node, &path)?
                    .map(|embedded| Edit::from((tag.span.clone(), embedded))),
                RenderMode::FileFirst
                    if tag.kind == TagKind::Statement && ctx.target() == NodeFormat::Template =>
                {
                    None
                }
                RenderMode::FileFirst => {
                    let pointer = text_pointer(ctx.target(), &ctx.pointer_path(node, &path), &path);
                    Some(Edit::inline(tag.span.clone(), pointer))
                }
            };
            edits.extend(edit);
        }
        Ok(Rendered::Text(splice(&text, edits)))
    }
}

/// `$ref` objects and `{type: reference}` objects in YAML and JSON structures.
///
/// Both shapes are recognized in either format. Pointers are written in the target's shape:
/// reference objects for JSON, `$ref` for YAML, and the shape as found for text targets.
#[derive(Debug, Clone, Copy, Default)]
pub struct StructuredRefStrategy;

impl StructuredRefStrategy {
    fn rewrite(
        &self,
        node: &ContextNode,
        value: JsonValue,
        ctx: &mut InlineContext<'_>,
    ) -> Result<JsonValue, ContextNetworkError> {
        if let Ok(Some((reference, shape))) = structured_reference(&value) {
            return match ctx.mode() {
                RenderMode::Full => Ok(ctx.embed_value(node, &reference.path)?.unwrap_or(value)),
                RenderMode::FileFirst => {
                    let shape = match ctx.target() {
                        NodeFormat::Json => RefShape::ReferenceObject,
                        NodeFormat::Yaml => RefShape::DollarRef,
                        _ => shape,
                    };
                    let path = ctx.pointer_path(node, &reference.path);
                    Ok(shape.pointer(&path, reference.label.as_deref()))
                }
            };
        }
        match value {
            JsonValue::Object(object) => {
                let mut out = Map::new();
                for (key, child) in object {
                    let child = self.rewrite(node, child, ctx)?;
                    out.insert(key, child);
                }
                Ok(JsonValue::Object(out))
            }
            JsonValue::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for child in items {
                    out.push(self.rewrite(node, child, ctx)?);
                }
                Ok(JsonValue::Array(out))
            }
            other => Ok(other),
        }
    }
}

impl ReferenceStrategy for StructuredRefStrategy {
    fn name(&self) -> &'static str {
        "structured-ref"
    }

    fn handles(&self, format: NodeFormat) -> bool {
        !format.is_textual()
    }

    fn apply(
        &self,
        node: &ContextNode,
        content: Rendered,
        ctx: &mut InlineContext<'_>,
    ) -> Result<Rendered, ContextNetworkError> {
        match content {
            Rendered::Structured(value) => Ok(Rendered::Structured(self.rewrite(node, value, ctx)?)),
            text => Ok(text),
        }
    }
}
