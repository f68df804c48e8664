use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Value as JsonValue};
use std::ops::Range;

use crate::{
    codec::FormatCodec,
    error::ContextNetworkError,
    properties::{NodeFormat, NodeReference},
};

/// Comment body of the reference convention: `{# ref: path #}`.
static REF_COMMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^ref:\s*(?P<path>.*)$").expect("static ref comment regex"));

/// Statement body of a literal include: `{% include "path" %}`.
static INCLUDE_STMT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^include\s+(?:"(?P<dq>[^"]*)"|'(?P<sq>[^']*)')"#)
        .expect("static include regex")
});

static LEADING_IDENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-Za-z_][A-Za-z0-9_]*)").expect("static identifier regex"));

static BLOCK_STMT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^block\s+([A-Za-z_][A-Za-z0-9_]*)").expect("static block regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagKind {
    /// `{{ ... }}`
    Expression,
    /// `{% ... %}`
    Statement,
    /// `{# ... #}`
    Comment,
}

impl TagKind {
    fn from_open(c: u8) -> Option<(TagKind, &'static str)> {
        match c {
            b'{' => Some((TagKind::Expression, "}}")),
            b'%' => Some((TagKind::Statement, "%}")),
            b'#' => Some((TagKind::Comment, "#}")),
            _ => None,
        }
    }
}

/// One delimited tag of a template, with whitespace-control dashes stripped from its body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateTag {
    pub kind: TagKind,
    pub body: String,
    pub span: Range<usize>,
    pub line: usize,
    pub column: usize,
}

/// A scanned (never rendered) template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateDocument {
    pub source: String,
    pub tags: Vec<TemplateTag>,
}

impl TemplateDocument {
    /// Root names of every `{{ ... }}` expression, deduplicated in first-seen order.
    pub fn variables(&self) -> Vec<String> {
        let mut seen = Vec::new();
        for tag in self.tags.iter().filter(|t| t.kind == TagKind::Expression) {
            if let Some(captures) = LEADING_IDENT.captures(&tag.body) {
                let name = captures[1].to_string();
                if !seen.contains(&name) {
                    seen.push(name);
                }
            }
        }
        seen
    }

    /// Names of `{% block name %}` statements.
    pub fn blocks(&self) -> Vec<String> {
        self.tags
            .iter()
            .filter(|t| t.kind == TagKind::Statement)
            .filter_map(|t| BLOCK_STMT.captures(&t.body).map(|c| c[1].to_string()))
            .collect()
    }
}

/// If `tag` is a reference comment or a literal include, the referenced path.
pub(crate) fn tag_reference(tag: &TemplateTag) -> Result<Option<String>, ContextNetworkError> {
    match tag.kind {
        TagKind::Comment => match REF_COMMENT.captures(&tag.body) {
            Some(captures) => {
                let path = captures["path"].trim();
                if path.is_empty() {
                    Err(ContextNetworkError::ReferenceSyntax(format!(
                        "reference comment at line {}, column {} has no path",
                        tag.line, tag.column
                    )))
                } else if path.contains(char::is_whitespace) {
                    Err(ContextNetworkError::ReferenceSyntax(format!(
                        "reference path '{path}' at line {}, column {} contains whitespace",
                        tag.line, tag.column
                    )))
                } else {
                    Ok(Some(path.to_string()))
                }
            }
            None => Ok(None),
        },
        TagKind::Statement => Ok(INCLUDE_STMT.captures(&tag.body).and_then(|captures| {
            captures
                .name("dq")
                .or_else(|| captures.name("sq"))
                .map(|m| m.as_str().trim().to_string())
                .filter(|p| !p.is_empty())
        })),
        TagKind::Expression => Ok(None),
    }
}

fn strip_whitespace_control(body: &str) -> &str {
    let body = body.strip_prefix('-').unwrap_or(body);
    let body = body.strip_prefix('+').unwrap_or(body);
    let body = body.strip_suffix('-').unwrap_or(body);
    let body = body.strip_suffix('+').unwrap_or(body);
    body.trim()
}

fn line_column(source: &str, offset: usize) -> (usize, usize) {
    let before = &source[..offset];
    let line = before.matches('\n').count() + 1;
    let column = before.rfind('\n').map(|idx| offset - idx).unwrap_or(offset + 1);
    (line, column)
}

/// Scan `source` for delimited tags. Unterminated tags are parse errors.
pub(crate) fn scan_tags(source: &str, path: &str) -> Result<Vec<TemplateTag>, ContextNetworkError> {
    let bytes = source.as_bytes();
    let mut tags = Vec::new();
    let mut idx = 0;
    while idx + 1 < bytes.len() {
        if bytes[idx] != b'{' {
            idx += 1;
            continue;
        }
        let Some((kind, close)) = TagKind::from_open(bytes[idx + 1]) else {
            idx += 1;
            continue;
        };
        let body_start = idx + 2;
        let (line, column) = line_column(source, idx);
        let Some(close_rel) = source[body_start..].find(close) else {
            return Err(ContextNetworkError::parse_error(
                NodeFormat::Template,
                path,
                format!("unterminated tag, expected '{close}'"),
                Some((line, column)),
            ));
        };
        let body_end = body_start + close_rel;
        let end = body_end + close.len();
        tags.push(TemplateTag {
            kind,
            body: strip_whitespace_control(&source[body_start..body_end]).to_string(),
            span: idx..end,
            line,
            column,
        });
        idx = end;
    }
    Ok(tags)
}

/// Jinja-style template codec. Templates are never rendered here; the source is kept verbatim.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TemplateParser;

impl FormatCodec for TemplateParser {
    type Parsed = TemplateDocument;

    fn format(&self) -> NodeFormat {
        NodeFormat::Template
    }

    fn detect(&self, content: &str, path: &str) -> bool {
        let lower = path.to_lowercase();
        lower.ends_with(".j2")
            || lower.ends_with(".jinja")
            || lower.ends_with(".jinja2")
            || content.contains("{{")
            || content.contains("{%")
            || content.contains("{#")
    }

    fn parse(&self, content: &str, path: &str) -> Result<TemplateDocument, ContextNetworkError> {
        Ok(TemplateDocument {
            source: content.to_string(),
            tags: scan_tags(content, path)?,
        })
    }

    fn to_json(&self, parsed: &TemplateDocument) -> Result<JsonValue, ContextNetworkError> {
        Ok(json!({
            "type": "template",
            "source": parsed.source,
            "variables": parsed.variables(),
            "blocks": parsed.blocks(),
        }))
    }

    fn extract_references(
        &self,
        parsed: &TemplateDocument,
    ) -> Result<Vec<NodeReference>, ContextNetworkError> {
        let mut refs = Vec::new();
        for tag in parsed.tags.iter() {
            if let Some(path) = tag_reference(tag)? {
                refs.push(NodeReference::new(path, None));
            }
        }
        Ok(refs)
    }
}
