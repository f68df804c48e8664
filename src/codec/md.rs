use once_cell::sync::Lazy;
use pulldown_cmark::{
    CodeBlockKind, Event as MdEvent, HeadingLevel, LinkType, Options, Parser as MdParser,
    Tag as MdTag, TagEnd as MdTagEnd,
};
use regex::Regex;
use serde_json::{json, Map, Value as JsonValue};
use std::{collections::BTreeMap, ops::Range};

use crate::{
    codec::{yaml::yaml_to_json, FormatCodec},
    error::ContextNetworkError,
    properties::{NodeFormat, NodeReference},
};

/// Link schemes that point outside the network. Links using them are never references.
pub const EXTERNAL_SCHEMES: &[&str] = &["http://", "https://", "mailto:", "ftp://", "tel:"];

static MD_SIGNATURE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?m)(^#{1,6}\s+\S|\[[^\]\n]*\]\([^)\n]*\)|^\s*([-*+]|\d+\.)\s+\S|^```|^>\s|\*\*[^*\n]+\*\*)",
    )
    .expect("static markdown signature regex")
});

static LIST_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*([-*+]|\d+[.)])\s+(\[[ xX]\]\s+)?").expect("static list regex"));

pub fn context_md_options() -> Options {
    let mut md_options = Options::empty();
    // Enabled explicitly rather than through Options::all() for reproducible parses.
    md_options.insert(Options::ENABLE_FOOTNOTES);
    md_options.insert(Options::ENABLE_GFM);
    md_options.insert(Options::ENABLE_STRIKETHROUGH);
    md_options.insert(Options::ENABLE_TABLES);
    md_options.insert(Options::ENABLE_TASKLISTS);
    md_options.insert(Options::ENABLE_YAML_STYLE_METADATA_BLOCKS);
    md_options
}

/// True for link destinations that leave the network (web pages, mail addresses).
pub fn is_external_link(dest: &str) -> bool {
    let lower = dest.trim().to_lowercase();
    EXTERNAL_SCHEMES.iter().any(|scheme| lower.starts_with(scheme))
}

/// An inline link found while parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkdownLink {
    pub dest: String,
    pub label: String,
    /// Byte range of the whole `[label](dest)` construct.
    pub span: Range<usize>,
}

/// Parsed Markdown: the normalized heading/paragraph tree plus the inline links and front matter.
#[derive(Debug, Clone, PartialEq)]
pub struct MarkdownDocument {
    pub source: String,
    pub tree: JsonValue,
    pub frontmatter: Option<JsonValue>,
    pub links: Vec<MarkdownLink>,
}

/// Markdown codec. References are inline links whose destination is not an external URL.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MarkdownParser;

#[derive(Debug)]
enum BlockKind {
    Heading(u8),
    Paragraph,
    Code(Option<String>),
    List(bool),
    Quote,
    Html,
    Table,
    Metadata,
    Other,
}

impl BlockKind {
    fn from_tag(tag: &MdTag<'_>) -> BlockKind {
        match tag {
            MdTag::Heading { level, .. } => BlockKind::Heading(heading_level(*level)),
            MdTag::Paragraph => BlockKind::Paragraph,
            MdTag::CodeBlock(CodeBlockKind::Fenced(info)) => {
                let language = info.split_whitespace().next().map(|s| s.to_string());
                BlockKind::Code(language)
            }
            MdTag::CodeBlock(CodeBlockKind::Indented) => BlockKind::Code(None),
            MdTag::List(start) => BlockKind::List(start.is_some()),
            MdTag::BlockQuote(_) => BlockKind::Quote,
            MdTag::HtmlBlock => BlockKind::Html,
            MdTag::Table(_) => BlockKind::Table,
            MdTag::MetadataBlock(_) => BlockKind::Metadata,
            _ => BlockKind::Other,
        }
    }
}

fn heading_level(level: HeadingLevel) -> u8 {
    match level {
        HeadingLevel::H1 => 1,
        HeadingLevel::H2 => 2,
        HeadingLevel::H3 => 3,
        HeadingLevel::H4 => 4,
        HeadingLevel::H5 => 5,
        HeadingLevel::H6 => 6,
    }
}

/// A section under construction: level 0 is the document itself.
#[derive(Debug, Default)]
struct SectionAccumulator {
    level: u8,
    title: String,
    blocks: Vec<JsonValue>,
    sections: Vec<JsonValue>,
}

impl SectionAccumulator {
    fn into_json(self) -> JsonValue {
        json!({
            "type": "section",
            "level": self.level,
            "title": self.title,
            "blocks": self.blocks,
            "sections": self.sections,
        })
    }
}

struct TreeBuilder {
    stack: Vec<SectionAccumulator>,
}

impl TreeBuilder {
    fn new() -> TreeBuilder {
        TreeBuilder {
            stack: vec![SectionAccumulator::default()],
        }
    }

    fn close_to(&mut self, level: u8) {
        while self.stack.len() > 1 && self.stack.last().map(|s| s.level >= level).unwrap_or(false)
        {
            if let Some(done) = self.stack.pop() {
                if let Some(parent) = self.stack.last_mut() {
                    parent.sections.push(done.into_json());
                }
            }
        }
    }

    fn heading(&mut self, level: u8, title: String) {
        self.close_to(level);
        self.stack.push(SectionAccumulator {
            level,
            title,
            ..Default::default()
        });
    }

    fn block(&mut self, block: JsonValue) {
        if let Some(current) = self.stack.last_mut() {
            current.blocks.push(block);
        }
    }

    fn finish(mut self, frontmatter: &Option<JsonValue>) -> JsonValue {
        self.close_to(1);
        let document = self.stack.pop().unwrap_or_default();
        let mut object = Map::new();
        object.insert("type".to_string(), JsonValue::from("document"));
        if let Some(frontmatter) = frontmatter {
            object.insert("frontmatter".to_string(), frontmatter.clone());
        }
        object.insert("blocks".to_string(), JsonValue::from(document.blocks));
        object.insert("sections".to_string(), JsonValue::from(document.sections));
        JsonValue::Object(object)
    }
}

fn line_column(source: &str, offset: usize) -> (usize, usize) {
    let before = &source[..offset.min(source.len())];
    let line = before.matches('\n').count() + 1;
    let column = before.rfind('\n').map(|idx| offset - idx).unwrap_or(offset + 1);
    (line, column)
}

#[derive(Debug)]
struct LinkAccumulator {
    inline: bool,
    dest: String,
    label: String,
    start: usize,
}

impl MarkdownParser {
    fn block_json(
        kind: BlockKind,
        source: &str,
        range: Range<usize>,
        text: String,
        items: Vec<String>,
    ) -> Option<JsonValue> {
        let slice = source[range].trim_end().to_string();
        match kind {
            BlockKind::Paragraph => Some(json!({"type": "paragraph", "text": slice})),
            BlockKind::Code(language) => {
                Some(json!({"type": "code_block", "language": language, "text": text}))
            }
            BlockKind::List(ordered) => {
                Some(json!({"type": "list", "ordered": ordered, "items": items}))
            }
            BlockKind::Quote => Some(json!({"type": "block_quote", "text": slice})),
            BlockKind::Html => Some(json!({"type": "html", "text": slice})),
            BlockKind::Table => Some(json!({"type": "table", "text": slice})),
            BlockKind::Other => Some(json!({"type": "block", "text": slice})),
            BlockKind::Heading(_) | BlockKind::Metadata => None,
        }
    }

    fn parse_frontmatter(
        yaml: &str,
        source: &str,
        block_start: usize,
        path: &str,
    ) -> Result<JsonValue, ContextNetworkError> {
        let value: serde_yaml::Value = serde_yaml::from_str(yaml).map_err(|e| {
            // Front matter content begins on the line after the opening `---`.
            let (block_line, _) = line_column(source, block_start);
            let location = e.location().map(|l| (block_line + l.line(), l.column()));
            ContextNetworkError::parse_error(
                NodeFormat::Markdown,
                path,
                format!("invalid front matter: {e}"),
                location,
            )
        })?;
        yaml_to_json(&value)
    }
}

impl FormatCodec for MarkdownParser {
    type Parsed = MarkdownDocument;

    fn format(&self) -> NodeFormat {
        NodeFormat::Markdown
    }

    fn detect(&self, content: &str, path: &str) -> bool {
        let lower = path.to_lowercase();
        lower.ends_with(".md") || lower.ends_with(".markdown") || MD_SIGNATURE.is_match(content)
    }

    #[tracing::instrument(skip(self, content))]
    fn parse(&self, content: &str, path: &str) -> Result<MarkdownDocument, ContextNetworkError> {
        let mut tree = TreeBuilder::new();
        let mut frontmatter = None;
        let mut links = Vec::new();

        let mut depth = 0usize;
        let mut current: Option<(BlockKind, Range<usize>)> = None;
        let mut text = String::new();
        let mut items = Vec::new();
        let mut link: Option<LinkAccumulator> = None;

        for (event, offset) in MdParser::new_ext(content, context_md_options()).into_offset_iter()
        {
            match &event {
                MdEvent::Start(tag) => {
                    if depth == 0 {
                        current = Some((BlockKind::from_tag(tag), offset.clone()));
                        text.clear();
                        items.clear();
                    } else if depth == 1 && matches!(tag, MdTag::Item) {
                        let item = LIST_MARKER.replace(content[offset.clone()].trim_end(), "");
                        items.push(item.to_string());
                    }
                    if let MdTag::Link {
                        link_type,
                        dest_url,
                        ..
                    } = tag
                    {
                        link = Some(LinkAccumulator {
                            inline: *link_type == LinkType::Inline,
                            dest: dest_url.to_string(),
                            label: String::new(),
                            start: offset.start,
                        });
                    }
                    depth += 1;
                }
                MdEvent::End(tag_end) => {
                    depth = depth.saturating_sub(1);
                    if let MdTagEnd::Link = tag_end {
                        if let Some(done) = link.take() {
                            if done.inline {
                                links.push(MarkdownLink {
                                    dest: done.dest,
                                    label: done.label,
                                    span: done.start..offset.end,
                                });
                            }
                        }
                    }
                    if depth == 0 {
                        if let Some((kind, range)) = current.take() {
                            match kind {
                                BlockKind::Heading(level) => {
                                    tree.heading(level, text.trim().to_string())
                                }
                                BlockKind::Metadata => {
                                    frontmatter = Some(Self::parse_frontmatter(
                                        &text,
                                        content,
                                        range.start,
                                        path,
                                    )?);
                                }
                                kind => {
                                    if let Some(block) = Self::block_json(
                                        kind,
                                        content,
                                        range,
                                        std::mem::take(&mut text),
                                        std::mem::take(&mut items),
                                    ) {
                                        tree.block(block);
                                    }
                                }
                            }
                        }
                    }
                }
                MdEvent::Text(cow) | MdEvent::Code(cow) => {
                    text.push_str(cow);
                    if let Some(acc) = link.as_mut() {
                        acc.label.push_str(cow);
                    }
                }
                MdEvent::SoftBreak | MdEvent::HardBreak => {
                    text.push('\n');
                    if let Some(acc) = link.as_mut() {
                        acc.label.push(' ');
                    }
                }
                MdEvent::Rule if depth == 0 => tree.block(json!({"type": "rule"})),
                _ => {}
            }
        }

        let tree = tree.finish(&frontmatter);
        Ok(MarkdownDocument {
            source: content.to_string(),
            tree,
            frontmatter,
            links,
        })
    }

    fn to_json(&self, parsed: &MarkdownDocument) -> Result<JsonValue, ContextNetworkError> {
        Ok(parsed.tree.clone())
    }

    fn extract_references(
        &self,
        parsed: &MarkdownDocument,
    ) -> Result<Vec<NodeReference>, ContextNetworkError> {
        let mut refs = Vec::new();
        for link in parsed.links.iter() {
            let dest = link.dest.trim();
            if dest.is_empty() {
                let (line, column) = line_column(&parsed.source, link.span.start);
                return Err(ContextNetworkError::ReferenceSyntax(format!(
                    "link '[{}]()' at line {line}, column {column} has an empty destination",
                    link.label
                )));
            }
            if dest.starts_with('#') || is_external_link(dest) {
                continue;
            }
            refs.push(NodeReference::new(dest, Some(link.label.trim().to_string())));
        }
        Ok(refs)
    }

    fn metadata(
        &self,
        parsed: &MarkdownDocument,
    ) -> Result<BTreeMap<String, JsonValue>, ContextNetworkError> {
        let mut metadata = BTreeMap::new();
        match &parsed.frontmatter {
            Some(JsonValue::Object(object)) => {
                for (key, value) in object {
                    metadata.insert(key.clone(), value.clone());
                }
            }
            Some(JsonValue::Null) | None => {}
            Some(other) => {
                metadata.insert("frontmatter".to_string(), other.clone());
            }
        }
        Ok(metadata)
    }
}
