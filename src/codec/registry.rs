// Format parser registry
//
// Maps file extensions and content signatures to a registered parser. Instances are built
// explicitly and handed to the builder by reference; there is no process-wide registry.

use std::collections::HashMap;

use crate::{
    codec::FormatParser,
    error::ContextNetworkError,
    properties::NodeFormat,
};

/// Registered parsers, in registration order, with an O(1) extension table.
#[derive(Debug, Clone, Default)]
pub struct FormatParserRegistry {
    parsers: Vec<(String, FormatParser)>,
    by_name: HashMap<String, usize>,
    by_extension: HashMap<String, usize>,
}

fn normalize_extension(ext: &str) -> String {
    ext.trim().trim_start_matches('.').to_lowercase()
}

/// Extension of the final path component, lowercased, without the dot.
fn path_extension(path: &str) -> Option<String> {
    let path = path.split(['#', '?']).next().unwrap_or(path);
    let filename = path.rsplit(['/', '\\']).next().unwrap_or(path);
    match filename.rfind('.') {
        Some(0) | None => None,
        Some(idx) => Some(normalize_extension(&filename[idx + 1..])),
    }
}

impl FormatParserRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the four built-in parsers. Content sniffing tries them in the order
    /// registered here, most specific signature first.
    pub fn with_defaults() -> Self {
        let mut registry = FormatParserRegistry::new();
        registry.register(
            NodeFormat::Json.name(),
            FormatParser::for_format(NodeFormat::Json),
            &["json"],
        );
        registry.register(
            NodeFormat::Yaml.name(),
            FormatParser::for_format(NodeFormat::Yaml),
            &["yaml", "yml"],
        );
        registry.register(
            NodeFormat::Template.name(),
            FormatParser::for_format(NodeFormat::Template),
            &["j2", "jinja", "jinja2"],
        );
        registry.register(
            NodeFormat::Markdown.name(),
            FormatParser::for_format(NodeFormat::Markdown),
            &["md", "markdown"],
        );
        registry
    }

    /// Register `parser` under `name` for the given extensions.
    ///
    /// Re-registering a name replaces its parser in place, keeping its detection position.
    /// Extensions always point at the most recent registration that claimed them.
    pub fn register<S: Into<String>>(&mut self, name: S, parser: FormatParser, extensions: &[&str]) {
        let name = name.into();
        let idx = match self.by_name.get(&name) {
            Some(idx) => {
                tracing::info!(
                    "[FormatParserRegistry::register] Overwriting existing parser: {}",
                    name
                );
                self.parsers[*idx].1 = parser;
                *idx
            }
            None => {
                self.parsers.push((name.clone(), parser));
                self.by_name.insert(name, self.parsers.len() - 1);
                self.parsers.len() - 1
            }
        };
        for ext in extensions {
            self.by_extension.insert(normalize_extension(ext), idx);
        }
    }

    pub fn get_parser(&self, name: &str) -> Result<&FormatParser, ContextNetworkError> {
        self.by_name
            .get(name)
            .map(|idx| &self.parsers[*idx].1)
            .ok_or_else(|| {
                ContextNetworkError::FormatDetection(format!("no parser registered as '{name}'"))
            })
    }

    /// Name of the parser for `content` found at `path`: extension table first, then each
    /// parser's own detection in registration order.
    pub fn detect_format(&self, content: &str, path: &str) -> Result<&str, ContextNetworkError> {
        if let Some(idx) = path_extension(path).and_then(|ext| self.by_extension.get(&ext)) {
            return Ok(&self.parsers[*idx].0);
        }
        self.parsers
            .iter()
            .find(|(_, parser)| parser.detect(content, path))
            .map(|(name, _)| name.as_str())
            .ok_or_else(|| {
                ContextNetworkError::FormatDetection(format!(
                    "no registered parser recognizes '{path}'"
                ))
            })
    }

    /// As [`detect_format`](Self::detect_format), unless `forced` names a registered parser.
    pub fn detect_format_with_hint<'a>(
        &'a self,
        content: &str,
        path: &str,
        forced: Option<&'a str>,
    ) -> Result<&'a str, ContextNetworkError> {
        match forced {
            Some(name) => {
                self.get_parser(name)?;
                Ok(name)
            }
            None => self.detect_format(content, path),
        }
    }

    pub fn names(&self) -> Vec<&str> {
        self.parsers.iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn extensions(&self) -> Vec<&str> {
        let mut extensions: Vec<&str> = self.by_extension.keys().map(|s| s.as_str()).collect();
        extensions.sort();
        extensions
    }

    /// Whether the extension of `path` is registered.
    pub fn handles_path(&self, path: &str) -> bool {
        path_extension(path)
            .map(|ext| self.by_extension.contains_key(&ext))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_dispatch() {
        let registry = FormatParserRegistry::with_defaults();
        let cases = [
            ("a.yaml", "yaml"),
            ("dir/a.YML", "yaml"),
            ("a.md", "markdown"),
            ("a.markdown", "markdown"),
            ("a.j2", "template"),
            ("a.jinja", "template"),
            ("a.json", "json"),
            ("a.json#frag", "json"),
        ];
        for (path, expected) in cases {
            assert_eq!(registry.detect_format("", path).unwrap(), expected, "{path}");
        }
    }

    #[test]
    fn test_content_fallback() {
        let registry = FormatParserRegistry::with_defaults();
        assert_eq!(registry.detect_format("{\"a\": 1}", "blob").unwrap(), "json");
        assert_eq!(registry.detect_format("name: x\n", "blob").unwrap(), "yaml");
        assert_eq!(
            registry.detect_format("Hi {{ name }}", "blob").unwrap(),
            "template"
        );
        assert_eq!(
            registry.detect_format("# Title\n\nBody", "blob").unwrap(),
            "markdown"
        );
        assert!(matches!(
            registry.detect_format("plain words", "blob.txt"),
            Err(ContextNetworkError::FormatDetection(_))
        ));
    }

    #[test]
    fn test_first_registered_wins() {
        let mut registry = FormatParserRegistry::new();
        registry.register("md-first", FormatParser::for_format(NodeFormat::Markdown), &[]);
        registry.register("tpl", FormatParser::for_format(NodeFormat::Template), &[]);
        // Both detectors claim this content.
        let content = "# {{ title }}\n";
        assert_eq!(registry.detect_format(content, "x").unwrap(), "md-first");
        assert_eq!(
            registry
                .detect_format_with_hint(content, "x", Some("tpl"))
                .unwrap(),
            "tpl"
        );
        assert!(registry
            .detect_format_with_hint(content, "x", Some("nope"))
            .is_err());
    }

    #[test]
    fn test_reregister_replaces() {
        let mut registry = FormatParserRegistry::with_defaults();
        registry.register("yaml", FormatParser::for_format(NodeFormat::Json), &["cfg"]);
        assert_eq!(registry.names(), vec!["json", "yaml", "template", "markdown"]);
        assert_eq!(registry.get_parser("yaml").unwrap().format(), NodeFormat::Json);
        assert_eq!(registry.detect_format("", "a.cfg").unwrap(), "yaml");
        assert!(registry.handles_path("x/y.cfg"));
        assert!(!registry.handles_path("x/y.txt"));
    }
}
