use serde_json::Value as JsonValue;

use crate::{
    codec::{
        refs::{collect_references, RefShape},
        FormatCodec,
    },
    error::ContextNetworkError,
    properties::{NodeFormat, NodeReference},
};

/// JSON codec. References are `{"type": "reference", "path": ..., "label": ...}` objects.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JsonParser;

impl FormatCodec for JsonParser {
    type Parsed = JsonValue;

    fn format(&self) -> NodeFormat {
        NodeFormat::Json
    }

    fn detect(&self, content: &str, _path: &str) -> bool {
        let trimmed = content.trim_start();
        (trimmed.starts_with('{') || trimmed.starts_with('['))
            && serde_json::from_str::<JsonValue>(content).is_ok()
    }

    fn parse(&self, content: &str, path: &str) -> Result<JsonValue, ContextNetworkError> {
        serde_json::from_str(content).map_err(|e| {
            let location = Some((e.line(), e.column())).filter(|(line, _)| *line > 0);
            ContextNetworkError::parse_error(NodeFormat::Json, path, e, location)
        })
    }

    fn to_json(&self, parsed: &JsonValue) -> Result<JsonValue, ContextNetworkError> {
        Ok(parsed.clone())
    }

    fn extract_references(
        &self,
        parsed: &JsonValue,
    ) -> Result<Vec<NodeReference>, ContextNetworkError> {
        let mut refs = Vec::new();
        collect_references(parsed, RefShape::ReferenceObject, &mut refs)?;
        Ok(refs)
    }
}
