use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Number, Value as JsonValue};
use serde_yaml::Value as YamlValue;

use crate::{
    codec::{
        refs::{collect_references, RefShape},
        FormatCodec,
    },
    error::ContextNetworkError,
    properties::{NodeFormat, NodeReference},
};

/// A first significant line that looks like `key: value`, `key:` or `- item`.
static YAML_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^(-\s|-$|[^\s#{\[][^:]*:(\s|$)|"[^"]*":(\s|$)|'[^']*':(\s|$))"#)
        .expect("static yaml line regex")
});

/// YAML codec. References are `{ $ref: path }` mappings anywhere in the tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct YamlParser;

impl FormatCodec for YamlParser {
    type Parsed = YamlValue;

    fn format(&self) -> NodeFormat {
        NodeFormat::Yaml
    }

    fn detect(&self, content: &str, _path: &str) -> bool {
        let trimmed = content.trim_start();
        if trimmed.is_empty() || trimmed.starts_with('{') || trimmed.starts_with('[') {
            return false;
        }
        if content.contains("{%") || content.contains("{{") {
            return false;
        }
        let first_line = content
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty() && !line.starts_with('#') && *line != "---");
        match first_line {
            Some(line) if YAML_LINE.is_match(line) => matches!(
                serde_yaml::from_str::<YamlValue>(content),
                Ok(YamlValue::Mapping(_)) | Ok(YamlValue::Sequence(_))
            ),
            _ => false,
        }
    }

    fn parse(&self, content: &str, path: &str) -> Result<YamlValue, ContextNetworkError> {
        if content.trim().is_empty() {
            return Ok(YamlValue::Null);
        }
        serde_yaml::from_str(content).map_err(|e| {
            let location = e.location().map(|l| (l.line(), l.column()));
            ContextNetworkError::parse_error(NodeFormat::Yaml, path, e, location)
        })
    }

    fn to_json(&self, parsed: &YamlValue) -> Result<JsonValue, ContextNetworkError> {
        yaml_to_json(parsed)
    }

    fn extract_references(
        &self,
        parsed: &YamlValue,
    ) -> Result<Vec<NodeReference>, ContextNetworkError> {
        // Collected on the canonical form
        let json = yaml_to_json(parsed)?;
        let mut refs = Vec::new();
        collect_references(&json, RefShape::DollarRef, &mut refs)?;
        Ok(refs)
    }
}

fn yaml_key_to_string(key: &YamlValue) -> Result<String, ContextNetworkError> {
    match key {
        YamlValue::String(s) => Ok(s.clone()),
        YamlValue::Bool(b) => Ok(b.to_string()),
        YamlValue::Number(n) => Ok(n.to_string()),
        YamlValue::Null => Ok("null".to_string()),
        other => Err(ContextNetworkError::JsonConversion(format!(
            "mapping key {other:?} cannot be represented as a JSON object key"
        ))),
    }
}

/// Convert a YAML value into canonical JSON. Scalars and nesting map one to one; complex
/// mapping keys, tagged values and non-finite floats have no JSON form and are rejected.
pub(crate) fn yaml_to_json(value: &YamlValue) -> Result<JsonValue, ContextNetworkError> {
    Ok(match value {
        YamlValue::Null => JsonValue::Null,
        YamlValue::Bool(b) => JsonValue::Bool(*b),
        YamlValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                JsonValue::Number(i.into())
            } else if let Some(u) = n.as_u64() {
                JsonValue::Number(u.into())
            } else {
                let f = n.as_f64().unwrap_or(f64::NAN);
                JsonValue::Number(Number::from_f64(f).ok_or_else(|| {
                    ContextNetworkError::JsonConversion(format!(
                        "non-finite number {n} has no JSON representation"
                    ))
                })?)
            }
        }
        YamlValue::String(s) => JsonValue::String(s.clone()),
        YamlValue::Sequence(items) => JsonValue::Array(
            items
                .iter()
                .map(yaml_to_json)
                .collect::<Result<Vec<_>, _>>()?,
        ),
        YamlValue::Mapping(mapping) => {
            let mut object = Map::with_capacity(mapping.len());
            for (key, value) in mapping {
                object.insert(yaml_key_to_string(key)?, yaml_to_json(value)?);
            }
            JsonValue::Object(object)
        }
        YamlValue::Tagged(tagged) => {
            return Err(ContextNetworkError::JsonConversion(format!(
                "tagged value {} has no JSON representation",
                tagged.tag
            )))
        }
    })
}
