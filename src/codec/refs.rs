//! Recognition of reference objects inside structured (YAML / JSON) content.

use serde_json::{Map, Value as JsonValue};

use crate::{error::ContextNetworkError, properties::NodeReference};

/// Key of a YAML style reference object: `{ $ref: path }`.
pub const DOLLAR_REF_KEY: &str = "$ref";
/// `type` value marking a JSON style reference object.
pub const REFERENCE_TYPE: &str = "reference";
pub const LABEL_KEY: &str = "label";

/// The two structured reference shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefShape {
    /// `{ "$ref": path, "label"?: text }`
    DollarRef,
    /// `{ "type": "reference", "path": path, "label"?: text }`
    ReferenceObject,
}

impl RefShape {
    /// Build a reference object of this shape pointing at `path`.
    pub fn pointer(&self, path: &str, label: Option<&str>) -> JsonValue {
        let mut object = Map::new();
        match self {
            RefShape::DollarRef => {
                object.insert(DOLLAR_REF_KEY.to_string(), JsonValue::from(path));
            }
            RefShape::ReferenceObject => {
                object.insert("type".to_string(), JsonValue::from(REFERENCE_TYPE));
                object.insert("path".to_string(), JsonValue::from(path));
            }
        }
        if let Some(label) = label {
            object.insert(LABEL_KEY.to_string(), JsonValue::from(label));
        }
        JsonValue::Object(object)
    }
}

fn label_of(object: &Map<String, JsonValue>) -> Result<Option<String>, ContextNetworkError> {
    match object.get(LABEL_KEY) {
        None | Some(JsonValue::Null) => Ok(None),
        Some(JsonValue::String(label)) => Ok(Some(label.clone())),
        Some(other) => Err(ContextNetworkError::ReferenceSyntax(format!(
            "reference label must be a string, found {other}"
        ))),
    }
}

fn path_of(value: Option<&JsonValue>, what: &str) -> Result<String, ContextNetworkError> {
    match value {
        Some(JsonValue::String(path)) if !path.trim().is_empty() => Ok(path.trim().to_string()),
        Some(JsonValue::String(_)) => Err(ContextNetworkError::ReferenceSyntax(format!(
            "{what} has an empty path"
        ))),
        Some(other) => Err(ContextNetworkError::ReferenceSyntax(format!(
            "{what} path must be a string, found {other}"
        ))),
        None => Err(ContextNetworkError::ReferenceSyntax(format!(
            "{what} is missing its path"
        ))),
    }
}

/// If `value` is a reference object of the given shape, return the reference it describes.
pub fn reference_of_shape(
    value: &JsonValue,
    shape: RefShape,
) -> Result<Option<NodeReference>, ContextNetworkError> {
    let JsonValue::Object(object) = value else {
        return Ok(None);
    };
    match shape {
        RefShape::DollarRef => {
            if !object.contains_key(DOLLAR_REF_KEY) {
                return Ok(None);
            }
            let path = path_of(object.get(DOLLAR_REF_KEY), "$ref object")?;
            Ok(Some(NodeReference::new(path, label_of(object)?)))
        }
        RefShape::ReferenceObject => {
            if object.get("type").and_then(|t| t.as_str()) != Some(REFERENCE_TYPE) {
                return Ok(None);
            }
            let path = path_of(object.get("path"), "reference object")?;
            Ok(Some(NodeReference::new(path, label_of(object)?)))
        }
    }
}

/// Recognize either structured reference shape.
pub fn structured_reference(
    value: &JsonValue,
) -> Result<Option<(NodeReference, RefShape)>, ContextNetworkError> {
    for shape in [RefShape::DollarRef, RefShape::ReferenceObject] {
        if let Some(reference) = reference_of_shape(value, shape)? {
            return Ok(Some((reference, shape)));
        }
    }
    Ok(None)
}

/// Depth-first, document-order collection of every reference object of `shape`. Reference
/// objects are leaves: their own fields are not searched.
pub fn collect_references(
    value: &JsonValue,
    shape: RefShape,
    out: &mut Vec<NodeReference>,
) -> Result<(), ContextNetworkError> {
    if let Some(reference) = reference_of_shape(value, shape)? {
        out.push(reference);
        return Ok(());
    }
    match value {
        JsonValue::Object(object) => {
            for child in object.values() {
                collect_references(child, shape, out)?;
            }
        }
        JsonValue::Array(items) => {
            for child in items {
                collect_references(child, shape, out)?;
            }
        }
        _ => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_collect_in_document_order() {
        let value = json!({
            "steps": [
                {"type": "reference", "path": "a.md", "label": "A"},
                {"nested": {"type": "reference", "path": "b.yaml"}}
            ],
            "tail": {"type": "reference", "path": "c.json"}
        });
        let mut refs = Vec::new();
        collect_references(&value, RefShape::ReferenceObject, &mut refs).unwrap();
        let paths: Vec<_> = refs.iter().map(|r| r.path.as_str()).collect();
        assert_eq!(paths, vec!["a.md", "b.yaml", "c.json"]);
        assert_eq!(refs[0].label.as_deref(), Some("A"));
    }

    #[test]
    fn test_other_type_values_are_plain_data() {
        let value = json!({"type": "document", "path": "a.md"});
        assert_eq!(reference_of_shape(&value, RefShape::ReferenceObject).unwrap(), None);
    }

    #[test]
    fn test_malformed_references() {
        let missing = json!({"type": "reference"});
        assert!(matches!(
            reference_of_shape(&missing, RefShape::ReferenceObject),
            Err(ContextNetworkError::ReferenceSyntax(_))
        ));
        let non_string = json!({"$ref": 4});
        assert!(matches!(
            reference_of_shape(&non_string, RefShape::DollarRef),
            Err(ContextNetworkError::ReferenceSyntax(_))
        ));
        let bad_label = json!({"$ref": "a.md", "label": ["x"]});
        assert!(matches!(
            reference_of_shape(&bad_label, RefShape::DollarRef),
            Err(ContextNetworkError::ReferenceSyntax(_))
        ));
    }

    #[test]
    fn test_pointer_shapes() {
        assert_eq!(
            RefShape::DollarRef.pointer("a.md", None),
            json!({"$ref": "a.md"})
        );
        assert_eq!(
            RefShape::ReferenceObject.pointer("a.md", Some("A")),
            json!({"type": "reference", "path": "a.md", "label": "A"})
        );
        let (reference, shape) = structured_reference(&json!({"$ref": "x.yaml"}))
            .unwrap()
            .unwrap();
        assert_eq!(reference.path, "x.yaml");
        assert_eq!(shape, RefShape::DollarRef);
    }
}
