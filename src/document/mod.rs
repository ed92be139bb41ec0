//! Schema-less documents with typed, path-based accessors.
//!
//! A [`Document`] is an ordered JSON object. Nested fields are addressed with
//! a [`FieldPath`]; reads return `None` instead of guessing, writes fail with
//! [`FixError::PathConflict`] instead of clobbering non-object values.

mod id;
mod path;

pub use id::{DocumentId, IdKind};
pub use path::FieldPath;

use crate::core::{FixError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::fmt;
use std::str::FromStr;

/// Name of the identifier field.
pub const ID_FIELD: &str = "_id";

/// JSON value kinds, for type predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JsonType {
    Null,
    Bool,
    Number,
    String,
    Array,
    Object,
}

impl JsonType {
    pub fn of(value: &JsonValue) -> Self {
        match value {
            JsonValue::Null => Self::Null,
            JsonValue::Bool(_) => Self::Bool,
            JsonValue::Number(_) => Self::Number,
            JsonValue::String(_) => Self::String,
            JsonValue::Array(_) => Self::Array,
            JsonValue::Object(_) => Self::Object,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool => "bool",
            Self::Number => "number",
            Self::String => "string",
            Self::Array => "array",
            Self::Object => "object",
        }
    }
}

impl FromStr for JsonType {
    type Err = FixError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "null" => Ok(Self::Null),
            "bool" | "boolean" => Ok(Self::Bool),
            "number" => Ok(Self::Number),
            "string" => Ok(Self::String),
            "array" => Ok(Self::Array),
            "object" => Ok(Self::Object),
            other => Err(FixError::InvalidFilter(format!("Unknown JSON type '{}'", other))),
        }
    }
}

impl fmt::Display for JsonType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document(Map<String, JsonValue>);

impl Document {
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Wraps a JSON value, which must be an object.
    pub fn from_value(value: JsonValue) -> Result<Self> {
        match value {
            JsonValue::Object(map) => Ok(Self(map)),
            other => Err(FixError::Serialization(format!(
                "Expected a JSON object for a document, got {}",
                JsonType::of(&other)
            ))),
        }
    }

    pub fn into_value(self) -> JsonValue {
        JsonValue::Object(self.0)
    }

    pub fn as_map(&self) -> &Map<String, JsonValue> {
        &self.0
    }

    /// The document identifier, or `MissingIdentifier` if `_id` is absent
    /// or unusable.
    pub fn id(&self) -> Result<DocumentId> {
        match self.0.get(ID_FIELD) {
            Some(value) => DocumentId::from_value(value).ok_or_else(|| {
                FixError::MissingIdentifier(format!(
                    "'{}' holds an unusable {} value",
                    ID_FIELD,
                    JsonType::of(value)
                ))
            }),
            None => Err(FixError::MissingIdentifier(format!(
                "document has no '{}' field",
                ID_FIELD
            ))),
        }
    }

    pub fn set_id(&mut self, id: &DocumentId) {
        self.0.insert(ID_FIELD.to_string(), id.to_value());
    }

    pub fn get(&self, path: &FieldPath) -> Option<&JsonValue> {
        lookup(&self.0, path)
    }

    pub fn get_str(&self, path: &FieldPath) -> Option<&str> {
        self.get(path).and_then(JsonValue::as_str)
    }

    pub fn contains(&self, path: &FieldPath) -> bool {
        self.get(path).is_some()
    }

    /// Sets the field at `path`, creating missing intermediate objects.
    ///
    /// Returns whether the document changed. Nothing is written when an
    /// intermediate value exists and is not an object.
    pub fn set(&mut self, path: &FieldPath, value: JsonValue) -> Result<bool> {
        self.check_settable(path)?;

        let Some((last, parents)) = path.segments().split_last() else {
            return Ok(false);
        };

        let mut current = &mut self.0;
        for segment in parents {
            let entry = current
                .entry(segment.clone())
                .or_insert_with(|| JsonValue::Object(Map::new()));
            current = match entry {
                JsonValue::Object(map) => map,
                _ => {
                    return Err(FixError::PathConflict(
                        path.to_string(),
                        format!("'{}' is not an object", segment),
                    ));
                }
            };
        }

        if current.get(last) == Some(&value) {
            return Ok(false);
        }
        current.insert(last.clone(), value);
        Ok(true)
    }

    /// Removes the field at `path`. Returns whether anything was removed.
    pub fn unset(&mut self, path: &FieldPath) -> bool {
        let Some((last, parents)) = path.segments().split_last() else {
            return false;
        };

        let mut current = &mut self.0;
        for segment in parents {
            current = match current.get_mut(segment) {
                Some(JsonValue::Object(map)) => map,
                _ => return false,
            };
        }
        current.remove(last).is_some()
    }

    fn check_settable(&self, path: &FieldPath) -> Result<()> {
        let parents = &path.segments()[..path.segments().len() - 1];
        let mut current = &self.0;
        for (depth, segment) in parents.iter().enumerate() {
            match current.get(segment) {
                Some(JsonValue::Object(map)) => current = map,
                Some(other) => {
                    return Err(FixError::PathConflict(
                        path.to_string(),
                        format!(
                            "'{}' holds a {} value, not an object",
                            path.prefix(depth + 1),
                            JsonType::of(other)
                        ),
                    ));
                }
                None => return Ok(()),
            }
        }
        Ok(())
    }
}

/// Value at `path` inside a JSON object, if every step exists.
pub(crate) fn lookup<'a>(object: &'a Map<String, JsonValue>, path: &FieldPath) -> Option<&'a JsonValue> {
    let (first, rest) = path.segments().split_first()?;
    let mut current = object.get(first)?;
    for segment in rest {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

impl TryFrom<JsonValue> for Document {
    type Error = FixError;

    fn try_from(value: JsonValue) -> Result<Self> {
        Self::from_value(value)
    }
}

impl From<Document> for JsonValue {
    fn from(document: Document) -> Self {
        document.into_value()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn path(raw: &str) -> FieldPath {
        FieldPath::parse(raw).unwrap()
    }

    fn declaration() -> Document {
        Document::from_value(json!({
            "_id": "A",
            "eori": "GB1",
            "consignmentReferences": { "lrn": "X1", "ducr": "8GB123" }
        }))
        .unwrap()
    }

    #[test]
    fn test_nested_get() {
        let doc = declaration();
        assert_eq!(doc.get_str(&path("consignmentReferences.lrn")), Some("X1"));
        assert_eq!(doc.get_str(&path("eori")), Some("GB1"));
        assert!(doc.get(&path("consignmentReferences.missing")).is_none());
        assert!(doc.get(&path("eori.nested")).is_none());
    }

    #[test]
    fn test_identifier() {
        assert_eq!(declaration().id().unwrap().as_str(), "A");

        let doc = Document::from_value(json!({"eori": "GB1"})).unwrap();
        assert!(matches!(doc.id(), Err(FixError::MissingIdentifier(_))));

        let doc = Document::from_value(json!({"_id": null})).unwrap();
        assert!(matches!(doc.id(), Err(FixError::MissingIdentifier(_))));
    }

    #[test]
    fn test_set_reports_change() {
        let mut doc = declaration();
        assert!(doc.set(&path("consignmentReferences.lrn"), json!("NEWVAL")).unwrap());
        assert_eq!(doc.get_str(&path("consignmentReferences.lrn")), Some("NEWVAL"));
        assert!(!doc.set(&path("consignmentReferences.lrn"), json!("NEWVAL")).unwrap());
        assert_eq!(doc.get_str(&path("consignmentReferences.ducr")), Some("8GB123"));
    }

    #[test]
    fn test_set_creates_intermediates() {
        let mut doc = declaration();
        assert!(doc.set(&path("locations.originationCountry.code"), json!("FR")).unwrap());
        assert_eq!(
            doc.get(&path("locations")),
            Some(&json!({"originationCountry": {"code": "FR"}}))
        );
    }

    #[test]
    fn test_set_through_scalar_is_a_conflict() {
        let mut doc = declaration();
        let before = doc.clone();
        let err = doc.set(&path("eori.code.value"), json!("x")).unwrap_err();
        assert!(matches!(err, FixError::PathConflict(_, _)));
        assert_eq!(doc, before);
    }

    #[test]
    fn test_unset() {
        let mut doc = declaration();
        assert!(doc.unset(&path("consignmentReferences.lrn")));
        assert!(!doc.contains(&path("consignmentReferences.lrn")));
        assert!(!doc.unset(&path("consignmentReferences.lrn")));
        assert!(!doc.unset(&path("eori.nested")));
    }

    #[test]
    fn test_non_object_document_rejected() {
        assert!(Document::from_value(json!([1, 2])).is_err());
        assert!(Document::try_from(json!({"_id": 1})).is_ok());
    }

    #[test]
    fn test_json_type_names() {
        assert_eq!(JsonType::of(&json!("x")), JsonType::String);
        assert_eq!("array".parse::<JsonType>().unwrap(), JsonType::Array);
        assert!("date".parse::<JsonType>().is_err());
    }
}
