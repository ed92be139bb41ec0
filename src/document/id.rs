use crate::core::{FixError, Result};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Value as JsonValue, json};
use std::fmt;

/// JSON shape an identifier was stored with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IdKind {
    String,
    Integer,
    /// Extended-JSON object id, `{"$oid": "..."}`.
    ObjectId,
}

/// Store-assigned document identifier.
///
/// Stored `_id` values may be strings, integers or extended-JSON object ids.
/// The shape is part of the identity: `1`, `"1"` and `{"$oid": "1"}` are
/// three different documents.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentId {
    kind: IdKind,
    text: String,
}

impl DocumentId {
    /// A string identifier.
    pub fn new(raw: impl Into<String>) -> Result<Self> {
        Self::with_kind(IdKind::String, raw.into())
    }

    pub fn integer(value: i64) -> Self {
        Self {
            kind: IdKind::Integer,
            text: value.to_string(),
        }
    }

    pub fn object_id(hex: impl Into<String>) -> Result<Self> {
        Self::with_kind(IdKind::ObjectId, hex.into())
    }

    fn with_kind(kind: IdKind, text: String) -> Result<Self> {
        if text.trim().is_empty() {
            return Err(FixError::MissingIdentifier(
                "document identifier cannot be empty".to_string(),
            ));
        }
        Ok(Self { kind, text })
    }

    /// Fresh identifier for documents inserted without one.
    pub fn generate() -> Self {
        Self {
            kind: IdKind::String,
            text: uuid::Uuid::new_v4().to_string(),
        }
    }

    /// Reads an identifier out of a raw `_id` value.
    ///
    /// Returns `None` for null, empty strings and any shape that cannot
    /// address a single document.
    pub fn from_value(value: &JsonValue) -> Option<Self> {
        match value {
            JsonValue::String(s) => Self::new(s.as_str()).ok(),
            JsonValue::Number(n) if n.is_i64() || n.is_u64() => Some(Self {
                kind: IdKind::Integer,
                text: n.to_string(),
            }),
            JsonValue::Object(map) if map.len() == 1 => map
                .get("$oid")
                .and_then(JsonValue::as_str)
                .and_then(|oid| Self::object_id(oid).ok()),
            _ => None,
        }
    }

    /// The `_id` value as stored.
    pub fn to_value(&self) -> JsonValue {
        match self.kind {
            IdKind::String => JsonValue::String(self.text.clone()),
            IdKind::Integer => serde_json::from_str(&self.text)
                .unwrap_or_else(|_| JsonValue::String(self.text.clone())),
            IdKind::ObjectId => json!({ "$oid": self.text }),
        }
    }

    pub fn kind(&self) -> IdKind {
        self.kind
    }

    /// Textual form, without the shape.
    pub fn as_str(&self) -> &str {
        &self.text
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            IdKind::String | IdKind::Integer => f.write_str(&self.text),
            IdKind::ObjectId => write!(f, "ObjectId({})", self.text),
        }
    }
}

impl Serialize for DocumentId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for DocumentId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = JsonValue::deserialize(deserializer)?;
        Self::from_value(&value)
            .ok_or_else(|| D::Error::custom(format!("unusable document identifier {}", value)))
    }
}
