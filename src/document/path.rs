use super::ID_FIELD;
use crate::core::{FixError, Result};
use lazy_static::lazy_static;
use regex::Regex;
use std::fmt;
use std::str::FromStr;

lazy_static! {
    static ref SEGMENT_PATTERN: Regex = Regex::new(r"^[^\s$][^\s]*$").unwrap();
}

/// Dotted path into a nested document, e.g. `consignmentReferences.lrn`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldPath {
    raw: String,
    segments: Vec<String>,
}

impl FieldPath {
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.is_empty() {
            return Err(FixError::InvalidPath(
                raw.to_string(),
                "path cannot be empty".to_string(),
            ));
        }

        let mut segments = Vec::new();
        for segment in raw.split('.') {
            if segment.is_empty() {
                return Err(FixError::InvalidPath(
                    raw.to_string(),
                    "path contains an empty segment".to_string(),
                ));
            }
            if !SEGMENT_PATTERN.is_match(segment) {
                return Err(FixError::InvalidPath(
                    raw.to_string(),
                    format!("segment '{}' must not start with '$' or contain whitespace", segment),
                ));
            }
            segments.push(segment.to_string());
        }

        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Always non-empty.
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Whether the path is the identifier field or lies inside it.
    pub fn is_identifier(&self) -> bool {
        self.segments.first().is_some_and(|first| first == ID_FIELD)
    }

    /// The first `depth` segments joined back together.
    pub(crate) fn prefix(&self, depth: usize) -> String {
        self.segments[..depth.min(self.segments.len())].join(".")
    }
}

impl FromStr for FieldPath {
    type Err = FixError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_paths() {
        let path = FieldPath::parse("consignmentReferences.lrn").unwrap();
        assert_eq!(path.segments(), ["consignmentReferences", "lrn"]);
        assert_eq!(path.to_string(), "consignmentReferences.lrn");

        assert_eq!(FieldPath::parse("_id").unwrap().segments().len(), 1);
        assert_eq!(FieldPath::parse("a.b.c").unwrap().prefix(2), "a.b");
    }

    #[test]
    fn test_invalid_paths() {
        assert!(FieldPath::parse("").is_err());
        assert!(FieldPath::parse(".lrn").is_err());
        assert!(FieldPath::parse("consignmentReferences.").is_err());
        assert!(FieldPath::parse("a..b").is_err());
        assert!(FieldPath::parse("$set.lrn").is_err());
        assert!(FieldPath::parse("consignment references").is_err());
    }
}
