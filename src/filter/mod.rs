//! Document filters
//!
//! A [`Filter`] is an immutable conjunction of [`Predicate`]s over document
//! fields. Equality is the primary predicate; existence, inequality, type,
//! pattern and array-element checks cover the restructuring fixes that must
//! only touch documents still holding the old shape.
//!
//! Numbers compare by value, so `1` equals `1.0`. Every other JSON kind
//! compares strictly: `1` never equals `"1"`.

use crate::core::{FixError, Result};
use crate::document::{Document, FieldPath, JsonType, lookup};
use regex::Regex;
use serde_json::{Map, Value as JsonValue};
use std::fmt;

/// A single condition on one field.
#[derive(Debug, Clone)]
pub enum Predicate {
    /// Field equals the value. `Eq(path, null)` also matches a missing field.
    Eq(FieldPath, JsonValue),
    /// Field is missing or differs from the value.
    Ne(FieldPath, JsonValue),
    Exists(FieldPath, bool),
    HasType(FieldPath, JsonType),
    /// String field matching the pattern. Non-strings never match.
    Matches(FieldPath, Regex),
    /// Array field with at least one object element matching the filter.
    ElemMatch(FieldPath, Filter),
    Not(Box<Predicate>),
}

impl Predicate {
    pub fn path(&self) -> &FieldPath {
        match self {
            Self::Eq(path, _)
            | Self::Ne(path, _)
            | Self::Exists(path, _)
            | Self::HasType(path, _)
            | Self::Matches(path, _)
            | Self::ElemMatch(path, _) => path,
            Self::Not(inner) => inner.path(),
        }
    }

    pub fn matches(&self, document: &Document) -> bool {
        self.matches_object(document.as_map())
    }

    fn matches_object(&self, object: &Map<String, JsonValue>) -> bool {
        let field = lookup(object, self.path());
        match self {
            Self::Eq(_, expected) => match field {
                Some(actual) => values_equal(actual, expected),
                None => expected.is_null(),
            },
            Self::Ne(_, expected) => !field.is_some_and(|actual| values_equal(actual, expected)),
            Self::Exists(_, should_exist) => field.is_some() == *should_exist,
            Self::HasType(_, json_type) => field.is_some_and(|v| JsonType::of(v) == *json_type),
            Self::Matches(_, pattern) => field
                .and_then(JsonValue::as_str)
                .is_some_and(|s| pattern.is_match(s)),
            Self::ElemMatch(_, filter) => field
                .and_then(JsonValue::as_array)
                .is_some_and(|elements| {
                    elements
                        .iter()
                        .filter_map(JsonValue::as_object)
                        .any(|element| filter.matches_object(element))
                }),
            Self::Not(inner) => !inner.matches_object(object),
        }
    }
}

/// JSON equality with numbers compared by value.
fn values_equal(left: &JsonValue, right: &JsonValue) -> bool {
    match (left, right) {
        (JsonValue::Number(l), JsonValue::Number(r)) => match (l.as_i64(), r.as_i64()) {
            (Some(l), Some(r)) => l == r,
            _ => l == r || l.as_f64().is_some_and(|l| r.as_f64() == Some(l)),
        },
        (JsonValue::Array(l), JsonValue::Array(r)) => {
            l.len() == r.len() && l.iter().zip(r).all(|(l, r)| values_equal(l, r))
        }
        (JsonValue::Object(l), JsonValue::Object(r)) => {
            l.len() == r.len()
                && l.iter()
                    .all(|(key, l)| r.get(key).is_some_and(|r| values_equal(l, r)))
        }
        _ => left == right,
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Eq(path, value) => write!(f, "{} == {}", path, value),
            Self::Ne(path, value) => write!(f, "{} != {}", path, value),
            Self::Exists(path, true) => write!(f, "{} EXISTS", path),
            Self::Exists(path, false) => write!(f, "{} NOT EXISTS", path),
            Self::HasType(path, json_type) => write!(f, "{} IS {}", path, json_type),
            Self::Matches(path, pattern) => write!(f, "{} ~ /{}/", path, pattern.as_str()),
            Self::ElemMatch(path, filter) => write!(f, "{} HAS ELEMENT ({})", path, filter),
            Self::Not(inner) => write!(f, "NOT ({})", inner),
        }
    }
}

/// Conjunction of predicates. The empty filter matches every document.
#[derive(Debug, Clone, Default)]
pub struct Filter {
    predicates: Vec<Predicate>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    pub fn eq(self, path: &str, value: impl Into<JsonValue>) -> Result<Self> {
        Ok(self.with(Predicate::Eq(FieldPath::parse(path)?, value.into())))
    }

    pub fn ne(self, path: &str, value: impl Into<JsonValue>) -> Result<Self> {
        Ok(self.with(Predicate::Ne(FieldPath::parse(path)?, value.into())))
    }

    pub fn exists(self, path: &str) -> Result<Self> {
        Ok(self.with(Predicate::Exists(FieldPath::parse(path)?, true)))
    }

    pub fn not_exists(self, path: &str) -> Result<Self> {
        Ok(self.with(Predicate::Exists(FieldPath::parse(path)?, false)))
    }

    pub fn has_type(self, path: &str, json_type: JsonType) -> Result<Self> {
        Ok(self.with(Predicate::HasType(FieldPath::parse(path)?, json_type)))
    }

    pub fn matches_pattern(self, path: &str, pattern: &str) -> Result<Self> {
        let regex = Regex::new(pattern).map_err(|e| {
            FixError::InvalidFilter(format!("Invalid pattern '{}' for '{}': {}", pattern, path, e))
        })?;
        Ok(self.with(Predicate::Matches(FieldPath::parse(path)?, regex)))
    }

    /// Array at `path` has an object element matching `element`.
    pub fn elem_match(self, path: &str, element: Filter) -> Result<Self> {
        Ok(self.with(element_predicate(path, element)?))
    }

    /// Array at `path` has no object element matching `element`. Also true
    /// when the field is missing or not an array.
    pub fn no_elem_match(self, path: &str, element: Filter) -> Result<Self> {
        let predicate = element_predicate(path, element)?;
        Ok(self.with(Predicate::Not(Box::new(predicate))))
    }

    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    pub fn matches(&self, document: &Document) -> bool {
        self.matches_object(document.as_map())
    }

    fn matches_object(&self, object: &Map<String, JsonValue>) -> bool {
        self.predicates.iter().all(|p| p.matches_object(object))
    }
}

fn element_predicate(path: &str, element: Filter) -> Result<Predicate> {
    if element.is_empty() {
        return Err(FixError::InvalidFilter(format!(
            "Element filter for '{}' cannot be empty",
            path
        )));
    }
    Ok(Predicate::ElemMatch(FieldPath::parse(path)?, element))
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.predicates.is_empty() {
            return f.write_str("<all>");
        }
        let parts: Vec<String> = self.predicates.iter().map(ToString::to_string).collect();
        f.write_str(&parts.join(" AND "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: JsonValue) -> Document {
        Document::from_value(value).unwrap()
    }

    #[test]
    fn test_conjunction_of_equalities() {
        let filter = Filter::new()
            .eq("partyIdentifier", "GB1")
            .unwrap()
            .eq("reference.shortCode", "X1")
            .unwrap();

        assert!(filter.matches(&doc(json!({
            "_id": "A", "partyIdentifier": "GB1", "reference": {"shortCode": "X1"}
        }))));
        assert!(!filter.matches(&doc(json!({
            "_id": "B", "partyIdentifier": "GB1", "reference": {"shortCode": "Y2"}
        }))));
        assert!(!filter.matches(&doc(json!({
            "_id": "C", "partyIdentifier": "GB2", "reference": {"shortCode": "X1"}
        }))));
        assert!(!filter.matches(&doc(json!({"_id": "D", "partyIdentifier": "GB1"}))));
    }

    #[test]
    fn test_equality_is_type_strict() {
        let filter = Filter::new().eq("count", 1).unwrap();
        assert!(filter.matches(&doc(json!({"count": 1}))));
        assert!(!filter.matches(&doc(json!({"count": "1"}))));
    }

    #[test]
    fn test_numbers_compare_by_value() {
        let filter = Filter::new().eq("count", 1).unwrap();
        assert!(filter.matches(&doc(json!({"count": 1.0}))));
        assert!(!filter.matches(&doc(json!({"count": 1.5}))));

        let nested = Filter::new().eq("totals", json!({"gross": 2.0, "lines": [1, 2]})).unwrap();
        assert!(nested.matches(&doc(json!({"totals": {"gross": 2, "lines": [1.0, 2]}}))));

        let ne = Filter::new().ne("count", 1.0).unwrap();
        assert!(!ne.matches(&doc(json!({"count": 1}))));
        assert!(ne.matches(&doc(json!({"count": 2}))));
    }

    #[test]
    fn test_element_predicates() {
        let has_code = Filter::new().exists("code").unwrap();
        let filter = Filter::new()
            .no_elem_match("routingCountries", has_code.clone())
            .unwrap();

        assert!(filter.matches(&doc(json!({"routingCountries": ["FR", "DE"]}))));
        assert!(filter.matches(&doc(json!({"routingCountries": []}))));
        assert!(filter.matches(&doc(json!({}))));
        assert!(!filter.matches(&doc(json!({"routingCountries": ["FR", {"code": "DE"}]}))));
        assert!(!filter.matches(&doc(json!({"routingCountries": [{"code": "FR"}]}))));

        let any = Filter::new().elem_match("routingCountries", has_code).unwrap();
        assert!(any.matches(&doc(json!({"routingCountries": [{"code": "FR"}]}))));
        assert!(!any.matches(&doc(json!({"routingCountries": {"code": "FR"}}))));

        assert!(Filter::new().elem_match("routingCountries", Filter::new()).is_err());
    }

    #[test]
    fn test_null_equality_matches_missing() {
        let filter = Filter::new().eq("lrn", JsonValue::Null).unwrap();
        assert!(filter.matches(&doc(json!({}))));
        assert!(filter.matches(&doc(json!({"lrn": null}))));
        assert!(!filter.matches(&doc(json!({"lrn": "X"}))));
    }

    #[test]
    fn test_shape_predicates() {
        let filter = Filter::new()
            .exists("locations.originationCountry")
            .unwrap()
            .has_type("locations.originationCountry", JsonType::String)
            .unwrap()
            .ne("locations.originationCountry", "")
            .unwrap();

        assert!(filter.matches(&doc(json!({"locations": {"originationCountry": "FR"}}))));
        assert!(!filter.matches(&doc(json!({"locations": {"originationCountry": ""}}))));
        assert!(!filter.matches(&doc(json!({"locations": {"originationCountry": {"code": "FR"}}}))));
        assert!(!filter.matches(&doc(json!({"locations": {}}))));
    }

    #[test]
    fn test_pattern_predicate() {
        let filter = Filter::new().matches_pattern("country", "^.{3,}$").unwrap();
        assert!(filter.matches(&doc(json!({"country": "France"}))));
        assert!(!filter.matches(&doc(json!({"country": "FR"}))));
        assert!(!filter.matches(&doc(json!({"country": 123}))));

        assert!(Filter::new().matches_pattern("country", "(").is_err());
    }

    #[test]
    fn test_empty_filter_matches_everything() {
        let filter = Filter::new();
        assert!(filter.is_empty());
        assert!(filter.matches(&doc(json!({}))));
        assert_eq!(filter.to_string(), "<all>");
    }

    #[test]
    fn test_display() {
        let filter = Filter::new()
            .eq("eori", "GB1")
            .unwrap()
            .not_exists("lrn")
            .unwrap();
        assert_eq!(filter.to_string(), "eori == \"GB1\" AND lrn NOT EXISTS");

        let routing = Filter::new()
            .no_elem_match("routingCountries", Filter::new().exists("code").unwrap())
            .unwrap();
        assert_eq!(
            routing.to_string(),
            "NOT (routingCountries HAS ELEMENT (code EXISTS))"
        );
    }
}
