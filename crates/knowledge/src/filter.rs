//! Metadata filter expressions.
//!
//! Filters are built in code by the access layer and parsed from the JSON
//! form callers send (`{"k": v}`, `$in`, `$eq`, `$ne`, `$and`, `$or`). The in-process
//! vector backends evaluate them directly with [`Filter::matches`].

use crate::types::Metadata;
use pulse_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A boolean condition over document metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Filter {
    /// Field equals the value. Array-valued fields match by membership.
    Eq(String, Value),
    /// Field equals any of the values.
    In(String, Vec<Value>),
    /// Field is absent or differs from the value.
    Ne(String, Value),
    And(Vec<Filter>),
    Or(Vec<Filter>),
}

impl Filter {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Eq(field.into(), value.into())
    }

    pub fn ne(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Ne(field.into(), value.into())
    }

    pub fn is_in<V: Into<Value>>(field: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        Self::In(field.into(), values.into_iter().map(Into::into).collect())
    }

    /// Conjunction of `filters`, flattening nested `And`s.
    pub fn all(filters: impl IntoIterator<Item = Filter>) -> Self {
        let mut conjuncts = Vec::new();
        for filter in filters {
            match filter {
                Self::And(inner) => conjuncts.extend(inner),
                other => conjuncts.push(other),
            }
        }

        if conjuncts.len() == 1 {
            conjuncts.remove(0)
        } else {
            Self::And(conjuncts)
        }
    }

    /// `self AND other`, flattened.
    pub fn and(self, other: Filter) -> Self {
        Self::all([self, other])
    }

    /// Top-level conjuncts: the members of an `And`, or the filter itself.
    pub fn into_conjuncts(self) -> Vec<Filter> {
        match self {
            Self::And(inner) => inner,
            other => vec![other],
        }
    }

    /// Whether any condition, at any depth, tests `field`.
    pub fn references(&self, field: &str) -> bool {
        match self {
            Self::Eq(f, _) | Self::In(f, _) | Self::Ne(f, _) => f == field,
            Self::And(inner) | Self::Or(inner) => inner.iter().any(|f| f.references(field)),
        }
    }

    /// Evaluate against a metadata map. Missing fields never match, except
    /// under `Ne`.
    pub fn matches(&self, metadata: &Metadata) -> bool {
        match self {
            Self::Eq(field, expected) => metadata
                .get(field)
                .is_some_and(|actual| value_matches(actual, expected)),
            Self::In(field, candidates) => metadata.get(field).is_some_and(|actual| {
                candidates
                    .iter()
                    .any(|expected| value_matches(actual, expected))
            }),
            Self::Ne(field, excluded) => !metadata
                .get(field)
                .is_some_and(|actual| value_matches(actual, excluded)),
            Self::And(inner) => inner.iter().all(|f| f.matches(metadata)),
            Self::Or(inner) => inner.iter().any(|f| f.matches(metadata)),
        }
    }

    /// Parse the JSON filter form.
    pub fn from_json(value: &Value) -> AppResult<Self> {
        let object = value.as_object().ok_or_else(|| {
            AppError::Validation(format!("Filter must be a JSON object, got: {}", value))
        })?;

        let mut conjuncts = Vec::with_capacity(object.len());
        for (key, value) in object {
            conjuncts.push(match key.as_str() {
                "$and" => Self::And(parse_list(key, value)?),
                "$or" => Self::Or(parse_list(key, value)?),
                op if op.starts_with('$') => {
                    return Err(AppError::Validation(format!(
                        "Unsupported filter operator '{}'",
                        op
                    )))
                }
                field => parse_condition(field, value)?,
            });
        }

        Ok(Self::all(conjuncts))
    }

    /// Parse a JSON filter string.
    pub fn parse(json: &str) -> AppResult<Self> {
        let value: Value = serde_json::from_str(json)
            .map_err(|e| AppError::Validation(format!("Invalid filter JSON: {}", e)))?;
        Self::from_json(&value)
    }

    /// Render back to the JSON filter form.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Eq(field, value) => single(field, value.clone()),
            Self::In(field, values) => single(field, single("$in", Value::Array(values.clone()))),
            Self::Ne(field, value) => single(field, single("$ne", value.clone())),
            Self::And(inner) => single("$and", inner.iter().map(Filter::to_json).collect()),
            Self::Or(inner) => single("$or", inner.iter().map(Filter::to_json).collect()),
        }
    }
}

fn single(key: &str, value: Value) -> Value {
    let mut map = Map::new();
    map.insert(key.to_string(), value);
    Value::Object(map)
}

fn value_matches(actual: &Value, expected: &Value) -> bool {
    match actual {
        Value::Array(items) if !expected.is_array() => items.contains(expected),
        _ => actual == expected,
    }
}

fn parse_list(op: &str, value: &Value) -> AppResult<Vec<Filter>> {
    value
        .as_array()
        .ok_or_else(|| AppError::Validation(format!("'{}' expects an array of filters", op)))?
        .iter()
        .map(Filter::from_json)
        .collect()
}

fn parse_condition(field: &str, value: &Value) -> AppResult<Filter> {
    let Some(object) = value.as_object() else {
        return Ok(Filter::Eq(field.to_string(), value.clone()));
    };

    if object.len() != 1 {
        return Err(AppError::Validation(format!(
            "Condition on '{}' must have exactly one operator",
            field
        )));
    }

    match object.iter().next() {
        Some((op, operand)) if op == "$eq" => Ok(Filter::Eq(field.to_string(), operand.clone())),
        Some((op, operand)) if op == "$ne" => Ok(Filter::Ne(field.to_string(), operand.clone())),
        Some((op, operand)) if op == "$in" => {
            let values = operand.as_array().ok_or_else(|| {
                AppError::Validation(format!("'$in' on '{}' expects an array", field))
            })?;
            Ok(Filter::In(field.to_string(), values.clone()))
        }
        Some((op, _)) => Err(AppError::Validation(format!(
            "Unsupported operator '{}' on '{}'",
            op, field
        ))),
        None => Err(AppError::Validation(format!("Empty condition on '{}'", field))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn meta(value: Value) -> Metadata {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_eq_and_membership() {
        let doc = meta(json!({"category": "faq", "associated_agents": ["a1", "a2"]}));

        assert!(Filter::eq("category", "faq").matches(&doc));
        assert!(!Filter::eq("category", "blog").matches(&doc));
        assert!(Filter::eq("associated_agents", "a2").matches(&doc));
        assert!(!Filter::eq("associated_agents", "a3").matches(&doc));
        assert!(!Filter::eq("missing", "x").matches(&doc));
    }

    #[test]
    fn test_in_or_and() {
        let doc = meta(json!({"visibility": "shared", "user_id": "u2"}));

        assert!(Filter::is_in("visibility", ["shared", "public"]).matches(&doc));
        assert!(Filter::Or(vec![
            Filter::eq("user_id", "u1"),
            Filter::is_in("visibility", ["shared", "public"]),
        ])
        .matches(&doc));
        assert!(!Filter::eq("user_id", "u2")
            .and(Filter::eq("visibility", "private"))
            .matches(&doc));
        assert!(Filter::And(vec![]).matches(&doc));
        assert!(!Filter::Or(vec![]).matches(&doc));
    }

    #[test]
    fn test_ne_matches_absent_fields() {
        let agent = meta(json!({"document_type": "agent_metadata"}));
        let plain = meta(json!({"category": "faq"}));
        let tagged = meta(json!({"document_type": ["note", "agent_metadata"]}));

        let filter = Filter::ne("document_type", "agent_metadata");
        assert!(!filter.matches(&agent));
        assert!(filter.matches(&plain));
        assert!(!filter.matches(&tagged));

        assert_eq!(
            Filter::parse(r#"{"document_type": {"$ne": "agent_metadata"}}"#).unwrap(),
            filter
        );
        assert!(filter.references("document_type"));
    }

    #[test]
    fn test_and_flattens() {
        let filter = Filter::eq("a", 1)
            .and(Filter::eq("b", 2))
            .and(Filter::all([Filter::eq("c", 3), Filter::eq("d", 4)]));

        assert_eq!(filter.into_conjuncts().len(), 4);
    }

    #[test]
    fn test_references() {
        let filter = Filter::eq("a", 1).and(Filter::Or(vec![Filter::eq("user_id", "u")]));
        assert!(filter.references("user_id"));
        assert!(!filter.references("organization_id"));
    }

    #[test]
    fn test_from_json_forms() {
        let filter = Filter::parse(
            r#"{"category": "faq", "tags": {"$in": ["a", "b"]}, "$or": [{"x": {"$eq": 1}}, {"y": 2}]}"#,
        )
        .unwrap();

        let conjuncts = filter.into_conjuncts();
        assert_eq!(conjuncts.len(), 3);
        assert!(conjuncts.contains(&Filter::eq("category", "faq")));
        assert!(conjuncts.contains(&Filter::is_in("tags", ["a", "b"])));
        assert!(conjuncts.contains(&Filter::Or(vec![Filter::eq("x", 1), Filter::eq("y", 2)])));
    }

    #[test]
    fn test_single_key_is_not_wrapped() {
        assert_eq!(Filter::parse(r#"{"k": "v"}"#).unwrap(), Filter::eq("k", "v"));
    }

    #[test]
    fn test_invalid_filters() {
        assert!(matches!(Filter::parse("{not json"), Err(AppError::Validation(m)) if m.starts_with("Invalid filter JSON")));
        assert!(matches!(Filter::parse("[1, 2]"), Err(AppError::Validation(_))));
        assert!(matches!(Filter::parse(r#"{"k": {"$gt": 1}}"#), Err(AppError::Validation(_))));
        assert!(matches!(Filter::parse(r#"{"$nor": []}"#), Err(AppError::Validation(_))));
        assert!(matches!(Filter::parse(r#"{"k": {"$in": 1}}"#), Err(AppError::Validation(_))));
    }

    #[test]
    fn test_to_json_parses_back() {
        let filter = Filter::all([
            Filter::eq("organization_id", "org1"),
            Filter::Or(vec![
                Filter::eq("user_id", "u1"),
                Filter::is_in("visibility", ["shared", "public"]),
            ]),
        ]);

        assert_eq!(Filter::from_json(&filter.to_json()).unwrap(), filter);
    }
}
