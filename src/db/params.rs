//! Bound parameters for raw statements.
//!
//! Unlike synthesized statements, raw statements never inline caller values:
//! each `QueryParam` is bound to a `$n` placeholder.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::Postgres;
use sqlx::postgres::PgArguments;
use sqlx::types::Json;

/// A parameter value for parameterized queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueryParam {
    Null,
    Bool(bool),
    /// Stored as i64 for maximum range
    Int(i64),
    Float(f64),
    String(String),
    IntArray(Vec<i64>),
    TextArray(Vec<String>),
    Json(JsonValue),
}

impl QueryParam {
    /// Check if this parameter is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Get the type name of this parameter for debugging.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::IntArray(_) => "int[]",
            Self::TextArray(_) => "text[]",
            Self::Json(_) => "json",
        }
    }

    /// Interpret a JSON value as a parameter.
    ///
    /// Scalars map to their natural type; homogeneous integer or string arrays
    /// become array parameters; anything else is bound as JSON.
    pub fn from_json(value: JsonValue) -> Self {
        match value {
            JsonValue::Null => Self::Null,
            JsonValue::Bool(b) => Self::Bool(b),
            JsonValue::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                None => match n.as_f64() {
                    Some(f) => Self::Float(f),
                    None => Self::Json(JsonValue::Number(n)),
                },
            },
            JsonValue::String(s) => Self::String(s),
            JsonValue::Array(items) => {
                if let Some(ints) = items.iter().map(JsonValue::as_i64).collect::<Option<Vec<_>>>()
                {
                    Self::IntArray(ints)
                } else if let Some(texts) = items
                    .iter()
                    .map(|v| v.as_str().map(str::to_string))
                    .collect::<Option<Vec<_>>>()
                {
                    Self::TextArray(texts)
                } else {
                    Self::Json(JsonValue::Array(items))
                }
            }
            obj @ JsonValue::Object(_) => Self::Json(obj),
        }
    }
}

impl From<bool> for QueryParam {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for QueryParam {
    fn from(v: i32) -> Self {
        Self::Int(v.into())
    }
}

impl From<i64> for QueryParam {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for QueryParam {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for QueryParam {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for QueryParam {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<Vec<i64>> for QueryParam {
    fn from(v: Vec<i64>) -> Self {
        Self::IntArray(v)
    }
}

impl From<Vec<String>> for QueryParam {
    fn from(v: Vec<String>) -> Self {
        Self::TextArray(v)
    }
}

impl<T: Into<QueryParam>> From<Option<T>> for QueryParam {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Self::Null)
    }
}

/// Bind a parameter to a PostgreSQL query.
pub(crate) fn bind_postgres_param<'q>(
    query: sqlx::query::Query<'q, Postgres, PgArguments>,
    param: &'q QueryParam,
) -> sqlx::query::Query<'q, Postgres, PgArguments> {
    match param {
        QueryParam::Null => query.bind(None::<String>),
        QueryParam::Bool(v) => query.bind(*v),
        QueryParam::Int(v) => query.bind(*v),
        QueryParam::Float(v) => query.bind(*v),
        QueryParam::String(v) => query.bind(v.as_str()),
        QueryParam::IntArray(v) => query.bind(v.as_slice()),
        QueryParam::TextArray(v) => query.bind(v.as_slice()),
        QueryParam::Json(v) => query.bind(Json(v)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_query_param_types() {
        assert!(QueryParam::Null.is_null());
        assert!(!QueryParam::Bool(true).is_null());
        assert_eq!(QueryParam::Int(42).type_name(), "int");
        assert_eq!(QueryParam::from("hello").type_name(), "string");
    }

    #[test]
    fn test_option_conversion() {
        assert_eq!(QueryParam::from(None::<i64>), QueryParam::Null);
        assert_eq!(QueryParam::from(Some(3_i64)), QueryParam::Int(3));
    }

    #[test]
    fn test_from_json() {
        assert_eq!(QueryParam::from_json(json!(7)), QueryParam::Int(7));
        assert_eq!(QueryParam::from_json(json!(2.5)), QueryParam::Float(2.5));
        assert_eq!(
            QueryParam::from_json(json!([1, 2])),
            QueryParam::IntArray(vec![1, 2])
        );
        assert_eq!(
            QueryParam::from_json(json!(["a"])),
            QueryParam::TextArray(vec!["a".to_string()])
        );
        assert_eq!(
            QueryParam::from_json(json!([1, "a"])),
            QueryParam::Json(json!([1, "a"]))
        );
        assert_eq!(
            QueryParam::from_json(json!({"k": 1})),
            QueryParam::Json(json!({"k": 1}))
        );
    }
}
