//! Schema descriptors for persisted record types.
//!
//! A [`Schema`] is an explicit, ordered list of field descriptors plus the key
//! fields of an entity. It is built once per type (see [`Entity`]) and validated
//! at construction.

use crate::error::{DbError, DbResult};
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::collections::HashSet;

/// A record supplied to the statement synthesizer.
///
/// A missing key is an *absent* field and is left out of generated SQL;
/// `Value::Null` is an explicit SQL NULL.
pub type Record = serde_json::Map<String, JsonValue>;

/// Declared value type of a persisted field.
///
/// Only its presence matters to statement synthesis; the variant is metadata
/// for callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    Text,
    Integer,
    Float,
    Decimal,
    Boolean,
    Timestamp,
    Date,
    Uuid,
    Json,
    Array,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    name: String,
    /// None for virtual fields
    column: Option<String>,
    /// None for metadata-only fields
    value_type: Option<ValueType>,
}

impl FieldDescriptor {
    /// A persisted field whose column has the same name as the field.
    pub fn new(name: impl Into<String>, value_type: ValueType) -> Self {
        let name = name.into();
        Self {
            column: Some(name.clone()),
            name,
            value_type: Some(value_type),
        }
    }

    /// A field carrying no value type; it is never written.
    pub fn metadata(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            column: Some(name.clone()),
            name,
            value_type: None,
        }
    }

    /// Map the field to a differently named column.
    pub fn column(mut self, column: impl Into<String>) -> Self {
        self.column = Some(column.into());
        self
    }

    /// Mark the field as virtual: it has no column and is never written.
    pub fn virtual_field(mut self) -> Self {
        self.column = None;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn column_name(&self) -> Option<&str> {
        self.column.as_deref()
    }

    pub fn value_type(&self) -> Option<ValueType> {
        self.value_type
    }

    /// Whether the field takes part in generated statements.
    pub fn is_persisted(&self) -> bool {
        self.column.is_some() && self.value_type.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    fields: Vec<FieldDescriptor>,
    keys: Vec<String>,
}

impl Schema {
    /// Build and validate a schema.
    ///
    /// Fails with a configuration error when a key is not a declared,
    /// persisted field or when field or key names repeat.
    pub fn new<K, S>(fields: Vec<FieldDescriptor>, keys: K) -> DbResult<Self>
    where
        K: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let keys: Vec<String> = keys.into_iter().map(Into::into).collect();

        let mut seen = HashSet::new();
        for field in &fields {
            if !seen.insert(field.name.as_str()) {
                return Err(DbError::configuration(format!(
                    "Field '{}' is declared more than once",
                    field.name
                )));
            }
        }

        let mut seen_keys = HashSet::new();
        for key in &keys {
            let Some(field) = fields.iter().find(|f| &f.name == key) else {
                return Err(DbError::configuration(format!(
                    "Key field '{}' is not declared in the schema",
                    key
                )));
            };
            if !field.is_persisted() {
                return Err(DbError::configuration(format!(
                    "Key field '{}' must be a persisted field with a column and a value type",
                    key
                )));
            }
            if !seen_keys.insert(key.as_str()) {
                return Err(DbError::configuration(format!(
                    "Key field '{}' is listed more than once",
                    key
                )));
            }
        }

        Ok(Self { fields, keys })
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn is_key(&self, name: &str) -> bool {
        self.keys.iter().any(|k| k == name)
    }

    /// Persisted key fields, in key order.
    pub fn key_fields(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.keys
            .iter()
            .filter_map(|k| self.field(k))
            .filter(|f| f.is_persisted())
    }

    /// Persisted non-key fields, in declaration order.
    pub fn value_fields(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields
            .iter()
            .filter(|f| f.is_persisted() && !self.is_key(&f.name))
    }
}

/// A record type with a static schema and table.
///
/// ```ignore
/// struct Product { id: Option<i64>, name: String }
///
/// impl Entity for Product {
///     const TABLE: &'static str = "products";
///
///     fn schema() -> &'static Schema {
///         static SCHEMA: LazyLock<Schema> = LazyLock::new(|| {
///             Schema::new(
///                 vec![
///                     FieldDescriptor::new("id", ValueType::Integer),
///                     FieldDescriptor::new("name", ValueType::Text),
///                 ],
///                 ["id"],
///             )
///             .expect("product schema")
///         });
///         &SCHEMA
///     }
/// }
/// ```
pub trait Entity {
    const TABLE: &'static str;

    fn schema() -> &'static Schema;
}

/// Serialize a value into a [`Record`].
///
/// Fields the serializer skips (e.g. `#[serde(skip_serializing_if = "Option::is_none")]`)
/// become absent; `None` without a skip attribute becomes an explicit NULL.
pub fn to_record<T: Serialize>(value: &T) -> DbResult<Record> {
    match serde_json::to_value(value) {
        Ok(JsonValue::Object(map)) => Ok(map),
        Ok(other) => Err(DbError::invalid_input(format!(
            "Record must serialize to an object, got {}",
            json_kind(&other)
        ))),
        Err(e) => Err(DbError::invalid_input(format!(
            "Failed to serialize record: {}",
            e
        ))),
    }
}

fn json_kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "bool",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}
