//! Statement synthesis from a [`Schema`] and a [`Record`].
//!
//! Generated statements inline every value through [`quote_literal`] and every
//! name through [`quote_identifier`] / [`quote_table`]; they are executed with
//! no bound parameters. Columns are ordered keys first (key order), then
//! non-key fields (declaration order).

use crate::db::quote::{quote_identifier, quote_literal, quote_table};
use crate::db::schema::{FieldDescriptor, Record, Schema};
use crate::error::{DbError, DbResult};
use serde_json::Value as JsonValue;

/// SQL text produced by the synthesizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    pub sql: String,
}

impl Statement {
    fn new(sql: String) -> Self {
        Self { sql }
    }
}

impl std::fmt::Display for Statement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.sql)
    }
}

/// A field selected for a statement together with its value.
struct Column<'a> {
    name: &'a str,
    value: &'a JsonValue,
}

impl Column<'_> {
    fn ident(&self) -> String {
        quote_identifier(self.name)
    }

    fn literal(&self) -> String {
        quote_literal(self.value)
    }

    fn assignment(&self) -> String {
        format!("{}={}", self.ident(), self.literal())
    }
}

fn column<'a>(field: &'a FieldDescriptor, value: &'a JsonValue) -> Option<Column<'a>> {
    field.column_name().map(|name| Column { name, value })
}

/// Non-key persisted fields that have a value (null included) in the record.
fn present_values<'a>(schema: &'a Schema, record: &'a Record) -> Vec<Column<'a>> {
    schema
        .value_fields()
        .filter_map(|f| record.get(f.name()).and_then(|v| column(f, v)))
        .collect()
}

/// Every persisted key field; an absent key is an input error.
fn required_keys<'a>(
    schema: &'a Schema,
    record: &'a Record,
    table: &str,
) -> DbResult<Vec<Column<'a>>> {
    if schema.keys().is_empty() {
        return Err(DbError::configuration(format!(
            "Key missing in schema definition for table '{}'",
            table
        )));
    }
    schema
        .key_fields()
        .map(|f| {
            let value = record.get(f.name()).ok_or_else(|| {
                DbError::invalid_input(format!(
                    "Key field '{}' is required for table '{}'",
                    f.name(),
                    table
                ))
            })?;
            column(f, value).ok_or_else(|| {
                DbError::internal(format!("Key field '{}' has no column", f.name()))
            })
        })
        .collect()
}

fn idents(columns: &[Column<'_>]) -> String {
    columns.iter().map(Column::ident).collect::<Vec<_>>().join(", ")
}

fn literals(columns: &[Column<'_>]) -> String {
    columns
        .iter()
        .map(Column::literal)
        .collect::<Vec<_>>()
        .join(", ")
}

fn assignments(columns: &[Column<'_>]) -> String {
    columns
        .iter()
        .map(Column::assignment)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Build an `INSERT ... RETURNING` statement.
///
/// Keys that are null or absent are left out so the database can generate them.
pub fn insert(table: &str, schema: &Schema, record: &Record) -> DbResult<Statement> {
    let mut columns: Vec<Column<'_>> = schema
        .key_fields()
        .filter_map(|f| match record.get(f.name()) {
            Some(JsonValue::Null) | None => None,
            Some(v) => column(f, v),
        })
        .collect();
    columns.extend(present_values(schema, record));

    if columns.is_empty() {
        return Err(DbError::invalid_input(format!(
            "No columns to insert into '{}'",
            table
        )));
    }

    let cols = idents(&columns);
    Ok(Statement::new(format!(
        "INSERT INTO {} ({}) VALUES ({}) RETURNING {}",
        quote_table(table),
        cols,
        literals(&columns),
        cols
    )))
}

/// Build an `INSERT ... ON CONFLICT (keys) DO UPDATE ... RETURNING` statement.
pub fn upsert(table: &str, schema: &Schema, record: &Record) -> DbResult<Statement> {
    let keys = required_keys(schema, record, table)?;
    let values = present_values(schema, record);

    if values.is_empty() {
        return Err(DbError::invalid_input(format!(
            "No non-key columns to upsert into '{}'",
            table
        )));
    }

    let all: Vec<&Column<'_>> = keys.iter().chain(values.iter()).collect();
    let cols = all.iter().map(|c| c.ident()).collect::<Vec<_>>().join(", ");
    let vals = all.iter().map(|c| c.literal()).collect::<Vec<_>>().join(", ");

    Ok(Statement::new(format!(
        "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT ({}) DO UPDATE SET {} RETURNING {}",
        quote_table(table),
        cols,
        vals,
        idents(&keys),
        assignments(&values),
        idents(&values)
    )))
}

/// Build an `UPDATE ... WHERE keys ... RETURNING` statement.
///
/// A null key is matched with `IS NULL`, since `= NULL` never matches.
pub fn update(table: &str, schema: &Schema, record: &Record) -> DbResult<Statement> {
    let keys = required_keys(schema, record, table)?;
    let values = present_values(schema, record);

    if values.is_empty() {
        return Err(DbError::invalid_input(format!(
            "No non-key columns to update in '{}'",
            table
        )));
    }

    let conditions = keys
        .iter()
        .map(|k| match k.value {
            JsonValue::Null => format!("{} IS NULL", k.ident()),
            _ => format!("{} = {}", k.ident(), k.literal()),
        })
        .collect::<Vec<_>>()
        .join(" AND ");

    Ok(Statement::new(format!(
        "UPDATE {} SET {} WHERE {} RETURNING {}",
        quote_table(table),
        assignments(&values),
        conditions,
        idents(&values)
    )))
}
