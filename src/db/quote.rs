//! Literal and identifier quoting for synthesized SQL.
//!
//! Every table name, column name and value embedded in generated statement text
//! must pass through one of these functions. They are total: any input yields
//! SQL text that the server parses as a single literal or identifier.

use serde_json::Value as JsonValue;

/// Keywords PostgreSQL reserves; identifiers spelled like these must be quoted.
const RESERVED_KEYWORDS: &[&str] = &[
    "all", "analyse", "analyze", "and", "any", "array", "as", "asc", "asymmetric",
    "authorization", "binary", "both", "case", "cast", "check", "collate", "collation",
    "column", "concurrently", "constraint", "create", "cross", "current_catalog",
    "current_date", "current_role", "current_schema", "current_time", "current_timestamp",
    "current_user", "default", "deferrable", "desc", "distinct", "do", "else", "end",
    "except", "false", "fetch", "for", "foreign", "freeze", "from", "full", "grant", "group",
    "having", "ilike", "in", "initially", "inner", "intersect", "into", "is", "isnull", "join",
    "lateral", "leading", "left", "like", "limit", "localtime", "localtimestamp", "natural",
    "not", "notnull", "null", "offset", "on", "only", "or", "order", "outer", "overlaps",
    "placing", "primary", "references", "returning", "right", "select", "session_user",
    "similar", "some", "symmetric", "system_user", "table", "tablesample", "then", "to",
    "trailing", "true", "union", "unique", "user", "using", "variadic", "verbose", "when",
    "where", "window", "with",
];

/// Render a value as a SQL literal.
///
/// - `null` becomes the bare `NULL` keyword
/// - arrays become quoted array literals, e.g. `'{1,2,3}'`
/// - everything else becomes a quoted string literal
pub fn quote_literal(value: &JsonValue) -> String {
    match value {
        JsonValue::Null => "NULL".to_string(),
        JsonValue::Array(items) => quote_string(&array_text(items)),
        other => quote_string(&scalar_text(other)),
    }
}

/// Render a name as a SQL identifier, quoting only when required.
pub fn quote_identifier(name: &str) -> String {
    if is_plain_identifier(name) {
        return name.to_string();
    }
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Render a possibly schema-qualified table name (`schema.table`).
///
/// Each dot-separated part is quoted on its own.
pub fn quote_table(name: &str) -> String {
    name.split('.')
        .map(quote_identifier)
        .collect::<Vec<_>>()
        .join(".")
}

fn quote_string(text: &str) -> String {
    let escaped = text.replace('\'', "''");
    if escaped.contains('\\') {
        format!("E'{}'", escaped.replace('\\', "\\\\"))
    } else {
        format!("'{}'", escaped)
    }
}

fn scalar_text(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        JsonValue::Bool(b) => b.to_string(),
        JsonValue::Number(n) => n.to_string(),
        JsonValue::Null => "NULL".to_string(),
        // Objects (and arrays nested in objects) go in as JSON text.
        other => other.to_string(),
    }
}

fn array_text(items: &[JsonValue]) -> String {
    let elements: Vec<String> = items.iter().map(array_element).collect();
    format!("{{{}}}", elements.join(","))
}

fn array_element(value: &JsonValue) -> String {
    match value {
        JsonValue::Null => "NULL".to_string(),
        JsonValue::Array(items) => array_text(items),
        JsonValue::String(s) => quote_array_string(s),
        JsonValue::Object(_) => quote_array_string(&value.to_string()),
        other => scalar_text(other),
    }
}

fn quote_array_string(s: &str) -> String {
    let needs_quotes = s.is_empty()
        || s.eq_ignore_ascii_case("null")
        || s.chars()
            .any(|c| matches!(c, '{' | '}' | ',' | '"' | '\\') || c.is_whitespace());
    if !needs_quotes {
        return s.to_string();
    }
    let escaped = s.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{}\"", escaped)
}

fn is_plain_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    let starts_ok = matches!(chars.next(), Some(c) if c.is_ascii_lowercase() || c == '_');
    starts_ok
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '$')
        && !RESERVED_KEYWORDS.contains(&name)
}
