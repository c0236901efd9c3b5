//! Result normalization applied to every row-returning call.

use serde::Deserialize;
use serde_json::Value as JsonValue;

/// A result row: column name to value.
pub type Row = serde_json::Map<String, JsonValue>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct NormalizeOptions {
    /// Default: false (null columns are removed)
    #[serde(default)]
    pub include_nulls: bool,
    /// Default: false (string values are trimmed)
    #[serde(default)]
    pub no_trim_strings: bool,
}

impl NormalizeOptions {
    /// Keep null columns in the result.
    pub fn with_nulls(mut self) -> Self {
        self.include_nulls = true;
        self
    }

    /// Leave string values untouched.
    pub fn without_trim(mut self) -> Self {
        self.no_trim_strings = true;
        self
    }
}

/// Strip null columns and trim strings in place. Never adds columns.
pub fn normalize(rows: &mut [Row], options: NormalizeOptions) {
    for row in rows.iter_mut() {
        if !options.include_nulls {
            row.retain(|_, value| !value.is_null());
        }
        if !options.no_trim_strings {
            for value in row.values_mut() {
                if let JsonValue::String(s) = value {
                    let trimmed = s.trim();
                    if trimmed.len() != s.len() {
                        *s = trimmed.to_string();
                    }
                }
            }
        }
    }
}
