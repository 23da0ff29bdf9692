//! Recovered record model.

use crate::payload::sanitize;
use crate::scenario::Scenario;
use std::fmt;
use std::sync::Arc;

/// Rendering of a rowid-alias column whose rowid was overwritten.
pub const ROWID_NOT_RECOVERED: &str = "rowid not recovered";

/// Rendering of a column whose bytes could not be decoded.
pub const ERROR_MARKER: &str = "error";

/// A decoded column value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    /// Rowid alias column of a record found in a freeblock.
    RowidNotRecovered,
    /// Column bytes missing or undecodable.
    Error,
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Value::Error)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Real(r) => write!(f, "{r}"),
            Value::Text(s) => f.write_str(s),
            Value::RowidNotRecovered => f.write_str(ROWID_NOT_RECOVERED),
            Value::Error => f.write_str(ERROR_MARKER),
        }
    }
}

/// One record recovered from an input file.
#[derive(Debug, Clone, PartialEq)]
pub struct RecoveredRecord {
    pub table: Arc<str>,
    pub scenario: Scenario,
    /// Offset of the match start within the source file.
    pub source_offset: u64,
    pub source_file: Arc<str>,
    /// One value per table column, in column order.
    pub values: Vec<Value>,
}

impl RecoveredRecord {
    pub fn scenario_label(&self) -> String {
        self.scenario.label()
    }

    /// Returns true if any decoded value contains `keyword`.
    ///
    /// The keyword is cleaned like recovered text before comparing. Marker
    /// values never match.
    pub fn contains_keyword(&self, keyword: &str) -> bool {
        let needle = sanitize(keyword);
        self.values.iter().any(|v| match v {
            Value::Text(s) => s.contains(needle.as_str()),
            Value::Integer(_) | Value::Real(_) => v.to_string().contains(needle.as_str()),
            Value::Null | Value::RowidNotRecovered | Value::Error => false,
        })
    }
}
