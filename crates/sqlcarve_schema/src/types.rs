//! Table and column model.
//!
//! A [`TableSpec`] is the engine's only view of a table: an ordered list of
//! columns, each already resolved to a [`StorageClass`]. Nothing here knows
//! about SQL text.

use serde::{Deserialize, Serialize};

/// Simplified storage category of a declared column.
///
/// The `...NotNull` variants narrow the set of serial type codes a column may
/// carry on disk (no NULL code), which tightens the carving patterns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageClass {
    /// `INTEGER PRIMARY KEY`: stored as NULL, value lives in the cell's rowid.
    RowidAlias,
    Integer,
    IntegerNotNull,
    Boolean,
    BooleanNotNull,
    Real,
    RealNotNull,
    Text,
    TextNotNull,
    Blob,
    BlobNotNull,
    Numeric,
    NumericNotNull,
    DateLike,
    DateLikeNotNull,
}

impl StorageClass {
    /// Every storage class, in declaration order.
    pub const ALL: [StorageClass; 15] = [
        StorageClass::RowidAlias,
        StorageClass::Integer,
        StorageClass::IntegerNotNull,
        StorageClass::Boolean,
        StorageClass::BooleanNotNull,
        StorageClass::Real,
        StorageClass::RealNotNull,
        StorageClass::Text,
        StorageClass::TextNotNull,
        StorageClass::Blob,
        StorageClass::BlobNotNull,
        StorageClass::Numeric,
        StorageClass::NumericNotNull,
        StorageClass::DateLike,
        StorageClass::DateLikeNotNull,
    ];

    /// Returns true if the class excludes the NULL serial type.
    pub fn is_not_null(&self) -> bool {
        matches!(
            self,
            StorageClass::IntegerNotNull
                | StorageClass::BooleanNotNull
                | StorageClass::RealNotNull
                | StorageClass::TextNotNull
                | StorageClass::BlobNotNull
                | StorageClass::NumericNotNull
                | StorageClass::DateLikeNotNull
        )
    }

    /// The nullable counterpart of this class (identity for nullable classes).
    pub fn nullable(&self) -> StorageClass {
        match self {
            StorageClass::IntegerNotNull => StorageClass::Integer,
            StorageClass::BooleanNotNull => StorageClass::Boolean,
            StorageClass::RealNotNull => StorageClass::Real,
            StorageClass::TextNotNull => StorageClass::Text,
            StorageClass::BlobNotNull => StorageClass::Blob,
            StorageClass::NumericNotNull => StorageClass::Numeric,
            StorageClass::DateLikeNotNull => StorageClass::DateLike,
            other => *other,
        }
    }

    /// The NOT NULL counterpart of this class. `RowidAlias` has none.
    pub fn not_null(&self) -> StorageClass {
        match self {
            StorageClass::Integer => StorageClass::IntegerNotNull,
            StorageClass::Boolean => StorageClass::BooleanNotNull,
            StorageClass::Real => StorageClass::RealNotNull,
            StorageClass::Text => StorageClass::TextNotNull,
            StorageClass::Blob => StorageClass::BlobNotNull,
            StorageClass::Numeric => StorageClass::NumericNotNull,
            StorageClass::DateLike => StorageClass::DateLikeNotNull,
            other => *other,
        }
    }

    /// Returns true if the on-disk payload of this class has a bounded width
    /// (at most 8 bytes), as opposed to text/blob style variable content.
    pub fn is_fixed_width(&self) -> bool {
        matches!(
            self.nullable(),
            StorageClass::RowidAlias
                | StorageClass::Integer
                | StorageClass::Boolean
                | StorageClass::Real
        )
    }

    /// Column type used when materializing the class in an output store.
    pub fn sql_affinity(&self) -> &'static str {
        match self.nullable() {
            StorageClass::RowidAlias | StorageClass::Integer | StorageClass::Boolean => "INTEGER",
            StorageClass::Real => "REAL",
            StorageClass::Text => "TEXT",
            StorageClass::Blob => "BLOB",
            StorageClass::DateLike => "DATETIME",
            _ => "NUMERIC",
        }
    }

    /// Stable snake_case name, matching the serde representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageClass::RowidAlias => "rowid_alias",
            StorageClass::Integer => "integer",
            StorageClass::IntegerNotNull => "integer_not_null",
            StorageClass::Boolean => "boolean",
            StorageClass::BooleanNotNull => "boolean_not_null",
            StorageClass::Real => "real",
            StorageClass::RealNotNull => "real_not_null",
            StorageClass::Text => "text",
            StorageClass::TextNotNull => "text_not_null",
            StorageClass::Blob => "blob",
            StorageClass::BlobNotNull => "blob_not_null",
            StorageClass::Numeric => "numeric",
            StorageClass::NumericNotNull => "numeric_not_null",
            StorageClass::DateLike => "date_like",
            StorageClass::DateLikeNotNull => "date_like_not_null",
        }
    }
}

impl std::fmt::Display for StorageClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One column of a recovered table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    pub storage_class: StorageClass,
}

impl ColumnSpec {
    pub fn new(name: impl Into<String>, storage_class: StorageClass) -> Self {
        Self {
            name: name.into(),
            storage_class,
        }
    }
}

/// A table as the carving engine sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSpec {
    pub name: String,
    pub columns: Vec<ColumnSpec>,
}

impl TableSpec {
    pub fn new(name: impl Into<String>, columns: Vec<ColumnSpec>) -> Self {
        Self {
            name: name.into(),
            columns,
        }
    }

    /// Number of columns a recovered record must decode to.
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Storage classes in column order.
    pub fn storage_classes(&self) -> impl Iterator<Item = StorageClass> + '_ {
        self.columns.iter().map(|c| c.storage_class)
    }

    /// Storage class of the first column, if any.
    pub fn first_class(&self) -> Option<StorageClass> {
        self.columns.first().map(|c| c.storage_class)
    }

    /// Returns true if every column has a bounded on-disk width.
    pub fn is_fixed_width(&self) -> bool {
        self.columns.iter().all(|c| c.storage_class.is_fixed_width())
    }

    /// Copy of this table without its last `drop` columns, under a new name.
    pub fn truncated(&self, name: impl Into<String>, drop: usize) -> Option<TableSpec> {
        let keep = self.columns.len().checked_sub(drop)?;
        if keep == 0 {
            return None;
        }
        Some(TableSpec::new(name, self.columns[..keep].to_vec()))
    }
}
