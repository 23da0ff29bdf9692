//! Schema model for record carving.
//!
//! The carving engine never reads SQL. It receives one [`TableSpec`] per
//! table, each column already reduced to a [`StorageClass`]. This crate owns
//! that model and the JSON schema configuration it is loaded from.
//!
//! # Modules
//!
//! - [`types`]: `StorageClass`, `ColumnSpec`, `TableSpec`
//! - [`affinity`]: declared type text -> `StorageClass`
//! - [`config`]: schema configuration file, name disambiguation, legacy variants

pub mod affinity;
pub mod config;
pub mod error;
pub mod types;

pub use affinity::resolve_declared_type;
pub use config::{DeclaredTable, SchemaConfig};
pub use error::{Result, SchemaError};
pub use types::{ColumnSpec, StorageClass, TableSpec};
