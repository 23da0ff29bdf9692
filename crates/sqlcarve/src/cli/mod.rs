//! CLI command implementations.

pub mod carve;
pub mod config;
pub mod error;
pub mod info;
pub mod inputs;
pub mod tables;
