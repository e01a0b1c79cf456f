//! Data models for the transaction manager.
//!
//! This module re-exports all model types used throughout the crate.

pub mod connection;
pub mod query;
pub mod row;

// Re-export commonly used types
pub use connection::{ConnectionConfig, ConnectionConfigError, DatabaseType};
pub use query::{ExecInfo, Params, QueryParam, Statement};
pub use row::{ColumnTypes, Row, Value};
