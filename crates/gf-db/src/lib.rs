//! gf-db - Database layer for Geoflow
//!
//! This crate provides the `Database` trait and its DuckDB implementation,
//! used for the warehouse and for every per-dataset transform unit.

pub mod duckdb;
pub mod error;
pub mod traits;

pub use crate::duckdb::DuckDbBackend;
pub use error::{DbError, DbResult};
pub use traits::{Database, TableRef};
