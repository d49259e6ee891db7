//! Execution ledger for Geoflow.
//!
//! The ledger lives in the `gf_meta` schema of the warehouse and of every
//! transform unit. It records which (template, dataset) pairs have been
//! applied with which checksum, and keeps a history of dataset runs.

pub mod error;
pub mod history;
pub mod schema;
pub mod tracker;

pub use error::{MetaError, MetaResult};
pub use history::{DatasetRunRecord, RunRecord};
pub use schema::{ledger_version, migrate_ledger, LedgerUpgrade, LEDGER_VERSION};
pub use tracker::{ExecutionRecord, ExecutionTracker, LedgerSnapshot};

/// Schema holding ledger tables
pub const META_SCHEMA: &str = "gf_meta";
