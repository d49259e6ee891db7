//! Database trait definition

use crate::error::DbResult;
use async_trait::async_trait;
use std::path::Path;

/// A table addressed by schema and name
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TableRef {
    pub schema: String,
    pub table: String,
}

impl TableRef {
    pub fn new(schema: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            table: table.into(),
        }
    }

    /// Quoted `"schema"."table"` form
    pub fn quoted(&self) -> String {
        gf_core::sql_utils::quote_table(&self.schema, &self.table)
    }
}

impl std::fmt::Display for TableRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.schema, self.table)
    }
}

/// Database abstraction used by transform units, merge and post-merge.
///
/// Implementations must be Send + Sync; engine work is expected to run off
/// the async executor.
#[async_trait]
pub trait Database: Send + Sync {
    /// Execute a single statement, returns affected rows
    async fn execute(&self, sql: &str) -> DbResult<usize>;

    /// Execute multiple statements
    async fn execute_batch(&self, sql: &str) -> DbResult<()>;

    /// Row count of a query
    async fn query_count(&self, sql: &str) -> DbResult<usize>;

    /// Check whether `schema.table` exists in the main catalog
    async fn relation_exists(&self, schema: &str, table: &str) -> DbResult<bool>;

    /// Create a schema if it does not exist
    async fn create_schema_if_not_exists(&self, schema: &str) -> DbResult<()>;

    /// Base tables of a catalog (the main database when `None`)
    async fn list_tables(&self, catalog: Option<&str>) -> DbResult<Vec<TableRef>>;

    /// Column names of a table, in ordinal order
    async fn table_columns(&self, schema: &str, table: &str) -> DbResult<Vec<String>>;

    /// Install and load extensions; returns the ones that could not be loaded
    async fn load_extensions(&self, extensions: &[String]) -> Vec<String>;

    /// Attach another database file under `alias`
    async fn attach(&self, path: &Path, alias: &str, read_only: bool) -> DbResult<()>;

    /// Detach a previously attached database
    async fn detach(&self, alias: &str) -> DbResult<()>;

    /// Database type identifier for logging
    fn db_type(&self) -> &'static str;
}
