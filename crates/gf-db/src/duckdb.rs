//! DuckDB database backend implementation

use crate::error::{DbError, DbResult};
use crate::traits::{Database, TableRef};
use async_trait::async_trait;
use duckdb::{Connection, Transaction};
use gf_core::sql_utils::{escape_sql_string, quote_ident};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Extensions distributed through the community repository
const COMMUNITY_EXTENSIONS: &[&str] = &["h3"];

/// DuckDB database backend.
///
/// Cloning shares the connection. All engine calls made through the
/// [`Database`] trait run on tokio's blocking pool.
#[derive(Clone)]
pub struct DuckDbBackend {
    conn: Arc<Mutex<Connection>>,
    path: Option<PathBuf>,
}

impl std::fmt::Debug for DuckDbBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DuckDbBackend")
            .field("path", &self.path)
            .finish()
    }
}

impl DuckDbBackend {
    /// Create a new in-memory DuckDB connection
    pub fn in_memory() -> DbResult<Self> {
        let conn =
            Connection::open_in_memory().map_err(|e| DbError::ConnectionError(e.to_string()))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: None,
        })
    }

    /// Open (or create) a DuckDB file, creating its parent directory
    pub fn from_path(path: &Path) -> DbResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    DbError::ConnectionError(format!("{}: {}", parent.display(), e))
                })?;
            }
        }
        let conn = Connection::open(path)
            .map_err(|e| DbError::ConnectionError(format!("{}: {}", path.display(), e)))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: Some(path.to_path_buf()),
        })
    }

    /// Create from path (handles the `:memory:` special case)
    pub fn new(path: &Path) -> DbResult<Self> {
        if path.as_os_str() == ":memory:" {
            Self::in_memory()
        } else {
            Self::from_path(path)
        }
    }

    /// File backing this connection, `None` for in-memory databases
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Run a closure against the connection on the calling thread
    pub fn with_conn<F, T, E>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut Connection) -> Result<T, E>,
        E: From<DbError>,
    {
        let mut conn = self
            .conn
            .lock()
            .map_err(|e| E::from(DbError::MutexPoisoned(e.to_string())))?;
        f(&mut conn)
    }

    /// Run a closure against the connection on the blocking pool
    pub async fn run<F, T, E>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut Connection) -> Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: From<DbError> + Send + 'static,
    {
        let this = self.clone();
        match tokio::task::spawn_blocking(move || this.with_conn(f)).await {
            Ok(result) => result,
            Err(e) => Err(DbError::Internal(format!("blocking task failed: {e}")).into()),
        }
    }

    /// Run `body` inside a transaction on the blocking pool.
    ///
    /// Commits when `body` succeeds; any error rolls the transaction back.
    pub async fn transaction<F, T, E>(&self, body: F) -> Result<T, E>
    where
        F: for<'a> FnOnce(&Transaction<'a>) -> Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: From<DbError> + Send + 'static,
    {
        self.run(move |conn| {
            let tx = conn
                .transaction()
                .map_err(|e| E::from(DbError::TransactionError(format!("BEGIN failed: {e}"))))?;
            let value = body(&tx)?;
            tx.commit()
                .map_err(|e| E::from(DbError::TransactionError(format!("COMMIT failed: {e}"))))?;
            Ok(value)
        })
        .await
    }

    fn execute_sync(conn: &Connection, sql: &str) -> DbResult<usize> {
        conn.execute(sql, [])
            .map_err(|e| DbError::ExecutionError(format!("{}: {}", e, sql)))
    }

    fn execute_batch_sync(conn: &Connection, sql: &str) -> DbResult<()> {
        conn.execute_batch(sql).map_err(DbError::from)
    }

    fn load_extension_sync(conn: &Connection, ext: &str) -> DbResult<()> {
        let name = quote_ident(ext);
        if conn.execute_batch(&format!("LOAD {name}")).is_ok() {
            return Ok(());
        }
        let install = if COMMUNITY_EXTENSIONS.contains(&ext) {
            format!("INSTALL {name} FROM community")
        } else {
            format!("INSTALL {name}")
        };
        conn.execute_batch(&install)?;
        conn.execute_batch(&format!("LOAD {name}"))?;
        Ok(())
    }
}

/// List base tables of a catalog on an open connection
pub fn list_tables_sync(conn: &Connection, catalog: Option<&str>) -> DbResult<Vec<TableRef>> {
    let sql = match catalog {
        Some(alias) => format!(
            "SELECT schema_name, table_name FROM duckdb_tables() \
             WHERE database_name = '{}' AND NOT internal ORDER BY 1, 2",
            escape_sql_string(alias)
        ),
        None => "SELECT schema_name, table_name FROM duckdb_tables() \
                 WHERE database_name = current_database() AND NOT internal ORDER BY 1, 2"
            .to_string(),
    };
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], |row| {
        Ok(TableRef::new(row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;
    let mut tables = Vec::new();
    for row in rows {
        tables.push(row?);
    }
    Ok(tables)
}

/// Column names of `schema.table` in the main catalog, in ordinal order
pub fn table_columns_sync(conn: &Connection, schema: &str, table: &str) -> DbResult<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT column_name FROM information_schema.columns \
         WHERE table_catalog = current_database() AND table_schema = ? AND table_name = ? \
         ORDER BY ordinal_position",
    )?;
    let rows = stmt.query_map(duckdb::params![schema, table], |row| row.get::<_, String>(0))?;
    let mut columns = Vec::new();
    for row in rows {
        columns.push(row?);
    }
    Ok(columns)
}

#[async_trait]
impl Database for DuckDbBackend {
    async fn execute(&self, sql: &str) -> DbResult<usize> {
        let sql = sql.to_string();
        self.run(move |conn| Self::execute_sync(conn, &sql)).await
    }

    async fn execute_batch(&self, sql: &str) -> DbResult<()> {
        let sql = sql.to_string();
        self.run(move |conn| Self::execute_batch_sync(conn, &sql))
            .await
    }

    async fn query_count(&self, sql: &str) -> DbResult<usize> {
        let sql = format!("SELECT COUNT(*) FROM ({})", sql);
        self.run(move |conn| {
            let count: i64 = conn.query_row(&sql, [], |row| row.get(0))?;
            Ok(count as usize)
        })
        .await
    }

    async fn relation_exists(&self, schema: &str, table: &str) -> DbResult<bool> {
        let (schema, table) = (schema.to_string(), table.to_string());
        self.run(move |conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM information_schema.tables \
                 WHERE table_catalog = current_database() AND table_schema = ? AND table_name = ?",
                duckdb::params![schema, table],
                |row| row.get(0),
            )?;
            Ok(count > 0)
        })
        .await
    }

    async fn create_schema_if_not_exists(&self, schema: &str) -> DbResult<()> {
        let sql = format!("CREATE SCHEMA IF NOT EXISTS {}", quote_ident(schema));
        self.run(move |conn| Self::execute_batch_sync(conn, &sql))
            .await
    }

    async fn list_tables(&self, catalog: Option<&str>) -> DbResult<Vec<TableRef>> {
        let catalog = catalog.map(str::to_string);
        self.run(move |conn| list_tables_sync(conn, catalog.as_deref()))
            .await
    }

    async fn table_columns(&self, schema: &str, table: &str) -> DbResult<Vec<String>> {
        let (schema, table) = (schema.to_string(), table.to_string());
        self.run(move |conn| table_columns_sync(conn, &schema, &table))
            .await
    }

    async fn load_extensions(&self, extensions: &[String]) -> Vec<String> {
        let extensions = extensions.to_vec();
        let result: DbResult<Vec<String>> = self
            .run(move |conn| {
                let mut failed = Vec::new();
                for ext in &extensions {
                    if let Err(e) = Self::load_extension_sync(conn, ext) {
                        log::warn!("Extension '{}' could not be loaded: {}", ext, e);
                        failed.push(ext.clone());
                    }
                }
                Ok(failed)
            })
            .await;
        match result {
            Ok(failed) => failed,
            Err(e) => {
                log::warn!("Extension loading failed: {}", e);
                Vec::new()
            }
        }
    }

    async fn attach(&self, path: &Path, alias: &str, read_only: bool) -> DbResult<()> {
        let mut sql = format!(
            "ATTACH '{}' AS {}",
            escape_sql_string(&path.display().to_string()),
            quote_ident(alias)
        );
        if read_only {
            sql.push_str(" (READ_ONLY)");
        }
        let alias = alias.to_string();
        self.run(move |conn| {
            conn.execute_batch(&sql).map_err(|e| DbError::AttachError {
                alias,
                message: e.to_string(),
            })
        })
        .await
    }

    async fn detach(&self, alias: &str) -> DbResult<()> {
        let sql = format!("DETACH {}", quote_ident(alias));
        let alias = alias.to_string();
        self.run(move |conn| {
            conn.execute_batch(&sql).map_err(|e| DbError::AttachError {
                alias,
                message: e.to_string(),
            })
        })
        .await
    }

    fn db_type(&self) -> &'static str {
        "duckdb"
    }
}

#[cfg(test)]
#[path = "duckdb_test.rs"]
mod tests;
