//! Isolated transform units.
//!
//! A unit owns one private DuckDB file for exactly one dataset. It is seeded
//! from the dataset's snapshot, runs the dataset's template chain, and is then
//! handed to the merge coordinator. Units never touch the warehouse, so any
//! number of them can run side by side without sharing a database file.

use crate::cancel::CancellationFlag;
use crate::error::{PipelineError, PipelineResult};
use crate::summary::{OutcomeStatus, TemplateOutcome};
use gf_core::sql_utils::{escape_sql_string, quote_ident, quote_table};
use gf_core::template::{MART_SCHEMA, RAW_SCHEMA};
use gf_core::{combine_checksums, compute_checksum, ChainStep, DatasetConfig, Template};
use gf_db::duckdb::table_columns_sync;
use gf_db::{Database, DbError, DuckDbBackend};
use gf_jinja::TemplateRenderer;
use gf_meta::{migrate_ledger, ExecutionTracker, LedgerUpgrade};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

/// Canonical geometry column name
pub const GEOMETRY_COLUMN: &str = "geom";

/// Source names renamed to [`GEOMETRY_COLUMN`] at seeding, first match wins
const GEOMETRY_ALIASES: &[&str] = &["geometry", "shape", "geometri"];

/// Lifecycle of a unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitState {
    /// Database allocated, schemas and ledger created
    Created,
    /// Snapshot loaded into `raw.<dataset_id>`
    Seeded,
    /// Executing the chain step with this index
    Applying(usize),
    /// Chain complete and the file closed, ready for merge
    Ready,
    Merged,
    Failed,
}

/// A chain step rendered for one dataset, with its ledger checksum
#[derive(Debug, Clone)]
pub struct PlannedStep {
    pub template: Arc<Template>,
    pub sql: String,
    pub checksum: String,
}

/// Ledger checksum of a rendered step: the SQL plus the input snapshot
pub fn step_checksum(sql: &str, snapshot_digest: &str) -> String {
    combine_checksums([compute_checksum(sql).as_str(), snapshot_digest])
}

/// Render every step of a chain for a dataset.
///
/// Fails on the first template that cannot be rendered.
pub fn plan_chain(
    chain: &[ChainStep],
    renderer: &TemplateRenderer,
    dataset: &DatasetConfig,
    snapshot_digest: &str,
) -> PipelineResult<Vec<PlannedStep>> {
    chain
        .iter()
        .map(|step| {
            let sql = renderer.render_for_dataset(step, dataset).map_err(|e| {
                PipelineError::TemplateRender {
                    template: step.template.id.to_string(),
                    source: e,
                }
            })?;
            let checksum = step_checksum(&sql, snapshot_digest);
            Ok(PlannedStep {
                template: Arc::clone(&step.template),
                sql,
                checksum,
            })
        })
        .collect()
}

/// Database file of a unit. Created and removed by the unit itself.
#[derive(Debug)]
pub struct UnitStorage {
    path: PathBuf,
    backend: Option<DuckDbBackend>,
}

impl UnitStorage {
    /// Allocate `<temp_dir>/<dataset_id>.duckdb`, replacing any leftover file
    fn create(temp_dir: &Path, dataset_id: &str) -> PipelineResult<Self> {
        let path = temp_dir.join(format!("{}.duckdb", dataset_id));
        remove_database_files(&path)?;
        let backend = DuckDbBackend::from_path(&path)?;
        Ok(Self {
            path,
            backend: Some(backend),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn backend(&self) -> PipelineResult<&DuckDbBackend> {
        self.backend.as_ref().ok_or_else(|| {
            DbError::ConnectionError(format!("unit {} is closed", self.path.display())).into()
        })
    }

    /// Flush and release the connection so another instance can attach the file
    async fn close(&mut self) -> PipelineResult<()> {
        if let Some(backend) = self.backend.take() {
            backend.execute_batch("CHECKPOINT").await?;
        }
        Ok(())
    }

    fn remove(&mut self) -> PipelineResult<()> {
        self.backend = None;
        remove_database_files(&self.path)
    }
}

/// Delete a DuckDB file and its write-ahead log if present
pub fn remove_database_files(path: &Path) -> PipelineResult<()> {
    let wal = PathBuf::from(format!("{}.wal", path.display()));
    for file in [path, wal.as_path()] {
        if file.exists() {
            std::fs::remove_file(file)?;
        }
    }
    Ok(())
}

/// One disposable database running one dataset's chain
#[derive(Debug)]
pub struct TransformUnit {
    dataset: DatasetConfig,
    storage: UnitStorage,
    state: UnitState,
    cancel: CancellationFlag,
    row_count: u64,
    failed_template: Option<String>,
    outcomes: Vec<TemplateOutcome>,
}

impl TransformUnit {
    /// Allocate the unit database, load extensions and create base schemas
    /// and the private ledger.
    pub async fn create(
        dataset: DatasetConfig,
        temp_dir: &Path,
        extensions: &[String],
        schemas: &[String],
        cancel: CancellationFlag,
    ) -> PipelineResult<Self> {
        let storage = UnitStorage::create(temp_dir, dataset.id.as_str())?;
        let backend = storage.backend()?;

        let failed = backend.load_extensions(extensions).await;
        if !failed.is_empty() {
            log::debug!(
                "[{}] extensions not loaded in unit: {}",
                dataset.id,
                failed.join(", ")
            );
        }

        let mut base: Vec<&str> = vec![RAW_SCHEMA, MART_SCHEMA];
        base.extend(schemas.iter().map(String::as_str));
        for schema in base {
            backend.create_schema_if_not_exists(schema).await?;
        }
        let ledger = backend
            .run(|conn| -> PipelineResult<LedgerUpgrade> { Ok(migrate_ledger(conn)?) })
            .await?;

        log::debug!(
            "[{}] unit created at {} (ledger v{})",
            dataset.id,
            storage.path().display(),
            ledger.to
        );
        Ok(Self {
            dataset,
            storage,
            state: UnitState::Created,
            cancel,
            row_count: 0,
            failed_template: None,
            outcomes: Vec::new(),
        })
    }

    pub fn dataset(&self) -> &DatasetConfig {
        &self.dataset
    }

    pub fn state(&self) -> UnitState {
        self.state
    }

    /// Unit database file
    pub fn path(&self) -> &Path {
        self.storage.path()
    }

    /// Rows loaded at seeding
    pub fn row_count(&self) -> u64 {
        self.row_count
    }

    /// Template that failed the chain, if any
    pub fn failed_template(&self) -> Option<&str> {
        self.failed_template.as_deref()
    }

    /// Per-template outcomes of the chain so far
    pub fn template_outcomes(&self) -> &[TemplateOutcome] {
        &self.outcomes
    }

    /// Load the snapshot into `raw.<dataset_id>` and normalize the geometry
    /// column name. Returns the row count.
    pub async fn seed(&mut self, snapshot: &Path) -> PipelineResult<u64> {
        self.expect_state(UnitState::Created, "seed")?;
        let table = self.dataset.id.to_string();
        let load_sql = format!(
            "CREATE OR REPLACE TABLE {} AS SELECT * FROM read_parquet('{}')",
            quote_table(RAW_SCHEMA, &table),
            escape_sql_string(&snapshot.display().to_string())
        );

        let result = self
            .storage
            .backend()?
            .run(move |conn| -> PipelineResult<u64> {
                conn.execute_batch(&load_sql)?;
                let columns = table_columns_sync(conn, RAW_SCHEMA, &table)?;
                if let Some(rename) = geometry_rename(&columns) {
                    conn.execute_batch(&rename_column_sql(&table, rename))?;
                }
                let count: i64 = conn.query_row(
                    &format!("SELECT COUNT(*) FROM {}", quote_table(RAW_SCHEMA, &table)),
                    [],
                    |row| row.get(0),
                )?;
                Ok(count.max(0) as u64)
            })
            .await;

        match result {
            Ok(rows) => {
                self.row_count = rows;
                self.state = UnitState::Seeded;
                log::debug!("[{}] seeded {} rows", self.dataset.id, rows);
                Ok(rows)
            }
            Err(e) => {
                self.state = UnitState::Failed;
                Err(e)
            }
        }
    }

    /// Execute the planned chain in order, recording each step in the unit
    /// ledger.
    ///
    /// Stops at the first failure or when cancellation is observed; the unit
    /// is then `Failed` and the chain does not advance.
    pub async fn apply_chain(&mut self, steps: &[PlannedStep]) -> PipelineResult<()> {
        self.expect_state(UnitState::Seeded, "apply a chain")?;
        for (i, step) in steps.iter().enumerate() {
            self.state = UnitState::Applying(i);
            let started = Instant::now();
            let result = self.apply_step(step).await;
            let duration_ms = started.elapsed().as_millis() as u64;
            let template_id = step.template.id.to_string();

            if let Err(e) = result {
                self.outcomes.push(TemplateOutcome {
                    template_id: template_id.clone(),
                    status: OutcomeStatus::Failed,
                    duration_ms,
                    error: Some(e.to_string()),
                });
                self.failed_template = Some(template_id);
                self.state = UnitState::Failed;
                return Err(e);
            }
            self.outcomes.push(TemplateOutcome {
                template_id,
                status: OutcomeStatus::Success,
                duration_ms,
                error: None,
            });
        }
        Ok(())
    }

    async fn apply_step(&self, step: &PlannedStep) -> PipelineResult<()> {
        self.cancel.check()?;
        let backend = self.storage.backend()?;
        backend
            .create_schema_if_not_exists(&step.template.schema)
            .await?;

        let template_id = step.template.id.to_string();
        let dataset_id = self.dataset.id.to_string();
        let sql = step.sql.clone();
        let checksum = step.checksum.clone();
        log::debug!("[{}] applying {}", dataset_id, template_id);
        backend
            .run(move |conn| -> PipelineResult<()> {
                conn.execute_batch(&sql)
                    .map_err(|e| PipelineError::TransformExecution {
                        template: template_id.clone(),
                        message: e.to_string(),
                    })?;
                ExecutionTracker::new(conn).record(&template_id, &dataset_id, &checksum)?;
                Ok(())
            })
            .await
    }

    /// Flush and close the unit database; the unit is then ready for merge
    pub async fn close(&mut self) -> PipelineResult<()> {
        if !matches!(self.state, UnitState::Seeded | UnitState::Applying(_)) {
            return Err(self.state_error("close"));
        }
        if let Err(e) = self.storage.close().await {
            self.state = UnitState::Failed;
            return Err(e);
        }
        self.state = UnitState::Ready;
        Ok(())
    }

    pub fn mark_merged(&mut self) {
        self.state = UnitState::Merged;
    }

    pub fn mark_failed(&mut self) {
        self.state = UnitState::Failed;
    }

    /// Release the unit. Merged units are always removed; failed units are
    /// kept for inspection when `retain_failed` is set.
    pub fn dispose(mut self, retain_failed: bool) {
        if self.state != UnitState::Merged && retain_failed {
            self.storage.backend = None;
            log::info!(
                "[{}] unit retained at {}",
                self.dataset.id,
                self.storage.path().display()
            );
            return;
        }
        if let Err(e) = self.storage.remove() {
            log::warn!(
                "[{}] failed to remove unit {}: {}",
                self.dataset.id,
                self.storage.path().display(),
                e
            );
        }
    }

    fn expect_state(&self, expected: UnitState, action: &str) -> PipelineResult<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(self.state_error(action))
        }
    }

    fn state_error(&self, action: &str) -> PipelineError {
        DbError::Internal(format!(
            "cannot {} unit '{}' in state {:?}",
            action, self.dataset.id, self.state
        ))
        .into()
    }
}

/// Source column to rename to `geom`, if the table has none yet
fn geometry_rename(columns: &[String]) -> Option<&str> {
    if columns.iter().any(|c| c == GEOMETRY_COLUMN) {
        return None;
    }
    GEOMETRY_ALIASES.iter().find_map(|alias| {
        columns
            .iter()
            .find(|c| c.eq_ignore_ascii_case(alias))
            .map(String::as_str)
    })
}

fn rename_column_sql(table: &str, column: &str) -> String {
    format!(
        "ALTER TABLE {} RENAME COLUMN {} TO {}",
        quote_table(RAW_SCHEMA, table),
        quote_ident(column),
        GEOMETRY_COLUMN
    )
}

#[cfg(test)]
#[path = "unit_test.rs"]
mod tests;
