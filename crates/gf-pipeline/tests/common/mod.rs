//! Shared helpers for pipeline integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use gf_core::{ExecutionSettings, Project};
use gf_db::{Database, DuckDbBackend};
use gf_pipeline::summary::{Outcome, Phase, PhaseSummary};
use gf_pipeline::{ConnectorError, ExtractContext, PhaseObserver, SnapshotResult, SourceConnector};
use std::fs;
use std::path::Path;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tempfile::TempDir;

/// Project config without extensions so tests never reach the network
const CONFIG: &str = "name: test\ndatabase:\n  extensions: []\n";

/// A project laid out in a temporary directory
pub struct TestProject {
    pub dir: TempDir,
}

impl TestProject {
    pub fn new() -> Self {
        let project = Self {
            dir: TempDir::new().unwrap(),
        };
        project.write("geoflow.yml", CONFIG);
        project
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn write(&self, rel: &str, content: &str) {
        let path = self.dir.path().join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    /// Write a template under `sql/migrations/`
    pub fn template(&self, rel: &str, sql: &str) {
        self.write(&format!("sql/migrations/{}", rel), sql);
    }

    pub fn datasets(&self, yaml: &str) {
        self.write("config/datasets.yml", yaml);
    }

    pub fn load(&self) -> Project {
        Project::load(self.dir.path()).unwrap()
    }
}

/// Settings with small pools and a generous connector deadline
pub fn settings() -> ExecutionSettings {
    let mut settings = ExecutionSettings::for_cores(4);
    settings.extract_timeout = Duration::from_secs(60);
    settings
}

/// Row count of a warehouse relation
pub async fn count(warehouse: &DuckDbBackend, relation: &str) -> usize {
    warehouse
        .query_count(&format!("SELECT * FROM {}", relation))
        .await
        .unwrap()
}

pub async fn exists(warehouse: &DuckDbBackend, schema: &str, table: &str) -> bool {
    warehouse.relation_exists(schema, table).await.unwrap()
}

/// Connector that sleeps past any reasonable deadline
pub struct SlowConnector {
    pub delay: Duration,
}

#[async_trait]
impl SourceConnector for SlowConnector {
    fn name(&self) -> &str {
        "slow"
    }

    async fn extract(&self, ctx: &ExtractContext) -> Result<SnapshotResult, ConnectorError> {
        tokio::time::sleep(self.delay).await;
        Err(ConnectorError::Extract {
            dataset: ctx.dataset.id.to_string(),
            message: "woke up".to_string(),
        })
    }
}

/// Observer that records every event as a line of text with its instant
#[derive(Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<(String, Instant)>>,
}

impl RecordingObserver {
    pub fn events(&self) -> Vec<String> {
        self.timeline().into_iter().map(|(e, _)| e).collect()
    }

    pub fn timeline(&self) -> Vec<(String, Instant)> {
        self.events.lock().unwrap().clone()
    }

    /// Instant of the single event equal to `event`
    pub fn at(&self, event: &str) -> Instant {
        self.timeline()
            .into_iter()
            .find(|(e, _)| e == event)
            .map(|(_, at)| at)
            .unwrap_or_else(|| panic!("missing event {event}: {:?}", self.events()))
    }

    fn push(&self, event: String) {
        self.events.lock().unwrap().push((event, Instant::now()));
    }
}

impl PhaseObserver for RecordingObserver {
    fn phase_started(&self, phase: Phase, total: usize) {
        self.push(format!("start {} {}", phase, total));
    }

    fn item_started(&self, phase: Phase, id: &str) {
        self.push(format!("begin {} {}", phase, id));
    }

    fn item_finished(&self, phase: Phase, outcome: &Outcome) {
        self.push(format!("item {} {} {}", phase, outcome.id, outcome.status));
    }

    fn phase_finished(&self, summary: &PhaseSummary) {
        self.push(format!("finish {}", summary.phase));
    }
}
