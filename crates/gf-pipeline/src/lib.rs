//! gf-pipeline - Pipeline engine for Geoflow
//!
//! Runs datasets through four phases: extract (source connectors write
//! parquet snapshots), transform (one isolated DuckDB unit per dataset runs
//! the template chain), merge (units are folded into the warehouse one at a
//! time) and post-merge (pipeline and global aggregation templates run
//! against the warehouse). Finished mart tables can be exported to files for
//! GIS tools.

pub mod cancel;
pub mod connector;
pub mod error;
pub mod export;
pub mod merge;
pub mod observer;
pub mod post_merge;
pub mod scheduler;
pub mod summary;
pub mod unit;

pub use cancel::CancellationFlag;
pub use connector::{
    ConnectorRegistry, ExtractContext, LogSink, ProgressSink, SnapshotResult, SourceConnector,
};
pub use error::{ConnectorError, PipelineError, PipelineResult};
pub use export::{export_mart, ExportFormat, ExportOptions, ExportReport};
pub use observer::{NoopObserver, PhaseObserver};
pub use post_merge::{PostMergeScope, PostMergeTrigger};
pub use scheduler::{ForceSelection, RunOptions, Scheduler};
pub use summary::{
    Outcome, OutcomeStatus, Phase, PhaseSummary, RunMode, RunStatus, RunSummary, TemplateOutcome,
};
pub use unit::{TransformUnit, UnitState};
