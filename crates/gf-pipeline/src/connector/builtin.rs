//! Built-in connectors backed by DuckDB readers

use super::snapshot::write_snapshot;
use super::{ExtractContext, SnapshotResult, SourceConnector};
use crate::error::ConnectorError;
use async_trait::async_trait;
use gf_core::sql_utils::escape_sql_string;

/// Columnar geo files read with `read_parquet`.
///
/// Parameters: `path` (relative to the project root) or `url`.
#[derive(Debug, Clone, Default)]
pub struct GeoParquetConnector {
    extensions: Vec<String>,
}

impl GeoParquetConnector {
    pub fn new(extensions: Vec<String>) -> Self {
        Self { extensions }
    }
}

#[async_trait]
impl SourceConnector for GeoParquetConnector {
    fn name(&self) -> &str {
        "geoparquet"
    }

    async fn extract(&self, ctx: &ExtractContext) -> Result<SnapshotResult, ConnectorError> {
        let location = source_location(ctx)?;
        ctx.log.info(&format!("reading {}", location));
        let sql = format!(
            "SELECT * FROM read_parquet('{}')",
            escape_sql_string(&location)
        );
        write_snapshot(ctx, &self.extensions, None, &sql).await
    }
}

/// Vector files read through the spatial extension's `ST_Read`
/// (GeoPackage, Shapefile, GeoJSON).
///
/// Parameters: `path` or `url`, optional `layer`, and optional
/// `archive_member` naming a file inside a zip archive.
#[derive(Debug, Clone, Default)]
pub struct SpatialFileConnector {
    extensions: Vec<String>,
}

impl SpatialFileConnector {
    pub fn new(extensions: Vec<String>) -> Self {
        Self { extensions }
    }
}

#[async_trait]
impl SourceConnector for SpatialFileConnector {
    fn name(&self) -> &str {
        "spatial_file"
    }

    async fn extract(&self, ctx: &ExtractContext) -> Result<SnapshotResult, ConnectorError> {
        let mut location = source_location(ctx)?;
        if let Some(member) = ctx.dataset.param_str("archive_member") {
            location = format!("/vsizip/{}/{}", location, member);
        }
        ctx.log.info(&format!("reading {}", location));

        let sql = match ctx.dataset.param_str("layer") {
            Some(layer) => format!(
                "SELECT * FROM ST_Read('{}', layer := '{}')",
                escape_sql_string(&location),
                escape_sql_string(layer)
            ),
            None => format!("SELECT * FROM ST_Read('{}')", escape_sql_string(&location)),
        };
        write_snapshot(ctx, &self.extensions, None, &sql).await
    }
}

/// Arbitrary `SELECT` run in a scratch database; used for relational sources.
///
/// Parameters: `query`, and optional `setup` statements (for example an
/// `ATTACH` of a Postgres or SQLite database) executed first.
#[derive(Debug, Clone, Default)]
pub struct DuckDbQueryConnector {
    extensions: Vec<String>,
}

impl DuckDbQueryConnector {
    pub fn new(extensions: Vec<String>) -> Self {
        Self { extensions }
    }
}

#[async_trait]
impl SourceConnector for DuckDbQueryConnector {
    fn name(&self) -> &str {
        "duckdb_query"
    }

    async fn extract(&self, ctx: &ExtractContext) -> Result<SnapshotResult, ConnectorError> {
        let query = ctx.require_param("query")?.trim().trim_end_matches(';');
        let setup = ctx.dataset.param_str("setup");
        write_snapshot(ctx, &self.extensions, setup, query).await
    }
}

fn source_location(ctx: &ExtractContext) -> Result<String, ConnectorError> {
    match (ctx.dataset.param_str("path"), ctx.dataset.param_str("url")) {
        (Some(path), _) => Ok(ctx.resolve_location(path)),
        (None, Some(url)) => Ok(url.to_string()),
        (None, None) => Err(ConnectorError::MissingParam {
            dataset: ctx.dataset.id.to_string(),
            param: "path".to_string(),
        }),
    }
}
