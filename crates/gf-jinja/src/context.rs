//! Placeholder values for template rendering.
//!
//! Every value is a string. Field-mapping entries produce two placeholders:
//! `<key>` (the literal or the bare column name) and `<key>_expr` (a SQL
//! fragment usable in a `SELECT` over the source alias `s`).

use gf_core::sql_utils::{quote_ident, sql_literal};
use gf_core::{DatasetConfig, FieldValue, PipelineName};
use serde::Serialize;
use std::collections::BTreeMap;

/// Dataset id used for ledger records of post-merge templates
pub const WAREHOUSE_DATASET_ID: &str = "__warehouse__";

/// Mapping key naming the source id column
const SOURCE_ID_KEY: &str = "source_id_column";

/// Number of `data_N` slots that always have an `_expr` placeholder
const DATA_SLOTS: usize = 5;

/// Descriptive fields that default to empty when a dataset does not map them
const TEXT_FIELDS: &[&str] = &["klass", "grupp", "typ", "leverantor"];

/// Ordered placeholder values for one render
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct RenderContext {
    values: BTreeMap<String, String>,
}

impl RenderContext {
    /// Context for a per-dataset template
    pub fn for_dataset(
        dataset: &DatasetConfig,
        schema: &str,
        prev_schema: &str,
        defaults: &BTreeMap<String, FieldValue>,
    ) -> Self {
        let mut ctx = Self::base(dataset.pipeline.as_ref(), schema, prev_schema);
        ctx.insert("dataset_id", dataset.id.as_str());

        for key in TEXT_FIELDS {
            ctx.insert(*key, "");
            ctx.insert(format!("{}_expr", key), "''");
        }
        for n in 1..=DATA_SLOTS {
            ctx.insert(format!("data_{}_expr", n), "''");
        }

        ctx.insert_fields(defaults);
        ctx.insert_fields(&dataset.field_mapping);

        let source_id_expr = match dataset.field_mapping.get(SOURCE_ID_KEY) {
            Some(value) if !value.raw().is_empty() => {
                format!("s.{}::VARCHAR", quote_ident(value.raw()))
            }
            _ => "''".to_string(),
        };
        ctx.insert("source_id_expr", source_id_expr);
        ctx
    }

    /// Context for a post-merge template: pipeline and defaults, no dataset
    pub fn for_pipeline(
        pipeline: Option<&PipelineName>,
        schema: &str,
        prev_schema: &str,
        defaults: &BTreeMap<String, FieldValue>,
    ) -> Self {
        let mut ctx = Self::base(pipeline, schema, prev_schema);
        ctx.insert_fields(defaults);
        ctx
    }

    fn base(pipeline: Option<&PipelineName>, schema: &str, prev_schema: &str) -> Self {
        let mut ctx = Self::default();
        ctx.insert("pipeline", pipeline.map(|p| p.as_str()).unwrap_or(""));
        ctx.insert("schema", schema);
        ctx.insert("prev_schema", prev_schema);
        ctx
    }

    fn insert_fields(&mut self, fields: &BTreeMap<String, FieldValue>) {
        for (key, value) in fields {
            self.insert(key.clone(), value.raw());
            self.insert(format!("{}_expr", key), field_expr(value));
        }
    }

    /// Set a placeholder, replacing any previous value
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Placeholders in name order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// SQL fragment for a field value
pub fn field_expr(value: &FieldValue) -> String {
    match value {
        FieldValue::Literal(lit) => sql_literal(lit),
        FieldValue::ColumnRef(col) => format!("COALESCE(s.{}::VARCHAR, '')", quote_ident(col)),
    }
}

#[cfg(test)]
#[path = "context_test.rs"]
mod tests;
