//! Reader and writer traits.
//!
//! The orchestrator only talks to the legacy store through [`SourceReader`]
//! and to the destination through [`TargetWriter`], so either side can be
//! swapped (or faked in tests) without touching the engine.

use async_trait::async_trait;
use serde::Serialize;

use crate::error::Result;
use crate::registry::{SourceTable, TableSpec};
use crate::schema::SchemaScript;

use super::value::{Row, SourceRecord};

/// Read-only access to the legacy store.
#[async_trait]
pub trait SourceReader: Send + Sync {
    /// Whether the legacy table exists. Never fails; lookup errors count as
    /// absence.
    async fn exists(&self, table: &str) -> bool;

    /// Column names of a legacy table, in declaration order. Empty when the
    /// table does not exist.
    async fn columns(&self, table: &str) -> Result<Vec<String>>;

    /// Read every record of `source`, shaped by its column list. An absent
    /// table yields no records.
    async fn fetch(&self, source: &SourceTable) -> Result<Vec<SourceRecord>>;

    /// Database type identifier (e.g., "sqlite").
    fn db_type(&self) -> &str;

    /// Close the connection.
    async fn close(&self);
}

/// How a writer resolves uniqueness conflicts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteStrategy {
    /// Freshly created schema; the whole run is one transaction.
    FreshLoad,
    /// Possibly non-empty destination; every batch commits on its own.
    Upsert,
}

/// Write schema and rows to the destination store.
#[async_trait]
pub trait TargetWriter: Send {
    fn strategy(&self) -> WriteStrategy;

    /// Execute the bootstrap scripts, in order.
    async fn apply_schema(&mut self, scripts: &[SchemaScript]) -> Result<()>;

    /// Write `rows` into the destination table of `spec`, returning the
    /// number of rows submitted. Zero rows must issue no statement.
    async fn write(&mut self, spec: &TableSpec, rows: &[Row]) -> Result<u64>;

    /// Fix up identity counters after explicit identity values were loaded.
    async fn reconcile_sequences(&mut self, _specs: &[TableSpec]) -> Result<()> {
        Ok(())
    }

    /// Make everything written so far durable.
    async fn finish(&mut self) -> Result<()>;

    /// Database type identifier (e.g., "postgres").
    fn db_type(&self) -> &str;
}
