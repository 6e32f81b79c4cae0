//! Migration orchestrator - main workflow coordinator.
//!
//! A run is strictly sequential: schema bootstrap, then every table in
//! registry order, then (networked backend only) identity reconciliation.
//! Each table is fully read, shaped and merged in memory before it is written.

mod report;

pub use report::{MigrationReport, TableReport, TableStatus};

use tracing::{debug, info, warn};

use crate::config::{check_preconditions, Config, ResolvedTarget};
use crate::core::{SourceReader, TargetWriter, WriteStrategy};
use crate::error::Result;
use crate::merge::Merger;
use crate::registry::{self, TableSpec};
use crate::schema::{self, SchemaScript};
use crate::source::SqliteSource;
use crate::target::{PostgresTarget, SqliteTarget};

/// Migration orchestrator.
pub struct Orchestrator {
    source: Box<dyn SourceReader>,
    target: Box<dyn TargetWriter>,
    specs: Vec<TableSpec>,
    scripts: Vec<SchemaScript>,
}

impl Orchestrator {
    /// Assemble an orchestrator from already-open stores.
    pub fn new(
        source: Box<dyn SourceReader>,
        target: Box<dyn TargetWriter>,
        specs: Vec<TableSpec>,
        scripts: Vec<SchemaScript>,
    ) -> Self {
        Self {
            source,
            target,
            specs,
            scripts,
        }
    }

    /// Check preconditions, then open both stores as configured.
    ///
    /// Every precondition is checked, and every schema script read, before
    /// the destination is touched.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let (source_path, target) = check_preconditions(config, |name| std::env::var(name).ok())?;
        let specs = registry::selected(config.migration.include_saved_messages);
        let scripts = schema::load_all(&config.schema_paths())?;
        if scripts.is_empty() {
            warn!("No schema scripts given; the destination tables must already exist");
        }

        let source = SqliteSource::open(&source_path).await?;
        info!("Destination: {}", target);
        let target = open_target(&target, config.migration.batch_size).await?;

        Ok(Self::new(Box::new(source), target, specs, scripts))
    }

    /// Execute the migration and return the per-table report.
    pub async fn run(mut self) -> Result<MigrationReport> {
        let result = self.run_inner().await;
        self.source.close().await;
        result
    }

    async fn run_inner(&mut self) -> Result<MigrationReport> {
        let mut report = MigrationReport::start(self.target.db_type());
        info!("Starting migration run: {}", report.run_id);

        info!("Phase 1: Applying {} schema scripts", self.scripts.len());
        self.target.apply_schema(&self.scripts).await?;

        info!("Phase 2: Loading {} tables", self.specs.len());
        let mut loaded = Vec::new();
        for spec in &self.specs {
            let entry = load_table(self.source.as_ref(), self.target.as_mut(), spec).await?;
            if entry.status == TableStatus::Loaded {
                loaded.push(spec.clone());
            }
            report.record(entry);
        }

        // Skipped tables received no explicit identity values.
        if self.target.strategy() == WriteStrategy::Upsert {
            info!("Phase 3: Reconciling identity sequences");
            self.target.reconcile_sequences(&loaded).await?;
        }

        self.target.finish().await?;
        report.finish();

        info!(
            "Migration completed: {} tables, {} rows in {:.1}s",
            report.tables.len(),
            report.total_rows,
            report.duration_seconds
        );
        Ok(report)
    }
}

/// Open the destination writer. An authorized overwrite removes the old
/// embedded file first.
async fn open_target(target: &ResolvedTarget, batch_size: usize) -> Result<Box<dyn TargetWriter>> {
    match target {
        ResolvedTarget::Sqlite { path, force } => {
            if *force && path.exists() {
                warn!("Removing existing destination {}", path.display());
                tokio::fs::remove_file(path).await?;
            }
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(parent).await?;
            }
            Ok(Box::new(SqliteTarget::create(path, batch_size).await?))
        }
        ResolvedTarget::Postgres { url } => {
            Ok(Box::new(PostgresTarget::connect(url, batch_size).await?))
        }
    }
}

/// Read, shape, merge and write one destination table.
async fn load_table(
    source: &dyn SourceReader,
    target: &mut dyn TargetWriter,
    spec: &TableSpec,
) -> Result<TableReport> {
    spec.validate()?;

    let mut merger = Merger::new(&spec.conflict_key);
    let mut present = false;
    let mut dropped = 0usize;

    for legacy in &spec.sources {
        if !source.exists(legacy.table).await {
            info!("skip {}: table not found in source", legacy.table);
            continue;
        }
        present = true;
        for record in source.fetch(legacy).await? {
            match spec.shape(record) {
                Some(row) => merger.push(row),
                None => dropped += 1,
            }
        }
    }

    if !present {
        return Ok(TableReport::skipped(spec.name));
    }
    if dropped > 0 {
        debug!("{}: dropped {} rows rejected by filters", spec.name, dropped);
    }
    if merger.replaced() > 0 {
        debug!("{}: {} rows superseded by later duplicates", spec.name, merger.replaced());
    }

    let rows = merger.into_rows();
    let written = target.write(spec, &rows).await?;
    info!("{}: completed ({} rows)", spec.name, written);
    Ok(TableReport::loaded(spec.name, written))
}
