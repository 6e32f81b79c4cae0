//! # legacy-migrate
//!
//! Moves a bot's legacy SQLite database into its redesigned schema, either
//! as a fresh embedded SQLite file or into a (possibly non-empty) PostgreSQL
//! database.
//!
//! - **Declarative mappings**: every destination table is one
//!   [`registry::TableSpec`] entry
//! - **Total coercion**: malformed legacy values fall back to defaults
//! - **Keyed merge**: tables fed by several legacy tables are deduplicated,
//!   later sources winning
//! - **Two write strategies**: one-transaction fresh load, or batched
//!   conflict-aware upserts that are safe to re-run
//!
//! ## Example
//!
//! ```rust,no_run
//! use legacy_migrate::{Config, Orchestrator};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("migrate.yaml")?;
//!     let orchestrator = Orchestrator::from_config(&config).await?;
//!     let report = orchestrator.run().await?;
//!     println!("{}", report);
//!     Ok(())
//! }
//! ```

pub mod coerce;
pub mod config;
pub mod core;
pub mod error;
pub mod merge;
pub mod orchestrator;
pub mod registry;
pub mod schema;
pub mod source;
pub mod target;

// Re-exports for convenient access
pub use config::{Config, MigrationConfig, Overrides, ResolvedTarget, SourceConfig, TargetConfig};
pub use error::{MigrateError, Result};
pub use orchestrator::{MigrationReport, Orchestrator, TableReport, TableStatus};
pub use registry::{TableGroup, TableSpec};
pub use schema::SchemaScript;
