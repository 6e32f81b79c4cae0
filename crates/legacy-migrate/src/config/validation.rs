//! Configuration validation and run preconditions.

use std::path::{Path, PathBuf};

use super::{Config, ResolvedTarget, TargetConfig, PG_URL_ENV};
use crate::error::{MigrateError, Result};

/// Validate the configuration values themselves.
pub fn validate(config: &Config) -> Result<()> {
    if config.migration.batch_size == 0 {
        return Err(MigrateError::Config(
            "migration.batch_size must be at least 1".into(),
        ));
    }
    if let Some(TargetConfig::Sqlite { path, .. }) = &config.target {
        if path.as_os_str().is_empty() {
            return Err(MigrateError::Config("target.path is required".into()));
        }
    }
    if let Some(TargetConfig::Postgres { url: Some(url) }) = &config.target {
        if !super::is_postgres_url(url) {
            return Err(MigrateError::Config(format!(
                "target.url must start with postgres:// or postgresql://, got '{}'",
                super::redact_url(url)
            )));
        }
    }
    Ok(())
}

/// Check everything that must hold before the destination is touched, and
/// resolve the destination. `env` looks up environment variables.
pub fn check_preconditions(
    config: &Config,
    env: impl Fn(&str) -> Option<String>,
) -> Result<(PathBuf, ResolvedTarget)> {
    let source = config
        .source
        .path
        .clone()
        .ok_or_else(|| MigrateError::Precondition("no source database given".into()))?;
    if !source.is_file() {
        return Err(MigrateError::Precondition(format!(
            "source database not found: {}",
            source.display()
        )));
    }

    let target = match &config.target {
        Some(TargetConfig::Sqlite { path, force }) => {
            if same_file(&source, path) {
                return Err(MigrateError::Precondition(format!(
                    "source and destination are the same file: {}",
                    path.display()
                )));
            }
            if path.exists() && !force {
                return Err(MigrateError::Precondition(format!(
                    "destination {} already exists; pass --force to overwrite",
                    path.display()
                )));
            }
            ResolvedTarget::Sqlite {
                path: path.clone(),
                force: *force,
            }
        }
        Some(TargetConfig::Postgres { url: Some(url) }) => {
            ResolvedTarget::Postgres { url: url.clone() }
        }
        Some(TargetConfig::Postgres { url: None }) | None => {
            let url = PG_URL_ENV
                .iter()
                .find_map(|name| env(*name).filter(|v| !v.trim().is_empty()))
                .ok_or_else(|| {
                    MigrateError::Precondition(format!(
                        "no destination connection URL; pass --pg-url or set {}",
                        PG_URL_ENV.join(" or ")
                    ))
                })?;
            ResolvedTarget::Postgres { url }
        }
    };

    Ok((source, target))
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}
