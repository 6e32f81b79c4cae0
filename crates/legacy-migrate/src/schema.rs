//! Destination schema bootstrap scripts.
//!
//! Scripts are opaque SQL bodies executed in order against the destination
//! before any data loads. They are injected per run rather than discovered.

use std::path::{Path, PathBuf};

use tokio_postgres::error::SqlState;
use tracing::debug;

use crate::error::{MigrateError, Result};

/// One DDL script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaScript {
    /// Display name, usually the file name.
    pub name: String,
    pub body: String,
}

impl SchemaScript {
    pub fn new(name: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            body: body.into(),
        }
    }

    /// Read a script from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let body = std::fs::read_to_string(path).map_err(|e| {
            MigrateError::Config(format!("cannot read schema script {}: {}", path.display(), e))
        })?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        debug!("Loaded schema script {} ({} bytes)", name, body.len());
        Ok(Self { name, body })
    }
}

/// Load every script in `paths`, preserving order.
pub fn load_all(paths: &[PathBuf]) -> Result<Vec<SchemaScript>> {
    paths.iter().map(|p| SchemaScript::load(p)).collect()
}

/// SQLSTATEs meaning "this object was created by an earlier run".
const ALREADY_EXISTS: [&SqlState; 4] = [
    &SqlState::DUPLICATE_TABLE,
    &SqlState::DUPLICATE_OBJECT,
    &SqlState::DUPLICATE_FUNCTION,
    &SqlState::DUPLICATE_SCHEMA,
];

/// Whether a networked-backend DDL failure means the script was already applied.
pub fn is_already_exists(code: Option<&SqlState>) -> bool {
    code.is_some_and(|c| ALREADY_EXISTS.contains(&c))
}
