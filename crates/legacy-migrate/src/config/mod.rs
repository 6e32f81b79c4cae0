//! Configuration loading and validation.

mod types;
mod validation;

pub use types::*;
pub use validation::check_preconditions;

use crate::error::Result;
use std::path::{Path, PathBuf};

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }

    /// Layer command-line values over this configuration.
    pub fn apply_overrides(mut self, overrides: Overrides) -> Result<Self> {
        if let Some(source) = overrides.source {
            self.source.path = Some(source);
        }
        if let Some(target) = overrides.target {
            self.target = Some(TargetConfig::parse(&target));
        }
        if let Some(url) = overrides.pg_url {
            self.target = Some(TargetConfig::Postgres { url: Some(url) });
        }
        if overrides.force {
            if let Some(TargetConfig::Sqlite { force, .. }) = &mut self.target {
                *force = true;
            }
        }
        if overrides.include_saved_messages {
            self.migration.include_saved_messages = true;
        }
        if let Some(batch_size) = overrides.batch_size {
            self.migration.batch_size = batch_size;
        }
        if !overrides.schema.is_empty() {
            self.schema.scripts = overrides.schema;
        }
        if !overrides.saved_message_schema.is_empty() {
            self.schema.saved_message_scripts = overrides.saved_message_schema;
        }
        self.validate()?;
        Ok(self)
    }

    /// Schema script paths for this run.
    pub fn schema_paths(&self) -> Vec<PathBuf> {
        self.schema.paths(self.migration.include_saved_messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const YAML: &str = r#"
source:
  path: legacy.db
target:
  type: sqlite
  path: migrated.db
migration:
  include_saved_messages: true
schema:
  scripts: [sql/schema_user.sql, sql/schema_gemini.sql]
  saved_message_scripts: [sql/schema_saved_msg.sql]
"#;

    #[test]
    fn test_from_yaml() {
        let config = Config::from_yaml(YAML).unwrap();
        assert_eq!(config.source.path, Some(PathBuf::from("legacy.db")));
        assert_eq!(
            config.target,
            Some(TargetConfig::Sqlite {
                path: "migrated.db".into(),
                force: false
            })
        );
        assert_eq!(config.migration.batch_size, DEFAULT_BATCH_SIZE);
        assert_eq!(config.schema_paths().len(), 3);
    }

    #[test]
    fn test_postgres_target_without_url() {
        let config = Config::from_yaml("target:\n  type: postgres\n").unwrap();
        assert_eq!(config.target, Some(TargetConfig::Postgres { url: None }));
    }

    #[test]
    fn test_unknown_target_type_is_rejected() {
        assert!(Config::from_yaml("target:\n  type: mysql\n").is_err());
    }

    #[test]
    fn test_overrides_take_precedence() {
        let config = Config::from_yaml(YAML)
            .unwrap()
            .apply_overrides(Overrides {
                target: Some("out.db".into()),
                force: true,
                batch_size: Some(50),
                schema: vec!["only.sql".into()],
                ..Overrides::default()
            })
            .unwrap();
        assert_eq!(
            config.target,
            Some(TargetConfig::Sqlite {
                path: "out.db".into(),
                force: true
            })
        );
        assert_eq!(config.migration.batch_size, 50);
        assert_eq!(config.schema.scripts, vec![PathBuf::from("only.sql")]);
        assert_eq!(config.source.path, Some(PathBuf::from("legacy.db")));
    }

    #[test]
    fn test_pg_url_override_selects_networked_backend() {
        let config = Config::default()
            .apply_overrides(Overrides {
                pg_url: Some("postgres://h/db".into()),
                ..Overrides::default()
            })
            .unwrap();
        assert!(matches!(
            config.target,
            Some(TargetConfig::Postgres { url: Some(_) })
        ));
    }

    #[test]
    fn test_zero_batch_override_is_rejected() {
        let result = Config::default().apply_overrides(Overrides {
            batch_size: Some(0),
            ..Overrides::default()
        });
        assert!(result.is_err());
    }
}
