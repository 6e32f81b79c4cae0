//! Embedded destination: fresh-load into a newly created SQLite file.
//!
//! Schema and every row go into one transaction that commits in
//! [`TargetWriter::finish`]. If the run fails first, the transaction is rolled
//! back when the writer is dropped.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteArguments, SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{query::Query, Sqlite, Transaction};
use tracing::{debug, info};

use crate::core::{Row, SqlValue, TargetWriter, WriteStrategy};
use crate::error::{MigrateError, Result};
use crate::registry::TableSpec;
use crate::schema::SchemaScript;

use super::{conflict_clause, insert_prefix};

/// Bound-parameter ceiling of SQLite (`SQLITE_MAX_VARIABLE_NUMBER`).
pub const SQLITE_MAX_VARIABLES: usize = 32_766;

const POOL_CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);

type SqliteQuery<'q> = Query<'q, Sqlite, SqliteArguments<'q>>;

/// Fresh-load writer over a new SQLite file.
pub struct SqliteTarget {
    pool: SqlitePool,
    tx: Option<Transaction<'static, Sqlite>>,
    batch_size: usize,
}

impl SqliteTarget {
    /// Create the destination file and open the run transaction.
    ///
    /// Overwrite checks happen before this is called; the file is expected
    /// not to exist.
    pub async fn create(path: &Path, batch_size: usize) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .acquire_timeout(POOL_CONNECTION_TIMEOUT)
            .connect_with(options)
            .await
            .map_err(|e| {
                MigrateError::pool(e, format!("creating destination {}", path.display()))
            })?;
        let tx = pool
            .begin()
            .await
            .map_err(|e| MigrateError::pool(e, "starting destination transaction"))?;

        info!("Created destination {}", path.display());
        Ok(Self {
            pool,
            tx: Some(tx),
            batch_size: batch_size.max(1),
        })
    }

    fn tx(&mut self) -> Result<&mut Transaction<'static, Sqlite>> {
        self.tx
            .as_mut()
            .ok_or_else(|| MigrateError::pool("transaction already committed", "sqlite destination"))
    }

    /// Rows per statement for a table of `width` columns.
    pub fn rows_per_statement(&self, width: usize) -> usize {
        (SQLITE_MAX_VARIABLES / width.max(1)).clamp(1, self.batch_size)
    }
}

/// `INSERT ... VALUES (?, ?), (?, ?) [ON CONFLICT ...]` for `rows` rows.
pub(crate) fn insert_sql(spec: &TableSpec, rows: usize) -> String {
    let group = format!("({})", vec!["?"; spec.columns.len()].join(", "));
    let mut sql = insert_prefix(spec);
    sql.push_str(&vec![group; rows].join(", "));
    sql.push_str(&conflict_clause(spec, false));
    sql
}

/// Booleans become 0/1 and timestamps epoch seconds.
fn bind_value<'q>(query: SqliteQuery<'q>, value: &SqlValue) -> SqliteQuery<'q> {
    match value {
        SqlValue::Null => query.bind(None::<i64>),
        SqlValue::Bool(b) => query.bind(i64::from(*b)),
        SqlValue::Int(n) => query.bind(*n),
        SqlValue::Real(f) => query.bind(*f),
        SqlValue::Text(s) => query.bind(s.clone()),
        SqlValue::Bytes(b) => query.bind(b.clone()),
        SqlValue::Timestamp(ts) => query.bind(ts.timestamp()),
    }
}

#[async_trait]
impl TargetWriter for SqliteTarget {
    fn strategy(&self) -> WriteStrategy {
        WriteStrategy::FreshLoad
    }

    async fn apply_schema(&mut self, scripts: &[SchemaScript]) -> Result<()> {
        let tx = self.tx()?;
        for script in scripts {
            // SQLite runs every statement of an argument-free query.
            sqlx::query(&script.body)
                .execute(&mut **tx)
                .await
                .map_err(|e| MigrateError::schema(&script.name, e))?;
            info!("Applied schema script {}", script.name);
        }
        Ok(())
    }

    async fn write(&mut self, spec: &TableSpec, rows: &[Row]) -> Result<u64> {
        if rows.is_empty() {
            return Ok(0);
        }
        let per_stmt = self.rows_per_statement(spec.columns.len());
        let tx = self.tx()?;
        let mut written = 0u64;

        for (i, chunk) in rows.chunks(per_stmt).enumerate() {
            let sql = insert_sql(spec, chunk.len());
            let mut query = sqlx::query(&sql);
            for row in chunk {
                for value in row.values() {
                    query = bind_value(query, value);
                }
            }
            query.execute(&mut **tx).await.map_err(|e| {
                MigrateError::transfer(spec.name, format!("statement {} failed: {}", i + 1, e))
            })?;
            written += chunk.len() as u64;
        }

        debug!("{}: inserted {} rows in chunks of {}", spec.name, written, per_stmt);
        Ok(written)
    }

    async fn finish(&mut self) -> Result<()> {
        if let Some(tx) = self.tx.take() {
            tx.commit()
                .await
                .map_err(|e| MigrateError::pool(e, "committing destination transaction"))?;
            info!("Committed destination transaction");
        }
        self.pool.close().await;
        Ok(())
    }

    fn db_type(&self) -> &str {
        "sqlite"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::builtin;
    use sqlx::Row as _;

    fn spec(name: &str) -> TableSpec {
        builtin().into_iter().find(|s| s.name == name).unwrap()
    }

    #[test]
    fn test_insert_sql_shape() {
        assert_eq!(
            insert_sql(&spec("prpr_caches"), 2),
            r#"INSERT INTO "prpr_caches" ("profile_photo_uid", "prpr_file_id") VALUES (?, ?), (?, ?)"#
        );
        assert!(insert_sql(&spec("pic_rate_counter"), 1)
            .ends_with(r#"ON CONFLICT ("rate") DO UPDATE SET "count" = EXCLUDED."count""#));
    }

    #[tokio::test]
    async fn test_rows_per_statement_respects_variable_limit() {
        let dir = tempfile::tempdir().unwrap();
        let target = SqliteTarget::create(&dir.path().join("t.db"), 50_000)
            .await
            .unwrap();
        assert_eq!(target.rows_per_statement(2), SQLITE_MAX_VARIABLES / 2);
        assert_eq!(target.rows_per_statement(20), SQLITE_MAX_VARIABLES / 20);

        let small = SqliteTarget::create(&dir.path().join("s.db"), 3).await.unwrap();
        assert_eq!(small.rows_per_statement(2), 3);
    }

    #[tokio::test]
    async fn test_write_encodes_bool_and_timestamp_as_integers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dest.db");
        let mut target = SqliteTarget::create(&path, 2).await.unwrap();
        target
            .apply_schema(&[SchemaScript::new(
                "kv.sql",
                "CREATE TABLE pic_rate_counter (rate INTEGER PRIMARY KEY, count INTEGER);",
            )])
            .await
            .unwrap();

        let pic = spec("pic_rate_counter");
        let rows = vec![
            Row::new(vec![("rate", SqlValue::Int(1)), ("count", SqlValue::Bool(true))]),
            Row::new(vec![("rate", SqlValue::Int(2)), ("count", SqlValue::Int(7))]),
            Row::new(vec![("rate", SqlValue::Int(1)), ("count", SqlValue::Int(9))]),
        ];
        assert_eq!(target.write(&pic, &rows).await.unwrap(), 3);
        assert_eq!(target.write(&pic, &[]).await.unwrap(), 0);
        target.finish().await.unwrap();

        let pool = SqlitePool::connect_with(SqliteConnectOptions::new().filename(&path))
            .await
            .unwrap();
        let rows = sqlx::query("SELECT rate, count FROM pic_rate_counter ORDER BY rate")
            .fetch_all(&pool)
            .await
            .unwrap();
        let got: Vec<(i64, i64)> = rows
            .iter()
            .map(|r| (r.get::<i64, _>(0), r.get::<i64, _>(1)))
            .collect();
        assert_eq!(got, vec![(1, 9), (2, 7)]);
    }

    #[tokio::test]
    async fn test_uncommitted_run_leaves_no_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dest.db");
        {
            let mut target = SqliteTarget::create(&path, 10).await.unwrap();
            target
                .apply_schema(&[SchemaScript::new(
                    "t.sql",
                    "CREATE TABLE prpr_caches (profile_photo_uid TEXT, prpr_file_id TEXT);",
                )])
                .await
                .unwrap();
            let rows = vec![Row::new(vec![
                ("profile_photo_uid", "a".into()),
                ("prpr_file_id", "b".into()),
            ])];
            target.write(&spec("prpr_caches"), &rows).await.unwrap();
        }

        let pool = SqlitePool::connect_with(SqliteConnectOptions::new().filename(&path))
            .await
            .unwrap();
        let tables = sqlx::query("SELECT name FROM sqlite_master WHERE name = 'prpr_caches'")
            .fetch_all(&pool)
            .await
            .unwrap();
        assert!(tables.is_empty());
    }

    #[tokio::test]
    async fn test_orphaned_child_row_is_rejected() {
        use crate::registry::ColumnSpec;

        let dir = tempfile::tempdir().unwrap();
        let mut target = SqliteTarget::create(&dir.path().join("fk.db"), 10)
            .await
            .unwrap();
        target
            .apply_schema(&[SchemaScript::new(
                "fk.sql",
                "CREATE TABLE parent (id INTEGER PRIMARY KEY);
                 CREATE TABLE child (id INTEGER PRIMARY KEY,
                     parent_id INTEGER NOT NULL REFERENCES parent (id));",
            )])
            .await
            .unwrap();

        let child = TableSpec::new(
            "child",
            vec![ColumnSpec::keep("id"), ColumnSpec::keep("parent_id")],
        );
        let rows = vec![Row::new(vec![
            ("id", SqlValue::Int(1)),
            ("parent_id", SqlValue::Int(99)),
        ])];
        let err = target.write(&child, &rows).await.unwrap_err();
        assert!(matches!(err, MigrateError::Transfer { .. }));
        assert!(err.to_string().contains("FOREIGN KEY"));
    }
}
