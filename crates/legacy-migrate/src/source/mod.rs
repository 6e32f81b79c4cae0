//! Legacy SQLite store reader.
//!
//! Opens the legacy file read-only through a single-connection SQLx pool.
//! Legacy columns are loosely typed, so each value is decoded according to
//! its runtime storage class rather than the declared column type.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, TypeInfo, ValueRef};
use tracing::{debug, info, warn};

use crate::core::{SourceReader, SourceRecord, SqlValue};
use crate::error::{MigrateError, Result};
use crate::registry::SourceTable;
use crate::target::quote_ident;

/// Connection pool timeout.
const POOL_CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);

/// Read-only reader over a legacy SQLite file.
pub struct SqliteSource {
    pool: SqlitePool,
}

impl SqliteSource {
    /// Open the legacy store. The file must already exist.
    pub async fn open(path: &Path) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .read_only(true)
            .create_if_missing(false);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .acquire_timeout(POOL_CONNECTION_TIMEOUT)
            .connect_with(options)
            .await
            .map_err(|e| MigrateError::pool(e, format!("opening legacy store {}", path.display())))?;

        info!("Opened legacy store {}", path.display());
        Ok(Self { pool })
    }

    /// Build the SELECT for one legacy source, given the columns it actually has.
    /// Unresolvable columns are selected as NULL.
    fn select_sql(source: &SourceTable, available: &[String]) -> String {
        let exprs: Vec<String> = source
            .columns
            .iter()
            .map(|col| match col.resolve(available) {
                Some(name) => quote_ident(name),
                None => {
                    if !col.candidates.is_empty() {
                        warn!(
                            "{}: none of the columns {:?} exist; reading NULL",
                            source.table, col.candidates
                        );
                    }
                    "NULL".to_string()
                }
            })
            .collect();
        format!(
            "SELECT {} FROM {}",
            exprs.join(", "),
            quote_ident(source.table)
        )
    }
}

/// Decode column `idx` by its runtime storage class.
fn value_at(row: &SqliteRow, idx: usize) -> Result<SqlValue> {
    let raw = row.try_get_raw(idx)?;
    if raw.is_null() {
        return Ok(SqlValue::Null);
    }
    let class = raw.type_info().name().to_ascii_uppercase();
    let value = match class.as_str() {
        "INTEGER" | "BOOLEAN" => SqlValue::Int(row.try_get_unchecked::<i64, _>(idx)?),
        "REAL" | "NUMERIC" => SqlValue::Real(row.try_get_unchecked::<f64, _>(idx)?),
        "BLOB" => SqlValue::Bytes(row.try_get_unchecked::<Vec<u8>, _>(idx)?),
        _ => SqlValue::Text(row.try_get_unchecked::<String, _>(idx)?),
    };
    Ok(value)
}

#[async_trait]
impl SourceReader for SqliteSource {
    async fn exists(&self, table: &str) -> bool {
        let found = sqlx::query(
            "SELECT 1 FROM sqlite_master WHERE type IN ('table', 'view') AND name = ?",
        )
        .bind(table)
        .fetch_optional(&self.pool)
        .await;
        match found {
            Ok(row) => row.is_some(),
            Err(e) => {
                debug!("existence check for {} failed: {}", table, e);
                false
            }
        }
    }

    async fn columns(&self, table: &str) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT name FROM pragma_table_info(?) ORDER BY cid")
            .bind(table)
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|r| r.try_get::<String, _>(0).map_err(MigrateError::from))
            .collect()
    }

    async fn fetch(&self, source: &SourceTable) -> Result<Vec<SourceRecord>> {
        if !self.exists(source.table).await {
            return Ok(Vec::new());
        }
        let available = self.columns(source.table).await?;
        let sql = Self::select_sql(source, &available);
        debug!("{}", sql);

        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        let width = source.columns.len();
        let mut records = Vec::with_capacity(rows.len());
        for row in &rows {
            let values = (0..row.len())
                .map(|i| value_at(row, i))
                .collect::<Result<Vec<_>>>()?;
            records.push(SourceRecord::new(source.table, width, values)?);
        }
        debug!("Read {} rows from {}", records.len(), source.table);
        Ok(records)
    }

    fn db_type(&self) -> &str {
        "sqlite"
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::SourceColumn;

    #[test]
    fn test_select_sql_resolves_candidates() {
        let source = SourceTable {
            table: "users",
            columns: vec![
                SourceColumn::named("id"),
                SourceColumn::any(&["timezone", "time_zone"]),
                SourceColumn::absent(),
            ],
        };
        let available = vec!["id".to_string(), "time_zone".to_string()];
        assert_eq!(
            SqliteSource::select_sql(&source, &available),
            r#"SELECT "id", "time_zone", NULL FROM "users""#
        );
    }

    #[tokio::test]
    async fn test_reads_storage_classes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("legacy.db");
        let opts = SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(true);
        let pool = SqlitePool::connect_with(opts).await.unwrap();
        sqlx::query("CREATE TABLE mixed (v)").execute(&pool).await.unwrap();
        sqlx::query("INSERT INTO mixed VALUES (1), (2.5), ('x'), (x'00ff'), (NULL)")
            .execute(&pool)
            .await
            .unwrap();
        pool.close().await;

        let reader = SqliteSource::open(&path).await.unwrap();
        assert!(reader.exists("mixed").await);
        assert!(!reader.exists("nope").await);
        assert_eq!(reader.columns("mixed").await.unwrap(), vec!["v".to_string()]);

        let source = SourceTable {
            table: "mixed",
            columns: vec![SourceColumn::named("v")],
        };
        let values: Vec<SqlValue> = reader
            .fetch(&source)
            .await
            .unwrap()
            .into_iter()
            .flat_map(SourceRecord::into_values)
            .collect();
        assert_eq!(
            values,
            vec![
                SqlValue::Int(1),
                SqlValue::Real(2.5),
                SqlValue::Text("x".into()),
                SqlValue::Bytes(vec![0, 255]),
                SqlValue::Null,
            ]
        );

        let missing = SourceTable {
            table: "absent_table",
            columns: vec![SourceColumn::named("v")],
        };
        assert!(reader.fetch(&missing).await.unwrap().is_empty());
        reader.close().await;
    }
}
