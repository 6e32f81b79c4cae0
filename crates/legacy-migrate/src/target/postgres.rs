//! Networked destination: conflict-aware upserts into PostgreSQL.
//!
//! Rows are rendered as SQL literals and sent as one multi-row INSERT per
//! batch, each batch in its own transaction. A failure leaves earlier batches
//! committed; re-running is safe because every INSERT resolves conflicts.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use deadpool_postgres::{Manager, ManagerConfig, Object, Pool, RecyclingMethod};
use rustls::ClientConfig;
use tokio_postgres::Config as PgConfig;
use tokio_postgres_rustls::MakeRustlsConnect;
use tracing::{debug, info, warn};

use crate::core::{Row, SqlValue, TargetWriter, WriteStrategy};
use crate::error::{MigrateError, Result};
use crate::registry::TableSpec;
use crate::schema::{is_already_exists, SchemaScript};

use super::sequence::setval_sql;
use super::{conflict_clause, insert_prefix};

const POOL_CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);

/// TLS behavior derived from the URL's `sslmode` parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsMode {
    /// `sslmode=disable`.
    Disable,
    /// `prefer` / `require` (or absent): encrypted, server certificate not verified.
    Encrypt,
    /// `verify-ca` / `verify-full`: certificate checked against webpki roots.
    Verify,
}

impl TlsMode {
    /// Extract the TLS mode from a connection URL. Verification modes are
    /// rewritten to `sslmode=require`, which is what the driver understands;
    /// the verification itself is done by the rustls config.
    pub fn from_url(url: &str) -> (Self, String) {
        let Some(query_start) = url.find('?') else {
            return (TlsMode::Encrypt, url.to_string());
        };
        let (base, query) = url.split_at(query_start);
        let mut mode = TlsMode::Encrypt;
        let params: Vec<String> = query[1..]
            .split('&')
            .map(|pair| match pair.split_once('=') {
                Some(("sslmode", value)) => match value.to_ascii_lowercase().as_str() {
                    "disable" => {
                        mode = TlsMode::Disable;
                        pair.to_string()
                    }
                    "verify-ca" | "verify-full" => {
                        mode = TlsMode::Verify;
                        "sslmode=require".to_string()
                    }
                    _ => pair.to_string(),
                },
                _ => pair.to_string(),
            })
            .collect();
        (mode, format!("{}?{}", base, params.join("&")))
    }
}

/// Upsert writer over a single PostgreSQL connection.
pub struct PostgresTarget {
    client: Object,
    batch_size: usize,
}

impl PostgresTarget {
    /// Connect to the destination. `url` is any libpq-style connection URL.
    pub async fn connect(url: &str, batch_size: usize) -> Result<Self> {
        let (tls_mode, url) = TlsMode::from_url(url);
        let mut pg_config: PgConfig = url
            .parse()
            .map_err(|e| MigrateError::Config(format!("invalid PostgreSQL URL: {}", e)))?;
        pg_config.keepalives(true);
        pg_config.keepalives_idle(Duration::from_secs(30));
        pg_config.connect_timeout(POOL_CONNECTION_TIMEOUT);

        let mgr_config = ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        };

        let pool = match tls_mode {
            TlsMode::Disable => {
                warn!("PostgreSQL TLS is disabled. Credentials will be transmitted in plaintext.");
                let mgr = Manager::from_config(pg_config, tokio_postgres::NoTls, mgr_config);
                Pool::builder(mgr)
                    .max_size(1)
                    .build()
                    .map_err(|e| MigrateError::pool(e, "creating PostgreSQL target pool"))?
            }
            mode => {
                let tls_connector = MakeRustlsConnect::new(build_tls_config(mode)?);
                let mgr = Manager::from_config(pg_config, tls_connector, mgr_config);
                Pool::builder(mgr)
                    .max_size(1)
                    .build()
                    .map_err(|e| MigrateError::pool(e, "creating PostgreSQL target pool"))?
            }
        };

        let client = pool
            .get()
            .await
            .map_err(|e| MigrateError::pool(e, "connecting to PostgreSQL target"))?;
        client.simple_query("SELECT 1").await?;
        info!("Connected to PostgreSQL target");

        Ok(Self {
            client,
            batch_size: batch_size.max(1),
        })
    }
}

fn build_tls_config(mode: TlsMode) -> Result<ClientConfig> {
    let builder = ClientConfig::builder_with_provider(Arc::new(
        rustls::crypto::ring::default_provider(),
    ))
    .with_safe_default_protocol_versions()
    .map_err(|e| MigrateError::Config(format!("TLS setup failed: {}", e)))?;

    let config = match mode {
        TlsMode::Verify => {
            let mut root_store = rustls::RootCertStore::empty();
            root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
            info!("TLS certificate verification enabled");
            builder
                .with_root_certificates(root_store)
                .with_no_client_auth()
        }
        _ => {
            debug!("TLS enabled without server certificate verification");
            builder
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(NoVerifier))
                .with_no_client_auth()
        }
    };
    Ok(config)
}

/// The server's own error text when there is one. `Display` of a
/// `tokio_postgres::Error` only says "db error".
fn server_message(e: &tokio_postgres::Error) -> String {
    match e.as_db_error() {
        Some(db) => match db.detail() {
            Some(detail) => format!("{} ({})", db.message(), detail),
            None => db.message().to_string(),
        },
        None => e.to_string(),
    }
}

/// Escape a string for SQL literal use.
fn escape_sql_string(s: &str) -> String {
    s.replace('\'', "''")
}

/// Render a value as a PostgreSQL literal.
pub(crate) fn sql_value_to_literal(value: &SqlValue) -> String {
    match value {
        SqlValue::Null => "NULL".to_string(),
        SqlValue::Bool(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
        SqlValue::Int(n) => n.to_string(),
        SqlValue::Real(f) if f.is_nan() => "'NaN'::float8".to_string(),
        SqlValue::Real(f) if f.is_infinite() => {
            let sign = if *f > 0.0 { "" } else { "-" };
            format!("'{}Infinity'::float8", sign)
        }
        SqlValue::Real(f) => format!("{:?}::float8", f),
        // NUL bytes are not representable in PostgreSQL text.
        SqlValue::Text(s) => format!("'{}'", escape_sql_string(&s.replace('\0', ""))),
        SqlValue::Bytes(b) => format!("'\\x{}'::bytea", hex::encode(b)),
        SqlValue::Timestamp(ts) => format!("'{}'::timestamptz", ts.to_rfc3339()),
    }
}

/// One multi-row upsert statement with literal values.
pub(crate) fn build_upsert_sql_literals(spec: &TableSpec, rows: &[Row]) -> String {
    let value_rows: Vec<String> = rows
        .iter()
        .map(|row| {
            let values: Vec<String> = row.values().map(sql_value_to_literal).collect();
            format!("({})", values.join(", "))
        })
        .collect();
    format!(
        "{}{}{}",
        insert_prefix(spec),
        value_rows.join(", "),
        conflict_clause(spec, true)
    )
}

#[async_trait]
impl TargetWriter for PostgresTarget {
    fn strategy(&self) -> WriteStrategy {
        WriteStrategy::Upsert
    }

    async fn apply_schema(&mut self, scripts: &[SchemaScript]) -> Result<()> {
        for script in scripts {
            let tx = self.client.transaction().await?;
            match tx.batch_execute(&script.body).await {
                Ok(()) => {
                    tx.commit().await?;
                    info!("Applied schema script {}", script.name);
                }
                Err(e) if is_already_exists(e.code()) => {
                    tx.rollback().await?;
                    warn!("Skipping schema script {}: {}", script.name, server_message(&e));
                }
                Err(e) => return Err(MigrateError::schema(&script.name, server_message(&e))),
            }
        }
        Ok(())
    }

    async fn write(&mut self, spec: &TableSpec, rows: &[Row]) -> Result<u64> {
        if rows.is_empty() {
            return Ok(0);
        }
        let mut written = 0u64;
        for (i, chunk) in rows.chunks(self.batch_size).enumerate() {
            let sql = build_upsert_sql_literals(spec, chunk);
            let tx = self.client.transaction().await?;
            tx.batch_execute(&sql).await.map_err(|e| {
                MigrateError::transfer(
                    spec.name,
                    format!("batch {} failed: {}", i + 1, server_message(&e)),
                )
            })?;
            tx.commit().await?;
            written += chunk.len() as u64;
            debug!("{}: committed batch {} ({} rows)", spec.name, i + 1, chunk.len());
        }
        Ok(written)
    }

    async fn reconcile_sequences(&mut self, specs: &[TableSpec]) -> Result<()> {
        for spec in specs {
            let Some(column) = spec.identity else {
                continue;
            };
            self.client
                .simple_query(&setval_sql(spec.name, column))
                .await
                .map_err(|e| {
                    MigrateError::transfer(
                        spec.name,
                        format!("sequence reset failed: {}", server_message(&e)),
                    )
                })?;
            debug!("Reset sequence for {}.{}", spec.name, column);
        }
        info!("Identity sequences reconciled");
        Ok(())
    }

    async fn finish(&mut self) -> Result<()> {
        Ok(())
    }

    fn db_type(&self) -> &str {
        "postgres"
    }
}

/// Accepts any server certificate.
#[derive(Debug)]
struct NoVerifier;

impl rustls::client::danger::ServerCertVerifier for NoVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[rustls::pki_types::CertificateDer<'_>],
        _server_name: &rustls::pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> std::result::Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        rustls::crypto::ring::default_provider()
            .signature_verification_algorithms
            .supported_schemes()
    }
}
