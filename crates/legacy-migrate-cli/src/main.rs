//! legacy-migrate CLI - migrate a legacy bot database into the redesigned schema.

use clap::{Parser, Subcommand};
use legacy_migrate::registry::{self, ConflictPolicy, TableSpec};
use legacy_migrate::{Config, MigrateError, Orchestrator, Overrides};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "legacy-migrate")]
#[command(about = "Migrate a legacy SQLite bot database into the redesigned schema")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the migration
    Run {
        /// Legacy SQLite database file
        #[arg(long)]
        source: Option<PathBuf>,

        /// Destination: a SQLite file path, or a postgres:// URL
        #[arg(long)]
        target: Option<String>,

        /// PostgreSQL destination URL (default: $PGURL, then $DATABASE_URL)
        #[arg(long, conflicts_with = "target")]
        pg_url: Option<String>,

        /// Also migrate saved messages, raw updates and edit history
        #[arg(long)]
        include_saved_messages: bool,

        /// Overwrite an existing SQLite destination file
        #[arg(long)]
        force: bool,

        /// Rows per upsert batch [default: 500]
        #[arg(long)]
        batch_size: Option<usize>,

        /// Schema script to apply before loading (repeatable, applied in order)
        #[arg(long = "schema", value_name = "FILE")]
        schema: Vec<PathBuf>,

        /// Saved-message schema script (repeatable; with --include-saved-messages)
        #[arg(long = "saved-message-schema", value_name = "FILE")]
        saved_message_schema: Vec<PathBuf>,
    },

    /// List destination tables in load order
    Tables {
        /// Include the saved-message table group
        #[arg(long)]
        include_saved_messages: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), MigrateError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format)
        .map_err(|e| MigrateError::Config(e.to_string()))?;

    match cli.command {
        Commands::Tables {
            include_saved_messages,
        } => {
            let specs = registry::selected(include_saved_messages);
            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&specs)?);
            } else {
                for (i, spec) in specs.iter().enumerate() {
                    println!("{:>2}. {}", i + 1, describe(spec));
                }
            }
        }
        Commands::Run {
            source,
            target,
            pg_url,
            include_saved_messages,
            force,
            batch_size,
            schema,
            saved_message_schema,
        } => {
            let config = match &cli.config {
                Some(path) => {
                    let config = Config::load(path)?;
                    info!("Loaded configuration from {:?}", path);
                    config
                }
                None => Config::default(),
            };
            let config = config.apply_overrides(Overrides {
                source,
                target,
                pg_url,
                include_saved_messages,
                force,
                batch_size,
                schema,
                saved_message_schema,
            })?;

            let orchestrator = Orchestrator::from_config(&config).await?;
            let report = orchestrator.run().await?;

            if cli.output_json {
                println!("{}", report.to_json()?);
            } else {
                println!("{}", report);
            }
        }
    }

    Ok(())
}

/// One-line registry description for `tables`.
fn describe(spec: &TableSpec) -> String {
    let sources: Vec<&str> = spec.sources.iter().map(|s| s.table).collect();
    let mut line = format!("{} <- {}", spec.name, sources.join(" + "));
    if !spec.conflict_key.is_empty() {
        line.push_str(&format!(" key ({})", spec.conflict_key.join(", ")));
    }
    if let ConflictPolicy::Update(cols) = &spec.on_conflict {
        line.push_str(&format!(" update [{}]", cols.join(", ")));
    }
    if let Some(identity) = spec.identity {
        line.push_str(&format!(" identity {}", identity));
    }
    line
}

fn setup_logging(verbosity: &str, format: &str) -> Result<(), String> {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => "debug",
        "info" => "info",
        "warn" => "warn",
        "error" => "error",
        other => return Err(format!("invalid verbosity '{}'", other)),
    };
    // RUST_LOG, when set, wins over --verbosity.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    match format {
        "json" => subscriber.json().init(),
        "text" => subscriber.init(),
        other => return Err(format!("invalid log format '{}'", other)),
    }

    Ok(())
}
