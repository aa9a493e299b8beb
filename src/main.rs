use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{error, info};

mod config;

/// sentrygate: behavioral trust and anti-abuse pipeline for UGC platforms.
///
/// Scores user behavior, flags coordinated abuse patterns, runs scheduled
/// recalculation and challenge jobs, gates access behind trust thresholds,
/// and serves an ingress webhook plus an operator dashboard.
#[derive(Parser)]
#[command(name = "sentrygate", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database and configuration
    Init,

    /// Start the ingress webhook, dashboard API, and scheduled jobs
    Serve {
        /// Port to bind
        #[arg(long, default_value = "8080")]
        port: u16,

        /// Address to bind
        #[arg(long, default_value = "0.0.0.0")]
        bind: String,
    },

    /// Show system status (user counts, last job runs, open anomalies)
    Status,
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("sentrygate=info")),
        )
        .init();

    match run().await {
        Ok(()) => std::process::ExitCode::from(0),
        Err(err) => {
            error!(error = %err, "fatal error");
            eprintln!("Error: {err:#}");
            std::process::ExitCode::from(exit_code_for(&err))
        }
    }
}

/// Config-load and validation failures exit `1`; a database that can't
/// be opened at startup exits `2` (§6 "Exit codes").
fn exit_code_for(err: &anyhow::Error) -> u8 {
    let message = err.to_string().to_lowercase();
    if message.contains("database") || message.contains("not found at") {
        2
    } else {
        1
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Init => {
            info!("Initializing sentrygate database...");
            let config = config::Config::load()?;
            let db = init_database(&config).await?;
            let table_count = db.table_count().await?;
            println!("Database initialized at: {}", config.db_path);
            println!("Tables created: {table_count}");
            println!("\nsentrygate is ready. Next step: set up your .env file");
            println!("  (see .env.example for required variables)");
            println!("\nThen run: sentrygate serve");
        }

        Commands::Serve { port, bind } => {
            let config = config::Config::load()?;
            config.require_webhook_auth()?;
            let db = open_database(&config).await?;

            let backoff = sentrygate::retry::BackoffConfig {
                max_attempts: config.webhook_max_retries.max(1),
                base: std::time::Duration::from_secs(5),
                exponential: config.webhook_exponential_backoff,
            };

            let scheduler_db = db.clone();
            tokio::spawn(async move {
                sentrygate::sol::run_scheduler(scheduler_db, backoff).await;
            });

            sentrygate::web::run_server(config, db, port, &bind).await?;
        }

        Commands::Status => {
            let config = config::Config::load()?;
            sentrygate::status::show(&config)?;
        }
    }

    Ok(())
}

/// Select the database backend based on configuration. When
/// `DATABASE_URL` points at PostgreSQL, uses the Postgres backend
/// (requires the `postgres` feature). Otherwise falls back to SQLite.
async fn open_database(config: &config::Config) -> Result<Arc<dyn sentrygate::db::Database>> {
    if is_postgres_url(&config.database_url) {
        #[cfg(feature = "postgres")]
        {
            info!("Using PostgreSQL backend");
            let db = sentrygate::db::postgres::PgDatabase::connect(&config.database_url).await?;
            return Ok(Arc::new(db));
        }
        #[cfg(not(feature = "postgres"))]
        anyhow::bail!(
            "DATABASE_URL points to PostgreSQL but the 'postgres' feature is not compiled in.\n\
             Rebuild with: cargo build --features postgres"
        );
    }

    let conn = sentrygate::db::open(&config.db_path)?;
    Ok(Arc::new(sentrygate::db::sqlite::SqliteDatabase::new(conn)))
}

/// Initialize the database (create if needed).
async fn init_database(config: &config::Config) -> Result<Arc<dyn sentrygate::db::Database>> {
    if is_postgres_url(&config.database_url) {
        #[cfg(feature = "postgres")]
        {
            info!("Using PostgreSQL backend");
            let db = sentrygate::db::postgres::PgDatabase::connect(&config.database_url).await?;
            return Ok(Arc::new(db));
        }
        #[cfg(not(feature = "postgres"))]
        anyhow::bail!(
            "DATABASE_URL points to PostgreSQL but the 'postgres' feature is not compiled in.\n\
             Rebuild with: cargo build --features postgres"
        );
    }

    let conn = sentrygate::db::initialize(&config.db_path)?;
    Ok(Arc::new(sentrygate::db::sqlite::SqliteDatabase::new(conn)))
}

fn is_postgres_url(url: &str) -> bool {
    url.starts_with("postgres://") || url.starts_with("postgresql://")
}
