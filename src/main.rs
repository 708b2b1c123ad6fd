use anyhow::Result;
use clap::{Parser, Subcommand};
use kbgraph::db::{migrate, Db};
use kbgraph::Config;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "kbgraph")]
#[command(version, about = "Versioned knowledge base of hierarchical topics")]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the REST API
    Serve,
    /// Apply migrations and verify the database schema
    Verify,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Config is needed before the logger so log_level can seed the filter
    let config = Config::load()?;

    env_logger::Builder::from_env(
        env_logger::Env::default()
            .default_filter_or(config.kbgraph.log_level.as_str())
    ).init();

    log::info!("Starting kbgraph v{}", env!("CARGO_PKG_VERSION"));
    log::info!("Database path: {}", config.db_path().display());

    let db = open_database(&config).await?;

    match args.command.unwrap_or(Command::Verify) {
        Command::Serve => {
            kbgraph::http::serve(db, &config).await?;
        }
        Command::Verify => {
            db.with_connection(|conn| migrate::verify_schema(conn)).await?;
            log::info!("Database schema verification complete");
        }
    }

    Ok(())
}

/// Build the connection manager and bring the schema up to date
async fn open_database(config: &Config) -> Result<Db> {
    let db = Db::new(config.db_path())
        .with_busy_timeout(Duration::from_millis(config.database.busy_timeout_ms));

    let migrations_dir = config.migrations_dir().to_path_buf();
    db.with_connection(move |conn| {
        migrate::run_migrations(conn, &migrations_dir)
    }).await?;

    log::info!("Database initialized");
    Ok(db)
}
