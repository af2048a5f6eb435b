use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use mig::{create_migration, MigrationStatus, Migrator};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mig")]
#[command(about = "Database migration tool for Postgres, MySQL and SQLite")]
#[command(version)]
struct Cli {
    /// Database connection URL, e.g. postgres://user@host/db or sqlite://app.db
    #[arg(long, env = "DATABASE_URL", global = true)]
    database_url: Option<String>,

    /// Directory with migration scripts
    #[arg(long, short = 'd', env = "MIG_DIR", default_value = ".", global = true)]
    dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply all pending migrations
    Up,

    /// Apply the next pending migration only
    UpOne,

    /// Revert the current migration
    Down,

    /// Revert all applied migrations
    DownAll,

    /// Revert the current migration, then re-apply it
    Redo,

    /// Show applied/pending state for every migration
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the current database version
    Version,

    /// Create a blank migration script
    Create {
        /// Migration name, e.g. add_users
        name: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Create { name } => {
            let path = create_migration(&cli.dir, name)?;
            println!("Created {}", path.display());
        }
        Commands::Up => {
            let count = migrator(&cli).await?.up().await?;
            println!("Applied {count} migration(s)");
        }
        Commands::UpOne => report_one(migrator(&cli).await?.up_one().await)?,
        Commands::Down => report_one(migrator(&cli).await?.down().await)?,
        Commands::DownAll => {
            let count = migrator(&cli).await?.down_all().await?;
            println!("Reverted {count} migration(s)");
        }
        Commands::Redo => report_one(migrator(&cli).await?.redo().await)?,
        Commands::Status { json } => {
            let rows = migrator(&cli).await?.status().await?;
            if *json {
                println!("{}", serde_json::to_string_pretty(&rows)?);
            } else {
                print_status(&rows);
            }
        }
        Commands::Version => {
            let version = migrator(&cli).await?.version().await?;
            println!("{version}");
        }
    }

    Ok(())
}

async fn migrator(cli: &Cli) -> anyhow::Result<Migrator> {
    let url = cli
        .database_url
        .as_deref()
        .context("missing database URL (pass --database-url or set DATABASE_URL)")?;
    Ok(Migrator::connect(url, cli.dir.clone()).await?)
}

/// Single-migration operations treat "no migrations to execute" as a
/// message, not a failure.
fn report_one(result: mig::MigResult<String>) -> anyhow::Result<()> {
    match result {
        Ok(name) => println!("Success   {name}"),
        Err(err) if err.is_no_migration() => println!("{err}"),
        Err(err) => return Err(err.into()),
    }
    Ok(())
}

fn print_status(rows: &[MigrationStatus]) {
    println!("    Applied At                 Migration");
    println!("    ========================================");
    for row in rows {
        let applied = match row.applied_at {
            Some(at) => at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            None => "Pending".to_string(),
        };
        println!("    {applied:<24}   {}", row.script);
    }
}
