mod config;
mod finalize_cmd;
mod grocery_cmd;
mod run_cmd;
#[cfg(test)]
mod test_util;

use std::sync::Arc;

use clap::{CommandFactory, Parser, Subcommand};
use sqlx::PgPool;

use potluck_core::publish::PgNotifyPublisher;
use potluck_core::worker::{FinalizationWorker, WorkerConfig};
use potluck_db::config::DbConfig;
use potluck_db::pool;

use config::PotluckConfig;

#[derive(Parser)]
#[command(name = "potluck", about = "Meal plan finalization and grocery list worker")]
struct Cli {
    /// Database URL (overrides POTLUCK_DATABASE_URL env var)
    #[arg(long, global = true)]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a potluck config file (no database required)
    Init {
        /// PostgreSQL connection URL
        #[arg(long, default_value = DbConfig::DEFAULT_URL)]
        db_url: String,
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
    /// Create the potluck database and apply migrations
    DbInit,
    /// Try to finalize one meal plan now
    Finalize {
        /// Meal plan ID
        plan_id: String,
    },
    /// Finalize every meal plan whose voting deadline has passed
    Sweep,
    /// Show a finalized meal plan's grocery list
    GroceryList {
        /// Meal plan ID
        plan_id: String,
        /// Recompute the list from the chosen options before showing it
        #[arg(long)]
        regenerate: bool,
    },
    /// Run the finalization worker until interrupted
    Run,
    /// Print shell completions to stdout
    Completions {
        /// Target shell
        shell: clap_complete::Shell,
    },
}

/// Execute the `potluck init` command: write config file.
fn cmd_init(db_url: &str, force: bool) -> anyhow::Result<()> {
    let path = config::config_path();

    if path.exists() && !force {
        anyhow::bail!(
            "config file already exists at {}\nUse --force to overwrite.",
            path.display()
        );
    }

    let cfg = config::ConfigFile {
        database: config::DatabaseSection {
            url: db_url.to_string(),
        },
        worker: config::WorkerSection::default(),
    };

    config::save_config(&cfg)?;

    println!("Config written to {}", path.display());
    println!("  database.url = {db_url}");
    println!(
        "  worker.sweep_interval_secs = {}",
        cfg.worker.sweep_interval_secs
    );
    println!();
    println!("Next: run `potluck db-init` to create and migrate the database.");

    Ok(())
}

/// Execute the `potluck db-init` command: create database and run migrations.
async fn cmd_db_init(db_config: &DbConfig) -> anyhow::Result<()> {
    println!("Initializing potluck database...");

    pool::ensure_database_exists(db_config).await?;
    let db_pool = pool::create_pool(db_config).await?;
    pool::run_migrations(&db_pool).await?;

    let counts = pool::table_counts(&db_pool).await?;
    println!("Database ready. Tables:");
    for (table, count) in &counts {
        println!("  {table}: {count} rows");
    }

    db_pool.close().await;

    println!("potluck db-init complete.");
    Ok(())
}

/// Build a worker that publishes change messages with `pg_notify`.
fn pg_worker(db_pool: &PgPool, config: &WorkerConfig) -> FinalizationWorker {
    let publisher = PgNotifyPublisher::new(db_pool.clone(), config.change_channel.clone());
    FinalizationWorker::new(db_pool.clone(), Arc::new(publisher), config.clone())
}

/// Connections `potluck run` may hold at once: a sweep and the vote
/// handlers can each have `max_concurrent_plans` attempts in flight, plus
/// the `LISTEN` connection and one spare.
fn worker_pool_size(config: &WorkerConfig) -> u32 {
    u32::try_from(config.max_concurrent_plans)
        .unwrap_or(u32::MAX)
        .saturating_mul(2)
        .saturating_add(2)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init { db_url, force } => {
            cmd_init(&db_url, force)?;
        }
        Commands::Completions { shell } => {
            clap_complete::generate(
                shell,
                &mut Cli::command(),
                "potluck",
                &mut std::io::stdout(),
            );
        }
        Commands::DbInit => {
            let resolved = PotluckConfig::resolve(cli.database_url.as_deref())?;
            cmd_db_init(&resolved.db_config).await?;
        }
        Commands::Finalize { plan_id } => {
            let resolved = PotluckConfig::resolve(cli.database_url.as_deref())?;
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let worker = pg_worker(&db_pool, &resolved.worker_config);
            let result = finalize_cmd::run_finalize(&worker, &plan_id).await;
            db_pool.close().await;
            result?;
        }
        Commands::Sweep => {
            let resolved = PotluckConfig::resolve(cli.database_url.as_deref())?;
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let worker = pg_worker(&db_pool, &resolved.worker_config);
            let result = finalize_cmd::run_sweep(&worker).await;
            db_pool.close().await;
            result?;
        }
        Commands::GroceryList {
            plan_id,
            regenerate,
        } => {
            let resolved = PotluckConfig::resolve(cli.database_url.as_deref())?;
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let worker = pg_worker(&db_pool, &resolved.worker_config);
            let result = grocery_cmd::run_grocery_list(&worker, &plan_id, regenerate).await;
            db_pool.close().await;
            result?;
        }
        Commands::Run => {
            let resolved = PotluckConfig::resolve(cli.database_url.as_deref())?;
            let db_config = resolved
                .db_config
                .with_max_connections(worker_pool_size(&resolved.worker_config));
            let db_pool = pool::create_pool(&db_config).await?;
            let worker = pg_worker(&db_pool, &resolved.worker_config);
            let result = run_cmd::run(worker).await;
            db_pool.close().await;
            result?;
        }
    }

    Ok(())
}
