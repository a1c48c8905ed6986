//! hnpipe Ingest - Hacker News ingestion tool

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use hnpipe_common::logging::{init_logging, LogConfig, LogLevel};
use hnpipe_ingest::cursor::CursorStore;
use hnpipe_ingest::store::{self, ItemStore, MemoryItemStore, PgItemStore};
use hnpipe_ingest::upstream::ItemSource;
use hnpipe_ingest::{classify, HackerNewsClient, IngestConfig, IngestionLoop, ItemId, RunSummary};
use std::sync::Arc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "hnpipe-ingest")]
#[command(author, version, about = "Incremental Hacker News ingestion")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Debug logging and per-cycle timing
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ingest new items until caught up with upstream
    Run {
        /// Ids fetched per cycle
        #[arg(long)]
        batch_size: Option<usize>,

        /// Maximum in-flight item requests
        #[arg(long)]
        concurrency: Option<usize>,

        /// Cursor to assume when nothing has been ingested yet
        #[arg(long)]
        start_id: Option<ItemId>,

        /// Stop after this many committed cycles
        #[arg(long)]
        max_cycles: Option<usize>,

        /// Use an in-memory store instead of the database
        #[arg(long)]
        dry_run: bool,

        /// Do not apply schema migrations before running
        #[arg(long)]
        skip_migrations: bool,
    },

    /// Show cursor, upstream max and backlog
    Status,

    /// Fetch one item and print its classification as JSON
    Inspect {
        /// Item id
        id: ItemId,
    },

    /// Apply schema migrations
    Migrate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("hnpipe-ingest")
        .build()
        .merge_env()
        .context("Invalid logging configuration")?;

    init_logging(&log_config)?;

    let mut config = IngestConfig::from_env().context("Failed to load configuration")?;
    config.verbose |= cli.verbose;

    match cli.command {
        Command::Run {
            batch_size,
            concurrency,
            start_id,
            max_cycles,
            dry_run,
            skip_migrations,
        } => {
            if let Some(n) = batch_size {
                config.batch_size = n;
            }
            if let Some(n) = concurrency {
                config.concurrency = n;
            }
            if let Some(id) = start_id {
                config.start_id = id;
            }
            if max_cycles.is_some() {
                config.max_cycles = max_cycles;
            }
            config.validate()?;

            run(&config, dry_run, skip_migrations).await?;
        },
        Command::Status => status(&config).await?,
        Command::Inspect { id } => inspect(&config, id).await?,
        Command::Migrate => {
            let pool = store::connect(&config.database).await?;
            store::migrate(&pool).await?;
            println!("Migrations applied");
        },
    }

    Ok(())
}

async fn run(config: &IngestConfig, dry_run: bool, skip_migrations: bool) -> Result<()> {
    let source = Arc::new(HackerNewsClient::new(&config.upstream)?);

    let store: Arc<dyn ItemStore> = if dry_run {
        info!("Dry run: items are kept in memory only");
        Arc::new(MemoryItemStore::new())
    } else {
        let pool = store::connect(&config.database)
            .await
            .context("Failed to connect to database")?;
        if !skip_migrations {
            store::migrate(&pool).await?;
        }
        Arc::new(PgItemStore::new(pool, config.database.chunk_size))
    };

    info!(
        upstream = %config.upstream.base_url,
        batch_size = config.batch_size,
        concurrency = config.concurrency,
        "Starting ingestion"
    );
    let summary = IngestionLoop::new(source, store, config)
        .run()
        .await
        .context("Ingestion run failed")?;

    print_summary(&summary, dry_run);
    Ok(())
}

fn print_summary(summary: &RunSummary, dry_run: bool) {
    println!("cycles:          {}", summary.cycles);
    println!("items processed: {}", summary.items_processed);
    println!("cursor:          {}", summary.final_cursor);
    println!("upstream max:    {}", summary.upstream_max);
    println!("caught up:       {}", summary.caught_up);
    if dry_run {
        println!("dry run:         nothing written to the database");
    }
}

async fn status(config: &IngestConfig) -> Result<()> {
    let source = HackerNewsClient::new(&config.upstream)?;
    let pool = store::connect(&config.database)
        .await
        .context("Failed to connect to database")?;
    let store = Arc::new(PgItemStore::new(pool, config.database.chunk_size));

    let cursor = CursorStore::new(store, config.start_id)
        .last_processed_id()
        .await?;
    let upstream_max = source.max_available_id().await?;

    println!("cursor:       {cursor}");
    println!("upstream max: {upstream_max}");
    println!("backlog:      {}", (upstream_max - cursor).max(0));
    Ok(())
}

async fn inspect(config: &IngestConfig, id: ItemId) -> Result<()> {
    let source = HackerNewsClient::new(&config.upstream)?;
    let payload = source.fetch_item(id).await?;

    let item = classify(&payload);
    println!("{}", serde_json::to_string_pretty(&item)?);
    Ok(())
}
