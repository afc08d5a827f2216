use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, warn};

mod cleaner;
mod export;
mod loader;
mod matcher;
mod pipeline;
mod ranker;
mod ratio;
mod sink;
mod stats;
mod titles;

use pipeline::TransformOptions;
use sink::Db;
use stats::PipelineStats;

#[derive(Parser)]
#[command(name = "movie_wiki_etl")]
#[command(about = "Ranks movies by budget/revenue ratio and links them to Wikipedia abstracts")]
struct Cli {
    /// Movie metadata CSV (plain or .gz)
    #[arg(short, long, default_value = "movies_metadata.csv")]
    movies: PathBuf,

    /// Glob pattern for Wikipedia abstract dumps (.xml or .xml.gz)
    #[arg(short, long, default_value = "enwiki-latest-abstract*.xml*")]
    abstracts: String,

    /// Postgres connection string
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    database_url: Option<String>,

    /// Destination table, replaced on every run
    #[arg(short, long, default_value = sink::DEFAULT_TABLE)]
    table: String,

    /// Number of highest-ratio rows taken before the amount filter
    #[arg(short, long, default_value_t = ranker::DEFAULT_LIMIT)]
    limit: usize,

    /// Minimum budget and revenue kept in the output
    #[arg(long, default_value_t = ranker::DEFAULT_MIN_AMOUNT)]
    min_amount: f64,

    /// Also write the output table as Parquet
    #[arg(short, long)]
    parquet_out: Option<PathBuf>,

    /// Number of parallel workers (default: all cores)
    #[arg(short, long)]
    workers: Option<usize>,

    /// Rows per INSERT statement
    #[arg(short, long, default_value = "1000")]
    batch_size: usize,
}

async fn run(args: &Cli, db: Option<&Db>, stats: &PipelineStats) -> Result<()> {
    let num_workers = args.workers.unwrap_or_else(num_cpus::get);
    info!("Using {} workers (max available: {})", num_workers, num_cpus::get());

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(num_workers)
        .thread_name(|i| format!("etl-worker-{}", i))
        .build()?;

    let options = TransformOptions {
        limit: args.limit,
        min_amount: args.min_amount,
    };
    let rows = pool.install(|| pipeline::transform(&args.movies, &args.abstracts, &options, stats))?;

    // The Parquet copy only replaces its target once the table commit has succeeded.
    let staged = match &args.parquet_out {
        Some(path) => Some(export::stage_parquet(path, &rows)?),
        None => None,
    };

    if let Some(db) = db {
        let written = db.replace_table(&args.table, &rows, args.batch_size).await?;
        PipelineStats::add(&stats.rows_written, written);
    } else {
        PipelineStats::add(&stats.rows_written, rows.len() as u64);
    }

    if let Some(staged) = staged {
        staged.persist()?;
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    let args = Cli::parse();

    if args.database_url.is_none() && args.parquet_out.is_none() {
        anyhow::bail!("no output configured: pass --database-url (or DATABASE_URL) and/or --parquet-out");
    }
    sink::validate_table_name(&args.table)?;
    if !args.movies.is_file() {
        anyhow::bail!("movies file {} not found", args.movies.display());
    }

    info!("Movies: {}", args.movies.display());
    info!("Abstracts: {}", args.abstracts);
    match &args.parquet_out {
        Some(path) => info!("Parquet output: {}", path.display()),
        None => info!("Parquet output disabled"),
    }

    let db = match &args.database_url {
        Some(url) => Some(Db::connect(url).await?),
        None => {
            warn!("No database configured; table {} will not be written", args.table);
            None
        }
    };

    let stats = PipelineStats::new();
    let result = run(&args, db.as_ref(), &stats).await;

    if let Some(db) = db {
        db.close().await;
    }
    result?;

    stats.log_summary();
    info!("Pipeline finished");

    Ok(())
}
