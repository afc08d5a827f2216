use anyhow::Result;
use rayon::prelude::*;
use std::path::Path;
use tracing::info;

use crate::cleaner::{clean_movie, MovieRecord};
use crate::loader::{load_abstracts, load_movies, WikiAbstract};
use crate::matcher::{dedup_by_id, join_movies, title_index};
use crate::ranker::{rank, OutputRow};
use crate::stats::{get_memory_usage, PipelineStats};

#[derive(Debug, Clone)]
pub struct TransformOptions {
    pub limit: usize,
    pub min_amount: f64,
}

/// Loads both inputs and produces the ranked output rows. Runs on the current rayon pool.
pub fn transform(
    movies_path: &Path,
    abstracts_pattern: &str,
    options: &TransformOptions,
    stats: &PipelineStats,
) -> Result<Vec<OutputRow>> {
    let movies: Vec<MovieRecord> = load_movies(movies_path, stats)?
        .into_par_iter()
        .map(clean_movie)
        .collect();
    info!(
        "Cleaned {} movies ({} with a ratio)",
        movies.len(),
        movies.iter().filter(|m| m.ratio.is_some()).count()
    );

    let titles = title_index(&movies);
    let keep = |wiki: &WikiAbstract| titles.contains(&wiki.clean_title_no_brackets);
    let abstracts = load_abstracts(abstracts_pattern, &keep, stats)?;
    info!("Memory after abstract scan: {}", get_memory_usage());

    let joined = join_movies(movies, abstracts, stats);
    let deduped = dedup_by_id(joined, stats);
    Ok(rank(deduped, options.limit, options.min_amount, stats))
}
