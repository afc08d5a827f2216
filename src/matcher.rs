//! Joins movies to Wikipedia abstracts on title and resolves duplicates by match priority.

use indexmap::IndexMap;
use rayon::prelude::*;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info};

use crate::cleaner::MovieRecord;
use crate::loader::WikiAbstract;
use crate::stats::PipelineStats;

/// A movie row with its best Wikipedia match, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchedRecord {
    pub movie: MovieRecord,
    pub wiki: Option<Arc<WikiAbstract>>,
    pub match_priority: u8,
}

impl MatchedRecord {
    fn clean_title_no_brackets(&self) -> Option<&str> {
        self.wiki.as_ref().map(|w| w.clean_title_no_brackets.as_str())
    }

    /// Ordering used when two rows share a movie id: priority first, then title
    /// descending with unmatched rows last.
    fn outranks(&self, other: &MatchedRecord) -> bool {
        (self.match_priority, self.clean_title_no_brackets())
            > (other.match_priority, other.clean_title_no_brackets())
    }
}

/// 2 = year and "film" category agree with the movie, 1 = "film" without a year, 0 = anything else.
pub fn match_priority(release_year: Option<i32>, wiki: Option<&WikiAbstract>) -> u8 {
    let Some(wiki) = wiki else {
        return 0;
    };
    if wiki.estimated_type.as_deref() != Some("film") {
        return 0;
    }
    match (wiki.estimated_year, release_year) {
        (Some(estimated), Some(released)) if estimated == released => 2,
        (None, _) => 1,
        _ => 0,
    }
}

/// Set of movie titles, used to drop abstracts that can never join while the dump is streamed.
pub fn title_index(movies: &[MovieRecord]) -> HashSet<String> {
    movies.iter().filter_map(|m| m.title.clone()).collect()
}

/// Right outer join of abstracts onto movies. Every movie row survives; each picks its
/// highest-priority candidate (first seen on ties).
pub fn join_movies(
    movies: Vec<MovieRecord>,
    abstracts: Vec<WikiAbstract>,
    stats: &PipelineStats,
) -> Vec<MatchedRecord> {
    let mut by_title: HashMap<String, Vec<Arc<WikiAbstract>>> = HashMap::new();
    for wiki in abstracts {
        by_title
            .entry(wiki.clean_title_no_brackets.clone())
            .or_default()
            .push(Arc::new(wiki));
    }

    let joined: Vec<MatchedRecord> = movies
        .into_par_iter()
        .map(|movie| {
            let candidates = movie
                .title
                .as_deref()
                .and_then(|title| by_title.get(title))
                .map(|c| c.as_slice())
                .unwrap_or(&[]);

            let mut best: Option<(u8, &Arc<WikiAbstract>)> = None;
            for wiki in candidates {
                let priority = match_priority(movie.release_year, Some(wiki));
                if best.map_or(true, |(p, _)| priority > p) {
                    best = Some((priority, wiki));
                }
            }

            if let Some((priority, wiki)) = best {
                debug!(
                    "movie {} matched {:?} (clean title {:?}, priority {})",
                    movie.id, wiki.title, wiki.clean_title, priority
                );
            }

            MatchedRecord {
                match_priority: best.map_or(0, |(p, _)| p),
                wiki: best.map(|(_, w)| Arc::clone(w)),
                movie,
            }
        })
        .collect();

    let matched = joined.iter().filter(|r| r.wiki.is_some()).count();
    PipelineStats::add(&stats.movies_matched, matched as u64);
    info!("Matched {} of {} movies to Wikipedia", matched, joined.len());
    joined
}

/// Groups rows by movie id and keeps the best row per id, in first-appearance order.
pub fn dedup_by_id(records: Vec<MatchedRecord>, stats: &PipelineStats) -> Vec<MatchedRecord> {
    let mut by_id: IndexMap<String, MatchedRecord> = IndexMap::with_capacity(records.len());
    for record in records {
        match by_id.get_mut(&record.movie.id) {
            Some(kept) => {
                debug!(
                    "duplicate movie id {} (imdb {:?})",
                    record.movie.id,
                    record.movie.imdb_id.as_deref()
                );
                if record.outranks(kept) {
                    *kept = record;
                }
            }
            None => {
                by_id.insert(record.movie.id.clone(), record);
            }
        }
    }

    let deduped: Vec<MatchedRecord> = by_id.into_values().collect();
    PipelineStats::add(&stats.rows_deduplicated, deduped.len() as u64);
    info!("{} rows after deduplicating by movie id", deduped.len());
    deduped
}
