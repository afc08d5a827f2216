use std::cmp::Ordering;
use tracing::info;

use crate::matcher::MatchedRecord;
use crate::stats::PipelineStats;

pub const DEFAULT_LIMIT: usize = 1000;
pub const DEFAULT_MIN_AMOUNT: f64 = 1000.0;

/// One row of the destination table.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputRow {
    pub title: Option<String>,
    pub budget: Option<f64>,
    pub year: Option<i32>,
    pub revenue: Option<f64>,
    pub rating: Option<f64>,
    pub ratio: Option<f64>,
    pub production_company: Option<String>,
    pub wikipedia_link: Option<String>,
    pub wikipedia_abstract: Option<String>,
}

impl From<MatchedRecord> for OutputRow {
    fn from(record: MatchedRecord) -> Self {
        let movie = record.movie;
        let (wikipedia_link, wikipedia_abstract) = match record.wiki {
            Some(wiki) => (wiki.url.clone(), wiki.abstract_text.clone()),
            None => (None, None),
        };

        OutputRow {
            title: movie.title,
            budget: movie.budget,
            year: movie.release_year,
            revenue: movie.revenue,
            rating: movie.vote_average,
            ratio: movie.ratio,
            production_company: movie.production_companies,
            wikipedia_link,
            wikipedia_abstract,
        }
    }
}

// Descending by ratio, nulls last.
fn by_ratio_desc(a: &MatchedRecord, b: &MatchedRecord) -> Ordering {
    match (a.movie.ratio, b.movie.ratio) {
        (Some(x), Some(y)) => y.total_cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Takes the `limit` highest ratios, then drops rows whose budget or revenue is below `min_amount`.
pub fn rank(
    mut records: Vec<MatchedRecord>,
    limit: usize,
    min_amount: f64,
    stats: &PipelineStats,
) -> Vec<OutputRow> {
    records.sort_by(by_ratio_desc);
    records.truncate(limit);

    records.retain(|r| {
        r.movie.revenue.map_or(false, |v| v >= min_amount)
            && r.movie.budget.map_or(false, |v| v >= min_amount)
    });

    if let Some(top) = records.first() {
        info!(
            "Top ratio {} ({:?}) for {:?}",
            top.movie.string_ratio.as_deref().unwrap_or("-"),
            top.movie.ratio,
            top.movie.title.as_deref().unwrap_or("<untitled>")
        );
    }

    let rows: Vec<OutputRow> = records.into_iter().map(OutputRow::from).collect();
    PipelineStats::add(&stats.rows_ranked, rows.len() as u64);
    info!("{} rows ranked (limit {}, min amount {})", rows.len(), limit, min_amount);
    rows
}
