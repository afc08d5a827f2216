//! Numeric and date cleaning for raw movie rows.
//!
//! Nothing here fails: a value that does not look numeric becomes `None`.

use lazy_static::lazy_static;
use regex::Regex;

use crate::loader::RawMovie;
use crate::ratio::{float_ratio, string_ratio};

lazy_static! {
    static ref HAS_DIGIT: Regex = Regex::new(r"[0-9]+").unwrap();
    static ref RELEASE_YEAR: Regex = Regex::new(r"([0-9]{4})\-").unwrap();
}

#[derive(Debug, Clone, PartialEq)]
pub struct MovieRecord {
    pub id: String,
    pub imdb_id: Option<String>,
    pub title: Option<String>,
    pub budget: Option<f64>,
    pub revenue: Option<f64>,
    pub release_year: Option<i32>,
    pub vote_average: Option<f64>,
    pub production_companies: Option<String>,
    pub ratio: Option<f64>,
    pub string_ratio: Option<String>,
}

/// Keeps an amount only when it contains a digit and casts cleanly to a float.
pub fn clean_amount(raw: Option<&str>) -> Option<f64> {
    let raw = raw?;
    if !HAS_DIGIT.is_match(raw) {
        return None;
    }
    raw.trim().parse::<f64>().ok()
}

/// Leading `YYYY-` of a release date.
pub fn release_year(raw: Option<&str>) -> Option<i32> {
    let caps = RELEASE_YEAR.captures(raw?)?;
    caps[1].trim().parse().ok()
}

pub fn clean_movie(raw: RawMovie) -> MovieRecord {
    let budget = clean_amount(raw.budget.as_deref());
    let revenue = clean_amount(raw.revenue.as_deref());
    let release_year = release_year(raw.release_date.as_deref());
    let vote_average = raw
        .vote_average
        .as_deref()
        .and_then(|v| v.trim().parse::<f64>().ok());

    MovieRecord {
        id: raw.id.unwrap_or_default(),
        imdb_id: raw.imdb_id,
        title: raw.title,
        budget,
        revenue,
        release_year,
        vote_average,
        production_companies: raw.production_companies,
        ratio: float_ratio(budget, revenue),
        string_ratio: string_ratio(budget, revenue),
    }
}
