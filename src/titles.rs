//! Wikipedia title normalisation.
//!
//! Abstract dump titles look like `Wikipedia: Inception (2010 film)`. The namespace
//! prefix is dropped and the trailing parenthetical, when present, yields an
//! estimated release year and an article category.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref AFTER_NAMESPACE: Regex = Regex::new(r"([^:]+):(.*)").unwrap();
    static ref BEFORE_BRACKET: Regex = Regex::new(r"([^:]+):([^(]+)(.*)").unwrap();
    static ref HAS_YEAR_QUALIFIER: Regex = Regex::new(r".*\([0-9]{4}[^\)]*\)$").unwrap();
    static ref YEAR_QUALIFIER: Regex = Regex::new(r".*\(([0-9]{4})[^\)]*\)$").unwrap();
    static ref HAS_QUALIFIER: Regex = Regex::new(r".*\(([0-9]{4})?[^\)]*\)$").unwrap();
    static ref TYPE_QUALIFIER: Regex = Regex::new(r".*\(([0-9]{4}(?-u:\s)+|)([^\)]*)\)$").unwrap();
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NormalizedTitle {
    pub clean_title: String,
    pub clean_title_no_brackets: String,
    pub estimated_year: Option<i32>,
    pub estimated_type: Option<String>,
}

pub fn clean_title(raw: &str) -> String {
    AFTER_NAMESPACE
        .captures(raw)
        .map(|caps| caps[2].to_string())
        .unwrap_or_default()
}

pub fn clean_title_no_brackets(raw: &str) -> String {
    BEFORE_BRACKET
        .captures(raw)
        .map(|caps| caps[2].trim().to_string())
        .unwrap_or_default()
}

pub fn estimated_year(clean_title: &str) -> Option<i32> {
    if !HAS_YEAR_QUALIFIER.is_match(clean_title) {
        return None;
    }
    let caps = YEAR_QUALIFIER.captures(clean_title)?;
    caps[1].trim().parse().ok()
}

pub fn estimated_type(clean_title: &str) -> Option<String> {
    if !HAS_QUALIFIER.is_match(clean_title) {
        return None;
    }
    let caps = TYPE_QUALIFIER.captures(clean_title)?;
    let kind = caps[2].trim();
    if kind.is_empty() {
        None
    } else {
        Some(kind.to_string())
    }
}

pub fn normalize(raw: &str) -> NormalizedTitle {
    let clean_title = clean_title(raw);
    let estimated_year = estimated_year(&clean_title);
    let estimated_type = estimated_type(&clean_title);

    NormalizedTitle {
        clean_title_no_brackets: clean_title_no_brackets(raw),
        clean_title,
        estimated_year,
        estimated_type,
    }
}
