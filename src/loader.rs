use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use glob::glob;
use indicatif::{ProgressBar, ProgressStyle};
use lazy_static::lazy_static;
use rayon::prelude::*;
use regex::Regex;
use serde::Deserialize;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::stats::PipelineStats;
use crate::titles::{normalize, NormalizedTitle};

lazy_static! {
    static ref TITLE_PATTERN: Regex = Regex::new(r"(?s)<title>(.*?)</title>").unwrap();
    static ref URL_PATTERN: Regex = Regex::new(r"(?s)<url>(.*?)</url>").unwrap();
    static ref ABSTRACT_PATTERN: Regex = Regex::new(r"(?s)<abstract>(.*?)</abstract>").unwrap();
    static ref ENTITY_PATTERN: Regex = Regex::new(r"&(#[xX][0-9a-fA-F]+|#[0-9]+|[a-zA-Z]+);").unwrap();
}

/// A movie row as it appears in the metadata CSV. Every column is kept as text.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawMovie {
    pub id: Option<String>,
    pub imdb_id: Option<String>,
    pub title: Option<String>,
    pub budget: Option<String>,
    pub revenue: Option<String>,
    pub release_date: Option<String>,
    pub vote_average: Option<String>,
    pub production_companies: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WikiAbstract {
    pub title: String,
    pub url: Option<String>,
    pub abstract_text: Option<String>,
    pub clean_title: String,
    pub clean_title_no_brackets: String,
    pub estimated_year: Option<i32>,
    pub estimated_type: Option<String>,
}

impl WikiAbstract {
    pub fn new(title: String, url: Option<String>, abstract_text: Option<String>) -> Self {
        let NormalizedTitle {
            clean_title,
            clean_title_no_brackets,
            estimated_year,
            estimated_type,
        } = normalize(&title);

        WikiAbstract {
            title,
            url,
            abstract_text,
            clean_title,
            clean_title_no_brackets,
            estimated_year,
            estimated_type,
        }
    }
}

// ====== UTILITY FUNCTIONS ======
/// Opens a file for buffered reading, decompressing it when the name ends in `.gz`.
pub fn open_input(path: &Path) -> Result<Box<dyn BufRead + Send>> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let gzipped = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("gz"))
        .unwrap_or(false);

    if gzipped {
        Ok(Box::new(BufReader::with_capacity(
            2 * 1024 * 1024,
            GzDecoder::new(file),
        )))
    } else {
        Ok(Box::new(BufReader::with_capacity(2 * 1024 * 1024, file)))
    }
}

pub fn find_abstract_files(pattern: &str) -> Result<Vec<PathBuf>> {
    info!("Searching for abstract files with pattern: {}", pattern);

    let mut files = Vec::new();
    for entry in glob(pattern).with_context(|| format!("invalid glob pattern {}", pattern))? {
        match entry {
            Ok(path) => {
                if path.is_file() {
                    files.push(path);
                }
            }
            Err(e) => warn!("Error reading glob entry: {}", e),
        }
    }

    files.sort();
    if files.is_empty() {
        anyhow::bail!("no abstract files match {}", pattern);
    }
    info!("Found {} abstract files", files.len());
    Ok(files)
}

/// Decodes the predefined XML entities and numeric character references.
pub fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    ENTITY_PATTERN
        .replace_all(text, |caps: &regex::Captures| {
            let name = &caps[1];
            let decoded = match name {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                _ if name.starts_with("#x") || name.starts_with("#X") => {
                    u32::from_str_radix(&name[2..], 16).ok().and_then(char::from_u32)
                }
                _ if name.starts_with('#') => name[1..].parse().ok().and_then(char::from_u32),
                _ => None,
            };
            decoded
                .map(|c| c.to_string())
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

fn extract_field(pattern: &Regex, doc: &str) -> Option<String> {
    pattern
        .captures(doc)
        .map(|cap| decode_entities(&cap[1]))
        .filter(|s| !s.is_empty())
}

/// Parses one `<doc>...</doc>` block. Documents without a title are dropped.
pub fn parse_doc(doc: &str) -> Option<WikiAbstract> {
    let title = extract_field(&TITLE_PATTERN, doc)?;
    Some(WikiAbstract::new(
        title,
        extract_field(&URL_PATTERN, doc),
        extract_field(&ABSTRACT_PATTERN, doc),
    ))
}

/// Streams `<doc>` blocks out of an abstract dump, one complete element per callback.
/// Returning `false` from the callback stops the scan.
pub fn scan_docs(
    mut reader: impl BufRead,
    mut callback: impl FnMut(&str) -> bool,
) -> std::io::Result<()> {
    let mut buffer = String::new();
    let mut line = Vec::with_capacity(4096);

    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line)? == 0 {
            break;
        }
        buffer.push_str(&String::from_utf8_lossy(&line));

        while let Some(start) = buffer.find("<doc>") {
            if let Some(end_offset) = buffer[start..].find("</doc>") {
                let end = start + end_offset + "</doc>".len();
                let keep_going = callback(&buffer[start..end]);
                buffer.drain(..end);
                if !keep_going {
                    return Ok(());
                }
            } else {
                buffer.drain(..start);
                break;
            }
        }

        // Lines between documents (feed header, links) are never needed again.
        if !buffer.contains("<doc>") {
            buffer.clear();
        }
    }

    Ok(())
}

// ====== MOVIES ======
pub fn load_movies(path: &Path, stats: &PipelineStats) -> Result<Vec<RawMovie>> {
    info!("Loading movies from {}", path.display());

    let reader = open_input(path)?;
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .quote(b'"')
        .double_quote(true)
        .flexible(true)
        .from_reader(reader);

    let headers = rdr
        .headers()
        .with_context(|| format!("reading header of {}", path.display()))?
        .clone();

    let mut movies = Vec::new();
    for (line, rec) in rdr.records().enumerate() {
        // Short rows keep their leading columns; the missing tail reads as null.
        let parsed = rec.and_then(|mut record| {
            while record.len() < headers.len() {
                record.push_field("");
            }
            record.deserialize::<RawMovie>(Some(&headers))
        });
        match parsed {
            Ok(movie) => movies.push(movie),
            Err(err) => {
                warn!("skip bad movie row {}: {}", line + 2, err);
                PipelineStats::add(&stats.movies_skipped, 1);
            }
        }
    }

    PipelineStats::add(&stats.movies_loaded, movies.len() as u64);
    info!("Loaded {} movie rows", movies.len());
    Ok(movies)
}

// ====== ABSTRACTS ======
fn load_abstract_file(
    path: &Path,
    keep: &(dyn Fn(&WikiAbstract) -> bool + Sync),
    stats: &PipelineStats,
) -> Result<Vec<WikiAbstract>> {
    let reader = open_input(path)?;
    let mut kept = Vec::new();
    let mut scanned = 0u64;
    let mut untitled = 0u64;

    scan_docs(reader, |doc| {
        scanned += 1;
        match parse_doc(doc) {
            Some(wiki) if keep(&wiki) => kept.push(wiki),
            Some(_) => {}
            None => untitled += 1,
        }
        true
    })
    .with_context(|| format!("reading {}", path.display()))?;

    PipelineStats::add(&stats.abstracts_scanned, scanned);
    PipelineStats::add(&stats.abstracts_untitled, untitled);
    PipelineStats::add(&stats.abstracts_kept, kept.len() as u64);
    PipelineStats::add(&stats.abstract_files, 1);
    Ok(kept)
}

/// Loads every abstract file matching `pattern`, retaining only the documents `keep`
/// accepts. Files are read in parallel; the result follows sorted file order.
pub fn load_abstracts(
    pattern: &str,
    keep: &(dyn Fn(&WikiAbstract) -> bool + Sync),
    stats: &PipelineStats,
) -> Result<Vec<WikiAbstract>> {
    info!("Processing Wikipedia abstracts");

    let files = find_abstract_files(pattern)?;

    let progress = ProgressBar::new(files.len() as u64);
    progress.set_style(ProgressStyle::with_template(
        "[{elapsed_precise}] {bar:50.cyan/blue} {pos:>7}/{len:7} abstract files | {msg}",
    )?);
    progress.set_message("Scanning abstracts...");

    let per_file = files
        .par_iter()
        .map(|path| -> Result<Vec<WikiAbstract>> {
            let kept = load_abstract_file(path, keep, stats)?;
            progress.inc(1);
            progress.set_message(format!(
                "{} docs scanned, {} kept",
                PipelineStats::get(&stats.abstracts_scanned),
                PipelineStats::get(&stats.abstracts_kept)
            ));
            Ok(kept)
        })
        .collect::<Result<Vec<_>>>()?;

    progress.finish_with_message("Abstract scan complete");

    let abstracts: Vec<WikiAbstract> = per_file.into_iter().flatten().collect();
    info!(
        "Kept {} of {} abstracts",
        abstracts.len(),
        PipelineStats::get(&stats.abstracts_scanned)
    );
    Ok(abstracts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::{Cursor, Write};

    const DUMP: &str = r#"<feed>
<doc>
<title>Wikipedia: Heat (1995 film)</title>
<url>https://en.wikipedia.org/wiki/Heat_(1995_film)</url>
<abstract>Heat is a 1995 American crime film.</abstract>
<links>
<sublink linktype="nav"><anchor>Plot</anchor><link>https://en.wikipedia.org/wiki/Heat_(1995_film)#Plot</link></sublink>
</links>
</doc>
<doc>
<title>Wikipedia: Tom &amp; Jerry</title>
<url>https://en.wikipedia.org/wiki/Tom_and_Jerry</url>
<abstract />
<links></links>
</doc>
<doc>
<url>https://en.wikipedia.org/wiki/Untitled</url>
</doc>
</feed>
"#;

    fn collect_docs(input: &str) -> Vec<String> {
        let mut docs = Vec::new();
        scan_docs(Cursor::new(input), |doc| {
            docs.push(doc.to_string());
            true
        })
        .unwrap();
        docs
    }

    #[test]
    fn scan_docs_yields_each_element() {
        let docs = collect_docs(DUMP);
        assert_eq!(docs.len(), 3);
        assert!(docs[0].starts_with("<doc>"));
        assert!(docs[0].ends_with("</doc>"));
        assert!(docs[1].contains("Tom &amp; Jerry"));
    }

    #[test]
    fn scan_docs_stops_when_asked() {
        let mut seen = 0;
        scan_docs(Cursor::new(DUMP), |_| {
            seen += 1;
            false
        })
        .unwrap();
        assert_eq!(seen, 1);
    }

    #[test]
    fn parse_doc_extracts_fields() {
        let docs = collect_docs(DUMP);

        let heat = parse_doc(&docs[0]).unwrap();
        assert_eq!(heat.title, "Wikipedia: Heat (1995 film)");
        assert_eq!(heat.clean_title_no_brackets, "Heat");
        assert_eq!(heat.estimated_year, Some(1995));
        assert_eq!(
            heat.url.as_deref(),
            Some("https://en.wikipedia.org/wiki/Heat_(1995_film)")
        );
        assert_eq!(
            heat.abstract_text.as_deref(),
            Some("Heat is a 1995 American crime film.")
        );

        let tom = parse_doc(&docs[1]).unwrap();
        assert_eq!(tom.clean_title_no_brackets, "Tom & Jerry");
        assert_eq!(tom.abstract_text, None);

        assert!(parse_doc(&docs[2]).is_none());
    }

    #[test]
    fn decode_entities_handles_named_and_numeric() {
        assert_eq!(decode_entities("a &lt;b&gt; &quot;c&quot;"), "a <b> \"c\"");
        assert_eq!(decode_entities("caf&#233; &#x2014; ok"), "café \u{2014} ok");
        assert_eq!(decode_entities("&nbsp;stays"), "&nbsp;stays");
        assert_eq!(decode_entities("plain"), "plain");
    }

    #[test]
    fn load_movies_tolerates_short_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("movies.csv");
        std::fs::write(
            &path,
            "adult,budget,id,imdb_id,original_title,production_companies,release_date,revenue,title,vote_average\n\
             False,30000000,862,tt0114709,Toy Story,\"[{'name': 'Pixar Animation Studios', 'id': 3}]\",1995-10-30,373554033,Toy Story,7.7\n\
             False,0,8844,tt0113497,Jumanji,\"[{'name': \"\"TriStar\"\", 'id': 559}]\",1995-12-15,262797249,Jumanji,6.9\n\
             False,,31357\n",
        )
        .unwrap();

        let stats = PipelineStats::new();
        let movies = load_movies(&path, &stats).unwrap();
        assert_eq!(movies.len(), 3);
        assert_eq!(movies[0].title.as_deref(), Some("Toy Story"));
        assert_eq!(
            movies[0].production_companies.as_deref(),
            Some("[{'name': 'Pixar Animation Studios', 'id': 3}]")
        );
        assert_eq!(
            movies[1].production_companies.as_deref(),
            Some("[{'name': \"TriStar\", 'id': 559}]")
        );
        assert_eq!(movies[2].id.as_deref(), Some("31357"));
        assert_eq!(movies[2].title, None);
        assert_eq!(PipelineStats::get(&stats.movies_loaded), 3);
    }

    #[test]
    fn short_row_before_unknown_columns_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("movies.csv");
        std::fs::write(
            &path,
            "adult,budget,id,title,revenue,genres,overview\n\
             False,,31357\n\
             False,4000,42,Casino,8000,[],A film.\n",
        )
        .unwrap();

        let stats = PipelineStats::new();
        let movies = load_movies(&path, &stats).unwrap();
        assert_eq!(movies.len(), 2);
        assert_eq!(movies[0].id.as_deref(), Some("31357"));
        assert_eq!(movies[0].budget, None);
        assert_eq!(movies[0].revenue, None);
        assert_eq!(movies[1].title.as_deref(), Some("Casino"));
        assert_eq!(PipelineStats::get(&stats.movies_skipped), 0);
    }

    #[test]
    fn load_abstracts_reads_gzip_and_filters() {
        let dir = tempfile::tempdir().unwrap();
        let plain = dir.path().join("abstract1.xml");
        std::fs::write(&plain, DUMP).unwrap();

        let gz = dir.path().join("abstract2.xml.gz");
        let mut encoder = GzEncoder::new(File::create(&gz).unwrap(), Compression::default());
        encoder
            .write_all(
                b"<feed>\n<doc>\n<title>Wikipedia: Jumanji</title>\n<url>https://en.wikipedia.org/wiki/Jumanji</url>\n<abstract>Jumanji is a 1995 film.</abstract>\n</doc>\n</feed>\n",
            )
            .unwrap();
        encoder.finish().unwrap();

        let stats = PipelineStats::new();
        let pattern = format!("{}/abstract*.xml*", dir.path().display());
        let keep = |wiki: &WikiAbstract| wiki.clean_title_no_brackets != "Tom & Jerry";
        let abstracts = load_abstracts(&pattern, &keep, &stats).unwrap();

        let titles: Vec<&str> = abstracts
            .iter()
            .map(|w| w.clean_title_no_brackets.as_str())
            .collect();
        assert_eq!(titles, vec!["Heat", "Jumanji"]);
        assert_eq!(PipelineStats::get(&stats.abstracts_scanned), 4);
        assert_eq!(PipelineStats::get(&stats.abstracts_untitled), 1);
        assert_eq!(PipelineStats::get(&stats.abstract_files), 2);
    }

    #[test]
    fn missing_abstract_files_abort() {
        let dir = tempfile::tempdir().unwrap();
        let pattern = format!("{}/nothing*.xml", dir.path().display());
        let stats = PipelineStats::new();
        assert!(load_abstracts(&pattern, &|_: &WikiAbstract| true, &stats).is_err());
    }
}
