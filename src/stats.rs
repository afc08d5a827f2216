use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

// ====== PIPELINE STATISTICS ======
#[derive(Debug, Default)]
pub struct PipelineStats {
    pub movies_loaded: AtomicU64,
    pub movies_skipped: AtomicU64,
    pub abstract_files: AtomicU64,
    pub abstracts_scanned: AtomicU64,
    pub abstracts_untitled: AtomicU64,
    pub abstracts_kept: AtomicU64,
    pub movies_matched: AtomicU64,
    pub rows_deduplicated: AtomicU64,
    pub rows_ranked: AtomicU64,
    pub rows_written: AtomicU64,
}

impl PipelineStats {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }

    pub fn log_summary(&self) {
        info!("Final Processing Statistics:");
        info!("  Movies loaded: {}", Self::get(&self.movies_loaded));
        info!("  Movie rows skipped: {}", Self::get(&self.movies_skipped));
        info!("  Abstract files read: {}", Self::get(&self.abstract_files));
        info!("  Abstracts scanned: {}", Self::get(&self.abstracts_scanned));
        info!("  Abstracts without title: {}", Self::get(&self.abstracts_untitled));
        info!("  Abstracts kept after title filter: {}", Self::get(&self.abstracts_kept));
        info!("  Movies with a Wikipedia match: {}", Self::get(&self.movies_matched));
        info!("  Rows after id deduplication: {}", Self::get(&self.rows_deduplicated));
        info!("  Rows ranked for output: {}", Self::get(&self.rows_ranked));
        info!("  Rows written: {}", Self::get(&self.rows_written));
    }
}

// ====== MEMORY MONITORING ======
pub fn get_memory_usage() -> String {
    if let Ok(status) = std::fs::read_to_string("/proc/self/status") {
        for line in status.lines() {
            if line.starts_with("VmRSS:") {
                return line.to_string();
            }
        }
    }
    "Memory info unavailable".to_string()
}
