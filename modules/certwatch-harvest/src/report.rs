use std::fmt;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

use certwatch_common::SourceId;

/// One crawl of one source. `max_pages == 0` means crawl everything the
/// source has; `resume_offset` continues a prior partial run.
#[derive(Debug, Clone, TypedBuilder)]
pub struct CrawlRequest {
    pub source_id: SourceId,
    /// Source-specific filter expressions, passed through to the adapter.
    #[builder(default)]
    pub filters: Vec<String>,
    #[builder(default = 0)]
    pub max_pages: u32,
    #[builder(default = 50)]
    pub batch_size_hint: u32,
    /// Cursor to start from, carried over from a previous report.
    #[builder(default = 0)]
    pub resume_offset: u64,
    /// Hard stop for the whole run; checked between pages.
    #[builder(default, setter(strip_option))]
    pub deadline: Option<Instant>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrawlStatus {
    /// The source was exhausted or the requested ceiling was reached.
    Completed,
    /// Some pages failed or the deadline hit; the rest was ingested.
    PartiallyFailed,
    /// An unrecoverable source condition stopped the run.
    Aborted,
}

impl fmt::Display for CrawlStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CrawlStatus::Completed => "completed",
            CrawlStatus::PartiallyFailed => "partially_failed",
            CrawlStatus::Aborted => "aborted",
        };
        f.write_str(s)
    }
}

/// Outcome of one crawl run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlReport {
    pub source_id: SourceId,
    pub pages_fetched: u32,
    pub records_ingested: u64,
    pub records_failed: u64,
    /// Cursor a follow-up request should resume from.
    pub next_resume_offset: u64,
    pub status: CrawlStatus,
    pub duration_millis: u64,
}

impl fmt::Display for CrawlReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "crawl {} [{}]: {} pages, {} ingested, {} failed, resume at {} ({}ms)",
            self.source_id,
            self.status,
            self.pages_fetched,
            self.records_ingested,
            self.records_failed,
            self.next_resume_offset,
            self.duration_millis
        )
    }
}
