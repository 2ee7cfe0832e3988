// Trait abstractions for the crawl loop's dependencies.
//
// SourceAdapter hides each upstream API behind one paging call. The
// orchestrator never sees HTTP, sessions, or response parsing.
// ChallengeSolver hides the anti-bot challenge service.
//
// These enable deterministic testing with ScriptedAdapter and MockSolver:
// no network, no upstream quotas.

use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;

use certwatch_common::RawRecord;

/// One page of records from an upstream source.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub records: Vec<RawRecord>,
    /// Offset the next fetch should start from.
    pub next_cursor: u64,
    pub has_more: bool,
}

/// How a page fetch failed. The orchestrator retries `Unavailable`,
/// hands `ChallengeRequired` to the solver, and aborts the run on the rest.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("source unavailable: {0}")]
    Unavailable(String),

    /// The source answered with an anti-bot challenge instead of data.
    /// Carries the challenge payload for the solver.
    #[error("challenge required")]
    ChallengeRequired(String),

    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error("malformed cursor: {0}")]
    MalformedCursor(String),
}

impl FetchError {
    /// Whether retrying the same page can possibly succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, FetchError::Unavailable(_))
    }
}

#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Fetch one page starting at `cursor`, at most `page_size` records.
    async fn fetch_page(
        &self,
        filters: &[String],
        cursor: u64,
        page_size: u32,
    ) -> Result<FetchedPage, FetchError>;

    /// Install a solved challenge token. Adapters for sources without
    /// challenges keep the default no-op.
    async fn authorize(&self, _token: &str) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
pub trait ChallengeSolver: Send + Sync {
    /// Solve an anti-bot challenge, returning the token the source expects.
    async fn solve(&self, challenge: &str) -> Result<String>;
}
