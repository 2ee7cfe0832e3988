use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tracing::{info, warn};
use uuid::Uuid;

use certwatch_common::{CertwatchError, RecordStore, SourceId, SourceProfile};

use crate::locks::SourceLocks;
use crate::params::{self, DerivedParams};
use crate::report::{CrawlReport, CrawlRequest, CrawlStatus};
use crate::retry::RetryPolicy;
use crate::traits::{ChallengeSolver, FetchError, FetchedPage, SourceAdapter};

/// Drives one source's page loop: derive limits, fetch page by page with
/// bounded retry, persist in sub-batches, and report what happened. Holds a
/// per-source guard for the whole run so overlapping crawls of one source
/// serialize.
pub struct CrawlOrchestrator {
    sources: HashMap<SourceId, (SourceProfile, Arc<dyn SourceAdapter>)>,
    store: Arc<dyn RecordStore>,
    solver: Option<Arc<dyn ChallengeSolver>>,
    locks: Arc<SourceLocks>,
    retry: RetryPolicy,
}

impl CrawlOrchestrator {
    pub fn new(store: Arc<dyn RecordStore>, retry: RetryPolicy) -> Self {
        Self {
            sources: HashMap::new(),
            store,
            solver: None,
            locks: Arc::new(SourceLocks::new()),
            retry,
        }
    }

    /// Register a source's profile and adapter.
    pub fn with_source(mut self, profile: SourceProfile, adapter: Arc<dyn SourceAdapter>) -> Self {
        self.sources
            .insert(profile.source_id.clone(), (profile, adapter));
        self
    }

    pub fn with_solver(mut self, solver: Arc<dyn ChallengeSolver>) -> Self {
        self.solver = Some(solver);
        self
    }

    /// Share a lock registry with other orchestrators (the scheduler does).
    pub fn with_locks(mut self, locks: Arc<SourceLocks>) -> Self {
        self.locks = locks;
        self
    }

    /// Run one crawl, waiting if another run holds the source.
    pub async fn run(&self, request: &CrawlRequest) -> Result<CrawlReport, CertwatchError> {
        let _guard = self.locks.acquire(&request.source_id).await;
        self.run_locked(request).await
    }

    /// Run one crawl, failing fast with `SourceBusy` if the source is held.
    pub async fn try_run(&self, request: &CrawlRequest) -> Result<CrawlReport, CertwatchError> {
        let _guard = self.locks.try_acquire(&request.source_id)?;
        self.run_locked(request).await
    }

    async fn run_locked(&self, request: &CrawlRequest) -> Result<CrawlReport, CertwatchError> {
        let (profile, adapter) = self.sources.get(&request.source_id).ok_or_else(|| {
            CertwatchError::InvalidParameter(format!("unknown source: {}", request.source_id))
        })?;
        let params = params::derive(profile, request.max_pages, request.batch_size_hint)?;

        let run_id = Uuid::new_v4();
        info!(
            run_id = %run_id,
            source_id = %request.source_id,
            max_pages = request.max_pages,
            max_records = params.max_records,
            batch_size = params.effective_batch_size,
            resume_offset = request.resume_offset,
            "Starting crawl"
        );

        let started = Instant::now();
        let mut cursor = request.resume_offset;
        let mut pages_fetched = 0u32;
        let mut records_ingested = 0u64;
        let mut records_failed = 0u64;
        let mut any_page_failed = false;
        let mut deadline_hit = false;
        let mut aborted = false;
        // One challenge solve per run; a second challenge means the token
        // was rejected and retrying would loop.
        let mut solved_once = false;

        loop {
            if request.max_pages > 0 && pages_fetched >= request.max_pages {
                break;
            }
            if !params.is_unbounded()
                && records_ingested + records_failed >= params.max_records as u64
            {
                break;
            }
            if let Some(deadline) = request.deadline {
                if Instant::now() >= deadline {
                    warn!(source_id = %request.source_id, cursor, "Deadline reached, stopping crawl");
                    deadline_hit = true;
                    break;
                }
            }

            let page_size = self.next_page_size(&params, records_ingested + records_failed);

            match self
                .fetch_with_retry(adapter.as_ref(), &request.filters, cursor, page_size, &mut solved_once)
                .await
            {
                Ok(page) => {
                    pages_fetched += 1;
                    let next_cursor = page.next_cursor;
                    let has_more = page.has_more;
                    let (ok, failed) = self.persist_page(&request.source_id, page, &params).await;
                    records_ingested += ok;
                    records_failed += failed;
                    if failed > 0 {
                        any_page_failed = true;
                    }
                    cursor = next_cursor;
                    if !has_more {
                        break;
                    }
                }
                Err(err) if err.is_retryable() || matches!(err, FetchError::ChallengeRequired(_)) => {
                    // Page lost after exhausting retries. Skip it so one bad
                    // page can't stall the whole source.
                    warn!(
                        source_id = %request.source_id,
                        cursor,
                        error = %err,
                        "Page failed after retries, skipping"
                    );
                    any_page_failed = true;
                    pages_fetched += 1;
                    records_failed += page_size as u64;
                    cursor += page_size as u64;
                }
                Err(err) => {
                    warn!(
                        source_id = %request.source_id,
                        cursor,
                        error = %err,
                        "Unrecoverable source condition, aborting crawl"
                    );
                    aborted = true;
                    break;
                }
            }
        }

        let status = if aborted {
            CrawlStatus::Aborted
        } else if any_page_failed || deadline_hit {
            CrawlStatus::PartiallyFailed
        } else {
            CrawlStatus::Completed
        };

        let report = CrawlReport {
            source_id: request.source_id.clone(),
            pages_fetched,
            records_ingested,
            records_failed,
            next_resume_offset: cursor,
            status,
            duration_millis: started.elapsed().as_millis() as u64,
        };
        info!(run_id = %run_id, status = %report.status, "{report}");
        Ok(report)
    }

    /// Page size for the next fetch: the derived batch size, shrunk at the
    /// tail so a bounded crawl never over-fetches past its record ceiling.
    fn next_page_size(&self, params: &DerivedParams, attempted: u64) -> u32 {
        if params.is_unbounded() {
            return params.effective_batch_size;
        }
        let remaining = (params.max_records as u64).saturating_sub(attempted);
        (params.effective_batch_size as u64).min(remaining) as u32
    }

    async fn fetch_with_retry(
        &self,
        adapter: &dyn SourceAdapter,
        filters: &[String],
        cursor: u64,
        page_size: u32,
        solved_once: &mut bool,
    ) -> Result<FetchedPage, FetchError> {
        let mut attempt = 0u32;
        loop {
            match adapter.fetch_page(filters, cursor, page_size).await {
                Ok(page) => return Ok(page),
                Err(FetchError::ChallengeRequired(challenge)) => {
                    if let (Some(solver), false) = (&self.solver, *solved_once) {
                        match solver.solve(&challenge).await {
                            Ok(token) => {
                                *solved_once = true;
                                if let Err(err) = adapter.authorize(&token).await {
                                    warn!(error = %err, "Challenge token rejected by adapter");
                                } else {
                                    info!(cursor, "Challenge solved, refetching page");
                                    // Solved challenges don't consume an attempt.
                                    continue;
                                }
                            }
                            Err(err) => {
                                warn!(cursor, error = %err, "Challenge solve failed");
                            }
                        }
                    }
                    attempt += 1;
                    if attempt >= self.retry.max_attempts {
                        return Err(FetchError::ChallengeRequired(challenge));
                    }
                    tokio::time::sleep(self.retry.backoff(attempt - 1)).await;
                }
                Err(err) if err.is_retryable() => {
                    attempt += 1;
                    if attempt >= self.retry.max_attempts {
                        return Err(err);
                    }
                    let backoff = self.retry.backoff(attempt - 1);
                    warn!(
                        cursor,
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %err,
                        "Page fetch failed, retrying after backoff"
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Persist one page in sub-batches. Per-record failures are counted and
    /// never stop the rest of the page.
    async fn persist_page(
        &self,
        source_id: &SourceId,
        page: FetchedPage,
        params: &DerivedParams,
    ) -> (u64, u64) {
        let mut ok = 0u64;
        let mut failed = 0u64;
        for chunk in page.records.chunks(params.effective_batch_size as usize) {
            for raw in chunk {
                let record = raw.clone().into_record(source_id);
                match self.store.upsert_record(&record).await {
                    Ok(()) => ok += 1,
                    Err(err) => {
                        warn!(
                            source_id = %source_id,
                            natural_key = %record.natural_key,
                            error = %err,
                            "Record upsert failed"
                        );
                        failed += 1;
                    }
                }
            }
        }
        (ok, failed)
    }
}
