use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tracing::{info, warn};

use certwatch_common::{CertwatchError, SourceId};

use crate::orchestrator::CrawlOrchestrator;
use crate::report::{CrawlReport, CrawlRequest};

/// One scheduled request's outcome.
pub struct ScheduledCrawl {
    pub source_id: SourceId,
    pub outcome: Result<CrawlReport, CertwatchError>,
}

/// Fans a batch of crawl requests out with bounded parallelism. Different
/// sources run concurrently; requests for the same source serialize on the
/// orchestrator's per-source locks. Triggered on demand; timers live with
/// the caller.
pub struct CrawlScheduler {
    orchestrator: Arc<CrawlOrchestrator>,
    concurrency: usize,
}

impl CrawlScheduler {
    pub fn new(orchestrator: Arc<CrawlOrchestrator>, concurrency: usize) -> Self {
        assert!(concurrency > 0, "concurrency must be > 0");
        Self {
            orchestrator,
            concurrency,
        }
    }

    /// Run every request, at most `concurrency` at a time. Results come back
    /// in request order; one failed request never stops the rest.
    pub async fn run_all(&self, requests: Vec<CrawlRequest>) -> Vec<ScheduledCrawl> {
        let total = requests.len();
        info!(requests = total, concurrency = self.concurrency, "Scheduler run starting");

        let mut outcomes: Vec<(usize, ScheduledCrawl)> = stream::iter(
            requests.into_iter().enumerate().map(|(i, request)| {
                let orchestrator = self.orchestrator.clone();
                async move {
                    let source_id = request.source_id.clone();
                    let outcome = orchestrator.run(&request).await;
                    if let Err(ref err) = outcome {
                        warn!(source_id = %source_id, error = %err, "Scheduled crawl failed");
                    }
                    (i, ScheduledCrawl { source_id, outcome })
                }
            }),
        )
        .buffer_unordered(self.concurrency)
        .collect()
        .await;
        outcomes.sort_by_key(|(i, _)| *i);
        let results: Vec<ScheduledCrawl> = outcomes.into_iter().map(|(_, r)| r).collect();

        let ingested: u64 = results
            .iter()
            .filter_map(|r| r.outcome.as_ref().ok())
            .map(|report| report.records_ingested)
            .sum();
        let failed_runs = results.iter().filter(|r| r.outcome.is_err()).count();
        info!(
            requests = total,
            records_ingested = ingested,
            failed_runs,
            "Scheduler run complete"
        );
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use certwatch_common::testing::InMemoryRecordStore;
    use certwatch_common::{EntityType, SourceProfile};

    use crate::report::CrawlStatus;
    use crate::retry::RetryPolicy;
    use crate::testing::{raw_records, ScriptedAdapter};

    fn request(source: &str, pages: u32) -> CrawlRequest {
        CrawlRequest::builder()
            .source_id(SourceId::new(source))
            .max_pages(pages)
            .batch_size_hint(10)
            .build()
    }

    #[tokio::test]
    async fn runs_multiple_sources_and_keeps_request_order() {
        let store = Arc::new(InMemoryRecordStore::new());
        let orchestrator = CrawlOrchestrator::new(store.clone(), RetryPolicy::immediate(3))
            .with_source(
                SourceProfile::new("us_510k", 100, 50),
                Arc::new(ScriptedAdapter::new(raw_records(12, EntityType::Application))),
            )
            .with_source(
                SourceProfile::new("eu_recall", 50, 25),
                Arc::new(ScriptedAdapter::new(raw_records(4, EntityType::Recall))),
            );
        let scheduler = CrawlScheduler::new(Arc::new(orchestrator), 2);

        let results = scheduler
            .run_all(vec![request("us_510k", 2), request("eu_recall", 1)])
            .await;

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].source_id, SourceId::new("us_510k"));
        assert_eq!(results[1].source_id, SourceId::new("eu_recall"));
        let first = results[0].outcome.as_ref().unwrap();
        assert_eq!(first.status, CrawlStatus::Completed);
        assert_eq!(first.records_ingested, 12);
    }

    #[tokio::test]
    async fn one_bad_request_does_not_stop_the_batch() {
        let store = Arc::new(InMemoryRecordStore::new());
        let orchestrator = CrawlOrchestrator::new(store, RetryPolicy::immediate(3)).with_source(
            SourceProfile::new("us_510k", 100, 50),
            Arc::new(ScriptedAdapter::new(raw_records(5, EntityType::Application))),
        );
        let scheduler = CrawlScheduler::new(Arc::new(orchestrator), 4);

        let results = scheduler
            .run_all(vec![request("nope", 1), request("us_510k", 1)])
            .await;

        assert!(results[0].outcome.is_err());
        let ok = results[1].outcome.as_ref().unwrap();
        assert_eq!(ok.records_ingested, 5);
    }

    #[tokio::test]
    async fn same_source_requests_serialize() {
        // Two requests against one source share its dataset; the per-source
        // lock means both complete without interleaving, and both succeed.
        let store = Arc::new(InMemoryRecordStore::new());
        let orchestrator = CrawlOrchestrator::new(store.clone(), RetryPolicy::immediate(3))
            .with_source(
                SourceProfile::new("us_510k", 100, 50),
                Arc::new(ScriptedAdapter::new(raw_records(6, EntityType::Application))),
            );
        let scheduler = CrawlScheduler::new(Arc::new(orchestrator), 4);

        let results = scheduler
            .run_all(vec![request("us_510k", 1), request("us_510k", 1)])
            .await;
        assert!(results.iter().all(|r| r.outcome.is_ok()));
        assert_eq!(store.record_count(), 6);
    }
}
