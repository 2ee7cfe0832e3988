// Cross-run behavior: a partial crawl's resume offset must let a follow-up
// request continue where it left off, covering the source exactly once.

use std::sync::Arc;

use certwatch_common::testing::InMemoryRecordStore;
use certwatch_common::{EntityType, RecordIdentity, SourceId, SourceProfile};
use certwatch_harvest::testing::{raw_records, ScriptedAdapter};
use certwatch_harvest::{CrawlOrchestrator, CrawlRequest, CrawlStatus, RetryPolicy};

fn orchestrator(store: Arc<InMemoryRecordStore>, adapter: ScriptedAdapter) -> CrawlOrchestrator {
    CrawlOrchestrator::new(store, RetryPolicy::immediate(3))
        .with_source(SourceProfile::new("us_510k", 100, 50), Arc::new(adapter))
}

fn request(pages: u32, resume_offset: u64) -> CrawlRequest {
    CrawlRequest::builder()
        .source_id(SourceId::new("us_510k"))
        .max_pages(pages)
        .batch_size_hint(10)
        .resume_offset(resume_offset)
        .build()
}

#[tokio::test]
async fn resumed_run_continues_disjointly() {
    let store = Arc::new(InMemoryRecordStore::new());
    let dataset = raw_records(35, EntityType::Application);

    // First run: two pages of ten.
    let first = orchestrator(store.clone(), ScriptedAdapter::new(dataset.clone()))
        .run(&request(2, 0))
        .await
        .unwrap();
    assert_eq!(first.status, CrawlStatus::Completed);
    assert_eq!(first.records_ingested, 20);
    assert_eq!(first.next_resume_offset, 20);
    assert_eq!(store.record_count(), 20);

    // Second run resumes at the reported offset and exhausts the source.
    let second = orchestrator(store.clone(), ScriptedAdapter::new(dataset.clone()))
        .run(&request(0, first.next_resume_offset))
        .await
        .unwrap();
    assert_eq!(second.status, CrawlStatus::Completed);
    assert_eq!(second.records_ingested, 15);

    // Union covers the dataset exactly once.
    assert_eq!(store.record_count(), 35);
    for raw in &dataset {
        let identity = RecordIdentity::new(raw.entity_type, raw.natural_key.clone());
        assert!(store.record(&identity).is_some(), "missing {identity}");
    }
}

#[tokio::test]
async fn aborted_run_resumes_at_the_failed_page() {
    let store = Arc::new(InMemoryRecordStore::new());
    let dataset = raw_records(30, EntityType::Application);

    // Malformed cursor at page two aborts the run.
    let adapter = ScriptedAdapter::new(dataset.clone()).malformed_at(10);
    let first = orchestrator(store.clone(), adapter)
        .run(&request(3, 0))
        .await
        .unwrap();
    assert_eq!(first.status, CrawlStatus::Aborted);
    assert_eq!(first.records_ingested, 10);
    assert_eq!(first.next_resume_offset, 10);

    // A clean follow-up picks up the remainder.
    let second = orchestrator(store.clone(), ScriptedAdapter::new(dataset))
        .run(&request(0, first.next_resume_offset))
        .await
        .unwrap();
    assert_eq!(second.status, CrawlStatus::Completed);
    assert_eq!(second.records_ingested, 20);
    assert_eq!(store.record_count(), 30);
}
