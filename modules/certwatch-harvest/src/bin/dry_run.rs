// Offline crawl rehearsal: runs the real orchestrator against a scripted
// adapter so operators can check derived limits, paging, and report shape
// for any registered source without touching an upstream API.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use certwatch_common::testing::InMemoryRecordStore;
use certwatch_common::{source_profile, CrawlConfig, EntityType, SourceId};
use certwatch_harvest::testing::{raw_records, ScriptedAdapter};
use certwatch_harvest::{CrawlOrchestrator, CrawlRequest, CrawlScheduler, RetryPolicy};

#[derive(Parser)]
#[command(name = "dry-run", about = "Rehearse a crawl against a scripted source")]
struct Args {
    /// Source id from the built-in registry (e.g. us_510k, eu_recall).
    #[arg(long, default_value = "us_510k")]
    source: String,

    /// Pages to fetch (0 = until exhausted). Defaults to
    /// CERTWATCH_DEFAULT_MAX_PAGES.
    #[arg(long)]
    pages: Option<u32>,

    /// Requested batch size; the source profile may clamp it. Defaults to
    /// CERTWATCH_DEFAULT_BATCH_SIZE.
    #[arg(long)]
    batch_size: Option<u32>,

    /// How many scripted records the fake source holds.
    #[arg(long, default_value_t = 120)]
    records: usize,

    /// Print the report as JSON instead of the one-line summary.
    #[arg(long)]
    json: bool,
}

fn entity_type_for(source: &str) -> EntityType {
    match source {
        "us_510k" => EntityType::Application,
        "us_recall" | "eu_recall" => EntityType::Recall,
        "us_event" => EntityType::AdverseEvent,
        "us_registration" | "eu_registration" => EntityType::Registration,
        "us_customs" => EntityType::CustomsCase,
        "eu_guidance" => EntityType::Guidance,
        _ => EntityType::CertNews,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();
    let config = CrawlConfig::from_env();

    let source_id = SourceId::new(&args.source);
    let Some(profile) = source_profile(&source_id) else {
        bail!("unknown source: {source_id}");
    };

    let store = Arc::new(InMemoryRecordStore::new());
    let adapter = ScriptedAdapter::new(raw_records(
        args.records,
        entity_type_for(source_id.as_str()),
    ));
    let retry = RetryPolicy::new(
        config.retry_attempts,
        Duration::from_millis(config.retry_base_ms),
    );
    let orchestrator = CrawlOrchestrator::new(store.clone(), retry)
        .with_source(profile, Arc::new(adapter));
    let scheduler = CrawlScheduler::new(Arc::new(orchestrator), config.scheduler_concurrency);

    let request = CrawlRequest::builder()
        .source_id(source_id)
        .max_pages(args.pages.unwrap_or(config.default_max_pages))
        .batch_size_hint(args.batch_size.unwrap_or(config.default_batch_size))
        .build();

    let report = scheduler
        .run_all(vec![request])
        .await
        .remove(0)
        .outcome?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{report}");
        println!("store now holds {} records", store.record_count());
    }
    Ok(())
}
