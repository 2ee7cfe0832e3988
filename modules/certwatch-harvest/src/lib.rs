// Crawl side of the pipeline: parameter derivation, the page-loop
// orchestrator with retry and source-scoped locking, and a bounded-parallel
// scheduler that fans requests out across sources.

pub mod locks;
pub mod orchestrator;
pub mod params;
pub mod report;
pub mod retry;
pub mod scheduling;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;
pub mod traits;

pub use locks::SourceLocks;
pub use orchestrator::CrawlOrchestrator;
pub use params::{derive, DerivedParams, UNBOUNDED_RECORDS};
pub use report::{CrawlReport, CrawlRequest, CrawlStatus};
pub use retry::RetryPolicy;
pub use scheduling::CrawlScheduler;
pub use traits::{ChallengeSolver, FetchError, FetchedPage, SourceAdapter};
