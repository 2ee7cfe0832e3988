use std::env;

/// Crawl and audit tuning loaded from environment variables.
/// Every knob has a default so the library works without any env setup.
#[derive(Debug, Clone)]
pub struct CrawlConfig {
    /// Pages to fetch when a request doesn't say (0 = all).
    pub default_max_pages: u32,
    /// Batch size used when a request gives no hint.
    pub default_batch_size: u32,

    // Page-level retry
    pub retry_attempts: u32,
    pub retry_base_ms: u64,

    // Smart audit
    pub judge_timeout_ms: u64,
    pub judge_concurrency: usize,

    // Scheduler
    pub scheduler_concurrency: usize,
}

impl CrawlConfig {
    /// Load configuration from `CERTWATCH_*` environment variables,
    /// falling back to defaults. Panics with a clear message on a
    /// value that doesn't parse.
    pub fn from_env() -> Self {
        Self {
            default_max_pages: env_or("CERTWATCH_DEFAULT_MAX_PAGES", 5),
            default_batch_size: env_or("CERTWATCH_DEFAULT_BATCH_SIZE", 50),
            retry_attempts: env_or("CERTWATCH_RETRY_ATTEMPTS", 3),
            retry_base_ms: env_or("CERTWATCH_RETRY_BASE_MS", 500),
            judge_timeout_ms: env_or("CERTWATCH_JUDGE_TIMEOUT_MS", 30_000),
            judge_concurrency: env_or("CERTWATCH_JUDGE_CONCURRENCY", 4),
            scheduler_concurrency: env_or("CERTWATCH_SCHEDULER_CONCURRENCY", 4),
        }
    }
}

impl Default for CrawlConfig {
    fn default() -> Self {
        // Same defaults as an empty environment.
        Self {
            default_max_pages: 5,
            default_batch_size: 50,
            retry_attempts: 3,
            retry_base_ms: 500,
            judge_timeout_ms: 30_000,
            judge_concurrency: 4,
            scheduler_concurrency: 4,
        }
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .unwrap_or_else(|_| panic!("{key} must be a number, got: {raw}")),
        Err(_) => default,
    }
}
