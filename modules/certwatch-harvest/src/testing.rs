// Test doubles for the crawl loop's trait boundaries:
// - ScriptedAdapter (SourceAdapter) — in-memory dataset served page by page,
//   with per-cursor failure injection and a challenge gate
// - MockSolver (ChallengeSolver) — fixed token, call counting
//
// Plus raw record fixtures.

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;

use certwatch_common::{EntityType, RawRecord, RiskLevel};

use crate::traits::{ChallengeSolver, FetchError, FetchedPage, SourceAdapter};

// ---------------------------------------------------------------------------
// ScriptedAdapter
// ---------------------------------------------------------------------------

struct ScriptedInner {
    /// cursor → remaining Unavailable failures before that page serves.
    failing: HashMap<u64, u32>,
    /// Serve a challenge instead of data until a token is installed.
    challenged: bool,
    token: Option<String>,
    fetch_calls: usize,
}

/// Serves a fixed dataset in cursor-offset pages. Builder pattern:
/// `.failing_fetches_at()`, `.auth_failing_at()`, `.malformed_at()`,
/// `.challenged()`.
pub struct ScriptedAdapter {
    dataset: Vec<RawRecord>,
    auth_fail_at: Option<u64>,
    malformed_at: Option<u64>,
    inner: Mutex<ScriptedInner>,
}

impl ScriptedAdapter {
    pub fn new(dataset: Vec<RawRecord>) -> Self {
        Self {
            dataset,
            auth_fail_at: None,
            malformed_at: None,
            inner: Mutex::new(ScriptedInner {
                failing: HashMap::new(),
                challenged: false,
                token: None,
                fetch_calls: 0,
            }),
        }
    }

    /// Make fetches at `cursor` fail with `Unavailable` the next `times` calls.
    pub fn failing_fetches_at(self, cursor: u64, times: u32) -> Self {
        self.inner.lock().unwrap().failing.insert(cursor, times);
        self
    }

    /// Make the fetch at `cursor` fail with `AuthFailed`.
    pub fn auth_failing_at(mut self, cursor: u64) -> Self {
        self.auth_fail_at = Some(cursor);
        self
    }

    /// Make the fetch at `cursor` fail with `MalformedCursor`.
    pub fn malformed_at(mut self, cursor: u64) -> Self {
        self.malformed_at = Some(cursor);
        self
    }

    /// Answer every fetch with a challenge until `authorize` installs a token.
    pub fn challenged(self) -> Self {
        self.inner.lock().unwrap().challenged = true;
        self
    }

    // --- Assertion helpers ---

    pub fn fetch_calls(&self) -> usize {
        self.inner.lock().unwrap().fetch_calls
    }

    pub fn installed_token(&self) -> Option<String> {
        self.inner.lock().unwrap().token.clone()
    }
}

#[async_trait]
impl SourceAdapter for ScriptedAdapter {
    async fn fetch_page(
        &self,
        _filters: &[String],
        cursor: u64,
        page_size: u32,
    ) -> Result<FetchedPage, FetchError> {
        {
            let mut inner = self.inner.lock().unwrap();
            inner.fetch_calls += 1;

            if inner.challenged && inner.token.is_none() {
                return Err(FetchError::ChallengeRequired("prove-not-a-bot".to_string()));
            }
            if let Some(remaining) = inner.failing.get_mut(&cursor) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(FetchError::Unavailable(format!(
                        "scripted outage at {cursor}"
                    )));
                }
            }
        }
        if self.auth_fail_at == Some(cursor) {
            return Err(FetchError::AuthFailed("scripted 401".to_string()));
        }
        if self.malformed_at == Some(cursor) {
            return Err(FetchError::MalformedCursor(format!("cursor {cursor}")));
        }

        let start = (cursor as usize).min(self.dataset.len());
        let end = (start + page_size as usize).min(self.dataset.len());
        Ok(FetchedPage {
            records: self.dataset[start..end].to_vec(),
            next_cursor: end as u64,
            has_more: end < self.dataset.len(),
        })
    }

    async fn authorize(&self, token: &str) -> Result<()> {
        self.inner.lock().unwrap().token = Some(token.to_string());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MockSolver
// ---------------------------------------------------------------------------

/// Returns one fixed token. Counts solve calls.
pub struct MockSolver {
    token: String,
    calls: Mutex<usize>,
}

impl MockSolver {
    pub fn new(token: &str) -> Self {
        Self {
            token: token.to_string(),
            calls: Mutex::new(0),
        }
    }

    pub fn solve_calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl ChallengeSolver for MockSolver {
    async fn solve(&self, _challenge: &str) -> Result<String> {
        *self.calls.lock().unwrap() += 1;
        Ok(self.token.clone())
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// `count` raw records with keys K0001, K0002, ... in dataset order.
pub fn raw_records(count: usize, entity_type: EntityType) -> Vec<RawRecord> {
    (1..=count)
        .map(|i| RawRecord {
            natural_key: format!("K{i:04}"),
            entity_type,
            title: format!("Device notice {i}"),
            summary: String::new(),
            product: "generic device".to_string(),
            country: "US".to_string(),
            risk_level: RiskLevel::Medium,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn serves_pages_in_dataset_order() {
        let adapter = ScriptedAdapter::new(raw_records(7, EntityType::Recall));

        let page = adapter.fetch_page(&[], 0, 5).await.unwrap();
        assert_eq!(page.records.len(), 5);
        assert_eq!(page.next_cursor, 5);
        assert!(page.has_more);

        let page = adapter.fetch_page(&[], 5, 5).await.unwrap();
        assert_eq!(page.records.len(), 2);
        assert_eq!(page.records[0].natural_key, "K0006");
        assert!(!page.has_more);

        assert_eq!(adapter.fetch_calls(), 2);
    }

    #[tokio::test]
    async fn challenge_gate_opens_after_authorize() {
        let adapter = ScriptedAdapter::new(raw_records(3, EntityType::Recall)).challenged();

        let err = adapter.fetch_page(&[], 0, 5).await.unwrap_err();
        assert!(matches!(err, FetchError::ChallengeRequired(_)));

        adapter.authorize("token-1").await.unwrap();
        assert_eq!(adapter.installed_token().as_deref(), Some("token-1"));
        assert!(adapter.fetch_page(&[], 0, 5).await.is_ok());
    }

    #[tokio::test]
    async fn scripted_outage_expires() {
        let adapter =
            ScriptedAdapter::new(raw_records(3, EntityType::Recall)).failing_fetches_at(0, 1);
        assert!(adapter.fetch_page(&[], 0, 5).await.is_err());
        assert!(adapter.fetch_page(&[], 0, 5).await.is_ok());
    }
}
