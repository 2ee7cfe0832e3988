use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use certwatch_common::{
    CertwatchError, CrawlConfig, EntityType, IngestedRecord, RecordIdentity, RecordStore,
    RiskLevel,
};

use crate::judge::{AuditDecision, Judge};

const MAX_PREVIEW_LIMIT: usize = 1000;

/// Where one audited record stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppliedStatus {
    /// Judged in preview, not executed yet.
    Pending,
    Applied,
    /// The record changed (or vanished) between preview and execute.
    Stale,
    Failed,
}

/// One record's audit line, carried from preview into execute.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditItem {
    pub entity_type: EntityType,
    pub entity_id: String,
    /// Risk level the judgment was based on; execute re-validates against it.
    pub risk_level_at_preview: RiskLevel,
    pub decision: AuditDecision,
    pub rationale: String,
    pub applied_status: AppliedStatus,
    /// Product terms of a downgraded record, offered to the operator as
    /// blacklist keyword candidates. Execute never acts on them.
    pub proposed_blacklist: Vec<String>,
}

impl AuditItem {
    pub fn identity(&self) -> RecordIdentity {
        RecordIdentity::new(self.entity_type, self.entity_id.clone())
    }
}

/// Outcome of a preview or an execute pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmartAuditResult {
    pub total: u64,
    pub kept_count: u64,
    pub downgraded_count: u64,
    pub failed_count: u64,
    pub duration_millis: u64,
    pub preview: bool,
    pub items: Vec<AuditItem>,
}

impl fmt::Display for SmartAuditResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "audit {}: {} records, {} kept, {} downgraded, {} failed ({}ms)",
            if self.preview { "preview" } else { "execute" },
            self.total,
            self.kept_count,
            self.downgraded_count,
            self.failed_count,
            self.duration_millis
        )
    }
}

/// Two-phase audit over high-risk records. `preview` judges a batch without
/// mutating anything; `execute` applies a reviewed batch, skipping records
/// that changed since the preview.
pub struct SmartAuditEngine {
    store: Arc<dyn RecordStore>,
    judge: Arc<dyn Judge>,
    judge_timeout: Duration,
    judge_concurrency: usize,
}

impl SmartAuditEngine {
    pub fn new(store: Arc<dyn RecordStore>, judge: Arc<dyn Judge>) -> Self {
        Self {
            store,
            judge,
            judge_timeout: Duration::from_secs(30),
            judge_concurrency: 4,
        }
    }

    /// Engine tuned from the environment config.
    pub fn configured(
        store: Arc<dyn RecordStore>,
        judge: Arc<dyn Judge>,
        config: &CrawlConfig,
    ) -> Self {
        Self::new(store, judge)
            .with_judge_timeout(Duration::from_millis(config.judge_timeout_ms))
            .with_judge_concurrency(config.judge_concurrency)
    }

    pub fn with_judge_timeout(mut self, timeout: Duration) -> Self {
        self.judge_timeout = timeout;
        self
    }

    pub fn with_judge_concurrency(mut self, concurrency: usize) -> Self {
        assert!(concurrency > 0, "concurrency must be > 0");
        self.judge_concurrency = concurrency;
        self
    }

    /// Judge up to `limit` high-risk records. Reads only; the store is
    /// never written. Items come back sorted by identity so operators see
    /// a stable list run over run.
    pub async fn preview(
        &self,
        entity_type: Option<EntityType>,
        country: Option<&str>,
        limit: usize,
    ) -> Result<SmartAuditResult, CertwatchError> {
        if limit == 0 || limit > MAX_PREVIEW_LIMIT {
            return Err(CertwatchError::InvalidParameter(format!(
                "limit must be 1..={MAX_PREVIEW_LIMIT}, got {limit}"
            )));
        }

        let started = Instant::now();
        let records = self
            .store
            .find_high_risk(entity_type, country, limit)
            .await
            .map_err(|e| CertwatchError::Persistence(e.to_string()))?;
        info!(records = records.len(), "Audit preview starting");

        let mut items: Vec<AuditItem> = stream::iter(records)
            .map(|record| self.judge_one(record))
            .buffer_unordered(self.judge_concurrency)
            .collect()
            .await;
        items.sort_by_key(|item| item.identity());

        let result = summarize(items, true, started);
        info!("{result}");
        Ok(result)
    }

    async fn judge_one(&self, record: IngestedRecord) -> AuditItem {
        let mut item = AuditItem {
            entity_type: record.entity_type,
            entity_id: record.natural_key.clone(),
            risk_level_at_preview: record.risk_level,
            decision: AuditDecision::Keep,
            rationale: String::new(),
            applied_status: AppliedStatus::Pending,
            proposed_blacklist: Vec::new(),
        };
        match tokio::time::timeout(self.judge_timeout, self.judge.evaluate(&record)).await {
            Ok(Ok(verdict)) => {
                item.decision = verdict.decision;
                item.rationale = verdict.rationale;
                if verdict.decision == AuditDecision::Downgrade {
                    item.proposed_blacklist = blacklist_candidates(&record.product);
                }
            }
            Ok(Err(err)) => {
                warn!(identity = %item.identity(), error = %err, "Judge failed");
                item.applied_status = AppliedStatus::Failed;
                item.rationale = CertwatchError::JudgeUnavailable(err.to_string()).to_string();
            }
            Err(_) => {
                warn!(identity = %item.identity(), "Judge timed out");
                item.applied_status = AppliedStatus::Failed;
                item.rationale =
                    CertwatchError::JudgeUnavailable("evaluation timed out".to_string())
                        .to_string();
            }
        }
        item
    }

    /// Apply a reviewed batch. Every item is re-fetched by identity: gone or
    /// drifted records go `Stale` untouched, except that downgrading an
    /// already-downgraded record is a successful no-op. One item's failure
    /// never stops the rest.
    pub async fn execute(&self, items: &[AuditItem]) -> Result<SmartAuditResult, CertwatchError> {
        if items.is_empty() {
            return Err(CertwatchError::InvalidParameter(
                "execute requires at least one audit item".to_string(),
            ));
        }

        let started = Instant::now();
        info!(items = items.len(), "Audit execute starting");
        let mut applied = Vec::with_capacity(items.len());
        for item in items {
            applied.push(self.apply_one(item).await);
        }

        let result = summarize(applied, false, started);
        info!("{result}");
        Ok(result)
    }

    async fn apply_one(&self, item: &AuditItem) -> AuditItem {
        let mut item = item.clone();
        let identity = item.identity();

        let current = match self.store.find_by_identity(&identity).await {
            Ok(record) => record,
            Err(err) => {
                warn!(identity = %identity, error = %err, "Lookup failed during execute");
                item.applied_status = AppliedStatus::Failed;
                return item;
            }
        };
        let Some(record) = current else {
            warn!(identity = %identity, "Record vanished since preview");
            item.applied_status = AppliedStatus::Stale;
            return item;
        };

        // Already downgraded: the intended end state holds, count it applied.
        if item.decision == AuditDecision::Downgrade && record.risk_level == RiskLevel::Low {
            item.applied_status = AppliedStatus::Applied;
            return item;
        }
        if record.risk_level != item.risk_level_at_preview {
            warn!(
                identity = %identity,
                at_preview = %item.risk_level_at_preview,
                now = %record.risk_level,
                "Risk level drifted since preview"
            );
            item.applied_status = AppliedStatus::Stale;
            return item;
        }

        match item.decision {
            AuditDecision::Keep => {
                item.applied_status = AppliedStatus::Applied;
            }
            AuditDecision::Downgrade => {
                match self.store.update_risk_level(&identity, RiskLevel::Low).await {
                    Ok(()) => item.applied_status = AppliedStatus::Applied,
                    Err(err) => {
                        warn!(identity = %identity, error = %err, "Risk downgrade failed");
                        item.applied_status = AppliedStatus::Failed;
                    }
                }
            }
        }
        item
    }
}

/// Product terms worth considering as blacklist keywords: lowercased words,
/// tokens under three characters dropped, first occurrence order kept.
fn blacklist_candidates(product: &str) -> Vec<String> {
    let mut seen = Vec::new();
    for word in product.split_whitespace() {
        let term: String = word
            .chars()
            .filter(|c| c.is_alphanumeric())
            .collect::<String>()
            .to_lowercase();
        if term.len() >= 3 && !seen.contains(&term) {
            seen.push(term);
        }
    }
    seen
}

fn summarize(items: Vec<AuditItem>, preview: bool, started: Instant) -> SmartAuditResult {
    let mut kept = 0u64;
    let mut downgraded = 0u64;
    let mut failed = 0u64;
    for item in &items {
        match item.applied_status {
            AppliedStatus::Failed | AppliedStatus::Stale => failed += 1,
            _ => match item.decision {
                AuditDecision::Keep => kept += 1,
                AuditDecision::Downgrade => downgraded += 1,
            },
        }
    }
    SmartAuditResult {
        total: items.len() as u64,
        kept_count: kept,
        downgraded_count: downgraded,
        failed_count: failed,
        duration_millis: started.elapsed().as_millis() as u64,
        preview,
        items,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use certwatch_common::testing::{high_risk_record, InMemoryRecordStore};

    use crate::testing::ScriptedJudge;

    fn store_with_five() -> Arc<InMemoryRecordStore> {
        Arc::new(InMemoryRecordStore::new().with_records(vec![
            high_risk_record("us_recall", EntityType::Recall, "R1", "surgical glove"),
            high_risk_record("us_recall", EntityType::Recall, "R2", "pacemaker lead"),
            high_risk_record("us_recall", EntityType::Recall, "R3", "veterinary syringe"),
            high_risk_record("us_recall", EntityType::Recall, "R4", "bone screw"),
            high_risk_record("us_recall", EntityType::Recall, "R5", "dental drill"),
        ]))
    }

    fn judge_two_downgrades() -> Arc<ScriptedJudge> {
        Arc::new(
            ScriptedJudge::new(AuditDecision::Keep)
                .downgrading("R1")
                .downgrading("R3"),
        )
    }

    #[tokio::test]
    async fn preview_limit_is_validated() {
        let engine = SmartAuditEngine::new(store_with_five(), judge_two_downgrades());
        assert!(matches!(
            engine.preview(None, None, 0).await.unwrap_err(),
            CertwatchError::InvalidParameter(_)
        ));
        assert!(matches!(
            engine.preview(None, None, 1001).await.unwrap_err(),
            CertwatchError::InvalidParameter(_)
        ));
    }

    #[tokio::test]
    async fn preview_judges_without_mutating_and_sorts_by_identity() {
        let store = store_with_five();
        let engine = SmartAuditEngine::new(store.clone(), judge_two_downgrades());

        let result = engine.preview(None, None, 10).await.unwrap();
        assert!(result.preview);
        assert_eq!(result.total, 5);
        assert_eq!(result.downgraded_count, 2);
        assert_eq!(result.kept_count, 3);
        assert_eq!(result.failed_count, 0);

        let ids: Vec<&str> = result.items.iter().map(|i| i.entity_id.as_str()).collect();
        assert_eq!(ids, vec!["R1", "R2", "R3", "R4", "R5"]);
        assert!(result
            .items
            .iter()
            .all(|i| i.applied_status == AppliedStatus::Pending));

        // Purity: nothing written.
        assert_eq!(store.risk_update_calls(), 0);
        assert_eq!(store.classification_calls(), 0);
        let r1 = RecordIdentity::new(EntityType::Recall, "R1");
        assert_eq!(store.risk_of(&r1), Some(RiskLevel::High));
    }

    #[tokio::test]
    async fn preview_proposes_blacklist_terms_for_downgrades_only() {
        let engine = SmartAuditEngine::new(store_with_five(), judge_two_downgrades());
        let result = engine.preview(None, None, 10).await.unwrap();

        let r3 = result.items.iter().find(|i| i.entity_id == "R3").unwrap();
        assert_eq!(r3.proposed_blacklist, vec!["veterinary", "syringe"]);
        let r2 = result.items.iter().find(|i| i.entity_id == "R2").unwrap();
        assert!(r2.proposed_blacklist.is_empty());
    }

    #[tokio::test]
    async fn preview_respects_entity_type_and_limit() {
        let store = Arc::new(InMemoryRecordStore::new().with_records(vec![
            high_risk_record("us_recall", EntityType::Recall, "R1", "glove"),
            high_risk_record("us_510k", EntityType::Application, "K1", "stent"),
        ]));
        let engine = SmartAuditEngine::new(store, judge_two_downgrades());

        let result = engine
            .preview(Some(EntityType::Application), None, 10)
            .await
            .unwrap();
        assert_eq!(result.total, 1);
        assert_eq!(result.items[0].entity_id, "K1");

        // Judge failures count as failed, batch continues.
        let failing = Arc::new(
            ScriptedJudge::new(AuditDecision::Keep).failing_for("R1"),
        );
        let store = store_with_five();
        let engine = SmartAuditEngine::new(store, failing);
        let result = engine.preview(None, None, 10).await.unwrap();
        assert_eq!(result.failed_count, 1);
        assert_eq!(result.kept_count, 4);
    }

    #[tokio::test]
    async fn slow_judge_times_out_per_item() {
        let store = store_with_five();
        let judge = Arc::new(
            ScriptedJudge::new(AuditDecision::Keep).slow_for("R2", Duration::from_millis(200)),
        );
        let engine = SmartAuditEngine::new(store, judge)
            .with_judge_timeout(Duration::from_millis(20));

        let result = engine.preview(None, None, 10).await.unwrap();
        assert_eq!(result.failed_count, 1);
        assert_eq!(result.kept_count, 4);
        let r2 = result.items.iter().find(|i| i.entity_id == "R2").unwrap();
        assert_eq!(r2.applied_status, AppliedStatus::Failed);
        assert!(r2.rationale.contains("timed out"));
    }

    #[tokio::test]
    async fn configured_engine_applies_the_env_judge_timeout() {
        let store = store_with_five();
        let judge = Arc::new(
            ScriptedJudge::new(AuditDecision::Keep).slow_for("R2", Duration::from_millis(200)),
        );
        let config = CrawlConfig {
            judge_timeout_ms: 20,
            judge_concurrency: 2,
            ..CrawlConfig::default()
        };
        let engine = SmartAuditEngine::configured(store, judge, &config);

        let result = engine.preview(None, None, 10).await.unwrap();
        assert_eq!(result.failed_count, 1);
        assert_eq!(result.kept_count, 4);
    }

    #[tokio::test]
    async fn execute_applies_approved_downgrades() {
        let store = store_with_five();
        let engine = SmartAuditEngine::new(store.clone(), judge_two_downgrades());

        let preview = engine.preview(None, None, 10).await.unwrap();
        // Operator approves only the downgrades.
        let approved: Vec<AuditItem> = preview
            .items
            .into_iter()
            .filter(|i| i.decision == AuditDecision::Downgrade)
            .collect();

        let result = engine.execute(&approved).await.unwrap();
        assert!(!result.preview);
        assert_eq!(result.total, 2);
        assert_eq!(result.downgraded_count, 2);
        assert_eq!(result.failed_count, 0);
        assert!(result
            .items
            .iter()
            .all(|i| i.applied_status == AppliedStatus::Applied));

        let r1 = RecordIdentity::new(EntityType::Recall, "R1");
        let r2 = RecordIdentity::new(EntityType::Recall, "R2");
        assert_eq!(store.risk_of(&r1), Some(RiskLevel::Low));
        assert_eq!(store.risk_of(&r2), Some(RiskLevel::High));
    }

    #[tokio::test]
    async fn execute_rejects_an_empty_batch() {
        let engine = SmartAuditEngine::new(store_with_five(), judge_two_downgrades());
        let err = engine.execute(&[]).await.unwrap_err();
        assert!(matches!(err, CertwatchError::InvalidParameter(_)));
    }

    #[tokio::test]
    async fn executing_twice_is_idempotent() {
        let store = store_with_five();
        let engine = SmartAuditEngine::new(store.clone(), judge_two_downgrades());
        let preview = engine.preview(None, None, 10).await.unwrap();
        let approved: Vec<AuditItem> = preview
            .items
            .into_iter()
            .filter(|i| i.decision == AuditDecision::Downgrade)
            .collect();

        engine.execute(&approved).await.unwrap();
        let updates_after_first = store.risk_update_calls();

        // Second run: already-downgraded records are successful no-ops.
        let second = engine.execute(&approved).await.unwrap();
        assert_eq!(second.downgraded_count, 2);
        assert_eq!(second.failed_count, 0);
        assert_eq!(store.risk_update_calls(), updates_after_first);
    }

    #[tokio::test]
    async fn drifted_and_missing_records_go_stale_untouched() {
        let store = store_with_five();
        let engine = SmartAuditEngine::new(store.clone(), judge_two_downgrades());
        let preview = engine.preview(None, None, 10).await.unwrap();
        let mut approved: Vec<AuditItem> = preview
            .items
            .into_iter()
            .filter(|i| i.decision == AuditDecision::Downgrade)
            .collect();
        // R1 drifted to Medium since preview; a keep-decision item points at
        // a record that no longer exists.
        let r1 = RecordIdentity::new(EntityType::Recall, "R1");
        store.update_risk_level(&r1, RiskLevel::Medium).await.unwrap();
        approved.push(AuditItem {
            entity_type: EntityType::Recall,
            entity_id: "GONE".to_string(),
            risk_level_at_preview: RiskLevel::High,
            decision: AuditDecision::Keep,
            rationale: String::new(),
            applied_status: AppliedStatus::Pending,
            proposed_blacklist: Vec::new(),
        });

        let result = engine.execute(&approved).await.unwrap();
        assert_eq!(result.downgraded_count, 1); // R3 only
        assert_eq!(result.failed_count, 2);
        let statuses: Vec<AppliedStatus> =
            result.items.iter().map(|i| i.applied_status).collect();
        assert_eq!(
            statuses,
            vec![AppliedStatus::Stale, AppliedStatus::Applied, AppliedStatus::Stale]
        );
        // The drifted record kept its new level.
        assert_eq!(store.risk_of(&r1), Some(RiskLevel::Medium));
    }

    #[tokio::test]
    async fn downgrade_persistence_failure_is_counted() {
        let store = Arc::new(
            InMemoryRecordStore::new()
                .with_records(vec![high_risk_record(
                    "us_recall",
                    EntityType::Recall,
                    "R1",
                    "glove",
                )])
                .failing_risk_updates_for("R1"),
        );
        let engine = SmartAuditEngine::new(
            store.clone(),
            Arc::new(ScriptedJudge::new(AuditDecision::Downgrade)),
        );
        let preview = engine.preview(None, None, 10).await.unwrap();
        let result = engine.execute(&preview.items).await.unwrap();

        assert_eq!(result.failed_count, 1);
        assert_eq!(result.downgraded_count, 0);
        assert_eq!(result.items[0].applied_status, AppliedStatus::Failed);
        // The record keeps its original level.
        let r1 = RecordIdentity::new(EntityType::Recall, "R1");
        assert_eq!(store.risk_of(&r1), Some(RiskLevel::High));
    }
}
