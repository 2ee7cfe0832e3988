// Test doubles shared across the workspace.
//
// - InMemoryRecordStore (RecordStore) — stateful BTreeMap-backed store with
//   per-key failure injection
// - record fixtures for building IngestedRecords without ceremony

use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::Utc;

use crate::store::RecordStore;
use crate::types::{EntityType, IngestedRecord, RecordIdentity, RiskLevel, SourceId};

// ---------------------------------------------------------------------------
// InMemoryRecordStore
// ---------------------------------------------------------------------------

struct InMemoryInner {
    /// Keyed by (entity_type, natural_key) so iteration is identity-ordered.
    records: BTreeMap<(EntityType, String), IngestedRecord>,
    /// Natural keys whose upserts fail.
    failing_upserts: HashSet<String>,
    /// Natural keys whose persist_classification calls fail.
    failing_classification: HashSet<String>,
    /// Natural keys whose update_risk_level calls fail.
    failing_risk_updates: HashSet<String>,
    upsert_calls: usize,
    classification_calls: usize,
    risk_update_calls: usize,
}

/// Stateful in-memory record store. Thread-safe via interior Mutex.
/// Builder pattern: `.with_records()`, `.failing_upserts_for()`,
/// `.failing_classification_for()`, `.failing_risk_updates_for()`.
pub struct InMemoryRecordStore {
    inner: Mutex<InMemoryInner>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(InMemoryInner {
                records: BTreeMap::new(),
                failing_upserts: HashSet::new(),
                failing_classification: HashSet::new(),
                failing_risk_updates: HashSet::new(),
                upsert_calls: 0,
                classification_calls: 0,
                risk_update_calls: 0,
            }),
        }
    }

    /// Pre-populate records.
    pub fn with_records(self, records: Vec<IngestedRecord>) -> Self {
        {
            let mut inner = self.inner.lock().unwrap();
            for record in records {
                inner
                    .records
                    .insert((record.entity_type, record.natural_key.clone()), record);
            }
        }
        self
    }

    /// Make `upsert_record` fail for the given natural key.
    pub fn failing_upserts_for(self, natural_key: &str) -> Self {
        self.inner
            .lock()
            .unwrap()
            .failing_upserts
            .insert(natural_key.to_string());
        self
    }

    /// Make `persist_classification` fail for the given natural key.
    pub fn failing_classification_for(self, natural_key: &str) -> Self {
        self.inner
            .lock()
            .unwrap()
            .failing_classification
            .insert(natural_key.to_string());
        self
    }

    /// Make `update_risk_level` fail for the given natural key.
    pub fn failing_risk_updates_for(self, natural_key: &str) -> Self {
        self.inner
            .lock()
            .unwrap()
            .failing_risk_updates
            .insert(natural_key.to_string());
        self
    }

    // --- Assertion helpers ---

    pub fn record_count(&self) -> usize {
        self.inner.lock().unwrap().records.len()
    }

    pub fn record(&self, identity: &RecordIdentity) -> Option<IngestedRecord> {
        let inner = self.inner.lock().unwrap();
        inner
            .records
            .get(&(identity.entity_type, identity.entity_id.clone()))
            .cloned()
    }

    pub fn risk_of(&self, identity: &RecordIdentity) -> Option<RiskLevel> {
        self.record(identity).map(|r| r.risk_level)
    }

    pub fn related_of(&self, identity: &RecordIdentity) -> Option<Option<bool>> {
        self.record(identity).map(|r| r.related)
    }

    pub fn upsert_calls(&self) -> usize {
        self.inner.lock().unwrap().upsert_calls
    }

    pub fn classification_calls(&self) -> usize {
        self.inner.lock().unwrap().classification_calls
    }

    pub fn risk_update_calls(&self) -> usize {
        self.inner.lock().unwrap().risk_update_calls
    }

    pub fn unclassified_count(&self) -> usize {
        let inner = self.inner.lock().unwrap();
        inner
            .records
            .values()
            .filter(|r| r.related.is_none())
            .count()
    }
}

impl Default for InMemoryRecordStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn upsert_record(&self, record: &IngestedRecord) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.upsert_calls += 1;
        if inner.failing_upserts.contains(&record.natural_key) {
            bail!(
                "InMemoryRecordStore: upsert forced failure for {}",
                record.natural_key
            );
        }
        inner.records.insert(
            (record.entity_type, record.natural_key.clone()),
            record.clone(),
        );
        Ok(())
    }

    async fn find_by_identity(&self, identity: &RecordIdentity) -> Result<Option<IngestedRecord>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .records
            .get(&(identity.entity_type, identity.entity_id.clone()))
            .cloned())
    }

    async fn update_risk_level(&self, identity: &RecordIdentity, risk: RiskLevel) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.risk_update_calls += 1;
        if inner.failing_risk_updates.contains(&identity.entity_id) {
            bail!(
                "InMemoryRecordStore: risk update forced failure for {}",
                identity
            );
        }
        match inner
            .records
            .get_mut(&(identity.entity_type, identity.entity_id.clone()))
        {
            Some(record) => {
                record.risk_level = risk;
                Ok(())
            }
            None => bail!("InMemoryRecordStore: no record for {}", identity),
        }
    }

    async fn find_unclassified(
        &self,
        source_id: Option<&SourceId>,
        limit: usize,
    ) -> Result<Vec<IngestedRecord>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .records
            .values()
            .filter(|r| r.related.is_none())
            .filter(|r| source_id.is_none_or(|id| &r.source_id == id))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn reset_classification(&self, source_id: Option<&SourceId>) -> Result<u64> {
        let mut inner = self.inner.lock().unwrap();
        let mut reset = 0u64;
        for record in inner.records.values_mut() {
            if source_id.is_none_or(|id| &record.source_id == id) && record.related.is_some() {
                record.related = None;
                record.keyword_matched = false;
                reset += 1;
            }
        }
        Ok(reset)
    }

    async fn persist_classification(&self, identity: &RecordIdentity, related: bool) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.classification_calls += 1;
        if inner.failing_classification.contains(&identity.entity_id) {
            bail!(
                "InMemoryRecordStore: classification forced failure for {}",
                identity
            );
        }
        match inner
            .records
            .get_mut(&(identity.entity_type, identity.entity_id.clone()))
        {
            Some(record) => {
                record.related = Some(related);
                // Processed flag, not the outcome: set for both verdicts.
                record.keyword_matched = true;
                Ok(())
            }
            None => bail!("InMemoryRecordStore: no record for {}", identity),
        }
    }

    async fn find_high_risk(
        &self,
        entity_type: Option<EntityType>,
        country: Option<&str>,
        limit: usize,
    ) -> Result<Vec<IngestedRecord>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .records
            .values()
            .filter(|r| r.risk_level == RiskLevel::High)
            .filter(|r| entity_type.is_none_or(|t| r.entity_type == t))
            .filter(|r| country.is_none_or(|c| r.country == c))
            .take(limit)
            .cloned()
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Record fixtures
// ---------------------------------------------------------------------------

/// Minimal record with sensible defaults. Unclassified, medium risk.
pub fn record(source_id: &str, entity_type: EntityType, natural_key: &str) -> IngestedRecord {
    IngestedRecord {
        source_id: SourceId::new(source_id),
        natural_key: natural_key.to_string(),
        entity_type,
        title: format!("Record {natural_key}"),
        summary: String::new(),
        product: String::new(),
        country: "US".to_string(),
        related: None,
        keyword_matched: false,
        risk_level: RiskLevel::Medium,
        ingested_at: Utc::now(),
    }
}

/// Record whose title contains the given text, for keyword match tests.
pub fn record_titled(
    source_id: &str,
    entity_type: EntityType,
    natural_key: &str,
    title: &str,
) -> IngestedRecord {
    IngestedRecord {
        title: title.to_string(),
        ..record(source_id, entity_type, natural_key)
    }
}

/// High-risk record flagged by classification, for audit tests.
pub fn high_risk_record(
    source_id: &str,
    entity_type: EntityType,
    natural_key: &str,
    product: &str,
) -> IngestedRecord {
    IngestedRecord {
        product: product.to_string(),
        related: Some(true),
        keyword_matched: true,
        risk_level: RiskLevel::High,
        ..record(source_id, entity_type, natural_key)
    }
}

// ---------------------------------------------------------------------------
// InMemoryRecordStore self-tests
// ---------------------------------------------------------------------------
