use anyhow::Result;
use async_trait::async_trait;

use crate::types::{EntityType, IngestedRecord, RecordIdentity, RiskLevel, SourceId};

/// Persistence boundary for ingested records. The crawl loop upserts through
/// it, the classifier reads and writes classification state, and the audit
/// engine re-reads records and lowers risk levels.
///
/// Implementations must keep `find_unclassified` and `find_high_risk`
/// ordered by record identity so batch processing is deterministic.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert or replace a record keyed by its identity.
    async fn upsert_record(&self, record: &IngestedRecord) -> Result<()>;

    async fn find_by_identity(&self, identity: &RecordIdentity) -> Result<Option<IngestedRecord>>;

    /// Set the risk level of an existing record. Missing records are an error.
    async fn update_risk_level(&self, identity: &RecordIdentity, risk: RiskLevel) -> Result<()>;

    /// Records with no classification outcome yet, identity-ordered,
    /// optionally scoped to one source. At most `limit` records.
    async fn find_unclassified(
        &self,
        source_id: Option<&SourceId>,
        limit: usize,
    ) -> Result<Vec<IngestedRecord>>;

    /// Clear classification state so records are picked up again.
    /// Returns how many records were reset.
    async fn reset_classification(&self, source_id: Option<&SourceId>) -> Result<u64>;

    /// Record a classification outcome and mark the record processed.
    async fn persist_classification(&self, identity: &RecordIdentity, related: bool) -> Result<()>;

    /// High-risk records, identity-ordered, optionally filtered by record
    /// kind and country. At most `limit` records.
    async fn find_high_risk(
        &self,
        entity_type: Option<EntityType>,
        country: Option<&str>,
        limit: usize,
    ) -> Result<Vec<IngestedRecord>>;
}
