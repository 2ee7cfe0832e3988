use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use certwatch_common::{CertwatchError, RecordIdentity, RecordStore, SourceId};

use crate::registry::KeywordRegistry;

/// Outcome of one classification job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifyReport {
    pub total_processed: u64,
    pub related_count: u64,
    pub not_related_count: u64,
    pub failed_count: u64,
    pub duration_millis: u64,
    /// Which keyword rules the whole job ran under.
    pub snapshot_version: u64,
}

impl fmt::Display for ClassifyReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "classified {} records (v{}): {} related, {} not related, {} failed ({}ms)",
            self.total_processed,
            self.snapshot_version,
            self.related_count,
            self.not_related_count,
            self.failed_count,
            self.duration_millis
        )
    }
}

/// Batch relevance classifier. Pulls unclassified records from the store in
/// batches, judges each against one bound snapshot, and persists per record.
pub struct KeywordClassifier {
    store: Arc<dyn RecordStore>,
    registry: Arc<KeywordRegistry>,
}

impl KeywordClassifier {
    pub fn new(store: Arc<dyn RecordStore>, registry: Arc<KeywordRegistry>) -> Self {
        Self { store, registry }
    }

    /// Classify every unclassified record, optionally scoped to one source.
    /// `force` clears previous outcomes for the scope first. Re-running
    /// without `force` is a no-op. One record's persistence failure is
    /// counted and never stops the batch.
    pub async fn classify_unprocessed(
        &self,
        scope: Option<SourceId>,
        batch_size: u32,
        force: bool,
    ) -> Result<ClassifyReport, CertwatchError> {
        if batch_size == 0 {
            return Err(CertwatchError::InvalidParameter(
                "batch_size must be > 0".to_string(),
            ));
        }

        // One snapshot for the whole job; registry edits mid-run don't mix rules.
        let snapshot = self.registry.snapshot();
        let started = Instant::now();

        if force {
            let reset = self
                .store
                .reset_classification(scope.as_ref())
                .await
                .map_err(|e| CertwatchError::Persistence(e.to_string()))?;
            info!(reset, "Cleared previous classification outcomes");
        }

        let mut report = ClassifyReport {
            total_processed: 0,
            related_count: 0,
            not_related_count: 0,
            failed_count: 0,
            duration_millis: 0,
            snapshot_version: snapshot.version(),
        };
        // Records whose persist failed stay unclassified in the store;
        // remembering them keeps the batch loop from refetching forever.
        let mut failed_keys: HashSet<RecordIdentity> = HashSet::new();

        loop {
            // Failed records come back at the head of the identity-ordered
            // query, so widen the window by their count to reach past them.
            let limit = batch_size as usize + failed_keys.len();
            let batch = self
                .store
                .find_unclassified(scope.as_ref(), limit)
                .await
                .map_err(|e| CertwatchError::Persistence(e.to_string()))?;
            let fresh: Vec<_> = batch
                .into_iter()
                .filter(|r| !failed_keys.contains(&r.identity()))
                .collect();
            if fresh.is_empty() {
                break;
            }

            for record in fresh {
                let related = snapshot.is_related(&record.search_text());
                match self
                    .store
                    .persist_classification(&record.identity(), related)
                    .await
                {
                    Ok(()) => {
                        report.total_processed += 1;
                        if related {
                            report.related_count += 1;
                        } else {
                            report.not_related_count += 1;
                        }
                    }
                    Err(err) => {
                        warn!(
                            identity = %record.identity(),
                            error = %err,
                            "Failed to persist classification"
                        );
                        report.failed_count += 1;
                        failed_keys.insert(record.identity());
                    }
                }
            }
        }

        report.duration_millis = started.elapsed().as_millis() as u64;
        info!(snapshot_version = report.snapshot_version, "{report}");
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use certwatch_common::testing::{record_titled, InMemoryRecordStore};
    use certwatch_common::EntityType;

    use crate::keyword::KeywordType;

    fn registry() -> Arc<KeywordRegistry> {
        let registry = KeywordRegistry::new();
        registry.add("implant", KeywordType::Normal).unwrap();
        registry.add("veterinary", KeywordType::Blacklist).unwrap();
        Arc::new(registry)
    }

    fn classifier(store: Arc<InMemoryRecordStore>) -> KeywordClassifier {
        KeywordClassifier::new(store, registry())
    }

    #[tokio::test]
    async fn zero_batch_size_is_rejected() {
        let store = Arc::new(InMemoryRecordStore::new());
        let err = classifier(store)
            .classify_unprocessed(None, 0, false)
            .await
            .unwrap_err();
        assert!(matches!(err, CertwatchError::InvalidParameter(_)));
    }

    #[tokio::test]
    async fn classifies_against_title_and_persists_outcomes() {
        let store = Arc::new(InMemoryRecordStore::new().with_records(vec![
            record_titled("us_510k", EntityType::Application, "K1", "Titanium implant"),
            record_titled("us_510k", EntityType::Application, "K2", "Blood glucose strips"),
            record_titled("us_510k", EntityType::Application, "K3", "veterinary implant kit"),
        ]));

        let report = classifier(store.clone())
            .classify_unprocessed(None, 2, false)
            .await
            .unwrap();

        assert_eq!(report.total_processed, 3);
        assert_eq!(report.related_count, 1);
        assert_eq!(report.not_related_count, 2);
        assert_eq!(report.failed_count, 0);
        assert_eq!(report.snapshot_version, 2);
        assert_eq!(store.unclassified_count(), 0);

        let k1 = record_titled("us_510k", EntityType::Application, "K1", "").identity();
        assert_eq!(store.related_of(&k1), Some(Some(true)));
        let k3 = record_titled("us_510k", EntityType::Application, "K3", "").identity();
        assert_eq!(store.related_of(&k3), Some(Some(false)));
    }

    #[tokio::test]
    async fn both_verdicts_mark_the_record_processed() {
        let store = Arc::new(InMemoryRecordStore::new().with_records(vec![
            record_titled("us_510k", EntityType::Application, "K1", "Titanium implant"),
            record_titled("us_510k", EntityType::Application, "K2", "Blood glucose strips"),
        ]));

        classifier(store.clone())
            .classify_unprocessed(None, 10, false)
            .await
            .unwrap();

        // The processing flag records that classification ran, independent
        // of the outcome.
        let related = record_titled("us_510k", EntityType::Application, "K1", "").identity();
        let not_related = record_titled("us_510k", EntityType::Application, "K2", "").identity();
        assert!(store.record(&related).unwrap().keyword_matched);
        assert!(store.record(&not_related).unwrap().keyword_matched);
        assert_eq!(store.record(&not_related).unwrap().related, Some(false));
    }

    #[tokio::test]
    async fn rerun_without_force_is_a_noop() {
        let store = Arc::new(InMemoryRecordStore::new().with_records(vec![record_titled(
            "us_510k",
            EntityType::Application,
            "K1",
            "Titanium implant",
        )]));
        let classifier = classifier(store.clone());

        let first = classifier.classify_unprocessed(None, 10, false).await.unwrap();
        assert_eq!(first.total_processed, 1);

        let second = classifier.classify_unprocessed(None, 10, false).await.unwrap();
        assert_eq!(second.total_processed, 0);
        // Only the first run wrote anything.
        assert_eq!(store.classification_calls(), 1);
    }

    #[tokio::test]
    async fn force_reclassifies_under_the_current_snapshot() {
        let store = Arc::new(InMemoryRecordStore::new().with_records(vec![record_titled(
            "us_510k",
            EntityType::Application,
            "K1",
            "coronary stent",
        )]));
        let registry = Arc::new(KeywordRegistry::new());
        registry.add("implant", KeywordType::Normal).unwrap();
        let classifier = KeywordClassifier::new(store.clone(), registry.clone());

        let first = classifier.classify_unprocessed(None, 10, false).await.unwrap();
        assert_eq!(first.related_count, 0);

        // New rule; a forced re-run applies it.
        registry.add("stent", KeywordType::Normal).unwrap();
        let second = classifier.classify_unprocessed(None, 10, true).await.unwrap();
        assert_eq!(second.total_processed, 1);
        assert_eq!(second.related_count, 1);
        assert!(second.snapshot_version > first.snapshot_version);
    }

    #[tokio::test]
    async fn scope_limits_the_job_to_one_source() {
        let store = Arc::new(InMemoryRecordStore::new().with_records(vec![
            record_titled("us_510k", EntityType::Application, "K1", "implant"),
            record_titled("eu_recall", EntityType::Recall, "R1", "implant"),
        ]));

        let report = classifier(store.clone())
            .classify_unprocessed(Some(SourceId::new("eu_recall")), 10, false)
            .await
            .unwrap();
        assert_eq!(report.total_processed, 1);
        assert_eq!(store.unclassified_count(), 1);
    }

    #[tokio::test]
    async fn persist_failure_is_counted_and_does_not_loop() {
        let store = Arc::new(
            InMemoryRecordStore::new()
                .with_records(vec![
                    record_titled("us_510k", EntityType::Application, "K1", "implant"),
                    record_titled("us_510k", EntityType::Application, "K2", "implant"),
                ])
                .failing_classification_for("K1"),
        );

        let report = classifier(store.clone())
            .classify_unprocessed(None, 1, false)
            .await
            .unwrap();

        assert_eq!(report.total_processed, 1);
        assert_eq!(report.failed_count, 1);
        // K1 stays unclassified in the store; the job still terminated.
        assert_eq!(store.unclassified_count(), 1);
    }
}
