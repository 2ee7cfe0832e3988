use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::OwnedMutexGuard;

use certwatch_common::{CertwatchError, SourceId};

/// Per-source run exclusion. Two crawls of the same source can never
/// overlap; different sources proceed in parallel. Guards are owned so a
/// run can hold one across await points for its whole duration.
#[derive(Default)]
pub struct SourceLocks {
    inner: Mutex<HashMap<SourceId, Arc<tokio::sync::Mutex<()>>>>,
}

impl SourceLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, source_id: &SourceId) -> Arc<tokio::sync::Mutex<()>> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .entry(source_id.clone())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Wait for the source to be free, then hold it.
    pub async fn acquire(&self, source_id: &SourceId) -> OwnedMutexGuard<()> {
        self.entry(source_id).lock_owned().await
    }

    /// Hold the source if free, otherwise fail fast with `SourceBusy`.
    pub fn try_acquire(&self, source_id: &SourceId) -> Result<OwnedMutexGuard<()>, CertwatchError> {
        self.entry(source_id)
            .try_lock_owned()
            .map_err(|_| CertwatchError::SourceBusy(source_id.to_string()))
    }
}
