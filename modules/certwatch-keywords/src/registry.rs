use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use tracing::info;

use certwatch_common::CertwatchError;

use crate::keyword::{Keyword, KeywordType};
use crate::snapshot::KeywordSnapshot;

struct RegistryInner {
    /// Keyed by (type, lowercased text) — uniqueness is per type, so the
    /// same string may live in whitelist and blacklist at once.
    keywords: BTreeMap<(KeywordType, String), Keyword>,
    snapshot: Arc<KeywordSnapshot>,
}

/// Mutable keyword set. Every mutation validates, bumps the version, and
/// publishes a fresh immutable snapshot; readers holding an older snapshot
/// keep it until their job finishes.
pub struct KeywordRegistry {
    inner: RwLock<RegistryInner>,
}

impl KeywordRegistry {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(RegistryInner {
                keywords: BTreeMap::new(),
                snapshot: Arc::new(KeywordSnapshot::empty(0)),
            }),
        }
    }

    /// Current snapshot. Cheap: hands out the published `Arc`.
    pub fn snapshot(&self) -> Arc<KeywordSnapshot> {
        self.inner.read().unwrap().snapshot.clone()
    }

    /// Add one keyword. Text must be non-empty after trimming and unique
    /// (case-insensitive) within its type.
    pub fn add(&self, text: &str, keyword_type: KeywordType) -> Result<(), CertwatchError> {
        let keyword = validated(text, keyword_type)?;
        let mut inner = self.inner.write().unwrap();
        let key = (keyword_type, keyword.normalized());
        if inner.keywords.contains_key(&key) {
            return Err(CertwatchError::DuplicateKeyword(format!(
                "{} ({})",
                keyword.text, keyword_type
            )));
        }
        inner.keywords.insert(key, keyword);
        publish(&mut inner);
        Ok(())
    }

    /// Batch insert, skipping duplicates instead of failing. Returns how
    /// many were actually added.
    pub fn add_many(
        &self,
        texts: &[&str],
        keyword_type: KeywordType,
    ) -> Result<usize, CertwatchError> {
        let mut inner = self.inner.write().unwrap();
        let mut added = 0usize;
        for text in texts {
            let keyword = validated(text, keyword_type)?;
            let key = (keyword_type, keyword.normalized());
            if inner.keywords.contains_key(&key) {
                continue;
            }
            inner.keywords.insert(key, keyword);
            added += 1;
        }
        if added > 0 {
            publish(&mut inner);
        }
        Ok(added)
    }

    /// Rename a keyword in place, keeping its enabled flag.
    pub fn update(
        &self,
        keyword_type: KeywordType,
        text: &str,
        new_text: &str,
    ) -> Result<(), CertwatchError> {
        let replacement = validated(new_text, keyword_type)?;
        let mut inner = self.inner.write().unwrap();
        let old_key = (keyword_type, text.trim().to_lowercase());
        let new_key = (keyword_type, replacement.normalized());
        if old_key != new_key && inner.keywords.contains_key(&new_key) {
            return Err(CertwatchError::DuplicateKeyword(format!(
                "{} ({})",
                replacement.text, keyword_type
            )));
        }
        let Some(existing) = inner.keywords.remove(&old_key) else {
            return Err(CertwatchError::InvalidParameter(format!(
                "no such keyword: {text} ({keyword_type})"
            )));
        };
        inner.keywords.insert(
            new_key,
            Keyword {
                enabled: existing.enabled,
                ..replacement
            },
        );
        publish(&mut inner);
        Ok(())
    }

    pub fn remove(&self, keyword_type: KeywordType, text: &str) -> Result<(), CertwatchError> {
        let mut inner = self.inner.write().unwrap();
        let key = (keyword_type, text.trim().to_lowercase());
        if inner.keywords.remove(&key).is_none() {
            return Err(CertwatchError::InvalidParameter(format!(
                "no such keyword: {text} ({keyword_type})"
            )));
        }
        publish(&mut inner);
        Ok(())
    }

    pub fn set_enabled(
        &self,
        keyword_type: KeywordType,
        text: &str,
        enabled: bool,
    ) -> Result<(), CertwatchError> {
        let mut inner = self.inner.write().unwrap();
        let key = (keyword_type, text.trim().to_lowercase());
        let Some(keyword) = inner.keywords.get_mut(&key) else {
            return Err(CertwatchError::InvalidParameter(format!(
                "no such keyword: {text} ({keyword_type})"
            )));
        };
        if keyword.enabled == enabled {
            return Ok(());
        }
        keyword.enabled = enabled;
        publish(&mut inner);
        Ok(())
    }

    /// Keywords of one type, registry order (normalized text).
    pub fn keywords(&self, keyword_type: KeywordType) -> Vec<Keyword> {
        let inner = self.inner.read().unwrap();
        inner
            .keywords
            .iter()
            .filter(|((kind, _), _)| *kind == keyword_type)
            .map(|(_, keyword)| keyword.clone())
            .collect()
    }

    /// Recount how many of the given texts each keyword hits, store the
    /// counts, and publish. Derived data only; match semantics ignore it.
    pub fn recompute_match_counts(&self, texts: &[String]) {
        let lowered: Vec<String> = texts.iter().map(|t| t.to_lowercase()).collect();
        let mut inner = self.inner.write().unwrap();
        for ((_, normalized), keyword) in inner.keywords.iter_mut() {
            keyword.match_count = lowered
                .iter()
                .filter(|text| text.contains(normalized.as_str()))
                .count() as u64;
        }
        publish(&mut inner);
        info!(texts = texts.len(), "Recomputed keyword match counts");
    }
}

impl Default for KeywordRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn validated(text: &str, keyword_type: KeywordType) -> Result<Keyword, CertwatchError> {
    let keyword = Keyword::new(text, keyword_type);
    if keyword.text.is_empty() {
        return Err(CertwatchError::InvalidParameter(
            "keyword text must be non-empty".to_string(),
        ));
    }
    Ok(keyword)
}

fn publish(inner: &mut RegistryInner) {
    let keywords: Vec<Keyword> = inner.keywords.values().cloned().collect();
    let version = inner.snapshot.version() + 1;
    inner.snapshot = Arc::new(KeywordSnapshot::new(version, &keywords));
}
