use std::collections::BTreeSet;

use crate::keyword::{Keyword, KeywordType};

/// Immutable view of the enabled keyword set at one version. Classification
/// jobs bind one snapshot for their whole run; registry edits publish a new
/// snapshot and never touch existing ones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordSnapshot {
    version: u64,
    normal: BTreeSet<String>,
    whitelist: BTreeSet<String>,
    blacklist: BTreeSet<String>,
}

/// Which enabled keywords a text contains, after precedence: a blacklist
/// string that is also whitelisted is reported under whitelist only.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeywordMatches {
    pub normal: Vec<String>,
    pub whitelist: Vec<String>,
    pub blacklist: Vec<String>,
}

impl KeywordSnapshot {
    /// Build from enabled keywords only; texts are lowercased for matching.
    pub fn new(version: u64, keywords: &[Keyword]) -> Self {
        let mut normal = BTreeSet::new();
        let mut whitelist = BTreeSet::new();
        let mut blacklist = BTreeSet::new();
        for keyword in keywords.iter().filter(|k| k.enabled) {
            let set = match keyword.keyword_type {
                KeywordType::Normal => &mut normal,
                KeywordType::Whitelist => &mut whitelist,
                KeywordType::Blacklist => &mut blacklist,
            };
            set.insert(keyword.normalized());
        }
        Self {
            version,
            normal,
            whitelist,
            blacklist,
        }
    }

    pub fn empty(version: u64) -> Self {
        Self::new(version, &[])
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn is_empty(&self) -> bool {
        self.normal.is_empty() && self.whitelist.is_empty() && self.blacklist.is_empty()
    }

    /// Case-insensitive substring matching across all three sets.
    pub fn matches(&self, text: &str) -> KeywordMatches {
        let haystack = text.to_lowercase();
        let hits = |set: &BTreeSet<String>| -> Vec<String> {
            set.iter()
                .filter(|k| haystack.contains(k.as_str()))
                .cloned()
                .collect()
        };
        KeywordMatches {
            normal: hits(&self.normal),
            whitelist: hits(&self.whitelist),
            // Whitelist wins over a same-string blacklist entry.
            blacklist: hits(&self.blacklist)
                .into_iter()
                .filter(|k| !self.whitelist.contains(k))
                .collect(),
        }
    }

    /// Relevance verdict: some normal or whitelist hit, and no effective
    /// blacklist hit.
    pub fn is_related(&self, text: &str) -> bool {
        let matches = self.matches(text);
        (!matches.normal.is_empty() || !matches.whitelist.is_empty())
            && matches.blacklist.is_empty()
    }
}
