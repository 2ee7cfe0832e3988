use std::fmt;

use serde::{Deserialize, Serialize};

/// How a keyword bears on relevance.
///
/// Normal and Whitelist both mark a record related; Blacklist vetoes unless
/// the same string is also an enabled whitelist entry (whitelist wins).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum KeywordType {
    Normal,
    Whitelist,
    Blacklist,
}

impl fmt::Display for KeywordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            KeywordType::Normal => "normal",
            KeywordType::Whitelist => "whitelist",
            KeywordType::Blacklist => "blacklist",
        };
        f.write_str(s)
    }
}

/// One registry entry. `text` is stored as given (trimmed); matching is
/// case-insensitive. `match_count` is derived and only refreshed by
/// `KeywordRegistry::recompute_match_counts`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Keyword {
    pub text: String,
    pub keyword_type: KeywordType,
    pub enabled: bool,
    pub match_count: u64,
}

impl Keyword {
    pub fn new(text: &str, keyword_type: KeywordType) -> Self {
        Self {
            text: text.trim().to_string(),
            keyword_type,
            enabled: true,
            match_count: 0,
        }
    }

    pub fn normalized(&self) -> String {
        self.text.to_lowercase()
    }
}
