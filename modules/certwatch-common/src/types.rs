use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Source identity and profiles
// ---------------------------------------------------------------------------

/// Identifier of one external data source (lowercase, trimmed).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SourceId(String);

impl SourceId {
    pub fn new(raw: &str) -> Self {
        Self(raw.trim().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SourceId {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

/// Static per-source crawl limits. Each upstream API enforces its own page
/// size ceiling; everything downstream derives from these numbers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceProfile {
    pub source_id: SourceId,
    /// Largest page the upstream API will serve. Always > 0.
    pub max_page_size: u32,
    /// Batch size used when the caller gives no hint.
    pub default_batch_size: u32,
}

impl SourceProfile {
    pub fn new(source_id: &str, max_page_size: u32, default_batch_size: u32) -> Self {
        assert!(max_page_size > 0, "max_page_size must be > 0");
        Self {
            source_id: SourceId::new(source_id),
            max_page_size,
            default_batch_size,
        }
    }
}

/// Built-in profiles for the monitored regulatory sources and their
/// published (or observed) page-size ceilings.
pub fn source_registry() -> Vec<SourceProfile> {
    vec![
        SourceProfile::new("us_510k", 100, 50),
        SourceProfile::new("us_recall", 100, 50),
        SourceProfile::new("us_event", 100, 50),
        SourceProfile::new("us_registration", 100, 50),
        SourceProfile::new("us_customs", 50, 25),
        SourceProfile::new("eu_recall", 50, 25),
        SourceProfile::new("eu_registration", 50, 25),
        SourceProfile::new("eu_guidance", 25, 25),
        SourceProfile::new("cert_news", 20, 20),
    ]
}

/// Look up a built-in profile by source id.
pub fn source_profile(source_id: &SourceId) -> Option<SourceProfile> {
    source_registry()
        .into_iter()
        .find(|p| &p.source_id == source_id)
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// Kind of regulatory record a source produces.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Registration,
    Application,
    Recall,
    AdverseEvent,
    Guidance,
    CustomsCase,
    CertNews,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Registration => "registration",
            EntityType::Application => "application",
            EntityType::Recall => "recall",
            EntityType::AdverseEvent => "adverse_event",
            EntityType::Guidance => "guidance",
            EntityType::CustomsCase => "customs_case",
            EntityType::CertNews => "cert_news",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    High,
    Medium,
    Low,
    None,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RiskLevel::High => "high",
            RiskLevel::Medium => "medium",
            RiskLevel::Low => "low",
            RiskLevel::None => "none",
        };
        f.write_str(s)
    }
}

/// Identity used by audit and store lookups: the record kind plus the
/// source-assigned natural key. Orderable so batches sort stably.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordIdentity {
    pub entity_type: EntityType,
    pub entity_id: String,
}

impl RecordIdentity {
    pub fn new(entity_type: EntityType, entity_id: impl Into<String>) -> Self {
        Self {
            entity_type,
            entity_id: entity_id.into(),
        }
    }
}

impl fmt::Display for RecordIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.entity_type, self.entity_id)
    }
}

/// A record as delivered by a source adapter, before ingestion stamps it
/// with its source and processing flags.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawRecord {
    pub natural_key: String,
    pub entity_type: EntityType,
    pub title: String,
    pub summary: String,
    pub product: String,
    pub country: String,
    pub risk_level: RiskLevel,
}

impl RawRecord {
    /// Stamp the raw record with its source; classification flags start clear.
    pub fn into_record(self, source_id: &SourceId) -> IngestedRecord {
        IngestedRecord {
            source_id: source_id.clone(),
            natural_key: self.natural_key,
            entity_type: self.entity_type,
            title: self.title,
            summary: self.summary,
            product: self.product,
            country: self.country,
            related: None,
            keyword_matched: false,
            risk_level: self.risk_level,
            ingested_at: Utc::now(),
        }
    }
}

/// A persisted regulatory record. Owned by the external store; this core
/// reads it, classifies it, and may lower its risk level via audit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestedRecord {
    pub source_id: SourceId,
    pub natural_key: String,
    pub entity_type: EntityType,
    pub title: String,
    pub summary: String,
    pub product: String,
    pub country: String,
    /// Outcome of keyword classification; `None` until first classified.
    pub related: Option<bool>,
    /// Set once classification has run for this record.
    pub keyword_matched: bool,
    pub risk_level: RiskLevel,
    pub ingested_at: DateTime<Utc>,
}

impl IngestedRecord {
    pub fn identity(&self) -> RecordIdentity {
        RecordIdentity::new(self.entity_type, self.natural_key.clone())
    }

    /// Union of the free-text fields keyword matching runs against.
    pub fn search_text(&self) -> String {
        let mut text = String::new();
        for field in [&self.title, &self.summary, &self.product, &self.country] {
            if !field.is_empty() {
                text.push_str(field);
                text.push(' ');
            }
        }
        text
    }
}
