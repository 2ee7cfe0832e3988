use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use certwatch_common::IngestedRecord;

/// What should happen to a high-risk record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditDecision {
    /// The high risk level is warranted.
    Keep,
    /// False positive; lower the risk level.
    Downgrade,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JudgeVerdict {
    pub decision: AuditDecision,
    pub rationale: String,
}

/// The judgment heuristic behind the audit. Implementations decide how
/// (model call, rules, a human queue); the engine only sees verdicts.
#[async_trait]
pub trait Judge: Send + Sync {
    async fn evaluate(&self, record: &IngestedRecord) -> Result<JudgeVerdict>;
}
