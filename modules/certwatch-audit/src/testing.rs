// Test double for the Judge boundary. Default verdict plus per-key
// overrides, failure injection, and a delay switch for timeout tests.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;

use certwatch_common::IngestedRecord;

use crate::judge::{AuditDecision, Judge, JudgeVerdict};

/// Judge scripted by natural key. Builder pattern: `.downgrading()`,
/// `.failing_for()`, `.slow_for()`.
pub struct ScriptedJudge {
    default_decision: AuditDecision,
    decisions: HashMap<String, AuditDecision>,
    failing: HashSet<String>,
    delays: HashMap<String, Duration>,
    calls: Mutex<usize>,
}

impl ScriptedJudge {
    pub fn new(default_decision: AuditDecision) -> Self {
        Self {
            default_decision,
            decisions: HashMap::new(),
            failing: HashSet::new(),
            delays: HashMap::new(),
            calls: Mutex::new(0),
        }
    }

    /// Downgrade the record with this natural key.
    pub fn downgrading(mut self, natural_key: &str) -> Self {
        self.decisions
            .insert(natural_key.to_string(), AuditDecision::Downgrade);
        self
    }

    /// Fail evaluation for this natural key.
    pub fn failing_for(mut self, natural_key: &str) -> Self {
        self.failing.insert(natural_key.to_string());
        self
    }

    /// Delay evaluation of this natural key (for timeout tests).
    pub fn slow_for(mut self, natural_key: &str, delay: Duration) -> Self {
        self.delays.insert(natural_key.to_string(), delay);
        self
    }

    pub fn evaluate_calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl Judge for ScriptedJudge {
    async fn evaluate(&self, record: &IngestedRecord) -> Result<JudgeVerdict> {
        *self.calls.lock().unwrap() += 1;
        if let Some(delay) = self.delays.get(&record.natural_key) {
            tokio::time::sleep(*delay).await;
        }
        if self.failing.contains(&record.natural_key) {
            bail!("ScriptedJudge: forced failure for {}", record.natural_key);
        }
        let decision = self
            .decisions
            .get(&record.natural_key)
            .copied()
            .unwrap_or(self.default_decision);
        Ok(JudgeVerdict {
            decision,
            rationale: format!("scripted verdict for {}", record.natural_key),
        })
    }
}
