// Two-phase audit of high-risk records: preview judges without touching the
// store, execute applies operator-approved decisions with staleness checks.

pub mod engine;
pub mod judge;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use engine::{AppliedStatus, AuditItem, SmartAuditEngine, SmartAuditResult};
pub use judge::{AuditDecision, Judge, JudgeVerdict};
