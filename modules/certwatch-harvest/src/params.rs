// Crawl parameter derivation. Pure and deterministic: the orchestrator and
// external callers both derive from the same source profile so a request can
// never ask a source for more than its API will serve.

use certwatch_common::{CertwatchError, SourceProfile};

/// Sentinel for "no record ceiling" when `max_pages == 0`.
pub const UNBOUNDED_RECORDS: i64 = -1;

/// Effective crawl limits derived from a source profile and a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DerivedParams {
    /// Total record ceiling, or [`UNBOUNDED_RECORDS`].
    pub max_records: i64,
    /// Per-page fetch size, never above the source's API ceiling.
    pub effective_batch_size: u32,
}

impl DerivedParams {
    pub fn is_unbounded(&self) -> bool {
        self.max_records == UNBOUNDED_RECORDS
    }
}

/// Derive crawl limits.
///
/// `max_pages == 0` means crawl everything: no record ceiling, batch size
/// capped only by the API. Otherwise the record ceiling is
/// `max_pages * max_page_size` and the batch size is additionally capped by
/// that ceiling, so a one-page crawl of a small source fetches exactly one
/// small page.
pub fn derive(
    profile: &SourceProfile,
    max_pages: u32,
    batch_size_hint: u32,
) -> Result<DerivedParams, CertwatchError> {
    if batch_size_hint == 0 {
        return Err(CertwatchError::InvalidParameter(
            "batch_size_hint must be > 0".to_string(),
        ));
    }

    if max_pages == 0 {
        return Ok(DerivedParams {
            max_records: UNBOUNDED_RECORDS,
            effective_batch_size: batch_size_hint.min(profile.max_page_size),
        });
    }

    let max_records = (max_pages as i64)
        .checked_mul(profile.max_page_size as i64)
        .ok_or_else(|| {
            CertwatchError::InvalidParameter(format!(
                "max_records overflow: {} pages x {} per page",
                max_pages, profile.max_page_size
            ))
        })?;

    let page_cap = (profile.max_page_size as i64).min(max_records) as u32;
    let effective_batch_size = batch_size_hint.clamp(1, page_cap);

    Ok(DerivedParams {
        max_records,
        effective_batch_size,
    })
}
