//! Iteration budget for the controller loop guard.

use crate::core::plan::MAX_RETRIES;

/// Loop guard bound for a plan of `plan_len` steps.
///
/// Every step may execute `1 + MAX_RETRIES` times and the finalizing selection
/// takes one more iteration; the configured cap wins when it is smaller.
pub fn max_iters(plan_len: usize, configured: u32) -> u32 {
    let len = u32::try_from(plan_len).unwrap_or(u32::MAX);
    let natural = len
        .saturating_mul(1 + MAX_RETRIES)
        .saturating_add(1);
    natural.min(configured)
}
