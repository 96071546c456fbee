// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Exponential backoff with jitter for reconnect attempts.

use std::time::Duration;

use tracing::{debug, warn};

use thermopool_core::config::ReconnectConfig;

/// Result of evaluating whether to try again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Try again after this delay.
    RetryAfter(Duration),
    /// Maximum attempts used up.
    Exhausted,
}

/// Decide what to do before attempt number `attempt` (0-based).
pub fn should_retry(attempt: u32, config: &ReconnectConfig) -> RetryDecision {
    if attempt >= config.max_attempts {
        warn!(attempt, max = config.max_attempts, "reconnect attempts exhausted");
        return RetryDecision::Exhausted;
    }
    let delay = compute_delay(attempt, config);
    debug!(attempt, delay_ms = delay.as_millis() as u64, "scheduling reconnect");
    RetryDecision::RetryAfter(delay)
}

/// delay = min(base * 2^attempt + jitter, max_delay), jitter in [0, base).
pub fn compute_delay(attempt: u32, config: &ReconnectConfig) -> Duration {
    let base_ms = config.base_delay_ms;
    let exp_ms = base_ms.saturating_mul(1u64 << attempt.min(10));
    let total_ms = exp_ms.saturating_add(jitter(base_ms, attempt));
    Duration::from_millis(total_ms.min(config.max_delay_ms))
}

/// Deterministic spread across [0, base) so simultaneous reconnect loops do
/// not fire in lockstep.
fn jitter(base_ms: u64, attempt: u32) -> u64 {
    let hash = (attempt as u64).wrapping_mul(6364136223846793005);
    hash % base_ms.max(1)
}
