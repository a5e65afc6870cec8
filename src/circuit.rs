//! Circuit breaker transitions for platform probe outcomes.
//!
//! Failure accounting is reachability-only: a platform that answers with
//! 401/403 is reachable, and never trips the breaker (that is an auth
//! problem for triage, not an outage).

use crate::domain::{BreakerStatus, CircuitState};
use chrono::{DateTime, Utc};

/// Any success closes the breaker outright and resets the consecutive
/// counter; cumulative totals only ever grow.
pub fn record_success(state: &mut CircuitState, now: DateTime<Utc>) -> bool {
    let recovered = state.breaker.is_some();
    state.consecutive_failures = 0;
    state.total_successes = state.total_successes.saturating_add(1);
    state.last_success = Some(now);
    state.breaker = None;
    state.opened_at = None;
    state.open_reason = None;
    recovered
}

/// Records an unreachable probe. Returns true when this failure opened the
/// breaker (it was not already open).
pub fn record_failure(
    state: &mut CircuitState,
    error: &str,
    threshold: u32,
    now: DateTime<Utc>,
) -> bool {
    state.consecutive_failures = state.consecutive_failures.saturating_add(1);
    state.total_failures = state.total_failures.saturating_add(1);
    state.last_failure = Some(now);
    state.last_error = Some(error.to_string());

    if state.consecutive_failures >= threshold && state.breaker != Some(BreakerStatus::Open) {
        state.breaker = Some(BreakerStatus::Open);
        state.opened_at = Some(now);
        state.open_reason = Some(format!(
            "{} consecutive probe failures (last: {error})",
            state.consecutive_failures
        ));
        return true;
    }

    false
}
