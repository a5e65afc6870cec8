//! Side-channel observation hooks.
//!
//! Core components call these after each operation; the observer is allowed
//! to fail or drop events, so correctness never rides on it.

use crate::domain::TriageResult;
use crate::telemetry::runtime_counters;

pub trait CycleObserver: Send + Sync {
    fn probe_completed(&self, _platform: &str, _reachable: bool, _healthy: bool) {}
    fn probe_served_from_cache(&self, _platform: &str) {}
    fn pass_finished(&self, _probed: usize, _reachable: usize, _capped: bool) {}
    fn breaker_opened(&self, _platform: &str, _reason: &str) {}
    fn breaker_recovered(&self, _platform: &str) {}
    fn selection_committed(&self, _session: u64, _platforms: &[String]) {}
    fn triage_completed(&self, _result: &TriageResult) {}
    fn compliance_recorded(&self, _session: u64, _compliance_pct: u8, _violation: bool) {}
}

#[derive(Debug, Default)]
pub struct NoopObserver;

impl CycleObserver for NoopObserver {}

/// Default observer: structured log line plus runtime counter per event.
#[derive(Debug, Default)]
pub struct TracingObserver;

impl CycleObserver for TracingObserver {
    fn probe_completed(&self, platform: &str, reachable: bool, healthy: bool) {
        let counters = runtime_counters();
        counters.inc_probe_issued();
        // A live probe only happens after the cache declined to answer.
        counters.inc_cache_miss();
        if reachable {
            counters.inc_probe_reachable();
        } else {
            counters.inc_probe_unreachable();
        }
        crate::rotor_event!(
            debug,
            "rotor::probe",
            "probe_completed",
            platform = platform,
            reachable = reachable,
            healthy = healthy,
        );
    }

    fn probe_served_from_cache(&self, platform: &str) {
        runtime_counters().inc_cache_hit();
        crate::rotor_event!(debug, "rotor::probe", "cache_hit", platform = platform);
    }

    fn pass_finished(&self, probed: usize, reachable: usize, capped: bool) {
        if capped {
            runtime_counters().inc_probe_pass_capped();
        }
        crate::rotor_event!(
            info,
            "rotor::probe",
            "pass_finished",
            platform = "-",
            probed = probed,
            reachable = reachable,
            capped = capped,
        );
    }

    fn breaker_opened(&self, platform: &str, reason: &str) {
        runtime_counters().inc_breaker_opened();
        crate::rotor_event!(
            warn,
            "rotor::circuit",
            "breaker_opened",
            platform = platform,
            reason = reason,
        );
    }

    fn breaker_recovered(&self, platform: &str) {
        runtime_counters().inc_breaker_recovered();
        crate::rotor_event!(info, "rotor::circuit", "breaker_recovered", platform = platform);
    }

    fn selection_committed(&self, session: u64, platforms: &[String]) {
        runtime_counters().inc_selection();
        crate::rotor_event!(
            info,
            "rotor::select",
            "selection_committed",
            platform = platforms.join(","),
            session = session,
        );
    }

    fn triage_completed(&self, result: &TriageResult) {
        runtime_counters().inc_triage_run();
        crate::rotor_event!(
            info,
            "rotor::triage",
            "triage_completed",
            platform = result.platform,
            category = result.category,
            action = result.action,
        );
    }

    fn compliance_recorded(&self, session: u64, compliance_pct: u8, violation: bool) {
        if violation {
            runtime_counters().inc_violation();
        }
        crate::rotor_event!(
            info,
            "rotor::reconcile",
            "compliance_recorded",
            platform = "-",
            session = session,
            compliance_pct = compliance_pct,
            violation = violation,
        );
    }
}
