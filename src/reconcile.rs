//! Mandate/trace reconciliation.
//!
//! After a session, compares what the selector mandated against what the
//! engagement trace says actually happened. A mandate platform counts as
//! covered when it was engaged or when the trace documents a skip with a
//! reason. Anything else is a violation.

use crate::config::ComplianceConfig;
use crate::domain::{ComplianceRecord, ComplianceState, FollowUp, Mandate, Trace};
use crate::observe::CycleObserver;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

const ESCALATION_KIND: &str = "compliance-escalation";

#[derive(Clone, Debug, Serialize)]
pub struct ReconcileOutcome {
    pub session: u64,
    pub compliance_pct: u8,
    /// Mandate platforms the trace shows were engaged.
    pub engaged: Vec<String>,
    /// Mandate platforms skipped with a documented reason.
    pub documented_skips: Vec<String>,
    /// Mandate platforms neither engaged nor documented.
    pub missing: Vec<String>,
    pub violation: bool,
    pub escalated: bool,
    /// This session was reconciled before; nothing was mutated.
    pub already_recorded: bool,
}

pub struct Reconciler {
    config: ComplianceConfig,
    observer: Arc<dyn CycleObserver>,
}

impl Reconciler {
    pub fn new(config: ComplianceConfig, observer: Arc<dyn CycleObserver>) -> Self {
        Self { config, observer }
    }

    /// Reconciles one session. Mutates the compliance state, and appends an
    /// escalation follow-up to the trace when the violation streak reaches
    /// the threshold. Reconciling the same session twice is a no-op beyond
    /// recomputing the report.
    pub fn reconcile(
        &self,
        mandate: &Mandate,
        trace: &mut Trace,
        state: &mut ComplianceState,
        now: DateTime<Utc>,
    ) -> ReconcileOutcome {
        let mut outcome = assess(mandate, trace);

        if state.record_for(mandate.session).is_some() {
            outcome.already_recorded = true;
            return outcome;
        }

        if outcome.violation {
            state.consecutive_violations += 1;
        } else {
            state.consecutive_violations = 0;
        }

        state.history.push(ComplianceRecord {
            session: mandate.session,
            compliance_pct: outcome.compliance_pct,
            violation: outcome.violation,
            recorded_at: now,
        });
        if state.history.len() > self.config.history_cap {
            let overflow = state.history.len() - self.config.history_cap;
            state.history.drain(..overflow);
        }

        if state.consecutive_violations >= self.config.escalation_threshold
            && !trace.follow_ups.iter().any(|f| f.kind == ESCALATION_KIND)
        {
            trace.follow_ups.push(FollowUp {
                kind: ESCALATION_KIND.to_string(),
                message: format!(
                    "{} consecutive sessions under full mandate compliance (latest {}%, missing: {})",
                    state.consecutive_violations,
                    outcome.compliance_pct,
                    if outcome.missing.is_empty() {
                        "-".to_string()
                    } else {
                        outcome.missing.join(", ")
                    },
                ),
                created_at: now,
            });
            outcome.escalated = true;
        }

        self.observer.compliance_recorded(
            mandate.session,
            outcome.compliance_pct,
            outcome.violation,
        );

        outcome
    }
}

/// Pure coverage math, shared by the real reconcile path and dry reporting.
fn assess(mandate: &Mandate, trace: &Trace) -> ReconcileOutcome {
    let mut engaged = Vec::new();
    let mut documented_skips = Vec::new();
    let mut missing = Vec::new();

    for platform in &mandate.platforms {
        if trace.platforms_engaged.iter().any(|p| p == platform) {
            engaged.push(platform.clone());
        } else if trace
            .skipped_platforms
            .iter()
            .any(|s| &s.platform == platform && !s.reason.trim().is_empty())
        {
            documented_skips.push(platform.clone());
        } else {
            missing.push(platform.clone());
        }
    }

    // An empty mandate has nothing to violate.
    let compliance_pct = if mandate.platforms.is_empty() {
        100
    } else {
        let covered = engaged.len() + documented_skips.len();
        ((covered * 100) / mandate.platforms.len()) as u8
    };

    ReconcileOutcome {
        session: mandate.session,
        compliance_pct,
        engaged,
        documented_skips,
        missing,
        violation: compliance_pct < 100,
        escalated: false,
        already_recorded: false,
    }
}
