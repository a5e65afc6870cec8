//! Platform picker: eligibility filtering, multiplicative weight scoring
//! and weighted sampling without replacement.

use crate::cache::LivenessCache;
use crate::config::SelectionConfig;
use crate::domain::{Mandate, PlatformStatus, Registry};
use crate::error::Result;
use crate::scoring::{MentionState, PlatformScore};
use crate::store::CircuitMap;
use chrono::Utc;
use rand::Rng;
use serde::Serialize;
use std::collections::HashMap;

#[derive(Clone, Debug, Default)]
pub struct SelectionRequest {
    pub session: u64,
    pub count: Option<usize>,
    pub exclude: Vec<String>,
    pub require: Vec<String>,
    /// Commit mode updates registry recency and expects the caller to
    /// persist the returned mandate; otherwise the pick is advisory.
    pub commit: bool,
}

#[derive(Clone, Debug, Serialize)]
pub struct SelectionOutcome {
    pub session: u64,
    pub selected: Vec<String>,
    /// Platforms included because they have never been probed; the caller
    /// routes first-contact probing duty to these.
    pub first_contact: Vec<String>,
    pub warnings: Vec<String>,
    /// Final weight per sampled candidate, for inspection output.
    pub weights: Vec<(String, u64)>,
}

impl SelectionOutcome {
    pub fn mandate(&self) -> Mandate {
        Mandate {
            session: self.session,
            platforms: self.selected.clone(),
            created_at: Utc::now(),
        }
    }
}

pub struct Selector {
    config: SelectionConfig,
}

impl Selector {
    pub fn new(config: SelectionConfig) -> Self {
        Self { config }
    }

    pub fn select<R: Rng>(
        &self,
        registry: &mut Registry,
        circuits: &CircuitMap,
        cache: &LivenessCache,
        scores: &HashMap<String, PlatformScore>,
        mentions: &HashMap<String, MentionState>,
        request: &SelectionRequest,
        rng: &mut R,
    ) -> Result<SelectionOutcome> {
        let count = request.count.unwrap_or(self.config.count);
        let now = Utc::now();

        let selectable_exists = registry
            .platforms
            .values()
            .any(|entry| !entry.status.is_terminal());
        if !selectable_exists {
            crate::bail_err!("registry has no selectable platforms");
        }

        let mut warnings = Vec::new();
        let mut selected: Vec<String> = Vec::new();
        let mut first_contact = Vec::new();

        // Required platforms bypass every filter. A required platform that
        // the filters would have dropped is still included, loudly.
        for id in &request.require {
            if selected.contains(id) {
                continue;
            }
            if registry.get(id).is_none() {
                warnings.push(format!("required platform `{id}` is not in the registry"));
                selected.push(id.clone());
                continue;
            }
            if let Some(reason) = self.exclusion_reason(id, registry, circuits, cache, request, now)
            {
                warnings.push(format!(
                    "required platform `{id}` included despite: {reason}"
                ));
            }
            selected.push(id.clone());
        }

        // One first-contact platform per cycle gets a slot ahead of the
        // weighted draw; it does not compete on ROI weight.
        if selected.len() < count {
            let next_first_contact = registry
                .platforms
                .values()
                .find(|entry| {
                    entry.status == PlatformStatus::NeedsProbe
                        && !selected.contains(&entry.id)
                        && !request.exclude.contains(&entry.id)
                        && !self.config.demoted.contains(&entry.id)
                        && !circuits.get(&entry.id).map(|c| c.is_open()).unwrap_or(false)
                })
                .map(|entry| entry.id.clone());
            if let Some(id) = next_first_contact {
                first_contact.push(id.clone());
                selected.push(id);
            }
        }

        let mut pool: Vec<Candidate> = registry
            .platforms
            .values()
            .filter(|entry| entry.status.is_working())
            .filter(|entry| !selected.contains(&entry.id))
            .filter(|entry| {
                self.exclusion_reason(&entry.id, registry, circuits, cache, request, now)
                    .is_none()
            })
            .map(|entry| Candidate {
                id: entry.id.clone(),
                weight: compute_weight(
                    scores.get(&entry.id),
                    mentions.get(&entry.id),
                    sessions_since_engaged(entry.last_engaged_session, request.session),
                    self.config.default_score,
                ),
            })
            .collect();

        let weights = pool
            .iter()
            .map(|candidate| (candidate.id.clone(), candidate.weight))
            .collect();

        while selected.len() < count {
            let Some(id) = sample_one(&mut pool, rng) else {
                break;
            };
            selected.push(id);
        }

        if request.commit {
            for id in &selected {
                if let Some(entry) = registry.get_mut(id) {
                    entry.last_engaged_session = Some(request.session);
                }
            }
        }

        Ok(SelectionOutcome {
            session: request.session,
            selected,
            first_contact,
            warnings,
            weights,
        })
    }

    fn exclusion_reason(
        &self,
        id: &str,
        registry: &Registry,
        circuits: &CircuitMap,
        cache: &LivenessCache,
        request: &SelectionRequest,
        now: chrono::DateTime<Utc>,
    ) -> Option<String> {
        if request.exclude.iter().any(|excluded| excluded == id) {
            return Some("explicitly excluded".to_string());
        }
        if self.config.demoted.iter().any(|demoted| demoted == id) {
            return Some("on the demotion list".to_string());
        }
        if circuits.get(id).map(|c| c.is_open()).unwrap_or(false) {
            return Some("circuit is open".to_string());
        }
        if cache.flagged_unreachable(id, now, request.session) {
            return Some("cache says unreachable".to_string());
        }
        if let Some(entry) = registry.get(id) {
            if let Some(last) = entry.last_engaged_session {
                let since = request.session.saturating_sub(last);
                if since < self.config.recency_window {
                    return Some(format!("engaged {since} session(s) ago"));
                }
            }
        }
        None
    }
}

struct Candidate {
    id: String,
    weight: u64,
}

fn sessions_since_engaged(last_engaged: Option<u64>, session: u64) -> Option<u64> {
    last_engaged.map(|last| session.saturating_sub(last))
}

/// Multiplicative weight: base score times recency, exploration, cost and
/// mention factors. Every factor defaults to 1.0 when its input is unknown,
/// and the result never rounds below 1.
pub fn compute_weight(
    score: Option<&PlatformScore>,
    mention: Option<&MentionState>,
    sessions_since: Option<u64>,
    default_score: f64,
) -> u64 {
    let base = score.map(|s| s.score).unwrap_or(default_score).max(1.0);

    let recency = match sessions_since {
        // Never engaged reads as maximally stale.
        None => 2.0,
        Some(since) if since >= 20 => 2.0,
        Some(since) if since >= 10 => 1.5,
        Some(since) if since < 3 => 0.5,
        Some(_) => 1.0,
    };

    let exploration = match score.map(|s| s.interactions) {
        Some(interactions) if interactions < 5 => 1.5,
        None => 1.5,
        Some(_) => 1.0,
    };

    // The analytics artifact defaults a missing cost to 0.0, so exactly
    // zero reads as "no cost data" rather than "free".
    let cost = match score.map(|s| s.cost_per_interaction) {
        Some(cost) if cost > 0.0 && cost < 0.05 => 1.3,
        Some(cost) if cost > 0.15 => 0.7,
        _ => 1.0,
    };

    let mention_boost = match mention {
        Some(state) if state.direct => 3.0,
        Some(state) if state.unread => 1.5,
        _ => 1.0,
    };

    let weight = (base * recency * exploration * cost * mention_boost).round();
    (weight as u64).max(1)
}

/// One draw of weighted sampling without replacement: walk the pool
/// subtracting weights until the cursor lands, then remove the hit. Each
/// draw re-reads the shrunk pool, so later draws see a changed distribution.
fn sample_one<R: Rng>(pool: &mut Vec<Candidate>, rng: &mut R) -> Option<String> {
    if pool.is_empty() {
        return None;
    }

    let total: u64 = pool.iter().map(|candidate| candidate.weight).sum();
    let mut cursor = (rng.gen::<f64>() * total as f64) as u64;
    if cursor >= total {
        cursor = total - 1;
    }

    let mut index = pool.len() - 1;
    for (i, candidate) in pool.iter().enumerate() {
        if cursor < candidate.weight {
            index = i;
            break;
        }
        cursor -= candidate.weight;
    }

    Some(pool.remove(index).id)
}
