//! Liveness prober: bounded-concurrency health probes with a hard
//! wall-clock cap on the whole pass.
//!
//! Probes run in submission-order batches; individual probes within a batch
//! complete in arbitrary order. The watchdog token is armed once per pass
//! and is never reset between batches, so the budget caps the pass rather
//! than each batch. When it fires, outcomes already applied are kept and
//! everything still pending is left untouched (fail open).

use crate::cache::LivenessCache;
use crate::circuit;
use crate::config::ProbeConfig;
use crate::domain::{PlatformEntry, PlatformStatus, Registry};
use crate::error::Result;
use crate::observe::CycleObserver;
use crate::store::CircuitMap;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Notes carrying this marker exclude a platform from probing entirely.
const DO_NOT_PROBE_MARKER: &str = "do-not-probe";

const ERROR_TRUNCATE: usize = 100;

#[derive(Clone, Debug, Serialize)]
pub struct ProbeVerdict {
    /// The peer produced any HTTP-level response, error codes included.
    pub reachable: bool,
    /// Response code landed in the 2xx-3xx range.
    pub healthy: bool,
    pub status_code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProbeVerdict {
    pub fn unreachable(error: impl Into<String>) -> Self {
        let mut error = error.into();
        error.truncate(ERROR_TRUNCATE);
        Self {
            reachable: false,
            healthy: false,
            status_code: None,
            error: Some(error),
        }
    }

    pub fn from_status(status: u16) -> Self {
        Self {
            reachable: true,
            healthy: (200..400).contains(&status),
            status_code: Some(status),
            error: None,
        }
    }
}

/// Seam for the actual network call so passes are testable without sockets.
#[async_trait]
pub trait ProbeTransport: Send + Sync {
    async fn probe(&self, method: &str, url: &str) -> ProbeVerdict;
}

pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(probe_timeout: Duration) -> Result<Self> {
        // Certificate problems are a triage signal, not a reason to skip the
        // probe, so verification stays off here.
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .user_agent("rotor-probe/1.0")
            .timeout(probe_timeout)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ProbeTransport for HttpTransport {
    async fn probe(&self, method: &str, url: &str) -> ProbeVerdict {
        let method = match method.parse::<reqwest::Method>() {
            Ok(method) => method,
            Err(err) => return ProbeVerdict::unreachable(format!("invalid method: {err}")),
        };

        match self.client.request(method, url).send().await {
            Ok(response) => ProbeVerdict::from_status(response.status().as_u16()),
            Err(err) => ProbeVerdict::unreachable(err.to_string()),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct ProbeOutcome {
    pub platform: String,
    pub verdict: ProbeVerdict,
    pub from_cache: bool,
}

#[derive(Clone, Debug, Serialize)]
pub struct SkippedProbe {
    pub platform: String,
    pub reason: String,
}

/// Summary of one probing pass, in the shape the original prober printed
/// next to its per-platform results.
#[derive(Clone, Debug, Serialize)]
pub struct ProbePassReport {
    pub generated_at: DateTime<Utc>,
    pub total_probed: usize,
    pub reachable: usize,
    pub healthy: usize,
    pub served_from_cache: usize,
    /// The watchdog fired before every candidate was evaluated.
    pub budget_exceeded: bool,
    pub outcomes: Vec<ProbeOutcome>,
    pub skipped: Vec<SkippedProbe>,
}

pub struct Prober {
    config: ProbeConfig,
    transport: Arc<dyn ProbeTransport>,
    observer: Arc<dyn CycleObserver>,
}

impl Prober {
    pub fn new(
        config: ProbeConfig,
        transport: Arc<dyn ProbeTransport>,
        observer: Arc<dyn CycleObserver>,
    ) -> Self {
        Self {
            config,
            transport,
            observer,
        }
    }

    /// Runs a full probing pass, mutating registry, circuit and cache state
    /// in place. Persistence is the caller's concern (dry runs just drop the
    /// mutated copies).
    pub async fn run_pass(
        &self,
        registry: &mut Registry,
        circuits: &mut CircuitMap,
        cache: &mut LivenessCache,
        session: u64,
    ) -> ProbePassReport {
        let now = Utc::now();
        let mut outcomes = Vec::new();
        let mut skipped = Vec::new();
        let mut candidates = Vec::new();

        for entry in registry.platforms.values() {
            match probe_eligibility(entry) {
                Eligibility::Probe => {}
                Eligibility::Skip(reason) => {
                    skipped.push(SkippedProbe {
                        platform: entry.id.clone(),
                        reason,
                    });
                    continue;
                }
            }

            if let Some(cached) = cache.lookup(&entry.id, now, session) {
                self.observer.probe_served_from_cache(&entry.id);
                outcomes.push(ProbeOutcome {
                    platform: entry.id.clone(),
                    verdict: ProbeVerdict {
                        reachable: cached.reachable,
                        healthy: cached.healthy,
                        status_code: cached.status_code,
                        error: None,
                    },
                    from_cache: true,
                });
                continue;
            }

            candidates.push((
                entry.id.clone(),
                entry.test_endpoint.method.clone(),
                entry.test_endpoint.url.clone(),
            ));
        }

        // One watchdog for the whole pass; batches that start late still run
        // against the same deadline.
        let watchdog = CancellationToken::new();
        let timer_token = watchdog.clone();
        let budget = self.config.pass_budget();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(budget).await;
            timer_token.cancel();
        });

        let mut budget_exceeded = false;

        'pass: for batch in candidates.chunks(self.config.batch_size.max(1)) {
            if watchdog.is_cancelled() {
                budget_exceeded = true;
                break;
            }

            let probes = batch
                .iter()
                .map(|(id, method, url)| self.probe_one(id, method, url));

            let results = tokio::select! {
                _ = watchdog.cancelled() => {
                    budget_exceeded = true;
                    break 'pass;
                }
                results = join_all(probes) => results,
            };

            for (platform, verdict) in results {
                self.apply_outcome(&platform, &verdict, registry, circuits, cache, session, now);
                outcomes.push(ProbeOutcome {
                    platform,
                    verdict,
                    from_cache: false,
                });
            }
        }

        timer.abort();

        if budget_exceeded {
            tracing::warn!(
                budget_secs = self.config.pass_budget_secs,
                evaluated = outcomes.len(),
                pending = candidates.len().saturating_sub(
                    outcomes.iter().filter(|o| !o.from_cache).count()
                ),
                "probe pass hit wall-clock budget, keeping partial results"
            );
        }

        let reachable = outcomes.iter().filter(|o| o.verdict.reachable).count();
        let healthy = outcomes.iter().filter(|o| o.verdict.healthy).count();
        let served_from_cache = outcomes.iter().filter(|o| o.from_cache).count();

        self.observer
            .pass_finished(outcomes.len(), reachable, budget_exceeded);

        ProbePassReport {
            generated_at: now,
            total_probed: outcomes.len(),
            reachable,
            healthy,
            served_from_cache,
            budget_exceeded,
            outcomes,
            skipped,
        }
    }

    async fn probe_one(&self, platform: &str, method: &str, url: &str) -> (String, ProbeVerdict) {
        let timeout = self.config.probe_timeout();
        let verdict = match tokio::time::timeout(timeout, self.transport.probe(method, url)).await {
            Ok(verdict) => verdict,
            Err(_) => ProbeVerdict::unreachable(format!(
                "probe timed out after {}s",
                timeout.as_secs()
            )),
        };
        (platform.to_string(), verdict)
    }

    #[allow(clippy::too_many_arguments)]
    fn apply_outcome(
        &self,
        platform: &str,
        verdict: &ProbeVerdict,
        registry: &mut Registry,
        circuits: &mut CircuitMap,
        cache: &mut LivenessCache,
        session: u64,
        now: DateTime<Utc>,
    ) {
        if let Some(entry) = registry.get_mut(platform) {
            entry.last_tested = Some(now);
            // A healthy first contact graduates out of the probe-me bucket.
            if verdict.healthy
                && matches!(
                    entry.status,
                    PlatformStatus::NeedsProbe | PlatformStatus::Unknown
                )
            {
                entry.status = PlatformStatus::Live;
            }
        }

        let state = circuits.entry(platform.to_string()).or_default();
        if verdict.reachable {
            if circuit::record_success(state, now) {
                self.observer.breaker_recovered(platform);
            }
        } else {
            let error = verdict.error.as_deref().unwrap_or("unreachable");
            if circuit::record_failure(state, error, self.config.failure_threshold, now) {
                let reason = state.open_reason.clone().unwrap_or_default();
                self.observer.breaker_opened(platform, &reason);
            }
        }

        cache.record(
            platform,
            verdict.reachable,
            verdict.healthy,
            verdict.status_code,
            session,
            now,
        );

        self.observer
            .probe_completed(platform, verdict.reachable, verdict.healthy);
    }
}

enum Eligibility {
    Probe,
    Skip(String),
}

fn probe_eligibility(entry: &PlatformEntry) -> Eligibility {
    if entry.status.is_terminal() {
        return Eligibility::Skip(format!("status is {}", entry.status));
    }

    if let Some(notes) = entry.notes.as_deref() {
        let lowered = notes.to_lowercase();
        if lowered.contains(DO_NOT_PROBE_MARKER) || lowered.contains("do not probe") {
            return Eligibility::Skip("notes carry do-not-probe marker".to_string());
        }
    }

    Eligibility::Probe
}
