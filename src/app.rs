//! Wires the stores, transports and cycle components together behind one
//! struct the CLI drives. Each operation loads the stores it needs, runs
//! the component, and persists only on the commit path.

use crate::cache::LivenessCache;
use crate::config::RotorConfig;
use crate::domain::Trace;
use crate::error::Result;
use crate::observe::{CycleObserver, TracingObserver};
use crate::probe::{HttpTransport, ProbePassReport, ProbeTransport, Prober};
use crate::reconcile::{ReconcileOutcome, Reconciler};
use crate::scoring::{
    gather_mentions, gather_scores, FileScores, MentionProvider, NullMentions, NullScores,
    ScoreProvider,
};
use crate::select::{SelectionOutcome, SelectionRequest, Selector};
use crate::store::{StateStore, ViolationRecord};
use crate::triage::{HttpTriageTransport, Triage, TriageReport, TriageTransport};
use chrono::Utc;
use std::sync::Arc;

pub struct RotorApp {
    config: RotorConfig,
    store: StateStore,
    observer: Arc<dyn CycleObserver>,
    probe_transport: Arc<dyn ProbeTransport>,
    triage_transport: Arc<dyn TriageTransport>,
    scores: Arc<dyn ScoreProvider>,
    mentions: Arc<dyn MentionProvider>,
}

impl RotorApp {
    pub fn new(config: RotorConfig) -> Result<Self> {
        let store = StateStore::new(&config.store.dir);
        let probe_transport = Arc::new(HttpTransport::new(config.probe.probe_timeout())?);
        let triage_transport = Arc::new(HttpTriageTransport::new(config.triage.probe_timeout())?);
        let scores: Arc<dyn ScoreProvider> = match config.selection.scores_path.as_ref() {
            Some(path) => Arc::new(FileScores::new(path.clone())),
            None => Arc::new(NullScores),
        };
        Ok(Self {
            config,
            store,
            observer: Arc::new(TracingObserver),
            probe_transport,
            triage_transport,
            scores,
            mentions: Arc::new(NullMentions),
        })
    }

    pub fn with_score_provider(mut self, scores: Arc<dyn ScoreProvider>) -> Self {
        self.scores = scores;
        self
    }

    pub fn with_probe_transport(mut self, transport: Arc<dyn ProbeTransport>) -> Self {
        self.probe_transport = transport;
        self
    }

    pub fn with_triage_transport(mut self, transport: Arc<dyn TriageTransport>) -> Self {
        self.triage_transport = transport;
        self
    }

    pub fn with_mention_provider(mut self, mentions: Arc<dyn MentionProvider>) -> Self {
        self.mentions = mentions;
        self
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    /// Next unused session ordinal, derived from the mandate log.
    pub fn next_session(&self) -> u64 {
        self.store
            .load_mandates()
            .iter()
            .map(|m| m.session)
            .max()
            .unwrap_or(0)
            + 1
    }

    /// One liveness pass over the registry. Dry runs compute the same
    /// report but drop the mutated registry, circuit and cache state.
    pub async fn run_probe(&self, session: u64, dry: bool) -> Result<ProbePassReport> {
        let mut registry = self.store.load_registry();
        let mut circuits = self.store.load_circuits();
        let mut cache = LivenessCache::new(self.store.load_cache(), self.config.cache.ttl());

        let prober = Prober::new(
            self.config.probe.clone(),
            Arc::clone(&self.probe_transport),
            Arc::clone(&self.observer),
        );
        let report = prober
            .run_pass(&mut registry, &mut circuits, &mut cache, session)
            .await;

        if !dry {
            self.store.save_registry(&registry)?;
            self.store.save_circuits(&circuits)?;
            self.store.save_cache_best_effort(cache.document());
        }

        Ok(report)
    }

    /// Picks platforms for a session. Commit mode persists the mandate and
    /// the updated recency stamps; otherwise the pick is advisory.
    pub async fn select(&self, request: SelectionRequest) -> Result<SelectionOutcome> {
        let mut registry = self.store.load_registry();
        let circuits = self.store.load_circuits();
        let cache = LivenessCache::new(self.store.load_cache(), self.config.cache.ttl());

        let timeout = self.config.selection.scoring_timeout();
        let scores = gather_scores(self.scores.as_ref(), timeout).await;
        let mentions = gather_mentions(self.mentions.as_ref(), timeout).await;

        let selector = Selector::new(self.config.selection.clone());
        let outcome = selector.select(
            &mut registry,
            &circuits,
            &cache,
            &scores,
            &mentions,
            &request,
            &mut rand::thread_rng(),
        )?;

        if request.commit {
            self.store.append_mandate(&outcome.mandate())?;
            self.store.save_registry(&registry)?;
            self.observer
                .selection_committed(outcome.session, &outcome.selected);
        }

        Ok(outcome)
    }

    /// Runs the triage sweep for one platform and writes the observed
    /// manifest hash back to the registry.
    pub async fn triage(&self, platform: &str) -> Result<TriageReport> {
        let mut registry = self.store.load_registry();
        let circuits = self.store.load_circuits();

        let Some(entry) = registry.get(platform).cloned() else {
            crate::bail_err!("platform `{platform}` is not in the registry");
        };

        let triage = Triage::new(
            self.config.triage.clone(),
            Arc::clone(&self.triage_transport),
            Arc::clone(&self.observer),
        );
        let report = triage.run(&entry, circuits.get(platform)).await;

        if let Some(hash) = report.manifest_hash.as_ref() {
            if let Some(entry) = registry.get_mut(platform) {
                if entry.manifest_hash.as_deref() != Some(hash) {
                    entry.manifest_hash = Some(hash.clone());
                    self.store.save_registry(&registry)?;
                }
            }
        }

        Ok(report)
    }

    /// Triages every platform currently tripped or out of the working set,
    /// skipping terminal entries.
    pub async fn triage_all(&self) -> Result<Vec<TriageReport>> {
        let registry = self.store.load_registry();
        let circuits = self.store.load_circuits();

        let mut candidates: Vec<String> = registry
            .platforms
            .values()
            .filter(|entry| !entry.status.is_terminal())
            .filter(|entry| {
                !entry.status.is_working()
                    || circuits
                        .get(&entry.id)
                        .map(|c| c.is_open())
                        .unwrap_or(false)
            })
            .map(|entry| entry.id.clone())
            .collect();
        candidates.sort();

        let mut reports = Vec::with_capacity(candidates.len());
        for platform in candidates {
            reports.push(self.triage(&platform).await?);
        }
        Ok(reports)
    }

    /// Reconciles one finished session. Returns `None` when the session has
    /// no mandate to reconcile against.
    pub fn reconcile(&self, session: u64) -> Result<Option<ReconcileOutcome>> {
        let Some(mandate) = self.store.mandate_for(session) else {
            tracing::info!(session, "no mandate recorded for session, nothing to reconcile");
            return Ok(None);
        };

        // A missing trace means nothing was reported back; every mandate
        // platform counts as missing.
        let mut trace = self.store.trace_for(session).unwrap_or(Trace {
            session,
            platforms_engaged: Vec::new(),
            skipped_platforms: Vec::new(),
            follow_ups: Vec::new(),
        });

        let mut state = self.store.load_compliance();
        let reconciler = Reconciler::new(self.config.compliance.clone(), Arc::clone(&self.observer));
        let outcome = reconciler.reconcile(&mandate, &mut trace, &mut state, Utc::now());

        if !outcome.already_recorded {
            self.store.save_compliance(&state)?;
            if outcome.escalated {
                self.store.save_trace(&trace)?;
            }
            if outcome.violation {
                self.store.append_violation(&ViolationRecord {
                    session,
                    compliance_pct: outcome.compliance_pct,
                    missing: outcome.missing.clone(),
                    recorded_at: Utc::now(),
                })?;
            }
        }

        Ok(Some(outcome))
    }
}
