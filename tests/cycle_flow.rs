//! End-to-end cycle over a temporary store: probe, select, triage, with
//! every network edge replaced by scripted transports.

use async_trait::async_trait;
use rotor::app::RotorApp;
use rotor::config::RotorConfig;
use rotor::domain::{
    AuthKind, PlatformEntry, PlatformStatus, Registry, TestEndpoint, TriageCategory,
};
use rotor::probe::{ProbeTransport, ProbeVerdict};
use rotor::select::SelectionRequest;
use rotor::triage::{EndpointObservation, TriageTransport};
use std::sync::Arc;

struct AllHealthy;

#[async_trait]
impl ProbeTransport for AllHealthy {
    async fn probe(&self, _method: &str, _url: &str) -> ProbeVerdict {
        ProbeVerdict::from_status(200)
    }
}

struct AllRefused;

#[async_trait]
impl ProbeTransport for AllRefused {
    async fn probe(&self, _method: &str, _url: &str) -> ProbeVerdict {
        ProbeVerdict::unreachable("connection refused")
    }
}

/// Serves the same SPA shell on every path, like a platform whose API was
/// replaced by a marketing site.
struct SpaShell;

#[async_trait]
impl TriageTransport for SpaShell {
    async fn fetch(&self, _url: &str) -> EndpointObservation {
        EndpointObservation {
            status: Some(200),
            content_type: Some("text/html".to_string()),
            body: Some(
                "<!doctype html><html><body><div id=\"root\"></div>\
                 <script src=\"/static/js/bundle.js\"></script></body></html>"
                    .to_string(),
            ),
            error: None,
        }
    }
}

fn app_in(dir: &tempfile::TempDir, transport: Arc<dyn ProbeTransport>) -> RotorApp {
    let mut config = RotorConfig::default();
    config.store.dir = dir.path().to_path_buf();
    RotorApp::new(config)
        .expect("app construction")
        .with_probe_transport(transport)
}

fn seed_registry(app: &RotorApp, ids: &[&str]) {
    let mut registry = Registry::default();
    for id in ids {
        let mut entry = PlatformEntry::new(
            *id,
            *id,
            TestEndpoint::get(format!("https://{id}.example/api/health")),
        );
        entry.status = PlatformStatus::Live;
        entry.auth = AuthKind::ApiKey;
        registry.insert(entry);
    }
    app.store().save_registry(&registry).unwrap();
}

#[tokio::test]
async fn probe_persists_state_unless_dry() {
    let dir = tempfile::tempdir().unwrap();
    let app = app_in(&dir, Arc::new(AllHealthy));
    seed_registry(&app, &["chatr", "bluesky"]);

    let dry = app.run_probe(1, true).await.unwrap();
    assert_eq!(dry.total_probed, 2);
    assert!(app.store().load_circuits().is_empty(), "dry run persists nothing");

    let wet = app.run_probe(1, false).await.unwrap();
    assert_eq!(wet.total_probed, 2);
    assert_eq!(app.store().load_circuits().len(), 2);
    assert_eq!(app.store().load_cache().entries.len(), 2);
    assert!(app
        .store()
        .load_registry()
        .get("chatr")
        .unwrap()
        .last_tested
        .is_some());
}

#[tokio::test]
async fn committed_selection_records_a_mandate_and_recency() {
    let dir = tempfile::tempdir().unwrap();
    let app = app_in(&dir, Arc::new(AllHealthy));
    seed_registry(&app, &["chatr", "bluesky", "moltbook"]);

    assert_eq!(app.next_session(), 1);

    let outcome = app
        .select(SelectionRequest {
            session: 1,
            count: Some(2),
            commit: true,
            ..Default::default()
        })
        .await
        .unwrap();

    assert_eq!(outcome.selected.len(), 2);
    assert_eq!(app.next_session(), 2);

    let mandate = app.store().mandate_for(1).unwrap();
    assert_eq!(mandate.platforms, outcome.selected);

    let registry = app.store().load_registry();
    for id in &outcome.selected {
        assert_eq!(registry.get(id).unwrap().last_engaged_session, Some(1));
    }
}

#[tokio::test]
async fn advisory_selection_leaves_the_store_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let app = app_in(&dir, Arc::new(AllHealthy));
    seed_registry(&app, &["chatr", "bluesky"]);

    let outcome = app
        .select(SelectionRequest {
            session: 1,
            count: Some(1),
            commit: false,
            ..Default::default()
        })
        .await
        .unwrap();

    assert_eq!(outcome.selected.len(), 1);
    assert!(app.store().mandate_for(1).is_none());
    assert!(app
        .store()
        .load_registry()
        .get("chatr")
        .unwrap()
        .last_engaged_session
        .is_none());
}

#[tokio::test]
async fn configured_scores_file_feeds_the_selection_weights() {
    let dir = tempfile::tempdir().unwrap();
    let scores_path = dir.path().join("scores.json");
    std::fs::write(
        &scores_path,
        r#"{
            "chatr": {"score": 40.0, "interactions": 50, "cost_per_interaction": 0.10},
            "bluesky": {"score": 2.0, "interactions": 50, "cost_per_interaction": 0.10}
        }"#,
    )
    .unwrap();

    let mut config = RotorConfig::default();
    config.store.dir = dir.path().to_path_buf();
    config.selection.scores_path = Some(scores_path);
    let app = RotorApp::new(config)
        .expect("app construction")
        .with_probe_transport(Arc::new(AllHealthy));
    seed_registry(&app, &["chatr", "bluesky"]);

    let outcome = app
        .select(SelectionRequest {
            session: 1,
            count: Some(1),
            ..Default::default()
        })
        .await
        .unwrap();

    // Never-engaged platforms carry the 2.0 staleness factor: 40 * 2 = 80
    // and 2 * 2 = 4.
    let weight_of = |id: &str| {
        outcome
            .weights
            .iter()
            .find(|(candidate, _)| candidate == id)
            .map(|(_, weight)| *weight)
            .unwrap()
    };
    assert_eq!(weight_of("chatr"), 80);
    assert_eq!(weight_of("bluesky"), 4);
}

#[tokio::test]
async fn injected_providers_shape_the_draw() {
    struct FixedScores;

    #[async_trait]
    impl rotor::scoring::ScoreProvider for FixedScores {
        async fn scores(
            &self,
        ) -> rotor::error::Result<std::collections::HashMap<String, rotor::scoring::PlatformScore>>
        {
            Ok(std::collections::HashMap::from([(
                "chatr".to_string(),
                rotor::scoring::PlatformScore {
                    score: 10.0,
                    interactions: 50,
                    cost_per_interaction: 0.10,
                },
            )]))
        }
    }

    struct DirectMention;

    #[async_trait]
    impl rotor::scoring::MentionProvider for DirectMention {
        async fn mentions(
            &self,
        ) -> rotor::error::Result<std::collections::HashMap<String, rotor::scoring::MentionState>>
        {
            Ok(std::collections::HashMap::from([(
                "chatr".to_string(),
                rotor::scoring::MentionState {
                    unread: true,
                    direct: true,
                },
            )]))
        }
    }

    let dir = tempfile::tempdir().unwrap();
    let app = app_in(&dir, Arc::new(AllHealthy))
        .with_score_provider(Arc::new(FixedScores))
        .with_mention_provider(Arc::new(DirectMention));
    seed_registry(&app, &["chatr"]);

    let outcome = app
        .select(SelectionRequest {
            session: 1,
            count: Some(1),
            ..Default::default()
        })
        .await
        .unwrap();

    // 10 (score) * 2.0 (never engaged) * 3.0 (direct mention) = 60.
    assert_eq!(outcome.weights, vec![("chatr".to_string(), 60)]);
    assert_eq!(outcome.selected, vec!["chatr".to_string()]);
}

#[tokio::test]
async fn tripped_platform_is_skipped_then_triaged_as_spa_false_positive() {
    let dir = tempfile::tempdir().unwrap();
    let app = app_in(&dir, Arc::new(AllRefused)).with_triage_transport(Arc::new(SpaShell));
    seed_registry(&app, &["chatr", "bluesky"]);

    // Two unreachable passes trip both breakers.
    app.run_probe(1, false).await.unwrap();
    app.store().save_cache_best_effort(&Default::default());
    app.run_probe(2, false).await.unwrap();

    let circuits = app.store().load_circuits();
    assert!(circuits.get("chatr").unwrap().is_open());

    // An open breaker takes the platform out of the selection pool.
    let outcome = app
        .select(SelectionRequest {
            session: 3,
            count: Some(2),
            ..Default::default()
        })
        .await
        .unwrap();
    assert!(outcome.selected.is_empty());

    // Triage sees a SPA shell on every endpoint and calls it dead.
    let reports = app.triage_all().await.unwrap();
    assert_eq!(reports.len(), 2);
    assert!(reports
        .iter()
        .all(|r| r.result.category == TriageCategory::Dead));
    assert!(reports[0]
        .result
        .evidence
        .iter()
        .any(|e| e.contains("single-page-app")));
}
