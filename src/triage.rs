//! Fault triage for degraded platforms.
//!
//! Sweeps a richer endpoint set than the liveness prober (health, discovery
//! docs, registration paths), then classifies the failure from response
//! shape alone: exactly one category, ordered evidence, one recommended
//! action.

use crate::config::TriageConfig;
use crate::domain::{
    AuthKind, CircuitState, PlatformEntry, PlatformStatus, TriageCategory, TriageResult,
};
use crate::error::Result;
use crate::observe::CycleObserver;
use async_trait::async_trait;
use futures_util::future::join_all;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Markers that betray a single-page-app shell being served on every path.
const SPA_MARKERS: [&str; 6] = [
    "<div id=\"root\"",
    "<div id=\"app\"",
    "__next_data__",
    "bundle.js",
    "/static/js/",
    "data-vite",
];

/// Minimum endpoints that must answer 200-with-HTML before the SPA
/// false-positive short-circuit may fire.
const SPA_MIN_ENDPOINTS: usize = 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointKind {
    /// The registry's own test endpoint.
    Primary,
    Health,
    Discovery,
    Registration,
}

/// Raw response shape from one endpoint fetch. `status == None` means the
/// peer never produced an HTTP response.
#[derive(Clone, Debug, Default)]
pub struct EndpointObservation {
    pub status: Option<u16>,
    pub content_type: Option<String>,
    pub body: Option<String>,
    pub error: Option<String>,
}

#[derive(Clone, Debug)]
pub struct EndpointProbe {
    pub kind: EndpointKind,
    pub url: String,
    pub observation: EndpointObservation,
}

impl EndpointProbe {
    pub fn reached(&self) -> bool {
        self.observation.status.is_some()
    }

    pub fn status(&self) -> Option<u16> {
        self.observation.status
    }

    pub fn success(&self) -> bool {
        self.status().map(|s| (200..400).contains(&s)).unwrap_or(false)
    }

    pub fn is_html(&self) -> bool {
        if let Some(content_type) = self.observation.content_type.as_deref() {
            if content_type.to_lowercase().contains("text/html") {
                return true;
            }
        }
        self.observation
            .body
            .as_deref()
            .map(|body| {
                let head = body.trim_start().to_lowercase();
                head.starts_with("<!doctype html") || head.starts_with("<html")
            })
            .unwrap_or(false)
    }

    pub fn is_json(&self) -> bool {
        self.observation
            .body
            .as_deref()
            .map(|body| serde_json::from_str::<serde_json::Value>(body).is_ok())
            .unwrap_or(false)
    }

    /// The landing-page heuristic: JSON body, or a successful non-HTML
    /// response. Separates genuine APIs from marketing shells.
    pub fn api_shaped(&self) -> bool {
        self.is_json() || (!self.is_html() && self.success())
    }

    fn spa_shell(&self) -> bool {
        if self.status() != Some(200) || !self.is_html() {
            return false;
        }
        let body = self
            .observation
            .body
            .as_deref()
            .unwrap_or_default()
            .to_lowercase();
        SPA_MARKERS.iter().any(|marker| body.contains(marker))
    }
}

/// Seam for the endpoint fetches; tests feed synthetic observations.
#[async_trait]
pub trait TriageTransport: Send + Sync {
    async fn fetch(&self, url: &str) -> EndpointObservation;
}

pub struct HttpTriageTransport {
    client: reqwest::Client,
}

impl HttpTriageTransport {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .user_agent("rotor-triage/1.0")
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl TriageTransport for HttpTriageTransport {
    async fn fetch(&self, url: &str) -> EndpointObservation {
        match self.client.get(url).send().await {
            Ok(response) => {
                let status = response.status().as_u16();
                let content_type = response
                    .headers()
                    .get(reqwest::header::CONTENT_TYPE)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string);
                let body = response.text().await.ok();
                EndpointObservation {
                    status: Some(status),
                    content_type,
                    body,
                    error: None,
                }
            }
            Err(err) => EndpointObservation {
                error: Some(err.to_string()),
                ..Default::default()
            },
        }
    }
}

/// Prior platform state the classifier weighs alongside the sweep.
#[derive(Clone, Copy, Debug, Default)]
pub struct TriagePrior {
    pub status: Option<PlatformStatus>,
    pub auth: AuthKind,
    pub consecutive_failures: u32,
}

impl TriagePrior {
    pub fn from_entry(entry: &PlatformEntry, circuit: Option<&CircuitState>) -> Self {
        Self {
            status: Some(entry.status),
            auth: entry.auth,
            consecutive_failures: circuit.map(|c| c.consecutive_failures).unwrap_or(0),
        }
    }

    fn creds_flagged(&self) -> bool {
        matches!(
            self.status,
            Some(PlatformStatus::BadCreds) | Some(PlatformStatus::NoCreds)
        )
    }

    fn has_credentials(&self) -> bool {
        self.auth == AuthKind::ApiKey && self.status != Some(PlatformStatus::NoCreds)
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct TriageReport {
    pub result: TriageResult,
    /// New manifest hash to write back when a manifest endpoint answered.
    pub manifest_hash: Option<String>,
    pub content_type_entropy: f64,
}

pub struct Triage {
    config: TriageConfig,
    transport: Arc<dyn TriageTransport>,
    observer: Arc<dyn CycleObserver>,
}

impl Triage {
    pub fn new(
        config: TriageConfig,
        transport: Arc<dyn TriageTransport>,
        observer: Arc<dyn CycleObserver>,
    ) -> Self {
        Self {
            config,
            transport,
            observer,
        }
    }

    pub async fn run(&self, entry: &PlatformEntry, circuit: Option<&CircuitState>) -> TriageReport {
        let probes = self.sweep(entry).await;
        let prior = TriagePrior::from_entry(entry, circuit);
        let report = build_report(entry, &probes, prior, self.config.defunct_threshold);
        self.observer.triage_completed(&report.result);
        report
    }

    async fn sweep(&self, entry: &PlatformEntry) -> Vec<EndpointProbe> {
        let targets = sweep_targets(entry);
        let fetches = targets.iter().map(|(kind, url)| {
            let transport = Arc::clone(&self.transport);
            let timeout = self.config.probe_timeout();
            let kind = *kind;
            let url = url.clone();
            async move {
                let observation =
                    match tokio::time::timeout(timeout, transport.fetch(&url)).await {
                        Ok(observation) => observation,
                        Err(_) => EndpointObservation {
                            error: Some(format!("timed out after {}s", timeout.as_secs())),
                            ..Default::default()
                        },
                    };
                EndpointProbe {
                    kind,
                    url,
                    observation,
                }
            }
        });
        join_all(fetches).await
    }
}

/// Endpoint set probed per platform: the primary test endpoint plus
/// well-known health, discovery and registration paths on the same origin.
fn sweep_targets(entry: &PlatformEntry) -> Vec<(EndpointKind, String)> {
    let mut targets = vec![(EndpointKind::Primary, entry.test_endpoint.url.clone())];

    let Ok(base) = Url::parse(&entry.test_endpoint.url) else {
        return targets;
    };
    let Some(origin) = base.join("/").ok() else {
        return targets;
    };

    let paths: [(EndpointKind, &str); 7] = [
        (EndpointKind::Health, "/"),
        (EndpointKind::Discovery, "/api"),
        (EndpointKind::Discovery, "/openapi.json"),
        (EndpointKind::Discovery, "/agent.json"),
        (EndpointKind::Discovery, "/.well-known/agent.json"),
        (EndpointKind::Registration, "/register"),
        (EndpointKind::Registration, "/api/register"),
    ];

    for (kind, path) in paths {
        if let Ok(url) = origin.join(path.trim_start_matches('/')) {
            let url = url.to_string();
            if url != entry.test_endpoint.url {
                targets.push((kind, url));
            }
        }
    }

    targets
}

fn build_report(
    entry: &PlatformEntry,
    probes: &[EndpointProbe],
    prior: TriagePrior,
    defunct_threshold: u32,
) -> TriageReport {
    let mut evidence = Vec::new();
    let entropy = content_type_entropy(probes);

    let manifest_hash = manifest_evidence(entry, probes, &mut evidence);

    let (category, registration_found) = classify(probes, prior, entropy, &mut evidence);
    let action = recommended_action(category, prior, registration_found, defunct_threshold);

    TriageReport {
        result: TriageResult {
            platform: entry.id.clone(),
            category,
            evidence,
            action,
        },
        manifest_hash,
        content_type_entropy: entropy,
    }
}

/// Applies the precedence rules in order; the first match wins.
fn classify(
    probes: &[EndpointProbe],
    prior: TriagePrior,
    entropy: f64,
    evidence: &mut Vec<String>,
) -> (TriageCategory, bool) {
    let reached: Vec<&EndpointProbe> = probes.iter().filter(|p| p.reached()).collect();
    let api_shaped_anywhere = probes.iter().any(|p| p.api_shaped());
    let registration_found = probes
        .iter()
        .any(|p| p.kind == EndpointKind::Registration && p.reached() && !p.is_html());
    let primary = probes.iter().find(|p| p.kind == EndpointKind::Primary);

    // SPA shells masquerade as live platforms: every answering endpoint is a
    // 200 HTML bundle mount. Short-circuit before the status rules so a
    // marketing site never classifies as anything but dead.
    let spa_shells = reached.iter().filter(|p| p.spa_shell()).count();
    if !api_shaped_anywhere && spa_shells >= SPA_MIN_ENDPOINTS && spa_shells == reached.len() {
        evidence.push(format!(
            "{spa_shells} endpoints all serve a 200 HTML single-page-app shell"
        ));
        evidence.push(format!("content-type diversity {entropy:.2} (uniform)"));
        return (TriageCategory::Dead, registration_found);
    }

    // Rule 1: any rate-limit response wins outright.
    if let Some(probe) = probes.iter().find(|p| p.status() == Some(429)) {
        evidence.push(format!("{} returned 429", probe.url));
        return (TriageCategory::RateLimited, registration_found);
    }

    // Rule 2: nothing answered at all.
    if reached.is_empty() {
        let detail = probes
            .iter()
            .find_map(|p| p.observation.error.clone())
            .unwrap_or_else(|| "no response from any endpoint".to_string());
        evidence.push(format!("no endpoint reachable ({detail})"));
        return (TriageCategory::Dead, registration_found);
    }

    // Rule 3: primary rejects auth while the server is clearly up.
    if let Some(primary) = primary {
        if matches!(primary.status(), Some(401) | Some(403)) {
            evidence.push(format!(
                "primary endpoint returned {} while server answers elsewhere",
                primary.status().unwrap_or_default()
            ));
            if registration_found {
                evidence.push("registration-shaped endpoint responded; re-registration possible".to_string());
            }
            return (TriageCategory::AuthFixable, registration_found);
        }
    }

    // Rule 4: credentials were already flagged bad/missing and the API is
    // demonstrably there.
    if prior.creds_flagged() && api_shaped_anywhere {
        evidence.push(format!(
            "prior status {} but API-shaped responses present",
            prior
                .status
                .map(|s| s.as_str())
                .unwrap_or("unknown")
        ));
        return (TriageCategory::AuthFixable, registration_found);
    }

    // Rule 5: domain resolves, but every successful response is a web page.
    let successes: Vec<&&EndpointProbe> = reached.iter().filter(|p| p.success()).collect();
    if !successes.is_empty() && successes.iter().all(|p| p.is_html()) && !api_shaped_anywhere {
        evidence.push("every successful response is HTML; landing page only, API is gone".to_string());
        evidence.push(format!("content-type diversity {entropy:.2}"));
        return (TriageCategory::Dead, registration_found);
    }

    // Rule 6: discovery answers like an API but the primary path fails.
    let discovery_api = probes
        .iter()
        .any(|p| p.kind == EndpointKind::Discovery && p.api_shaped());
    let primary_failed = primary
        .map(|p| !p.success())
        .unwrap_or(true);
    if discovery_api && primary_failed {
        evidence.push("discovery endpoints are API-shaped but the primary test endpoint fails".to_string());
        return (TriageCategory::ApiChanged, registration_found);
    }

    // Rule 7: server up, 5xx somewhere, API visible elsewhere.
    let any_5xx = reached
        .iter()
        .any(|p| p.status().map(|s| s >= 500).unwrap_or(false));
    if any_5xx && api_shaped_anywhere {
        evidence.push("5xx responses alongside API-shaped endpoints".to_string());
        return (TriageCategory::ApiChanged, registration_found);
    }

    // Rule 8: API-shaped responses exist but none lands in the healthy range.
    if api_shaped_anywhere && !probes.iter().any(|p| p.api_shaped() && p.success()) {
        evidence.push("API-shaped responses present but none in the 2xx-3xx range".to_string());
        return (TriageCategory::ApiChanged, registration_found);
    }

    // Rule 9: reachable but nothing API-shaped anywhere.
    if !api_shaped_anywhere {
        evidence.push("reachable but no API-shaped response on any endpoint".to_string());
        return (TriageCategory::Dead, registration_found);
    }

    // Rule 10: ambiguity resolves to unknown, never to a blank.
    evidence.push("response shape matched no failure signature".to_string());
    (TriageCategory::Unknown, registration_found)
}

fn recommended_action(
    category: TriageCategory,
    prior: TriagePrior,
    registration_found: bool,
    defunct_threshold: u32,
) -> String {
    match category {
        TriageCategory::AuthFixable => {
            if prior.has_credentials() {
                "refresh credentials".to_string()
            } else if registration_found {
                "register via discovered endpoint".to_string()
            } else {
                "acquire credentials".to_string()
            }
        }
        TriageCategory::RateLimited => "back off and retry next cycle".to_string(),
        TriageCategory::ApiChanged => "re-verify API paths against current docs".to_string(),
        TriageCategory::Dead => {
            if prior.consecutive_failures >= defunct_threshold {
                "mark defunct".to_string()
            } else {
                "leave circuit open and re-probe next cycle".to_string()
            }
        }
        TriageCategory::Unknown => "inspect manually".to_string(),
    }
}

/// Normalised Shannon entropy over observed content types. Uniform HTML
/// across endpoints scores 0.0; a mix of JSON/text/HTML scores towards 1.0
/// and argues against the SPA false positive.
pub fn content_type_entropy(probes: &[EndpointProbe]) -> f64 {
    let mut counts: std::collections::BTreeMap<String, usize> = std::collections::BTreeMap::new();
    let mut total = 0usize;
    for probe in probes {
        if !probe.reached() {
            continue;
        }
        let content_type = probe
            .observation
            .content_type
            .as_deref()
            .map(|ct| ct.split(';').next().unwrap_or(ct).trim().to_lowercase())
            .unwrap_or_else(|| "unknown".to_string());
        *counts.entry(content_type).or_insert(0) += 1;
        total += 1;
    }

    if total <= 1 || counts.len() <= 1 {
        return 0.0;
    }

    let entropy: f64 = counts
        .values()
        .map(|&count| {
            let p = count as f64 / total as f64;
            -p * p.log2()
        })
        .sum();

    entropy / (total as f64).log2()
}

fn manifest_evidence(
    entry: &PlatformEntry,
    probes: &[EndpointProbe],
    evidence: &mut Vec<String>,
) -> Option<String> {
    let manifest = probes.iter().find(|p| {
        p.kind == EndpointKind::Discovery && p.url.contains("agent.json") && p.success() && p.is_json()
    })?;
    let body = manifest.observation.body.as_deref()?;

    let hash = hex_digest(body);

    if let Ok(parsed) = serde_json::from_str::<serde_json::Value>(body) {
        let name = parsed
            .get("name")
            .and_then(|v| v.as_str())
            .unwrap_or("unnamed");
        let capabilities = parsed
            .get("capabilities")
            .and_then(|v| v.as_array())
            .map(|a| a.len())
            .unwrap_or(0);
        evidence.push(format!(
            "manifest found at {} (name: {name}, {capabilities} capabilities)",
            manifest.url
        ));
    }

    match entry.manifest_hash.as_deref() {
        Some(previous) if previous != hash => {
            tracing::warn!(
                platform = %entry.id,
                previous_hash = previous,
                new_hash = %hash,
                "manifest content hash changed since last triage"
            );
            evidence.push(format!(
                "manifest hash changed (was {previous}, now {hash}); possible supply-chain drift"
            ));
        }
        _ => {}
    }

    Some(hash)
}

fn hex_digest(body: &str) -> String {
    let digest = Sha256::digest(body.as_bytes());
    digest.iter().fold(String::with_capacity(64), |mut out, byte| {
        use std::fmt::Write as _;
        let _ = write!(out, "{byte:02x}");
        out
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn probe(kind: EndpointKind, url: &str, observation: EndpointObservation) -> EndpointProbe {
        EndpointProbe {
            kind,
            url: url.to_string(),
            observation,
        }
    }

    fn obs(status: u16, content_type: &str, body: &str) -> EndpointObservation {
        EndpointObservation {
            status: Some(status),
            content_type: Some(content_type.to_string()),
            body: Some(body.to_string()),
            error: None,
        }
    }

    fn unreachable(error: &str) -> EndpointObservation {
        EndpointObservation {
            error: Some(error.to_string()),
            ..Default::default()
        }
    }

    fn classify_only(probes: &[EndpointProbe], prior: TriagePrior) -> TriageCategory {
        let entropy = content_type_entropy(probes);
        let mut evidence = Vec::new();
        classify(probes, prior, entropy, &mut evidence).0
    }

    const JSON_OK: &str = "{\"ok\":true}";
    const HTML_PAGE: &str = "<!doctype html><html><body>Welcome</body></html>";
    const SPA_PAGE: &str =
        "<!doctype html><html><body><div id=\"root\"></div><script src=\"/static/js/bundle.js\"></script></body></html>";

    #[test]
    fn rule_1_any_429_is_rate_limited() {
        let probes = vec![
            probe(EndpointKind::Primary, "https://x/api", obs(200, "application/json", JSON_OK)),
            probe(EndpointKind::Discovery, "https://x/api2", obs(429, "text/plain", "slow down")),
        ];
        assert_eq!(
            classify_only(&probes, TriagePrior::default()),
            TriageCategory::RateLimited
        );
    }

    #[test]
    fn rule_2_nothing_reachable_is_dead() {
        let probes = vec![
            probe(EndpointKind::Primary, "https://x/api", unreachable("connection refused")),
            probe(EndpointKind::Health, "https://x/", unreachable("connection refused")),
        ];
        assert_eq!(
            classify_only(&probes, TriagePrior::default()),
            TriageCategory::Dead
        );
    }

    #[test]
    fn rule_3_primary_unauthorized_is_auth_fixable() {
        let probes = vec![
            probe(EndpointKind::Primary, "https://x/api", obs(401, "application/json", "{\"error\":\"auth\"}")),
            probe(EndpointKind::Health, "https://x/", obs(200, "text/html", HTML_PAGE)),
        ];
        assert_eq!(
            classify_only(&probes, TriagePrior::default()),
            TriageCategory::AuthFixable
        );
    }

    #[test]
    fn rule_3_notes_registration_when_found() {
        let probes = vec![
            probe(EndpointKind::Primary, "https://x/api", obs(403, "application/json", "{}")),
            probe(EndpointKind::Registration, "https://x/register", obs(405, "application/json", "{\"error\":\"POST only\"}")),
        ];
        let mut evidence = Vec::new();
        let (category, registration_found) = classify(
            &probes,
            TriagePrior::default(),
            content_type_entropy(&probes),
            &mut evidence,
        );
        assert_eq!(category, TriageCategory::AuthFixable);
        assert!(registration_found);
        assert!(evidence.iter().any(|e| e.contains("re-registration")));
    }

    #[test]
    fn rule_4_flagged_creds_with_api_present_is_auth_fixable() {
        let prior = TriagePrior {
            status: Some(PlatformStatus::NoCreds),
            auth: AuthKind::None,
            consecutive_failures: 0,
        };
        let probes = vec![
            probe(EndpointKind::Primary, "https://x/api", obs(404, "text/html", HTML_PAGE)),
            probe(EndpointKind::Discovery, "https://x/openapi.json", obs(200, "application/json", JSON_OK)),
        ];
        assert_eq!(classify_only(&probes, prior), TriageCategory::AuthFixable);
    }

    #[test]
    fn rule_5_all_html_successes_is_landing_page_dead() {
        let probes = vec![
            probe(EndpointKind::Primary, "https://x/api", obs(200, "text/html", HTML_PAGE)),
            probe(EndpointKind::Health, "https://x/", obs(200, "text/html", HTML_PAGE)),
        ];
        assert_eq!(
            classify_only(&probes, TriagePrior::default()),
            TriageCategory::Dead
        );
    }

    #[test]
    fn rule_6_discovery_api_with_failing_primary_is_api_changed() {
        let probes = vec![
            probe(EndpointKind::Primary, "https://x/api/v0/status", obs(404, "application/json", "{\"error\":\"not found\"}")),
            probe(EndpointKind::Discovery, "https://x/openapi.json", obs(200, "application/json", JSON_OK)),
        ];
        assert_eq!(
            classify_only(&probes, TriagePrior::default()),
            TriageCategory::ApiChanged
        );
    }

    #[test]
    fn rule_7_5xx_with_api_shaped_elsewhere_is_api_changed() {
        let probes = vec![
            probe(EndpointKind::Primary, "https://x/api", obs(200, "application/json", JSON_OK)),
            probe(EndpointKind::Health, "https://x/", obs(503, "text/html", HTML_PAGE)),
        ];
        assert_eq!(
            classify_only(&probes, TriagePrior::default()),
            TriageCategory::ApiChanged
        );
    }

    #[test]
    fn rule_8_api_shaped_but_never_healthy_is_api_changed() {
        let probes = vec![
            probe(EndpointKind::Primary, "https://x/api", obs(410, "application/json", "{\"gone\":true}")),
            probe(EndpointKind::Health, "https://x/", obs(404, "application/json", "{\"error\":404}")),
        ];
        assert_eq!(
            classify_only(&probes, TriagePrior::default()),
            TriageCategory::ApiChanged
        );
    }

    #[test]
    fn rule_9_reachable_without_api_shape_is_dead() {
        let probes = vec![
            probe(EndpointKind::Primary, "https://x/api", obs(404, "text/html", HTML_PAGE)),
            probe(EndpointKind::Health, "https://x/", obs(500, "text/html", HTML_PAGE)),
        ];
        assert_eq!(
            classify_only(&probes, TriagePrior::default()),
            TriageCategory::Dead
        );
    }

    #[test]
    fn rule_10_ambiguous_shape_is_unknown() {
        // A healthy JSON primary matches no failure signature; the
        // classifier must land on unknown rather than a blank.
        let probes = vec![probe(
            EndpointKind::Primary,
            "https://x/api",
            obs(200, "application/json", JSON_OK),
        )];
        let mut evidence = Vec::new();
        let (category, _) = classify(
            &probes,
            TriagePrior::default(),
            content_type_entropy(&probes),
            &mut evidence,
        );
        assert_eq!(category, TriageCategory::Unknown);
        assert!(evidence
            .iter()
            .any(|e| e.contains("matched no failure signature")));
    }

    #[test]
    fn spa_shell_on_every_endpoint_short_circuits_to_dead() {
        let probes = vec![
            probe(EndpointKind::Primary, "https://x/api", obs(200, "text/html", SPA_PAGE)),
            probe(EndpointKind::Health, "https://x/", obs(200, "text/html", SPA_PAGE)),
            probe(EndpointKind::Discovery, "https://x/docs", obs(200, "text/html", SPA_PAGE)),
        ];
        let mut evidence = Vec::new();
        let (category, _) = classify(
            &probes,
            TriagePrior::default(),
            content_type_entropy(&probes),
            &mut evidence,
        );
        assert_eq!(category, TriageCategory::Dead);
        assert!(evidence.iter().any(|e| e.contains("single-page-app")));
    }

    #[test]
    fn spa_short_circuit_needs_three_shell_endpoints() {
        let probes = vec![
            probe(EndpointKind::Primary, "https://x/api", obs(200, "text/html", SPA_PAGE)),
            probe(EndpointKind::Health, "https://x/", obs(200, "text/html", SPA_PAGE)),
        ];
        // Falls through to rule 5 instead; still dead, but via landing-page
        // evidence rather than the SPA detector.
        let mut evidence = Vec::new();
        let (category, _) = classify(
            &probes,
            TriagePrior::default(),
            content_type_entropy(&probes),
            &mut evidence,
        );
        assert_eq!(category, TriageCategory::Dead);
        assert!(evidence.iter().any(|e| e.contains("landing page")));
    }

    #[test]
    fn entropy_is_zero_for_uniform_html_and_higher_for_mixes() {
        let uniform = vec![
            probe(EndpointKind::Primary, "a", obs(200, "text/html", HTML_PAGE)),
            probe(EndpointKind::Health, "b", obs(200, "text/html", HTML_PAGE)),
            probe(EndpointKind::Discovery, "c", obs(200, "text/html", HTML_PAGE)),
        ];
        assert_eq!(content_type_entropy(&uniform), 0.0);

        let mixed = vec![
            probe(EndpointKind::Primary, "a", obs(200, "application/json", JSON_OK)),
            probe(EndpointKind::Health, "b", obs(200, "text/html", HTML_PAGE)),
            probe(EndpointKind::Discovery, "c", obs(200, "text/plain", "pong")),
        ];
        let entropy = content_type_entropy(&mixed);
        assert!(entropy > 0.9, "three distinct types should be near 1.0, got {entropy}");
    }

    #[test]
    fn actions_follow_category_and_prior() {
        let with_creds = TriagePrior {
            status: Some(PlatformStatus::BadCreds),
            auth: AuthKind::ApiKey,
            consecutive_failures: 0,
        };
        assert_eq!(
            recommended_action(TriageCategory::AuthFixable, with_creds, false, 10),
            "refresh credentials"
        );

        let no_creds = TriagePrior {
            status: Some(PlatformStatus::NoCreds),
            auth: AuthKind::None,
            consecutive_failures: 0,
        };
        assert_eq!(
            recommended_action(TriageCategory::AuthFixable, no_creds, true, 10),
            "register via discovered endpoint"
        );
        assert_eq!(
            recommended_action(TriageCategory::AuthFixable, no_creds, false, 10),
            "acquire credentials"
        );

        let long_dead = TriagePrior {
            status: Some(PlatformStatus::Unknown),
            auth: AuthKind::Unknown,
            consecutive_failures: 12,
        };
        assert_eq!(
            recommended_action(TriageCategory::Dead, long_dead, false, 10),
            "mark defunct"
        );
    }

    #[test]
    fn manifest_hash_change_is_surfaced_as_evidence() {
        let manifest_body = "{\"name\":\"chatr\",\"capabilities\":[\"post\",\"reply\"]}";
        let mut entry = PlatformEntry::new(
            "chatr",
            "Chatr",
            crate::domain::TestEndpoint::get("https://chatr.example/api/health"),
        );
        entry.manifest_hash = Some("deadbeef".to_string());

        let probes = vec![probe(
            EndpointKind::Discovery,
            "https://chatr.example/agent.json",
            obs(200, "application/json", manifest_body),
        )];

        let mut evidence = Vec::new();
        let hash = manifest_evidence(&entry, &probes, &mut evidence).unwrap();
        assert_eq!(hash, hex_digest(manifest_body));
        assert!(evidence.iter().any(|e| e.contains("supply-chain drift")));
        assert!(evidence.iter().any(|e| e.contains("2 capabilities")));
    }

    #[test]
    fn sweep_targets_cover_discovery_and_registration_paths() {
        let entry = PlatformEntry::new(
            "chatr",
            "Chatr",
            crate::domain::TestEndpoint::get("https://chatr.example/api/v1/health"),
        );
        let targets = sweep_targets(&entry);
        assert_eq!(targets[0].0, EndpointKind::Primary);
        assert!(targets
            .iter()
            .any(|(kind, url)| *kind == EndpointKind::Discovery && url.ends_with("agent.json")));
        assert!(targets
            .iter()
            .any(|(kind, url)| *kind == EndpointKind::Registration && url.ends_with("/register")));
    }
}
