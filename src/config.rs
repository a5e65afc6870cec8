use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RotorConfig {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub probe: ProbeConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub selection: SelectionConfig,
    #[serde(default)]
    pub triage: TriageConfig,
    #[serde(default)]
    pub compliance: ComplianceConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Directory holding all durable JSON stores.
    pub dir: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("state"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProbeConfig {
    /// Hard wall-clock cap for a whole probing pass.
    #[serde(default = "default_pass_budget_secs")]
    pub pass_budget_secs: u64,
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Consecutive unreachable probes before the breaker opens.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            pass_budget_secs: default_pass_budget_secs(),
            probe_timeout_secs: default_probe_timeout_secs(),
            batch_size: default_batch_size(),
            failure_threshold: default_failure_threshold(),
        }
    }
}

impl ProbeConfig {
    pub fn pass_budget(&self) -> Duration {
        Duration::from_secs(self.pass_budget_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_cache_ttl_secs(),
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.ttl_secs as i64)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SelectionConfig {
    #[serde(default = "default_selection_count")]
    pub count: usize,
    /// Platforms engaged within this many sessions are held back.
    #[serde(default = "default_recency_window")]
    pub recency_window: u64,
    #[serde(default = "default_score")]
    pub default_score: f64,
    #[serde(default = "default_scoring_timeout_secs")]
    pub scoring_timeout_secs: u64,
    /// Analytics artifact with per-platform ROI scores; selection runs
    /// unscored when unset.
    #[serde(default)]
    pub scores_path: Option<PathBuf>,
    /// Platforms that repeatedly failed during actual use, never sampled.
    #[serde(default)]
    pub demoted: Vec<String>,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            count: default_selection_count(),
            recency_window: default_recency_window(),
            default_score: default_score(),
            scoring_timeout_secs: default_scoring_timeout_secs(),
            scores_path: None,
            demoted: Vec::new(),
        }
    }
}

impl SelectionConfig {
    pub fn scoring_timeout(&self) -> Duration {
        Duration::from_secs(self.scoring_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TriageConfig {
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,
    /// Consecutive circuit failures above which a dead platform should be
    /// marked defunct.
    #[serde(default = "default_defunct_threshold")]
    pub defunct_threshold: u32,
}

impl Default for TriageConfig {
    fn default() -> Self {
        Self {
            probe_timeout_secs: default_probe_timeout_secs(),
            defunct_threshold: default_defunct_threshold(),
        }
    }
}

impl TriageConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ComplianceConfig {
    #[serde(default = "default_history_cap")]
    pub history_cap: usize,
    #[serde(default = "default_escalation_threshold")]
    pub escalation_threshold: u32,
}

impl Default for ComplianceConfig {
    fn default() -> Self {
        Self {
            history_cap: default_history_cap(),
            escalation_threshold: default_escalation_threshold(),
        }
    }
}

const fn default_pass_budget_secs() -> u64 {
    8
}

const fn default_probe_timeout_secs() -> u64 {
    3
}

const fn default_batch_size() -> usize {
    15
}

const fn default_failure_threshold() -> u32 {
    2
}

const fn default_cache_ttl_secs() -> u64 {
    2 * 60 * 60
}

const fn default_selection_count() -> usize {
    3
}

const fn default_recency_window() -> u64 {
    3
}

const fn default_score() -> f64 {
    5.0
}

const fn default_scoring_timeout_secs() -> u64 {
    15
}

const fn default_defunct_threshold() -> u32 {
    10
}

const fn default_history_cap() -> usize {
    100
}

const fn default_escalation_threshold() -> u32 {
    3
}

impl RotorConfig {
    pub fn load() -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::with_name("config/local").required(false))
            .add_source(Environment::with_prefix("ROTOR").separator("__"))
            .build()?
            .try_deserialize()
    }
}
