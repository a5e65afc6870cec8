//! Durable JSON stores with atomic replacement.
//!
//! Every write lands in a sibling `.tmp` file first and is renamed into
//! place, so overlapping cycles degrade to last-writer-wins instead of
//! partial records. Corrupt files are logged and replaced with defaults
//! rather than aborting the cycle.

use crate::domain::{
    CircuitState, ComplianceState, LivenessCacheEntry, Mandate, Registry, Trace,
};
use crate::error::{Context, Result};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

const REGISTRY_FILE: &str = "registry.json";
const CIRCUITS_FILE: &str = "circuits.json";
const CACHE_FILE: &str = "liveness-cache.json";
const MANDATES_FILE: &str = "mandates.json";
const TRACES_FILE: &str = "traces.json";
const COMPLIANCE_FILE: &str = "compliance.json";
const VIOLATIONS_FILE: &str = "violations.json";

pub type CircuitMap = BTreeMap<String, CircuitState>;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CacheDocument {
    #[serde(default)]
    pub last_session: Option<u64>,
    #[serde(default)]
    pub entries: BTreeMap<String, LivenessCacheEntry>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ViolationRecord {
    pub session: u64,
    pub compliance_pct: u8,
    pub missing: Vec<String>,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Clone, Debug)]
pub struct StateStore {
    dir: PathBuf,
}

impl StateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, file: &str) -> PathBuf {
        self.dir.join(file)
    }

    pub fn load_registry(&self) -> Registry {
        read_or_default(&self.path(REGISTRY_FILE))
    }

    pub fn save_registry(&self, registry: &Registry) -> Result<()> {
        write_atomic(&self.path(REGISTRY_FILE), registry)
    }

    pub fn load_circuits(&self) -> CircuitMap {
        read_or_default(&self.path(CIRCUITS_FILE))
    }

    pub fn save_circuits(&self, circuits: &CircuitMap) -> Result<()> {
        write_atomic(&self.path(CIRCUITS_FILE), circuits)
    }

    pub fn load_cache(&self) -> CacheDocument {
        read_or_default(&self.path(CACHE_FILE))
    }

    /// Cache persistence is best-effort: a failed write is logged and
    /// swallowed so it can never abort a probing pass.
    pub fn save_cache_best_effort(&self, cache: &CacheDocument) {
        if let Err(err) = write_atomic(&self.path(CACHE_FILE), cache) {
            tracing::warn!(error = %err, "liveness cache write failed, continuing");
        }
    }

    pub fn load_mandates(&self) -> Vec<Mandate> {
        read_or_default(&self.path(MANDATES_FILE))
    }

    /// Mandates are an append-only log; a later cycle's entry supersedes
    /// earlier ones for the same session without deleting them.
    pub fn append_mandate(&self, mandate: &Mandate) -> Result<()> {
        let mut mandates = self.load_mandates();
        mandates.push(mandate.clone());
        write_atomic(&self.path(MANDATES_FILE), &mandates)
    }

    pub fn mandate_for(&self, session: u64) -> Option<Mandate> {
        self.load_mandates()
            .into_iter()
            .rev()
            .find(|mandate| mandate.session == session)
    }

    pub fn load_traces(&self) -> BTreeMap<u64, Trace> {
        read_or_default(&self.path(TRACES_FILE))
    }

    pub fn trace_for(&self, session: u64) -> Option<Trace> {
        self.load_traces().remove(&session)
    }

    pub fn save_trace(&self, trace: &Trace) -> Result<()> {
        let mut traces = self.load_traces();
        traces.insert(trace.session, trace.clone());
        write_atomic(&self.path(TRACES_FILE), &traces)
    }

    pub fn load_compliance(&self) -> ComplianceState {
        read_or_default(&self.path(COMPLIANCE_FILE))
    }

    pub fn save_compliance(&self, state: &ComplianceState) -> Result<()> {
        write_atomic(&self.path(COMPLIANCE_FILE), state)
    }

    pub fn load_violations(&self) -> Vec<ViolationRecord> {
        read_or_default(&self.path(VIOLATIONS_FILE))
    }

    pub fn append_violation(&self, record: &ViolationRecord) -> Result<()> {
        let mut violations = self.load_violations();
        violations.push(record.clone());
        write_atomic(&self.path(VIOLATIONS_FILE), &violations)
    }
}

fn read_or_default<T>(path: &Path) -> T
where
    T: DeserializeOwned + Default,
{
    let raw = match fs::read(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return T::default(),
        Err(err) => {
            tracing::warn!(
                path = %path.display(),
                error = %err,
                "store unreadable, starting from defaults"
            );
            return T::default();
        }
    };

    match serde_json::from_slice(&raw) {
        Ok(value) => value,
        Err(err) => {
            tracing::warn!(
                path = %path.display(),
                error = %err,
                "store is corrupt JSON, starting from defaults"
            );
            T::default()
        }
    }
}

fn write_atomic<T>(path: &Path, value: &T) -> Result<()>
where
    T: Serialize,
{
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create store directory {}", parent.display()))?;
    }

    let raw = serde_json::to_vec_pretty(value)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, raw)
        .with_context(|| format!("failed to write {}", tmp.display()))?;
    fs::rename(&tmp, path)
        .with_context(|| format!("failed to replace {}", path.display()))?;
    Ok(())
}
