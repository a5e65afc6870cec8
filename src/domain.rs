#![forbid(unsafe_code)]

//! Durable record types shared across the prober, selector and reconciler.
//!
//! Every field that grew ad hoc in older deployments is modelled here as a
//! named optional field so the stores stay forward-readable.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlatformStatus {
    Live,
    CredsOk,
    Active,
    NeedsProbe,
    BadCreds,
    NoCreds,
    Rejected,
    Defunct,
    Unknown,
}

impl PlatformStatus {
    /// Statuses that mean "usable for a session right now".
    pub fn is_working(self) -> bool {
        matches!(
            self,
            PlatformStatus::Live | PlatformStatus::CredsOk | PlatformStatus::Active
        )
    }

    /// Terminal statuses are never probed or selected until explicitly revived.
    pub fn is_terminal(self) -> bool {
        matches!(self, PlatformStatus::Rejected | PlatformStatus::Defunct)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PlatformStatus::Live => "live",
            PlatformStatus::CredsOk => "creds_ok",
            PlatformStatus::Active => "active",
            PlatformStatus::NeedsProbe => "needs_probe",
            PlatformStatus::BadCreds => "bad_creds",
            PlatformStatus::NoCreds => "no_creds",
            PlatformStatus::Rejected => "rejected",
            PlatformStatus::Defunct => "defunct",
            PlatformStatus::Unknown => "unknown",
        }
    }
}

impl fmt::Display for PlatformStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthKind {
    None,
    ApiKey,
    #[default]
    Unknown,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TestEndpoint {
    #[serde(default = "default_method")]
    pub method: String,
    pub url: String,
    /// Overrides the default 2xx-3xx healthy predicate when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expect_status: Option<u16>,
}

fn default_method() -> String {
    "GET".to_string()
}

impl TestEndpoint {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: default_method(),
            url: url.into(),
            expect_status: None,
        }
    }
}

/// One known external platform. The identifier is immutable once assigned.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PlatformEntry {
    pub id: String,
    pub name: String,
    pub test_endpoint: TestEndpoint,
    #[serde(default = "default_status")]
    pub status: PlatformStatus,
    #[serde(default)]
    pub auth: AuthKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_tested: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_engaged_session: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// SHA-256 of the last manifest body seen for this platform.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manifest_hash: Option<String>,
}

fn default_status() -> PlatformStatus {
    PlatformStatus::Unknown
}

impl PlatformEntry {
    pub fn new(id: impl Into<String>, name: impl Into<String>, endpoint: TestEndpoint) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            test_endpoint: endpoint,
            status: PlatformStatus::Unknown,
            auth: AuthKind::Unknown,
            last_tested: None,
            last_engaged_session: None,
            notes: None,
            manifest_hash: None,
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Registry {
    #[serde(default)]
    pub platforms: BTreeMap<String, PlatformEntry>,
}

impl Registry {
    pub fn get(&self, id: &str) -> Option<&PlatformEntry> {
        self.platforms.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut PlatformEntry> {
        self.platforms.get_mut(id)
    }

    pub fn insert(&mut self, entry: PlatformEntry) {
        self.platforms.insert(entry.id.clone(), entry);
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BreakerStatus {
    Open,
    HalfOpen,
}

/// Per-platform circuit record. An absent `breaker` field is the implicit
/// closed state.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CircuitState {
    #[serde(default)]
    pub consecutive_failures: u32,
    #[serde(default)]
    pub total_failures: u64,
    #[serde(default)]
    pub total_successes: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub breaker: Option<BreakerStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_success: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_failure: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opened_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub open_reason: Option<String>,
}

impl CircuitState {
    pub fn is_open(&self) -> bool {
        self.breaker.is_some()
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LivenessCacheEntry {
    pub platform: String,
    /// Missing on legacy entries written before timestamps were recorded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checked_at: Option<DateTime<Utc>>,
    pub reachable: bool,
    pub healthy: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<u64>,
}

/// Recorded output of one selection cycle.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Mandate {
    pub session: u64,
    pub platforms: Vec<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SkippedPlatform {
    pub platform: String,
    pub reason: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FollowUp {
    pub kind: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

/// What the calling process reports it actually did. Written externally;
/// the reconciler only appends escalation follow-ups.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Trace {
    pub session: u64,
    #[serde(default)]
    pub platforms_engaged: Vec<String>,
    #[serde(default)]
    pub skipped_platforms: Vec<SkippedPlatform>,
    #[serde(default)]
    pub follow_ups: Vec<FollowUp>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ComplianceRecord {
    pub session: u64,
    pub compliance_pct: u8,
    pub violation: bool,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ComplianceState {
    #[serde(default)]
    pub consecutive_violations: u32,
    #[serde(default)]
    pub history: Vec<ComplianceRecord>,
}

impl ComplianceState {
    pub fn record_for(&self, session: u64) -> Option<&ComplianceRecord> {
        self.history.iter().find(|record| record.session == session)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TriageCategory {
    AuthFixable,
    RateLimited,
    ApiChanged,
    Dead,
    Unknown,
}

impl TriageCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            TriageCategory::AuthFixable => "auth-fixable",
            TriageCategory::RateLimited => "rate-limited",
            TriageCategory::ApiChanged => "api-changed",
            TriageCategory::Dead => "dead",
            TriageCategory::Unknown => "unknown",
        }
    }
}

impl fmt::Display for TriageCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TriageResult {
    pub platform: String,
    pub category: TriageCategory,
    pub evidence: Vec<String>,
    pub action: String,
}
