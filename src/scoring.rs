//! External scoring inputs for the selector.
//!
//! ROI scores and mention state are computed elsewhere; this module only
//! defines the provider seams and the time-bounded gather helpers. A slow
//! or failing provider degrades to "no data", never to a failed selection.

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct PlatformScore {
    pub score: f64,
    #[serde(default)]
    pub interactions: u64,
    #[serde(default)]
    pub cost_per_interaction: f64,
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct MentionState {
    #[serde(default)]
    pub unread: bool,
    /// A mention that names this agent directly, not just its feed.
    #[serde(default)]
    pub direct: bool,
}

#[async_trait]
pub trait ScoreProvider: Send + Sync {
    async fn scores(&self) -> Result<HashMap<String, PlatformScore>>;
}

#[async_trait]
pub trait MentionProvider: Send + Sync {
    async fn mentions(&self) -> Result<HashMap<String, MentionState>>;
}

#[derive(Debug, Default)]
pub struct NullScores;

#[async_trait]
impl ScoreProvider for NullScores {
    async fn scores(&self) -> Result<HashMap<String, PlatformScore>> {
        Ok(HashMap::new())
    }
}

#[derive(Debug, Default)]
pub struct NullMentions;

#[async_trait]
impl MentionProvider for NullMentions {
    async fn mentions(&self) -> Result<HashMap<String, MentionState>> {
        Ok(HashMap::new())
    }
}

/// Reads the analytics artifact the cost-accounting tooling writes:
/// a JSON object keyed by platform identifier.
#[derive(Debug)]
pub struct FileScores {
    path: PathBuf,
}

impl FileScores {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ScoreProvider for FileScores {
    async fn scores(&self) -> Result<HashMap<String, PlatformScore>> {
        let raw = tokio::fs::read(&self.path).await?;
        Ok(serde_json::from_slice(&raw)?)
    }
}

pub async fn gather_scores(
    provider: &dyn ScoreProvider,
    timeout: Duration,
) -> HashMap<String, PlatformScore> {
    match tokio::time::timeout(timeout, provider.scores()).await {
        Ok(Ok(scores)) => scores,
        Ok(Err(err)) => {
            tracing::warn!(error = %err, "score provider failed, selecting without ROI data");
            HashMap::new()
        }
        Err(_) => {
            tracing::warn!(
                timeout_secs = timeout.as_secs(),
                "score provider timed out, selecting without ROI data"
            );
            HashMap::new()
        }
    }
}

pub async fn gather_mentions(
    provider: &dyn MentionProvider,
    timeout: Duration,
) -> HashMap<String, MentionState> {
    match tokio::time::timeout(timeout, provider.mentions()).await {
        Ok(Ok(mentions)) => mentions,
        Ok(Err(err)) => {
            tracing::warn!(error = %err, "mention provider failed, selecting without boosts");
            HashMap::new()
        }
        Err(_) => {
            tracing::warn!(
                timeout_secs = timeout.as_secs(),
                "mention provider timed out, selecting without boosts"
            );
            HashMap::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct SlowScores;

    #[async_trait]
    impl ScoreProvider for SlowScores {
        async fn scores(&self) -> Result<HashMap<String, PlatformScore>> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(HashMap::new())
        }
    }

    struct FailingScores;

    #[async_trait]
    impl ScoreProvider for FailingScores {
        async fn scores(&self) -> Result<HashMap<String, PlatformScore>> {
            Err(crate::err!("analytics endpoint returned 500"))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn slow_provider_degrades_to_empty() {
        let scores = gather_scores(&SlowScores, Duration::from_secs(15)).await;
        assert!(scores.is_empty());
    }

    #[tokio::test]
    async fn failing_provider_degrades_to_empty() {
        let scores = gather_scores(&FailingScores, Duration::from_secs(1)).await;
        assert!(scores.is_empty());
    }

    #[tokio::test]
    async fn file_scores_read_the_analytics_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scores.json");
        std::fs::write(
            &path,
            r#"{"chatr": {"score": 8.5, "interactions": 12, "cost_per_interaction": 0.03}}"#,
        )
        .unwrap();

        let scores = FileScores::new(path).scores().await.unwrap();
        let chatr = scores.get("chatr").unwrap();
        assert_eq!(chatr.score, 8.5);
        assert_eq!(chatr.interactions, 12);
        assert_eq!(chatr.cost_per_interaction, 0.03);
    }

    #[tokio::test]
    async fn missing_scores_file_degrades_to_empty() {
        let provider = FileScores::new("/nonexistent/scores.json");
        let scores = gather_scores(&provider, Duration::from_secs(1)).await;
        assert!(scores.is_empty());
    }
}
