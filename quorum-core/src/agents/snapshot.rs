//! File-backed news and sentiment agents.
//!
//! An upstream fetcher writes one JSON snapshot per pair under
//! `{dir}/{kind}/{PAIR}.json`. The agent maps it onto a vote and decides
//! freshness from the snapshot's own `ts` against an injected `now`.

use super::{AgentError, VoteProducer};
use crate::domain::{AgentKind, Candle, Vote};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Timestamps above this are treated as milliseconds.
const MS_THRESHOLD: i64 = 10_000_000_000;

pub const DEFAULT_MAX_AGE_SECS: i64 = 90 * 60;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsSnapshot {
    #[serde(default)]
    pub ts: f64,
    /// Aggregate polarity in [-1, 1].
    #[serde(default)]
    pub bias: f64,
    /// Share of new information, 0..1.
    #[serde(default)]
    pub novelty: f64,
    /// Reach proxy, 0..1.
    #[serde(default = "half")]
    pub amp: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentimentSnapshot {
    #[serde(default)]
    pub ts: f64,
    #[serde(default)]
    pub polarity: f64,
    #[serde(default)]
    pub volume_z: f64,
    #[serde(default = "half")]
    pub signal: f64,
}

fn half() -> f64 {
    0.5
}

/// Normalize a seconds-or-milliseconds timestamp to seconds.
pub fn normalize_ts(ts: f64) -> i64 {
    let ts = ts as i64;
    if ts > MS_THRESHOLD {
        ts / 1000
    } else {
        ts
    }
}

impl NewsSnapshot {
    pub fn score(&self) -> f64 {
        let boost = 1.0 + (self.novelty * 0.5).min(0.25);
        (self.bias.clamp(-1.0, 1.0) * boost).clamp(-1.0, 1.0)
    }

    pub fn confidence(&self, fresh: bool) -> f64 {
        let conf = 0.35 + (self.novelty * 0.5).min(0.25) + (self.amp * 0.5).min(0.25);
        let conf = conf.clamp(0.0, 1.0);
        if fresh {
            conf
        } else {
            conf.min(0.35)
        }
    }
}

impl SentimentSnapshot {
    pub fn score(&self) -> f64 {
        self.polarity.clamp(-1.0, 1.0)
    }

    pub fn confidence(&self, fresh: bool) -> f64 {
        if !fresh {
            return 0.20;
        }
        let conf = 0.30 + (self.volume_z.abs() * 0.1).min(0.5) + (self.signal * 0.2).min(0.2);
        conf.clamp(0.0, 1.0)
    }
}

/// News or sentiment agent reading snapshot files.
#[derive(Debug, Clone)]
pub struct SnapshotAgent {
    kind: AgentKind,
    dir: PathBuf,
    max_age_secs: i64,
    now: i64,
}

impl SnapshotAgent {
    pub fn news(dir: impl Into<PathBuf>, now: i64) -> Self {
        Self {
            kind: AgentKind::News,
            dir: dir.into(),
            max_age_secs: DEFAULT_MAX_AGE_SECS,
            now,
        }
    }

    pub fn sentiment(dir: impl Into<PathBuf>, now: i64) -> Self {
        Self {
            kind: AgentKind::Sentiment,
            dir: dir.into(),
            max_age_secs: DEFAULT_MAX_AGE_SECS,
            now,
        }
    }

    pub fn with_max_age(mut self, secs: i64) -> Self {
        self.max_age_secs = secs;
        self
    }

    pub fn snapshot_path(&self, pair: &str) -> PathBuf {
        self.dir.join(self.kind.name()).join(format!("{pair}.json"))
    }

    fn is_fresh(&self, ts: f64) -> bool {
        self.now - normalize_ts(ts) <= self.max_age_secs
    }

    fn read(&self, path: &Path) -> Result<Option<String>, AgentError> {
        if !path.exists() {
            return Ok(None);
        }
        std::fs::read_to_string(path)
            .map(Some)
            .map_err(|e| AgentError::degraded(self.kind, format!("{}: {e}", path.display())))
    }

    fn missing(&self, pair: &str) -> Vote {
        let confidence = match self.kind {
            AgentKind::News => 0.35,
            _ => 0.20,
        };
        Vote::neutral(self.kind, pair, confidence, false, format!("no {} snapshot", self.kind))
    }
}

impl VoteProducer for SnapshotAgent {
    fn kind(&self) -> AgentKind {
        self.kind
    }

    fn vote(
        &self,
        pair: &str,
        _window: &[Candle],
        _inputs_fresh: bool,
    ) -> Result<Vote, AgentError> {
        let path = self.snapshot_path(pair);
        let Some(text) = self.read(&path)? else {
            return Ok(self.missing(pair));
        };
        let malformed = |e: serde_json::Error| {
            AgentError::degraded(self.kind, format!("{}: {e}", path.display()))
        };

        let vote = match self.kind {
            AgentKind::News => {
                let snap: NewsSnapshot = serde_json::from_str(&text).map_err(malformed)?;
                let fresh = self.is_fresh(snap.ts);
                Vote::new(
                    self.kind,
                    pair,
                    snap.score(),
                    snap.confidence(fresh),
                    fresh,
                    format!(
                        "bias={:.2} novelty={:.2} amp={:.2}",
                        snap.bias, snap.novelty, snap.amp
                    ),
                )
            }
            AgentKind::Sentiment => {
                let snap: SentimentSnapshot = serde_json::from_str(&text).map_err(malformed)?;
                let fresh = self.is_fresh(snap.ts);
                Vote::new(
                    self.kind,
                    pair,
                    snap.score(),
                    snap.confidence(fresh),
                    fresh,
                    format!(
                        "polarity={:.2} volume_z={:.2} signal={:.2}",
                        snap.polarity, snap.volume_z, snap.signal
                    ),
                )
            }
            other => {
                return Err(AgentError::degraded(other, "no snapshot format for this agent"));
            }
        };

        if !vote.score.is_finite() || !vote.confidence.is_finite() {
            return Err(AgentError::degraded(self.kind, "non-finite snapshot values"));
        }
        Ok(vote)
    }
}
