//! Composite ranking: semantic similarity blended with recency decay,
//! importance, and access frequency.
//!
//! The weights and the recency time-constant are configuration, not
//! constants, so tests can pin them and deployments can tune them. Ties are
//! broken deterministically (`updated_at` descending, then id ascending).


use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::index::SearchHit;
use crate::record::MemoryRecord;

/// Ranker weights and decay parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RankerConfig {
    /// Weight of the index similarity score.
    pub w_semantic: f64,
    /// Weight of the recency decay term.
    pub w_recency: f64,
    /// Weight of the record's importance.
    pub w_importance: f64,
    /// Weight of the access-frequency term.
    pub w_frequency: f64,
    /// Recency time constant τ, in hours.
    pub tau_hours: f64,
}

impl Default for RankerConfig {
    fn default() -> Self {
        Self {
            w_semantic: 0.55,
            w_recency: 0.20,
            w_importance: 0.15,
            w_frequency: 0.10,
            tau_hours: 72.0,
        }
    }
}

/// Which term contributed most to a result's score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoreReason {
    /// Semantic similarity dominated.
    Semantic,
    /// Recency dominated.
    Recent,
    /// Importance dominated.
    Important,
    /// Similarity dominated, but it came from lexical hashing.
    Lexical,
}

impl ScoreReason {
    /// Stable string form.
    pub fn as_str(&self) -> &'static str {
        match self {
            ScoreReason::Semantic => "semantic",
            ScoreReason::Recent => "recent",
            ScoreReason::Important => "important",
            ScoreReason::Lexical => "lexical",
        }
    }
}

/// A record with its composite score and reason tag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredMemory {
    /// The record.
    pub record: MemoryRecord,
    /// Composite score in `[0, 1]`.
    pub score: f64,
    /// Top contributor.
    pub reason: ScoreReason,
}

/// Rescores index candidates into ranked, reasoned results.
#[derive(Debug, Clone, Default)]
pub struct CompositeScorer {
    config: RankerConfig,
}

impl CompositeScorer {
    /// Creates a scorer with the given configuration.
    pub fn new(config: RankerConfig) -> Self {
        Self { config }
    }

    /// The active configuration.
    pub fn config(&self) -> &RankerConfig {
        &self.config
    }

    /// Rescores candidates and sorts them score-descending with
    /// deterministic tie-breaks.
    ///
    /// `access_ceiling` is the rolling maximum access count used to
    /// normalize the frequency term; `lexical_similarity` marks scores that
    /// came from the lexical tier so the reason tag reads `"lexical"`.
    pub fn rescore(
        &self,
        hits: Vec<SearchHit>,
        now: DateTime<Utc>,
        access_ceiling: u64,
        lexical_similarity: bool,
    ) -> Vec<ScoredMemory> {
        let mut scored: Vec<ScoredMemory> = hits
            .into_iter()
            .map(|hit| self.score_one(hit, now, access_ceiling, lexical_similarity))
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| b.record.updated_at.cmp(&a.record.updated_at))
                .then_with(|| a.record.id.cmp(&b.record.id))
        });
        scored
    }

    fn score_one(
        &self,
        hit: SearchHit,
        now: DateTime<Utc>,
        access_ceiling: u64,
        lexical_similarity: bool,
    ) -> ScoredMemory {
        let record = hit.payload.into_record();

        let s_sem = f64::from(hit.score).clamp(0.0, 1.0);
        let s_rec = self.recency(record.last_accessed_at, now);
        let s_imp = record.importance.clamp(0.0, 1.0);
        let s_freq = frequency(record.access_count, access_ceiling);

        let score = (self.config.w_semantic * s_sem
            + self.config.w_recency * s_rec
            + self.config.w_importance * s_imp
            + self.config.w_frequency * s_freq)
            .clamp(0.0, 1.0);

        let reason = self.reason(s_sem, s_rec, s_imp, lexical_similarity);

        debug!(
            id = %record.id,
            s_sem,
            s_rec,
            s_imp,
            s_freq,
            score,
            reason = reason.as_str(),
            "Rescored candidate"
        );

        ScoredMemory {
            record,
            score,
            reason,
        }
    }

    /// `exp(-Δt / τ)` over the age of the last access, in hours.
    pub fn recency(&self, last_accessed_at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
        let age_ms = now
            .signed_duration_since(last_accessed_at)
            .num_milliseconds()
            .max(0) as f64;
        let age_hours = age_ms / 3_600_000.0;
        (-age_hours / self.config.tau_hours).exp()
    }

    fn reason(&self, s_sem: f64, s_rec: f64, s_imp: f64, lexical: bool) -> ScoreReason {
        let c_sem = self.config.w_semantic * s_sem;
        let c_rec = self.config.w_recency * s_rec;
        let c_imp = self.config.w_importance * s_imp;

        if c_sem >= c_rec && c_sem >= c_imp {
            if lexical {
                ScoreReason::Lexical
            } else {
                ScoreReason::Semantic
            }
        } else if c_rec >= c_imp {
            ScoreReason::Recent
        } else {
            ScoreReason::Important
        }
    }
}

/// `min(1, log(1 + n) / log(1 + ceiling))`, zero when no ceiling is known.
fn frequency(access_count: u64, access_ceiling: u64) -> f64 {
    if access_ceiling == 0 {
        return 0.0;
    }
    let n = (1.0 + access_count as f64).ln();
    let max = (1.0 + access_ceiling as f64).ln();
    (n / max).min(1.0)
}
