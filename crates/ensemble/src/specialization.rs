//! Specialization tracking.
//!
//! The tracker is the single owner of "how good is expert E at domain D".
//! Scores move by exponential moving average of observed answer quality and
//! are strictly per-domain: feedback for one domain never moves another.

use crate::expert::state::clamp_unit;
use crate::types::ExpertId;
use chrono::{DateTime, Utc};
use consilium_core::config::SpecializationConfig;
use consilium_core::Domain;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

/// Direction of recent quality observations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Improving,
    Stable,
    Declining,
}

/// Tracked performance of one expert in one domain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecializationRecord {
    #[serde(rename = "expertId")]
    pub expert_id: ExpertId,

    pub domain: Domain,

    /// EMA of observed quality, in `[0, 1]`
    #[serde(rename = "specializationScore")]
    pub specialization_score: f32,

    /// Quality observations received; never decreases
    #[serde(rename = "queriesAnswered")]
    pub queries_answered: u64,

    /// Most recent observations, oldest first
    #[serde(rename = "performanceHistory")]
    pub performance_history: VecDeque<f32>,

    pub trend: Trend,

    /// Answers that missed the coordinator deadline
    pub timeouts: u64,

    /// EMA of answering in time, in `[0, 1]`
    pub reliability: f32,

    #[serde(rename = "lastUpdated")]
    pub last_updated: DateTime<Utc>,
}

impl SpecializationRecord {
    fn new(expert_id: &str, domain: &Domain, prior: f32) -> Self {
        Self {
            expert_id: expert_id.to_string(),
            domain: domain.clone(),
            specialization_score: prior,
            queries_answered: 0,
            performance_history: VecDeque::new(),
            trend: Trend::Stable,
            timeouts: 0,
            reliability: 1.0,
            last_updated: Utc::now(),
        }
    }
}

type RecordKey = (ExpertId, Domain);

/// Concurrent store of specialization records.
///
/// Updates to different (expert, domain) pairs proceed in parallel; updates
/// to the same pair serialize on that pair's mutex.
#[derive(Debug)]
pub struct SpecializationTracker {
    config: SpecializationConfig,
    records: RwLock<HashMap<RecordKey, Arc<Mutex<SpecializationRecord>>>>,
}

impl SpecializationTracker {
    pub fn new(config: SpecializationConfig) -> Self {
        Self {
            config,
            records: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &SpecializationConfig {
        &self.config
    }

    /// Current score, or the prior for a pair never observed.
    pub fn score(&self, expert_id: &str, domain: &Domain) -> f32 {
        self.record(expert_id, domain)
            .map(|r| r.specialization_score)
            .unwrap_or(self.config.prior)
    }

    /// Fold an observed answer quality into the pair's score.
    ///
    /// Quality is clamped to `[0, 1]`. Returns the updated record.
    pub fn record_feedback(&self, expert_id: &str, domain: &Domain, quality: f32) -> SpecializationRecord {
        let quality = clamp_unit(quality);
        let alpha = self.config.alpha;
        let history_size = self.config.history_size.max(1);
        let threshold = self.config.trend_threshold;

        self.update(expert_id, domain, |record| {
            record.specialization_score =
                clamp_unit((1.0 - alpha) * record.specialization_score + alpha * quality);
            record.queries_answered += 1;

            record.performance_history.push_back(quality);
            while record.performance_history.len() > history_size {
                record.performance_history.pop_front();
            }
            record.trend = compute_trend(&record.performance_history, threshold);
        })
    }

    /// Note that the expert answered within the deadline.
    pub fn record_answered(&self, expert_id: &str, domain: &Domain) -> SpecializationRecord {
        let alpha = self.config.alpha;
        self.update(expert_id, domain, |record| {
            record.reliability = clamp_unit((1.0 - alpha) * record.reliability + alpha);
        })
    }

    /// Note a missed deadline. Lowers reliability, never the score.
    pub fn record_timeout(&self, expert_id: &str, domain: &Domain) -> SpecializationRecord {
        let alpha = self.config.alpha;
        let record = self.update(expert_id, domain, |record| {
            record.timeouts += 1;
            record.reliability = clamp_unit((1.0 - alpha) * record.reliability);
        });

        tracing::debug!(
            "Expert '{}' timed out in '{}' ({} total, reliability {:.3})",
            expert_id,
            domain,
            record.timeouts,
            record.reliability
        );
        record
    }

    /// Snapshot of one pair's record.
    pub fn record(&self, expert_id: &str, domain: &Domain) -> Option<SpecializationRecord> {
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        records
            .get(&(expert_id.to_string(), domain.clone()))
            .map(|slot| slot.lock().unwrap_or_else(PoisonError::into_inner).clone())
    }

    /// Snapshot of every record, sorted by domain then expert id.
    pub fn records(&self) -> Vec<SpecializationRecord> {
        let slots: Vec<_> = self
            .records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();

        let mut records: Vec<_> = slots
            .iter()
            .map(|slot| slot.lock().unwrap_or_else(PoisonError::into_inner).clone())
            .collect();
        records.sort_by(|a, b| {
            a.domain
                .cmp(&b.domain)
                .then_with(|| a.expert_id.cmp(&b.expert_id))
        });
        records
    }

    /// Experts observed in `domain`, best first (ties by id).
    pub fn ranking(&self, domain: &Domain) -> Vec<(ExpertId, f32)> {
        let mut ranking: Vec<_> = self
            .records()
            .into_iter()
            .filter(|r| &r.domain == domain)
            .map(|r| (r.expert_id, r.specialization_score))
            .collect();
        ranking.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranking
    }

    fn slot(&self, expert_id: &str, domain: &Domain) -> Arc<Mutex<SpecializationRecord>> {
        let key = (expert_id.to_string(), domain.clone());

        if let Some(slot) = self
            .records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
        {
            return Arc::clone(slot);
        }

        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(records.entry(key).or_insert_with(|| {
            Arc::new(Mutex::new(SpecializationRecord::new(
                expert_id,
                domain,
                self.config.prior,
            )))
        }))
    }

    fn update(
        &self,
        expert_id: &str,
        domain: &Domain,
        apply: impl FnOnce(&mut SpecializationRecord),
    ) -> SpecializationRecord {
        let slot = self.slot(expert_id, domain);
        let mut record = slot.lock().unwrap_or_else(PoisonError::into_inner);
        apply(&mut record);
        record.last_updated = Utc::now();
        record.clone()
    }
}

/// Least-squares slope of `history` against its index, classified against
/// `threshold`. Fewer than three points are always stable.
pub fn compute_trend(history: &VecDeque<f32>, threshold: f32) -> Trend {
    let n = history.len();
    if n < 3 {
        return Trend::Stable;
    }

    let n_f = n as f32;
    let mean_x = (n_f - 1.0) / 2.0;
    let mean_y = history.iter().sum::<f32>() / n_f;

    let (mut num, mut den) = (0.0f32, 0.0f32);
    for (i, y) in history.iter().enumerate() {
        let dx = i as f32 - mean_x;
        num += dx * (y - mean_y);
        den += dx * dx;
    }

    let slope = if den > 0.0 { num / den } else { 0.0 };
    if slope > threshold {
        Trend::Improving
    } else if slope < -threshold {
        Trend::Declining
    } else {
        Trend::Stable
    }
}
