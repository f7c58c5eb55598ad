//! Ensemble Combiner. Blends LinUCB, posterior sampling, and the network
//! under weights that adapt to how well each family predicts outcomes.
//!
//! Raw scores live on incompatible scales (unbounded UCB values, Beta draws
//! in `[0, 1]`, network outputs), so each family's scores are min-max scaled
//! across the candidate arms of one request before weighting. A family with
//! identical scores for every candidate contributes 0.5 to each.

use crate::model::{Reward, Variant};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use skillpath_core::config::EnsembleConfig;
use skillpath_core::EnsembleStrategy;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Learning state for one model family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantPerformance {
    pub weight: f64,
    /// EMA of the credited reward.
    pub running_average: f64,
    pub updates: u64,
    pub credited_sum: f64,
    pub credited_sq_sum: f64,
}

impl VariantPerformance {
    fn new(weight: f64) -> Self {
        Self {
            weight,
            running_average: NEUTRAL_AVERAGE,
            updates: 0,
            credited_sum: 0.0,
            credited_sq_sum: 0.0,
        }
    }
}

const NEUTRAL_AVERAGE: f64 = 0.5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSummary {
    pub variant: Variant,
    pub weight: f64,
    pub running_average: f64,
    pub mean_credited_reward: f64,
    pub std_credited_reward: f64,
    pub updates: u64,
}

pub type EnsembleSnapshot = BTreeMap<Variant, VariantPerformance>;

/// How one request should be scored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoringPlan {
    /// Weighted fusion of every participating family.
    Blend,
    /// Defer entirely to one family.
    Single(Variant),
}

pub struct EnsembleCombiner {
    config: EnsembleConfig,
    state: RwLock<BTreeMap<Variant, VariantPerformance>>,
}

impl EnsembleCombiner {
    /// `variants` lists the families this engine runs; weights for any other
    /// family are dropped and the rest renormalized.
    pub fn new(config: &EnsembleConfig, variants: &BTreeSet<Variant>) -> Self {
        let mut state: BTreeMap<Variant, VariantPerformance> = variants
            .iter()
            .map(|v| {
                let weight = match v {
                    Variant::Linucb => config.linucb_weight,
                    Variant::Thompson => config.thompson_weight,
                    Variant::Neural => config.neural_weight,
                };
                (*v, VariantPerformance::new(weight))
            })
            .collect();
        normalize(&mut state);
        Self {
            config: config.clone(),
            state: RwLock::new(state),
        }
    }

    pub fn variants(&self) -> Vec<Variant> {
        self.state.read().keys().copied().collect()
    }

    pub fn weights(&self) -> BTreeMap<Variant, f64> {
        self.state
            .read()
            .iter()
            .map(|(v, p)| (*v, p.weight))
            .collect()
    }

    /// Decide how to score a request.
    ///
    /// `available` holds the families usable on every candidate arm;
    /// `context_variance` is the mean variance of the candidate contexts.
    pub fn plan(&self, available: &BTreeSet<Variant>, context_variance: f64) -> ScoringPlan {
        match self.config.strategy {
            EnsembleStrategy::WeightedVoting => ScoringPlan::Blend,
            EnsembleStrategy::BestPerformer => {
                let state = self.state.read();
                let mut best: Option<(Variant, f64)> = None;
                for variant in Variant::ALL {
                    let Some(perf) = state.get(&variant) else {
                        continue;
                    };
                    if !available.contains(&variant) {
                        continue;
                    }
                    if best.map_or(true, |(_, avg)| perf.running_average > avg) {
                        best = Some((variant, perf.running_average));
                    }
                }
                ScoringPlan::Single(best.map_or(Variant::Linucb, |(v, _)| v))
            }
            EnsembleStrategy::ContextDependent => {
                let has = |v: Variant| available.contains(&v) && self.state.read().contains_key(&v);
                if context_variance > self.config.context_variance_threshold
                    && has(Variant::Thompson)
                {
                    ScoringPlan::Single(Variant::Thompson)
                } else if has(Variant::Neural) {
                    ScoringPlan::Single(Variant::Neural)
                } else {
                    ScoringPlan::Single(Variant::Linucb)
                }
            }
        }
    }

    /// Weighted sum of per-family min-max normalized scores, one total per
    /// candidate row. Only families present in every row take part, and
    /// their weights are renormalized for this call.
    pub fn combine(&self, rows: &[BTreeMap<Variant, f64>]) -> Vec<f64> {
        if rows.is_empty() {
            return Vec::new();
        }
        let state = self.state.read();

        let participating: Vec<(Variant, f64)> = state
            .iter()
            .filter(|(v, _)| rows.iter().all(|row| row.contains_key(*v)))
            .map(|(v, p)| (*v, p.weight))
            .collect();
        let weight_sum: f64 = participating.iter().map(|(_, w)| w).sum();

        let mut totals = vec![0.0; rows.len()];
        if participating.is_empty() || weight_sum <= 0.0 {
            return totals;
        }

        for (variant, weight) in participating {
            let scores: Vec<f64> = rows.iter().map(|row| sanitize(row[&variant])).collect();
            let normalized = min_max(&scores);
            let share = weight / weight_sum;
            for (total, value) in totals.iter_mut().zip(normalized) {
                *total += share * value;
            }
        }
        totals
    }

    /// Adapt weights after an outcome.
    ///
    /// `predictions` holds each available family's pre-update reward estimate
    /// for the rewarded arm. A family is credited `1 − |r − p|`; its weight
    /// moves by `η·(credit − running_average)`, is floored at `min_weight`,
    /// and all weights are renormalized to sum to 1.
    pub fn record(&self, predictions: &[(Variant, f64)], reward: Reward) {
        let r = reward.value();
        let eta = self.config.learning_rate;
        let ema = self.config.ema_alpha;
        let floor = self.config.min_weight;

        let mut state = self.state.write();
        for (variant, predicted) in predictions {
            let Some(perf) = state.get_mut(variant) else {
                continue;
            };
            let credited = 1.0 - (r - sanitize(*predicted).clamp(0.0, 1.0)).abs();
            perf.weight = (perf.weight + eta * (credited - perf.running_average)).max(floor);
            perf.running_average = (1.0 - ema) * perf.running_average + ema * credited;
            perf.updates += 1;
            perf.credited_sum += credited;
            perf.credited_sq_sum += credited * credited;
        }
        normalize(&mut state);

        debug!(
            reward = r,
            weights = ?state.iter().map(|(v, p)| (v.as_str(), p.weight)).collect::<Vec<_>>(),
            "Ensemble weights updated"
        );
    }

    pub fn performance_summary(&self) -> Vec<PerformanceSummary> {
        self.state
            .read()
            .iter()
            .map(|(variant, perf)| {
                let (mean, std) = if perf.updates == 0 {
                    (0.0, 0.0)
                } else {
                    let n = perf.updates as f64;
                    let mean = perf.credited_sum / n;
                    let variance = (perf.credited_sq_sum / n - mean * mean).max(0.0);
                    (mean, variance.sqrt())
                };
                PerformanceSummary {
                    variant: *variant,
                    weight: perf.weight,
                    running_average: perf.running_average,
                    mean_credited_reward: mean,
                    std_credited_reward: std,
                    updates: perf.updates,
                }
            })
            .collect()
    }

    pub fn snapshot(&self) -> EnsembleSnapshot {
        self.state.read().clone()
    }

    /// Replace the learning state. Families this engine does not run are
    /// ignored; missing ones keep their current state.
    pub fn restore(&self, snapshot: &EnsembleSnapshot) {
        let mut state = self.state.write();
        for (variant, perf) in snapshot {
            if let Some(current) = state.get_mut(variant) {
                *current = perf.clone();
                current.weight = sanitize(current.weight).max(0.0);
            }
        }
        normalize(&mut state);
    }
}

fn normalize(state: &mut BTreeMap<Variant, VariantPerformance>) {
    let total: f64 = state.values().map(|p| p.weight).sum();
    if total > 0.0 && total.is_finite() {
        for perf in state.values_mut() {
            perf.weight /= total;
        }
    } else if !state.is_empty() {
        let uniform = 1.0 / state.len() as f64;
        for perf in state.values_mut() {
            perf.weight = uniform;
        }
    }
}

fn min_max(scores: &[f64]) -> Vec<f64> {
    let min = scores.iter().copied().fold(f64::INFINITY, f64::min);
    let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let range = max - min;
    if !(range > f64::EPSILON) {
        return vec![0.5; scores.len()];
    }
    scores.iter().map(|s| (s - min) / range).collect()
}

fn sanitize(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}
