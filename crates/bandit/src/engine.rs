//! Selection & update protocol.
//!
//! `recommend` resolves the learner's skill gaps for a role, builds one
//! context per eligible arm, scores them under the configured policy, and
//! returns the argmax. Outcomes arrive later through `update`, which
//! validates everything before touching any arm.
//!
//! Lock order is always arm → RNG → ensemble.

use crate::arm::{Arm, ArmRegistry};
use crate::ensemble::{EnsembleCombiner, PerformanceSummary, ScoringPlan};
use crate::features::{ContextVector, FeatureVectorBuilder, FEATURE_NAMES};
use crate::linucb::ScoreBreakdown;
use crate::model::{ArmModel, Reward, Variant};
use crate::snapshot::{ArmSnapshot, EngineSnapshot};
use crate::thompson::PosteriorStats;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLockReadGuard};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use skillpath_core::{
    normalize_skill_key, BanditConfig, LearnerSignals, OutcomeComponents, Policy, SkillCatalog,
    SkillPathError, SkillPathResult,
};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

const TOP_FEATURES: usize = 3;
const MAX_ALTERNATIVES: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureContribution {
    pub name: String,
    pub value: f64,
    pub contribution: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alternative {
    pub skill: String,
    pub score: f64,
}

/// A single next-skill recommendation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub decision_id: Uuid,
    pub role: String,
    pub skill: String,
    pub display_name: String,
    pub score: f64,
    /// Expected reward in `[0, 1]` under the scorer that picked the skill.
    pub confidence: f64,
    pub policy: Policy,
    /// Model families whose scores decided this pick.
    pub scored_by: Vec<Variant>,
    pub exploitation: f64,
    pub exploration: f64,
    pub top_features: Vec<FeatureContribution>,
    pub alternatives: Vec<Alternative>,
    pub skill_gaps: usize,
    /// Context the winning arm was scored with; pass back to
    /// `update_with_context` to credit exactly this decision.
    pub context: Vec<f64>,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RecommendOutcome {
    Recommended(Recommendation),
    /// The learner already knows every skill the role requires.
    NoGap { role: String },
}

impl RecommendOutcome {
    pub fn recommendation(&self) -> Option<&Recommendation> {
        match self {
            RecommendOutcome::Recommended(rec) => Some(rec),
            RecommendOutcome::NoGap { .. } => None,
        }
    }

    pub fn is_no_gap(&self) -> bool {
        matches!(self, RecommendOutcome::NoGap { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArmStats {
    pub skill: String,
    pub observations: u64,
    pub theta: Vec<f64>,
    pub posterior: PosteriorStats,
    pub network_updates: Option<u64>,
    pub network_available: bool,
}

struct Scoring {
    scores: Vec<f64>,
    confidences: Vec<f64>,
    scored_by: Vec<Variant>,
}

/// Long-lived, shareable recommender. All methods take `&self`.
pub struct SkillRecommender {
    config: BanditConfig,
    catalog: SkillCatalog,
    features: FeatureVectorBuilder,
    registry: ArmRegistry,
    ensemble: Option<EnsembleCombiner>,
    with_neural: bool,
    rng: Mutex<StdRng>,
}

impl SkillRecommender {
    pub fn new(catalog: SkillCatalog, config: BanditConfig) -> SkillPathResult<Self> {
        config.validate()?;

        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let features = FeatureVectorBuilder;
        let with_neural = config.neural.enabled
            && matches!(config.policy, Policy::Neural | Policy::Ensemble);
        let registry = ArmRegistry::new(
            catalog.skill_keys(),
            features.dimension(),
            &config,
            with_neural,
            &mut rng,
        );

        let ensemble = (config.policy == Policy::Ensemble).then(|| {
            let variants: BTreeSet<Variant> = Variant::ALL
                .into_iter()
                .filter(|v| *v != Variant::Neural || with_neural)
                .collect();
            EnsembleCombiner::new(&config.ensemble, &variants)
        });

        info!(
            policy = config.policy.as_str(),
            skills = catalog.len(),
            dimension = features.dimension(),
            networks = with_neural,
            seeded = config.seed.is_some(),
            "Skill recommender initialised"
        );

        Ok(Self {
            config,
            catalog,
            features,
            registry,
            ensemble,
            with_neural,
            rng: Mutex::new(rng),
        })
    }

    pub fn policy(&self) -> Policy {
        self.config.policy
    }

    pub fn catalog(&self) -> &SkillCatalog {
        &self.catalog
    }

    pub fn dimension(&self) -> usize {
        self.registry.dim()
    }

    /// Build the context vector for one skill and learner.
    pub fn context_for(&self, skill: &str, signals: &LearnerSignals) -> SkillPathResult<ContextVector> {
        let meta = self
            .catalog
            .skill(skill)
            .ok_or_else(|| SkillPathError::UnknownArm(skill.to_string()))?;
        Ok(self.features.build(meta, signals))
    }

    // ─── Selection ──────────────────────────────────────────────────────────

    pub fn recommend(
        &self,
        role: &str,
        known_skills: &[String],
        signals: &LearnerSignals,
    ) -> SkillPathResult<RecommendOutcome> {
        let start = Instant::now();
        metrics::counter!("recommend.requests").increment(1);

        let result = self.select(role, known_skills, signals);
        match &result {
            Ok(RecommendOutcome::Recommended(rec)) => {
                debug!(
                    decision_id = %rec.decision_id,
                    role = %rec.role,
                    skill = %rec.skill,
                    score = rec.score,
                    confidence = rec.confidence,
                    gaps = rec.skill_gaps,
                    "Recommendation made"
                );
            }
            Ok(RecommendOutcome::NoGap { role }) => {
                metrics::counter!("recommend.no_gap").increment(1);
                debug!(role = %role, "No skill gap");
            }
            Err(e) => {
                metrics::counter!("recommend.errors").increment(1);
                warn!(role, error = %e, "Recommendation rejected");
            }
        }
        metrics::histogram!("recommend.latency_us").record(start.elapsed().as_micros() as f64);
        result
    }

    fn select(
        &self,
        role: &str,
        known_skills: &[String],
        signals: &LearnerSignals,
    ) -> SkillPathResult<RecommendOutcome> {
        let role_key = normalize_skill_key(role);
        let required = self
            .catalog
            .required_skills(&role_key)
            .ok_or_else(|| SkillPathError::UnknownRole(role.to_string()))?;

        let known: BTreeSet<String> = known_skills.iter().map(|s| normalize_skill_key(s)).collect();
        let eligible: BTreeSet<&str> = required
            .iter()
            .map(String::as_str)
            .filter(|key| !known.contains(*key))
            .collect();
        if eligible.is_empty() {
            return Ok(RecommendOutcome::NoGap { role: role_key });
        }
        let keys: Vec<&str> = eligible.into_iter().collect();

        let contexts = keys
            .iter()
            .map(|key| self.context_for(key, signals))
            .collect::<SkillPathResult<Vec<_>>>()?;

        // Guards are taken in key order and held until the response is built.
        let arms = keys
            .iter()
            .map(|key| {
                self.registry
                    .get(key)
                    .map(|arm| arm.read())
                    .ok_or_else(|| SkillPathError::UnknownArm(key.to_string()))
            })
            .collect::<SkillPathResult<Vec<_>>>()?;

        let scoring = self.score_candidates(&arms, &contexts)?;
        let ranking = rank(&keys, &scoring.scores);
        let winner = ranking[0];

        let linear = arms[winner].linear();
        let breakdown = linear.breakdown(&contexts[winner])?;
        let top_features = top_features(&contexts[winner], &linear.contributions(&contexts[winner])?);
        let alternatives = ranking
            .iter()
            .skip(1)
            .take(MAX_ALTERNATIVES)
            .map(|&i| Alternative {
                skill: keys[i].to_string(),
                score: scoring.scores[i],
            })
            .collect();

        let display_name = self
            .catalog
            .skill(keys[winner])
            .map(|meta| meta.display_name())
            .unwrap_or_else(|| keys[winner].to_string());

        Ok(RecommendOutcome::Recommended(Recommendation {
            decision_id: Uuid::new_v4(),
            role: role_key,
            skill: keys[winner].to_string(),
            display_name,
            score: scoring.scores[winner],
            confidence: clamp_unit(scoring.confidences[winner]),
            policy: self.config.policy,
            scored_by: scoring.scored_by,
            exploitation: breakdown.exploitation,
            exploration: breakdown.exploration,
            top_features,
            alternatives,
            skill_gaps: keys.len(),
            context: contexts[winner].to_vec(),
            generated_at: Utc::now(),
        }))
    }

    fn score_candidates(
        &self,
        arms: &[RwLockReadGuard<'_, Arm>],
        contexts: &[ContextVector],
    ) -> SkillPathResult<Scoring> {
        match self.config.policy {
            Policy::Linucb => self.score_with(Variant::Linucb, arms, contexts),
            Policy::Thompson => self.score_with(Variant::Thompson, arms, contexts),
            Policy::Neural => self.score_with(Variant::Neural, arms, contexts),
            Policy::Ensemble => self.score_ensemble(arms, contexts),
        }
    }

    fn score_with(
        &self,
        variant: Variant,
        arms: &[RwLockReadGuard<'_, Arm>],
        contexts: &[ContextVector],
    ) -> SkillPathResult<Scoring> {
        let mut scores = Vec::with_capacity(arms.len());
        let mut confidences = Vec::with_capacity(arms.len());
        let mut rng = self.rng.lock();
        for (arm, context) in arms.iter().zip(contexts) {
            let model = model_of(arm, variant)?;
            scores.push(model.score(context, &mut *rng)?);
            confidences.push(model.expected_reward(context)?);
        }
        Ok(Scoring {
            scores,
            confidences,
            scored_by: vec![variant],
        })
    }

    fn score_ensemble(
        &self,
        arms: &[RwLockReadGuard<'_, Arm>],
        contexts: &[ContextVector],
    ) -> SkillPathResult<Scoring> {
        let Some(combiner) = &self.ensemble else {
            return self.score_with(Variant::Linucb, arms, contexts);
        };

        let available: BTreeSet<Variant> = combiner
            .variants()
            .into_iter()
            .filter(|v| {
                arms.iter()
                    .all(|arm| arm.model(*v).map_or(false, |m| m.is_available()))
            })
            .collect();
        let variance =
            contexts.iter().map(ContextVector::variance).sum::<f64>() / contexts.len() as f64;

        match combiner.plan(&available, variance) {
            ScoringPlan::Single(variant) => self.score_with(variant, arms, contexts),
            ScoringPlan::Blend => {
                let mut rows = Vec::with_capacity(arms.len());
                {
                    let mut rng = self.rng.lock();
                    for (arm, context) in arms.iter().zip(contexts) {
                        let mut row = BTreeMap::new();
                        for variant in &available {
                            let model = model_of(arm, *variant)?;
                            row.insert(*variant, model.score(context, &mut *rng)?);
                        }
                        rows.push(row);
                    }
                }
                let scores = combiner.combine(&rows);
                Ok(Scoring {
                    confidences: scores.clone(),
                    scores,
                    scored_by: available.into_iter().collect(),
                })
            }
        }
    }

    // ─── Feedback ───────────────────────────────────────────────────────────

    /// Credit an observed reward to `skill`, rebuilding its context from
    /// `signals`.
    pub fn update(&self, skill: &str, signals: &LearnerSignals, reward: f64) -> SkillPathResult<()> {
        let result = Reward::new(reward).and_then(|reward| {
            let context = self.context_for(skill, signals)?;
            self.apply(skill, &context, reward)
        });
        self.observe_update(skill, result)
    }

    /// Credit an observed reward against an explicit context vector.
    pub fn update_with_context(
        &self,
        skill: &str,
        context: &ContextVector,
        reward: f64,
    ) -> SkillPathResult<()> {
        let result = Reward::new(reward).and_then(|reward| self.apply(skill, context, reward));
        self.observe_update(skill, result)
    }

    /// Convert raw outcome facts into a reward and apply it. Returns the
    /// reward that was credited.
    pub fn record_outcome(
        &self,
        skill: &str,
        signals: &LearnerSignals,
        outcome: &OutcomeComponents,
    ) -> SkillPathResult<f64> {
        let reward = outcome.reward();
        self.update(skill, signals, reward)?;
        Ok(reward)
    }

    fn apply(&self, skill: &str, context: &ContextVector, reward: Reward) -> SkillPathResult<()> {
        let lock = self
            .registry
            .get(skill)
            .ok_or_else(|| SkillPathError::UnknownArm(skill.to_string()))?;
        context.ensure_dim(self.registry.dim())?;

        let mut arm = lock.write();
        let predictions = match &self.ensemble {
            Some(_) => arm.predictions(context)?,
            None => Vec::new(),
        };
        arm.update(context, reward)?;
        if let Some(combiner) = &self.ensemble {
            combiner.record(&predictions, reward);
        }
        Ok(())
    }

    fn observe_update(&self, skill: &str, result: SkillPathResult<()>) -> SkillPathResult<()> {
        match &result {
            Ok(()) => {
                metrics::counter!("update.applied").increment(1);
                debug!(skill, "Arm updated");
            }
            Err(e) => {
                metrics::counter!("update.rejected").increment(1);
                warn!(skill, error = %e, "Update rejected");
            }
        }
        result
    }

    // ─── Inspection ─────────────────────────────────────────────────────────

    pub fn arm_stats(&self, skill: &str) -> SkillPathResult<ArmStats> {
        let arm = self
            .registry
            .get(skill)
            .ok_or_else(|| SkillPathError::UnknownArm(skill.to_string()))?
            .read();
        Ok(ArmStats {
            skill: skill.to_string(),
            observations: arm.observations(),
            theta: arm.linear().theta().to_vec(),
            posterior: arm.posterior().stats(),
            network_updates: arm.neural().map(|n| n.observations()),
            network_available: arm.neural().map_or(false, |n| n.is_available()),
        })
    }

    /// LinUCB terms for one arm and context, without selecting anything.
    pub fn score_context(&self, skill: &str, context: &ContextVector) -> SkillPathResult<ScoreBreakdown> {
        self.registry
            .get(skill)
            .ok_or_else(|| SkillPathError::UnknownArm(skill.to_string()))?
            .read()
            .linear()
            .breakdown(context)
    }

    pub fn ensemble_weights(&self) -> Option<BTreeMap<Variant, f64>> {
        self.ensemble.as_ref().map(EnsembleCombiner::weights)
    }

    pub fn performance_summary(&self) -> Option<Vec<PerformanceSummary>> {
        self.ensemble
            .as_ref()
            .map(EnsembleCombiner::performance_summary)
    }

    // ─── Persistence ────────────────────────────────────────────────────────

    /// Consistent capture of every arm (read guards held across all arms)
    /// plus the ensemble weighting.
    pub fn snapshot(&self) -> EngineSnapshot {
        let guards = self.registry.read_all();
        let arms = guards
            .iter()
            .map(|arm| (arm.key().to_string(), ArmSnapshot::capture(arm)))
            .collect();
        let ensemble = self.ensemble.as_ref().map(EnsembleCombiner::snapshot);
        EngineSnapshot {
            taken_at: Utc::now(),
            dimension: self.registry.dim(),
            arms,
            ensemble,
        }
    }

    /// Replace all learning state. The snapshot must cover exactly this
    /// engine's arms; nothing changes unless every arm validates.
    pub fn restore(&self, snapshot: &EngineSnapshot) -> SkillPathResult<()> {
        let dim = self.registry.dim();
        if snapshot.dimension != dim {
            return Err(SkillPathError::DimensionMismatch {
                expected: dim,
                actual: snapshot.dimension,
            });
        }
        if let Some(unknown) = snapshot.arms.keys().find(|k| !self.registry.contains(k)) {
            return Err(SkillPathError::UnknownArm(unknown.clone()));
        }
        if let Some(missing) = self.registry.keys().find(|k| !snapshot.arms.contains_key(*k)) {
            return Err(SkillPathError::Snapshot(format!("missing state for arm '{missing}'")));
        }

        let rebuilt = snapshot
            .arms
            .iter()
            .map(|(key, arm)| {
                arm.restore(key, dim, &self.config, self.with_neural)
                    .map(|arm| (key.clone(), arm))
            })
            .collect::<SkillPathResult<BTreeMap<_, _>>>()?;

        self.registry.replace_all(rebuilt);
        if let (Some(combiner), Some(state)) = (&self.ensemble, &snapshot.ensemble) {
            combiner.restore(state);
        }
        info!(
            arms = snapshot.arms.len(),
            taken_at = %snapshot.taken_at,
            "Learning state restored"
        );
        Ok(())
    }
}

fn model_of(arm: &Arm, variant: Variant) -> SkillPathResult<&dyn ArmModel> {
    arm.model(variant).ok_or_else(|| {
        SkillPathError::Config(format!("arm '{}' carries no {variant} model", arm.key()))
    })
}

/// Candidate indices best-first: higher score wins, non-finite scores rank
/// last, ties go to the lexicographically smallest key.
fn rank(keys: &[&str], scores: &[f64]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..keys.len()).collect();
    order.sort_by(|&i, &j| compare_scores(scores[j], scores[i]).then_with(|| keys[i].cmp(keys[j])));
    order
}

fn compare_scores(a: f64, b: f64) -> Ordering {
    match (a.is_finite(), b.is_finite()) {
        (true, true) => a.total_cmp(&b),
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => Ordering::Equal,
    }
}

fn top_features(context: &ContextVector, contributions: &[f64]) -> Vec<FeatureContribution> {
    let mut features: Vec<FeatureContribution> = FEATURE_NAMES
        .iter()
        .zip(context.view().iter())
        .zip(contributions)
        .map(|((name, value), contribution)| FeatureContribution {
            name: name.to_string(),
            value: *value,
            contribution: *contribution,
        })
        .collect();
    features.sort_by(|a, b| b.contribution.abs().total_cmp(&a.contribution.abs()));
    features.truncate(TOP_FEATURES);
    features
}

fn clamp_unit(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}
