//! Offline comparison of the engine against baseline recommenders on a
//! synthetic learner population.
//!
//! A learner's true reward for a skill is `1 − |difficulty − (1 − speed)|`,
//! peaking where difficulty equals `1 − speed`. Observed rewards add Gaussian noise
//! and are clipped to `[0, 1]`. Regret is measured against the best eligible
//! skill's true reward. Only the engine learns from what it observes.

use crate::baselines::{
    Baseline, CollaborativeBaseline, EpsilonGreedyBaseline, GreedyBaseline, PickRequest,
    RandomBaseline, RuleBasedBaseline,
};
use anyhow::Context;
use rand::rngs::StdRng;
use rand::seq::{IteratorRandom, SliceRandom};
use rand::{Rng, SeedableRng};
use rand_distr::{Beta, Distribution, Normal};
use serde::Serialize;
use skillpath_bandit::{ContextVector, RecommendOutcome, SkillRecommender};
use skillpath_core::{
    normalize_skill_key, EducationLevel, GithubSignals, LearnerSignals, Policy, ResumeSignals,
    SkillCatalog, SkillMeta,
};
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, info};

const KNOWN_SKILL_PROBABILITY: f64 = 0.3;
const RESUME_PROBABILITY: f64 = 0.7;
const GITHUB_PROBABILITY: f64 = 0.5;
const EPSILON: f64 = 0.1;

#[derive(Debug, Clone)]
pub struct SyntheticLearner {
    pub role: String,
    pub known: Vec<String>,
    pub signals: LearnerSignals,
}

pub fn generate_learners(
    catalog: &SkillCatalog,
    count: usize,
    rng: &mut StdRng,
) -> anyhow::Result<Vec<SyntheticLearner>> {
    let roles: Vec<&str> = catalog.role_names().collect();
    anyhow::ensure!(!roles.is_empty(), "catalog defines no roles");

    let languages: Vec<&str> = catalog
        .skills()
        .filter_map(|s| s.primary_language.as_deref())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let speed = Beta::new(2.0, 2.0).context("learning speed distribution")?;

    let mut learners = Vec::with_capacity(count);
    for _ in 0..count {
        let role = roles
            .choose(&mut *rng)
            .map(|r| r.to_string())
            .context("no role to assign")?;
        let known: Vec<String> = catalog
            .required_skills(&role)
            .unwrap_or_default()
            .iter()
            .filter(|_| rng.gen_bool(KNOWN_SKILL_PROBABILITY))
            .cloned()
            .collect();

        let resume = rng.gen_bool(RESUME_PROBABILITY).then(|| {
            let mut skills = known.clone();
            if let Some(extra) = catalog.skill_keys().choose(&mut *rng) {
                skills.push(extra.to_string());
            }
            let education = [
                EducationLevel::None,
                EducationLevel::Bachelor,
                EducationLevel::Master,
                EducationLevel::Phd,
            ]
            .choose(&mut *rng)
            .copied()
            .unwrap_or_default();
            ResumeSignals {
                skills,
                experience_years: rng.gen_range(0.0..12.0),
                education,
            }
        });

        let github = rng.gen_bool(GITHUB_PROBABILITY).then(|| {
            let mut shares = HashMap::new();
            for language in languages.iter().copied() {
                if rng.gen_bool(0.4) {
                    shares.insert(language.to_string(), rng.gen_range(5.0..80.0));
                }
            }
            GithubSignals {
                activity_score: rng.gen(),
                languages: shares,
                contribution_years: rng.gen_range(0.0..8.0),
            }
        });

        learners.push(SyntheticLearner {
            role,
            known,
            signals: LearnerSignals {
                learning_speed: speed.sample(&mut *rng),
                resume,
                github,
            },
        });
    }
    Ok(learners)
}

/// Noise-free reward for a learner on a skill.
pub fn expected_reward(skill: &SkillMeta, signals: &LearnerSignals) -> f64 {
    (1.0 - (skill.difficulty - (1.0 - signals.learning_speed)).abs()).clamp(0.0, 1.0)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MethodReport {
    pub method: String,
    pub decisions: usize,
    pub mean_reward: f64,
    pub cumulative_reward: f64,
    pub cumulative_regret: f64,
    /// Cumulative reward after each round.
    pub reward_curve: Vec<f64>,
}

impl MethodReport {
    fn new(method: &str) -> Self {
        Self {
            method: method.to_string(),
            decisions: 0,
            mean_reward: 0.0,
            cumulative_reward: 0.0,
            cumulative_regret: 0.0,
            reward_curve: Vec::new(),
        }
    }

    fn record(&mut self, observed: f64, expected: f64, best: f64) {
        self.decisions += 1;
        self.cumulative_reward += observed;
        self.cumulative_regret += (best - expected).max(0.0);
        self.mean_reward = self.cumulative_reward / self.decisions as f64;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulationReport {
    pub policy: Policy,
    pub learners: usize,
    pub rounds: usize,
    pub noise: f64,
    pub methods: Vec<MethodReport>,
}

impl SimulationReport {
    pub fn method(&self, name: &str) -> Option<&MethodReport> {
        self.methods.iter().find(|m| m.method == name)
    }
}

pub struct Simulator {
    engine: SkillRecommender,
    baselines: Vec<Box<dyn Baseline>>,
    collaborative: CollaborativeBaseline,
    noise: Normal<f64>,
    noise_std: f64,
    rng: StdRng,
}

impl Simulator {
    pub fn new(engine: SkillRecommender, noise: f64, seed: u64) -> anyhow::Result<Self> {
        let baselines: Vec<Box<dyn Baseline>> = vec![
            Box::new(RandomBaseline),
            Box::new(GreedyBaseline),
            Box::new(RuleBasedBaseline),
            Box::new(EpsilonGreedyBaseline { epsilon: EPSILON }),
        ];
        Ok(Self {
            engine,
            baselines,
            collaborative: CollaborativeBaseline::default(),
            noise: Normal::new(0.0, noise).context("reward noise distribution")?,
            noise_std: noise,
            rng: StdRng::seed_from_u64(seed),
        })
    }

    pub fn engine(&self) -> &SkillRecommender {
        &self.engine
    }

    pub fn run(&mut self, learners: usize, rounds: usize) -> anyhow::Result<SimulationReport> {
        let population = generate_learners(self.engine.catalog(), learners, &mut self.rng)?;
        for learner in &population {
            self.collaborative.observe(&learner.role, &learner.known);
        }

        let engine_name = format!("engine:{}", self.engine.policy().as_str());
        let mut engine_report = MethodReport::new(&engine_name);
        let mut baseline_reports: Vec<MethodReport> = self
            .baselines
            .iter()
            .map(|b| MethodReport::new(b.name()))
            .chain(std::iter::once(MethodReport::new(self.collaborative.name())))
            .collect();

        info!(
            policy = self.engine.policy().as_str(),
            learners,
            rounds,
            "Simulation started"
        );

        for round in 0..rounds {
            for learner in &population {
                self.step(learner, &mut engine_report, &mut baseline_reports)?;
            }
            engine_report.reward_curve.push(engine_report.cumulative_reward);
            for report in baseline_reports.iter_mut() {
                report.reward_curve.push(report.cumulative_reward);
            }
            debug!(
                round,
                engine_mean = engine_report.mean_reward,
                engine_regret = engine_report.cumulative_regret,
                "Round complete"
            );
        }

        let mut methods = vec![engine_report];
        methods.extend(baseline_reports);
        Ok(SimulationReport {
            policy: self.engine.policy(),
            learners,
            rounds,
            noise: self.noise_std,
            methods,
        })
    }

    fn step(
        &mut self,
        learner: &SyntheticLearner,
        engine_report: &mut MethodReport,
        baseline_reports: &mut [MethodReport],
    ) -> anyhow::Result<()> {
        let outcome = self
            .engine
            .recommend(&learner.role, &learner.known, &learner.signals)?;
        let rec = match outcome {
            RecommendOutcome::Recommended(rec) => rec,
            RecommendOutcome::NoGap { .. } => return Ok(()),
        };

        let catalog = self.engine.catalog();
        let known: BTreeSet<String> = learner.known.iter().map(|s| normalize_skill_key(s)).collect();
        let mut candidates: Vec<&SkillMeta> = catalog
            .required_skills(&learner.role)
            .unwrap_or_default()
            .iter()
            .filter(|key| !known.contains(*key))
            .filter_map(|key| catalog.skill(key))
            .collect();
        candidates.sort_by(|a, b| a.key.cmp(&b.key));
        let best = candidates
            .iter()
            .map(|s| expected_reward(s, &learner.signals))
            .fold(0.0, f64::max);

        let skill = catalog
            .skill(&rec.skill)
            .with_context(|| format!("engine picked unknown skill '{}'", rec.skill))?;
        let expected = expected_reward(skill, &learner.signals);
        let observed = clip_unit(expected + self.noise.sample(&mut self.rng));
        self.engine
            .update_with_context(&rec.skill, &ContextVector::from(rec.context), observed)?;
        engine_report.record(observed, expected, best);

        let request = PickRequest {
            role: &learner.role,
            candidates: &candidates,
            signals: &learner.signals,
        };
        let mut picks = Vec::with_capacity(baseline_reports.len());
        for baseline in self.baselines.iter_mut() {
            picks.push(baseline.pick(&request, &mut self.rng));
        }
        picks.push(self.collaborative.pick(&request, &mut self.rng));

        for (pick, report) in picks.into_iter().zip(baseline_reports.iter_mut()) {
            let Some(key) = pick else { continue };
            let Some(skill) = catalog.skill(&key) else { continue };
            let expected = expected_reward(skill, &learner.signals);
            let observed = clip_unit(expected + self.noise.sample(&mut self.rng));
            report.record(observed, expected, best);
        }
        Ok(())
    }
}

fn clip_unit(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skillpath_core::{BanditConfig, Role};

    fn catalog() -> SkillCatalog {
        let mut skills = vec![
            SkillMeta::new("python", 0.3, 80.0),
            SkillMeta::new("sql", 0.2, 40.0),
            SkillMeta::new("machine_learning", 0.8, 150.0),
            SkillMeta::new("statistics", 0.6, 90.0),
            SkillMeta::new("docker", 0.4, 30.0),
            SkillMeta::new("kubernetes", 0.9, 100.0),
        ];
        skills[0].primary_language = Some("Python".to_string());
        SkillCatalog::new(
            skills,
            vec![
                Role {
                    name: "data_scientist".to_string(),
                    skills: vec![
                        "python".to_string(),
                        "sql".to_string(),
                        "machine_learning".to_string(),
                        "statistics".to_string(),
                    ],
                },
                Role {
                    name: "devops".to_string(),
                    skills: vec!["docker".to_string(), "kubernetes".to_string()],
                },
            ],
        )
        .unwrap()
    }

    fn simulator(seed: u64) -> Simulator {
        let config = BanditConfig {
            seed: Some(seed),
            ..BanditConfig::default()
        };
        let engine = SkillRecommender::new(catalog(), config).unwrap();
        Simulator::new(engine, 0.1, seed).unwrap()
    }

    #[test]
    fn test_expected_reward_peaks_at_inverse_speed() {
        let fast = LearnerSignals::with_learning_speed(0.9);
        let hard = SkillMeta::new("kubernetes", 0.9, 100.0);
        let easy = SkillMeta::new("sql", 0.1, 40.0);
        assert!((expected_reward(&easy, &fast) - 1.0).abs() < 1e-12);
        assert!((expected_reward(&hard, &fast) - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_generated_learners_are_valid() {
        let catalog = catalog();
        let mut rng = StdRng::seed_from_u64(8);
        let learners = generate_learners(&catalog, 50, &mut rng).unwrap();
        assert_eq!(learners.len(), 50);
        for learner in &learners {
            let required = catalog.required_skills(&learner.role).unwrap();
            assert!(learner.known.iter().all(|k| required.contains(k)));
            assert!((0.0..=1.0).contains(&learner.signals.learning_speed));
        }
    }

    #[test]
    fn test_report_covers_every_method() {
        let report = simulator(3).run(30, 4).unwrap();
        let names: Vec<&str> = report.methods.iter().map(|m| m.method.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "engine:linucb",
                "random",
                "greedy",
                "rule_based",
                "epsilon_greedy",
                "collaborative"
            ]
        );
        for method in &report.methods {
            assert!(method.cumulative_regret >= 0.0);
            assert!((0.0..=1.0).contains(&method.mean_reward));
            assert_eq!(method.reward_curve.len(), 4);
        }
        let engine = report.method("engine:linucb").unwrap();
        let random = report.method("random").unwrap();
        assert_eq!(engine.decisions, random.decisions);
    }

    #[test]
    fn test_seeded_runs_are_reproducible() {
        let first = simulator(21).run(20, 3).unwrap();
        let second = simulator(21).run(20, 3).unwrap();
        assert_eq!(first, second);
    }
}
