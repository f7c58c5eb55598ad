//! Non-learning recommenders the engine is measured against.

use rand::seq::SliceRandom;
use rand::{Rng, RngCore};
use skillpath_core::{LearnerSignals, SkillMeta};
use std::collections::HashMap;

/// Everything a baseline may look at for one pick.
pub struct PickRequest<'a> {
    pub role: &'a str,
    /// Eligible skills, sorted by key.
    pub candidates: &'a [&'a SkillMeta],
    pub signals: &'a LearnerSignals,
}

pub trait Baseline {
    fn name(&self) -> &'static str;

    fn pick(&mut self, request: &PickRequest<'_>, rng: &mut dyn RngCore) -> Option<String>;
}

/// Highest `score`, ties to the first candidate.
fn best_by(candidates: &[&SkillMeta], score: impl Fn(&SkillMeta) -> f64) -> Option<String> {
    let mut best: Option<(&SkillMeta, f64)> = None;
    for &skill in candidates {
        let s = score(skill);
        if best.map_or(true, |(_, top)| s > top) {
            best = Some((skill, s));
        }
    }
    best.map(|(skill, _)| skill.key.clone())
}

pub struct RandomBaseline;

impl Baseline for RandomBaseline {
    fn name(&self) -> &'static str {
        "random"
    }

    fn pick(&mut self, request: &PickRequest<'_>, rng: &mut dyn RngCore) -> Option<String> {
        request.candidates.choose(rng).map(|s| s.key.clone())
    }
}

/// Always the skill with the highest market demand.
pub struct GreedyBaseline;

impl Baseline for GreedyBaseline {
    fn name(&self) -> &'static str {
        "greedy"
    }

    fn pick(&mut self, request: &PickRequest<'_>, _rng: &mut dyn RngCore) -> Option<String> {
        best_by(request.candidates, |s| s.market_demand)
    }
}

/// Match difficulty to learning speed: `1 − |difficulty − speed|`.
pub struct RuleBasedBaseline;

impl Baseline for RuleBasedBaseline {
    fn name(&self) -> &'static str {
        "rule_based"
    }

    fn pick(&mut self, request: &PickRequest<'_>, _rng: &mut dyn RngCore) -> Option<String> {
        let speed = request.signals.learning_speed;
        best_by(request.candidates, |s| 1.0 - (s.difficulty - speed).abs())
    }
}

/// Greedy, except a uniformly random pick with probability `epsilon`.
pub struct EpsilonGreedyBaseline {
    pub epsilon: f64,
}

impl Baseline for EpsilonGreedyBaseline {
    fn name(&self) -> &'static str {
        "epsilon_greedy"
    }

    fn pick(&mut self, request: &PickRequest<'_>, rng: &mut dyn RngCore) -> Option<String> {
        if rng.gen::<f64>() < self.epsilon {
            return request.candidates.choose(rng).map(|s| s.key.clone());
        }
        best_by(request.candidates, |s| s.market_demand)
    }
}

/// Popularity among learners targeting the same role: the gap skill most
/// often already known by peers.
#[derive(Default)]
pub struct CollaborativeBaseline {
    known_by_role: HashMap<String, HashMap<String, u64>>,
}

impl CollaborativeBaseline {
    pub fn observe(&mut self, role: &str, known: &[String]) {
        let counts = self.known_by_role.entry(role.to_string()).or_default();
        for skill in known {
            *counts.entry(skill.clone()).or_default() += 1;
        }
    }
}

impl Baseline for CollaborativeBaseline {
    fn name(&self) -> &'static str {
        "collaborative"
    }

    fn pick(&mut self, request: &PickRequest<'_>, _rng: &mut dyn RngCore) -> Option<String> {
        let counts = self.known_by_role.get(request.role);
        best_by(request.candidates, |s| {
            counts
                .and_then(|c| c.get(&s.key))
                .map_or(0.0, |n| *n as f64)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn skills() -> Vec<SkillMeta> {
        let mut easy = SkillMeta::new("excel", 0.1, 20.0);
        easy.market_demand = 0.3;
        let mut hard = SkillMeta::new("rust", 0.9, 140.0);
        hard.market_demand = 0.8;
        let mut mid = SkillMeta::new("sql", 0.5, 40.0);
        mid.market_demand = 0.6;
        vec![easy, hard, mid]
    }

    #[test]
    fn test_greedy_picks_highest_demand() {
        let skills = skills();
        let candidates: Vec<&SkillMeta> = skills.iter().collect();
        let signals = LearnerSignals::default();
        let request = PickRequest {
            role: "dev",
            candidates: &candidates,
            signals: &signals,
        };
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(GreedyBaseline.pick(&request, &mut rng).as_deref(), Some("rust"));
    }

    #[test]
    fn test_rule_based_matches_speed() {
        let skills = skills();
        let candidates: Vec<&SkillMeta> = skills.iter().collect();
        let mut rng = StdRng::seed_from_u64(1);
        for (speed, expected) in [(0.05, "excel"), (0.5, "sql"), (0.95, "rust")] {
            let signals = LearnerSignals::with_learning_speed(speed);
            let request = PickRequest {
                role: "dev",
                candidates: &candidates,
                signals: &signals,
            };
            assert_eq!(
                RuleBasedBaseline.pick(&request, &mut rng).as_deref(),
                Some(expected)
            );
        }
    }

    #[test]
    fn test_random_stays_within_candidates() {
        let skills = skills();
        let candidates: Vec<&SkillMeta> = skills.iter().collect();
        let signals = LearnerSignals::default();
        let request = PickRequest {
            role: "dev",
            candidates: &candidates,
            signals: &signals,
        };
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..20 {
            let pick = RandomBaseline.pick(&request, &mut rng).unwrap();
            assert!(skills.iter().any(|s| s.key == pick));
        }
        let empty = PickRequest {
            role: "dev",
            candidates: &[],
            signals: &signals,
        };
        assert!(RandomBaseline.pick(&empty, &mut rng).is_none());
    }

    #[test]
    fn test_collaborative_follows_peers() {
        let skills = skills();
        let candidates: Vec<&SkillMeta> = skills.iter().collect();
        let signals = LearnerSignals::default();
        let mut baseline = CollaborativeBaseline::default();
        baseline.observe("dev", &["sql".to_string()]);
        baseline.observe("dev", &["sql".to_string(), "rust".to_string()]);
        baseline.observe("analyst", &["excel".to_string()]);
        let request = PickRequest {
            role: "dev",
            candidates: &candidates,
            signals: &signals,
        };
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(baseline.pick(&request, &mut rng).as_deref(), Some("sql"));
    }
}
