//! Posterior-sampling arm model: Beta(α, β) per arm, context-free.

use crate::features::ContextVector;
use crate::model::{ArmModel, Reward, Variant};
use rand::RngCore;
use rand_distr::{Beta, Distribution};
use serde::{Deserialize, Serialize};
use skillpath_core::{SkillPathError, SkillPathResult};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PosteriorStats {
    pub mean: f64,
    pub variance: f64,
    pub interval_lower: f64,
    pub interval_upper: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ThompsonArm {
    alpha: f64,
    beta: f64,
    observations: u64,
}

impl Default for ThompsonArm {
    fn default() -> Self {
        Self::new()
    }
}

impl ThompsonArm {
    /// Uniform prior Beta(1, 1).
    pub fn new() -> Self {
        Self {
            alpha: 1.0,
            beta: 1.0,
            observations: 0,
        }
    }

    pub fn from_parts(alpha: f64, beta: f64, observations: u64) -> SkillPathResult<Self> {
        if !(alpha > 0.0 && beta > 0.0) || !alpha.is_finite() || !beta.is_finite() {
            return Err(SkillPathError::Snapshot(format!(
                "invalid Beta parameters ({alpha}, {beta})"
            )));
        }
        Ok(Self {
            alpha,
            beta,
            observations,
        })
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn beta(&self) -> f64 {
        self.beta
    }

    pub fn mean(&self) -> f64 {
        self.alpha / (self.alpha + self.beta)
    }

    pub fn stats(&self) -> PosteriorStats {
        let (a, b) = (self.alpha, self.beta);
        let mean = self.mean();
        let variance = (a * b) / ((a + b).powi(2) * (a + b + 1.0));
        let half_width = 1.96 * variance.sqrt();
        PosteriorStats {
            mean,
            variance,
            interval_lower: (mean - half_width).max(0.0),
            interval_upper: (mean + half_width).min(1.0),
        }
    }

    pub fn sample(&self, rng: &mut dyn RngCore) -> SkillPathResult<f64> {
        let dist = Beta::new(self.alpha, self.beta)
            .map_err(|e| anyhow::anyhow!("Beta({}, {}): {e}", self.alpha, self.beta))?;
        Ok(dist.sample(rng))
    }
}

impl ArmModel for ThompsonArm {
    fn variant(&self) -> Variant {
        Variant::Thompson
    }

    fn score(&self, _context: &ContextVector, rng: &mut dyn RngCore) -> SkillPathResult<f64> {
        self.sample(rng)
    }

    fn expected_reward(&self, _context: &ContextVector) -> SkillPathResult<f64> {
        Ok(self.mean())
    }

    /// Soft Bernoulli trial: `α += r`, `β += 1 − r`.
    fn update(&mut self, _context: &ContextVector, reward: Reward) -> SkillPathResult<()> {
        let r = reward.value();
        self.alpha += r;
        self.beta += 1.0 - r;
        self.observations += 1;
        Ok(())
    }

    fn observations(&self) -> u64 {
        self.observations
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn empty() -> ContextVector {
        ContextVector::new(vec![])
    }

    #[test]
    fn test_success_increments_alpha_only() {
        let mut arm = ThompsonArm::new();
        arm.update(&empty(), Reward::new(1.0).unwrap()).unwrap();
        assert_eq!(arm.alpha(), 2.0);
        assert_eq!(arm.beta(), 1.0);
    }

    #[test]
    fn test_failure_increments_beta_only() {
        let mut arm = ThompsonArm::new();
        arm.update(&empty(), Reward::new(0.0).unwrap()).unwrap();
        assert_eq!(arm.alpha(), 1.0);
        assert_eq!(arm.beta(), 2.0);
    }

    #[test]
    fn test_fractional_reward() {
        let mut arm = ThompsonArm::new();
        arm.update(&empty(), Reward::new(0.25).unwrap()).unwrap();
        assert_eq!(arm.alpha(), 1.25);
        assert_eq!(arm.beta(), 1.75);
        assert_eq!(arm.observations(), 1);
    }

    #[test]
    fn test_seeded_sampling_is_reproducible() {
        let arm = ThompsonArm::from_parts(3.0, 5.0, 6).unwrap();
        let mut first = StdRng::seed_from_u64(42);
        let mut second = StdRng::seed_from_u64(42);
        let a: Vec<f64> = (0..5).map(|_| arm.sample(&mut first).unwrap()).collect();
        let b: Vec<f64> = (0..5).map(|_| arm.sample(&mut second).unwrap()).collect();
        assert_eq!(a, b);
        assert!(a.iter().all(|s| (0.0..=1.0).contains(s)));
        // successive draws from one stream differ
        assert!(a.windows(2).any(|w| w[0] != w[1]));
    }

    #[test]
    fn test_stats() {
        let arm = ThompsonArm::new();
        let stats = arm.stats();
        assert_eq!(stats.mean, 0.5);
        assert!((stats.variance - 1.0 / 12.0).abs() < 1e-12);
        assert!(stats.interval_lower >= 0.0 && stats.interval_upper <= 1.0);
    }

    #[test]
    fn test_from_parts_rejects_non_positive() {
        assert!(ThompsonArm::from_parts(0.0, 1.0, 0).is_err());
        assert!(ThompsonArm::from_parts(1.0, f64::NAN, 0).is_err());
    }

    #[test]
    fn test_posterior_concentrates_on_good_arm() {
        let mut arm = ThompsonArm::new();
        for _ in 0..200 {
            arm.update(&empty(), Reward::new(0.9).unwrap()).unwrap();
        }
        let mut rng = StdRng::seed_from_u64(7);
        let mean_sample: f64 =
            (0..100).map(|_| arm.sample(&mut rng).unwrap()).sum::<f64>() / 100.0;
        assert!((mean_sample - arm.mean()).abs() < 0.05);
    }
}
