//! Linear confidence-bound arm model (LinUCB), the production policy.
//!
//! Each arm keeps a ridge-regression accumulator `A = λI + Σ x·xᵗ` and
//! `b = Σ r·x`. The score is `θᵗx + α·sqrt(xᵗA⁻¹x)` with `θ = A⁻¹b`.

use crate::features::ContextVector;
use crate::linalg;
use crate::model::{ArmModel, Reward, Variant};
use ndarray::{Array1, Array2};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use skillpath_core::{SkillPathError, SkillPathResult};

/// The two terms of a LinUCB score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub exploitation: f64,
    pub exploration: f64,
}

impl ScoreBreakdown {
    pub fn total(&self) -> f64 {
        self.exploitation + self.exploration
    }
}

#[derive(Debug, Clone)]
pub struct LinUcbArm {
    alpha: f64,
    lambda: f64,
    a: Array2<f64>,
    b: Array1<f64>,
    /// Cached `A⁻¹`, kept current with Sherman–Morrison on every update.
    a_inv: Array2<f64>,
    observations: u64,
}

impl LinUcbArm {
    pub fn new(dim: usize, alpha: f64, lambda: f64) -> Self {
        debug_assert!(lambda > 0.0, "lambda must be positive");
        Self {
            alpha,
            lambda,
            a: Array2::<f64>::eye(dim) * lambda,
            b: Array1::zeros(dim),
            a_inv: Array2::<f64>::eye(dim) / lambda,
            observations: 0,
        }
    }

    /// Rebuild an arm from previously captured `A` and `b`.
    ///
    /// Fails when the shapes disagree or `A` is not positive definite.
    pub fn from_parts(
        a: Array2<f64>,
        b: Array1<f64>,
        alpha: f64,
        lambda: f64,
        observations: u64,
    ) -> SkillPathResult<Self> {
        let dim = b.len();
        if a.nrows() != dim || a.ncols() != dim {
            return Err(SkillPathError::DimensionMismatch {
                expected: dim,
                actual: a.nrows(),
            });
        }
        let a_inv = linalg::invert_spd(&a).ok_or_else(|| {
            SkillPathError::Snapshot("precision matrix is not positive definite".to_string())
        })?;
        Ok(Self {
            alpha,
            lambda,
            a,
            b,
            a_inv,
            observations,
        })
    }

    pub fn dim(&self) -> usize {
        self.b.len()
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn lambda(&self) -> f64 {
        self.lambda
    }

    pub fn a(&self) -> &Array2<f64> {
        &self.a
    }

    pub fn b(&self) -> &Array1<f64> {
        &self.b
    }

    /// Current best-fit weights `θ = A⁻¹b`.
    pub fn theta(&self) -> Array1<f64> {
        self.a_inv.dot(&self.b)
    }

    pub fn breakdown(&self, context: &ContextVector) -> SkillPathResult<ScoreBreakdown> {
        context.ensure_dim(self.dim())?;
        let x = context.view();
        let exploitation = self.theta().dot(&x);
        let variance = linalg::quadratic_form(&self.a_inv, x).max(0.0);
        Ok(ScoreBreakdown {
            exploitation,
            exploration: self.alpha * variance.sqrt(),
        })
    }

    /// Per-feature share of the exploitation term (`θᵢ·xᵢ`).
    pub fn contributions(&self, context: &ContextVector) -> SkillPathResult<Vec<f64>> {
        context.ensure_dim(self.dim())?;
        Ok(self
            .theta()
            .iter()
            .zip(context.view().iter())
            .map(|(t, x)| t * x)
            .collect())
    }

    /// `xᵗAx`: how much evidence the arm holds in direction `x`.
    pub fn precision(&self, context: &ContextVector) -> SkillPathResult<f64> {
        context.ensure_dim(self.dim())?;
        Ok(linalg::quadratic_form(&self.a, context.view()))
    }
}

impl ArmModel for LinUcbArm {
    fn variant(&self) -> Variant {
        Variant::Linucb
    }

    fn score(&self, context: &ContextVector, _rng: &mut dyn RngCore) -> SkillPathResult<f64> {
        Ok(self.breakdown(context)?.total())
    }

    fn expected_reward(&self, context: &ContextVector) -> SkillPathResult<f64> {
        let breakdown = self.breakdown(context)?;
        Ok(breakdown.exploitation.clamp(0.0, 1.0))
    }

    fn update(&mut self, context: &ContextVector, reward: Reward) -> SkillPathResult<()> {
        context.ensure_dim(self.dim())?;
        let x = context.view();
        linalg::add_outer(&mut self.a, x);
        linalg::sherman_morrison_update(&mut self.a_inv, x);
        self.b.scaled_add(reward.value(), &x);
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
    use rand::rngs::mock::StepRng;

    fn rng() -> StepRng {
        StepRng::new(0, 1)
    }

    fn ctx(values: &[f64]) -> ContextVector {
        ContextVector::new(values.to_vec())
    }

    #[test]
    fn test_worked_example() {
        let mut arm = LinUcbArm::new(3, 1.0, 1.0);
        let x = ctx(&[1.0, 0.0, 0.0]);

        let score = arm.score(&x, &mut rng()).unwrap();
        assert!((score - 1.0).abs() < 1e-12);

        arm.update(&x, Reward::new(1.0).unwrap()).unwrap();
        assert_eq!(arm.a()[[0, 0]], 2.0);
        assert_eq!(arm.a()[[1, 1]], 1.0);
        assert_eq!(arm.a()[[2, 2]], 1.0);
        assert_eq!(arm.b().to_vec(), vec![1.0, 0.0, 0.0]);

        let theta = arm.theta();
        assert!((theta[0] - 0.5).abs() < 1e-12);
        assert!(theta[1].abs() < 1e-12 && theta[2].abs() < 1e-12);

        let score = arm.score(&x, &mut rng()).unwrap();
        assert!((score - (0.5 + 0.5_f64.sqrt())).abs() < 1e-12);
        assert!((score - 1.207).abs() < 1e-3);
    }

    #[test]
    fn test_cold_start_score_is_pure_exploration() {
        let lambda = 2.0;
        let alpha = 1.5;
        let arm = LinUcbArm::new(4, alpha, lambda);
        for values in [[1.0, 0.0, 0.0, 0.0], [0.3, 0.4, 0.0, 0.0], [0.5, 0.5, 0.5, 0.5]] {
            let x = ctx(&values);
            let norm_sq: f64 = values.iter().map(|v| v * v).sum();
            let expected = alpha * (norm_sq / lambda).sqrt();
            let breakdown = arm.breakdown(&x).unwrap();
            assert_eq!(breakdown.exploitation, 0.0);
            assert!((breakdown.total() - expected).abs() < 1e-12);
        }
    }

    #[test]
    fn test_updates_strictly_increase_precision() {
        let mut arm = LinUcbArm::new(3, 1.0, 1.0);
        let x = ctx(&[0.2, 0.7, 0.1]);
        let mut previous = arm.precision(&x).unwrap();
        for i in 0..50 {
            let reward = Reward::new((i % 2) as f64).unwrap();
            arm.update(&x, reward).unwrap();
            let current = arm.precision(&x).unwrap();
            assert!(current > previous);
            previous = current;
            assert!(linalg::invert_spd(arm.a()).is_some());
        }
        assert_eq!(arm.observations(), 50);
    }

    #[test]
    fn test_dimension_mismatch() {
        let mut arm = LinUcbArm::new(3, 1.0, 1.0);
        let x = ctx(&[1.0, 0.0]);
        assert!(matches!(
            arm.score(&x, &mut rng()),
            Err(SkillPathError::DimensionMismatch { expected: 3, actual: 2 })
        ));
        assert!(arm.update(&x, Reward::new(1.0).unwrap()).is_err());
        assert_eq!(arm.a(), &Array2::<f64>::eye(3));
    }

    #[test]
    fn test_exploration_shrinks_with_evidence() {
        let mut arm = LinUcbArm::new(2, 1.0, 1.0);
        let x = ctx(&[0.6, 0.8]);
        let before = arm.breakdown(&x).unwrap().exploration;
        for _ in 0..10 {
            arm.update(&x, Reward::new(0.5).unwrap()).unwrap();
        }
        let after = arm.breakdown(&x).unwrap().exploration;
        assert!(after < before);
    }

    #[test]
    fn test_from_parts_round_trip() {
        let mut arm = LinUcbArm::new(3, 1.0, 1.0);
        arm.update(&ctx(&[0.4, 0.1, 0.9]), Reward::new(0.8).unwrap()).unwrap();
        let rebuilt =
            LinUcbArm::from_parts(arm.a().clone(), arm.b().clone(), 1.0, 1.0, 1).unwrap();
        let x = ctx(&[0.3, 0.3, 0.3]);
        let original = arm.score(&x, &mut rng()).unwrap();
        let restored = rebuilt.score(&x, &mut rng()).unwrap();
        assert!((original - restored).abs() < 1e-9);
    }

    #[test]
    fn test_from_parts_rejects_singular() {
        let a = Array2::<f64>::zeros((2, 2));
        let b = Array1::<f64>::zeros(2);
        assert!(matches!(
            LinUcbArm::from_parts(a, b, 1.0, 1.0, 0),
            Err(SkillPathError::Snapshot(_))
        ));
    }
}
