//! Function-approximation arm model: a one-hidden-layer ReLU network per arm
//! trained online with squared-error gradient steps.
//!
//! Uncertainty is `1/sqrt(max(updates, 1))`, so the exploration bonus decays
//! as the arm accumulates history. The network only takes part in scoring
//! once it has seen `min_observations` updates; it trains regardless.

use crate::features::ContextVector;
use crate::model::{ArmModel, Reward, Variant};
use ndarray::{Array1, Array2, ArrayView1};
use rand::RngCore;
use rand_distr::{Distribution, StandardNormal};
use skillpath_core::config::NeuralConfig;
use skillpath_core::{SkillPathError, SkillPathResult};

const INIT_SCALE: f64 = 0.01;

/// Raw network parameters, as captured in snapshots.
#[derive(Debug, Clone, PartialEq)]
pub struct NeuralParams {
    /// Input → hidden, `d × h`.
    pub w1: Array2<f64>,
    pub b1: Array1<f64>,
    /// Hidden → output, `h`.
    pub w2: Array1<f64>,
    pub b2: f64,
}

#[derive(Debug, Clone)]
pub struct NeuralArm {
    params: NeuralParams,
    learning_rate: f64,
    epochs: usize,
    exploration: f64,
    min_observations: u64,
    updates: u64,
}

struct ForwardPass {
    prediction: f64,
    pre_activation: Array1<f64>,
    hidden: Array1<f64>,
}

impl NeuralArm {
    pub fn new(dim: usize, config: &NeuralConfig, rng: &mut dyn RngCore) -> Self {
        let hidden = config.hidden_size;
        let mut draw = || -> f64 {
            let z: f64 = StandardNormal.sample(&mut *rng);
            z * INIT_SCALE
        };
        let w1 = Array2::from_shape_simple_fn((dim, hidden), &mut draw);
        let w2 = Array1::from_shape_simple_fn(hidden, &mut draw);

        Self {
            params: NeuralParams {
                w1,
                b1: Array1::zeros(hidden),
                w2,
                b2: 0.0,
            },
            learning_rate: config.learning_rate,
            epochs: config.epochs,
            exploration: config.exploration,
            min_observations: config.min_observations,
            updates: 0,
        }
    }

    pub fn from_parts(
        params: NeuralParams,
        config: &NeuralConfig,
        updates: u64,
    ) -> SkillPathResult<Self> {
        let hidden = params.w1.ncols();
        if params.b1.len() != hidden || params.w2.len() != hidden {
            return Err(SkillPathError::Snapshot(format!(
                "network layers disagree on hidden size ({hidden}, {}, {})",
                params.b1.len(),
                params.w2.len()
            )));
        }
        Ok(Self {
            params,
            learning_rate: config.learning_rate,
            epochs: config.epochs,
            exploration: config.exploration,
            min_observations: config.min_observations,
            updates,
        })
    }

    pub fn dim(&self) -> usize {
        self.params.w1.nrows()
    }

    pub fn params(&self) -> &NeuralParams {
        &self.params
    }

    /// `(point_estimate, uncertainty)` for a context.
    pub fn estimate(&self, context: &ContextVector) -> SkillPathResult<(f64, f64)> {
        context.ensure_dim(self.dim())?;
        let pass = self.forward(context.view());
        Ok((pass.prediction, self.uncertainty()))
    }

    pub fn uncertainty(&self) -> f64 {
        1.0 / (self.updates.max(1) as f64).sqrt()
    }

    fn forward(&self, x: ArrayView1<'_, f64>) -> ForwardPass {
        let pre_activation = x.dot(&self.params.w1) + &self.params.b1;
        let hidden = pre_activation.mapv(|v| v.max(0.0));
        let prediction = hidden.dot(&self.params.w2) + self.params.b2;
        ForwardPass {
            prediction,
            pre_activation,
            hidden,
        }
    }

    fn train_step(&mut self, x: ArrayView1<'_, f64>, target: f64) {
        let pass = self.forward(x);
        let d_pred = 2.0 * (pass.prediction - target);

        // Hidden-layer gradient uses the pre-update output weights.
        let d_pre: Array1<f64> = self
            .params
            .w2
            .iter()
            .zip(pass.pre_activation.iter())
            .map(|(w, z)| if *z > 0.0 { w * d_pred } else { 0.0 })
            .collect();

        let lr = self.learning_rate;
        self.params.w2.scaled_add(-lr * d_pred, &pass.hidden);
        self.params.b2 -= lr * d_pred;

        let (rows, cols) = self.params.w1.dim();
        for i in 0..rows {
            for j in 0..cols {
                self.params.w1[[i, j]] -= lr * x[i] * d_pre[j];
            }
        }
        self.params.b1.scaled_add(-lr, &d_pre);
    }
}

impl ArmModel for NeuralArm {
    fn variant(&self) -> Variant {
        Variant::Neural
    }

    fn score(&self, context: &ContextVector, _rng: &mut dyn RngCore) -> SkillPathResult<f64> {
        let (point, uncertainty) = self.estimate(context)?;
        Ok(point + self.exploration * uncertainty)
    }

    fn expected_reward(&self, context: &ContextVector) -> SkillPathResult<f64> {
        let (point, _) = self.estimate(context)?;
        Ok(if point.is_finite() {
            point.clamp(0.0, 1.0)
        } else {
            0.0
        })
    }

    fn update(&mut self, context: &ContextVector, reward: Reward) -> SkillPathResult<()> {
        context.ensure_dim(self.dim())?;
        let x = context.view();
        for _ in 0..self.epochs {
            self.train_step(x, reward.value());
        }
        self.updates += 1;
        Ok(())
    }

    fn observations(&self) -> u64 {
        self.updates
    }

    fn is_available(&self) -> bool {
        self.updates >= self.min_observations
    }
}
