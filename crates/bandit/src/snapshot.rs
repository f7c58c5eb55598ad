//! Serializable capture of the full learning state, used to persist an
//! engine between runs and to compare state in tests.

use crate::arm::Arm;
use crate::ensemble::EnsembleSnapshot;
use crate::linucb::LinUcbArm;
use crate::model::ArmModel;
use crate::neural::{NeuralArm, NeuralParams};
use crate::thompson::ThompsonArm;
use chrono::{DateTime, Utc};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use skillpath_core::{BanditConfig, SkillPathError, SkillPathResult};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineSnapshot {
    pub taken_at: DateTime<Utc>,
    pub dimension: usize,
    pub arms: BTreeMap<String, ArmSnapshot>,
    #[serde(default)]
    pub ensemble: Option<EnsembleSnapshot>,
}

impl EngineSnapshot {
    pub fn to_json(&self) -> SkillPathResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(raw: &str) -> SkillPathResult<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArmSnapshot {
    /// Row-major `A`.
    pub a: Vec<Vec<f64>>,
    pub b: Vec<f64>,
    pub alpha: f64,
    pub beta: f64,
    pub observations: u64,
    #[serde(default)]
    pub neural: Option<NeuralSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeuralSnapshot {
    pub w1: Vec<Vec<f64>>,
    pub b1: Vec<f64>,
    pub w2: Vec<f64>,
    pub b2: f64,
    pub updates: u64,
}

impl ArmSnapshot {
    pub fn capture(arm: &Arm) -> Self {
        let linear = arm.linear();
        let posterior = arm.posterior();
        Self {
            a: rows(linear.a()),
            b: linear.b().to_vec(),
            alpha: posterior.alpha(),
            beta: posterior.beta(),
            observations: linear.observations(),
            neural: arm.neural().map(|n| {
                let params = n.params();
                NeuralSnapshot {
                    w1: rows(&params.w1),
                    b1: params.b1.to_vec(),
                    w2: params.w2.to_vec(),
                    b2: params.b2,
                    updates: n.observations(),
                }
            }),
        }
    }

    /// Rebuild an arm, validating every shape against `dim`. Hyperparameters
    /// come from the running configuration, not the snapshot.
    pub fn restore(
        &self,
        key: &str,
        dim: usize,
        config: &BanditConfig,
        with_neural: bool,
    ) -> SkillPathResult<Arm> {
        if self.b.len() != dim {
            return Err(SkillPathError::DimensionMismatch {
                expected: dim,
                actual: self.b.len(),
            });
        }
        let a = matrix(&self.a, key)?;
        let linear = LinUcbArm::from_parts(
            a,
            Array1::from(self.b.clone()),
            config.linucb.alpha,
            config.linucb.lambda,
            self.observations,
        )?;
        let posterior = ThompsonArm::from_parts(self.alpha, self.beta, self.observations)?;

        let neural = match (with_neural, &self.neural) {
            (true, Some(snap)) => {
                let w1 = matrix(&snap.w1, key)?;
                if w1.nrows() != dim {
                    return Err(SkillPathError::DimensionMismatch {
                        expected: dim,
                        actual: w1.nrows(),
                    });
                }
                let params = NeuralParams {
                    w1,
                    b1: Array1::from(snap.b1.clone()),
                    w2: Array1::from(snap.w2.clone()),
                    b2: snap.b2,
                };
                Some(NeuralArm::from_parts(params, &config.neural, snap.updates)?)
            }
            (true, None) => {
                return Err(SkillPathError::Snapshot(format!(
                    "arm '{key}' has no network state"
                )))
            }
            (false, _) => None,
        };

        Ok(Arm::from_models(key.to_string(), linear, posterior, neural))
    }
}

fn rows(m: &Array2<f64>) -> Vec<Vec<f64>> {
    m.outer_iter().map(|row| row.to_vec()).collect()
}

fn matrix(rows: &[Vec<f64>], key: &str) -> SkillPathResult<Array2<f64>> {
    let ncols = rows.first().map_or(0, Vec::len);
    if rows.iter().any(|r| r.len() != ncols) {
        return Err(SkillPathError::Snapshot(format!(
            "arm '{key}' has a ragged matrix"
        )));
    }
    let flat: Vec<f64> = rows.iter().flatten().copied().collect();
    Array2::from_shape_vec((rows.len(), ncols), flat)
        .map_err(|e| SkillPathError::Snapshot(format!("arm '{key}': {e}")))
}
