//! Uniform contract shared by every arm-model family.

use crate::features::ContextVector;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use skillpath_core::{SkillPathError, SkillPathResult};

/// A reward already validated to lie in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Reward(f64);

impl Reward {
    pub fn new(value: f64) -> SkillPathResult<Self> {
        if value.is_finite() && (0.0..=1.0).contains(&value) {
            Ok(Self(value))
        } else {
            Err(SkillPathError::InvalidReward(value))
        }
    }

    pub fn value(self) -> f64 {
        self.0
    }
}

/// Bandit model family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Variant {
    Linucb,
    Thompson,
    Neural,
}

impl Variant {
    pub const ALL: [Variant; 3] = [Variant::Linucb, Variant::Thompson, Variant::Neural];

    pub fn as_str(&self) -> &'static str {
        match self {
            Variant::Linucb => "linucb",
            Variant::Thompson => "thompson",
            Variant::Neural => "neural",
        }
    }
}

impl std::fmt::Display for Variant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Score/update contract implemented by each per-arm model.
///
/// Models that ignore the context (posterior sampling) still take it, so the
/// ensemble can drive every family through one interface. Randomness comes
/// from the caller's generator so seeded runs are reproducible.
pub trait ArmModel: Send + Sync {
    fn variant(&self) -> Variant;

    /// Ranking score: exploitation estimate plus exploration bonus.
    fn score(&self, context: &ContextVector, rng: &mut dyn RngCore) -> SkillPathResult<f64>;

    /// Expected reward in `[0, 1]`, without any exploration term.
    fn expected_reward(&self, context: &ContextVector) -> SkillPathResult<f64>;

    fn update(&mut self, context: &ContextVector, reward: Reward) -> SkillPathResult<()>;

    fn observations(&self) -> u64;

    /// Whether the model has enough history to take part in scoring.
    fn is_available(&self) -> bool {
        true
    }
}
