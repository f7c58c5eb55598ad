//! Contextual-bandit skill recommender.
//!
//! Turns learner signals into a context vector per candidate skill, scores
//! each skill with per-arm models (LinUCB, Beta posterior sampling, a small
//! neural network, or an adaptive blend of all three), picks the next skill
//! to learn, and learns online from reported outcomes.

pub mod arm;
pub mod engine;
pub mod ensemble;
pub mod features;
pub mod linalg;
pub mod linucb;
pub mod model;
pub mod neural;
pub mod snapshot;
pub mod thompson;

pub use arm::{Arm, ArmRegistry};
pub use engine::{
    Alternative, ArmStats, FeatureContribution, RecommendOutcome, Recommendation,
    SkillRecommender,
};
pub use ensemble::{EnsembleCombiner, PerformanceSummary, ScoringPlan};
pub use features::{ContextVector, FeatureVectorBuilder, FEATURE_DIM, FEATURE_NAMES};
pub use linucb::{LinUcbArm, ScoreBreakdown};
pub use model::{ArmModel, Reward, Variant};
pub use neural::NeuralArm;
pub use snapshot::{ArmSnapshot, EngineSnapshot};
pub use thompson::{PosteriorStats, ThompsonArm};
