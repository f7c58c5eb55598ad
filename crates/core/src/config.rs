use crate::error::{SkillPathError, SkillPathResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Root application configuration. Loaded from environment variables
/// with the prefix `SKILLPATH__` and optional TOML/JSON config files.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_catalog_path")]
    pub catalog_path: String,
    #[serde(default)]
    pub bandit: BanditConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
}

fn default_catalog_path() -> String { "config/catalog.toml".to_string() }

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            catalog_path: default_catalog_path(),
            bandit: BanditConfig::default(),
            simulation: SimulationConfig::default(),
        }
    }
}

// ─── Bandit Config ──────────────────────────────────────────────────────────

/// Which scorer drives arm selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Policy {
    #[default]
    Linucb,
    Thompson,
    Neural,
    Ensemble,
}

impl Policy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Policy::Linucb => "linucb",
            Policy::Thompson => "thompson",
            Policy::Neural => "neural",
            Policy::Ensemble => "ensemble",
        }
    }
}

impl std::str::FromStr for Policy {
    type Err = SkillPathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "linucb" => Ok(Policy::Linucb),
            "thompson" => Ok(Policy::Thompson),
            "neural" => Ok(Policy::Neural),
            "ensemble" => Ok(Policy::Ensemble),
            other => Err(SkillPathError::Config(format!("unknown policy '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BanditConfig {
    #[serde(default)]
    pub policy: Policy,
    /// Seed for the shared random source. `None` seeds from OS entropy.
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub linucb: LinUcbConfig,
    #[serde(default)]
    pub neural: NeuralConfig,
    #[serde(default)]
    pub ensemble: EnsembleConfig,
}

impl Default for BanditConfig {
    fn default() -> Self {
        Self {
            policy: Policy::default(),
            seed: None,
            linucb: LinUcbConfig::default(),
            neural: NeuralConfig::default(),
            ensemble: EnsembleConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LinUcbConfig {
    #[serde(default = "default_linucb_alpha")]
    pub alpha: f64,
    #[serde(default = "default_linucb_lambda")]
    pub lambda: f64,
}

fn default_linucb_alpha() -> f64 { 1.0 }
fn default_linucb_lambda() -> f64 { 1.0 }

impl Default for LinUcbConfig {
    fn default() -> Self {
        Self {
            alpha: default_linucb_alpha(),
            lambda: default_linucb_lambda(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NeuralConfig {
    #[serde(default = "default_neural_enabled")]
    pub enabled: bool,
    #[serde(default = "default_hidden_size")]
    pub hidden_size: usize,
    #[serde(default = "default_neural_learning_rate")]
    pub learning_rate: f64,
    #[serde(default = "default_neural_epochs")]
    pub epochs: usize,
    /// Weight on the uncertainty term (`β`).
    #[serde(default = "default_neural_exploration")]
    pub exploration: f64,
    /// Updates an arm needs before its network takes part in scoring.
    #[serde(default = "default_min_observations")]
    pub min_observations: u64,
}

fn default_neural_enabled() -> bool { true }
fn default_hidden_size() -> usize { 64 }
fn default_neural_learning_rate() -> f64 { 0.05 }
fn default_neural_epochs() -> usize { 5 }
fn default_neural_exploration() -> f64 { 1.0 }
fn default_min_observations() -> u64 { 100 }

impl Default for NeuralConfig {
    fn default() -> Self {
        Self {
            enabled: default_neural_enabled(),
            hidden_size: default_hidden_size(),
            learning_rate: default_neural_learning_rate(),
            epochs: default_neural_epochs(),
            exploration: default_neural_exploration(),
            min_observations: default_min_observations(),
        }
    }
}

// ─── Ensemble Config ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EnsembleStrategy {
    #[default]
    WeightedVoting,
    BestPerformer,
    ContextDependent,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EnsembleConfig {
    #[serde(default)]
    pub strategy: EnsembleStrategy,
    #[serde(default = "default_linucb_weight")]
    pub linucb_weight: f64,
    #[serde(default = "default_thompson_weight")]
    pub thompson_weight: f64,
    #[serde(default = "default_neural_weight")]
    pub neural_weight: f64,
    /// Step size `η` for weight adaptation.
    #[serde(default = "default_ensemble_learning_rate")]
    pub learning_rate: f64,
    /// Smoothing factor for each variant's running reward average.
    #[serde(default = "default_ema_alpha")]
    pub ema_alpha: f64,
    #[serde(default = "default_min_weight")]
    pub min_weight: f64,
    /// `context_dependent` switches to posterior sampling above this
    /// context variance.
    #[serde(default = "default_context_variance_threshold")]
    pub context_variance_threshold: f64,
}

fn default_linucb_weight() -> f64 { 0.4 }
fn default_thompson_weight() -> f64 { 0.3 }
fn default_neural_weight() -> f64 { 0.3 }
fn default_ensemble_learning_rate() -> f64 { 0.05 }
fn default_ema_alpha() -> f64 { 0.1 }
fn default_min_weight() -> f64 { 0.01 }
fn default_context_variance_threshold() -> f64 { 0.1 }

impl Default for EnsembleConfig {
    fn default() -> Self {
        Self {
            strategy: EnsembleStrategy::default(),
            linucb_weight: default_linucb_weight(),
            thompson_weight: default_thompson_weight(),
            neural_weight: default_neural_weight(),
            learning_rate: default_ensemble_learning_rate(),
            ema_alpha: default_ema_alpha(),
            min_weight: default_min_weight(),
            context_variance_threshold: default_context_variance_threshold(),
        }
    }
}

// ─── Simulation Config ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct SimulationConfig {
    #[serde(default = "default_learners")]
    pub learners: usize,
    #[serde(default = "default_rounds")]
    pub rounds: usize,
    /// Standard deviation of the simulated reward noise.
    #[serde(default = "default_noise")]
    pub noise: f64,
}

fn default_learners() -> usize { 200 }
fn default_rounds() -> usize { 20 }
fn default_noise() -> f64 { 0.1 }

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            learners: default_learners(),
            rounds: default_rounds(),
            noise: default_noise(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn load() -> SkillPathResult<Self> {
        let config = config::Config::builder()
            .add_source(Self::environment())
            .build()?;
        let config: Self = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file, with environment variables layered on top.
    pub fn load_from(path: &Path) -> SkillPathResult<Self> {
        let config = config::Config::builder()
            .add_source(config::File::from(path).required(true))
            .add_source(Self::environment())
            .build()?;
        let config: Self = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn environment() -> config::Environment {
        config::Environment::with_prefix("SKILLPATH")
            .separator("__")
            .try_parsing(true)
    }

    pub fn validate(&self) -> SkillPathResult<()> {
        self.bandit.validate()?;
        if !(self.simulation.noise >= 0.0) {
            return Err(SkillPathError::Config(
                "simulation.noise must be non-negative".to_string(),
            ));
        }
        Ok(())
    }
}

impl BanditConfig {
    pub fn validate(&self) -> SkillPathResult<()> {
        let linucb = &self.linucb;
        if !(linucb.lambda > 0.0) || !linucb.lambda.is_finite() {
            return Err(SkillPathError::Config(format!(
                "linucb.lambda must be positive, got {}",
                linucb.lambda
            )));
        }
        if !(linucb.alpha >= 0.0) || !linucb.alpha.is_finite() {
            return Err(SkillPathError::Config(format!(
                "linucb.alpha must be non-negative, got {}",
                linucb.alpha
            )));
        }

        let neural = &self.neural;
        if self.policy == Policy::Neural && !neural.enabled {
            return Err(SkillPathError::Config(
                "policy 'neural' requires neural.enabled = true".to_string(),
            ));
        }
        if neural.enabled {
            if neural.hidden_size == 0 {
                return Err(SkillPathError::Config(
                    "neural.hidden_size must be at least 1".to_string(),
                ));
            }
            if !(neural.learning_rate > 0.0) || !(neural.exploration >= 0.0) {
                return Err(SkillPathError::Config(
                    "neural.learning_rate must be positive and neural.exploration non-negative"
                        .to_string(),
                ));
            }
        }

        let ensemble = &self.ensemble;
        let weights = [
            ensemble.linucb_weight,
            ensemble.thompson_weight,
            ensemble.neural_weight,
        ];
        if weights.iter().any(|w| !(*w >= 0.0) || !w.is_finite()) {
            return Err(SkillPathError::Config(
                "ensemble weights must be finite and non-negative".to_string(),
            ));
        }
        if weights.iter().sum::<f64>() <= 0.0 {
            return Err(SkillPathError::Config(
                "ensemble weights must not all be zero".to_string(),
            ));
        }
        if !(ensemble.learning_rate >= 0.0)
            || !(0.0..=1.0).contains(&ensemble.ema_alpha)
            || !(0.0..1.0).contains(&ensemble.min_weight)
        {
            return Err(SkillPathError::Config(
                "ensemble.learning_rate must be >= 0, ema_alpha in [0, 1], min_weight in [0, 1)"
                    .to_string(),
            ));
        }
        if !(ensemble.context_variance_threshold >= 0.0) {
            return Err(SkillPathError::Config(
                "ensemble.context_variance_threshold must be non-negative".to_string(),
            ));
        }
        Ok(())
    }
}
