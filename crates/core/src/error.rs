use thiserror::Error;

pub type SkillPathResult<T> = Result<T, SkillPathError>;

#[derive(Error, Debug)]
pub enum SkillPathError {
    #[error("Context dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Invalid reward {0}: must lie in [0, 1]")]
    InvalidReward(f64),

    #[error("Unknown arm: {0}")]
    UnknownArm(String),

    #[error("Unknown role: {0}")]
    UnknownRole(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Snapshot error: {0}")]
    Snapshot(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<config::ConfigError> for SkillPathError {
    fn from(err: config::ConfigError) -> Self {
        SkillPathError::Config(err.to_string())
    }
}
