//! Shared configuration, error type, and domain types for the SkillPath
//! recommendation engine.

pub mod config;
pub mod error;
pub mod types;

pub use config::{AppConfig, BanditConfig, EnsembleStrategy, Policy};
pub use error::{SkillPathError, SkillPathResult};
pub use types::{
    normalize_skill_key, EducationLevel, GithubSignals, LearnerSignals, OutcomeComponents,
    ResumeSignals, Role, SkillCatalog, SkillMeta,
};
