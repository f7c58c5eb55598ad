//! Feature Vector Builder: turns skill metadata and learner signals into
//! the fixed-length context vector every arm model consumes.
//!
//! Layout (10 dims, all in `[0, 1]`):
//!   [0]: skill difficulty
//!   [1]: learning time (hours / 150)
//!   [2]: learner speed
//!   [3..7): resume: skill listed, related-keyword overlap, experience (years / 10), education
//!   [7..10): GitHub: activity, primary-language share, contribution years / 10
//!
//! Reordering or resizing this layout invalidates every trained arm.

use ndarray::{Array1, ArrayView1};
use skillpath_core::{normalize_skill_key, LearnerSignals, SkillMeta, SkillPathError, SkillPathResult};
use std::collections::HashSet;

pub const FEATURE_DIM: usize = 10;

pub const FEATURE_NAMES: [&str; FEATURE_DIM] = [
    "difficulty",
    "learning_time",
    "learning_speed",
    "skill_in_resume",
    "related_overlap",
    "experience",
    "education",
    "github_activity",
    "language_proficiency",
    "contribution_years",
];

const LEARNING_TIME_CEILING_HOURS: f64 = 150.0;
const EXPERIENCE_CEILING_YEARS: f64 = 10.0;
const CONTRIBUTION_CEILING_YEARS: f64 = 10.0;

/// Ordered numeric encoding of one (skill, learner) pair.
#[derive(Debug, Clone, PartialEq)]
pub struct ContextVector(Array1<f64>);

impl ContextVector {
    pub fn new(values: Vec<f64>) -> Self {
        Self(Array1::from(values))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn view(&self) -> ArrayView1<'_, f64> {
        self.0.view()
    }

    pub fn to_vec(&self) -> Vec<f64> {
        self.0.to_vec()
    }

    pub fn ensure_dim(&self, expected: usize) -> SkillPathResult<()> {
        if self.len() != expected {
            return Err(SkillPathError::DimensionMismatch {
                expected,
                actual: self.len(),
            });
        }
        Ok(())
    }

    /// Population variance of the entries; zero for an empty vector.
    pub fn variance(&self) -> f64 {
        if self.is_empty() {
            return 0.0;
        }
        let mean = self.0.sum() / self.len() as f64;
        self.0.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / self.len() as f64
    }
}

impl From<Vec<f64>> for ContextVector {
    fn from(values: Vec<f64>) -> Self {
        Self::new(values)
    }
}

/// Pure builder for [`ContextVector`]s. Identical input yields identical output.
#[derive(Debug, Clone, Copy, Default)]
pub struct FeatureVectorBuilder;

impl FeatureVectorBuilder {
    pub fn dimension(&self) -> usize {
        FEATURE_DIM
    }

    pub fn build(&self, skill: &SkillMeta, signals: &LearnerSignals) -> ContextVector {
        let mut features = Vec::with_capacity(FEATURE_DIM);

        features.push(unit(skill.difficulty));
        features.push(unit(skill.learning_time_hours / LEARNING_TIME_CEILING_HOURS));
        features.push(unit(signals.learning_speed));

        match &signals.resume {
            Some(resume) => {
                let resume_skills: HashSet<String> =
                    resume.skills.iter().map(|s| normalize_skill_key(s)).collect();

                let listed = resume_skills.contains(&skill.key);
                features.push(if listed { 1.0 } else { 0.0 });

                let related: HashSet<String> =
                    skill.related.iter().map(|s| normalize_skill_key(s)).collect();
                let overlap = resume_skills.intersection(&related).count();
                features.push(unit(overlap as f64 / related.len().max(1) as f64));

                features.push(unit(resume.experience_years / EXPERIENCE_CEILING_YEARS));
                features.push(resume.education.score());
            }
            None => features.extend([0.0; 4]),
        }

        match &signals.github {
            Some(github) => {
                features.push(unit(github.activity_score));

                let share = skill
                    .primary_language
                    .as_deref()
                    .map(normalize_skill_key)
                    .and_then(|lang| {
                        github
                            .languages
                            .iter()
                            .find(|(name, _)| normalize_skill_key(name) == lang)
                            .map(|(_, pct)| *pct)
                    })
                    .unwrap_or(0.0);
                features.push(unit(share / 100.0));

                features.push(unit(github.contribution_years / CONTRIBUTION_CEILING_YEARS));
            }
            None => features.extend([0.0; 3]),
        }

        ContextVector::new(features)
    }
}

/// Clip into `[0, 1]`; non-finite values map to 0.
fn unit(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skillpath_core::{EducationLevel, GithubSignals, ResumeSignals};
    use std::collections::HashMap;

    fn ml_skill() -> SkillMeta {
        let mut skill = SkillMeta::new("machine_learning", 0.7, 150.0);
        skill.related = vec!["python".into(), "statistics".into(), "math".into()];
        skill.primary_language = Some("Python".into());
        skill
    }

    #[test]
    fn test_missing_signals_default_to_zero() {
        let context = FeatureVectorBuilder.build(&ml_skill(), &LearnerSignals::with_learning_speed(0.8));
        assert_eq!(context.len(), FEATURE_DIM);
        assert_eq!(
            context.to_vec(),
            vec![0.7, 1.0, 0.8, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]
        );
    }

    #[test]
    fn test_full_signals() {
        let mut languages = HashMap::new();
        languages.insert("python".to_string(), 60.0);
        let signals = LearnerSignals {
            learning_speed: 0.5,
            resume: Some(ResumeSignals {
                skills: vec!["Python".into(), "Statistics".into(), "Machine Learning".into()],
                experience_years: 3.5,
                education: EducationLevel::Master,
            }),
            github: Some(GithubSignals {
                activity_score: 0.9,
                languages,
                contribution_years: 25.0,
            }),
        };

        let context = FeatureVectorBuilder.build(&ml_skill(), &signals).to_vec();
        assert_eq!(context[3], 1.0);
        assert!((context[4] - 2.0 / 3.0).abs() < 1e-12);
        assert!((context[5] - 0.35).abs() < 1e-12);
        assert_eq!(context[6], 0.7);
        assert_eq!(context[7], 0.9);
        assert!((context[8] - 0.6).abs() < 1e-12);
        // clipped at the ceiling
        assert_eq!(context[9], 1.0);
    }

    #[test]
    fn test_values_stay_in_unit_range() {
        let mut skill = SkillMeta::new("kubernetes", 0.9, 400.0);
        skill.primary_language = Some("go".into());
        let signals = LearnerSignals {
            learning_speed: f64::NAN,
            resume: Some(ResumeSignals {
                skills: vec![],
                experience_years: -2.0,
                education: EducationLevel::None,
            }),
            github: None,
        };
        let context = FeatureVectorBuilder.build(&skill, &signals);
        assert!(context.view().iter().all(|v| (0.0..=1.0).contains(v)));
        assert_eq!(context.to_vec()[2], 0.0);
    }

    #[test]
    fn test_build_is_deterministic() {
        let signals = LearnerSignals::with_learning_speed(0.3);
        let a = FeatureVectorBuilder.build(&ml_skill(), &signals);
        let b = FeatureVectorBuilder.build(&ml_skill(), &signals);
        assert_eq!(a, b);
    }

    #[test]
    fn test_ensure_dim() {
        let context = ContextVector::new(vec![0.1, 0.2]);
        assert!(context.ensure_dim(2).is_ok());
        assert!(matches!(
            context.ensure_dim(3),
            Err(SkillPathError::DimensionMismatch { expected: 3, actual: 2 })
        ));
    }

    #[test]
    fn test_variance() {
        assert_eq!(ContextVector::new(vec![0.5, 0.5]).variance(), 0.0);
        assert!((ContextVector::new(vec![0.0, 1.0]).variance() - 0.25).abs() < 1e-12);
    }
}
