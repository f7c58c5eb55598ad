use crate::error::{SkillPathError, SkillPathResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;

// ─── Skill Catalog ──────────────────────────────────────────────────────────

/// Static metadata for one recommendable skill.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillMeta {
    pub key: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub category: String,
    /// Relative difficulty in `[0, 1]`.
    #[serde(default = "default_difficulty")]
    pub difficulty: f64,
    #[serde(default = "default_learning_time_hours")]
    pub learning_time_hours: f64,
    /// Job-market demand in `[0, 1]`.
    #[serde(default = "default_market_demand")]
    pub market_demand: f64,
    /// Keywords a resume may mention that indicate adjacent experience.
    #[serde(default)]
    pub related: Vec<String>,
    /// Programming language whose GitHub share signals proficiency in this skill.
    #[serde(default)]
    pub primary_language: Option<String>,
}

fn default_difficulty() -> f64 { 0.5 }
fn default_learning_time_hours() -> f64 { 100.0 }
fn default_market_demand() -> f64 { 0.5 }

impl SkillMeta {
    pub fn new(key: impl Into<String>, difficulty: f64, learning_time_hours: f64) -> Self {
        Self {
            key: key.into(),
            display_name: None,
            category: String::new(),
            difficulty,
            learning_time_hours,
            market_demand: default_market_demand(),
            related: Vec::new(),
            primary_language: None,
        }
    }

    /// Human-readable name, derived from the key when not configured.
    pub fn display_name(&self) -> String {
        match &self.display_name {
            Some(name) => name.clone(),
            None => self
                .key
                .split('_')
                .filter(|part| !part.is_empty())
                .map(|part| {
                    let mut chars = part.chars();
                    match chars.next() {
                        Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                        None => String::new(),
                    }
                })
                .collect::<Vec<_>>()
                .join(" "),
        }
    }
}

/// A target role and the skills it requires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Role {
    pub name: String,
    pub skills: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    skills: Vec<SkillMeta>,
    #[serde(default)]
    roles: Vec<Role>,
}

/// Validated skill catalog with per-role required-skill sets.
///
/// Skill keys and role names are normalized on construction, so lookups
/// accept free-form spellings such as `"Machine Learning"`.
#[derive(Debug, Clone)]
pub struct SkillCatalog {
    skills: BTreeMap<String, SkillMeta>,
    roles: BTreeMap<String, Vec<String>>,
}

impl SkillCatalog {
    pub fn new(skills: Vec<SkillMeta>, roles: Vec<Role>) -> SkillPathResult<Self> {
        let mut by_key = BTreeMap::new();
        for mut skill in skills {
            skill.key = normalize_skill_key(&skill.key);
            if skill.key.is_empty() {
                return Err(SkillPathError::Config("skill with empty key".to_string()));
            }
            for (field, value) in [
                ("difficulty", skill.difficulty),
                ("market_demand", skill.market_demand),
            ] {
                if !(0.0..=1.0).contains(&value) {
                    return Err(SkillPathError::Config(format!(
                        "skill '{}': {field} {value} outside [0, 1]",
                        skill.key
                    )));
                }
            }
            if !(skill.learning_time_hours >= 0.0) {
                return Err(SkillPathError::Config(format!(
                    "skill '{}': learning_time_hours must be non-negative",
                    skill.key
                )));
            }
            if by_key.contains_key(&skill.key) {
                return Err(SkillPathError::Config(format!(
                    "duplicate skill key '{}'",
                    skill.key
                )));
            }
            by_key.insert(skill.key.clone(), skill);
        }

        let mut by_role = BTreeMap::new();
        for role in roles {
            let name = normalize_skill_key(&role.name);
            let mut seen = BTreeSet::new();
            let mut required = Vec::with_capacity(role.skills.len());
            for skill in &role.skills {
                let key = normalize_skill_key(skill);
                if !by_key.contains_key(&key) {
                    return Err(SkillPathError::Config(format!(
                        "role '{name}' requires unknown skill '{key}'"
                    )));
                }
                if seen.insert(key.clone()) {
                    required.push(key);
                }
            }
            if by_role.insert(name.clone(), required).is_some() {
                return Err(SkillPathError::Config(format!("duplicate role '{name}'")));
            }
        }

        Ok(Self {
            skills: by_key,
            roles: by_role,
        })
    }

    /// Load a catalog from a TOML/JSON/YAML file (format picked by extension).
    pub fn from_file(path: &Path) -> SkillPathResult<Self> {
        let raw: CatalogFile = config::Config::builder()
            .add_source(config::File::from(path).required(true))
            .build()?
            .try_deserialize()?;
        let catalog = Self::new(raw.skills, raw.roles)?;
        tracing::info!(
            path = %path.display(),
            skills = catalog.skills.len(),
            roles = catalog.roles.len(),
            "Skill catalog loaded"
        );
        Ok(catalog)
    }

    pub fn skill(&self, key: &str) -> Option<&SkillMeta> {
        self.skills.get(key)
    }

    pub fn skills(&self) -> impl Iterator<Item = &SkillMeta> {
        self.skills.values()
    }

    /// Skill keys in lexicographic order.
    pub fn skill_keys(&self) -> impl Iterator<Item = &str> {
        self.skills.keys().map(String::as_str)
    }

    pub fn required_skills(&self, role: &str) -> Option<&[String]> {
        self.roles
            .get(&normalize_skill_key(role))
            .map(Vec::as_slice)
    }

    pub fn role_names(&self) -> impl Iterator<Item = &str> {
        self.roles.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.skills.len()
    }

    pub fn is_empty(&self) -> bool {
        self.skills.is_empty()
    }
}

/// Lowercase, trim, and join words with `_` so `"Machine Learning"`,
/// `"machine-learning"` and `"machine_learning"` collide.
pub fn normalize_skill_key(raw: &str) -> String {
    raw.split(|c: char| c.is_whitespace() || c == '-' || c == '_')
        .filter(|part| !part.is_empty())
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("_")
}

// ─── Learner Signals ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EducationLevel {
    #[default]
    None,
    Bachelor,
    Master,
    Phd,
}

impl EducationLevel {
    pub fn score(&self) -> f64 {
        match self {
            EducationLevel::None => 0.0,
            EducationLevel::Bachelor => 0.4,
            EducationLevel::Master => 0.7,
            EducationLevel::Phd => 1.0,
        }
    }

    /// Highest level mentioned in a list of free-text education entries.
    pub fn from_entries<S: AsRef<str>>(entries: &[S]) -> Self {
        let lowered: Vec<String> = entries.iter().map(|e| e.as_ref().to_lowercase()).collect();
        let mentions = |needle: &str| lowered.iter().any(|e| e.contains(needle));
        if mentions("phd") || mentions("doctor") {
            EducationLevel::Phd
        } else if mentions("master") {
            EducationLevel::Master
        } else if mentions("bachelor") {
            EducationLevel::Bachelor
        } else {
            EducationLevel::None
        }
    }
}

/// Facts already extracted from a resume.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResumeSignals {
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default)]
    pub experience_years: f64,
    #[serde(default)]
    pub education: EducationLevel,
}

/// Activity metrics already reduced from a GitHub profile.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GithubSignals {
    /// Overall activity in `[0, 1]`.
    #[serde(default)]
    pub activity_score: f64,
    /// Language → share of code in percent (`0..=100`).
    #[serde(default)]
    pub languages: HashMap<String, f64>,
    #[serde(default)]
    pub contribution_years: f64,
}

/// Everything the caller knows about a learner for one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearnerSignals {
    #[serde(default = "default_learning_speed")]
    pub learning_speed: f64,
    #[serde(default)]
    pub resume: Option<ResumeSignals>,
    #[serde(default)]
    pub github: Option<GithubSignals>,
}

fn default_learning_speed() -> f64 { 0.5 }

impl Default for LearnerSignals {
    fn default() -> Self {
        Self {
            learning_speed: default_learning_speed(),
            resume: None,
            github: None,
        }
    }
}

impl LearnerSignals {
    pub fn with_learning_speed(learning_speed: f64) -> Self {
        Self {
            learning_speed,
            ..Self::default()
        }
    }
}

// ─── Outcomes ───────────────────────────────────────────────────────────────

/// Raw facts about how a learner did on a recommended skill.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OutcomeComponents {
    pub weeks_taken: f64,
    /// Quiz score in percent (`0..=100`).
    pub quiz_score: f64,
    pub completed: bool,
}

impl OutcomeComponents {
    /// `mean(1/(1+weeks), quiz/100, completed ? 1.0 : 0.5)`, always in `[0, 1]`.
    pub fn reward(&self) -> f64 {
        let weeks = if self.weeks_taken.is_finite() {
            self.weeks_taken.max(0.0)
        } else {
            0.0
        };
        let speed = 1.0 / (1.0 + weeks);
        let quiz = if self.quiz_score.is_finite() {
            (self.quiz_score / 100.0).clamp(0.0, 1.0)
        } else {
            0.0
        };
        let completion = if self.completed { 1.0 } else { 0.5 };
        (speed + quiz + completion) / 3.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_catalog() -> SkillCatalog {
        SkillCatalog::new(
            vec![
                SkillMeta::new("Python", 0.3, 80.0),
                SkillMeta::new("Machine Learning", 0.7, 150.0),
                SkillMeta::new("sql", 0.3, 40.0),
            ],
            vec![Role {
                name: "Data Scientist".to_string(),
                skills: vec![
                    "python".to_string(),
                    "machine-learning".to_string(),
                    "SQL".to_string(),
                    "Python".to_string(),
                ],
            }],
        )
        .unwrap()
    }

    #[test]
    fn test_normalize_skill_key() {
        assert_eq!(normalize_skill_key("Machine Learning"), "machine_learning");
        assert_eq!(normalize_skill_key("  machine-learning "), "machine_learning");
        assert_eq!(normalize_skill_key("REST__API"), "rest_api");
    }

    #[test]
    fn test_catalog_normalizes_and_dedups_roles() {
        let catalog = sample_catalog();
        let required = catalog.required_skills("data scientist").unwrap();
        assert_eq!(required, &["python", "machine_learning", "sql"]);
        assert!(catalog.skill("machine_learning").is_some());
        assert_eq!(
            catalog.skill_keys().collect::<Vec<_>>(),
            vec!["machine_learning", "python", "sql"]
        );
    }

    #[test]
    fn test_catalog_rejects_unknown_role_skill() {
        let result = SkillCatalog::new(
            vec![SkillMeta::new("python", 0.3, 80.0)],
            vec![Role {
                name: "backend".to_string(),
                skills: vec!["rust".to_string()],
            }],
        );
        assert!(matches!(result, Err(SkillPathError::Config(_))));
    }

    #[test]
    fn test_catalog_rejects_out_of_range_difficulty() {
        let result = SkillCatalog::new(vec![SkillMeta::new("python", 1.5, 80.0)], vec![]);
        assert!(result.is_err());
    }

    #[test]
    fn test_display_name_from_key() {
        let skill = SkillMeta::new("machine_learning", 0.7, 150.0);
        assert_eq!(skill.display_name(), "Machine Learning");
    }

    #[test]
    fn test_education_from_entries() {
        assert_eq!(
            EducationLevel::from_entries(&["BS Computer Science", "Master of Data Science"]),
            EducationLevel::Master
        );
        assert_eq!(
            EducationLevel::from_entries(&["Bachelor of Arts"]),
            EducationLevel::Bachelor
        );
        assert_eq!(EducationLevel::from_entries::<&str>(&[]), EducationLevel::None);
    }

    #[test]
    fn test_outcome_reward_formula() {
        let outcome = OutcomeComponents {
            weeks_taken: 1.0,
            quiz_score: 80.0,
            completed: true,
        };
        let expected = (0.5 + 0.8 + 1.0) / 3.0;
        assert!((outcome.reward() - expected).abs() < 1e-12);

        let abandoned = OutcomeComponents {
            weeks_taken: 0.0,
            quiz_score: 0.0,
            completed: false,
        };
        assert!((abandoned.reward() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_outcome_reward_clamps_inputs() {
        let outcome = OutcomeComponents {
            weeks_taken: -3.0,
            quiz_score: 250.0,
            completed: true,
        };
        assert!((outcome.reward() - 1.0).abs() < 1e-12);
    }
}
