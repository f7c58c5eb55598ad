//! Per-skill model state and the registry that owns it.
//!
//! The registry is built once from the catalog and never changes shape, so
//! the map itself needs no lock; each arm sits behind its own `RwLock`.
//! Scoring takes read guards, updates take the arm's write guard.

use crate::features::ContextVector;
use crate::linucb::LinUcbArm;
use crate::model::{ArmModel, Reward, Variant};
use crate::neural::NeuralArm;
use crate::thompson::ThompsonArm;
use parking_lot::{RwLock, RwLockReadGuard};
use rand::RngCore;
use skillpath_core::{BanditConfig, SkillPathResult};
use std::collections::BTreeMap;

/// All model state kept for one skill.
#[derive(Debug, Clone)]
pub struct Arm {
    key: String,
    pub(crate) linear: LinUcbArm,
    pub(crate) posterior: ThompsonArm,
    pub(crate) neural: Option<NeuralArm>,
}

impl Arm {
    pub fn new(key: impl Into<String>, linear: LinUcbArm, neural: Option<NeuralArm>) -> Self {
        Self {
            key: key.into(),
            linear,
            posterior: ThompsonArm::new(),
            neural,
        }
    }

    pub(crate) fn from_models(
        key: String,
        linear: LinUcbArm,
        posterior: ThompsonArm,
        neural: Option<NeuralArm>,
    ) -> Self {
        Self {
            key,
            linear,
            posterior,
            neural,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn linear(&self) -> &LinUcbArm {
        &self.linear
    }

    pub fn posterior(&self) -> &ThompsonArm {
        &self.posterior
    }

    pub fn neural(&self) -> Option<&NeuralArm> {
        self.neural.as_ref()
    }

    pub fn model(&self, variant: Variant) -> Option<&dyn ArmModel> {
        match variant {
            Variant::Linucb => Some(&self.linear),
            Variant::Thompson => Some(&self.posterior),
            Variant::Neural => self.neural.as_ref().map(|n| n as &dyn ArmModel),
        }
    }

    pub fn models(&self) -> impl Iterator<Item = &dyn ArmModel> {
        Variant::ALL.into_iter().filter_map(|v| self.model(v))
    }

    fn models_mut(&mut self) -> Vec<&mut dyn ArmModel> {
        let mut models: Vec<&mut dyn ArmModel> = Vec::with_capacity(Variant::ALL.len());
        models.push(&mut self.linear);
        models.push(&mut self.posterior);
        if let Some(neural) = self.neural.as_mut() {
            models.push(neural);
        }
        models
    }

    pub fn observations(&self) -> u64 {
        self.linear.observations()
    }

    /// Pre-update reward predictions from every model currently available.
    pub fn predictions(&self, context: &ContextVector) -> SkillPathResult<Vec<(Variant, f64)>> {
        self.models()
            .filter(|m| m.is_available())
            .map(|m| -> SkillPathResult<(Variant, f64)> {
                Ok((m.variant(), m.expected_reward(context)?))
            })
            .collect()
    }

    /// Score with one model family; `None` when this arm does not carry it.
    pub fn score(
        &self,
        variant: Variant,
        context: &ContextVector,
        rng: &mut dyn RngCore,
    ) -> Option<SkillPathResult<f64>> {
        self.model(variant).map(|m| m.score(context, rng))
    }

    /// Apply one observed outcome to every model. The context is checked
    /// before anything is touched, so a failure leaves the arm unchanged.
    pub fn update(&mut self, context: &ContextVector, reward: Reward) -> SkillPathResult<()> {
        context.ensure_dim(self.linear.dim())?;
        for model in self.models_mut() {
            model.update(context, reward)?;
        }
        Ok(())
    }
}

pub struct ArmRegistry {
    arms: BTreeMap<String, RwLock<Arm>>,
    dim: usize,
}

impl ArmRegistry {
    /// Seed one arm per key: `A = λI`, `b = 0`, Beta(1, 1), and a freshly
    /// initialised network when `with_neural` is set.
    pub fn new<'a>(
        keys: impl IntoIterator<Item = &'a str>,
        dim: usize,
        config: &BanditConfig,
        with_neural: bool,
        rng: &mut dyn RngCore,
    ) -> Self {
        let arms = keys
            .into_iter()
            .map(|key| {
                let linear = LinUcbArm::new(dim, config.linucb.alpha, config.linucb.lambda);
                let neural = with_neural.then(|| NeuralArm::new(dim, &config.neural, &mut *rng));
                (key.to_string(), RwLock::new(Arm::new(key, linear, neural)))
            })
            .collect();
        Self { arms, dim }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn get(&self, key: &str) -> Option<&RwLock<Arm>> {
        self.arms.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.arms.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.arms.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.arms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arms.is_empty()
    }

    /// Read guards on every arm, acquired in key order so the view is a
    /// single point in time and cannot deadlock with other full scans.
    pub fn read_all(&self) -> Vec<RwLockReadGuard<'_, Arm>> {
        self.arms.values().map(|arm| arm.read()).collect()
    }

    /// Swap in replacement state for every arm in `replacement`, holding all
    /// affected write guards at once. Keys must already be validated.
    pub(crate) fn replace_all(&self, mut replacement: BTreeMap<String, Arm>) {
        let mut guards: Vec<_> = self
            .arms
            .iter()
            .filter(|(key, _)| replacement.contains_key(*key))
            .map(|(key, arm)| (key, arm.write()))
            .collect();
        for (key, guard) in guards.iter_mut() {
            if let Some(arm) = replacement.remove(*key) {
                **guard = arm;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn registry(with_neural: bool) -> ArmRegistry {
        let mut rng = StdRng::seed_from_u64(11);
        ArmRegistry::new(
            ["sql", "python"],
            3,
            &BanditConfig::default(),
            with_neural,
            &mut rng,
        )
    }

    #[test]
    fn test_registry_seeds_every_arm() {
        let registry = registry(false);
        assert_eq!(registry.keys().collect::<Vec<_>>(), vec!["python", "sql"]);
        let arm = registry.get("python").unwrap().read();
        assert_eq!(arm.linear().a(), &ndarray::Array2::<f64>::eye(3));
        assert_eq!(arm.posterior().alpha(), 1.0);
        assert!(arm.neural().is_none());
        assert!(arm.model(Variant::Neural).is_none());
    }

    #[test]
    fn test_update_reaches_every_model() {
        let registry = registry(true);
        let x = ContextVector::new(vec![0.5, 0.1, 0.2]);
        {
            let mut arm = registry.get("sql").unwrap().write();
            arm.update(&x, Reward::new(1.0).unwrap()).unwrap();
        }
        let arm = registry.get("sql").unwrap().read();
        assert_eq!(arm.linear().observations(), 1);
        assert_eq!(arm.posterior().alpha(), 2.0);
        assert_eq!(arm.neural().unwrap().observations(), 1);
    }

    #[test]
    fn test_bad_context_leaves_arm_untouched() {
        let registry = registry(true);
        let x = ContextVector::new(vec![0.5]);
        let mut arm = registry.get("sql").unwrap().write();
        assert!(arm.update(&x, Reward::new(1.0).unwrap()).is_err());
        assert_eq!(arm.posterior().alpha(), 1.0);
        assert_eq!(arm.observations(), 0);
    }

    #[test]
    fn test_predictions_skip_unavailable_models() {
        let registry = registry(true);
        let x = ContextVector::new(vec![0.5, 0.1, 0.2]);
        let arm = registry.get("python").unwrap().read();
        let variants: Vec<Variant> = arm.predictions(&x).unwrap().into_iter().map(|(v, _)| v).collect();
        // default config requires 100 observations before the network counts
        assert_eq!(variants, vec![Variant::Linucb, Variant::Thompson]);
    }
}
