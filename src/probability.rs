//! Evolution probability models.
//!
//! The attempt engine never rolls dice itself. It hands the agent snapshot to
//! an [`EvolutionProbabilityModel`] and applies whatever outcome comes back,
//! so the formula can be swapped and tested independently of state transitions.
//!
//! [`DefaultProbabilityModel`] carries the product's rate tables:
//!
//! ```text
//! probability = min(95, floor((base[gen] + floor(avg/20) + min(10, floor(convs/50))) * min(1, progress/100)))
//! ```
//!
//! A successful roll may additionally mutate, with a per-target-generation chance.

use std::sync::Mutex;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::agent::{AgentRecord, Generation, PROGRESS_MAX};
use crate::personality::{PersonalityDelta, TraitKind};

/// Strategy deciding the outcome of an evolution attempt.
pub trait EvolutionProbabilityModel: Send + Sync {
    /// Decide one attempt for an agent that already passed the precondition gate.
    fn attempt(&self, agent: &AgentRecord) -> EvolutionOutcome;
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// Kinds of mutation a successful evolution can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationKind {
    EmpathyMaster,
    LogicGenius,
    CreativeBurst,
    EnergyOverflow,
    HumorKing,
    BalancedSage,
}

impl MutationKind {
    /// Every mutation kind, in table order.
    pub const ALL: [MutationKind; 6] = [
        MutationKind::EmpathyMaster,
        MutationKind::LogicGenius,
        MutationKind::CreativeBurst,
        MutationKind::EnergyOverflow,
        MutationKind::HumorKing,
        MutationKind::BalancedSage,
    ];

    /// Machine identifier (`empathy_master`, ...).
    pub fn label(self) -> &'static str {
        match self {
            Self::EmpathyMaster => "empathy_master",
            Self::LogicGenius => "logic_genius",
            Self::CreativeBurst => "creative_burst",
            Self::EnergyOverflow => "energy_overflow",
            Self::HumorKing => "humor_king",
            Self::BalancedSage => "balanced_sage",
        }
    }

    /// Human-readable name.
    pub fn display_name(self) -> &'static str {
        match self {
            Self::EmpathyMaster => "Empathy Master",
            Self::LogicGenius => "Logic Genius",
            Self::CreativeBurst => "Creative Burst",
            Self::EnergyOverflow => "Energy Overflow",
            Self::HumorKing => "Humor King",
            Self::BalancedSage => "Balanced Sage",
        }
    }

    /// Trait boosted by this mutation; `None` means every trait.
    pub fn boosted_trait(self) -> Option<TraitKind> {
        match self {
            Self::EmpathyMaster => Some(TraitKind::Warmth),
            Self::LogicGenius => Some(TraitKind::Logic),
            Self::CreativeBurst => Some(TraitKind::Creativity),
            Self::EnergyOverflow => Some(TraitKind::Energy),
            Self::HumorKing => Some(TraitKind::Humor),
            Self::BalancedSage => None,
        }
    }

    /// Personality bonus of the given magnitude.
    pub fn bonus(self, magnitude: i32) -> PersonalityDelta {
        match self.boosted_trait() {
            Some(kind) => PersonalityDelta::new().with(kind, magnitude),
            None => TraitKind::ALL.iter().map(|k| (*k, magnitude)).collect(),
        }
    }
}

impl std::fmt::Display for MutationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// A mutation attached to a successful evolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mutation {
    pub kind: MutationKind,
    pub name: String,
    pub personality_bonus: PersonalityDelta,
}

impl Mutation {
    /// A mutation of `kind` whose bonus has the given magnitude.
    pub fn new(kind: MutationKind, magnitude: i32) -> Self {
        Self {
            kind,
            name: kind.display_name().to_string(),
            personality_bonus: kind.bonus(magnitude),
        }
    }
}

/// What a probability model decided.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvolutionOutcome {
    pub success: bool,
    /// Success chance in whole percent, `[0, 100]`.
    pub probability: u8,
    /// Only meaningful when `success` is true.
    pub mutation: Option<Mutation>,
    pub message: String,
}

// ---------------------------------------------------------------------------
// Default model
// ---------------------------------------------------------------------------

/// Rate tables for [`DefaultProbabilityModel`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbabilityConfig {
    /// Base success percent by current generation, Gen 1 first.
    pub base_rates: Vec<u8>,
    /// Mutation percent on success by target generation, Gen 2 first.
    pub mutation_rates: Vec<u8>,
    /// Ceiling for the computed probability.
    pub max_probability: u8,
    /// One bonus point per this many average trait points.
    pub trait_points_per_bonus: f64,
    /// One bonus point per this many conversations.
    pub conversations_per_bonus: u64,
    /// Ceiling for the conversation bonus.
    pub max_conversation_bonus: u64,
}

impl Default for ProbabilityConfig {
    fn default() -> Self {
        Self {
            base_rates: vec![60, 40, 20, 5],
            mutation_rates: vec![5, 3, 2, 1],
            max_probability: 95,
            trait_points_per_bonus: 20.0,
            conversations_per_bonus: 50,
            max_conversation_bonus: 10,
        }
    }
}

impl ProbabilityConfig {
    fn base_rate(&self, current: Generation) -> u8 {
        self.base_rates
            .get(usize::from(current.get() - Generation::MIN))
            .copied()
            .unwrap_or(0)
    }

    fn mutation_rate(&self, target: Generation) -> u8 {
        usize::from(target.get())
            .checked_sub(usize::from(Generation::MIN) + 1)
            .and_then(|i| self.mutation_rates.get(i))
            .copied()
            .unwrap_or(0)
    }
}

/// Rate-table model with an optional seeded RNG.
pub struct DefaultProbabilityModel {
    config: ProbabilityConfig,
    rng: Option<Mutex<StdRng>>,
}

impl DefaultProbabilityModel {
    /// Model drawing from the thread-local RNG.
    pub fn new(config: ProbabilityConfig) -> Self {
        Self { config, rng: None }
    }

    /// Model with a deterministic RNG stream.
    pub fn seeded(config: ProbabilityConfig, seed: u64) -> Self {
        Self {
            config,
            rng: Some(Mutex::new(StdRng::seed_from_u64(seed))),
        }
    }

    /// Active rate tables.
    pub fn config(&self) -> &ProbabilityConfig {
        &self.config
    }

    fn personality_bonus(&self, agent: &AgentRecord) -> u64 {
        if self.config.trait_points_per_bonus <= 0.0 {
            return 0;
        }
        (agent.personality().average() / self.config.trait_points_per_bonus).floor() as u64
    }

    /// Success chance in whole percent. Zero at the maximum generation.
    pub fn probability(&self, agent: &AgentRecord) -> u8 {
        let base = self.config.base_rate(agent.generation()) as u64;
        if base == 0 {
            return 0;
        }
        let conversation_bonus = match self.config.conversations_per_bonus {
            0 => 0,
            per => (agent.total_conversations() / per).min(self.config.max_conversation_bonus),
        };
        let multiplier =
            (agent.evolution_progress() as f64 / PROGRESS_MAX as f64).min(1.0);
        let raw = ((base + self.personality_bonus(agent) + conversation_bonus) as f64 * multiplier)
            .floor();
        raw.min(self.config.max_probability.min(100) as f64) as u8
    }

    /// Decide an attempt with an explicit RNG.
    pub fn decide<R: Rng>(&self, agent: &AgentRecord, rng: &mut R) -> EvolutionOutcome {
        let probability = self.probability(agent);
        let roll: f64 = rng.gen_range(0.0..100.0);
        let success = roll < probability as f64;

        let target = agent.generation().next();
        let (Some(target), true) = (target, success) else {
            return EvolutionOutcome {
                success: false,
                probability,
                mutation: None,
                message: format!(
                    "Evolution failed ({}/{probability}), try again next time",
                    roll.floor() as u32
                ),
            };
        };

        let mutation_roll: f64 = rng.gen_range(0.0..100.0);
        let mutation = (mutation_roll < self.config.mutation_rate(target) as f64).then(|| {
            let kind = MutationKind::ALL
                .choose(rng)
                .copied()
                .unwrap_or(MutationKind::BalancedSage);
            let magnitude = self.personality_bonus(agent).max(1) as i32;
            Mutation::new(kind, magnitude)
        });

        let message = match &mutation {
            Some(m) => format!(
                "Mutant evolution! {target} ({}) with probability {probability}%",
                m.kind
            ),
            None => format!("Evolution succeeded! {target} with probability {probability}%"),
        };

        EvolutionOutcome {
            success: true,
            probability,
            mutation,
            message,
        }
    }
}

impl Default for DefaultProbabilityModel {
    fn default() -> Self {
        Self::new(ProbabilityConfig::default())
    }
}

impl std::fmt::Debug for DefaultProbabilityModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefaultProbabilityModel")
            .field("config", &self.config)
            .field("seeded", &self.rng.is_some())
            .finish()
    }
}

impl EvolutionProbabilityModel for DefaultProbabilityModel {
    fn attempt(&self, agent: &AgentRecord) -> EvolutionOutcome {
        match &self.rng {
            Some(rng) => {
                let mut guard = rng.lock().unwrap_or_else(|e| e.into_inner());
                self.decide(agent, &mut *guard)
            }
            None => self.decide(agent, &mut rand::thread_rng()),
        }
    }
}

// ---------------------------------------------------------------------------
// Scripted model
// ---------------------------------------------------------------------------

/// Model that always returns the same outcome. Useful for callers that decide
/// the outcome elsewhere and for tests.
#[derive(Debug, Clone)]
pub struct ScriptedModel {
    outcome: EvolutionOutcome,
}

impl ScriptedModel {
    /// A model that always returns `outcome`.
    pub fn new(outcome: EvolutionOutcome) -> Self {
        Self { outcome }
    }

    /// Always evolve, reporting `probability`.
    pub fn always_succeed(probability: u8) -> Self {
        Self::new(EvolutionOutcome {
            success: true,
            probability,
            mutation: None,
            message: format!("Evolution succeeded with probability {probability}%"),
        })
    }

    /// Always fail, reporting `probability`.
    pub fn always_fail(probability: u8) -> Self {
        Self::new(EvolutionOutcome {
            success: false,
            probability,
            mutation: None,
            message: format!("Evolution failed with probability {probability}%"),
        })
    }

    /// Always evolve with the given mutation.
    pub fn always_mutate(probability: u8, kind: MutationKind, magnitude: i32) -> Self {
        Self::new(EvolutionOutcome {
            success: true,
            probability,
            mutation: Some(Mutation::new(kind, magnitude)),
            message: format!("Mutant evolution ({kind}) with probability {probability}%"),
        })
    }
}

impl EvolutionProbabilityModel for ScriptedModel {
    fn attempt(&self, _agent: &AgentRecord) -> EvolutionOutcome {
        self.outcome.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::AgentId;
    use crate::personality::Personality;

    fn agent(generation: u8, progress: u8, conversations: u64, p: Personality) -> AgentRecord {
        AgentRecord::new(AgentId::new(1).unwrap(), 0)
            .with_generation(Generation::new(generation).unwrap())
            .with_evolution_progress(progress)
            .with_total_conversations(conversations)
            .with_personality(p)
    }

    #[test]
    fn probability_formula() {
        let model = DefaultProbabilityModel::default();
        // base 60 + floor(50/20)=2 + min(10, 120/50=2) = 64
        let a = agent(1, 100, 120, Personality::neutral());
        assert_eq!(model.probability(&a), 64);

        // base 5 + 2 + 10 = 17
        let a = agent(4, 100, 5_000, Personality::neutral());
        assert_eq!(model.probability(&a), 17);

        // 60 + 5 + 10 = 75
        let a = agent(1, 100, 10_000, Personality::new(100, 100, 100, 100, 100));
        assert_eq!(model.probability(&a), 75);
        let generous = DefaultProbabilityModel::new(ProbabilityConfig {
            base_rates: vec![99, 99, 99, 99],
            ..Default::default()
        });
        // Capped at 95.
        assert_eq!(generous.probability(&a), 95);
    }

    #[test]
    fn progress_scales_probability() {
        let model = DefaultProbabilityModel::default();
        let a = agent(1, 50, 0, Personality::neutral());
        // floor(62 * 0.5) = 31
        assert_eq!(model.probability(&a), 31);
    }

    #[test]
    fn max_generation_has_zero_probability() {
        let model = DefaultProbabilityModel::default();
        let a = agent(5, 100, 1_000, Personality::neutral());
        assert_eq!(model.probability(&a), 0);
        let outcome = model.decide(&a, &mut StdRng::seed_from_u64(1));
        assert!(!outcome.success);
    }

    #[test]
    fn seeded_model_is_reproducible() {
        let a = agent(2, 100, 100, Personality::neutral());
        let first: Vec<_> = {
            let model = DefaultProbabilityModel::seeded(ProbabilityConfig::default(), 7);
            (0..20).map(|_| model.attempt(&a)).collect()
        };
        let second: Vec<_> = {
            let model = DefaultProbabilityModel::seeded(ProbabilityConfig::default(), 7);
            (0..20).map(|_| model.attempt(&a)).collect()
        };
        assert_eq!(first, second);
    }

    #[test]
    fn success_rate_tracks_probability() {
        let model = DefaultProbabilityModel::seeded(ProbabilityConfig::default(), 42);
        let a = agent(2, 100, 0, Personality::neutral());
        let p = model.probability(&a);
        assert_eq!(p, 42);
        let successes = (0..5_000).filter(|_| model.attempt(&a).success).count();
        let rate = successes as f64 / 5_000.0 * 100.0;
        assert!((rate - p as f64).abs() < 5.0, "rate {rate} vs {p}");
    }

    #[test]
    fn forced_mutation_carries_bonus() {
        let model = DefaultProbabilityModel::seeded(
            ProbabilityConfig {
                base_rates: vec![100, 100, 100, 100],
                max_probability: 100,
                mutation_rates: vec![100, 100, 100, 100],
                ..Default::default()
            },
            3,
        );
        let a = agent(1, 100, 0, Personality::new(80, 80, 80, 80, 80));
        let outcome = model.attempt(&a);
        assert!(outcome.success);
        let mutation = outcome.mutation.expect("mutation");
        // floor(80 / 20) = 4
        for (_, change) in mutation.personality_bonus.iter() {
            assert_eq!(change, 4);
        }
        assert_eq!(mutation.name, mutation.kind.display_name());
    }

    #[test]
    fn failures_never_mutate() {
        let model = DefaultProbabilityModel::seeded(
            ProbabilityConfig {
                base_rates: vec![0, 0, 0, 0],
                mutation_rates: vec![100, 100, 100, 100],
                ..Default::default()
            },
            9,
        );
        let a = agent(1, 100, 0, Personality::neutral());
        let outcome = model.attempt(&a);
        assert!(!outcome.success);
        assert!(outcome.mutation.is_none());
        assert_eq!(outcome.probability, 0);
    }

    #[test]
    fn balanced_sage_boosts_every_trait() {
        let bonus = MutationKind::BalancedSage.bonus(2);
        assert_eq!(bonus.len(), 5);
        let bonus = MutationKind::HumorKing.bonus(3);
        assert_eq!(bonus.get(TraitKind::Humor), Some(3));
        assert_eq!(bonus.len(), 1);
    }
}
