//! Evolution attempts: precondition gate, outcome application, audit entry.
//!
//! [`EvolutionAttemptEngine`] is pure. It checks the precondition, asks the
//! injected [`EvolutionProbabilityModel`] for an outcome, and applies that
//! outcome to an in-memory [`AgentRecord`]. Persisting the record (with
//! compare-and-swap) is the caller's job.

use serde::{Deserialize, Serialize};

use crate::agent::{AgentRecord, Generation, PROGRESS_MAX};
use crate::audit::{AuditEvent, AuditRecord};
use crate::probability::{EvolutionOutcome, EvolutionProbabilityModel, MutationKind};
use crate::readiness::ReadinessSnapshot;
use crate::visual::VisualStateDeriver;

/// Evolution section of the engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvolutionSettings {
    /// Meter value after a failed roll.
    pub failure_progress: u8,
    /// Also require the configured readiness policy before rolling.
    pub gate_on_policy: bool,
}

impl Default for EvolutionSettings {
    fn default() -> Self {
        Self {
            failure_progress: 80,
            gate_on_policy: false,
        }
    }
}

/// How an attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    Evolved,
    Failed,
    NotReady,
    AlreadyMaximum,
    PolicyNotMet,
}

impl AttemptStatus {
    /// Whether the probability model was consulted.
    pub fn rolled(self) -> bool {
        matches!(self, Self::Evolved | Self::Failed)
    }
}

/// Result of an evolution attempt. Rejections are values, not errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvolutionAttemptResult {
    pub status: AttemptStatus,
    pub success: bool,
    pub new_generation: Option<Generation>,
    /// Zero when the attempt never reached the model.
    pub probability: u8,
    pub message: String,
    pub is_mutation: bool,
    pub mutation_type: Option<MutationKind>,
    pub mutation_name: Option<String>,
}

impl EvolutionAttemptResult {
    fn rejected(status: AttemptStatus, message: String) -> Self {
        Self {
            status,
            success: false,
            new_generation: None,
            probability: 0,
            message,
            is_mutation: false,
            mutation_type: None,
            mutation_name: None,
        }
    }

    /// Rejection for an agent at the final generation.
    pub fn already_maximum(generation: Generation) -> Self {
        Self::rejected(
            AttemptStatus::AlreadyMaximum,
            format!("already maximum generation reached ({generation})"),
        )
    }

    /// Rejection for an agent whose meter is not full.
    pub fn not_ready(progress: u8) -> Self {
        Self::rejected(
            AttemptStatus::NotReady,
            format!("evolution not ready ({progress}/{PROGRESS_MAX})"),
        )
    }

    /// Rejection by the readiness policy gate.
    pub fn policy_not_met(snapshot: &ReadinessSnapshot) -> Self {
        let missing: Vec<&str> = snapshot
            .per_metric
            .iter()
            .filter(|m| !m.met)
            .map(|m| m.metric.label())
            .collect();
        Self::rejected(
            AttemptStatus::PolicyNotMet,
            format!(
                "{} policy not met ({}%): {}",
                snapshot.policy,
                snapshot.overall_percent,
                missing.join(", ")
            ),
        )
    }
}

/// An applied attempt: the caller-facing result plus the audit entry, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedAttempt {
    pub result: EvolutionAttemptResult,
    pub audit: Option<AuditRecord>,
}

/// Applies evolution attempts to agent records.
#[derive(Debug, Clone, Default)]
pub struct EvolutionAttemptEngine {
    settings: EvolutionSettings,
    deriver: VisualStateDeriver,
}

impl EvolutionAttemptEngine {
    /// An attempt engine using `deriver` for mutation bonuses.
    pub fn new(settings: EvolutionSettings, deriver: VisualStateDeriver) -> Self {
        Self { settings, deriver }
    }

    /// Active settings.
    pub fn settings(&self) -> &EvolutionSettings {
        &self.settings
    }

    /// Precondition gate. Generation is checked before progress.
    pub fn precheck(&self, record: &AgentRecord) -> Option<EvolutionAttemptResult> {
        if record.generation().is_max() {
            return Some(EvolutionAttemptResult::already_maximum(record.generation()));
        }
        if record.evolution_progress() < PROGRESS_MAX {
            return Some(EvolutionAttemptResult::not_ready(record.evolution_progress()));
        }
        None
    }

    /// Gate, roll and apply in one step.
    pub fn attempt(
        &self,
        record: &mut AgentRecord,
        model: &dyn EvolutionProbabilityModel,
        now: u64,
    ) -> AppliedAttempt {
        if let Some(result) = self.precheck(record) {
            return AppliedAttempt {
                result,
                audit: None,
            };
        }
        let outcome = model.attempt(record);
        self.apply(record, &outcome, now)
    }

    /// Apply a model outcome to a record that passed [`Self::precheck`].
    pub fn apply(
        &self,
        record: &mut AgentRecord,
        outcome: &EvolutionOutcome,
        now: u64,
    ) -> AppliedAttempt {
        let next = record.generation().next();
        let (true, Some(next)) = (outcome.success, next) else {
            if record.generation().is_max() {
                return AppliedAttempt {
                    result: EvolutionAttemptResult::already_maximum(record.generation()),
                    audit: None,
                };
            }
            record.set_evolution_progress(self.settings.failure_progress);
            let audit = AuditRecord::new(
                record.id(),
                now,
                AuditEvent::EvolutionFailed {
                    probability: outcome.probability,
                    message: outcome.message.clone(),
                },
            );
            return AppliedAttempt {
                result: EvolutionAttemptResult {
                    status: AttemptStatus::Failed,
                    success: false,
                    new_generation: None,
                    probability: outcome.probability,
                    message: outcome.message.clone(),
                    is_mutation: false,
                    mutation_type: None,
                    mutation_name: None,
                },
                audit: Some(audit),
            };
        };

        record.set_generation(next);
        record.set_evolution_progress(0);
        if let Some(mutation) = &outcome.mutation {
            let boosted = record.personality().apply_delta(&mutation.personality_bonus);
            record.set_personality(boosted, &self.deriver);
        }

        let mutation_type = outcome.mutation.as_ref().map(|m| m.kind);
        let audit = AuditRecord::new(
            record.id(),
            now,
            AuditEvent::EvolutionSucceeded {
                new_gen: next,
                probability: outcome.probability,
                is_mutation: mutation_type.is_some(),
                mutation_type,
            },
        );
        AppliedAttempt {
            result: EvolutionAttemptResult {
                status: AttemptStatus::Evolved,
                success: true,
                new_generation: Some(next),
                probability: outcome.probability,
                message: outcome.message.clone(),
                is_mutation: mutation_type.is_some(),
                mutation_type,
                mutation_name: outcome.mutation.as_ref().map(|m| m.name.clone()),
            },
            audit: Some(audit),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::AgentId;
    use crate::personality::{Personality, TraitKind};
    use crate::probability::ScriptedModel;

    fn ready(generation: u8) -> AgentRecord {
        AgentRecord::new(AgentId::new(7).unwrap(), 0)
            .with_generation(Generation::new(generation).unwrap())
            .with_evolution_progress(100)
            .with_total_conversations(25)
    }

    #[test]
    fn success_advances_and_resets_meter() {
        let engine = EvolutionAttemptEngine::default();
        let mut r = ready(1);
        let applied = engine.attempt(&mut r, &ScriptedModel::always_succeed(60), 100);

        assert_eq!(applied.result.status, AttemptStatus::Evolved);
        assert!(applied.result.success);
        assert_eq!(applied.result.new_generation, Generation::new(2));
        assert_eq!(applied.result.probability, 60);
        assert_eq!(r.generation().get(), 2);
        assert_eq!(r.evolution_progress(), 0);
        assert!(matches!(
            applied.audit.unwrap().event,
            AuditEvent::EvolutionSucceeded { is_mutation: false, .. }
        ));
    }

    #[test]
    fn failure_sets_meter_to_eighty() {
        let engine = EvolutionAttemptEngine::default();
        let mut r = ready(2);
        let applied = engine.attempt(&mut r, &ScriptedModel::always_fail(40), 100);

        assert_eq!(applied.result.status, AttemptStatus::Failed);
        assert!(!applied.result.success);
        assert_eq!(applied.result.new_generation, None);
        assert_eq!(r.generation().get(), 2);
        assert_eq!(r.evolution_progress(), 80);
        assert!(matches!(
            applied.audit.unwrap().event,
            AuditEvent::EvolutionFailed { probability: 40, .. }
        ));
    }

    #[test]
    fn mutation_boosts_personality_and_visuals() {
        let engine = EvolutionAttemptEngine::default();
        let mut r = ready(1).with_personality(Personality::new(60, 60, 60, 60, 60));
        let model = ScriptedModel::always_mutate(50, MutationKind::LogicGenius, 3);
        let applied = engine.attempt(&mut r, &model, 100);

        assert!(applied.result.is_mutation);
        assert_eq!(applied.result.mutation_type, Some(MutationKind::LogicGenius));
        assert!(applied.result.mutation_name.is_some());
        assert_eq!(r.personality().get(TraitKind::Logic), 63);
        assert_eq!(r.personality().get(TraitKind::Warmth), 60);
        assert_eq!(*r.visual_state(), VisualStateDeriver::default().derive(r.personality()));
    }

    #[test]
    fn max_generation_checked_before_progress() {
        let engine = EvolutionAttemptEngine::default();
        let mut r = ready(5).with_evolution_progress(10);
        let applied = engine.attempt(&mut r, &ScriptedModel::always_succeed(95), 100);

        assert_eq!(applied.result.status, AttemptStatus::AlreadyMaximum);
        assert!(!applied.result.success);
        assert_eq!(applied.result.probability, 0);
        assert!(applied.result.message.contains("already maximum"));
        assert!(applied.audit.is_none());
        assert_eq!(r.generation().get(), 5);
    }

    #[test]
    fn gate_is_strict_at_ninety_nine() {
        let engine = EvolutionAttemptEngine::default();
        let mut r = ready(1).with_evolution_progress(99);
        let applied = engine.attempt(&mut r, &ScriptedModel::always_succeed(95), 100);

        assert_eq!(applied.result.status, AttemptStatus::NotReady);
        assert_eq!(applied.result.probability, 0);
        assert_eq!(r.generation().get(), 1);
        assert_eq!(r.evolution_progress(), 99);
    }

    #[test]
    fn configurable_failure_value() {
        let engine = EvolutionAttemptEngine::new(
            EvolutionSettings {
                failure_progress: 60,
                ..Default::default()
            },
            VisualStateDeriver::default(),
        );
        let mut r = ready(3);
        engine.attempt(&mut r, &ScriptedModel::always_fail(20), 0);
        assert_eq!(r.evolution_progress(), 60);
    }
}
