//! End-to-end integration tests for the progression engine.
//!
//! These tests drive the public engine API the way collaborators do:
//! conversation turns, readiness queries, evolution attempts and
//! devolution checks, validating that records, audit entries and visual
//! state stay consistent across operations.

use std::sync::{Arc, Once};

use gyeol_progression::agent::{AgentId, AgentRecord, Generation, SECS_PER_DAY};
use gyeol_progression::audit::AuditEvent;
use gyeol_progression::config::EngineConfig;
use gyeol_progression::dialogue::MemDialogue;
use gyeol_progression::engine::ProgressionEngine;
use gyeol_progression::evolution::AttemptStatus;
use gyeol_progression::personality::{Personality, PersonalityDelta, TraitKind};
use gyeol_progression::probability::{
    DefaultProbabilityModel, MutationKind, ProbabilityConfig, ScriptedModel,
};
use gyeol_progression::visual::{Form, VisualStateDeriver};

static TRACING: Once = Once::new();

fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    });
}

fn id(raw: u64) -> AgentId {
    AgentId::new(raw).unwrap()
}

fn engine_with_model(model: ScriptedModel) -> ProgressionEngine {
    init_tracing();
    ProgressionEngine::builder(EngineConfig::default())
        .model(Arc::new(model))
        .build()
        .unwrap()
}

#[test]
fn dominant_traits_drive_visuals() {
    let personality = Personality::new(90, 20, 10, 5, 5);
    let visual = VisualStateDeriver::default().derive(&personality);

    assert_eq!(visual.primary_color, "#F59E0B");
    assert_eq!(visual.secondary_color, "#06B6D4");
    assert_eq!(personality.average(), 26.0);
    assert_eq!(visual.form, Form::Point);
    assert!((visual.glow_intensity - 0.304).abs() < 1e-9);
    assert_eq!(visual.particle_count, 20);
}

#[test]
fn trait_delta_saturates_at_bounds() {
    let personality = Personality::neutral().with(TraitKind::Warmth, 99.0);
    let delta = PersonalityDelta::new().with(TraitKind::Warmth, 1);
    assert_eq!(personality.apply_delta(&delta).get(TraitKind::Warmth), 100);

    let again = personality.apply_delta(&delta).apply_delta(&delta);
    assert_eq!(again.get(TraitKind::Warmth), 100);
}

#[test]
fn forced_success_evolves_first_generation() {
    let engine = engine_with_model(ScriptedModel::always_succeed(60));
    engine
        .register_agent(
            &AgentRecord::new(id(1), 0)
                .with_evolution_progress(100)
                .with_total_conversations(25),
        )
        .unwrap();

    let result = engine.attempt_evolution_at(id(1), 100).unwrap();
    assert!(result.success);
    assert_eq!(result.status, AttemptStatus::Evolved);
    assert_eq!(result.new_generation, Generation::new(2));

    let record = engine.agent(id(1)).unwrap();
    assert_eq!(record.generation().get(), 2);
    assert_eq!(record.evolution_progress(), 0);
}

#[test]
fn long_inactivity_devolves_one_generation() {
    let engine = engine_with_model(ScriptedModel::always_fail(0));
    let now = 400 * SECS_PER_DAY;
    engine
        .register_agent(
            &AgentRecord::new(id(1), 0)
                .with_generation(Generation::new(3).unwrap())
                .with_evolution_progress(70)
                .with_last_active_at(now - 20 * SECS_PER_DAY),
        )
        .unwrap();

    let result = engine.check_devolution_at(id(1), now).unwrap();
    assert!(result.devolved);
    assert_eq!(result.new_generation, Generation::new(2));

    let record = engine.agent(id(1)).unwrap();
    assert_eq!(record.generation().get(), 2);
    assert_eq!(record.evolution_progress(), 50);
}

#[test]
fn final_generation_is_a_ceiling() {
    let engine = engine_with_model(ScriptedModel::always_succeed(95));
    engine
        .register_agent(
            &AgentRecord::new(id(1), 0)
                .with_generation(Generation::LAST)
                .with_evolution_progress(100),
        )
        .unwrap();

    let progress = engine.get_progress(id(1)).unwrap();
    assert!(progress.max_reached);
    assert_eq!(progress.next_gen, None);
    assert!(!progress.ready_to_evolve);

    let result = engine.attempt_evolution_at(id(1), 0).unwrap();
    assert!(!result.success);
    assert!(result.message.contains("already maximum"));
    assert_eq!(engine.agent(id(1)).unwrap().generation(), Generation::LAST);
}

#[test]
fn full_lifecycle_from_conversation_to_evolution() {
    init_tracing();
    let dialogue = Arc::new(MemDialogue::new());
    let engine = ProgressionEngine::builder(EngineConfig::default())
        .dialogue(dialogue.clone())
        .model(Arc::new(ScriptedModel::always_succeed(70)))
        .build()
        .unwrap();
    engine.register_agent(&AgentRecord::new(id(1), 0)).unwrap();

    // One analysis per five exchanges, five meter points each.
    for turn in 1..=100u64 {
        dialogue.push_exchange(id(1), "데이터 분석 좀 도와줘", "좋아요, 원인을 찾아봐요");
        engine.record_conversation_turn_at(id(1), turn).unwrap();
        if turn == 50 {
            let early = engine.attempt_evolution_at(id(1), turn).unwrap();
            assert_eq!(early.status, AttemptStatus::NotReady);
            assert_eq!(early.probability, 0);
        }
    }

    let record = engine.agent(id(1)).unwrap();
    assert_eq!(record.total_conversations(), 200);
    assert_eq!(record.evolution_progress(), 100);
    assert_eq!(record.personality().get(TraitKind::Logic), 70);
    assert_eq!(record.visual_state().primary_color, "#06B6D4");

    let progress = engine.get_progress(id(1)).unwrap();
    assert!(progress.ready_to_evolve);
    assert_eq!(progress.overall_percent, 100);

    let result = engine.attempt_evolution_at(id(1), 101).unwrap();
    assert!(result.success);
    let log = engine.audit_log(id(1)).unwrap();
    assert_eq!(log.len(), 1);
    assert!(matches!(
        log[0].event,
        AuditEvent::EvolutionSucceeded { probability: 70, .. }
    ));
}

#[test]
fn failure_keeps_agent_gated() {
    let engine = engine_with_model(ScriptedModel::always_fail(40));
    engine
        .register_agent(
            &AgentRecord::new(id(1), 0)
                .with_generation(Generation::new(2).unwrap())
                .with_evolution_progress(100)
                .with_total_conversations(60),
        )
        .unwrap();

    let failed = engine.attempt_evolution_at(id(1), 1).unwrap();
    assert_eq!(failed.status, AttemptStatus::Failed);
    assert_eq!(engine.agent(id(1)).unwrap().evolution_progress(), 80);

    // Still gated: 80 < 100.
    let gated = engine.attempt_evolution_at(id(1), 2).unwrap();
    assert_eq!(gated.status, AttemptStatus::NotReady);
    assert_eq!(engine.audit_log(id(1)).unwrap().len(), 1);
}

#[test]
fn mutation_reaches_personality_and_audit() {
    let engine = engine_with_model(ScriptedModel::always_mutate(
        30,
        MutationKind::BalancedSage,
        2,
    ));
    engine
        .register_agent(
            &AgentRecord::new(id(1), 0)
                .with_personality(Personality::new(40, 40, 40, 40, 40))
                .with_evolution_progress(100),
        )
        .unwrap();

    let result = engine.attempt_evolution_at(id(1), 5).unwrap();
    assert!(result.is_mutation);
    assert_eq!(result.mutation_type, Some(MutationKind::BalancedSage));

    let record = engine.agent(id(1)).unwrap();
    assert!(TraitKind::ALL
        .iter()
        .all(|k| record.personality().get(*k) == 42));
    assert!(matches!(
        engine.audit_log(id(1)).unwrap()[0].event,
        AuditEvent::EvolutionSucceeded {
            is_mutation: true,
            mutation_type: Some(MutationKind::BalancedSage),
            ..
        }
    ));
}

#[test]
fn seeded_default_model_is_reproducible() {
    init_tracing();
    let run = |seed: u64| {
        let engine = ProgressionEngine::builder(EngineConfig::default())
            .model(Arc::new(DefaultProbabilityModel::seeded(
                ProbabilityConfig::default(),
                seed,
            )))
            .build()
            .unwrap();
        (1..=20)
            .map(|raw| {
                engine
                    .register_agent(&AgentRecord::new(id(raw), 0).with_evolution_progress(100))
                    .unwrap();
                engine.attempt_evolution_at(id(raw), 0).unwrap().success
            })
            .collect::<Vec<_>>()
    };
    assert_eq!(run(7), run(7));
}

#[test]
fn sweep_devolves_only_idle_agents() {
    let engine = engine_with_model(ScriptedModel::always_fail(0));
    let now = 100 * SECS_PER_DAY;
    let generation = |g: u8| Generation::new(g).unwrap();

    let agents = [
        AgentRecord::new(id(1), 0).with_generation(generation(3)),
        AgentRecord::new(id(2), 0).with_generation(generation(1)),
        AgentRecord::new(id(3), 0)
            .with_generation(generation(4))
            .with_last_active_at(now - SECS_PER_DAY),
        AgentRecord::new(id(4), 0).with_generation(generation(5)),
    ];
    for agent in &agents {
        engine.register_agent(agent).unwrap();
    }

    let report = engine.sweep_devolution_at(now).unwrap();
    assert_eq!(report.checked, 4);
    let mut devolved: Vec<u64> = report.devolved.iter().map(|a| a.get()).collect();
    devolved.sort_unstable();
    assert_eq!(devolved, [1, 4]);
    assert!(report.failures.is_empty());

    // A second sweep in the same inactivity window changes nothing.
    let again = engine.sweep_devolution_at(now + SECS_PER_DAY).unwrap();
    assert!(again.devolved.is_empty());
    assert_eq!(engine.agent(id(4)).unwrap().generation().get(), 4);
}

#[test]
fn concurrent_turns_are_not_lost_beyond_retry() {
    init_tracing();
    let engine = Arc::new(ProgressionEngine::new(EngineConfig::default()).unwrap());
    engine.register_agent(&AgentRecord::new(id(1), 0)).unwrap();

    let handles: Vec<_> = (0..8)
        .map(|t| {
            let engine = Arc::clone(&engine);
            std::thread::spawn(move || {
                (0..25)
                    .filter(|i| engine.record_conversation_turn_at(id(1), t * 100 + i).is_ok())
                    .count() as u64
            })
        })
        .collect();
    let succeeded: u64 = handles.into_iter().map(|h| h.join().unwrap()).sum();

    // Every turn that reported success is reflected exactly once.
    let record = engine.agent(id(1)).unwrap();
    assert_eq!(record.total_conversations(), succeeded * 2);
}
