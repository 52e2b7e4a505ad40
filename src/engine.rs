//! Engine facade: the operations collaborators call.
//!
//! [`ProgressionEngine`] owns the store, the dialogue source and the
//! strategies (readiness policy, probability model, analyzer). Every write
//! follows the same path: load the versioned record, compute the new record
//! in memory, publish it with compare-and-swap. A conflicting writer causes
//! one retry against fresh state; a second conflict surfaces as
//! [`ProgressionError::ConcurrentModification`].

use std::sync::Arc;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::agent::{AgentId, AgentRecord, now_secs};
use crate::analyzer::{ConversationAnalyzer, ModelReplyAnalyzer};
use crate::audit::AuditRecord;
use crate::config::EngineConfig;
use crate::devolution::{DevolutionMonitor, DevolutionResult};
use crate::dialogue::{DialogueSource, MemDialogue};
use crate::error::{ProgressionError, ProgressionResult};
use crate::evolution::{EvolutionAttemptEngine, EvolutionAttemptResult};
use crate::personality::{Personality, PersonalityDelta};
use crate::probability::{DefaultProbabilityModel, EvolutionProbabilityModel};
use crate::progression::ProgressionTracker;
use crate::readiness::{ReadinessInput, ReadinessPolicy, ReadinessSnapshot};
use crate::store::{AgentStore, CasOutcome, DurableStore, MemStore, Versioned};
use crate::visual::VisualState;

/// Read-compute-write attempts before giving up on a contended agent.
pub const MAX_WRITE_ATTEMPTS: u32 = 2;

/// Outcome of [`ProgressionEngine::record_conversation_turn`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnReport {
    pub total_conversations: u64,
    /// Whether this turn crossed an analysis boundary.
    pub analyzed: bool,
    /// Empty unless `analyzed`.
    pub delta: PersonalityDelta,
    pub personality: Personality,
    pub visual_state: VisualState,
    pub evolution_progress: u8,
}

/// Outcome of [`ProgressionEngine::sweep_devolution`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    pub checked: usize,
    pub devolved: Vec<AgentId>,
    /// Agents whose check failed, with the error message.
    pub failures: Vec<(AgentId, String)>,
}

/// What a read-compute step wants written.
struct Change<T> {
    output: T,
    write: bool,
    audit: Option<AuditRecord>,
}

impl<T> Change<T> {
    fn keep(output: T) -> Self {
        Self {
            output,
            write: false,
            audit: None,
        }
    }

    fn write(output: T, audit: Option<AuditRecord>) -> Self {
        Self {
            output,
            write: true,
            audit,
        }
    }
}

/// The agent progression engine.
pub struct ProgressionEngine {
    config: EngineConfig,
    store: Arc<dyn AgentStore>,
    dialogue: Arc<dyn DialogueSource>,
    policy: Arc<dyn ReadinessPolicy>,
    model: Arc<dyn EvolutionProbabilityModel>,
    tracker: ProgressionTracker,
    evolution: EvolutionAttemptEngine,
    devolution: DevolutionMonitor,
}

impl ProgressionEngine {
    /// Create an engine with the bundled strategies.
    ///
    /// Uses a [`DurableStore`] under `config.data_dir` when set, otherwise a
    /// [`MemStore`], and an empty in-memory dialogue source.
    pub fn new(config: EngineConfig) -> ProgressionResult<Self> {
        Self::builder(config).build()
    }

    /// Builder for injecting collaborators and strategies.
    pub fn builder(config: EngineConfig) -> ProgressionEngineBuilder {
        ProgressionEngineBuilder {
            config,
            store: None,
            dialogue: None,
            policy: None,
            model: None,
            analyzer: None,
        }
    }

    /// Validated configuration the engine was built from.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Underlying agent store.
    pub fn store(&self) -> &Arc<dyn AgentStore> {
        &self.store
    }

    /// Active readiness policy.
    pub fn policy(&self) -> &dyn ReadinessPolicy {
        self.policy.as_ref()
    }

    /// Store a new agent. The visual state is re-derived with the configured colour table.
    pub fn register_agent(&self, record: &AgentRecord) -> ProgressionResult<()> {
        let mut record = record.clone();
        record.refresh_visual_state(self.tracker.deriver());
        self.store.insert(&record)?;
        tracing::info!(agent = %record.id(), generation = record.generation().get(), "registered agent");
        Ok(())
    }

    /// Store a fresh Gen 1 agent created now, with the configured colour table.
    pub fn create_agent(&self, id: AgentId) -> ProgressionResult<AgentRecord> {
        let record = AgentRecord::with_deriver(id, now_secs(), self.tracker.deriver());
        self.register_agent(&record)?;
        Ok(record)
    }

    /// Current record of an agent.
    pub fn agent(&self, id: AgentId) -> ProgressionResult<AgentRecord> {
        Ok(self.load(id)?.value)
    }

    fn load(&self, id: AgentId) -> ProgressionResult<Versioned<AgentRecord>> {
        self.store
            .load(id)?
            .ok_or(ProgressionError::NotFound { agent_id: id })
    }

    /// Run `step` against a fresh copy of the record and publish the result.
    fn update<T>(
        &self,
        id: AgentId,
        mut step: impl FnMut(&mut AgentRecord) -> ProgressionResult<Change<T>>,
    ) -> ProgressionResult<T> {
        for attempt in 1..=MAX_WRITE_ATTEMPTS {
            let Versioned { version, value } = self.load(id)?;
            let mut record = value;
            let change = step(&mut record)?;
            if !change.write {
                return Ok(change.output);
            }
            match self
                .store
                .compare_and_swap(version, &record, change.audit.as_ref())?
            {
                CasOutcome::Applied { .. } => return Ok(change.output),
                CasOutcome::Missing => return Err(ProgressionError::NotFound { agent_id: id }),
                CasOutcome::Conflict { current } => {
                    tracing::warn!(
                        agent = %id,
                        expected = version,
                        current,
                        attempt,
                        "concurrent modification"
                    );
                }
            }
        }
        Err(ProgressionError::ConcurrentModification {
            agent_id: id,
            attempts: MAX_WRITE_ATTEMPTS,
        })
    }

    // -- conversation turns -------------------------------------------------

    /// Credit one completed exchange and run analysis when due.
    pub fn record_conversation_turn(&self, id: AgentId) -> ProgressionResult<TurnReport> {
        self.record_conversation_turn_at(id, now_secs())
    }

    /// [`Self::record_conversation_turn`] with an explicit clock.
    pub fn record_conversation_turn_at(
        &self,
        id: AgentId,
        now: u64,
    ) -> ProgressionResult<TurnReport> {
        self.turn(id, None, now)
    }

    /// Like [`Self::record_conversation_turn`], but analysis prefers a
    /// language-model reply and falls back to the keyword analyzer.
    pub fn record_conversation_turn_with_reply(
        &self,
        id: AgentId,
        model_reply: &str,
    ) -> ProgressionResult<TurnReport> {
        self.record_conversation_turn_with_reply_at(id, model_reply, now_secs())
    }

    /// [`Self::record_conversation_turn_with_reply`] with an explicit clock.
    pub fn record_conversation_turn_with_reply_at(
        &self,
        id: AgentId,
        model_reply: &str,
        now: u64,
    ) -> ProgressionResult<TurnReport> {
        self.turn(id, Some(model_reply), now)
    }

    fn turn(
        &self,
        id: AgentId,
        model_reply: Option<&str>,
        now: u64,
    ) -> ProgressionResult<TurnReport> {
        let report = self.update(id, |record| {
            let analyzed = self.tracker.advance(record, now);
            let mut delta = PersonalityDelta::new();
            if analyzed {
                let window = self.tracker.settings().history_window;
                let messages = self.dialogue.recent_messages(id, window)?;
                delta = match model_reply {
                    Some(reply) => {
                        let analyzer = ModelReplyAnalyzer::new(reply, self.tracker.analyzer());
                        self.tracker.analyze_with(&analyzer, &messages)
                    }
                    None => self.tracker.analyze(&messages),
                };
                self.tracker.apply_analysis(record, &delta);
            }
            Ok(Change::write(
                TurnReport {
                    total_conversations: record.total_conversations(),
                    analyzed,
                    delta,
                    personality: *record.personality(),
                    visual_state: record.visual_state().clone(),
                    evolution_progress: record.evolution_progress(),
                },
                None,
            ))
        })?;

        if report.analyzed {
            tracing::info!(
                agent = %id,
                total = report.total_conversations,
                changed = report.delta.len(),
                progress = report.evolution_progress,
                "personality analyzed"
            );
        } else {
            tracing::debug!(agent = %id, total = report.total_conversations, "conversation recorded");
        }
        Ok(report)
    }

    // -- evolution ------------------------------------------------------------

    /// Attempt to evolve an agent to its next generation.
    pub fn attempt_evolution(&self, id: AgentId) -> ProgressionResult<EvolutionAttemptResult> {
        self.attempt_evolution_at(id, now_secs())
    }

    /// [`Self::attempt_evolution`] with an explicit clock.
    pub fn attempt_evolution_at(
        &self,
        id: AgentId,
        now: u64,
    ) -> ProgressionResult<EvolutionAttemptResult> {
        let result = self.update(id, |record| {
            if let Some(rejected) = self.evolution.precheck(record) {
                return Ok(Change::keep(rejected));
            }
            if self.evolution.settings().gate_on_policy {
                let snapshot = self.snapshot(record)?;
                if !snapshot.ready_to_evolve {
                    return Ok(Change::keep(EvolutionAttemptResult::policy_not_met(
                        &snapshot,
                    )));
                }
            }
            let outcome = self.model.attempt(record);
            let applied = self.evolution.apply(record, &outcome, now);
            Ok(match applied.audit {
                Some(audit) => Change::write(applied.result, Some(audit)),
                None => Change::keep(applied.result),
            })
        })?;

        if result.status.rolled() {
            tracing::info!(
                agent = %id,
                success = result.success,
                probability = result.probability,
                new_gen = result.new_generation.map(|g| g.get()),
                mutation = result.mutation_type.map(|m| m.label()),
                "evolution attempt"
            );
        } else {
            tracing::debug!(agent = %id, status = ?result.status, "evolution attempt rejected");
        }
        Ok(result)
    }

    /// Put every trait back at the neutral midpoint and refresh the visual state.
    pub fn reset_personality(&self, id: AgentId) -> ProgressionResult<AgentRecord> {
        let record = self.update(id, |record| {
            record.set_personality(Personality::neutral(), self.tracker.deriver());
            Ok(Change::write(record.clone(), None))
        })?;
        tracing::info!(agent = %id, "personality reset");
        Ok(record)
    }

    // -- devolution -----------------------------------------------------------

    /// Devolve an agent if it has been inactive long enough.
    pub fn check_devolution(&self, id: AgentId) -> ProgressionResult<DevolutionResult> {
        self.check_devolution_at(id, now_secs())
    }

    /// [`Self::check_devolution`] with an explicit clock.
    pub fn check_devolution_at(&self, id: AgentId, now: u64) -> ProgressionResult<DevolutionResult> {
        let result = self.update(id, |record| {
            let (result, audit) = self.devolution.apply(record, now);
            Ok(match audit {
                Some(audit) => Change::write(result, Some(audit)),
                None => Change::keep(result),
            })
        })?;

        if result.devolved {
            tracing::info!(
                agent = %id,
                new_gen = result.new_generation.map(|g| g.get()),
                reason = %result.reason,
                "agent devolved"
            );
        } else {
            tracing::debug!(agent = %id, reason = %result.reason, "devolution not due");
        }
        Ok(result)
    }

    /// Check every stored agent for devolution in parallel.
    pub fn sweep_devolution(&self) -> ProgressionResult<SweepReport> {
        self.sweep_devolution_at(now_secs())
    }

    /// [`Self::sweep_devolution`] with an explicit clock.
    pub fn sweep_devolution_at(&self, now: u64) -> ProgressionResult<SweepReport> {
        let ids = self.store.agent_ids()?;
        let results: Vec<(AgentId, ProgressionResult<DevolutionResult>)> = ids
            .par_iter()
            .map(|&id| (id, self.check_devolution_at(id, now)))
            .collect();

        let mut report = SweepReport {
            checked: results.len(),
            ..Default::default()
        };
        for (id, result) in results {
            match result {
                Ok(r) if r.devolved => report.devolved.push(id),
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(agent = %id, error = %e, "devolution check failed");
                    report.failures.push((id, e.to_string()));
                }
            }
        }
        tracing::info!(
            checked = report.checked,
            devolved = report.devolved.len(),
            failures = report.failures.len(),
            "devolution sweep finished"
        );
        Ok(report)
    }

    // -- queries --------------------------------------------------------------

    /// Readiness report under the configured policy.
    pub fn get_progress(&self, id: AgentId) -> ProgressionResult<ReadinessSnapshot> {
        let record = self.agent(id)?;
        self.snapshot(&record)
    }

    fn snapshot(&self, record: &AgentRecord) -> ProgressionResult<ReadinessSnapshot> {
        let (topics, memories) = if self.policy.needs_dialogue_counts() {
            (
                self.dialogue.distinct_topic_count(record.id())?,
                self.dialogue.memory_count(record.id())?,
            )
        } else {
            (0, 0)
        };
        let input = ReadinessInput::from_record(record, topics, memories);
        Ok(self.policy.evaluate(&input))
    }

    /// Audit entries for an agent, oldest first.
    pub fn audit_log(&self, id: AgentId) -> ProgressionResult<Vec<AuditRecord>> {
        Ok(self.store.audit_log(id)?)
    }
}

impl std::fmt::Debug for ProgressionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressionEngine")
            .field("config", &self.config)
            .field("policy", &self.policy.name())
            .field("tracker", &self.tracker)
            .finish_non_exhaustive()
    }
}

/// Assembles a [`ProgressionEngine`]. Unset parts come from the configuration.
pub struct ProgressionEngineBuilder {
    config: EngineConfig,
    store: Option<Arc<dyn AgentStore>>,
    dialogue: Option<Arc<dyn DialogueSource>>,
    policy: Option<Arc<dyn ReadinessPolicy>>,
    model: Option<Arc<dyn EvolutionProbabilityModel>>,
    analyzer: Option<Arc<dyn ConversationAnalyzer>>,
}

impl ProgressionEngineBuilder {
    /// Use `store` instead of the configured backend.
    pub fn store(mut self, store: Arc<dyn AgentStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Read dialogue from `dialogue` instead of an empty in-memory source.
    pub fn dialogue(mut self, dialogue: Arc<dyn DialogueSource>) -> Self {
        self.dialogue = Some(dialogue);
        self
    }

    /// Override the configured readiness policy.
    pub fn policy(mut self, policy: Arc<dyn ReadinessPolicy>) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Override the default probability model.
    pub fn model(mut self, model: Arc<dyn EvolutionProbabilityModel>) -> Self {
        self.model = Some(model);
        self
    }

    /// Override the configured keyword analyzer.
    pub fn analyzer(mut self, analyzer: Arc<dyn ConversationAnalyzer>) -> Self {
        self.analyzer = Some(analyzer);
        self
    }

    /// Validate the configuration and assemble the engine.
    pub fn build(self) -> ProgressionResult<ProgressionEngine> {
        let config = self.config;
        config.validate()?;

        let store: Arc<dyn AgentStore> = match (self.store, &config.data_dir) {
            (Some(store), _) => store,
            (None, Some(dir)) => Arc::new(DurableStore::open(dir)?),
            (None, None) => Arc::new(MemStore::new()),
        };
        let analyzer: Arc<dyn ConversationAnalyzer> = match self.analyzer {
            Some(analyzer) => analyzer,
            None => Arc::new(config.build_analyzer()?),
        };
        let policy = self.policy.unwrap_or_else(|| config.build_policy());
        let model = self
            .model
            .unwrap_or_else(|| Arc::new(DefaultProbabilityModel::new(config.probability.clone())));
        let dialogue = self
            .dialogue
            .unwrap_or_else(|| Arc::new(MemDialogue::new()));

        let deriver = config.build_deriver();
        tracing::info!(
            policy = policy.name(),
            durable = config.data_dir.is_some(),
            interval = config.progression.evolution_interval,
            "initializing progression engine"
        );

        Ok(ProgressionEngine {
            tracker: ProgressionTracker::new(
                config.progression.clone(),
                analyzer,
                deriver.clone(),
            ),
            evolution: EvolutionAttemptEngine::new(config.evolution.clone(), deriver),
            devolution: DevolutionMonitor::new(config.devolution.clone()),
            config,
            store,
            dialogue,
            policy,
            model,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{Generation, SECS_PER_DAY};
    use crate::audit::AuditEvent;
    use crate::evolution::AttemptStatus;
    use crate::error::StoreResult;
    use crate::personality::TraitKind;
    use crate::probability::ScriptedModel;
    use crate::readiness::{Metric, PolicyKind};
    use std::sync::atomic::{AtomicU32, Ordering};

    fn id(raw: u64) -> AgentId {
        AgentId::new(raw).unwrap()
    }

    fn engine_with(model: ScriptedModel) -> ProgressionEngine {
        ProgressionEngine::builder(EngineConfig::default())
            .model(Arc::new(model))
            .build()
            .unwrap()
    }

    fn ready_agent(raw: u64) -> AgentRecord {
        AgentRecord::new(id(raw), 0)
            .with_evolution_progress(100)
            .with_total_conversations(25)
    }

    #[test]
    fn unknown_agent_is_not_found() {
        let engine = ProgressionEngine::new(EngineConfig::default()).unwrap();
        let err = engine.record_conversation_turn_at(id(1), 0).unwrap_err();
        assert!(matches!(err, ProgressionError::NotFound { .. }));
        assert!(!err.is_transient());
        assert!(engine.get_progress(id(1)).is_err());
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut config = EngineConfig::default();
        config.progression.evolution_interval = 0;
        let err = ProgressionEngine::new(config).unwrap_err();
        assert!(matches!(err, ProgressionError::Config(_)));
    }

    #[test]
    fn turns_accumulate_and_analyze() {
        let dialogue = Arc::new(MemDialogue::new());
        let engine = ProgressionEngine::builder(EngineConfig::default())
            .dialogue(dialogue.clone())
            .build()
            .unwrap();
        engine.register_agent(&AgentRecord::new(id(1), 0)).unwrap();

        for t in 1..=5 {
            dialogue.push_exchange(id(1), "고마워 정말", "천만에요");
            let report = engine.record_conversation_turn_at(id(1), t).unwrap();
            assert_eq!(report.analyzed, t == 5);
        }
        let record = engine.agent(id(1)).unwrap();
        assert_eq!(record.total_conversations(), 10);
        assert_eq!(record.personality().get(TraitKind::Warmth), 51);
        assert_eq!(record.evolution_progress(), 5);
        assert_eq!(record.last_active_at(), 5);
    }

    #[test]
    fn model_reply_overrides_keywords() {
        let engine = ProgressionEngine::new(EngineConfig::default()).unwrap();
        engine
            .register_agent(&AgentRecord::new(id(1), 0).with_total_conversations(8))
            .unwrap();
        let report = engine
            .record_conversation_turn_with_reply_at(id(1), r#"{"creativity": 2}"#, 1)
            .unwrap();
        assert!(report.analyzed);
        assert_eq!(report.personality.get(TraitKind::Creativity), 52);
    }

    #[test]
    fn evolution_writes_audit() {
        let engine = engine_with(ScriptedModel::always_succeed(60));
        engine.register_agent(&ready_agent(1)).unwrap();

        let result = engine.attempt_evolution_at(id(1), 10).unwrap();
        assert_eq!(result.status, AttemptStatus::Evolved);
        assert_eq!(engine.agent(id(1)).unwrap().generation().get(), 2);

        let log = engine.audit_log(id(1)).unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].at, 10);
        assert!(matches!(log[0].event, AuditEvent::EvolutionSucceeded { .. }));
    }

    #[test]
    fn rejected_attempt_writes_nothing() {
        let engine = engine_with(ScriptedModel::always_succeed(60));
        engine
            .register_agent(&ready_agent(1).with_evolution_progress(40))
            .unwrap();
        let result = engine.attempt_evolution_at(id(1), 10).unwrap();
        assert_eq!(result.status, AttemptStatus::NotReady);
        assert_eq!(engine.store().load(id(1)).unwrap().unwrap().version, 1);
        assert!(engine.audit_log(id(1)).unwrap().is_empty());
    }

    #[test]
    fn policy_gate_blocks_when_enabled() {
        let mut config = EngineConfig::default();
        config.evolution.gate_on_policy = true;
        let engine = ProgressionEngine::builder(config)
            .model(Arc::new(ScriptedModel::always_succeed(60)))
            .build()
            .unwrap();
        engine
            .register_agent(&ready_agent(1).with_total_conversations(10))
            .unwrap();

        let result = engine.attempt_evolution_at(id(1), 10).unwrap();
        assert_eq!(result.status, AttemptStatus::PolicyNotMet);
        assert!(result.message.contains("conversations"));
        assert_eq!(engine.agent(id(1)).unwrap().generation().get(), 1);
    }

    #[test]
    fn multi_metric_progress_reads_dialogue_counts() {
        let dialogue = Arc::new(MemDialogue::new());
        for topic in ["a", "b", "c", "d", "e"] {
            dialogue.add_topic(id(1), topic);
        }
        dialogue.set_memory_count(id(1), 4);
        let config = EngineConfig {
            policy: PolicyKind::MultiMetric,
            ..Default::default()
        };
        let engine = ProgressionEngine::builder(config)
            .dialogue(dialogue)
            .build()
            .unwrap();
        engine.register_agent(&AgentRecord::new(id(1), 0)).unwrap();

        let snapshot = engine.get_progress(id(1)).unwrap();
        assert_eq!(snapshot.policy, "multi-metric");
        assert!(snapshot.metric(Metric::DistinctTopics).unwrap().met);
        assert!(!snapshot.metric(Metric::Memories).unwrap().met);
        assert_eq!(snapshot.overall_percent, 20);
    }

    #[test]
    fn devolution_writes_once() {
        let engine = ProgressionEngine::new(EngineConfig::default()).unwrap();
        engine
            .register_agent(
                &AgentRecord::new(id(1), 0).with_generation(Generation::new(3).unwrap()),
            )
            .unwrap();
        let now = 20 * SECS_PER_DAY;
        assert!(engine.check_devolution_at(id(1), now).unwrap().devolved);
        assert!(!engine.check_devolution_at(id(1), now + 1).unwrap().devolved);
        assert_eq!(engine.agent(id(1)).unwrap().generation().get(), 2);
        assert_eq!(engine.audit_log(id(1)).unwrap().len(), 1);
    }

    #[test]
    fn registration_uses_configured_colours() {
        let mut config = EngineConfig::default();
        config.visual.warmth = "#FF0000".into();
        let engine = ProgressionEngine::new(config).unwrap();
        engine
            .register_agent(
                &AgentRecord::new(id(1), 0).with_personality(Personality::new(90, 20, 10, 5, 5)),
            )
            .unwrap();

        let record = engine.agent(id(1)).unwrap();
        assert_eq!(record.visual_state().primary_color, "#FF0000");
        assert_eq!(
            *record.visual_state(),
            engine.tracker.deriver().derive(record.personality())
        );
    }

    #[test]
    fn reset_personality_returns_to_neutral() {
        let mut config = EngineConfig::default();
        config.visual.logic = "#123456".into();
        let engine = ProgressionEngine::new(config).unwrap();
        engine
            .register_agent(
                &AgentRecord::new(id(1), 0)
                    .with_personality(Personality::new(90, 20, 10, 5, 5))
                    .with_evolution_progress(60),
            )
            .unwrap();

        let record = engine.reset_personality(id(1)).unwrap();
        assert_eq!(*record.personality(), Personality::neutral());
        assert_eq!(
            *record.visual_state(),
            engine.tracker.deriver().derive(&Personality::neutral())
        );
        assert_eq!(record.visual_state().primary_color, "#F59E0B");
        assert_eq!(record.evolution_progress(), 60);
        assert_eq!(engine.agent(id(1)).unwrap(), record);
        assert_eq!(engine.store().load(id(1)).unwrap().unwrap().version, 2);
        assert!(engine.audit_log(id(1)).unwrap().is_empty());
        assert!(matches!(
            engine.reset_personality(id(9)).unwrap_err(),
            ProgressionError::NotFound { .. }
        ));
    }

    /// Store whose first `conflicts` swaps report a conflict.
    struct FlakyStore {
        inner: MemStore,
        conflicts: AtomicU32,
    }

    impl AgentStore for FlakyStore {
        fn load(&self, id: AgentId) -> StoreResult<Option<Versioned<AgentRecord>>> {
            self.inner.load(id)
        }
        fn insert(&self, record: &AgentRecord) -> StoreResult<u64> {
            self.inner.insert(record)
        }
        fn compare_and_swap(
            &self,
            expected: u64,
            record: &AgentRecord,
            audit: Option<&AuditRecord>,
        ) -> StoreResult<CasOutcome> {
            let left = self.conflicts.load(Ordering::SeqCst);
            if left > 0 {
                self.conflicts.store(left - 1, Ordering::SeqCst);
                return Ok(CasOutcome::Conflict {
                    current: expected + 1,
                });
            }
            self.inner.compare_and_swap(expected, record, audit)
        }
        fn agent_ids(&self) -> StoreResult<Vec<AgentId>> {
            self.inner.agent_ids()
        }
        fn audit_log(&self, id: AgentId) -> StoreResult<Vec<AuditRecord>> {
            self.inner.audit_log(id)
        }
    }

    fn flaky_engine(conflicts: u32) -> ProgressionEngine {
        let store = Arc::new(FlakyStore {
            inner: MemStore::new(),
            conflicts: AtomicU32::new(conflicts),
        });
        ProgressionEngine::builder(EngineConfig::default())
            .store(store)
            .build()
            .unwrap()
    }

    #[test]
    fn one_conflict_is_retried() {
        let engine = flaky_engine(1);
        engine.register_agent(&AgentRecord::new(id(1), 0)).unwrap();
        let report = engine.record_conversation_turn_at(id(1), 1).unwrap();
        assert_eq!(report.total_conversations, 2);
        assert_eq!(engine.agent(id(1)).unwrap().total_conversations(), 2);
    }

    #[test]
    fn second_conflict_surfaces() {
        let engine = flaky_engine(2);
        engine.register_agent(&AgentRecord::new(id(1), 0)).unwrap();
        let err = engine.record_conversation_turn_at(id(1), 1).unwrap_err();
        assert!(matches!(
            err,
            ProgressionError::ConcurrentModification { attempts: 2, .. }
        ));
        assert!(err.is_transient());
        assert_eq!(engine.agent(id(1)).unwrap().total_conversations(), 0);
    }
}
