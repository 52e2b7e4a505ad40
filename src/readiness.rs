//! Readiness policies: does an agent qualify to attempt its next generation?
//!
//! Two strategies ship with the crate and are selected explicitly:
//!
//! - [`SimplePolicy`]: conversation count plus a full evolution meter.
//! - [`MultiMetricPolicy`]: five independent metrics (conversations, distinct
//!   topics, memories, intimacy, consecutive active days).
//!
//! Both report per-metric progress through the same [`ReadinessSnapshot`].

use serde::{Deserialize, Serialize};

use crate::agent::{AgentRecord, Generation, PROGRESS_MAX};

// ---------------------------------------------------------------------------
// Metrics and snapshots
// ---------------------------------------------------------------------------

/// A single gated quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Conversations,
    EvolutionProgress,
    DistinctTopics,
    Memories,
    Intimacy,
    ConsecutiveDays,
}

impl Metric {
    /// Label used in readiness snapshots and messages.
    pub fn label(self) -> &'static str {
        match self {
            Self::Conversations => "conversations",
            Self::EvolutionProgress => "evolution_progress",
            Self::DistinctTopics => "distinct_topics",
            Self::Memories => "memories",
            Self::Intimacy => "intimacy",
            Self::ConsecutiveDays => "consecutive_days",
        }
    }
}

impl std::fmt::Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Current value against requirement for one metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricProgress {
    pub metric: Metric,
    pub current: f64,
    pub required: f64,
    pub met: bool,
}

impl MetricProgress {
    /// Progress of `metric`; met once `current` reaches `required`.
    pub fn new(metric: Metric, current: f64, required: f64) -> Self {
        Self {
            metric,
            current,
            required,
            met: current >= required,
        }
    }
}

/// Everything a policy may read about an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadinessInput {
    pub generation: Generation,
    pub total_conversations: u64,
    pub evolution_progress: u8,
    pub distinct_topics: usize,
    pub memories: usize,
    pub intimacy: f64,
    pub consecutive_days: u32,
}

impl ReadinessInput {
    /// Combine the stored record with collaborator-supplied counts.
    pub fn from_record(record: &AgentRecord, distinct_topics: usize, memories: usize) -> Self {
        Self {
            generation: record.generation(),
            total_conversations: record.total_conversations(),
            evolution_progress: record.evolution_progress(),
            distinct_topics,
            memories,
            intimacy: record.intimacy(),
            consecutive_days: record.consecutive_active_days(),
        }
    }
}

/// Readiness report for one agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadinessSnapshot {
    pub policy: String,
    pub current_gen: Generation,
    pub next_gen: Option<Generation>,
    pub max_reached: bool,
    pub evolution_progress: u8,
    pub per_metric: Vec<MetricProgress>,
    /// Share of metrics met, as a whole percent.
    pub overall_percent: u8,
    pub ready_to_evolve: bool,
}

impl ReadinessSnapshot {
    /// Entry for `metric`, if the policy reports it.
    pub fn metric(&self, metric: Metric) -> Option<&MetricProgress> {
        self.per_metric.iter().find(|m| m.metric == metric)
    }
}

// ---------------------------------------------------------------------------
// Policy trait
// ---------------------------------------------------------------------------

/// Strategy deciding whether an agent qualifies for its next generation.
pub trait ReadinessPolicy: Send + Sync {
    /// Short identifier, reported in snapshots.
    fn name(&self) -> &'static str;

    /// Per-metric progress toward `next_gen`.
    fn metrics(&self, input: &ReadinessInput, next_gen: Generation) -> Vec<MetricProgress>;

    /// Whether [`ReadinessInput::distinct_topics`] and [`ReadinessInput::memories`]
    /// are read. Lets callers skip collaborator lookups.
    fn needs_dialogue_counts(&self) -> bool {
        false
    }

    /// Full readiness report.
    fn evaluate(&self, input: &ReadinessInput) -> ReadinessSnapshot {
        let Some(next_gen) = input.generation.next() else {
            return ReadinessSnapshot {
                policy: self.name().to_string(),
                current_gen: input.generation,
                next_gen: None,
                max_reached: true,
                evolution_progress: input.evolution_progress,
                per_metric: Vec::new(),
                overall_percent: 100,
                ready_to_evolve: false,
            };
        };

        let per_metric = self.metrics(input, next_gen);
        let met = per_metric.iter().filter(|m| m.met).count();
        let overall_percent = if per_metric.is_empty() {
            0
        } else {
            (met as f64 * 100.0 / per_metric.len() as f64).round() as u8
        };
        let ready_to_evolve = !per_metric.is_empty() && met == per_metric.len();

        ReadinessSnapshot {
            policy: self.name().to_string(),
            current_gen: input.generation,
            next_gen: Some(next_gen),
            max_reached: false,
            evolution_progress: input.evolution_progress,
            per_metric,
            overall_percent,
            ready_to_evolve,
        }
    }
}

/// Which bundled policy to build from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PolicyKind {
    #[default]
    Simple,
    MultiMetric,
}

// ---------------------------------------------------------------------------
// Simple policy
// ---------------------------------------------------------------------------

/// Requirement row of the simple policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimpleThreshold {
    /// Generation being reached.
    pub generation: u8,
    pub conversations: u64,
    pub progress: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimplePolicyConfig {
    pub thresholds: Vec<SimpleThreshold>,
}

impl Default for SimplePolicyConfig {
    fn default() -> Self {
        let row = |generation, conversations| SimpleThreshold {
            generation,
            conversations,
            progress: PROGRESS_MAX,
        };
        Self {
            thresholds: vec![row(2, 20), row(3, 50), row(4, 100), row(5, 200)],
        }
    }
}

/// Conversation count plus a full evolution meter.
#[derive(Debug, Clone, Default)]
pub struct SimplePolicy {
    config: SimplePolicyConfig,
}

impl SimplePolicy {
    /// A policy over the given threshold table.
    pub fn new(config: SimplePolicyConfig) -> Self {
        Self { config }
    }

    fn threshold(&self, next_gen: Generation) -> Option<&SimpleThreshold> {
        self.config
            .thresholds
            .iter()
            .find(|t| t.generation == next_gen.get())
    }
}

impl ReadinessPolicy for SimplePolicy {
    fn name(&self) -> &'static str {
        "simple"
    }

    fn metrics(&self, input: &ReadinessInput, next_gen: Generation) -> Vec<MetricProgress> {
        let Some(t) = self.threshold(next_gen) else {
            return Vec::new();
        };
        vec![
            MetricProgress::new(
                Metric::Conversations,
                input.total_conversations as f64,
                t.conversations as f64,
            ),
            MetricProgress::new(
                Metric::EvolutionProgress,
                input.evolution_progress as f64,
                t.progress as f64,
            ),
        ]
    }
}

// ---------------------------------------------------------------------------
// Multi-metric policy
// ---------------------------------------------------------------------------

/// Requirement row of the multi-metric policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequirement {
    /// Generation being reached.
    pub generation: u8,
    pub conversations: u64,
    pub distinct_topics: usize,
    pub memories: usize,
    pub intimacy: f64,
    pub consecutive_days: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiMetricPolicyConfig {
    pub requirements: Vec<GenerationRequirement>,
}

impl Default for MultiMetricPolicyConfig {
    fn default() -> Self {
        let row = |generation, conversations, distinct_topics, memories, intimacy, consecutive_days| {
            GenerationRequirement {
                generation,
                conversations,
                distinct_topics,
                memories,
                intimacy,
                consecutive_days,
            }
        };
        Self {
            requirements: vec![
                row(2, 30, 5, 10, 20.0, 3),
                row(3, 100, 15, 30, 40.0, 7),
                row(4, 300, 30, 50, 60.0, 14),
                row(5, 500, 50, 80, 80.0, 30),
            ],
        }
    }
}

/// Five independent relationship metrics, all of which must be met.
#[derive(Debug, Clone, Default)]
pub struct MultiMetricPolicy {
    config: MultiMetricPolicyConfig,
}

impl MultiMetricPolicy {
    /// A policy over the given requirement table.
    pub fn new(config: MultiMetricPolicyConfig) -> Self {
        Self { config }
    }

    fn requirement(&self, next_gen: Generation) -> Option<&GenerationRequirement> {
        self.config
            .requirements
            .iter()
            .find(|r| r.generation == next_gen.get())
    }
}

impl ReadinessPolicy for MultiMetricPolicy {
    fn name(&self) -> &'static str {
        "multi-metric"
    }

    fn needs_dialogue_counts(&self) -> bool {
        true
    }

    fn metrics(&self, input: &ReadinessInput, next_gen: Generation) -> Vec<MetricProgress> {
        let Some(r) = self.requirement(next_gen) else {
            return Vec::new();
        };
        vec![
            MetricProgress::new(
                Metric::Conversations,
                input.total_conversations as f64,
                r.conversations as f64,
            ),
            MetricProgress::new(
                Metric::DistinctTopics,
                input.distinct_topics as f64,
                r.distinct_topics as f64,
            ),
            MetricProgress::new(Metric::Memories, input.memories as f64, r.memories as f64),
            MetricProgress::new(Metric::Intimacy, input.intimacy, r.intimacy),
            MetricProgress::new(
                Metric::ConsecutiveDays,
                input.consecutive_days as f64,
                r.consecutive_days as f64,
            ),
        ]
    }
}
