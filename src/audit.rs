//! Append-only record of generation changes.
//!
//! Every evolution attempt that reaches the probability model and every
//! devolution leaves one [`AuditRecord`]. Stores keep them in insertion order.

use serde::{Deserialize, Serialize};

use crate::agent::{AgentId, Generation};
use crate::probability::MutationKind;

/// What happened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEvent {
    EvolutionSucceeded {
        new_gen: Generation,
        probability: u8,
        is_mutation: bool,
        mutation_type: Option<MutationKind>,
    },
    EvolutionFailed {
        probability: u8,
        message: String,
    },
    Devolved {
        previous_gen: Generation,
        new_gen: Generation,
        inactive_days: u64,
    },
}

impl AuditEvent {
    /// Snake-case name of the event kind.
    pub fn label(&self) -> &'static str {
        match self {
            Self::EvolutionSucceeded { .. } => "evolution_succeeded",
            Self::EvolutionFailed { .. } => "evolution_failed",
            Self::Devolved { .. } => "devolved",
        }
    }
}

/// One audit entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub agent_id: AgentId,
    /// Unix seconds.
    pub at: u64,
    pub event: AuditEvent,
}

impl AuditRecord {
    /// An entry for `agent_id` stamped at `at`.
    pub fn new(agent_id: AgentId, at: u64, event: AuditEvent) -> Self {
        Self {
            agent_id,
            at,
            event,
        }
    }
}

impl std::fmt::Display for AuditRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {} {}", self.at, self.agent_id, self.event.label())
    }
}
