//! Inactivity-driven devolution.
//!
//! An agent inactive for at least `inactivity_days` whole days above Gen 1
//! drops one generation and its meter is set to `progress_after`. A record
//! remembers which inactivity window it was devolved for, so repeated checks
//! within the same window are no-ops.

use serde::{Deserialize, Serialize};

use crate::agent::{AgentRecord, Generation, SECS_PER_DAY};
use crate::audit::{AuditEvent, AuditRecord};

/// Devolution section of the engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DevolutionSettings {
    pub inactivity_days: u64,
    /// Meter value after devolving.
    pub progress_after: u8,
}

impl Default for DevolutionSettings {
    fn default() -> Self {
        Self {
            inactivity_days: 14,
            progress_after: 50,
        }
    }
}

/// Outcome of a devolution check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DevolutionResult {
    pub devolved: bool,
    pub new_generation: Option<Generation>,
    pub reason: String,
}

impl DevolutionResult {
    fn skipped(reason: String) -> Self {
        Self {
            devolved: false,
            new_generation: None,
            reason,
        }
    }
}

/// What [`DevolutionMonitor::evaluate`] decided, before anything is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DevolutionDecision {
    Devolve {
        to: Generation,
        inactive_days: u64,
    },
    AtFloor,
    Active {
        inactive_days: u64,
    },
    AlreadyDevolved,
}

/// Decides and applies devolution.
#[derive(Debug, Clone, Default)]
pub struct DevolutionMonitor {
    settings: DevolutionSettings,
}

impl DevolutionMonitor {
    /// A monitor with the given window and meter reset.
    pub fn new(settings: DevolutionSettings) -> Self {
        Self { settings }
    }

    /// Active settings.
    pub fn settings(&self) -> &DevolutionSettings {
        &self.settings
    }

    /// Inactivity threshold in seconds.
    pub fn threshold_secs(&self) -> u64 {
        self.settings.inactivity_days.saturating_mul(SECS_PER_DAY)
    }

    /// Decide what a devolution check would do, without changing the record.
    pub fn evaluate(&self, record: &AgentRecord, now: u64) -> DevolutionDecision {
        let inactive_days = record.inactive_days(now);
        if now.saturating_sub(record.last_active_at()) < self.threshold_secs() {
            return DevolutionDecision::Active { inactive_days };
        }
        if record.devolved_for_activity() == Some(record.last_active_at()) {
            return DevolutionDecision::AlreadyDevolved;
        }
        match record.generation().previous() {
            Some(to) => DevolutionDecision::Devolve { to, inactive_days },
            None => DevolutionDecision::AtFloor,
        }
    }

    /// Evaluate and, when due, devolve the record in place.
    pub fn apply(
        &self,
        record: &mut AgentRecord,
        now: u64,
    ) -> (DevolutionResult, Option<AuditRecord>) {
        match self.evaluate(record, now) {
            DevolutionDecision::Devolve { to, inactive_days } => {
                let previous = record.generation();
                record.set_generation(to);
                record.set_evolution_progress(self.settings.progress_after);
                record.mark_devolved();
                let audit = AuditRecord::new(
                    record.id(),
                    now,
                    AuditEvent::Devolved {
                        previous_gen: previous,
                        new_gen: to,
                        inactive_days,
                    },
                );
                let result = DevolutionResult {
                    devolved: true,
                    new_generation: Some(to),
                    reason: format!(
                        "inactive for {inactive_days} days, devolved from {previous} to {to}"
                    ),
                };
                (result, Some(audit))
            }
            DevolutionDecision::AtFloor => (
                DevolutionResult::skipped(format!(
                    "already at minimum generation ({})",
                    Generation::FIRST
                )),
                None,
            ),
            DevolutionDecision::Active { inactive_days } => (
                DevolutionResult::skipped(format!(
                    "active recently ({inactive_days}/{} days)",
                    self.settings.inactivity_days
                )),
                None,
            ),
            DevolutionDecision::AlreadyDevolved => (
                DevolutionResult::skipped(
                    "already devolved for this inactivity period".to_string(),
                ),
                None,
            ),
        }
    }
}
