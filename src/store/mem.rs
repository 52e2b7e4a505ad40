//! In-memory agent storage backed by DashMap.
//!
//! A compare-and-swap holds the shard lock of the agent's entry for the
//! duration of the version check and the write. All data is lost on process exit.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::agent::{AgentId, AgentRecord};
use crate::audit::AuditRecord;
use crate::error::{StoreError, StoreResult};

use super::{AgentStore, CasOutcome, INITIAL_VERSION, Versioned};

/// Concurrent in-memory agent store.
#[derive(Debug, Default)]
pub struct MemStore {
    agents: DashMap<AgentId, Versioned<AgentRecord>>,
    audit: DashMap<AgentId, Vec<AuditRecord>>,
}

impl MemStore {
    /// Create an empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored agents.
    pub fn len(&self) -> usize {
        self.agents.len()
    }

    /// True when no agent is stored.
    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

impl AgentStore for MemStore {
    fn load(&self, id: AgentId) -> StoreResult<Option<Versioned<AgentRecord>>> {
        Ok(self.agents.get(&id).map(|entry| entry.value().clone()))
    }

    fn insert(&self, record: &AgentRecord) -> StoreResult<u64> {
        match self.agents.entry(record.id()) {
            Entry::Occupied(_) => Err(StoreError::Duplicate {
                agent_id: record.id(),
            }),
            Entry::Vacant(slot) => {
                slot.insert(Versioned {
                    version: INITIAL_VERSION,
                    value: record.clone(),
                });
                Ok(INITIAL_VERSION)
            }
        }
    }

    fn compare_and_swap(
        &self,
        expected: u64,
        record: &AgentRecord,
        audit: Option<&AuditRecord>,
    ) -> StoreResult<CasOutcome> {
        let Some(mut stored) = self.agents.get_mut(&record.id()) else {
            return Ok(CasOutcome::Missing);
        };
        if stored.version != expected {
            return Ok(CasOutcome::Conflict {
                current: stored.version,
            });
        }
        let version = expected + 1;
        *stored = Versioned {
            version,
            value: record.clone(),
        };
        if let Some(entry) = audit {
            self.audit
                .entry(entry.agent_id)
                .or_default()
                .push(entry.clone());
        }
        Ok(CasOutcome::Applied { version })
    }

    fn agent_ids(&self) -> StoreResult<Vec<AgentId>> {
        let mut ids: Vec<AgentId> = self.agents.iter().map(|entry| *entry.key()).collect();
        ids.sort_unstable();
        Ok(ids)
    }

    fn audit_log(&self, id: AgentId) -> StoreResult<Vec<AuditRecord>> {
        Ok(self
            .audit
            .get(&id)
            .map(|entries| entries.value().clone())
            .unwrap_or_default())
    }
}
