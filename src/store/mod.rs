//! Agent storage.
//!
//! Two backends implement [`AgentStore`]:
//!
//! - [`MemStore`] keeps versioned records in concurrent hashmaps (DashMap)
//! - [`DurableStore`] keeps them in ACID transactions (redb) and survives restarts
//!
//! Every record carries a version. Writers read a version, compute a new
//! record, and publish it with [`AgentStore::compare_and_swap`]; a concurrent
//! writer in between makes the swap report [`CasOutcome::Conflict`].

pub mod durable;
pub mod mem;

pub use durable::DurableStore;
pub use mem::MemStore;

use serde::{Deserialize, Serialize};

use crate::agent::{AgentId, AgentRecord};
use crate::audit::AuditRecord;
use crate::error::StoreResult;

/// Version assigned to a freshly inserted record.
pub const INITIAL_VERSION: u64 = 1;

/// A value paired with its optimistic-concurrency version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Versioned<T> {
    pub version: u64,
    pub value: T,
}

/// Result of a compare-and-swap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CasOutcome {
    /// The record was replaced and now has `version`.
    Applied { version: u64 },
    /// Someone else wrote first; the stored version is `current`.
    Conflict { current: u64 },
    /// No record with that ID.
    Missing,
}

impl CasOutcome {
    /// True when the swap was written.
    pub fn is_applied(self) -> bool {
        matches!(self, Self::Applied { .. })
    }
}

/// Versioned agent storage with an append-only audit log.
pub trait AgentStore: Send + Sync {
    /// Read the current record and its version.
    fn load(&self, id: AgentId) -> StoreResult<Option<Versioned<AgentRecord>>>;

    /// Store a new agent at [`INITIAL_VERSION`]. Fails with
    /// [`StoreError::Duplicate`](crate::error::StoreError::Duplicate) if the ID exists.
    fn insert(&self, record: &AgentRecord) -> StoreResult<u64>;

    /// Replace the record if its stored version still equals `expected`.
    /// The optional audit entry is appended in the same step as the write.
    fn compare_and_swap(
        &self,
        expected: u64,
        record: &AgentRecord,
        audit: Option<&AuditRecord>,
    ) -> StoreResult<CasOutcome>;

    /// IDs of every stored agent, ascending.
    fn agent_ids(&self) -> StoreResult<Vec<AgentId>>;

    /// Audit entries for one agent, oldest first.
    fn audit_log(&self, id: AgentId) -> StoreResult<Vec<AuditRecord>>;
}
