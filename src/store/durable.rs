//! ACID-durable agent storage backed by redb.
//!
//! Records are bincode-encoded [`Versioned`] values keyed by the raw agent ID.
//! A compare-and-swap runs inside a single write transaction, and redb admits
//! one writer at a time, so the version check and the write cannot interleave
//! with another swap. Audit entries live in their own table keyed by
//! `(agent, sequence)` and are written in the same transaction, so one
//! agent's trail is a contiguous key range.

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableTable, TableDefinition};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::agent::{AgentId, AgentRecord};
use crate::audit::AuditRecord;
use crate::error::{StoreError, StoreResult};

use super::{AgentStore, CasOutcome, INITIAL_VERSION, Versioned};

/// Agent ID → bincode `Versioned<AgentRecord>`.
const AGENTS_TABLE: TableDefinition<u64, &[u8]> = TableDefinition::new("agents");

/// (agent ID, per-agent sequence number) → bincode `AuditRecord`.
const AUDIT_TABLE: TableDefinition<(u64, u64), &[u8]> = TableDefinition::new("audit");

/// File created inside the data directory.
pub const DB_FILE_NAME: &str = "gyeol-progression.redb";

fn redb_err(op: &str, e: impl std::fmt::Display) -> StoreError {
    StoreError::Redb {
        message: format!("{op} failed: {e}"),
    }
}

fn encode<T: Serialize>(value: &T) -> StoreResult<Vec<u8>> {
    bincode::serialize(value).map_err(|e| StoreError::Serialization {
        message: e.to_string(),
    })
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> StoreResult<T> {
    bincode::deserialize(bytes).map_err(|e| StoreError::Serialization {
        message: e.to_string(),
    })
}

/// Agent store persisted with redb.
pub struct DurableStore {
    db: Arc<Database>,
}

impl DurableStore {
    /// Open or create a store in the given directory.
    pub fn open(data_dir: &Path) -> StoreResult<Self> {
        std::fs::create_dir_all(data_dir).map_err(|e| StoreError::Io { source: e })?;
        let db_path = data_dir.join(DB_FILE_NAME);
        let db = Database::create(&db_path).map_err(|e| StoreError::Redb {
            message: format!("failed to open redb at {}: {e}", db_path.display()),
        })?;

        // Create both tables up front so read transactions never miss them.
        let txn = db.begin_write().map_err(|e| redb_err("begin_write", e))?;
        {
            txn.open_table(AGENTS_TABLE).map_err(|e| redb_err("open_table", e))?;
            txn.open_table(AUDIT_TABLE).map_err(|e| redb_err("open_table", e))?;
        }
        txn.commit().map_err(|e| redb_err("commit", e))?;

        tracing::debug!(path = %db_path.display(), "opened durable agent store");
        Ok(Self { db: Arc::new(db) })
    }
}

impl AgentStore for DurableStore {
    fn load(&self, id: AgentId) -> StoreResult<Option<Versioned<AgentRecord>>> {
        let txn = self.db.begin_read().map_err(|e| redb_err("begin_read", e))?;
        let table = txn.open_table(AGENTS_TABLE).map_err(|e| redb_err("open_table", e))?;
        let guard = table.get(id.get()).map_err(|e| redb_err("get", e))?;
        guard.map(|g| decode(g.value())).transpose()
    }

    fn insert(&self, record: &AgentRecord) -> StoreResult<u64> {
        let bytes = encode(&Versioned {
            version: INITIAL_VERSION,
            value: record,
        })?;
        let txn = self.db.begin_write().map_err(|e| redb_err("begin_write", e))?;
        {
            let mut table = txn.open_table(AGENTS_TABLE).map_err(|e| redb_err("open_table", e))?;
            let exists = table.get(record.id().get()).map_err(|e| redb_err("get", e))?.is_some();
            if exists {
                return Err(StoreError::Duplicate {
                    agent_id: record.id(),
                });
            }
            table
                .insert(record.id().get(), bytes.as_slice())
                .map_err(|e| redb_err("insert", e))?;
        }
        txn.commit().map_err(|e| redb_err("commit", e))?;
        Ok(INITIAL_VERSION)
    }

    fn compare_and_swap(
        &self,
        expected: u64,
        record: &AgentRecord,
        audit: Option<&AuditRecord>,
    ) -> StoreResult<CasOutcome> {
        let key = record.id().get();
        let txn = self.db.begin_write().map_err(|e| redb_err("begin_write", e))?;
        let outcome = {
            let mut agents = txn.open_table(AGENTS_TABLE).map_err(|e| redb_err("open_table", e))?;
            let current: Option<Versioned<AgentRecord>> = agents
                .get(key)
                .map_err(|e| redb_err("get", e))?
                .map(|g| decode(g.value()))
                .transpose()?;

            match current {
                None => CasOutcome::Missing,
                Some(stored) if stored.version != expected => CasOutcome::Conflict {
                    current: stored.version,
                },
                Some(_) => {
                    let version = expected + 1;
                    let bytes = encode(&Versioned {
                        version,
                        value: record,
                    })?;
                    agents
                        .insert(key, bytes.as_slice())
                        .map_err(|e| redb_err("insert", e))?;

                    if let Some(entry) = audit {
                        let mut log = txn.open_table(AUDIT_TABLE).map_err(|e| redb_err("open_table", e))?;
                        let seq = match log
                            .range((key, 0)..=(key, u64::MAX))
                            .map_err(|e| redb_err("range", e))?
                            .next_back()
                        {
                            Some(item) => item.map_err(|e| redb_err("range", e))?.0.value().1 + 1,
                            None => 0,
                        };
                        let bytes = encode(entry)?;
                        log.insert((key, seq), bytes.as_slice())
                            .map_err(|e| redb_err("insert", e))?;
                    }
                    CasOutcome::Applied { version }
                }
            }
        };

        if outcome.is_applied() {
            txn.commit().map_err(|e| redb_err("commit", e))?;
        } else {
            txn.abort().map_err(|e| redb_err("abort", e))?;
        }
        Ok(outcome)
    }

    fn agent_ids(&self) -> StoreResult<Vec<AgentId>> {
        let txn = self.db.begin_read().map_err(|e| redb_err("begin_read", e))?;
        let table = txn.open_table(AGENTS_TABLE).map_err(|e| redb_err("open_table", e))?;
        let mut ids = Vec::new();
        for item in table.iter().map_err(|e| redb_err("iter", e))? {
            let (key, _) = item.map_err(|e| redb_err("iter", e))?;
            if let Some(id) = AgentId::new(key.value()) {
                ids.push(id);
            }
        }
        Ok(ids)
    }

    fn audit_log(&self, id: AgentId) -> StoreResult<Vec<AuditRecord>> {
        let txn = self.db.begin_read().map_err(|e| redb_err("begin_read", e))?;
        let table = txn.open_table(AUDIT_TABLE).map_err(|e| redb_err("open_table", e))?;
        let range = table
            .range((id.get(), 0)..=(id.get(), u64::MAX))
            .map_err(|e| redb_err("range", e))?;
        let mut entries = Vec::new();
        for item in range {
            let (_, value) = item.map_err(|e| redb_err("range", e))?;
            entries.push(decode(value.value())?);
        }
        Ok(entries)
    }
}

impl std::fmt::Debug for DurableStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DurableStore").finish()
    }
}
