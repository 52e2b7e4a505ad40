//! Read-only view of the conversation collaborator.
//!
//! The engine never owns dialogue history. It reads recent messages for
//! personality analysis and two counters (distinct topics, stored memories)
//! for the multi-metric readiness policy through [`DialogueSource`].
//! [`MemDialogue`] is a bounded in-process implementation for embedding and tests.

use std::collections::{HashSet, VecDeque};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::agent::AgentId;
use crate::error::StoreResult;

/// Messages kept per agent by [`MemDialogue`].
pub const DEFAULT_HISTORY_CAPACITY: usize = 200;

// ── Messages ─────────────────────────────────────────────────────────────

/// Who produced a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// A single dialogue message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    /// A message with the given role and text.
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

// ── Source trait ─────────────────────────────────────────────────────────

/// Collaborator that answers dialogue-derived reads for one agent.
pub trait DialogueSource: Send + Sync {
    /// Up to `limit` most recent messages, newest first.
    fn recent_messages(&self, agent: AgentId, limit: usize) -> StoreResult<Vec<Message>>;

    /// Number of distinct conversation topics recorded for the agent.
    fn distinct_topic_count(&self, agent: AgentId) -> StoreResult<usize>;

    /// Number of long-term memories stored for the agent.
    fn memory_count(&self, agent: AgentId) -> StoreResult<usize>;
}

// ── In-memory implementation ─────────────────────────────────────────────

#[derive(Debug, Default)]
struct AgentDialogue {
    messages: VecDeque<Message>,
    topics: HashSet<String>,
    memories: usize,
}

/// Bounded in-memory dialogue history, sharded per agent.
#[derive(Debug)]
pub struct MemDialogue {
    agents: DashMap<AgentId, AgentDialogue>,
    capacity: usize,
}

impl MemDialogue {
    /// An empty dialogue store.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_HISTORY_CAPACITY)
    }

    /// Keep at most `capacity` messages per agent (oldest dropped first).
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            agents: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Append one message.
    pub fn push(&self, agent: AgentId, message: Message) {
        let mut entry = self.agents.entry(agent).or_default();
        entry.messages.push_back(message);
        while entry.messages.len() > self.capacity {
            entry.messages.pop_front();
        }
    }

    /// Append a user message followed by the assistant reply.
    pub fn push_exchange(&self, agent: AgentId, user: &str, assistant: &str) {
        self.push(agent, Message::new(Role::User, user));
        self.push(agent, Message::new(Role::Assistant, assistant));
    }

    /// Record a topic label; duplicates (case-insensitive) are ignored.
    pub fn add_topic(&self, agent: AgentId, topic: &str) {
        self.agents
            .entry(agent)
            .or_default()
            .topics
            .insert(topic.trim().to_lowercase());
    }

    /// Set the stored memory count reported for `agent`.
    pub fn set_memory_count(&self, agent: AgentId, count: usize) {
        self.agents.entry(agent).or_default().memories = count;
    }
}

impl Default for MemDialogue {
    fn default() -> Self {
        Self::new()
    }
}

impl DialogueSource for MemDialogue {
    fn recent_messages(&self, agent: AgentId, limit: usize) -> StoreResult<Vec<Message>> {
        Ok(self
            .agents
            .get(&agent)
            .map(|d| d.messages.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    fn distinct_topic_count(&self, agent: AgentId) -> StoreResult<usize> {
        Ok(self.agents.get(&agent).map(|d| d.topics.len()).unwrap_or(0))
    }

    fn memory_count(&self, agent: AgentId) -> StoreResult<usize> {
        Ok(self.agents.get(&agent).map(|d| d.memories).unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(raw: u64) -> AgentId {
        AgentId::new(raw).unwrap()
    }

    #[test]
    fn recent_is_newest_first_and_limited() {
        let dialogue = MemDialogue::new();
        for i in 0..30 {
            dialogue.push(id(1), Message::new(Role::User, format!("m{i}")));
        }
        let recent = dialogue.recent_messages(id(1), 20).unwrap();
        assert_eq!(recent.len(), 20);
        assert_eq!(recent[0].content, "m29");
        assert_eq!(recent[19].content, "m10");
    }

    #[test]
    fn capacity_drops_oldest() {
        let dialogue = MemDialogue::with_capacity(3);
        dialogue.push_exchange(id(1), "a", "b");
        dialogue.push_exchange(id(1), "c", "d");
        let recent = dialogue.recent_messages(id(1), 10).unwrap();
        let texts: Vec<_> = recent.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(texts, ["d", "c", "b"]);
    }

    #[test]
    fn topics_are_distinct() {
        let dialogue = MemDialogue::new();
        dialogue.add_topic(id(1), "Music");
        dialogue.add_topic(id(1), "music ");
        dialogue.add_topic(id(1), "travel");
        assert_eq!(dialogue.distinct_topic_count(id(1)).unwrap(), 2);
        assert_eq!(dialogue.distinct_topic_count(id(2)).unwrap(), 0);
    }

    #[test]
    fn unknown_agent_is_empty() {
        let dialogue = MemDialogue::new();
        assert!(dialogue.recent_messages(id(9), 20).unwrap().is_empty());
        assert_eq!(dialogue.memory_count(id(9)).unwrap(), 0);
    }
}
