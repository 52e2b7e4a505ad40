//! Conversation-driven progression: counters, periodic analysis, evolution meter.
//!
//! Every completed exchange advances the conversation counter. Whenever the
//! counter crosses a multiple of the evolution interval, the recent dialogue
//! is analyzed, the resulting delta is applied to the personality, the visual
//! state is re-derived, and the evolution meter rises.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::agent::AgentRecord;
use crate::analyzer::ConversationAnalyzer;
use crate::dialogue::Message;
use crate::personality::PersonalityDelta;
use crate::visual::VisualStateDeriver;

/// Counter and cadence settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressionSettings {
    /// Conversations credited per user+assistant exchange.
    pub conversations_per_turn: u64,
    /// Analysis runs each time the counter crosses a multiple of this.
    pub evolution_interval: u64,
    /// Evolution meter gain per analysis.
    pub progress_per_analysis: u8,
    /// Messages handed to the analyzer.
    pub history_window: usize,
}

impl Default for ProgressionSettings {
    fn default() -> Self {
        Self {
            conversations_per_turn: 2,
            evolution_interval: 10,
            progress_per_analysis: 5,
            history_window: 20,
        }
    }
}

/// Applies conversation turns to agent records.
#[derive(Clone)]
pub struct ProgressionTracker {
    settings: ProgressionSettings,
    analyzer: Arc<dyn ConversationAnalyzer>,
    deriver: VisualStateDeriver,
}

impl ProgressionTracker {
    /// A tracker over the given settings, analyzer and deriver.
    pub fn new(
        settings: ProgressionSettings,
        analyzer: Arc<dyn ConversationAnalyzer>,
        deriver: VisualStateDeriver,
    ) -> Self {
        Self {
            settings,
            analyzer,
            deriver,
        }
    }

    /// Active settings.
    pub fn settings(&self) -> &ProgressionSettings {
        &self.settings
    }

    /// Deriver used for every personality change.
    pub fn deriver(&self) -> &VisualStateDeriver {
        &self.deriver
    }

    /// Whether moving the counter from `before` to `after` crosses an interval boundary.
    pub fn crosses_interval(&self, before: u64, after: u64) -> bool {
        match self.settings.evolution_interval {
            0 => false,
            n => before / n < after / n,
        }
    }

    /// Credit one exchange and stamp activity. Returns whether analysis is due.
    pub fn advance(&self, record: &mut AgentRecord, now: u64) -> bool {
        let before = record.total_conversations();
        record.add_conversations(self.settings.conversations_per_turn);
        record.touch(now);
        self.crosses_interval(before, record.total_conversations())
    }

    /// Configured conversation analyzer.
    pub fn analyzer(&self) -> &dyn ConversationAnalyzer {
        self.analyzer.as_ref()
    }

    /// Run the configured analyzer over recent messages.
    pub fn analyze(&self, messages: &[Message]) -> PersonalityDelta {
        self.analyze_with(self.analyzer.as_ref(), messages)
    }

    /// Run `analyzer` over at most `history_window` messages.
    pub fn analyze_with(
        &self,
        analyzer: &dyn ConversationAnalyzer,
        messages: &[Message],
    ) -> PersonalityDelta {
        let window = messages.len().min(self.settings.history_window);
        analyzer.analyze(&messages[..window])
    }

    /// Apply an analysis result: personality delta, visual refresh, meter gain.
    pub fn apply_analysis(&self, record: &mut AgentRecord, delta: &PersonalityDelta) {
        let next = record.personality().apply_delta(delta);
        record.set_personality(next, &self.deriver);
        record.raise_evolution_progress(self.settings.progress_per_analysis);
    }
}

impl std::fmt::Debug for ProgressionTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressionTracker")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}
