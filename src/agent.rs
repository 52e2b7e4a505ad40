//! Agent progression record: the unit of state this engine reads and writes.
//!
//! Fields are private so the record's invariants hold by construction:
//! generation in `[1, 5]`, every trait and the evolution meter in `[0, 100]`,
//! a conversation counter that never decreases, and a visual state that is
//! always the derivation of the current personality.

use std::num::NonZeroU64;

use serde::{Deserialize, Serialize};

use crate::personality::Personality;
use crate::visual::{VisualState, VisualStateDeriver};

/// Full evolution meter.
pub const PROGRESS_MAX: u8 = 100;

/// Seconds per day, for inactivity windows.
pub const SECS_PER_DAY: u64 = 86_400;

/// Current wall-clock time in seconds since the UNIX epoch.
pub fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Unique identifier of an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
pub struct AgentId(NonZeroU64);

impl AgentId {
    /// Returns `None` if `raw` is zero.
    pub fn new(raw: u64) -> Option<Self> {
        NonZeroU64::new(raw).map(AgentId)
    }

    /// Raw numeric value.
    pub fn get(self) -> u64 {
        self.0.get()
    }
}

impl std::fmt::Display for AgentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "agent:{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Generation
// ---------------------------------------------------------------------------

/// Maturity tier of an agent, always in `[1, 5]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Generation(u8);

impl Generation {
    /// Lowest generation.
    pub const MIN: u8 = 1;
    /// Highest generation.
    pub const MAX: u8 = 5;
    /// Starting tier and devolution floor.
    pub const FIRST: Generation = Generation(Self::MIN);
    /// Evolution ceiling.
    pub const LAST: Generation = Generation(Self::MAX);

    /// Returns `None` outside `[1, 5]`.
    pub fn new(raw: u8) -> Option<Self> {
        (Self::MIN..=Self::MAX).contains(&raw).then_some(Generation(raw))
    }

    /// Numeric generation.
    pub fn get(self) -> u8 {
        self.0
    }

    /// The tier one step up, or `None` at the ceiling.
    pub fn next(self) -> Option<Self> {
        Self::new(self.0 + 1)
    }

    /// The tier one step down, or `None` at the floor.
    pub fn previous(self) -> Option<Self> {
        Self::new(self.0.saturating_sub(1))
    }

    /// True at the final generation.
    pub fn is_max(self) -> bool {
        self.0 == Self::MAX
    }

    /// Every tier from first to last.
    pub fn all() -> impl Iterator<Item = Generation> {
        (Self::MIN..=Self::MAX).map(Generation)
    }
}

impl Default for Generation {
    fn default() -> Self {
        Self::FIRST
    }
}

impl TryFrom<u8> for Generation {
    type Error = String;

    fn try_from(raw: u8) -> Result<Self, Self::Error> {
        Self::new(raw).ok_or_else(|| {
            format!(
                "generation {raw} outside [{}, {}]",
                Generation::MIN,
                Generation::MAX
            )
        })
    }
}

impl From<Generation> for u8 {
    fn from(g: Generation) -> u8 {
        g.0
    }
}

impl std::fmt::Display for Generation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Gen {}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Agent record
// ---------------------------------------------------------------------------

/// Progression state of one agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawAgentRecord")]
pub struct AgentRecord {
    id: AgentId,
    generation: Generation,
    personality: Personality,
    visual_state: VisualState,
    evolution_progress: u8,
    total_conversations: u64,
    /// Maintained by the relationship collaborator.
    intimacy: f64,
    /// Maintained by the streak collaborator.
    consecutive_active_days: u32,
    /// Seconds since the UNIX epoch.
    last_active_at: u64,
    /// `last_active_at` value of the inactivity window already devolved for.
    devolved_for_activity: Option<u64>,
}

/// Decoded form of [`AgentRecord`] before its ranges are enforced.
#[derive(Deserialize)]
struct RawAgentRecord {
    id: AgentId,
    generation: Generation,
    personality: Personality,
    visual_state: VisualState,
    evolution_progress: u8,
    total_conversations: u64,
    intimacy: f64,
    consecutive_active_days: u32,
    last_active_at: u64,
    devolved_for_activity: Option<u64>,
}

impl From<RawAgentRecord> for AgentRecord {
    fn from(raw: RawAgentRecord) -> Self {
        Self {
            id: raw.id,
            generation: raw.generation,
            personality: raw.personality,
            visual_state: raw.visual_state,
            evolution_progress: raw.evolution_progress.min(PROGRESS_MAX),
            total_conversations: raw.total_conversations,
            intimacy: 0.0,
            consecutive_active_days: raw.consecutive_active_days,
            last_active_at: raw.last_active_at,
            devolved_for_activity: raw.devolved_for_activity,
        }
        .with_intimacy(raw.intimacy)
    }
}

impl AgentRecord {
    /// A fresh Gen 1 agent with neutral personality, using the default colour table.
    pub fn new(id: AgentId, created_at: u64) -> Self {
        Self::with_deriver(id, created_at, &VisualStateDeriver::default())
    }

    /// A fresh Gen 1 agent whose visual state comes from `deriver`.
    pub fn with_deriver(id: AgentId, created_at: u64, deriver: &VisualStateDeriver) -> Self {
        let personality = Personality::neutral();
        Self {
            id,
            generation: Generation::FIRST,
            visual_state: deriver.derive(&personality),
            personality,
            evolution_progress: 0,
            total_conversations: 0,
            intimacy: 0.0,
            consecutive_active_days: 0,
            last_active_at: created_at,
            devolved_for_activity: None,
        }
    }

    // -- builder-style setters for collaborators ---------------------------

    /// Builder: set the generation.
    pub fn with_generation(mut self, generation: Generation) -> Self {
        self.generation = generation;
        self
    }

    /// Replace the personality, re-deriving the visual state with the default colours.
    pub fn with_personality(mut self, personality: Personality) -> Self {
        self.set_personality(personality, &VisualStateDeriver::default());
        self
    }

    /// Builder: set the meter, capped at [`PROGRESS_MAX`].
    pub fn with_evolution_progress(mut self, progress: u8) -> Self {
        self.set_evolution_progress(progress);
        self
    }

    /// Builder: seed the conversation counter.
    pub fn with_total_conversations(mut self, total: u64) -> Self {
        self.total_conversations = total;
        self
    }

    /// Negative or NaN input is normalized to 0.
    pub fn with_intimacy(mut self, intimacy: f64) -> Self {
        self.intimacy = if intimacy.is_nan() { 0.0 } else { intimacy.max(0.0) };
        self
    }

    /// Builder: set the streak maintained by the streak collaborator.
    pub fn with_consecutive_active_days(mut self, days: u32) -> Self {
        self.consecutive_active_days = days;
        self
    }

    /// Builder: set the last activity time.
    pub fn with_last_active_at(mut self, at: u64) -> Self {
        self.last_active_at = at;
        self
    }

    // -- accessors ---------------------------------------------------------

    /// Agent identifier.
    pub fn id(&self) -> AgentId {
        self.id
    }

    /// Current generation.
    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Current personality.
    pub fn personality(&self) -> &Personality {
        &self.personality
    }

    /// Derivation of the current personality.
    pub fn visual_state(&self) -> &VisualState {
        &self.visual_state
    }

    /// Evolution meter in `[0, 100]`.
    pub fn evolution_progress(&self) -> u8 {
        self.evolution_progress
    }

    /// Conversation counter.
    pub fn total_conversations(&self) -> u64 {
        self.total_conversations
    }

    /// Relationship score, never negative.
    pub fn intimacy(&self) -> f64 {
        self.intimacy
    }

    /// Current activity streak in days.
    pub fn consecutive_active_days(&self) -> u32 {
        self.consecutive_active_days
    }

    /// Seconds since the UNIX epoch of the last activity.
    pub fn last_active_at(&self) -> u64 {
        self.last_active_at
    }

    /// Activity stamp of the window already devolved for, if any.
    pub fn devolved_for_activity(&self) -> Option<u64> {
        self.devolved_for_activity
    }

    /// Whole days since last activity, as of `now`.
    pub fn inactive_days(&self, now: u64) -> u64 {
        now.saturating_sub(self.last_active_at) / SECS_PER_DAY
    }

    // -- engine-side mutation ----------------------------------------------

    /// Replace the personality and recompute the visual state in the same step.
    pub fn set_personality(&mut self, personality: Personality, deriver: &VisualStateDeriver) {
        self.personality = personality;
        self.visual_state = deriver.derive(&personality);
    }

    /// Recompute the visual state from the stored personality (e.g. after a colour table change).
    pub fn refresh_visual_state(&mut self, deriver: &VisualStateDeriver) {
        self.visual_state = deriver.derive(&self.personality);
    }

    /// Set the meter, capped at [`PROGRESS_MAX`].
    pub fn set_evolution_progress(&mut self, progress: u8) {
        self.evolution_progress = progress.min(PROGRESS_MAX);
    }

    /// Raise the meter by `amount`, saturating at [`PROGRESS_MAX`].
    pub fn raise_evolution_progress(&mut self, amount: u8) {
        self.set_evolution_progress(self.evolution_progress.saturating_add(amount));
    }

    /// Add to the conversation counter. The counter never decreases.
    pub fn add_conversations(&mut self, count: u64) {
        self.total_conversations = self.total_conversations.saturating_add(count);
    }

    /// Stamp activity; opens a fresh inactivity window.
    pub fn touch(&mut self, at: u64) {
        self.last_active_at = self.last_active_at.max(at);
    }

    pub(crate) fn set_generation(&mut self, generation: Generation) {
        self.generation = generation;
    }

    pub(crate) fn mark_devolved(&mut self) {
        self.devolved_for_activity = Some(self.last_active_at);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::personality::TraitKind;

    fn id(raw: u64) -> AgentId {
        AgentId::new(raw).unwrap()
    }

    #[test]
    fn generation_bounds() {
        assert!(Generation::new(0).is_none());
        assert!(Generation::new(6).is_none());
        assert_eq!(Generation::FIRST.previous(), None);
        assert_eq!(Generation::LAST.next(), None);
        assert_eq!(Generation::new(3).unwrap().next(), Generation::new(4));
        assert_eq!(Generation::new(3).unwrap().previous(), Generation::new(2));
        assert_eq!(Generation::all().count(), 5);
    }

    #[test]
    fn generation_serde_rejects_out_of_range() {
        let ok: Generation = serde_json::from_str("4").unwrap();
        assert_eq!(ok.get(), 4);
        assert!(serde_json::from_str::<Generation>("9").is_err());
        assert_eq!(serde_json::to_string(&Generation::LAST).unwrap(), "5");
    }

    #[test]
    fn new_agent_defaults() {
        let agent = AgentRecord::new(id(1), 1_000);
        assert_eq!(agent.generation(), Generation::FIRST);
        assert_eq!(*agent.personality(), Personality::neutral());
        assert_eq!(agent.evolution_progress(), 0);
        assert_eq!(agent.total_conversations(), 0);
        assert_eq!(agent.last_active_at(), 1_000);
        assert_eq!(
            *agent.visual_state(),
            VisualStateDeriver::default().derive(&Personality::neutral())
        );
    }

    #[test]
    fn progress_is_capped() {
        let mut agent = AgentRecord::new(id(1), 0).with_evolution_progress(250);
        assert_eq!(agent.evolution_progress(), 100);
        agent.set_evolution_progress(97);
        agent.raise_evolution_progress(5);
        assert_eq!(agent.evolution_progress(), 100);
    }

    #[test]
    fn decoding_normalizes_out_of_range_fields() {
        let mut value = serde_json::to_value(AgentRecord::new(id(1), 0)).unwrap();
        value["evolution_progress"] = 250.into();
        value["intimacy"] = (-3.0).into();
        value["personality"]["warmth"] = 250.into();

        let record: AgentRecord = serde_json::from_value(value).unwrap();
        assert_eq!(record.evolution_progress(), 100);
        assert_eq!(record.intimacy(), 0.0);
        assert_eq!(record.personality().get(TraitKind::Warmth), 100);
    }

    #[test]
    fn personality_change_refreshes_visual() {
        let deriver = VisualStateDeriver::default();
        let mut agent = AgentRecord::new(id(1), 0);
        let p = Personality::neutral().with(TraitKind::Humor, 95.0);
        agent.set_personality(p, &deriver);
        assert_eq!(*agent.visual_state(), deriver.derive(&p));
        assert_eq!(agent.visual_state().primary_color, deriver.colors().humor);
    }

    #[test]
    fn touch_never_moves_backwards() {
        let mut agent = AgentRecord::new(id(1), 500);
        agent.touch(100);
        assert_eq!(agent.last_active_at(), 500);
        agent.touch(900);
        assert_eq!(agent.last_active_at(), 900);
    }

    #[test]
    fn inactive_days_floor() {
        let agent = AgentRecord::new(id(1), 0);
        assert_eq!(agent.inactive_days(SECS_PER_DAY * 14 - 1), 13);
        assert_eq!(agent.inactive_days(SECS_PER_DAY * 14), 14);
    }
}
