//! Five-trait personality vector and its clamping arithmetic.
//!
//! Every trait lives in `[0, 100]`. All arithmetic goes through [`clamp_trait`],
//! so no sequence of deltas can push a value out of range, and out-of-range
//! input from collaborators is normalized rather than rejected.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Lowest value a trait can hold.
pub const TRAIT_MIN: u8 = 0;
/// Highest value a trait can hold.
pub const TRAIT_MAX: u8 = 100;
/// Starting value of every trait for a new agent.
pub const TRAIT_NEUTRAL: u8 = 50;

// ---------------------------------------------------------------------------
// Trait kinds
// ---------------------------------------------------------------------------

/// The five personality traits.
///
/// Declaration order is the tie-break priority used when ranking traits
/// (see [`TraitKind::PRIORITY`]); the derived `Ord` follows it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TraitKind {
    Warmth,
    Logic,
    Creativity,
    Energy,
    Humor,
}

impl TraitKind {
    /// All traits in canonical order.
    pub const ALL: [TraitKind; 5] = [
        TraitKind::Warmth,
        TraitKind::Logic,
        TraitKind::Creativity,
        TraitKind::Energy,
        TraitKind::Humor,
    ];

    /// Tie-break priority for ranking: warmth > logic > creativity > energy > humor.
    ///
    /// When two traits hold the same value, the one earlier in this list ranks
    /// higher.
    pub const PRIORITY: [TraitKind; 5] = Self::ALL;

    /// Position in [`TraitKind::PRIORITY`] (0 = highest priority).
    pub fn priority(self) -> usize {
        self as usize
    }

    /// Lower-case label for this trait.
    pub fn label(self) -> &'static str {
        match self {
            Self::Warmth => "warmth",
            Self::Logic => "logic",
            Self::Creativity => "creativity",
            Self::Energy => "energy",
            Self::Humor => "humor",
        }
    }
}

impl std::fmt::Display for TraitKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Round and clamp a raw value into the trait range.
///
/// `clamp(v) = max(0, min(100, round(v)))`. NaN maps to 0.
pub fn clamp_trait(v: f64) -> u8 {
    if v.is_nan() {
        return TRAIT_MIN;
    }
    v.round().clamp(TRAIT_MIN as f64, TRAIT_MAX as f64) as u8
}

// ---------------------------------------------------------------------------
// Personality vector
// ---------------------------------------------------------------------------

/// An agent's personality: five traits, each in `[0, 100]`.
///
/// Decoding goes through [`clamp_trait`], so out-of-range payloads are
/// normalized on the way in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "RawPersonality", into = "RawPersonality")]
pub struct Personality {
    warmth: u8,
    logic: u8,
    creativity: u8,
    energy: u8,
    humor: u8,
}

impl Personality {
    /// Build a vector from in-range values, clamping anything above 100.
    pub fn new(warmth: u8, logic: u8, creativity: u8, energy: u8, humor: u8) -> Self {
        Self {
            warmth: warmth.min(TRAIT_MAX),
            logic: logic.min(TRAIT_MAX),
            creativity: creativity.min(TRAIT_MAX),
            energy: energy.min(TRAIT_MAX),
            humor: humor.min(TRAIT_MAX),
        }
    }

    /// Build a vector from arbitrary numbers, normalizing each through [`clamp_trait`].
    pub fn from_raw(warmth: f64, logic: f64, creativity: f64, energy: f64, humor: f64) -> Self {
        Self {
            warmth: clamp_trait(warmth),
            logic: clamp_trait(logic),
            creativity: clamp_trait(creativity),
            energy: clamp_trait(energy),
            humor: clamp_trait(humor),
        }
    }

    /// Every trait at the neutral midpoint.
    pub fn neutral() -> Self {
        Self::new(
            TRAIT_NEUTRAL,
            TRAIT_NEUTRAL,
            TRAIT_NEUTRAL,
            TRAIT_NEUTRAL,
            TRAIT_NEUTRAL,
        )
    }

    /// Value of a single trait.
    pub fn get(&self, kind: TraitKind) -> u8 {
        match kind {
            TraitKind::Warmth => self.warmth,
            TraitKind::Logic => self.logic,
            TraitKind::Creativity => self.creativity,
            TraitKind::Energy => self.energy,
            TraitKind::Humor => self.humor,
        }
    }

    fn slot_mut(&mut self, kind: TraitKind) -> &mut u8 {
        match kind {
            TraitKind::Warmth => &mut self.warmth,
            TraitKind::Logic => &mut self.logic,
            TraitKind::Creativity => &mut self.creativity,
            TraitKind::Energy => &mut self.energy,
            TraitKind::Humor => &mut self.humor,
        }
    }

    /// Return a copy with one trait replaced (normalized through [`clamp_trait`]).
    pub fn with(mut self, kind: TraitKind, value: f64) -> Self {
        *self.slot_mut(kind) = clamp_trait(value);
        self
    }

    /// `(trait, value)` pairs in canonical order.
    pub fn iter(&self) -> impl Iterator<Item = (TraitKind, u8)> + '_ {
        TraitKind::ALL.into_iter().map(move |k| (k, self.get(k)))
    }

    /// Arithmetic mean of the five traits.
    pub fn average(&self) -> f64 {
        let sum: u32 = self.iter().map(|(_, v)| v as u32).sum();
        sum as f64 / TraitKind::ALL.len() as f64
    }

    /// Apply a partial delta: each present trait becomes `clamp(current + delta)`,
    /// absent traits are unchanged.
    pub fn apply_delta(&self, delta: &PersonalityDelta) -> Personality {
        let mut next = *self;
        for (kind, change) in delta.iter() {
            let slot = next.slot_mut(kind);
            *slot = clamp_trait(*slot as f64 + change as f64);
        }
        next
    }
}

/// Wire form of [`Personality`], accepting values outside the trait range.
#[derive(Serialize, Deserialize)]
struct RawPersonality {
    warmth: i32,
    logic: i32,
    creativity: i32,
    energy: i32,
    humor: i32,
}

impl From<RawPersonality> for Personality {
    fn from(raw: RawPersonality) -> Self {
        Personality::from_raw(
            raw.warmth as f64,
            raw.logic as f64,
            raw.creativity as f64,
            raw.energy as f64,
            raw.humor as f64,
        )
    }
}

impl From<Personality> for RawPersonality {
    fn from(p: Personality) -> Self {
        RawPersonality {
            warmth: p.warmth as i32,
            logic: p.logic as i32,
            creativity: p.creativity as i32,
            energy: p.energy as i32,
            humor: p.humor as i32,
        }
    }
}

impl Default for Personality {
    fn default() -> Self {
        Self::neutral()
    }
}

// ---------------------------------------------------------------------------
// Deltas
// ---------------------------------------------------------------------------

/// A partial set of per-trait adjustments. Traits not present are left alone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PersonalityDelta(BTreeMap<TraitKind, i32>);

impl PersonalityDelta {
    /// An empty delta.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, kind: TraitKind, change: i32) -> Self {
        self.0.insert(kind, change);
        self
    }

    /// Set (or replace) the adjustment for one trait.
    pub fn insert(&mut self, kind: TraitKind, change: i32) {
        self.0.insert(kind, change);
    }

    /// Adjustment for one trait, if present.
    pub fn get(&self, kind: TraitKind) -> Option<i32> {
        self.0.get(&kind).copied()
    }

    /// Whether the delta touches `kind`.
    pub fn contains(&self, kind: TraitKind) -> bool {
        self.0.contains_key(&kind)
    }

    /// Number of traits touched.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when no trait is touched.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// `(trait, change)` pairs in canonical order.
    pub fn iter(&self) -> impl Iterator<Item = (TraitKind, i32)> + '_ {
        self.0.iter().map(|(k, v)| (*k, *v))
    }
}

impl FromIterator<(TraitKind, i32)> for PersonalityDelta {
    fn from_iter<I: IntoIterator<Item = (TraitKind, i32)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
