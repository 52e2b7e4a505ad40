//! Visual state derivation: personality vector → rendering parameters.
//!
//! The derived [`VisualState`] is never edited directly. It is recomputed from
//! the personality whenever the personality changes, so the two cannot drift.

use serde::{Deserialize, Serialize};

use crate::personality::{Personality, TraitKind};

/// Upper bound for [`VisualState::glow_intensity`].
pub const MAX_GLOW: f64 = 1.0;
/// Upper bound for [`VisualState::particle_count`].
pub const MAX_PARTICLES: u8 = 50;

/// Coarse shape of the rendered companion, chosen by average trait level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Form {
    Point,
    Sphere,
    Orb,
    Complex,
    Abstract,
}

impl Form {
    /// Bucket an average trait value. Upper bounds are exclusive.
    pub fn from_average(avg: f64) -> Self {
        if avg < 30.0 {
            Form::Point
        } else if avg < 50.0 {
            Form::Sphere
        } else if avg < 70.0 {
            Form::Orb
        } else if avg < 90.0 {
            Form::Complex
        } else {
            Form::Abstract
        }
    }

    /// Lower-case label for this form.
    pub fn label(self) -> &'static str {
        match self {
            Form::Point => "point",
            Form::Sphere => "sphere",
            Form::Orb => "orb",
            Form::Complex => "complex",
            Form::Abstract => "abstract",
        }
    }
}

impl std::fmt::Display for Form {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Fixed trait → colour mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColorTable {
    pub warmth: String,
    pub logic: String,
    pub creativity: String,
    pub energy: String,
    pub humor: String,
}

impl ColorTable {
    /// Colour assigned to `kind`.
    pub fn get(&self, kind: TraitKind) -> &str {
        match kind {
            TraitKind::Warmth => &self.warmth,
            TraitKind::Logic => &self.logic,
            TraitKind::Creativity => &self.creativity,
            TraitKind::Energy => &self.energy,
            TraitKind::Humor => &self.humor,
        }
    }
}

impl Default for ColorTable {
    fn default() -> Self {
        Self {
            warmth: "#F59E0B".into(),
            logic: "#06B6D4".into(),
            creativity: "#A855F7".into(),
            energy: "#22C55E".into(),
            humor: "#EAB308".into(),
        }
    }
}

/// Rendering parameters derived from a personality.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualState {
    pub primary_color: String,
    pub secondary_color: String,
    /// In `[0.0, 1.0]`.
    pub glow_intensity: f64,
    /// In `[0, 50]`.
    pub particle_count: u8,
    pub form: Form,
}

/// Rank traits by value, highest first. Equal values fall back to
/// [`TraitKind::PRIORITY`].
pub fn rank_traits(personality: &Personality) -> [TraitKind; 5] {
    let mut ranked = TraitKind::PRIORITY;
    ranked.sort_by(|a, b| {
        personality
            .get(*b)
            .cmp(&personality.get(*a))
            .then_with(|| a.priority().cmp(&b.priority()))
    });
    ranked
}

/// Pure personality → visual state function, parameterized by a colour table.
#[derive(Debug, Clone, Default)]
pub struct VisualStateDeriver {
    colors: ColorTable,
}

impl VisualStateDeriver {
    /// A deriver using `colors`.
    pub fn new(colors: ColorTable) -> Self {
        Self { colors }
    }

    /// Active colour table.
    pub fn colors(&self) -> &ColorTable {
        &self.colors
    }

    /// Derive the visual state. Identical input always yields identical output.
    pub fn derive(&self, personality: &Personality) -> VisualState {
        let ranked = rank_traits(personality);
        let avg = personality.average();
        let glow = (0.2 + 0.4 * avg / 100.0).min(MAX_GLOW);
        let particles = (10.0 + 40.0 * avg / 100.0).round().min(MAX_PARTICLES as f64);

        VisualState {
            primary_color: self.colors.get(ranked[0]).to_string(),
            secondary_color: self.colors.get(ranked[1]).to_string(),
            glow_intensity: glow,
            particle_count: particles as u8,
            form: Form::from_average(avg),
        }
    }
}
