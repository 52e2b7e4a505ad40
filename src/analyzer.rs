//! Conversation analysis: recent dialogue → personality delta.
//!
//! The default strategy is a data-driven keyword table ([`KeywordAnalyzer`]).
//! Each rule is a `(pattern, trait, weight)` entry; a rule that matches anywhere
//! in the concatenated conversation contributes its weight once. This is a
//! boolean trigger, not a frequency count. Weights default to +1; configured
//! tables may raise them but never go to zero or below, so keyword analysis
//! only pushes traits upward.
//!
//! [`delta_from_model_reply`] parses a language-model analysis reply obtained
//! by a collaborator; callers fall back to the keyword table when it fails.

use regex::Regex;
use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;

use crate::dialogue::Message;
use crate::error::{ConfigError, ConfigResult};
use crate::personality::{PersonalityDelta, TraitKind};

/// Bound applied to each entry of a model-produced delta.
pub const MODEL_DELTA_LIMIT: i32 = 2;

/// Strategy that turns recent messages into a personality delta.
pub trait ConversationAnalyzer: Send + Sync {
    /// Analyze up to the most recent messages. Message order does not matter.
    fn analyze(&self, messages: &[Message]) -> PersonalityDelta;
}

// ---------------------------------------------------------------------------
// Keyword rules
// ---------------------------------------------------------------------------

/// One row of the keyword table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordRule {
    #[serde(rename = "trait")]
    pub trait_kind: TraitKind,
    /// `regex` syntax, matched against lower-cased NFC text.
    pub pattern: String,
    /// Positive; defaults to 1.
    #[serde(default = "default_weight")]
    pub weight: i32,
}

fn default_weight() -> i32 {
    1
}

impl KeywordRule {
    /// A rule with the default weight.
    pub fn new(trait_kind: TraitKind, pattern: impl Into<String>) -> Self {
        Self {
            trait_kind,
            pattern: pattern.into(),
            weight: default_weight(),
        }
    }
}

/// The bundled rule table (Korean and English cue words).
pub fn default_rules() -> Vec<KeywordRule> {
    vec![
        KeywordRule::new(
            TraitKind::Warmth,
            "사랑|감사|고마|따뜻|응원|love|thank|grateful|warm|cheer",
        ),
        KeywordRule::new(
            TraitKind::Logic,
            "분석|논리|데이터|비율|원인|analy|logic|data|ratio|cause",
        ),
        KeywordRule::new(
            TraitKind::Creativity,
            "상상|아이디어|창작|새로|다른|imagin|idea|creat|invent",
        ),
        KeywordRule::new(
            TraitKind::Energy,
            "빨리|에너지|활동|운동|재미|hurry|energy|active|exercise|workout",
        ),
        KeywordRule::new(
            TraitKind::Humor,
            "농담|웃|재밌|유머|ㅋ|ㅎ|joke|funny|haha|lol|humor",
        ),
    ]
}

struct CompiledRule {
    trait_kind: TraitKind,
    regex: Regex,
    weight: i32,
}

/// Keyword-table analyzer.
pub struct KeywordAnalyzer {
    rules: Vec<CompiledRule>,
}

impl KeywordAnalyzer {
    /// Compile a rule table. Fails on the first invalid pattern.
    pub fn new(rules: &[KeywordRule]) -> ConfigResult<Self> {
        let rules = rules
            .iter()
            .map(|rule| {
                let regex = Regex::new(&rule.pattern).map_err(|e| ConfigError::InvalidPattern {
                    pattern: rule.pattern.clone(),
                    message: e.to_string(),
                })?;
                Ok(CompiledRule {
                    trait_kind: rule.trait_kind,
                    regex,
                    weight: rule.weight,
                })
            })
            .collect::<ConfigResult<Vec<_>>>()?;
        Ok(Self { rules })
    }

    /// Analyzer over [`default_rules`].
    pub fn with_default_rules() -> ConfigResult<Self> {
        Self::new(&default_rules())
    }

    /// Number of compiled rules.
    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }
}

impl std::fmt::Debug for KeywordAnalyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeywordAnalyzer")
            .field("rules", &self.rules.len())
            .finish()
    }
}

impl ConversationAnalyzer for KeywordAnalyzer {
    fn analyze(&self, messages: &[Message]) -> PersonalityDelta {
        let text = normalize_text(messages);
        let mut delta = PersonalityDelta::new();
        for rule in &self.rules {
            if !rule.regex.is_match(&text) {
                continue;
            }
            let weight = match delta.get(rule.trait_kind) {
                Some(existing) => existing.max(rule.weight),
                None => rule.weight,
            };
            delta.insert(rule.trait_kind, weight);
        }
        delta
    }
}

/// Concatenate message bodies, NFC-normalize and lower-case them.
fn normalize_text(messages: &[Message]) -> String {
    let joined = messages
        .iter()
        .map(|m| m.content.as_str())
        .collect::<Vec<_>>()
        .join(" ");
    joined.nfc().collect::<String>().to_lowercase()
}

// ---------------------------------------------------------------------------
// Model replies
// ---------------------------------------------------------------------------

/// Parse a model reply such as `{"warmth": 1, "logic": -2, ...}`.
///
/// The reply may be wrapped in a code fence or surrounded by prose; the span
/// from the first `{` to the last `}` is parsed. Each numeric trait entry is
/// rounded and clamped to `[-2, 2]`; zero and non-numeric entries are dropped.
/// Returns `None` when no JSON object can be parsed.
pub fn delta_from_model_reply(raw: &str) -> Option<PersonalityDelta> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    if end < start {
        return None;
    }
    let value: serde_json::Value = serde_json::from_str(&raw[start..=end]).ok()?;
    let object = value.as_object()?;

    let delta = TraitKind::ALL
        .into_iter()
        .filter_map(|kind| {
            let n = object.get(kind.label())?.as_f64()?;
            let clamped = n
                .round()
                .clamp(-MODEL_DELTA_LIMIT as f64, MODEL_DELTA_LIMIT as f64) as i32;
            (clamped != 0).then_some((kind, clamped))
        })
        .collect();
    Some(delta)
}

/// Analyzer that prefers a model reply and falls back to another analyzer
/// when the reply cannot be parsed.
pub struct ModelReplyAnalyzer<'a> {
    reply: &'a str,
    fallback: &'a dyn ConversationAnalyzer,
}

impl<'a> ModelReplyAnalyzer<'a> {
    /// Analyze with `reply`, using `fallback` when it does not parse.
    pub fn new(reply: &'a str, fallback: &'a dyn ConversationAnalyzer) -> Self {
        Self { reply, fallback }
    }
}

impl ConversationAnalyzer for ModelReplyAnalyzer<'_> {
    fn analyze(&self, messages: &[Message]) -> PersonalityDelta {
        match delta_from_model_reply(self.reply) {
            Some(delta) => delta,
            None => {
                tracing::debug!("model reply unparsable, using fallback analyzer");
                self.fallback.analyze(messages)
            }
        }
    }
}
