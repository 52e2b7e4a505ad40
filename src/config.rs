//! Engine configuration.
//!
//! [`EngineConfig`] holds every tunable table the engine reads: cadence,
//! thresholds, the colour table, keyword rules and probability rates. It is
//! read once at construction and never mutated afterwards. All sections
//! default to the product values, so an empty TOML file is a valid config.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::agent::{Generation, PROGRESS_MAX};
use crate::analyzer::{KeywordAnalyzer, KeywordRule, default_rules};
use crate::devolution::DevolutionSettings;
use crate::error::{ConfigError, ConfigResult};
use crate::evolution::EvolutionSettings;
use crate::probability::ProbabilityConfig;
use crate::progression::ProgressionSettings;
use crate::readiness::{
    MultiMetricPolicy, MultiMetricPolicyConfig, PolicyKind, ReadinessPolicy, SimplePolicy,
    SimplePolicyConfig,
};
use crate::visual::{ColorTable, VisualStateDeriver};

/// Keyword table used by the default analyzer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    pub rules: Vec<KeywordRule>,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            rules: default_rules(),
        }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Readiness policy reported by progress queries.
    pub policy: PolicyKind,
    /// Directory for the durable store. In-memory storage when absent.
    pub data_dir: Option<PathBuf>,
    pub progression: ProgressionSettings,
    pub evolution: EvolutionSettings,
    pub devolution: DevolutionSettings,
    pub simple_policy: SimplePolicyConfig,
    pub multi_metric_policy: MultiMetricPolicyConfig,
    pub visual: ColorTable,
    pub analyzer: AnalyzerConfig,
    pub probability: ProbabilityConfig,
}

impl EngineConfig {
    /// Load from a TOML file.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::parse(&content, &path.display().to_string())
    }

    /// Parse TOML text.
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        Self::parse(content, "<string>")
    }

    fn parse(content: &str, origin: &str) -> ConfigResult<Self> {
        toml::from_str(content).map_err(|e| ConfigError::Parse {
            path: origin.to_string(),
            message: e.to_string(),
        })
    }

    /// Save to a TOML file.
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: parent.display().to_string(),
                source: e,
            })?;
        }
        std::fs::write(path, content).map_err(|e| ConfigError::Write {
            path: path.display().to_string(),
            source: e,
        })
    }

    /// Reject configurations the engine cannot run with.
    pub fn validate(&self) -> ConfigResult<()> {
        let invalid = |message: String| Err(ConfigError::Invalid { message });

        if self.progression.evolution_interval == 0 {
            return invalid("progression.evolution_interval must be at least 1".into());
        }
        if self.progression.conversations_per_turn == 0 {
            return invalid("progression.conversations_per_turn must be at least 1".into());
        }
        if self.progression.progress_per_analysis > PROGRESS_MAX {
            return invalid(format!(
                "progression.progress_per_analysis must be at most {PROGRESS_MAX}"
            ));
        }
        if self.evolution.failure_progress > PROGRESS_MAX {
            return invalid(format!(
                "evolution.failure_progress must be at most {PROGRESS_MAX}"
            ));
        }
        if self.devolution.progress_after > PROGRESS_MAX {
            return invalid(format!(
                "devolution.progress_after must be at most {PROGRESS_MAX}"
            ));
        }
        if self.devolution.inactivity_days == 0 {
            return invalid("devolution.inactivity_days must be at least 1".into());
        }
        if self.probability.max_probability > 100 {
            return invalid("probability.max_probability must be at most 100".into());
        }
        if self.probability.trait_points_per_bonus <= 0.0 {
            return invalid("probability.trait_points_per_bonus must be positive".into());
        }

        let simple: Vec<u8> = self
            .simple_policy
            .thresholds
            .iter()
            .map(|t| t.generation)
            .collect();
        check_generations("simple_policy.thresholds", &simple)?;
        if let Some(t) = self
            .simple_policy
            .thresholds
            .iter()
            .find(|t| t.progress > PROGRESS_MAX)
        {
            return invalid(format!(
                "simple_policy threshold for Gen {} requires progress above {PROGRESS_MAX}",
                t.generation
            ));
        }

        let multi: Vec<u8> = self
            .multi_metric_policy
            .requirements
            .iter()
            .map(|r| r.generation)
            .collect();
        check_generations("multi_metric_policy.requirements", &multi)?;

        if let Some(rule) = self.analyzer.rules.iter().find(|r| r.weight <= 0) {
            return invalid(format!(
                "analyzer rule {:?} for {} must have a positive weight, found {}",
                rule.pattern, rule.trait_kind, rule.weight
            ));
        }

        KeywordAnalyzer::new(&self.analyzer.rules)?;
        Ok(())
    }

    /// The readiness policy selected by [`Self::policy`].
    pub fn build_policy(&self) -> Arc<dyn ReadinessPolicy> {
        match self.policy {
            PolicyKind::Simple => Arc::new(SimplePolicy::new(self.simple_policy.clone())),
            PolicyKind::MultiMetric => {
                Arc::new(MultiMetricPolicy::new(self.multi_metric_policy.clone()))
            }
        }
    }

    /// The keyword analyzer over the configured rules.
    pub fn build_analyzer(&self) -> ConfigResult<KeywordAnalyzer> {
        KeywordAnalyzer::new(&self.analyzer.rules)
    }

    /// The visual state deriver over the configured colour table.
    pub fn build_deriver(&self) -> VisualStateDeriver {
        VisualStateDeriver::new(self.visual.clone())
    }
}

/// A threshold table must name every generation 2..=5 exactly once.
fn check_generations(section: &str, generations: &[u8]) -> ConfigResult<()> {
    let mut sorted = generations.to_vec();
    sorted.sort_unstable();
    let expected: Vec<u8> = Generation::all().skip(1).map(Generation::get).collect();
    if sorted != expected {
        return Err(ConfigError::Invalid {
            message: format!(
                "{section} must cover generations {expected:?} exactly once, found {generations:?}"
            ),
        });
    }
    Ok(())
}
