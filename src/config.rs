use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use std::path::Path;
use url::Url;

use crate::email::DEFAULT_MAX_BODY_CHARS;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub heuristics: HeuristicsConfig,
    pub judgment: JudgmentConfig,
    pub batch: BatchConfig,
    pub merge: MergeConfig,
}

/// Word sets, weights and threshold of the rule-based detector.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HeuristicsConfig {
    /// `is_scam` when the clamped score reaches this value.
    pub scam_threshold: u32,
    pub urgency: WordHeuristic,
    pub explicit_language: WordHeuristic,
    pub money_offer: WordHeuristic,
    pub threats: WordHeuristic,
    pub capitalization: CapitalizationHeuristic,
    pub exclamation: ExclamationHeuristic,
    pub sender_domain: SenderDomainHeuristic,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WordHeuristic {
    pub words: Vec<String>,
    pub weight: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CapitalizationHeuristic {
    /// Upper-case fraction of the subject that must be exceeded.
    pub max_ratio: f64,
    pub weight: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExclamationHeuristic {
    pub min_count: usize,
    pub weight: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SenderDomainHeuristic {
    /// Substrings matched against the whole lower-cased sender.
    pub keywords: Vec<String>,
    /// Flag sender domains containing a digit (e.g. `winner123.com`).
    #[serde(default = "default_true")]
    pub flag_digits: bool,
    pub weight: u32,
}

fn default_true() -> bool {
    true
}

fn words(list: &[&str]) -> Vec<String> {
    list.iter().map(|w| w.to_string()).collect()
}

impl Default for HeuristicsConfig {
    fn default() -> Self {
        Self {
            scam_threshold: 50,
            urgency: WordHeuristic {
                words: words(&[
                    "urgent",
                    "immediate",
                    "action required",
                    "suspended",
                    "verify now",
                    "act now",
                    "limited time",
                    "expires",
                    "last chance",
                ]),
                weight: 25,
            },
            explicit_language: WordHeuristic {
                words: words(&["penis", "vagina", "erection", "dick"]),
                weight: 25,
            },
            money_offer: WordHeuristic {
                words: words(&[
                    "won", "winner", "prize", "claim", "lottery", "million", "cash", "reward",
                    "free", "bonus",
                ]),
                weight: 25,
            },
            threats: WordHeuristic {
                words: words(&[
                    "suspended",
                    "closed",
                    "compromised",
                    "unauthorized",
                    "failed",
                    "blocked",
                    "locked",
                    "terminate",
                ]),
                weight: 25,
            },
            capitalization: CapitalizationHeuristic {
                max_ratio: 0.3,
                weight: 15,
            },
            exclamation: ExclamationHeuristic {
                min_count: 3,
                weight: 10,
            },
            sender_domain: SenderDomainHeuristic {
                keywords: words(&[
                    "lottery", "prize", "winner", "alert", "security", "verify", "urgent",
                    "payment", "billing", "account",
                ]),
                flag_digits: true,
                weight: 30,
            },
        }
    }
}

/// Connection and prompt settings of the external judgment service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct JudgmentConfig {
    pub endpoint: String,
    pub model: String,
    pub max_tokens: u32,
    pub anthropic_version: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    pub timeout_seconds: u64,
    /// Threshold the service is told to apply to its own score (`>`).
    pub scam_threshold: u32,
}

impl Default for JudgmentConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.anthropic.com/v1/messages".to_string(),
            model: "claude-sonnet-4-20250514".to_string(),
            max_tokens: 1000,
            anthropic_version: "2023-06-01".to_string(),
            api_key_env: "ANTHROPIC_API_KEY".to_string(),
            timeout_seconds: 30,
            scam_threshold: 70,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BatchConfig {
    /// Concurrent judgment calls during a scan. 1 serializes them.
    pub max_concurrency: usize,
    pub max_body_chars: usize,
    pub default_count: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 1,
            max_body_chars: DEFAULT_MAX_BODY_CHARS,
            default_count: 5,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MergeConfig {
    pub policy: MergePolicy,
}

/// How the final verdict is derived from the two evaluator results.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", deny_unknown_fields)]
pub enum MergePolicy {
    /// Final verdict mirrors the model result; the rule result is informational.
    #[default]
    ModelOnly,
    /// Opt-in blend: `model_weight * model + (1 - model_weight) * rule`.
    Weighted { model_weight: f64 },
}

impl Config {
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let path = path.as_ref();
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file {}", path.display()))?;
        Ok(())
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let h = &self.heuristics;
        if h.scam_threshold > 100 {
            bail!("heuristics.scam_threshold must be within 0..=100");
        }
        if !(0.0..=1.0).contains(&h.capitalization.max_ratio) {
            bail!("heuristics.capitalization.max_ratio must be within 0.0..=1.0");
        }
        for (name, heuristic) in [
            ("urgency", &h.urgency),
            ("explicit_language", &h.explicit_language),
            ("money_offer", &h.money_offer),
            ("threats", &h.threats),
        ] {
            if heuristic.words.iter().any(|w| w.trim().is_empty()) {
                bail!("heuristics.{name} contains an empty word");
            }
        }
        if h.sender_domain.keywords.iter().any(|w| w.trim().is_empty()) {
            bail!("heuristics.sender_domain contains an empty keyword");
        }
        for (name, weight) in [
            ("urgency", h.urgency.weight),
            ("explicit_language", h.explicit_language.weight),
            ("money_offer", h.money_offer.weight),
            ("threats", h.threats.weight),
            ("capitalization", h.capitalization.weight),
            ("exclamation", h.exclamation.weight),
            ("sender_domain", h.sender_domain.weight),
        ] {
            if weight > 100 {
                bail!("heuristics.{name}.weight must be within 0..=100");
            }
        }

        let j = &self.judgment;
        Url::parse(&j.endpoint)
            .with_context(|| format!("judgment.endpoint is not a valid URL: {}", j.endpoint))?;
        if j.scam_threshold > 100 {
            bail!("judgment.scam_threshold must be within 0..=100");
        }
        if j.timeout_seconds == 0 {
            bail!("judgment.timeout_seconds must be at least 1");
        }
        if j.api_key_env.is_empty() {
            bail!("judgment.api_key_env must name an environment variable");
        }

        if self.batch.max_concurrency == 0 {
            bail!("batch.max_concurrency must be at least 1");
        }
        if self.batch.max_body_chars == 0 {
            bail!("batch.max_body_chars must be at least 1");
        }

        if let MergePolicy::Weighted { model_weight } = self.merge.policy {
            if !(0.0..=1.0).contains(&model_weight) {
                bail!("merge.policy.model_weight must be within 0.0..=1.0");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.heuristics.scam_threshold, 50);
        assert_eq!(config.judgment.scam_threshold, 70);
        assert_eq!(config.merge.policy, MergePolicy::ModelOnly);
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = r#"
heuristics:
  urgency:
    words: ["hurry"]
    weight: 40
batch:
  max_concurrency: 4
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.heuristics.urgency.words, vec!["hurry".to_string()]);
        assert_eq!(config.heuristics.urgency.weight, 40);
        assert_eq!(config.heuristics.threats.weight, 25);
        assert_eq!(config.batch.max_concurrency, 4);
        assert_eq!(config.batch.max_body_chars, 1000);
        assert_eq!(config.judgment.model, "claude-sonnet-4-20250514");
    }

    #[test]
    fn test_weighted_policy_yaml() {
        let yaml = r#"
merge:
  policy:
    type: weighted
    model_weight: 0.75
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(
            config.merge.policy,
            MergePolicy::Weighted { model_weight: 0.75 }
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_failures() {
        let mut config = Config::default();
        config.batch.max_concurrency = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.judgment.endpoint = "not a url".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.merge.policy = MergePolicy::Weighted { model_weight: 1.5 };
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.heuristics.money_offer.words.push("  ".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_heuristic_weights_bounded() {
        let mut config = Config::default();
        config.heuristics.urgency.weight = 100;
        assert!(config.validate().is_ok());

        config.heuristics.urgency.weight = 101;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.heuristics.sender_domain.weight = u32::MAX;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("sender_domain.weight"));
    }

    #[test]
    fn test_config_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scam-detector.yaml");

        let mut config = Config::default();
        config.judgment.timeout_seconds = 12;
        config.to_file(&path).unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded.judgment.timeout_seconds, 12);
        assert_eq!(
            loaded.heuristics.sender_domain.keywords,
            config.heuristics.sender_domain.keywords
        );
    }

    #[test]
    fn test_unknown_field_rejected() {
        let yaml = "heuristics:\n  bogus: 1\n";
        assert!(serde_yaml::from_str::<Config>(yaml).is_err());
    }
}
