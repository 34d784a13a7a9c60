//! Weighted keyword and pattern heuristics.
//!
//! Every heuristic adds a fixed weight when it fires; the sum is clamped to
//! 100. Word sets come from [`HeuristicsConfig`] and are compiled once into
//! regex alternations when the detector is built.

use super::DetectionResult;
use crate::config::HeuristicsConfig;
use crate::email::{extract_domain, EmailRecord};
use regex::Regex;

const MAX_SCORE: u32 = 100;

struct CompiledWordSet {
    name: &'static str,
    flag: &'static str,
    pattern: Option<Regex>,
    weight: u32,
}

impl CompiledWordSet {
    fn compile(
        name: &'static str,
        flag: &'static str,
        words: &[String],
        weight: u32,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            name,
            flag,
            pattern: compile_alternation(words)?,
            weight,
        })
    }

    fn matches(&self, text: &str) -> bool {
        self.pattern.as_ref().is_some_and(|p| p.is_match(text))
    }
}

/// Escaped, lower-cased alternation of `words`. An empty set never matches.
fn compile_alternation(words: &[String]) -> anyhow::Result<Option<Regex>> {
    let escaped: Vec<String> = words
        .iter()
        .map(|w| w.trim().to_lowercase())
        .filter(|w| !w.is_empty())
        .map(|w| regex::escape(&w))
        .collect();

    if escaped.is_empty() {
        return Ok(None);
    }

    Ok(Some(Regex::new(&escaped.join("|"))?))
}

pub struct RuleBasedDetector {
    config: HeuristicsConfig,
    word_sets: Vec<CompiledWordSet>,
    sender_keywords: Option<Regex>,
}

impl RuleBasedDetector {
    pub fn new(config: HeuristicsConfig) -> anyhow::Result<Self> {
        // Evaluation order is the order flags are reported in.
        let word_sets = vec![
            CompiledWordSet::compile(
                "urgency",
                "Urgency/pressure tactics detected",
                &config.urgency.words,
                config.urgency.weight,
            )?,
            CompiledWordSet::compile(
                "explicit_language",
                "Sexually Explicit language detected",
                &config.explicit_language.words,
                config.explicit_language.weight,
            )?,
            CompiledWordSet::compile(
                "money_offer",
                "Money/prize offer detected",
                &config.money_offer.words,
                config.money_offer.weight,
            )?,
            CompiledWordSet::compile(
                "threats",
                "Threatening language detected",
                &config.threats.words,
                config.threats.weight,
            )?,
        ];
        let sender_keywords = compile_alternation(&config.sender_domain.keywords)?;

        log::debug!(
            "Compiled {} word-set heuristics (threshold {})",
            word_sets.len(),
            config.scam_threshold
        );

        Ok(Self {
            config,
            word_sets,
            sender_keywords,
        })
    }

    pub fn analyze_record(&self, email: &EmailRecord) -> DetectionResult {
        self.analyze(&email.subject, &email.sender, &email.body)
    }

    pub fn analyze(&self, subject: &str, sender: &str, body: &str) -> DetectionResult {
        let combined = format!("{subject} {body}");
        let combined_lower = combined.to_lowercase();

        let mut score: u32 = 0;
        let mut red_flags = Vec::new();

        for set in &self.word_sets {
            if set.matches(&combined_lower) {
                log::debug!("Heuristic '{}' triggered (+{})", set.name, set.weight);
                score = score.saturating_add(set.weight);
                red_flags.push(set.flag.to_string());
            }
        }

        if self.excessive_caps(subject) {
            score = score.saturating_add(self.config.capitalization.weight);
            red_flags.push("Excessive capitalization".to_string());
        }

        if self.excessive_exclamation(&combined) {
            score = score.saturating_add(self.config.exclamation.weight);
            red_flags.push("Excessive exclamation marks".to_string());
        }

        if self.suspicious_sender(sender) {
            score = score.saturating_add(self.config.sender_domain.weight);
            red_flags.push("Suspicious sender domain".to_string());
        }

        let scam_score = score.min(MAX_SCORE) as u8;
        DetectionResult {
            scam_score,
            is_scam: u32::from(scam_score) >= self.config.scam_threshold,
            red_flags,
        }
    }

    fn excessive_caps(&self, subject: &str) -> bool {
        let total = subject.chars().count();
        if total == 0 {
            return false;
        }
        let upper = subject.chars().filter(|c| c.is_uppercase()).count();
        (upper as f64 / total as f64) > self.config.capitalization.max_ratio
    }

    fn excessive_exclamation(&self, text: &str) -> bool {
        text.matches('!').count() >= self.config.exclamation.min_count
    }

    fn suspicious_sender(&self, sender: &str) -> bool {
        let sender_lower = sender.to_lowercase();

        if self.config.sender_domain.flag_digits {
            if let Some(domain) = extract_domain(sender) {
                if domain.chars().any(|c| c.is_ascii_digit()) {
                    return true;
                }
            }
        }

        self.sender_keywords
            .as_ref()
            .is_some_and(|p| p.is_match(&sender_lower))
    }
}

impl Default for RuleBasedDetector {
    fn default() -> Self {
        // Default word sets are plain literals and always compile.
        Self::new(HeuristicsConfig::default()).expect("default heuristics compile")
    }
}
