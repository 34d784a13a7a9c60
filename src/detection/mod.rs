pub mod rule_based;

use serde::{Deserialize, Serialize};

pub use rule_based::RuleBasedDetector;

/// Outcome of the rule-based detector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectionResult {
    pub scam_score: u8,
    pub is_scam: bool,
    pub red_flags: Vec<String>,
}

impl DetectionResult {
    #[cfg(test)]
    pub(crate) fn clean() -> Self {
        Self {
            scam_score: 0,
            is_scam: false,
            red_flags: Vec::new(),
        }
    }
}
