use serde::{Deserialize, Serialize};

/// Default body limit applied at ingestion.
pub const DEFAULT_MAX_BODY_CHARS: usize = 1000;

/// Normalized email handed to the evaluators.
///
/// The body is truncated when the record is built so that neither evaluator
/// has to bound its own input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailRecord {
    pub subject: String,
    pub sender: String,
    pub body: String,
}

impl EmailRecord {
    pub fn new(
        subject: impl Into<String>,
        sender: impl Into<String>,
        body: impl Into<String>,
        max_body_chars: usize,
    ) -> Self {
        Self {
            subject: subject.into(),
            sender: sender.into(),
            body: truncate_chars(body.into(), max_body_chars),
        }
    }
}

/// Text after the last `@`, without a trailing `>` from `Name <addr>` forms.
pub fn extract_domain(sender: &str) -> Option<String> {
    sender
        .rfind('@')
        .map(|at| sender[at + 1..].trim_end_matches('>').trim().to_lowercase())
}

fn truncate_chars(mut text: String, max_chars: usize) -> String {
    if let Some((byte_idx, _)) = text.char_indices().nth(max_chars) {
        text.truncate(byte_idx);
    }
    text
}
