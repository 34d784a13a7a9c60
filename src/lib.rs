pub mod config;
pub mod detection;
pub mod email;
pub mod error;
pub mod judgment;
pub mod orchestrator;
pub mod source;

pub use config::{Config, MergePolicy};
pub use detection::{DetectionResult, RuleBasedDetector};
pub use email::EmailRecord;
pub use error::{EvaluationError, ItemError, SourceError};
pub use judgment::{AnthropicClient, JudgmentClient, ModelEvaluator, ModelResult, ScamEvaluator};
pub use orchestrator::{BatchEntry, FinalVerdict, ScoringOrchestrator, Verdict};
pub use source::{EmailSource, FetchedEmail, MaildirSource};
