//! Runs both evaluators per email and reconciles them into a [`Verdict`].

use crate::config::{Config, MergePolicy};
use crate::detection::{DetectionResult, RuleBasedDetector};
use crate::email::EmailRecord;
use crate::error::{EvaluationError, ItemError, SourceError};
use crate::judgment::{ModelResult, ScamEvaluator};
use crate::source::{EmailSource, FetchedEmail};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalVerdict {
    pub scam_score: u8,
    pub is_scam: bool,
    pub explanation: String,
}

/// Combined output for one email. Both evaluator results stay inspectable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub rule_based: DetectionResult,
    pub model: ModelResult,
    pub final_verdict: FinalVerdict,
}

/// One batch item: the email it came from (when it could be read) and either
/// its verdict or the reason it has none.
#[derive(Debug, Clone)]
pub struct BatchEntry {
    pub email: Option<EmailRecord>,
    pub outcome: Result<Verdict, ItemError>,
}

impl Serialize for BatchEntry {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("email", &self.email)?;
        match &self.outcome {
            Ok(verdict) => {
                map.serialize_entry("rule_based", &verdict.rule_based)?;
                map.serialize_entry("model", &verdict.model)?;
                map.serialize_entry("final_verdict", &verdict.final_verdict)?;
            }
            Err(e) => map.serialize_entry("error", &e.to_string())?,
        }
        map.end()
    }
}

pub fn merge(
    rule_based: DetectionResult,
    model: ModelResult,
    policy: &MergePolicy,
    judgment_threshold: u32,
) -> Verdict {
    let final_verdict = match policy {
        MergePolicy::ModelOnly => FinalVerdict {
            scam_score: model.scam_score,
            is_scam: model.is_scam,
            explanation: model.explanation.clone(),
        },
        MergePolicy::Weighted { model_weight } => {
            let blended = model_weight * f64::from(model.scam_score)
                + (1.0 - model_weight) * f64::from(rule_based.scam_score);
            let scam_score = blended.round().clamp(0.0, 100.0) as u8;
            FinalVerdict {
                scam_score,
                is_scam: u32::from(scam_score) > judgment_threshold,
                explanation: model.explanation.clone(),
            }
        }
    };

    Verdict {
        rule_based,
        model,
        final_verdict,
    }
}

#[derive(Clone)]
pub struct ScoringOrchestrator {
    detector: Arc<RuleBasedDetector>,
    evaluator: Arc<dyn ScamEvaluator>,
    policy: MergePolicy,
    judgment_threshold: u32,
    call_timeout: Duration,
    max_concurrency: usize,
}

impl ScoringOrchestrator {
    /// Orchestrator with the default merge policy, timeout and concurrency.
    pub fn new(detector: RuleBasedDetector, evaluator: Arc<dyn ScamEvaluator>) -> Self {
        let defaults = Config::default();
        Self {
            detector: Arc::new(detector),
            evaluator,
            policy: defaults.merge.policy,
            judgment_threshold: defaults.judgment.scam_threshold,
            call_timeout: Duration::from_secs(defaults.judgment.timeout_seconds),
            max_concurrency: defaults.batch.max_concurrency,
        }
    }

    pub fn from_config(config: &Config, evaluator: Arc<dyn ScamEvaluator>) -> anyhow::Result<Self> {
        let detector = RuleBasedDetector::new(config.heuristics.clone())?;
        Ok(Self::new(detector, evaluator)
            .with_merge_policy(config.merge.policy.clone(), config.judgment.scam_threshold)
            .with_call_timeout(Duration::from_secs(config.judgment.timeout_seconds))
            .with_max_concurrency(config.batch.max_concurrency))
    }

    pub fn with_merge_policy(mut self, policy: MergePolicy, judgment_threshold: u32) -> Self {
        self.policy = policy;
        self.judgment_threshold = judgment_threshold;
        self
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    /// Scores one email. A model failure fails the whole call; there is no
    /// rule-only fallback.
    pub async fn analyze_single(&self, email: &EmailRecord) -> Result<Verdict, EvaluationError> {
        let rule_based = self.detector.analyze_record(email);
        let model = self.evaluate_model(email).await?;

        log::debug!(
            "Scored '{}' from {}: rule {} / model {}",
            email.subject,
            email.sender,
            rule_based.scam_score,
            model.scam_score
        );

        Ok(merge(rule_based, model, &self.policy, self.judgment_threshold))
    }

    async fn evaluate_model(&self, email: &EmailRecord) -> Result<ModelResult, EvaluationError> {
        match tokio::time::timeout(self.call_timeout, self.evaluator.evaluate(email)).await {
            Ok(result) => result,
            Err(_) => Err(EvaluationError::ModelCallFailed(format!(
                "Timed out after {}s",
                self.call_timeout.as_secs_f64()
            ))),
        }
    }

    /// Scores every item independently. The result has one entry per input,
    /// in input order; failed items carry their error instead of a verdict.
    pub async fn analyze_batch(&self, items: Vec<FetchedEmail>) -> Vec<BatchEntry> {
        let permits = Arc::new(Semaphore::new(self.max_concurrency));
        let mut pending = Vec::with_capacity(items.len());

        for item in items {
            match item {
                Ok(email) => {
                    let orchestrator = self.clone();
                    let permits = permits.clone();
                    let task_email = email.clone();
                    let handle = tokio::spawn(async move {
                        let _permit = permits.acquire_owned().await.map_err(|e| {
                            ItemError::Aborted(format!("Concurrency limiter closed: {e}"))
                        })?;
                        orchestrator
                            .analyze_single(&task_email)
                            .await
                            .map_err(ItemError::from)
                    });
                    pending.push((Some(email), Ok(handle)));
                }
                Err(e) => pending.push((None, Err(ItemError::from(e)))),
            }
        }

        let mut entries = Vec::with_capacity(pending.len());
        for (index, (email, task)) in pending.into_iter().enumerate() {
            let outcome = match task {
                Ok(handle) => match handle.await {
                    Ok(outcome) => outcome,
                    Err(join_error) => Err(ItemError::Aborted(join_error.to_string())),
                },
                Err(e) => Err(e),
            };

            if let Err(e) = &outcome {
                log::warn!("Batch item {} failed: {}", index + 1, e);
            }
            entries.push(BatchEntry { email, outcome });
        }

        let failed = entries.iter().filter(|e| e.outcome.is_err()).count();
        log::info!(
            "Batch complete: {} scored, {} failed",
            entries.len() - failed,
            failed
        );
        entries
    }

    /// Fetches from `source` and scores the batch. A connection failure
    /// aborts before anything is evaluated.
    pub async fn scan(
        &self,
        source: &dyn EmailSource,
        max_count: usize,
    ) -> Result<Vec<BatchEntry>, SourceError> {
        let fetched = source.fetch(max_count).await?;
        Ok(self.analyze_batch(fetched).await)
    }
}
