use thiserror::Error;

/// Failures of the model-based evaluator. Heuristic analysis has no error type.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EvaluationError {
    /// Network, authentication, HTTP status or timeout failure talking to the
    /// judgment service.
    #[error("Judgment service call failed: {0}")]
    ModelCallFailed(String),

    /// The service answered but the text was not the expected JSON object.
    #[error("Malformed judgment response: {0}")]
    ModelResponseMalformed(String),
}

/// Failures of an email source.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SourceError {
    /// The mailbox could not be opened at all. Aborts a scan before any
    /// evaluation starts.
    #[error("Mailbox connection failed: {0}")]
    ConnectionFailed(String),

    /// A single message could not be retrieved or decoded.
    #[error("Failed to fetch message: {0}")]
    FetchFailed(String),
}

/// Why one batch item has no verdict. Never aborts sibling items.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ItemError {
    #[error(transparent)]
    Evaluation(#[from] EvaluationError),

    #[error(transparent)]
    Source(#[from] SourceError),

    /// The evaluation task panicked or was cancelled.
    #[error("Evaluation task aborted: {0}")]
    Aborted(String),
}
