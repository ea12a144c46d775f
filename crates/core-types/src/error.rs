use thiserror::Error;

/// Error taxonomy shared across the orchestration core (see propagation policy
/// in the design notes: some variants are recovered locally by the caller,
/// some are surfaced as a persisted Evaluation, some are fatal).
#[derive(Error, Debug, Clone)]
pub enum OrchestrationError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("market closed: {0}")]
    MarketClosed(String),

    #[error("broker unavailable: {0}")]
    BrokerUnavailable(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("admission timeout: {0}")]
    AdmissionTimeout(String),

    #[error("market data unavailable: {0}")]
    DataUnavailable(String),

    #[error("chart generation failed: {0}")]
    ChartGenerationFailed(String),

    #[error("analysis timed out: {0}")]
    AnalysisTimedOut(String),

    #[error("risk rejected: {0}")]
    RiskRejected(String),

    #[error("ownership ambiguous: {0}")]
    OwnershipAmbiguous(String),

    #[error("fatal: {0}")]
    Fatal(String),
}

impl OrchestrationError {
    /// Whether the caller should retry the same operation a bounded number of
    /// times before giving up (§7: "recovered locally").
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            OrchestrationError::RateLimited(_) | OrchestrationError::BrokerUnavailable(_)
        )
    }

    /// Whether this error means the process configuration itself is broken
    /// and no amount of retrying will help.
    pub fn is_fatal(&self) -> bool {
        matches!(self, OrchestrationError::Fatal(_))
    }
}

pub type OrchestrationResult<T> = Result<T, OrchestrationError>;
