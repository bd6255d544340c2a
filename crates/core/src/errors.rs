use rust_decimal::Decimal;
use thiserror::Error;

pub const UNAUTHORIZED_MESSAGE: &str = "Sorry, this call could not be authorized.";
pub const FALLBACK_MESSAGE: &str =
    "Sorry, I'm having trouble answering right now. Please try again in a moment.";

/// Why a webhook request failed verification. Only ever logged, never returned to the caller.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum AuthenticationError {
    #[error("webhook shared secret is not configured")]
    MissingSecret,
    #[error("request carries no signature header")]
    MissingSignature,
    #[error("request url could not be reconstructed: {0}")]
    MalformedRequest(String),
    #[error("signature does not match request")]
    SignatureMismatch,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum BudgetError {
    #[error("budget exceeded: charging for {reason} would bring spend to {attempted} of {ceiling}")]
    Exceeded { attempted: Decimal, ceiling: Decimal, reason: String },
    #[error("refusing negative charge of {amount} for {reason}")]
    NegativeCharge { amount: Decimal, reason: String },
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CallError {
    #[error(transparent)]
    Authentication(#[from] AuthenticationError),
    #[error(transparent)]
    Budget(#[from] BudgetError),
    #[error("{stage} timed out after {limit_ms}ms")]
    Timeout { stage: String, limit_ms: u64 },
    #[error("{provider} call failed (status {status:?}): {body}")]
    Provider { provider: String, status: Option<u16>, body: String },
    #[error("speech synthesis failed: {reason}")]
    Synthesis { reason: String },
}

impl CallError {
    pub fn timeout(stage: impl Into<String>, limit_ms: u64) -> Self {
        Self::Timeout { stage: stage.into(), limit_ms }
    }

    pub fn provider(
        provider: impl Into<String>,
        status: Option<u16>,
        body: impl Into<String>,
    ) -> Self {
        Self::Provider { provider: provider.into(), status, body: body.into() }
    }

    pub fn synthesis(reason: impl Into<String>) -> Self {
        Self::Synthesis { reason: reason.into() }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Authentication(_) => "authentication_error",
            Self::Budget(_) => "budget_exceeded",
            Self::Timeout { .. } => "timeout",
            Self::Provider { .. } => "provider_error",
            Self::Synthesis { .. } => "synthesis_error",
        }
    }

    /// The only text a caller ever hears about a failure.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Authentication(_) => UNAUTHORIZED_MESSAGE,
            Self::Budget(_)
            | Self::Timeout { .. }
            | Self::Provider { .. }
            | Self::Synthesis { .. } => FALLBACK_MESSAGE,
        }
    }
}
