pub mod budget;
pub mod config;
pub mod deadline;
pub mod errors;
pub mod intent;
pub mod markup;
pub mod payload;
pub mod redact;
pub mod signature;

pub use budget::{Budget, Charge, CharacterHeuristic, CostEstimator, RateCard};
pub use config::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat, ProviderSlot};
pub use deadline::Deadline;
pub use errors::{
    AuthenticationError, BudgetError, CallError, FALLBACK_MESSAGE, UNAUTHORIZED_MESSAGE,
};
pub use intent::IntentClass;
pub use markup::{escape_markup, VoiceResponse};
pub use payload::{flatten_json_params, CallPayload};
pub use redact::redact_pii;
pub use signature::{
    canonical_payload, compute_signature, InboundRequest, VerifiedRequest, WebhookVerifier,
    SIGNATURE_HEADER,
};
