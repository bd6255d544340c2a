use voicegate_core::errors::CallError;
use voicegate_core::markup::VoiceResponse;

use crate::providers::ProviderResult;
use crate::speech::AudioReference;

/// Everything that happened to one call before a reply is chosen.
#[derive(Debug)]
pub enum CallOutcome {
    Unauthorized,
    RouteFailed(CallError),
    /// `audio` is `None` when synthesis was never attempted.
    Answered { result: ProviderResult, audio: Option<Result<AudioReference, CallError>> },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ComposeDecision {
    Deliver(VoiceResponse),
    Deny { reason_code: &'static str, response: VoiceResponse },
    Degrade { reason_code: &'static str, response: VoiceResponse, fallback_path: &'static str },
}

impl ComposeDecision {
    pub fn response(&self) -> &VoiceResponse {
        match self {
            Self::Deliver(response)
            | Self::Deny { response, .. }
            | Self::Degrade { response, .. } => response,
        }
    }

    pub fn into_response(self) -> VoiceResponse {
        match self {
            Self::Deliver(response)
            | Self::Deny { response, .. }
            | Self::Degrade { response, .. } => response,
        }
    }

    pub fn reason_code(&self) -> Option<&'static str> {
        match self {
            Self::Deliver(_) => None,
            Self::Deny { reason_code, .. } | Self::Degrade { reason_code, .. } => {
                Some(*reason_code)
            }
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Deny { .. })
    }
}

/// Only an answer with text is worth sending to synthesis.
pub fn needs_synthesis(result: &ProviderResult) -> bool {
    !result.is_empty()
}

/// Picks the reply: audio, then the answer as spoken text, then the fixed message.
pub fn compose(outcome: CallOutcome) -> ComposeDecision {
    match outcome {
        CallOutcome::Unauthorized => ComposeDecision::Deny {
            reason_code: "unauthorized",
            response: VoiceResponse::Unauthorized,
        },
        CallOutcome::RouteFailed(error) => ComposeDecision::Degrade {
            reason_code: error.kind(),
            response: VoiceResponse::say(error.user_message()),
            fallback_path: "fixed_message",
        },
        CallOutcome::Answered { result, .. } if result.is_empty() => ComposeDecision::Degrade {
            reason_code: "empty_answer",
            response: VoiceResponse::fallback(),
            fallback_path: "fixed_message",
        },
        CallOutcome::Answered { audio: Some(Ok(audio)), .. } if !audio.url.is_empty() => {
            ComposeDecision::Deliver(VoiceResponse::play(audio.url))
        }
        CallOutcome::Answered { result, audio: Some(Err(error)) } => ComposeDecision::Degrade {
            reason_code: error.kind(),
            response: VoiceResponse::say(result.text),
            fallback_path: "spoken_text",
        },
        CallOutcome::Answered { result, .. } => ComposeDecision::Degrade {
            reason_code: "no_audio",
            response: VoiceResponse::say(result.text),
            fallback_path: "spoken_text",
        },
    }
}
