//! Caller input pulled out of a verified webhook.
//!
//! Each field is read through a fixed, ordered list of parameter names; the first
//! non-blank value wins.

use std::str::FromStr;

use rust_decimal::Decimal;
use serde_json::Value;

use crate::signature::VerifiedRequest;

pub const UTTERANCE_FIELDS: [&str; 6] =
    ["SpeechResult", "Body", "TranscriptionText", "utterance", "text", "message"];
pub const INTENT_FIELDS: [&str; 2] = ["intent", "Intent"];
pub const CALL_ID_FIELDS: [&str; 3] = ["CallSid", "call_id", "conversation_id"];
pub const CEILING_FIELDS: [&str; 2] = ["max_cost_cents", "budget_cents"];

pub const DEFAULT_UTTERANCE: &str = "Hello";
pub const DEFAULT_CALL_ID: &str = "call";

const MAX_CALL_ID_LEN: usize = 64;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallPayload {
    pub utterance: String,
    pub intent: Option<String>,
    pub call_id: String,
    pub ceiling_override: Option<Decimal>,
}

impl CallPayload {
    pub fn from_request(request: &VerifiedRequest) -> Self {
        Self::from_params(request.params())
    }

    pub fn from_params(params: &[(String, String)]) -> Self {
        let utterance =
            first_present(params, &UTTERANCE_FIELDS).unwrap_or(DEFAULT_UTTERANCE).to_string();
        let intent = first_present(params, &INTENT_FIELDS).map(str::to_string);
        let call_id = first_present(params, &CALL_ID_FIELDS)
            .map(sanitize_call_id)
            .filter(|call_id| !call_id.is_empty())
            .unwrap_or_else(|| DEFAULT_CALL_ID.to_string());
        let ceiling_override = first_present(params, &CEILING_FIELDS)
            .and_then(|raw| Decimal::from_str(raw).ok())
            .filter(|ceiling| *ceiling > Decimal::ZERO);

        Self { utterance, intent, call_id, ceiling_override }
    }
}

fn first_present<'a>(params: &'a [(String, String)], fields: &[&str]) -> Option<&'a str> {
    fields.iter().find_map(|field| {
        params
            .iter()
            .filter(|(name, _)| name == field)
            .map(|(_, value)| value.trim())
            .find(|value| !value.is_empty())
    })
}

/// Keeps only characters that are safe in a file name.
pub fn sanitize_call_id(raw: &str) -> String {
    raw.chars()
        .filter(|ch| ch.is_ascii_alphanumeric() || *ch == '-' || *ch == '_')
        .take(MAX_CALL_ID_LEN)
        .collect()
}

/// Flattens a top-level JSON object into the same ordered multimap a form body produces.
pub fn flatten_json_params(body: &Value) -> Vec<(String, String)> {
    let Some(object) = body.as_object() else {
        return Vec::new();
    };

    let mut params = Vec::new();
    for (name, value) in object {
        match value {
            Value::Array(items) => {
                for item in items {
                    if let Some(scalar) = scalar_text(item) {
                        params.push((name.clone(), scalar));
                    }
                }
            }
            other => {
                if let Some(scalar) = scalar_text(other) {
                    params.push((name.clone(), scalar));
                }
            }
        }
    }
    params
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}
