//! `POST /voice`: verify, answer, reply with markup.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use serde_json::Value;
use tracing::{debug, error, warn};
use voicegate_agent::composer::{compose, CallOutcome, ComposeDecision};
use voicegate_core::errors::{AuthenticationError, CallError};
use voicegate_core::payload::{flatten_json_params, CallPayload};
use voicegate_core::redact::redact_pii;
use voicegate_core::signature::{InboundRequest, SIGNATURE_HEADER};

use crate::app::AppState;

const MARKUP_CONTENT_TYPE: &str = "text/xml; charset=utf-8";

pub async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    uri: Uri,
    body: Bytes,
) -> Response {
    let request = match inbound_request(&headers, &uri, &body) {
        Ok(request) => request,
        Err(reason) => return reject(&reason),
    };

    let verified = match state.verifier.verify(request) {
        Ok(verified) => verified,
        Err(reason) => return reject(&reason),
    };

    let payload = CallPayload::from_request(&verified);
    debug!(
        event_name = "voice.webhook.received",
        correlation_id = %payload.call_id,
        body = %redact_pii(&String::from_utf8_lossy(&body)),
        "verified webhook received"
    );

    let overall = state.pipeline.overall_timeout();
    let decision = match tokio::time::timeout(overall, state.pipeline.answer(&payload)).await {
        Ok(report) => report.decision,
        Err(_) => {
            let limit_ms = u64::try_from(overall.as_millis()).unwrap_or(u64::MAX);
            error!(
                event_name = "voice.call.overall_timeout",
                correlation_id = %payload.call_id,
                error_kind = "timeout",
                limit_ms,
                "call exceeded the overall deadline; answering with fallback message"
            );
            compose(CallOutcome::RouteFailed(CallError::timeout("call", limit_ms)))
        }
    };

    let status = status_for(&decision);
    let response = decision.into_response();
    let markup = response.render();
    debug!(
        event_name = "voice.webhook.responded",
        correlation_id = %payload.call_id,
        response_shape = response.shape(),
        markup = %redact_pii(&markup),
        "webhook answered"
    );
    markup_response(status, markup)
}

/// Reads the parts of the request the signature covers. Bodies that cannot be read
/// fail verification.
fn inbound_request(
    headers: &HeaderMap,
    uri: &Uri,
    body: &[u8],
) -> Result<InboundRequest, AuthenticationError> {
    let is_json = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|content_type| content_type.trim_start().starts_with("application/json"));

    let params = if is_json {
        let value: Value = serde_json::from_slice(body).map_err(|error| {
            AuthenticationError::MalformedRequest(format!("invalid json body: {error}"))
        })?;
        flatten_json_params(&value)
    } else {
        url::form_urlencoded::parse(body).into_owned().collect()
    };

    Ok(InboundRequest {
        host: header_text(headers, header::HOST.as_str()),
        path_and_query: uri
            .path_and_query()
            .map(|path| path.as_str().to_string())
            .unwrap_or_default(),
        params,
        signature: header_text(headers, SIGNATURE_HEADER),
    })
}

fn header_text(headers: &HeaderMap, name: &str) -> Option<String> {
    headers.get(name).and_then(|value| value.to_str().ok()).map(str::to_string)
}

/// The caller only ever hears the generic message; the reason stays in the log.
fn reject(reason: &AuthenticationError) -> Response {
    warn!(
        event_name = "voice.webhook.unauthorized",
        correlation_id = "unverified",
        reason = %reason,
        "webhook failed verification"
    );
    let decision = compose(CallOutcome::Unauthorized);
    markup_response(status_for(&decision), decision.into_response().render())
}

fn status_for(decision: &ComposeDecision) -> StatusCode {
    if decision.is_unauthorized() {
        StatusCode::FORBIDDEN
    } else {
        StatusCode::OK
    }
}

fn markup_response(status: StatusCode, markup: String) -> Response {
    (status, [(header::CONTENT_TYPE, MARKUP_CONTENT_TYPE)], markup).into_response()
}
