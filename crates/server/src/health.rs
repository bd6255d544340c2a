use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::Serialize;

pub const SERVICE_NAME: &str = "voicegate-server";

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub checked_at: String,
}

pub async fn health() -> (StatusCode, Json<HealthResponse>) {
    let payload = HealthResponse {
        status: "ok",
        service: SERVICE_NAME,
        checked_at: Utc::now().to_rfc3339(),
    };
    (StatusCode::OK, Json(payload))
}
