use std::io::ErrorKind;
use std::path::Path;

use axum::extract::{Path as RoutePath, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use tracing::warn;
use voicegate_agent::speech::AUDIO_EXTENSION;

use crate::app::AppState;

/// Reduces a requested name to its last path component. Hidden and partial files,
/// and anything that is not an audio clip, are never served.
pub fn normalize_file_name(requested: &str) -> Option<String> {
    let base = Path::new(requested).file_name()?.to_str()?;
    let is_clip = Path::new(base).extension().is_some_and(|extension| extension == AUDIO_EXTENSION);
    (!base.starts_with('.') && is_clip).then(|| base.to_string())
}

pub async fn serve_audio(
    State(state): State<AppState>,
    RoutePath(requested): RoutePath<String>,
) -> Response {
    let Some(file_name) = normalize_file_name(&requested) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    match tokio::fs::read(state.audio_dir.join(&file_name)).await {
        Ok(audio) => {
            (StatusCode::OK, [(header::CONTENT_TYPE, "audio/mpeg")], audio).into_response()
        }
        Err(error) if error.kind() == ErrorKind::NotFound => StatusCode::NOT_FOUND.into_response(),
        Err(error) => {
            warn!(
                event_name = "voice.audio.read_failed",
                correlation_id = %file_name,
                error = %error,
                "audio file could not be read"
            );
            StatusCode::NOT_FOUND.into_response()
        }
    }
}
