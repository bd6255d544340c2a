use std::path::PathBuf;
use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use voicegate_agent::pipeline::CallPipeline;
use voicegate_core::signature::WebhookVerifier;

use crate::{audio, health, voice};

#[derive(Clone)]
pub struct AppState {
    pub verifier: Arc<WebhookVerifier>,
    pub pipeline: Arc<CallPipeline>,
    pub audio_dir: Arc<PathBuf>,
}

impl AppState {
    pub fn new(verifier: WebhookVerifier, pipeline: CallPipeline, audio_dir: PathBuf) -> Self {
        Self {
            verifier: Arc::new(verifier),
            pipeline: Arc::new(pipeline),
            audio_dir: Arc::new(audio_dir),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/voice", post(voice::webhook))
        .route("/audio/{name}", get(audio::serve_audio))
        .route("/health", get(health::health))
        .with_state(state)
}
