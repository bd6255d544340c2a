use std::path::PathBuf;
use std::time::Duration;

use reqwest::Client;
use thiserror::Error;
use tracing::{info, warn};
use voicegate_agent::pipeline::CallPipeline;
use voicegate_core::config::{AppConfig, ConfigError, LoadOptions};
use voicegate_core::signature::WebhookVerifier;

use crate::app::AppState;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

pub struct Application {
    pub config: AppConfig,
    pub state: AppState,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("http client could not be built: {0}")]
    HttpClient(#[source] reqwest::Error),
    #[error("audio directory `{path}` could not be created: {source}")]
    AudioDir { path: PathBuf, source: std::io::Error },
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let audio_dir = config.speech.audio_dir.clone();
    tokio::fs::create_dir_all(&audio_dir)
        .await
        .map_err(|source| BootstrapError::AudioDir { path: audio_dir.clone(), source })?;

    let client = Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .user_agent(concat!("voicegate/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(BootstrapError::HttpClient)?;

    if !config.webhook.has_auth_token() {
        warn!(
            event_name = "system.bootstrap.webhook_secret_missing",
            correlation_id = "bootstrap",
            "webhook auth token is not configured; every webhook will be rejected"
        );
    }

    let verifier =
        WebhookVerifier::new(config.webhook.auth_token.clone(), config.webhook.public_url.clone());
    let pipeline = CallPipeline::from_config(&config, client);
    info!(
        event_name = "system.bootstrap.pipeline_ready",
        correlation_id = "bootstrap",
        overall_timeout_ms = pipeline.overall_timeout().as_millis() as u64,
        audio_dir = %audio_dir.display(),
        "call pipeline initialized"
    );

    Ok(Application { state: AppState::new(verifier, pipeline, audio_dir), config })
}
