//! Text-to-speech behind a timeout, written to disk only once complete.
//!
//! The timeout bounds the upstream exchange; the local write follows it and is never cancelled
//! halfway.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use tokio::fs;
use tracing::debug;
use uuid::Uuid;
use voicegate_core::config::SpeechConfig;
use voicegate_core::errors::CallError;

use crate::providers::truncate_body;

pub const AUDIO_ROUTE: &str = "audio";
pub const AUDIO_EXTENSION: &str = "mp3";

const RANDOM_SUFFIX_LEN: usize = 12;

/// A complete audio file and the absolute URL it is served from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AudioReference {
    pub url: String,
    pub file_name: String,
    pub path: PathBuf,
}

#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// `prefix` is a sanitised call identifier; the adapter adds the unique part.
    async fn synthesize(&self, text: &str, prefix: &str) -> Result<AudioReference, CallError>;
}

#[derive(Clone, Debug)]
pub struct ElevenLabsSynthesizer {
    client: Client,
    api_key: Option<SecretString>,
    base_url: String,
    voice_id: String,
    model: String,
    timeout: Duration,
    max_chars: usize,
    audio_dir: PathBuf,
    public_base_url: String,
}

impl ElevenLabsSynthesizer {
    pub fn from_config(client: Client, config: &SpeechConfig) -> Self {
        Self {
            client,
            api_key: config.api_key.clone(),
            base_url: config.base_url.clone(),
            voice_id: config.voice_id.clone(),
            model: config.model.clone(),
            timeout: config.timeout(),
            max_chars: config.max_chars,
            audio_dir: config.audio_dir.clone(),
            public_base_url: config.public_base_url.clone(),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn fetch_audio(&self, api_key: &str, text: &str) -> Result<Vec<u8>, CallError> {
        let url = format!(
            "{}/v1/text-to-speech/{}",
            self.base_url.trim_end_matches('/'),
            self.voice_id
        );
        let response = self
            .client
            .post(url)
            .header("xi-api-key", api_key)
            .header(reqwest::header::ACCEPT, "audio/mpeg")
            .json(&json!({ "text": text, "model_id": self.model }))
            .send()
            .await
            .map_err(|error| CallError::synthesis(format!("request failed: {error}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CallError::synthesis(format!(
                "upstream returned {}: {}",
                status.as_u16(),
                truncate_body(&body)
            )));
        }

        let audio = response
            .bytes()
            .await
            .map_err(|error| CallError::synthesis(format!("audio body unreadable: {error}")))?;
        if audio.is_empty() {
            return Err(CallError::synthesis("upstream returned no audio"));
        }
        Ok(audio.to_vec())
    }
}

#[async_trait]
impl SpeechSynthesizer for ElevenLabsSynthesizer {
    async fn synthesize(&self, text: &str, prefix: &str) -> Result<AudioReference, CallError> {
        let api_key = self
            .api_key
            .as_ref()
            .map(|key| key.expose_secret())
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| CallError::synthesis("missing api credentials"))?;
        let text = truncate_chars(text, self.max_chars);

        let audio = match tokio::time::timeout(self.timeout, self.fetch_audio(api_key, text)).await
        {
            Ok(result) => result?,
            Err(_) => {
                return Err(CallError::synthesis(format!(
                    "timed out after {}ms",
                    self.timeout.as_millis()
                )))
            }
        };

        let file_name = audio_file_name(prefix);
        let bytes = audio.len();
        // Detached so that dropping this future cannot interrupt the write.
        let store = {
            let dir = self.audio_dir.clone();
            let name = file_name.clone();
            tokio::spawn(async move { store_atomically(&dir, &name, &audio).await })
        };
        let path = store
            .await
            .map_err(|error| CallError::synthesis(format!("audio write aborted: {error}")))??;
        debug!(
            event_name = "voice.speech.stored",
            correlation_id = %prefix,
            file_name = %file_name,
            bytes,
            "synthesized audio stored"
        );

        Ok(AudioReference { url: audio_url(&self.public_base_url, &file_name), file_name, path })
    }
}

/// `{prefix}-{yyyymmddHHMMSSfff}-{random}.mp3`.
pub fn audio_file_name(prefix: &str) -> String {
    let stamp = Utc::now().format("%Y%m%d%H%M%S%3f");
    let random = Uuid::new_v4().simple().to_string();
    format!("{prefix}-{stamp}-{}.{AUDIO_EXTENSION}", &random[..RANDOM_SUFFIX_LEN])
}

pub fn audio_url(public_base_url: &str, file_name: &str) -> String {
    format!("{}/{AUDIO_ROUTE}/{file_name}", public_base_url.trim_end_matches('/'))
}

fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => &text[..cut],
        None => text,
    }
}

async fn store_atomically(dir: &Path, file_name: &str, audio: &[u8]) -> Result<PathBuf, CallError> {
    fs::create_dir_all(dir)
        .await
        .map_err(|error| CallError::synthesis(format!("audio dir unavailable: {error}")))?;

    let final_path = dir.join(file_name);
    let partial_path = dir.join(format!(".{file_name}.part"));
    if let Err(error) = fs::write(&partial_path, audio).await {
        let _ = fs::remove_file(&partial_path).await;
        return Err(CallError::synthesis(format!("audio write failed: {error}")));
    }
    if let Err(error) = fs::rename(&partial_path, &final_path).await {
        let _ = fs::remove_file(&partial_path).await;
        return Err(CallError::synthesis(format!("audio rename failed: {error}")));
    }

    Ok(final_path)
}
