use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::budget::RateCard;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub webhook: WebhookConfig,
    pub budget: BudgetConfig,
    pub providers: ProvidersConfig,
    pub speech: SpeechConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct WebhookConfig {
    pub auth_token: Option<SecretString>,
    pub public_url: Option<String>,
}

#[derive(Clone, Debug)]
pub struct BudgetConfig {
    pub default_ceiling_cents: Decimal,
    pub max_ceiling_cents: Decimal,
    pub chars_per_unit: u32,
}

#[derive(Clone, Debug)]
pub struct ProvidersConfig {
    pub stage_timeout_ms: u64,
    pub call_timeout_ms: u64,
    pub conversational: ProviderConfig,
    pub code: ProviderConfig,
    pub research: ProviderConfig,
}

#[derive(Clone, Debug)]
pub struct ProviderConfig {
    pub api_key: Option<SecretString>,
    pub base_url: String,
    pub model: String,
    pub input_rate_cents: Decimal,
    pub output_rate_cents: Decimal,
    pub max_output_units: u32,
}

#[derive(Clone, Debug)]
pub struct SpeechConfig {
    pub api_key: Option<SecretString>,
    pub base_url: String,
    pub voice_id: String,
    pub model: String,
    pub timeout_ms: u64,
    pub max_chars: usize,
    pub audio_dir: PathBuf,
    pub public_base_url: String,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

/// Which provider block an override or env key addresses.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProviderSlot {
    Conversational,
    Code,
    Research,
}

impl ProviderSlot {
    pub const ALL: [ProviderSlot; 3] = [Self::Conversational, Self::Code, Self::Research];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Conversational => "conversational",
            Self::Code => "code",
            Self::Research => "research",
        }
    }

    pub fn env_prefix(&self) -> &'static str {
        match self {
            Self::Conversational => "VOICEGATE_CONVERSATIONAL",
            Self::Code => "VOICEGATE_CODE",
            Self::Research => "VOICEGATE_RESEARCH",
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub bind_address: Option<String>,
    pub port: Option<u16>,
    pub log_level: Option<String>,
    pub webhook_auth_token: Option<String>,
    pub webhook_public_url: Option<String>,
    pub default_ceiling_cents: Option<Decimal>,
    pub stage_timeout_ms: Option<u64>,
    pub call_timeout_ms: Option<u64>,
    pub speech_timeout_ms: Option<u64>,
    pub audio_dir: Option<PathBuf>,
    pub public_base_url: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 3000,
                graceful_shutdown_secs: 10,
            },
            webhook: WebhookConfig { auth_token: None, public_url: None },
            budget: BudgetConfig {
                default_ceiling_cents: Decimal::new(50, 0),
                max_ceiling_cents: Decimal::new(500, 0),
                chars_per_unit: 4,
            },
            providers: ProvidersConfig {
                stage_timeout_ms: 8_000,
                call_timeout_ms: 6_000,
                conversational: ProviderConfig {
                    api_key: None,
                    base_url: "https://api.openai.com/v1".to_string(),
                    model: "gpt-4o-mini".to_string(),
                    input_rate_cents: Decimal::new(30, 0),
                    output_rate_cents: Decimal::new(60, 0),
                    max_output_units: 300,
                },
                code: ProviderConfig {
                    api_key: None,
                    base_url: "https://api.anthropic.com/v1".to_string(),
                    model: "claude-3-5-haiku-latest".to_string(),
                    input_rate_cents: Decimal::new(50, 0),
                    output_rate_cents: Decimal::new(150, 0),
                    max_output_units: 400,
                },
                research: ProviderConfig {
                    api_key: None,
                    base_url: "https://api.perplexity.ai".to_string(),
                    model: "sonar".to_string(),
                    input_rate_cents: Decimal::new(40, 0),
                    output_rate_cents: Decimal::new(60, 0),
                    max_output_units: 600,
                },
            },
            speech: SpeechConfig {
                api_key: None,
                base_url: "https://api.elevenlabs.io".to_string(),
                voice_id: "21m00Tcm4TlvDq8Ikwam".to_string(),
                model: "eleven_turbo_v2_5".to_string(),
                timeout_ms: 4_000,
                max_chars: 1_000,
                audio_dir: PathBuf::from("audio"),
                public_base_url: "http://127.0.0.1:3000".to_string(),
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl BudgetConfig {
    /// Per-request ceiling: the caller's override if any, capped at `max_ceiling_cents`.
    pub fn ceiling_for(&self, requested: Option<Decimal>) -> Decimal {
        match requested {
            Some(requested) if requested > Decimal::ZERO => requested.min(self.max_ceiling_cents),
            _ => self.default_ceiling_cents,
        }
    }
}

impl ProvidersConfig {
    pub fn stage_timeout(&self) -> Duration {
        Duration::from_millis(self.stage_timeout_ms)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    pub fn slot(&self, slot: ProviderSlot) -> &ProviderConfig {
        match slot {
            ProviderSlot::Conversational => &self.conversational,
            ProviderSlot::Code => &self.code,
            ProviderSlot::Research => &self.research,
        }
    }

    fn slot_mut(&mut self, slot: ProviderSlot) -> &mut ProviderConfig {
        match slot {
            ProviderSlot::Conversational => &mut self.conversational,
            ProviderSlot::Code => &mut self.code,
            ProviderSlot::Research => &mut self.research,
        }
    }
}

impl ProviderConfig {
    pub fn rate_card(&self) -> RateCard {
        RateCard::new(self.input_rate_cents, self.output_rate_cents)
    }

    pub fn has_credentials(&self) -> bool {
        has_secret(self.api_key.as_ref())
    }
}

impl SpeechConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn has_credentials(&self) -> bool {
        has_secret(self.api_key.as_ref())
    }
}

impl WebhookConfig {
    pub fn has_auth_token(&self) -> bool {
        has_secret(self.auth_token.as_ref())
    }
}

fn has_secret(secret: Option<&SecretString>) -> bool {
    secret.map(|value| !value.expose_secret().trim().is_empty()).unwrap_or(false)
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("voicegate.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(webhook) = patch.webhook {
            if let Some(webhook_auth_token_value) = webhook.auth_token {
                self.webhook.auth_token = Some(secret_value(webhook_auth_token_value));
            }
            if let Some(public_url) = webhook.public_url {
                self.webhook.public_url = Some(public_url);
            }
        }

        if let Some(budget) = patch.budget {
            if let Some(default_ceiling_cents) = budget.default_ceiling_cents {
                self.budget.default_ceiling_cents = default_ceiling_cents;
            }
            if let Some(max_ceiling_cents) = budget.max_ceiling_cents {
                self.budget.max_ceiling_cents = max_ceiling_cents;
            }
            if let Some(chars_per_unit) = budget.chars_per_unit {
                self.budget.chars_per_unit = chars_per_unit;
            }
        }

        if let Some(providers) = patch.providers {
            if let Some(stage_timeout_ms) = providers.stage_timeout_ms {
                self.providers.stage_timeout_ms = stage_timeout_ms;
            }
            if let Some(call_timeout_ms) = providers.call_timeout_ms {
                self.providers.call_timeout_ms = call_timeout_ms;
            }
            let blocks = [
                (ProviderSlot::Conversational, providers.conversational),
                (ProviderSlot::Code, providers.code),
                (ProviderSlot::Research, providers.research),
            ];
            for (slot, block) in blocks {
                if let Some(block) = block {
                    block.apply_to(self.providers.slot_mut(slot));
                }
            }
        }

        if let Some(speech) = patch.speech {
            if let Some(speech_api_key_value) = speech.api_key {
                self.speech.api_key = Some(secret_value(speech_api_key_value));
            }
            if let Some(base_url) = speech.base_url {
                self.speech.base_url = base_url;
            }
            if let Some(voice_id) = speech.voice_id {
                self.speech.voice_id = voice_id;
            }
            if let Some(model) = speech.model {
                self.speech.model = model;
            }
            if let Some(timeout_ms) = speech.timeout_ms {
                self.speech.timeout_ms = timeout_ms;
            }
            if let Some(max_chars) = speech.max_chars {
                self.speech.max_chars = max_chars;
            }
            if let Some(audio_dir) = speech.audio_dir {
                self.speech.audio_dir = audio_dir;
            }
            if let Some(public_base_url) = speech.public_base_url {
                self.speech.public_base_url = public_base_url;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("VOICEGATE_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("VOICEGATE_SERVER_PORT") {
            self.server.port = parse_env("VOICEGATE_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("VOICEGATE_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_env("VOICEGATE_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        if let Some(value) = read_env("VOICEGATE_WEBHOOK_AUTH_TOKEN") {
            self.webhook.auth_token = Some(secret_value(value));
        }
        if let Some(value) = read_env("VOICEGATE_WEBHOOK_PUBLIC_URL") {
            self.webhook.public_url = Some(value);
        }

        if let Some(value) = read_env("VOICEGATE_BUDGET_DEFAULT_CEILING_CENTS") {
            self.budget.default_ceiling_cents =
                parse_env("VOICEGATE_BUDGET_DEFAULT_CEILING_CENTS", &value)?;
        }
        if let Some(value) = read_env("VOICEGATE_BUDGET_MAX_CEILING_CENTS") {
            self.budget.max_ceiling_cents =
                parse_env("VOICEGATE_BUDGET_MAX_CEILING_CENTS", &value)?;
        }
        if let Some(value) = read_env("VOICEGATE_BUDGET_CHARS_PER_UNIT") {
            self.budget.chars_per_unit = parse_env("VOICEGATE_BUDGET_CHARS_PER_UNIT", &value)?;
        }

        if let Some(value) = read_env("VOICEGATE_PROVIDER_TIMEOUT_MS") {
            self.providers.stage_timeout_ms = parse_env("VOICEGATE_PROVIDER_TIMEOUT_MS", &value)?;
        }
        if let Some(value) = read_env("VOICEGATE_PROVIDER_CALL_TIMEOUT_MS") {
            self.providers.call_timeout_ms =
                parse_env("VOICEGATE_PROVIDER_CALL_TIMEOUT_MS", &value)?;
        }
        for slot in ProviderSlot::ALL {
            apply_provider_env(slot, self.providers.slot_mut(slot))?;
        }

        if let Some(value) = read_env("VOICEGATE_SPEECH_API_KEY") {
            self.speech.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("VOICEGATE_SPEECH_BASE_URL") {
            self.speech.base_url = value;
        }
        if let Some(value) = read_env("VOICEGATE_SPEECH_VOICE_ID") {
            self.speech.voice_id = value;
        }
        if let Some(value) = read_env("VOICEGATE_SPEECH_MODEL") {
            self.speech.model = value;
        }
        if let Some(value) = read_env("VOICEGATE_SPEECH_TIMEOUT_MS") {
            self.speech.timeout_ms = parse_env("VOICEGATE_SPEECH_TIMEOUT_MS", &value)?;
        }
        if let Some(value) = read_env("VOICEGATE_SPEECH_MAX_CHARS") {
            self.speech.max_chars = parse_env("VOICEGATE_SPEECH_MAX_CHARS", &value)?;
        }
        if let Some(value) = read_env("VOICEGATE_SPEECH_AUDIO_DIR") {
            self.speech.audio_dir = PathBuf::from(value);
        }
        if let Some(value) = read_env("VOICEGATE_PUBLIC_BASE_URL") {
            self.speech.public_base_url = value;
        }

        let log_level =
            read_env("VOICEGATE_LOGGING_LEVEL").or_else(|| read_env("VOICEGATE_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("VOICEGATE_LOGGING_FORMAT").or_else(|| read_env("VOICEGATE_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(bind_address) = overrides.bind_address {
            self.server.bind_address = bind_address;
        }
        if let Some(port) = overrides.port {
            self.server.port = port;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(webhook_auth_token) = overrides.webhook_auth_token {
            self.webhook.auth_token = Some(secret_value(webhook_auth_token));
        }
        if let Some(public_url) = overrides.webhook_public_url {
            self.webhook.public_url = Some(public_url);
        }
        if let Some(default_ceiling_cents) = overrides.default_ceiling_cents {
            self.budget.default_ceiling_cents = default_ceiling_cents;
        }
        if let Some(stage_timeout_ms) = overrides.stage_timeout_ms {
            self.providers.stage_timeout_ms = stage_timeout_ms;
        }
        if let Some(call_timeout_ms) = overrides.call_timeout_ms {
            self.providers.call_timeout_ms = call_timeout_ms;
        }
        if let Some(timeout_ms) = overrides.speech_timeout_ms {
            self.speech.timeout_ms = timeout_ms;
        }
        if let Some(audio_dir) = overrides.audio_dir {
            self.speech.audio_dir = audio_dir;
        }
        if let Some(public_base_url) = overrides.public_base_url {
            self.speech.public_base_url = public_base_url;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_server(&self.server)?;
        validate_webhook(&self.webhook)?;
        validate_budget(&self.budget)?;
        validate_providers(&self.providers)?;
        validate_speech(&self.speech)?;
        validate_stage_timeouts(&self.providers, &self.speech)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn apply_provider_env(
    slot: ProviderSlot,
    provider: &mut ProviderConfig,
) -> Result<(), ConfigError> {
    let prefix = slot.env_prefix();

    if let Some(value) = read_env(&format!("{prefix}_API_KEY")) {
        provider.api_key = Some(secret_value(value));
    }
    if let Some(value) = read_env(&format!("{prefix}_BASE_URL")) {
        provider.base_url = value;
    }
    if let Some(value) = read_env(&format!("{prefix}_MODEL")) {
        provider.model = value;
    }
    let key = format!("{prefix}_INPUT_RATE_CENTS");
    if let Some(value) = read_env(&key) {
        provider.input_rate_cents = parse_env(&key, &value)?;
    }
    let key = format!("{prefix}_OUTPUT_RATE_CENTS");
    if let Some(value) = read_env(&key) {
        provider.output_rate_cents = parse_env(&key, &value)?;
    }
    let key = format!("{prefix}_MAX_OUTPUT_UNITS");
    if let Some(value) = read_env(&key) {
        provider.max_output_units = parse_env(&key, &value)?;
    }

    Ok(())
}

/// The file `load` would read: the explicit path when it exists, otherwise the first
/// of `voicegate.toml` and `config/voicegate.toml` found in the working directory.
pub fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("voicegate.toml"), PathBuf::from("config/voicegate.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_webhook(webhook: &WebhookConfig) -> Result<(), ConfigError> {
    if let Some(public_url) = &webhook.public_url {
        validate_http_url("webhook.public_url", public_url)?;
    }
    Ok(())
}

fn validate_budget(budget: &BudgetConfig) -> Result<(), ConfigError> {
    if budget.default_ceiling_cents <= Decimal::ZERO {
        return Err(ConfigError::Validation(
            "budget.default_ceiling_cents must be greater than zero".to_string(),
        ));
    }

    if budget.default_ceiling_cents > budget.max_ceiling_cents {
        return Err(ConfigError::Validation(
            "budget.default_ceiling_cents must not exceed budget.max_ceiling_cents".to_string(),
        ));
    }

    if budget.chars_per_unit == 0 {
        return Err(ConfigError::Validation(
            "budget.chars_per_unit must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_providers(providers: &ProvidersConfig) -> Result<(), ConfigError> {
    validate_timeout("providers.stage_timeout_ms", providers.stage_timeout_ms)?;
    validate_timeout("providers.call_timeout_ms", providers.call_timeout_ms)?;

    for slot in ProviderSlot::ALL {
        let provider = providers.slot(slot);
        let name = slot.as_str();
        validate_http_url(&format!("providers.{name}.base_url"), &provider.base_url)?;

        if provider.model.trim().is_empty() {
            return Err(ConfigError::Validation(format!("providers.{name}.model is required")));
        }
        if provider.input_rate_cents < Decimal::ZERO || provider.output_rate_cents < Decimal::ZERO
        {
            return Err(ConfigError::Validation(format!(
                "providers.{name} rates must not be negative"
            )));
        }
        if provider.max_output_units == 0 {
            return Err(ConfigError::Validation(format!(
                "providers.{name}.max_output_units must be greater than zero"
            )));
        }
    }

    Ok(())
}

fn validate_speech(speech: &SpeechConfig) -> Result<(), ConfigError> {
    validate_timeout("speech.timeout_ms", speech.timeout_ms)?;
    validate_http_url("speech.base_url", &speech.base_url)?;
    validate_http_url("speech.public_base_url", &speech.public_base_url)?;

    if speech.max_chars == 0 {
        return Err(ConfigError::Validation(
            "speech.max_chars must be greater than zero".to_string(),
        ));
    }

    if speech.audio_dir.as_os_str().is_empty() {
        return Err(ConfigError::Validation("speech.audio_dir is required".to_string()));
    }

    Ok(())
}

/// Synthesis must be the shorter of the two stages.
fn validate_stage_timeouts(
    providers: &ProvidersConfig,
    speech: &SpeechConfig,
) -> Result<(), ConfigError> {
    if speech.timeout_ms >= providers.stage_timeout_ms {
        return Err(ConfigError::Validation(format!(
            "speech.timeout_ms ({}) must be less than providers.stage_timeout_ms ({})",
            speech.timeout_ms, providers.stage_timeout_ms
        )));
    }
    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn validate_timeout(key: &str, value_ms: u64) -> Result<(), ConfigError> {
    if value_ms == 0 || value_ms > 120_000 {
        return Err(ConfigError::Validation(format!("{key} must be in range 1..=120000")));
    }
    Ok(())
}

fn validate_http_url(key: &str, value: &str) -> Result<(), ConfigError> {
    if !value.starts_with("http://") && !value.starts_with("https://") {
        return Err(ConfigError::Validation(format!("{key} must start with http:// or https://")));
    }
    Ok(())
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_env<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse::<T>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    server: Option<ServerPatch>,
    webhook: Option<WebhookPatch>,
    budget: Option<BudgetPatch>,
    providers: Option<ProvidersPatch>,
    speech: Option<SpeechPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct WebhookPatch {
    auth_token: Option<String>,
    public_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct BudgetPatch {
    default_ceiling_cents: Option<Decimal>,
    max_ceiling_cents: Option<Decimal>,
    chars_per_unit: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct ProvidersPatch {
    stage_timeout_ms: Option<u64>,
    call_timeout_ms: Option<u64>,
    conversational: Option<ProviderPatch>,
    code: Option<ProviderPatch>,
    research: Option<ProviderPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct ProviderPatch {
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    input_rate_cents: Option<Decimal>,
    output_rate_cents: Option<Decimal>,
    max_output_units: Option<u32>,
}

impl ProviderPatch {
    fn apply_to(self, provider: &mut ProviderConfig) {
        if let Some(provider_api_key_value) = self.api_key {
            provider.api_key = Some(secret_value(provider_api_key_value));
        }
        if let Some(base_url) = self.base_url {
            provider.base_url = base_url;
        }
        if let Some(model) = self.model {
            provider.model = model;
        }
        if let Some(input_rate_cents) = self.input_rate_cents {
            provider.input_rate_cents = input_rate_cents;
        }
        if let Some(output_rate_cents) = self.output_rate_cents {
            provider.output_rate_cents = output_rate_cents;
        }
        if let Some(max_output_units) = self.max_output_units {
            provider.max_output_units = max_output_units;
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct SpeechPatch {
    api_key: Option<String>,
    base_url: Option<String>,
    voice_id: Option<String>,
    model: Option<String>,
    timeout_ms: Option<u64>,
    max_chars: Option<usize>,
    audio_dir: Option<PathBuf>,
    public_base_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use rust_decimal::Decimal;
    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn defaults_load_without_any_credentials() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let config = AppConfig::load(LoadOptions::default())
            .map_err(|err| format!("config load failed: {err}"))?;

        ensure(!config.webhook.has_auth_token(), "no webhook secret by default")?;
        ensure(!config.providers.conversational.has_credentials(), "no provider key by default")?;
        ensure(config.budget.default_ceiling_cents == Decimal::new(50, 0), "default ceiling")?;
        ensure(
            config.speech.timeout_ms < config.providers.stage_timeout_ms,
            "synthesis deadline should be shorter than the provider deadline",
        )
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_VOICEGATE_WEBHOOK_TOKEN", "token-from-env");
        env::set_var("TEST_VOICEGATE_RESEARCH_KEY", "pplx-from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("voicegate.toml");
            fs::write(
                &path,
                r#"
[webhook]
auth_token = "${TEST_VOICEGATE_WEBHOOK_TOKEN}"

[providers.research]
api_key = "${TEST_VOICEGATE_RESEARCH_KEY}"
input_rate_cents = 0.25
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config
                    .webhook
                    .auth_token
                    .as_ref()
                    .is_some_and(|token| token.expose_secret() == "token-from-env"),
                "webhook token should be loaded from environment",
            )?;
            ensure(
                config.providers.research.has_credentials(),
                "research key should be loaded from environment",
            )?;
            ensure(
                config.providers.research.input_rate_cents == Decimal::new(25, 2),
                "research input rate should come from the file",
            )?;
            Ok(())
        })();

        clear_vars(&["TEST_VOICEGATE_WEBHOOK_TOKEN", "TEST_VOICEGATE_RESEARCH_KEY"]);
        result
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("VOICEGATE_LOG_LEVEL", "warn");
        env::set_var("VOICEGATE_LOG_FORMAT", "pretty");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.logging.level == "warn", "warning log level should be set from env var")?;
            ensure(
                matches!(config.logging.format, LogFormat::Pretty),
                "pretty logging format should be set from env var",
            )?;
            Ok(())
        })();

        clear_vars(&["VOICEGATE_LOG_LEVEL", "VOICEGATE_LOG_FORMAT"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("VOICEGATE_PROVIDER_TIMEOUT_MS", "7000");
        env::set_var("VOICEGATE_CODE_MODEL", "model-from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("voicegate.toml");
            fs::write(
                &path,
                r#"
[providers]
stage_timeout_ms = 5000

[providers.code]
model = "model-from-file"

[budget]
default_ceiling_cents = 20

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    default_ceiling_cents: Some(Decimal::new(30, 0)),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.budget.default_ceiling_cents == Decimal::new(30, 0),
                "override ceiling should win",
            )?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            ensure(config.providers.stage_timeout_ms == 7000, "env timeout should win over file")?;
            ensure(config.providers.code.model == "model-from-env", "env model should win")?;
            Ok(())
        })();

        clear_vars(&["VOICEGATE_PROVIDER_TIMEOUT_MS", "VOICEGATE_CODE_MODEL"]);
        result
    }

    #[test]
    fn invalid_env_number_is_reported_with_its_key() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("VOICEGATE_SPEECH_TIMEOUT_MS", "soon");

        let result = (|| -> Result<(), String> {
            match AppConfig::load(LoadOptions::default()) {
                Ok(_) => Err("expected env parse failure".to_string()),
                Err(ConfigError::InvalidEnvOverride { key, .. }) => {
                    ensure(key == "VOICEGATE_SPEECH_TIMEOUT_MS", "error should name the env key")
                }
                Err(other) => Err(format!("unexpected error: {other}")),
            }
        })();

        clear_vars(&["VOICEGATE_SPEECH_TIMEOUT_MS"]);
        result
    }

    #[test]
    fn validation_fails_fast_with_actionable_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let error = match AppConfig::load(LoadOptions {
            overrides: ConfigOverrides {
                public_base_url: Some("ftp://audio.example.com".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        }) {
            Ok(_) => {
                return Err("expected validation failure but config load succeeded".to_string())
            }
            Err(error) => error,
        };
        let has_message = matches!(
            error,
            ConfigError::Validation(ref message) if message.contains("speech.public_base_url")
        );
        ensure(has_message, "validation failure should mention speech.public_base_url")
    }

    #[test]
    fn default_ceiling_above_cap_is_rejected() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let result = AppConfig::load(LoadOptions {
            overrides: ConfigOverrides {
                default_ceiling_cents: Some(Decimal::new(10_000, 0)),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        });

        ensure(
            matches!(result, Err(ConfigError::Validation(ref message)) if message.contains("max_ceiling_cents")),
            "ceiling above the cap should fail validation",
        )
    }

    #[test]
    fn speech_timeout_must_be_shorter_than_routing_stage() {
        let mut config = AppConfig::default();
        config.speech.timeout_ms = config.providers.stage_timeout_ms;

        let error = config.validate().expect_err("equal timeouts should be rejected");
        assert!(
            matches!(error, ConfigError::Validation(ref message) if message.contains("speech.timeout_ms") && message.contains("providers.stage_timeout_ms")),
            "{error}"
        );

        config.speech.timeout_ms = config.providers.stage_timeout_ms - 1;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn ceiling_override_is_capped() {
        let budget = AppConfig::default().budget;

        assert_eq!(budget.ceiling_for(None), Decimal::new(50, 0));
        assert_eq!(budget.ceiling_for(Some(Decimal::new(12, 0))), Decimal::new(12, 0));
        assert_eq!(budget.ceiling_for(Some(Decimal::new(9_999, 0))), Decimal::new(500, 0));
        assert_eq!(budget.ceiling_for(Some(Decimal::ZERO)), Decimal::new(50, 0));
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("VOICEGATE_WEBHOOK_AUTH_TOKEN", "webhook-secret-value");
        env::set_var("VOICEGATE_SPEECH_API_KEY", "speech-secret-value");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");

            ensure(
                !debug.contains("webhook-secret-value"),
                "debug output should not contain the webhook secret",
            )?;
            ensure(
                !debug.contains("speech-secret-value"),
                "debug output should not contain the speech key",
            )?;
            ensure(
                matches!(config.logging.format, LogFormat::Compact),
                "default logging format should be compact",
            )?;
            Ok(())
        })();

        clear_vars(&["VOICEGATE_WEBHOOK_AUTH_TOKEN", "VOICEGATE_SPEECH_API_KEY"]);
        result
    }
}
