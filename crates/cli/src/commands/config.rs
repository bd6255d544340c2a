use std::env;
use std::fs;
use std::path::Path;

use toml::Value;
use voicegate_core::config::{resolve_config_path, AppConfig, ProviderSlot};

use super::load_options;

struct Entry {
    key: String,
    value: String,
    env_keys: Vec<String>,
}

impl Entry {
    fn new(key: impl Into<String>, value: impl Into<String>, env_keys: &[&str]) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            env_keys: env_keys.iter().map(|key| key.to_string()).collect(),
        }
    }
}

pub fn run(config_path: Option<&Path>) -> String {
    let config = match AppConfig::load(load_options(config_path)) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let file_path = resolve_config_path(config_path);
    let file_doc = load_config_file_doc(file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for entry in entries(&config) {
        let source = field_source(&entry, file_doc.as_ref(), file_path.as_deref());
        lines.push(format!("- {} = {} (source: {source})", entry.key, entry.value));
    }
    lines.join("\n")
}

fn entries(config: &AppConfig) -> Vec<Entry> {
    let mut entries = vec![
        Entry::new(
            "server.bind_address",
            &config.server.bind_address,
            &["VOICEGATE_SERVER_BIND_ADDRESS"],
        ),
        Entry::new("server.port", config.server.port.to_string(), &["VOICEGATE_SERVER_PORT"]),
        Entry::new(
            "server.graceful_shutdown_secs",
            config.server.graceful_shutdown_secs.to_string(),
            &["VOICEGATE_SERVER_GRACEFUL_SHUTDOWN_SECS"],
        ),
        Entry::new(
            "webhook.auth_token",
            redact(config.webhook.has_auth_token()),
            &["VOICEGATE_WEBHOOK_AUTH_TOKEN"],
        ),
        Entry::new(
            "webhook.public_url",
            config.webhook.public_url.as_deref().unwrap_or("<unset>"),
            &["VOICEGATE_WEBHOOK_PUBLIC_URL"],
        ),
        Entry::new(
            "budget.default_ceiling_cents",
            config.budget.default_ceiling_cents.to_string(),
            &["VOICEGATE_BUDGET_DEFAULT_CEILING_CENTS"],
        ),
        Entry::new(
            "budget.max_ceiling_cents",
            config.budget.max_ceiling_cents.to_string(),
            &["VOICEGATE_BUDGET_MAX_CEILING_CENTS"],
        ),
        Entry::new(
            "budget.chars_per_unit",
            config.budget.chars_per_unit.to_string(),
            &["VOICEGATE_BUDGET_CHARS_PER_UNIT"],
        ),
        Entry::new(
            "providers.stage_timeout_ms",
            config.providers.stage_timeout_ms.to_string(),
            &["VOICEGATE_PROVIDER_TIMEOUT_MS"],
        ),
        Entry::new(
            "providers.call_timeout_ms",
            config.providers.call_timeout_ms.to_string(),
            &["VOICEGATE_PROVIDER_CALL_TIMEOUT_MS"],
        ),
    ];

    for slot in ProviderSlot::ALL {
        let provider = config.providers.slot(slot);
        let prefix = slot.env_prefix();
        let section = format!("providers.{}", slot.as_str());
        let mut push = |field: &str, value: String, suffix: &str| {
            entries.push(Entry {
                key: format!("{section}.{field}"),
                value,
                env_keys: vec![format!("{prefix}_{suffix}")],
            });
        };
        push("api_key", redact(provider.has_credentials()).to_string(), "API_KEY");
        push("base_url", provider.base_url.clone(), "BASE_URL");
        push("model", provider.model.clone(), "MODEL");
        push("input_rate_cents", provider.input_rate_cents.to_string(), "INPUT_RATE_CENTS");
        push("output_rate_cents", provider.output_rate_cents.to_string(), "OUTPUT_RATE_CENTS");
        push("max_output_units", provider.max_output_units.to_string(), "MAX_OUTPUT_UNITS");
    }

    let speech = &config.speech;
    entries.extend([
        Entry::new(
            "speech.api_key",
            redact(speech.has_credentials()),
            &["VOICEGATE_SPEECH_API_KEY"],
        ),
        Entry::new("speech.base_url", &speech.base_url, &["VOICEGATE_SPEECH_BASE_URL"]),
        Entry::new("speech.voice_id", &speech.voice_id, &["VOICEGATE_SPEECH_VOICE_ID"]),
        Entry::new("speech.model", &speech.model, &["VOICEGATE_SPEECH_MODEL"]),
        Entry::new(
            "speech.timeout_ms",
            speech.timeout_ms.to_string(),
            &["VOICEGATE_SPEECH_TIMEOUT_MS"],
        ),
        Entry::new(
            "speech.max_chars",
            speech.max_chars.to_string(),
            &["VOICEGATE_SPEECH_MAX_CHARS"],
        ),
        Entry::new(
            "speech.audio_dir",
            speech.audio_dir.display().to_string(),
            &["VOICEGATE_SPEECH_AUDIO_DIR"],
        ),
        Entry::new(
            "speech.public_base_url",
            &speech.public_base_url,
            &["VOICEGATE_PUBLIC_BASE_URL"],
        ),
        Entry::new(
            "logging.level",
            &config.logging.level,
            &["VOICEGATE_LOGGING_LEVEL", "VOICEGATE_LOG_LEVEL"],
        ),
        Entry::new(
            "logging.format",
            format!("{:?}", config.logging.format),
            &["VOICEGATE_LOGGING_FORMAT", "VOICEGATE_LOG_FORMAT"],
        ),
    ]);

    entries
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let raw = fs::read_to_string(path?).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(entry: &Entry, file_doc: Option<&Value>, file_path: Option<&Path>) -> String {
    if let Some(env_key) = entry.env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = file_doc {
        if contains_path(doc, &entry.key) {
            let file_path = file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn redact(present: bool) -> &'static str {
    if present {
        "<redacted>"
    } else {
        "<unset>"
    }
}
