use std::path::Path;

use secrecy::ExposeSecret;
use voicegate_core::config::AppConfig;
use voicegate_core::signature::compute_signature;

use super::{load_options, CommandResult};

const COMMAND: &str = "sign";

/// Prints the header value a sender holding the configured webhook secret would attach.
pub fn run(config_path: Option<&Path>, url: &str, raw_params: &[String]) -> CommandResult {
    let params = match parse_params(raw_params) {
        Ok(params) => params,
        Err(raw) => {
            return CommandResult::failure(
                COMMAND,
                "invalid_param",
                format!("expected KEY=VALUE, got `{raw}`"),
                2,
            )
        }
    };

    let config = match AppConfig::load(load_options(config_path)) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(COMMAND, "config_validation", error.to_string(), 2)
        }
    };

    let has_secret = config.webhook.has_auth_token();
    let Some(secret) = config.webhook.auth_token.as_ref().filter(|_| has_secret) else {
        return CommandResult::failure(
            COMMAND,
            "missing_secret",
            "webhook auth token is unset; set VOICEGATE_WEBHOOK_AUTH_TOKEN",
            2,
        );
    };

    match compute_signature(secret.expose_secret().as_bytes(), url, &params) {
        Ok(signature) => CommandResult::success(COMMAND, signature),
        Err(error) => CommandResult::failure(COMMAND, "signature", error.to_string(), 1),
    }
}

fn parse_params(raw_params: &[String]) -> Result<Vec<(String, String)>, String> {
    raw_params
        .iter()
        .map(|raw| {
            raw.split_once('=')
                .filter(|(key, _)| !key.is_empty())
                .map(|(key, value)| (key.to_string(), value.to_string()))
                .ok_or_else(|| raw.clone())
        })
        .collect()
}
