use std::fs;
use std::path::Path;

use serde::Serialize;
use voicegate_core::config::{AppConfig, ProviderSlot};

use super::{load_options, CommandResult};

const WRITE_CHECK_FILE: &str = ".voicegate-doctor.part";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: String,
    status: CheckStatus,
    details: String,
}

impl DoctorCheck {
    fn new(name: impl Into<String>, status: CheckStatus, details: impl Into<String>) -> Self {
        Self { name: name.into(), status, details: details.into() }
    }
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(config_path: Option<&Path>, json_output: bool) -> CommandResult {
    let report = build_report(config_path);
    let exit_code = if report.overall_status == CheckStatus::Pass { 0 } else { 1 };

    let output = if json_output {
        serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        })
    } else {
        render_human(&report)
    };

    CommandResult { exit_code, output }
}

fn build_report(config_path: Option<&Path>) -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(load_options(config_path)) {
        Ok(config) => {
            checks.push(DoctorCheck::new(
                "config_validation",
                CheckStatus::Pass,
                "configuration loaded and validated",
            ));
            checks.push(check_webhook_secret(&config));
            for slot in ProviderSlot::ALL {
                checks.push(check_provider_credentials(&config, slot));
            }
            checks.push(check_speech_credentials(&config));
            checks.push(check_audio_dir(&config.speech.audio_dir));
        }
        Err(error) => {
            checks.push(DoctorCheck::new(
                "config_validation",
                CheckStatus::Fail,
                error.to_string(),
            ));
            let mut skipped = vec!["webhook_secret".to_string()];
            skipped.extend(ProviderSlot::ALL.iter().map(|slot| provider_check_name(*slot)));
            skipped.extend(["speech_credentials".to_string(), "audio_dir".to_string()]);
            for name in skipped {
                checks.push(DoctorCheck::new(
                    name,
                    CheckStatus::Skipped,
                    "skipped because configuration did not load",
                ));
            }
        }
    }

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_webhook_secret(config: &AppConfig) -> DoctorCheck {
    if config.webhook.has_auth_token() {
        DoctorCheck::new("webhook_secret", CheckStatus::Pass, "webhook auth token is configured")
    } else {
        DoctorCheck::new(
            "webhook_secret",
            CheckStatus::Fail,
            "webhook auth token is unset; every webhook would be rejected",
        )
    }
}

fn provider_check_name(slot: ProviderSlot) -> String {
    format!("{}_credentials", slot.as_str())
}

fn check_provider_credentials(config: &AppConfig, slot: ProviderSlot) -> DoctorCheck {
    let provider = config.providers.slot(slot);
    if provider.has_credentials() {
        DoctorCheck::new(
            provider_check_name(slot),
            CheckStatus::Pass,
            format!("api key present for model `{}`", provider.model),
        )
    } else {
        DoctorCheck::new(
            provider_check_name(slot),
            CheckStatus::Fail,
            format!("{}_API_KEY is unset; calls routed here will fail", slot.env_prefix()),
        )
    }
}

fn check_speech_credentials(config: &AppConfig) -> DoctorCheck {
    if config.speech.has_credentials() {
        DoctorCheck::new(
            "speech_credentials",
            CheckStatus::Pass,
            format!("api key present for voice `{}`", config.speech.voice_id),
        )
    } else {
        DoctorCheck::new(
            "speech_credentials",
            CheckStatus::Fail,
            "VOICEGATE_SPEECH_API_KEY is unset; answers will be spoken as text",
        )
    }
}

fn check_audio_dir(audio_dir: &Path) -> DoctorCheck {
    let check_file = audio_dir.join(WRITE_CHECK_FILE);
    let result = fs::create_dir_all(audio_dir)
        .and_then(|()| fs::write(&check_file, b"ok"))
        .and_then(|()| fs::remove_file(&check_file));

    match result {
        Ok(()) => DoctorCheck::new(
            "audio_dir",
            CheckStatus::Pass,
            format!("`{}` is writable", audio_dir.display()),
        ),
        Err(error) => DoctorCheck::new(
            "audio_dir",
            CheckStatus::Fail,
            format!("`{}` is not writable: {error}", audio_dir.display()),
        ),
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = vec![report.summary.clone()];

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
