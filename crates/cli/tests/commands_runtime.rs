use std::env;
use std::fs;
use std::sync::{Mutex, OnceLock};

use serde_json::Value;
use tempfile::TempDir;
use voicegate_cli::commands::{config, doctor, sign};
use voicegate_core::signature::compute_signature;

const FULL_CREDENTIALS: [(&str, &str); 5] = [
    ("VOICEGATE_WEBHOOK_AUTH_TOKEN", "webhook-secret"),
    ("VOICEGATE_CONVERSATIONAL_API_KEY", "sk-test"),
    ("VOICEGATE_CODE_API_KEY", "sk-ant-test"),
    ("VOICEGATE_RESEARCH_API_KEY", "pplx-test"),
    ("VOICEGATE_SPEECH_API_KEY", "xi-test"),
];

#[test]
fn config_attributes_env_values_and_redacts_secrets() {
    with_env(
        &[
            ("VOICEGATE_WEBHOOK_AUTH_TOKEN", "super-secret-token"),
            ("VOICEGATE_CODE_MODEL", "claude-test"),
            ("VOICEGATE_LOG_LEVEL", "debug"),
        ],
        || {
            let output = config::run(None);

            assert!(output.starts_with("effective config"), "{output}");
            assert!(output.contains(
                "- webhook.auth_token = <redacted> (source: env (VOICEGATE_WEBHOOK_AUTH_TOKEN))"
            ));
            assert!(!output.contains("super-secret-token"), "secret leaked: {output}");
            assert!(output.contains(
                "- providers.code.model = claude-test (source: env (VOICEGATE_CODE_MODEL))"
            ));
            assert!(output.contains("- logging.level = debug (source: env (VOICEGATE_LOG_LEVEL))"));
            assert!(output.contains("- server.port = 3000 (source: default)"));
            assert!(output.contains("- providers.research.api_key = <unset> (source: default)"));
        },
    );
}

#[test]
fn config_attributes_values_from_an_explicit_file() {
    with_env(&[], || {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("voicegate.toml");
        fs::write(
            &path,
            "[server]\nport = 4100\n\n[providers.research]\nmodel = \"sonar-pro\"\n",
        )
        .expect("write config file");

        let output = config::run(Some(&path));
        let file_source = format!("(source: file ({}))", path.display());

        assert!(output.contains(&format!("- server.port = 4100 {file_source}")), "{output}");
        assert!(output.contains(&format!("- providers.research.model = sonar-pro {file_source}")));
        assert!(
            output.contains("- providers.conversational.model = gpt-4o-mini (source: default)")
        );
    });
}

#[test]
fn config_reports_a_missing_explicit_file() {
    with_env(&[], || {
        let dir = TempDir::new().expect("temp dir");
        let output = config::run(Some(&dir.path().join("absent.toml")));

        assert!(output.starts_with("config validation failed"), "{output}");
    });
}

#[test]
fn doctor_passes_with_every_credential_present() {
    let audio = TempDir::new().expect("temp dir");
    let audio_dir = audio.path().join("clips");
    let audio_dir = audio_dir.to_str().expect("utf-8 temp path");
    let mut vars = FULL_CREDENTIALS.to_vec();
    vars.push(("VOICEGATE_SPEECH_AUDIO_DIR", audio_dir));

    with_env(&vars, || {
        let result = doctor::run(None, true);
        assert_eq!(result.exit_code, 0, "{}", result.output);

        let report = parse_payload(&result.output);
        assert_eq!(report["overall_status"], "pass");
        let checks = report["checks"].as_array().expect("checks array");
        assert_eq!(checks.len(), 7);
        assert!(checks.iter().all(|check| check["status"] == "pass"));
    });

    let leftovers = fs::read_dir(audio.path().join("clips")).expect("audio dir exists").count();
    assert_eq!(leftovers, 0, "doctor must clean up its write-check file");
}

#[test]
fn doctor_flags_each_missing_credential() {
    let audio = TempDir::new().expect("temp dir");
    let audio_dir = audio.path().to_str().expect("utf-8 temp path");

    with_env(
        &[("VOICEGATE_SPEECH_AUDIO_DIR", audio_dir), ("VOICEGATE_RESEARCH_API_KEY", "pplx-test")],
        || {
            let result = doctor::run(None, true);
            assert_eq!(result.exit_code, 1);

            let report = parse_payload(&result.output);
            assert_eq!(report["overall_status"], "fail");
            assert_eq!(check_status(&report, "config_validation"), "pass");
            assert_eq!(check_status(&report, "webhook_secret"), "fail");
            assert_eq!(check_status(&report, "conversational_credentials"), "fail");
            assert_eq!(check_status(&report, "code_credentials"), "fail");
            assert_eq!(check_status(&report, "research_credentials"), "pass");
            assert_eq!(check_status(&report, "speech_credentials"), "fail");
            assert_eq!(check_status(&report, "audio_dir"), "pass");
        },
    );
}

#[test]
fn doctor_skips_dependent_checks_when_config_is_invalid() {
    with_env(&[("VOICEGATE_SERVER_PORT", "not-a-port")], || {
        let result = doctor::run(None, false);

        assert_eq!(result.exit_code, 1);
        let lines: Vec<&str> = result.output.lines().collect();
        assert_eq!(lines[0], "doctor: one or more readiness checks failed");
        assert!(lines[1].starts_with("- [fail] config_validation:"), "{}", result.output);
        assert!(lines[1].contains("VOICEGATE_SERVER_PORT"));
        assert_eq!(lines.iter().filter(|line| line.starts_with("- [skip]")).count(), 6);
    });
}

#[test]
fn doctor_reports_an_unwritable_audio_directory() {
    let dir = TempDir::new().expect("temp dir");
    let blocker = dir.path().join("blocker");
    fs::write(&blocker, b"not a directory").expect("write blocker");
    let audio_dir = blocker.join("clips");
    let audio_dir = audio_dir.to_str().expect("utf-8 temp path");

    with_env(&[("VOICEGATE_SPEECH_AUDIO_DIR", audio_dir)], || {
        let report = parse_payload(&doctor::run(None, true).output);
        assert_eq!(check_status(&report, "audio_dir"), "fail");
    });
}

#[test]
fn sign_prints_the_signature_the_verifier_expects() {
    with_env(&[("VOICEGATE_WEBHOOK_AUTH_TOKEN", "webhook-secret")], || {
        let url = "https://voice.example.com/voice?tenant=7";
        let raw = vec!["SpeechResult=When are you open?".to_string(), "CallSid=CA1".to_string()];

        let result = sign::run(None, url, &raw);
        assert_eq!(result.exit_code, 0, "{}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "sign");
        assert_eq!(payload["status"], "ok");
        let expected = compute_signature(
            b"webhook-secret",
            url,
            &[
                ("SpeechResult".to_string(), "When are you open?".to_string()),
                ("CallSid".to_string(), "CA1".to_string()),
            ],
        )
        .expect("signature should compute");
        assert_eq!(payload["message"], expected.as_str());
    });
}

#[test]
fn sign_fails_without_a_configured_secret() {
    with_env(&[], || {
        let result = sign::run(None, "https://voice.example.com/voice", &[]);

        assert_eq!(result.exit_code, 2);
        let payload = parse_payload(&result.output);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "missing_secret");
    });
}

#[test]
fn sign_rejects_malformed_params_before_loading_config() {
    with_env(&[("VOICEGATE_SERVER_PORT", "not-a-port")], || {
        let result =
            sign::run(None, "https://voice.example.com/voice", &["SpeechResult".to_string()]);

        assert_eq!(result.exit_code, 2);
        assert_eq!(parse_payload(&result.output)["error_class"], "invalid_param");
    });
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn check_status(report: &Value, name: &str) -> String {
    report["checks"]
        .as_array()
        .and_then(|checks| checks.iter().find(|check| check["name"] == name))
        .and_then(|check| check["status"].as_str())
        .unwrap_or_default()
        .to_string()
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let previous_values: Vec<(String, String)> =
        env::vars().filter(|(key, _)| key.starts_with("VOICEGATE_")).collect();

    for (key, _) in &previous_values {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    let leaked: Vec<String> =
        env::vars().map(|(key, _)| key).filter(|key| key.starts_with("VOICEGATE_")).collect();
    for key in leaked {
        env::remove_var(key);
    }
    for (key, value) in previous_values {
        env::set_var(key, value);
    }
}
