pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "voicegate",
    about = "Voicegate operator CLI",
    long_about = "Inspect effective configuration, check deployment readiness, and sign test webhooks.",
    after_help = "Examples:\n  voicegate doctor --json\n  voicegate config\n  voicegate sign --url https://voice.example.com/voice --param SpeechResult=hello"
)]
pub struct Cli {
    #[arg(long, global = true, help = "Path to a voicegate.toml file")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, webhook secret, backend credentials, and audio storage")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Print the signature the webhook verifier expects for a request")]
    Sign {
        #[arg(long, help = "Full public URL the sender posts to, including any query string")]
        url: String,
        #[arg(long = "param", value_name = "KEY=VALUE", help = "Form parameter, repeatable")]
        params: Vec<String>,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    let config_path = cli.config.as_deref();

    let result = match cli.command {
        Command::Config => commands::CommandResult::plain(commands::config::run(config_path)),
        Command::Doctor { json } => commands::doctor::run(config_path, json),
        Command::Sign { url, params } => commands::sign::run(config_path, &url, &params),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
