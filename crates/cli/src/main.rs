use std::process::ExitCode;

fn main() -> ExitCode {
    voicegate_cli::run()
}
