//! Main entry point for the `stagerun` CLI.

use stagerun::cli;
use std::process::ExitCode;

fn main() -> ExitCode {
    match cli::run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e}");
            for cause in e.causes() {
                eprintln!("  Caused by: {cause}");
            }
            ExitCode::from(u8::try_from(e.exit_code()).unwrap_or(1))
        },
    }
}
