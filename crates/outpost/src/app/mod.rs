use std::process::ExitCode;

use tracing::error;

mod bootstrap;
pub mod gameplay;
mod loop_runner;

/// Binary entry point: wire up logging and arguments, then run headless.
pub fn run() -> ExitCode {
    match bootstrap::build_app(std::env::args().skip(1)) {
        Ok(app) => loop_runner::run(app),
        Err(err) => {
            error!(error = %err, "startup_failed");
            ExitCode::FAILURE
        }
    }
}
