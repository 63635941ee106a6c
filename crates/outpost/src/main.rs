use std::process::ExitCode;

fn main() -> ExitCode {
    outpost::app::run()
}
