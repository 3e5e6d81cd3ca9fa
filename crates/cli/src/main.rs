use std::process::ExitCode;

fn main() -> ExitCode {
    bandscore_cli::run()
}
