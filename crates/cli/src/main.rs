use std::process::ExitCode;

fn main() -> ExitCode {
    confguide_cli::run()
}
