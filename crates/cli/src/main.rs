use std::process::ExitCode;

fn main() -> ExitCode {
    hivebot_cli::run()
}
