use std::process::ExitCode;

fn main() -> ExitCode {
    chatty_cli::run()
}
