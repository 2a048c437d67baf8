use std::process::ExitCode;

fn main() -> ExitCode {
    curhat_cli::run()
}
