use std::process::ExitCode;

fn main() -> ExitCode {
    kommo_sync_cli::run()
}
