use std::process::ExitCode;

fn main() -> ExitCode {
    temtudo_cli::run()
}
