use std::process::ExitCode;

fn main() -> ExitCode {
    let code = ignition_lib::cli::run(std::env::args());
    ExitCode::from(code as u8)
}
