use std::process::ExitCode;

mod runner;

fn main() -> ExitCode {
    match runner::main(std::env::args().collect()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
