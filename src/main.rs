//! ti-scaffold - Titanium plugin scaffolder

use std::process::ExitCode;

fn main() -> ExitCode {
    if let Err(e) = ti_scaffold::cli::run() {
        eprintln!("Error: {:#}", e);
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
