// src/main.rs

use std::process::ExitCode;

use cadence::{cli, logging, run};

#[tokio::main]
async fn main() -> ExitCode {
    let args = cli::parse();
    if let Err(err) = logging::init_logging(args.log_level) {
        eprintln!("cadence: {err:#}");
        return ExitCode::FAILURE;
    }

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %format!("{err:#}"), "cadence stopped");
            eprintln!("cadence error: {err:?}");
            ExitCode::FAILURE
        }
    }
}
