//! swarmlink - agent control plane and tick-gated simulation coordinator.

use clap::Parser;
use std::process::ExitCode;

use swarmlink::cli::Cli;
use swarmlink::logging;

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize logging; the guard must live for the whole run.
    let _guard = match logging::init() {
        Ok((guard, _log_dir)) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {}", e);
            return ExitCode::FAILURE;
        }
    };

    // Parse command line arguments
    let args = Cli::parse();

    // Run the command
    match args.run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
