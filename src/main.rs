//! zentao - browse ZenTao from the terminal.

use std::process::ExitCode;

use clap::Parser;
use tracing::error;

use zentao_cli::cli::{self, Cli};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = zentao_cli::logging::init(cli.verbose) {
        eprintln!("warning: logging disabled: {}", e);
    }

    match cli::run(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!(error = %e, "Command failed");
            eprintln!("error: {}", e.user_message());
            if let Some(action) = e.suggested_action() {
                eprintln!("{}", action);
            }
            if let Some(dir) = zentao_cli::logging::log_directory() {
                eprintln!("Details are logged in {}", dir.display());
            }
            ExitCode::FAILURE
        }
    }
}
