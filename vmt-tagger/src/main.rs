//! vmt-tagger - video metadata tagger
//!
//! Exit codes: 0 when no file failed, 1 when at least one did, 2 on
//! configuration or startup errors.

use clap::Parser;
use std::process::ExitCode;
use vmt_tagger::cli::{self, Cli};

#[tokio::main]
async fn main() -> ExitCode {
    let args = Cli::parse();

    match cli::execute(args).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!(error = %e, "Run aborted");
            eprintln!("Error: {}", e);
            ExitCode::from(e.exit_code())
        }
    }
}
