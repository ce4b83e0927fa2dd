//! CLI entry point for paperfetch.

use std::process::ExitCode;

use clap::Parser;
use tracing::debug;

mod app;
mod cli;

use cli::Args;

/// Process exit outcome: 0 success, 2 partial success, 1 failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ProcessExit {
    Success,
    Partial,
    Failure,
}

impl From<ProcessExit> for ExitCode {
    fn from(exit: ProcessExit) -> Self {
        match exit {
            ProcessExit::Success => ExitCode::SUCCESS,
            ProcessExit::Partial => ExitCode::from(2),
            ProcessExit::Failure => ExitCode::FAILURE,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    let no_color = app::terminal::no_color_env_requested() || app::terminal::is_dumb_terminal();
    app::terminal::init_tracing(app::terminal::default_log_level(&args), no_color);
    debug!(?args, "CLI arguments parsed");

    match app::runtime::run_paperfetch(args).await {
        Ok(exit) => exit.into(),
        Err(e) => {
            eprintln!("error: {e:#}");
            ProcessExit::Failure.into()
        }
    }
}
