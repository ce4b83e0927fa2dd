//! The download run: config, inputs, scheduler, reporting.

use std::io::{self, IsTerminal, Write};
use std::sync::Arc;

use anyhow::{Context, Result};
use paperfetch_core::batch::{BatchScheduler, CancellationFlag};
use paperfetch_core::config::EngineConfig;
use paperfetch_core::provider::build_resolution_chain;
use paperfetch_core::report;
use tracing::{debug, info, warn};

use crate::ProcessExit;
use crate::app::{exit_handler, input_processor, progress_manager, terminal};
use crate::cli::Args;

const NO_INPUT_GUIDANCE: &str = "No input provided. Pass DOIs as arguments, use --input FILE, or pipe them via stdin.";
const EMPTY_STDIN_GUIDANCE: &str = "Received empty stdin input. Pipe DOIs or pass them as arguments.";
const INPUT_EXAMPLE: &str = "Example: paperfetch 10.1038/nphys1170 https://doi.org/10.1126/science.aba2420";

pub(crate) async fn run_paperfetch(args: Args) -> Result<ProcessExit> {
    let (mut config, loaded_from) = EngineConfig::load(args.config.as_deref())?;
    if let Some(path) = &loaded_from {
        debug!(path = %path.display(), "config file loaded");
    }
    config.apply_overrides(args.overrides());
    config.validate()?;

    let input = input_processor::collect_inputs(&args)?;
    if input.entries.is_empty() {
        let headline = if input.empty_stdin {
            EMPTY_STDIN_GUIDANCE
        } else {
            NO_INPUT_GUIDANCE
        };
        let width = report::terminal_width().min(100);
        println!("{}", report::truncate_to_width(headline, width));
        println!("{}", report::truncate_to_width(INPUT_EXAMPLE, width));
        return Ok(ProcessExit::Success);
    }

    let chain = build_resolution_chain(&config).context("cannot assemble resolution chain")?;
    info!(providers = ?chain.provider_names(), entries = input.entries.len(), "paperfetch starting");
    let scheduler = BatchScheduler::new(Arc::new(chain), config.batch_options())?;

    let cancel = CancellationFlag::new();
    let signal_flag = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping after the current attempts");
            signal_flag.cancel();
        }
    });

    let run = scheduler
        .start(input.entries, &config.output_dir, cancel)
        .await?;

    let use_bar = terminal::should_use_progress_bar(
        io::stderr().is_terminal(),
        args.quiet,
        terminal::is_dumb_terminal(),
    );
    let progress_handle = progress_manager::spawn_progress_ui(use_bar, run.progress.clone());
    let batch = run.wait().await?;
    if let Some(handle) = progress_handle {
        let _ = handle.await;
    }

    let rendered = if args.json {
        report::render_json_lines(&batch)?
    } else {
        report::render_table(&batch, report::terminal_width())
    };
    let mut stdout = io::stdout().lock();
    stdout.write_all(rendered.as_bytes())?;
    if !args.json && !args.quiet {
        writeln!(stdout, "{}", report::summary_line(&batch))?;
    }
    drop(stdout);

    if !args.no_summary {
        match report::write_summary_csv(&batch, &config.output_dir) {
            Ok(path) => info!(path = %path.display(), "summary written"),
            Err(e) => warn!(error = %e, "could not write summary CSV"),
        }
    }

    if batch.cancelled {
        warn!(
            not_attempted = batch.counts.not_attempted,
            "Interrupted. Run again to fetch the remaining DOIs."
        );
    }

    Ok(exit_handler::exit_for_counts(&batch.counts))
}
