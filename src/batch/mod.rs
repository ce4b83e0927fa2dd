//! Batch execution: scheduling, per-DOI outcomes, progress and cancellation.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use paperfetch_core::batch::{BatchOptions, BatchScheduler, CancellationFlag};
//! use paperfetch_core::config::EngineConfig;
//! use paperfetch_core::provider::build_resolution_chain;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let chain = Arc::new(build_resolution_chain(&EngineConfig::default())?);
//! let scheduler = BatchScheduler::new(chain, BatchOptions::default())?;
//! let inputs = vec!["10.1038/nphys1170".to_string(), "not a doi".to_string()];
//! let report = scheduler
//!     .run(inputs, Path::new("downloads"), CancellationFlag::new())
//!     .await?;
//! println!("{} downloaded, {} invalid", report.counts.downloaded, report.counts.invalid);
//! # Ok(())
//! # }
//! ```

mod outcome;
mod progress;
mod scheduler;

pub use outcome::{BatchCounts, BatchReport, DoiOutcome, OutcomeStatus};
pub use progress::{CancellationFlag, ProgressSnapshot};
pub use scheduler::{
    BatchError, BatchOptions, BatchRun, BatchScheduler, DEFAULT_CONCURRENCY, MAX_CONCURRENCY,
};
