//! Result reporting: terminal table, JSON lines and the summary CSV.

use std::fmt::Write as _;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;

use crate::batch::{BatchReport, DoiOutcome, OutcomeStatus};

/// File name of the per-run summary written to the output directory.
pub const SUMMARY_FILE_NAME: &str = "download_summary.csv";

const STATUS_WIDTH: usize = 18;
const MIN_TABLE_WIDTH: usize = 40;

/// Errors writing reports.
#[derive(Debug, Error)]
pub enum ReportError {
    /// The summary file could not be created.
    #[error("cannot write report '{}': {source}", path.display())]
    Io {
        /// File path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// CSV encoding failed.
    #[error("cannot encode summary CSV: {0}")]
    Csv(#[from] csv::Error),

    /// JSON encoding failed.
    #[error("cannot encode outcome as JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// One row of the summary CSV.
#[derive(Debug, Serialize)]
struct SummaryRow<'a> {
    doi: &'a str,
    input: &'a str,
    status: &'static str,
    provider: &'a str,
    file: String,
    bytes: Option<u64>,
    reason: &'a str,
    elapsed_ms: u64,
}

impl<'a> SummaryRow<'a> {
    fn from_outcome(outcome: &'a DoiOutcome) -> Self {
        let provider = match &outcome.status {
            OutcomeStatus::Downloaded { provider, .. } => provider.as_str(),
            _ => "",
        };
        Self {
            doi: outcome.doi.as_ref().map_or("", |doi| doi.as_str()),
            input: &outcome.input,
            status: outcome.status.label(),
            provider,
            file: outcome
                .status
                .path()
                .and_then(|p| p.file_name())
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default(),
            bytes: outcome.status.bytes(),
            reason: outcome.reason.as_deref().unwrap_or(""),
            elapsed_ms: u64::try_from(outcome.elapsed.as_millis()).unwrap_or(u64::MAX),
        }
    }
}

/// Writes `download_summary.csv` into `output_dir`, one row per input entry.
///
/// # Errors
///
/// Returns [`ReportError`] if the file cannot be written.
pub fn write_summary_csv(report: &BatchReport, output_dir: &Path) -> Result<PathBuf, ReportError> {
    let path = output_dir.join(SUMMARY_FILE_NAME);
    let file = File::create(&path).map_err(|source| ReportError::Io {
        path: path.clone(),
        source,
    })?;
    write_summary(report, BufWriter::new(file))?;
    Ok(path)
}

/// Writes the summary CSV to any writer.
///
/// # Errors
///
/// Returns [`ReportError::Csv`] on encoding or write failure.
pub fn write_summary<W: std::io::Write>(report: &BatchReport, writer: W) -> Result<(), ReportError> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    for outcome in &report.outcomes {
        csv_writer.serialize(SummaryRow::from_outcome(outcome))?;
    }
    csv_writer.flush().map_err(csv::Error::from)?;
    Ok(())
}

/// Renders one JSON object per line, in input order.
///
/// # Errors
///
/// Returns [`ReportError::Json`] if an outcome cannot be encoded.
pub fn render_json_lines(report: &BatchReport) -> Result<String, ReportError> {
    let mut out = String::new();
    for outcome in &report.outcomes {
        out.push_str(&serde_json::to_string(outcome)?);
        out.push('\n');
    }
    Ok(out)
}

/// Renders a fixed-width table, one line per input entry, fitted to `width`.
#[must_use]
pub fn render_table(report: &BatchReport, width: usize) -> String {
    let width = width.max(MIN_TABLE_WIDTH);
    let index_width = report.outcomes.len().max(1).to_string().len();
    let mut out = String::new();
    for outcome in &report.outcomes {
        let subject = outcome
            .doi
            .as_ref()
            .map_or(outcome.input.as_str(), |doi| doi.as_str());
        let line = format!(
            "{:>index_width$}  {:<STATUS_WIDTH$}  {subject}  {}",
            outcome.index + 1,
            outcome.status.label(),
            outcome_detail(outcome),
        );
        let _ = writeln!(out, "{}", truncate_to_width(line.trim_end(), width));
    }
    out
}

/// One-line run summary.
#[must_use]
pub fn summary_line(report: &BatchReport) -> String {
    let counts = &report.counts;
    let mut line = format!(
        "{} of {} available: {} downloaded, {} already present, {} not found, {} failed, {} invalid",
        counts.succeeded(),
        report.total(),
        counts.downloaded,
        counts.already_present,
        counts.not_found,
        counts.failed,
        counts.invalid,
    );
    if counts.not_attempted > 0 {
        let _ = write!(line, ", {} not attempted", counts.not_attempted);
    }
    let _ = write!(line, " ({:.1}s)", report.elapsed.as_secs_f64());
    if report.cancelled {
        line.push_str(" [cancelled]");
    }
    line
}

fn outcome_detail(outcome: &DoiOutcome) -> String {
    match &outcome.status {
        OutcomeStatus::Downloaded { path, provider, .. } => {
            format!("{} via {provider}", display_name(path))
        }
        OutcomeStatus::AlreadyDownloaded { path, .. } => display_name(path),
        _ => outcome.reason.clone().unwrap_or_default(),
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned())
}

/// Returns terminal width from `COLUMNS`, or 80 if unset or invalid.
#[must_use]
pub fn terminal_width() -> usize {
    std::env::var("COLUMNS")
        .ok()
        .and_then(|value| value.parse::<usize>().ok())
        .filter(|width| *width >= 20)
        .unwrap_or(80)
}

/// Truncates text to at most `width` chars, appending an ellipsis if cut.
#[must_use]
pub fn truncate_to_width(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_string();
    }
    match width {
        0 => String::new(),
        1 => "…".to_string(),
        _ => {
            let mut output: String = text.chars().take(width - 1).collect();
            output.push('…');
            output
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::parser::Doi;

    fn sample_report() -> BatchReport {
        let downloaded = DoiOutcome {
            index: 0,
            input: "https://doi.org/10.1234/ABC".to_string(),
            doi: Some(Doi::parse("10.1234/abc").unwrap()),
            status: OutcomeStatus::Downloaded {
                path: PathBuf::from("out/10.1234_abc.pdf"),
                bytes: 2048,
                provider: "unpaywall".to_string(),
            },
            reason: None,
            attempts: Vec::new(),
            elapsed: Duration::from_millis(120),
        };
        let failed = DoiOutcome {
            index: 1,
            input: "10.5555/gone".to_string(),
            doi: Some(Doi::parse("10.5555/gone").unwrap()),
            status: OutcomeStatus::AllProvidersFailed,
            reason: Some("crossref: HTTP 403".to_string()),
            attempts: Vec::new(),
            elapsed: Duration::from_millis(80),
        };
        let invalid = DoiOutcome {
            index: 2,
            input: "hello".to_string(),
            doi: None,
            status: OutcomeStatus::InvalidDoi {
                reason: "missing 10. prefix".to_string(),
            },
            reason: Some("missing 10. prefix".to_string()),
            attempts: Vec::new(),
            elapsed: Duration::ZERO,
        };
        BatchReport {
            outcomes: vec![downloaded, failed, invalid],
            cancelled: false,
            elapsed: Duration::from_millis(1500),
            peak_in_flight: 2,
            counts: crate::batch::BatchCounts {
                downloaded: 1,
                failed: 1,
                invalid: 1,
                ..Default::default()
            },
        }
    }

    // ==================== CSV Tests ====================

    #[test]
    fn test_summary_csv_columns_and_rows() {
        let mut buffer = Vec::new();
        write_summary(&sample_report(), &mut buffer).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "doi,input,status,provider,file,bytes,reason,elapsed_ms");
        assert_eq!(
            lines[1],
            "10.1234/abc,https://doi.org/10.1234/ABC,downloaded,unpaywall,10.1234_abc.pdf,2048,,120"
        );
        assert_eq!(lines[2], "10.5555/gone,10.5555/gone,failed,,,,crossref: HTTP 403,80");
        assert_eq!(lines[3], ",hello,invalid_doi,,,,missing 10. prefix,0");
    }

    #[test]
    fn test_write_summary_csv_to_directory() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = write_summary_csv(&sample_report(), dir.path()).unwrap();
        assert_eq!(path, dir.path().join(SUMMARY_FILE_NAME));
        assert_eq!(std::fs::read_to_string(path).unwrap().lines().count(), 4);
    }

    // ==================== Rendering Tests ====================

    #[test]
    fn test_json_lines_one_object_per_outcome() {
        let json = render_json_lines(&sample_report()).unwrap();
        let values: Vec<serde_json::Value> = json
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(values.len(), 3);
        assert_eq!(values[0]["status"], "downloaded");
        assert_eq!(values[0]["provider"], "unpaywall");
        assert_eq!(values[2]["doi"], serde_json::Value::Null);
    }

    #[test]
    fn test_table_lines_in_input_order() {
        let table = render_table(&sample_report(), 120);
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].contains("downloaded") && lines[0].contains("via unpaywall"));
        assert!(lines[1].contains("crossref: HTTP 403"));
        assert!(lines[2].contains("hello"));
    }

    #[test]
    fn test_table_truncates_to_width() {
        let table = render_table(&sample_report(), 40);
        assert!(table.lines().all(|line| line.chars().count() <= 40));
    }

    #[test]
    fn test_summary_line_counts() {
        let line = summary_line(&sample_report());
        assert!(line.starts_with("1 of 3 available"), "{line}");
        assert!(line.contains("1 invalid"));
        assert!(!line.contains("cancelled"));
    }

    #[test]
    fn test_truncate_to_width() {
        assert_eq!(truncate_to_width("abcdef", 10), "abcdef");
        assert_eq!(truncate_to_width("abcdef", 4), "abc…");
        assert_eq!(truncate_to_width("abcdef", 1), "…");
        assert_eq!(truncate_to_width("abcdef", 0), "");
    }
}
