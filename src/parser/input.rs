//! Extraction of raw DOI entries from pasted text and spreadsheets.
//!
//! These helpers only split input into raw strings. Validation happens in
//! [`normalize_doi`](super::normalize_doi) so invalid rows still show up in
//! the final report.

use std::io::Read;

use tracing::debug;

use super::error::ParseError;

/// Name of the spreadsheet column holding DOIs (matched case-insensitively).
pub const DOI_COLUMN: &str = "doi";

/// Splits a pasted list into raw DOI entries.
///
/// DOIs never contain whitespace, so any run of whitespace separates entries.
/// Blank entries are dropped.
///
/// # Examples
///
/// ```
/// use paperfetch_core::parser::split_doi_list;
///
/// let entries = split_doi_list("10.1038/nphys1170\n\n  10.1126/science.aba2420 ");
/// assert_eq!(entries, vec!["10.1038/nphys1170", "10.1126/science.aba2420"]);
/// ```
#[must_use]
pub fn split_doi_list(text: &str) -> Vec<String> {
    text.split_whitespace().map(str::to_string).collect()
}

/// Reads the `doi` column of a CSV document.
///
/// Returns the non-blank cells in row order. Rows shorter than the header are
/// treated as blank.
///
/// # Errors
///
/// - [`ParseError::MissingDoiColumn`] when no header is named `doi`.
/// - [`ParseError::Csv`] when the document is not valid CSV.
#[tracing::instrument(skip(reader))]
pub fn read_doi_column<R: Read>(reader: R) -> Result<Vec<String>, ParseError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = csv_reader.headers().map_err(|e| ParseError::csv(&e))?.clone();
    let Some(column) = headers
        .iter()
        .position(|h| h.trim_start_matches('\u{feff}').eq_ignore_ascii_case(DOI_COLUMN))
    else {
        return Err(ParseError::MissingDoiColumn {
            columns: headers.iter().collect::<Vec<_>>().join(", "),
        });
    };

    let mut entries = Vec::new();
    let mut blank = 0usize;
    for record in csv_reader.records() {
        let record = record.map_err(|e| ParseError::csv(&e))?;
        match record.get(column).map(str::trim) {
            Some(value) if !value.is_empty() => entries.push(value.to_string()),
            _ => blank += 1,
        }
    }

    debug!(entries = entries.len(), blank, "read DOI column");
    Ok(entries)
}
