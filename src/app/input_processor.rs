//! Assembly of raw input entries from positional DOIs, an input file and/or stdin.

use std::fs::File;
use std::io::{self, BufReader, IsTerminal, Read};
use std::path::Path;

use anyhow::{Context, Result};
use paperfetch_core::parser::{read_doi_column, split_doi_list};
use tracing::debug;

use crate::cli::Args;

/// Raw entries in submission order.
#[derive(Debug, Default)]
pub(crate) struct CollectedInput {
    pub(crate) entries: Vec<String>,
    /// Stdin was piped but held no entries.
    pub(crate) empty_stdin: bool,
}

/// Collects entries: positional DOIs first, then `--input`. Stdin is read only
/// when neither is given and it is not a terminal.
pub(crate) fn collect_inputs(args: &Args) -> Result<CollectedInput> {
    let mut entries: Vec<String> = args
        .dois
        .iter()
        .map(|raw| raw.trim())
        .filter(|raw| !raw.is_empty())
        .map(str::to_string)
        .collect();

    if let Some(path) = args.input.as_deref() {
        let from_file = read_input_file(path)?;
        debug!(path = %path.display(), entries = from_file.len(), "read input file");
        entries.extend(from_file);
    }

    if args.dois.is_empty() && args.input.is_none() && !io::stdin().is_terminal() {
        let mut buffer = String::new();
        io::stdin()
            .read_to_string(&mut buffer)
            .context("failed to read DOIs from stdin")?;
        let from_stdin = split_doi_list(&buffer);
        return Ok(CollectedInput {
            empty_stdin: from_stdin.is_empty(),
            entries: from_stdin,
        });
    }

    Ok(CollectedInput {
        entries,
        empty_stdin: false,
    })
}

/// Reads a `.csv` file's `doi` column, or any other file as a whitespace-separated list.
pub(crate) fn read_input_file(path: &Path) -> Result<Vec<String>> {
    let is_csv = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
    if is_csv {
        let file = File::open(path)
            .with_context(|| format!("cannot open input file '{}'", path.display()))?;
        let entries = read_doi_column(BufReader::new(file))
            .with_context(|| format!("cannot read DOIs from '{}'", path.display()))?;
        return Ok(entries);
    }
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read input file '{}'", path.display()))?;
    Ok(split_doi_list(&text))
}
