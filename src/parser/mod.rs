//! Input handling: DOI normalization and raw entry extraction.
//!
//! # Example
//!
//! ```
//! use paperfetch_core::parser::{normalize_doi, split_doi_list};
//!
//! let raw = split_doi_list("10.1038/nphys1170 https://doi.org/10.1126/SCIENCE.aba2420");
//! let dois: Vec<_> = raw.iter().filter_map(|r| normalize_doi(r).ok()).collect();
//! assert_eq!(dois[1].as_str(), "10.1126/science.aba2420");
//! ```

mod doi;
mod error;
mod input;

pub use doi::{Doi, normalize_doi};
pub use error::ParseError;
pub use input::{DOI_COLUMN, read_doi_column, split_doi_list};
