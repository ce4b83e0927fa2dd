//! Deterministic, collision-safe output file names derived from DOIs.
//!
//! A plain DOI such as `10.1038/nphys1170` maps to `10.1038_nphys1170.pdf`.
//! When the mapping would lose information (extra slashes, reserved
//! characters, a literal `_`, or an overlong suffix) a short SHA-256 tag of
//! the DOI is appended so two distinct DOIs never share a file.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::parser::Doi;

/// Extension used for downloaded documents.
pub const DOCUMENT_EXTENSION: &str = "pdf";

/// Extension appended to in-progress downloads.
const PARTIAL_EXTENSION: &str = "part";

/// Maximum stem length in bytes before truncation.
///
/// Stem, hash tag, `.pdf` and `.part` together stay under the 255-byte
/// file name limit of common filesystems.
const MAX_STEM_BYTES: usize = 150;

/// Number of hex digits of the DOI hash used as a collision tag.
const HASH_TAG_HEX_DIGITS: usize = 8;

/// Returns the output file name for `doi`.
///
/// # Examples
///
/// ```
/// use paperfetch_core::download::doi_file_name;
/// use paperfetch_core::parser::Doi;
///
/// let doi = Doi::parse("10.1038/nphys1170").unwrap();
/// assert_eq!(doi_file_name(&doi), "10.1038_nphys1170.pdf");
/// ```
#[must_use]
pub fn doi_file_name(doi: &Doi) -> String {
    let mut stem = String::with_capacity(doi.as_str().len());
    let mut lossy = false;
    let mut seen_slash = false;

    for ch in doi.as_str().chars() {
        let mapped = match ch {
            '/' if !seen_slash => {
                seen_slash = true;
                '_'
            }
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | '_' => {
                lossy = true;
                '_'
            }
            c if c.is_whitespace() || c.is_control() => {
                lossy = true;
                '_'
            }
            c => c,
        };
        stem.push(mapped);
    }

    if stem.len() > MAX_STEM_BYTES {
        let mut cut = MAX_STEM_BYTES;
        while !stem.is_char_boundary(cut) {
            cut -= 1;
        }
        stem.truncate(cut);
        lossy = true;
    }

    if lossy {
        format!("{stem}-{}.{DOCUMENT_EXTENSION}", hash_tag(doi))
    } else {
        format!("{stem}.{DOCUMENT_EXTENSION}")
    }
}

/// Returns the full output path for `doi` inside `output_dir`.
#[must_use]
pub fn doi_output_path(output_dir: &Path, doi: &Doi) -> PathBuf {
    output_dir.join(doi_file_name(doi))
}

/// Returns the temporary path a download streams into before being renamed.
#[must_use]
pub(crate) fn partial_path(destination: &Path) -> PathBuf {
    let mut name = destination
        .file_name()
        .map(std::ffi::OsStr::to_os_string)
        .unwrap_or_default();
    name.push(".");
    name.push(PARTIAL_EXTENSION);
    destination.with_file_name(name)
}

fn hash_tag(doi: &Doi) -> String {
    let digest = Sha256::digest(doi.as_str().as_bytes());
    digest
        .iter()
        .take(HASH_TAG_HEX_DIGITS / 2)
        .map(|b| format!("{b:02x}"))
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    fn doi(raw: &str) -> Doi {
        Doi::parse(raw).unwrap()
    }

    #[test]
    fn test_doi_file_name_plain() {
        assert_eq!(doi_file_name(&doi("10.1038/nphys1170")), "10.1038_nphys1170.pdf");
        assert_eq!(
            doi_file_name(&doi("10.1126/science.aba2420")),
            "10.1126_science.aba2420.pdf"
        );
    }

    #[test]
    fn test_doi_file_name_is_deterministic() {
        let a = doi_file_name(&doi("10.1002/(sici)1097-4636:3<ab>"));
        let b = doi_file_name(&doi("10.1002/(SICI)1097-4636:3<AB>"));
        assert_eq!(a, b);
    }

    #[test]
    fn test_doi_file_name_replaces_unsafe_chars_with_tag() {
        let name = doi_file_name(&doi("10.1002/(sici)1097-4636:3<ab>"));
        assert!(name.starts_with("10.1002_(sici)1097-4636_3_ab_-"), "{name}");
        assert!(name.ends_with(".pdf"));
        assert!(!name.contains(':') && !name.contains('<') && !name.contains('/'));
    }

    #[test]
    fn test_doi_file_name_extra_slash_is_tagged() {
        let name = doi_file_name(&doi("10.1234/a/b"));
        assert!(name.starts_with("10.1234_a_b-"), "{name}");
    }

    #[test]
    fn test_doi_file_name_collision_safe() {
        let names: HashSet<String> = [
            "10.1234/a/b",
            "10.1234/a_b",
            "10.1234/a:b",
            "10.1234/a?b",
            "10.1234/ab",
        ]
        .iter()
        .map(|raw| doi_file_name(&doi(raw)))
        .collect();
        assert_eq!(names.len(), 5);
    }

    #[test]
    fn test_doi_file_name_truncates_long_suffix() {
        let long = format!("10.1234/{}", "x".repeat(400));
        let name = doi_file_name(&doi(&long));
        let stem = name.trim_end_matches(".pdf");
        assert_eq!(stem.len(), MAX_STEM_BYTES + 1 + HASH_TAG_HEX_DIGITS);
    }

    #[test]
    fn test_doi_file_name_multibyte_suffix_fits_byte_limit() {
        for ch in ['é', '€', '𝔸'] {
            let raw = format!("10.1234/{}", ch.to_string().repeat(200));
            let name = doi_file_name(&doi(&raw));
            let stem = name.trim_end_matches(".pdf");
            assert!(stem.len() <= MAX_STEM_BYTES + 1 + HASH_TAG_HEX_DIGITS, "{ch}: {}", stem.len());
            assert!(partial_path(Path::new(&name)).as_os_str().len() <= 255);
            assert!(name.starts_with("10.1234_"));
        }
    }

    #[test]
    fn test_doi_file_name_multibyte_suffix_is_writable() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = doi_output_path(dir.path(), &doi(&format!("10.1234/{}", "é".repeat(200))));
        std::fs::write(partial_path(&path), b"%PDF-").unwrap();
        std::fs::rename(partial_path(&path), &path).unwrap();
        assert!(path.is_file());
    }

    #[test]
    fn test_doi_file_name_distinct_multibyte_dois_stay_distinct() {
        let a = doi_file_name(&doi(&format!("10.1234/{}a", "€".repeat(100))));
        let b = doi_file_name(&doi(&format!("10.1234/{}b", "€".repeat(100))));
        assert_ne!(a, b);
    }

    #[test]
    fn test_doi_output_path_joins_dir() {
        let path = doi_output_path(Path::new("out"), &doi("10.1038/nphys1170"));
        assert_eq!(path, Path::new("out").join("10.1038_nphys1170.pdf"));
    }

    #[test]
    fn test_partial_path_appends_extension() {
        let partial = partial_path(Path::new("out/10.1038_nphys1170.pdf"));
        assert_eq!(partial, Path::new("out/10.1038_nphys1170.pdf.part"));
    }
}
