//! Output-path guards for the binaries.
//!
//! A results file or catalog database is overwritten without asking, so the
//! target name must carry an expected marker and must not be one of the
//! inputs of the same run.

use anyhow::{bail, Result};
use std::path::Path;

/// Names that belong to inputs and are never valid outputs.
const PROTECTED_NAMES: [&str; 3] = ["tracks.json", "tracks.txt", "catalog-source"];

/// Validates that an output path is safe to overwrite.
///
/// Checks:
/// - the file name contains `required_pattern` (e.g. "catalog", "matches")
/// - the output is none of `source_paths`
/// - the file name is not a protected input name
pub fn validate_output_path(
    output: &Path,
    required_pattern: &str,
    source_paths: &[&Path],
) -> Result<()> {
    let output_name = output.file_name().and_then(|n| n.to_str()).unwrap_or("");

    if !output_name.contains(required_pattern) {
        bail!(
            "Safety check failed: output file '{}' must contain '{}' in the name",
            output.display(),
            required_pattern
        );
    }

    for source in source_paths {
        if output == *source {
            bail!(
                "Safety check failed: output '{}' cannot be the same as source '{}'",
                output.display(),
                source.display()
            );
        }
    }

    if let Some(name) = PROTECTED_NAMES.iter().find(|n| output_name.contains(**n)) {
        bail!(
            "Safety check failed: output '{}' looks like an input file ('{}')",
            output.display(),
            name
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_valid_catalog_output() {
        let output = PathBuf::from("/tmp/spotify-catalog.sqlite3");
        let source = PathBuf::from("/data/dump.jsonl");
        assert!(validate_output_path(&output, "catalog", &[&source]).is_ok());
    }

    #[test]
    fn test_valid_matches_output() {
        let output = PathBuf::from("/tmp/matches_filtered.json");
        let source = PathBuf::from("/tmp/matches.json");
        assert!(validate_output_path(&output, "matches", &[&source]).is_ok());
    }

    #[test]
    fn test_missing_pattern() {
        let output = PathBuf::from("/tmp/output.sqlite3");
        let source = PathBuf::from("/data/source.json");
        let result = validate_output_path(&output, "catalog", &[&source]);
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("must contain 'catalog'"));
    }

    #[test]
    fn test_output_equals_source() {
        let path = PathBuf::from("/data/matches.json");
        let result = validate_output_path(&path, "matches", &[&path]);
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("cannot be the same as source"));
    }

    #[test]
    fn test_protected_name_blocked() {
        let output = PathBuf::from("/tmp/catalog-source.json");
        let result = validate_output_path(&output, "catalog", &[]);
        assert!(result.is_err());
    }
}
