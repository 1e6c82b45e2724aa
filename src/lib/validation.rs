//! Input validation utilities with consistent error messages.

use std::path::Path;

use crate::errors::{DupmarkError, Result};
use crate::phred::MAX_PHRED;

/// Validates that a file exists.
///
/// # Errors
///
/// Returns an error naming `description` when the file does not exist.
pub fn validate_file_exists<P: AsRef<Path>>(path: P, description: &str) -> Result<()> {
    let path_ref = path.as_ref();
    if !path_ref.exists() {
        return Err(DupmarkError::InvalidParameter {
            parameter: description.to_string(),
            reason: format!("file '{}' does not exist", path_ref.display()),
        });
    }
    Ok(())
}

/// Validates that a quality threshold is a representable Phred score.
///
/// # Errors
///
/// Returns an error when the value exceeds [`MAX_PHRED`].
pub fn validate_quality_score(quality: u8, name: &str) -> Result<()> {
    if quality > MAX_PHRED {
        return Err(DupmarkError::InvalidParameter {
            parameter: name.to_string(),
            reason: format!("quality {quality} exceeds the maximum Phred score {MAX_PHRED}"),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use tempfile::NamedTempFile;

    #[test]
    fn test_validate_file_exists_valid() {
        let temp_file = NamedTempFile::new().unwrap();
        validate_file_exists(temp_file.path(), "test file").unwrap();
    }

    #[test]
    fn test_validate_file_exists_invalid() {
        let result = validate_file_exists("/nonexistent/file.bam", "input BAM");
        assert!(result.is_err());
        let msg = result.unwrap_err().to_string();
        assert!(msg.contains("input BAM"));
        assert!(msg.contains("does not exist"));
    }

    #[rstest]
    #[case(0, true)]
    #[case(15, true)]
    #[case(93, true)]
    #[case(94, false)]
    #[case(255, false)]
    fn test_validate_quality_score(#[case] quality: u8, #[case] ok: bool) {
        let result = validate_quality_score(quality, "minQual");
        assert_eq!(result.is_ok(), ok);
    }
}
