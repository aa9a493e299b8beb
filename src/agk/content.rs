// Upload content validation — allowed MIME types and max size, grounded
// in `original_source/src/agk.py`'s `ContentValidator` (identical
// allowlist and 10 MiB limit).

pub const MAX_FILE_SIZE_BYTES: u64 = 10 * 1024 * 1024;

const ALLOWED_TYPES: &[&str] = &[
    "image/jpeg",
    "image/png",
    "image/gif",
    "image/webp",
    "text/plain",
    "application/json",
];

/// Validates a content type and length for an upload request (§4.5 step
/// 6). Returns the accumulated list of human-readable errors.
pub fn validate(content_type: &str, content_length: u64) -> Result<(), Vec<String>> {
    let mut errors = Vec::new();

    if !ALLOWED_TYPES.iter().any(|t| t.eq_ignore_ascii_case(content_type)) {
        errors.push(format!("unsupported content type: {content_type}"));
    }

    if content_length > MAX_FILE_SIZE_BYTES {
        let size_mb = content_length as f64 / (1024.0 * 1024.0);
        let max_mb = MAX_FILE_SIZE_BYTES as f64 / (1024.0 * 1024.0);
        errors.push(format!("file size {size_mb:.2}MB exceeds {max_mb}MB limit"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allowed_type_and_size_passes() {
        assert!(validate("image/png", 1024).is_ok());
    }

    #[test]
    fn test_disallowed_type_is_rejected() {
        let errors = validate("application/x-executable", 1024).unwrap_err();
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn test_oversized_file_is_rejected() {
        let errors = validate("image/png", MAX_FILE_SIZE_BYTES + 1).unwrap_err();
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn test_both_bad_type_and_size_accumulate_errors() {
        let errors = validate("application/x-executable", MAX_FILE_SIZE_BYTES + 1).unwrap_err();
        assert_eq!(errors.len(), 2);
    }
}
