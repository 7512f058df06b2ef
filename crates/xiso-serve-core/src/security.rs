//! Validation constants and helpers guarding against malicious or corrupt
//! XISO input (hostile TOC entries, oversized allocation requests, path
//! traversal in the HTTP surface).

use crate::Error;
use std::path::{Path, PathBuf};

/// Maximum size for a single in-memory buffer built while serving a range
/// (256 MB; far beyond any realistic single read but bounds malformed TOC
/// entries claiming an absurd `node_size`).
pub const MAX_ALLOCATION_SIZE: usize = 256 * 1024 * 1024;

/// Maximum number of TOC entries accepted from a single directory's region
/// during a tree walk, bounding a hostile or corrupt disc image.
pub const MAX_DIRECTORY_ENTRIES: usize = 10_000;

/// Maximum file size for memory mapping an XISO/passthrough input
/// (16 GB - practical limit for most systems; larger inputs fall back to
/// positional reads).
pub const MAX_MMAP_SIZE: u64 = 16 * 1024 * 1024 * 1024;

/// Validate that a size is within allocation limits.
///
/// # Security
/// Prevents memory exhaustion from a corrupt or hostile `node_size`/
/// `root_size` field.
pub fn validate_allocation_size(size: u64, limit: usize, context: &str) -> crate::Result<usize> {
    if size > limit as u64 {
        return Err(Error::corrupt_image(format!(
            "{} size {} exceeds limit {}",
            context, size, limit
        )));
    }

    size.try_into()
        .map_err(|_| Error::corrupt_image(format!("{} size exceeds platform limits", context)))
}

/// Safely multiply two u64 values with overflow checking.
///
/// # Security
/// Prevents integer overflow when computing `node_sector * SECTOR_SIZE`
/// from an attacker-controlled sector index.
pub fn checked_multiply_u64(a: u64, b: u64, context: &str) -> crate::Result<u64> {
    a.checked_mul(b)
        .ok_or_else(|| Error::corrupt_image(format!("{}: multiplication overflow", context)))
}

/// Safely convert u64 to usize with platform checking.
pub fn u64_to_usize(value: u64, context: &str) -> crate::Result<usize> {
    value.try_into().map_err(|_| {
        Error::corrupt_image(format!(
            "{}: value {} exceeds platform usize limit",
            context, value
        ))
    })
}

/// Sanitize and validate a URL-decoded request path for safe access under
/// the input root.
///
/// # Security
/// Prevents path traversal attacks in the HTTP surface.
pub fn validate_file_path(path: &str) -> crate::Result<PathBuf> {
    if path.is_empty() {
        return Err(Error::input_not_found("empty path"));
    }

    if path.contains('\0') {
        return Err(Error::range_invalid("path contains null byte"));
    }

    // Defense in depth: reject obvious traversal attempts before
    // canonicalization, which catches cases where canonicalization might
    // behave unexpectedly (e.g. on a not-yet-existing path).
    if path.contains("..") {
        return Err(Error::range_invalid("path traversal sequences not allowed"));
    }

    if path.chars().any(|c| c.is_control() && c != '\t') {
        return Err(Error::range_invalid("path contains invalid control characters"));
    }

    let path_obj = Path::new(path);
    let canonical = path_obj
        .canonicalize()
        .map_err(|e| Error::input_not_found(format!("path does not exist or is inaccessible: {}", e)))?;

    Ok(canonical)
}

/// Validate a file path against an allowed directory whitelist.
///
/// # Security
/// Ensures the HTTP surface cannot be used to read arbitrary files outside
/// the configured DVD path.
pub fn validate_file_path_in_dirs(path: &str, allowed_dirs: &[&Path]) -> crate::Result<PathBuf> {
    let canonical = validate_file_path(path)?;

    let in_allowed_dir = allowed_dirs.iter().any(|allowed| {
        if let Ok(allowed_canonical) = allowed.canonicalize() {
            canonical.starts_with(&allowed_canonical)
        } else {
            false
        }
    });

    if !in_allowed_dir {
        return Err(Error::unavailable(format!(
            "access denied: path '{}' is outside allowed directories",
            path
        )));
    }

    Ok(canonical)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_allocation_size() {
        assert!(validate_allocation_size(1024, MAX_ALLOCATION_SIZE, "test").is_ok());
        assert!(validate_allocation_size(
            MAX_ALLOCATION_SIZE as u64 + 1,
            MAX_ALLOCATION_SIZE,
            "test"
        )
        .is_err());
    }

    #[test]
    fn test_checked_multiply_u64() {
        assert_eq!(checked_multiply_u64(1000, 512, "test").unwrap(), 512_000);
        assert!(checked_multiply_u64(u64::MAX, 2, "test").is_err());
    }

    #[test]
    fn test_u64_to_usize() {
        assert_eq!(u64_to_usize(1024, "test").unwrap(), 1024);
    }

    #[test]
    fn test_validate_file_path() {
        assert!(validate_file_path("").is_err());
        assert!(validate_file_path("test\0file").is_err());
        assert!(validate_file_path("../etc/passwd").is_err());
        assert!(validate_file_path("/nonexistent/file").is_err());
    }
}
