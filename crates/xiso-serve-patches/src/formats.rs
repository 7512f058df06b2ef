//! Dispatches a patch file path to the right format parser by extension.

use std::path::Path;

use crate::model::Patch;
use crate::{ips, json, jmp};

/// Parse a patch file, selecting JSON/IPS/JMP by its extension. Returns
/// `None` (with a logged warning) for an unrecognized extension or a file
/// that fails its format's own parsing rules.
pub fn parse(path: &Path) -> Option<Patch> {
    match path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
    {
        Some(ext) if ext == "json" => json::parse(path),
        Some(ext) if ext == "ips" => ips::parse(path),
        Some(ext) if ext == "jmp" => jmp::parse(path),
        _ => {
            tracing::warn!(
                "unrecognized patch file extension for '{}'; skipping",
                path.display()
            );
            None
        }
    }
}

/// Parse every path in `paths`, dropping (with a log, from the underlying
/// parser) any that fail to parse.
pub fn parse_all(paths: &[impl AsRef<Path>]) -> Vec<Patch> {
    paths.iter().filter_map(|p| parse(p.as_ref())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_dispatches_by_extension() {
        let mut f = NamedTempFile::with_suffix(".json").unwrap();
        f.write_all(br#"{"data":[{"operations":[{"address":1,"patched_bytes":"99"}]}]}"#)
            .unwrap();
        f.flush().unwrap();
        assert!(parse(f.path()).is_some());
    }

    #[test]
    fn test_unrecognized_extension_returns_none() {
        let f = NamedTempFile::with_suffix(".bin").unwrap();
        assert!(parse(f.path()).is_none());
    }
}
