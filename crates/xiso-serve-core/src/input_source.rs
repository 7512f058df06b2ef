//! The `InputSource` abstraction: a seekable byte provider for either a
//! raw disc image (XISO passthrough) or a single extracted file
//! (directory/zip synthesis), plus the optional directory-walk surface a
//! TocBuilder needs to learn a loose tree's shape.

use crate::error::{Error, Result};
use std::path::PathBuf;

/// One entry discovered while walking a directory-backed input: either a
/// subdirectory or a file, carrying the size needed to plan TOC geometry.
#[derive(Debug, Clone)]
pub struct WalkEntry {
    /// Path relative to the walked root, using `/` separators regardless
    /// of host platform.
    pub relative_path: String,
    pub is_directory: bool,
    /// File size in bytes; `0` for directories.
    pub size: u64,
}

/// A provider of raw bytes for one region of the materialized output.
///
/// Implementations: `MmapPipeline`/`PartialPipeline` wrap an existing
/// XISO file (passthrough); a directory-backed source exposes a whole
/// loose file tree; a zip-backed source exposes an archive's members; a
/// CHD-backed source is a stub that reports itself unavailable (see
/// `xiso-serve-pipeline::chd`).
pub trait InputSource: Send {
    /// Total addressable size of this source, in bytes.
    fn size(&self) -> Result<u64>;

    /// Read `buf.len()` bytes starting at absolute offset `offset`,
    /// filling `buf` completely or returning an error (including on
    /// short read at EOF, which callers treat as corruption since all
    /// reads are planned against a known TOC geometry).
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()>;

    /// Whether this source exposes directory-walk semantics (loose file
    /// tree) as opposed to a single flat byte range (raw image).
    fn is_directory_like(&self) -> bool {
        false
    }

    /// List the immediate contents of `relative_dir` (empty string for
    /// root). Only meaningful when [`InputSource::is_directory_like`]
    /// returns `true`.
    fn list_dir(&self, _relative_dir: &str) -> Result<Vec<WalkEntry>> {
        Err(unavailable_directory_op("list_dir"))
    }

    /// Size in bytes of the file at `relative_path`. Only meaningful for
    /// directory-like sources.
    fn sub_size(&self, _relative_path: &str) -> Result<u64> {
        Err(unavailable_directory_op("sub_size"))
    }

    /// Read `buf.len()` bytes starting at `offset` within the file at
    /// `relative_path`. Only meaningful for directory-like sources.
    fn read_sub_at(&mut self, _relative_path: &str, _offset: u64, _buf: &mut [u8]) -> Result<()> {
        Err(unavailable_directory_op("read_sub_at"))
    }

    /// The filesystem root backing a directory-like source, if this
    /// source is backed by real files on disk (used by the patch engine
    /// to resolve `target_file` against real paths rather than archive
    /// members).
    fn root_path(&self) -> Option<PathBuf> {
        None
    }

    /// Quick format-sniff test: does the first few bytes of this source
    /// match the given magic/pattern? Used by the Façade to pick a
    /// TocBuilder without committing to a full parse.
    fn matches(&mut self, pattern: &[u8]) -> Result<bool> {
        if pattern.is_empty() {
            return Ok(true);
        }
        let total = self.size()?;
        if total < pattern.len() as u64 {
            return Ok(false);
        }
        let mut buf = vec![0u8; pattern.len()];
        self.read_at(0, &mut buf)?;
        Ok(buf == pattern)
    }
}

fn unavailable_directory_op(op: &str) -> Error {
    Error::unavailable(format!(
        "this input source does not support directory operation '{}'",
        op
    ))
}
