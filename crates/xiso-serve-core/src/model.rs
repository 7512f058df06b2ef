//! The XISO TOC data model: sector constants and the typed-region map that
//! both TocBuilders (XISO passthrough, directory synthesis) populate and
//! that the Materializer reads from.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Fixed XISO sector size in bytes.
pub const SECTOR_SIZE: u64 = 2048;

/// Virtual offset of the volume header (sector 32).
pub const HEADER_OFFSET: u64 = 32 * SECTOR_SIZE;

/// ASCII magic that opens and closes the volume header sector.
pub const HEADER_MAGIC: &[u8] = b"MICROSOFT*XBOX*MEDIA";

/// Magic bytes that open a well-formed `.xbe` executable.
pub const XBE_HEADER: &[u8] = b"XBEH";

/// Byte offset of the little-endian uint16 certificate-offset field in an
/// XBE file.
pub const XBE_CERT_ADDRESS_OFFSET: u64 = 280;

/// Declared byte length of the XBE certificate structure.
pub const XBE_CERT_LENGTH: u64 = 492;

/// Redump-style full-dump data offset: XISO volumes in a raw Redump dump
/// begin this many bytes into the file instead of at offset 0.
pub const FULL_DUMP_DATA_OFFSET: u64 = 387 * 1024 * 1024;

/// Attribute bit that marks a TOC entry as a directory.
pub const ATTR_DIRECTORY: u8 = 0x10;
/// Attribute value used for file entries.
pub const ATTR_FILE: u8 = 0x20;

/// Round `size` up to the next multiple of [`SECTOR_SIZE`].
pub fn ceil_to_sector(size: u64) -> u64 {
    (size + SECTOR_SIZE - 1) / SECTOR_SIZE * SECTOR_SIZE
}

/// Unique, typed key identifying one region of the synthesized XISO output.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RegionKey {
    /// The single volume header region.
    Header,
    /// A directory's packed TOC entries, keyed by its absolute path
    /// (e.g. `/default.xbe`'s parent is `""`, a nested dir is `/media`).
    Toc(String),
    /// A file's data region, keyed by its absolute path
    /// (e.g. `/default.xbe`).
    File(String),
}

impl RegionKey {
    /// Render in the `"TYPE:path"` form used by logs and test fixtures,
    /// matching the informal notation of the region taxonomy.
    pub fn as_tagged_string(&self) -> String {
        match self {
            RegionKey::Header => "HEADER:HEADER".to_string(),
            RegionKey::Toc(path) => format!("TOC:{}", path),
            RegionKey::File(path) => format!("FILE:{}", path),
        }
    }
}

/// Per-region metadata needed to produce that region's bytes on demand.
#[derive(Debug, Clone)]
pub enum RegionExtra {
    /// Volume header: pointer to the root directory's TOC.
    Header { root_sector: u32, root_size: u32 },
    /// A single TOC entry.
    TocEntry {
        /// `true` for a directory entry, `false` for a file entry.
        is_directory: bool,
        left_offset: u16,
        right_offset: u16,
        node_sector: u32,
        node_size: u32,
        attributes: u8,
        /// Filename component only (no path separators), ASCII.
        name: String,
    },
    /// File data region; no extra metadata is needed beyond offset/size.
    File,
}

/// One entry in the TOC model: a typed, non-overlapping byte region of the
/// synthesized output.
#[derive(Debug, Clone)]
pub struct Region {
    pub offset: u64,
    pub size: u64,
    pub extra: RegionExtra,
}

/// The full TOC model for one input: a mapping from typed region key to
/// its placement and metadata.
///
/// Built once per input path and cached for the life of the process
/// (see the Façade). Uses a `BTreeMap` for deterministic iteration order
/// in tests and logs; the authoritative offset-ordered view used at
/// request time is the [`crate::search_tree::SearchTree`] built over it.
#[derive(Debug, Clone, Default)]
pub struct TocModel {
    pub regions: BTreeMap<RegionKey, Region>,
}

impl TocModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: RegionKey, region: Region) {
        self.regions.insert(key, region);
    }

    pub fn get(&self, key: &RegionKey) -> Option<&Region> {
        self.regions.get(key)
    }

    pub fn header(&self) -> Option<&Region> {
        self.regions.get(&RegionKey::Header)
    }

    pub fn file(&self, path: &str) -> Option<&Region> {
        self.regions.get(&RegionKey::File(path.to_string()))
    }

    /// Total number of regions, for diagnostics.
    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ceil_to_sector() {
        assert_eq!(ceil_to_sector(0), 0);
        assert_eq!(ceil_to_sector(1), SECTOR_SIZE);
        assert_eq!(ceil_to_sector(SECTOR_SIZE), SECTOR_SIZE);
        assert_eq!(ceil_to_sector(SECTOR_SIZE + 1), 2 * SECTOR_SIZE);
    }

    #[test]
    fn test_region_key_tagged_string() {
        assert_eq!(RegionKey::Header.as_tagged_string(), "HEADER:HEADER");
        assert_eq!(
            RegionKey::Toc("/media".to_string()).as_tagged_string(),
            "TOC:/media"
        );
        assert_eq!(
            RegionKey::File("/default.xbe".to_string()).as_tagged_string(),
            "FILE:/default.xbe"
        );
    }

    #[test]
    fn test_toc_model_insert_get() {
        let mut toc = TocModel::new();
        toc.insert(
            RegionKey::Header,
            Region {
                offset: HEADER_OFFSET,
                size: SECTOR_SIZE,
                extra: RegionExtra::Header {
                    root_sector: 33,
                    root_size: 512,
                },
            },
        );
        assert_eq!(toc.len(), 1);
        assert!(toc.header().is_some());
        assert_eq!(toc.header().unwrap().offset, HEADER_OFFSET);
    }
}
