//! A tagged `TocBuilder` variant (XISO passthrough | Directory synthesis)
//! sharing one capability set, per §9's "Polymorphism over TocBuilder" note
//! — deliberately not a trait-object hierarchy.

use xiso_serve_core::{InputSource, Result, TocModel};

use crate::directory_builder::DirectoryTocBuilder;
use crate::xiso_builder::XisoTocBuilder;

pub enum TocBuilder {
    Xiso(XisoTocBuilder),
    Directory(DirectoryTocBuilder),
}

impl TocBuilder {
    pub fn toc(&self) -> &TocModel {
        match self {
            TocBuilder::Xiso(b) => &b.toc,
            TocBuilder::Directory(b) => &b.toc,
        }
    }

    /// Whether an XISO passthrough source was detected at a non-zero image
    /// origin (Redump-style dump), meaning §4.4's auto media patch must be
    /// prepended before user patches.
    pub fn requires_media_patch(&self) -> bool {
        match self {
            TocBuilder::Xiso(b) => b.image_origin > 0,
            TocBuilder::Directory(_) => false,
        }
    }

    pub fn output_size(&self) -> u64 {
        match self {
            TocBuilder::Xiso(b) => b.output_size,
            TocBuilder::Directory(b) => b.output_size,
        }
    }

    /// Read `buf.len()` bytes of a FILE region's content, given the
    /// region's own declared `(offset, size)` (as stored in the TOC model)
    /// and the byte offset within that region the caller wants.
    ///
    /// XISO passthrough translates straight through to the backing source
    /// at `image_origin + region_offset + within_region_offset`; directory
    /// synthesis instead re-opens the loose file at `file_path` and reads
    /// at `within_region_offset` directly, since a synthesized file
    /// region's `offset` is a virtual output position with no
    /// corresponding byte in any single real file.
    pub fn read_file_bytes(
        &self,
        source: &mut dyn InputSource,
        file_path: &str,
        region_offset: u64,
        within_region_offset: u64,
        buf: &mut [u8],
    ) -> Result<()> {
        match self {
            TocBuilder::Xiso(b) => {
                source.read_at(b.image_origin + region_offset + within_region_offset, buf)
            }
            TocBuilder::Directory(_) => source.read_sub_at(file_path, within_region_offset, buf),
        }
    }
}
