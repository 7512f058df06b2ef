//! Parses an existing XISO (or Redump-style full dump) into the [`TocModel`]
//! by walking the on-disc implicit binary tree packed into each directory's
//! TOC entries.
//!
//! The walk is iterative and explicit-stack rather than recursive (§9
//! "Recursion depth"): a hostile image with a cyclic or unbounded chain of
//! `left_offset`/`right_offset` references must not be able to exhaust the
//! call stack. A global entry-count ceiling bounds the same hostile input
//! from spinning forever.
//!
//! Offsets come in two flavors throughout this module: *virtual* offsets
//! (stored in the [`TocModel`], always relative to the volume's own byte 0
//! regardless of where it sits in the raw input) and *physical* offsets
//! (`virtual + image_origin`, used for every `source.read_at` call). Only
//! physical offsets ever reach the backing `InputSource`.

use xiso_serve_core::{
    Error, InputSource, Region, RegionExtra, RegionKey, Result, TocModel, ATTR_DIRECTORY,
    FULL_DUMP_DATA_OFFSET, HEADER_MAGIC, HEADER_OFFSET, MAX_DIRECTORY_ENTRIES, SECTOR_SIZE,
};

/// Upper bound on total TOC entries walked across the whole image, shared
/// across all directories - a hostile cyclic TOC is stopped here rather
/// than by depth alone.
const MAX_TOTAL_ENTRIES: usize = MAX_DIRECTORY_ENTRIES * 64;

pub struct XisoTocBuilder {
    pub toc: TocModel,
    /// Byte offset inside the raw input at which the XISO volume begins:
    /// `0` for a plain XISO, [`FULL_DUMP_DATA_OFFSET`] for a Redump-style
    /// dump whose header only appears after that padding.
    pub image_origin: u64,
    pub output_size: u64,
}

impl XisoTocBuilder {
    /// Sniffs `source` for an XISO header at offset 0 or at the Redump
    /// offset, returning `None` if neither location carries the magic.
    pub fn detect(source: &mut dyn InputSource) -> Result<Option<u64>> {
        for candidate in [0u64, FULL_DUMP_DATA_OFFSET] {
            let header_at = candidate + HEADER_OFFSET;
            let total = source.size()?;
            if header_at + HEADER_MAGIC.len() as u64 > total {
                continue;
            }
            let mut magic = vec![0u8; HEADER_MAGIC.len()];
            source.read_at(header_at, &mut magic)?;
            if magic == HEADER_MAGIC {
                return Ok(Some(candidate));
            }
        }
        Ok(None)
    }

    pub fn build(source: &mut dyn InputSource, image_origin: u64) -> Result<Self> {
        let total = source.size()?;
        let header_physical = image_origin + HEADER_OFFSET;

        let mut root_sector_buf = [0u8; 4];
        source.read_at(header_physical + 20, &mut root_sector_buf)?;
        let root_sector = u32::from_le_bytes(root_sector_buf);

        let mut root_size_buf = [0u8; 4];
        source.read_at(header_physical + 24, &mut root_size_buf)?;
        let root_size = u32::from_le_bytes(root_size_buf);

        let mut toc = TocModel::new();
        toc.insert(
            RegionKey::Header,
            Region {
                offset: HEADER_OFFSET,
                size: SECTOR_SIZE,
                extra: RegionExtra::Header {
                    root_sector,
                    root_size,
                },
            },
        );

        let root_virtual_offset = root_sector as u64 * SECTOR_SIZE;
        walk_directory(
            source,
            &mut toc,
            image_origin,
            total,
            "".to_string(),
            root_virtual_offset,
        )?;

        let output_size = toc
            .regions
            .values()
            .map(|r| r.offset + r.size)
            .max()
            .unwrap_or(HEADER_OFFSET + SECTOR_SIZE);

        Ok(Self {
            toc,
            image_origin,
            output_size,
        })
    }
}

/// Walk one directory's packed TOC entries (an implicit BST keyed by
/// lowercased filename, referenced via `left_offset`/`right_offset` in
/// 4-byte units relative to the directory's own TOC region start).
fn walk_directory(
    source: &mut dyn InputSource,
    toc: &mut TocModel,
    image_origin: u64,
    input_total: u64,
    dir_path: String,
    dir_virtual_offset: u64,
) -> Result<()> {
    // (dir_path, dir_virtual_offset, entry_word_offset); word_offset 0 is
    // always a valid traversal seed (the first entry in the region), never
    // a "none" sentinel - only left_offset/right_offset == 0 *references*
    // mean none.
    let mut stack = vec![(dir_path, dir_virtual_offset, 0u16)];
    let mut visited = 0usize;

    while let Some((dir_path, dir_virtual_offset, entry_word_offset)) = stack.pop() {
        visited += 1;
        if visited > MAX_TOTAL_ENTRIES {
            return Err(Error::corrupt_image(
                "TOC entry count exceeds the safety ceiling; refusing to walk further",
            ));
        }

        let entry_virtual_offset = dir_virtual_offset + entry_word_offset as u64 * 4;
        let entry_physical_offset = image_origin + entry_virtual_offset;
        if entry_physical_offset + 14 > input_total {
            return Err(Error::corrupt_image(format!(
                "TOC entry at {} runs past end of input",
                entry_physical_offset
            )));
        }

        let mut head = [0u8; 14];
        source.read_at(entry_physical_offset, &mut head)?;
        if head.iter().all(|&b| b == 0x00) || head.iter().all(|&b| b == 0xFF) {
            continue;
        }

        let left_offset = u16::from_le_bytes([head[0], head[1]]);
        let right_offset = u16::from_le_bytes([head[2], head[3]]);
        let node_sector = u32::from_le_bytes([head[4], head[5], head[6], head[7]]);
        let node_size = u32::from_le_bytes([head[8], head[9], head[10], head[11]]);
        let attributes = head[12];
        let filename_length = head[13] as usize;

        if entry_physical_offset + 14 + filename_length as u64 > input_total {
            return Err(Error::corrupt_image(format!(
                "TOC entry at {} has a filename extending past end of input",
                entry_physical_offset
            )));
        }
        let mut name_buf = vec![0u8; filename_length];
        source.read_at(entry_physical_offset + 14, &mut name_buf)?;
        if std::str::from_utf8(&name_buf).is_err() {
            tracing::warn!(
                "TOC entry at {} has a non-ASCII filename; decoding lossily",
                entry_physical_offset
            );
        }
        let name = String::from_utf8_lossy(&name_buf).into_owned();

        let unpadded_len = 14 + filename_length;
        let entry_size = pad_to_4(unpadded_len as u64);

        let child_path = format!("{}/{}", dir_path, name);
        let is_directory = attributes & ATTR_DIRECTORY != 0;

        toc.insert(
            RegionKey::Toc(child_path.clone()),
            Region {
                offset: entry_virtual_offset,
                size: entry_size,
                extra: RegionExtra::TocEntry {
                    is_directory,
                    left_offset,
                    right_offset,
                    node_sector,
                    node_size,
                    attributes,
                    name,
                },
            },
        );

        let node_virtual_offset = node_sector as u64 * SECTOR_SIZE;

        if is_directory {
            if node_size > 0 {
                stack.push((child_path, node_virtual_offset, 0));
            }
        } else {
            toc.insert(
                RegionKey::File(child_path),
                Region {
                    offset: node_virtual_offset,
                    size: node_size as u64,
                    extra: RegionExtra::File,
                },
            );
        }

        if right_offset != 0 {
            stack.push((dir_path.clone(), dir_virtual_offset, right_offset));
        }
        if left_offset != 0 {
            stack.push((dir_path, dir_virtual_offset, left_offset));
        }
    }

    Ok(())
}

/// Round a TOC entry's unpadded byte length up to the next multiple of 4.
fn pad_to_4(len: u64) -> u64 {
    (len + 3) / 4 * 4
}
