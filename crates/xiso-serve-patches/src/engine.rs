//! Patch selection, pattern resolution, and application.

use std::collections::HashMap;

use xiso_serve_core::error::Result;

use crate::model::{Operation, Patch, ResolvedPatch};

/// The fixed instruction rewrite that bypasses the Xbox media-originality
/// check, auto-injected for Redump-style dumps whose `image_origin > 0`.
pub const MEDIA_PATCH_ORIGINAL: [u8; 8] = [0xE8, 0xCA, 0xFD, 0xFF, 0xFF, 0x85, 0xC0, 0x7D];
pub const MEDIA_PATCH_PATCHED: [u8; 8] = [0xE8, 0xCA, 0xFD, 0xFF, 0xFF, 0x85, 0xC0, 0xEB];
const MEDIA_PATCH_TARGET: &str = "default.xbe";

/// Byte-window overlap between consecutive scan chunks when resolving
/// `original_bytes`, so a match straddling a chunk boundary is not missed.
const CHUNK_SIZE: u64 = 1024 * 1024;

/// Anything the engine can scan for `original_bytes` matches and read back
/// for resolution. Implemented by the Façade over whichever `InputSource`
/// backs the current image's target files; kept minimal so this crate does
/// not depend on the pipeline/TOC crates.
pub trait FileSource {
    fn len(&mut self, target_file: &str) -> Result<u64>;
    fn read_at(&mut self, target_file: &str, offset: u64, buf: &mut [u8]) -> Result<()>;
}

pub struct PatchEngine;

impl PatchEngine {
    /// Keep only patches whose `title_id` matches the image's (or is null).
    /// A null-title patch is kept and logged, never rejected.
    pub fn select(patches: &[Patch], title_id: Option<&str>) -> Vec<Patch> {
        patches
            .iter()
            .filter(|patch| match &patch.title_id {
                None => {
                    tracing::warn!(
                        "patch '{}' has no title_id; applying to any image",
                        patch.name.as_deref().unwrap_or("<unnamed>")
                    );
                    true
                }
                Some(id) => Some(id.as_str()) == title_id,
            })
            .cloned()
            .collect()
    }

    /// Resolve every `original_bytes` operation in `patch` to an absolute
    /// address within its target file, dropping unresolvable operations
    /// and operations with no resolvable target file.
    pub fn resolve(patch: &Patch, source: &mut dyn FileSource) -> ResolvedPatch {
        let mut resolved = ResolvedPatch::default();

        for sub in &patch.sub_patches {
            let Some(target_file) = sub.target_file.as_deref() else {
                tracing::warn!(
                    "patch '{}' has a sub-patch with an unresolved target file; dropping its operations",
                    patch.name.as_deref().unwrap_or("<unnamed>")
                );
                continue;
            };

            // Per Open Question 4: occurrence counting is local to this
            // sub-patch's operation list, never shared across sub-patches
            // or patches.
            let mut occurrence: HashMap<Vec<u8>, usize> = HashMap::new();
            let entry = resolved.by_file.entry(target_file.to_string()).or_default();

            for op in &sub.operations {
                match op {
                    Operation::Address {
                        address,
                        patched_bytes,
                    } => entry.push((*address, patched_bytes.clone())),
                    Operation::OriginalBytes {
                        original_bytes,
                        patched_bytes,
                    } => {
                        let want_index = {
                            let count = occurrence.entry(original_bytes.clone()).or_insert(0);
                            let idx = *count;
                            *count += 1;
                            idx
                        };

                        match find_nth_occurrence(source, target_file, original_bytes, want_index)
                        {
                            Ok(Some(address)) => entry.push((address, patched_bytes.clone())),
                            Ok(None) => tracing::warn!(
                                "patch '{}': original_bytes not found in '{}' (occurrence {})",
                                patch.name.as_deref().unwrap_or("<unnamed>"),
                                target_file,
                                want_index
                            ),
                            Err(e) => tracing::warn!(
                                "patch '{}': error scanning '{}': {}",
                                patch.name.as_deref().unwrap_or("<unnamed>"),
                                target_file,
                                e
                            ),
                        }
                    }
                }
            }
        }

        resolved
    }

    /// Overlay `resolved`'s operations for `target_file` onto `buf`, which
    /// represents `buf.len()` bytes of that file starting at
    /// `buffer_file_offset`. Clips partial overlaps at either edge.
    pub fn apply(
        resolved: &ResolvedPatch,
        target_file: &str,
        buffer_file_offset: u64,
        buf: &mut [u8],
    ) {
        let Some(ops) = resolved.operations_for(target_file) else {
            return;
        };
        let buf_start = buffer_file_offset;
        let buf_end = buffer_file_offset + buf.len() as u64;

        for (address, patched_bytes) in ops {
            let op_start = *address;
            let op_end = op_start + patched_bytes.len() as u64;
            if op_end <= buf_start || op_start >= buf_end {
                continue;
            }

            let overlap_start = op_start.max(buf_start);
            let overlap_end = op_end.min(buf_end);
            let src_offset = (overlap_start - op_start) as usize;
            let dst_offset = (overlap_start - buf_start) as usize;
            let len = (overlap_end - overlap_start) as usize;

            buf[dst_offset..dst_offset + len]
                .copy_from_slice(&patched_bytes[src_offset..src_offset + len]);
        }
    }

    /// Builds the auto media patch for a Redump-style dump, to be applied
    /// before any user-supplied patches.
    pub fn media_patch(title_id: Option<&str>) -> Patch {
        Patch {
            title_id: title_id.map(|s| s.to_string()),
            name: Some("media-patch".to_string()),
            author: None,
            sub_patches: vec![crate::model::SubPatch {
                target_file: Some(MEDIA_PATCH_TARGET.to_string()),
                operations: vec![Operation::OriginalBytes {
                    original_bytes: MEDIA_PATCH_ORIGINAL.to_vec(),
                    patched_bytes: MEDIA_PATCH_PATCHED.to_vec(),
                }],
            }],
        }
    }
}

/// Scans `target_file` in [`CHUNK_SIZE`]-byte chunks with `needle.len() - 1`
/// bytes of overlap between consecutive chunks, returning the absolute file
/// offset of the `want_index`-th (0-based) literal match of `needle`.
fn find_nth_occurrence(
    source: &mut dyn FileSource,
    target_file: &str,
    needle: &[u8],
    want_index: usize,
) -> Result<Option<u64>> {
    if needle.is_empty() {
        return Ok(None);
    }

    let total_len = source.len(target_file)?;
    let overlap = needle.len() as u64 - 1;
    let mut seen = 0usize;
    let mut pos = 0u64;

    while pos < total_len {
        let chunk_len = CHUNK_SIZE.min(total_len - pos) as usize;
        if (chunk_len as u64) < needle.len() as u64 {
            break;
        }
        let mut buf = vec![0u8; chunk_len];
        source.read_at(target_file, pos, &mut buf)?;

        for window_start in 0..=(chunk_len - needle.len()) {
            if &buf[window_start..window_start + needle.len()] == needle {
                if seen == want_index {
                    return Ok(Some(pos + window_start as u64));
                }
                seen += 1;
            }
        }

        if pos + chunk_len as u64 >= total_len {
            break;
        }
        let advance = CHUNK_SIZE - overlap;
        pos += advance;
    }

    Ok(None)
}
