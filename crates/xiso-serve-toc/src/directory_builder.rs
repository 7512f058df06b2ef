//! Synthesizes XISO TOC geometry from a loose directory tree (§4.6).
//!
//! After an initial name-ordering pass, one loop walks the flattened
//! directory list and, per directory: packs its TOC entries (sector-straddle
//! avoidance), ceils the region to a sector, places that same directory's
//! own files immediately after (each ceiled to a sector), then advances past
//! one empty gap sector before the next directory - matching
//! `get_toc_data()`'s single loop over each directory's own entries in the
//! reference implementation this was ported from. A second, cheap pass then
//! back-fills each entry's `left_offset`/`right_offset` now that every
//! sibling's assigned byte offset is known, and each directory-type entry's
//! `node_sector`/`node_size` from its child's region.

use std::collections::HashMap;

use xiso_serve_core::{
    Error, InputSource, Region, RegionExtra, RegionKey, Result, TocModel, ATTR_DIRECTORY,
    ATTR_FILE, SECTOR_SIZE,
};

use crate::name_tree::NameTree;

/// First sector the synthesizer may place TOC data in - sectors 0..33 are
/// reserved the same way a real XISO reserves them ahead of the root TOC.
const FIRST_DATA_SECTOR: u64 = 33;

enum RawChild {
    File { name: String, size: u64 },
    Dir { name: String, children: Vec<RawChild> },
}

/// One child entry after name-ordering, before offsets are assigned.
struct EntryDraft {
    name: String,
    is_directory: bool,
    file_size: u64,
    /// Relative path (from the synthesized root) of the child; used to key
    /// `RegionKey`s and, for directories, to look up the child's own region.
    child_path: String,
    left_child: Option<usize>,
    right_child: Option<usize>,
    /// Filled in pass 1.
    offset: u64,
    size: u64,
}

struct DirDraft {
    path: String,
    entries: Vec<EntryDraft>,
    /// Filled in pass 1.
    region_start: u64,
    region_size: u64,
}

pub struct DirectoryTocBuilder {
    pub toc: TocModel,
    pub output_size: u64,
}

impl DirectoryTocBuilder {
    pub fn build(source: &mut dyn InputSource) -> Result<Self> {
        let raw_root = walk_raw(source, "")?;
        let mut dirs = Vec::new();
        flatten_dirs("".to_string(), raw_root, &mut dirs);

        let mut cur = FIRST_DATA_SECTOR * SECTOR_SIZE;
        let mut file_placement: HashMap<String, (u64, u64)> = HashMap::new();

        // One loop per directory: pack this directory's TOC, ceil to a
        // sector, place this directory's own files right after it, then
        // leave one gap sector before the next directory's TOC.
        for dir in dirs.iter_mut() {
            dir.region_start = cur;
            for entry in dir.entries.iter_mut() {
                let unpadded = 14 + entry.name.len() as u64;
                let entry_size = pad_to_4(unpadded);
                let sector_pos = cur % SECTOR_SIZE;
                if sector_pos + entry_size > SECTOR_SIZE {
                    cur += SECTOR_SIZE - sector_pos;
                }
                entry.offset = cur;
                entry.size = entry_size;
                cur += entry_size;
            }
            let raw_len = cur - dir.region_start;
            dir.region_size = ceil_to_sector(raw_len);
            cur = dir.region_start + dir.region_size;

            for entry in &dir.entries {
                if entry.is_directory {
                    continue;
                }
                cur = ceil_to_sector(cur);
                let offset = cur;
                file_placement.insert(entry.child_path.clone(), (offset, entry.file_size));
                cur = ceil_to_sector(cur + entry.file_size);
            }

            // One empty sector separates this directory's TOC+files from
            // whatever is placed next.
            cur += SECTOR_SIZE;
        }

        let dir_regions: HashMap<String, (u64, u64)> = dirs
            .iter()
            .map(|d| (d.path.clone(), (d.region_start, d.region_size)))
            .collect();

        let root_region = *dir_regions
            .get("")
            .ok_or_else(|| Error::corrupt_image("directory synthesis produced no root region"))?;

        let mut toc = TocModel::new();
        toc.insert(
            RegionKey::Header,
            Region {
                offset: 32 * SECTOR_SIZE,
                size: SECTOR_SIZE,
                extra: RegionExtra::Header {
                    root_sector: (root_region.0 / SECTOR_SIZE) as u32,
                    root_size: root_region.1 as u32,
                },
            },
        );

        for dir in &dirs {
            for entry in &dir.entries {
                let (node_sector, node_size) = if entry.is_directory {
                    let (start, size) = dir_regions.get(&entry.child_path).ok_or_else(|| {
                        Error::corrupt_image(format!(
                            "missing synthesized region for directory '{}'",
                            entry.child_path
                        ))
                    })?;
                    ((*start / SECTOR_SIZE) as u32, *size as u32)
                } else {
                    let (offset, size) = file_placement.get(&entry.child_path).ok_or_else(|| {
                        Error::corrupt_image(format!(
                            "missing synthesized region for file '{}'",
                            entry.child_path
                        ))
                    })?;
                    ((*offset / SECTOR_SIZE) as u32, *size as u32)
                };

                let left_offset = entry
                    .left_child
                    .map(|i| ((dir.entries[i].offset - dir.region_start) / 4) as u16)
                    .unwrap_or(0);
                let right_offset = entry
                    .right_child
                    .map(|i| ((dir.entries[i].offset - dir.region_start) / 4) as u16)
                    .unwrap_or(0);

                toc.insert(
                    RegionKey::Toc(entry.child_path.clone()),
                    Region {
                        offset: entry.offset,
                        size: entry.size,
                        extra: RegionExtra::TocEntry {
                            is_directory: entry.is_directory,
                            left_offset,
                            right_offset,
                            node_sector,
                            node_size,
                            attributes: if entry.is_directory {
                                ATTR_DIRECTORY
                            } else {
                                ATTR_FILE
                            },
                            name: entry.name.clone(),
                        },
                    },
                );

                if !entry.is_directory {
                    let (offset, size) = file_placement[&entry.child_path];
                    toc.insert(
                        RegionKey::File(entry.child_path.clone()),
                        Region {
                            offset,
                            size,
                            extra: RegionExtra::File,
                        },
                    );
                }
            }
        }

        let output_size = toc
            .regions
            .values()
            .map(|r| r.offset + r.size)
            .max()
            .unwrap_or(cur);

        Ok(Self { toc, output_size })
    }
}

fn walk_raw(source: &mut dyn InputSource, relative_dir: &str) -> Result<Vec<RawChild>> {
    let entries = source.list_dir(relative_dir)?;
    let mut children = Vec::with_capacity(entries.len());
    for entry in entries {
        if entry.is_directory {
            let sub = walk_raw(source, &entry.relative_path)?;
            let name = entry
                .relative_path
                .rsplit('/')
                .next()
                .unwrap_or(&entry.relative_path)
                .to_string();
            children.push(RawChild::Dir {
                name,
                children: sub,
            });
        } else {
            let name = entry
                .relative_path
                .rsplit('/')
                .next()
                .unwrap_or(&entry.relative_path)
                .to_string();
            children.push(RawChild::File {
                name,
                size: entry.size,
            });
        }
    }
    Ok(children)
}

/// Flattens the recursively-discovered tree into a `Vec<DirDraft>` in
/// discovery (pre-order-of-directories) order, assigning each directory's
/// entries their within-directory packing order via [`NameTree`].
fn flatten_dirs(path: String, children: Vec<RawChild>, out: &mut Vec<DirDraft>) {
    let mut name_tree: NameTree<RawChild> = NameTree::default();
    for child in children {
        let name = match &child {
            RawChild::File { name, .. } => name.clone(),
            RawChild::Dir { name, .. } => name.clone(),
        };
        name_tree.insert(name.to_lowercase(), child);
    }

    let preorder = name_tree.into_preorder();
    let mut entries = Vec::with_capacity(preorder.len());
    let mut pending_dirs = Vec::new();

    for item in &preorder {
        let (name, is_directory, file_size) = match &item.payload {
            RawChild::File { name, size } => (name.clone(), false, *size),
            RawChild::Dir { name, .. } => (name.clone(), true, 0),
        };
        let child_path = if path.is_empty() {
            format!("/{}", name)
        } else {
            format!("{}/{}", path, name)
        };
        entries.push(EntryDraft {
            name,
            is_directory,
            file_size,
            child_path,
            left_child: item.left_child,
            right_child: item.right_child,
            offset: 0,
            size: 0,
        });
    }

    for item in preorder {
        if let RawChild::Dir { children, .. } = item.payload {
            pending_dirs.push(children);
        }
    }

    let dir_child_paths: Vec<String> = entries
        .iter()
        .filter(|e| e.is_directory)
        .map(|e| e.child_path.clone())
        .collect();

    out.push(DirDraft {
        path,
        entries,
        region_start: 0,
        region_size: 0,
    });

    for (child_path, children) in dir_child_paths.into_iter().zip(pending_dirs) {
        flatten_dirs(child_path, children, out);
    }
}

fn ceil_to_sector(size: u64) -> u64 {
    (size + SECTOR_SIZE - 1) / SECTOR_SIZE * SECTOR_SIZE
}

fn pad_to_4(len: u64) -> u64 {
    (len + 3) / 4 * 4
}

#[cfg(test)]
mod tests {
    use super::*;
    use xiso_serve_core::WalkEntry;

    struct FakeTree {
        // relative_dir -> entries
        dirs: HashMap<String, Vec<WalkEntry>>,
    }

    impl InputSource for FakeTree {
        fn size(&self) -> Result<u64> {
            Ok(0)
        }
        fn read_at(&mut self, _offset: u64, _buf: &mut [u8]) -> Result<()> {
            Ok(())
        }
        fn is_directory_like(&self) -> bool {
            true
        }
        fn list_dir(&self, relative_dir: &str) -> Result<Vec<WalkEntry>> {
            Ok(self.dirs.get(relative_dir).cloned().unwrap_or_default())
        }
    }

    #[test]
    fn test_build_flat_directory() {
        let mut dirs = HashMap::new();
        dirs.insert(
            "".to_string(),
            vec![
                WalkEntry {
                    relative_path: "default.xbe".to_string(),
                    is_directory: false,
                    size: 100,
                },
                WalkEntry {
                    relative_path: "readme.txt".to_string(),
                    is_directory: false,
                    size: 10,
                },
            ],
        );
        let mut source = FakeTree { dirs };
        let builder = DirectoryTocBuilder::build(&mut source).unwrap();

        assert!(builder.toc.header().is_some());
        assert!(builder
            .toc
            .regions
            .contains_key(&RegionKey::File("/default.xbe".to_string())));
        assert!(builder
            .toc
            .regions
            .contains_key(&RegionKey::File("/readme.txt".to_string())));

        let default_xbe = builder.toc.file("/default.xbe").unwrap();
        assert_eq!(default_xbe.offset % SECTOR_SIZE, 0);
        assert_eq!(default_xbe.size, 100);
    }

    #[test]
    fn test_build_nested_directory_links_child_region() {
        let mut dirs = HashMap::new();
        dirs.insert(
            "".to_string(),
            vec![
                WalkEntry {
                    relative_path: "default.xbe".to_string(),
                    is_directory: false,
                    size: 50,
                },
                WalkEntry {
                    relative_path: "media".to_string(),
                    is_directory: true,
                    size: 0,
                },
            ],
        );
        dirs.insert(
            "media".to_string(),
            vec![WalkEntry {
                relative_path: "media/track.wav".to_string(),
                is_directory: false,
                size: 2000,
            }],
        );

        let mut source = FakeTree { dirs };
        let builder = DirectoryTocBuilder::build(&mut source).unwrap();

        let media_entry = builder
            .toc
            .regions
            .get(&RegionKey::Toc("/media".to_string()))
            .unwrap();
        match &media_entry.extra {
            RegionExtra::TocEntry {
                is_directory,
                node_sector,
                node_size,
                ..
            } => {
                assert!(is_directory);
                assert!(*node_size > 0);
                assert_eq!(*node_size as u64 % SECTOR_SIZE, 0);
                assert!(*node_sector >= FIRST_DATA_SECTOR as u32);
            }
            _ => panic!("expected directory TocEntry"),
        }

        assert!(builder
            .toc
            .regions
            .contains_key(&RegionKey::File("/media/track.wav".to_string())));
    }

    #[test]
    fn test_file_data_placed_before_next_directory_toc() {
        let mut dirs = HashMap::new();
        dirs.insert(
            "".to_string(),
            vec![
                WalkEntry {
                    relative_path: "default.xbe".to_string(),
                    is_directory: false,
                    size: 50,
                },
                WalkEntry {
                    relative_path: "media".to_string(),
                    is_directory: true,
                    size: 0,
                },
            ],
        );
        dirs.insert(
            "media".to_string(),
            vec![WalkEntry {
                relative_path: "media/track.wav".to_string(),
                is_directory: false,
                size: 2000,
            }],
        );

        let mut source = FakeTree { dirs };
        let builder = DirectoryTocBuilder::build(&mut source).unwrap();

        let root_toc = builder.toc.regions.get(&RegionKey::Toc("/default.xbe".to_string())).unwrap();
        let root_file = builder.toc.file("/default.xbe").unwrap();
        let media_toc = builder.toc.regions.get(&RegionKey::Toc("/media".to_string())).unwrap();

        // The root's own file data must come after the root's TOC region but
        // strictly before the next directory's ("media") TOC region - i.e.
        // TOC1,FILES1,gap,TOC2,... rather than TOC1,gap,TOC2,...,FILES1.
        assert!(root_file.offset >= root_toc.offset + root_toc.size);
        assert!(root_file.offset + root_file.size <= media_toc.offset);
    }

    #[test]
    fn test_no_entry_straddles_a_sector() {
        let mut entries = Vec::new();
        for i in 0..200 {
            entries.push(WalkEntry {
                relative_path: format!("file{:03}.dat", i),
                is_directory: false,
                size: 4,
            });
        }
        let mut dirs = HashMap::new();
        dirs.insert("".to_string(), entries);
        let mut source = FakeTree { dirs };
        let builder = DirectoryTocBuilder::build(&mut source).unwrap();

        for (key, region) in &builder.toc.regions {
            if matches!(key, RegionKey::Toc(_)) {
                let start_in_sector = region.offset % SECTOR_SIZE;
                assert!(
                    start_in_sector + region.size <= SECTOR_SIZE,
                    "entry {:?} straddles a sector",
                    key
                );
            }
        }
    }
}
