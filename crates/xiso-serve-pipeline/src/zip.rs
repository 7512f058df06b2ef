//! Experimental `InputSource` over a `.zip` archive containing an extracted
//! game directory tree (a `default.xbe` entry plus its sibling files),
//! grounded on the reference `zip_reader.py`.
//!
//! Random access into a compressed zip member requires decompressing it;
//! there is no way to seek within the deflate stream itself. Each member is
//! decompressed in full on first access and cached, matching the reference
//! implementation's own warning that "seek is slow with large files" - this
//! crate trades that cost for correctness rather than attempting partial
//! decompression. Directory metadata (name, size, is-dir) is indexed once at
//! open time since `ZipArchive`'s lookups need `&mut self`, while the
//! `InputSource::list_dir`/`sub_size` surface is `&self`.

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use zip::ZipArchive;

use xiso_serve_core::security::MAX_DIRECTORY_ENTRIES;
use xiso_serve_core::{Error, InputSource, Result, WalkEntry};

#[derive(Clone)]
struct EntryMeta {
    is_directory: bool,
    size: u64,
}

pub struct ZipInputSource {
    archive: ZipArchive<File>,
    entries: HashMap<String, EntryMeta>,
    cache: HashMap<String, Vec<u8>>,
    /// The archive member matched against the initial sniff pattern
    /// (normally `default.xbe`), used for `size`/`read_at`.
    default_member: String,
}

impl ZipInputSource {
    /// Open `path` as a zip archive and locate the member matching
    /// `pattern` (a filename, not a glob - matched by exact basename
    /// equality against any archive entry).
    pub fn open(path: &Path, pattern: &str) -> Result<Self> {
        let file = File::open(path).map_err(|e| {
            Error::input_not_found(format!("cannot open '{}': {}", path.display(), e))
        })?;
        let mut archive = ZipArchive::new(file)
            .map_err(|e| Error::unrecognized_format(format!("not a zip archive: {}", e)))?;

        let mut entries = HashMap::new();
        let mut default_member = None;
        if archive.len() > MAX_DIRECTORY_ENTRIES {
            return Err(Error::corrupt_image(format!(
                "archive has more than {} entries",
                MAX_DIRECTORY_ENTRIES
            )));
        }
        for i in 0..archive.len() {
            let entry = archive
                .by_index(i)
                .map_err(|e| Error::input_not_found(e.to_string()))?;
            let name = entry.name().trim_end_matches('/').to_string();
            if name.is_empty() {
                continue;
            }
            let is_directory = entry.is_dir();
            let size = entry.size();
            if !is_directory
                && Path::new(&name)
                    .file_name()
                    .map(|n| n == pattern)
                    .unwrap_or(false)
            {
                default_member = Some(name.clone());
            }
            entries.insert(name, EntryMeta { is_directory, size });
        }

        let default_member = default_member.ok_or_else(|| {
            Error::unrecognized_format(format!("no member matching '{}' in archive", pattern))
        })?;

        Ok(Self {
            archive,
            entries,
            cache: HashMap::new(),
            default_member,
        })
    }

    fn decompressed(&mut self, member: &str) -> Result<&[u8]> {
        if !self.cache.contains_key(member) {
            let mut entry = self.archive.by_name(member).map_err(|e| {
                Error::input_not_found(format!("no member '{}' in archive: {}", member, e))
            })?;
            let mut data = Vec::with_capacity(entry.size() as usize);
            entry.read_to_end(&mut data)?;
            self.cache.insert(member.to_string(), data);
        }
        Ok(self.cache.get(member).unwrap())
    }

    fn meta(&self, relative_path: &str) -> Result<&EntryMeta> {
        self.entries
            .get(relative_path)
            .ok_or_else(|| Error::input_not_found(format!("no member '{}' in archive", relative_path)))
    }
}

impl InputSource for ZipInputSource {
    fn size(&self) -> Result<u64> {
        Ok(self.meta(&self.default_member)?.size)
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let member = self.default_member.clone();
        let data = self.decompressed(&member)?;
        let start = offset as usize;
        let end = start
            .checked_add(buf.len())
            .filter(|&e| e <= data.len())
            .ok_or_else(|| {
                Error::range_invalid(format!(
                    "read of {} bytes at offset {} exceeds member size {}",
                    buf.len(),
                    offset,
                    data.len()
                ))
            })?;
        buf.copy_from_slice(&data[start..end]);
        Ok(())
    }

    fn is_directory_like(&self) -> bool {
        true
    }

    fn list_dir(&self, relative_dir: &str) -> Result<Vec<WalkEntry>> {
        let mut entries: Vec<WalkEntry> = self
            .entries
            .iter()
            .filter_map(|(name, meta)| {
                let parent = match name.rfind('/') {
                    Some(idx) => &name[..idx],
                    None => "",
                };
                if parent != relative_dir {
                    return None;
                }
                Some(WalkEntry {
                    relative_path: name.clone(),
                    is_directory: meta.is_directory,
                    size: meta.size,
                })
            })
            .collect();
        entries.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
        Ok(entries)
    }

    fn sub_size(&self, relative_path: &str) -> Result<u64> {
        Ok(self.meta(relative_path)?.size)
    }

    fn read_sub_at(&mut self, relative_path: &str, offset: u64, buf: &mut [u8]) -> Result<()> {
        let data = self.decompressed(relative_path)?;
        let start = offset as usize;
        let end = start
            .checked_add(buf.len())
            .filter(|&e| e <= data.len())
            .ok_or_else(|| {
                Error::range_invalid(format!(
                    "read of {} bytes at offset {} exceeds member '{}' size {}",
                    buf.len(),
                    offset,
                    relative_path,
                    data.len()
                ))
            })?;
        buf.copy_from_slice(&data[start..end]);
        Ok(())
    }

    fn root_path(&self) -> Option<PathBuf> {
        None
    }

    fn matches(&mut self, pattern: &[u8]) -> Result<bool> {
        // Archive-level sniffing is done by filename glob in `open`, not by
        // magic bytes; a successfully opened archive with a located member
        // is itself the positive match.
        let _ = pattern;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;
    use zip::write::SimpleFileOptions;

    fn make_archive() -> NamedTempFile {
        let tmp = NamedTempFile::new().unwrap();
        {
            let mut writer = zip::ZipWriter::new(tmp.reopen().unwrap());
            let opts = SimpleFileOptions::default();
            writer.start_file("default.xbe", opts).unwrap();
            writer.write_all(b"XBEH0123").unwrap();
            writer.add_directory("media", opts).unwrap();
            writer.start_file("media/track.wav", opts).unwrap();
            writer.write_all(b"hello").unwrap();
            writer.finish().unwrap();
        }
        tmp
    }

    #[test]
    fn test_zip_source_reads_default_member() {
        let tmp = make_archive();
        let mut src = ZipInputSource::open(tmp.path(), "default.xbe").unwrap();
        assert_eq!(src.size().unwrap(), 8);
        let mut buf = [0u8; 4];
        src.read_at(0, &mut buf).unwrap();
        assert_eq!(&buf, b"XBEH");
    }

    #[test]
    fn test_zip_source_read_sub_at() {
        let tmp = make_archive();
        let mut src = ZipInputSource::open(tmp.path(), "default.xbe").unwrap();
        assert_eq!(src.sub_size("media/track.wav").unwrap(), 5);
        let mut buf = [0u8; 5];
        src.read_sub_at("media/track.wav", 0, &mut buf).unwrap();
        assert_eq!(&buf, b"hello");
    }

    #[test]
    fn test_zip_source_list_dir() {
        let tmp = make_archive();
        let src = ZipInputSource::open(tmp.path(), "default.xbe").unwrap();
        let root = src.list_dir("").unwrap();
        assert!(root.iter().any(|e| e.relative_path == "default.xbe"));
        assert!(root.iter().any(|e| e.relative_path == "media" && e.is_directory));
        let media = src.list_dir("media").unwrap();
        assert_eq!(media.len(), 1);
        assert_eq!(media[0].relative_path, "media/track.wav");
    }
}
