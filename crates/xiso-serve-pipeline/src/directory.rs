//! `InputSource` over a loose, extracted game directory tree.
//!
//! The root is the directory containing `default.xbe`, matching
//! `DirectoryParser.get_root()` in the reference implementation (the parent
//! of the input file, not the input file itself). Flat addressing
//! (`read_at`/`size`) is defined over `default.xbe` specifically, since that
//! is the file the caller originally pointed the sniff at; the Directory
//! TocBuilder never calls `read_at` once it has switched to directory-walk
//! reads, as the synthesized output's size and geometry are its own to
//! compute.

use std::fs::{self, File};
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use xiso_serve_core::security::MAX_DIRECTORY_ENTRIES;
use xiso_serve_core::{Error, InputSource, Result, WalkEntry};

pub struct DirectoryInputSource {
    root: PathBuf,
    default_xbe: PathBuf,
}

impl DirectoryInputSource {
    /// Open a directory-mode source rooted at the parent of `default_xbe_path`.
    pub fn open(default_xbe_path: &Path) -> Result<Self> {
        if !default_xbe_path.is_file() {
            return Err(Error::input_not_found(format!(
                "'{}' is not a file",
                default_xbe_path.display()
            )));
        }

        let root = default_xbe_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        Ok(Self {
            root,
            default_xbe: default_xbe_path.to_path_buf(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl InputSource for DirectoryInputSource {
    fn size(&self) -> Result<u64> {
        Ok(fs::metadata(&self.default_xbe)?.len())
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let mut f = File::open(&self.default_xbe)?;
        f.seek(SeekFrom::Start(offset))?;
        f.read_exact(buf)?;
        Ok(())
    }

    fn is_directory_like(&self) -> bool {
        true
    }

    fn list_dir(&self, relative_dir: &str) -> Result<Vec<WalkEntry>> {
        let dir_path = if relative_dir.is_empty() {
            self.root.clone()
        } else {
            self.root.join(relative_dir)
        };

        let read_dir = fs::read_dir(&dir_path).map_err(|e| {
            Error::input_not_found(format!("cannot list '{}': {}", dir_path.display(), e))
        })?;

        let mut entries = Vec::new();
        for dir_entry in read_dir {
            let dir_entry = dir_entry?;
            let file_type = dir_entry.file_type()?;
            let name = dir_entry.file_name().to_string_lossy().into_owned();
            let relative_path = if relative_dir.is_empty() {
                name
            } else {
                format!("{}/{}", relative_dir, name)
            };

            if file_type.is_dir() {
                entries.push(WalkEntry {
                    relative_path,
                    is_directory: true,
                    size: 0,
                });
            } else if file_type.is_file() {
                let size = dir_entry.metadata()?.len();
                entries.push(WalkEntry {
                    relative_path,
                    is_directory: false,
                    size,
                });
            }

            if entries.len() > MAX_DIRECTORY_ENTRIES {
                return Err(Error::corrupt_image(format!(
                    "directory '{}' has more than {} entries",
                    dir_path.display(),
                    MAX_DIRECTORY_ENTRIES
                )));
            }
        }

        Ok(entries)
    }

    fn sub_size(&self, relative_path: &str) -> Result<u64> {
        Ok(fs::metadata(self.root.join(relative_path))?.len())
    }

    fn read_sub_at(&mut self, relative_path: &str, offset: u64, buf: &mut [u8]) -> Result<()> {
        let mut f = File::open(self.root.join(relative_path))?;
        f.seek(SeekFrom::Start(offset))?;
        f.read_exact(buf)?;
        Ok(())
    }

    fn root_path(&self) -> Option<PathBuf> {
        Some(self.root.clone())
    }

    fn matches(&mut self, pattern: &[u8]) -> Result<bool> {
        let total = self.size()?;
        if total < pattern.len() as u64 {
            return Ok(false);
        }
        let mut buf = vec![0u8; pattern.len()];
        self.read_at(0, &mut buf)?;
        Ok(buf == pattern)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_directory_source_reads_default_xbe() {
        let dir = tempdir().unwrap();
        let xbe_path = dir.path().join("default.xbe");
        {
            let mut f = File::create(&xbe_path).unwrap();
            f.write_all(b"XBEH0123").unwrap();
        }

        let mut src = DirectoryInputSource::open(&xbe_path).unwrap();
        assert_eq!(src.size().unwrap(), 8);
        assert!(src.matches(b"XBEH").unwrap());
        assert_eq!(src.root(), dir.path());
    }

    #[test]
    fn test_directory_source_list_and_read_sub() {
        let dir = tempdir().unwrap();
        File::create(dir.path().join("default.xbe")).unwrap();
        fs::create_dir(dir.path().join("media")).unwrap();
        {
            let mut f = File::create(dir.path().join("media/track.wav")).unwrap();
            f.write_all(b"hello").unwrap();
        }

        let mut src = DirectoryInputSource::open(&dir.path().join("default.xbe")).unwrap();
        let root_entries = src.list_dir("").unwrap();
        assert!(root_entries.iter().any(|e| e.relative_path == "media" && e.is_directory));
        assert!(root_entries
            .iter()
            .any(|e| e.relative_path == "default.xbe" && !e.is_directory));

        let media_entries = src.list_dir("media").unwrap();
        assert_eq!(media_entries.len(), 1);
        assert_eq!(media_entries[0].relative_path, "media/track.wav");
        assert_eq!(src.sub_size("media/track.wav").unwrap(), 5);

        let mut buf = [0u8; 5];
        src.read_sub_at("media/track.wav", 0, &mut buf).unwrap();
        assert_eq!(&buf, b"hello");
    }
}
