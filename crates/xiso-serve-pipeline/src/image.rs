//! Passthrough `InputSource` over an existing XISO (or Redump full-dump)
//! file on disk.

use crate::{MmapPipeline, PartialPipeline};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use xiso_serve_core::{security::MAX_MMAP_SIZE, Error, InputSource, Result};

/// Either a memory-mapped view of the whole image (fast path) or a plain
/// file handle with positional seeks (for images above
/// [`MAX_MMAP_SIZE`], or platforms where mapping fails).
enum Backing {
    Mapped(MmapPipeline),
    File(File),
}

/// A raw XISO/Redump disc image addressed by absolute byte offset, with
/// an optional [`FULL_DUMP_DATA_OFFSET`](xiso_serve_core::FULL_DUMP_DATA_OFFSET)
/// translation applied transparently by the caller's TocBuilder - this
/// source itself only ever sees the offsets it is asked for.
pub struct ImageInputSource {
    backing: Backing,
    size: u64,
    root: PathBuf,
}

impl ImageInputSource {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| {
            Error::input_not_found(format!("cannot open '{}': {}", path.display(), e))
        })?;
        let size = file.metadata().map_err(Error::from)?.len();

        let backing = if size <= MAX_MMAP_SIZE {
            match MmapPipeline::from_file(&file) {
                Ok(mmap) => Backing::Mapped(mmap),
                Err(_) => Backing::File(file),
            }
        } else {
            Backing::File(file)
        };

        Ok(Self {
            backing,
            size,
            root: path.to_path_buf(),
        })
    }
}

impl InputSource for ImageInputSource {
    fn size(&self) -> Result<u64> {
        Ok(self.size)
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        if offset.saturating_add(buf.len() as u64) > self.size {
            return Err(Error::range_invalid(format!(
                "read of {} bytes at offset {} exceeds image size {}",
                buf.len(),
                offset,
                self.size
            )));
        }

        match &mut self.backing {
            Backing::Mapped(mmap) => {
                let mut window = PartialPipeline::new(
                    MmapPipelineCursor(mmap),
                    offset,
                    buf.len() as u64,
                )?;
                window.read_exact(buf)?;
            }
            Backing::File(file) => {
                file.seek(SeekFrom::Start(offset))?;
                file.read_exact(buf)?;
            }
        }

        Ok(())
    }

    fn root_path(&self) -> Option<PathBuf> {
        Some(self.root.clone())
    }
}

/// `MmapPipeline` owns its position as internal state and isn't `Clone`,
/// so wrap a `&mut` reference to let `PartialPipeline` seek within it
/// without taking ownership away from `ImageInputSource`.
struct MmapPipelineCursor<'a>(&'a mut MmapPipeline);

impl<'a> Read for MmapPipelineCursor<'a> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.0.read(buf)
    }
}

impl<'a> Seek for MmapPipelineCursor<'a> {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        self.0.seek(pos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_image_input_source_read_at() {
        let mut tmpfile = NamedTempFile::new().unwrap();
        let data: Vec<u8> = (0..=255u8).collect();
        tmpfile.write_all(&data).unwrap();
        tmpfile.flush().unwrap();

        let mut src = ImageInputSource::open(tmpfile.path()).unwrap();
        assert_eq!(src.size().unwrap(), 256);

        let mut buf = [0u8; 4];
        src.read_at(10, &mut buf).unwrap();
        assert_eq!(buf, [10, 11, 12, 13]);
    }

    #[test]
    fn test_image_input_source_out_of_range() {
        let mut tmpfile = NamedTempFile::new().unwrap();
        tmpfile.write_all(&[0u8; 16]).unwrap();
        tmpfile.flush().unwrap();

        let mut src = ImageInputSource::open(tmpfile.path()).unwrap();
        let mut buf = [0u8; 32];
        assert!(src.read_at(0, &mut buf).is_err());
    }
}
