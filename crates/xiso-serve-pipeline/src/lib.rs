//! # xiso-serve-pipeline
//!
//! Concrete `InputSource` implementations for every kind of input the
//! materializer can mount:
//! - **passthrough** (`image`): an existing XISO/Redump file, via
//!   [`MmapPipeline`] or [`PartialPipeline`] depending on size.
//! - **directory**: a loose, extracted game directory tree.
//! - **zip**: a zip archive of a loose game directory.
//! - **chd**: stubbed out (see [`chd`] module docs) - reports itself
//!   unavailable rather than attempting CHD sector decompression.
//!
//! ## Example
//!
//! ```rust,no_run
//! use xiso_serve_pipeline::{PartialPipeline, MmapPipeline};
//! use std::path::Path;
//! use std::io::{Read, Seek, SeekFrom};
//!
//! // Open a file with memory mapping
//! let mut mmap = MmapPipeline::open(Path::new("disk.img")).unwrap();
//!
//! // Create a partial view (e.g., for a sub-region)
//! let mut partial = PartialPipeline::new(mmap, 0x8000, 0x100000).unwrap();
//!
//! // Read from the partial view
//! let mut buf = [0u8; 512];
//! partial.read(&mut buf).unwrap();
//! ```

pub mod chd;
pub mod directory;
pub mod image;
pub mod mmap;
pub mod partial;
pub mod zip;

pub use chd::ChdInputSource;
pub use directory::DirectoryInputSource;
pub use image::ImageInputSource;
pub use mmap::MmapPipeline;
pub use partial::PartialPipeline;
pub use zip::ZipInputSource;
