//! # xiso-serve-core
//!
//! Shared types for the XISO on-demand materializer: the error type,
//! input-validation helpers, the TOC data model, the offset-indexed
//! search tree, and the `InputSource` trait every concrete byte provider
//! implements (passthrough image, loose directory, zip, CHD stub).
//!
//! ## Example
//!
//! ```rust,no_run
//! use xiso_serve_core::{InputSource, Result};
//!
//! fn read_header(src: &mut dyn InputSource) -> Result<Vec<u8>> {
//!     let mut buf = vec![0u8; 20];
//!     src.read_at(32 * 2048, &mut buf)?;
//!     Ok(buf)
//! }
//! ```

pub mod error;
pub mod input_source;
pub mod model;
pub mod search_tree;
pub mod security;

pub use error::{Error, Result};
pub use input_source::{InputSource, WalkEntry};
pub use model::{
    ceil_to_sector, Region, RegionExtra, RegionKey, TocModel, ATTR_DIRECTORY, ATTR_FILE,
    FULL_DUMP_DATA_OFFSET, HEADER_MAGIC, HEADER_OFFSET, SECTOR_SIZE, XBE_CERT_ADDRESS_OFFSET,
    XBE_CERT_LENGTH, XBE_HEADER,
};
pub use search_tree::{Entry, SearchTree};
pub use security::{
    checked_multiply_u64, u64_to_usize, validate_allocation_size, validate_file_path,
    validate_file_path_in_dirs, MAX_ALLOCATION_SIZE, MAX_DIRECTORY_ENTRIES, MAX_MMAP_SIZE,
};
