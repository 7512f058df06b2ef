//! Central error type shared by every component of the XISO materializer.

use thiserror::Error;

/// The error type for XISO materialization operations.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error reading or seeking an input source.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The requested path does not exist or is unreadable.
    #[error("input not found: {0}")]
    InputNotFound(String),

    /// No TocBuilder recognizes the input.
    #[error("unrecognized image format: {0}")]
    UnrecognizedFormat(String),

    /// An XISO header magic is present but the volume is internally
    /// inconsistent (root sector/size out of range, cyclic tree, etc).
    #[error("corrupt image: {0}")]
    CorruptImage(String),

    /// A patch operation refers to bytes that could not be found, or to an
    /// unknown target file. The operation is dropped; the image is still
    /// served.
    #[error("patch unresolvable: {0}")]
    PatchUnresolvable(String),

    /// A patch file failed its schema or magic check. The whole file is
    /// dropped with a log; other patches continue.
    #[error("invalid patch format: {0}")]
    PatchFormatInvalid(String),

    /// An HTTP `Range` header was malformed or fell outside the resource.
    #[error("invalid range: {0}")]
    RangeInvalid(String),

    /// A capability that a concrete `InputSource` does not implement
    /// (e.g. directory operations on a CHD-backed source).
    #[error("not available: {0}")]
    Unavailable(String),
}

/// Result type alias used throughout the crate family.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn input_not_found(msg: impl Into<String>) -> Self {
        Error::InputNotFound(msg.into())
    }

    pub fn unrecognized_format(msg: impl Into<String>) -> Self {
        Error::UnrecognizedFormat(msg.into())
    }

    pub fn corrupt_image(msg: impl Into<String>) -> Self {
        Error::CorruptImage(msg.into())
    }

    pub fn patch_unresolvable(msg: impl Into<String>) -> Self {
        Error::PatchUnresolvable(msg.into())
    }

    pub fn patch_format_invalid(msg: impl Into<String>) -> Self {
        Error::PatchFormatInvalid(msg.into())
    }

    pub fn range_invalid(msg: impl Into<String>) -> Self {
        Error::RangeInvalid(msg.into())
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        Error::Unavailable(msg.into())
    }
}
