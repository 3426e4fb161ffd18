//!
//! Base types, traits and utils.
//!

use std::collections::TryReserveError;
use std::path::PathBuf;
use thiserror::Error;

/// Pxanim error type.
#[derive(Error, Debug)]
pub enum AnimError {
    /// Input file cannot be opened.
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),
    /// Working buffer cannot be reserved.
    #[error("Allocation failure: {0} bytes")]
    AllocationFailure(usize),

    /// Container offsets or lengths are inconsistent, or the file is truncated.
    #[error("Malformed container: {0}")]
    MalformedContainer(String),
    /// The transform codec rejected the blob.
    #[error("Failed to read anim: {0}")]
    CodecInitFailure(String),
    /// The transform codec produced no output for the track batch.
    #[error("Failed to compress anim: {0}")]
    CompressFailure(String),
    /// A decoded frame is missing a rotation, translation or scale.
    #[error("Incomplete sample: frame {frame}, bone {bone}")]
    IncompleteSample { frame: u32, bone: u32 },

    /// Flat stream is shorter than its header declares.
    #[error("Truncated stream: expected {expected} bytes, got {actual}")]
    TruncatedStream { expected: usize, actual: usize },
    /// Std io errors.
    #[error("IO error: {0}")]
    IO(std::io::ErrorKind),

    /// Invalid argument passed to a public entry point.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl From<std::io::Error> for AnimError {
    fn from(err: std::io::Error) -> Self {
        AnimError::IO(err.kind())
    }
}

impl AnimError {
    pub(crate) fn malformed(msg: impl Into<String>) -> AnimError {
        AnimError::MalformedContainer(msg.into())
    }

    pub fn is_file_not_found(&self) -> bool {
        matches!(self, AnimError::FileNotFound(_))
    }

    pub fn is_allocation_failure(&self) -> bool {
        matches!(self, AnimError::AllocationFailure(_))
    }

    pub fn is_malformed_container(&self) -> bool {
        matches!(self, AnimError::MalformedContainer(_))
    }

    pub fn is_codec_init_failure(&self) -> bool {
        matches!(self, AnimError::CodecInitFailure(_))
    }

    pub fn is_compress_failure(&self) -> bool {
        matches!(self, AnimError::CompressFailure(_))
    }

    pub fn is_incomplete_sample(&self) -> bool {
        matches!(self, AnimError::IncompleteSample { .. })
    }

    pub fn is_truncated_stream(&self) -> bool {
        matches!(self, AnimError::TruncatedStream { .. })
    }

    pub fn is_io(&self) -> bool {
        matches!(self, AnimError::IO(_))
    }

    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, AnimError::InvalidArgument(_))
    }
}

/// Reserves an empty `Vec<T>` able to hold `count` elements without reallocating.
///
/// Reports `AllocationFailure` with the requested byte size instead of aborting.
pub fn try_alloc<T>(count: usize) -> Result<Vec<T>, AnimError> {
    let mut buffer = Vec::new();
    buffer
        .try_reserve_exact(count)
        .map_err(|_: TryReserveError| AnimError::AllocationFailure(count.saturating_mul(std::mem::size_of::<T>())))?;
    Ok(buffer)
}

/// Number of zero bytes emitted after a blob of `size` bytes so that the
/// following data starts on a 16-byte boundary.
///
/// An already aligned blob still receives a full 16 bytes of padding, readers
/// locate the footer through the header sizes and rely on it.
#[inline(always)]
pub const fn padding_len(size: usize) -> usize {
    16 - size % 16
}
