//! Result and Error types for the header module

/// Type alias for `Result<T, header::Error>`
pub type Result<T> = core::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
/// The error type for `voltools-header`
///
/// Every variant is fatal to the single load that raised it, but never to
/// anything else already in memory.
pub enum Error {
    /// Underlying file I/O error
    #[error("failure in file I/O")]
    IOError(#[from] std::io::Error),

    /// The signature bytes do not match any expected magic
    #[error("unrecognised header signature {found:?}")]
    InvalidSignature { found: Vec<u8> },

    /// Header declares a size that is not 348 or 540 in either byte order
    #[error("unrecognised header size {0}")]
    InvalidHeaderSize(i32),

    /// Fewer bytes than the header itself requires
    #[error("header truncated (expected {expected:?} bytes, found {found:?})")]
    TruncatedHeader { expected: usize, found: usize },

    /// A dimension that should be positive is zero or negative
    #[error("dimension {axis} is not positive ({value})")]
    NonPositiveDimension { axis: usize, value: i64 },

    /// Rank outside of the 1..=7 range allowed by the header
    #[error("invalid number of dimensions {0}")]
    InvalidRank(i64),

    /// Datatype code with no known conversion
    #[error("unsupported datatype code {0}")]
    UnsupportedDatatype(i16),

    /// Raw buffer does not hold even a single frame
    #[error("voxel data too short (expected at least {expected:?} bytes, found {found:?})")]
    InsufficientData { expected: usize, found: usize },

    /// None of the readers recognised the byte stream
    #[error("unable to determine volume format for {0:?}")]
    UnknownFormat(String),

    /// A textual header field that could not be interpreted
    #[error("invalid header field {field:?}: {reason}")]
    InvalidField { field: String, reason: String },
}
