//! Result and Error types for the volume module

/// Type alias for `Result<T, volume::Error>`
pub type Result<T> = core::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
/// The error type for `voltools-volume`
pub enum Error {
    /// Failure while reading or decoding the header and raw data
    #[error(transparent)]
    Header(#[from] voltools_header::Error),

    /// The voxel to world transform can not be inverted
    #[error("spatial transform is singular")]
    SingularTransform,

    /// Requested 4D frame does not exist
    #[error("frame {frame} out of range ({frames} frames loaded)")]
    FrameOutOfRange { frame: usize, frames: usize },

    /// Sample buffer is not a whole number of frames for the header
    #[error("buffer of {found} samples is not a multiple of {frame_size} voxels")]
    BufferLength { frame_size: usize, found: usize },

    /// Label colour table with inconsistent channel lengths
    #[error("invalid label colour table: {0}")]
    InvalidColorMap(String),
}
