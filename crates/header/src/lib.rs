//! Header codecs and raw voxel decoding for neuroimaging volumes
//!
//! The first two stages of the load pipeline live here:
//!
//! 1. A [FormatReader] turns the bytes of a file into a populated [Header]
//!    and the raw voxel bytes that follow it
//! 2. [convert()] swaps byte order where needed and maps the raw bytes to a
//!    typed [VoxelBuffer]
//!
//! ```rust
//! # use voltools_header::{convert, parse_header, serialize_header, Header, DataType};
//! // Build a small header, write it out, and read it back in
//! let header = Header::new([2, 2, 1], DataType::Uint8);
//! let bytes = serialize_header(&header);
//! let parsed = parse_header(&bytes).unwrap();
//! assert_eq!(parsed.dims[1..4], [2, 2, 1]);
//!
//! // Decode four voxels worth of raw data
//! let mut parsed = parsed;
//! let converted = convert(&[0, 1, 2, 3], &mut parsed).unwrap();
//! assert_eq!(converted.buffer.len(), 4);
//! ```

// Split into subfiles for development, but anything important is re-exported
mod codec;
mod convert;
mod datatype;
mod error;
mod header;
mod reader;

// Inline anything important for a nice public API
#[doc(inline)]
pub use codec::{parse_header, serialize_header, NIFTI1_HEADER_SIZE, NIFTI2_HEADER_SIZE};

#[doc(inline)]
pub use convert::{convert, encode_buffer, ConvertedData, VoxelBuffer};

#[doc(inline)]
pub use datatype::{DataType, INTENT_LABEL};

#[doc(inline)]
pub use header::{AffineSource, Header, NiftiVersion};

#[doc(inline)]
pub use reader::{
    decompress_if_gzip, detect_format, is_gzip, read_volume_bytes, read_volume_file,
    FormatReader, MghReader, NiftiReader, NrrdReader, VolumeFormat,
};

#[doc(inline)]
pub use error::{Error, Result};
