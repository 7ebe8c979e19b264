//! Datatype codes as stored in the header

// crate modules
use crate::error::{Error, Result};

// external crates
use serde::{Deserialize, Serialize};

/// Intent code marking a volume as a discrete label atlas
pub const INTENT_LABEL: i16 = 1002;

/// Storage type of the voxel samples
///
/// Discriminants are the on-disk datatype codes so that conversion to and
/// from the header is a simple cast.
///
/// ```rust
/// # use voltools_header::DataType;
/// let dt = DataType::try_from(16).unwrap();
/// assert_eq!(dt, DataType::Float32);
/// assert_eq!(dt.bits_per_voxel(), 32);
/// assert_eq!(dt.code(), 16);
///
/// // Unknown codes are an error rather than a guess
/// assert!(DataType::try_from(3).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i16)]
pub enum DataType {
    /// Packed single bits
    Binary = 1,
    /// 8-bit unsigned integer
    Uint8 = 2,
    /// 16-bit signed integer
    Int16 = 4,
    /// 32-bit signed integer
    Int32 = 8,
    /// 32-bit float
    Float32 = 16,
    /// Interleaved 32-bit real/imaginary pairs
    Complex64 = 32,
    /// 64-bit float
    Float64 = 64,
    /// Interleaved 8-bit red, green, blue
    Rgb24 = 128,
    /// 8-bit signed integer
    Int8 = 256,
    /// 16-bit unsigned integer
    Uint16 = 512,
    /// 32-bit unsigned integer
    Uint32 = 768,
    /// 64-bit signed integer
    Int64 = 1024,
    /// 64-bit unsigned integer
    Uint64 = 1280,
    /// Interleaved 8-bit red, green, blue, alpha
    Rgba32 = 2304,
}

impl DataType {
    /// On-disk datatype code
    pub fn code(&self) -> i16 {
        *self as i16
    }

    /// Number of bits used by a single voxel
    pub fn bits_per_voxel(&self) -> u16 {
        match self {
            Self::Binary => 1,
            Self::Uint8 | Self::Int8 => 8,
            Self::Int16 | Self::Uint16 => 16,
            Self::Rgb24 => 24,
            Self::Int32 | Self::Uint32 | Self::Float32 | Self::Rgba32 => 32,
            Self::Float64 | Self::Int64 | Self::Uint64 | Self::Complex64 => 64,
        }
    }

    /// Width of a single component for byte swapping
    ///
    /// Complex pairs swap as two 32-bit floats and colour types never swap.
    pub fn swap_width(&self) -> usize {
        match self {
            Self::Binary | Self::Uint8 | Self::Int8 | Self::Rgb24 | Self::Rgba32 => 1,
            Self::Int16 | Self::Uint16 => 2,
            Self::Int32 | Self::Uint32 | Self::Float32 | Self::Complex64 => 4,
            Self::Float64 | Self::Int64 | Self::Uint64 => 8,
        }
    }

    /// True for the interleaved colour types
    pub fn is_rgb(&self) -> bool {
        matches!(self, Self::Rgb24 | Self::Rgba32)
    }

    /// True where no sample can hold a NaN
    pub fn is_integer(&self) -> bool {
        !matches!(self, Self::Float32 | Self::Float64 | Self::Complex64)
    }
}

impl TryFrom<i16> for DataType {
    type Error = Error;

    fn try_from(code: i16) -> Result<Self> {
        Ok(match code {
            1 => Self::Binary,
            2 => Self::Uint8,
            4 => Self::Int16,
            8 => Self::Int32,
            16 => Self::Float32,
            32 => Self::Complex64,
            64 => Self::Float64,
            128 => Self::Rgb24,
            256 => Self::Int8,
            512 => Self::Uint16,
            768 => Self::Uint32,
            1024 => Self::Int64,
            1280 => Self::Uint64,
            2304 => Self::Rgba32,
            _ => return Err(Error::UnsupportedDatatype(code)),
        })
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Binary => "binary",
            Self::Uint8 => "uint8",
            Self::Int16 => "int16",
            Self::Int32 => "int32",
            Self::Float32 => "float32",
            Self::Complex64 => "complex64",
            Self::Float64 => "float64",
            Self::Rgb24 => "rgb24",
            Self::Int8 => "int8",
            Self::Uint16 => "uint16",
            Self::Uint32 => "uint32",
            Self::Int64 => "int64",
            Self::Uint64 => "uint64",
            Self::Rgba32 => "rgba32",
        };
        write!(f, "{name}")
    }
}
