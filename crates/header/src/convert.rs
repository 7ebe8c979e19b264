//! Raw byte decoding into typed sample buffers

// crate modules
use crate::datatype::DataType;
use crate::error::{Error, Result};
use crate::header::Header;

// external crates
use byteorder::{ByteOrder, LittleEndian};
use log::debug;

/// Typed voxel samples after conversion
///
/// Only five storage types survive conversion. Everything else is widened,
/// unpacked, or split into one of these by [convert()].
#[derive(Debug, Clone, PartialEq)]
pub enum VoxelBuffer {
    /// 8-bit unsigned, also used for packed colour bytes
    U8(Vec<u8>),
    /// 16-bit signed
    I16(Vec<i16>),
    /// 16-bit unsigned
    U16(Vec<u16>),
    /// 32-bit float
    F32(Vec<f32>),
    /// 64-bit float
    F64(Vec<f64>),
}

impl VoxelBuffer {
    /// Number of samples
    pub fn len(&self) -> usize {
        match self {
            Self::U8(v) => v.len(),
            Self::I16(v) => v.len(),
            Self::U16(v) => v.len(),
            Self::F32(v) => v.len(),
            Self::F64(v) => v.len(),
        }
    }

    /// True if there are no samples at all
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sample at `index` as an f64, if in range
    pub fn get(&self, index: usize) -> Option<f64> {
        match self {
            Self::U8(v) => v.get(index).map(|&x| x as f64),
            Self::I16(v) => v.get(index).map(|&x| x as f64),
            Self::U16(v) => v.get(index).map(|&x| x as f64),
            Self::F32(v) => v.get(index).map(|&x| x as f64),
            Self::F64(v) => v.get(index).copied(),
        }
    }

    /// True for the floating point variants, which may hold NaN
    pub fn is_float(&self) -> bool {
        matches!(self, Self::F32(_) | Self::F64(_))
    }

    /// Datatype matching the storage of this buffer
    pub fn datatype(&self) -> DataType {
        match self {
            Self::U8(_) => DataType::Uint8,
            Self::I16(_) => DataType::Int16,
            Self::U16(_) => DataType::Uint16,
            Self::F32(_) => DataType::Float32,
            Self::F64(_) => DataType::Float64,
        }
    }

    /// A new buffer holding samples `start..end` of this one
    ///
    /// The range is clamped to the buffer length.
    pub fn slice(&self, start: usize, end: usize) -> Self {
        let end = end.min(self.len());
        let start = start.min(end);
        match self {
            Self::U8(v) => Self::U8(v[start..end].to_vec()),
            Self::I16(v) => Self::I16(v[start..end].to_vec()),
            Self::U16(v) => Self::U16(v[start..end].to_vec()),
            Self::F32(v) => Self::F32(v[start..end].to_vec()),
            Self::F64(v) => Self::F64(v[start..end].to_vec()),
        }
    }
}

/// Result of [convert()]
#[derive(Debug, Clone, PartialEq)]
pub struct ConvertedData {
    /// Samples in one of the supported storage types
    pub buffer: VoxelBuffer,
    /// Imaginary channel, only present for complex input
    pub imaginary: Option<Vec<f32>>,
}

/// Convert raw voxel bytes into a typed [VoxelBuffer]
///
/// Byte order is swapped first where the header byte order differs from this
/// machine and samples are wider than 8 bits. The header is then updated to
/// describe the converted buffer:
///
/// | Input                    | Output                                |
/// |--------------------------|---------------------------------------|
/// | int8                     | int16                                 |
/// | binary (1 bit packed)    | uint8 of 0/1                          |
/// | int32, uint32, int64, uint64 | float64                           |
/// | complex64                | float32 real plus imaginary channel   |
/// | rgb24, rgba32            | uint8 bytes, never swapped            |
/// | anything else supported  | unchanged                             |
///
/// Unknown datatype codes are an error.
///
/// ```rust
/// # use voltools_header::{convert, Header, DataType, VoxelBuffer};
/// let mut header = Header::new([3, 1, 1], DataType::Int8);
/// let converted = convert(&[0xff, 0x00, 0x7f], &mut header).unwrap();
///
/// assert_eq!(converted.buffer, VoxelBuffer::I16(vec![-1, 0, 127]));
/// assert_eq!(header.datatype().unwrap(), DataType::Int16);
/// assert_eq!(header.bits_per_voxel, 16);
/// ```
pub fn convert(raw: &[u8], header: &mut Header) -> Result<ConvertedData> {
    let datatype = header.datatype()?;
    let mut bytes = raw.to_vec();

    if !header.is_native_endian() && datatype.swap_width() > 1 {
        debug!("swapping byte order for {datatype} samples");
        swap_bytes(&mut bytes, datatype.swap_width());
    }
    header.little_endian = cfg!(target_endian = "little");

    let mut imaginary = None;
    let buffer = match datatype {
        DataType::Uint8 | DataType::Rgb24 | DataType::Rgba32 => VoxelBuffer::U8(bytes),
        DataType::Int8 => {
            header.set_datatype(DataType::Int16);
            VoxelBuffer::I16(bytes.iter().map(|&b| b as i8 as i16).collect())
        }
        DataType::Binary => {
            header.set_datatype(DataType::Uint8);
            VoxelBuffer::U8(unpack_bits(&bytes, binary_voxel_count(header)))
        }
        DataType::Int16 => VoxelBuffer::I16(
            bytes
                .chunks_exact(2)
                .map(|c| i16::from_ne_bytes([c[0], c[1]]))
                .collect(),
        ),
        DataType::Uint16 => VoxelBuffer::U16(
            bytes
                .chunks_exact(2)
                .map(|c| u16::from_ne_bytes([c[0], c[1]]))
                .collect(),
        ),
        DataType::Int32 => {
            header.set_datatype(DataType::Float64);
            VoxelBuffer::F64(ne_chunks::<4>(&bytes).map(|c| i32::from_ne_bytes(c) as f64).collect())
        }
        DataType::Uint32 => {
            header.set_datatype(DataType::Float64);
            VoxelBuffer::F64(ne_chunks::<4>(&bytes).map(|c| u32::from_ne_bytes(c) as f64).collect())
        }
        DataType::Int64 => {
            header.set_datatype(DataType::Float64);
            VoxelBuffer::F64(ne_chunks::<8>(&bytes).map(|c| i64::from_ne_bytes(c) as f64).collect())
        }
        DataType::Uint64 => {
            header.set_datatype(DataType::Float64);
            VoxelBuffer::F64(ne_chunks::<8>(&bytes).map(|c| u64::from_ne_bytes(c) as f64).collect())
        }
        DataType::Float32 => {
            VoxelBuffer::F32(ne_chunks::<4>(&bytes).map(f32::from_ne_bytes).collect())
        }
        DataType::Float64 => {
            VoxelBuffer::F64(ne_chunks::<8>(&bytes).map(f64::from_ne_bytes).collect())
        }
        DataType::Complex64 => {
            header.set_datatype(DataType::Float32);
            let pairs: Vec<f32> = ne_chunks::<4>(&bytes).map(f32::from_ne_bytes).collect();
            let (real, imag) = pairs.chunks_exact(2).map(|p| (p[0], p[1])).unzip();
            imaginary = Some(imag);
            VoxelBuffer::F32(real)
        }
    };

    Ok(ConvertedData { buffer, imaginary })
}

/// Encode a converted buffer back to little endian bytes
///
/// Used when re-exporting a volume. The bytes are in the converted storage
/// type, so int8 input comes back as int16 and truncating each value with
/// `as i8` reproduces the original bytes exactly.
///
/// ```rust
/// # use voltools_header::{encode_buffer, VoxelBuffer};
/// let bytes = encode_buffer(&VoxelBuffer::U16(vec![1, 256]));
/// assert_eq!(bytes, vec![1, 0, 0, 1]);
/// ```
pub fn encode_buffer(buffer: &VoxelBuffer) -> Vec<u8> {
    match buffer {
        VoxelBuffer::U8(v) => v.clone(),
        VoxelBuffer::I16(v) => {
            let mut out = vec![0u8; v.len() * 2];
            LittleEndian::write_i16_into(v, &mut out);
            out
        }
        VoxelBuffer::U16(v) => {
            let mut out = vec![0u8; v.len() * 2];
            LittleEndian::write_u16_into(v, &mut out);
            out
        }
        VoxelBuffer::F32(v) => {
            let mut out = vec![0u8; v.len() * 4];
            LittleEndian::write_f32_into(v, &mut out);
            out
        }
        VoxelBuffer::F64(v) => {
            let mut out = vec![0u8; v.len() * 8];
            LittleEndian::write_f64_into(v, &mut out);
            out
        }
    }
}

/// Reverse the byte order of every `width` sized element in place
fn swap_bytes(bytes: &mut [u8], width: usize) {
    match width {
        2 => bytes.chunks_exact_mut(2).for_each(|c| c.swap(0, 1)),
        4 => bytes.chunks_exact_mut(4).for_each(|c| {
            c.swap(0, 3);
            c.swap(1, 2);
        }),
        8 => bytes.chunks_exact_mut(8).for_each(|c| c.reverse()),
        _ => (),
    }
}

/// Iterate over fixed size native endian chunks, dropping any remainder
fn ne_chunks<const N: usize>(bytes: &[u8]) -> impl Iterator<Item = [u8; N]> + '_ {
    bytes.chunks_exact(N).map(|c| {
        let mut chunk = [0u8; N];
        chunk.copy_from_slice(c);
        chunk
    })
}

/// Voxel count for packed binary data, including every 4D frame
fn binary_voxel_count(header: &Header) -> usize {
    header.voxels_per_frame() * header.dims[4].max(1) as usize
}

/// Unpack single bits into 0/1 bytes, most significant bit last
fn unpack_bits(bytes: &[u8], count: usize) -> Vec<u8> {
    const MASK: [u8; 8] = [1, 2, 4, 8, 16, 32, 64, 128];
    let count = count.min(bytes.len() * 8);
    (0..count)
        .map(|i| u8::from(bytes[i >> 3] & MASK[i % 8] != 0))
        .collect()
}

/// Check the raw buffer holds at least one full frame
pub(crate) fn check_frame_length(raw: &[u8], header: &Header) -> Result<()> {
    let expected = header.bytes_per_frame();
    if raw.len() < expected {
        return Err(Error::InsufficientData {
            expected,
            found: raw.len(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binary_is_unpacked_lsb_first() {
        let mut header = Header::new([10, 1, 1], DataType::Binary);
        let converted = convert(&[0b0000_0101, 0b0000_0010], &mut header).unwrap();
        assert_eq!(
            converted.buffer,
            VoxelBuffer::U8(vec![1, 0, 1, 0, 0, 0, 0, 0, 0, 1])
        );
        assert_eq!(header.bits_per_voxel, 8);
    }

    #[test]
    fn complex_splits_channels() {
        let mut header = Header::new([2, 1, 1], DataType::Complex64);
        let raw: Vec<u8> = [1.0_f32, -1.0, 2.0, -2.0]
            .iter()
            .flat_map(|v| v.to_ne_bytes())
            .collect();

        let converted = convert(&raw, &mut header).unwrap();
        assert_eq!(converted.buffer, VoxelBuffer::F32(vec![1.0, 2.0]));
        assert_eq!(converted.imaginary, Some(vec![-1.0, -2.0]));
        assert_eq!(header.datatype().unwrap(), DataType::Float32);
    }

    #[test]
    fn wide_integers_become_float64() {
        let mut header = Header::new([3, 1, 1], DataType::Int32);
        let raw: Vec<u8> = [i32::MIN, 0, i32::MAX]
            .iter()
            .flat_map(|v| v.to_ne_bytes())
            .collect();

        let converted = convert(&raw, &mut header).unwrap();
        assert_eq!(
            converted.buffer,
            VoxelBuffer::F64(vec![i32::MIN as f64, 0.0, i32::MAX as f64])
        );
        assert_eq!(header.bits_per_voxel, 64);
    }

    #[test]
    fn foreign_endian_is_swapped() {
        let mut header = Header::new([2, 1, 1], DataType::Int16);
        header.little_endian = cfg!(target_endian = "big");
        let raw: Vec<u8> = [300_i16, -2]
            .iter()
            .flat_map(|v| v.swap_bytes().to_ne_bytes())
            .collect();

        let converted = convert(&raw, &mut header).unwrap();
        assert_eq!(converted.buffer, VoxelBuffer::I16(vec![300, -2]));
        assert!(header.is_native_endian());
    }

    #[test]
    fn colour_is_never_swapped() {
        let mut header = Header::new([1, 1, 1], DataType::Rgb24);
        header.little_endian = cfg!(target_endian = "big");
        let converted = convert(&[1, 2, 3], &mut header).unwrap();
        assert_eq!(converted.buffer, VoxelBuffer::U8(vec![1, 2, 3]));
    }

    #[test]
    fn unknown_code_is_an_error() {
        let mut header = Header::default();
        header.datatype_code = 3;
        assert!(matches!(
            convert(&[0], &mut header),
            Err(Error::UnsupportedDatatype(3))
        ));
    }
}
