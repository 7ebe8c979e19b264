//! Binary NIfTI-1 and NIfTI-2 header encoding
//!
//! Byte order is detected from the leading `sizeof_hdr` field, which must be
//! 348 (NIfTI-1) or 540 (NIfTI-2) when read with the correct endianness.

// crate modules
use crate::error::{Error, Result};
use crate::header::{Header, NiftiVersion};

// external crates
use byteorder::{BigEndian, ByteOrder, LittleEndian};
use log::trace;

/// Size of a NIfTI-1 header in bytes
pub const NIFTI1_HEADER_SIZE: usize = 348;

/// Size of a NIfTI-2 header in bytes
pub const NIFTI2_HEADER_SIZE: usize = 540;

/// NIfTI-1 field byte offsets
mod v1 {
    pub const DIM: usize = 40;
    pub const INTENT_CODE: usize = 68;
    pub const DATATYPE: usize = 70;
    pub const BITPIX: usize = 72;
    pub const PIXDIM: usize = 76;
    pub const VOX_OFFSET: usize = 108;
    pub const SCL_SLOPE: usize = 112;
    pub const SCL_INTER: usize = 116;
    pub const XYZT_UNITS: usize = 123;
    pub const CAL_MAX: usize = 124;
    pub const CAL_MIN: usize = 128;
    pub const DESCRIP: usize = 148;
    pub const AUX_FILE: usize = 228;
    pub const QFORM_CODE: usize = 252;
    pub const SFORM_CODE: usize = 254;
    pub const QUATERN: usize = 256;
    pub const SROW: usize = 280;
    pub const INTENT_NAME: usize = 328;
    pub const MAGIC: usize = 344;
}

/// NIfTI-2 field byte offsets
mod v2 {
    pub const MAGIC: usize = 4;
    pub const DATATYPE: usize = 12;
    pub const BITPIX: usize = 14;
    pub const DIM: usize = 16;
    pub const PIXDIM: usize = 104;
    pub const VOX_OFFSET: usize = 168;
    pub const SCL_SLOPE: usize = 176;
    pub const SCL_INTER: usize = 184;
    pub const CAL_MAX: usize = 192;
    pub const CAL_MIN: usize = 200;
    pub const DESCRIP: usize = 240;
    pub const AUX_FILE: usize = 320;
    pub const QFORM_CODE: usize = 344;
    pub const SFORM_CODE: usize = 348;
    pub const QUATERN: usize = 352;
    pub const SROW: usize = 400;
    pub const XYZT_UNITS: usize = 500;
    pub const INTENT_CODE: usize = 504;
    pub const INTENT_NAME: usize = 508;
}

/// Parse a binary NIfTI header into a [Header]
///
/// Fails when the size field or signature bytes do not match a known layout,
/// or when the declared rank or any of the declared dimensions are not
/// positive. The affine is validated and repaired with
/// [process_affine()](Header::process_affine), preferring the sform.
///
/// ```rust
/// # use voltools_header::{parse_header, serialize_header, Header, DataType};
/// let bytes = serialize_header(&Header::new([3, 3, 3], DataType::Float32));
/// let header = parse_header(&bytes).unwrap();
/// assert_eq!(header.bits_per_voxel, 32);
///
/// // Anything else is an error
/// assert!(parse_header(&[0u8; 348]).is_err());
/// ```
pub fn parse_header(bytes: &[u8]) -> Result<Header> {
    let mut header = parse_header_fields(bytes)?;
    header.process_affine(false);
    Ok(header)
}

/// Parse the header fields without touching the spatial transform
pub(crate) fn parse_header_fields(bytes: &[u8]) -> Result<Header> {
    if bytes.len() < 4 {
        return Err(Error::TruncatedHeader {
            expected: NIFTI1_HEADER_SIZE,
            found: bytes.len(),
        });
    }

    let header = match (LittleEndian::read_i32(bytes), BigEndian::read_i32(bytes)) {
        (348, _) => parse_v1::<LittleEndian>(bytes, true)?,
        (_, 348) => parse_v1::<BigEndian>(bytes, false)?,
        (540, _) => parse_v2::<LittleEndian>(bytes, true)?,
        (_, 540) => parse_v2::<BigEndian>(bytes, false)?,
        (size, _) => return Err(Error::InvalidHeaderSize(size)),
    };

    validate_dims(&header.dims)?;
    trace!("{header}");
    Ok(header)
}

fn check_length(bytes: &[u8], expected: usize) -> Result<()> {
    if bytes.len() < expected {
        return Err(Error::TruncatedHeader {
            expected,
            found: bytes.len(),
        });
    }
    Ok(())
}

fn validate_dims(dims: &[i64; 8]) -> Result<()> {
    let rank = dims[0];
    if !(1..=7).contains(&rank) {
        return Err(Error::InvalidRank(rank));
    }
    for (axis, &value) in dims.iter().enumerate().take(rank as usize + 1).skip(1) {
        if value < 1 {
            return Err(Error::NonPositiveDimension { axis, value });
        }
    }
    Ok(())
}

fn read_string(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .trim_end_matches('\0')
        .to_string()
}

fn parse_v1<E: ByteOrder>(bytes: &[u8], little_endian: bool) -> Result<Header> {
    use v1::*;
    check_length(bytes, NIFTI1_HEADER_SIZE)?;

    let magic = &bytes[MAGIC..MAGIC + 4];
    if magic != b"n+1\0" && magic != b"ni1\0" {
        return Err(Error::InvalidSignature {
            found: magic.to_vec(),
        });
    }

    let mut header = Header {
        version: NiftiVersion::Nifti1,
        little_endian,
        ..Default::default()
    };

    for (i, dim) in header.dims.iter_mut().enumerate() {
        *dim = E::read_i16(&bytes[DIM + i * 2..]) as i64;
    }
    for (i, pix_dim) in header.pix_dims.iter_mut().enumerate() {
        *pix_dim = E::read_f32(&bytes[PIXDIM + i * 4..]) as f64;
    }

    header.intent_code = E::read_i16(&bytes[INTENT_CODE..]);
    header.datatype_code = E::read_i16(&bytes[DATATYPE..]);
    header.bits_per_voxel = E::read_i16(&bytes[BITPIX..]) as u16;
    header.vox_offset = E::read_f32(&bytes[VOX_OFFSET..]) as f64;
    header.scl_slope = E::read_f32(&bytes[SCL_SLOPE..]) as f64;
    header.scl_inter = E::read_f32(&bytes[SCL_INTER..]) as f64;
    header.xyzt_units = bytes[XYZT_UNITS];
    header.cal_max = E::read_f32(&bytes[CAL_MAX..]) as f64;
    header.cal_min = E::read_f32(&bytes[CAL_MIN..]) as f64;
    header.description = read_string(&bytes[DESCRIP..AUX_FILE]);
    header.aux_file = read_string(&bytes[AUX_FILE..QFORM_CODE]);
    header.qform_code = E::read_i16(&bytes[QFORM_CODE..]);
    header.sform_code = E::read_i16(&bytes[SFORM_CODE..]);
    header.intent_name = read_string(&bytes[INTENT_NAME..MAGIC]);

    let quatern: Vec<f64> = (0..6)
        .map(|i| E::read_f32(&bytes[QUATERN + i * 4..]) as f64)
        .collect();
    set_quatern(&mut header, &quatern);

    for r in 0..3 {
        for c in 0..4 {
            header.affine[r][c] = E::read_f32(&bytes[SROW + (r * 4 + c) * 4..]) as f64;
        }
    }

    Ok(header)
}

fn parse_v2<E: ByteOrder>(bytes: &[u8], little_endian: bool) -> Result<Header> {
    use v2::*;
    check_length(bytes, NIFTI2_HEADER_SIZE)?;

    let magic = &bytes[MAGIC..MAGIC + 8];
    if &magic[..3] != b"n+2" && &magic[..3] != b"ni2" {
        return Err(Error::InvalidSignature {
            found: magic.to_vec(),
        });
    }

    let mut header = Header {
        version: NiftiVersion::Nifti2,
        little_endian,
        ..Default::default()
    };

    for (i, dim) in header.dims.iter_mut().enumerate() {
        *dim = E::read_i64(&bytes[DIM + i * 8..]);
    }
    for (i, pix_dim) in header.pix_dims.iter_mut().enumerate() {
        *pix_dim = E::read_f64(&bytes[PIXDIM + i * 8..]);
    }

    header.datatype_code = E::read_i16(&bytes[DATATYPE..]);
    header.bits_per_voxel = E::read_i16(&bytes[BITPIX..]) as u16;
    header.vox_offset = E::read_i64(&bytes[VOX_OFFSET..]) as f64;
    header.scl_slope = E::read_f64(&bytes[SCL_SLOPE..]);
    header.scl_inter = E::read_f64(&bytes[SCL_INTER..]);
    header.cal_max = E::read_f64(&bytes[CAL_MAX..]);
    header.cal_min = E::read_f64(&bytes[CAL_MIN..]);
    header.description = read_string(&bytes[DESCRIP..AUX_FILE]);
    header.aux_file = read_string(&bytes[AUX_FILE..QFORM_CODE]);
    header.qform_code = E::read_i32(&bytes[QFORM_CODE..]) as i16;
    header.sform_code = E::read_i32(&bytes[SFORM_CODE..]) as i16;
    header.xyzt_units = E::read_i32(&bytes[XYZT_UNITS..]) as u8;
    header.intent_code = E::read_i32(&bytes[INTENT_CODE..]) as i16;
    header.intent_name = read_string(&bytes[INTENT_NAME..INTENT_NAME + 16]);

    let quatern: Vec<f64> = (0..6)
        .map(|i| E::read_f64(&bytes[QUATERN + i * 8..]))
        .collect();
    set_quatern(&mut header, &quatern);

    for r in 0..3 {
        for c in 0..4 {
            header.affine[r][c] = E::read_f64(&bytes[SROW + (r * 4 + c) * 8..]);
        }
    }

    Ok(header)
}

fn set_quatern(header: &mut Header, values: &[f64]) {
    header.quatern_b = values[0];
    header.quatern_c = values[1];
    header.quatern_d = values[2];
    header.qoffset_x = values[3];
    header.qoffset_y = values[4];
    header.qoffset_z = values[5];
}

/// Serialise a [Header] as a little endian single-file NIfTI header
///
/// The result is a 348 byte NIfTI-1 header followed by an empty extension
/// flag, so voxel data can be appended directly. The `vox_offset` written is
/// always 352 regardless of the value in the header record. A header with an
/// extent too large for NIfTI-1 is written as a 540 byte NIfTI-2 header
/// instead, with data starting at 544.
///
/// Every field read by [parse_header()] is written back, so parsing the
/// output reproduces the header.
///
/// ```rust
/// # use voltools_header::{parse_header, serialize_header, Header, DataType};
/// let header = Header::new([40_000, 2, 1], DataType::Uint8);
/// let bytes = serialize_header(&header);
/// assert_eq!(bytes.len(), 544);
/// assert_eq!(parse_header(&bytes).unwrap().dims[1], 40_000);
/// ```
pub fn serialize_header(header: &Header) -> Vec<u8> {
    let fits_v1 = header
        .dims
        .iter()
        .all(|&d| (i16::MIN as i64..=i16::MAX as i64).contains(&d));
    if fits_v1 {
        serialize_v1(header)
    } else {
        trace!("dimensions exceed 16 bits, writing NIfTI-2");
        serialize_v2(header)
    }
}

fn serialize_v1(header: &Header) -> Vec<u8> {
    use v1::*;
    let mut bytes = vec![0u8; NIFTI1_HEADER_SIZE + 4];
    type E = LittleEndian;

    E::write_i32(&mut bytes[0..], NIFTI1_HEADER_SIZE as i32);
    for (i, dim) in header.dims.iter().enumerate() {
        E::write_i16(&mut bytes[DIM + i * 2..], *dim as i16);
    }
    for (i, pix_dim) in header.pix_dims.iter().enumerate() {
        E::write_f32(&mut bytes[PIXDIM + i * 4..], *pix_dim as f32);
    }

    E::write_i16(&mut bytes[INTENT_CODE..], header.intent_code);
    E::write_i16(&mut bytes[DATATYPE..], header.datatype_code);
    E::write_i16(&mut bytes[BITPIX..], header.bits_per_voxel as i16);
    E::write_f32(&mut bytes[VOX_OFFSET..], (NIFTI1_HEADER_SIZE + 4) as f32);
    E::write_f32(&mut bytes[SCL_SLOPE..], header.scl_slope as f32);
    E::write_f32(&mut bytes[SCL_INTER..], header.scl_inter as f32);
    bytes[XYZT_UNITS] = header.xyzt_units;
    E::write_f32(&mut bytes[CAL_MAX..], header.cal_max as f32);
    E::write_f32(&mut bytes[CAL_MIN..], header.cal_min as f32);
    write_string(&mut bytes[DESCRIP..AUX_FILE], &header.description);
    write_string(&mut bytes[AUX_FILE..QFORM_CODE], &header.aux_file);
    E::write_i16(&mut bytes[QFORM_CODE..], header.qform_code);
    E::write_i16(&mut bytes[SFORM_CODE..], header.sform_code);

    let quatern = [
        header.quatern_b,
        header.quatern_c,
        header.quatern_d,
        header.qoffset_x,
        header.qoffset_y,
        header.qoffset_z,
    ];
    for (i, q) in quatern.iter().enumerate() {
        E::write_f32(&mut bytes[QUATERN + i * 4..], *q as f32);
    }

    for r in 0..3 {
        for c in 0..4 {
            E::write_f32(&mut bytes[SROW + (r * 4 + c) * 4..], header.affine[r][c] as f32);
        }
    }

    write_string(&mut bytes[INTENT_NAME..MAGIC], &header.intent_name);
    bytes[MAGIC..MAGIC + 4].copy_from_slice(b"n+1\0");
    bytes
}

fn serialize_v2(header: &Header) -> Vec<u8> {
    use v2::*;
    let mut bytes = vec![0u8; NIFTI2_HEADER_SIZE + 4];
    type E = LittleEndian;

    E::write_i32(&mut bytes[0..], NIFTI2_HEADER_SIZE as i32);
    bytes[MAGIC..MAGIC + 8].copy_from_slice(b"n+2\0\r\n\x1a\n");
    E::write_i16(&mut bytes[DATATYPE..], header.datatype_code);
    E::write_i16(&mut bytes[BITPIX..], header.bits_per_voxel as i16);
    for (i, dim) in header.dims.iter().enumerate() {
        E::write_i64(&mut bytes[DIM + i * 8..], *dim);
    }
    for (i, pix_dim) in header.pix_dims.iter().enumerate() {
        E::write_f64(&mut bytes[PIXDIM + i * 8..], *pix_dim);
    }

    E::write_i64(&mut bytes[VOX_OFFSET..], (NIFTI2_HEADER_SIZE + 4) as i64);
    E::write_f64(&mut bytes[SCL_SLOPE..], header.scl_slope);
    E::write_f64(&mut bytes[SCL_INTER..], header.scl_inter);
    E::write_f64(&mut bytes[CAL_MAX..], header.cal_max);
    E::write_f64(&mut bytes[CAL_MIN..], header.cal_min);
    write_string(&mut bytes[DESCRIP..AUX_FILE], &header.description);
    write_string(&mut bytes[AUX_FILE..QFORM_CODE], &header.aux_file);
    E::write_i32(&mut bytes[QFORM_CODE..], header.qform_code as i32);
    E::write_i32(&mut bytes[SFORM_CODE..], header.sform_code as i32);

    let quatern = [
        header.quatern_b,
        header.quatern_c,
        header.quatern_d,
        header.qoffset_x,
        header.qoffset_y,
        header.qoffset_z,
    ];
    for (i, q) in quatern.iter().enumerate() {
        E::write_f64(&mut bytes[QUATERN + i * 8..], *q);
    }

    for r in 0..3 {
        for c in 0..4 {
            E::write_f64(&mut bytes[SROW + (r * 4 + c) * 8..], header.affine[r][c]);
        }
    }

    E::write_i32(&mut bytes[XYZT_UNITS..], header.xyzt_units as i32);
    E::write_i32(&mut bytes[INTENT_CODE..], header.intent_code as i32);
    write_string(&mut bytes[INTENT_NAME..INTENT_NAME + 16], &header.intent_name);
    bytes
}

/// Copy a string into a fixed width field, always leaving a trailing nul
fn write_string(field: &mut [u8], value: &str) {
    let n = value.len().min(field.len().saturating_sub(1));
    field[..n].copy_from_slice(&value.as_bytes()[..n]);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datatype::DataType;

    #[test]
    fn big_endian_header_is_detected() {
        let header = Header::new([5, 6, 7], DataType::Int16);
        let mut bytes = serialize_header(&header);

        // rewrite the fields used here as big endian
        BigEndian::write_i32(&mut bytes[0..], 348);
        for (i, dim) in header.dims.iter().enumerate() {
            BigEndian::write_i16(&mut bytes[v1::DIM + i * 2..], *dim as i16);
        }
        BigEndian::write_i16(&mut bytes[v1::DATATYPE..], 4);
        BigEndian::write_i16(&mut bytes[v1::BITPIX..], 16);

        let parsed = parse_header_fields(&bytes).unwrap();
        assert!(!parsed.little_endian);
        assert_eq!(parsed.dims[1..4], [5, 6, 7]);
        assert_eq!(parsed.datatype_code, 4);
    }

    #[test]
    fn zero_dimension_is_rejected() {
        let mut header = Header::new([5, 6, 7], DataType::Int16);
        header.dims[2] = 0;
        let bytes = serialize_header(&header);
        assert!(matches!(
            parse_header(&bytes),
            Err(Error::NonPositiveDimension { axis: 2, value: 0 })
        ));
    }

    #[test]
    fn bad_magic_is_rejected() {
        let mut bytes = serialize_header(&Header::default());
        bytes[v1::MAGIC..v1::MAGIC + 4].copy_from_slice(b"abcd");
        assert!(matches!(
            parse_header(&bytes),
            Err(Error::InvalidSignature { .. })
        ));
    }

    #[test]
    fn wide_extents_are_written_as_nifti2() {
        let mut header = Header::new([70_000, 3, 2], DataType::Float32);
        header.pix_dims[1..4].copy_from_slice(&[0.25, 1.0, 2.0]);
        header.cal_max = 12.5;
        header.intent_code = 1002;

        let bytes = serialize_header(&header);
        assert_eq!(bytes.len(), NIFTI2_HEADER_SIZE + 4);
        assert_eq!(&bytes[v2::MAGIC..v2::MAGIC + 3], b"n+2");

        let parsed = parse_header(&bytes).unwrap();
        assert_eq!(parsed.version, NiftiVersion::Nifti2);
        assert_eq!(parsed.dims, header.dims);
        assert_eq!(parsed.pix_dims[1..4], [0.25, 1.0, 2.0]);
        assert_eq!(parsed.cal_max, 12.5);
        assert_eq!(parsed.intent_code, 1002);
        assert_eq!(parsed.vox_offset, 544.0);

        // small extents keep the NIfTI-1 layout
        let small = serialize_header(&Header::new([4, 4, 4], DataType::Float32));
        assert_eq!(small.len(), NIFTI1_HEADER_SIZE + 4);
    }

    #[test]
    fn long_strings_are_truncated() {
        let header = Header {
            description: "x".repeat(100),
            ..Default::default()
        };
        let parsed = parse_header(&serialize_header(&header)).unwrap();
        assert_eq!(parsed.description.len(), 79);
    }
}
