//! FreeSurfer MGH and MGZ images
//!
//! A fixed 284 byte big endian header, followed by the voxel data, followed
//! by an optional footer of scan parameters and tagged records. MGZ is simply
//! the gzip compressed form and is handled before the reader is called.

// crate modules
use crate::datatype::DataType;
use crate::error::{Error, Result};
use crate::header::Header;
use crate::reader::FormatReader;
use crate::INTENT_LABEL;

// voltools modules
use voltools_utils::f;

// external crates
use byteorder::{BigEndian, ByteOrder};
use log::{debug, warn};
use nalgebra::{Matrix3, Vector3};

/// Offset of the voxel data
const MGH_DATA_OFFSET: usize = 284;

/// Scan parameters between the voxel data and the tagged footer
const MGH_SCAN_PARAMS: usize = 20;

/// Reader for `.mgh` and `.mgz` images
#[derive(Debug, Clone, Copy, Default)]
pub struct MghReader;

impl FormatReader for MghReader {
    fn name(&self) -> &'static str {
        "MGH"
    }

    fn sniff(&self, bytes: &[u8]) -> bool {
        // version 1 is the only version ever written
        bytes.len() >= MGH_DATA_OFFSET
            && BigEndian::read_i32(bytes) == 1
            && (0..3).all(|i| BigEndian::read_i32(&bytes[4 + i * 4..]) > 0)
    }

    fn matches_extension(&self, file_name: &str) -> bool {
        file_name.ends_with(".mgh") || file_name.ends_with(".mgz")
    }

    fn parse(&self, bytes: &[u8]) -> Result<(Header, Vec<u8>)> {
        if bytes.len() < MGH_DATA_OFFSET {
            return Err(Error::TruncatedHeader {
                expected: MGH_DATA_OFFSET,
                found: bytes.len(),
            });
        }

        let int = |offset: usize| BigEndian::read_i32(&bytes[offset..]);
        let float = |offset: usize| BigEndian::read_f32(&bytes[offset..]) as f64;

        let version = int(0);
        if version != 1 {
            warn!("unexpected MGH version {version}");
        }

        let shape = [int(4) as i64, int(8) as i64, int(12) as i64];
        for (axis, &value) in shape.iter().enumerate() {
            if value < 1 {
                return Err(Error::NonPositiveDimension {
                    axis: axis + 1,
                    value,
                });
            }
        }

        let datatype = match int(20) {
            0 => DataType::Uint8,
            1 => DataType::Int32,
            3 => DataType::Float32,
            4 => DataType::Int16,
            other => {
                return Err(Error::InvalidField {
                    field: "type".to_string(),
                    reason: f!("unsupported MGH data type {other}"),
                })
            }
        };

        let mut header = Header::new(shape, datatype);
        header.little_endian = false;
        let frames = int(16).max(1) as i64;
        header.dims[4] = frames;
        header.dims[0] = if frames > 1 { 4 } else { 3 };

        let spacing = Vector3::new(float(30).abs(), float(34).abs(), float(38).abs());
        header.pix_dims[1..4].copy_from_slice(spacing.as_slice());
        header.pix_dims[4] = 0.0;

        // direction cosines are stored column by column
        let cosines = Matrix3::from_fn(|r, c| float(42 + (c * 3 + r) * 4));
        let centre = Vector3::new(float(78), float(82), float(86));

        let rotation = cosines * Matrix3::from_diagonal(&spacing);
        let half = Vector3::new(shape[0] as f64, shape[1] as f64, shape[2] as f64) / 2.0;
        let translation = centre - rotation * half;

        for r in 0..3 {
            for c in 0..3 {
                header.affine[r][c] = rotation[(r, c)];
            }
            header.affine[r][3] = translation[r];
        }
        header.sform_code = 1;
        header.qform_code = 0;
        header.vox_offset = MGH_DATA_OFFSET as f64;

        let expected = header.bytes_per_frame() * frames as usize;
        let end = (MGH_DATA_OFFSET + expected).min(bytes.len());
        let footer_start = MGH_DATA_OFFSET + expected + MGH_SCAN_PARAMS;
        if footer_start + 12 < bytes.len() {
            let tag = first_tag_string(&bytes[footer_start..]);
            debug!("first MGH footer string {tag:?}");
            if tag.to_lowercase().ends_with("lut.txt") {
                header.intent_code = INTENT_LABEL;
            }
        }

        Ok((header, bytes[MGH_DATA_OFFSET..end].to_vec()))
    }
}

/// First string carried by a type 1 tag in the footer
///
/// Each tag is a 4 byte type, an 8 byte length, then the payload. A type 1
/// payload is a length prefixed, nul terminated string.
fn first_tag_string(footer: &[u8]) -> String {
    let mut pos = 0;
    while pos + 12 <= footer.len() {
        let tag = BigEndian::read_i32(&footer[pos..]);
        let length = BigEndian::read_i32(&footer[pos + 8..]).max(0) as usize;
        pos += 12;

        if tag != 1 {
            pos += length;
            continue;
        }

        if pos + 4 > footer.len() {
            break;
        }
        let n = BigEndian::read_i32(&footer[pos..]).max(0) as usize;
        pos += 4;
        if n <= 1 || pos + n > footer.len() {
            break;
        }
        return String::from_utf8_lossy(&footer[pos..pos + n - 1]).to_string();
    }
    String::new()
}
