//! NRRD images with attached raw or gzip data
//!
//! The text header ends at the first blank line and the voxel data follows
//! immediately. Detached headers (`data file:`) are not supported.

// standard library
use std::io::Read;

// crate modules
use crate::datatype::DataType;
use crate::error::{Error, Result};
use crate::header::Header;
use crate::reader::parsers::{field, float_list, integer_list, is_nrrd_magic, vector3};
use crate::reader::FormatReader;

// voltools modules
use voltools_utils::f;

// external crates
use flate2::read::GzDecoder;
use log::{debug, warn};
use nalgebra::{Matrix3, Vector3};

/// Reader for `.nrrd` images
#[derive(Debug, Clone, Copy, Default)]
pub struct NrrdReader;

impl FormatReader for NrrdReader {
    fn name(&self) -> &'static str {
        "NRRD"
    }

    fn sniff(&self, bytes: &[u8]) -> bool {
        bytes.len() >= 8 && is_nrrd_magic(&String::from_utf8_lossy(&bytes[..8]))
    }

    fn matches_extension(&self, file_name: &str) -> bool {
        file_name.ends_with(".nrrd")
    }

    fn parse(&self, bytes: &[u8]) -> Result<(Header, Vec<u8>)> {
        let (text, data_start) = split_header(bytes)?;
        let fields = NrrdFields::from_text(&text)?;
        let header = fields.to_header(data_start)?;

        let mut data = bytes[data_start..].to_vec();
        if fields.gzip {
            let mut out = Vec::new();
            GzDecoder::new(data.as_slice()).read_to_end(&mut out)?;
            data = out;
        }

        let expected = header.bytes_per_frame() * header.declared_frames();
        if data.len() > expected {
            warn!("NRRD has {} bytes after the image data, truncating", data.len() - expected);
            data.truncate(expected);
        }

        Ok((header, data))
    }
}

/// Find the blank line ending the header
fn split_header(bytes: &[u8]) -> Result<(String, usize)> {
    bytes
        .windows(2)
        .position(|w| w == b"\n\n")
        .map(|i| (String::from_utf8_lossy(&bytes[..i]).to_string(), i + 2))
        .ok_or_else(|| Error::InvalidField {
            field: "header".to_string(),
            reason: "no blank line ending the NRRD header".to_string(),
        })
}

/// Anatomical frame of the `space` field
#[derive(Debug, Clone, Copy, PartialEq)]
enum NrrdSpace {
    Ras,
    Las,
    Lps,
}

impl NrrdSpace {
    /// Signs to convert this frame to RAS
    fn signs(&self) -> [f64; 3] {
        match self {
            Self::Ras => [1.0, 1.0, 1.0],
            Self::Las => [-1.0, 1.0, 1.0],
            Self::Lps => [-1.0, -1.0, 1.0],
        }
    }
}

/// The header fields relevant to building a [Header]
#[derive(Debug, Default)]
struct NrrdFields {
    datatype: Option<DataType>,
    sizes: Vec<i64>,
    spacings: Vec<f64>,
    little_endian: Option<bool>,
    gzip: bool,
    space: Option<NrrdSpace>,
    directions: Option<[f64; 9]>,
    origin: [f64; 3],
    microns: bool,
}

impl NrrdFields {
    fn from_text(text: &str) -> Result<Self> {
        let mut fields = Self::default();

        for line in text.lines().skip(1) {
            if line.trim().is_empty() || line.starts_with('#') {
                continue;
            }
            let Ok((_, (key, value))) = field(line) else {
                continue;
            };
            let key = key.to_lowercase();
            let value = value.to_lowercase();

            match key.as_str() {
                "data file" | "datafile" => {
                    return Err(Error::InvalidField {
                        field: key.clone(),
                        reason: "detached NRRD data is not supported".to_string(),
                    })
                }
                "encoding" => fields.gzip = parse_encoding(&value)?,
                "type" => fields.datatype = Some(parse_type(&value)?),
                "sizes" => fields.sizes = integer_list(&value).map(|(_, v)| v).unwrap_or_default(),
                "spacings" => fields.spacings = float_list(&value).map(|(_, v)| v).unwrap_or_default(),
                "endian" => fields.little_endian = Some(value.contains("little")),
                "space" => fields.space = parse_space(&value),
                "space directions" => {
                    let values = float_list(&value).map(|(_, v)| v).unwrap_or_default();
                    if let Ok(directions) = <[f64; 9]>::try_from(values.as_slice()) {
                        fields.directions = Some(directions);
                    }
                }
                "space origin" => {
                    if let Ok((_, origin)) = vector3(&value) {
                        fields.origin = origin;
                    }
                }
                "space units" => fields.microns = value.contains("micron"),
                "dimension" | "content" | "kinds" | "labels" | "units" => (),
                _ => debug!("ignoring NRRD field {key:?}"),
            }
        }
        Ok(fields)
    }

    fn to_header(&self, data_start: usize) -> Result<Header> {
        let datatype = self.datatype.ok_or_else(|| Error::InvalidField {
            field: "type".to_string(),
            reason: "missing".to_string(),
        })?;

        if self.sizes.is_empty() || self.sizes.len() > 7 {
            return Err(Error::InvalidRank(self.sizes.len() as i64));
        }

        let mut header = Header::default();
        header.set_datatype(datatype);
        header.little_endian = self.little_endian.unwrap_or(true);
        header.vox_offset = data_start as f64;
        header.dims[0] = self.sizes.len() as i64;
        for (i, &size) in self.sizes.iter().enumerate() {
            if size < 1 {
                return Err(Error::NonPositiveDimension {
                    axis: i + 1,
                    value: size,
                });
            }
            header.dims[i + 1] = size;
        }
        for (i, &spacing) in self.spacings.iter().take(7).enumerate() {
            if spacing.is_finite() {
                header.pix_dims[i + 1] = spacing;
            }
        }

        let mut affine = header.affine;
        for i in 0..3 {
            affine[i][i] = header.pix_dims[i + 1];
        }

        if let Some(directions) = self.directions {
            let scale = if self.microns { 0.001 } else { 1.0 };
            let signs = self.space.map(|s| s.signs()).unwrap_or([1.0; 3]);
            if self.space.is_none() {
                warn!("unsupported or missing NRRD space, assuming RAS");
            }

            // each direction vector is one voxel axis, i.e. one column
            let columns = Matrix3::from_fn(|r, c| directions[c * 3 + r] * scale);
            let to_ras = Matrix3::from_diagonal(&Vector3::from(signs));
            let linear = to_ras * columns;

            for r in 0..3 {
                for c in 0..3 {
                    affine[r][c] = linear[(r, c)];
                }
                affine[r][3] = self.origin[r] * scale * signs[r];
            }

            for c in 0..3 {
                header.pix_dims[c + 1] = linear.column(c).norm();
            }
            header.sform_code = 2;
        }

        header.affine = affine;
        Ok(header)
    }
}

fn parse_encoding(value: &str) -> Result<bool> {
    if value.contains("raw") {
        Ok(false)
    } else if value.contains("gz") {
        Ok(true)
    } else {
        Err(Error::InvalidField {
            field: "encoding".to_string(),
            reason: f!("unsupported NRRD encoding {value:?}"),
        })
    }
}

fn parse_type(value: &str) -> Result<DataType> {
    Ok(match value {
        "uchar" | "unsigned char" | "uint8" | "uint8_t" => DataType::Uint8,
        "signed char" | "int8" | "int8_t" => DataType::Int8,
        "short" | "short int" | "signed short" | "signed short int" | "int16" | "int16_t" => {
            DataType::Int16
        }
        "ushort" | "unsigned short" | "unsigned short int" | "uint16" | "uint16_t" => {
            DataType::Uint16
        }
        "int" | "signed int" | "int32" | "int32_t" => DataType::Int32,
        "uint" | "unsigned int" | "uint32" | "uint32_t" => DataType::Uint32,
        "float" => DataType::Float32,
        "double" => DataType::Float64,
        _ => {
            return Err(Error::InvalidField {
                field: "type".to_string(),
                reason: f!("unsupported NRRD type {value:?}"),
            })
        }
    })
}

fn parse_space(value: &str) -> Option<NrrdSpace> {
    match value {
        "right-anterior-superior" | "ras" => Some(NrrdSpace::Ras),
        "left-anterior-superior" | "las" => Some(NrrdSpace::Las),
        "left-posterior-superior" | "lps" => Some(NrrdSpace::Lps),
        _ => None,
    }
}
