//! Single file NIfTI-1 and NIfTI-2 images

// crate modules
use crate::codec::{parse_header_fields, NIFTI1_HEADER_SIZE, NIFTI2_HEADER_SIZE};
use crate::datatype::DataType;
use crate::error::Result;
use crate::header::Header;
use crate::reader::FormatReader;

// external crates
use byteorder::{BigEndian, ByteOrder, LittleEndian};
use log::debug;

/// Reader for `.nii` images, compressed or not
#[derive(Debug, Clone, Copy, Default)]
pub struct NiftiReader;

impl FormatReader for NiftiReader {
    fn name(&self) -> &'static str {
        "NIfTI"
    }

    fn sniff(&self, bytes: &[u8]) -> bool {
        if bytes.len() < 4 {
            return false;
        }
        let sizes = [LittleEndian::read_i32(bytes), BigEndian::read_i32(bytes)];
        if sizes.contains(&(NIFTI1_HEADER_SIZE as i32)) {
            bytes.len() >= NIFTI1_HEADER_SIZE && matches!(&bytes[344..347], b"n+1" | b"ni1")
        } else if sizes.contains(&(NIFTI2_HEADER_SIZE as i32)) {
            bytes.len() >= NIFTI2_HEADER_SIZE && matches!(&bytes[4..7], b"n+2" | b"ni2")
        } else {
            false
        }
    }

    fn matches_extension(&self, file_name: &str) -> bool {
        file_name.ends_with(".nii")
    }

    fn parse(&self, bytes: &[u8]) -> Result<(Header, Vec<u8>)> {
        let mut header = parse_header_fields(bytes)?;

        // a 0..255 display range on anything but uint8 is a writer default
        if header.cal_min == 0.0
            && header.cal_max == 255.0
            && header.datatype_code != DataType::Uint8.code()
        {
            debug!("resetting suspicious 0/255 display range");
            header.cal_max = 0.0;
        }

        let offset = (header.vox_offset.max(0.0) as usize).min(bytes.len());
        Ok((header, bytes[offset..].to_vec()))
    }
}
