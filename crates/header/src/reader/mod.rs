//! Format readers producing a [Header] and raw voxel bytes
//!
//! Each on-disk format implements [FormatReader]. The format is chosen by
//! [detect_format()] from the leading bytes, falling back on the file
//! extension, so adding a format never grows a single dispatch function.

// standard library
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

// crate modules
use crate::convert::check_frame_length;
use crate::error::{Error, Result};
use crate::header::Header;

// external crates
use flate2::read::GzDecoder;
use log::{debug, warn};

mod mgh;
mod nifti;
mod nrrd;
mod parsers;

pub use mgh::MghReader;
pub use nifti::NiftiReader;
pub use nrrd::NrrdReader;

/// Common interface for every on-disk volume format
///
/// Implementations map their native header onto a [Header] and return the
/// voxel bytes exactly as stored, in the byte order recorded in the header.
/// Neither the affine repair nor datatype conversion happen here.
pub trait FormatReader {
    /// Short name used in log messages
    fn name(&self) -> &'static str;

    /// True if the (decompressed) bytes look like this format
    fn sniff(&self, bytes: &[u8]) -> bool;

    /// True if the file name suggests this format
    fn matches_extension(&self, file_name: &str) -> bool;

    /// Split the bytes into a populated header and the raw voxel data
    fn parse(&self, bytes: &[u8]) -> Result<(Header, Vec<u8>)>;
}

/// Supported on-disk formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeFormat {
    /// NIfTI-1 or NIfTI-2 single file images
    Nifti,
    /// FreeSurfer MGH and MGZ images
    Mgh,
    /// NRRD images with attached data
    Nrrd,
}

impl VolumeFormat {
    /// Every supported format, in detection order
    pub const ALL: [VolumeFormat; 3] = [Self::Nifti, Self::Nrrd, Self::Mgh];

    /// Reader implementation for this format
    pub fn reader(&self) -> Box<dyn FormatReader> {
        match self {
            Self::Nifti => Box::new(NiftiReader),
            Self::Mgh => Box::new(MghReader),
            Self::Nrrd => Box::new(NrrdReader),
        }
    }
}

/// Decide which reader to use for a byte stream
///
/// Signatures take priority. The extension of `file_name` (ignoring `.gz`)
/// is only consulted when no signature matches.
///
/// ```rust
/// # use voltools_header::{detect_format, VolumeFormat};
/// let nrrd = b"NRRD0004\ntype: uchar\n\n";
/// assert_eq!(detect_format(nrrd, "").unwrap(), VolumeFormat::Nrrd);
///
/// // no signature, but the extension is enough for MGH
/// assert_eq!(detect_format(&[0u8; 300], "brain.mgh").unwrap(), VolumeFormat::Mgh);
///
/// assert!(detect_format(&[0u8; 300], "notes.txt").is_err());
/// ```
pub fn detect_format(bytes: &[u8], file_name: &str) -> Result<VolumeFormat> {
    detect_decompressed(&decompress_if_gzip(bytes)?, file_name)
}

fn detect_decompressed(bytes: &[u8], file_name: &str) -> Result<VolumeFormat> {
    if let Some(format) = VolumeFormat::ALL
        .into_iter()
        .find(|f| f.reader().sniff(bytes))
    {
        return Ok(format);
    }

    let name = file_name.to_lowercase();
    let name = name.strip_suffix(".gz").unwrap_or(&name);
    VolumeFormat::ALL
        .into_iter()
        .find(|f| f.reader().matches_extension(name))
        .ok_or_else(|| Error::UnknownFormat(file_name.to_string()))
}

/// Read a volume from bytes already in memory
///
/// Gzip compressed input is decompressed first. The raw voxel data must hold
/// at least one full 3D frame; fewer frames than declared is accepted here
/// and handled as a partial load by the caller.
pub fn read_volume_bytes(bytes: &[u8], file_name: &str) -> Result<(Header, Vec<u8>)> {
    let bytes = decompress_if_gzip(bytes)?;
    let reader = detect_decompressed(&bytes, file_name)?.reader();
    debug!("reading {file_name:?} as {}", reader.name());

    let (header, raw) = reader.parse(&bytes)?;
    check_frame_length(&raw, &header)?;

    let declared = header.bytes_per_frame() * header.declared_frames();
    if raw.len() < declared {
        warn!(
            "{file_name:?} holds {} of {} declared bytes, loading a partial series",
            raw.len(),
            declared
        );
    }

    Ok((header, raw))
}

/// Read a volume from a file
///
/// ```rust, no_run
/// # use voltools_header::{read_volume_file, convert};
/// let (mut header, raw) = read_volume_file("/path/to/brain.nii.gz").unwrap();
/// let converted = convert(&raw, &mut header).unwrap();
/// println!("{header}");
/// ```
pub fn read_volume_file<P: AsRef<Path>>(path: P) -> Result<(Header, Vec<u8>)> {
    let path = path.as_ref();
    let mut reader = init_reader(path)?;
    let mut bytes = Vec::new();
    reader.read_to_end(&mut bytes)?;

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    read_volume_bytes(&bytes, &name)
}

/// Initialise a reader from anything that can be turned into a path
fn init_reader(path: impl AsRef<Path>) -> Result<BufReader<File>> {
    let file = File::open(path)?;
    Ok(BufReader::new(file))
}

/// True if the bytes start with the gzip magic number
pub fn is_gzip(bytes: &[u8]) -> bool {
    bytes.len() >= 2 && bytes[0] == 0x1f && bytes[1] == 0x8b
}

/// Decompress gzip data, or pass anything else through untouched
pub fn decompress_if_gzip(bytes: &[u8]) -> Result<std::borrow::Cow<'_, [u8]>> {
    if !is_gzip(bytes) {
        return Ok(std::borrow::Cow::Borrowed(bytes));
    }
    let mut out = Vec::new();
    GzDecoder::new(bytes).read_to_end(&mut out)?;
    Ok(std::borrow::Cow::Owned(out))
}
