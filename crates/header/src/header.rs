//! Typed header record and spatial transform repair

// crate modules
use crate::datatype::DataType;
use crate::error::Result;

// voltools modules
use voltools_utils::{f, FloatExt, ValueExt};

// external crates
use log::{debug, warn};
use nalgebra::{Matrix3, Matrix4};
use serde::{Deserialize, Serialize};

/// Header layout the record was read from or will be written as
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NiftiVersion {
    /// 348 byte header with 16-bit dimensions and 32-bit floats
    #[default]
    Nifti1,
    /// 540 byte header with 64-bit dimensions and 64-bit floats
    Nifti2,
}

/// Where the final voxel-to-world affine came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AffineSource {
    /// The declared sform rows were usable as-is
    Sform,
    /// Derived from the quaternion fields
    Qform,
    /// Synthesised from the pixel spacing after both transforms failed
    PixelSpacing,
}

/// Typed header record shared by every format reader
///
/// Field names follow the NIfTI conventions since every supported format is
/// mapped onto this layout, regardless of where it came from.
///
/// - `dims[0]` is the rank, `dims[1..=3]` the spatial extents and
///   `dims[4..=7]` any higher dimensions such as time
/// - `affine` maps voxel indices to world millimetres, row-major
///
/// ```rust
/// # use voltools_header::{Header, DataType};
/// let header = Header::new([64, 64, 30], DataType::Int16);
/// assert_eq!(header.dims, [3, 64, 64, 30, 1, 1, 1, 1]);
/// assert_eq!(header.bits_per_voxel, 16);
/// assert_eq!(header.voxels_per_frame(), 64 * 64 * 30);
/// assert_eq!(header.bytes_per_frame(), 64 * 64 * 30 * 2);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Header {
    /// Layout version the header was parsed from
    pub version: NiftiVersion,
    /// Byte order of the header and voxel data on disk
    pub little_endian: bool,
    /// Rank followed by up to seven dimension lengths
    pub dims: [i64; 8],
    /// qfac followed by the spacing along each dimension
    pub pix_dims: [f64; 8],
    /// Raw datatype code, see [DataType]
    pub datatype_code: i16,
    /// Bits per voxel, consistent with `datatype_code`
    pub bits_per_voxel: u16,
    /// Byte offset of the voxel data within a single-file image
    pub vox_offset: f64,
    /// Intensity scale slope, where 0 is treated as 1
    pub scl_slope: f64,
    /// Intensity scale intercept
    pub scl_inter: f64,
    /// Suggested display maximum
    pub cal_max: f64,
    /// Suggested display minimum
    pub cal_min: f64,
    /// Intent code, e.g. [INTENT_LABEL](crate::INTENT_LABEL)
    pub intent_code: i16,
    /// Intent name, up to 16 bytes
    pub intent_name: String,
    /// Spatial and temporal unit codes
    pub xyzt_units: u8,
    /// Free text description, up to 80 bytes
    pub description: String,
    /// Auxiliary file name, up to 24 bytes
    pub aux_file: String,
    /// Quaternion transform code
    pub qform_code: i16,
    /// Affine transform code
    pub sform_code: i16,
    /// Quaternion b parameter
    pub quatern_b: f64,
    /// Quaternion c parameter
    pub quatern_c: f64,
    /// Quaternion d parameter
    pub quatern_d: f64,
    /// Quaternion x shift
    pub qoffset_x: f64,
    /// Quaternion y shift
    pub qoffset_y: f64,
    /// Quaternion z shift
    pub qoffset_z: f64,
    /// Voxel index to world millimetre transform
    pub affine: [[f64; 4]; 4],
}

impl Header {
    /// A minimal little endian header for a 3D volume
    ///
    /// Spacing is 1 mm isotropic, the affine is the identity, and the sform
    /// code is set to scanner anatomical so the affine is used as-is.
    pub fn new(shape: [i64; 3], datatype: DataType) -> Self {
        Self {
            dims: [3, shape[0], shape[1], shape[2], 1, 1, 1, 1],
            datatype_code: datatype.code(),
            bits_per_voxel: datatype.bits_per_voxel(),
            sform_code: 1,
            ..Default::default()
        }
    }

    /// Typed datatype, failing for unknown codes
    pub fn datatype(&self) -> Result<DataType> {
        DataType::try_from(self.datatype_code)
    }

    /// Set the datatype and keep the bit width consistent with it
    pub fn set_datatype(&mut self, datatype: DataType) {
        self.datatype_code = datatype.code();
        self.bits_per_voxel = datatype.bits_per_voxel();
    }

    /// Spatial extents with unused axes treated as 1
    pub fn spatial_dims(&self) -> [usize; 3] {
        [
            self.dims[1].max(1) as usize,
            self.dims[2].max(1) as usize,
            self.dims[3].max(1) as usize,
        ]
    }

    /// Number of voxels in a single 3D frame
    pub fn voxels_per_frame(&self) -> usize {
        self.spatial_dims().iter().product()
    }

    /// Number of bytes in a single 3D frame
    pub fn bytes_per_frame(&self) -> usize {
        (self.voxels_per_frame() * self.bits_per_voxel as usize).div_ceil(8)
    }

    /// Number of 3D frames declared by `dims[4..=7]`
    pub fn declared_frames(&self) -> usize {
        self.dims[4..8]
            .iter()
            .map(|d| (*d).max(1) as usize)
            .product()
    }

    /// True if the header is for the same byte order as this machine
    pub fn is_native_endian(&self) -> bool {
        self.little_endian == cfg!(target_endian = "little")
    }

    /// Affine as a nalgebra matrix
    pub fn affine_matrix(&self) -> Matrix4<f64> {
        let a = &self.affine;
        Matrix4::from_fn(|r, c| a[r][c])
    }

    /// Apply scale slope and intercept to a raw sample
    ///
    /// A slope of 0 or NaN is treated as 1 and a NaN intercept as 0.
    ///
    /// ```rust
    /// # use voltools_header::{Header, DataType};
    /// let mut header = Header::new([1, 1, 1], DataType::Int16);
    /// header.scl_slope = 0.0;
    /// header.scl_inter = 10.0;
    /// assert_eq!(header.raw_to_scaled(5.0), 15.0);
    /// assert_eq!(header.scaled_to_raw(15.0), 5.0);
    /// ```
    pub fn raw_to_scaled(&self, value: f64) -> f64 {
        value * self.slope() + self.intercept()
    }

    /// Inverse of [raw_to_scaled()](Header::raw_to_scaled)
    pub fn scaled_to_raw(&self, value: f64) -> f64 {
        (value - self.intercept()) / self.slope()
    }

    /// Slope with the zero and NaN cases repaired
    pub fn slope(&self) -> f64 {
        self.scl_slope.usable_or(1.0)
    }

    /// Intercept with the NaN case repaired
    pub fn intercept(&self) -> f64 {
        self.scl_inter.finite_or(0.0)
    }

    /// Validate the spatial transform and repair it where needed
    ///
    /// The declared sform is used unless `prefer_qform` is set, the sform is
    /// unusable, or the qform code outranks the sform code. If the resulting
    /// affine is still unusable, a diagonal affine is synthesised from the
    /// pixel spacing (zero or NaN spacing becomes 1 mm) and a warning is
    /// logged. The load always continues.
    ///
    /// Slope and intercept are normalised at the same time.
    pub fn process_affine(&mut self, prefer_qform: bool) -> AffineSource {
        if [1, 2, 3].iter().any(|&i| self.pix_dims[i] == 0.0) {
            debug!("pixel dimensions not plausible: {:?}", &self.pix_dims[1..4]);
        }

        self.scl_slope = self.slope();
        self.scl_inter = self.intercept();

        let mut source = AffineSource::Sform;
        if prefer_qform || !is_affine_ok(&self.affine) || self.qform_code > self.sform_code {
            debug!("spatial transform based on qform");
            self.affine = self.qform_affine();
            source = AffineSource::Qform;
        }

        if !is_affine_ok(&self.affine) {
            warn!("defective spatial transform, using pixel spacing instead");
            for i in 1..4 {
                self.pix_dims[i] = self.pix_dims[i].usable_or(1.0);
            }
            let [x, y, z] = [self.pix_dims[1], self.pix_dims[2], self.pix_dims[3]];
            self.affine = [
                [x, 0.0, 0.0, 0.0],
                [0.0, y, 0.0, 0.0],
                [0.0, 0.0, z, 0.0],
                [0.0, 0.0, 0.0, 1.0],
            ];
            source = AffineSource::PixelSpacing;
        }
        source
    }

    /// Affine derived from the quaternion parameters
    ///
    /// ```rust
    /// # use voltools_header::{Header, DataType};
    /// let mut header = Header::new([4, 4, 4], DataType::Uint8);
    /// header.pix_dims = [1.0, 2.0, 2.0, 3.0, 0.0, 0.0, 0.0, 0.0];
    /// header.qoffset_x = -4.0;
    ///
    /// // A zero quaternion is the identity rotation
    /// let affine = header.qform_affine();
    /// assert_eq!(affine[0], [2.0, 0.0, 0.0, -4.0]);
    /// assert_eq!(affine[2], [0.0, 0.0, 3.0, 0.0]);
    /// ```
    pub fn qform_affine(&self) -> [[f64; 4]; 4] {
        let (b, c, d) = (self.quatern_b, self.quatern_c, self.quatern_d);
        let a = (1.0 - (b * b + c * c + d * d)).max(0.0).sqrt();
        let qfac = if self.pix_dims[0] < 0.0 { -1.0 } else { 1.0 };

        let rotation = Matrix3::new(
            a * a + b * b - c * c - d * d,
            2.0 * (b * c - a * d),
            2.0 * (b * d + a * c),
            2.0 * (b * c + a * d),
            a * a + c * c - b * b - d * d,
            2.0 * (c * d - a * b),
            2.0 * (b * d - a * c),
            2.0 * (c * d + a * b),
            a * a + d * d - c * c - b * b,
        );

        let offset = [self.qoffset_x, self.qoffset_y, self.qoffset_z];
        let mut affine = [[0.0; 4]; 4];
        for (r, row) in affine.iter_mut().take(3).enumerate() {
            for (c, value) in row.iter_mut().take(3).enumerate() {
                *value = rotation[(r, c)] * self.pix_dims[c + 1];
                if c == 2 {
                    *value *= qfac;
                }
            }
            row[3] = offset[r];
        }
        affine[3][3] = 1.0;
        affine
    }

    /// Short multi-line summary for logging
    pub fn summary(&self) -> String {
        let datatype = self
            .datatype()
            .map(|dt| dt.to_string())
            .unwrap_or_else(|_| f!("code {}", self.datatype_code));

        let mut s = f!("{:?} header ({} endian)\n", self.version, self.endian_name());
        s += &f!("  dims      : {:?}\n", &self.dims[1..=self.rank()]);
        s += &f!("  spacing   : {:?}\n", &self.pix_dims[1..=self.rank()]);
        s += &f!("  datatype  : {datatype} ({} bits)\n", self.bits_per_voxel);
        s += &f!("  slope     : {}\n", self.slope().sci(5, 2));
        s += &f!("  intercept : {}\n", self.intercept().sci(5, 2));
        s += &f!("  cal range : {} to {}\n", self.cal_min.sci(5, 2), self.cal_max.sci(5, 2));
        s += &f!("  q/s codes : {}/{}", self.qform_code, self.sform_code);
        s
    }

    fn rank(&self) -> usize {
        self.dims[0].clamp(1, 7) as usize
    }

    fn endian_name(&self) -> &'static str {
        if self.little_endian {
            "little"
        } else {
            "big"
        }
    }
}

impl Default for Header {
    fn default() -> Self {
        let mut affine = [[0.0; 4]; 4];
        (0..4).for_each(|i| affine[i][i] = 1.0);

        Self {
            version: NiftiVersion::Nifti1,
            little_endian: true,
            dims: [3, 1, 1, 1, 1, 1, 1, 1],
            pix_dims: [1.0, 1.0, 1.0, 1.0, 0.0, 0.0, 0.0, 0.0],
            datatype_code: DataType::Uint8.code(),
            bits_per_voxel: 8,
            vox_offset: 352.0,
            scl_slope: 1.0,
            scl_inter: 0.0,
            cal_max: 0.0,
            cal_min: 0.0,
            intent_code: 0,
            intent_name: String::new(),
            xyzt_units: 10,
            description: String::new(),
            aux_file: String::new(),
            qform_code: 0,
            sform_code: 0,
            quatern_b: 0.0,
            quatern_c: 0.0,
            quatern_d: 0.0,
            qoffset_x: 0.0,
            qoffset_y: 0.0,
            qoffset_z: 0.0,
            affine,
        }
    }
}

impl std::fmt::Display for Header {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.summary())
    }
}

/// True if the affine can be used as a voxel to world transform
///
/// Rejects any NaN, any row or column of the linear part that is entirely
/// zero, and a linear part with a zero determinant.
pub(crate) fn is_affine_ok(affine: &[[f64; 4]; 4]) -> bool {
    if affine.iter().flatten().any(|v| v.is_nan()) {
        return false;
    }

    let linear = Matrix3::from_fn(|r, c| affine[r][c]);
    for i in 0..3 {
        let row_empty = (0..3).all(|j| linear[(i, j)] == 0.0);
        let col_empty = (0..3).all(|j| linear[(j, i)] == 0.0);
        if row_empty || col_empty {
            return false;
        }
    }

    linear.determinant() != 0.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn degenerate_sform_falls_back_to_qform() {
        let mut header = Header::new([2, 2, 2], DataType::Uint8);
        header.affine = [[0.0; 4]; 4];
        header.pix_dims[1] = 3.0;
        assert_eq!(header.process_affine(false), AffineSource::Qform);
        assert_eq!(header.affine[0][0], 3.0);
    }

    #[test]
    fn unusable_transforms_fall_back_to_spacing() {
        let mut header = Header::new([2, 2, 2], DataType::Uint8);
        header.affine = [[f64::NAN; 4]; 4];
        header.pix_dims = [1.0, 0.0, f64::NAN, 2.0, 0.0, 0.0, 0.0, 0.0];
        header.quatern_b = f64::NAN;

        assert_eq!(header.process_affine(false), AffineSource::PixelSpacing);
        assert_eq!(header.affine[0][0], 1.0);
        assert_eq!(header.affine[1][1], 1.0);
        assert_eq!(header.affine[2][2], 2.0);
    }

    #[test]
    fn qform_code_outranks_sform() {
        let mut header = Header::new([2, 2, 2], DataType::Uint8);
        header.affine[0][3] = 50.0;
        header.qform_code = 2;
        header.sform_code = 1;
        assert_eq!(header.process_affine(false), AffineSource::Qform);
        assert_eq!(header.affine[0][3], 0.0);
    }

    #[test]
    fn slope_zero_is_identity() {
        let mut header = Header::new([1, 1, 1], DataType::Int16);
        header.scl_slope = 0.0;
        header.scl_inter = f64::NAN;
        header.process_affine(false);
        assert_eq!(header.scl_slope, 1.0);
        assert_eq!(header.scl_inter, 0.0);
        assert_eq!(header.raw_to_scaled(42.0), 42.0);
    }

    #[test]
    fn row_of_zeros_is_rejected() {
        let mut affine = Header::default().affine;
        assert!(is_affine_ok(&affine));
        affine[1] = [0.0, 0.0, 0.0, 7.0];
        assert!(!is_affine_ok(&affine));
    }
}
