//! A single decoded volume with its transforms and display state

// standard library
use std::borrow::Cow;
use std::path::Path;

// crate modules
use crate::calibrate::{cal_min_max, Calibration, CalibrationSettings};
use crate::error::{Error, Result};
use crate::lut::{ColorMap, LabelLut};
use crate::options::ImageOptions;
use crate::reorient::{compute_canonical_orientation, reorder_voxels, transform_point, AffineSet};

// voltools modules
use voltools_header::{
    convert, encode_buffer, read_volume_bytes, read_volume_file, serialize_header, Header,
    VoxelBuffer, INTENT_LABEL,
};
use voltools_utils::{f, FloatExt, OptionExt, StringExt, ValueExt};

// external crates
use log::{debug, info, warn};

/// Colormap given to label atlases loaded without a colour table
const LABEL_COLORMAP: &str = "random";

/// One volume and everything derived from it
///
/// The voxel data is kept in on-disk order, with [ras_buffer()] available
/// for a canonical copy. The sample buffer and calibration are private so
/// that the calibration can never describe data it was not computed from.
///
/// ```rust
/// # use voltools_header::{Header, DataType, VoxelBuffer};
/// # use voltools_volume::Volume;
/// let header = Header::new([4, 4, 4], DataType::Uint8);
/// let buffer = VoxelBuffer::U8((0..64).collect());
/// let mut volume = Volume::from_parts("ramp", header, buffer).unwrap();
///
/// volume.set_opacity(1.5);
/// assert_eq!(volume.opacity(), 1.0);
/// assert_eq!(volume.colormap(), "gray");
///
/// let (low, high, _, _) = volume.calibration().as_tuple();
/// assert!(low < high);
/// ```
///
/// [ras_buffer()]: Volume::ras_buffer
#[derive(Debug, Clone)]
pub struct Volume {
    /// Display name
    pub name: String,
    header: Header,
    buffer: VoxelBuffer,
    imaginary: Option<Vec<f32>>,
    affines: AffineSet,
    calibration: Calibration,
    load_options: Option<ImageOptions>,
    colormap: String,
    colormap_negative: String,
    colormap_label: Option<LabelLut>,
    colormap_table: Option<ColorMap>,
    opacity: f64,
    frame_4d: usize,
    n_frame_4d: usize,
    n_total_frame_4d: usize,
    percentile_frac: f64,
    ignore_zero_voxels: bool,
    trust_cal_min_max: bool,
    colorbar_visible: bool,
    cal_min_neg: Option<f64>,
    cal_max_neg: Option<f64>,
}

impl Volume {
    /// Decode a volume from the bytes of a file
    ///
    /// The format is detected from the bytes, falling back on the name and
    /// image type in `options`.
    pub fn from_bytes(bytes: &[u8], options: ImageOptions) -> Result<Self> {
        let (header, raw) = read_volume_bytes(bytes, &options.detection_name())?;
        Self::from_raw(header, raw, options)
    }

    /// Decode a volume from a file on disk
    ///
    /// An empty name in `options` is replaced by the file name.
    pub fn read_file<P: AsRef<Path>>(path: P, mut options: ImageOptions) -> Result<Self> {
        let path = path.as_ref();
        let (header, raw) = read_volume_file(path)?;
        if options.name.is_empty() {
            options.name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
        }
        Self::from_raw(header, raw, options)
    }

    /// Build a volume from a header and raw bytes produced by a reader
    ///
    /// Repairs the affine, drops incomplete trailing frames, applies any frame
    /// limit, converts the samples, and calibrates the current frame.
    pub fn from_raw(mut header: Header, mut raw: Vec<u8>, options: ImageOptions) -> Result<Self> {
        let source = header.process_affine(options.use_qform_not_sform);
        debug!("{}: spatial transform from {source:?}", options.name);

        let frame_bytes = header.bytes_per_frame();
        let declared = header.declared_frames();
        let mut frames = (raw.len() / frame_bytes.max(1)).min(declared);
        if frames == 0 {
            return Err(voltools_header::Error::InsufficientData {
                expected: frame_bytes,
                found: raw.len(),
            }
            .into());
        }
        if frames < declared {
            info!("{}: loaded {frames} of {declared} frames", options.name);
        }
        if let Some(limit) = options.limit_frames_4d {
            frames = frames.min(limit.max(1));
        }
        if frames < declared {
            set_frame_count(&mut header, frames);
        }
        raw.truncate(frames * frame_bytes);

        let converted = convert(&raw, &mut header)?;
        let mut volume = Self::build(header, converted.buffer, options.clone(), declared)?;
        volume.imaginary = converted.imaginary;
        volume.load_options = Some(options);
        Ok(volume)
    }

    /// Build a volume from a header and an already converted buffer
    ///
    /// The header datatype is set to match the buffer. The buffer must hold a
    /// whole number of frames.
    pub fn from_parts(name: &str, mut header: Header, buffer: VoxelBuffer) -> Result<Self> {
        header.set_datatype(buffer.datatype());
        header.process_affine(false);
        let options = ImageOptions {
            name: name.to_string(),
            ..Default::default()
        };
        let frames = buffer.len() / header.voxels_per_frame();
        Self::build(header, buffer, options, frames)
    }

    fn build(
        mut header: Header,
        buffer: VoxelBuffer,
        options: ImageOptions,
        declared: usize,
    ) -> Result<Self> {
        let frame_size = header.voxels_per_frame();
        if buffer.is_empty() || buffer.len() % frame_size != 0 {
            return Err(Error::BufferLength {
                frame_size,
                found: buffer.len(),
            });
        }
        let n_frame_4d = buffer.len() / frame_size;
        if n_frame_4d != header.declared_frames() {
            warn!("header declares {} frames, buffer holds {n_frame_4d}", header.declared_frames());
            set_frame_count(&mut header, n_frame_4d);
        }

        if let Some(cal_min) = options.cal_min {
            header.cal_min = cal_min;
        }
        if let Some(cal_max) = options.cal_max {
            header.cal_max = cal_max;
        }

        let affines = compute_canonical_orientation(&header)?;

        let mut colormap = options.colormap.clone();
        let is_label = header.intent_code == INTENT_LABEL;
        if is_label && options.colormap_label.is_none() && colormap == "gray" {
            colormap = LABEL_COLORMAP.to_string();
        }

        let mut volume = Self {
            name: options.name.clone(),
            header,
            buffer,
            imaginary: None,
            affines,
            calibration: Calibration::default(),
            load_options: None,
            colormap,
            colormap_negative: options.colormap_negative.clone(),
            colormap_label: None,
            colormap_table: None,
            opacity: options.opacity.finite_or(1.0).clamp(0.0, 1.0),
            frame_4d: options.frame_4d.min(n_frame_4d - 1),
            n_frame_4d,
            n_total_frame_4d: declared.max(n_frame_4d),
            percentile_frac: options.percentile_frac,
            ignore_zero_voxels: options.ignore_zero_voxels,
            trust_cal_min_max: options.trust_cal_min_max,
            colorbar_visible: options.colorbar_visible,
            cal_min_neg: options.cal_min_neg,
            cal_max_neg: options.cal_max_neg,
        };

        if let Some(table) = &options.colormap_label {
            volume.set_colormap_label(table)?;
        }
        volume.recalibrate()?;
        Ok(volume)
    }

    /// Header, updated to describe the converted buffer
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Samples for every loaded frame, in on-disk voxel order
    pub fn buffer(&self) -> &VoxelBuffer {
        &self.buffer
    }

    /// Imaginary channel of complex data
    pub fn imaginary(&self) -> Option<&[f32]> {
        self.imaginary.as_deref()
    }

    /// Samples for every loaded frame, in canonical voxel order
    pub fn ras_buffer(&self) -> Cow<'_, VoxelBuffer> {
        reorder_voxels(&self.buffer, &self.affines)
    }

    /// Canonical orientation and coordinate transforms
    pub fn affines(&self) -> &AffineSet {
        &self.affines
    }

    /// Display range of the current frame
    pub fn calibration(&self) -> &Calibration {
        &self.calibration
    }

    /// Options the volume was loaded with, if it was loaded at all
    pub fn load_options(&self) -> Option<&ImageOptions> {
        self.load_options.as_ref()
    }

    /// True for discrete label atlases
    pub fn is_label(&self) -> bool {
        self.header.intent_code == INTENT_LABEL
    }

    /// Colormap for positive values
    pub fn colormap(&self) -> &str {
        &self.colormap
    }

    /// Colormap for negative values, empty for none
    pub fn colormap_negative(&self) -> &str {
        &self.colormap_negative
    }

    /// Lookup table for label atlases
    pub fn colormap_label(&self) -> Option<&LabelLut> {
        self.colormap_label.as_ref()
    }

    /// The colour table the lookup table was built from
    pub fn colormap_table(&self) -> Option<&ColorMap> {
        self.colormap_table.as_ref()
    }

    /// Opacity in `0..=1`
    pub fn opacity(&self) -> f64 {
        self.opacity
    }

    /// Current frame of 4D data
    pub fn frame_4d(&self) -> usize {
        self.frame_4d
    }

    /// Number of frames loaded
    pub fn n_frame_4d(&self) -> usize {
        self.n_frame_4d
    }

    /// Number of frames declared by the file
    pub fn n_total_frame_4d(&self) -> usize {
        self.n_total_frame_4d
    }

    /// True if fewer frames were loaded than declared
    pub fn is_partial(&self) -> bool {
        self.n_frame_4d < self.n_total_frame_4d
    }

    /// Whether zeros are excluded from calibration
    pub fn ignore_zero_voxels(&self) -> bool {
        self.ignore_zero_voxels
    }

    /// Tail fraction used for calibration
    pub fn percentile_frac(&self) -> f64 {
        self.percentile_frac
    }

    /// Whether the colourbar is shown for this volume
    pub fn colorbar_visible(&self) -> bool {
        self.colorbar_visible
    }

    /// Negative display range, if set
    pub fn cal_range_neg(&self) -> (Option<f64>, Option<f64>) {
        (self.cal_min_neg, self.cal_max_neg)
    }

    /// Change the colormap, recomputing the display range
    pub fn set_colormap(&mut self, colormap: &str) -> Result<()> {
        self.colormap = colormap.to_string();
        self.recalibrate()?;
        Ok(())
    }

    /// Change the colormap for negative values
    pub fn set_colormap_negative(&mut self, colormap: &str) {
        self.colormap_negative = colormap.to_string();
    }

    /// Use a colour table for label values
    pub fn set_colormap_label(&mut self, table: &ColorMap) -> Result<()> {
        self.colormap_label = Some(LabelLut::from_colormap(table)?);
        self.colormap_table = Some(table.clone());
        Ok(())
    }

    /// Set the opacity, clamped to `0..=1`
    pub fn set_opacity(&mut self, opacity: f64) {
        self.opacity = opacity.finite_or(1.0).clamp(0.0, 1.0);
    }

    /// Show or hide the colourbar
    pub fn set_colorbar_visible(&mut self, visible: bool) {
        self.colorbar_visible = visible;
    }

    /// Select the frame shown for 4D data, clamped to the frames loaded
    ///
    /// Returns the frame actually selected.
    pub fn set_frame_4d(&mut self, frame: usize) -> usize {
        self.frame_4d = frame.min(self.n_frame_4d - 1);
        self.frame_4d
    }

    /// Set the display range directly, bypassing the histogram
    pub fn set_cal_range(&mut self, cal_min: f64, cal_max: f64) {
        self.calibration.cal_min = cal_min.min(cal_max);
        self.calibration.cal_max = cal_min.max(cal_max);
    }

    /// Set the negative display range
    pub fn set_cal_range_neg(&mut self, cal_min: Option<f64>, cal_max: Option<f64>) {
        self.cal_min_neg = cal_min;
        self.cal_max_neg = cal_max;
    }

    /// Recompute the display range of the current frame
    ///
    /// Zero exclusion forced on by a mostly zero frame stays on for every
    /// later calibration of this volume.
    pub fn recalibrate(&mut self) -> Result<Calibration> {
        let settings = CalibrationSettings {
            percentile_frac: self.percentile_frac,
            ignore_zero_voxels: self.ignore_zero_voxels,
            trust_cal_min_max: self.trust_cal_min_max,
            use_border_crop: true,
        };
        let outcome = cal_min_max(&self.buffer, &self.header, self.frame_4d, &settings)?;
        if outcome.retried_uncropped {
            debug!("{}: cropped calibration was flat", self.name);
        }
        self.ignore_zero_voxels |= outcome.ignore_zero_voxels;
        self.calibration = outcome.calibration;
        Ok(self.calibration)
    }

    /// Scaled value at a canonical voxel index in the current frame
    ///
    /// ```rust
    /// # use voltools_header::{Header, DataType, VoxelBuffer};
    /// # use voltools_volume::Volume;
    /// let mut header = Header::new([3, 1, 1], DataType::Int16);
    /// header.affine[0][0] = -1.0;
    /// header.scl_slope = 2.0;
    /// let volume = Volume::from_parts("flip", header, VoxelBuffer::I16(vec![1, 2, 3])).unwrap();
    ///
    /// // canonical order runs the other way
    /// assert_eq!(volume.value_at([0, 0, 0]), Some(6.0));
    /// assert_eq!(volume.value_at([3, 0, 0]), None);
    /// ```
    pub fn value_at(&self, vox: [i64; 3]) -> Option<f64> {
        let dims = self.affines.dims_ras;
        if (0..3).any(|i| vox[i] < 0 || vox[i] as usize >= dims[i]) {
            return None;
        }
        let src = transform_point(&self.affines.to_ras_vox, vox.map(|v| v as f64));
        let [dx, dy, _] = self.affines.dims;
        let [x, y, z] = [0, 1, 2].map(|i| src[i].round() as usize);
        let index = x + y * dx + z * dx * dy;
        let offset = self.frame_4d * self.header.voxels_per_frame();
        self.buffer
            .get(offset + index)
            .map(|v| self.header.raw_to_scaled(v))
    }

    /// Options describing the current state, for volumes with no load record
    pub fn reconstruct_options(&self) -> ImageOptions {
        ImageOptions {
            name: self.name.nifti_name(),
            colormap: self.colormap.clone(),
            colormap_negative: self.colormap_negative.clone(),
            colormap_label: self.colormap_table.clone(),
            opacity: self.opacity,
            cal_min: Some(self.calibration.cal_min),
            cal_max: Some(self.calibration.cal_max),
            cal_min_neg: self.cal_min_neg,
            cal_max_neg: self.cal_max_neg,
            percentile_frac: self.percentile_frac,
            ignore_zero_voxels: self.ignore_zero_voxels,
            trust_cal_min_max: self.trust_cal_min_max,
            colorbar_visible: self.colorbar_visible,
            frame_4d: self.frame_4d,
            ..Default::default()
        }
    }

    /// Short multi-line summary for logging
    pub fn summary(&self) -> String {
        let (neg_min, neg_max) = self.cal_range_neg();
        let c = &self.calibration;
        let mut s = f!("{} ({} of {} frames)\n", self.name, self.n_frame_4d, self.n_total_frame_4d);
        s += &f!("  grid      : {:?} -> {:?}\n", self.affines.dims, self.affines.dims_ras);
        s += &f!("  colormap  : {} / {}\n", self.colormap, self.colormap_negative);
        s += &f!("  display   : {} to {}\n", c.cal_min.sci(5, 2), c.cal_max.sci(5, 2));
        s += &f!("  data      : {} to {}\n", c.global_min.sci(5, 2), c.global_max.sci(5, 2));
        s += &f!("  negative  : {} to {}\n", neg_min.display(), neg_max.display());
        s += &f!("  oblique   : {:.3} deg", self.affines.oblique_angle);
        s
    }

    /// Single file NIfTI-1 holding the header and every loaded frame
    ///
    /// Samples are written in their converted type, so int8 input is
    /// written back as int16.
    pub fn to_nifti_bytes(&self) -> Vec<u8> {
        let mut bytes = serialize_header(&self.header);
        bytes.extend(encode_buffer(&self.buffer));
        bytes
    }
}

impl std::fmt::Display for Volume {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.summary())
    }
}

/// Record the number of frames actually present in the header
fn set_frame_count(header: &mut Header, frames: usize) {
    header.dims[4] = frames as i64;
    header.dims[5..8].fill(1);
    header.dims[0] = if frames > 1 { header.dims[0].max(4) } else { header.dims[0].min(3) };
}
