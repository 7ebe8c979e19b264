//! Load options for a single volume, and the builder for them

// crate modules
use crate::lut::ColorMap;

// voltools modules
use voltools_utils::f;

// external crates
use serde::{Deserialize, Serialize};

/// Options used when loading a volume
///
/// These are kept by the [Volume](crate::Volume) and persisted with a
/// document so that it can be reloaded the same way. Values that may be
/// unset are `None` rather than NaN.
///
/// Field names follow the document format, e.g. `trustCalMinMax` and
/// `cal_min`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ImageOptions {
    /// Display name, also used to guess the format
    pub name: String,
    /// Where the bytes came from
    pub url: String,
    /// Colormap for positive values
    pub colormap: String,
    /// Overall opacity in `0..=1`
    pub opacity: f64,
    /// Lower end of the display range, overriding the header
    #[serde(rename = "cal_min")]
    pub cal_min: Option<f64>,
    /// Upper end of the display range, overriding the header
    #[serde(rename = "cal_max")]
    pub cal_max: Option<f64>,
    /// Use a valid header display range without a histogram
    pub trust_cal_min_max: bool,
    /// Fraction of voxels in each tail of the display range
    pub percentile_frac: f64,
    /// Exclude exact zeros from calibration
    pub ignore_zero_voxels: bool,
    /// Prefer the quaternion transform even when the affine is valid
    #[serde(rename = "useQFormNotSForm")]
    pub use_qform_not_sform: bool,
    /// Colormap for negative values, empty for none
    pub colormap_negative: String,
    /// Colour table for label atlases
    pub colormap_label: Option<ColorMap>,
    /// Lower end of the negative display range
    #[serde(rename = "cal_minNeg")]
    pub cal_min_neg: Option<f64>,
    /// Upper end of the negative display range
    #[serde(rename = "cal_maxNeg")]
    pub cal_max_neg: Option<f64>,
    /// Show the colourbar for this volume
    pub colorbar_visible: bool,
    /// Frame shown for 4D data
    #[serde(rename = "frame4D")]
    pub frame_4d: usize,
    /// Load at most this many frames, `None` for all
    #[serde(rename = "limitFrames4D")]
    pub limit_frames_4d: Option<usize>,
    /// Format hint such as `nii` or `mgz` when the name has no extension
    pub image_type: Option<String>,
}

impl ImageOptions {
    /// Start a builder with default options
    pub fn builder() -> ImageOptionsBuilder {
        ImageOptionsBuilder::new()
    }

    /// Name to use for format detection
    pub(crate) fn detection_name(&self) -> String {
        match &self.image_type {
            Some(ext) if !ext.is_empty() => f!("{}.{}", self.name, ext.trim_start_matches('.')),
            _ => self.name.clone(),
        }
    }
}

impl Default for ImageOptions {
    fn default() -> Self {
        Self {
            name: String::new(),
            url: String::new(),
            colormap: "gray".to_string(),
            opacity: 1.0,
            cal_min: None,
            cal_max: None,
            trust_cal_min_max: true,
            percentile_frac: 0.02,
            ignore_zero_voxels: false,
            use_qform_not_sform: false,
            colormap_negative: String::new(),
            colormap_label: None,
            cal_min_neg: None,
            cal_max_neg: None,
            colorbar_visible: true,
            frame_4d: 0,
            limit_frames_4d: None,
            image_type: None,
        }
    }
}

/// Builder implementation for [ImageOptions]
///
/// The fields of [ImageOptions] are public for direct use, but chained
/// setters read better when only a few values change.
///
/// ```rust
/// # use voltools_volume::ImageOptions;
/// let options = ImageOptions::builder()
///     .name("sub-01_T1w.nii.gz")
///     .colormap("hot")
///     .cal_range(20.0, 400.0)
///     .limit_frames_4d(1)
///     .build();
///
/// assert_eq!(options.colormap, "hot");
/// assert_eq!(options.cal_max, Some(400.0));
/// assert!(options.trust_cal_min_max);
/// ```
#[derive(Debug, Default)]
pub struct ImageOptionsBuilder {
    options: ImageOptions,
}

impl ImageOptionsBuilder {
    /// Create a new instance of the builder with default parameters
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the [ImageOptions] type
    pub fn build(self) -> ImageOptions {
        self.options
    }

    /// Display name, including the extension used to detect the format
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.options.name = name.into();
        self
    }

    /// Source location, informational only
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.options.url = url.into();
        self
    }

    /// Colormap for positive values
    pub fn colormap(mut self, colormap: impl Into<String>) -> Self {
        self.options.colormap = colormap.into();
        self
    }

    /// Colormap for negative values
    pub fn colormap_negative(mut self, colormap: impl Into<String>) -> Self {
        self.options.colormap_negative = colormap.into();
        self
    }

    /// Colour table for a label atlas
    pub fn colormap_label(mut self, colormap: ColorMap) -> Self {
        self.options.colormap_label = Some(colormap);
        self
    }

    /// Opacity, clamped to `0..=1` when applied
    pub fn opacity(mut self, opacity: f64) -> Self {
        self.options.opacity = opacity;
        self
    }

    /// Fixed display range, replacing the range stored in the header
    pub fn cal_range(mut self, cal_min: f64, cal_max: f64) -> Self {
        self.options.cal_min = Some(cal_min);
        self.options.cal_max = Some(cal_max);
        self
    }

    /// Fixed display range for negative values
    pub fn cal_range_neg(mut self, cal_min: f64, cal_max: f64) -> Self {
        self.options.cal_min_neg = Some(cal_min);
        self.options.cal_max_neg = Some(cal_max);
        self
    }

    /// Whether a valid header display range skips the histogram
    pub fn trust_cal_min_max(mut self, trust: bool) -> Self {
        self.options.trust_cal_min_max = trust;
        self
    }

    /// Tail fraction for the percentile range
    ///
    /// The default of 0.02 gives the 2% to 98% range.
    pub fn percentile_frac(mut self, fraction: f64) -> Self {
        self.options.percentile_frac = fraction;
        self
    }

    /// Exclude exact zeros from calibration
    pub fn ignore_zero_voxels(mut self, ignore: bool) -> Self {
        self.options.ignore_zero_voxels = ignore;
        self
    }

    /// Prefer the quaternion transform
    pub fn use_qform_not_sform(mut self, use_qform: bool) -> Self {
        self.options.use_qform_not_sform = use_qform;
        self
    }

    /// Show or hide the colourbar
    pub fn colorbar_visible(mut self, visible: bool) -> Self {
        self.options.colorbar_visible = visible;
        self
    }

    /// Initial frame of 4D data
    pub fn frame_4d(mut self, frame: usize) -> Self {
        self.options.frame_4d = frame;
        self
    }

    /// Load no more than `frames` frames
    ///
    /// Useful for previewing long time series.
    pub fn limit_frames_4d(mut self, frames: usize) -> Self {
        self.options.limit_frames_4d = Some(frames);
        self
    }

    /// Format hint for names without a usable extension
    pub fn image_type(mut self, image_type: impl Into<String>) -> Self {
        self.options.image_type = Some(image_type.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_field_names() {
        let options = ImageOptions::builder().cal_range(1.0, 2.0).frame_4d(3).build();
        let json = serde_json::to_value(&options).unwrap();
        assert_eq!(json["cal_min"], 1.0);
        assert_eq!(json["frame4D"], 3);
        assert_eq!(json["trustCalMinMax"], true);
        assert_eq!(json["useQFormNotSForm"], false);
        assert!(json["limitFrames4D"].is_null());
    }

    #[test]
    fn missing_fields_take_defaults() {
        let options: ImageOptions = serde_json::from_str(r#"{"name": "a.nii"}"#).unwrap();
        assert_eq!(options.colormap, "gray");
        assert_eq!(options.percentile_frac, 0.02);
    }

    #[test]
    fn image_type_extends_name() {
        let options = ImageOptions::builder().name("blob").image_type(".mgz").build();
        assert_eq!(options.detection_name(), "blob.mgz");
    }
}
