//! Robust display range from an intensity histogram
//!
//! A 1001 bin histogram is built over one 3D frame and the display range is
//! placed so that each tail holds a small fraction of voxels, ignoring
//! outliers such as a few hot voxels or a zero filled background.

// standard library
use std::ops::Range;

// crate modules
use crate::error::{Error, Result};

// voltools modules
use voltools_header::{Header, VoxelBuffer, INTENT_LABEL};
use voltools_utils::{FloatExt, SliceExt};

// external crates
use itertools::iproduct;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

/// Number of histogram bins
const N_BINS: usize = 1001;

/// Fraction of each spatial axis excluded at either edge when cropping
const BORDER_FRACTION: f64 = 0.25;

/// Zero fraction at which zero voxels are excluded automatically
const ZERO_FRACTION_LIMIT: f64 = 0.6;

/// Display range and data extrema of a volume, in scaled units
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    /// Lower end of the display range
    pub cal_min: f64,
    /// Upper end of the display range
    pub cal_max: f64,
    /// Lower percentile cutoff as computed
    pub robust_min: f64,
    /// Upper percentile cutoff as computed
    pub robust_max: f64,
    /// Smallest finite value in the frame
    pub global_min: f64,
    /// Largest finite value in the frame
    pub global_max: f64,
}

impl Calibration {
    /// Flat calibration where every value is the same
    fn flat(value: f64) -> Self {
        Self::with_range(value, value, value, value)
    }

    fn with_range(low: f64, high: f64, global_min: f64, global_max: f64) -> Self {
        Self {
            cal_min: low,
            cal_max: high,
            robust_min: low,
            robust_max: high,
            global_min,
            global_max,
        }
    }

    /// The `(low, high, global_min, global_max)` tuple
    pub fn as_tuple(&self) -> (f64, f64, f64, f64) {
        (self.cal_min, self.cal_max, self.global_min, self.global_max)
    }
}

/// Parameters controlling [cal_min_max()]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationSettings {
    /// Fraction of included voxels in each tail
    pub percentile_frac: f64,
    /// Exclude exact zeros from the histogram
    pub ignore_zero_voxels: bool,
    /// Use a valid display range from the header without a histogram
    pub trust_cal_min_max: bool,
    /// Sample only the centre of the grid
    pub use_border_crop: bool,
}

impl Default for CalibrationSettings {
    fn default() -> Self {
        Self {
            percentile_frac: 0.02,
            ignore_zero_voxels: false,
            trust_cal_min_max: true,
            use_border_crop: true,
        }
    }
}

/// Everything [cal_min_max()] found out
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationOutcome {
    /// The computed range
    pub calibration: Calibration,
    /// Whether zeros were excluded, possibly forced on by a zero background
    pub ignore_zero_voxels: bool,
    /// The cropped sample was flat and the whole frame was used instead
    pub retried_uncropped: bool,
}

/// One pass statistics over a full frame
#[derive(Debug, Default)]
struct FrameStats {
    n_voxels: usize,
    n_nan: usize,
    min: f64,
    max: f64,
}

/// Compute the display range of one frame
///
/// In order of precedence:
///
/// 1. Label images use the true extrema
/// 2. A consistent header display range is used as-is when trusted
/// 3. Otherwise the percentile range of the histogram, replaced by the
///    header display range if that falls inside the data
///
/// The global range is always the true extent of the frame. NaN never
/// contributes. Zeros are excluded when configured to, or when
/// 60% or more of the sampled voxels are zero, in which case the returned outcome
/// carries the forced flag so the caller can keep it set. For a mostly zero
/// frame the lower end of the range is kept at or below the scaled value of
/// a raw zero.
///
/// ```rust
/// # use voltools_header::{Header, DataType, VoxelBuffer};
/// # use voltools_volume::{cal_min_max, CalibrationSettings};
/// let header = Header::new([10, 10, 1], DataType::Float32);
/// let buffer = VoxelBuffer::F32((0..100).map(|v| v as f32).collect());
///
/// let settings = CalibrationSettings {
///     use_border_crop: false,
///     ..Default::default()
/// };
/// let outcome = cal_min_max(&buffer, &header, 0, &settings).unwrap();
/// let (low, high, min, max) = outcome.calibration.as_tuple();
///
/// assert_eq!((min, max), (0.0, 99.0));
/// assert!(low > min && high < max && low < high);
/// ```
pub fn cal_min_max(
    buffer: &VoxelBuffer,
    header: &Header,
    frame: usize,
    settings: &CalibrationSettings,
) -> Result<CalibrationOutcome> {
    let n_voxels = header.voxels_per_frame();
    let frames = buffer.len() / n_voxels.max(1);
    if frame >= frames {
        return Err(Error::FrameOutOfRange { frame, frames });
    }
    let offset = frame * n_voxels;

    let mut outcome = CalibrationOutcome {
        calibration: Calibration::default(),
        ignore_zero_voxels: settings.ignore_zero_voxels,
        retried_uncropped: false,
    };

    // integer storage can not hold NaN, so the check is skipped entirely
    let may_hold_nan = buffer.is_float();
    let value = |i: usize| buffer.get(offset + i).unwrap_or(f64::NAN);
    let defined = |v: &f64| !may_hold_nan || v.is_finite();

    let stats = frame_stats(n_voxels, may_hold_nan, &value);
    let all_nan = stats.n_voxels == stats.n_nan;
    let (global_min, global_max) = scaled_extent(header, stats.min, stats.max);

    if settings.trust_cal_min_max
        && header.cal_min.is_finite()
        && header.cal_max.is_finite()
        && header.cal_max > header.cal_min
        && header.intent_code != INTENT_LABEL
    {
        debug!("using trusted display range from header");
        let (global_min, global_max) = if all_nan {
            (header.cal_min, header.cal_max)
        } else {
            (global_min, global_max)
        };
        outcome.calibration =
            Calibration::with_range(header.cal_min, header.cal_max, global_min, global_max);
        return Ok(outcome);
    }

    if all_nan {
        warn!("frame {frame} holds no finite values");
        outcome.calibration = Calibration::flat(0.0);
        return Ok(outcome);
    }

    if header.intent_code == INTENT_LABEL {
        debug!("label image, using full range");
        outcome.calibration = Calibration::with_range(global_min, global_max, global_min, global_max);
        return Ok(outcome);
    }

    let dims = header.spatial_dims();
    let region = |crop: bool| -> Vec<f64> {
        let [x, y, z] = if crop { dims.map(crop_range) } else { dims.map(|d| 0..d) };
        iproduct!(z, y, x)
            .map(|(k, j, i)| value(i + j * dims[0] + k * dims[0] * dims[1]))
            .filter(defined)
            .collect()
    };

    // zeros are counted over the same voxels the histogram sees
    let mut crop = settings.use_border_crop;
    let (sample, zero_fraction) = loop {
        let values = region(crop);
        let zero_fraction = fraction_of_zeros(&values);
        let ignore_zero = settings.ignore_zero_voxels || zero_fraction >= ZERO_FRACTION_LIMIT;
        let sample: Vec<f64> = values
            .into_iter()
            .filter(|&v| !(ignore_zero && v == 0.0))
            .collect();
        if crop && !has_variance(&sample) {
            debug!("no variability in cropped sample, retrying with full frame");
            outcome.retried_uncropped = true;
            crop = false;
            continue;
        }
        break (sample, zero_fraction);
    };

    let mostly_zero = zero_fraction >= ZERO_FRACTION_LIMIT;
    if mostly_zero && !settings.ignore_zero_voxels {
        info!("{:.0}% of voxels are zero, excluding zeros", zero_fraction * 100.0);
    }
    outcome.ignore_zero_voxels = settings.ignore_zero_voxels || mostly_zero;

    let (mut low, mut high) = match percentile_range(&sample, settings.percentile_frac) {
        Some((low, high)) => {
            let (mut low, mut high) = scaled_extent(header, low, high);
            if header.cal_min < header.cal_max
                && header.cal_min >= global_min
                && header.cal_max <= global_max
            {
                debug!("header display range lies within the data, keeping it");
                low = header.cal_min;
                high = header.cal_max;
            }
            (low, high)
        }
        None => {
            debug!("no variability in image intensity");
            let (min, max) = sample_extent(&sample).unwrap_or((stats.min, stats.max));
            scaled_extent(header, min, max)
        }
    };

    // a mostly zero frame always shows its background
    if mostly_zero {
        low = low.min(header.raw_to_scaled(0.0));
        high = high.max(low);
    }

    outcome.calibration = Calibration::with_range(low, high, global_min, global_max);
    Ok(outcome)
}

fn fraction_of_zeros(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().filter(|&&v| v == 0.0).count() as f64 / values.len() as f64
}

fn frame_stats(n_voxels: usize, may_hold_nan: bool, value: &impl Fn(usize) -> f64) -> FrameStats {
    let mut stats = FrameStats {
        n_voxels,
        min: f64::INFINITY,
        max: f64::NEG_INFINITY,
        ..Default::default()
    };
    for v in (0..n_voxels).map(value) {
        if may_hold_nan && !v.is_finite() {
            stats.n_nan += 1;
            continue;
        }
        stats.min = stats.min.min(v);
        stats.max = stats.max.max(v);
    }
    stats
}

/// Central half of an axis, or the whole axis if that would be empty
fn crop_range(dim: usize) -> Range<usize> {
    let border = (dim as f64 * BORDER_FRACTION).floor() as usize;
    if dim > 2 * border {
        border..dim - border
    } else {
        0..dim
    }
}

fn sample_extent(sample: &[f64]) -> Option<(f64, f64)> {
    sample.finite_extent().ok()
}

fn has_variance(sample: &[f64]) -> bool {
    matches!(sample_extent(sample), Some((lo, hi)) if lo < hi)
}

/// Raw values at the two percentile cutoffs, `None` for a flat sample
fn percentile_range(sample: &[f64], percentile_frac: f64) -> Option<(f64, f64)> {
    let (mn, mx) = sample_extent(sample)?;
    let fraction = percentile_frac.finite_or(0.02).clamp(0.0, 0.5);
    let n2pct = (sample.len() as f64 * fraction).round() as usize;
    if n2pct < 1 || mn == mx {
        return None;
    }

    let scale = (N_BINS - 1) as f64 / (mx - mn);
    let mut hist = [0_usize; N_BINS];
    for v in sample {
        let bin = ((v - mn) * scale).round() as usize;
        hist[bin.min(N_BINS - 1)] += 1;
    }

    let mut n = 0;
    let mut lo = 0;
    while n < n2pct {
        n += hist[lo];
        lo += 1;
    }
    lo -= 1;

    n = 0;
    let mut hi = N_BINS;
    while n < n2pct {
        hi -= 1;
        n += hist[hi];
    }

    // most voxels share a single bin, widen to the nearest occupied neighbours
    if lo == hi {
        loop {
            if lo > 0 {
                lo -= 1;
                if hist[lo] > 0 {
                    break;
                }
            }
            if hi < N_BINS - 1 {
                hi += 1;
                if hist[hi] > 0 {
                    break;
                }
            }
            if lo == 0 && hi == N_BINS - 1 {
                break;
            }
        }
    }

    let (lo, hi) = (lo.min(hi), lo.max(hi));
    Some((lo as f64 / scale + mn, hi as f64 / scale + mn))
}

/// Raw range to scaled units, ordered even for a negative slope
fn scaled_extent(header: &Header, low: f64, high: f64) -> (f64, f64) {
    let (a, b) = (header.raw_to_scaled(low), header.raw_to_scaled(high));
    (a.min(b), a.max(b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use voltools_header::DataType;

    fn uncropped() -> CalibrationSettings {
        CalibrationSettings {
            use_border_crop: false,
            ..Default::default()
        }
    }

    #[test]
    fn crop_keeps_centre() {
        assert_eq!(crop_range(8), 2..6);
        assert_eq!(crop_range(3), 0..3);
        assert_eq!(crop_range(1), 0..1);
    }

    #[test]
    fn outliers_are_clipped() {
        let mut values = vec![10.0_f32; 1000];
        for (i, v) in values.iter_mut().enumerate() {
            *v = 10.0 + (i % 100) as f32;
        }
        values[0] = -1000.0;
        values[1] = 5000.0;

        let header = Header::new([1000, 1, 1], DataType::Float32);
        let outcome = cal_min_max(&VoxelBuffer::F32(values), &header, 0, &uncropped()).unwrap();
        let c = outcome.calibration;
        assert_eq!((c.global_min, c.global_max), (-1000.0, 5000.0));
        assert!(c.cal_min > -1000.0 && c.cal_max < 5000.0);
    }

    #[test]
    fn nan_is_ignored() {
        let header = Header::new([4, 1, 1], DataType::Float32);
        let buffer = VoxelBuffer::F32(vec![f32::NAN, 1.0, 1.0, 1.0]);
        let outcome = cal_min_max(&buffer, &header, 0, &uncropped()).unwrap();
        assert_eq!(outcome.calibration.as_tuple(), (1.0, 1.0, 1.0, 1.0));
    }

    #[test]
    fn flat_crop_is_retried() {
        // constant centre, varying border
        let mut values = vec![5_u8; 64];
        for (i, v) in values.iter_mut().enumerate() {
            let (x, y, z) = (i % 4, (i / 4) % 4, i / 16);
            if ![x, y, z].iter().all(|c| (1..3).contains(c)) {
                *v = (i % 7) as u8 * 20;
            }
        }
        let header = Header::new([4, 4, 4], DataType::Uint8);
        let outcome =
            cal_min_max(&VoxelBuffer::U8(values), &header, 0, &CalibrationSettings::default()).unwrap();
        assert!(outcome.retried_uncropped);
        assert!(outcome.calibration.cal_min < outcome.calibration.cal_max);
    }

    #[test]
    fn missing_frame_is_an_error() {
        let header = Header::new([2, 1, 1], DataType::Uint8);
        let result = cal_min_max(&VoxelBuffer::U8(vec![0, 1]), &header, 1, &uncropped());
        assert!(matches!(result, Err(Error::FrameOutOfRange { frame: 1, frames: 1 })));
    }
}
