//! Canonical orientation, coordinates, and display calibration of volumes
//!
//! Picks up where `voltools-header` leaves off. A [Volume] owns the converted
//! samples together with everything derived from them:
//!
//! - An [AffineSet] from [compute_canonical_orientation()], mapping the
//!   on-disk grid to right-anterior-superior voxel order
//! - Pure coordinate conversions between voxels, fractions, and world
//!   millimetres, implemented on [AffineSet]
//! - A [Calibration] from [cal_min_max()], the robust display range
//! - Presentation state such as colormap, opacity, and label colours
//!
//! ```rust
//! # use voltools_header::{Header, DataType, VoxelBuffer};
//! # use voltools_volume::Volume;
//! // A 3x3x3 grid stored right to left
//! let mut header = Header::new([3, 3, 3], DataType::Uint8);
//! header.affine[0][0] = -1.0;
//!
//! let volume = Volume::from_parts("flipped", header, VoxelBuffer::U8((0..27).collect())).unwrap();
//! let affines = volume.affines();
//!
//! assert_eq!(affines.flips, [true, false, false]);
//! assert!(affines.mat_ras[(0, 0)] > 0.0);
//!
//! // voxel centres round trip through world space
//! let mm = affines.vox2mm([1.0, 2.0, 0.0]);
//! assert_eq!(affines.mm2vox(mm), [1, 2, 0]);
//! ```

// Split into subfiles for development, but anything important is re-exported
mod calibrate;
mod coords;
mod error;
mod lut;
mod options;
mod reorient;
mod volume;

// Inline anything important for a nice public API
#[doc(inline)]
pub use calibrate::{cal_min_max, Calibration, CalibrationOutcome, CalibrationSettings};

#[doc(inline)]
pub use lut::{ColorMap, LabelLut};

#[doc(inline)]
pub use options::{ImageOptions, ImageOptionsBuilder};

#[doc(inline)]
pub use reorient::{
    compute_canonical_orientation, oblique_angle, reorder_voxels, transform_point, AffineSet,
};

#[doc(inline)]
pub use volume::Volume;

#[doc(inline)]
pub use error::{Error, Result};
