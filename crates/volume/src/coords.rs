//! Conversions between voxel, fraction, and world millimetre coordinates
//!
//! All of these work on the canonical voxel grid and are pure functions of
//! the [AffineSet].

// crate modules
use crate::reorient::{transform_point, AffineSet};

// external crates
use log::trace;

impl AffineSet {
    /// Canonical voxel index to world mm
    ///
    /// Voxel centres sit at integer coordinates.
    ///
    /// ```rust
    /// # use voltools_header::{Header, DataType};
    /// # use voltools_volume::compute_canonical_orientation;
    /// let mut header = Header::new([10, 10, 10], DataType::Uint8);
    /// header.affine[0][0] = 2.0;
    /// header.affine[0][3] = -10.0;
    ///
    /// let affines = compute_canonical_orientation(&header).unwrap();
    /// assert_eq!(affines.vox2mm([5.0, 0.0, 0.0]), [0.0, 0.0, 0.0]);
    /// assert_eq!(affines.mm2vox([0.0, 0.0, 0.0]), [5, 0, 0]);
    /// ```
    pub fn vox2mm(&self, vox: [f64; 3]) -> [f64; 3] {
        transform_point(&self.mat_ras, vox).into()
    }

    /// World mm to the nearest canonical voxel index
    pub fn mm2vox(&self, mm: [f64; 3]) -> [i64; 3] {
        self.mm2vox_frac(mm).map(|v| v.round() as i64)
    }

    /// World mm to a fractional canonical voxel index
    pub fn mm2vox_frac(&self, mm: [f64; 3]) -> [f64; 3] {
        transform_point(&self.mat_ras_inv, mm).into()
    }

    /// Voxel index to fraction of the grid extent
    pub fn vox2frac(&self, vox: [f64; 3]) -> [f64; 3] {
        let mut frac = [0.0; 3];
        for i in 0..3 {
            frac[i] = (vox[i] + 0.5) / self.dims_ras[i] as f64;
        }
        frac
    }

    /// Fraction of the grid extent to the voxel containing it
    ///
    /// ```rust
    /// # use voltools_header::{Header, DataType};
    /// # use voltools_volume::compute_canonical_orientation;
    /// let header = Header::new([4, 4, 4], DataType::Uint8);
    /// let affines = compute_canonical_orientation(&header).unwrap();
    ///
    /// assert_eq!(affines.vox2frac([1.0, 0.0, 3.0]), [0.375, 0.125, 0.875]);
    /// assert_eq!(affines.frac2vox([0.375, 0.125, 0.875]), [1, 0, 3]);
    /// ```
    pub fn frac2vox(&self, frac: [f64; 3]) -> [i64; 3] {
        let mut vox = [0; 3];
        for i in 0..3 {
            vox[i] = (frac[i] * self.dims_ras[i] as f64 - 0.5).round() as i64;
        }
        vox
    }

    /// Fraction to world mm
    ///
    /// With `ortho` set an oblique grid is treated as if it were aligned with
    /// the world axes, matching how it is drawn in 2D views. Otherwise the
    /// true position is returned.
    pub fn frac2mm(&self, frac: [f64; 3], ortho: bool) -> [f64; 3] {
        let m = if ortho { &self.frac2mm_ortho } else { &self.frac2mm };
        transform_point(m, frac).into()
    }

    /// World mm to fraction of the grid extent
    ///
    /// The inverse of [frac2mm()](AffineSet::frac2mm) for the same `ortho`
    /// flag. Axes with no extent map to 0.
    pub fn mm2frac(&self, mm: [f64; 3], ortho: bool) -> [f64; 3] {
        if ortho {
            return match self.frac2mm_ortho.try_inverse() {
                Some(inverse) => transform_point(&inverse, mm).into(),
                None => {
                    trace!("orthogonal transform is singular");
                    [0.0; 3]
                }
            };
        }

        let vox = self.mm2vox_frac(mm);
        let mut frac = [0.0; 3];
        for i in 0..3 {
            let dim = self.dims_ras[i] as f64;
            if dim >= 1.0 {
                frac[i] = (vox[i] + 0.5) / dim;
            }
        }
        frac
    }

    /// World mm into the axis aligned frame used for oblique 2D views
    pub fn mm2ortho(&self, mm: [f64; 3]) -> [f64; 3] {
        transform_point(&self.mm2ortho, mm).into()
    }

    /// World space bounding box of the whole grid, as (min, max)
    ///
    /// Voxel extents are included, so a single voxel at the origin with 1 mm
    /// spacing spans -0.5 to 0.5.
    pub fn extents_mm(&self) -> ([f64; 3], [f64; 3]) {
        let [dx, dy, dz] = self.dims_ras.map(|d| d as f64 - 0.5);
        let mut min = [f64::INFINITY; 3];
        let mut max = [f64::NEG_INFINITY; 3];
        for x in [-0.5, dx] {
            for y in [-0.5, dy] {
                for z in [-0.5, dz] {
                    let mm = self.vox2mm([x, y, z]);
                    for i in 0..3 {
                        min[i] = min[i].min(mm[i]);
                        max[i] = max[i].max(mm[i]);
                    }
                }
            }
        }
        (min, max)
    }
}
