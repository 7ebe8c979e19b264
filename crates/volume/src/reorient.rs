//! Canonical right-anterior-superior orientation of the voxel grid
//!
//! Any of the 48 combinations of axis order and direction found on disk is
//! mapped onto a single voxel order. Only the permutation and flips are
//! removed, so oblique acquisitions keep a residual rotation in
//! [AffineSet::mat_ras].

// standard library
use std::borrow::Cow;

// crate modules
use crate::error::{Error, Result};

// voltools modules
use voltools_header::{Header, VoxelBuffer};
use voltools_utils::FloatExt;

// external crates
use itertools::iproduct;
use log::{debug, info, warn};
use nalgebra::{Matrix3, Matrix4, Vector3, Vector4};

/// Oblique angles below this many degrees are treated as plumb
const OBLIQUE_TOLERANCE_DEG: f64 = 0.01;

/// Shear above this many degrees is worth a warning
const SHEAR_TOLERANCE_DEG: f64 = 0.1;

/// Every transform derived from the header affine
///
/// "RAS space" below means the voxel grid after reordering into canonical
/// order. Voxel indices are integers at voxel centres, fractions are in
/// `0..1` across the full extent of the grid with voxel centres at
/// `(index + 0.5) / dim`.
#[derive(Debug, Clone, PartialEq)]
pub struct AffineSet {
    /// On-disk voxel axis feeding each canonical axis
    pub permutation: [usize; 3],
    /// Whether each canonical axis runs opposite to its on-disk axis
    pub flips: [bool; 3],
    /// On-disk grid dimensions
    pub dims: [usize; 3],
    /// Grid dimensions in canonical order
    pub dims_ras: [usize; 3],
    /// Voxel spacing in canonical order
    pub pix_dims_ras: [f64; 3],
    /// Canonical voxel index to world mm
    pub mat_ras: Matrix4<f64>,
    /// Inverse of `mat_ras`
    pub mat_ras_inv: Matrix4<f64>,
    /// On-disk unit texture coordinates to canonical unit coordinates
    pub to_ras: Matrix4<f64>,
    /// Canonical voxel index to on-disk voxel index
    pub to_ras_vox: Matrix4<f64>,
    /// Columns are the world direction of one mm along each canonical axis
    pub oblique_ras: Matrix4<f64>,
    /// Fraction to world mm, including any obliquity
    pub frac2mm: Matrix4<f64>,
    /// Fraction to world mm for an axis aligned view of an oblique grid
    pub frac2mm_ortho: Matrix4<f64>,
    /// World mm to the axis aligned frame of `frac2mm_ortho`
    pub mm2ortho: Matrix4<f64>,
    /// Lower corner of the axis aligned extent
    pub extents_min_ortho: [f64; 3],
    /// Upper corner of the axis aligned extent
    pub extents_max_ortho: [f64; 3],
    /// World position of the outer corner of voxel (0,0,0) on disk
    pub mm000: Vector3<f64>,
    /// Corner at the far end of the first on-disk axis
    pub mm100: Vector3<f64>,
    /// Corner at the far end of the second on-disk axis
    pub mm010: Vector3<f64>,
    /// Corner at the far end of the third on-disk axis
    pub mm001: Vector3<f64>,
    /// Degrees from plumb, zero when below tolerance
    pub oblique_angle: f64,
    /// Largest deviation from 90 degrees between voxel edges
    pub max_shear_deg: f64,
}

impl AffineSet {
    /// True if the on-disk order is already canonical
    pub fn is_canonical(&self) -> bool {
        self.permutation == [0, 1, 2] && self.flips == [false; 3]
    }

    /// Signed 1-based permutation, negative where the axis is flipped
    ///
    /// ```rust
    /// # use voltools_header::{Header, DataType};
    /// # use voltools_volume::compute_canonical_orientation;
    /// let mut header = Header::new([3, 3, 3], DataType::Uint8);
    /// header.affine[0][0] = -1.0;
    ///
    /// let affines = compute_canonical_orientation(&header).unwrap();
    /// assert_eq!(affines.perm_ras(), [-1, 2, 3]);
    /// ```
    pub fn perm_ras(&self) -> [i32; 3] {
        let mut perm = [0; 3];
        for (j, p) in perm.iter_mut().enumerate() {
            *p = self.permutation[j] as i32 + 1;
            if self.flips[j] {
                *p = -*p;
            }
        }
        perm
    }

    /// True if the grid is noticeably rotated relative to world axes
    pub fn is_oblique(&self) -> bool {
        self.oblique_angle > 0.0
    }
}

/// Compute the permutation, flips, and derived transforms for a header
///
/// Each on-disk voxel axis is assigned to the world axis it projects onto
/// most strongly, then any axis running against world direction is flipped.
/// When nothing needs to change the header affine is used as-is.
///
/// The header affine should already have been validated with
/// [Header::process_affine()]. A singular affine is an error.
pub fn compute_canonical_orientation(header: &Header) -> Result<AffineSet> {
    let affine = header.affine_matrix();
    let dims = header.spatial_dims();

    let permutation = axis_permutation(&affine.fixed_view::<3, 3>(0, 0).abs());

    // columns reordered so column j is the on-disk axis feeding world axis j
    let mut permuted = affine;
    for j in 0..3 {
        permuted.set_column(j, &affine.column(permutation[j]));
    }
    let flips = [0, 1, 2].map(|j| permuted[(j, j)] < 0.0);

    let dims_ras = permutation.map(|p| dims[p]);
    let pix_dims_ras = permutation.map(|p| header.pix_dims[p + 1]);

    let corner = |v: [f64; 3]| transform_point(&affine, v);
    let (d0, d1, d2) = (dims[0] as f64, dims[1] as f64, dims[2] as f64);
    let mm000 = corner([-0.5, -0.5, -0.5]);
    let mm100 = corner([d0 - 0.5, -0.5, -0.5]);
    let mm010 = corner([-0.5, d1 - 0.5, -0.5]);
    let mm001 = corner([-0.5, -0.5, d2 - 0.5]);

    let (mat_ras, to_ras, to_ras_vox) = if permutation == [0, 1, 2] && flips == [false; 3] {
        debug!("voxel order already canonical");
        (affine, Matrix4::identity(), Matrix4::identity())
    } else {
        debug!("reorienting {dims:?} to {dims_ras:?} (flips {flips:?})");
        let mut flip = Matrix4::identity();
        let mut to_ras = Matrix4::zeros();
        let mut to_ras_vox = Matrix4::zeros();
        to_ras[(3, 3)] = 1.0;
        to_ras_vox[(3, 3)] = 1.0;

        for j in 0..3 {
            let sign = if flips[j] { -1.0 } else { 1.0 };
            let far_edge = (dims_ras[j] as f64 - 1.0) * f64::from(flips[j]);

            flip[(j, j)] = sign;
            flip[(j, 3)] = far_edge;

            to_ras[(j, permutation[j])] = sign;
            to_ras[(j, 3)] = f64::from(flips[j]);

            to_ras_vox[(permutation[j], j)] = sign;
            to_ras_vox[(permutation[j], 3)] = far_edge;
        }

        // a reflection about the far edge is its own inverse
        (permuted * flip, to_ras, to_ras_vox)
    };

    let mat_ras_inv = mat_ras.try_inverse().ok_or(Error::SingularTransform)?;

    let mut affines = AffineSet {
        permutation,
        flips,
        dims,
        dims_ras,
        pix_dims_ras,
        mat_ras,
        mat_ras_inv,
        to_ras,
        to_ras_vox,
        oblique_ras: Matrix4::identity(),
        frac2mm: Matrix4::identity(),
        frac2mm_ortho: Matrix4::identity(),
        mm2ortho: Matrix4::identity(),
        extents_min_ortho: [0.0; 3],
        extents_max_ortho: [0.0; 3],
        mm000,
        mm100,
        mm010,
        mm001,
        oblique_angle: 0.0,
        max_shear_deg: 0.0,
    };
    calculate_oblique(&mut affines);
    Ok(affines)
}

/// On-disk axis feeding each world axis
///
/// The first voxel axis claims the world axis with the largest projection,
/// the second chooses between the remaining two, and the third takes what is
/// left.
fn axis_permutation(abs: &Matrix3<f64>) -> [usize; 3] {
    let mut x = 0;
    if abs[(1, 0)] > abs[(0, 0)] {
        x = 1;
    }
    if abs[(2, 0)] > abs[(0, 0)] && abs[(2, 0)] > abs[(1, 0)] {
        x = 2;
    }

    let (a, b) = match x {
        0 => (1, 2),
        1 => (0, 2),
        _ => (0, 1),
    };
    let y = if abs[(a, 1)] > abs[(b, 1)] { a } else { b };
    let z = 3 - x - y;

    let mut permutation = [0; 3];
    permutation[x] = 0;
    permutation[y] = 1;
    permutation[z] = 2;
    permutation
}

/// Obliquity, shear, and the fraction to mm transforms
fn calculate_oblique(affines: &mut AffineSet) {
    let m = affines.mat_ras;
    affines.oblique_angle = oblique_angle(&m);

    let pix = affines.pix_dims_ras.map(|p| p.usable_or(1.0));
    let edges: Vec<Vector3<f64>> = (0..3)
        .map(|c| m.fixed_view::<3, 1>(0, c).into_owned() / pix[c])
        .collect();

    let mut oblique = Matrix4::identity();
    for (c, edge) in edges.iter().enumerate() {
        oblique.fixed_view_mut::<3, 1>(0, c).copy_from(edge);
    }
    affines.oblique_ras = oblique;
    affines.max_shear_deg = max_shear_deg(&edges);
    if affines.max_shear_deg > SHEAR_TOLERANCE_DEG {
        warn!("voxels are rhomboidal, maximum shear is {:.4} degrees", affines.max_shear_deg);
    }

    let dim = affines.dims_ras.map(|d| d as f64);
    let shim = Matrix4::new_translation(&Vector3::new(-0.5, -0.5, -0.5));
    let scale = Matrix4::from_diagonal(&Vector4::new(dim[0], dim[1], dim[2], 1.0));
    affines.frac2mm = m * shim * scale;

    let origin = affines.mat_ras_inv * Vector4::new(0.0, 0.0, 0.0, 1.0);
    let mut ortho = Matrix4::identity();
    for i in 0..3 {
        ortho[(i, i)] = pix[i] * dim[i];
        ortho[(i, 3)] = (-origin[i] - 0.5) * pix[i];
    }
    affines.frac2mm_ortho = ortho;
    affines.extents_min_ortho = [0, 1, 2].map(|i| ortho[(i, 3)]);
    affines.extents_max_ortho = [0, 1, 2].map(|i| ortho[(i, i)] + ortho[(i, 3)]);

    affines.mm2ortho = oblique.try_inverse().unwrap_or_else(|| {
        warn!("oblique transform is singular, treating grid as plumb");
        Matrix4::identity()
    });
}

/// Degrees between the voxel grid and the nearest world axes
///
/// Each voxel axis is scored by how much of its length lies along a single
/// world axis and the worst score decides the angle.
///
/// ```rust
/// # use voltools_volume::oblique_angle;
/// # use nalgebra::Matrix4;
/// assert_eq!(oblique_angle(&Matrix4::identity()), 0.0);
///
/// // rotate 30 degrees about z
/// let (s, c) = 30_f64.to_radians().sin_cos();
/// let m = Matrix4::new(
///     c, -s, 0.0, 0.0,
///     s, c, 0.0, 0.0,
///     0.0, 0.0, 1.0, 0.0,
///     0.0, 0.0, 0.0, 1.0,
/// );
/// assert!((oblique_angle(&m) - 30.0).abs() < 1e-6);
/// ```
pub fn oblique_angle(m: &Matrix4<f64>) -> f64 {
    let merit = (0..3)
        .map(|c| {
            let column = m.fixed_view::<3, 1>(0, c);
            column.abs().max() / column.norm()
        })
        .fold(f64::INFINITY, f64::min);

    let angle = merit.clamp(-1.0, 1.0).acos().to_degrees().abs();
    if angle > OBLIQUE_TOLERANCE_DEG {
        info!("voxels not aligned with world space: {angle:.4} degrees from plumb");
        angle
    } else {
        0.0
    }
}

/// Largest deviation from a right angle between any two edge vectors
fn max_shear_deg(edges: &[Vector3<f64>]) -> f64 {
    [(0, 1), (0, 2), (1, 2)]
        .iter()
        .map(|&(a, b)| (90.0 - edges[a].angle(&edges[b]).to_degrees()).abs())
        .fold(0.0, f64::max)
}

/// Apply a homogeneous transform to a point
pub fn transform_point(m: &Matrix4<f64>, p: [f64; 3]) -> Vector3<f64> {
    let v = m * Vector4::new(p[0], p[1], p[2], 1.0);
    Vector3::new(v[0], v[1], v[2])
}

/// Source index for every output voxel of one canonical frame
///
/// Steps through the on-disk frame with one stride per canonical axis,
/// starting from the far edge of flipped axes, so the copy is a single
/// linear pass.
fn ras_index_table(affines: &AffineSet) -> Vec<usize> {
    let dims = affines.dims.map(|d| d as i64);
    let in_step = [1, dims[0], dims[0] * dims[1]];

    let mut out_step = affines.permutation.map(|p| in_step[p]);
    let out_dim = affines.dims_ras.map(|d| d as i64);
    let mut out_start = [0_i64; 3];
    for p in 0..3 {
        if affines.flips[p] {
            out_start[p] = out_step[p] * (out_dim[p] - 1);
            out_step[p] = -out_step[p];
        }
    }

    iproduct!(0..out_dim[2], 0..out_dim[1], 0..out_dim[0])
        .map(|(z, y, x)| {
            let index = out_start[0]
                + x * out_step[0]
                + out_start[1]
                + y * out_step[1]
                + out_start[2]
                + z * out_step[2];
            index as usize
        })
        .collect()
}

fn gather<T: Copy>(data: &[T], table: &[usize]) -> Vec<T> {
    data.chunks_exact(table.len())
        .flat_map(|frame| table.iter().map(move |&i| frame[i]))
        .collect()
}

/// Copy every frame of the buffer into canonical voxel order
///
/// Already canonical data is borrowed rather than copied.
///
/// ```rust
/// # use voltools_header::{Header, DataType, VoxelBuffer};
/// # use voltools_volume::{compute_canonical_orientation, reorder_voxels};
/// let mut header = Header::new([3, 1, 1], DataType::Uint8);
/// header.affine[0][0] = -1.0;
/// let affines = compute_canonical_orientation(&header).unwrap();
///
/// let buffer = VoxelBuffer::U8(vec![1, 2, 3]);
/// let ras = reorder_voxels(&buffer, &affines);
/// assert_eq!(*ras, VoxelBuffer::U8(vec![3, 2, 1]));
/// ```
pub fn reorder_voxels<'a>(buffer: &'a VoxelBuffer, affines: &AffineSet) -> Cow<'a, VoxelBuffer> {
    if affines.is_canonical() {
        return Cow::Borrowed(buffer);
    }

    let table = ras_index_table(affines);
    if table.is_empty() {
        return Cow::Borrowed(buffer);
    }

    Cow::Owned(match buffer {
        VoxelBuffer::U8(v) => VoxelBuffer::U8(gather(v, &table)),
        VoxelBuffer::I16(v) => VoxelBuffer::I16(gather(v, &table)),
        VoxelBuffer::U16(v) => VoxelBuffer::U16(gather(v, &table)),
        VoxelBuffer::F32(v) => VoxelBuffer::F32(gather(v, &table)),
        VoxelBuffer::F64(v) => VoxelBuffer::F64(gather(v, &table)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use voltools_header::DataType;

    fn header_with(linear: [[f64; 3]; 3], shape: [i64; 3]) -> Header {
        let mut header = Header::new(shape, DataType::Uint8);
        for r in 0..3 {
            header.affine[r][..3].copy_from_slice(&linear[r]);
        }
        header
    }

    #[test]
    fn swapped_axes_are_permuted() {
        // first voxel axis runs anterior, second runs right
        let header = header_with([[0.0, 2.0, 0.0], [3.0, 0.0, 0.0], [0.0, 0.0, 1.0]], [4, 5, 6]);
        let affines = compute_canonical_orientation(&header).unwrap();

        assert_eq!(affines.permutation, [1, 0, 2]);
        assert_eq!(affines.flips, [false; 3]);
        assert_eq!(affines.dims_ras, [5, 4, 6]);
        assert_eq!(affines.mat_ras[(0, 0)], 2.0);
        assert_eq!(affines.mat_ras[(1, 1)], 3.0);
    }

    #[test]
    fn flip_translation_preserves_world_positions() {
        let mut header = header_with([[1.0, 0.0, 0.0], [0.0, -1.0, 0.0], [0.0, 0.0, 1.0]], [3, 4, 5]);
        header.affine[1][3] = 10.0;
        let affines = compute_canonical_orientation(&header).unwrap();

        // canonical voxel (0,0,0) is on-disk voxel (0,3,0)
        let canonical = transform_point(&affines.mat_ras, [0.0, 0.0, 0.0]);
        let on_disk = transform_point(&header.affine_matrix(), [0.0, 3.0, 0.0]);
        assert!((canonical - on_disk).norm() < 1e-9);

        let source = transform_point(&affines.to_ras_vox, [0.0, 0.0, 0.0]);
        assert_eq!(source, Vector3::new(0.0, 3.0, 0.0));
    }

    #[test]
    fn reorder_matches_to_ras_vox() {
        let header = header_with([[0.0, 0.0, -1.0], [1.0, 0.0, 0.0], [0.0, -1.0, 0.0]], [2, 3, 4]);
        let affines = compute_canonical_orientation(&header).unwrap();
        let data: Vec<u16> = (0..24).collect();
        let buffer = VoxelBuffer::U16(data.clone());
        let ras = reorder_voxels(&buffer, &affines);

        let [nx, ny, _] = affines.dims_ras;
        let [dx, dy, _] = affines.dims;
        for (i, value) in (0..ras.len()).map(|i| (i, ras.get(i).unwrap())) {
            let v = [(i % nx) as f64, ((i / nx) % ny) as f64, (i / (nx * ny)) as f64];
            let s = transform_point(&affines.to_ras_vox, v);
            let src = s[0] as usize + s[1] as usize * dx + s[2] as usize * dx * dy;
            assert_eq!(value, data[src] as f64);
        }
    }

    #[test]
    fn shear_is_measured() {
        let header = header_with([[1.0, 0.1, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]], [2, 2, 2]);
        let affines = compute_canonical_orientation(&header).unwrap();
        let expected = 90.0 - (1.0 / 0.1_f64).atan().to_degrees();
        assert!((affines.max_shear_deg - expected).abs() < 1e-6);
    }

    #[test]
    fn singular_affine_is_an_error() {
        let header = header_with([[1.0, 0.0, 0.0], [0.0, 0.0, 0.0], [0.0, 0.0, 1.0]], [2, 2, 2]);
        assert!(matches!(
            compute_canonical_orientation(&header),
            Err(Error::SingularTransform)
        ));
    }
}
