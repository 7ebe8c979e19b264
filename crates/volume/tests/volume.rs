use rstest::{fixture, rstest};

use voltools_header::{encode_buffer, serialize_header, DataType, Header, VoxelBuffer};
use voltools_volume::{
    cal_min_max, compute_canonical_orientation, reorder_voxels, CalibrationSettings, ImageOptions,
    Volume,
};

/// Single file NIfTI-1 bytes for a header and buffer
fn nifti_bytes(header: &Header, buffer: &VoxelBuffer) -> Vec<u8> {
    let mut bytes = serialize_header(header);
    bytes.extend(encode_buffer(buffer));
    bytes
}

#[fixture]
fn oblique_header() -> Header {
    // 20 degrees about z with anisotropic spacing and an offset origin
    let (s, c) = 20_f64.to_radians().sin_cos();
    let mut header = Header::new([6, 5, 4], DataType::Float32);
    header.pix_dims[1..4].copy_from_slice(&[2.0, 1.5, 3.0]);
    header.affine = [
        [2.0 * c, -1.5 * s, 0.0, -7.0],
        [2.0 * s, 1.5 * c, 0.0, 4.5],
        [0.0, 0.0, 3.0, 12.0],
        [0.0, 0.0, 0.0, 1.0],
    ];
    header
}

#[rstest]
fn first_axis_flip() {
    let mut header = Header::new([3, 3, 3], DataType::Uint8);
    header.affine[0][0] = -1.0;
    let affines = compute_canonical_orientation(&header).unwrap();

    assert_eq!(affines.permutation, [0, 1, 2]);
    assert_eq!(affines.flips, [true, false, false]);
    assert!(affines.mat_ras[(0, 0)] > 0.0);

    // canonical voxel 0 is the right-most on-disk voxel
    assert_eq!(affines.vox2mm([0.0, 0.0, 0.0]), [-2.0, 0.0, 0.0]);
}

#[rstest]
fn canonical_header_is_unchanged(#[values([1.0, 1.0, 1.0], [0.5, 2.0, 3.0])] spacing: [f64; 3]) {
    let mut header = Header::new([4, 3, 2], DataType::Uint8);
    for i in 0..3 {
        header.affine[i][i] = spacing[i];
        header.affine[i][3] = -(i as f64);
    }
    let affines = compute_canonical_orientation(&header).unwrap();

    assert!(affines.is_canonical());
    assert_eq!(affines.perm_ras(), [1, 2, 3]);
    let diff = affines.mat_ras - header.affine_matrix();
    assert!(diff.abs().max() < 1e-5);
}

#[rstest]
fn reorientation_is_idempotent() {
    let mut header = Header::new([4, 3, 2], DataType::Uint8);
    header.affine = [
        [0.0, 0.0, -2.0, 10.0],
        [1.0, 0.0, 0.0, -3.0],
        [0.0, -1.0, 0.0, 5.0],
        [0.0, 0.0, 0.0, 1.0],
    ];
    let first = compute_canonical_orientation(&header).unwrap();
    assert!(!first.is_canonical());

    // feed the canonical grid back in
    let mut canonical = Header::new(first.dims_ras.map(|d| d as i64), DataType::Uint8);
    for r in 0..4 {
        for c in 0..4 {
            canonical.affine[r][c] = first.mat_ras[(r, c)];
        }
    }
    let second = compute_canonical_orientation(&canonical).unwrap();

    assert!(second.is_canonical());
    assert!((second.mat_ras - first.mat_ras).abs().max() < 1e-5);
}

#[rstest]
fn voxel_world_inverse(oblique_header: Header) {
    let affines = compute_canonical_orientation(&oblique_header).unwrap();
    for vox in [[0.0, 0.0, 0.0], [5.0, 4.0, 3.0], [2.0, 1.0, 0.0]] {
        let mm = affines.vox2mm(vox);
        assert_eq!(affines.mm2vox(mm), vox.map(|v| v as i64));
    }
}

#[rstest]
fn voxel_fraction_inverse(oblique_header: Header) {
    let affines = compute_canonical_orientation(&oblique_header).unwrap();
    for vox in [[0.0, 0.0, 0.0], [5.0, 4.0, 3.0], [3.0, 2.0, 1.0]] {
        let frac = affines.vox2frac(vox);
        assert!(frac.iter().all(|f| (0.0..=1.0).contains(f)));
        assert_eq!(affines.frac2vox(frac), vox.map(|v| v as i64));
    }
}

#[rstest]
fn oblique_grid_is_reported(oblique_header: Header) {
    let affines = compute_canonical_orientation(&oblique_header).unwrap();
    assert!(affines.is_oblique());
    assert!((affines.oblique_angle - 20.0).abs() < 1e-6);
    assert!(affines.max_shear_deg < 0.1);

    // true and axis aligned positions agree at the grid centre
    let centre = [0.5, 0.5, 0.5];
    let mm = affines.frac2mm(centre, false);
    let back = affines.mm2frac(mm, false);
    for i in 0..3 {
        assert!((back[i] - centre[i]).abs() < 1e-9);
    }
}

#[rstest]
fn reorder_follows_flips() {
    let mut header = Header::new([2, 2, 1], DataType::Uint8);
    header.affine[1][1] = -1.0;
    let affines = compute_canonical_orientation(&header).unwrap();
    let buffer = VoxelBuffer::U8(vec![1, 2, 3, 4]);

    let ras = reorder_voxels(&buffer, &affines);
    assert_eq!(*ras, VoxelBuffer::U8(vec![3, 4, 1, 2]));

    // already canonical data is not copied
    let identity = compute_canonical_orientation(&Header::new([2, 2, 1], DataType::Uint8)).unwrap();
    assert!(matches!(reorder_voxels(&buffer, &identity), std::borrow::Cow::Borrowed(_)));
}

#[rstest]
#[case::ramp((0..1000).map(|v| v as f32).collect())]
#[case::noisy((0..1000).map(|v| ((v * 7919) % 1000) as f32 - 300.0).collect())]
#[case::hot_voxel((0..1000).map(|v| if v == 500 { 1e6 } else { (v % 50) as f32 }).collect())]
fn calibration_within_bounds(#[case] data: Vec<f32>) {
    let header = Header::new([10, 10, 10], DataType::Float32);
    let buffer = VoxelBuffer::F32(data);
    let outcome = cal_min_max(&buffer, &header, 0, &CalibrationSettings::default()).unwrap();
    let (low, high, min, max) = outcome.calibration.as_tuple();

    assert!(min <= low, "{min} <= {low}");
    assert!(low <= high, "{low} <= {high}");
    assert!(high <= max, "{high} <= {max}");
}

#[rstest]
fn hot_voxel_is_excluded() {
    let header = Header::new([10, 10, 10], DataType::Float32);
    let data = (0..1000).map(|v| if v == 555 { 1000.0 } else { (v % 50) as f32 }).collect();
    let outcome =
        cal_min_max(&VoxelBuffer::F32(data), &header, 0, &CalibrationSettings::default()).unwrap();
    assert_eq!(outcome.calibration.global_max, 1000.0);
    assert!(outcome.calibration.cal_max < 100.0);
}

#[rstest]
fn constant_volume_is_flat() {
    let header = Header::new([4, 4, 4], DataType::Int16);
    let buffer = VoxelBuffer::I16(vec![7; 64]);
    let outcome = cal_min_max(&buffer, &header, 0, &CalibrationSettings::default()).unwrap();
    let (low, high, min, max) = outcome.calibration.as_tuple();
    assert_eq!((low, high, min, max), (7.0, 7.0, 7.0, 7.0));
}

#[rstest]
fn zero_background_forces_exclusion() {
    // 70% zeros with a ramp in the rest
    let header = Header::new([10, 10, 10], DataType::Float32);
    let data = (0..1000)
        .map(|v| if v < 700 { 0.0 } else { (v - 699) as f32 })
        .collect();
    let settings = CalibrationSettings {
        use_border_crop: false,
        ..Default::default()
    };
    let outcome = cal_min_max(&VoxelBuffer::F32(data), &header, 0, &settings).unwrap();

    assert!(outcome.ignore_zero_voxels);
    assert!(outcome.calibration.cal_min <= 0.0);
    assert_eq!(outcome.calibration.global_min, 0.0);
}

#[rstest]
fn zero_background_wins_over_header_range() {
    // 70 zeros then a 1..=30 ramp, with an untrusted header range inside it
    let mut header = Header::new([10, 10, 1], DataType::Float32);
    header.cal_min = 10.0;
    header.cal_max = 20.0;
    let data = (0..100)
        .map(|v| if v < 70 { 0.0 } else { (v - 69) as f32 })
        .collect();
    let settings = CalibrationSettings {
        trust_cal_min_max: false,
        use_border_crop: false,
        ..Default::default()
    };
    let outcome = cal_min_max(&VoxelBuffer::F32(data), &header, 0, &settings).unwrap();
    let (low, high, min, max) = outcome.calibration.as_tuple();

    assert!(outcome.ignore_zero_voxels);
    assert!(low <= 0.0, "{low}");
    assert_eq!(high, 20.0);
    assert_eq!((min, max), (0.0, 30.0));
}

#[rstest]
fn trusted_range_keeps_data_extrema() {
    let mut header = Header::new([10, 1, 1], DataType::Float32);
    header.cal_min = 2.0;
    header.cal_max = 5.0;
    let buffer = VoxelBuffer::F32((0..10).map(|v| (v * 10) as f32).collect());

    let outcome = cal_min_max(&buffer, &header, 0, &CalibrationSettings::default()).unwrap();
    assert_eq!(outcome.calibration.as_tuple(), (2.0, 5.0, 0.0, 90.0));
}

#[rstest]
fn zero_fraction_follows_the_cropped_sample() {
    // zeros only in the outer border, so the centre decides
    let header = Header::new([8, 8, 8], DataType::Float32);
    let data = (0..512_usize)
        .map(|n| {
            let (i, j, k) = (n % 8, (n / 8) % 8, n / 64);
            let inner = [i, j, k].iter().all(|c| (2..6).contains(c));
            if inner { (i + j + k) as f32 } else { 0.0 }
        })
        .collect();
    let outcome =
        cal_min_max(&VoxelBuffer::F32(data), &header, 0, &CalibrationSettings::default()).unwrap();

    // 87.5% of the frame is zero, none of the centre
    assert!(!outcome.ignore_zero_voxels);
    assert!(!outcome.retried_uncropped);
}

#[rstest]
fn zero_exclusion_sticks_to_the_volume() {
    let mut header = Header::new([10, 10, 10], DataType::Uint8);
    header.dims[0] = 4;
    header.dims[4] = 2;
    // first frame mostly zero, second frame dense
    let mut data = vec![0_u8; 1000];
    data[800..].iter_mut().enumerate().for_each(|(i, v)| *v = (i % 200) as u8 + 1);
    data.extend((0..1000).map(|v| (v % 250) as u8));

    let mut volume = Volume::from_parts("sparse", header, VoxelBuffer::U8(data)).unwrap();
    assert!(volume.ignore_zero_voxels());

    volume.set_frame_4d(1);
    volume.recalibrate().unwrap();
    assert!(volume.ignore_zero_voxels());
}

#[rstest]
fn zero_slope_behaves_as_one() {
    let mut header = Header::new([4, 4, 4], DataType::Int16);
    header.scl_slope = 0.0;
    header.scl_inter = 100.0;
    let buffer = VoxelBuffer::I16((0..64).collect());
    let volume = Volume::from_parts("offset", header, buffer).unwrap();

    assert_eq!(volume.header().scl_slope, 1.0);
    assert_eq!(volume.value_at([1, 0, 0]), Some(101.0));
    assert_eq!(volume.calibration().global_min, 100.0);
    assert_eq!(volume.calibration().global_max, 163.0);
}

#[rstest]
fn trusted_header_range_is_used() {
    let mut header = Header::new([10, 10, 10], DataType::Int16);
    header.cal_min = 10.0;
    header.cal_max = 20.0;
    let buffer = VoxelBuffer::I16((0..1000).collect());

    let trusted = cal_min_max(&buffer, &header, 0, &CalibrationSettings::default()).unwrap();
    // the display range comes from the header, the extrema from the data
    assert_eq!(trusted.calibration.as_tuple(), (10.0, 20.0, 0.0, 999.0));

    // without trust the range is still kept, since it lies inside the data
    let settings = CalibrationSettings {
        trust_cal_min_max: false,
        ..Default::default()
    };
    let computed = cal_min_max(&buffer, &header, 0, &settings).unwrap();
    assert_eq!(computed.calibration.as_tuple(), (10.0, 20.0, 0.0, 999.0));
}

#[rstest]
fn nifti_bytes_load() {
    let mut header = Header::new([3, 3, 3], DataType::Int16);
    header.affine[0][0] = -1.0;
    let buffer = VoxelBuffer::I16((0..27).collect());
    let bytes = nifti_bytes(&header, &buffer);

    let options = ImageOptions::builder().name("flip.nii").colormap("hot").build();
    let volume = Volume::from_bytes(&bytes, options).unwrap();

    assert_eq!(volume.name, "flip.nii");
    assert_eq!(volume.colormap(), "hot");
    assert_eq!(volume.affines().flips, [true, false, false]);
    assert_eq!(volume.value_at([0, 0, 0]), Some(2.0));
    assert_eq!(volume.load_options().map(|o| o.colormap.as_str()), Some("hot"));
}

#[rstest]
fn truncated_series_loads_partially() {
    let mut header = Header::new([2, 2, 2], DataType::Uint8);
    header.dims[0] = 4;
    header.dims[4] = 5;
    // three and a half frames present
    let mut bytes = serialize_header(&header);
    bytes.extend((0..28).map(|v| v as u8));

    let volume = Volume::from_bytes(&bytes, ImageOptions::builder().name("run.nii").build()).unwrap();
    assert_eq!(volume.n_frame_4d(), 3);
    assert_eq!(volume.n_total_frame_4d(), 5);
    assert!(volume.is_partial());
    assert_eq!(volume.buffer().len(), 24);
}

#[rstest]
#[case(1, 1)]
#[case(2, 2)]
#[case(10, 4)]
fn frame_limit(#[case] limit: usize, #[case] expected: usize) {
    let mut header = Header::new([2, 2, 2], DataType::Uint8);
    header.dims[0] = 4;
    header.dims[4] = 4;
    let buffer = VoxelBuffer::U8((0..32).collect());
    let bytes = nifti_bytes(&header, &buffer);

    let options = ImageOptions::builder().name("run.nii").limit_frames_4d(limit).build();
    let volume = Volume::from_bytes(&bytes, options).unwrap();
    assert_eq!(volume.n_frame_4d(), expected);
    assert_eq!(volume.header().declared_frames(), expected);
}

#[rstest]
fn option_range_overrides_header() {
    let header = Header::new([4, 4, 4], DataType::Uint8);
    let bytes = nifti_bytes(&header, &VoxelBuffer::U8((0..64).collect()));
    let options = ImageOptions::builder().name("a.nii").cal_range(5.0, 50.0).build();

    let volume = Volume::from_bytes(&bytes, options).unwrap();
    assert_eq!(volume.calibration().cal_min, 5.0);
    assert_eq!(volume.calibration().cal_max, 50.0);
}

#[rstest]
fn exported_nifti_reloads() {
    let mut header = Header::new([3, 2, 2], DataType::Float32);
    header.affine[2][2] = -2.0;
    header.scl_inter = 1.0;
    let buffer = VoxelBuffer::F32((0..12).map(|v| v as f32 * 0.5).collect());
    let volume = Volume::from_parts("scan", header, buffer).unwrap();

    let bytes = volume.to_nifti_bytes();
    let reloaded = Volume::from_bytes(&bytes, ImageOptions::builder().name("scan.nii").build()).unwrap();

    assert_eq!(reloaded.buffer(), volume.buffer());
    assert_eq!(reloaded.affines().flips, volume.affines().flips);
    assert_eq!(reloaded.value_at([1, 1, 0]), volume.value_at([1, 1, 0]));
}

#[rstest]
fn reconstructed_options_describe_state() {
    let header = Header::new([4, 4, 4], DataType::Uint8);
    let mut volume = Volume::from_parts("blob", header, VoxelBuffer::U8((0..64).collect())).unwrap();
    volume.set_colormap("winter").unwrap();
    volume.set_cal_range(30.0, 3.0);
    volume.set_opacity(0.25);

    let options = volume.reconstruct_options();
    assert_eq!(options.name, "blob.nii");
    assert_eq!(options.colormap, "winter");
    assert_eq!((options.cal_min, options.cal_max), (Some(3.0), Some(30.0)));
    assert_eq!(options.opacity, 0.25);
    assert!(volume.load_options().is_none());
}
