//! Integration tests for the format readers and datatype conversion

use std::io::Write;

use byteorder::{BigEndian, ByteOrder};
use flate2::write::GzEncoder;
use flate2::Compression;
use rstest::{fixture, rstest};
use voltools_header::{
    convert, encode_buffer, parse_header, read_volume_bytes, serialize_header, ConvertedData,
    DataType, Error, Header, VolumeFormat, VoxelBuffer, INTENT_LABEL,
};

/// Little endian single file NIfTI holding `data`
fn nifti_bytes(header: &Header, data: &[u8]) -> Vec<u8> {
    let mut bytes = serialize_header(header);
    bytes.extend_from_slice(data);
    bytes
}

fn gzip(bytes: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes).unwrap();
    encoder.finish().unwrap()
}

/// Minimal MGH with an identity direction matrix
fn mgh_bytes(shape: [i32; 3], frames: i32, mtype: i32, data: &[u8], footer: &[u8]) -> Vec<u8> {
    let mut bytes = vec![0u8; 284];
    BigEndian::write_i32(&mut bytes[0..], 1);
    for (i, s) in shape.iter().enumerate() {
        BigEndian::write_i32(&mut bytes[4 + i * 4..], *s);
    }
    BigEndian::write_i32(&mut bytes[16..], frames);
    BigEndian::write_i32(&mut bytes[20..], mtype);
    for i in 0..3 {
        BigEndian::write_f32(&mut bytes[30 + i * 4..], 1.0);
        BigEndian::write_f32(&mut bytes[42 + (i * 3 + i) * 4..], 1.0);
    }
    bytes.extend_from_slice(data);
    bytes.extend_from_slice(footer);
    bytes
}

#[fixture]
fn ramp() -> (Header, Vec<u8>) {
    let header = Header::new([2, 3, 4], DataType::Uint8);
    (header, (0..24).collect())
}

#[rstest]
fn nifti_roundtrip(ramp: (Header, Vec<u8>)) {
    let (header, data) = ramp;
    let (parsed, raw) = read_volume_bytes(&nifti_bytes(&header, &data), "ramp.nii").unwrap();
    assert_eq!(parsed.dims, header.dims);
    assert_eq!(raw, data);
}

#[rstest]
fn nifti_gzip(ramp: (Header, Vec<u8>)) {
    let (header, data) = ramp;
    let compressed = gzip(&nifti_bytes(&header, &data));
    let (_, raw) = read_volume_bytes(&compressed, "ramp.nii.gz").unwrap();
    assert_eq!(raw, data);
}

#[rstest]
fn nifti_partial_series(ramp: (Header, Vec<u8>)) {
    let (mut header, data) = ramp;
    header.dims[0] = 4;
    header.dims[4] = 3;

    // only one of three frames is present, still loads
    let (parsed, raw) = read_volume_bytes(&nifti_bytes(&header, &data), "ramp.nii").unwrap();
    assert_eq!(parsed.declared_frames(), 3);
    assert_eq!(raw.len(), 24);
}

#[rstest]
fn nifti_too_short(ramp: (Header, Vec<u8>)) {
    let (header, data) = ramp;
    let result = read_volume_bytes(&nifti_bytes(&header, &data[..10]), "ramp.nii");
    assert!(matches!(result, Err(Error::InsufficientData { expected: 24, found: 10 })));
}

#[rstest]
fn suspicious_display_range_is_reset() {
    let mut header = Header::new([1, 1, 1], DataType::Int16);
    header.cal_max = 255.0;
    let (parsed, _) = read_volume_bytes(&nifti_bytes(&header, &[0, 0]), "x.nii").unwrap();
    assert_eq!(parsed.cal_max, 0.0);
}

#[rstest]
#[case(0, DataType::Uint8, 1)]
#[case(4, DataType::Int16, 2)]
#[case(1, DataType::Int32, 4)]
#[case(3, DataType::Float32, 4)]
fn mgh_types(#[case] mtype: i32, #[case] expected: DataType, #[case] width: usize) {
    let data = vec![0u8; 8 * width];
    let bytes = mgh_bytes([2, 2, 2], 1, mtype, &data, &[]);
    let (header, raw) = read_volume_bytes(&bytes, "brain.mgh").unwrap();
    assert_eq!(header.datatype().unwrap(), expected);
    assert!(!header.little_endian);
    assert_eq!(raw.len(), data.len());
}

#[rstest]
fn mgh_affine_is_centred() {
    let bytes = mgh_bytes([4, 4, 4], 1, 0, &[0u8; 64], &[]);
    let (header, _) = read_volume_bytes(&gzip(&bytes), "brain.mgz").unwrap();

    // centre at the origin, so the first voxel sits half the extent away
    assert_eq!(header.affine[0], [1.0, 0.0, 0.0, -2.0]);
    assert_eq!(header.affine[1], [0.0, 1.0, 0.0, -2.0]);
    assert_eq!(header.affine[2], [0.0, 0.0, 1.0, -2.0]);
}

#[rstest]
fn mgh_lookup_table_tag_marks_labels() {
    let name = b"FreeSurferColorLUT.txt\0";
    let mut footer = vec![0u8; 20];
    footer.extend_from_slice(&1_i32.to_be_bytes());
    footer.extend_from_slice(&((name.len() + 4) as i64).to_be_bytes());
    footer.extend_from_slice(&(name.len() as i32).to_be_bytes());
    footer.extend_from_slice(name);

    let bytes = mgh_bytes([2, 2, 2], 1, 0, &[0u8; 8], &footer);
    let (header, raw) = read_volume_bytes(&bytes, "aseg.mgz").unwrap();
    assert_eq!(header.intent_code, INTENT_LABEL);
    assert_eq!(raw.len(), 8);
}

#[rstest]
#[case("raw", false)]
#[case("gzip", true)]
fn nrrd_encodings(#[case] encoding: &str, #[case] compress: bool) {
    let data: Vec<u8> = [1_i16, -2, 3, -4]
        .iter()
        .flat_map(|v| v.to_le_bytes())
        .collect();
    let payload = if compress { gzip(&data) } else { data.clone() };

    let mut bytes = format!(
        "NRRD0004\n# comment\ntype: short\ndimension: 3\nsizes: 2 2 1\n\
         endian: little\nencoding: {encoding}\nspacings: 1 1 1\n\n"
    )
    .into_bytes();
    bytes.extend_from_slice(&payload);

    let (mut header, raw) = read_volume_bytes(&bytes, "image.nrrd").unwrap();
    assert_eq!(raw, data);

    let converted = convert(&raw, &mut header).unwrap();
    assert_eq!(converted.buffer, VoxelBuffer::I16(vec![1, -2, 3, -4]));
}

#[rstest]
fn detection_prefers_signature(ramp: (Header, Vec<u8>)) {
    let (header, data) = ramp;
    let bytes = nifti_bytes(&header, &data);
    let format = voltools_header::detect_format(&bytes, "misnamed.mgh").unwrap();
    assert_eq!(format, VolumeFormat::Nifti);
}

#[rstest]
#[case(DataType::Uint8, 1)]
#[case(DataType::Int16, 2)]
#[case(DataType::Uint16, 2)]
#[case(DataType::Float32, 4)]
#[case(DataType::Float64, 8)]
fn natural_types_reencode_exactly(#[case] datatype: DataType, #[case] width: usize) {
    // finite values in every type: small integers written little endian
    let raw: Vec<u8> = match datatype {
        DataType::Float32 => [0.5_f32, -1.25].iter().flat_map(|v| v.to_le_bytes()).collect(),
        DataType::Float64 => [0.5_f64, -1.25].iter().flat_map(|v| v.to_le_bytes()).collect(),
        _ => (0..2 * width as u8).collect(),
    };

    let mut header = Header::new([2, 1, 1], datatype);
    let converted = convert(&raw, &mut header).unwrap();
    assert_eq!(encode_buffer(&converted.buffer), raw);
}

/// Narrow a converted buffer back to the type it was read as
fn narrow(datatype: DataType, converted: &ConvertedData) -> Vec<u8> {
    match (datatype, &converted.buffer) {
        (DataType::Binary, VoxelBuffer::U8(bits)) => bits
            .chunks(8)
            .map(|c| c.iter().enumerate().fold(0u8, |acc, (i, &b)| acc | (b << i)))
            .collect(),
        (DataType::Int32, VoxelBuffer::F64(v)) => {
            v.iter().flat_map(|&x| (x as i32).to_le_bytes()).collect()
        }
        (DataType::Uint32, VoxelBuffer::F64(v)) => {
            v.iter().flat_map(|&x| (x as u32).to_le_bytes()).collect()
        }
        (DataType::Int64, VoxelBuffer::F64(v)) => {
            v.iter().flat_map(|&x| (x as i64).to_le_bytes()).collect()
        }
        (DataType::Uint64, VoxelBuffer::F64(v)) => {
            v.iter().flat_map(|&x| (x as u64).to_le_bytes()).collect()
        }
        (DataType::Complex64, VoxelBuffer::F32(real)) => {
            let imaginary = converted.imaginary.as_ref().unwrap();
            real.iter()
                .zip(imaginary)
                .flat_map(|(r, i)| r.to_le_bytes().into_iter().chain(i.to_le_bytes()))
                .collect()
        }
        (_, buffer) => encode_buffer(buffer),
    }
}

fn le_bytes<const N: usize, T: Copy>(values: &[T], to_bytes: fn(T) -> [u8; N]) -> Vec<u8> {
    values.iter().flat_map(|&v| to_bytes(v)).collect()
}

#[rstest]
#[case::binary(DataType::Binary, 16, vec![0b1010_0110, 0b0000_0001])]
#[case::int32(DataType::Int32, 2, le_bytes(&[-7_i32, 100_000], i32::to_le_bytes))]
#[case::uint32(DataType::Uint32, 2, le_bytes(&[4_000_000_000_u32, 1], u32::to_le_bytes))]
#[case::int64(DataType::Int64, 2, le_bytes(&[-(1_i64 << 40), 3], i64::to_le_bytes))]
#[case::uint64(DataType::Uint64, 2, le_bytes(&[(1_u64 << 52) + 3, 0], u64::to_le_bytes))]
#[case::complex64(DataType::Complex64, 2, le_bytes(&[1.5_f32, -2.0, 0.25, 8.0], f32::to_le_bytes))]
#[case::rgb24(DataType::Rgb24, 2, (0..6).collect())]
#[case::rgba32(DataType::Rgba32, 2, (0..8).collect())]
fn widened_types_narrow_back_exactly(
    #[case] datatype: DataType,
    #[case] n_voxels: i64,
    #[case] raw: Vec<u8>,
) {
    let mut header = Header::new([n_voxels, 1, 1], datatype);
    let converted = convert(&raw, &mut header).unwrap();
    assert_eq!(narrow(datatype, &converted), raw);
}

#[rstest]
fn int8_narrows_back_by_truncation() {
    let raw = vec![0x80, 0xff, 0x00, 0x7f];
    let mut header = Header::new([4, 1, 1], DataType::Int8);
    let converted = convert(&raw, &mut header).unwrap();

    let VoxelBuffer::I16(values) = converted.buffer else {
        panic!("int8 should widen to int16")
    };
    let narrowed: Vec<u8> = values.iter().map(|&v| v as i8 as u8).collect();
    assert_eq!(narrowed, raw);
}

#[rstest]
fn header_roundtrip_keeps_fields() {
    let mut header = Header::new([10, 11, 12], DataType::Float32);
    header.pix_dims[1..4].copy_from_slice(&[0.5, 0.75, 2.0]);
    header.scl_slope = 2.0;
    header.scl_inter = -1.0;
    header.cal_min = 10.0;
    header.cal_max = 90.0;
    header.intent_code = INTENT_LABEL;
    header.description = "synthetic".to_string();
    header.affine[0][3] = -5.0;

    let parsed = parse_header(&serialize_header(&header)).unwrap();
    assert_eq!(parsed.dims, header.dims);
    assert_eq!(parsed.pix_dims, header.pix_dims);
    assert_eq!(parsed.scl_slope, 2.0);
    assert_eq!(parsed.scl_inter, -1.0);
    assert_eq!((parsed.cal_min, parsed.cal_max), (10.0, 90.0));
    assert_eq!(parsed.intent_code, INTENT_LABEL);
    assert_eq!(parsed.description, "synthetic");
    assert_eq!(parsed.affine, header.affine);
}
