use std::cell::Cell;
use std::rc::Rc;

use rstest::{fixture, rstest};
use serde_json::{json, Value};

use voltools_document::{
    Connectome, Document, Error, ItemKind, Label, Mesh, MeshModel, Serializer, SliceType,
};
use voltools_header::{encode_buffer, serialize_header, DataType, Header, VoxelBuffer};
use voltools_volume::{ImageOptions, Volume};

/// Small uint8 volume loaded the way a file would be
fn volume(name: &str, values: Vec<u8>, options: ImageOptions) -> Volume {
    let header = Header::new([4, 4, 4], DataType::Uint8);
    let mut bytes = serialize_header(&header);
    bytes.extend(encode_buffer(&VoxelBuffer::U8(values)));
    let options = ImageOptions {
        name: name.to_string(),
        ..options
    };
    Volume::from_bytes(&bytes, options).unwrap()
}

#[fixture]
fn two_volumes() -> Document {
    let mut doc = Document::new("pair");
    doc.add_volume(volume(
        "first.nii",
        (0..64).collect(),
        ImageOptions::builder().cal_range(5.0, 50.0).build(),
    ));
    doc.add_volume(volume(
        "second.nii",
        (0..64).rev().collect(),
        ImageOptions::builder().colormap("hot").build(),
    ));
    doc
}

/// Export to text and read it straight back
fn round_trip(doc: &Document) -> Document {
    let text = Serializer::new().to_json(doc).unwrap();
    Serializer::new().from_json(&text).unwrap()
}

#[rstest]
fn infinite_thickness_survives() {
    let mut doc = Document::new("t");
    doc.opts.update(|o| o.mesh_thickness_on_2d = 5.0);
    assert_eq!(round_trip(&doc).opts.get().mesh_thickness_on_2d, 5.0);

    doc.opts.update(|o| o.mesh_thickness_on_2d = f64::INFINITY);
    let back = round_trip(&doc);
    assert_eq!(back.opts.get().mesh_thickness_on_2d, f64::INFINITY);

    // written explicitly by an older exporter
    let back = Serializer::new()
        .from_json(r#"{"opts": {"meshThicknessOn2D": "infinity", "textHeight": 0.1}}"#)
        .unwrap();
    assert_eq!(back.opts.get().mesh_thickness_on_2d, f64::INFINITY);
    assert_eq!(back.opts.get().text_height, 0.1);
}

#[rstest]
#[case::nan(f64::NAN)]
#[case::negative_infinity(f64::NEG_INFINITY)]
#[case::finite(12.5)]
fn non_finite_options_survive(#[case] value: f64) {
    let mut doc = Document::new("t");
    doc.opts.update(|o| {
        o.click_to_segment_max_distance_mm = value;
        o.limit_frames_4d = value;
        o.clip_thick = value;
        o.text_height = value;
        o.back_color[2] = value;
    });
    let back = round_trip(&doc);
    let opts = back.opts.get();

    let restored_values = [
        opts.click_to_segment_max_distance_mm,
        opts.limit_frames_4d,
        opts.clip_thick,
        opts.text_height,
        opts.back_color[2],
    ];
    for restored in restored_values {
        if value.is_nan() {
            assert!(restored.is_nan());
        } else {
            assert_eq!(restored, value);
        }
    }
}

#[rstest]
fn only_changed_options_are_written() {
    let mut doc = Document::new("t");
    doc.opts.update(|o| {
        o.is_colorbar = true;
        o.slice_type = SliceType::Axial;
        o.crosshair_color = vec![0.0, 1.0, 0.0, 1.0];
    });
    let value = Serializer::new().to_value(&doc).unwrap();
    let opts = value["opts"].as_object().unwrap();

    let mut keys: Vec<&str> = opts.keys().map(String::as_str).collect();
    keys.sort_unstable();
    assert_eq!(keys, ["crosshairColor", "isColorbar", "sliceType"]);
    assert_eq!(opts["sliceType"], 0);

    let back = Serializer::new().from_value(value).unwrap();
    // NaN defaults never compare equal as numbers
    assert_eq!(back.opts.get().to_map(), doc.opts.get().to_map());
}

#[rstest]
fn observers_see_real_changes_only() {
    let calls = Rc::new(Cell::new(0));
    let counter = Rc::clone(&calls);

    let mut doc = Document::new("t");
    let id = doc.opts.subscribe(move |_, _, _| counter.set(counter.get() + 1));

    assert!(doc.opts.set("isRuler", json!(true)).unwrap());
    assert!(!doc.opts.set("isRuler", json!(true)).unwrap());
    assert_eq!(doc.opts.update(|o| o.pen_size = 1.0), Vec::<String>::new());
    assert_eq!(calls.get(), 1);

    assert!(matches!(doc.opts.set("isRular", json!(true)), Err(Error::UnknownOption(_))));
    assert!(matches!(doc.opts.set("penSize", json!("big")), Err(Error::InvalidOption { .. })));

    assert!(doc.opts.unsubscribe(id));
    doc.opts.update(|o| o.is_ruler = false);
    assert_eq!(calls.get(), 1);
}

#[rstest]
fn volumes_keep_count_and_order(two_volumes: Document) {
    let back = round_trip(&two_volumes);

    assert_eq!(back.n_volumes(), 2);
    assert!(back.placeholders().is_empty());
    for (a, b) in two_volumes.loaded_volumes().zip(back.loaded_volumes()) {
        assert_eq!(a.name, b.name);
        assert_eq!(a.colormap(), b.colormap());
        assert_eq!(a.value_at([1, 2, 3]), b.value_at([1, 2, 3]));
        assert_eq!(a.calibration().cal_min, b.calibration().cal_min);
        assert_eq!(a.calibration().cal_max, b.calibration().cal_max);
    }
    assert_eq!(back.volume(1).unwrap().colormap(), "hot");
}

#[rstest]
fn removed_volume_takes_its_options(mut two_volumes: Document) {
    let removed = two_volumes.remove_volume(0).unwrap();
    assert_eq!(removed.name, "first.nii");

    let value = Serializer::new().to_value(&two_volumes).unwrap();
    assert_eq!(value["imageOptionsArray"].as_array().unwrap().len(), 1);
    assert_eq!(value["imageOptionsArray"][0]["name"], "second.nii");
    assert_eq!(value["encodedImageBlobs"].as_array().unwrap().len(), 1);
}

#[rstest]
fn bad_volume_becomes_placeholder(two_volumes: Document) {
    let mut value = Serializer::new().to_value(&two_volumes).unwrap();
    let (first, second) = (value["imageOptionsArray"][0].clone(), value["imageOptionsArray"][1].clone());
    let (blob_a, blob_b) = (value["encodedImageBlobs"][0].clone(), value["encodedImageBlobs"][1].clone());
    value["imageOptionsArray"] = json!([first.clone(), first, second]);
    value["encodedImageBlobs"] = json!([blob_a, "!!not base64!!", blob_b]);

    let doc = Serializer::new().from_value(value).unwrap();
    assert_eq!(doc.n_volumes(), 3);
    assert!(doc.volume(1).is_none());
    assert_eq!(doc.volume(2).unwrap().name, "second.nii");

    let placeholders = doc.placeholders();
    assert_eq!(placeholders.len(), 1);
    assert_eq!((placeholders[0].kind, placeholders[0].index), (ItemKind::Volume, 1));
    assert!(matches!(placeholders[0].error(), Error::ItemRehydration { index: 1, .. }));

    // written back untouched
    let again = Serializer::new().to_value(&doc).unwrap();
    assert_eq!(again["encodedImageBlobs"][1], "!!not base64!!");
    assert_eq!(again["imageOptionsArray"].as_array().unwrap().len(), 3);
}

#[rstest]
fn compressed_round_trip(two_volumes: Document) {
    let serializer = Serializer::new().compress(true);
    let bytes = serializer.to_bytes(&two_volumes).unwrap();
    assert!(voltools_header::is_gzip(&bytes));

    let back = serializer.from_bytes(&bytes).unwrap();
    assert_eq!(back.n_volumes(), 2);

    // plain text reads through the same entry point
    let text = Serializer::new().to_bytes(&two_volumes).unwrap();
    assert_eq!(Serializer::new().from_bytes(&text).unwrap().n_volumes(), 2);
}

#[rstest]
#[case::not_json(b"{\"title\": ".to_vec())]
#[case::wrong_type(b"{\"title\": 3}".to_vec())]
fn malformed_text_aborts(#[case] bytes: Vec<u8>) {
    let err = Serializer::new().from_bytes(&bytes).unwrap_err();
    assert!(matches!(err, Error::DocumentParse(_)));
}

#[rstest]
fn corrupt_compression_aborts() {
    let err = Serializer::new().from_bytes(&[0x1f, 0x8b, 0x01, 0x02, 0x03]).unwrap_err();
    assert!(matches!(err, Error::Decompression(_)));
}

#[rstest]
#[case::array(json!([1, 2, 3]))]
#[case::foreign(json!({"volumes": [], "camera": {}}))]
#[case::mesh_container(json!({"meshesString": "{\"list\": []}"}))]
fn unknown_shapes_are_rejected(#[case] value: Value) {
    let err = Serializer::new().from_value(value).unwrap_err();
    assert!(matches!(err, Error::UnsupportedLegacyShape(_)));
}

#[rstest]
fn single_clip_plane_is_migrated() {
    let doc = Serializer::new()
        .from_value(json!({
            "title": "old",
            "sceneData": {
                "azimuth": 30,
                "clipPlane": [0.1, 0.2, 0.3, 0.4],
                "clipPlaneDepthAziElev": [0.5, 90, 0]
            }
        }))
        .unwrap();

    assert_eq!(doc.scene.azimuth, 30.0);
    assert_eq!(doc.scene.elevation, 10.0);
    assert_eq!(doc.scene.clip_planes, [[0.1, 0.2, 0.3, 0.4]]);
    assert_eq!(doc.scene.clip_plane_depth_azi_elevs, [[0.5, 90.0, 0.0]]);
}

#[rstest]
fn structured_clone_meshes_are_revived() {
    // one mesh with typed array positions and indices
    let records = json!([
        [1, [1]],
        [2, [[2, 3], [4, 5], [6, 7], [8, 9]]],
        [0, "name"],
        [0, "tri"],
        [0, "pts"],
        ["Float32Array", [0, 0, 0, 1, 0, 0, 0, 1, 0]],
        [0, "tris"],
        ["Uint32Array", [0, 1, 2]],
        [0, "rgba255"],
        ["Uint8Array", [255, 0, 0, 255]]
    ]);
    let doc = Serializer::new()
        .from_value(json!({"meshesString": records.to_string()}))
        .unwrap();

    let Some(MeshModel::Triangle(mesh)) = doc.mesh(0) else {
        panic!("expected a triangle mesh");
    };
    assert_eq!(mesh.name, "tri");
    assert_eq!(mesh.pts, [0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0]);
    assert_eq!(mesh.tris, [0, 1, 2]);
    assert_eq!(mesh.rgba255, [255, 0, 0, 255]);
}

#[rstest]
fn legacy_connectome_is_converted() {
    let legacy = json!({
        "name": "net",
        "edgeMax": 10,
        "nodes": {
            "names": ["a", "b", "c"],
            "prefilled": [],
            "X": [0, 10, 20], "Y": [0, 0, 0], "Z": [5, 5, 5],
            "Color": [1, 2, 3], "Size": [1, 1, 1]
        },
        "edges": [0, 4, 0,
                  4, 0, 9,
                  0, 9, 0]
    });
    let doc = Serializer::new()
        .from_value(json!({"connectomes": [legacy.to_string()]}))
        .unwrap();

    let Some(MeshModel::Connectome(c)) = doc.mesh(0) else {
        panic!("expected a connectome");
    };
    assert_eq!(c.name, "net");
    assert_eq!(c.edge_max, 10.0);
    assert_eq!(c.node_colormap, "warm");
    assert_eq!(c.nodes[2].x, 20.0);
    let edges: Vec<(usize, usize, f64)> = c.edges.iter().map(|e| (e.first, e.second, e.color_value)).collect();
    assert_eq!(edges, [(0, 1, 4.0), (0, 2, 0.0), (1, 2, 9.0)]);
}

#[rstest]
fn meshes_and_connectomes_round_trip() {
    let mut doc = Document::new("m");
    doc.add_mesh(Mesh {
        name: "tri".to_string(),
        pts: vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0],
        tris: vec![0, 1, 2],
        ..Default::default()
    });
    doc.add_mesh(Mesh {
        name: "fibers".to_string(),
        pts: vec![0.0; 12],
        offset_pt0: Some(vec![0, 2, 4]),
        ..Default::default()
    });
    doc.add_mesh(Connectome::default());

    let value = Serializer::new().to_value(&doc).unwrap();
    assert_eq!(value["connectomes"].as_array().unwrap().len(), 1);

    let back = Serializer::new().from_value(value).unwrap();
    assert_eq!(back.meshes.len(), 3);
    assert_eq!(back.mesh(0).unwrap().name(), "tri");
    assert!(back.mesh(2).unwrap().is_connectome());

    let Some(MeshModel::Triangle(fibers)) = back.mesh(1) else {
        panic!("expected a fiber mesh");
    };
    assert!(fibers.is_fiber());
    assert_eq!(fibers.rgba255[3], 0);
}

#[rstest]
fn bad_mesh_keeps_its_slot() {
    let meshes = json!([
        {"name": "bad", "pts": [0, 0, 0], "tris": [0, 1, 2]},
        {"name": "good", "pts": [0, 0, 0, 1, 1, 1, 2, 2, 2], "tris": [0, 1, 2]}
    ]);
    let doc = Serializer::new()
        .from_value(json!({"meshesString": meshes.to_string()}))
        .unwrap();

    assert_eq!(doc.meshes.len(), 2);
    assert!(doc.mesh(0).is_none());
    assert_eq!(doc.mesh(1).unwrap().name(), "good");
    assert_eq!(doc.placeholders()[0].kind, ItemKind::Mesh);
}

#[rstest]
fn annotations_round_trip() {
    let mut doc = Document::new("a");
    let mut label = Label::new("roi");
    label.on_click(|_| {});
    doc.labels.push(label);
    doc.measurements.push(voltools_document::CompletedMeasurement::between(
        [0.0, 0.0, 0.0],
        [0.0, 6.0, 8.0],
        SliceType::Sagittal,
    ));
    doc.custom_data = "{\"study\": 4}".to_string();

    let value = Serializer::new().to_value(&doc).unwrap();
    assert!(value["labels"][0].get("onClick").is_none());

    let back = Serializer::new().from_value(value).unwrap();
    assert_eq!(back.labels[0].text, "roi");
    assert!(back.labels[0].on_click.is_none());
    assert_eq!(back.measurements[0].distance, 10.0);
    assert_eq!(back.measurements[0].slice_type, SliceType::Sagittal);
    assert_eq!(back.custom_data, doc.custom_data);
}
