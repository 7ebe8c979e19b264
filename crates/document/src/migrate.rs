//! Migration of older document shapes to the current one
//!
//! Every historical export shape that differs from the current format is an
//! entry in [LEGACY_SHAPES]. Each entry detects its own shape and rewrites the
//! raw JSON in place, so that every later stage only ever sees the current
//! layout. Documents that are not recognisable at all are rejected with
//! [UnsupportedLegacyShape](crate::Error::UnsupportedLegacyShape).
//!
//! ```rust
//! # use voltools_document::migrate::migrate;
//! let mut doc = serde_json::json!({
//!     "title": "old",
//!     "sceneData": {"clipPlane": [0.1, 0.2, 0.3, 0.4]}
//! });
//! let report = migrate(&mut doc).unwrap();
//!
//! assert_eq!(report.applied, ["single clip plane"]);
//! assert_eq!(doc["sceneData"]["clipPlanes"][0][3], 0.4);
//! assert!(doc["sceneData"].get("clipPlane").is_none());
//! ```

// crate modules
use crate::error::{Error, Result};
use crate::mesh::Connectome;
use crate::sentinel;

// voltools modules
use voltools_utils::f;

// external crates
use log::{debug, warn};
use serde_json::{Map, Value};

/// Top level keys of every known document generation
const DOCUMENT_KEYS: &[&str] = &[
    "title",
    "imageOptionsArray",
    "imageOptionsMap",
    "encodedImageBlobs",
    "encodedDrawingBlob",
    "previewImageDataURL",
    "meshesString",
    "meshOptionsArray",
    "sceneData",
    "opts",
    "labels",
    "connectomes",
    "customData",
    "completedMeasurements",
    "completedAngles",
];

/// Keys that may hold a wrapped mesh array
const WRAPPER_KEYS: [&str; 3] = ["value", "data", "0"];

/// Keys that may hold the elements of a serialised typed array
const TYPED_ARRAY_KEYS: [&str; 5] = ["_data", "source", "values", "elements", "items"];

/// Image option fields that are numbers, possibly written as strings
const IMAGE_NUMBER_KEYS: [&str; 5] = ["cal_min", "cal_max", "cal_minNeg", "cal_maxNeg", "limitFrames4D"];

/// One historical document shape and how to bring it up to date
#[derive(Debug, Clone, Copy)]
pub struct LegacyShape {
    /// Short description, reported when the rule is applied
    pub name: &'static str,
    /// Export generation that introduced the shape, oldest first
    pub generation: u32,
    applies: fn(&Map<String, Value>) -> bool,
    apply: fn(&mut Map<String, Value>) -> Result<()>,
}

impl LegacyShape {
    /// True if the document has this shape
    pub fn applies(&self, document: &Map<String, Value>) -> bool {
        (self.applies)(document)
    }
}

/// Known legacy shapes, applied in order
pub const LEGACY_SHAPES: &[LegacyShape] = &[
    LegacyShape {
        name: "single clip plane",
        generation: 1,
        applies: has_single_clip_plane,
        apply: to_clip_plane_lists,
    },
    LegacyShape {
        name: "typed array vectors",
        generation: 1,
        applies: has_typed_array_vectors,
        apply: to_plain_vectors,
    },
    LegacyShape {
        name: "image option strings",
        generation: 2,
        applies: has_legacy_image_options,
        apply: to_current_image_options,
    },
    LegacyShape {
        name: "structured clone meshes",
        generation: 3,
        applies: has_structured_clone_meshes,
        apply: revive_meshes,
    },
    LegacyShape {
        name: "wrapped mesh array",
        generation: 3,
        applies: has_wrapped_meshes,
        apply: unwrap_meshes,
    },
    LegacyShape {
        name: "mesh field aliases",
        generation: 1,
        applies: has_mesh_aliases,
        apply: to_current_mesh_fields,
    },
    LegacyShape {
        name: "columnar connectomes",
        generation: 2,
        applies: has_columnar_connectomes,
        apply: to_connectome_lists,
    },
];

/// What a migration pass changed
#[derive(Debug, Default, Clone, PartialEq)]
pub struct MigrationReport {
    /// Names of the rules applied, in order
    pub applied: Vec<&'static str>,
}

impl MigrationReport {
    /// True if the document was already in the current shape
    pub fn is_current(&self) -> bool {
        self.applied.is_empty()
    }
}

/// Bring a raw document up to the current shape
///
/// Fails if the document is not an object, has none of the known top level
/// keys, or stores its meshes in a container no rule understands.
pub fn migrate(document: &mut Value) -> Result<MigrationReport> {
    let kind = kind_of(document);
    let Some(map) = document.as_object_mut() else {
        return Err(Error::UnsupportedLegacyShape(f!("document root is {kind}")));
    };

    if !map.is_empty() && !map.keys().any(|k| DOCUMENT_KEYS.contains(&k.as_str())) {
        let keys: Vec<&str> = map.keys().map(String::as_str).take(5).collect();
        return Err(Error::UnsupportedLegacyShape(f!("no known document fields in {keys:?}")));
    }

    let mut report = MigrationReport::default();
    for shape in LEGACY_SHAPES {
        if shape.applies(map) {
            debug!("migrating legacy shape \"{}\" (generation {})", shape.name, shape.generation);
            (shape.apply)(map)?;
            report.applied.push(shape.name);
        }
    }

    if let Some(meshes) = parsed_meshes(map) {
        if !meshes.is_array() {
            return Err(Error::UnsupportedLegacyShape(f!("meshes stored as {}", kind_of(&meshes))));
        }
    }
    Ok(report)
}

/// Recover the elements of an array that may have been written as one of
/// the object forms typed arrays take when serialised
///
/// ```rust
/// # use voltools_document::migrate::extract_number_array;
/// # use serde_json::json;
/// let keyed = json!({"1": 20, "0": 10, "length": 2});
/// assert_eq!(extract_number_array(&keyed).unwrap(), [json!(10), json!(20)]);
///
/// let buffered = json!({"buffer": {"data": [1, 2, 3]}});
/// assert_eq!(extract_number_array(&buffered).unwrap().len(), 3);
/// assert!(extract_number_array(&json!("text")).is_none());
/// ```
pub fn extract_number_array(value: &Value) -> Option<Vec<Value>> {
    let object = match value {
        Value::Array(a) => return Some(a.clone()),
        Value::Object(o) => o,
        _ => return None,
    };
    if let Some(Value::Array(a)) = object.get("data") {
        return Some(a.clone());
    }
    if let Some(Value::Array(a)) = value.pointer("/buffer/data") {
        return Some(a.clone());
    }

    let mut indexed: Vec<(usize, &Value)> = object
        .iter()
        .filter_map(|(k, v)| k.parse::<usize>().ok().map(|i| (i, v)))
        .collect();
    if !indexed.is_empty() {
        indexed.sort_by_key(|(i, _)| *i);
        return Some(indexed.into_iter().map(|(_, v)| v.clone()).collect());
    }

    TYPED_ARRAY_KEYS
        .iter()
        .find_map(|k| object.get(*k).and_then(Value::as_array).cloned())
}

/// Rebuild a value from a structured clone record list
///
/// Each record is `[type, value]`, and the root is record 0. Containers refer
/// to their members by record index. Typed arrays are named by a string type
/// and become plain arrays.
///
/// ```rust
/// # use voltools_document::migrate::revive_structured_clone;
/// # use serde_json::json;
/// let records = json!([
///     [1, [1]],                  // array holding record 1
///     [2, [[2, 3], [4, 5]]],     // object with two fields
///     [0, "name"],
///     [0, "lh.pial"],
///     [0, "pts"],
///     ["Float32Array", [0, 1, 2]]
/// ]);
/// let revived = revive_structured_clone(records.as_array().unwrap()).unwrap();
/// assert_eq!(revived, json!([{"name": "lh.pial", "pts": [0, 1, 2]}]));
/// ```
pub fn revive_structured_clone(records: &[Value]) -> core::result::Result<Value, String> {
    let mut reviver = Reviver {
        records,
        active: Vec::new(),
    };
    reviver.revive(0)
}

struct Reviver<'a> {
    records: &'a [Value],
    active: Vec<usize>,
}

impl Reviver<'_> {
    fn revive(&mut self, index: usize) -> core::result::Result<Value, String> {
        if self.active.contains(&index) {
            return Err(f!("record {index} refers to itself"));
        }
        let record = self
            .records
            .get(index)
            .ok_or_else(|| f!("record {index} is missing"))?;
        let (tag, payload) = split_record(record).ok_or_else(|| f!("record {index} is malformed"))?;

        self.active.push(index);
        let revived = self.revive_payload(tag, payload);
        self.active.pop();
        revived
    }

    fn revive_payload(&mut self, tag: &Value, payload: &Value) -> core::result::Result<Value, String> {
        if let Some(name) = tag.as_str() {
            // typed arrays, array buffers, and data views
            return extract_number_array(payload)
                .map(Value::Array)
                .ok_or_else(|| f!("{name} without elements"));
        }
        match tag.as_i64() {
            Some(-1) => Ok(Value::Null),
            Some(0) | Some(3) => Ok(payload.clone()),
            Some(1) | Some(6) => {
                let members = self.indices(payload)?;
                members
                    .into_iter()
                    .map(|i| self.revive(i))
                    .collect::<core::result::Result<Vec<Value>, String>>()
                    .map(Value::Array)
            }
            Some(2) | Some(5) => {
                let mut object = Map::new();
                for pair in payload.as_array().ok_or("object record without fields")? {
                    let pair = self.indices(pair)?;
                    if pair.len() != 2 {
                        return Err("field is not a key and value pair".to_string());
                    }
                    let key = match self.revive(pair[0])? {
                        Value::String(s) => s,
                        other => other.to_string(),
                    };
                    object.insert(key, self.revive(pair[1])?);
                }
                Ok(Value::Object(object))
            }
            Some(4) => Ok(Value::from(f!(
                "/{}/{}",
                payload["source"].as_str().unwrap_or_default(),
                payload["flags"].as_str().unwrap_or_default()
            ))),
            Some(7) => Ok(payload.clone()),
            Some(8) => Ok(payload
                .as_str()
                .and_then(|s| s.parse::<i64>().ok())
                .map(Value::from)
                .unwrap_or_else(|| payload.clone())),
            _ => Err(f!("unknown record type {tag}")),
        }
    }

    fn indices(&self, value: &Value) -> core::result::Result<Vec<usize>, String> {
        value
            .as_array()
            .ok_or("expected a list of record indices")?
            .iter()
            .map(|v| v.as_u64().map(|i| i as usize).ok_or_else(|| f!("bad record index {v}")))
            .collect()
    }
}

fn split_record(record: &Value) -> Option<(&Value, &Value)> {
    match record {
        Value::Array(pair) if pair.len() == 2 => Some((&pair[0], &pair[1])),
        Value::Object(o) => Some((o.get("0")?, o.get("1").unwrap_or(&Value::Null))),
        _ => None,
    }
}

fn looks_like_structured_clone(value: &Value) -> bool {
    let Some(first) = value.as_array().and_then(|a| a.first()) else {
        return false;
    };
    split_record(first).is_some_and(|(tag, _)| tag.is_i64() || tag.is_string())
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Parse `meshesString`, if there is a non-empty one
fn parsed_meshes(document: &Map<String, Value>) -> Option<Value> {
    let text = document.get("meshesString")?.as_str()?;
    if text.trim().is_empty() {
        return None;
    }
    match serde_json::from_str(text) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("meshesString is not valid JSON: {e}");
            None
        }
    }
}

fn store_meshes(document: &mut Map<String, Value>, meshes: &Value) {
    document.insert("meshesString".to_string(), Value::from(meshes.to_string()));
}

/// Replace an object form with a plain array, leaving anything else alone
fn plain_array(value: &mut Value) -> bool {
    if value.is_object() {
        if let Some(items) = extract_number_array(value) {
            *value = Value::Array(items);
            return true;
        }
    }
    false
}

/// Integer valued floats become integers so they fit index arrays
fn integral(values: &mut Value) {
    if let Some(items) = values.as_array_mut() {
        for v in items.iter_mut() {
            if let Some(x) = v.as_f64().filter(|x| !v.is_u64() && x.fract() == 0.0 && *x >= 0.0) {
                *v = Value::from(x as u64);
            }
        }
    }
}

fn has_single_clip_plane(document: &Map<String, Value>) -> bool {
    document.get("sceneData").is_some_and(|scene| {
        (scene.get("clipPlane").is_some() && scene.get("clipPlanes").is_none())
            || (scene.get("clipPlaneDepthAziElev").is_some() && scene.get("clipPlaneDepthAziElevs").is_none())
    })
}

fn to_clip_plane_lists(document: &mut Map<String, Value>) -> Result<()> {
    if let Some(scene) = document.get_mut("sceneData").and_then(Value::as_object_mut) {
        for (single, list) in [("clipPlane", "clipPlanes"), ("clipPlaneDepthAziElev", "clipPlaneDepthAziElevs")] {
            if scene.contains_key(list) {
                continue;
            }
            if let Some(mut plane) = scene.remove(single) {
                plain_array(&mut plane);
                scene.insert(list.to_string(), Value::Array(vec![plane]));
            }
        }
    }
    Ok(())
}

const SCENE_VECTORS: [&str; 4] = ["crosshairPos", "pan2Dxyzmm", "clipVolumeLow", "clipVolumeHigh"];

fn has_typed_array_vectors(document: &Map<String, Value>) -> bool {
    let scene = document
        .get("sceneData")
        .is_some_and(|s| SCENE_VECTORS.iter().any(|k| s.get(*k).is_some_and(Value::is_object)));
    let measurements = document
        .get("completedMeasurements")
        .and_then(Value::as_array)
        .is_some_and(|all| {
            all.iter()
                .any(|m| ["startMM", "endMM"].iter().any(|k| m.get(*k).is_some_and(Value::is_object)))
        });
    let angles = document
        .get("completedAngles")
        .and_then(Value::as_array)
        .is_some_and(|all| {
            all.iter().any(|a| {
                ["/firstLineMM/start", "/firstLineMM/end", "/secondLineMM/start", "/secondLineMM/end"]
                    .iter()
                    .any(|p| a.pointer(p).is_some_and(Value::is_object))
            })
        });
    scene || measurements || angles
}

fn to_plain_vectors(document: &mut Map<String, Value>) -> Result<()> {
    if let Some(scene) = document.get_mut("sceneData").and_then(Value::as_object_mut) {
        for key in SCENE_VECTORS {
            if let Some(v) = scene.get_mut(key) {
                plain_array(v);
            }
        }
    }
    if let Some(all) = document.get_mut("completedMeasurements").and_then(Value::as_array_mut) {
        for m in all.iter_mut() {
            for key in ["/startMM", "/endMM"] {
                if let Some(v) = m.pointer_mut(key) {
                    plain_array(v);
                }
            }
        }
    }
    if let Some(all) = document.get_mut("completedAngles").and_then(Value::as_array_mut) {
        for a in all.iter_mut() {
            for key in ["/firstLineMM/start", "/firstLineMM/end", "/secondLineMM/start", "/secondLineMM/end"] {
                if let Some(v) = a.pointer_mut(key) {
                    plain_array(v);
                }
            }
        }
    }
    Ok(())
}

fn image_options_are_legacy(options: &Value) -> bool {
    let Some(o) = options.as_object() else {
        return false;
    };
    IMAGE_NUMBER_KEYS.iter().any(|k| o.get(*k).is_some_and(Value::is_string))
        || o.get("imageType").is_some_and(Value::is_number)
        || o.contains_key("colorMap")
        || o.get("colormapLabel").is_some_and(|l| l.is_object() && l.get("R").is_none())
        || o.get("colormapLabel").is_some_and(|l| ["R", "G", "B"].iter().any(|c| l.get(*c).is_some_and(Value::is_object)))
}

fn has_legacy_image_options(document: &Map<String, Value>) -> bool {
    document
        .get("imageOptionsArray")
        .and_then(Value::as_array)
        .is_some_and(|all| all.iter().any(image_options_are_legacy))
}

/// Image type codes used before image types were written as extensions
fn image_type_name(code: i64) -> Option<&'static str> {
    match code {
        1 => Some("nii"),
        6 => Some("nhdr"),
        7 => Some("nrrd"),
        10 => Some("mgh"),
        11 => Some("mgz"),
        _ => None,
    }
}

fn to_current_image_options(document: &mut Map<String, Value>) -> Result<()> {
    let Some(all) = document.get_mut("imageOptionsArray").and_then(Value::as_array_mut) else {
        return Ok(());
    };
    for (index, options) in all.iter_mut().enumerate() {
        let Some(o) = options.as_object_mut() else {
            continue;
        };
        for key in IMAGE_NUMBER_KEYS {
            if let Some(v) = o.get_mut(key).filter(|v| v.is_string()) {
                // unset values are stored as null
                *v = match sentinel::decode(v) {
                    Some(x) if x.is_finite() => Value::from(x),
                    _ => Value::Null,
                };
            }
        }
        if let Some(code) = o.get("imageType").and_then(Value::as_i64) {
            let name = image_type_name(code);
            if name.is_none() {
                debug!("image {index}: unknown image type code {code}");
            }
            o.insert("imageType".to_string(), name.map(Value::from).unwrap_or(Value::Null));
        }
        if let Some(colormap) = o.remove("colorMap") {
            o.entry("colormap").or_insert(colormap);
        }
        if let Some(label) = o.get_mut("colormapLabel").filter(|l| l.is_object()) {
            if label.get("R").is_none() {
                warn!("image {index}: dropping label colour table without channels");
                *label = Value::Null;
            } else if let Some(channels) = label.as_object_mut() {
                for c in ["R", "G", "B", "A", "I"] {
                    if let Some(v) = channels.get_mut(c) {
                        plain_array(v);
                    }
                }
            }
        }
    }
    Ok(())
}

fn has_structured_clone_meshes(document: &Map<String, Value>) -> bool {
    parsed_meshes(document).is_some_and(|m| looks_like_structured_clone(&m))
}

fn revive_meshes(document: &mut Map<String, Value>) -> Result<()> {
    let Some(parsed) = parsed_meshes(document) else {
        return Ok(());
    };
    let records = parsed.as_array().map(Vec::as_slice).unwrap_or_default();
    let revived = revive_structured_clone(records)
        .map_err(|e| Error::UnsupportedLegacyShape(f!("structured clone meshes: {e}")))?;
    store_meshes(document, &revived);
    Ok(())
}

fn has_wrapped_meshes(document: &Map<String, Value>) -> bool {
    parsed_meshes(document).is_some_and(|m| m.is_object())
}

fn unwrap_meshes(document: &mut Map<String, Value>) -> Result<()> {
    let Some(parsed) = parsed_meshes(document) else {
        return Ok(());
    };
    let inner = WRAPPER_KEYS
        .iter()
        .find_map(|k| parsed.get(*k).filter(|v| v.is_array()))
        .ok_or_else(|| Error::UnsupportedLegacyShape("mesh container has no mesh array".to_string()))?;
    store_meshes(document, inner);
    Ok(())
}

const ALIASES: [(&str, [&str; 3]); 3] = [
    ("pts", ["vertices", "positions", "verts"]),
    ("tris", ["indices", "faces", "cells"]),
    ("rgba255", ["rgba", "color", "colors"]),
];

const MESH_ARRAYS: [&str; 4] = ["pts", "tris", "rgba255", "offsetPt0"];

fn mesh_is_legacy(mesh: &Value) -> bool {
    let Some(m) = mesh.as_object() else {
        return false;
    };
    let aliased = ALIASES
        .iter()
        .any(|(key, old)| m.get(*key).map_or(true, Value::is_null) && old.iter().any(|o| m.contains_key(*o)));
    let typed = MESH_ARRAYS.iter().any(|k| m.get(*k).is_some_and(Value::is_object));
    let layers = m.get("layers").and_then(Value::as_array).is_some_and(|all| {
        all.iter().any(|l| {
            l.get("colorMap").is_some()
                || l.get("colorMapNegative").is_some()
                || l.get("values").is_some_and(Value::is_object)
                || l.get("atlasValues").is_some_and(Value::is_object)
        })
    });
    aliased || typed || layers
}

fn has_mesh_aliases(document: &Map<String, Value>) -> bool {
    parsed_meshes(document)
        .and_then(|m| m.as_array().map(|all| all.iter().any(mesh_is_legacy)))
        .unwrap_or(false)
}

fn to_current_mesh_fields(document: &mut Map<String, Value>) -> Result<()> {
    let Some(mut parsed) = parsed_meshes(document) else {
        return Ok(());
    };
    for mesh in parsed.as_array_mut().into_iter().flatten() {
        let Some(m) = mesh.as_object_mut() else {
            continue;
        };
        for (key, old) in ALIASES {
            if !m.get(key).map_or(true, Value::is_null) {
                continue;
            }
            let found = old
                .iter()
                .filter_map(|o| m.get(*o).and_then(extract_number_array))
                .find(|items| !items.is_empty());
            if let Some(items) = found {
                m.insert(key.to_string(), Value::Array(items));
            }
        }
        for key in MESH_ARRAYS {
            if let Some(v) = m.get_mut(key) {
                plain_array(v);
                if key != "pts" {
                    integral(v);
                }
            }
        }
        for layer in m.get_mut("layers").and_then(Value::as_array_mut).into_iter().flatten() {
            let Some(l) = layer.as_object_mut() else {
                continue;
            };
            for (old, new) in [("colorMap", "colormap"), ("colorMapNegative", "colormapNegative")] {
                if let Some(v) = l.remove(old) {
                    l.entry(new).or_insert(v);
                }
            }
            for key in ["values", "atlasValues"] {
                if let Some(v) = l.get_mut(key) {
                    plain_array(v);
                }
            }
        }
    }
    store_meshes(document, &parsed);
    Ok(())
}

fn connectome_record(entry: &Value) -> Option<Value> {
    match entry {
        Value::String(s) => serde_json::from_str(s).ok(),
        Value::Object(_) => Some(entry.clone()),
        _ => None,
    }
}

fn has_columnar_connectomes(document: &Map<String, Value>) -> bool {
    document
        .get("connectomes")
        .and_then(Value::as_array)
        .is_some_and(|all| {
            all.iter()
                .any(|c| c.is_object() || connectome_record(c).is_some_and(|r| Connectome::is_legacy(&r)))
        })
}

fn to_connectome_lists(document: &mut Map<String, Value>) -> Result<()> {
    let Some(all) = document.get_mut("connectomes").and_then(Value::as_array_mut) else {
        return Ok(());
    };
    for (index, entry) in all.iter_mut().enumerate() {
        let Some(record) = connectome_record(entry) else {
            continue;
        };
        if !Connectome::is_legacy(&record) {
            *entry = Value::from(record.to_string());
            continue;
        }
        match Connectome::from_legacy(&record).and_then(|c| serde_json::to_string(&c).map_err(|e| e.to_string())) {
            Ok(text) => *entry = Value::from(text),
            // left as is, and restored as a placeholder later
            Err(e) => warn!("connectome {index}: legacy layout not converted: {e}"),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn current_documents_are_untouched() {
        let mut doc = json!({
            "title": "t",
            "meshesString": "[{\"name\":\"m\",\"pts\":[0,0,0],\"tris\":[]}]",
            "sceneData": {"clipPlanes": [[0, 0, 0, 0]]}
        });
        let before = doc.clone();
        assert!(migrate(&mut doc).unwrap().is_current());
        assert_eq!(doc, before);
    }

    #[test]
    fn unknown_roots_are_rejected() {
        assert!(matches!(migrate(&mut json!([1, 2])), Err(Error::UnsupportedLegacyShape(_))));
        assert!(matches!(
            migrate(&mut json!({"volumes": []})),
            Err(Error::UnsupportedLegacyShape(_))
        ));
        assert!(migrate(&mut json!({})).is_ok());
    }

    #[test]
    fn meshes_in_unknown_containers_are_rejected() {
        let mut doc = json!({"meshesString": "{\"list\": []}"});
        assert!(matches!(migrate(&mut doc), Err(Error::UnsupportedLegacyShape(_))));

        let mut doc = json!({"meshesString": "42"});
        assert!(matches!(migrate(&mut doc), Err(Error::UnsupportedLegacyShape(_))));
    }

    #[test]
    fn wrapped_meshes_are_unwrapped() {
        let mut doc = json!({"meshesString": "{\"value\": [{\"name\": \"a\"}]}"});
        let report = migrate(&mut doc).unwrap();
        assert_eq!(report.applied, ["wrapped mesh array"]);
        assert_eq!(doc["meshesString"], "[{\"name\":\"a\"}]");
    }

    #[test]
    fn aliases_and_layer_keys() {
        let meshes = json!([{
            "name": "m",
            "vertices": {"0": 0.0, "1": 1.0, "2": 2.0},
            "faces": [0.0, 0.0, 0.0],
            "layers": [{"colorMap": "hot", "values": {"data": [1]}}]
        }]);
        let mut doc = json!({"meshesString": meshes.to_string()});
        migrate(&mut doc).unwrap();

        let out: Value = serde_json::from_str(doc["meshesString"].as_str().unwrap()).unwrap();
        assert_eq!(out[0]["pts"], json!([0.0, 1.0, 2.0]));
        assert_eq!(out[0]["tris"], json!([0, 0, 0]));
        assert_eq!(out[0]["layers"][0]["colormap"], "hot");
        assert_eq!(out[0]["layers"][0]["values"], json!([1]));
        assert!(out[0]["layers"][0].get("colorMap").is_none());
    }

    #[test]
    fn image_options_are_normalised() {
        let mut doc = json!({"imageOptionsArray": [{
            "name": "a",
            "cal_min": "12",
            "cal_max": "infinity",
            "imageType": 11,
            "colorMap": "hot",
            "colormapLabel": {"labels": ["x"]}
        }]});
        migrate(&mut doc).unwrap();
        let o = &doc["imageOptionsArray"][0];
        assert_eq!(o["cal_min"], 12.0);
        assert!(o["cal_max"].is_null());
        assert_eq!(o["imageType"], "mgz");
        assert_eq!(o["colormap"], "hot");
        assert!(o["colormapLabel"].is_null());
    }

    #[test]
    fn self_referencing_records_fail() {
        let records = json!([[1, [0]]]);
        assert!(revive_structured_clone(records.as_array().unwrap()).is_err());
    }
}
