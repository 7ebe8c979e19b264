//! Conversion between a [Document] and its portable JSON form
//!
//! Export never changes the live document. Import always builds a fresh one,
//! running the legacy migration first. Only malformed text, failed
//! decompression, and unrecognisable shapes abort an import. A single volume
//! or mesh that cannot be restored is logged and kept as a
//! [Placeholder](crate::Placeholder) in its slot.

// standard library
use std::io::{Read, Write};

// crate modules
use crate::annotations::{CompletedAngle, CompletedMeasurement};
use crate::document::{Document, Item, ItemKind, Placeholder};
use crate::error::{Error, Result};
use crate::mesh::{Connectome, Mesh, MeshModel};
use crate::migrate::migrate;
use crate::options::{ConfigOptions, ObservedOptions};
use crate::scene::SceneData;

// voltools modules
use voltools_header::is_gzip;
use voltools_utils::{f, StringExt};
use voltools_volume::{ImageOptions, Volume};

// external crates
use base64::{engine::general_purpose::STANDARD, Engine as _};
use flate2::{read::GzDecoder, write::GzEncoder, Compression};
use log::{debug, error, info, warn};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Title given to imported documents that have none
pub const DEFAULT_TITLE: &str = "untitled";

/// The document exactly as written to text
///
/// Collections hold raw JSON so that one bad entry can be reported on its
/// own rather than failing the whole document.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DocumentData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub image_options_array: Vec<Value>,
    /// Base64 NIfTI bytes, index aligned with `image_options_array`
    pub encoded_image_blobs: Vec<Option<String>>,
    pub encoded_drawing_blob: String,
    #[serde(rename = "previewImageDataURL")]
    pub preview_image_data_url: String,
    /// JSON text of the array of triangle and fiber meshes
    pub meshes_string: String,
    pub scene_data: Value,
    /// Only the options that differ from the defaults
    pub opts: Map<String, Value>,
    pub labels: Vec<Value>,
    /// JSON text of each connectome
    pub connectomes: Vec<Value>,
    pub custom_data: String,
    pub completed_measurements: Vec<Value>,
    pub completed_angles: Vec<Value>,
}

/// Reads and writes documents
///
/// ```rust
/// # use voltools_document::{Document, Serializer};
/// let mut doc = Document::new("demo");
/// doc.opts.update(|o| o.mesh_thickness_on_2d = 5.0);
///
/// let serializer = Serializer::new().compress(true);
/// let bytes = serializer.to_bytes(&doc).unwrap();
/// assert_eq!(bytes[..2], [0x1f, 0x8b]);
///
/// let back = serializer.from_bytes(&bytes).unwrap();
/// assert_eq!(back.title, "demo");
/// assert_eq!(back.opts.get().mesh_thickness_on_2d, 5.0);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Serializer {
    embed_images: bool,
    embed_drawing: bool,
    compress: bool,
}

impl Default for Serializer {
    fn default() -> Self {
        Self {
            embed_images: true,
            embed_drawing: true,
            compress: false,
        }
    }
}

impl Serializer {
    /// Embed images and drawings, without compression
    pub fn new() -> Self {
        Self::default()
    }

    /// Write volume bytes into the document
    pub fn embed_images(mut self, embed: bool) -> Self {
        self.embed_images = embed;
        self
    }

    /// Write the drawing bitmap into the document
    pub fn embed_drawing(mut self, embed: bool) -> Self {
        self.embed_drawing = embed;
        self
    }

    /// Gzip the output of [to_bytes()](Serializer::to_bytes)
    pub fn compress(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }

    /// Portable record of a document
    pub fn export(&self, document: &Document) -> Result<DocumentData> {
        let mut data = DocumentData {
            title: Some(document.title.clone()),
            preview_image_data_url: document.preview_image_data_url.clone(),
            scene_data: serde_json::to_value(&document.scene)?,
            opts: document.opts.get().diff(&ConfigOptions::default()),
            custom_data: document.custom_data.clone(),
            ..Default::default()
        };

        for item in &document.volumes {
            let (options, blob) = match item {
                Item::Loaded(volume) => {
                    let options = serde_json::to_value(export_options(volume))?;
                    let blob = self
                        .embed_images
                        .then(|| STANDARD.encode(volume.to_nifti_bytes()));
                    (options, blob)
                }
                Item::Placeholder(p) => (p.raw.clone(), p.blob.clone()),
            };
            data.image_options_array.push(options);
            if self.embed_images {
                data.encoded_image_blobs.push(blob);
            }
        }

        let mut meshes = Vec::new();
        for item in &document.meshes {
            match item {
                Item::Loaded(MeshModel::Triangle(mesh)) => {
                    let mut mesh = mesh.clone();
                    if mesh.is_fiber() {
                        mesh.mark_fiber_alpha();
                    }
                    meshes.push(serde_json::to_value(&mesh)?);
                }
                Item::Loaded(MeshModel::Connectome(c)) => {
                    data.connectomes.push(Value::from(serde_json::to_string(c)?));
                }
                Item::Placeholder(p) if p.kind == ItemKind::Connectome => {
                    data.connectomes.push(p.raw.clone());
                }
                Item::Placeholder(p) => meshes.push(p.raw.clone()),
            }
        }
        data.meshes_string = Value::Array(meshes).to_string();

        data.labels = to_values(&document.labels)?;
        data.completed_measurements = to_values(&document.measurements)?;
        data.completed_angles = to_values(&document.angles)?;

        if self.embed_drawing {
            if let Some(bitmap) = &document.draw_bitmap {
                data.encoded_drawing_blob = STANDARD.encode(bitmap);
            }
        }
        Ok(data)
    }

    /// Document as a JSON value
    pub fn to_value(&self, document: &Document) -> Result<Value> {
        Ok(serde_json::to_value(self.export(document)?)?)
    }

    /// Document as JSON text
    pub fn to_json(&self, document: &Document) -> Result<String> {
        Ok(serde_json::to_string(&self.export(document)?)?)
    }

    /// Document as bytes, gzipped if compression is on
    pub fn to_bytes(&self, document: &Document) -> Result<Vec<u8>> {
        let text = self.to_json(document)?;
        if !self.compress {
            return Ok(text.into_bytes());
        }
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(text.as_bytes())?;
        Ok(encoder.finish()?)
    }

    /// Read a document from bytes, inflating gzip data first
    pub fn from_bytes(&self, bytes: &[u8]) -> Result<Document> {
        if is_gzip(bytes) {
            let mut text = Vec::new();
            GzDecoder::new(bytes)
                .read_to_end(&mut text)
                .map_err(Error::Decompression)?;
            return self.from_value(serde_json::from_slice(&text)?);
        }
        self.from_value(serde_json::from_slice(bytes)?)
    }

    /// Read a document from JSON text
    pub fn from_json(&self, text: &str) -> Result<Document> {
        self.from_value(serde_json::from_str(text)?)
    }

    /// Read a document from a parsed JSON value
    pub fn from_value(&self, mut value: Value) -> Result<Document> {
        let report = migrate(&mut value)?;
        if !report.is_current() {
            info!("migrated legacy document: {}", report.applied.join(", "));
        }
        let data: DocumentData = serde_json::from_value(value)?;
        Ok(self.import(data))
    }

    /// Build a document from an already migrated record
    pub fn import(&self, data: DocumentData) -> Document {
        let mut document = Document {
            title: data.title.unwrap_or_else(|| DEFAULT_TITLE.to_string()),
            opts: ObservedOptions::new(ConfigOptions::merged(&data.opts)),
            scene: import_scene(data.scene_data),
            custom_data: data.custom_data,
            preview_image_data_url: data.preview_image_data_url,
            ..Default::default()
        };

        for (index, raw) in data.image_options_array.into_iter().enumerate() {
            let blob = data.encoded_image_blobs.get(index).cloned().flatten();
            document.volumes.push(import_volume(index, raw, blob));
        }

        document.meshes = import_meshes(&data.meshes_string);
        for (index, raw) in data.connectomes.into_iter().enumerate() {
            document.meshes.push(import_connectome(index, raw));
        }

        document.labels = from_values("label", data.labels);
        document.measurements = from_values::<CompletedMeasurement>("measurement", data.completed_measurements);
        document.angles = from_values::<CompletedAngle>("angle", data.completed_angles);

        if !data.encoded_drawing_blob.is_empty() {
            match STANDARD.decode(&data.encoded_drawing_blob) {
                Ok(bitmap) => document.draw_bitmap = Some(bitmap),
                Err(e) => warn!("discarding drawing that is not valid base64: {e}"),
            }
        }

        let failed = document.placeholders().len();
        if failed > 0 {
            warn!("{failed} item(s) of \"{}\" could not be restored", document.title);
        }
        document
    }
}

/// Load options for a volume, updated to its current display state
fn export_options(volume: &Volume) -> ImageOptions {
    let mut options = match volume.load_options() {
        Some(options) => options.clone(),
        None => {
            warn!("{}: no load options recorded, reconstructing from current state", volume.name);
            volume.reconstruct_options()
        }
    };
    if options.name.is_empty() {
        options.name = if options.url.is_empty() { volume.name.nifti_name() } else { options.url.nifti_name() };
    }
    let calibration = volume.calibration();
    options.colormap = volume.colormap().to_string();
    options.colormap_label = volume.colormap_table().cloned();
    options.opacity = volume.opacity();
    options.cal_min = Some(calibration.cal_min);
    options.cal_max = Some(calibration.cal_max);
    options.frame_4d = volume.frame_4d();
    // the embedded bytes are always NIfTI
    options.image_type = Some("nii".to_string());
    options
}

fn to_values<T: Serialize>(items: &[T]) -> Result<Vec<Value>> {
    Ok(items
        .iter()
        .map(serde_json::to_value)
        .collect::<core::result::Result<Vec<Value>, _>>()?)
}

fn from_values<T: DeserializeOwned>(what: &str, values: Vec<Value>) -> Vec<T> {
    values
        .into_iter()
        .enumerate()
        .filter_map(|(i, v)| match serde_json::from_value(v) {
            Ok(item) => Some(item),
            Err(e) => {
                warn!("skipping {what} {i}: {e}");
                None
            }
        })
        .collect()
}

fn import_scene(value: Value) -> SceneData {
    if value.is_null() {
        return SceneData::default();
    }
    serde_json::from_value(value).unwrap_or_else(|e| {
        warn!("view state could not be read, using the initial scene: {e}");
        SceneData::default()
    })
}

fn placeholder<T>(kind: ItemKind, index: usize, reason: String, raw: Value, blob: Option<String>) -> Item<T> {
    error!("{kind} {index} could not be restored: {reason}");
    Item::Placeholder(Placeholder {
        kind,
        index,
        reason,
        raw,
        blob,
    })
}

fn import_volume(index: usize, raw: Value, blob: Option<String>) -> Item<Volume> {
    let options: ImageOptions = match serde_json::from_value(raw.clone()) {
        Ok(options) => options,
        Err(e) => return placeholder(ItemKind::Volume, index, f!("bad options: {e}"), raw, blob),
    };
    let Some(encoded) = blob.as_deref().filter(|b| !b.is_empty()) else {
        return placeholder(ItemKind::Volume, index, "no encoded image data".to_string(), raw, blob);
    };
    let bytes = match STANDARD.decode(encoded) {
        Ok(bytes) => bytes,
        Err(e) => return placeholder(ItemKind::Volume, index, f!("bad base64: {e}"), raw, blob),
    };
    match Volume::from_bytes(&bytes, options) {
        Ok(volume) => {
            debug!("restored volume {index} \"{}\"", volume.name);
            Item::Loaded(volume)
        }
        Err(e) => placeholder(ItemKind::Volume, index, e.to_string(), raw, blob),
    }
}

fn import_meshes(text: &str) -> Vec<Item<MeshModel>> {
    if text.trim().is_empty() {
        return Vec::new();
    }
    let records: Vec<Value> = match serde_json::from_str(text) {
        Ok(records) => records,
        Err(e) => {
            warn!("meshes could not be read: {e}");
            return Vec::new();
        }
    };
    records
        .into_iter()
        .enumerate()
        .map(|(index, raw)| import_mesh(index, raw))
        .collect()
}

fn import_mesh(index: usize, raw: Value) -> Item<MeshModel> {
    // connectomes written alongside other meshes
    let is_graph = raw.get("pts").is_none() && raw.get("nodes").is_some_and(Value::is_array);
    let parsed = if is_graph {
        parse_model::<Connectome>(&raw)
    } else {
        parse_model::<Mesh>(&raw).map(|model| match model {
            MeshModel::Triangle(mut mesh) if mesh.is_fiber() => {
                mesh.mark_fiber_alpha();
                MeshModel::Triangle(mesh)
            }
            other => other,
        })
    };
    let kind = if is_graph { ItemKind::Connectome } else { ItemKind::Mesh };
    match parsed {
        Ok(model) => Item::Loaded(model),
        Err(reason) => placeholder(kind, index, reason, raw, None),
    }
}

fn import_connectome(index: usize, raw: Value) -> Item<MeshModel> {
    let record = match &raw {
        Value::String(text) => serde_json::from_str::<Value>(text).map_err(|e| e.to_string()),
        Value::Object(_) => Ok(raw.clone()),
        other => Err(f!("unexpected connectome record {other}")),
    };
    match record.and_then(|r| parse_model::<Connectome>(&r)) {
        Ok(model) => Item::Loaded(model),
        Err(reason) => placeholder(ItemKind::Connectome, index, reason, raw, None),
    }
}

fn parse_model<T>(raw: &Value) -> core::result::Result<MeshModel, String>
where
    T: DeserializeOwned + Into<MeshModel>,
{
    let model: MeshModel = T::deserialize(raw).map_err(|e| e.to_string())?.into();
    model.validate()?;
    Ok(model)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_document_round_trip() {
        let doc = Document::new("empty");
        let value = Serializer::new().to_value(&doc).unwrap();
        assert_eq!(value["opts"], json!({}));
        assert_eq!(value["meshesString"], "[]");

        let back = Serializer::new().from_value(value).unwrap();
        assert_eq!(back.title, "empty");
        assert_eq!(back.scene, SceneData::default());
    }

    #[test]
    fn missing_title_is_untitled() {
        let doc = Serializer::new().from_json(r#"{"opts": {}}"#).unwrap();
        assert_eq!(doc.title, DEFAULT_TITLE);
    }

    #[test]
    fn bad_labels_are_skipped() {
        let doc = Serializer::new()
            .from_value(json!({"labels": [{"text": "ok"}, {"text": 5}]}))
            .unwrap();
        assert_eq!(doc.labels.len(), 1);
    }

    #[test]
    fn drawing_is_base64() {
        let mut doc = Document::new("d");
        doc.draw_bitmap = Some(vec![0, 1, 2, 255]);
        let data = Serializer::new().export(&doc).unwrap();
        assert_eq!(data.encoded_drawing_blob, "AAEC/w==");

        let data = Serializer::new().embed_drawing(false).export(&doc).unwrap();
        assert!(data.encoded_drawing_blob.is_empty());
    }
}
