//! The in-memory scene document

// standard library
use std::fmt;
use std::path::Path;

// crate modules
use crate::annotations::{CompletedAngle, CompletedMeasurement, Label};
use crate::error::Result;
use crate::mesh::MeshModel;
use crate::options::{ConfigOptions, ObservedOptions};
use crate::scene::SceneData;
use crate::serializer::Serializer;

// voltools modules
use voltools_volume::{ImageOptions, Volume};

// external crates
use log::{debug, warn};
use serde_json::Value;

/// Kind of item held in one of the document lists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemKind {
    Volume,
    Mesh,
    Connectome,
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Volume => "volume",
            Self::Mesh => "mesh",
            Self::Connectome => "connectome",
        };
        write!(f, "{name}")
    }
}

/// Stand-in for an item that could not be restored on import
///
/// Keeps the item's position in its list and the raw record it came from, so
/// a later export writes the record back untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct Placeholder {
    pub kind: ItemKind,
    /// Position in the list of the original document
    pub index: usize,
    /// Why the item could not be restored
    pub reason: String,
    /// The record as found in the document
    pub raw: Value,
    /// Encoded bytes found with a volume record, if any
    pub blob: Option<String>,
}

impl Placeholder {
    /// The error this placeholder stands for
    pub fn error(&self) -> crate::Error {
        crate::Error::ItemRehydration {
            kind: self.kind,
            index: self.index,
            reason: self.reason.clone(),
        }
    }
}

/// Entry in a document list, either restored or a placeholder
#[derive(Debug, Clone, PartialEq)]
pub enum Item<T> {
    Loaded(T),
    Placeholder(Placeholder),
}

impl<T> Item<T> {
    /// The restored item, if it was restored
    pub fn loaded(&self) -> Option<&T> {
        match self {
            Self::Loaded(item) => Some(item),
            Self::Placeholder(_) => None,
        }
    }

    /// Mutable access to the restored item
    pub fn loaded_mut(&mut self) -> Option<&mut T> {
        match self {
            Self::Loaded(item) => Some(item),
            Self::Placeholder(_) => None,
        }
    }

    /// The placeholder, if the item was not restored
    pub fn placeholder(&self) -> Option<&Placeholder> {
        match self {
            Self::Loaded(_) => None,
            Self::Placeholder(p) => Some(p),
        }
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self, Self::Loaded(_))
    }
}

/// Volumes, meshes, view state, options, and annotations of one scene
///
/// The document owns everything in it. Volumes and meshes that failed to
/// load on import keep their position as [Placeholder] entries.
///
/// ```rust
/// # use voltools_document::Document;
/// let mut doc = Document::new("session");
/// assert_eq!(doc.title, "session");
/// assert_eq!(doc.n_volumes(), 0);
///
/// doc.opts.update(|o| o.is_colorbar = true);
/// assert!(doc.opts.get().is_colorbar);
/// ```
#[derive(Debug, Default)]
pub struct Document {
    pub title: String,
    pub volumes: Vec<Item<Volume>>,
    pub meshes: Vec<Item<MeshModel>>,
    pub scene: SceneData,
    pub opts: ObservedOptions,
    pub labels: Vec<Label>,
    pub measurements: Vec<CompletedMeasurement>,
    pub angles: Vec<CompletedAngle>,
    /// Paint layer, one byte per voxel of the background volume
    pub draw_bitmap: Option<Vec<u8>>,
    /// Free text kept with the document
    pub custom_data: String,
    pub preview_image_data_url: String,
}

impl Document {
    /// Empty document with default options and view state
    pub fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            ..Default::default()
        }
    }

    /// Empty document starting from the given options
    pub fn with_options(title: &str, options: ConfigOptions) -> Self {
        Self {
            title: title.to_string(),
            opts: ObservedOptions::new(options),
            ..Default::default()
        }
    }

    /// Read a document file, compressed or not
    pub fn read_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        debug!("reading document {}", path.display());
        let bytes = std::fs::read(path)?;
        Serializer::new().from_bytes(&bytes)
    }

    /// Write the document with the given serializer settings
    pub fn write_file<P: AsRef<Path>>(&self, path: P, serializer: &Serializer) -> Result<()> {
        let path = path.as_ref();
        debug!("writing document {}", path.display());
        std::fs::write(path, serializer.to_bytes(self)?)?;
        Ok(())
    }

    /// Append a volume, returning its index
    pub fn add_volume(&mut self, volume: Volume) -> usize {
        self.volumes.push(Item::Loaded(volume));
        self.volumes.len() - 1
    }

    /// Load a volume from disk and append it
    pub fn load_volume<P: AsRef<Path>>(&mut self, path: P, options: ImageOptions) -> Result<usize> {
        let volume = Volume::read_file(path, options)?;
        Ok(self.add_volume(volume))
    }

    /// Remove the volume at `index` along with its options record
    ///
    /// Returns `None` when out of range or when the entry is a placeholder,
    /// which is removed all the same.
    pub fn remove_volume(&mut self, index: usize) -> Option<Volume> {
        if index >= self.volumes.len() {
            warn!("no volume at index {index}");
            return None;
        }
        match self.volumes.remove(index) {
            Item::Loaded(volume) => Some(volume),
            Item::Placeholder(_) => None,
        }
    }

    /// Index of the first loaded volume with this name
    pub fn volume_index(&self, name: &str) -> Option<usize> {
        self.volumes
            .iter()
            .position(|v| v.loaded().is_some_and(|v| v.name == name))
    }

    /// The volume at `index`, if loaded
    pub fn volume(&self, index: usize) -> Option<&Volume> {
        self.volumes.get(index).and_then(Item::loaded)
    }

    /// Mutable access to the volume at `index`
    pub fn volume_mut(&mut self, index: usize) -> Option<&mut Volume> {
        self.volumes.get_mut(index).and_then(Item::loaded_mut)
    }

    /// Number of volume entries, placeholders included
    pub fn n_volumes(&self) -> usize {
        self.volumes.len()
    }

    /// Loaded volumes in document order
    pub fn loaded_volumes(&self) -> impl Iterator<Item = &Volume> {
        self.volumes.iter().filter_map(Item::loaded)
    }

    /// Append a mesh or connectome, returning its index
    pub fn add_mesh<M: Into<MeshModel>>(&mut self, mesh: M) -> usize {
        self.meshes.push(Item::Loaded(mesh.into()));
        self.meshes.len() - 1
    }

    /// Remove the mesh at `index`
    pub fn remove_mesh(&mut self, index: usize) -> Option<MeshModel> {
        if index >= self.meshes.len() {
            warn!("no mesh at index {index}");
            return None;
        }
        match self.meshes.remove(index) {
            Item::Loaded(mesh) => Some(mesh),
            Item::Placeholder(_) => None,
        }
    }

    /// The mesh at `index`, if loaded
    pub fn mesh(&self, index: usize) -> Option<&MeshModel> {
        self.meshes.get(index).and_then(Item::loaded)
    }

    /// Every placeholder in the document, volumes first
    pub fn placeholders(&self) -> Vec<&Placeholder> {
        self.volumes
            .iter()
            .filter_map(Item::placeholder)
            .chain(self.meshes.iter().filter_map(Item::placeholder))
            .collect()
    }

    /// Reset the view state and drop every volume, mesh, and annotation
    pub fn clear(&mut self) {
        self.volumes.clear();
        self.meshes.clear();
        self.labels.clear();
        self.measurements.clear();
        self.angles.clear();
        self.draw_bitmap = None;
        self.scene = SceneData::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn placeholder(kind: ItemKind, index: usize) -> Placeholder {
        Placeholder {
            kind,
            index,
            reason: "corrupt".to_string(),
            raw: Value::Null,
            blob: None,
        }
    }

    #[test]
    fn placeholders_keep_their_slot() {
        let mut doc = Document::new("t");
        doc.volumes.push(Item::Placeholder(placeholder(ItemKind::Volume, 0)));
        doc.meshes.push(Item::Placeholder(placeholder(ItemKind::Mesh, 0)));

        assert_eq!(doc.n_volumes(), 1);
        assert_eq!(doc.loaded_volumes().count(), 0);
        assert_eq!(doc.placeholders().len(), 2);
        assert!(doc.volume(0).is_none());

        assert!(doc.remove_volume(0).is_none());
        assert_eq!(doc.n_volumes(), 0);
        assert!(doc.remove_volume(3).is_none());
    }

    #[test]
    fn placeholder_error_message() {
        let e = placeholder(ItemKind::Connectome, 2).error();
        assert_eq!(e.to_string(), "connectome 2 could not be restored: corrupt");
    }
}
