//! Scene documents with observed options and a portable JSON form
//!
//! A [Document] holds an ordered list of volumes and meshes, the view state,
//! a fully populated options record, and annotations. The [Serializer] writes
//! it as JSON text, optionally gzipped, and reads back both the current and
//! older document shapes.
//!
//! ```rust
//! # use voltools_document::{Document, Label, Serializer};
//! let mut doc = Document::new("review");
//! doc.labels.push(Label::new("lesion"));
//! doc.opts.update(|o| o.limit_frames_4d = 2.0);
//!
//! let text = Serializer::new().to_json(&doc).unwrap();
//! let back = Serializer::new().from_json(&text).unwrap();
//!
//! assert_eq!(back.labels[0].text, "lesion");
//! assert_eq!(back.opts.get().limit_frames_4d, 2.0);
//! // defaults come back even though they were never written
//! assert!(back.opts.get().click_to_segment_intensity_max.is_nan());
//! ```

// Split into subfiles for development, but anything important is re-exported
mod annotations;
mod document;
mod error;
mod mesh;
mod options;
mod scene;
mod serializer;

// Public modules for lower level access
pub mod migrate;
pub mod sentinel;

// Inline anything important for a nice public API
#[doc(inline)]
pub use annotations::{
    CompletedAngle, CompletedMeasurement, Label, LabelAnchor, LabelCallback, LabelPoints,
    LabelStyle, LineMm, LineTerminator, TextAlignment,
};

#[doc(inline)]
pub use document::{Document, Item, ItemKind, Placeholder};

#[doc(inline)]
pub use mesh::{Connectome, ConnectomeEdge, ConnectomeNode, Mesh, MeshLayer, MeshModel};

#[doc(inline)]
pub use migrate::{LegacyShape, MigrationReport, LEGACY_SHAPES};

#[doc(inline)]
pub use options::{
    ConfigOptions, DragMode, MultiplanarType, ObservedOptions, ObserverId, PenType, ShowRender,
    SliceType,
};

#[doc(inline)]
pub use scene::SceneData;

#[doc(inline)]
pub use serializer::{DocumentData, Serializer, DEFAULT_TITLE};

#[doc(inline)]
pub use error::{Error, Result};
