//! Result and Error types for the document module

/// Type alias for `Result<T, document::Error>`
pub type Result<T> = core::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
/// The error type for `voltools-document`
///
/// Only [DocumentParse](Error::DocumentParse),
/// [Decompression](Error::Decompression), and
/// [UnsupportedLegacyShape](Error::UnsupportedLegacyShape) abort an import.
/// Failures of a single volume or mesh are reported as
/// [ItemRehydration](Error::ItemRehydration), logged, and replaced with a
/// placeholder.
pub enum Error {
    /// Underlying file I/O error
    #[error("failure in file I/O")]
    IOError(#[from] std::io::Error),

    /// The document text is not valid JSON of the expected shape
    #[error("failed to parse document")]
    DocumentParse(#[from] serde_json::Error),

    /// The document looked compressed but could not be inflated
    #[error("failed to decompress document")]
    Decompression(#[source] std::io::Error),

    /// A single volume, mesh, or connectome could not be restored
    #[error("{kind} {index} could not be restored: {reason}")]
    ItemRehydration {
        kind: crate::ItemKind,
        index: usize,
        reason: String,
    },

    /// The document matches none of the known historical shapes
    #[error("unsupported document shape: {0}")]
    UnsupportedLegacyShape(String),

    /// Option name that is not part of the options record
    #[error("unknown option {0:?}")]
    UnknownOption(String),

    /// Option value of the wrong type
    #[error("invalid value for option {name:?}: {reason}")]
    InvalidOption { name: String, reason: String },

    /// Failure while building a volume
    #[error(transparent)]
    Volume(#[from] voltools_volume::Error),
}
