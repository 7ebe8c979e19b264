//! `voltools` is a modular toolkit for decoding neuroimaging volumes,
//! canonicalising their orientation, and persisting scene documents
//!
//! The member crates are re-exported here behind features so that only the
//! required parts of the pipeline are compiled.
//!
//! | Feature    | Crate               | Contents                                   |
//! |------------|---------------------|--------------------------------------------|
//! | *(always)* | `voltools-header`   | header codecs, datatype conversion, readers |
//! | *(always)* | `voltools-utils`    | common extension traits                    |
//! | `volume`   | `voltools-volume`   | reorientation, coordinates, calibration    |
//! | `document` | `voltools-document` | scene documents and serialisation          |
#![deny(missing_docs, missing_debug_implementations)]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

// Re-exports of toolkit crates.
#[doc(inline)]
pub use voltools_header as header;

#[doc(inline)]
pub use voltools_utils as utils;

#[cfg(feature = "volume")]
#[cfg_attr(docsrs, doc(cfg(feature = "volume")))]
#[doc(inline)]
pub use voltools_volume as volume;

#[cfg(feature = "document")]
#[cfg_attr(docsrs, doc(cfg(feature = "document")))]
#[doc(inline)]
pub use voltools_document as document;
