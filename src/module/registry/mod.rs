//! Module registry access
//!
//! Handles archive discovery, manifest parsing, metadata reads and fragment
//! classification.

pub mod discovery;
pub mod fragment;
pub mod manifest;
pub mod metadata;

pub use discovery::DirectoryScanner;
pub use fragment::FragmentClassifier;
pub use manifest::ModuleManifest;
pub use metadata::MetadataReader;
