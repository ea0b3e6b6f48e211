//! Fragment classification
//!
//! A fragment attaches to another module and can never be started on its
//! own. It is recognised purely by the presence of a `Fragment-Host` header.

use crate::module::registry::manifest::FRAGMENT_HOST_HEADER;
use crate::module::registry::metadata::MetadataReader;
use crate::module::traits::{ModuleError, ModuleHandle, ModuleMetadata};

/// Decides whether an installed module is a fragment
#[derive(Clone)]
pub struct FragmentClassifier {
    reader: MetadataReader,
}

impl FragmentClassifier {
    pub fn new(reader: MetadataReader) -> Self {
        Self { reader }
    }

    /// True iff the module declares a `Fragment-Host` header (any case, any value)
    pub fn is_fragment(&self, module: ModuleHandle) -> Result<bool, ModuleError> {
        let metadata = self.reader.read(module)?;
        Ok(Self::declares_fragment_host(&metadata))
    }

    pub fn declares_fragment_host(metadata: &ModuleMetadata) -> bool {
        metadata.contains_header(FRAGMENT_HOST_HEADER)
    }
}
