//! Where registered tags come from.

use std::sync::Arc;

use crate::config::TagRow;

/// Name of the source that owns every natively registered tag.
pub const NATIVE_SOURCE_NAME: &str = "Native";

/// Name of the source built from the `tags` rows of the settings file.
pub const DEFAULT_SOURCE_NAME: &str = "DefaultGameplayTags";

/// Kind of a tag source.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TagSourceKind {
    /// Registered from code (`add_native_tag`, `native_tags!`).
    Native,
    /// The `tags` rows of the settings file.
    DefaultTagList,
    /// An extra tag list file.
    TagList,
    /// Rows fed in by an external table loader.
    DataTable,
}

/// A named feed of tag rows.
///
/// The registry keeps every loaded source so the tree can be rebuilt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TagSource {
    pub(crate) name: Arc<str>,
    pub(crate) kind: TagSourceKind,
    pub(crate) rows: Vec<TagRow>,
}

impl TagSource {
    pub fn new(name: impl Into<Arc<str>>, kind: TagSourceKind) -> Self {
        Self {
            name: name.into(),
            kind,
            rows: Vec::new(),
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn kind(&self) -> TagSourceKind {
        self.kind
    }

    /// Rows loaded from this source, in load order.
    #[inline]
    pub fn rows(&self) -> &[TagRow] {
        &self.rows
    }
}
