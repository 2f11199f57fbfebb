//! Gameplay tag handle with hierarchical and exact matching.
//!
//! A [`Tag`] is an interned handle to a node of the [`TagRegistry`](crate::TagRegistry)
//! tree. Besides the full dotted name it carries the node's ancestor chain, so
//! hierarchical matching never has to go back to the registry:
//!
//! ```text
//! Effect.Damage.Fire
//!   name    = "Effect.Damage.Fire"
//!   parents = [Effect.Damage, Effect]      (nearest first, root excluded)
//!
//! Fire.matches_tag(Effect)        → true   (Fire "is-a" Effect)
//! Effect.matches_tag(Fire)        → false  (upward only)
//! Fire.matches_tag_exact(Effect)  → false
//! ```
//!
//! Handles are cheap to clone (one `Arc` bump) and compare by name.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use serde::{Serialize, Serializer};

use crate::container::TagContainer;

#[derive(Debug)]
struct TagData {
    name: Arc<str>,
    parents: Box<[Tag]>,
}

/// A registered gameplay tag, or the invalid (empty) tag.
///
/// Obtain tags from [`TagRegistry::request_tag`](crate::TagRegistry::request_tag).
/// An invalid tag never matches anything, not even another invalid tag.
#[derive(Clone, Default)]
pub struct Tag(Option<Arc<TagData>>);

impl Tag {
    /// The invalid tag.
    pub const EMPTY: Tag = Tag(None);

    pub(crate) fn new(name: Arc<str>, parents: Box<[Tag]>) -> Self {
        Self(Some(Arc::new(TagData { name, parents })))
    }

    /// Whether this tag refers to a registered node.
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.0.is_some()
    }

    /// Full dotted name. Empty for the invalid tag.
    #[inline]
    pub fn name(&self) -> &str {
        self.0.as_ref().map_or("", |data| &data.name)
    }

    /// Ancestors, nearest first. The root is not a tag and is never included.
    #[inline]
    pub fn parents(&self) -> &[Tag] {
        self.0.as_ref().map_or(&[], |data| &data.parents)
    }

    /// Immediate parent, or the invalid tag for top-level and invalid tags.
    pub fn direct_parent(&self) -> Tag {
        self.parents().first().cloned().unwrap_or_default()
    }

    /// Number of segments in the name (`Effect.Damage` → 2, invalid → 0).
    #[inline]
    pub fn depth(&self) -> usize {
        if self.is_valid() {
            self.parents().len() + 1
        } else {
            0
        }
    }

    /// Last segment of the name.
    pub fn simple_name(&self) -> &str {
        self.name().rsplit('.').next().unwrap_or("")
    }

    /// True if `other` is this tag or one of its ancestors.
    ///
    /// ```text
    /// "A.B".matches_tag("A")   → true
    /// "A".matches_tag("A.B")   → false
    /// ```
    pub fn matches_tag(&self, other: &Tag) -> bool {
        if !self.is_valid() || !other.is_valid() {
            return false;
        }
        self == other || self.parents().contains(other)
    }

    /// True only if both tags are valid and literally the same tag.
    #[inline]
    pub fn matches_tag_exact(&self, other: &Tag) -> bool {
        self.is_valid() && self == other
    }

    /// True if this tag hierarchically matches any tag in `container`.
    pub fn matches_any(&self, container: &TagContainer) -> bool {
        container.iter().any(|tag| self.matches_tag(tag))
    }

    /// True if this tag is literally present in `container`.
    pub fn matches_any_exact(&self, container: &TagContainer) -> bool {
        container.iter().any(|tag| self.matches_tag_exact(tag))
    }

    /// Number of tags shared by the self-plus-ancestor sets of both tags.
    ///
    /// `A.B.C` vs `A.B.D` → 2 (`A`, `A.B`).
    pub fn matches_tag_depth(&self, other: &Tag) -> usize {
        if !self.is_valid() || !other.is_valid() {
            return 0;
        }
        self.self_and_parents()
            .filter(|tag| other == *tag || other.parents().contains(*tag))
            .count()
    }

    /// A container holding just this tag (empty for the invalid tag).
    pub fn single_tag_container(&self) -> TagContainer {
        TagContainer::from_tag(self.clone())
    }

    /// This tag and every ancestor, all as explicit tags.
    pub fn tag_parents(&self) -> TagContainer {
        self.self_and_parents().cloned().collect()
    }

    fn self_and_parents(&self) -> impl Iterator<Item = &Tag> {
        std::iter::once(self)
            .filter(|tag| tag.is_valid())
            .chain(self.parents().iter())
    }

    #[inline]
    fn ptr_eq(&self, other: &Tag) -> bool {
        match (&self.0, &other.0) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        }
    }
}

impl PartialEq for Tag {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other) || self.name() == other.name()
    }
}

impl Eq for Tag {}

impl Hash for Tag {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name().hash(state);
    }
}

impl PartialOrd for Tag {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Tag {
    fn cmp(&self, other: &Self) -> Ordering {
        self.name().cmp(other.name())
    }
}

impl fmt::Debug for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "Tag({})", self.name())
        } else {
            f.write_str("Tag(None)")
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            f.write_str(self.name())
        } else {
            f.write_str("None")
        }
    }
}

impl Serialize for Tag {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}
