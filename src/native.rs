//! Targets of the `native_tags!` macro.

use crate::registry::TagRegistry;
use crate::tag::Tag;

/// A tag declared at compile time.
///
/// Implemented by the zero-sized `Tag` markers generated by `native_tags!`.
pub trait NativeTag {
    /// Full dotted name.
    const PATH: &'static str;
    /// Depth in the tree (0 = top-level).
    const DEPTH: u8;

    /// Resolve this tag in `registry`.
    #[inline]
    fn request(registry: &TagRegistry) -> Tag {
        registry.request_tag(Self::PATH, true)
    }
}

/// Definition of a native tag (used for registry building from macro).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NativeTagDef {
    pub name: &'static str,
    pub dev_comment: &'static str,
}

impl NativeTagDef {
    pub const fn new(name: &'static str, dev_comment: &'static str) -> Self {
        Self { name, dev_comment }
    }
}

/// A compile-time redirect: `old_name` resolves to `new_name`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NativeRedirectDef {
    pub old_name: &'static str,
    pub new_name: &'static str,
}

impl NativeRedirectDef {
    pub const fn new(old_name: &'static str, new_name: &'static str) -> Self {
        Self { old_name, new_name }
    }
}
