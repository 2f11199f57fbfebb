//! Tag container with an automatically maintained ancestor cache.
//!
//! ```text
//! explicit tags:  [Effect.Damage.Fire, Status.Stunned]
//! parent cache:   [Effect.Damage, Effect, Status]
//!
//! has_tag(Effect.Damage)        → true   (found in parent cache)
//! has_tag_exact(Effect.Damage)  → false  (explicit tags only)
//! ```
//!
//! The parent cache is unioned incrementally on insertion and rebuilt from
//! scratch after any removal.

use std::fmt;

use bevy::prelude::Component;
use serde::{Serialize, Serializer};

use crate::query::TagQuery;
use crate::tag::Tag;

/// A set of gameplay tags supporting hierarchical and exact membership tests.
///
/// Equality is set equality over the explicit tags; order and the parent
/// cache do not take part.
///
/// # Example
///
/// ```ignore
/// let mut tags = TagContainer::new();
/// tags.add_tag(registry.request_tag("Effect.Damage.Fire", true));
///
/// assert!(tags.has_tag(&registry.request_tag("Effect.Damage", true)));
/// assert!(!tags.has_tag_exact(&registry.request_tag("Effect.Damage", true)));
/// ```
#[derive(Component, Clone, Debug, Default)]
pub struct TagContainer {
    tags: Vec<Tag>,
    parent_tags: Vec<Tag>,
}

impl TagContainer {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a container with a single tag. Invalid tags are ignored.
    pub fn from_tag(tag: Tag) -> Self {
        let mut container = Self::new();
        container.add_tag(tag);
        container
    }

    // =========================================================================
    // Membership
    // =========================================================================

    /// True if `tag` is explicit here or an ancestor of an explicit tag.
    #[inline]
    pub fn has_tag(&self, tag: &Tag) -> bool {
        tag.is_valid() && (self.tags.contains(tag) || self.parent_tags.contains(tag))
    }

    /// True if `tag` is one of the explicit tags.
    #[inline]
    pub fn has_tag_exact(&self, tag: &Tag) -> bool {
        tag.is_valid() && self.tags.contains(tag)
    }

    /// True if any tag of `other` passes [`has_tag`](Self::has_tag). False when `other` is empty.
    pub fn has_any(&self, other: &TagContainer) -> bool {
        other.tags.iter().any(|tag| self.has_tag(tag))
    }

    /// True if any tag of `other` is explicit here. False when `other` is empty.
    pub fn has_any_exact(&self, other: &TagContainer) -> bool {
        other.tags.iter().any(|tag| self.has_tag_exact(tag))
    }

    /// True if every tag of `other` passes [`has_tag`](Self::has_tag). True when `other` is empty.
    pub fn has_all(&self, other: &TagContainer) -> bool {
        other.tags.iter().all(|tag| self.has_tag(tag))
    }

    /// True if every tag of `other` is explicit here. True when `other` is empty.
    pub fn has_all_exact(&self, other: &TagContainer) -> bool {
        other.tags.iter().all(|tag| self.has_tag_exact(tag))
    }

    /// Evaluate a compiled query against this container.
    #[inline]
    pub fn matches_query(&self, query: &TagQuery) -> bool {
        query.matches(self)
    }

    // =========================================================================
    // Filtering
    // =========================================================================

    /// Explicit tags of `self` that hierarchically match any tag in `other`.
    pub fn filter(&self, other: &TagContainer) -> TagContainer {
        self.tags
            .iter()
            .filter(|tag| tag.matches_any(other))
            .cloned()
            .collect()
    }

    /// Explicit tags of `self` that are literally present in `other`.
    pub fn filter_exact(&self, other: &TagContainer) -> TagContainer {
        self.tags
            .iter()
            .filter(|tag| tag.matches_any_exact(other))
            .cloned()
            .collect()
    }

    // =========================================================================
    // Mutation
    // =========================================================================

    /// Union `other` into `self`. The parent caches are unioned as well.
    pub fn append_tags(&mut self, other: &TagContainer) {
        self.tags.reserve(other.tags.len());
        for tag in &other.tags {
            add_unique(&mut self.tags, tag);
        }
        for tag in &other.parent_tags {
            add_unique(&mut self.parent_tags, tag);
        }
    }

    /// Add every tag of `source` that hierarchically matches something in `filter`.
    pub fn append_matching_tags(&mut self, source: &TagContainer, filter: &TagContainer) {
        for tag in &source.tags {
            if tag.matches_any(filter) {
                self.add_tag(tag.clone());
            }
        }
    }

    /// Add a tag and its ancestors. Invalid tags and duplicates are ignored.
    pub fn add_tag(&mut self, tag: Tag) {
        if !tag.is_valid() || self.tags.contains(&tag) {
            return;
        }
        self.add_parents_for(&tag);
        self.tags.push(tag);
    }

    /// Add a tag without the duplicate check.
    ///
    /// The caller guarantees `tag` is valid and not already explicit.
    pub fn add_tag_fast(&mut self, tag: Tag) {
        self.add_parents_for(&tag);
        self.tags.push(tag);
    }

    /// Add `tag` while keeping the explicit tags free of ancestor pairs.
    ///
    /// - already explicit: returns `true`, nothing changes
    /// - an explicit tag already descends from `tag`: returns `false`, nothing changes
    /// - otherwise explicit ancestors of `tag` are replaced by `tag`
    ///
    /// Every check runs before the first mutation.
    pub fn add_leaf_tag(&mut self, tag: Tag) -> bool {
        if !tag.is_valid() {
            return false;
        }
        if self.has_tag_exact(&tag) {
            return true;
        }
        if self.has_tag(&tag) {
            return false;
        }

        let before = self.tags.len();
        self.tags.retain(|explicit| !tag.parents().contains(explicit));
        if self.tags.len() != before {
            self.fill_parent_tags();
        }
        self.add_tag(tag);
        true
    }

    /// Remove an explicit tag. Returns `true` if it was present.
    pub fn remove_tag(&mut self, tag: &Tag) -> bool {
        let Some(pos) = self.tags.iter().position(|t| t == tag) else {
            return false;
        };
        self.tags.remove(pos);
        self.fill_parent_tags();
        true
    }

    /// Remove every explicit tag of `other`. Returns `true` if anything was removed.
    pub fn remove_tags(&mut self, other: &TagContainer) -> bool {
        let before = self.tags.len();
        self.tags.retain(|tag| !other.tags.contains(tag));
        if self.tags.len() == before {
            return false;
        }
        self.fill_parent_tags();
        true
    }

    /// Remove an explicit tag by its full name. Useful for tags that no longer resolve.
    pub fn remove_tag_by_name(&mut self, name: &str) -> bool {
        let Some(pos) = self.tags.iter().position(|t| t.name() == name) else {
            return false;
        };
        self.tags.remove(pos);
        self.fill_parent_tags();
        true
    }

    /// Remove all tags.
    #[inline]
    pub fn reset(&mut self) {
        self.tags.clear();
        self.parent_tags.clear();
    }

    // =========================================================================
    // Access
    // =========================================================================

    #[inline]
    pub fn len(&self) -> usize {
        self.tags.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    /// Iterate the explicit tags.
    #[inline]
    pub fn iter(&self) -> std::slice::Iter<'_, Tag> {
        self.tags.iter()
    }

    #[inline]
    pub fn first(&self) -> Option<&Tag> {
        self.tags.first()
    }

    #[inline]
    pub fn last(&self) -> Option<&Tag> {
        self.tags.last()
    }

    #[inline]
    pub fn get(&self, index: usize) -> Option<&Tag> {
        self.tags.get(index)
    }

    /// The explicit tags as a slice.
    #[inline]
    pub fn tags(&self) -> &[Tag] {
        &self.tags
    }

    /// Implied ancestors of the explicit tags.
    #[inline]
    pub fn parent_tags(&self) -> &[Tag] {
        &self.parent_tags
    }

    /// Explicit tags plus their ancestors, all explicit.
    pub fn tag_parents(&self) -> TagContainer {
        let mut result = self.clone();
        for tag in &self.parent_tags {
            add_unique(&mut result.tags, tag);
        }
        result
    }

    /// `"A", "B"` rendering used in logs and descriptions.
    pub fn to_string_simple(&self) -> String {
        let mut out = String::new();
        for (i, tag) in self.tags.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            out.push('"');
            out.push_str(tag.name());
            out.push('"');
        }
        out
    }

    fn add_parents_for(&mut self, tag: &Tag) {
        for parent in tag.parents() {
            add_unique(&mut self.parent_tags, parent);
        }
    }

    fn fill_parent_tags(&mut self) {
        self.parent_tags.clear();
        for tag in &self.tags {
            for parent in tag.parents() {
                add_unique(&mut self.parent_tags, parent);
            }
        }
    }
}

#[inline]
fn add_unique(list: &mut Vec<Tag>, tag: &Tag) {
    if !list.contains(tag) {
        list.push(tag.clone());
    }
}

impl PartialEq for TagContainer {
    fn eq(&self, other: &Self) -> bool {
        self.tags.len() == other.tags.len() && self.filter_exact(other).len() == self.tags.len()
    }
}

impl Eq for TagContainer {}

impl fmt::Display for TagContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_string_simple())
    }
}

impl FromIterator<Tag> for TagContainer {
    fn from_iter<T: IntoIterator<Item = Tag>>(iter: T) -> Self {
        let mut container = Self::new();
        container.extend(iter);
        container
    }
}

impl Extend<Tag> for TagContainer {
    fn extend<T: IntoIterator<Item = Tag>>(&mut self, iter: T) {
        for tag in iter {
            self.add_tag(tag);
        }
    }
}

impl<'a> IntoIterator for &'a TagContainer {
    type Item = &'a Tag;
    type IntoIter = std::slice::Iter<'a, Tag>;

    fn into_iter(self) -> Self::IntoIter {
        self.tags.iter()
    }
}

impl Serialize for TagContainer {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.tags.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TagRegistry;

    const SAMPLE_TAGS: &[&str] = &[
        "Effect.Damage",
        "Effect.Damage.Basic",
        "Effect.Damage.Fire",
        "Effect.Damage.Fire.Lingering",
        "Effect.Duration",
        "Status.Stunned",
        "Status.Burning",
    ];

    fn sample_registry() -> TagRegistry {
        let mut reg = TagRegistry::new();
        for name in SAMPLE_TAGS {
            reg.add_native_tag(name).unwrap();
        }
        reg.done_adding_native_tags();
        reg
    }

    fn container(reg: &TagRegistry, names: &[&str]) -> TagContainer {
        names.iter().map(|n| reg.request_tag(n, true)).collect()
    }

    #[test]
    fn has_tag_uses_parent_cache() {
        let reg = sample_registry();
        let c = container(&reg, &["Effect.Damage.Fire"]);
        let damage = reg.request_tag("Effect.Damage", true);

        assert!(c.has_tag(&damage));
        assert!(!c.has_tag_exact(&damage));
        assert!(c.has_tag(&reg.request_tag("Effect", true)));
        assert!(!c.has_tag(&reg.request_tag("Effect.Damage.Fire.Lingering", true)));
        assert!(!c.has_tag(&Tag::EMPTY));
    }

    #[test]
    fn empty_argument_asymmetry() {
        let reg = sample_registry();
        let c = container(&reg, &["Effect.Damage"]);
        let empty = TagContainer::new();

        assert!(!c.has_any(&empty));
        assert!(!c.has_any_exact(&empty));
        assert!(c.has_all(&empty));
        assert!(c.has_all_exact(&empty));
    }

    #[test]
    fn has_any_and_all() {
        let reg = sample_registry();
        let c = container(&reg, &["Effect.Damage.Fire", "Status.Stunned"]);

        let parents = container(&reg, &["Effect.Damage", "Status"]);
        assert!(c.has_all(&parents));
        assert!(!c.has_all_exact(&parents));
        assert!(c.has_any(&parents));
        assert!(!c.has_any_exact(&parents));

        let mixed = container(&reg, &["Status.Stunned", "Effect.Duration"]);
        assert!(c.has_any(&mixed));
        assert!(c.has_any_exact(&mixed));
        assert!(!c.has_all(&mixed));
    }

    #[test]
    fn filter_exact_ignores_hierarchy() {
        let reg = sample_registry();
        let c = container(&reg, &["Effect", "Effect.Damage"]);
        let filter = container(&reg, &["Effect"]);

        let exact = c.filter_exact(&filter);
        assert_eq!(exact, container(&reg, &["Effect"]));

        let hierarchical = c.filter(&filter);
        assert_eq!(hierarchical, c);
    }

    #[test]
    fn append_tags_unions_both_sets() {
        let reg = sample_registry();
        let mut a = container(&reg, &["Effect.Damage.Fire"]);
        let b = container(&reg, &["Status.Stunned", "Effect.Damage.Fire"]);

        a.append_tags(&b);
        assert_eq!(a.len(), 2);
        assert!(a.has_tag(&reg.request_tag("Status", true)));
        assert!(a.has_tag(&reg.request_tag("Effect.Damage", true)));
    }

    #[test]
    fn append_matching_tags_filters_source() {
        let reg = sample_registry();
        let source = container(&reg, &["Effect.Damage.Fire", "Status.Stunned", "Effect.Duration"]);
        let filter = container(&reg, &["Effect.Damage"]);

        let mut c = TagContainer::new();
        c.append_matching_tags(&source, &filter);
        assert_eq!(c, container(&reg, &["Effect.Damage.Fire"]));
    }

    #[test]
    fn add_tag_ignores_invalid_and_duplicates() {
        let reg = sample_registry();
        let mut c = TagContainer::new();
        c.add_tag(Tag::EMPTY);
        assert!(c.is_empty());

        let fire = reg.request_tag("Effect.Damage.Fire", true);
        c.add_tag(fire.clone());
        c.add_tag(fire);
        assert_eq!(c.len(), 1);
        assert_eq!(c.parent_tags().len(), 2);
    }

    #[test]
    fn remove_tag_recomputes_parents() {
        let reg = sample_registry();
        let mut c = container(&reg, &["Effect.Damage.Fire", "Effect.Duration"]);
        let damage = reg.request_tag("Effect.Damage", true);
        let effect = reg.request_tag("Effect", true);

        assert!(c.remove_tag(&reg.request_tag("Effect.Damage.Fire", true)));
        assert!(!c.has_tag(&damage));
        assert!(c.has_tag(&effect));

        assert!(!c.remove_tag(&damage));
        assert!(c.remove_tag_by_name("Effect.Duration"));
        assert!(c.is_empty());
        assert!(c.parent_tags().is_empty());
    }

    #[test]
    fn remove_tags_returns_whether_anything_changed() {
        let reg = sample_registry();
        let mut c = container(&reg, &["Effect.Damage.Fire", "Status.Stunned"]);

        assert!(!c.remove_tags(&container(&reg, &["Effect.Duration"])));
        assert!(c.remove_tags(&container(&reg, &["Status.Stunned", "Effect.Duration"])));
        assert_eq!(c, container(&reg, &["Effect.Damage.Fire"]));
        assert!(!c.has_tag(&reg.request_tag("Status", true)));
    }

    #[test]
    fn add_leaf_tag_replaces_ancestors() {
        let reg = sample_registry();
        let mut c = container(&reg, &["Effect", "Effect.Damage", "Status.Stunned"]);

        assert!(c.add_leaf_tag(reg.request_tag("Effect.Damage.Fire", true)));
        assert_eq!(c, container(&reg, &["Effect.Damage.Fire", "Status.Stunned"]));
    }

    #[test]
    fn add_leaf_tag_rejects_covered_ancestor_without_mutation() {
        let reg = sample_registry();
        let mut c = container(&reg, &["Effect.Damage.Fire"]);
        let before = c.clone();

        assert!(!c.add_leaf_tag(reg.request_tag("Effect.Damage", true)));
        assert_eq!(c, before);
        assert_eq!(c.parent_tags().len(), before.parent_tags().len());
    }

    #[test]
    fn add_leaf_tag_existing_is_noop_success() {
        let reg = sample_registry();
        let mut c = container(&reg, &["Effect.Damage.Fire"]);

        assert!(c.add_leaf_tag(reg.request_tag("Effect.Damage.Fire", true)));
        assert_eq!(c.len(), 1);
        assert!(!c.add_leaf_tag(Tag::EMPTY));
    }

    #[test]
    fn equality_is_set_equality() {
        let reg = sample_registry();
        let a = container(&reg, &["Effect.Damage", "Status.Stunned"]);
        let b = container(&reg, &["Status.Stunned", "Effect.Damage"]);
        let c = container(&reg, &["Status.Stunned"]);

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(c, a);
    }

    #[test]
    fn tag_parents_makes_ancestors_explicit() {
        let reg = sample_registry();
        let c = container(&reg, &["Effect.Damage.Fire"]);
        let expanded = c.tag_parents();

        assert_eq!(expanded, container(&reg, &["Effect.Damage.Fire", "Effect.Damage", "Effect"]));
    }

    #[test]
    fn accessors_and_simple_string() {
        let reg = sample_registry();
        let c = container(&reg, &["Effect.Damage", "Status.Stunned"]);

        assert_eq!(c.first().map(Tag::name), Some("Effect.Damage"));
        assert_eq!(c.last().map(Tag::name), Some("Status.Stunned"));
        assert_eq!(c.get(1).map(Tag::name), Some("Status.Stunned"));
        assert!(c.get(2).is_none());
        assert_eq!(c.to_string_simple(), "\"Effect.Damage\", \"Status.Stunned\"");
        assert_eq!(
            serde_json::to_string(&c).unwrap(),
            "[\"Effect.Damage\",\"Status.Stunned\"]"
        );

        let mut c = c;
        c.reset();
        assert!(c.is_empty());
    }
}
