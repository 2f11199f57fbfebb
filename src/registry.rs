//! Gameplay tag registry: the canonical tag tree and everything keyed by it.
//!
//! ```text
//! nodes (arena, index 0 = root)
//! ┌───┬─────────────────┬────────┬──────────┬───────────┐
//! │ # │ full name       │ parent │ children │ net index │
//! ├───┼─────────────────┼────────┼──────────┼───────────┤
//! │ 0 │ (root)          │   -    │ [1, 3]   │     -     │
//! │ 1 │ Effect          │   0    │ [2]      │     0     │
//! │ 2 │ Effect.Damage   │   1    │ []       │     1     │
//! │ 3 │ Status          │   0    │ []       │     2     │
//! └───┴─────────────────┴────────┴──────────┴───────────┘
//! ```
//!
//! Children are kept sorted by segment. Registering a name creates any missing
//! ancestors; those implicit nodes have no source until a row names them.
//!
//! Lifecycle: populate from native registrations and tag sources, then call
//! [`TagRegistry::done_adding_native_tags`] to freeze native registration and
//! build the [`NetIndexTable`]. Lookups take `&self` and may run from several
//! threads at once; the only state they touch is the warn-once set of missing
//! names, guarded by its own lock.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, error, warn};

use crate::config::{validate_tag_name, LoadedConfig, TagRow, TagSettings};
use crate::container::TagContainer;
use crate::error::RegistryError;
use crate::native::{NativeRedirectDef, NativeTagDef};
use crate::net::{NetIndex, NetIndexConfig, NetIndexTable};
use crate::source::{TagSource, TagSourceKind, DEFAULT_SOURCE_NAME, NATIVE_SOURCE_NAME};
use crate::tag::Tag;

const ROOT: usize = 0;

/// Display name of the invalid tag.
const INVALID_TAG_NAME: &str = "None";

#[derive(Clone, Debug)]
struct TagNode {
    segment: Box<str>,
    tag: Tag,
    parent: Option<usize>,
    children: Vec<usize>,
    source: Option<Arc<str>>,
    dev_comment: String,
    net_index: Option<NetIndex>,
}

impl TagNode {
    fn root() -> Self {
        Self {
            segment: "".into(),
            tag: Tag::EMPTY,
            parent: None,
            children: Vec::new(),
            source: None,
            dev_comment: String::new(),
            net_index: None,
        }
    }
}

/// Editor-facing metadata of a registered tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TagEditorData<'a> {
    pub dev_comment: &'a str,
    /// Source that defined the tag. `None` for implicit parents.
    pub source: Option<&'a str>,
}

/// Registry for gameplay tags.
///
/// Provides:
/// - Name → [`Tag`] lookup with redirect fallback
/// - Descendant and ancestor queries
/// - Source and dev-comment bookkeeping
/// - The replication index table
#[derive(Debug)]
pub struct TagRegistry {
    settings: TagSettings,
    nodes: Vec<TagNode>,
    name_to_node: HashMap<Arc<str>, usize>,
    redirects: HashMap<String, String>,
    sources: Vec<TagSource>,
    /// Every accepted row as `(source index, row)`, in load order.
    load_log: Vec<(usize, TagRow)>,
    commonly_replicated: Vec<Tag>,
    net_table: NetIndexTable,
    done_adding_native_tags: bool,
    /// Names already reported by `request_tag`.
    missing_names: Mutex<HashSet<String>>,
}

impl Default for TagRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TagRegistry {
    pub fn new() -> Self {
        Self::with_settings(TagSettings::default())
    }

    /// Empty registry using `settings` for redirects and replication.
    ///
    /// The `tags` and `redirects` rows of `settings` are not loaded; use
    /// [`from_settings`](Self::from_settings) for that.
    pub fn with_settings(settings: TagSettings) -> Self {
        Self {
            settings,
            nodes: vec![TagNode::root()],
            name_to_node: HashMap::new(),
            redirects: HashMap::new(),
            sources: Vec::new(),
            load_log: Vec::new(),
            commonly_replicated: Vec::new(),
            net_table: NetIndexTable::default(),
            done_adding_native_tags: false,
            missing_names: Mutex::new(HashSet::new()),
        }
    }

    /// Build a registry from settings: default tag list, then redirects.
    pub fn from_settings(settings: TagSettings) -> Self {
        Self::from_config(&LoadedConfig {
            settings,
            tag_lists: Vec::new(),
        })
    }

    /// Build a registry from loaded configuration.
    ///
    /// Loads the default tag list, every extra tag list in order, then the
    /// redirects. Native tags may still be added afterwards; call
    /// [`done_adding_native_tags`](Self::done_adding_native_tags) when finished.
    pub fn from_config(config: &LoadedConfig) -> Self {
        let settings = &config.settings;
        let mut registry = Self::with_settings(settings.clone());

        if settings.import_tags_from_config {
            registry.load_tag_source(
                DEFAULT_SOURCE_NAME,
                TagSourceKind::DefaultTagList,
                settings.tags.iter().cloned(),
            );
            for list in &config.tag_lists {
                registry.load_tag_source(
                    list.name.as_str(),
                    TagSourceKind::TagList,
                    list.tags.iter().cloned(),
                );
            }
        }

        for redirect in &settings.redirects {
            registry.add_redirect(&redirect.old_tag_name, &redirect.new_tag_name);
        }

        debug!(
            tags = registry.tag_count(),
            sources = registry.sources.len(),
            redirects = registry.redirects.len(),
            "constructed gameplay tag tree"
        );
        registry
    }

    #[inline]
    pub fn settings(&self) -> &TagSettings {
        &self.settings
    }

    // =========================================================================
    // Registration
    // =========================================================================

    /// Bulk-load entry point for an external tag feed.
    ///
    /// Rows are recorded under source `name` (created on first use) and
    /// inserted into the tree. Rows with invalid names are skipped with a
    /// warning. Returns the number of rows inserted.
    pub fn load_tag_source(
        &mut self,
        name: &str,
        kind: TagSourceKind,
        rows: impl IntoIterator<Item = TagRow>,
    ) -> usize {
        let source_index = self.find_or_add_source(name, kind);
        let source_name = self.sources[source_index].name.clone();

        let mut inserted = 0;
        for row in rows {
            match self.insert_tag(&row.tag, Some(&source_name), false, &row.dev_comment) {
                Ok(_) => {
                    self.sources[source_index].rows.push(row.clone());
                    self.load_log.push((source_index, row));
                    inserted += 1;
                }
                Err(err) => {
                    warn!(source = %source_name, tag = %row.tag, %err, "skipping invalid tag row");
                }
            }
        }

        if self.done_adding_native_tags && inserted > 0 {
            self.construct_net_index();
        }
        inserted
    }

    /// Insert one row into `source`, creating it as a data table source if needed.
    pub fn add_tag_row(&mut self, source: &str, row: TagRow) -> bool {
        self.load_tag_source(source, TagSourceKind::DataTable, [row]) == 1
    }

    /// Register a tag from code.
    ///
    /// # Errors
    ///
    /// - the name is empty or malformed
    /// - [`done_adding_native_tags`](Self::done_adding_native_tags) was already called
    pub fn add_native_tag(&mut self, name: &str) -> Result<Tag, RegistryError> {
        self.add_native_tag_with_comment(name, "")
    }

    pub fn add_native_tag_with_comment(
        &mut self,
        name: &str,
        dev_comment: &str,
    ) -> Result<Tag, RegistryError> {
        if self.done_adding_native_tags {
            error!(tag = %name, "native tag added after native tag registration finished");
            return Err(RegistryError::NativeTagsFinalized {
                name: name.to_string(),
            });
        }
        let source_index = self.find_or_add_source(NATIVE_SOURCE_NAME, TagSourceKind::Native);
        let native = self.sources[source_index].name.clone();
        let tag = self.insert_tag(name, Some(&native), true, dev_comment)?;

        let source = &mut self.sources[source_index];
        if !source.rows.iter().any(|row| row.tag == name) {
            let row = TagRow::new(name, dev_comment);
            source.rows.push(row.clone());
            self.load_log.push((source_index, row));
        }
        Ok(tag)
    }

    fn find_or_add_source(&mut self, name: &str, kind: TagSourceKind) -> usize {
        match self.sources.iter().position(|s| &*s.name == name) {
            Some(index) => index,
            None => {
                self.sources.push(TagSource::new(name, kind));
                self.sources.len() - 1
            }
        }
    }

    /// Register a table of native tags (from `native_tags!`).
    pub fn register_native_tags(&mut self, defs: &[NativeTagDef]) -> Result<(), RegistryError> {
        for def in defs {
            self.add_native_tag_with_comment(def.name, def.dev_comment)?;
        }
        Ok(())
    }

    /// Register a table of native redirects (from `native_tags!`).
    pub fn register_native_redirects(&mut self, defs: &[NativeRedirectDef]) {
        for def in defs {
            self.add_redirect(def.old_name, def.new_name);
        }
    }

    /// Finish native registration and build the net index table.
    ///
    /// Idempotent. Also reports redirects that can never apply.
    pub fn done_adding_native_tags(&mut self) {
        if self.done_adding_native_tags {
            return;
        }
        self.done_adding_native_tags = true;
        self.validate_redirects();
        self.construct_net_index();
    }

    #[inline]
    pub fn is_done_adding_native_tags(&self) -> bool {
        self.done_adding_native_tags
    }

    /// Clear the tree and replay every accepted row in its original load order.
    ///
    /// Native and source rows interleave exactly as first loaded, so
    /// first-writer dev comments survive. Existing [`Tag`] handles keep
    /// working; they compare by name.
    pub fn rebuild(&mut self) {
        let was_done = self.done_adding_native_tags;
        let log = std::mem::take(&mut self.load_log);
        self.sources = std::mem::take(&mut self.sources)
            .into_iter()
            .map(|source| TagSource::new(source.name, source.kind))
            .collect();

        self.nodes.truncate(1);
        self.nodes[ROOT].children.clear();
        self.name_to_node.clear();
        self.commonly_replicated.clear();
        self.net_table = NetIndexTable::default();
        self.done_adding_native_tags = false;
        self.missing_names.lock().clear();

        for (source_index, row) in log {
            let source = &self.sources[source_index];
            let (name, kind) = (source.name.clone(), source.kind);
            if kind == TagSourceKind::Native {
                if let Err(err) = self.add_native_tag_with_comment(&row.tag, &row.dev_comment) {
                    warn!(tag = %row.tag, %err, "dropping native tag during rebuild");
                }
            } else {
                self.load_tag_source(&name, kind, [row]);
            }
        }

        if was_done {
            self.done_adding_native_tags();
        }
        debug!(tags = self.tag_count(), "rebuilt gameplay tag tree");
    }

    fn insert_tag(
        &mut self,
        name: &str,
        source: Option<&Arc<str>>,
        is_native: bool,
        dev_comment: &str,
    ) -> Result<Tag, RegistryError> {
        if name.is_empty() {
            return Err(RegistryError::EmptyTagName);
        }
        validate_tag_name(name).map_err(|reason| RegistryError::InvalidTagName {
            name: name.to_string(),
            reason,
        })?;

        let mut current = ROOT;
        let mut end = 0;
        for segment in name.split('.') {
            end += if current == ROOT {
                segment.len()
            } else {
                segment.len() + 1
            };
            current = match self.find_child(current, segment) {
                Ok(child) => child,
                Err(pos) => self.insert_child(current, pos, segment, &name[..end]),
            };
        }

        let node = &mut self.nodes[current];
        if let Some(source) = source
            && (is_native || node.source.is_none())
        {
            node.source = Some(source.clone());
        }
        if node.dev_comment.is_empty() && !dev_comment.is_empty() {
            node.dev_comment = dev_comment.to_string();
        }
        Ok(node.tag.clone())
    }

    /// `Ok(child node)` or `Err(sorted insert position)`.
    fn find_child(&self, parent: usize, segment: &str) -> Result<usize, usize> {
        let children = &self.nodes[parent].children;
        children
            .binary_search_by(|&child| (*self.nodes[child].segment).cmp(segment))
            .map(|pos| children[pos])
    }

    fn insert_child(&mut self, parent: usize, pos: usize, segment: &str, full_name: &str) -> usize {
        let parent_tag = self.nodes[parent].tag.clone();
        let parents: Box<[Tag]> = if parent_tag.is_valid() {
            std::iter::once(parent_tag.clone())
                .chain(parent_tag.parents().iter().cloned())
                .collect()
        } else {
            Box::new([])
        };

        let name: Arc<str> = Arc::from(full_name);
        let index = self.nodes.len();
        self.nodes.push(TagNode {
            segment: segment.into(),
            tag: Tag::new(name.clone(), parents),
            parent: Some(parent),
            children: Vec::new(),
            source: None,
            dev_comment: String::new(),
            net_index: None,
        });
        self.nodes[parent].children.insert(pos, index);
        self.name_to_node.insert(name, index);
        index
    }

    // =========================================================================
    // Lookup
    // =========================================================================

    /// Resolve `name` to a tag.
    ///
    /// Falls back to the redirect table when the name is not in the tree.
    /// Unknown names yield the invalid tag; with `error_if_not_found` each
    /// distinct missing name is logged once.
    pub fn request_tag(&self, name: &str, error_if_not_found: bool) -> Tag {
        if name.is_empty() || name == INVALID_TAG_NAME {
            return Tag::EMPTY;
        }
        if let Some(tag) = self.find_tag(name) {
            return tag;
        }
        if let Some(tag) = self.resolve_redirect(name) {
            return tag;
        }

        if error_if_not_found {
            let mut missing = self.missing_names.lock();
            if missing.insert(name.to_string()) {
                error!(tag = %name, "requested gameplay tag was not found");
            }
        }
        Tag::EMPTY
    }

    /// Exact tree lookup, no redirects.
    #[inline]
    pub fn find_tag(&self, name: &str) -> Option<Tag> {
        self.name_to_node
            .get(name)
            .map(|&index| self.nodes[index].tag.clone())
    }

    /// True if `name` is a node of the tree. Redirects are not consulted.
    #[inline]
    pub fn validate_tag_creation(&self, name: &str) -> bool {
        self.name_to_node.contains_key(name)
    }

    /// Check if a name is registered.
    #[inline]
    pub fn contains(&self, name: &str) -> bool {
        self.validate_tag_creation(name)
    }

    /// Number of registered tags (implicit parents included).
    #[inline]
    pub fn tag_count(&self) -> usize {
        self.nodes.len() - 1
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tag_count() == 0
    }

    /// All tags in DFS order: parent before children, siblings sorted.
    pub fn dfs_order(&self) -> Vec<Tag> {
        self.collect_subtree(ROOT, |_| true)
    }

    /// Every descendant of `tag`, `tag` itself excluded.
    pub fn request_children(&self, tag: &Tag) -> TagContainer {
        match self.node_of(tag) {
            Some(index) => self.collect_subtree(index, |_| true).into_iter().collect(),
            None => TagContainer::new(),
        }
    }

    /// Descendants of `tag` that some source defined explicitly.
    pub fn request_children_in_dictionary(&self, tag: &Tag) -> TagContainer {
        match self.node_of(tag) {
            Some(index) => self
                .collect_subtree(index, |node| node.source.is_some())
                .into_iter()
                .collect(),
            None => TagContainer::new(),
        }
    }

    /// `tag` plus every ancestor, all explicit.
    pub fn request_parents(&self, tag: &Tag) -> TagContainer {
        match self.node_of(tag) {
            Some(index) => self.nodes[index].tag.tag_parents(),
            None => TagContainer::new(),
        }
    }

    /// Immediate parent, or the invalid tag for top-level or unknown tags.
    pub fn request_direct_parent(&self, tag: &Tag) -> Tag {
        self.node_of(tag)
            .and_then(|index| self.nodes[index].parent)
            .map(|parent| self.nodes[parent].tag.clone())
            .unwrap_or_default()
    }

    /// Every registered tag, or only those some source defined explicitly.
    pub fn request_all_tags(&self, only_dictionary: bool) -> TagContainer {
        self.collect_subtree(ROOT, |node| !only_dictionary || node.source.is_some())
            .into_iter()
            .collect()
    }

    /// Segment names from the root down to `tag`.
    pub fn split_tag_names(&self, tag: &Tag) -> Vec<&str> {
        let mut out = Vec::new();
        let mut current = self.node_of(tag);
        while let Some(index) = current {
            let node = &self.nodes[index];
            if index != ROOT {
                out.push(&*node.segment);
            }
            current = node.parent;
        }
        out.reverse();
        out
    }

    /// Number of names shared by the self+ancestor sets of `a` and `b`.
    #[inline]
    pub fn tags_match_depth(&self, a: &Tag, b: &Tag) -> usize {
        a.matches_tag_depth(b)
    }

    /// True if some source defined `tag` (as opposed to an implicit parent).
    pub fn is_dictionary_tag(&self, tag: &Tag) -> bool {
        self.node_of(tag)
            .is_some_and(|index| self.nodes[index].source.is_some())
    }

    pub fn tag_editor_data(&self, tag: &Tag) -> Option<TagEditorData<'_>> {
        self.node_of(tag).map(|index| {
            let node = &self.nodes[index];
            TagEditorData {
                dev_comment: &node.dev_comment,
                source: node.source.as_deref(),
            }
        })
    }

    /// Tags whose defining source is `source`.
    pub fn tags_from_source(&self, source: &str) -> TagContainer {
        self.collect_subtree(ROOT, |node| node.source.as_deref() == Some(source))
            .into_iter()
            .collect()
    }

    pub fn find_tag_source(&self, name: &str) -> Option<&TagSource> {
        self.sources.iter().find(|s| s.name() == name)
    }

    /// Loaded sources in order of first use, the native source included.
    #[inline]
    pub fn tag_sources(&self) -> &[TagSource] {
        &self.sources
    }

    pub fn tag_sources_of_kind(&self, kind: TagSourceKind) -> impl Iterator<Item = &TagSource> {
        self.sources.iter().filter(move |s| s.kind() == kind)
    }

    fn node_of(&self, tag: &Tag) -> Option<usize> {
        self.name_to_node.get(tag.name()).copied()
    }

    fn collect_subtree(&self, start: usize, keep: impl Fn(&TagNode) -> bool) -> Vec<Tag> {
        let mut out = Vec::new();
        let mut stack: Vec<usize> = self.nodes[start].children.iter().rev().copied().collect();
        while let Some(index) = stack.pop() {
            let node = &self.nodes[index];
            if keep(node) {
                out.push(node.tag.clone());
            }
            stack.extend(node.children.iter().rev().copied());
        }
        out
    }

    // =========================================================================
    // Redirects
    // =========================================================================

    /// Make lookups of `old_name` resolve to `new_name`.
    ///
    /// Returns `false` (with a warning) for duplicates and self-redirects.
    pub fn add_redirect(&mut self, old_name: &str, new_name: &str) -> bool {
        if old_name == new_name {
            warn!(tag = %old_name, "ignoring redirect that points at itself");
            return false;
        }
        if self.redirects.contains_key(old_name) {
            warn!(tag = %old_name, "duplicate redirect, keeping the first one");
            return false;
        }
        self.redirects
            .insert(old_name.to_string(), new_name.to_string());
        true
    }

    /// `(old, new)` pairs, sorted by old name.
    pub fn redirects(&self) -> Vec<(&str, &str)> {
        let mut pairs: Vec<_> = self
            .redirects
            .iter()
            .map(|(old, new)| (old.as_str(), new.as_str()))
            .collect();
        pairs.sort_unstable();
        pairs
    }

    /// Follow the redirect chain from `name` to a registered tag.
    ///
    /// At most `max_redirect_hops` hops are taken; longer chains and cycles
    /// are reported and treated as unresolved.
    pub fn resolve_redirect(&self, name: &str) -> Option<Tag> {
        let mut current = name;
        for _ in 0..self.settings.max_redirect_hops {
            let next = self.redirects.get(current)?.as_str();
            if let Some(tag) = self.find_tag(next) {
                return Some(tag);
            }
            current = next;
        }
        if self.redirects.contains_key(current) {
            warn!(
                tag = %name,
                max_hops = self.settings.max_redirect_hops,
                "redirect chain did not converge"
            );
        }
        None
    }

    /// Replace explicit tags that have a redirect entry. Returns the number replaced.
    pub fn redirect_container(&self, container: &mut TagContainer) -> usize {
        let redirected: Vec<(Tag, Tag)> = container
            .iter()
            .filter(|tag| self.redirects.contains_key(tag.name()))
            .filter_map(|tag| match self.resolve_redirect(tag.name()) {
                Some(new_tag) => Some((tag.clone(), new_tag)),
                None => {
                    warn!(tag = %tag, "invalid redirect, keeping the old tag");
                    None
                }
            })
            .collect();

        for (old, new) in &redirected {
            container.remove_tag(old);
            container.add_tag(new.clone());
        }
        redirected.len()
    }

    fn validate_redirects(&self) {
        for (old, new) in self.redirects() {
            if self.validate_tag_creation(old) {
                warn!(
                    old_tag = %old,
                    new_tag = %new,
                    "redirected tag still exists in the tag tree, lookups will not be redirected"
                );
            } else if self.resolve_redirect(old).is_none() {
                warn!(old_tag = %old, new_tag = %new, "invalid redirect target, cannot replace old tag");
            }
        }
    }

    // =========================================================================
    // Replication index
    // =========================================================================

    fn construct_net_index(&mut self) {
        let mut commonly_replicated = Vec::with_capacity(self.settings.commonly_replicated_tags.len());
        for name in &self.settings.commonly_replicated_tags {
            match self.find_tag(name) {
                Some(tag) => commonly_replicated.push(tag),
                None => warn!(tag = %name, "commonly replicated tag is not registered"),
            }
        }

        let all: Vec<Tag> = self.nodes[1..].iter().map(|n| n.tag.clone()).collect();
        let table = NetIndexTable::build(all, &commonly_replicated, self.settings.net_index_max_bits);

        for node in &mut self.nodes {
            node.net_index = None;
        }
        for (index, tag) in table.tags().iter().enumerate() {
            if let Some(&node) = self.name_to_node.get(tag.name()) {
                self.nodes[node].net_index = Some(index as NetIndex);
            }
        }

        debug!(
            indexed = table.len(),
            invalid_index = table.invalid_index(),
            bits = table.true_bits(),
            "constructed net index table"
        );
        self.commonly_replicated = commonly_replicated;
        self.net_table = table;
    }

    #[inline]
    pub fn net_index_table(&self) -> &NetIndexTable {
        &self.net_table
    }

    /// Resolved commonly replicated tags, in index order.
    #[inline]
    pub fn commonly_replicated_tags(&self) -> &[Tag] {
        &self.commonly_replicated
    }

    /// Bit widths for the codec.
    pub fn net_config(&self) -> NetIndexConfig {
        let total_bits = self.net_table.true_bits();
        NetIndexConfig {
            first_segment_bits: self.settings.net_index_first_bit_segment.min(total_bits),
            total_bits,
            container_size_bits: self.settings.num_bits_for_container_size,
            fast_replication: self.settings.fast_replication,
        }
    }

    /// Net index of `tag`, or the invalid-index sentinel.
    pub fn net_index_of(&self, tag: &Tag) -> NetIndex {
        self.node_of(tag)
            .and_then(|index| self.nodes[index].net_index)
            .unwrap_or(self.net_table.invalid_index())
    }

    /// Tag at `index`. The sentinel yields the invalid tag silently; any
    /// other unknown index means the peers' tables are out of sync.
    pub fn tag_of_net_index(&self, index: NetIndex) -> Tag {
        if index == self.net_table.invalid_index() {
            return Tag::EMPTY;
        }
        match self.net_table.tag_at(index) {
            Some(tag) => tag.clone(),
            None => {
                warn!(
                    index,
                    table_len = self.net_table.len(),
                    "received net index is out of range, tag tables are out of sync"
                );
                Tag::EMPTY
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{TagList, TagRedirect};

    const SAMPLE_DEFS: &[&str] = &[
        "Effect.Damage",
        "Effect.Damage.Fire",
        "Effect.Damage.Ice",
        "Effect.Heal",
        "Status.Stunned",
    ];

    fn sample_registry() -> TagRegistry {
        let mut reg = TagRegistry::new();
        for name in SAMPLE_DEFS {
            reg.add_native_tag(name).unwrap();
        }
        reg
    }

    fn names(container: &TagContainer) -> Vec<&str> {
        container.iter().map(Tag::name).collect()
    }

    #[test]
    fn register_creates_parents() {
        let mut reg = TagRegistry::new();
        reg.add_native_tag("A.B.C").unwrap();

        assert_eq!(reg.tag_count(), 3);
        assert!(reg.contains("A"));
        assert!(reg.contains("A.B"));
        assert!(reg.contains("A.B.C"));
    }

    #[test]
    fn register_is_idempotent() {
        let mut reg = TagRegistry::new();
        let a = reg.add_native_tag("Effect.Damage").unwrap();
        let b = reg.add_native_tag("Effect.Damage").unwrap();

        assert_eq!(a, b);
        assert_eq!(reg.tag_count(), 2);
        assert_eq!(reg.request_tag("Effect.Damage", true), reg.request_tag("Effect.Damage", true));
    }

    #[test]
    fn register_rejects_bad_names() {
        let mut reg = TagRegistry::new();
        assert_eq!(reg.add_native_tag(""), Err(RegistryError::EmptyTagName));
        assert!(matches!(
            reg.add_native_tag("A..B"),
            Err(RegistryError::InvalidTagName { .. })
        ));
        assert!(reg.is_empty());
    }

    #[test]
    fn split_names_and_match_depth() {
        let reg = sample_registry();
        let fire = reg.request_tag("Effect.Damage.Fire", true);
        let ice = reg.request_tag("Effect.Damage.Ice", true);
        let stunned = reg.request_tag("Status.Stunned", true);

        assert_eq!(reg.split_tag_names(&fire), vec!["Effect", "Damage", "Fire"]);
        assert!(reg.split_tag_names(&Tag::EMPTY).is_empty());
        assert_eq!(reg.tags_match_depth(&fire, &ice), 2);
        assert_eq!(reg.tags_match_depth(&fire, &stunned), 0);
    }

    #[test]
    fn add_tag_row_creates_data_table_source() {
        let mut reg = TagRegistry::new();
        assert!(reg.add_tag_row("Abilities", TagRow::new("Ability.Dash", "Short dash")));
        assert!(!reg.add_tag_row("Abilities", TagRow::new("Ability..Bad", "")));

        let source = reg.find_tag_source("Abilities").unwrap();
        assert_eq!(source.kind(), TagSourceKind::DataTable);
        assert_eq!(source.rows().len(), 1);
    }

    #[test]
    fn dfs_order_sorts_siblings() {
        let mut reg = TagRegistry::new();
        reg.add_native_tag("B").unwrap();
        reg.add_native_tag("A").unwrap();
        reg.add_native_tag("A.C").unwrap();
        reg.add_native_tag("A.B").unwrap();
        reg.add_native_tag("B.A").unwrap();

        let order: Vec<_> = reg.dfs_order().iter().map(|t| t.name().to_string()).collect();
        assert_eq!(order, vec!["A", "A.B", "A.C", "B", "B.A"]);
    }

    #[test]
    fn request_children_excludes_self() {
        let mut reg = TagRegistry::new();
        reg.add_native_tag("Effect.Damage").unwrap();
        reg.add_native_tag("Effect.Damage.Fire").unwrap();

        let damage = reg.request_tag("Effect.Damage", true);
        assert_eq!(names(&reg.request_children(&damage)), vec!["Effect.Damage.Fire"]);

        let effect = reg.request_tag("Effect", true);
        assert_eq!(
            names(&reg.request_children(&effect)),
            vec!["Effect.Damage", "Effect.Damage.Fire"]
        );
        assert!(reg.request_children(&Tag::EMPTY).is_empty());
    }

    #[test]
    fn request_parents_and_direct_parent() {
        let reg = sample_registry();
        let fire = reg.request_tag("Effect.Damage.Fire", true);

        let parents = reg.request_parents(&fire);
        assert_eq!(parents.len(), 3);
        assert!(parents.has_tag_exact(&fire));
        assert!(parents.has_tag_exact(&reg.request_tag("Effect", true)));

        assert_eq!(reg.request_direct_parent(&fire).name(), "Effect.Damage");
        assert!(!reg.request_direct_parent(&reg.request_tag("Effect", true)).is_valid());
    }

    #[test]
    fn unknown_tag_is_invalid_and_reported_once() {
        let reg = sample_registry();

        assert!(!reg.request_tag("Effect.Missing", true).is_valid());
        assert!(!reg.request_tag("Effect.Missing", true).is_valid());
        assert!(!reg.request_tag("Other.Missing", false).is_valid());

        let missing = reg.missing_names.lock();
        assert_eq!(missing.len(), 1);
        assert!(missing.contains("Effect.Missing"));
    }

    #[test]
    fn metadata_first_writer_wins_and_native_overrides() {
        let mut reg = TagRegistry::new();
        reg.load_tag_source(
            "First.toml",
            TagSourceKind::TagList,
            [TagRow::new("Effect.Damage", ""), TagRow::new("Effect.Heal", "Heals")],
        );
        reg.load_tag_source(
            "Second.toml",
            TagSourceKind::TagList,
            [TagRow::new("Effect.Damage", "Hurts"), TagRow::new("Effect.Heal", "Ignored")],
        );

        let damage = reg.request_tag("Effect.Damage", true);
        let heal = reg.request_tag("Effect.Heal", true);
        assert_eq!(
            reg.tag_editor_data(&damage),
            Some(TagEditorData {
                dev_comment: "Hurts",
                source: Some("First.toml")
            })
        );
        assert_eq!(reg.tag_editor_data(&heal).unwrap().dev_comment, "Heals");

        reg.add_native_tag("Effect.Heal").unwrap();
        assert_eq!(reg.tag_editor_data(&heal).unwrap().source, Some(NATIVE_SOURCE_NAME));
    }

    #[test]
    fn implicit_parents_are_not_dictionary_tags() {
        let mut reg = TagRegistry::new();
        reg.load_tag_source(
            "Combat.toml",
            TagSourceKind::TagList,
            [TagRow::new("Combat.Attack.Melee", "")],
        );
        let combat = reg.request_tag("Combat", true);
        let melee = reg.request_tag("Combat.Attack.Melee", true);

        assert!(!reg.is_dictionary_tag(&combat));
        assert!(reg.is_dictionary_tag(&melee));
        assert_eq!(reg.tag_editor_data(&combat).unwrap().source, None);
        assert_eq!(names(&reg.request_all_tags(true)), vec!["Combat.Attack.Melee"]);
        assert_eq!(reg.request_all_tags(false).len(), 3);
        assert_eq!(
            names(&reg.request_children_in_dictionary(&combat)),
            vec!["Combat.Attack.Melee"]
        );
        assert_eq!(names(&reg.tags_from_source("Combat.toml")), vec!["Combat.Attack.Melee"]);
    }

    #[test]
    fn load_tag_source_skips_invalid_rows() {
        let mut reg = TagRegistry::new();
        let inserted = reg.load_tag_source(
            "Feed",
            TagSourceKind::DataTable,
            [TagRow::new("Good.Tag", ""), TagRow::new("Bad..Tag", "")],
        );

        assert_eq!(inserted, 1);
        let source = reg.find_tag_source("Feed").unwrap();
        assert_eq!(source.kind(), TagSourceKind::DataTable);
        assert_eq!(source.rows().len(), 1);
        assert_eq!(reg.tag_sources_of_kind(TagSourceKind::DataTable).count(), 1);
        assert_eq!(reg.tag_sources_of_kind(TagSourceKind::TagList).count(), 0);
    }

    #[test]
    fn native_tags_rejected_after_done() {
        let mut reg = sample_registry();
        reg.done_adding_native_tags();
        reg.done_adding_native_tags();

        assert!(reg.is_done_adding_native_tags());
        assert_eq!(
            reg.add_native_tag("Late.Tag"),
            Err(RegistryError::NativeTagsFinalized {
                name: "Late.Tag".into()
            })
        );
        assert!(!reg.contains("Late.Tag"));
    }

    #[test]
    fn redirect_resolves_missing_name() {
        let mut reg = sample_registry();
        assert!(reg.add_redirect("Effect.Burn", "Effect.Damage.Fire"));
        assert!(!reg.add_redirect("Effect.Burn", "Effect.Heal"));

        let burn = reg.request_tag("Effect.Burn", true);
        assert_eq!(burn.name(), "Effect.Damage.Fire");
        assert!(!reg.validate_tag_creation("Effect.Burn"));
    }

    #[test]
    fn redirect_follows_chains() {
        let mut reg = sample_registry();
        reg.add_redirect("Old1", "Old2");
        reg.add_redirect("Old2", "Old3");
        reg.add_redirect("Old3", "Effect.Heal");

        assert_eq!(reg.request_tag("Old1", true).name(), "Effect.Heal");
    }

    #[test]
    fn redirect_cycle_does_not_converge() {
        let mut reg = sample_registry();
        reg.add_redirect("Loop.A", "Loop.B");
        reg.add_redirect("Loop.B", "Loop.A");

        assert!(reg.resolve_redirect("Loop.A").is_none());
        assert!(!reg.request_tag("Loop.A", false).is_valid());
    }

    #[test]
    fn redirect_hops_are_bounded_by_settings() {
        let mut reg = TagRegistry::with_settings(TagSettings {
            max_redirect_hops: 2,
            ..TagSettings::default()
        });
        reg.add_native_tag("Target").unwrap();
        reg.add_redirect("Step1", "Step2");
        reg.add_redirect("Step2", "Step3");
        reg.add_redirect("Step3", "Target");

        assert!(reg.request_tag("Step2", false).is_valid());
        assert!(!reg.request_tag("Step1", false).is_valid());
    }

    #[test]
    fn redirect_container_replaces_old_tags() {
        let mut reg = sample_registry();
        reg.add_native_tag("Effect.Burn").unwrap();
        reg.add_redirect("Effect.Burn", "Effect.Damage.Fire");

        let mut container: TagContainer = [
            reg.request_tag("Effect.Burn", true),
            reg.request_tag("Status.Stunned", true),
        ]
        .into_iter()
        .collect();

        assert_eq!(reg.redirect_container(&mut container), 1);
        assert!(container.has_tag_exact(&reg.request_tag("Effect.Damage.Fire", true)));
        assert!(!container.has_tag_exact(&reg.request_tag("Effect.Burn", true)));
        assert_eq!(container.len(), 2);
    }

    #[test]
    fn from_settings_loads_rows_and_redirects() {
        let settings = TagSettings {
            tags: vec![TagRow::new("Effect.Damage.Fire", "Burning")],
            redirects: vec![TagRedirect::new("Effect.Burn", "Effect.Damage.Fire")],
            ..TagSettings::default()
        };
        let reg = TagRegistry::from_settings(settings);

        assert_eq!(reg.request_tag("Effect.Burn", true).name(), "Effect.Damage.Fire");
        assert_eq!(
            reg.find_tag_source(DEFAULT_SOURCE_NAME).map(TagSource::kind),
            Some(TagSourceKind::DefaultTagList)
        );
    }

    #[test]
    fn from_config_respects_import_flag() {
        let config = LoadedConfig {
            settings: TagSettings {
                import_tags_from_config: false,
                tags: vec![TagRow::new("Effect.Damage", "")],
                ..TagSettings::default()
            },
            tag_lists: vec![TagList::new("Combat.toml", vec![TagRow::new("Combat.Attack", "")])],
        };
        let reg = TagRegistry::from_config(&config);
        assert!(reg.is_empty());

        let config = LoadedConfig {
            settings: TagSettings {
                import_tags_from_config: true,
                ..config.settings
            },
            ..config
        };
        let reg = TagRegistry::from_config(&config);
        assert!(reg.contains("Effect.Damage"));
        assert!(reg.contains("Combat.Attack"));
        assert_eq!(reg.tag_sources().len(), 2);
    }

    #[test]
    fn rebuild_replays_natives_and_sources() {
        let mut reg = sample_registry();
        reg.load_tag_source("Extra.toml", TagSourceKind::TagList, [TagRow::new("Extra.One", "")]);
        reg.done_adding_native_tags();
        let before_count = reg.tag_count();
        let before_order: Vec<_> = reg.net_index_table().tags().to_vec();

        reg.rebuild();

        assert_eq!(reg.tag_count(), before_count);
        assert!(reg.is_done_adding_native_tags());
        assert_eq!(reg.net_index_table().tags(), before_order.as_slice());
        assert_eq!(reg.tags_from_source("Extra.toml").len(), 1);
    }

    #[test]
    fn rebuild_keeps_first_writer_comments() {
        let mut reg = TagRegistry::new();
        reg.load_tag_source(
            "Lists.toml",
            TagSourceKind::TagList,
            [TagRow::new("Effect.Burn", "from list")],
        );
        reg.add_native_tag_with_comment("Effect.Burn", "from code").unwrap();
        reg.add_native_tag_with_comment("Effect.Freeze", "native first").unwrap();
        reg.load_tag_source(
            "Lists.toml",
            TagSourceKind::TagList,
            [TagRow::new("Effect.Freeze", "list second")],
        );
        reg.done_adding_native_tags();

        let burn = reg.request_tag("Effect.Burn", true);
        let freeze = reg.request_tag("Effect.Freeze", true);
        let before = [reg.tag_editor_data(&burn), reg.tag_editor_data(&freeze)].map(|data| {
            data.map(|d| (d.dev_comment.to_string(), d.source.map(str::to_string)))
        });

        reg.rebuild();

        let after = [reg.tag_editor_data(&burn), reg.tag_editor_data(&freeze)].map(|data| {
            data.map(|d| (d.dev_comment.to_string(), d.source.map(str::to_string)))
        });
        assert_eq!(after, before);
        assert_eq!(reg.tag_editor_data(&burn).unwrap().dev_comment, "from list");
        assert_eq!(reg.tag_editor_data(&freeze).unwrap().dev_comment, "native first");
        assert_eq!(
            reg.tag_sources().iter().map(TagSource::name).collect::<Vec<_>>(),
            vec!["Lists.toml", NATIVE_SOURCE_NAME]
        );
    }

    #[test]
    fn native_tags_have_a_native_source() {
        let mut reg = TagRegistry::new();
        assert!(reg.find_tag_source(NATIVE_SOURCE_NAME).is_none());

        reg.add_native_tag_with_comment("Effect.Damage", "Hurts").unwrap();
        reg.add_native_tag("Effect.Damage").unwrap();
        reg.add_native_tag("Effect.Heal").unwrap();

        let native = reg.find_tag_source(NATIVE_SOURCE_NAME).unwrap();
        assert_eq!(native.kind(), TagSourceKind::Native);
        let rows: Vec<_> = native.rows().iter().map(|row| row.tag.as_str()).collect();
        assert_eq!(rows, vec!["Effect.Damage", "Effect.Heal"]);
        assert_eq!(reg.tag_sources_of_kind(TagSourceKind::Native).count(), 1);
        assert_eq!(
            names(&reg.tags_from_source(NATIVE_SOURCE_NAME)),
            vec!["Effect.Damage", "Effect.Heal"]
        );
    }

    #[test]
    fn request_none_is_the_invalid_tag() {
        let reg = sample_registry();
        assert!(!reg.request_tag("None", true).is_valid());
        assert!(reg.missing_names.lock().is_empty());

        assert!(!reg.request_tag("Nope", true).is_valid());
        assert!(reg.missing_names.lock().contains("Nope"));
    }

    #[test]
    fn late_source_reindexes() {
        let mut reg = sample_registry();
        reg.done_adding_native_tags();
        let before = reg.net_index_table().len();

        reg.load_tag_source("Late.toml", TagSourceKind::TagList, [TagRow::new("Zed", "")]);

        assert_eq!(reg.net_index_table().len(), before + 1);
        let zed = reg.request_tag("Zed", true);
        assert_eq!(reg.tag_of_net_index(reg.net_index_of(&zed)), zed);
    }

    #[test]
    fn net_index_round_trips_every_tag() {
        let mut reg = sample_registry();
        reg.done_adding_native_tags();

        for tag in reg.dfs_order() {
            let index = reg.net_index_of(&tag);
            assert_ne!(index, reg.net_index_table().invalid_index());
            assert_eq!(reg.tag_of_net_index(index), tag);
        }

        let sentinel = reg.net_index_table().invalid_index();
        assert_eq!(reg.net_index_of(&Tag::EMPTY), sentinel);
        assert!(!reg.tag_of_net_index(sentinel).is_valid());
        assert!(!reg.tag_of_net_index(sentinel + 5).is_valid());
    }
}
