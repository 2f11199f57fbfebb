//! # Hierarchical Gameplay Tags (bevy-gameplay-tags)
//!
//! Dot-delimited hierarchical tags (`Effect.Damage.Fire`) for Bevy games,
//! modeled on UE5 GameplayTags.
//!
//! ## Design
//!
//! ```text
//! config files / native_tags! ──▶ TagRegistry ──▶ Tag ──▶ TagContainer ──▶ TagQuery
//!                                      │                        │
//!                                      └──── NetIndexTable ─────┴──▶ TagNetCodec
//! ```
//!
//! - [`TagRegistry`] owns the tag tree, resolves names and redirects, and
//!   assigns compact replication indices.
//! - [`Tag`] is a cheap handle carrying its ancestor chain, so hierarchical
//!   matching needs no registry access.
//! - [`TagContainer`] keeps an ancestor cache next to its explicit tags.
//! - [`TagQuery`] compiles a boolean expression over tags into a byte stream.
//! - [`TagNetCodec`] bit-packs tags and containers for the network.
//!
//! ```ignore
//! use bevy_gameplay_tags::{TagContainer, TagRegistry};
//!
//! let mut registry = TagRegistry::new();
//! registry.add_native_tag("Effect.Damage.Fire")?;
//! registry.done_adding_native_tags();
//!
//! let fire = registry.request_tag("Effect.Damage.Fire", true);
//! let damage = registry.request_tag("Effect.Damage", true);
//!
//! let tags = TagContainer::from_tag(fire);
//! assert!(tags.has_tag(&damage));
//! assert!(!tags.has_tag_exact(&damage));
//! ```

pub mod bevy;
pub mod bits;
pub mod container;
pub mod error;
pub mod global;
pub mod native;
pub mod net;
pub mod query;
pub mod registry;
pub mod replication;
pub mod source;
pub mod tag;
pub mod text;

pub use bevy_gameplay_tags_config as config;
pub use bevy_gameplay_tags_macro::native_tags;

pub use bits::{BitReader, BitWriter};
pub use container::TagContainer;
pub use error::{NetError, QueryError, RegistryError, TextError};
pub use native::{NativeRedirectDef, NativeTag, NativeTagDef};
pub use net::{pack_index, unpack_index, NetIndex, NetIndexConfig, NetIndexTable, TagNetCodec};
pub use query::{SerializedTagQuery, TagQuery, TagQueryExpr, TagQueryExprType};
pub use registry::{TagEditorData, TagRegistry};
pub use replication::{ReplicationReport, ReplicationStats, TagReplicationCount};
pub use source::{TagSource, TagSourceKind};
pub use tag::Tag;

/// Check a tag name's syntax without registering it.
#[inline]
pub fn is_valid_tag_name(name: &str) -> bool {
    config::validate_tag_name(name).is_ok()
}
