//! Bit-packed replication of tags and containers.
//!
//! # Net index packing
//!
//! With first segment width `N` and total width `T`:
//!
//! ```text
//! index <  2^N:  [ index : N ][ 0 ]                         N + 1 bits
//! index >= 2^N:  [ low : N ][ 1 ][ index >> N : T - N ]     T + 1 bits
//!
//! N == 0 or N >= T:  [ index : T ]                          T bits, no flag
//! ```
//!
//! Commonly replicated tags sit at the front of the [`NetIndexTable`] so they
//! take the short form.
//!
//! # Container layout
//!
//! ```text
//! [ is_empty : 1 ]                                   empty container stops here
//! [ count : container_size_bits ][ tag ]*count
//! ```
//!
//! Both peers must build their registries from the same tag set; the index
//! table is an implicit contract, not a negotiated protocol.

use tracing::warn;

use crate::bits::{BitReader, BitWriter};
use crate::container::TagContainer;
use crate::error::NetError;
use crate::registry::TagRegistry;
use crate::replication::ReplicationStats;
use crate::tag::Tag;

/// Dense replication id of a tag.
pub type NetIndex = u16;

/// Width of the length prefix when tags travel by name.
pub const NAME_LENGTH_BITS: u32 = 16;

// =============================================================================
// Index packing
// =============================================================================

/// Write `index` using the two-segment scheme described in the module docs.
pub fn pack_index(writer: &mut BitWriter, index: u32, first_segment_bits: u32, total_bits: u32) {
    if first_segment_bits == 0 || first_segment_bits >= total_bits {
        writer.write_bits(index, total_bits);
        return;
    }

    let mask = (1u32 << first_segment_bits) - 1;
    if index > mask {
        writer.write_bits(index & mask, first_segment_bits);
        writer.write_bit(true);
        writer.write_bits(index >> first_segment_bits, total_bits - first_segment_bits);
    } else {
        writer.write_bits(index, first_segment_bits);
        writer.write_bit(false);
    }
}

/// Read an index written by [`pack_index`] with the same widths.
pub fn unpack_index(
    reader: &mut BitReader<'_>,
    first_segment_bits: u32,
    total_bits: u32,
) -> Result<u32, NetError> {
    if first_segment_bits == 0 || first_segment_bits >= total_bits {
        return reader.read_bits(total_bits);
    }

    let mask = (1u32 << first_segment_bits) - 1;
    let first = reader.read_bits(first_segment_bits + 1)?;
    if first & (1 << first_segment_bits) != 0 {
        let second = reader.read_bits(total_bits - first_segment_bits)?;
        Ok(second << first_segment_bits | first & mask)
    } else {
        Ok(first)
    }
}

/// Number of bits needed to represent `value`.
#[inline]
pub fn bits_for(value: u32) -> u32 {
    u32::BITS - value.leading_zeros()
}

// =============================================================================
// Index table
// =============================================================================

/// Total order of registered tags giving each a dense [`NetIndex`].
///
/// Tags are sorted by full name, then every commonly replicated tag is moved
/// to the front in the order given. Indices run `0..len`; `len + 1` is the
/// invalid-index sentinel.
///
/// The wire width is `bits_for(len + 1)`, the smallest width that holds the
/// sentinel. When the sentinel is a power of two this is one bit wider than
/// `ceil(log2(len + 1))`, which could not encode the sentinel itself.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NetIndexTable {
    tags: Vec<Tag>,
    invalid_index: NetIndex,
    true_bits: u32,
}

impl Default for NetIndexTable {
    fn default() -> Self {
        Self::build(Vec::new(), &[], NetIndex::BITS)
    }
}

impl NetIndexTable {
    /// Build the table for `tags`.
    ///
    /// Entries beyond what `max_bits` can address are dropped with an error log.
    pub fn build(mut tags: Vec<Tag>, commonly_replicated: &[Tag], max_bits: u32) -> Self {
        let max_bits = max_bits.clamp(1, NetIndex::BITS);

        tags.retain(Tag::is_valid);
        tags.sort();
        tags.dedup();

        let mut front: Vec<Tag> = Vec::with_capacity(commonly_replicated.len());
        for tag in commonly_replicated {
            if !front.contains(tag) && tags.binary_search(tag).is_ok() {
                front.push(tag.clone());
            }
        }
        if !front.is_empty() {
            tags.retain(|tag| !front.contains(tag));
            front.append(&mut tags);
            tags = front;
        }

        // The sentinel `len + 1` must itself fit in `max_bits`.
        let capacity = (1usize << max_bits) - 2;
        if tags.len() > capacity {
            tracing::error!(
                registered = tags.len(),
                capacity,
                max_bits,
                "too many tags for the net index width, truncating the net index table"
            );
            tags.truncate(capacity);
        }

        let invalid_index = (tags.len() + 1) as NetIndex;
        Self {
            tags,
            invalid_index,
            true_bits: bits_for(u32::from(invalid_index)),
        }
    }

    /// Tags in index order.
    #[inline]
    pub fn tags(&self) -> &[Tag] {
        &self.tags
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.tags.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    #[inline]
    pub fn tag_at(&self, index: NetIndex) -> Option<&Tag> {
        self.tags.get(usize::from(index))
    }

    /// Sentinel sent for invalid or unindexed tags.
    #[inline]
    pub fn invalid_index(&self) -> NetIndex {
        self.invalid_index
    }

    /// Bits needed for any index including the sentinel.
    #[inline]
    pub fn true_bits(&self) -> u32 {
        self.true_bits
    }
}

/// Bit widths and mode derived from the registry settings and its index table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NetIndexConfig {
    /// `N`, already clamped to `total_bits`.
    pub first_segment_bits: u32,
    /// `T`.
    pub total_bits: u32,
    pub container_size_bits: u32,
    pub fast_replication: bool,
}

// =============================================================================
// Codec
// =============================================================================

/// Reads and writes tags and containers against one registry.
///
/// Attach a [`ReplicationStats`] to count what gets sent.
pub struct TagNetCodec<'a> {
    registry: &'a TagRegistry,
    config: NetIndexConfig,
    stats: Option<&'a mut ReplicationStats>,
}

impl<'a> TagNetCodec<'a> {
    pub fn new(registry: &'a TagRegistry) -> Self {
        Self {
            registry,
            config: registry.net_config(),
            stats: None,
        }
    }

    /// Record every written tag in `stats`.
    pub fn with_stats(registry: &'a TagRegistry, stats: &'a mut ReplicationStats) -> Self {
        Self {
            stats: Some(stats),
            ..Self::new(registry)
        }
    }

    #[inline]
    pub fn config(&self) -> NetIndexConfig {
        self.config
    }

    pub fn write_tag(&mut self, writer: &mut BitWriter, tag: &Tag) -> Result<(), NetError> {
        if let Some(stats) = self.stats.as_deref_mut() {
            stats.record_single(tag);
        }
        self.write_tag_inner(writer, tag)
    }

    pub fn read_tag(&self, reader: &mut BitReader<'_>) -> Result<Tag, NetError> {
        if self.config.fast_replication {
            let index = unpack_index(
                reader,
                self.config.first_segment_bits,
                self.config.total_bits,
            )?;
            let Ok(index) = NetIndex::try_from(index) else {
                warn!(index, "received net index does not fit the index type");
                return Ok(Tag::EMPTY);
            };
            Ok(self.registry.tag_of_net_index(index))
        } else {
            let len = reader.read_bits(NAME_LENGTH_BITS)? as usize;
            let bytes = reader.read_bytes(len)?;
            let name = String::from_utf8(bytes).map_err(|_| NetError::InvalidUtf8)?;
            if name.is_empty() {
                return Ok(Tag::EMPTY);
            }
            Ok(self
                .registry
                .request_tag(&name, self.registry.settings().warn_on_invalid_tags))
        }
    }

    /// Write a container. Containers too large for the count field are truncated with a warning.
    pub fn write_container(
        &mut self,
        writer: &mut BitWriter,
        container: &TagContainer,
    ) -> Result<(), NetError> {
        writer.write_bit(container.is_empty());
        if container.is_empty() {
            return Ok(());
        }

        let size_bits = self.config.container_size_bits;
        let max_count = (1usize << size_bits) - 1;
        let mut count = container.len();
        if count > max_count {
            warn!(
                count,
                max_count,
                size_bits,
                "tag container too large to replicate, dropping the excess tags"
            );
            count = max_count;
        }

        writer.write_bits(count as u32, size_bits);
        for tag in container.iter().take(count) {
            if let Some(stats) = self.stats.as_deref_mut() {
                stats.record_in_container(tag);
            }
            self.write_tag_inner(writer, tag)?;
        }
        Ok(())
    }

    /// Read a container. The parent cache is rebuilt from the received tags.
    pub fn read_container(&self, reader: &mut BitReader<'_>) -> Result<TagContainer, NetError> {
        let mut container = TagContainer::new();
        if reader.read_bit()? {
            return Ok(container);
        }

        let count = reader.read_bits(self.config.container_size_bits)?;
        for _ in 0..count {
            container.add_tag(self.read_tag(reader)?);
        }
        Ok(container)
    }

    fn write_tag_inner(&self, writer: &mut BitWriter, tag: &Tag) -> Result<(), NetError> {
        if self.config.fast_replication {
            let index = self.registry.net_index_of(tag);
            pack_index(
                writer,
                u32::from(index),
                self.config.first_segment_bits,
                self.config.total_bits,
            );
        } else {
            let name = tag.name().as_bytes();
            if name.len() >= 1 << NAME_LENGTH_BITS {
                return Err(NetError::NameTooLong { len: name.len() });
            }
            writer.write_bits(name.len() as u32, NAME_LENGTH_BITS);
            writer.write_bytes(name);
        }
        Ok(())
    }
}
