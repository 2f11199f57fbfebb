//! Replication frequency statistics and index-width tuning.
//!
//! Attach [`ReplicationStats`] to a [`TagNetCodec`](crate::net::TagNetCodec)
//! during a play session, then call [`ReplicationStats::report`] to get a
//! suggested `net_index_first_bit_segment` and `commonly_replicated_tags` list.
//!
//! For every candidate first segment width `N` the report prices each tag at
//! its frequency rank:
//!
//! ```text
//! rank < 2^N   → N + 1 bits
//! otherwise    → T + 1 bits
//! savings(N)   = Σ (T - cost) * count
//! ```

use std::collections::HashMap;
use std::fmt;

use crate::registry::TagRegistry;
use crate::tag::Tag;

/// Per-tag send counts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TagReplicationCount {
    /// Sent on its own.
    pub single: u64,
    /// Sent as part of a container.
    pub in_container: u64,
}

impl TagReplicationCount {
    #[inline]
    pub fn total(&self) -> u64 {
        self.single + self.in_container
    }
}

/// Counts of replicated tags.
#[derive(Clone, Debug, Default)]
pub struct ReplicationStats {
    counts: HashMap<Tag, TagReplicationCount>,
}

impl ReplicationStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_single(&mut self, tag: &Tag) {
        self.counts.entry(tag.clone()).or_default().single += 1;
    }

    pub fn record_in_container(&mut self, tag: &Tag) {
        self.counts.entry(tag.clone()).or_default().in_container += 1;
    }

    pub fn count(&self, tag: &Tag) -> TagReplicationCount {
        self.counts.get(tag).copied().unwrap_or_default()
    }

    /// Total number of tag sends recorded.
    pub fn total(&self) -> u64 {
        self.counts.values().map(TagReplicationCount::total).sum()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn reset(&mut self) {
        self.counts.clear();
    }

    /// Rank the recorded tags and pick the cheapest first segment width.
    ///
    /// Invalid tags are left out. Ties between widths go to the narrower one;
    /// when no width saves anything the suggestion is `T` (packing off).
    pub fn report(&self, registry: &TagRegistry) -> ReplicationReport {
        let mut entries: Vec<(Tag, TagReplicationCount)> = self
            .counts
            .iter()
            .filter(|(tag, _)| tag.is_valid())
            .map(|(tag, count)| (tag.clone(), *count))
            .collect();
        entries.sort_by(|a, b| b.1.total().cmp(&a.1.total()).then_with(|| a.0.cmp(&b.0)));

        let true_bits = registry.net_config().total_bits;
        let mut best_bits = true_bits;
        let mut best_savings = 0i64;

        for bits in 1..true_bits {
            let savings: i64 = entries
                .iter()
                .enumerate()
                .map(|(rank, (_, count))| {
                    let cost = if rank < 1usize << bits {
                        bits + 1
                    } else {
                        true_bits + 1
                    };
                    (i64::from(true_bits) - i64::from(cost)) * count.total() as i64
                })
                .sum();
            if savings > best_savings {
                best_savings = savings;
                best_bits = bits;
            }
        }

        let suggested = if best_bits < true_bits {
            entries
                .iter()
                .take(1usize << best_bits)
                .map(|(tag, _)| tag.name().to_string())
                .collect()
        } else {
            Vec::new()
        };

        ReplicationReport {
            entries,
            true_bits,
            first_segment_bits: best_bits,
            bits_saved: best_savings,
            commonly_replicated_tags: suggested,
        }
    }
}

/// Result of [`ReplicationStats::report`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReplicationReport {
    /// Recorded tags, most frequently sent first.
    pub entries: Vec<(Tag, TagReplicationCount)>,
    pub true_bits: u32,
    /// Suggested `net_index_first_bit_segment`.
    pub first_segment_bits: u32,
    /// Bits saved over fixed-width indices with the suggested settings.
    pub bits_saved: i64,
    /// Suggested `commonly_replicated_tags`.
    pub commonly_replicated_tags: Vec<String>,
}

impl fmt::Display for ReplicationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "# tag replication report")?;
        for (tag, count) in &self.entries {
            writeln!(
                f,
                "# {:>8} total {:>8} single {:>8} in container  {}",
                count.total(),
                count.single,
                count.in_container,
                tag
            )?;
        }
        writeln!(
            f,
            "# {} bits saved with a {}-bit first segment (full index is {} bits)",
            self.bits_saved, self.first_segment_bits, self.true_bits
        )?;
        writeln!(f, "net_index_first_bit_segment = {}", self.first_segment_bits)?;
        write!(f, "commonly_replicated_tags = [")?;
        for (i, name) in self.commonly_replicated_tags.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "\"{}\"", name)?;
        }
        writeln!(f, "]")
    }
}
