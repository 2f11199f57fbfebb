//! Property tests over a fixed tag universe.

use bevy_gameplay_tags::*;
use proptest::prelude::*;

const SAMPLE_TAGS: &[&str] = &[
    "A", "A.B", "A.B.C", "A.D", "B", "B.E", "B.E.F", "C",
];

fn sample_registry() -> TagRegistry {
    let mut registry = TagRegistry::new();
    for name in SAMPLE_TAGS {
        registry.add_native_tag(name).unwrap();
    }
    registry.done_adding_native_tags();
    registry
}

fn tag_indices(max_len: usize) -> impl Strategy<Value = Vec<usize>> {
    prop::collection::vec(0..SAMPLE_TAGS.len(), 0..max_len)
}

fn container_of(registry: &TagRegistry, indices: &[usize]) -> TagContainer {
    indices
        .iter()
        .map(|&i| registry.request_tag(SAMPLE_TAGS[i], true))
        .collect()
}

proptest! {
    #[test]
    fn interning_is_idempotent(i in 0..SAMPLE_TAGS.len()) {
        let registry = sample_registry();
        let a = registry.request_tag(SAMPLE_TAGS[i], true);
        let b = registry.request_tag(SAMPLE_TAGS[i], true);
        prop_assert_eq!(&a, &b);
        prop_assert!(a.matches_tag(&b));
    }

    #[test]
    fn matching_is_upward_only(i in 0..SAMPLE_TAGS.len()) {
        let registry = sample_registry();
        let tag = registry.request_tag(SAMPLE_TAGS[i], true);
        prop_assert!(tag.matches_tag(&tag));
        for parent in tag.parents() {
            prop_assert!(tag.matches_tag(parent));
            prop_assert!(!parent.matches_tag(&tag));
            prop_assert!(!tag.matches_tag_exact(parent));
        }
    }

    #[test]
    fn leaf_tags_form_an_antichain(ops in tag_indices(24)) {
        let registry = sample_registry();
        let mut container = TagContainer::new();
        for i in ops {
            let tag = registry.request_tag(SAMPLE_TAGS[i], true);
            let before = container.clone();
            if !container.add_leaf_tag(tag) {
                prop_assert_eq!(&container, &before);
            }
        }
        for a in container.iter() {
            for b in container.iter() {
                if a != b {
                    prop_assert!(!a.matches_tag(b), "{} covers {}", a, b);
                }
            }
        }
    }

    #[test]
    fn parent_cache_matches_explicit_tags(adds in tag_indices(8), removes in tag_indices(4)) {
        let registry = sample_registry();
        let mut container = container_of(&registry, &adds);
        container.remove_tags(&container_of(&registry, &removes));

        for name in SAMPLE_TAGS {
            let lookup = registry.request_tag(name, true);
            let expected = container.iter().any(|explicit| explicit.matches_tag(&lookup));
            prop_assert_eq!(container.has_tag(&lookup), expected);
        }
    }

    #[test]
    fn text_round_trip(indices in tag_indices(8)) {
        let registry = sample_registry();
        let container = container_of(&registry, &indices);
        let restored = TagContainer::from_text(&container.to_text(), &registry).unwrap();
        prop_assert_eq!(restored, container);
    }

    #[test]
    fn query_evaluation_is_pure(query_tags in tag_indices(4), indices in tag_indices(6)) {
        let registry = sample_registry();
        let tags = container_of(&registry, &query_tags);
        let container = container_of(&registry, &indices);

        let any = TagQuery::make_query_match_any_tags(&tags).unwrap();
        let all = TagQuery::make_query_match_all_tags(&tags).unwrap();
        let none = TagQuery::make_query_match_no_tags(&tags).unwrap();

        prop_assert_eq!(any.matches(&container), container.has_any(&tags));
        prop_assert_eq!(all.matches(&container), container.has_all(&tags));
        prop_assert_eq!(none.matches(&container), !container.has_any(&tags));
        prop_assert_eq!(any.matches(&container), any.matches(&container));
    }

    #[test]
    fn pack_unpack_round_trip(
        (total_bits, first_segment_bits, index) in (1u32..=16)
            .prop_flat_map(|t| (Just(t), 0..=t, 0..(1u32 << t)))
    ) {
        let mut writer = BitWriter::new();
        pack_index(&mut writer, index, first_segment_bits, total_bits);
        let bytes = writer.into_bytes();
        let mut reader = BitReader::new(&bytes);
        prop_assert_eq!(unpack_index(&mut reader, first_segment_bits, total_bits).unwrap(), index);
    }

    #[test]
    fn container_net_round_trip(indices in tag_indices(8)) {
        let registry = sample_registry();
        let container = container_of(&registry, &indices);

        let mut writer = BitWriter::new();
        TagNetCodec::new(&registry).write_container(&mut writer, &container).unwrap();
        let bits = writer.num_bits();
        let bytes = writer.into_bytes();

        let mut reader = BitReader::with_num_bits(&bytes, bits);
        let restored = TagNetCodec::new(&registry).read_container(&mut reader).unwrap();
        prop_assert_eq!(restored, container);
        prop_assert!(reader.is_at_end());
    }
}
