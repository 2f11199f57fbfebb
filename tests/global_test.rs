//! Process-wide registry lifecycle.

use std::sync::{Arc, Barrier};
use std::thread;

use bevy_gameplay_tags::{global, RegistryError, TagRegistry};
use serial_test::serial;

fn sample_registry() -> TagRegistry {
    let mut registry = TagRegistry::new();
    registry.add_native_tag("Effect.Damage").unwrap();
    registry
}

#[test]
#[serial]
fn initialize_then_get() {
    global::teardown();
    assert!(!global::is_initialized());
    assert!(global::try_get().is_none());

    let published = global::initialize(sample_registry()).unwrap();
    assert!(published.is_done_adding_native_tags());
    assert!(global::is_initialized());
    assert!(Arc::ptr_eq(&published, &global::get()));
    assert!(global::get().request_tag("Effect.Damage", true).is_valid());

    assert_eq!(
        global::initialize(TagRegistry::new()).unwrap_err(),
        RegistryError::AlreadyInitialized
    );
    global::teardown();
}

#[test]
#[serial]
fn get_lazily_publishes_empty_registry() {
    global::teardown();

    let registry = global::get();
    assert!(registry.is_empty());
    assert!(registry.is_done_adding_native_tags());
    assert!(Arc::ptr_eq(&registry, &global::get()));
    global::teardown();
}

#[test]
#[serial]
fn get_or_init_with_runs_only_when_empty() {
    global::teardown();

    let first = global::get_or_init_with(sample_registry);
    let second = global::get_or_init_with(|| panic!("already initialized"));
    assert!(Arc::ptr_eq(&first, &second));
    assert!(first.contains("Effect.Damage"));
    global::teardown();
}

#[test]
#[serial]
fn reentrant_get_during_init_keeps_callers_registry() {
    global::teardown();

    let mut inner = None;
    let outer = global::get_or_init_with(|| {
        let registry = sample_registry();
        inner = Some(global::get());
        registry
    });

    let inner = inner.unwrap();
    assert!(!Arc::ptr_eq(&inner, &outer));
    assert!(inner.is_empty());
    assert!(outer.contains("Effect.Damage"));
    assert!(Arc::ptr_eq(&outer, &global::get()));
    assert!(global::get().contains("Effect.Damage"));

    // The guard is released once initialization finishes.
    global::teardown();
    let fresh = global::get();
    assert!(Arc::ptr_eq(&fresh, &global::get()));
    global::teardown();
}

#[test]
#[serial]
fn teardown_keeps_outstanding_handles_alive() {
    global::teardown();

    let handle = global::initialize(sample_registry()).unwrap();
    let torn_down = global::teardown().unwrap();
    assert!(Arc::ptr_eq(&handle, &torn_down));
    assert!(!global::is_initialized());
    assert!(handle.contains("Effect.Damage"));

    assert!(global::initialize(TagRegistry::new()).is_ok());
    global::teardown();
}

#[test]
#[serial]
fn concurrent_first_access_sees_one_instance() {
    global::teardown();

    const THREADS: usize = 8;
    let barrier = Arc::new(Barrier::new(THREADS));
    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                global::get_or_init_with(sample_registry)
            })
        })
        .collect();

    let registries: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    for registry in &registries[1..] {
        assert!(Arc::ptr_eq(&registries[0], registry));
    }
    assert!(Arc::ptr_eq(&registries[0], &global::get()));
    global::teardown();
}

#[test]
#[serial]
fn concurrent_readers_share_lookups() {
    global::teardown();
    global::initialize(sample_registry()).unwrap();

    let handles: Vec<_> = (0..4)
        .map(|_| {
            thread::spawn(|| {
                let registry = global::get();
                (0..100).all(|_| {
                    registry.request_tag("Effect.Damage", true).is_valid()
                        && !registry.request_tag("Effect.Missing", true).is_valid()
                })
            })
        })
        .collect();

    for handle in handles {
        assert!(handle.join().unwrap());
    }
    global::teardown();
}
