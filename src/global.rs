//! Process-wide registry.
//!
//! ```text
//! (uninitialized) ──initialize / get_or_init_with / get──▶ (published)
//!        ▲                                                     │
//!        └──────────────────────── teardown ───────────────────┘
//! ```
//!
//! Most code should hold a `&TagRegistry` (or the Bevy resource) explicitly.
//! The global slot exists for call sites with no access to one, such as
//! deserialization hooks. A published registry is always finalized and never
//! mutated; handles taken before a [`teardown`] keep their registry alive.

use std::cell::Cell;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::error::RegistryError;
use crate::registry::TagRegistry;

static GLOBAL: RwLock<Option<Arc<TagRegistry>>> = parking_lot::const_rwlock(None);

thread_local! {
    /// Set while this thread runs a `get_or_init_with` initializer.
    static INITIALIZING: Cell<bool> = const { Cell::new(false) };
}

/// Clears [`INITIALIZING`] on drop, including when the initializer panics.
struct InitGuard;

impl InitGuard {
    fn enter() -> Self {
        INITIALIZING.with(|flag| flag.set(true));
        InitGuard
    }
}

impl Drop for InitGuard {
    fn drop(&mut self) {
        INITIALIZING.with(|flag| flag.set(false));
    }
}

/// Publish `registry` as the global registry.
///
/// Native registration is finalized first if the caller has not done so.
///
/// # Errors
///
/// [`RegistryError::AlreadyInitialized`] if a registry is already published.
pub fn initialize(mut registry: TagRegistry) -> Result<Arc<TagRegistry>, RegistryError> {
    let mut slot = GLOBAL.write();
    if slot.is_some() {
        return Err(RegistryError::AlreadyInitialized);
    }
    registry.done_adding_native_tags();
    let registry = Arc::new(registry);
    *slot = Some(registry.clone());
    debug!(tags = registry.tag_count(), "published global gameplay tag registry");
    Ok(registry)
}

/// The global registry, publishing an empty finalized one on first access.
pub fn get() -> Arc<TagRegistry> {
    get_or_init_with(TagRegistry::new)
}

/// The global registry, publishing the result of `init` if there is none.
///
/// `init` runs outside the lock. When several threads race on first access
/// the first to publish wins and the others drop their registry, so every
/// caller observes the same instance.
///
/// A call made from inside `init` on the same thread does not publish. It
/// gets an empty, unpublished registry so the outer initializer's registry
/// is the one that lands in the slot.
pub fn get_or_init_with(init: impl FnOnce() -> TagRegistry) -> Arc<TagRegistry> {
    if let Some(registry) = try_get() {
        return registry;
    }

    if INITIALIZING.with(Cell::get) {
        warn!("global gameplay tag registry requested while it is being initialized");
        let mut placeholder = TagRegistry::new();
        placeholder.done_adding_native_tags();
        return Arc::new(placeholder);
    }

    let mut candidate = {
        let _guard = InitGuard::enter();
        init()
    };
    candidate.done_adding_native_tags();

    let mut slot = GLOBAL.write();
    match slot.as_ref() {
        Some(existing) => {
            debug!(
                dropped_tags = candidate.tag_count(),
                "another thread published the global gameplay tag registry first"
            );
            existing.clone()
        }
        None => {
            let registry = Arc::new(candidate);
            *slot = Some(registry.clone());
            debug!(tags = registry.tag_count(), "published global gameplay tag registry");
            registry
        }
    }
}

/// The global registry, if published.
#[inline]
pub fn try_get() -> Option<Arc<TagRegistry>> {
    GLOBAL.read().clone()
}

#[inline]
pub fn is_initialized() -> bool {
    GLOBAL.read().is_some()
}

/// Unpublish the global registry, returning it.
pub fn teardown() -> Option<Arc<TagRegistry>> {
    let registry = GLOBAL.write().take();
    if registry.is_some() {
        debug!("tore down global gameplay tag registry");
    }
    registry
}
