//! Bevy integration for gameplay tags.
//!
//! Provides:
//! - `GameplayTagsPlugin`: builder-pattern plugin that builds the registry and inserts it as a Resource
//! - [`TagContainer`](crate::TagContainer) is a `Component`, so entities carry their tags directly
//!
//! # Example
//!
//! ```ignore
//! use bevy::prelude::*;
//! use bevy_gameplay_tags::{bevy::GameplayTagsPlugin, native_tags, TagContainer, TagRegistry};
//!
//! native_tags! {
//!     pub mod Tags {
//!         Movement { Idle; Running; }
//!         Combat { Attack; Block; }
//!     }
//! }
//!
//! fn main() {
//!     App::new()
//!         .add_plugins(GameplayTagsPlugin::new().with_native_tags(Tags::NATIVE_TAGS))
//!         .add_systems(Startup, spawn_entities)
//!         .run();
//! }
//!
//! fn spawn_entities(mut commands: Commands, registry: Res<TagRegistry>) {
//!     let mut tags = TagContainer::new();
//!     tags.add_tag(Tags::Movement::Idle::Tag::request(&registry));
//!     commands.spawn(tags);
//! }
//! ```

use bevy::prelude::*;
use tracing::error;

use crate::config::{LoadedConfig, TagList, TagSettings};
use crate::native::{NativeRedirectDef, NativeTagDef};
use crate::registry::TagRegistry;

// =============================================================================
// Plugin
// =============================================================================

/// Bevy plugin for the gameplay tag system.
///
/// Use the builder pattern to configure:
///
/// ```ignore
/// let config = bevy_gameplay_tags::config::load("config/GameplayTags.toml")?;
/// App::new()
///     .add_plugins(
///         GameplayTagsPlugin::from_config(config)
///             .with_native_tags(Tags::NATIVE_TAGS)
///             .with_native_redirects(Tags::REDIRECTS)
///     )
/// ```
#[derive(Default)]
pub struct GameplayTagsPlugin {
    settings: TagSettings,
    tag_lists: Vec<TagList>,
    native_tags: Vec<&'static [NativeTagDef]>,
    native_redirects: Vec<&'static [NativeRedirectDef]>,
}

impl GameplayTagsPlugin {
    /// Plugin with default settings and no tags.
    pub fn new() -> Self {
        Self::default()
    }

    /// Plugin built from a loaded configuration directory.
    pub fn from_config(config: LoadedConfig) -> Self {
        Self {
            settings: config.settings,
            tag_lists: config.tag_lists,
            ..Self::default()
        }
    }

    pub fn from_settings(settings: TagSettings) -> Self {
        Self {
            settings,
            ..Self::default()
        }
    }

    /// Replace the settings.
    pub fn with_settings(mut self, settings: TagSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Add an extra tag list, loaded after the default list.
    pub fn with_tag_list(mut self, list: TagList) -> Self {
        self.tag_lists.push(list);
        self
    }

    pub fn with_extra_lists(mut self, lists: impl IntoIterator<Item = TagList>) -> Self {
        self.tag_lists.extend(lists);
        self
    }

    /// Register native tags (from `native_tags!`).
    ///
    /// ```ignore
    /// GameplayTagsPlugin::new().with_native_tags(Tags::NATIVE_TAGS)
    /// ```
    pub fn with_native_tags(mut self, defs: &'static [NativeTagDef]) -> Self {
        self.native_tags.push(defs);
        self
    }

    pub fn with_native_redirects(mut self, defs: &'static [NativeRedirectDef]) -> Self {
        self.native_redirects.push(defs);
        self
    }

    /// Build the finalized registry the plugin would insert.
    ///
    /// Native tags that fail to register are logged and skipped.
    pub fn build_registry(&self) -> TagRegistry {
        let mut registry = TagRegistry::from_config(&LoadedConfig {
            settings: self.settings.clone(),
            tag_lists: self.tag_lists.clone(),
        });

        for defs in &self.native_tags {
            if let Err(err) = registry.register_native_tags(defs) {
                error!(%err, "failed to register native gameplay tags");
            }
        }
        for defs in &self.native_redirects {
            registry.register_native_redirects(defs);
        }

        registry.done_adding_native_tags();
        registry
    }
}

impl Plugin for GameplayTagsPlugin {
    fn build(&self, app: &mut App) {
        app.insert_resource(self.build_registry());
    }
}

// =============================================================================
// Resource impl for TagRegistry
// =============================================================================

impl Resource for TagRegistry {}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TagRow;
    use crate::container::TagContainer;
    use crate::source::{TagSource, TagSourceKind};

    const SAMPLE_NATIVE: &[NativeTagDef] = &[
        NativeTagDef::new("Combat.Attack", "Melee or ranged attack"),
        NativeTagDef::new("Combat.Block", ""),
    ];

    const SAMPLE_REDIRECTS: &[NativeRedirectDef] =
        &[NativeRedirectDef::new("Combat.Parry", "Combat.Block")];

    #[test]
    fn plugin_inserts_finalized_registry() {
        let mut app = App::new();
        app.add_plugins(
            GameplayTagsPlugin::new()
                .with_native_tags(SAMPLE_NATIVE)
                .with_native_redirects(SAMPLE_REDIRECTS)
                .with_tag_list(TagList::new("Movement.toml", vec![TagRow::new("Movement.Idle", "")])),
        );

        let registry = app.world().resource::<TagRegistry>();
        assert!(registry.is_done_adding_native_tags());
        assert!(registry.contains("Combat.Attack"));
        assert!(registry.contains("Movement.Idle"));
        assert_eq!(registry.request_tag("Combat.Parry", true).name(), "Combat.Block");
        assert!(!registry.net_index_table().is_empty());
    }

    #[test]
    fn container_is_a_component() {
        let mut app = App::new();
        app.add_plugins(GameplayTagsPlugin::new().with_native_tags(SAMPLE_NATIVE));

        let attack = app
            .world()
            .resource::<TagRegistry>()
            .request_tag("Combat.Attack", true);
        let entity = app.world_mut().spawn(TagContainer::from_tag(attack.clone())).id();

        let container = app.world().get::<TagContainer>(entity).unwrap();
        assert!(container.has_tag_exact(&attack));
    }

    #[test]
    fn extra_lists_respect_import_flag() {
        let settings = TagSettings {
            import_tags_from_config: false,
            ..TagSettings::default()
        };
        let registry = GameplayTagsPlugin::from_settings(settings)
            .with_extra_lists([TagList::new("Extra.toml", vec![TagRow::new("Extra.Tag", "")])])
            .build_registry();
        assert!(!registry.contains("Extra.Tag"));
    }

    #[test]
    fn plugin_loads_lists_like_the_registry() {
        let config = LoadedConfig {
            settings: TagSettings {
                tags: vec![TagRow::new("Default.Tag", "")],
                ..TagSettings::default()
            },
            tag_lists: vec![TagList::new("Combat.toml", vec![TagRow::new("Combat.Block", "")])],
        };
        let plugin = GameplayTagsPlugin::from_config(config.clone());
        let registry = plugin.build_registry();

        let mut expected = TagRegistry::from_config(&config);
        expected.done_adding_native_tags();
        assert_eq!(registry.dfs_order(), expected.dfs_order());
        assert_eq!(
            registry.tag_sources().iter().map(TagSource::kind).collect::<Vec<_>>(),
            vec![TagSourceKind::DefaultTagList, TagSourceKind::TagList]
        );
    }
}
