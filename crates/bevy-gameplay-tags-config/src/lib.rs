//! Settings and tag list files for bevy-gameplay-tags.
//!
//! This crate provides tools for:
//! - Parsing the project settings file (`gameplay_tags.toml`)
//! - Discovering extra tag lists under a `Tags/` directory next to it
//! - Validating tag names and redirect rows before they reach the registry
//!
//! # Layout on disk
//!
//! ```text
//! config/
//! ├── gameplay_tags.toml      settings, default tag list, redirects
//! └── Tags/
//!     ├── Combat.toml         [[tags]] rows, source "Combat.toml"
//!     └── Status.toml         [[tags]] rows, source "Status.toml"
//! ```
//!
//! # Usage
//!
//! ```ignore
//! let config = bevy_gameplay_tags_config::load("config/gameplay_tags.toml")?;
//! let registry = TagRegistry::from_config(&config);
//! ```
//!
//! Extra lists are read in file name order so every peer builds the same tree
//! (and therefore the same net index table).

mod settings;

pub use settings::{
    validate_tag_name, TagList, TagRedirect, TagRow, TagSettings, DEFAULT_CONTAINER_SIZE_BITS,
    DEFAULT_FIRST_BIT_SEGMENT, DEFAULT_MAX_REDIRECT_HOPS, DEFAULT_NET_INDEX_MAX_BITS,
};

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};

/// Name of the directory scanned for extra tag lists.
pub const TAG_LIST_DIR: &str = "Tags";

/// Settings plus every extra tag list found next to them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadedConfig {
    pub settings: TagSettings,
    pub tag_lists: Vec<TagList>,
}

/// Main entry point.
///
/// Reads the settings file and, when `import_tags_from_config` is set,
/// every `*.toml` file in the sibling `Tags/` directory.
///
/// # Errors
///
/// Returns an error if:
/// - the settings file or a tag list cannot be read or parsed
/// - a tag name or redirect row is invalid
pub fn load(config_path: impl AsRef<Path>) -> Result<LoadedConfig, ConfigError> {
    let config_path = config_path.as_ref();
    let settings = TagSettings::from_file(config_path)?;

    let tag_lists = if settings.import_tags_from_config {
        let dir = config_path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(TAG_LIST_DIR);
        load_tag_lists(&dir)?
    } else {
        Vec::new()
    };

    Ok(LoadedConfig {
        settings,
        tag_lists,
    })
}

/// Load every `*.toml` tag list in `dir`, sorted by file name.
///
/// A missing directory yields no lists.
pub fn load_tag_lists(dir: impl AsRef<Path>) -> Result<Vec<TagList>, ConfigError> {
    let dir = dir.as_ref();
    if !dir.is_dir() {
        debug!(dir = %dir.display(), "no tag list directory");
        return Ok(Vec::new());
    }

    let io_err = |source| ConfigError::Io {
        path: dir.to_path_buf(),
        source,
    };

    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(io_err)? {
        let path = entry.map_err(io_err)?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "toml") {
            paths.push(path);
        }
    }
    paths.sort();

    let mut lists = Vec::with_capacity(paths.len());
    for path in paths {
        let list = TagList::from_file(&path)?;
        info!(source = %list.name, tags = list.tags.len(), "loaded tag list");
        lists.push(list);
    }
    Ok(lists)
}

/// Errors that can occur while loading settings or tag lists.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("validation error: {0}")]
    Validation(String),
}
