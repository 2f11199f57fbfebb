//! TOML parser for the gameplay tag settings file and extra tag lists.

use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;

use crate::ConfigError;

/// Default width of the replicated container size field.
pub const DEFAULT_CONTAINER_SIZE_BITS: u32 = 6;

/// Default width of the first net index segment.
pub const DEFAULT_FIRST_BIT_SEGMENT: u32 = 16;

/// Default (and maximum) width of a net index.
pub const DEFAULT_NET_INDEX_MAX_BITS: u32 = 16;

/// Default bound on redirect chain resolution.
pub const DEFAULT_MAX_REDIRECT_HOPS: u32 = 10;

/// One row of a tag list: a full dotted tag name and an optional developer comment.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TagRow {
    pub tag: String,
    #[serde(default)]
    pub dev_comment: String,
}

impl TagRow {
    pub fn new(tag: impl Into<String>, dev_comment: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            dev_comment: dev_comment.into(),
        }
    }
}

/// A renamed tag: lookups of `old_tag_name` resolve to `new_tag_name`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TagRedirect {
    pub old_tag_name: String,
    pub new_tag_name: String,
}

impl TagRedirect {
    pub fn new(old_tag_name: impl Into<String>, new_tag_name: impl Into<String>) -> Self {
        Self {
            old_tag_name: old_tag_name.into(),
            new_tag_name: new_tag_name.into(),
        }
    }
}

/// Project-wide gameplay tag settings.
///
/// ```toml
/// fast_replication = true
/// commonly_replicated_tags = ["Effect.Damage"]
///
/// [[tags]]
/// tag = "Effect.Damage.Fire"
/// dev_comment = "Burning damage"
///
/// [[redirects]]
/// old_tag_name = "Effect.Burn"
/// new_tag_name = "Effect.Damage.Fire"
/// ```
///
/// Every field is optional; missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TagSettings {
    /// Load `tags` and the `Tags/*.toml` lists next to the settings file.
    pub import_tags_from_config: bool,
    /// Warn when text or serialized input names a tag the registry does not know.
    pub warn_on_invalid_tags: bool,
    /// Replicate tags by net index. When off, tags travel as names.
    pub fast_replication: bool,
    pub num_bits_for_container_size: u32,
    pub net_index_first_bit_segment: u32,
    /// Width of a net index. Tags beyond `2^bits - 2` are dropped from the index table.
    pub net_index_max_bits: u32,
    pub max_redirect_hops: u32,
    /// Tags moved to the front of the net index table, in this order.
    pub commonly_replicated_tags: Vec<String>,
    pub tags: Vec<TagRow>,
    pub redirects: Vec<TagRedirect>,
}

impl Default for TagSettings {
    fn default() -> Self {
        Self {
            import_tags_from_config: true,
            warn_on_invalid_tags: true,
            fast_replication: true,
            num_bits_for_container_size: DEFAULT_CONTAINER_SIZE_BITS,
            net_index_first_bit_segment: DEFAULT_FIRST_BIT_SEGMENT,
            net_index_max_bits: DEFAULT_NET_INDEX_MAX_BITS,
            max_redirect_hops: DEFAULT_MAX_REDIRECT_HOPS,
            commonly_replicated_tags: Vec::new(),
            tags: Vec::new(),
            redirects: Vec::new(),
        }
    }
}

impl TagSettings {
    /// Parse from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_str(&content)
    }

    /// Parse from a TOML string.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        let settings: TagSettings = toml::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Check bit widths, tag names and redirect rows.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=16).contains(&self.num_bits_for_container_size) {
            return Err(ConfigError::Validation(format!(
                "num_bits_for_container_size must be in 1..=16, got {}",
                self.num_bits_for_container_size
            )));
        }
        if !(1..=16).contains(&self.net_index_max_bits) {
            return Err(ConfigError::Validation(format!(
                "net_index_max_bits must be in 1..=16, got {}",
                self.net_index_max_bits
            )));
        }
        if self.max_redirect_hops == 0 {
            return Err(ConfigError::Validation(
                "max_redirect_hops must be at least 1".into(),
            ));
        }

        validate_rows(&self.tags)?;

        for name in &self.commonly_replicated_tags {
            check_name(name)?;
        }

        let mut old_names = HashSet::new();
        for redirect in &self.redirects {
            check_name(&redirect.old_tag_name)?;
            check_name(&redirect.new_tag_name)?;
            if redirect.old_tag_name == redirect.new_tag_name {
                return Err(ConfigError::Validation(format!(
                    "redirect '{}' points at itself",
                    redirect.old_tag_name
                )));
            }
            if !old_names.insert(redirect.old_tag_name.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "duplicate redirect for '{}'",
                    redirect.old_tag_name
                )));
            }
        }

        Ok(())
    }
}

/// An extra tag list file (`Tags/<name>.toml`).
///
/// Each file is its own tag source, named by its file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagList {
    pub name: String,
    pub tags: Vec<TagRow>,
}

#[derive(Debug, Deserialize)]
struct RawTagList {
    #[serde(default)]
    tags: Vec<TagRow>,
}

impl TagList {
    pub fn new(name: impl Into<String>, tags: Vec<TagRow>) -> Self {
        Self {
            name: name.into(),
            tags,
        }
    }

    /// Parse from a TOML file. The source name is the file name.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self::from_str(name, &content)
    }

    /// Parse from a TOML string.
    pub fn from_str(name: impl Into<String>, content: &str) -> Result<Self, ConfigError> {
        let raw: RawTagList = toml::from_str(content)?;
        validate_rows(&raw.tags)?;
        Ok(Self {
            name: name.into(),
            tags: raw.tags,
        })
    }
}

fn validate_rows(rows: &[TagRow]) -> Result<(), ConfigError> {
    for row in rows {
        check_name(&row.tag)?;
    }
    Ok(())
}

fn check_name(name: &str) -> Result<(), ConfigError> {
    validate_tag_name(name).map_err(|reason| {
        ConfigError::Validation(format!("invalid tag name '{}': {}", name, reason))
    })
}

/// Check the syntax of a dotted tag name.
///
/// Returns the reason on failure. Segments may hold any character except
/// whitespace and the delimiters used by the text format.
pub fn validate_tag_name(name: &str) -> Result<(), &'static str> {
    if name.is_empty() {
        return Err("empty name");
    }
    if name.starts_with('.') || name.ends_with('.') {
        return Err("cannot start or end with '.'");
    }
    if name.split('.').any(str::is_empty) {
        return Err("empty segment");
    }
    if name == "None" {
        return Err("'None' is reserved for the empty tag");
    }
    if let Some(c) = name
        .chars()
        .find(|c| c.is_whitespace() || matches!(c, '"' | '\'' | ',' | '(' | ')' | '=' | '\\'))
    {
        return Err(match c {
            c if c.is_whitespace() => "contains whitespace",
            _ => "contains a reserved character",
        });
    }
    Ok(())
}
