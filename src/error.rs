//! Error types for construction-time and decode-time APIs.
//!
//! Hot-path lookups and predicates never return these: they answer with an
//! invalid [`Tag`](crate::Tag) or `false` instead.

use thiserror::Error;

/// Errors raised while populating or publishing a [`TagRegistry`](crate::TagRegistry).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("tag name is empty")]
    EmptyTagName,
    #[error("invalid tag name '{name}': {reason}")]
    InvalidTagName { name: String, reason: &'static str },
    #[error("cannot add native tag '{name}': native tag registration is finished")]
    NativeTagsFinalized { name: String },
    #[error("the global tag registry is already initialized")]
    AlreadyInitialized,
}

/// Errors raised while compiling a [`TagQuery`](crate::TagQuery).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error("query references {count} distinct tags, at most 255 are supported")]
    TooManyTags { count: usize },
    #[error("query node has {count} elements, at most 255 are supported")]
    TooManyElements { count: usize },
    #[error("query nesting depth {depth} exceeds the supported maximum")]
    TooDeep { depth: usize },
}

/// Errors raised by the bit stream and the tag net codec.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NetError {
    #[error("read of {requested} bits past the end of the stream ({remaining} bits left)")]
    Overflow { requested: u32, remaining: usize },
    #[error("tag name of {len} bytes is too long to replicate")]
    NameTooLong { len: usize },
    #[error("replicated tag name is not valid UTF-8")]
    InvalidUtf8,
}

/// Errors raised while importing tags or containers from text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TextError {
    #[error("expected {expected} at offset {offset}")]
    Expected { expected: &'static str, offset: usize },
    #[error("unterminated string starting at offset {offset}")]
    UnterminatedString { offset: usize },
    #[error("unexpected trailing input at offset {offset}")]
    TrailingInput { offset: usize },
    #[error("unknown tag '{name}'")]
    UnknownTag { name: String },
}
