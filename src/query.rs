//! Compiled boolean tag queries.
//!
//! A [`TagQueryExpr`] tree is flattened once into a byte stream plus a tag
//! dictionary. Evaluation walks the stream directly, without rebuilding the
//! tree and without allocating.
//!
//! ```text
//! ALL( ANY(A, B), NONE(C) )
//!
//! dictionary: [A, B, C]
//! stream:     [ver=0][root=1]
//!               [AllExprMatch][2]
//!                 [AnyTagsMatch][2][0][1]
//!                 [NoTagsMatch ][1][2]
//! ```
//!
//! Every node states how many elements follow, so the reader always parses a
//! node to its end even once its result is decided. A tag used in several
//! nodes takes a single dictionary slot.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::container::TagContainer;
use crate::error::QueryError;
use crate::registry::TagRegistry;
use crate::tag::Tag;

/// First byte of every compiled query.
pub const TAG_QUERY_STREAM_VERSION: u8 = 0;

/// Maximum nesting of expressions accepted by the compiler and the reader.
pub const MAX_QUERY_DEPTH: usize = 64;

const MAX_DICTIONARY_LEN: usize = 255;
const MAX_ELEMENTS: usize = u8::MAX as usize;

// =============================================================================
// Expression tree
// =============================================================================

/// Node type byte of the token stream.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TagQueryExprType {
    Undefined = 0,
    AnyTagsMatch = 1,
    AllTagsMatch = 2,
    NoTagsMatch = 3,
    AnyExprMatch = 4,
    AllExprMatch = 5,
    NoExprMatch = 6,
}

impl TagQueryExprType {
    pub fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            0 => Self::Undefined,
            1 => Self::AnyTagsMatch,
            2 => Self::AllTagsMatch,
            3 => Self::NoTagsMatch,
            4 => Self::AnyExprMatch,
            5 => Self::AllExprMatch,
            6 => Self::NoExprMatch,
            _ => return None,
        })
    }

    #[inline]
    pub fn uses_tags(self) -> bool {
        matches!(self, Self::AnyTagsMatch | Self::AllTagsMatch | Self::NoTagsMatch)
    }

    #[inline]
    pub fn uses_exprs(self) -> bool {
        matches!(self, Self::AnyExprMatch | Self::AllExprMatch | Self::NoExprMatch)
    }
}

/// Editable query expression.
///
/// ```ignore
/// let expr = TagQueryExpr::all_expr_match()
///     .add_expr(TagQueryExpr::any_tags_match().add_tag(a).add_tag(b))
///     .add_expr(TagQueryExpr::no_tags_match().add_tag(c));
/// let query = TagQuery::build_query(&expr)?;
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TagQueryExpr {
    /// At least one tag is present (hierarchically).
    AnyTagsMatch(Vec<Tag>),
    /// Every tag is present (hierarchically). Empty list matches.
    AllTagsMatch(Vec<Tag>),
    /// No tag is present (hierarchically). Empty list matches.
    NoTagsMatch(Vec<Tag>),
    AnyExprMatch(Vec<TagQueryExpr>),
    AllExprMatch(Vec<TagQueryExpr>),
    NoExprMatch(Vec<TagQueryExpr>),
}

impl TagQueryExpr {
    #[inline]
    pub fn any_tags_match() -> Self {
        Self::AnyTagsMatch(Vec::new())
    }

    #[inline]
    pub fn all_tags_match() -> Self {
        Self::AllTagsMatch(Vec::new())
    }

    #[inline]
    pub fn no_tags_match() -> Self {
        Self::NoTagsMatch(Vec::new())
    }

    #[inline]
    pub fn any_expr_match() -> Self {
        Self::AnyExprMatch(Vec::new())
    }

    #[inline]
    pub fn all_expr_match() -> Self {
        Self::AllExprMatch(Vec::new())
    }

    #[inline]
    pub fn no_expr_match() -> Self {
        Self::NoExprMatch(Vec::new())
    }

    /// Append a tag. Ignored (with a warning) on expression nodes.
    pub fn add_tag(mut self, tag: Tag) -> Self {
        match self.tags_mut() {
            Some(tags) => tags.push(tag),
            None => warn!(%tag, "cannot add a tag to an expression-list query node"),
        }
        self
    }

    /// Append every explicit tag of `container`.
    pub fn add_tags(mut self, container: &TagContainer) -> Self {
        match self.tags_mut() {
            Some(tags) => tags.extend(container.iter().cloned()),
            None => warn!("cannot add tags to an expression-list query node"),
        }
        self
    }

    /// Append a sub-expression. Ignored (with a warning) on tag nodes.
    pub fn add_expr(mut self, expr: TagQueryExpr) -> Self {
        match self.exprs_mut() {
            Some(exprs) => exprs.push(expr),
            None => warn!("cannot add an expression to a tag-list query node"),
        }
        self
    }

    pub fn expr_type(&self) -> TagQueryExprType {
        match self {
            Self::AnyTagsMatch(_) => TagQueryExprType::AnyTagsMatch,
            Self::AllTagsMatch(_) => TagQueryExprType::AllTagsMatch,
            Self::NoTagsMatch(_) => TagQueryExprType::NoTagsMatch,
            Self::AnyExprMatch(_) => TagQueryExprType::AnyExprMatch,
            Self::AllExprMatch(_) => TagQueryExprType::AllExprMatch,
            Self::NoExprMatch(_) => TagQueryExprType::NoExprMatch,
        }
    }

    /// Tags of a tag node; empty for expression nodes.
    pub fn tags(&self) -> &[Tag] {
        match self {
            Self::AnyTagsMatch(tags) | Self::AllTagsMatch(tags) | Self::NoTagsMatch(tags) => tags,
            _ => &[],
        }
    }

    /// Children of an expression node; empty for tag nodes.
    pub fn exprs(&self) -> &[TagQueryExpr] {
        match self {
            Self::AnyExprMatch(exprs) | Self::AllExprMatch(exprs) | Self::NoExprMatch(exprs) => {
                exprs
            }
            _ => &[],
        }
    }

    fn tags_mut(&mut self) -> Option<&mut Vec<Tag>> {
        match self {
            Self::AnyTagsMatch(tags) | Self::AllTagsMatch(tags) | Self::NoTagsMatch(tags) => {
                Some(tags)
            }
            _ => None,
        }
    }

    fn exprs_mut(&mut self) -> Option<&mut Vec<TagQueryExpr>> {
        match self {
            Self::AnyExprMatch(exprs) | Self::AllExprMatch(exprs) | Self::NoExprMatch(exprs) => {
                Some(exprs)
            }
            _ => None,
        }
    }

    fn with_tags(ty: TagQueryExprType, tags: Vec<Tag>) -> Option<Self> {
        match ty {
            TagQueryExprType::AnyTagsMatch => Some(Self::AnyTagsMatch(tags)),
            TagQueryExprType::AllTagsMatch => Some(Self::AllTagsMatch(tags)),
            TagQueryExprType::NoTagsMatch => Some(Self::NoTagsMatch(tags)),
            _ => None,
        }
    }

    fn with_exprs(ty: TagQueryExprType, exprs: Vec<TagQueryExpr>) -> Option<Self> {
        match ty {
            TagQueryExprType::AnyExprMatch => Some(Self::AnyExprMatch(exprs)),
            TagQueryExprType::AllExprMatch => Some(Self::AllExprMatch(exprs)),
            TagQueryExprType::NoExprMatch => Some(Self::NoExprMatch(exprs)),
            _ => None,
        }
    }
}

/// Auto description: `ALL(ANY(A, B), NONE(C))`.
impl fmt::Display for TagQueryExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = match self.expr_type() {
            TagQueryExprType::AnyTagsMatch | TagQueryExprType::AnyExprMatch => "ANY",
            TagQueryExprType::AllTagsMatch | TagQueryExprType::AllExprMatch => "ALL",
            _ => "NONE",
        };
        write!(f, "{op}(")?;
        for (i, tag) in self.tags().iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{tag}")?;
        }
        for (i, expr) in self.exprs().iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{expr}")?;
        }
        f.write_str(")")
    }
}

// =============================================================================
// Compiled query
// =============================================================================

/// A compiled tag query.
///
/// The default value is the empty query, which matches nothing.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TagQuery {
    tag_dictionary: Vec<Tag>,
    token_stream: Vec<u8>,
    user_description: String,
    auto_description: String,
}

impl TagQuery {
    /// The empty query.
    pub const EMPTY: TagQuery = TagQuery {
        tag_dictionary: Vec::new(),
        token_stream: Vec::new(),
        user_description: String::new(),
        auto_description: String::new(),
    };

    /// Compile `expr`.
    ///
    /// # Errors
    ///
    /// - more than 255 distinct tags
    /// - a node with more than 255 elements
    /// - nesting deeper than [`MAX_QUERY_DEPTH`]
    pub fn build(expr: &TagQueryExpr, user_description: impl Into<String>) -> Result<Self, QueryError> {
        let mut compiler = Compiler::default();
        compiler.stream.push(TAG_QUERY_STREAM_VERSION);
        compiler.stream.push(1);
        compiler.write_expr(expr, 1)?;

        Ok(Self {
            tag_dictionary: compiler.dictionary,
            token_stream: compiler.stream,
            user_description: user_description.into(),
            auto_description: expr.to_string(),
        })
    }

    /// Compile `expr` without a user description.
    #[inline]
    pub fn build_query(expr: &TagQueryExpr) -> Result<Self, QueryError> {
        Self::build(expr, String::new())
    }

    /// Query matching containers with any tag of `tags`.
    pub fn make_query_match_any_tags(tags: &TagContainer) -> Result<Self, QueryError> {
        Self::build_query(&TagQueryExpr::any_tags_match().add_tags(tags))
    }

    /// Query matching containers with every tag of `tags`.
    pub fn make_query_match_all_tags(tags: &TagContainer) -> Result<Self, QueryError> {
        Self::build_query(&TagQueryExpr::all_tags_match().add_tags(tags))
    }

    /// Query matching containers with none of `tags`.
    pub fn make_query_match_no_tags(tags: &TagContainer) -> Result<Self, QueryError> {
        Self::build_query(&TagQueryExpr::no_tags_match().add_tags(tags))
    }

    /// Wrap an already compiled stream, e.g. one received from elsewhere.
    ///
    /// The stream is not validated here; a malformed stream makes
    /// [`matches`](Self::matches) return `false`.
    pub fn from_token_stream(tag_dictionary: Vec<Tag>, token_stream: Vec<u8>) -> Self {
        let mut query = Self {
            tag_dictionary,
            token_stream,
            user_description: String::new(),
            auto_description: String::new(),
        };
        query.refresh_auto_description();
        query
    }

    /// Evaluate against `container`.
    ///
    /// Returns `false` for the empty query and for malformed streams.
    pub fn matches(&self, container: &TagContainer) -> bool {
        if self.token_stream.is_empty() {
            return false;
        }
        let mut reader = TokenReader::new(&self.token_stream, &self.tag_dictionary);
        reader.evaluate(container)
    }

    /// Decode the stream back into an expression tree.
    ///
    /// `None` for the empty query and for malformed streams.
    pub fn query_expr(&self) -> Option<TagQueryExpr> {
        if self.token_stream.is_empty() {
            return None;
        }
        TokenReader::new(&self.token_stream, &self.tag_dictionary).decode()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.token_stream.is_empty()
    }

    pub fn clear(&mut self) {
        *self = Self::EMPTY;
    }

    /// User description if set, else the generated one.
    pub fn description(&self) -> &str {
        if self.user_description.is_empty() {
            &self.auto_description
        } else {
            &self.user_description
        }
    }

    #[inline]
    pub fn user_description(&self) -> &str {
        &self.user_description
    }

    #[inline]
    pub fn auto_description(&self) -> &str {
        &self.auto_description
    }

    pub fn set_user_description(&mut self, description: impl Into<String>) {
        self.user_description = description.into();
    }

    #[inline]
    pub fn tag_dictionary(&self) -> &[Tag] {
        &self.tag_dictionary
    }

    #[inline]
    pub fn token_stream(&self) -> &[u8] {
        &self.token_stream
    }

    /// Swap the dictionary for `tags`, keeping the query logic.
    ///
    /// Fails (returns `false`, query untouched) when the sizes differ.
    pub fn replace_tags_fast(&mut self, tags: &TagContainer) -> bool {
        if tags.len() != self.tag_dictionary.len() {
            return false;
        }
        self.tag_dictionary = tags.tags().to_vec();
        self.refresh_auto_description();
        true
    }

    /// Swap a single-tag dictionary for `tag`.
    pub fn replace_tag_fast(&mut self, tag: Tag) -> bool {
        if self.tag_dictionary.len() != 1 {
            return false;
        }
        self.tag_dictionary[0] = tag;
        self.refresh_auto_description();
        true
    }

    /// Name-based form suitable for serde.
    pub fn to_serialized(&self) -> SerializedTagQuery {
        SerializedTagQuery {
            tag_dictionary: self.tag_dictionary.iter().map(|t| t.name().to_string()).collect(),
            token_stream: self.token_stream.clone(),
            user_description: self.user_description.clone(),
        }
    }

    /// Rebuild from the serialized form, resolving names through `registry`.
    ///
    /// Unknown names keep their dictionary slot as the invalid tag.
    pub fn from_serialized(serialized: &SerializedTagQuery, registry: &TagRegistry) -> Self {
        let report = registry.settings().warn_on_invalid_tags;
        let dictionary = serialized
            .tag_dictionary
            .iter()
            .map(|name| registry.request_tag(name, report))
            .collect();
        let mut query = Self::from_token_stream(dictionary, serialized.token_stream.clone());
        query.user_description = serialized.user_description.clone();
        query
    }

    fn refresh_auto_description(&mut self) {
        self.auto_description = self
            .query_expr()
            .map(|expr| expr.to_string())
            .unwrap_or_default();
    }
}

impl fmt::Display for TagQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Serde form of a [`TagQuery`]: dictionary by name plus the raw stream.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerializedTagQuery {
    pub tag_dictionary: Vec<String>,
    pub token_stream: Vec<u8>,
    pub user_description: String,
}

// =============================================================================
// Compiler
// =============================================================================

#[derive(Default)]
struct Compiler {
    dictionary: Vec<Tag>,
    stream: Vec<u8>,
}

impl Compiler {
    fn write_expr(&mut self, expr: &TagQueryExpr, depth: usize) -> Result<(), QueryError> {
        if depth > MAX_QUERY_DEPTH {
            return Err(QueryError::TooDeep { depth });
        }
        self.stream.push(expr.expr_type() as u8);

        let tags = expr.tags();
        let exprs = expr.exprs();
        let count = tags.len() + exprs.len();
        if count > MAX_ELEMENTS {
            return Err(QueryError::TooManyElements { count });
        }
        self.stream.push(count as u8);

        for tag in tags {
            let index = self.dictionary_index(tag)?;
            self.stream.push(index);
        }
        for child in exprs {
            self.write_expr(child, depth + 1)?;
        }
        Ok(())
    }

    fn dictionary_index(&mut self, tag: &Tag) -> Result<u8, QueryError> {
        let index = match self.dictionary.iter().position(|t| t == tag) {
            Some(index) => index,
            None => {
                if self.dictionary.len() >= MAX_DICTIONARY_LEN {
                    return Err(QueryError::TooManyTags {
                        count: self.dictionary.len() + 1,
                    });
                }
                self.dictionary.push(tag.clone());
                self.dictionary.len() - 1
            }
        };
        Ok(index as u8)
    }
}

// =============================================================================
// Reader / evaluator
// =============================================================================

/// Cursor over a token stream. Out-of-range reads set `read_error` and yield 0.
struct TokenReader<'a> {
    stream: &'a [u8],
    dictionary: &'a [Tag],
    cursor: usize,
    read_error: bool,
}

impl<'a> TokenReader<'a> {
    fn new(stream: &'a [u8], dictionary: &'a [Tag]) -> Self {
        Self {
            stream,
            dictionary,
            cursor: 0,
            read_error: false,
        }
    }

    fn next_token(&mut self) -> u8 {
        match self.stream.get(self.cursor) {
            Some(&byte) => {
                self.cursor += 1;
                byte
            }
            None => {
                self.fail("unexpected end of stream");
                0
            }
        }
    }

    fn fail(&mut self, reason: &'static str) {
        if !self.read_error {
            warn!(
                reason,
                cursor = self.cursor,
                len = self.stream.len(),
                "error parsing tag query"
            );
        }
        self.read_error = true;
    }

    /// Read the header. `false` if the query has no root or is malformed.
    fn read_header(&mut self) -> bool {
        if self.next_token() != TAG_QUERY_STREAM_VERSION {
            self.fail("unsupported stream version");
            return false;
        }
        let has_root = self.next_token();
        !self.read_error && has_root != 0
    }

    fn finish(&mut self) -> bool {
        if !self.read_error && self.cursor != self.stream.len() {
            self.fail("trailing bytes after root expression");
        }
        !self.read_error
    }

    fn read_type(&mut self) -> Option<TagQueryExprType> {
        let byte = self.next_token();
        if self.read_error {
            return None;
        }
        match TagQueryExprType::from_u8(byte) {
            Some(TagQueryExprType::Undefined) | None => {
                self.fail("undefined expression type");
                None
            }
            some => some,
        }
    }

    fn read_tag(&mut self) -> Option<&'a Tag> {
        let index = self.next_token();
        if self.read_error {
            return None;
        }
        let dictionary = self.dictionary;
        let tag = dictionary.get(usize::from(index));
        if tag.is_none() {
            self.fail("tag index out of dictionary range");
        }
        tag
    }

    fn evaluate(&mut self, container: &TagContainer) -> bool {
        if !self.read_header() {
            return false;
        }
        let result = self.eval_expr(container, false, 1);
        self.finish() && result
    }

    fn eval_expr(&mut self, container: &TagContainer, skip: bool, depth: usize) -> bool {
        if depth > MAX_QUERY_DEPTH {
            self.fail("expression nesting too deep");
            return false;
        }
        let Some(ty) = self.read_type() else {
            return false;
        };
        if ty.uses_tags() {
            self.eval_tags(ty, container, skip)
        } else {
            self.eval_exprs(ty, container, skip, depth)
        }
    }

    fn eval_tags(&mut self, ty: TagQueryExprType, container: &TagContainer, mut skip: bool) -> bool {
        let count = self.next_token();
        let mut result = ty != TagQueryExprType::AnyTagsMatch;

        for _ in 0..count {
            let Some(tag) = self.read_tag() else {
                return false;
            };
            if skip {
                continue;
            }
            let has = container.has_tag(tag);
            match ty {
                TagQueryExprType::AnyTagsMatch if has => {
                    result = true;
                    skip = true;
                }
                TagQueryExprType::AllTagsMatch if !has => {
                    result = false;
                    skip = true;
                }
                TagQueryExprType::NoTagsMatch if has => {
                    result = false;
                    skip = true;
                }
                _ => {}
            }
        }
        result
    }

    fn eval_exprs(
        &mut self,
        ty: TagQueryExprType,
        container: &TagContainer,
        mut skip: bool,
        depth: usize,
    ) -> bool {
        let count = self.next_token();
        let mut result = ty != TagQueryExprType::AnyExprMatch;

        for _ in 0..count {
            let child = self.eval_expr(container, skip, depth + 1);
            if self.read_error {
                return false;
            }
            if skip {
                continue;
            }
            match ty {
                TagQueryExprType::AnyExprMatch if child => {
                    result = true;
                    skip = true;
                }
                TagQueryExprType::AllExprMatch if !child => {
                    result = false;
                    skip = true;
                }
                TagQueryExprType::NoExprMatch if child => {
                    result = false;
                    skip = true;
                }
                _ => {}
            }
        }
        result
    }

    fn decode(&mut self) -> Option<TagQueryExpr> {
        if !self.read_header() {
            return None;
        }
        let expr = self.decode_expr(1);
        if self.finish() { expr } else { None }
    }

    fn decode_expr(&mut self, depth: usize) -> Option<TagQueryExpr> {
        if depth > MAX_QUERY_DEPTH {
            self.fail("expression nesting too deep");
            return None;
        }
        let ty = self.read_type()?;
        let count = self.next_token();

        if ty.uses_tags() {
            let mut tags = Vec::with_capacity(usize::from(count));
            for _ in 0..count {
                tags.push(self.read_tag()?.clone());
            }
            TagQueryExpr::with_tags(ty, tags)
        } else {
            let mut exprs = Vec::with_capacity(usize::from(count));
            for _ in 0..count {
                exprs.push(self.decode_expr(depth + 1)?);
            }
            TagQueryExpr::with_exprs(ty, exprs)
        }
    }
}
