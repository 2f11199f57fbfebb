//! Property-style text form of tags and containers.
//!
//! ```text
//! Tag:        (TagName="Effect.Damage")
//! Container:  (Tags=("Effect.Damage","Status.Stunned"))
//! Empty:      (Tags=())
//! ```
//!
//! Import is lenient: items may be quoted, bare, or written in the single tag
//! form, whitespace and a trailing comma are accepted, and unknown names are
//! dropped (with a warning when `warn_on_invalid_tags` is set). Names go
//! through [`TagRegistry::request_tag`], so redirects apply on import.

use tracing::warn;

use crate::container::TagContainer;
use crate::error::TextError;
use crate::registry::TagRegistry;
use crate::tag::Tag;

const TAGS_KEY: &str = "Tags";
const TAG_NAME_KEY: &str = "TagName";
const NONE_NAME: &str = "None";

impl Tag {
    /// `(TagName="A.B")`, or `(TagName="None")` for the invalid tag.
    pub fn to_text(&self) -> String {
        let name = if self.is_valid() { self.name() } else { NONE_NAME };
        format!("({TAG_NAME_KEY}=\"{name}\")")
    }
}

impl TagContainer {
    /// `(Tags=("A","B"))` with the explicit tags in container order.
    pub fn to_text(&self) -> String {
        let mut out = format!("({TAGS_KEY}=(");
        for (i, tag) in self.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            out.push('"');
            out.push_str(tag.name());
            out.push('"');
        }
        out.push_str("))");
        out
    }

    /// Parse the output of [`to_text`](Self::to_text).
    ///
    /// # Errors
    ///
    /// Only for malformed syntax. Unknown tag names are skipped.
    pub fn from_text(text: &str, registry: &TagRegistry) -> Result<Self, TextError> {
        let mut parser = Parser::new(text);
        parser.expect('(')?;
        parser.expect_key(TAGS_KEY)?;
        parser.expect('=')?;
        parser.expect('(')?;

        let mut names = Vec::new();
        while !parser.eat(')') {
            names.push(parser.item()?);
            if !parser.eat(',') {
                parser.expect(')')?;
                break;
            }
        }

        parser.expect(')')?;
        parser.end()?;
        Ok(Self::from_names(names, registry))
    }

    /// Resolve `names` through `registry`, skipping unknown and `None` names.
    pub fn from_names<I, S>(names: I, registry: &TagRegistry) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let report = registry.settings().warn_on_invalid_tags;
        let mut container = Self::new();
        for name in names {
            let name = name.as_ref();
            if name.is_empty() || name == NONE_NAME {
                continue;
            }
            let tag = registry.request_tag(name, false);
            if tag.is_valid() {
                container.add_tag(tag);
            } else if report {
                warn!(tag = %name, "ignoring unknown gameplay tag");
            }
        }
        container
    }
}

impl TagRegistry {
    /// Parse a single tag: `A.B`, `"A.B"` or `(TagName="A.B")`.
    ///
    /// Empty text and `None` give the invalid tag.
    ///
    /// # Errors
    ///
    /// Malformed syntax, or a name that is neither registered nor redirected.
    pub fn tag_from_text(&self, text: &str) -> Result<Tag, TextError> {
        let mut parser = Parser::new(text);
        if parser.at_end() {
            return Ok(Tag::EMPTY);
        }
        let name = parser.item()?;
        parser.end()?;

        if name.is_empty() || name == NONE_NAME {
            return Ok(Tag::EMPTY);
        }
        let tag = self.request_tag(&name, false);
        if tag.is_valid() {
            Ok(tag)
        } else {
            Err(TextError::UnknownTag { name })
        }
    }
}

// =============================================================================
// Parser
// =============================================================================

struct Parser<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(text: &'a str) -> Self {
        Self { text, pos: 0 }
    }

    fn rest(&self) -> &'a str {
        &self.text[self.pos..]
    }

    fn skip_ws(&mut self) {
        let rest = self.rest();
        self.pos += rest.len() - rest.trim_start().len();
    }

    fn at_end(&mut self) -> bool {
        self.skip_ws();
        self.pos >= self.text.len()
    }

    fn peek(&mut self) -> Option<char> {
        self.skip_ws();
        self.rest().chars().next()
    }

    fn eat(&mut self, c: char) -> bool {
        if self.peek() == Some(c) {
            self.pos += c.len_utf8();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, c: char) -> Result<(), TextError> {
        if self.eat(c) {
            return Ok(());
        }
        Err(TextError::Expected {
            expected: match c {
                '(' => "'('",
                ')' => "')'",
                '=' => "'='",
                ',' => "','",
                _ => "a delimiter",
            },
            offset: self.pos,
        })
    }

    fn expect_key(&mut self, key: &'static str) -> Result<(), TextError> {
        self.skip_ws();
        if self.rest().starts_with(key) {
            self.pos += key.len();
            Ok(())
        } else {
            Err(TextError::Expected {
                expected: key,
                offset: self.pos,
            })
        }
    }

    fn end(&mut self) -> Result<(), TextError> {
        if self.at_end() {
            Ok(())
        } else {
            Err(TextError::TrailingInput { offset: self.pos })
        }
    }

    /// A tag name in any accepted form.
    fn item(&mut self) -> Result<String, TextError> {
        match self.peek() {
            Some('"') => self.quoted(),
            Some('(') => {
                self.expect('(')?;
                self.expect_key(TAG_NAME_KEY)?;
                self.expect('=')?;
                let name = match self.peek() {
                    Some('"') => self.quoted()?,
                    _ => self.bare()?,
                };
                self.expect(')')?;
                Ok(name)
            }
            _ => self.bare(),
        }
    }

    fn quoted(&mut self) -> Result<String, TextError> {
        let start = self.pos;
        self.pos += 1;
        let mut out = String::new();
        let mut chars = self.rest().char_indices();
        while let Some((i, c)) = chars.next() {
            match c {
                '"' => {
                    self.pos += i + 1;
                    return Ok(out);
                }
                '\\' => match chars.next() {
                    Some((_, escaped)) => out.push(escaped),
                    None => break,
                },
                _ => out.push(c),
            }
        }
        Err(TextError::UnterminatedString { offset: start })
    }

    fn bare(&mut self) -> Result<String, TextError> {
        self.skip_ws();
        let rest = self.rest();
        let len = rest
            .find(|c: char| c.is_whitespace() || matches!(c, ',' | '(' | ')' | '"' | '='))
            .unwrap_or(rest.len());
        if len == 0 {
            return Err(TextError::Expected {
                expected: "a tag name",
                offset: self.pos,
            });
        }
        self.pos += len;
        Ok(rest[..len].to_string())
    }
}
