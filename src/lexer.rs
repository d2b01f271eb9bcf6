//! Lexer module for JTL - flattens a JSON document into a token stream
//!
//! This module provides the first phase of template compilation:
//! 1. Lexer: JSON document → Token stream (with structural paths)
//! 2. Grammar: Token stream → AST
//!
//! Every token remembers where in the document it came from, so that a
//! token range reported by the parser or evaluator can be turned back
//! into a human readable location.

use serde::Serialize;
use serde_json::{Number, Value};
use std::fmt;
use std::sync::Arc;

/// One step of a structural path
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(untagged)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Key(key) => write!(f, "{}", key),
            PathSegment::Index(index) => write!(f, "{}", index),
        }
    }
}

/// Whether a path addresses an object key or the value stored under it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PathRole {
    Key,
    Value,
}

/// Location of a token's origin inside the input document
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
pub struct JsonPath {
    pub segments: Vec<PathSegment>,
    pub role: Option<PathRole>,
}

impl JsonPath {
    /// The path of the document root
    pub fn root() -> Self {
        Self::default()
    }

    /// Extend the path by one segment; the new path takes the given role
    pub fn child(&self, segment: PathSegment, role: Option<PathRole>) -> Self {
        let mut segments = self.segments.clone();
        segments.push(segment);
        Self { segments, role }
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Dotted rendering, e.g. `users.0.name`
    pub fn dotted(&self) -> String {
        self.segments
            .iter()
            .map(|s| s.to_string())
            .collect::<Vec<_>>()
            .join(".")
    }
}

impl fmt::Display for JsonPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            write!(f, "<root>")
        } else {
            write!(f, "{}", self.dotted())
        }
    }
}

/// Payload-free token discriminant, used by `match_tag`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TokenTag {
    ObjectStart,
    ObjectEnd,
    ObjectEntryStart,
    ObjectEntryEnd,
    ObjectKeyStart,
    ObjectKeyEnd,
    ValueStart,
    ValueEnd,
    ArrayStart,
    ArrayEnd,
    ArrayEntryStart,
    ArrayEntryEnd,
    StringStart,
    StringEnd,
    Char,
    Number,
    Bool,
    Null,
}

/// Token types
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum TokenKind {
    // Containers
    ObjectStart,
    ObjectEnd,
    ObjectEntryStart,
    ObjectEntryEnd,
    ObjectKeyStart,
    ObjectKeyEnd,
    ValueStart,
    ValueEnd,
    ArrayStart,
    ArrayEnd,
    ArrayEntryStart,
    ArrayEntryEnd,

    // Strings are spelled out one character at a time
    StringStart,
    Char(char),
    StringEnd,

    // Scalars
    Number(Number),
    Bool(bool),
    Null,
}

impl TokenKind {
    pub fn tag(&self) -> TokenTag {
        match self {
            TokenKind::ObjectStart => TokenTag::ObjectStart,
            TokenKind::ObjectEnd => TokenTag::ObjectEnd,
            TokenKind::ObjectEntryStart => TokenTag::ObjectEntryStart,
            TokenKind::ObjectEntryEnd => TokenTag::ObjectEntryEnd,
            TokenKind::ObjectKeyStart => TokenTag::ObjectKeyStart,
            TokenKind::ObjectKeyEnd => TokenTag::ObjectKeyEnd,
            TokenKind::ValueStart => TokenTag::ValueStart,
            TokenKind::ValueEnd => TokenTag::ValueEnd,
            TokenKind::ArrayStart => TokenTag::ArrayStart,
            TokenKind::ArrayEnd => TokenTag::ArrayEnd,
            TokenKind::ArrayEntryStart => TokenTag::ArrayEntryStart,
            TokenKind::ArrayEntryEnd => TokenTag::ArrayEntryEnd,
            TokenKind::StringStart => TokenTag::StringStart,
            TokenKind::Char(_) => TokenTag::Char,
            TokenKind::StringEnd => TokenTag::StringEnd,
            TokenKind::Number(_) => TokenTag::Number,
            TokenKind::Bool(_) => TokenTag::Bool,
            TokenKind::Null => TokenTag::Null,
        }
    }

    /// The character carried by a `Char` token
    pub fn as_char(&self) -> Option<char> {
        match self {
            TokenKind::Char(c) => Some(*c),
            _ => None,
        }
    }
}

/// A token with the structural path it was produced from
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Token {
    pub kind: TokenKind,
    pub path: JsonPath,
    /// For `Char` tokens, the enclosing string and this character's byte
    /// offset in it
    #[serde(skip)]
    pub source: Option<(Arc<str>, usize)>,
}

impl Token {
    /// The text of this token's string from this character onwards; empty
    /// for tokens that are not characters
    pub fn rest(&self) -> &str {
        match &self.source {
            Some((text, offset)) => text.get(*offset..).unwrap_or_default(),
            None => "",
        }
    }
}

/// Lexer that converts a JSON document to tokens
pub struct Lexer<'a> {
    document: &'a Value,
    tokens: Vec<Token>,
}

impl<'a> Lexer<'a> {
    /// Create a new lexer for the given document
    pub fn new(document: &'a Value) -> Self {
        Self {
            document,
            tokens: Vec::new(),
        }
    }

    /// Tokenize the whole document
    pub fn tokenize(mut self) -> Vec<Token> {
        self.push_value(self.document, JsonPath::root());
        self.tokens
    }

    fn push(&mut self, kind: TokenKind, path: &JsonPath) {
        self.tokens.push(Token {
            kind,
            path: path.clone(),
            source: None,
        });
    }

    fn push_value(&mut self, value: &Value, path: JsonPath) {
        match value {
            Value::String(s) => self.push_string(s, &path),
            Value::Number(n) => self.push(TokenKind::Number(n.clone()), &path),
            Value::Bool(b) => self.push(TokenKind::Bool(*b), &path),
            Value::Null => self.push(TokenKind::Null, &path),
            Value::Array(items) => {
                self.push(TokenKind::ArrayStart, &path);
                for (i, item) in items.iter().enumerate() {
                    self.push(TokenKind::ArrayEntryStart, &path);
                    self.push_value(item, path.child(PathSegment::Index(i), None));
                    self.push(TokenKind::ArrayEntryEnd, &path);
                }
                self.push(TokenKind::ArrayEnd, &path);
            }
            Value::Object(map) => {
                self.push(TokenKind::ObjectStart, &path);
                for (key, item) in map {
                    let segment = PathSegment::Key(key.clone());
                    self.push(TokenKind::ObjectEntryStart, &path);
                    self.push(TokenKind::ObjectKeyStart, &path);
                    self.push_string(key, &path.child(segment.clone(), Some(PathRole::Key)));
                    self.push(TokenKind::ObjectKeyEnd, &path);
                    self.push(TokenKind::ValueStart, &path);
                    self.push_value(item, path.child(segment, Some(PathRole::Value)));
                    self.push(TokenKind::ValueEnd, &path);
                    self.push(TokenKind::ObjectEntryEnd, &path);
                }
                self.push(TokenKind::ObjectEnd, &path);
            }
        }
    }

    fn push_string(&mut self, s: &str, path: &JsonPath) {
        self.push(TokenKind::StringStart, path);
        let text: Arc<str> = Arc::from(s);
        for (i, (offset, c)) in s.char_indices().enumerate() {
            // Characters keep the role of their string
            self.tokens.push(Token {
                kind: TokenKind::Char(c),
                path: path.child(PathSegment::Index(i), path.role),
                source: Some((Arc::clone(&text), offset)),
            });
        }
        self.push(TokenKind::StringEnd, path);
    }
}

/// Convenience function to tokenize a document
pub fn to_tokens(document: &Value) -> Vec<Token> {
    Lexer::new(document).tokenize()
}

/// Look up the value a path points at, used to build error messages
///
/// Key paths resolve to the key name itself. Index segments that address
/// into a string (character positions) stop at the string.
pub fn value_at_path(path: &JsonPath, document: &Value) -> Option<Value> {
    if path.role == Some(PathRole::Key) {
        return path.segments.iter().rev().find_map(|segment| match segment {
            PathSegment::Key(key) => Some(Value::String(key.clone())),
            PathSegment::Index(_) => None,
        });
    }

    let mut current = document;
    for segment in &path.segments {
        match (segment, current) {
            (PathSegment::Index(i), Value::Array(items)) => current = items.get(*i)?,
            (PathSegment::Key(key), Value::Object(map)) => current = map.get(key)?,
            (PathSegment::Index(_), Value::String(_)) => break,
            _ => return None,
        }
    }
    Some(current.clone())
}
