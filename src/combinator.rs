//! Backtracking parser combinators over the token stream
//!
//! Every combinator takes the token slice and a start index and produces an
//! [`Outcome`] with three channels:
//!
//! | Variant     | Meaning                                                   |
//! |-------------|-----------------------------------------------------------|
//! | `NoMatch`   | Ordinary failure. Drives backtracking in `one_of`/`many`/`maybe` |
//! | `Matched`   | Success, tagged with the half-open token range consumed   |
//! | `Committed` | A diagnostic raised once the grammar committed to a branch |
//!
//! `one_of` keeps trying later alternatives after a committed error and only
//! surfaces the last one if nothing matched. `maybe` swallows committed
//! errors. `required` turns `NoMatch` into a committed error.
//!
//! Rules are plain data behind an `Arc`, so grammars can be shared across
//! threads and recursive rules can be tied together with [`later`].
//! Alternations have identity (the `Arc` pointer), which is what
//! [`Parser::except`] filters on to keep left-recursive rules from calling
//! themselves in leftmost position.

use serde::Serialize;
use std::fmt;
use std::sync::{Arc, OnceLock};

use crate::error::SpannedError;
use crate::lexer::{Token, TokenTag};

/// Half-open range of token indices; an empty match has `start == end`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub struct TokenRange {
    pub start: usize,
    pub end: usize,
}

impl TokenRange {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Zero-width range at `at`
    pub fn empty(at: usize) -> Self {
        Self { start: at, end: at }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A successful parse and the tokens it consumed
#[derive(Debug, Clone, PartialEq)]
pub struct Parsed<T> {
    pub range: TokenRange,
    pub value: T,
}

impl<T> Parsed<T> {
    pub fn new(range: TokenRange, value: T) -> Self {
        Self { range, value }
    }
}

/// Result of running a combinator
#[derive(Debug)]
pub enum Outcome<T> {
    NoMatch,
    Matched(Parsed<T>),
    Committed(SpannedError),
}

impl<T> Outcome<T> {
    pub fn is_match(&self) -> bool {
        matches!(self, Outcome::Matched(_))
    }

    pub fn matched(self) -> Option<Parsed<T>> {
        match self {
            Outcome::Matched(parsed) => Some(parsed),
            _ => None,
        }
    }
}

/// Payloads a grammar's combinators can produce
///
/// The framework needs to represent a bare success, a run of matched
/// characters, the list produced by `many` and the option produced by
/// `maybe`; everything else is up to the grammar's builders.
pub trait Payload: Sized + 'static {
    fn unit() -> Self;
    fn text(text: String) -> Self;
    fn repeat(items: Vec<Parsed<Self>>) -> Self;
    fn optional(item: Option<Parsed<Self>>) -> Self;
}

/// Builder result: `Ok(None)` declines the match, `Err` commits
pub type Build<T> = Result<Option<T>, SpannedError>;

type BuildFn<T> = dyn Fn(TokenRange, Vec<Parsed<T>>) -> Build<T> + Send + Sync;
type MapFn<T> = dyn Fn(Parsed<T>) -> Build<T> + Send + Sync;
type ReasonFn = dyn Fn(&[Token], usize) -> String + Send + Sync;
type TerminalFn<T> = dyn Fn(&[Token], usize) -> Outcome<T> + Send + Sync;

enum Rule<T> {
    Match(TokenTag),
    Sequence {
        parts: Vec<Parser<T>>,
        build: Option<Box<BuildFn<T>>>,
    },
    OneOf(Vec<Parser<T>>),
    Many(Parser<T>),
    Maybe(Parser<T>),
    Required {
        inner: Parser<T>,
        reason: Box<ReasonFn>,
    },
    Later(OnceLock<Parser<T>>),
    Except {
        target: Parser<T>,
        excluded: Vec<Parser<T>>,
        view: OnceLock<Result<Parser<T>, String>>,
    },
    Map {
        inner: Parser<T>,
        f: Box<MapFn<T>>,
    },
    Named {
        name: &'static str,
        inner: Parser<T>,
    },
    Terminal(Box<TerminalFn<T>>),
}

impl<T> Rule<T> {
    fn label(&self) -> &'static str {
        match self {
            Rule::Match(_) => "match",
            Rule::Sequence { .. } => "sequence",
            Rule::OneOf(_) => "one_of",
            Rule::Many(_) => "many",
            Rule::Maybe(_) => "maybe",
            Rule::Required { .. } => "required",
            Rule::Later(_) => "later",
            Rule::Except { .. } => "except",
            Rule::Map { .. } => "map",
            Rule::Named { name, .. } => *name,
            Rule::Terminal(_) => "terminal",
        }
    }
}

/// Shared handle to a combinator
pub struct Parser<T>(Arc<Rule<T>>);

impl<T> Clone for Parser<T> {
    fn clone(&self) -> Self {
        Parser(Arc::clone(&self.0))
    }
}

impl<T> fmt::Debug for Parser<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Parser({})", self.0.label())
    }
}

impl<T: Payload> Parser<T> {
    fn from_rule(rule: Rule<T>) -> Self {
        Parser(Arc::new(rule))
    }

    /// Build a terminal from a raw parsing function
    pub fn terminal(
        f: impl Fn(&[Token], usize) -> Outcome<T> + Send + Sync + 'static,
    ) -> Self {
        Self::from_rule(Rule::Terminal(Box::new(f)))
    }

    /// Install the rule behind a forward declaration made with [`later`]
    ///
    /// A cell can only be defined once; later definitions are ignored.
    pub fn define(&self, rule: Parser<T>) {
        match &*self.0 {
            Rule::Later(cell) => {
                if cell.set(rule).is_err() {
                    tracing::error!(target: "jtl::parse", "forward rule defined twice");
                }
            }
            other => {
                tracing::error!(target: "jtl::parse", rule = other.label(), "define called on a rule that is not a forward declaration");
            }
        }
    }

    /// An alternation identical to this one minus the `excluded` branches
    ///
    /// Works on `one_of` rules directly and on forward declarations whose
    /// installed rule is a `one_of`. For forward declarations the view is
    /// built on first use, since the rule may not be installed yet.
    pub fn except(&self, excluded: &[&Parser<T>]) -> Parser<T> {
        let excluded: Vec<Parser<T>> = excluded.iter().map(|p| (*p).clone()).collect();
        match &*self.0 {
            Rule::OneOf(parts) => one_of(filter_parts(parts, &excluded)),
            _ => Self::from_rule(Rule::Except {
                target: self.clone(),
                excluded,
                view: OnceLock::new(),
            }),
        }
    }

    /// Follow forward declarations and names to the underlying rule
    fn resolved(&self) -> Option<Parser<T>> {
        match &*self.0 {
            Rule::Later(cell) => cell.get().and_then(|p| p.resolved()),
            Rule::Named { inner, .. } => inner.resolved(),
            _ => Some(self.clone()),
        }
    }

    /// Run the combinator at `start`
    pub fn parse(&self, tokens: &[Token], start: usize) -> Outcome<T> {
        match &*self.0 {
            Rule::Match(tag) => match tokens.get(start) {
                Some(token) if token.kind.tag() == *tag => {
                    Outcome::Matched(Parsed::new(TokenRange::new(start, start + 1), T::unit()))
                }
                _ => Outcome::NoMatch,
            },

            Rule::Sequence { parts, build } => {
                let mut position = start;
                let mut results = Vec::with_capacity(parts.len());
                for part in parts {
                    match part.parse(tokens, position) {
                        Outcome::Matched(parsed) => {
                            position = parsed.range.end;
                            results.push(parsed);
                        }
                        Outcome::NoMatch => return Outcome::NoMatch,
                        Outcome::Committed(err) => return Outcome::Committed(err),
                    }
                }

                let range = TokenRange::new(start, position);
                match build {
                    None => Outcome::Matched(Parsed::new(range, T::unit())),
                    Some(build) => match build(range, results) {
                        Ok(Some(value)) => Outcome::Matched(Parsed::new(range, value)),
                        Ok(None) => Outcome::NoMatch,
                        Err(err) => Outcome::Committed(err),
                    },
                }
            }

            Rule::OneOf(parts) => {
                let mut last_error = None;
                for part in parts {
                    match part.parse(tokens, start) {
                        Outcome::Matched(parsed) => return Outcome::Matched(parsed),
                        Outcome::NoMatch => {}
                        Outcome::Committed(err) => last_error = Some(err),
                    }
                }
                match last_error {
                    Some(err) => Outcome::Committed(err),
                    None => Outcome::NoMatch,
                }
            }

            Rule::Many(inner) => {
                let mut position = start;
                let mut items = Vec::new();
                loop {
                    match inner.parse(tokens, position) {
                        Outcome::Matched(parsed) => {
                            // A zero-width match would repeat forever
                            if parsed.range.is_empty() {
                                break;
                            }
                            position = parsed.range.end;
                            items.push(parsed);
                        }
                        Outcome::NoMatch => break,
                        Outcome::Committed(err) => return Outcome::Committed(err),
                    }
                }
                Outcome::Matched(Parsed::new(
                    TokenRange::new(start, position),
                    T::repeat(items),
                ))
            }

            Rule::Maybe(inner) => match inner.parse(tokens, start) {
                Outcome::Matched(parsed) => {
                    let range = parsed.range;
                    Outcome::Matched(Parsed::new(range, T::optional(Some(parsed))))
                }
                Outcome::NoMatch | Outcome::Committed(_) => {
                    Outcome::Matched(Parsed::new(TokenRange::empty(start), T::optional(None)))
                }
            },

            Rule::Required { inner, reason } => match inner.parse(tokens, start) {
                Outcome::Matched(parsed) => Outcome::Matched(parsed),
                Outcome::NoMatch => Outcome::Committed(SpannedError::syntax(
                    reason(tokens, start),
                    TokenRange::empty(start),
                )),
                Outcome::Committed(err) => {
                    Outcome::Committed(SpannedError::rewrap(reason(tokens, start), err))
                }
            },

            Rule::Later(cell) => match cell.get() {
                Some(rule) => rule.parse(tokens, start),
                None => Outcome::Committed(SpannedError::internal(
                    "uninitialized forward rule",
                    TokenRange::empty(start),
                )),
            },

            Rule::Except {
                target,
                excluded,
                view,
            } => {
                let view = view.get_or_init(|| exclusion_view(target, excluded));
                match view {
                    Ok(rule) => rule.parse(tokens, start),
                    Err(message) => Outcome::Committed(SpannedError::internal(
                        message.clone(),
                        TokenRange::empty(start),
                    )),
                }
            }

            Rule::Map { inner, f } => match inner.parse(tokens, start) {
                Outcome::Matched(parsed) => {
                    let range = parsed.range;
                    match f(parsed) {
                        Ok(Some(value)) => Outcome::Matched(Parsed::new(range, value)),
                        Ok(None) => Outcome::NoMatch,
                        Err(err) => Outcome::Committed(err),
                    }
                }
                other => other,
            },

            Rule::Named { name, inner } => {
                let outcome = inner.parse(tokens, start);
                match &outcome {
                    Outcome::Matched(parsed) => {
                        tracing::trace!(target: "jtl::parse", rule = *name, start, end = parsed.range.end, "matched");
                    }
                    Outcome::Committed(err) => {
                        tracing::trace!(target: "jtl::parse", rule = *name, start, error = %err.message, "committed");
                    }
                    Outcome::NoMatch => {}
                }
                outcome
            }

            Rule::Terminal(f) => f(tokens, start),
        }
    }
}

fn filter_parts<T>(parts: &[Parser<T>], excluded: &[Parser<T>]) -> Vec<Parser<T>> {
    parts
        .iter()
        .filter(|p| !excluded.iter().any(|e| Arc::ptr_eq(&p.0, &e.0)))
        .cloned()
        .collect()
}

fn exclusion_view<T: Payload>(
    target: &Parser<T>,
    excluded: &[Parser<T>],
) -> Result<Parser<T>, String> {
    let resolved = target
        .resolved()
        .ok_or_else(|| "cannot call except on an uninitialized forward rule".to_string())?;
    match &*resolved.0 {
        Rule::OneOf(parts) => Ok(one_of(filter_parts(parts, excluded))),
        other => Err(format!("{} rule does not support except", other.label())),
    }
}

/// Succeeds on a single token carrying `tag`
pub fn match_tag<T: Payload>(tag: TokenTag) -> Parser<T> {
    Parser::from_rule(Rule::Match(tag))
}

/// Run `parts` left to right; the whole sequence fails if any part fails
pub fn sequence<T: Payload>(parts: Vec<Parser<T>>) -> Parser<T> {
    Parser::from_rule(Rule::Sequence { parts, build: None })
}

/// Like [`sequence`], assembling the payload from every part's result
pub fn sequence_with<T: Payload>(
    parts: Vec<Parser<T>>,
    build: impl Fn(TokenRange, Vec<Parsed<T>>) -> Build<T> + Send + Sync + 'static,
) -> Parser<T> {
    Parser::from_rule(Rule::Sequence {
        parts,
        build: Some(Box::new(build)),
    })
}

/// Ordered choice
pub fn one_of<T: Payload>(parts: Vec<Parser<T>>) -> Parser<T> {
    Parser::from_rule(Rule::OneOf(parts))
}

/// Zero or more repetitions; always succeeds
pub fn many<T: Payload>(inner: Parser<T>) -> Parser<T> {
    Parser::from_rule(Rule::Many(inner))
}

/// Optional match; always succeeds, never propagates committed errors
pub fn maybe<T: Payload>(inner: Parser<T>) -> Parser<T> {
    Parser::from_rule(Rule::Maybe(inner))
}

/// Turn an ordinary failure of `inner` into a committed error
pub fn required<T: Payload>(
    inner: Parser<T>,
    reason: impl Fn(&[Token], usize) -> String + Send + Sync + 'static,
) -> Parser<T> {
    Parser::from_rule(Rule::Required {
        inner,
        reason: Box::new(reason),
    })
}

/// Forward declaration, installed afterwards with [`Parser::define`]
pub fn later<T: Payload>() -> Parser<T> {
    Parser::from_rule(Rule::Later(OnceLock::new()))
}

/// Transform a successful result; the range is kept
pub fn map<T: Payload>(
    inner: Parser<T>,
    f: impl Fn(Parsed<T>) -> Build<T> + Send + Sync + 'static,
) -> Parser<T> {
    Parser::from_rule(Rule::Map {
        inner,
        f: Box::new(f),
    })
}

/// Label a rule for trace output
pub fn named<T: Payload>(name: &'static str, inner: Parser<T>) -> Parser<T> {
    Parser::from_rule(Rule::Named { name, inner })
}
