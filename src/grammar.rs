//! The JTL grammar
//!
//! Defines the expression language embedded in `{{ }}` and how it sits
//! inside JSON strings, keys, arrays and objects. Everything here is built
//! from the primitives in [`crate::combinator`] and [`crate::text`].
//!
//! Left recursion is avoided with [`Parser::except`]: a rule that could
//! start with itself (comparison, math, nullish coalescing, parentheses)
//! takes its left operand from a view of the operand alternation with that
//! rule removed, so it has to consume an operand before recursing.
//!
//! The grammar is built once per process and shared (see [`grammar`]).

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Number;

use crate::ast::{
    CompareOp, Conditional, Entry, MathOp, Modifier, Node, NodeKind, PathPart, VariablePath,
};
use crate::combinator::{
    later, many, map, match_tag, maybe, named, one_of, required, sequence, sequence_with, Build,
    Outcome, Parsed, Parser, Payload, TokenRange,
};
use crate::error::SpannedError;
use crate::lexer::{Token, TokenKind, TokenTag};
use crate::text::{keyword, regexp, specific_char, specific_string, string_until};

/// Longest variable path accepted, counting the root identifier
pub const MAX_PATH_SEGMENTS: usize = 20;

const RESERVED_WORDS: [&str; 4] = ["true", "false", "null", "undefined"];

lazy_static! {
    static ref NUMBER_RE: Regex = Regex::new(r"^-?[0-9]+(\.[0-9]+)?").unwrap();
    static ref VARIABLE_RE: Regex =
        Regex::new(r"^[a-zA-Z_][0-9a-zA-Z_]*\??(?:\.[0-9a-zA-Z_]+\??|\['?[0-9a-zA-Z_\-:]+'?\]\??)*")
            .unwrap();
    static ref ROOT_SEGMENT_RE: Regex = Regex::new(r"^([a-zA-Z_][0-9a-zA-Z_]*)(\?)?").unwrap();
    static ref CHILD_SEGMENT_RE: Regex =
        Regex::new(r"^(?:\.([0-9a-zA-Z_]+)(\?)?|\['?([0-9a-zA-Z_\-:]+)'?\](\?)?)").unwrap();
    static ref DOUBLE_QUOTED_RE: Regex = Regex::new(r#"^"(?:[^"\\]|\\.)*""#).unwrap();
    static ref SINGLE_QUOTED_RE: Regex = Regex::new(r"^'(?:[^'\\]|\\.)*'").unwrap();
    static ref COMMENT_RE: Regex = Regex::new(r"^/\*.*?\*/").unwrap();
    static ref GRAMMAR: Grammar = Grammar::new();
}

/// Parse result payload of the JTL grammar
#[derive(Debug, Clone, PartialEq)]
pub enum Syntax {
    Unit,
    Text(String),
    Repeat(Vec<Parsed<Syntax>>),
    Optional(Option<Box<Parsed<Syntax>>>),
    Flatten,
    Node(Node),
    Entry(Entry),
}

impl Payload for Syntax {
    fn unit() -> Self {
        Syntax::Unit
    }

    fn text(text: String) -> Self {
        Syntax::Text(text)
    }

    fn repeat(items: Vec<Parsed<Self>>) -> Self {
        Syntax::Repeat(items)
    }

    fn optional(item: Option<Parsed<Self>>) -> Self {
        Syntax::Optional(item.map(Box::new))
    }
}

fn shape_error(expected: &str, range: TokenRange) -> SpannedError {
    SpannedError::internal(format!("grammar produced an unexpected shape, expected {}", expected), range)
}

impl Parsed<Syntax> {
    fn into_node(self) -> Result<Node, SpannedError> {
        match self.value {
            Syntax::Node(node) => Ok(node),
            _ => Err(shape_error("a node", self.range)),
        }
    }

    fn into_text(self) -> Result<String, SpannedError> {
        match self.value {
            Syntax::Text(text) => Ok(text),
            _ => Err(shape_error("text", self.range)),
        }
    }

    fn into_items(self) -> Result<Vec<Parsed<Syntax>>, SpannedError> {
        match self.value {
            Syntax::Repeat(items) => Ok(items),
            _ => Err(shape_error("a list", self.range)),
        }
    }

    fn into_option(self) -> Result<Option<Parsed<Syntax>>, SpannedError> {
        match self.value {
            Syntax::Optional(item) => Ok(item.map(|b| *b)),
            _ => Err(shape_error("an optional", self.range)),
        }
    }
}

/// Positional access to the results of a sequence
struct Parts {
    items: Vec<Option<Parsed<Syntax>>>,
    range: TokenRange,
}

impl Parts {
    fn new(range: TokenRange, items: Vec<Parsed<Syntax>>) -> Self {
        Self {
            items: items.into_iter().map(Some).collect(),
            range,
        }
    }

    fn take(&mut self, index: usize) -> Result<Parsed<Syntax>, SpannedError> {
        self.items
            .get_mut(index)
            .and_then(Option::take)
            .ok_or_else(|| shape_error(&format!("a part at position {}", index), self.range))
    }

    fn node(&mut self, index: usize) -> Result<Node, SpannedError> {
        self.take(index)?.into_node()
    }

    fn text(&mut self, index: usize) -> Result<String, SpannedError> {
        self.take(index)?.into_text()
    }

    fn items(&mut self, index: usize) -> Result<Vec<Parsed<Syntax>>, SpannedError> {
        self.take(index)?.into_items()
    }

    fn option(&mut self, index: usize) -> Result<Option<Parsed<Syntax>>, SpannedError> {
        self.take(index)?.into_option()
    }
}

type P = Parser<Syntax>;

fn node(kind: NodeKind, range: TokenRange) -> Build<Syntax> {
    Ok(Some(Syntax::Node(Node::new(kind, range))))
}

/// `required` with a fixed reason
fn must(inner: P, reason: &'static str) -> P {
    required(inner, move |_, _| reason.to_string())
}

/// A raw JSON scalar token (number, boolean or null)
fn scalar_token(tag: TokenTag) -> P {
    Parser::terminal(move |tokens: &[Token], start| {
        let kind = match tokens.get(start).map(|t| &t.kind) {
            Some(TokenKind::Number(n)) if tag == TokenTag::Number => NodeKind::Number(n.clone()),
            Some(TokenKind::Bool(b)) if tag == TokenTag::Bool => NodeKind::Bool(*b),
            Some(TokenKind::Null) if tag == TokenTag::Null => NodeKind::Null,
            _ => return Outcome::NoMatch,
        };
        let range = TokenRange::new(start, start + 1);
        Outcome::Matched(Parsed::new(range, Syntax::Node(Node::new(kind, range))))
    })
}

fn parse_number(text: &str, range: TokenRange) -> Build<Syntax> {
    let number = if text.contains('.') {
        text.parse::<f64>().ok().and_then(Number::from_f64)
    } else {
        match text.parse::<i64>() {
            Ok(i) => Some(Number::from(i)),
            Err(_) => text.parse::<f64>().ok().and_then(Number::from_f64),
        }
    };
    match number {
        Some(n) => node(NodeKind::Number(n), range),
        None => Err(SpannedError::syntax(format!("Invalid number: {}", text), range)),
    }
}

fn parse_variable(text: &str, range: TokenRange) -> Build<Syntax> {
    if RESERVED_WORDS.contains(&text) {
        return Ok(None);
    }

    let invalid = || SpannedError::syntax(format!("Unable to parse variable path: {}", text), range);

    let root = ROOT_SEGMENT_RE.captures(text).ok_or_else(invalid)?;
    let mut parts = vec![PathPart {
        name: root[1].to_string(),
        optional: root.get(2).is_some(),
    }];
    let mut position = root[0].len();

    while position < text.len() {
        let rest = &text[position..];
        let child = CHILD_SEGMENT_RE.captures(rest).ok_or_else(invalid)?;
        let (name, optional) = match (child.get(1), child.get(3)) {
            (Some(dotted), _) => (dotted.as_str(), child.get(2).is_some()),
            (None, Some(bracketed)) => (bracketed.as_str(), child.get(4).is_some()),
            (None, None) => return Err(invalid()),
        };
        parts.push(PathPart {
            name: name.to_string(),
            optional,
        });
        position += child[0].len();

        if parts.len() > MAX_PATH_SEGMENTS {
            return Err(SpannedError::syntax(
                "Unable to parse variable path: too many layers deep",
                range,
            ));
        }
    }

    node(NodeKind::Path(VariablePath::new(parts)), range)
}

/// Strip the quotes of a quoted string and resolve backslash escapes
fn unquote(quoted: &str) -> String {
    let inner = quoted
        .get(1..quoted.len().saturating_sub(1))
        .unwrap_or_default();
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some(escaped @ ('\\' | '\'' | '"')) => out.push(escaped),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

/// The compiled JTL grammar
pub struct Grammar {
    /// A whole document: template string, scalar, array or object
    pub document: P,
}

impl Grammar {
    pub fn new() -> Self {
        // Whitespace and literals
        let whitespace_char = one_of(vec![
            specific_char(' '),
            specific_char('\t'),
            specific_char('\n'),
            specific_char('\r'),
        ]);
        let ws = named("whitespace", many(whitespace_char));

        let null_value = named(
            "null",
            map(keyword("null"), |p| node(NodeKind::Null, p.range)),
        );
        let undefined_value = named(
            "undefined",
            map(keyword("undefined"), |p| node(NodeKind::Undefined, p.range)),
        );
        let boolean_value = named(
            "boolean",
            map(one_of(vec![keyword("true"), keyword("false")]), |p| {
                let range = p.range;
                node(NodeKind::Bool(p.into_text()? == "true"), range)
            }),
        );
        let number_value = named(
            "number",
            map(regexp(&NUMBER_RE), |p| {
                let range = p.range;
                parse_number(&p.into_text()?, range)
            }),
        );
        let variable = named(
            "variable",
            map(regexp(&VARIABLE_RE), |p| {
                let range = p.range;
                parse_variable(&p.into_text()?, range)
            }),
        );
        let string_in_quotes = named(
            "string",
            map(
                one_of(vec![regexp(&DOUBLE_QUOTED_RE), regexp(&SINGLE_QUOTED_RE)]),
                |p| {
                    let range = p.range;
                    node(NodeKind::Str(unquote(&p.into_text()?)), range)
                },
            ),
        );
        let comment = named(
            "comment",
            map(regexp(&COMMENT_RE), |p| {
                let range = p.range;
                let text = p.into_text()?;
                let body = text
                    .trim_start_matches("/*")
                    .trim_end_matches("*/")
                    .trim()
                    .to_string();
                node(NodeKind::Comment(body), range)
            }),
        );

        // Interpolation prefixes
        let spread_operator = sequence(vec![ws.clone(), specific_string("..."), ws.clone()]);
        let pipe_operator = sequence(vec![ws.clone(), specific_string("|"), ws.clone()]);
        let flatten_call = named(
            "flatten",
            sequence_with(
                vec![keyword("flatten"), ws.clone(), pipe_operator],
                |_, _| Ok(Some(Syntax::Flatten)),
            ),
        );

        // Expressions
        let expression_value: P = later();
        let binary_expression: P = later();
        let nullish_expression: P = later();
        let parens_expression: P = later();
        let math_value: P = later();
        let math_operation: P = later();
        let math_parens: P = later();

        let comparison_operator = one_of(
            ["===", "!==", "==", "!=", ">=", "<=", ">", "<"]
                .into_iter()
                .map(specific_string::<Syntax>)
                .collect(),
        );
        binary_expression.define(named(
            "binary_expression",
            sequence_with(
                vec![
                    expression_value.except(&[&binary_expression]),
                    ws.clone(),
                    must(
                        comparison_operator,
                        "Binary expressions must contain an operator",
                    ),
                    ws.clone(),
                    must(
                        expression_value.clone(),
                        "Binary expressions must contain a right hand side",
                    ),
                ],
                |range, parts| {
                    let mut parts = Parts::new(range, parts);
                    let left = parts.node(0)?;
                    let symbol = parts.text(2)?;
                    let right = parts.node(4)?;
                    let op = CompareOp::from_symbol(&symbol).ok_or_else(|| {
                        SpannedError::internal(format!("Unknown operator {}", symbol), range)
                    })?;
                    node(
                        NodeKind::Comparison {
                            op,
                            left: Box::new(left),
                            right: Box::new(right),
                        },
                        range,
                    )
                },
            ),
        ));

        let guard = |keyword_parser: P, build: fn(Box<Node>) -> Conditional| {
            sequence_with(
                vec![
                    keyword_parser,
                    ws.clone(),
                    must(
                        binary_expression.clone(),
                        "Conditional statements must contain a binary expression",
                    ),
                ],
                move |range, parts| {
                    let mut parts = Parts::new(range, parts);
                    let expression = parts.node(2)?;
                    node(
                        NodeKind::Conditional(build(Box::new(expression))),
                        range,
                    )
                },
            )
        };
        let if_statement = named("if", guard(keyword("if"), Conditional::If));
        let else_if_keyword = one_of(vec![
            keyword("ifelse"),
            sequence(vec![keyword("else"), ws.clone(), keyword("if")]),
        ]);
        let else_if_statement = named("else_if", guard(else_if_keyword, Conditional::ElseIf));
        let else_statement = named(
            "else",
            map(keyword("else"), |p| {
                node(NodeKind::Conditional(Conditional::Else), p.range)
            }),
        );
        let conditional_statement = named(
            "conditional_statement",
            one_of(vec![if_statement.clone(), else_if_statement, else_statement]),
        );

        let each_statement = named(
            "each_statement",
            sequence_with(
                vec![
                    keyword("each"),
                    ws.clone(),
                    variable.clone(),
                    ws.clone(),
                    keyword("as"),
                    ws.clone(),
                    variable.clone(),
                    ws.clone(),
                    maybe(if_statement),
                ],
                |range, parts| {
                    let mut parts = Parts::new(range, parts);
                    let source = match parts.node(2)?.kind {
                        NodeKind::Path(path) => path,
                        _ => return Err(shape_error("a variable path", range)),
                    };
                    let binding_node = parts.node(6)?;
                    let binding = match &binding_node.kind {
                        NodeKind::Path(path) => path.as_identifier().map(str::to_string),
                        _ => None,
                    }
                    .ok_or_else(|| {
                        SpannedError::syntax("Expected a single variable name", binding_node.range)
                    })?;
                    let filter = match parts.option(8)? {
                        Some(statement) => match statement.into_node()?.kind {
                            NodeKind::Conditional(Conditional::If(expression)) => Some(expression),
                            _ => return Err(shape_error("an if statement", range)),
                        },
                        None => None,
                    };
                    node(
                        NodeKind::Each {
                            source,
                            binding,
                            filter,
                        },
                        range,
                    )
                },
            ),
        );

        let ternary_expression = named(
            "ternary_expression",
            sequence_with(
                vec![
                    must(
                        binary_expression.clone(),
                        "Ternary expressions must contain a binary expression as the first part of the expression",
                    ),
                    ws.clone(),
                    must(
                        specific_string("?"),
                        "Ternary expressions must contain a ? as the second part of the expression",
                    ),
                    ws.clone(),
                    must(
                        expression_value.clone(),
                        "Ternary expressions must contain a comparable value as the third part of the expression",
                    ),
                    ws.clone(),
                    must(
                        specific_string(":"),
                        "Ternary expressions must contain a : as the fourth part of the expression",
                    ),
                    ws.clone(),
                    must(
                        expression_value.clone(),
                        "Ternary expressions must contain a comparable value as the fifth part of the expression",
                    ),
                ],
                |range, parts| {
                    let mut parts = Parts::new(range, parts);
                    let condition = parts.node(0)?;
                    let then = parts.node(4)?;
                    let otherwise = parts.node(8)?;
                    node(
                        NodeKind::Ternary {
                            condition: Box::new(condition),
                            then: Box::new(then),
                            otherwise: Box::new(otherwise),
                        },
                        range,
                    )
                },
            ),
        );

        let group = |range: TokenRange, parts: Vec<Parsed<Syntax>>| {
            let mut parts = Parts::new(range, parts);
            let inner = parts.node(2)?;
            node(NodeKind::Group(Box::new(inner)), range)
        };
        parens_expression.define(named(
            "parens_expression",
            sequence_with(
                vec![
                    specific_char('('),
                    ws.clone(),
                    one_of(vec![
                        ternary_expression.clone(),
                        nullish_expression.clone(),
                        expression_value.except(&[&parens_expression]),
                    ]),
                    ws.clone(),
                    specific_char(')'),
                ],
                group,
            ),
        ));

        nullish_expression.define(named(
            "nullish_expression",
            sequence_with(
                vec![
                    expression_value.except(&[&nullish_expression]),
                    ws.clone(),
                    specific_string("??"),
                    ws.clone(),
                    one_of(vec![nullish_expression.clone(), expression_value.clone()]),
                ],
                |range, parts| {
                    let mut parts = Parts::new(range, parts);
                    let left = parts.node(0)?;
                    let right = parts.node(4)?;
                    node(
                        NodeKind::Nullish {
                            left: Box::new(left),
                            right: Box::new(right),
                        },
                        range,
                    )
                },
            ),
        ));

        let math_operator = one_of(
            ["+", "-", "*", "/", "%", "^"]
                .into_iter()
                .map(specific_string::<Syntax>)
                .collect(),
        );
        math_operation.define(named(
            "math_operation",
            sequence_with(
                vec![
                    math_value.except(&[&math_operation]),
                    ws.clone(),
                    math_operator,
                    ws.clone(),
                    math_value.clone(),
                ],
                |range, parts| {
                    let mut parts = Parts::new(range, parts);
                    let left = parts.node(0)?;
                    let symbol = parts.text(2)?;
                    let right = parts.node(4)?;
                    let op = MathOp::from_symbol(&symbol).ok_or_else(|| {
                        SpannedError::internal(format!("Unknown operator {}", symbol), range)
                    })?;
                    node(
                        NodeKind::Math {
                            op,
                            left: Box::new(left),
                            right: Box::new(right),
                        },
                        range,
                    )
                },
            ),
        ));
        math_parens.define(sequence_with(
            vec![
                specific_char('('),
                ws.clone(),
                math_value.clone(),
                ws.clone(),
                specific_char(')'),
            ],
            group,
        ));
        // An operation is tried before a bare group so `(a + b) * c` parses
        math_value.define(one_of(vec![
            math_operation,
            math_parens,
            number_value.clone(),
            variable.clone(),
        ]));

        expression_value.define(one_of(vec![
            binary_expression.clone(),
            math_value.clone(),
            parens_expression,
            number_value.clone(),
            boolean_value.clone(),
            null_value.clone(),
            undefined_value.clone(),
            variable.clone(),
            string_in_quotes.clone(),
        ]));

        // {{ ... }}
        let interpolation = named(
            "interpolation",
            sequence_with(
                vec![
                    specific_string("{{"),
                    ws.clone(),
                    maybe(spread_operator),
                    ws.clone(),
                    many(flatten_call),
                    ws.clone(),
                    must(
                        one_of(vec![
                            conditional_statement,
                            each_statement,
                            ternary_expression,
                            nullish_expression,
                            comment.clone(),
                            binary_expression,
                            math_value,
                            null_value,
                            undefined_value,
                            boolean_value,
                            number_value,
                            variable,
                            string_in_quotes,
                        ]),
                        "Unable to read parse value",
                    ),
                    ws.clone(),
                    maybe(comment),
                    ws.clone(),
                    specific_string("}}"),
                ],
                |range, parts| {
                    let mut parts = Parts::new(range, parts);
                    let spread = parts.option(2)?.is_some();
                    let modifiers = parts
                        .items(4)?
                        .into_iter()
                        .map(|call| match call.value {
                            Syntax::Flatten => Ok(Modifier::Flatten),
                            _ => Err(shape_error("a modifier", call.range)),
                        })
                        .collect::<Result<Vec<_>, _>>()?;
                    let value = parts.node(6)?;
                    node(
                        NodeKind::Interpolation {
                            spread,
                            modifiers,
                            value: Box::new(value),
                        },
                        range,
                    )
                },
            ),
        );

        // JSON level
        let template_string = named(
            "template_string",
            sequence_with(
                vec![
                    match_tag(TokenTag::StringStart),
                    must(
                        many(one_of(vec![
                            interpolation,
                            map(string_until("{{"), |p| {
                                let range = p.range;
                                node(NodeKind::Text(p.into_text()?), range)
                            }),
                        ])),
                        "match interpolated values or strings which don't match {{",
                    ),
                    must(
                        match_tag(TokenTag::StringEnd),
                        "Strings must end with an end token",
                    ),
                ],
                |range, parts| {
                    let mut parts = Parts::new(range, parts);
                    let children = parts
                        .items(1)?
                        .into_iter()
                        .map(Parsed::into_node)
                        .collect::<Result<Vec<_>, _>>()?;
                    node(NodeKind::Template(children), range)
                },
            ),
        );

        let value_type: P = later();

        let array_entry = sequence_with(
            vec![
                match_tag(TokenTag::ArrayEntryStart),
                value_type.clone(),
                match_tag(TokenTag::ArrayEntryEnd),
            ],
            |range, parts| {
                let mut parts = Parts::new(range, parts);
                Ok(Some(Syntax::Node(parts.node(1)?)))
            },
        );
        let array = named(
            "array",
            sequence_with(
                vec![
                    match_tag(TokenTag::ArrayStart),
                    must(many(array_entry), "Arrays may only contain array entries"),
                    must(
                        match_tag(TokenTag::ArrayEnd),
                        "Arrays must end with an array end token",
                    ),
                ],
                |range, parts| {
                    let mut parts = Parts::new(range, parts);
                    let items = parts
                        .items(1)?
                        .into_iter()
                        .map(Parsed::into_node)
                        .collect::<Result<Vec<_>, _>>()?;
                    node(NodeKind::Array(items), range)
                },
            ),
        );

        let object_entry = sequence_with(
            vec![
                match_tag(TokenTag::ObjectEntryStart),
                must(
                    match_tag(TokenTag::ObjectKeyStart),
                    "Object entry must contain a key",
                ),
                must(
                    template_string.clone(),
                    "Object entry key must contain a string literal",
                ),
                must(
                    match_tag(TokenTag::ObjectKeyEnd),
                    "Object entry key must end with a key end token",
                ),
                must(
                    match_tag(TokenTag::ValueStart),
                    "Object entry must contain a value",
                ),
                value_type.clone(),
                must(
                    match_tag(TokenTag::ValueEnd),
                    "Object entry must end with a value end token",
                ),
                must(
                    match_tag(TokenTag::ObjectEntryEnd),
                    "Object entry must end with an entry end token",
                ),
            ],
            |range, parts| {
                let mut parts = Parts::new(range, parts);
                let key = parts.node(2)?;
                let value = parts.node(5)?;
                Ok(Some(Syntax::Entry(Entry { key, value, range })))
            },
        );
        let object = named(
            "object",
            sequence_with(
                vec![
                    match_tag(TokenTag::ObjectStart),
                    must(many(object_entry), "Objects may only contain object entries"),
                    must(
                        match_tag(TokenTag::ObjectEnd),
                        "Objects must end with an object end token",
                    ),
                ],
                |range, parts| {
                    let mut parts = Parts::new(range, parts);
                    let entries = parts
                        .items(1)?
                        .into_iter()
                        .map(|entry| match entry.value {
                            Syntax::Entry(entry) => Ok(entry),
                            _ => Err(shape_error("an object entry", entry.range)),
                        })
                        .collect::<Result<Vec<_>, _>>()?;
                    node(NodeKind::Object(entries), range)
                },
            ),
        );

        value_type.define(must(
            one_of(vec![
                template_string,
                scalar_token(TokenTag::Number),
                scalar_token(TokenTag::Bool),
                scalar_token(TokenTag::Null),
                array,
                object,
            ]),
            "Expected one of a template string, number, boolean, null, array or object",
        ));

        Self { document: value_type }
    }
}

impl Default for Grammar {
    fn default() -> Self {
        Self::new()
    }
}

/// The shared grammar instance
pub fn grammar() -> &'static Grammar {
    &GRAMMAR
}

/// Parse a whole token stream into a template tree
///
/// The document rule must consume every token; anything less is an error.
pub fn parse_document(tokens: &[Token]) -> Result<Node, SpannedError> {
    match grammar().document.parse(tokens, 0) {
        Outcome::Matched(parsed) => {
            if parsed.range != TokenRange::new(0, tokens.len()) {
                return Err(SpannedError::internal(
                    format!(
                        "Full token range not consumed: {} - {} of {}",
                        parsed.range.start,
                        parsed.range.end,
                        tokens.len()
                    ),
                    TokenRange::empty(parsed.range.end),
                ));
            }
            parsed.into_node()
        }
        Outcome::NoMatch => Err(SpannedError::internal(
            "Failed to parse",
            TokenRange::empty(0),
        )),
        Outcome::Committed(err) => Err(err),
    }
}
