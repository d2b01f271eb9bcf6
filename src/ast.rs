//! Abstract Syntax Tree definitions for JTL
//!
//! The tree mirrors the input document: containers and template strings at
//! the JSON level, expressions inside `{{ }}`. Every node keeps the token
//! range it was parsed from so errors can be mapped back to the document.

use serde::Serialize;
use serde_json::Number;
use std::fmt;

use crate::combinator::TokenRange;

/// A node of the template tree
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Node {
    pub kind: NodeKind,
    pub range: TokenRange,
}

impl Node {
    pub fn new(kind: NodeKind, range: TokenRange) -> Self {
        Self { kind, range }
    }

    /// Unwrap parenthesized groups
    pub fn ungrouped(&self) -> &Node {
        match &self.kind {
            NodeKind::Group(inner) => inner.ungrouped(),
            _ => self,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum NodeKind {
    // Literals
    Number(Number),
    Bool(bool),
    Null,
    Undefined,
    /// Quoted string inside an expression
    Str(String),
    /// Literal text between interpolations of a template string
    Text(String),

    /// Variable lookup: `a.b`, `a['b']`, `a?.b`
    Path(VariablePath),

    /// `left <op> right` with a comparison operator
    Comparison {
        op: CompareOp,
        left: Box<Node>,
        right: Box<Node>,
    },

    /// `left <op> right` with an arithmetic operator
    Math {
        op: MathOp,
        left: Box<Node>,
        right: Box<Node>,
    },

    /// `condition ? then : otherwise`
    Ternary {
        condition: Box<Node>,
        then: Box<Node>,
        otherwise: Box<Node>,
    },

    /// `left ?? right`
    Nullish { left: Box<Node>, right: Box<Node> },

    /// `( expression )`
    Group(Box<Node>),

    /// `/* text */`
    Comment(String),

    /// `if`, `else if` / `ifelse`, `else`
    Conditional(Conditional),

    /// `each <source> as <binding> [if <filter>]`
    Each {
        source: VariablePath,
        binding: String,
        filter: Option<Box<Node>>,
    },

    Array(Vec<Node>),
    Object(Vec<Entry>),

    /// A JSON string (value or key): text runs and interpolations
    Template(Vec<Node>),

    /// `{{ [...] [flatten |]* value }}`
    Interpolation {
        spread: bool,
        modifiers: Vec<Modifier>,
        value: Box<Node>,
    },
}

impl NodeKind {
    /// Short label used to prefix evaluation errors
    pub fn label(&self) -> &'static str {
        match self {
            NodeKind::Number(_) => "NumberLiteral",
            NodeKind::Bool(_) => "BooleanLiteral",
            NodeKind::Null => "NullLiteral",
            NodeKind::Undefined => "UndefinedLiteral",
            NodeKind::Str(_) => "StringLiteral",
            NodeKind::Text(_) => "Text",
            NodeKind::Path(_) => "VariablePath",
            NodeKind::Comparison { .. } => "BinaryExpression",
            NodeKind::Math { .. } => "MathOperation",
            NodeKind::Ternary { .. } => "TernaryExpression",
            NodeKind::Nullish { .. } => "NullishCoalescingExpression",
            NodeKind::Group(_) => "Group",
            NodeKind::Comment(_) => "Comment",
            NodeKind::Conditional(_) => "ConditionalStatement",
            NodeKind::Each { .. } => "EachStatement",
            NodeKind::Array(_) => "Array",
            NodeKind::Object(_) => "Object",
            NodeKind::Template(_) => "TemplateString",
            NodeKind::Interpolation { .. } => "InterpolatedValue",
        }
    }
}

/// One key/value pair of an object; the key is always a template string
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Entry {
    pub key: Node,
    pub value: Node,
    pub range: TokenRange,
}

/// A dotted/bracketed variable path
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VariablePath {
    pub parts: Vec<PathPart>,
}

/// One segment of a variable path; `optional` records a trailing `?`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PathPart {
    pub name: String,
    pub optional: bool,
}

impl VariablePath {
    pub fn new(parts: Vec<PathPart>) -> Self {
        Self { parts }
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// The single identifier of a one-segment path
    pub fn as_identifier(&self) -> Option<&str> {
        match self.parts.as_slice() {
            [only] if !only.optional => Some(&only.name),
            _ => None,
        }
    }
}

impl fmt::Display for VariablePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.parts.iter().map(|p| p.name.as_str()).collect();
        write!(f, "{}", names.join("."))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CompareOp {
    StrictEq,
    StrictNe,
    Eq,
    Ne,
    Ge,
    Le,
    Gt,
    Lt,
}

impl CompareOp {
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        Some(match symbol {
            "===" => CompareOp::StrictEq,
            "!==" => CompareOp::StrictNe,
            "==" => CompareOp::Eq,
            "!=" => CompareOp::Ne,
            ">=" => CompareOp::Ge,
            "<=" => CompareOp::Le,
            ">" => CompareOp::Gt,
            "<" => CompareOp::Lt,
            _ => return None,
        })
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CompareOp::StrictEq => "===",
            CompareOp::StrictNe => "!==",
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
            CompareOp::Ge => ">=",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Lt => "<",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MathOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Pow,
}

impl MathOp {
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        Some(match symbol {
            "+" => MathOp::Add,
            "-" => MathOp::Sub,
            "*" => MathOp::Mul,
            "/" => MathOp::Div,
            "%" => MathOp::Rem,
            "^" => MathOp::Pow,
            _ => return None,
        })
    }
}

impl fmt::Display for MathOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MathOp::Add => "+",
            MathOp::Sub => "-",
            MathOp::Mul => "*",
            MathOp::Div => "/",
            MathOp::Rem => "%",
            MathOp::Pow => "^",
        };
        write!(f, "{}", s)
    }
}

/// Conditional statement carried by an object key
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Conditional {
    If(Box<Node>),
    ElseIf(Box<Node>),
    Else,
}

impl Conditional {
    /// The guard expression; `else` has none
    pub fn guard(&self) -> Option<&Node> {
        match self {
            Conditional::If(guard) | Conditional::ElseIf(guard) => Some(guard),
            Conditional::Else => None,
        }
    }
}

/// Post-processing applied to an interpolated value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Modifier {
    Flatten,
}
