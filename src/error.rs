//! Error handling and formatting for JTL
//!
//! Two layers of errors exist. `SpannedError` is raised by the grammar and
//! the evaluator and is addressed by a token range. `TemplateError` is what
//! callers see: the range resolved to a structural path in the input
//! document, together with a snippet of the value found there.

use colored::Colorize;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::combinator::TokenRange;
use crate::lexer::{value_at_path, JsonPath, Token};

/// Width of the document snippet embedded in error messages
const SNIPPET_WIDTH: usize = 60;

/// Category of a spanned error
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ErrorKind {
    /// A committed grammar failure (raised by `required`)
    Syntax,
    /// Reading a key through an undefined value. This is the only kind
    /// nullish coalescing may recover from.
    UndefinedValue { path: Vec<String> },
    /// A failure during evaluation or a defect in the grammar itself
    Internal,
}

/// An error tied to the token range it originated from
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct SpannedError {
    pub kind: ErrorKind,
    pub message: String,
    pub range: TokenRange,
    #[source]
    pub cause: Option<Box<SpannedError>>,
}

impl SpannedError {
    pub fn new(kind: ErrorKind, message: impl Into<String>, range: TokenRange) -> Self {
        Self {
            kind,
            message: message.into(),
            range,
            cause: None,
        }
    }

    pub fn syntax(message: impl Into<String>, range: TokenRange) -> Self {
        Self::new(ErrorKind::Syntax, message, range)
    }

    pub fn internal(message: impl Into<String>, range: TokenRange) -> Self {
        Self::new(ErrorKind::Internal, message, range)
    }

    /// `path` holds every segment read so far, the failing one last
    pub fn undefined_value(path: Vec<String>, range: TokenRange) -> Self {
        let (key, parent) = match path.split_last() {
            Some((key, parent)) => (key.clone(), parent.join(".")),
            None => (String::new(), String::new()),
        };
        Self::new(
            ErrorKind::UndefinedValue { path },
            format!("Unable to read key '{}' on undefined value: {}", key, parent),
            range,
        )
    }

    /// Re-raise `inner` under a new message, keeping its range and
    /// chaining it as the cause
    pub fn rewrap(message: impl Into<String>, inner: SpannedError) -> Self {
        Self {
            kind: ErrorKind::Syntax,
            message: message.into(),
            range: inner.range,
            cause: Some(Box::new(inner)),
        }
    }

    pub fn is_undefined_value(&self) -> bool {
        matches!(self.kind, ErrorKind::UndefinedValue { .. })
    }

    /// The innermost error of the cause chain
    pub fn root_cause(&self) -> &SpannedError {
        let mut current = self;
        while let Some(cause) = &current.cause {
            current = cause;
        }
        current
    }

    /// Iterate from this error down to the root cause
    pub fn chain(&self) -> impl Iterator<Item = &SpannedError> {
        std::iter::successors(Some(self), |e| e.cause.as_deref())
    }

    /// Outermost message, followed by the innermost one when they differ
    pub fn describe(&self) -> String {
        let root = self.root_cause();
        if std::ptr::eq(root, self) || root.message == self.message {
            self.message.clone()
        } else {
            format!("{}: {}", self.message, root.message)
        }
    }
}

/// User-facing error returned by `expand` and `Template`
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("Error at {path} ({snippet}): {message}")]
    At {
        path: JsonPath,
        snippet: String,
        message: String,
        #[source]
        source: SpannedError,
    },

    #[error("Template parameters must be an object, got {0}")]
    InvalidParams(String),
}

impl TemplateError {
    /// Resolve a spanned error against the token stream and the document
    /// the tokens were produced from
    pub fn locate(error: SpannedError, tokens: &[Token], document: &Value) -> Self {
        let index = error.range.start.min(tokens.len().saturating_sub(1));
        let path = tokens
            .get(index)
            .map(|t| t.path.clone())
            .unwrap_or_default();
        let found = value_at_path(&path, document).unwrap_or(Value::Null);
        let rendered = serde_json::to_string(&found).unwrap_or_default();

        TemplateError::At {
            path,
            snippet: truncate(&rendered, SNIPPET_WIDTH),
            message: error.describe(),
            source: error,
        }
    }

    /// The structured error behind this one, if any
    pub fn spanned(&self) -> Option<&SpannedError> {
        match self {
            TemplateError::At { source, .. } => Some(source),
            TemplateError::InvalidParams(_) => None,
        }
    }

    pub fn path(&self) -> Option<&JsonPath> {
        match self {
            TemplateError::At { path, .. } => Some(path),
            TemplateError::InvalidParams(_) => None,
        }
    }
}

fn truncate(s: &str, width: usize) -> String {
    if s.chars().count() > width {
        let head: String = s.chars().take(width - 1).collect();
        format!("{}...", head)
    } else {
        s.to_string()
    }
}

/// Format a template error with its cause chain for terminal output
pub fn format_template_error(error: &TemplateError) -> String {
    let mut output = String::new();

    match error {
        TemplateError::At {
            path,
            snippet,
            source,
            ..
        } => {
            output.push_str(&format!(
                "{} {}\n",
                "Template error:".red().bold(),
                source.message
            ));
            output.push_str(&format!(
                "  {} {}\n",
                "-->".blue().bold(),
                path.to_string().cyan()
            ));
            output.push_str(&format!("   {}\n", "|".blue()));
            output.push_str(&format!("   {} {}\n", "|".blue(), snippet.dimmed()));
            output.push_str(&format!("   {}\n", "|".blue()));

            let causes: Vec<_> = source.chain().skip(1).collect();
            if !causes.is_empty() {
                output.push_str(&format!("  {}\n", "Caused by:".yellow().bold()));
                for cause in causes {
                    output.push_str(&format!("    - {}\n", cause.message));
                }
            }

            if source.is_undefined_value() {
                output.push_str(&format!(
                    "\n  {} Use '?.' or '??' to tolerate missing values\n",
                    "Hint:".yellow().bold()
                ));
            }
        }
        TemplateError::InvalidParams(_) => {
            output.push_str(&format!("{} {}\n", "Template error:".red().bold(), error));
        }
    }

    output
}
