//! JTL - JSON Template Language
//!
//! Expands JSON documents whose strings carry `{{ }}` expressions. Values
//! can be computed, object keys can act as `if`/`else` branches or `each`
//! loops, and `...` spreads results into the surrounding container.
//!
//! ```
//! use serde_json::json;
//!
//! let template = json!({
//!     "title": "{{ name }} has {{ items.0 }}",
//!     "count": "{{ 1 + 1 }}",
//!     "items": {"{{ each items as item }}": "{{ item }}!"}
//! });
//! let output = jtl::expand(&template, &json!({"name": "Greg", "items": ["a", "b"]})).unwrap();
//! assert_eq!(
//!     output,
//!     json!({"title": "Greg has a", "count": 2, "items": ["a!", "b!"]})
//! );
//! ```

pub mod ast;
pub mod combinator;
pub mod error;
pub mod evaluator;
pub mod grammar;
pub mod lexer;
pub mod text;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// Re-export commonly used types
pub use ast::{Node, NodeKind};
pub use error::{format_template_error, ErrorKind, SpannedError, TemplateError};
pub use evaluator::Evaluator;
pub use lexer::{to_tokens, JsonPath, Lexer, Token, TokenKind};

/// Version of the JTL library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Reserved parameter that, when truthy, enables
/// [`ExpandOptions::convert_undefined_to_null`] for a single call
pub const CONVERT_UNDEFINED_TO_NULL: &str = "__convertUndefinedToNull";

/// Options controlling expansion
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpandOptions {
    /// Tolerate undefined interpolations inside template strings, rendering
    /// them as null (or nothing, inside surrounding text)
    #[serde(alias = "convertUndefinedToNull")]
    pub convert_undefined_to_null: bool,
}

/// A parsed template, ready to be rendered any number of times
#[derive(Debug, Clone)]
pub struct Template {
    document: Value,
    tokens: Vec<Token>,
    ast: Node,
}

impl Template {
    /// Tokenize and parse a template document
    pub fn compile(document: Value) -> Result<Self, TemplateError> {
        let tokens = to_tokens(&document);
        let ast = grammar::parse_document(&tokens)
            .map_err(|err| TemplateError::locate(err, &tokens, &document))?;
        tracing::debug!(target: "jtl::eval", tokens = tokens.len(), root = ast.kind.label(), "compiled template");
        Ok(Self {
            document,
            tokens,
            ast,
        })
    }

    /// Render with default options
    pub fn render(&self, params: &Value) -> Result<Value, TemplateError> {
        self.render_with(params, &ExpandOptions::default())
    }

    /// Render against `params`, which must be an object (or null for none)
    pub fn render_with(
        &self,
        params: &Value,
        options: &ExpandOptions,
    ) -> Result<Value, TemplateError> {
        let empty = Map::new();
        let params = match params {
            Value::Object(map) => map,
            Value::Null => &empty,
            other => return Err(TemplateError::InvalidParams(type_name(other).to_string())),
        };

        let convert = options.convert_undefined_to_null
            || evaluator::truthy(params.get(CONVERT_UNDEFINED_TO_NULL));
        Evaluator::new(convert)
            .evaluate_document(&self.ast, params)
            .map_err(|err| TemplateError::locate(err, &self.tokens, &self.document))
    }

    /// The parsed template tree
    pub fn ast(&self) -> &Node {
        &self.ast
    }

    /// The token stream the template was parsed from
    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    /// The original template document
    pub fn document(&self) -> &Value {
        &self.document
    }
}

/// Expand a template document against a parameter object
pub fn expand(document: &Value, params: &Value) -> Result<Value, TemplateError> {
    expand_with(document, params, &ExpandOptions::default())
}

/// Like [`expand`], with explicit options
pub fn expand_with(
    document: &Value,
    params: &Value,
    options: &ExpandOptions,
) -> Result<Value, TemplateError> {
    Template::compile(document.clone())?.render_with(params, options)
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
