//! CLI utilities and helpers

use anyhow::{anyhow, bail, Context, Result};
use colored::*;
use serde_json::{Map, Value};
use std::io::Read;
use std::path::Path;

use jtl::{Token, TokenKind};

/// Print a success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green().bold(), msg);
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red().bold(), msg);
}

/// Print a warning message
pub fn warning(msg: &str) {
    eprintln!("{} {}", "⚠".yellow().bold(), msg);
}

/// Load a JSON, YAML or TOML document; `-` reads JSON from stdin
pub fn load_document(path: &str) -> Result<Value> {
    if path == "-" {
        let mut content = String::new();
        std::io::stdin()
            .read_to_string(&mut content)
            .context("Failed to read from stdin")?;
        return serde_json::from_str(&content).context("Failed to parse JSON from stdin");
    }

    let content =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read file: {}", path))?;
    let extension = Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);

    match extension.as_deref() {
        Some("yaml") | Some("yml") => serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse YAML: {}", path)),
        Some("toml") => {
            toml::from_str(&content).with_context(|| format!("Failed to parse TOML: {}", path))
        }
        _ => serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse JSON: {}", path)),
    }
}

/// Parse a `--set key=value` override. The value is read as JSON and
/// falls back to a plain string.
pub fn parse_assignment(assignment: &str) -> Result<(String, Value)> {
    let (key, raw) = assignment
        .split_once('=')
        .ok_or_else(|| anyhow!("Expected KEY=VALUE, got '{}'", assignment))?;
    let key = key.trim();
    if key.is_empty() {
        bail!("Empty key in '{}'", assignment);
    }
    let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    Ok((key.to_string(), value))
}

/// Combine a parameter file with `--set` overrides
pub fn build_params(base: Option<Value>, assignments: &[String]) -> Result<Value> {
    let mut params = match base {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(map)) => map,
        Some(_) => bail!("Parameter file must contain an object"),
    };

    for assignment in assignments {
        let (key, value) = parse_assignment(assignment)?;
        if params.contains_key(&key) {
            warning(&format!("--set overrides parameter '{}'", key));
        }
        params.insert(key, value);
    }

    Ok(Value::Object(params))
}

/// One line of `jtl tokens` output
pub fn format_token(index: usize, token: &Token) -> String {
    let kind = match &token.kind {
        TokenKind::Char(c) => format!("Char({:?})", c),
        TokenKind::Number(n) => format!("Number({})", n),
        TokenKind::Bool(b) => format!("Bool({})", b),
        other => format!("{:?}", other),
    };
    let role = match token.path.role {
        Some(role) => format!(" [{:?}]", role).to_lowercase(),
        None => String::new(),
    };
    format!("{:>6}  {:<22} {}{}", index, kind, token.path, role)
}
