//! Evaluator for JTL - walks the template tree against a parameter map
//!
//! Every node evaluates to a value (`None` is JavaScript's `undefined`) and
//! a set of [`Signals`]. Most nodes produce no signals; interpolations
//! carry spread and modifiers, and statements inside object keys carry the
//! control information (conditions, loops, comments) that the enclosing
//! object acts on.

use serde_json::{Map, Number, Value};
use std::cmp::Ordering;

use crate::ast::{CompareOp, Conditional, Entry, MathOp, Modifier, Node, NodeKind, VariablePath};
use crate::error::SpannedError;

/// Largest magnitude at which an `f64` still holds every integer exactly
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

/// Variable scope: the parameters, plus loop bindings layered on top
#[derive(Debug, Clone, Copy)]
pub struct Env<'a> {
    params: &'a Map<String, Value>,
    binding: Option<(&'a str, Option<&'a Value>, &'a Env<'a>)>,
}

impl<'a> Env<'a> {
    pub fn new(params: &'a Map<String, Value>) -> Self {
        Self {
            params,
            binding: None,
        }
    }

    /// A child scope in which `name` resolves to `value`
    pub fn bind<'b>(&'b self, name: &'b str, value: Option<&'b Value>) -> Env<'b>
    where
        'a: 'b,
    {
        Env {
            params: self.params,
            binding: Some((name, value, self)),
        }
    }

    /// Resolve a root identifier, innermost binding first
    pub fn lookup(&self, name: &str) -> Option<&'a Value> {
        match self.binding {
            Some((bound, value, _)) if bound == name => value,
            Some((_, _, parent)) => parent.lookup(name),
            None => self.params.get(name),
        }
    }
}

/// Loop request raised by an `each` statement, executed by the object
/// whose key carries it
#[derive(Debug, Clone, PartialEq)]
pub struct EachRequest<'n> {
    pub items: Vec<Option<Value>>,
    pub binding: &'n str,
    pub filter: Option<&'n Node>,
}

/// Out-of-band information attached to an evaluated node
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Signals<'n> {
    pub spread: bool,
    pub modifiers: Vec<Modifier>,
    pub condition: Option<bool>,
    pub each: Option<EachRequest<'n>>,
    pub comment: bool,
}

impl<'n> Signals<'n> {
    fn spread(spread: bool) -> Self {
        Self {
            spread,
            ..Self::default()
        }
    }

    /// Fold the signals of a later template part into these
    fn absorb(&mut self, other: Signals<'n>) {
        self.spread |= other.spread;
        self.modifiers.extend(other.modifiers);
        if other.condition.is_some() {
            self.condition = other.condition;
        }
        if other.each.is_some() {
            self.each = other.each;
        }
        self.comment |= other.comment;
    }
}

/// A value together with its signals
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluated<'n> {
    pub value: Option<Value>,
    pub signals: Signals<'n>,
}

impl<'n> Evaluated<'n> {
    fn plain(value: Option<Value>) -> Self {
        Self {
            value,
            signals: Signals::default(),
        }
    }
}

/// Accumulator for object evaluation; spreading a sequence turns it into
/// an array
enum Accumulator {
    Object(Map<String, Value>),
    Array(Vec<Value>),
}

impl Accumulator {
    fn into_value(self) -> Value {
        match self {
            Accumulator::Object(map) => Value::Object(map),
            Accumulator::Array(items) => Value::Array(items),
        }
    }
}

/// Template evaluator
#[derive(Debug, Clone, Default)]
pub struct Evaluator {
    /// Undefined interpolations inside template strings become null instead
    /// of failing
    pub convert_undefined_to_null: bool,
}

impl Evaluator {
    /// Create a new evaluator
    pub fn new(convert_undefined_to_null: bool) -> Self {
        Self {
            convert_undefined_to_null,
        }
    }

    /// Evaluate a whole document; a top-level `undefined` becomes `null`
    pub fn evaluate_document(
        &self,
        node: &Node,
        params: &Map<String, Value>,
    ) -> Result<Value, SpannedError> {
        tracing::debug!(target: "jtl::eval", root = node.kind.label(), params = params.len(), "evaluating document");
        let env = Env::new(params);
        Ok(self.evaluate(node, &env)?.value.unwrap_or(Value::Null))
    }

    /// Evaluate a node and keep its signals
    pub fn evaluate<'n>(&self, node: &'n Node, env: &Env<'_>) -> Result<Evaluated<'n>, SpannedError> {
        match &node.kind {
            NodeKind::Number(n) => Ok(Evaluated::plain(Some(Value::Number(n.clone())))),
            NodeKind::Bool(b) => Ok(Evaluated::plain(Some(Value::Bool(*b)))),
            NodeKind::Null => Ok(Evaluated::plain(Some(Value::Null))),
            NodeKind::Undefined => Ok(Evaluated::plain(None)),
            NodeKind::Str(s) | NodeKind::Text(s) => Ok(Evaluated::plain(Some(Value::String(s.clone())))),

            NodeKind::Path(path) => Ok(Evaluated::plain(self.resolve_variable(path, node, env)?)),

            NodeKind::Comparison { op, left, right } => {
                let left = self.value(left, env)?;
                let right = self.value(right, env)?;
                Ok(Evaluated::plain(Some(Value::Bool(
                    self.evaluate_comparison(*op, &left, &right),
                ))))
            }

            NodeKind::Math { op, left, right } => {
                let left = self.value(left, env)?;
                let right = self.value(right, env)?;
                Ok(Evaluated::plain(self.evaluate_math(*op, left, right, node)?))
            }

            NodeKind::Ternary {
                condition,
                then,
                otherwise,
            } => {
                let branch = if self.is_truthy(&self.value(condition, env)?) {
                    then
                } else {
                    otherwise
                };
                Ok(Evaluated::plain(self.value(branch, env)?))
            }

            NodeKind::Nullish { left, right } => {
                match self.value(left, env) {
                    Ok(Some(value)) if !value.is_null() => return Ok(Evaluated::plain(Some(value))),
                    Ok(_) => {}
                    Err(err) if err.is_undefined_value() => {
                        tracing::trace!(target: "jtl::eval", error = %err.message, "nullish fallback");
                    }
                    Err(err) => return Err(err),
                }
                Ok(Evaluated::plain(self.value(right, env)?))
            }

            NodeKind::Group(inner) => Ok(Evaluated::plain(self.value(inner, env)?)),

            NodeKind::Comment(_) => Ok(Evaluated {
                value: None,
                signals: Signals {
                    comment: true,
                    ..Signals::default()
                },
            }),

            NodeKind::Conditional(statement) => {
                let status = match statement {
                    Conditional::If(guard) | Conditional::ElseIf(guard) => {
                        self.is_truthy(&self.value(guard, env)?)
                    }
                    Conditional::Else => true,
                };
                Ok(Evaluated {
                    value: None,
                    signals: Signals {
                        condition: Some(status),
                        ..Signals::default()
                    },
                })
            }

            NodeKind::Each {
                source,
                binding,
                filter,
            } => {
                let items = match self.resolve_variable(source, node, env)? {
                    Some(Value::Array(items)) => items.into_iter().map(Some).collect(),
                    other => vec![other],
                };
                Ok(Evaluated {
                    value: None,
                    signals: Signals {
                        each: Some(EachRequest {
                            items,
                            binding: binding.as_str(),
                            filter: filter.as_deref(),
                        }),
                        ..Signals::default()
                    },
                })
            }

            NodeKind::Array(entries) => self.evaluate_array(entries, node, env),
            NodeKind::Object(entries) => self.evaluate_object(entries, node, env),
            NodeKind::Template(parts) => self.evaluate_template(parts, node, env, false),

            NodeKind::Interpolation {
                spread,
                modifiers,
                value,
            } => {
                let mut inner = self.evaluate(value, env)?;
                inner.signals.spread = *spread;
                inner.signals.modifiers = modifiers.clone();
                Ok(inner)
            }
        }
    }

    /// Evaluate a node for its value only
    pub fn value(&self, node: &Node, env: &Env<'_>) -> Result<Option<Value>, SpannedError> {
        Ok(self.evaluate(node, env)?.value)
    }

    fn resolve_variable(
        &self,
        path: &VariablePath,
        node: &Node,
        env: &Env<'_>,
    ) -> Result<Option<Value>, SpannedError> {
        let Some((root, rest)) = path.parts.split_first() else {
            return Ok(None);
        };

        let mut current = env.lookup(&root.name);
        let mut previous_optional = root.optional;
        for (offset, part) in rest.iter().enumerate() {
            // `a?.b` tolerates a missing `a` when reading `b`
            let lenient = part.optional || previous_optional;
            current = match current {
                None | Some(Value::Null) if lenient => None,
                None | Some(Value::Null) => {
                    let consumed = path.parts[..offset + 2]
                        .iter()
                        .map(|p| p.name.clone())
                        .collect();
                    return Err(SpannedError::undefined_value(consumed, node.range));
                }
                Some(value) => read_key(value, &part.name),
            };
            previous_optional = part.optional;
        }
        Ok(current.cloned())
    }

    fn evaluate_array<'n>(
        &self,
        entries: &'n [Node],
        node: &Node,
        env: &Env<'_>,
    ) -> Result<Evaluated<'n>, SpannedError> {
        let mut items = Vec::with_capacity(entries.len());
        for entry in entries {
            let evaluated = self.evaluate(entry, env)?;
            if !evaluated.signals.spread {
                items.push(evaluated.value.unwrap_or(Value::Null));
                continue;
            }
            match evaluated.value {
                Some(Value::Array(spread)) => items.extend(spread),
                other => {
                    return Err(fail(
                        node,
                        format!("Unable to spread non-array value {}", render(&other)),
                    ))
                }
            }
        }
        Ok(Evaluated::plain(Some(Value::Array(items))))
    }

    fn evaluate_object<'n>(
        &self,
        entries: &'n [Entry],
        node: &Node,
        env: &Env<'_>,
    ) -> Result<Evaluated<'n>, SpannedError> {
        let mut accumulator = Accumulator::Object(Map::new());

        for entry in entries {
            let key = match &entry.key.kind {
                NodeKind::Template(parts) => self.evaluate_template(parts, &entry.key, env, true)?,
                _ => self.evaluate(&entry.key, env)?,
            };
            let signals = key.signals;

            match signals.condition {
                Some(true) => {
                    let value = self.value(&entry.value, env)?;
                    return Ok(Evaluated {
                        value,
                        signals: Signals::spread(signals.spread),
                    });
                }
                Some(false) => continue,
                None => {}
            }

            if let Some(each) = signals.each {
                let mut collected = Vec::with_capacity(each.items.len());
                for item in &each.items {
                    let scope = env.bind(each.binding, item.as_ref());
                    if let Some(filter) = each.filter {
                        if !self.is_truthy(&self.value(filter, &scope)?) {
                            continue;
                        }
                    }
                    collected.push(self.value(&entry.value, &scope)?.unwrap_or(Value::Null));
                }
                tracing::debug!(
                    target: "jtl::eval",
                    binding = each.binding,
                    items = each.items.len(),
                    kept = collected.len(),
                    "each loop"
                );
                let value = apply_modifiers(Some(Value::Array(collected)), &signals.modifiers, node)?;
                return Ok(Evaluated {
                    value,
                    signals: Signals::spread(signals.spread),
                });
            }

            let value = self.value(&entry.value, env)?;
            let value = apply_modifiers(value, &signals.modifiers, node)?;

            if signals.spread && !signals.comment {
                return Ok(Evaluated {
                    value,
                    signals: Signals::spread(true),
                });
            }

            if signals.spread {
                accumulator = merge(accumulator, value, node)?;
                continue;
            }

            let Accumulator::Object(map) = &mut accumulator else {
                return Err(fail(node, "Unable to set object keys after a spread"));
            };
            let name = key.value.as_ref().map(js_string).unwrap_or_default();
            match value {
                Some(value) => {
                    map.insert(name, value);
                }
                None => {
                    map.remove(&name);
                }
            }
        }

        Ok(Evaluated::plain(Some(accumulator.into_value())))
    }

    fn evaluate_template<'n>(
        &self,
        parts: &'n [Node],
        node: &Node,
        env: &Env<'_>,
        is_key: bool,
    ) -> Result<Evaluated<'n>, SpannedError> {
        let mut evaluated = parts
            .iter()
            .map(|part| self.evaluate(part, env))
            .collect::<Result<Vec<_>, _>>()?;

        if evaluated.len() == 1 && matches!(parts[0].kind, NodeKind::Interpolation { .. }) {
            let only = &evaluated[0];
            if only.signals.spread && is_key {
                return Ok(evaluated.remove(0));
            }
            if only.signals.spread {
                let mut only = evaluated.remove(0);
                only.value = apply_modifiers(only.value, &only.signals.modifiers, node)?;
                only.signals.modifiers.clear();
                return Ok(only);
            }
            if !is_key {
                let scalar = matches!(&only.value, Some(v) if !v.is_array() && !v.is_object());
                let converted = only.value.is_none() && self.convert_undefined_to_null;
                if scalar {
                    return Ok(evaluated.remove(0));
                }
                if converted {
                    let mut only = evaluated.remove(0);
                    only.value = Some(Value::Null);
                    return Ok(only);
                }
            }
        }

        let total = evaluated.len();
        let mut signals = Signals::default();
        let mut output = String::new();
        for (index, part) in evaluated.into_iter().enumerate() {
            signals.absorb(part.signals);
            match &part.value {
                None if !self.convert_undefined_to_null && !is_key => {
                    return Err(fail(node, "Undefined value in template string"));
                }
                None | Some(Value::Null) => {}
                Some(Value::Array(_)) | Some(Value::Object(_)) => {
                    return Err(fail(
                        node,
                        format!(
                            "Unable to stringify value ({} of {}): {} (object)",
                            index,
                            total,
                            render(&part.value)
                        ),
                    ));
                }
                Some(value) => output.push_str(&js_string(value)),
            }
        }

        Ok(Evaluated {
            value: Some(Value::String(output)),
            signals,
        })
    }

    fn evaluate_math(
        &self,
        op: MathOp,
        left: Option<Value>,
        right: Option<Value>,
        node: &Node,
    ) -> Result<Option<Value>, SpannedError> {
        let is_string = |v: &Option<Value>| matches!(v, Some(Value::String(_)));
        if op == MathOp::Add && (is_string(&left) || is_string(&right)) {
            let text = |v: &Option<Value>| match v {
                Some(value) => js_string(value),
                None => "undefined".to_string(),
            };
            return Ok(Some(Value::String(format!("{}{}", text(&left), text(&right)))));
        }

        let l = to_number(&left);
        let r = to_number(&right);
        let result = match op {
            MathOp::Add => l + r,
            MathOp::Sub => l - r,
            MathOp::Mul => l * r,
            MathOp::Div => l / r,
            MathOp::Rem => l % r,
            MathOp::Pow => l.powf(r),
        };

        if !result.is_finite() {
            return Err(fail(
                node,
                format!(
                    "Math result is not a finite number: {} {} {}",
                    render(&left),
                    op,
                    render(&right)
                ),
            ));
        }
        Ok(Some(number_value(result)))
    }

    fn evaluate_comparison(&self, op: CompareOp, left: &Option<Value>, right: &Option<Value>) -> bool {
        match op {
            CompareOp::StrictEq => self.strict_equal(left, right),
            CompareOp::StrictNe => !self.strict_equal(left, right),
            CompareOp::Eq => self.loose_equal(left, right),
            CompareOp::Ne => !self.loose_equal(left, right),
            CompareOp::Ge => matches!(self.relate(left, right), Some(Ordering::Greater | Ordering::Equal)),
            CompareOp::Le => matches!(self.relate(left, right), Some(Ordering::Less | Ordering::Equal)),
            CompareOp::Gt => self.relate(left, right) == Some(Ordering::Greater),
            CompareOp::Lt => self.relate(left, right) == Some(Ordering::Less),
        }
    }

    /// `===`: same type and same value; containers compare structurally
    fn strict_equal(&self, left: &Option<Value>, right: &Option<Value>) -> bool {
        match (left, right) {
            (None, None) => true,
            (Some(l), Some(r)) => self.values_equal(l, r),
            _ => false,
        }
    }

    fn values_equal(&self, left: &Value, right: &Value) -> bool {
        match (left, right) {
            (Value::Number(l), Value::Number(r)) => l.as_f64() == r.as_f64(),
            (Value::Array(l), Value::Array(r)) => {
                l.len() == r.len() && l.iter().zip(r).all(|(a, b)| self.values_equal(a, b))
            }
            (Value::Object(l), Value::Object(r)) => {
                l.len() == r.len()
                    && l.iter()
                        .all(|(k, a)| r.get(k).map_or(false, |b| self.values_equal(a, b)))
            }
            _ => left == right,
        }
    }

    /// `==`: null and undefined are equal to each other only; primitives of
    /// different types compare as numbers
    fn loose_equal(&self, left: &Option<Value>, right: &Option<Value>) -> bool {
        let nullish = |v: &Option<Value>| matches!(v, None | Some(Value::Null));
        match (left, right) {
            _ if nullish(left) || nullish(right) => nullish(left) && nullish(right),
            (Some(l), Some(r)) if std::mem::discriminant(l) == std::mem::discriminant(r) => {
                self.values_equal(l, r)
            }
            (Some(l), Some(r)) if is_primitive(l) && is_primitive(r) => {
                to_number(left) == to_number(right)
            }
            _ => false,
        }
    }

    /// Ordering for `< <= > >=`; `None` when the operands are incomparable
    fn relate(&self, left: &Option<Value>, right: &Option<Value>) -> Option<Ordering> {
        if let (Some(Value::String(l)), Some(Value::String(r))) = (left, right) {
            return Some(l.cmp(r));
        }
        to_number(left).partial_cmp(&to_number(right))
    }

    /// Check if a value is truthy
    fn is_truthy(&self, value: &Option<Value>) -> bool {
        truthy(value.as_ref())
    }
}

/// JavaScript truthiness; `None` is `undefined`
pub fn truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().map_or(false, |f| f != 0.0),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(_)) | Some(Value::Object(_)) => true,
    }
}

fn fail(node: &Node, message: impl std::fmt::Display) -> SpannedError {
    SpannedError::internal(format!("{}: {}", node.kind.label(), message), node.range)
}

fn read_key<'v>(value: &'v Value, key: &str) -> Option<&'v Value> {
    match value {
        Value::Object(map) => map.get(key),
        Value::Array(items) => key.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    }
}

fn apply_modifiers(
    value: Option<Value>,
    modifiers: &[Modifier],
    node: &Node,
) -> Result<Option<Value>, SpannedError> {
    let mut current = value;
    for modifier in modifiers {
        match modifier {
            Modifier::Flatten => {
                let Some(Value::Array(items)) = current else {
                    return Err(fail(
                        node,
                        format!("Unable to flatten non-array value {}", render(&current)),
                    ));
                };
                let mut flat = Vec::with_capacity(items.len());
                for item in items {
                    match item {
                        Value::Array(inner) => flat.extend(inner),
                        other => flat.push(other),
                    }
                }
                current = Some(Value::Array(flat));
            }
        }
    }
    Ok(current)
}

fn merge(
    accumulator: Accumulator,
    value: Option<Value>,
    node: &Node,
) -> Result<Accumulator, SpannedError> {
    match (accumulator, value) {
        (accumulator, None | Some(Value::Null)) => Ok(accumulator),
        (Accumulator::Object(map), Some(Value::Array(items))) => {
            if !map.is_empty() {
                return Err(fail(node, "Unable to spread array after object keys"));
            }
            Ok(Accumulator::Array(items))
        }
        (Accumulator::Array(mut existing), Some(Value::Array(items))) => {
            existing.extend(items);
            Ok(Accumulator::Array(existing))
        }
        (Accumulator::Object(mut map), Some(Value::Object(entries))) => {
            for (key, value) in entries {
                map.insert(key, value);
            }
            Ok(Accumulator::Object(map))
        }
        (Accumulator::Array(_), Some(Value::Object(_))) => {
            Err(fail(node, "Unable to spread object after array"))
        }
        (_, Some(other)) => Err(fail(
            node,
            format!("Unable to spread scalar value {}", other),
        )),
    }
}

fn is_primitive(value: &Value) -> bool {
    matches!(value, Value::Bool(_) | Value::Number(_) | Value::String(_))
}

/// JavaScript `ToNumber` for the values a template can produce
fn to_number(value: &Option<Value>) -> f64 {
    match value {
        None => f64::NAN,
        Some(Value::Null) => 0.0,
        Some(Value::Bool(b)) => {
            if *b {
                1.0
            } else {
                0.0
            }
        }
        Some(Value::Number(n)) => n.as_f64().unwrap_or(f64::NAN),
        Some(Value::String(s)) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                0.0
            } else {
                trimmed.parse::<f64>().unwrap_or(f64::NAN)
            }
        }
        Some(Value::Array(_)) | Some(Value::Object(_)) => f64::NAN,
    }
}

/// Integral results inside the safe range become JSON integers
fn number_value(f: f64) -> Value {
    if f.fract() == 0.0 && f.abs() <= MAX_SAFE_INTEGER {
        Value::Number(Number::from(f as i64))
    } else {
        Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null)
    }
}

/// String conversion used for template concatenation and object keys
fn js_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => match (n.as_i64(), n.as_u64(), n.as_f64()) {
            (Some(i), _, _) => i.to_string(),
            (_, Some(u), _) => u.to_string(),
            (_, _, Some(f)) if f.fract() == 0.0 && f.abs() < 1e21 => format!("{:.0}", f),
            (_, _, Some(f)) => f.to_string(),
            _ => n.to_string(),
        },
        other => other.to_string(),
    }
}

/// JSON rendering for diagnostics, `undefined` included
fn render(value: &Option<Value>) -> String {
    match value {
        Some(value) => value.to_string(),
        None => "undefined".to_string(),
    }
}
