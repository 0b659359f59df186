//! Runtime values of the DSL evaluator.

use crate::evaluator::Interpreter;
use crate::parser::{Function, Span};
use crate::vnode::VNode;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

pub type NativeFn = fn(&mut Interpreter<'_>, &[Value], Span) -> Result<Value, RuntimeError>;

#[derive(Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    Text(Rc<str>),
    Array(Rc<Vec<Value>>),
    Object(Rc<BTreeMap<String, Value>>),
    Function(Closure),
    Native(Native),
    /// Child collector handed to a container builder, indexes the open collector slots.
    Appender(usize),
    Node(Rc<VNode>),
}

/// Arrow function together with the scope it was created in.
#[derive(Clone)]
pub struct Closure {
    pub function: Rc<Function>,
    pub scope: Scope,
}

#[derive(Clone, Copy)]
pub struct Native {
    pub name: &'static str,
    pub function: NativeFn,
}

/// Immutable linked scope. Binding returns a new scope, the old one stays valid.
#[derive(Clone, Default)]
pub struct Scope(Option<Rc<Binding>>);

struct Binding {
    name: String,
    value: Value,
    parent: Scope,
}

impl Scope {
    pub fn bind(&self, name: impl Into<String>, value: Value) -> Self {
        Scope(Some(Rc::new(Binding {
            name: name.into(),
            value,
            parent: self.clone(),
        })))
    }

    pub fn lookup(&self, name: &str) -> Option<&Value> {
        let mut current = self.0.as_deref();
        while let Some(binding) = current {
            if binding.name == name {
                return Some(&binding.value);
            }
            current = binding.parent.0.as_deref();
        }
        None
    }
}

/// Failure raised while running DSL code.
#[derive(Debug, Clone)]
pub struct RuntimeError {
    pub message: String,
    /// Innermost call first, `at <callee> (line:col)`.
    pub stack: Vec<String>,
}

impl Value {
    pub fn text(text: impl Into<Rc<str>>) -> Self {
        Self::Text(text.into())
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::Number(_) => "number",
            Self::Text(_) => "string",
            Self::Array(_) => "array",
            Self::Object(_) => "object",
            Self::Function(_) | Self::Native(_) | Self::Appender(_) => "function",
            Self::Node(_) => "node",
        }
    }

    pub fn is_callable(&self) -> bool {
        matches!(self, Self::Function(_) | Self::Native(_) | Self::Appender(_))
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Null => false,
            Self::Bool(value) => *value,
            Self::Number(number) => *number != 0.0 && !number.is_nan(),
            Self::Text(text) => !text.is_empty(),
            _ => true,
        }
    }

    pub fn to_number(&self) -> f64 {
        match self {
            Self::Null => 0.0,
            Self::Bool(value) => f64::from(u8::from(*value)),
            Self::Number(number) => *number,
            Self::Text(text) => {
                let text = text.trim();
                if text.is_empty() {
                    0.0
                } else {
                    text.parse().unwrap_or(f64::NAN)
                }
            }
            _ => f64::NAN,
        }
    }

    /// Strict equality: same kind and same value, containers and functions by identity.
    pub fn strict_equals(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Number(a), Self::Number(b)) => a == b,
            (Self::Text(a), Self::Text(b)) => a == b,
            (Self::Array(a), Self::Array(b)) => Rc::ptr_eq(a, b),
            (Self::Object(a), Self::Object(b)) => Rc::ptr_eq(a, b),
            (Self::Function(a), Self::Function(b)) => {
                Rc::ptr_eq(&a.function, &b.function)
            }
            (Self::Native(a), Self::Native(b)) => a.name == b.name,
            (Self::Appender(a), Self::Appender(b)) => a == b,
            (Self::Node(a), Self::Node(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    pub fn from_json(json: &serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(value) => Self::Bool(*value),
            serde_json::Value::Number(number) => Self::Number(number.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(text) => Self::text(text.as_str()),
            serde_json::Value::Array(items) => {
                Self::Array(Rc::new(items.iter().map(Self::from_json).collect()))
            }
            serde_json::Value::Object(entries) => Self::Object(Rc::new(
                entries
                    .iter()
                    .map(|(key, value)| (key.clone(), Self::from_json(value)))
                    .collect(),
            )),
        }
    }

    /// Convert back to plain data. Functions and nodes are rejected with their type name.
    ///
    /// Integral numbers stay integers, non-finite numbers become `null`.
    pub fn to_json(&self) -> Result<serde_json::Value, &'static str> {
        Ok(match self {
            Self::Null => serde_json::Value::Null,
            Self::Bool(value) => serde_json::Value::Bool(*value),
            Self::Number(number) => number_to_json(*number),
            Self::Text(text) => serde_json::Value::String(text.to_string()),
            Self::Array(items) => serde_json::Value::Array(
                items
                    .iter()
                    .map(Self::to_json)
                    .collect::<Result<_, _>>()?,
            ),
            Self::Object(entries) => serde_json::Value::Object(
                entries
                    .iter()
                    .map(|(key, value)| Ok((key.clone(), value.to_json()?)))
                    .collect::<Result<_, &'static str>>()?,
            ),
            other => return Err(other.type_name()),
        })
    }
}

pub(crate) fn number_to_json(number: f64) -> serde_json::Value {
    if !number.is_finite() {
        return serde_json::Value::Null;
    }
    if number.fract() == 0.0 && number.abs() < 9_007_199_254_740_992.0 {
        return serde_json::Value::from(number as i64);
    }
    serde_json::Number::from_f64(number)
        .map(serde_json::Value::Number)
        .unwrap_or(serde_json::Value::Null)
}

pub(crate) fn format_number(number: f64) -> String {
    if number.is_nan() {
        "NaN".to_string()
    } else if number == f64::INFINITY {
        "Infinity".to_string()
    } else if number == f64::NEG_INFINITY {
        "-Infinity".to_string()
    } else if number.fract() == 0.0 && number.abs() < 1e21 {
        format!("{}", number as i128)
    } else {
        number.to_string()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(value) => write!(f, "{value}"),
            Self::Number(number) => write!(f, "{}", format_number(*number)),
            Self::Text(text) => write!(f, "{text}"),
            Self::Array(items) => {
                for (index, item) in items.iter().enumerate() {
                    if index > 0 {
                        write!(f, ",")?;
                    }
                    if !matches!(item, Self::Null) {
                        write!(f, "{item}")?;
                    }
                }
                Ok(())
            }
            Self::Object(_) => write!(f, "[object Object]"),
            Self::Function(_) | Self::Appender(_) => write!(f, "[function]"),
            Self::Native(native) => write!(f, "[function {}]", native.name),
            Self::Node(node) => write!(f, "[node {}]", node.tag),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => write!(f, "{text:?}"),
            Self::Array(items) => f.debug_list().entries(items.iter()).finish(),
            Self::Object(entries) => f.debug_map().entries(entries.iter()).finish(),
            other => write!(f, "{other}"),
        }
    }
}
