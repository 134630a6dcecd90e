//! Literal and identifier encoding for inline statement text.
//!
//! This is the only place that turns caller-supplied values into statement
//! syntax. String escaping keeps the statement well-formed; it is not a
//! parameter boundary. Backends that accept parameters should use
//! [`crate::Statement::to_parameterized`] instead of the inline form.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::{Display, Formatter};

/// A property value as it is written into the graph.
///
/// Caller-supplied properties are always stored as text; only the
/// chronology ids (year value, month number) are integers.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Literal {
    Int(i64),
    Text(String),
}

impl Literal {
    /// Normalize an arbitrary JSON value to the text literal the store keeps.
    pub fn from_json(value: Option<&Value>) -> Self {
        Self::Text(literal_text(value))
    }

    /// Render as inline statement syntax.
    pub fn render(&self) -> String {
        match self {
            Self::Int(value) => value.to_string(),
            Self::Text(text) => quote_text(text),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Self::Int(value) => Value::from(*value),
            Self::Text(text) => Value::String(text.clone()),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Int(_) => None,
        }
    }
}

impl Display for Literal {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Int(value) => write!(f, "{value}"),
            Self::Text(text) => write!(f, "{text}"),
        }
    }
}

impl From<&str> for Literal {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Literal {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for Literal {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

/// Text form of a property value before quoting.
///
/// `None` and JSON `null` become the empty string; strings are taken as-is;
/// everything else uses its compact JSON text.
pub fn literal_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(text)) => text.clone(),
        Some(other) => other.to_string(),
    }
}

/// Quote a property value as a double-quoted string literal.
pub fn quote_literal(value: Option<&Value>) -> String {
    quote_text(&literal_text(value))
}

/// Escape backslashes, then double quotes, then wrap in double quotes.
pub fn quote_text(text: &str) -> String {
    let escaped = text.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{escaped}\"")
}

/// Invert [`quote_text`] for either quote style.
///
/// Returns `None` when `quoted` is not exactly one well-formed literal.
pub fn unquote_literal(quoted: &str) -> Option<String> {
    let mut chars = quoted.chars();
    let quote = chars.next().filter(|c| *c == '"' || *c == '\'')?;
    let mut out = String::new();
    let mut closed = false;
    while let Some(c) = chars.next() {
        if closed {
            return None;
        }
        match c {
            '\\' => out.push(chars.next()?),
            c if c == quote => closed = true,
            c => out.push(c),
        }
    }
    closed.then_some(out)
}

/// Whether `name` can be written as a bare label/type/key.
pub fn is_plain_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Render a label, relation type or property key.
///
/// Plain names render bare; anything else is back-quoted with embedded
/// back-quotes doubled, so a name can never close the pattern it sits in.
pub fn quote_identifier(name: &str) -> String {
    if is_plain_identifier(name) {
        return name.to_string();
    }
    format!("`{}`", name.replace('`', "``"))
}
