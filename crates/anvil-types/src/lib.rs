//! `anvil-types` – shared value model for the Anvil kernel.
//!
//! Every crate in the workspace speaks in terms of the types defined here:
//! the dynamically typed [`Value`] carried by settings and events, the
//! [`OptionType`] a setting is declared with, the [`Event`] envelope pulled
//! from the host, and the [`KernelError`] taxonomy.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Event kind reserved for graceful shutdown of the scheduler.
pub const TERMINATE: &str = "terminate";

// ────────────────────────────────────────────────────────────────────────────
// Value
// ────────────────────────────────────────────────────────────────────────────

/// A dynamically typed value as stored in settings and event payloads.
///
/// Lists and tables both report [`ValueKind::Table`]; booleans have their own
/// kind and never satisfy an [`OptionType`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Boolean(bool),
    Number(f64),
    String(String),
    List(Vec<Value>),
    Table(BTreeMap<String, Value>),
}

/// The observable runtime kind of a [`Value`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    String,
    Number,
    Table,
    Boolean,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueKind::String => write!(f, "string"),
            ValueKind::Number => write!(f, "number"),
            ValueKind::Table => write!(f, "table"),
            ValueKind::Boolean => write!(f, "boolean"),
        }
    }
}

impl Value {
    /// Return the runtime kind of this value.
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Boolean(_) => ValueKind::Boolean,
            Value::Number(_) => ValueKind::Number,
            Value::String(_) => ValueKind::String,
            Value::List(_) | Value::Table(_) => ValueKind::Table,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_table(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Table(t) => Some(t),
            _ => None,
        }
    }

    /// Parse a structured literal (`{ x = 1 }` or `[1, 2]`) into a table value.
    ///
    /// Returns `None` for blank input, malformed input, or a literal that is
    /// not a table or list.
    ///
    /// ```
    /// use anvil_types::{Value, ValueKind};
    ///
    /// let v = Value::parse_literal(r#"{ side = "left", slots = [1, 2] }"#).unwrap();
    /// assert_eq!(v.kind(), ValueKind::Table);
    /// assert!(Value::parse_literal("42").is_none());
    /// ```
    pub fn parse_literal(text: &str) -> Option<Value> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        let doc: toml::Table = toml::from_str(&format!("v = {text}")).ok()?;
        let value = Value::from(doc.get("v")?.clone());
        (value.kind() == ValueKind::Table).then_some(value)
    }

    /// Parse a numeric string the way an operator would type it.
    ///
    /// Surrounding whitespace is ignored; non-finite results are rejected.
    pub fn parse_number(text: &str) -> Option<f64> {
        text.trim().parse::<f64>().ok().filter(|n| n.is_finite())
    }

    /// Render as a structured literal, quoting strings.
    pub fn literal(&self) -> String {
        match self {
            Value::String(s) => format!("{s:?}"),
            Value::List(items) => {
                let inner: Vec<String> = items.iter().map(Value::literal).collect();
                format!("[{}]", inner.join(", "))
            }
            Value::Table(map) => {
                if map.is_empty() {
                    return "{}".to_string();
                }
                let inner: Vec<String> = map
                    .iter()
                    .map(|(k, v)| format!("{} = {}", literal_key(k), v.literal()))
                    .collect();
                format!("{{ {} }}", inner.join(", "))
            }
            other => other.to_string(),
        }
    }
}

fn literal_key(key: &str) -> String {
    let bare = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if bare { key.to_string() } else { format!("{key:?}") }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Boolean(b) => write!(f, "{b}"),
            Value::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => write!(f, "{}", *n as i64),
            Value::Number(n) => write!(f, "{n}"),
            Value::String(s) => write!(f, "{s}"),
            Value::List(_) | Value::Table(_) => write!(f, "{}", self.literal()),
        }
    }
}

impl From<toml::Value> for Value {
    fn from(value: toml::Value) -> Self {
        match value {
            toml::Value::String(s) => Value::String(s),
            toml::Value::Integer(i) => Value::Number(i as f64),
            toml::Value::Float(n) => Value::Number(n),
            toml::Value::Boolean(b) => Value::Boolean(b),
            toml::Value::Datetime(d) => Value::String(d.to_string()),
            toml::Value::Array(items) => Value::List(items.into_iter().map(Value::from).collect()),
            toml::Value::Table(map) => {
                Value::Table(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// OptionType
// ────────────────────────────────────────────────────────────────────────────

/// The declared type of a configuration option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionType {
    String,
    Number,
    Table,
}

impl fmt::Display for OptionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionType::String => write!(f, "string"),
            OptionType::Number => write!(f, "number"),
            OptionType::Table => write!(f, "table"),
        }
    }
}

impl OptionType {
    /// Return `true` when `value` is of this type.
    pub fn matches(self, value: &Value) -> bool {
        matches!(
            (self, value.kind()),
            (OptionType::String, ValueKind::String)
                | (OptionType::Number, ValueKind::Number)
                | (OptionType::Table, ValueKind::Table)
        )
    }

    /// Parse one line of operator input as a value of this type.
    ///
    /// Tables go through [`Value::parse_literal`], numbers through a numeric
    /// parse, and strings are accepted when non-empty.
    pub fn parse_input(self, line: &str) -> Option<Value> {
        let line = line.trim_end_matches(['\r', '\n']);
        match self {
            OptionType::Table => Value::parse_literal(line),
            OptionType::Number => Value::parse_number(line).map(Value::Number),
            OptionType::String if line.is_empty() => None,
            OptionType::String => Some(Value::String(line.to_string())),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Event
// ────────────────────────────────────────────────────────────────────────────

/// An environment event pulled from the host.
///
/// Only `kind` is interpreted by the kernel; the payload is passed verbatim
/// to every task that is resumed with the event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// e.g. `"timer"`, `"line"`, `"redstone"`
    pub kind: String,
    #[serde(default)]
    pub payload: Vec<Value>,
}

impl Event {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            payload: Vec::new(),
        }
    }

    /// Append `value` to the payload.
    pub fn with(mut self, value: impl Into<Value>) -> Self {
        self.payload.push(value.into());
        self
    }

    /// The reserved shutdown event.
    pub fn terminate() -> Self {
        Self::new(TERMINATE)
    }

    pub fn is_terminate(&self) -> bool {
        self.kind == TERMINATE
    }

    pub fn arg(&self, index: usize) -> Option<&Value> {
        self.payload.get(index)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Errors
// ────────────────────────────────────────────────────────────────────────────

/// Error taxonomy shared by the registry, the config store, and the host.
#[derive(Error, Debug)]
pub enum KernelError {
    #[error("Module '{module}' failed to load: {reason}")]
    ModuleLoad { module: String, reason: String },

    #[error("Module '{module}' failed to initialise: {reason}")]
    ModuleInit { module: String, reason: String },

    #[error("Setup for '{module}' left option '{option}' as {found}, expected {expected}")]
    SetupContract {
        module: String,
        option: String,
        expected: OptionType,
        found: ValueKind,
    },

    #[error("Persistence Error at {path}: {details}")]
    Persistence { path: String, details: String },

    #[error("Serialization Error: {0}")]
    Serialization(String),

    #[error("Input closed while waiting for a {0} value")]
    InputClosed(OptionType),

    #[error("Console I/O Error: {0}")]
    Console(String),

    #[error("Event Host Error: {0}")]
    Host(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_and_table_share_table_kind() {
        assert_eq!(Value::List(vec![]).kind(), ValueKind::Table);
        assert_eq!(Value::Table(BTreeMap::new()).kind(), ValueKind::Table);
        assert!(OptionType::Table.matches(&Value::List(vec![Value::from(1i64)])));
    }

    #[test]
    fn boolean_never_matches_an_option_type() {
        let b = Value::Boolean(false);
        assert!(!OptionType::String.matches(&b));
        assert!(!OptionType::Number.matches(&b));
        assert!(!OptionType::Table.matches(&b));
    }

    #[test]
    fn parse_input_number() {
        assert_eq!(OptionType::Number.parse_input("5"), Some(Value::Number(5.0)));
        assert_eq!(OptionType::Number.parse_input(" 2.5 \n"), Some(Value::Number(2.5)));
        assert_eq!(OptionType::Number.parse_input("five"), None);
        assert_eq!(OptionType::Number.parse_input("inf"), None);
    }

    #[test]
    fn parse_input_string_requires_content() {
        assert_eq!(OptionType::String.parse_input("\n"), None);
        assert_eq!(
            OptionType::String.parse_input("north\n"),
            Some(Value::String("north".into()))
        );
    }

    #[test]
    fn parse_input_table_uses_structured_literal() {
        let v = OptionType::Table.parse_input("{ x = 1, name = \"chest\" }").unwrap();
        let t = v.as_table().unwrap();
        assert_eq!(t.get("x"), Some(&Value::Number(1.0)));
        assert_eq!(t.get("name"), Some(&Value::String("chest".into())));

        assert!(OptionType::Table.parse_input("{ x = ").is_none());
        assert!(OptionType::Table.parse_input("\"just a string\"").is_none());
        assert!(OptionType::Table.parse_input("").is_none());
    }

    #[test]
    fn literal_parses_back() {
        let mut map = BTreeMap::new();
        map.insert("slots".to_string(), Value::List(vec![1i64.into(), 2i64.into()]));
        map.insert("odd key".to_string(), Value::from("v"));
        let v = Value::Table(map);
        assert_eq!(Value::parse_literal(&v.literal()), Some(v));
    }

    #[test]
    fn integral_numbers_display_without_fraction() {
        assert_eq!(Value::Number(5.0).to_string(), "5");
        assert_eq!(Value::Number(0.25).to_string(), "0.25");
    }

    #[test]
    fn untagged_value_deserializes_from_json() {
        let v: Value = serde_json::from_str(r#"{"a": [1, "b", true]}"#).unwrap();
        let a = &v.as_table().unwrap()["a"];
        assert_eq!(
            a,
            &Value::List(vec![Value::Number(1.0), "b".into(), Value::Boolean(true)])
        );
    }

    #[test]
    fn event_builder_and_terminate() {
        let e = Event::new("redstone").with("left").with(15i64);
        assert_eq!(e.kind, "redstone");
        assert_eq!(e.arg(1), Some(&Value::Number(15.0)));
        assert!(!e.is_terminate());
        assert!(Event::terminate().is_terminate());
    }

    #[test]
    fn kernel_error_display() {
        let err = KernelError::SetupContract {
            module: "grid".into(),
            option: "origin".into(),
            expected: OptionType::Table,
            found: ValueKind::String,
        };
        let text = err.to_string();
        assert!(text.contains("grid"));
        assert!(text.contains("expected table"));
    }
}
