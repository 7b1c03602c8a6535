//! Leaf values carried by execution plan nodes.

use std::collections::HashMap;
use std::fmt::{self, Display};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use itertools::Itertools;

/// The closed set of value kinds a plan node can carry. These values flow
/// through the plan during execution: literals are seeded by the plan
/// builder, resolve nodes produce them from the request under test, and
/// actions combine them.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum NodeValue {
    #[default]
    Null,
    String(String),
    Bool(bool),
    UInt(u64),
    Bytes(Vec<u8>),
    StringList(Vec<String>),
    /// String key to one-or-more string values, keys unique
    MultiMap(HashMap<String, Vec<String>>),
    /// A key paired with a nested value
    Entry(String, Box<NodeValue>),
    List(Vec<NodeValue>),
    /// A value tagged with the namespace it needs to be interpreted in,
    /// e.g. `json:{"a": 1}` for a value that still needs JSON parsing
    Namespaced(String, String),
    Json(serde_json::Value),
}

impl NodeValue {
    /// Canonical text encoding of the value. Deterministic (map keys are
    /// rendered sorted), used both for display and for comparing plans in
    /// tests.
    pub fn str_form(&self) -> String {
        match self {
            NodeValue::Null => "NULL".to_string(),
            NodeValue::String(s) => escape_str_value(s),
            NodeValue::Bool(b) => format!("BOOL({})", b),
            NodeValue::UInt(u) => format!("UINT({})", u),
            NodeValue::Bytes(bytes) => {
                format!("BYTES({}, {})", bytes.len(), BASE64.encode(bytes))
            }
            NodeValue::StringList(items) => {
                format!("[{}]", items.iter().map(|v| escape_str_value(v)).join(", "))
            }
            NodeValue::MultiMap(entries) => {
                let mut buffer = String::new();
                buffer.push('{');
                let mut first = true;
                for key in entries.keys().sorted() {
                    if first {
                        first = false;
                    } else {
                        buffer.push_str(", ");
                    }
                    buffer.push_str(&escape_str_value(key));
                    let values = &entries[key];
                    if values.is_empty() {
                        buffer.push_str(": []");
                    } else if values.len() == 1 {
                        buffer.push_str(": ");
                        buffer.push_str(&escape_str_value(&values[0]));
                    } else {
                        buffer.push_str(": [");
                        buffer.push_str(&values.iter().map(|v| escape_str_value(v)).join(", "));
                        buffer.push(']');
                    }
                }
                buffer.push('}');
                buffer
            }
            NodeValue::Entry(key, value) => {
                format!("{} -> {}", escape_str_value(key), value.str_form())
            }
            NodeValue::List(items) => {
                format!("[{}]", items.iter().map(|v| v.str_form()).join(", "))
            }
            NodeValue::Namespaced(name, value) => format!("{}:{}", name, value),
            NodeValue::Json(json) => format!("json:{}", json),
        }
    }

    /// A short name for the kind of value, used in error messages.
    pub fn value_type(&self) -> &'static str {
        match self {
            NodeValue::Null => "NULL",
            NodeValue::String(_) => "String",
            NodeValue::Bool(_) => "Boolean",
            NodeValue::UInt(_) => "Unsigned Integer",
            NodeValue::Bytes(_) => "Byte Array",
            NodeValue::StringList(_) => "String List",
            NodeValue::MultiMap(_) => "Multi-Value String Map",
            NodeValue::Entry(_, _) => "Entry",
            NodeValue::List(_) => "List",
            NodeValue::Namespaced(_, _) => "Namespaced Value",
            NodeValue::Json(_) => "JSON",
        }
    }

    /// Interpret the value in a boolean context. Collections are truthy when
    /// non-empty, numbers when non-zero; kinds with no sensible boolean
    /// reading (`Null`, `Json`, `Entry`, `Namespaced`) are always falsy
    /// rather than an error, so composing results never fails on an
    /// unexpected variant.
    pub fn truthy(&self) -> bool {
        match self {
            NodeValue::Bool(b) => *b,
            NodeValue::String(s) => !s.is_empty(),
            NodeValue::UInt(u) => *u != 0,
            NodeValue::Bytes(bytes) => !bytes.is_empty(),
            NodeValue::StringList(items) => !items.is_empty(),
            NodeValue::MultiMap(entries) => !entries.is_empty(),
            NodeValue::List(items) => !items.is_empty(),
            NodeValue::Null
            | NodeValue::Entry(_, _)
            | NodeValue::Namespaced(_, _)
            | NodeValue::Json(_) => false,
        }
    }

    /// AND this value with another. A boolean on the left short-circuits on
    /// its own value, a `Null` on the left defers entirely to the other
    /// side, and anything else combines the two truthy values.
    pub fn and(&self, other: &NodeValue) -> NodeValue {
        match self {
            NodeValue::Bool(b) => NodeValue::Bool(*b && other.truthy()),
            NodeValue::Null => other.clone(),
            _ => NodeValue::Bool(self.truthy() && other.truthy()),
        }
    }

    /// OR this value with another, the dual of [`NodeValue::and`].
    pub fn or(&self, other: &NodeValue) -> NodeValue {
        match self {
            NodeValue::Bool(b) => NodeValue::Bool(*b || other.truthy()),
            NodeValue::Null => other.clone(),
            _ => NodeValue::Bool(self.truthy() || other.truthy()),
        }
    }

    /// View the value as a list of values. Maps become lists of entries and
    /// JSON arrays become one value per element; scalars become a
    /// single-item list.
    pub fn to_list(&self) -> Vec<NodeValue> {
        match self {
            NodeValue::Null => vec![],
            NodeValue::List(items) => items.clone(),
            NodeValue::StringList(items) => {
                items.iter().map(|s| NodeValue::String(s.clone())).collect()
            }
            NodeValue::MultiMap(entries) => entries
                .iter()
                .map(|(k, v)| {
                    NodeValue::Entry(k.clone(), Box::new(NodeValue::StringList(v.clone())))
                })
                .collect(),
            NodeValue::Json(serde_json::Value::Array(items)) => {
                items.iter().map(|v| NodeValue::Json(v.clone())).collect()
            }
            _ => vec![self.clone()],
        }
    }

    pub fn as_string(&self) -> Option<String> {
        match self {
            NodeValue::String(s) => Some(s.clone()),
            _ => None,
        }
    }

    pub fn as_slist(&self) -> Option<Vec<String>> {
        match self {
            NodeValue::StringList(items) => Some(items.clone()),
            _ => None,
        }
    }

    pub fn as_uint(&self) -> Option<u64> {
        match self {
            NodeValue::UInt(u) => Some(*u),
            _ => None,
        }
    }

    pub fn as_json(&self) -> Option<serde_json::Value> {
        match self {
            NodeValue::Json(json) => Some(json.clone()),
            _ => None,
        }
    }
}

impl Display for NodeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.str_form())
    }
}

impl From<&str> for NodeValue {
    fn from(value: &str) -> Self {
        NodeValue::String(value.to_string())
    }
}

impl From<String> for NodeValue {
    fn from(value: String) -> Self {
        NodeValue::String(value)
    }
}

impl From<bool> for NodeValue {
    fn from(value: bool) -> Self {
        NodeValue::Bool(value)
    }
}

impl From<u64> for NodeValue {
    fn from(value: u64) -> Self {
        NodeValue::UInt(value)
    }
}

impl From<usize> for NodeValue {
    fn from(value: usize) -> Self {
        NodeValue::UInt(value as u64)
    }
}

impl From<Vec<String>> for NodeValue {
    fn from(value: Vec<String>) -> Self {
        NodeValue::StringList(value)
    }
}

impl From<HashMap<String, Vec<String>>> for NodeValue {
    fn from(value: HashMap<String, Vec<String>>) -> Self {
        NodeValue::MultiMap(value)
    }
}

impl From<serde_json::Value> for NodeValue {
    fn from(value: serde_json::Value) -> Self {
        NodeValue::Json(value)
    }
}

impl<T: Into<NodeValue>> From<Option<T>> for NodeValue {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(value) => value.into(),
            None => NodeValue::Null,
        }
    }
}

/// Escape a piece of text for embedding in the canonical plan form: empty
/// text renders as `''`, text containing a single quote is JSON-escaped and
/// double-quoted, text containing whitespace is single-quoted verbatim, and
/// anything else is JSON-escaped without wrapping.
pub fn escape(value: &str) -> String {
    if value.is_empty() {
        "''".to_string()
    } else if value.contains('\'') {
        format!("\"{}\"", json_escape(value).replace('\'', "\\'"))
    } else if value.chars().any(|ch| ch.is_whitespace()) {
        format!("'{}'", value)
    } else {
        json_escape(value)
    }
}

// String values always render with at least single quotes around them, so
// they can not be confused with plan punctuation.
fn escape_str_value(value: &str) -> String {
    let escaped = escape(value);
    if escaped == value {
        format!("'{}'", escaped)
    } else {
        escaped
    }
}

fn json_escape(value: &str) -> String {
    let mut buffer = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '"' => buffer.push_str("\\\""),
            '\\' => buffer.push_str("\\\\"),
            '\n' => buffer.push_str("\\n"),
            '\r' => buffer.push_str("\\r"),
            '\t' => buffer.push_str("\\t"),
            ch if ch.is_control() => {
                buffer.push_str(&format!("\\u{:04x}", ch as u32));
            }
            ch => buffer.push(ch),
        }
    }
    buffer
}
