//! Outcomes of evaluating a plan node.

use std::fmt::{self, Display};

use anyhow::anyhow;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use crate::value::NodeValue;

/// The outcome of evaluating a single plan node. Errors are carried in-band
/// rather than failing the evaluation: they compose through `and`/`or` like
/// any other result and surface later as mismatch descriptions.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum NodeResult {
    /// Successful execution with no value
    #[default]
    Ok,
    /// Successful execution with a value
    Value(NodeValue),
    /// Execution failed with an error message
    Error(String),
}

impl NodeResult {
    /// Interpret this result in a boolean context: `Ok` is truthy, an error
    /// is falsy, and a value defers to the value's own truthiness.
    pub fn is_truthy(&self) -> bool {
        match self {
            NodeResult::Ok => true,
            NodeResult::Value(value) => value.truthy(),
            NodeResult::Error(_) => false,
        }
    }

    /// Collapse this result to a boolean value result.
    pub fn truthy(&self) -> NodeResult {
        NodeResult::Value(NodeValue::Bool(self.is_truthy()))
    }

    /// AND this result with an optional other result. An error on either
    /// side dominates; `Ok` defers to a value operand; two values combine
    /// via the value AND.
    pub fn and(&self, other: &Option<NodeResult>) -> NodeResult {
        match other {
            None => self.clone(),
            Some(other) => match self {
                NodeResult::Error(_) => self.clone(),
                NodeResult::Ok => other.clone(),
                NodeResult::Value(value) => match other {
                    NodeResult::Error(_) => other.clone(),
                    NodeResult::Ok => self.clone(),
                    NodeResult::Value(other_value) => {
                        NodeResult::Value(value.and(other_value))
                    }
                },
            },
        }
    }

    /// OR this result with an optional other result, the dual of
    /// [`NodeResult::and`]: an error is dominated by the other side unless
    /// both sides are errors, in which case the right-hand error wins.
    pub fn or(&self, other: &Option<NodeResult>) -> NodeResult {
        match other {
            None => self.clone(),
            Some(other) => match self {
                NodeResult::Error(_) => other.clone(),
                NodeResult::Ok => match other {
                    NodeResult::Error(_) => self.clone(),
                    NodeResult::Ok => NodeResult::Ok,
                    NodeResult::Value(_) => other.clone(),
                },
                NodeResult::Value(value) => match other {
                    NodeResult::Error(_) => self.clone(),
                    NodeResult::Ok => self.clone(),
                    NodeResult::Value(other_value) => NodeResult::Value(value.or(other_value)),
                },
            },
        }
    }

    /// Render the result value as text, if it has a textual reading. `Ok`
    /// and errors render to nothing.
    pub fn as_string(&self) -> Option<String> {
        match self {
            NodeResult::Ok => None,
            NodeResult::Value(value) => match value {
                NodeValue::Null => Some(String::new()),
                NodeValue::String(s) => Some(s.clone()),
                NodeValue::Bool(b) => Some(b.to_string()),
                NodeValue::UInt(u) => Some(u.to_string()),
                NodeValue::Bytes(bytes) => Some(BASE64.encode(bytes)),
                NodeValue::Namespaced(name, value) => Some(format!("{}:{}", name, value)),
                NodeValue::Json(json) => Some(json.to_string()),
                NodeValue::Entry(key, value) => Some(format!("{} -> {}", key, value)),
                NodeValue::StringList(_) | NodeValue::List(_) | NodeValue::MultiMap(_) => {
                    Some(value.str_form())
                }
            },
            NodeResult::Error(_) => None,
        }
    }

    /// The carried number, if the result is an unsigned integer value.
    pub fn as_number(&self) -> Option<u64> {
        match self {
            NodeResult::Value(NodeValue::UInt(u)) => Some(*u),
            _ => None,
        }
    }

    /// The carried value, if there is one.
    pub fn as_value(&self) -> Option<NodeValue> {
        match self {
            NodeResult::Value(value) => Some(value.clone()),
            _ => None,
        }
    }

    /// The carried string list, if the result is one.
    pub fn as_slist(&self) -> Option<Vec<String>> {
        match self {
            NodeResult::Value(NodeValue::StringList(items)) => Some(items.clone()),
            _ => None,
        }
    }

    /// Unwrap into the carried value, treating a bare `Ok` as `Bool(true)`,
    /// or fail with the error message.
    pub fn value_or_error(&self) -> anyhow::Result<NodeValue> {
        match self {
            NodeResult::Ok => Ok(NodeValue::Bool(true)),
            NodeResult::Value(value) => Ok(value.clone()),
            NodeResult::Error(message) => Err(anyhow!(message.clone())),
        }
    }

    pub fn is_err(&self) -> bool {
        matches!(self, NodeResult::Error(_))
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, NodeResult::Ok)
    }
}

impl Display for NodeResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeResult::Ok => write!(f, "OK"),
            NodeResult::Value(value) => write!(f, "{}", value.str_form()),
            NodeResult::Error(message) => write!(f, "ERROR({})", message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_truthy() {
        assert!(NodeResult::Ok.is_truthy());
        assert!(NodeResult::Value(NodeValue::Bool(true)).is_truthy());
        assert!(!NodeResult::Value(NodeValue::Null).is_truthy());
        assert!(!NodeResult::Error("boom".to_string()).is_truthy());
    }

    #[test]
    fn test_and_error_dominates() {
        let err = NodeResult::Error("boom".to_string());
        assert_eq!(err.and(&Some(NodeResult::Ok)), err);
        assert_eq!(NodeResult::Ok.and(&Some(err.clone())), err);
        assert_eq!(
            NodeResult::Value(NodeValue::Bool(true)).and(&Some(err.clone())),
            err
        );
    }

    #[test]
    fn test_and_ok_defers_to_value() {
        let value = NodeResult::Value(NodeValue::UInt(3));
        assert_eq!(NodeResult::Ok.and(&Some(value.clone())), value);
        assert_eq!(value.and(&Some(NodeResult::Ok)), value);
        assert_eq!(value.and(&None), value);
    }

    #[test]
    fn test_and_combines_values() {
        let left = NodeResult::Value(NodeValue::Bool(true));
        let right = NodeResult::Value(NodeValue::String("x".to_string()));
        assert_eq!(
            left.and(&Some(right)),
            NodeResult::Value(NodeValue::Bool(true))
        );
    }

    #[test]
    fn test_or_error_is_dominated() {
        let err = NodeResult::Error("boom".to_string());
        let ok = NodeResult::Ok;
        assert_eq!(err.or(&Some(ok.clone())), ok);
        assert_eq!(ok.or(&Some(err.clone())), ok);
        let other_err = NodeResult::Error("other".to_string());
        assert_eq!(err.or(&Some(other_err.clone())), other_err);
    }

    #[test]
    fn test_value_or_error() {
        assert_eq!(
            NodeResult::Ok.value_or_error().unwrap(),
            NodeValue::Bool(true)
        );
        assert_eq!(
            NodeResult::Value(NodeValue::UInt(1)).value_or_error().unwrap(),
            NodeValue::UInt(1)
        );
        assert!(NodeResult::Error("boom".to_string()).value_or_error().is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(NodeResult::Ok.to_string(), "OK");
        assert_eq!(
            NodeResult::Value(NodeValue::Bool(true)).to_string(),
            "BOOL(true)"
        );
        assert_eq!(
            NodeResult::Error("boom".to_string()).to_string(),
            "ERROR(boom)"
        );
    }
}
