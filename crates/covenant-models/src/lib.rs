//! Shared data model for the Covenant contract matching engine.
//!
//! This crate holds the types that both the plan builders and the plan
//! interpreter depend on: path expressions and document paths used to address
//! into structured data, the matching rule registry with its specificity
//! ranking, and the HTTP request model that expected interactions are
//! recorded against.

pub mod doc_path;
pub mod headers;
pub mod path_exp;
pub mod request;
pub mod rules;

pub use doc_path::DocPath;
pub use path_exp::{parse_path, PathToken};
pub use request::{Body, HttpRequest};
pub use rules::{MatchingRule, MatchingRuleCategory, MatchingRules, RuleList, RuleLogic};
