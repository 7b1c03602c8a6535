//! Context threaded through plan building and execution: configuration,
//! matching rule lookup and the rule matcher to dispatch comparisons to.

use std::env;
use std::fmt::Debug;
use std::sync::Arc;

use anyhow::anyhow;
use covenant_models::rules::{MatchingRule, MatchingRuleCategory, MatchingRules, RuleList};
use covenant_models::DocPath;

use crate::value::NodeValue;

/// Configuration driving the behaviour of plan execution.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MatchingConfig {
    /// If extra keys/values are allowed (and ignored)
    pub allow_unexpected_entries: bool,
    /// If the executed plan should be logged
    pub log_executed_plan: bool,
    /// If the plan should be logged before it is executed
    pub log_raw_plan: bool,
    /// If a summary of the executed plan should be logged
    pub log_plan_summary: bool,
    /// If logged summaries should use ANSI colour
    pub coloured_output: bool,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        MatchingConfig {
            allow_unexpected_entries: false,
            log_executed_plan: false,
            log_raw_plan: false,
            log_plan_summary: true,
            coloured_output: true,
        }
    }
}

impl MatchingConfig {
    /// Load the configuration from environment variables:
    /// `COVENANT_ALLOW_UNEXPECTED_ENTRIES`, `COVENANT_LOG_EXECUTED_PLAN`,
    /// `COVENANT_LOG_RAW_PLAN`, `COVENANT_LOG_PLAN_SUMMARY` and
    /// `COVENANT_COLOURED_OUTPUT`, each taking `true` or `1`.
    pub fn from_env() -> Self {
        let mut config = MatchingConfig::default();
        if env_flag("COVENANT_ALLOW_UNEXPECTED_ENTRIES") {
            config.allow_unexpected_entries = true;
        }
        if env_flag("COVENANT_LOG_EXECUTED_PLAN") {
            config.log_executed_plan = true;
        }
        if env_flag("COVENANT_LOG_RAW_PLAN") {
            config.log_raw_plan = true;
        }
        if env_flag("COVENANT_LOG_PLAN_SUMMARY") {
            config.log_plan_summary = true;
        }
        if env_flag("COVENANT_COLOURED_OUTPUT") {
            config.coloured_output = true;
        }
        config
    }
}

fn env_flag(name: &str) -> bool {
    match env::var(name) {
        Ok(value) => {
            let value = value.to_lowercase();
            value == "true" || value == "1"
        }
        Err(_) => false,
    }
}

/// The capability of applying a named matching rule to an expected and an
/// actual value. The catalog of rule behaviours lives outside this crate;
/// the engine only needs to be able to invoke one by name.
pub trait RuleMatcher: Debug + Send + Sync {
    /// Apply the rule, returning the mismatch as an error if the values do
    /// not satisfy it.
    fn match_values(
        &self,
        rule: &MatchingRule,
        expected: &NodeValue,
        actual: &NodeValue,
    ) -> anyhow::Result<()>;
}

/// The built-in matcher, supporting only the equality rule. Anything else
/// must be provided by the surrounding verification machinery.
#[derive(Clone, Debug, Default)]
pub struct EqualityMatcher;

impl RuleMatcher for EqualityMatcher {
    fn match_values(
        &self,
        rule: &MatchingRule,
        expected: &NodeValue,
        actual: &NodeValue,
    ) -> anyhow::Result<()> {
        match rule.name.as_str() {
            "equality" => {
                if values_equal(expected, actual) {
                    Ok(())
                } else {
                    Err(anyhow!(
                        "Expected {} to be equal to {}",
                        actual.str_form(),
                        expected.str_form()
                    ))
                }
            }
            name => Err(anyhow!("Matching rule '{}' is not supported", name)),
        }
    }
}

// Structural equality with one coercion: a single-valued string list on
// either side compares equal to the bare string.
fn values_equal(expected: &NodeValue, actual: &NodeValue) -> bool {
    match (expected, actual) {
        (NodeValue::String(e), NodeValue::StringList(a)) if a.len() == 1 => *e == a[0],
        (NodeValue::StringList(e), NodeValue::String(a)) if e.len() == 1 => e[0] == *a,
        (expected, actual) => expected == actual,
    }
}

/// Context for building and executing a plan for one interaction. Cheap to
/// clone; the per-part constructors return a clone scoped to the matching
/// rules of that request part.
#[derive(Clone, Debug)]
pub struct PlanMatchingContext {
    /// Configuration
    pub config: MatchingConfig,
    /// All the matching rules for the interaction
    pub matching_rules: MatchingRules,
    /// The rules for the request part currently being processed
    pub category: MatchingRuleCategory,
    /// Matcher invoked for `match:*` actions
    pub matcher: Arc<dyn RuleMatcher>,
}

impl Default for PlanMatchingContext {
    fn default() -> Self {
        PlanMatchingContext {
            config: MatchingConfig::default(),
            matching_rules: MatchingRules::default(),
            category: MatchingRuleCategory::empty(""),
            matcher: Arc::new(EqualityMatcher),
        }
    }
}

impl PlanMatchingContext {
    pub fn new(matching_rules: MatchingRules, config: MatchingConfig) -> Self {
        PlanMatchingContext {
            config,
            matching_rules,
            ..PlanMatchingContext::default()
        }
    }

    /// Clone of this context scoped to the request method rules.
    pub fn for_method(&self) -> Self {
        self.for_category("method")
    }

    /// Clone of this context scoped to the request path rules.
    pub fn for_path(&self) -> Self {
        self.for_category("path")
    }

    /// Clone of this context scoped to the query parameter rules.
    pub fn for_query(&self) -> Self {
        self.for_category("query")
    }

    /// Clone of this context scoped to the header rules.
    pub fn for_headers(&self) -> Self {
        self.for_category("header")
    }

    /// Clone of this context scoped to the body rules.
    pub fn for_body(&self) -> Self {
        self.for_category("body")
    }

    fn for_category(&self, name: &str) -> Self {
        PlanMatchingContext {
            category: self.matching_rules.rules_for_category(name),
            ..self.clone()
        }
    }

    /// If there is a matching rule defined at the path in this context.
    pub fn matcher_is_defined(&self, path: &DocPath) -> bool {
        let concrete = scoped_path(path);
        let segments: Vec<&str> = concrete.iter().map(String::as_str).collect();
        self.category.matcher_is_defined(&segments)
    }

    /// Select the best matching rule list for the path in this context.
    pub fn select_best_matcher(&self, path: &DocPath) -> RuleList {
        let concrete = scoped_path(path);
        let segments: Vec<&str> = concrete.iter().map(String::as_str).collect();
        self.category.select_best_matcher(&segments)
    }
}

// Header rules are defined against the header name, not the full request
// path, so the `$.headers` prefix is stripped before the lookup.
fn scoped_path(path: &DocPath) -> Vec<String> {
    let segments = path.to_vec();
    if path.first_field() == Some("headers") && segments.len() > 2 {
        let mut scoped = vec!["$".to_string()];
        scoped.extend_from_slice(&segments[2..]);
        scoped
    } else {
        segments
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use covenant_models::rules::RuleLogic;

    fn context_with_rule(category: &str, path: &'static str, rule: &str) -> PlanMatchingContext {
        let mut rules = MatchingRules::default();
        rules.add_category(category).add_rule(
            DocPath::new_unwrap(path),
            MatchingRule::new(rule),
            RuleLogic::And,
        );
        PlanMatchingContext::new(rules, MatchingConfig::default())
    }

    #[test]
    fn test_for_category_scopes_rules() {
        let context = context_with_rule("query", "$.a", "equality");
        let query_context = context.for_query();
        assert!(query_context.matcher_is_defined(&DocPath::new_unwrap("$.a")));
        let header_context = context.for_headers();
        assert!(!header_context.matcher_is_defined(&DocPath::new_unwrap("$.a")));
    }

    #[test]
    fn test_header_paths_are_looked_up_without_the_prefix() {
        let context = context_with_rule("header", "$['content-type']", "equality").for_headers();
        assert!(context.matcher_is_defined(&DocPath::new_unwrap("$.headers['content-type']")));
        let best = context.select_best_matcher(&DocPath::new_unwrap("$.headers['content-type']"));
        assert_eq!(best.rules[0].name, "equality");
    }

    #[test]
    fn test_equality_matcher() {
        let matcher = EqualityMatcher;
        let rule = MatchingRule::new("equality");
        assert!(matcher
            .match_values(&rule, &NodeValue::from("GET"), &NodeValue::from("GET"))
            .is_ok());
        let err = matcher
            .match_values(&rule, &NodeValue::from("GET"), &NodeValue::from("POST"))
            .unwrap_err();
        assert_eq!(err.to_string(), "Expected 'POST' to be equal to 'GET'");
        assert!(matcher
            .match_values(
                &rule,
                &NodeValue::from("a"),
                &NodeValue::StringList(vec!["a".to_string()])
            )
            .is_ok());
    }

    #[test]
    fn test_unknown_rule_is_rejected() {
        let matcher = EqualityMatcher;
        let rule = MatchingRule::new("regex");
        let err = matcher
            .match_values(&rule, &NodeValue::Null, &NodeValue::Null)
            .unwrap_err();
        assert_eq!(err.to_string(), "Matching rule 'regex' is not supported");
    }
}
