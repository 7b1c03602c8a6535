//! Matching rule registry and the specificity ranking used to pick the best
//! rule for a concrete location in a document.

use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::doc_path::DocPath;

/// A single named matching rule plus any attributes it was configured with
/// (for example a regex rule carries its pattern). The behaviour of each rule
/// lives outside this crate; here a rule is just a name to dispatch on.
#[derive(Clone, Debug, PartialEq)]
pub struct MatchingRule {
    pub name: String,
    pub attributes: Map<String, Value>,
}

impl MatchingRule {
    pub fn new(name: impl Into<String>) -> Self {
        MatchingRule {
            name: name.into(),
            attributes: Map::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    /// Collection-shaped rules (min/max length variants of the type rule)
    /// degrade to a plain type check when applied to a single item.
    pub fn for_single_item(&self) -> MatchingRule {
        match self.name.as_str() {
            "min-type" | "max-type" | "min-max-type" => MatchingRule::new("type"),
            _ => self.clone(),
        }
    }

    /// Human readable description of this rule, used in plan annotations.
    pub fn description(&self) -> String {
        match self.name.as_str() {
            "equality" => "must be equal to the expected value".to_string(),
            "type" => "must match by type".to_string(),
            "regex" => match self.attributes.get("regex") {
                Some(Value::String(regex)) => {
                    format!("must match the regular expression /{}/", regex)
                }
                _ => "must match a regular expression".to_string(),
            },
            name => format!("must match the '{}' rule", name),
        }
    }
}

/// How the rules in a list combine.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RuleLogic {
    #[default]
    And,
    Or,
}

/// The rules configured for one path expression. A list is `cascaded` when it
/// was selected for a longer concrete path than its own expression covers,
/// meaning it applies by inheritance rather than directly.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RuleList {
    pub rules: Vec<MatchingRule>,
    pub rule_logic: RuleLogic,
    pub cascaded: bool,
}

impl RuleList {
    pub fn new(rule: MatchingRule) -> Self {
        RuleList {
            rules: vec![rule],
            rule_logic: RuleLogic::And,
            cascaded: false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Describe the rule list for use in a plan annotation. When describing a
    /// collection the description applies to each item of it.
    pub fn generate_description(&self, for_collection: bool) -> String {
        let separator = match self.rule_logic {
            RuleLogic::And => " AND ",
            RuleLogic::Or => " OR ",
        };
        let description = self
            .rules
            .iter()
            .map(|rule| rule.description())
            .collect::<Vec<_>>()
            .join(separator);
        if for_collection {
            format!("each value {}", description)
        } else {
            description
        }
    }
}

/// The matching rules for one part of a request (method, path, query, header
/// or body), keyed by the path expression they were defined against.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MatchingRuleCategory {
    pub name: String,
    pub rules: HashMap<DocPath, RuleList>,
}

impl MatchingRuleCategory {
    pub fn empty(name: impl Into<String>) -> Self {
        MatchingRuleCategory {
            name: name.into(),
            rules: HashMap::new(),
        }
    }

    /// Add a rule at the given path, combining with any existing rules at
    /// that path using the given logic.
    pub fn add_rule(&mut self, path: DocPath, rule: MatchingRule, logic: RuleLogic) {
        let entry = self.rules.entry(path).or_default();
        entry.rule_logic = logic;
        entry.rules.push(rule);
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// True if any rule expression matches the concrete path with a non-zero
    /// weight.
    pub fn matcher_is_defined(&self, path: &[&str]) -> bool {
        self.rules.keys().any(|expr| expr.matches_path(path))
    }

    /// Select the most specific rule list for the concrete path. Candidates
    /// are ranked by weight, with the longer expression winning a tie; the
    /// returned list is flagged as cascaded when the winning expression is
    /// shorter than the concrete path.
    pub fn select_best_matcher(&self, path: &[&str]) -> RuleList {
        let best = self
            .rules
            .iter()
            .map(|(expr, rules)| (expr, expr.path_weight(path), rules))
            .filter(|(_, (weight, _), _)| *weight > 0)
            .max_by_key(|(expr, (weight, _), _)| (*weight, expr.to_string().len()));
        match best {
            Some((_, (_, tokens_matched), rules)) => RuleList {
                cascaded: tokens_matched < path.len(),
                ..rules.clone()
            },
            None => RuleList::default(),
        }
    }
}

/// All the matching rules recorded for an interaction, grouped by category.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MatchingRules {
    pub categories: HashMap<String, MatchingRuleCategory>,
}

impl MatchingRules {
    pub fn add_category(&mut self, name: impl Into<String>) -> &mut MatchingRuleCategory {
        let name = name.into();
        self.categories
            .entry(name.clone())
            .or_insert_with(|| MatchingRuleCategory::empty(name))
    }

    pub fn rules_for_category(&self, name: &str) -> MatchingRuleCategory {
        self.categories
            .get(name)
            .cloned()
            .unwrap_or_else(|| MatchingRuleCategory::empty(name))
    }
}
