//! Folding an evaluated execution plan into the structured mismatch report
//! consumed by verification reporting.

use serde::Serialize;

use crate::plan::{ExecutionPlan, ExecutionPlanNode, PlanNodeType, Terminator};
use crate::result::NodeResult;

/// A single mismatch: what was being compared and the error describing how
/// it failed.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Mismatch {
    pub description: String,
    pub mismatch: String,
}

/// The mismatches for one key of a keyed request part (one query parameter
/// or one header), or for one path into the body. Errors not attributable to
/// any key are grouped under an empty key.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MismatchGroup {
    pub key: String,
    pub mismatches: Vec<String>,
}

/// Outcome of matching the request body.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub enum BodyMatchResult {
    /// The body matched
    #[default]
    Ok,
    /// The body content type was wrong, so the content was never compared
    BodyTypeMismatch { message: String },
    /// Itemised mismatches, keyed by the path into the body
    BodyMismatches(Vec<MismatchGroup>),
}

impl BodyMatchResult {
    pub fn is_ok(&self) -> bool {
        matches!(self, BodyMatchResult::Ok)
    }
}

/// The structured result of matching a request, one field per request part.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct RequestMatchResult {
    pub method: Option<Mismatch>,
    pub path: Option<Mismatch>,
    pub query: Vec<MismatchGroup>,
    pub headers: Vec<MismatchGroup>,
    pub body: BodyMatchResult,
}

impl RequestMatchResult {
    /// True when no part of the request mismatched.
    pub fn all_matched(&self) -> bool {
        self.method.is_none()
            && self.path.is_none()
            && self.query.is_empty()
            && self.headers.is_empty()
            && self.body.is_ok()
    }

    /// Every mismatch message in the result, flattened.
    pub fn mismatches(&self) -> Vec<String> {
        let mut mismatches = vec![];
        if let Some(method) = &self.method {
            mismatches.push(method.mismatch.clone());
        }
        if let Some(path) = &self.path {
            mismatches.push(path.mismatch.clone());
        }
        for group in self.query.iter().chain(self.headers.iter()) {
            mismatches.extend(group.mismatches.iter().cloned());
        }
        match &self.body {
            BodyMatchResult::Ok => {}
            BodyMatchResult::BodyTypeMismatch { message } => mismatches.push(message.clone()),
            BodyMatchResult::BodyMismatches(groups) => {
                for group in groups {
                    mismatches.extend(group.mismatches.iter().cloned());
                }
            }
        }
        mismatches
    }
}

impl ExecutionPlan {
    /// Transform this evaluated plan into the structured request match
    /// result, by fetching the well-known request part nodes and collecting
    /// their aggregated errors.
    pub fn into_request_match_result(&self) -> RequestMatchResult {
        RequestMatchResult {
            method: part_mismatch(self.fetch_node(&[":request", ":method"]), "method"),
            path: part_mismatch(self.fetch_node(&[":request", ":path"]), "path"),
            query: keyed_mismatches(self.fetch_node(&[":request", ":query parameters"])),
            headers: keyed_mismatches(self.fetch_node(&[":request", ":headers"])),
            body: body_match_result(self.fetch_node(&[":request", ":body"])),
        }
    }
}

fn part_mismatch(node: Option<ExecutionPlanNode>, part: &str) -> Option<Mismatch> {
    node.and_then(|node| node.error()).map(|error| Mismatch {
        description: format!("Request {} mismatch", part),
        mismatch: error,
    })
}

// One group per key container with errors, plus a group under the empty key
// for any errors not attached to a key container.
fn keyed_mismatches(node: Option<ExecutionPlanNode>) -> Vec<MismatchGroup> {
    let Some(node) = node else {
        return vec![];
    };
    let mut groups = vec![];
    for child in &node.children {
        if let PlanNodeType::Container(label) = &child.node_type {
            let errors = child.errors();
            if !errors.is_empty() {
                groups.push(MismatchGroup {
                    key: label.clone(),
                    mismatches: errors,
                });
            }
        }
    }
    let unkeyed = node.child_errors(Terminator::Containers);
    if !unkeyed.is_empty() {
        groups.push(MismatchGroup {
            key: String::new(),
            mismatches: unkeyed,
        });
    }
    groups
}

fn body_match_result(node: Option<ExecutionPlanNode>) -> BodyMatchResult {
    let Some(node) = node else {
        return BodyMatchResult::Ok;
    };
    if node.result.as_ref().is_some_and(|result| result.is_truthy()) {
        return BodyMatchResult::Ok;
    }

    if node.is_leaf_node() {
        if let Some(NodeResult::Error(message)) = &node.result {
            return BodyMatchResult::BodyMismatches(vec![MismatchGroup {
                key: String::new(),
                mismatches: vec![message.clone()],
            }]);
        }
    }

    let first_error = node.error();
    if let Some(first) = &first_error {
        if first.to_lowercase().starts_with("body type error") {
            return BodyMatchResult::BodyTypeMismatch {
                message: first.clone(),
            };
        }
    }

    let mut groups = node.traverse_containers(vec![], &mut |mut acc: Vec<MismatchGroup>,
                                                            label,
                                                            container| {
        let errors = container.child_errors(Terminator::Containers);
        if !errors.is_empty() {
            acc.push(MismatchGroup {
                key: label.to_string(),
                mismatches: errors,
            });
        }
        acc
    });

    if let Some(first) = first_error {
        let attributed = groups.iter().any(|group| group.mismatches.contains(&first));
        if !attributed {
            groups.push(MismatchGroup {
                key: String::new(),
                mismatches: vec![first],
            });
        }
    }

    if groups.is_empty() {
        BodyMatchResult::Ok
    } else {
        BodyMatchResult::BodyMismatches(groups)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::NodeValue;

    #[test]
    fn test_method_mismatch_is_reported() {
        let mut action = ExecutionPlanNode::action("match:equality");
        action.result = Some(NodeResult::Error("expected GET got POST".to_string()));
        let mut method = ExecutionPlanNode::container("method");
        method.add(action);
        let mut plan = ExecutionPlan::new("request");
        plan.add(method);

        let result = plan.into_request_match_result();
        assert_eq!(
            result.method,
            Some(Mismatch {
                description: "Request method mismatch".to_string(),
                mismatch: "expected GET got POST".to_string(),
            })
        );
        assert_eq!(result.path, None);
        assert!(result.query.is_empty());
        assert!(result.headers.is_empty());
        assert!(result.body.is_ok());
        assert!(!result.all_matched());
    }

    #[test]
    fn test_fully_matched_plan() {
        let mut method = ExecutionPlanNode::container("method");
        method.result = Some(NodeResult::Value(NodeValue::Bool(true)));
        let mut plan = ExecutionPlan::new("request");
        plan.add(method);
        assert!(plan.into_request_match_result().all_matched());
    }

    #[test]
    fn test_query_mismatches_are_grouped_by_key() {
        let mut check = ExecutionPlanNode::action("expect:entries");
        check.result = Some(NodeResult::Error("missing query parameter 'a'".to_string()));
        let mut key_container = ExecutionPlanNode::container("a");
        key_container.add(check);

        let mut stray = ExecutionPlanNode::action("expect:empty");
        stray.result = Some(NodeResult::Error("unexpected parameter 'b'".to_string()));

        let mut query = ExecutionPlanNode::container("query parameters");
        query.add(key_container);
        query.add(stray);
        let mut plan = ExecutionPlan::new("request");
        plan.add(query);

        let result = plan.into_request_match_result();
        assert_eq!(
            result.query,
            vec![
                MismatchGroup {
                    key: "a".to_string(),
                    mismatches: vec!["missing query parameter 'a'".to_string()],
                },
                MismatchGroup {
                    key: String::new(),
                    mismatches: vec!["unexpected parameter 'b'".to_string()],
                },
            ]
        );
    }

    #[test]
    fn test_body_type_error_short_circuits() {
        let mut check = ExecutionPlanNode::action("if");
        check.result = Some(NodeResult::Error(
            "Body type error - expected application/json".to_string(),
        ));
        let mut body = ExecutionPlanNode::container("body");
        body.result = Some(NodeResult::Value(NodeValue::Bool(false)));
        body.add(check);
        let mut plan = ExecutionPlan::new("request");
        plan.add(body);

        let result = plan.into_request_match_result();
        assert_eq!(
            result.body,
            BodyMatchResult::BodyTypeMismatch {
                message: "Body type error - expected application/json".to_string()
            }
        );
    }

    #[test]
    fn test_body_mismatches_keyed_by_container() {
        let mut check = ExecutionPlanNode::action("match:equality");
        check.result = Some(NodeResult::Error("expected 1 got 2".to_string()));
        let mut item = ExecutionPlanNode::container("$.a");
        item.add(check);
        let mut body = ExecutionPlanNode::container("body");
        body.result = Some(NodeResult::Value(NodeValue::Bool(false)));
        body.add(item);
        let mut plan = ExecutionPlan::new("request");
        plan.add(body);

        let result = plan.into_request_match_result();
        assert_eq!(
            result.body,
            BodyMatchResult::BodyMismatches(vec![MismatchGroup {
                key: "$.a".to_string(),
                mismatches: vec!["expected 1 got 2".to_string()],
            }])
        );
    }

    #[test]
    fn test_missing_sections_report_nothing() {
        let plan = ExecutionPlan::new("request");
        let result = plan.into_request_match_result();
        assert!(result.all_matched());
    }
}
