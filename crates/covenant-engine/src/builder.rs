//! Constructing execution plans from an expected HTTP request.
//!
//! The plan for a request is a container per request part (method, path,
//! query parameters, headers, body), each holding the checks that part needs.
//! Plans are built once from the expected request and can be executed any
//! number of times against actual requests.

use itertools::Itertools;
use serde_json::Value;
use tracing::trace;

use covenant_models::headers::{is_parameterised_header, parse_header_value};
use covenant_models::request::{Body, HttpRequest};
use covenant_models::rules::{RuleList, RuleLogic};
use covenant_models::DocPath;

use crate::bodies::plan_builder_for_content_type;
use crate::context::PlanMatchingContext;
use crate::plan::{ExecutionPlan, ExecutionPlanNode};
use crate::value::NodeValue;

/// Builds the execution plan for matching the expected HTTP request.
pub fn build_request_plan(
    expected: &HttpRequest,
    context: &PlanMatchingContext,
) -> anyhow::Result<ExecutionPlan> {
    trace!(?expected, "building request execution plan");
    let mut plan = ExecutionPlan::new("request");

    plan.add(method_plan(expected, &context.for_method()));
    plan.add(path_plan(expected, &context.for_path()));
    plan.add(query_plan(expected, &context.for_query()));
    plan.add(header_plan(expected, &context.for_headers()));
    plan.add(body_plan(expected, &context.for_body())?);

    Ok(plan)
}

fn method_plan(expected: &HttpRequest, _context: &PlanMatchingContext) -> ExecutionPlanNode {
    let mut method_container = ExecutionPlanNode::container("method");
    let expected_method = expected.method.to_uppercase();

    let mut match_method = ExecutionPlanNode::action("match:equality");
    match_method
        .add(ExecutionPlanNode::value_node(expected_method.as_str()))
        .add(
            ExecutionPlanNode::action("upper-case")
                .add(ExecutionPlanNode::resolve_value(DocPath::new_unwrap(
                    "$.method",
                ))),
        )
        .add(ExecutionPlanNode::value_node(NodeValue::Null));

    method_container.add(ExecutionPlanNode::annotation(format!(
        "method == {}",
        expected_method
    )));
    method_container.add(match_method);

    method_container
}

fn path_plan(expected: &HttpRequest, context: &PlanMatchingContext) -> ExecutionPlanNode {
    let mut plan_node = ExecutionPlanNode::container("path");

    let doc_path = DocPath::new_unwrap("$.path");
    let expected_node = ExecutionPlanNode::value_node(expected.path.as_str());
    let actual_node = ExecutionPlanNode::resolve_value(&doc_path);
    if context.matcher_is_defined(&doc_path) {
        let matchers = context.select_best_matcher(&doc_path);
        plan_node.add(ExecutionPlanNode::annotation(format!(
            "path {}",
            matchers.generate_description(false)
        )));
        plan_node.add(matching_rule_node(expected_node, actual_node, &matchers, false));
    } else {
        plan_node.add(ExecutionPlanNode::annotation(format!(
            "path == '{}'",
            expected.path
        )));
        plan_node.add(
            ExecutionPlanNode::action("match:equality")
                .add(expected_node)
                .add(actual_node)
                .add(ExecutionPlanNode::value_node(NodeValue::Null)),
        );
    }

    plan_node
}

fn query_plan(expected: &HttpRequest, context: &PlanMatchingContext) -> ExecutionPlanNode {
    let mut plan_node = ExecutionPlanNode::container("query parameters");
    let doc_path = DocPath::new_unwrap("$.query");

    let query = expected.query.clone().unwrap_or_default();
    if query.is_empty() {
        plan_node.add(
            ExecutionPlanNode::action("expect:empty")
                .add(ExecutionPlanNode::resolve_value(&doc_path))
                .add(
                    ExecutionPlanNode::action("join")
                        .add(ExecutionPlanNode::value_node(
                            "Expected no query parameters but got ",
                        ))
                        .add(ExecutionPlanNode::resolve_value(&doc_path)),
                ),
        );
    } else {
        let keys = query.keys().cloned().sorted().collect_vec();
        for key in &keys {
            let value = &query[key];
            let mut item_node = ExecutionPlanNode::container(key);

            let item_value = if value.len() == 1 {
                NodeValue::String(value[0].clone())
            } else {
                NodeValue::StringList(value.clone())
            };
            let mut presence_check = ExecutionPlanNode::action("if");
            presence_check.add(
                ExecutionPlanNode::action("check:exists")
                    .add(ExecutionPlanNode::resolve_value(doc_path.join(key))),
            );

            // Query rules are defined against the parameter name, so the
            // lookup path is rooted at the parameter rather than `$.query`.
            let item_path = DocPath::root().join(key);
            let path = doc_path.join(key);
            if context.matcher_is_defined(&item_path) {
                let matchers = context.select_best_matcher(&item_path);
                item_node.add(ExecutionPlanNode::annotation(format!(
                    "{} {}",
                    key,
                    matchers.generate_description(true)
                )));
                presence_check.add(matching_rule_node(
                    ExecutionPlanNode::value_node(item_value),
                    ExecutionPlanNode::resolve_value(&path),
                    &matchers,
                    true,
                ));
            } else {
                item_node.add(ExecutionPlanNode::annotation(format!(
                    "{}={}",
                    key,
                    item_value.str_form()
                )));
                let mut item_check = ExecutionPlanNode::action("match:equality");
                item_check
                    .add(ExecutionPlanNode::value_node(item_value))
                    .add(ExecutionPlanNode::resolve_value(&path))
                    .add(ExecutionPlanNode::value_node(NodeValue::Null));
                presence_check.add(item_check);
            }

            item_node.add(presence_check);
            plan_node.add(item_node);
        }

        plan_node.add(
            ExecutionPlanNode::action("expect:entries")
                .add(ExecutionPlanNode::value_node(NodeValue::StringList(
                    keys.clone(),
                )))
                .add(ExecutionPlanNode::resolve_value(&doc_path))
                .add(
                    ExecutionPlanNode::action("join")
                        .add(ExecutionPlanNode::value_node(
                            "The following expected query parameters were missing: ",
                        ))
                        .add(
                            ExecutionPlanNode::action("join-with")
                                .add(ExecutionPlanNode::value_node(", "))
                                .add(
                                    ExecutionPlanNode::splat()
                                        .add(ExecutionPlanNode::apply()),
                                ),
                        ),
                ),
        );

        plan_node.add(
            ExecutionPlanNode::action("expect:only-entries")
                .add(ExecutionPlanNode::value_node(NodeValue::StringList(keys)))
                .add(ExecutionPlanNode::resolve_value(&doc_path))
                .add(
                    ExecutionPlanNode::action("join")
                        .add(ExecutionPlanNode::value_node(
                            "The following query parameters were not expected: ",
                        ))
                        .add(
                            ExecutionPlanNode::action("join-with")
                                .add(ExecutionPlanNode::value_node(", "))
                                .add(
                                    ExecutionPlanNode::splat()
                                        .add(ExecutionPlanNode::apply()),
                                ),
                        ),
                ),
        );
    }

    plan_node
}

fn header_plan(expected: &HttpRequest, context: &PlanMatchingContext) -> ExecutionPlanNode {
    let mut plan_node = ExecutionPlanNode::container("headers");
    let doc_path = DocPath::new_unwrap("$.headers");

    let headers = expected.headers.clone().unwrap_or_default();
    if !headers.is_empty() {
        let keys = headers.keys().cloned().sorted().collect_vec();
        for key in &keys {
            let value = &headers[key];
            let mut item_node = ExecutionPlanNode::container(key);
            let path = doc_path.join(key);

            let item_value = if value.len() == 1 {
                NodeValue::String(value[0].clone())
            } else {
                NodeValue::StringList(value.clone())
            };
            let mut presence_check = ExecutionPlanNode::action("if");
            presence_check.add(
                ExecutionPlanNode::action("check:exists")
                    .add(ExecutionPlanNode::resolve_value(&path)),
            );

            if context.matcher_is_defined(&path) {
                let matchers = context.select_best_matcher(&path);
                item_node.add(ExecutionPlanNode::annotation(format!(
                    "{} {}",
                    key,
                    matchers.generate_description(true)
                )));
                presence_check.add(matching_rule_node(
                    ExecutionPlanNode::value_node(item_value),
                    ExecutionPlanNode::resolve_value(&path),
                    &matchers,
                    true,
                ));
            } else if is_parameterised_header(key) {
                item_node.add(ExecutionPlanNode::annotation(format!(
                    "{}={}",
                    key,
                    item_value.str_form()
                )));
                if value.len() == 1 {
                    presence_check.add(parameterised_header_plan(&path, &value[0]));
                } else {
                    for (index, header_value) in value.iter().enumerate() {
                        let item_path = doc_path.join(key).join_index(index);
                        let mut index_node = ExecutionPlanNode::container(index.to_string());
                        index_node.add(parameterised_header_plan(&item_path, header_value));
                        presence_check.add(index_node);
                    }
                }
            } else {
                item_node.add(ExecutionPlanNode::annotation(format!(
                    "{}={}",
                    key,
                    item_value.str_form()
                )));
                let mut item_check = ExecutionPlanNode::action("match:equality");
                item_check
                    .add(ExecutionPlanNode::value_node(item_value))
                    .add(ExecutionPlanNode::resolve_value(&path))
                    .add(ExecutionPlanNode::value_node(NodeValue::Null));
                presence_check.add(item_check);
            }

            item_node.add(presence_check);
            plan_node.add(item_node);
        }

        plan_node.add(
            ExecutionPlanNode::action("expect:entries")
                .add(
                    ExecutionPlanNode::action("lower-case").add(
                        ExecutionPlanNode::value_node(NodeValue::StringList(keys.clone())),
                    ),
                )
                .add(ExecutionPlanNode::resolve_value(&doc_path))
                .add(
                    ExecutionPlanNode::action("join")
                        .add(ExecutionPlanNode::value_node(
                            "The following expected headers were missing: ",
                        ))
                        .add(
                            ExecutionPlanNode::action("join-with")
                                .add(ExecutionPlanNode::value_node(", "))
                                .add(
                                    ExecutionPlanNode::splat()
                                        .add(ExecutionPlanNode::apply()),
                                ),
                        ),
                ),
        );

        if !context.config.allow_unexpected_entries {
            plan_node.add(
                ExecutionPlanNode::action("expect:only-entries")
                    .add(
                        ExecutionPlanNode::action("lower-case")
                            .add(ExecutionPlanNode::value_node(NodeValue::StringList(keys))),
                    )
                    .add(ExecutionPlanNode::resolve_value(&doc_path))
                    .add(
                        ExecutionPlanNode::action("join")
                            .add(ExecutionPlanNode::value_node(
                                "The following headers were unexpected: ",
                            ))
                            .add(
                                ExecutionPlanNode::action("join-with")
                                    .add(ExecutionPlanNode::value_node(", "))
                                    .add(
                                        ExecutionPlanNode::splat()
                                            .add(ExecutionPlanNode::apply()),
                                    ),
                            ),
                    ),
            );
        }
    }

    plan_node
}

// Parameterised headers (content-type, accept) are compared on their base
// value, with each parameter checked individually so a parameter mismatch
// reports the parameter rather than the whole header.
fn parameterised_header_plan(doc_path: &DocPath, value: &str) -> ExecutionPlanNode {
    let (header_value, header_params) = parse_header_value(value);

    let mut apply_node = ExecutionPlanNode::action("tee");
    apply_node.add(
        ExecutionPlanNode::action("header:parse")
            .add(ExecutionPlanNode::resolve_value(doc_path)),
    );
    apply_node.add(
        ExecutionPlanNode::action("match:equality")
            .add(ExecutionPlanNode::value_node(header_value))
            .add(
                ExecutionPlanNode::action("to-string").add(
                    ExecutionPlanNode::resolve_current_value(
                        DocPath::root().join_field("value"),
                    ),
                ),
            )
            .add(ExecutionPlanNode::value_node(NodeValue::Null)),
    );

    let parameter_path = DocPath::root().join_field("parameters");
    for (name, param_value) in &header_params {
        let mut parameter_node = ExecutionPlanNode::container(name);
        parameter_node.add(
            ExecutionPlanNode::action("if")
                .add(
                    ExecutionPlanNode::action("check:exists").add(
                        ExecutionPlanNode::resolve_current_value(parameter_path.join(name)),
                    ),
                )
                .add(
                    ExecutionPlanNode::action("match:equality")
                        .add(ExecutionPlanNode::value_node(param_value.to_lowercase()))
                        .add(ExecutionPlanNode::action("lower-case").add(
                            ExecutionPlanNode::resolve_current_value(parameter_path.join(name)),
                        ))
                        .add(ExecutionPlanNode::value_node(NodeValue::Null)),
                )
                .add(
                    ExecutionPlanNode::action("error").add(ExecutionPlanNode::value_node(
                        format!(
                            "Expected a {} value of '{}' but it was missing",
                            name, param_value
                        ),
                    )),
                ),
        );
        apply_node.add(parameter_node);
    }

    apply_node
}

fn body_plan(
    expected: &HttpRequest,
    context: &PlanMatchingContext,
) -> anyhow::Result<ExecutionPlanNode> {
    let mut plan_node = ExecutionPlanNode::container("body");

    match &expected.body {
        Body::Missing => {}
        Body::Empty | Body::Null => {
            plan_node.add(
                ExecutionPlanNode::action("expect:empty")
                    .add(ExecutionPlanNode::resolve_value(DocPath::new_unwrap(
                        "$.body",
                    ))),
            );
        }
        Body::Present(contents, _) => {
            let content_type = expected
                .content_type()
                .unwrap_or_else(|| "text/plain".to_string());
            let mut content_type_check_node = ExecutionPlanNode::action("if");
            content_type_check_node.add(
                ExecutionPlanNode::action("match:equality")
                    .add(ExecutionPlanNode::value_node(content_type.as_str()))
                    .add(ExecutionPlanNode::resolve_value(DocPath::new_unwrap(
                        "$.content-type",
                    )))
                    .add(ExecutionPlanNode::value_node(NodeValue::Null))
                    .add(
                        ExecutionPlanNode::action("error")
                            .add(ExecutionPlanNode::value_node("Body type error - "))
                            .add(ExecutionPlanNode::apply()),
                    ),
            );

            let builder = plan_builder_for_content_type(&content_type);
            content_type_check_node.add(builder.build_plan(contents, context)?);
            plan_node.add(content_type_check_node);
        }
    }

    Ok(plan_node)
}

/// Plan node applying a list of matching rules to an expected/actual node
/// pair. A single rule becomes one `match:*` action; multiple rules are
/// combined under `and` or `or` per the rule list logic.
pub fn matching_rule_node(
    expected_node: ExecutionPlanNode,
    actual_node: ExecutionPlanNode,
    matchers: &RuleList,
    for_collection: bool,
) -> ExecutionPlanNode {
    if matchers.rules.len() == 1 {
        let matcher = if for_collection {
            matchers.rules[0].clone()
        } else {
            matchers.rules[0].for_single_item()
        };
        let mut plan_node = ExecutionPlanNode::action(format!("match:{}", matcher.name));
        plan_node
            .add(expected_node)
            .add(actual_node)
            .add(ExecutionPlanNode::value_node(NodeValue::Json(
                Value::Object(matcher.attributes),
            )));
        plan_node
    } else {
        let mut logic_node = match matchers.rule_logic {
            RuleLogic::And => ExecutionPlanNode::action("and"),
            RuleLogic::Or => ExecutionPlanNode::action("or"),
        };
        for rule in &matchers.rules {
            let matcher = if for_collection {
                rule.clone()
            } else {
                rule.for_single_item()
            };
            logic_node.add(
                ExecutionPlanNode::action(format!("match:{}", matcher.name))
                    .add(expected_node.clone())
                    .add(actual_node.clone())
                    .add(ExecutionPlanNode::value_node(NodeValue::Json(
                        Value::Object(matcher.attributes),
                    ))),
            );
        }
        logic_node
    }
}
