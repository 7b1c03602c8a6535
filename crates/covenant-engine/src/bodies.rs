//! Plan builders for request bodies, one per supported content type.

use std::fmt::Debug;
use std::sync::Arc;

use bytes::Bytes;
use once_cell::sync::Lazy;
use serde_json::Value;
use tracing::trace;

use covenant_models::rules::RuleList;
use covenant_models::DocPath;

use crate::builder::matching_rule_node;
use crate::context::PlanMatchingContext;
use crate::plan::ExecutionPlanNode;
use crate::value::NodeValue;

/// Builds the section of an execution plan that checks a request body.
pub trait PlanBodyBuilder: Debug {
    /// Namespace the builder's plan nodes resolve values in, if any.
    fn namespace(&self) -> Option<String> {
        None
    }

    /// If this builder supports the given content type.
    fn supports_type(&self, content_type: &str) -> bool;

    /// Build the plan for the expected body.
    fn build_plan(
        &self,
        content: &Bytes,
        context: &PlanMatchingContext,
    ) -> anyhow::Result<ExecutionPlanNode>;
}

static BODY_PLAN_BUILDERS: Lazy<Vec<Arc<dyn PlanBodyBuilder + Send + Sync>>> =
    Lazy::new(|| vec![Arc::new(JsonPlanBuilder)]);

/// The first registered builder supporting the content type, falling back to
/// a plain text equality check.
pub fn plan_builder_for_content_type(
    content_type: &str,
) -> Arc<dyn PlanBodyBuilder + Send + Sync> {
    BODY_PLAN_BUILDERS
        .iter()
        .find(|builder| builder.supports_type(content_type))
        .cloned()
        .unwrap_or_else(|| Arc::new(PlainTextBuilder))
}

/// Plan builder for plain text. This just sets up an equality matcher on the
/// UTF8 decoded body.
#[derive(Clone, Debug)]
pub struct PlainTextBuilder;

impl PlanBodyBuilder for PlainTextBuilder {
    fn supports_type(&self, content_type: &str) -> bool {
        content_type.starts_with("text/")
    }

    fn build_plan(
        &self,
        content: &Bytes,
        _context: &PlanMatchingContext,
    ) -> anyhow::Result<ExecutionPlanNode> {
        let text_content = String::from_utf8_lossy(content).to_string();
        let mut node = ExecutionPlanNode::action("match:equality");
        let mut child_node = ExecutionPlanNode::action("convert:UTF8");
        child_node.add(ExecutionPlanNode::resolve_value(DocPath::new_unwrap(
            "$.body",
        )));
        node.add(ExecutionPlanNode::value_node(text_content));
        node.add(child_node);
        node.add(ExecutionPlanNode::value_node(NodeValue::Null));
        Ok(node)
    }
}

/// Plan builder for JSON bodies.
#[derive(Clone, Debug)]
pub struct JsonPlanBuilder;

impl JsonPlanBuilder {
    fn process_body_node(
        context: &PlanMatchingContext,
        json: &Value,
        path: &DocPath,
        root_node: &mut ExecutionPlanNode,
    ) {
        trace!(%json, %path, "processing body node");
        match json {
            Value::Array(items) => Self::process_array(context, json, items, path, root_node),
            Value::Object(entries) => Self::process_object(context, json, entries, path, root_node),
            _ => {
                if context.matcher_is_defined(path) {
                    let matchers = context.select_best_matcher(path);
                    root_node.add(ExecutionPlanNode::annotation(format!(
                        "{} {}",
                        path.last_field().unwrap_or_default(),
                        matchers.generate_description(false)
                    )));
                    root_node.add(matching_rule_node(
                        ExecutionPlanNode::value_node(json.clone()),
                        ExecutionPlanNode::resolve_current_value(path),
                        &matchers,
                        false,
                    ));
                } else {
                    let mut match_node = ExecutionPlanNode::action("match:equality");
                    match_node
                        .add(ExecutionPlanNode::value_node(NodeValue::Namespaced(
                            "json".to_string(),
                            json.to_string(),
                        )))
                        .add(ExecutionPlanNode::resolve_current_value(path))
                        .add(ExecutionPlanNode::value_node(NodeValue::Null));
                    root_node.add(match_node);
                }
            }
        }
    }

    fn process_array(
        context: &PlanMatchingContext,
        json: &Value,
        items: &[Value],
        path: &DocPath,
        root_node: &mut ExecutionPlanNode,
    ) {
        if context.matcher_is_defined(path) {
            let matchers = context.select_best_matcher(path);
            root_node.add(ExecutionPlanNode::annotation(format!(
                "{} {}",
                path.last_field().unwrap_or_default(),
                matchers.generate_description(true)
            )));
            root_node.add(matching_rule_node(
                ExecutionPlanNode::value_node(json.clone()),
                ExecutionPlanNode::resolve_current_value(path),
                &matchers,
                true,
            ));

            // Each item of the actual array is matched against the first
            // expected item as a template.
            if let Some(template) = items.first() {
                let mut for_each_node = ExecutionPlanNode::action("for-each");
                let item_path = path.join("[*]");
                for_each_node.add(ExecutionPlanNode::resolve_current_value(path));
                let mut item_node = ExecutionPlanNode::container(item_path.to_string());
                match template {
                    Value::Array(_) | Value::Object(_) => {
                        Self::process_body_node(context, template, &item_path, &mut item_node);
                    }
                    _ => {
                        let mut presence_check = ExecutionPlanNode::action("if");
                        presence_check.add(
                            ExecutionPlanNode::action("check:exists")
                                .add(ExecutionPlanNode::resolve_current_value(&item_path)),
                        );
                        if context.matcher_is_defined(&item_path) {
                            let matchers = context.select_best_matcher(&item_path);
                            presence_check.add(ExecutionPlanNode::annotation(format!(
                                "[*] {}",
                                matchers.generate_description(false)
                            )));
                            presence_check.add(matching_rule_node(
                                ExecutionPlanNode::value_node(template.clone()),
                                ExecutionPlanNode::resolve_current_value(&item_path),
                                &matchers,
                                false,
                            ));
                        } else {
                            presence_check.add(
                                ExecutionPlanNode::action("match:equality")
                                    .add(ExecutionPlanNode::value_node(NodeValue::Namespaced(
                                        "json".to_string(),
                                        template.to_string(),
                                    )))
                                    .add(ExecutionPlanNode::resolve_current_value(&item_path))
                                    .add(ExecutionPlanNode::value_node(NodeValue::Null)),
                            );
                        }
                        item_node.add(presence_check);
                    }
                }
                for_each_node.add(item_node);
                root_node.add(for_each_node);
            }
        } else if items.is_empty() {
            root_node.add(
                ExecutionPlanNode::action("json:expect:empty")
                    .add(ExecutionPlanNode::value_node("ARRAY"))
                    .add(ExecutionPlanNode::resolve_current_value(path)),
            );
        } else {
            root_node.add(
                ExecutionPlanNode::action("json:match:length")
                    .add(ExecutionPlanNode::value_node("ARRAY"))
                    .add(ExecutionPlanNode::value_node(items.len()))
                    .add(ExecutionPlanNode::resolve_current_value(path)),
            );

            for (index, item) in items.iter().enumerate() {
                let item_path = path.join_index(index);
                let mut item_node = ExecutionPlanNode::container(item_path.to_string());
                match item {
                    Value::Array(_) | Value::Object(_) => {
                        Self::process_body_node(context, item, &item_path, &mut item_node);
                        root_node.add(item_node);
                    }
                    _ => {
                        let mut presence_check = ExecutionPlanNode::action("if");
                        presence_check.add(
                            ExecutionPlanNode::action("check:exists")
                                .add(ExecutionPlanNode::resolve_current_value(&item_path)),
                        );
                        if context.matcher_is_defined(&item_path) {
                            let matchers = context.select_best_matcher(&item_path);
                            presence_check.add(ExecutionPlanNode::annotation(format!(
                                "[{}] {}",
                                index,
                                matchers.generate_description(false)
                            )));
                            presence_check.add(matching_rule_node(
                                ExecutionPlanNode::value_node(item.clone()),
                                ExecutionPlanNode::resolve_current_value(&item_path),
                                &matchers,
                                false,
                            ));
                        } else {
                            presence_check.add(
                                ExecutionPlanNode::action("match:equality")
                                    .add(ExecutionPlanNode::value_node(NodeValue::Namespaced(
                                        "json".to_string(),
                                        item.to_string(),
                                    )))
                                    .add(ExecutionPlanNode::resolve_current_value(&item_path))
                                    .add(ExecutionPlanNode::value_node(NodeValue::Null)),
                            );
                        }
                        item_node.add(presence_check);
                        root_node.add(item_node);
                    }
                }
            }
        }
    }

    fn process_object(
        context: &PlanMatchingContext,
        json: &Value,
        entries: &serde_json::Map<String, Value>,
        path: &DocPath,
        root_node: &mut ExecutionPlanNode,
    ) {
        let rules = context.select_best_matcher(path);
        if !rules.is_empty() && applies_to_map_entries(&rules) {
            root_node.add(ExecutionPlanNode::annotation(
                rules.generate_description(true),
            ));
            root_node.add(matching_rule_node(
                ExecutionPlanNode::value_node(json.clone()),
                ExecutionPlanNode::resolve_current_value(path),
                &rules,
                true,
            ));
        } else if entries.is_empty() {
            root_node.add(
                ExecutionPlanNode::action("json:expect:empty")
                    .add(ExecutionPlanNode::value_node("OBJECT"))
                    .add(ExecutionPlanNode::resolve_current_value(path)),
            );
        } else {
            let keys = NodeValue::StringList(entries.keys().cloned().collect());
            root_node.add(
                ExecutionPlanNode::action("json:expect:entries")
                    .add(ExecutionPlanNode::value_node("OBJECT"))
                    .add(ExecutionPlanNode::value_node(keys.clone()))
                    .add(ExecutionPlanNode::resolve_current_value(path)),
            );
            if !context.config.allow_unexpected_entries {
                root_node.add(
                    ExecutionPlanNode::action("expect:only-entries")
                        .add(ExecutionPlanNode::value_node(keys))
                        .add(ExecutionPlanNode::resolve_current_value(path)),
                );
            } else {
                root_node.add(
                    ExecutionPlanNode::action("json:expect:not-empty")
                        .add(ExecutionPlanNode::value_node("OBJECT"))
                        .add(ExecutionPlanNode::resolve_current_value(path)),
                );
            }
        }

        for (key, value) in entries {
            let item_path = path.join_field(key);
            let mut item_node = ExecutionPlanNode::container(item_path.to_string());
            Self::process_body_node(context, value, &item_path, &mut item_node);
            root_node.add(item_node);
        }
    }
}

impl PlanBodyBuilder for JsonPlanBuilder {
    fn namespace(&self) -> Option<String> {
        Some("json".to_string())
    }

    fn supports_type(&self, content_type: &str) -> bool {
        content_type.contains("json")
    }

    fn build_plan(
        &self,
        content: &Bytes,
        context: &PlanMatchingContext,
    ) -> anyhow::Result<ExecutionPlanNode> {
        let expected_json: Value = serde_json::from_slice(content)?;
        let mut body_node = ExecutionPlanNode::action("tee");
        body_node.add(
            ExecutionPlanNode::action("json:parse")
                .add(ExecutionPlanNode::resolve_value(DocPath::new_unwrap(
                    "$.body",
                ))),
        );

        let path = DocPath::root();
        let mut root_node = ExecutionPlanNode::container(path.to_string());
        Self::process_body_node(context, &expected_json, &path, &mut root_node);
        body_node.add(root_node);

        Ok(body_node)
    }
}

// Rules like `values` and `each-value` apply to a map as a whole, so the
// per-entry checks are replaced by the rule when one is present.
fn applies_to_map_entries(rules: &RuleList) -> bool {
    rules
        .rules
        .iter()
        .any(|rule| matches!(rule.name.as_str(), "values" | "each-key" | "each-value"))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_plain_text_plan() {
        let content = Bytes::from("hello world");
        let node = PlainTextBuilder
            .build_plan(&content, &PlanMatchingContext::default())
            .unwrap();
        assert_eq!(
            node.str_form(),
            "(%match:equality(('hello world'),(%convert:UTF8(($.body))),(NULL)))"
        );
    }

    #[test]
    fn test_json_primitive_plan() {
        let content = Bytes::from("true");
        let node = JsonPlanBuilder
            .build_plan(&content, &PlanMatchingContext::default())
            .unwrap();
        assert_eq!(
            node.str_form(),
            "(%tee((%json:parse(($.body))),(:$((%match:equality((json:true),(~>$),(NULL)))))))"
        );
    }

    #[test]
    fn test_json_array_plan() {
        let content = Bytes::from("[1, 2]");
        let node = JsonPlanBuilder
            .build_plan(&content, &PlanMatchingContext::default())
            .unwrap();
        let form = node.str_form();
        assert!(form.contains("%json:match:length(('ARRAY'),(UINT(2)),(~>$))"));
        assert!(form.contains(":$[0]((%if((%check:exists((~>$[0]))),(%match:equality((json:1),(~>$[0]),(NULL))))))"));
    }

    #[test]
    fn test_json_object_plan() {
        let content = Bytes::from(json!({"a": 100}).to_string());
        let node = JsonPlanBuilder
            .build_plan(&content, &PlanMatchingContext::default())
            .unwrap();
        let form = node.str_form();
        assert!(form.contains("%json:expect:entries(('OBJECT'),(['a']),(~>$))"));
        assert!(form.contains("%expect:only-entries((['a']),(~>$))"));
        assert!(form.contains(":$.a((%match:equality((json:100),(~>$.a),(NULL))))"));
    }

    #[test]
    fn test_json_empty_containers() {
        let content = Bytes::from("{}");
        let node = JsonPlanBuilder
            .build_plan(&content, &PlanMatchingContext::default())
            .unwrap();
        assert!(node
            .str_form()
            .contains("%json:expect:empty(('OBJECT'),(~>$))"));

        let content = Bytes::from("[]");
        let node = JsonPlanBuilder
            .build_plan(&content, &PlanMatchingContext::default())
            .unwrap();
        assert!(node
            .str_form()
            .contains("%json:expect:empty(('ARRAY'),(~>$))"));
    }

    #[test]
    fn test_builder_lookup() {
        let builder = plan_builder_for_content_type("application/json");
        assert_eq!(builder.namespace(), Some("json".to_string()));
        let builder = plan_builder_for_content_type("text/plain");
        assert!(builder.namespace().is_none());
    }
}
