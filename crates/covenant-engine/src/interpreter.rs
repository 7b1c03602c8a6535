//! Interpreter that executes a matching plan against a request.
//!
//! Execution walks the plan tree depth first. Each visited node is replaced
//! by a copy carrying its evaluation result, so the output of a run is the
//! same tree annotated with results, ready for summary and report generation.

use std::collections::{HashSet, VecDeque};
use std::iter::once;

use anyhow::anyhow;
use itertools::Itertools;
use serde_json::{json, Value};
use tracing::{debug, trace};

use covenant_models::headers::parse_header_value;
use covenant_models::path_exp::PathToken;
use covenant_models::request::HttpRequest;
use covenant_models::rules::MatchingRule;
use covenant_models::DocPath;

use crate::context::PlanMatchingContext;
use crate::plan::{ExecutionPlan, ExecutionPlanNode, PlanNodeType};
use crate::resolver::{HttpRequestValueResolver, ValueResolver};
use crate::result::NodeResult;
use crate::value::NodeValue;

/// Executes the plan against the actual request, returning the executed form
/// of the plan with all results filled in.
pub fn execute_request_plan(
    plan: &ExecutionPlan,
    actual: &HttpRequest,
    context: &PlanMatchingContext,
) -> anyhow::Result<ExecutionPlan> {
    if context.config.log_raw_plan {
        debug!("raw execution plan:\n{}", plan.pretty_form());
    }
    let resolver = HttpRequestValueResolver {
        request: actual.clone(),
    };
    let mut interpreter = ExecutionPlanInterpreter::new_with_context(context);
    let executed = ExecutionPlan::from(interpreter.walk_tree(&[], &plan.plan_root, &resolver)?);
    if context.config.log_executed_plan {
        debug!("executed plan:\n{}", executed.pretty_form());
    }
    if context.config.log_plan_summary {
        debug!(
            "plan summary:\n{}",
            executed.generate_summary(context.config.coloured_output)
        );
    }
    Ok(executed)
}

/// Main interpreter for the matching plan AST.
#[derive(Debug)]
pub struct ExecutionPlanInterpreter {
    /// Stack of intermediate values, driven by pipelines and the apply,
    /// push and pop actions
    value_stack: Vec<Option<NodeResult>>,
    /// Context the plan is executed in
    context: PlanMatchingContext,
}

impl Default for ExecutionPlanInterpreter {
    fn default() -> Self {
        ExecutionPlanInterpreter::new()
    }
}

impl ExecutionPlanInterpreter {
    pub fn new() -> Self {
        ExecutionPlanInterpreter {
            value_stack: vec![],
            context: PlanMatchingContext::default(),
        }
    }

    pub fn new_with_context(context: &PlanMatchingContext) -> Self {
        ExecutionPlanInterpreter {
            value_stack: vec![],
            context: context.clone(),
        }
    }

    /// Walks the tree from the given node, executing all visited nodes.
    pub fn walk_tree(
        &mut self,
        path: &[String],
        node: &ExecutionPlanNode,
        value_resolver: &dyn ValueResolver,
    ) -> anyhow::Result<ExecutionPlanNode> {
        match &node.node_type {
            PlanNodeType::Empty | PlanNodeType::Annotation(_) => Ok(node.clone()),
            PlanNodeType::Container(label) => {
                trace!(?path, %label, "walking container node");
                let mut child_path = path.to_vec();
                child_path.push(label.clone());
                let mut status = NodeResult::Ok;
                let mut result = vec![];
                let mut loop_items = VecDeque::from(node.children.clone());

                while let Some(child) = loop_items.pop_front() {
                    let child_result = self.walk_tree(&child_path, &child, value_resolver)?;
                    status = status.and(&child_result.result);
                    result.push(child_result.clone());
                    if child_result.is_splat() {
                        for item in child_result.children.iter().rev() {
                            loop_items.push_front(item.clone());
                        }
                    }
                }

                Ok(ExecutionPlanNode {
                    node_type: node.node_type.clone(),
                    result: Some(status.truthy()),
                    children: result,
                })
            }
            PlanNodeType::Action(action) => {
                trace!(?path, %action, "walking action node");
                Ok(self.execute_action(action.as_str(), value_resolver, node, path))
            }
            PlanNodeType::Value(value) => {
                trace!(?path, ?value, "walking value node");
                let value = match value {
                    NodeValue::Namespaced(namespace, value) => match namespace.as_str() {
                        "json" => serde_json::from_str(value)
                            .map(NodeValue::Json)
                            .map_err(|err| anyhow!(err)),
                        _ => Err(anyhow!("'{}' is not a known namespace", namespace)),
                    },
                    _ => Ok(value.clone()),
                }?;
                Ok(ExecutionPlanNode {
                    node_type: node.node_type.clone(),
                    result: Some(NodeResult::Value(value)),
                    children: vec![],
                })
            }
            PlanNodeType::Resolve(resolve_path) => {
                trace!(?path, %resolve_path, "walking resolve node");
                let result = match value_resolver.resolve(resolve_path, &self.context) {
                    Ok(value) => NodeResult::Value(value),
                    Err(err) => {
                        trace!(?path, %resolve_path, %err, "resolve failed");
                        NodeResult::Error(err.to_string())
                    }
                };
                Ok(ExecutionPlanNode {
                    node_type: node.node_type.clone(),
                    result: Some(result),
                    children: vec![],
                })
            }
            PlanNodeType::ResolveCurrent(expression) => {
                trace!(?path, %expression, "walking resolve current node");
                let result = match self.resolve_stack_value(expression) {
                    Ok(value) => NodeResult::Value(value),
                    Err(err) => {
                        debug!(?path, %expression, %err, "stack resolve failed");
                        NodeResult::Error(err.to_string())
                    }
                };
                Ok(ExecutionPlanNode {
                    node_type: node.node_type.clone(),
                    result: Some(result),
                    children: vec![],
                })
            }
            PlanNodeType::Pipeline => {
                trace!(?path, "walking pipeline node");
                self.push_result(None);
                let mut child_results = vec![];
                let mut loop_items = VecDeque::from(node.children.clone());

                while let Some(child) = loop_items.pop_front() {
                    let child_result = self.walk_tree(path, &child, value_resolver)?;
                    self.update_result(child_result.result.clone());
                    child_results.push(child_result.clone());
                    if child_result.is_splat() {
                        for item in child_result.children.iter().rev() {
                            loop_items.push_front(item.clone());
                        }
                    }
                }

                let result = self
                    .pop_result()
                    .unwrap_or_else(|| NodeResult::Error("Value from stack is empty".to_string()));
                Ok(ExecutionPlanNode {
                    node_type: node.node_type.clone(),
                    result: Some(result),
                    children: child_results,
                })
            }
            PlanNodeType::Splat => {
                trace!(?path, "walking splat node");
                let mut child_results = vec![];
                for child in &node.children {
                    let child_result = self.walk_tree(path, child, value_resolver)?;
                    match &child_result.result {
                        Some(NodeResult::Value(NodeValue::MultiMap(map))) => {
                            for (key, value) in map {
                                child_results.push(child_result.clone_with_result(
                                    NodeResult::Value(NodeValue::Entry(
                                        key.clone(),
                                        Box::new(NodeValue::StringList(value.clone())),
                                    )),
                                ));
                            }
                        }
                        Some(NodeResult::Value(NodeValue::StringList(list))) => {
                            for item in list {
                                child_results.push(child_result.clone_with_result(
                                    NodeResult::Value(NodeValue::String(item.clone())),
                                ));
                            }
                        }
                        _ => child_results.push(child_result.clone()),
                    }
                }
                Ok(ExecutionPlanNode {
                    node_type: node.node_type.clone(),
                    result: Some(NodeResult::Ok),
                    children: child_results,
                })
            }
        }
    }

    /// Execute a single action node.
    pub fn execute_action(
        &mut self,
        action: &str,
        value_resolver: &dyn ValueResolver,
        node: &ExecutionPlanNode,
        path: &[String],
    ) -> ExecutionPlanNode {
        trace!(%action, "executing action");
        let mut action_path = path.to_vec();
        action_path.push(action.to_string());

        if let Some(matcher) = action.strip_prefix("match:") {
            return self
                .execute_match(action, matcher, value_resolver, node, &action_path)
                .unwrap_or_else(|err_node| err_node);
        }

        match action {
            "upper-case" => self.execute_change_case(value_resolver, node, &action_path, true),
            "lower-case" => self.execute_change_case(value_resolver, node, &action_path, false),
            "to-string" => self.execute_to_string(value_resolver, node, &action_path),
            "length" => self.execute_length(action, value_resolver, node, &action_path),
            "expect:empty" => self.execute_expect_empty(action, value_resolver, node, &action_path),
            "convert:UTF8" => self.execute_convert_utf8(action, value_resolver, node, &action_path),
            "if" => self.execute_if(value_resolver, node, &action_path),
            "and" => self.execute_and(value_resolver, node, &action_path),
            "or" => self.execute_or(value_resolver, node, &action_path),
            "tee" => self.execute_tee(value_resolver, node, &action_path),
            "apply" => self.execute_apply(node),
            "push" => self.execute_push(node),
            "pop" => self.execute_pop(node),
            "json:parse" => self.execute_json_parse(action, value_resolver, node, &action_path),
            "json:expect:empty" => {
                self.execute_json_expect_empty(action, value_resolver, node, &action_path)
            }
            "json:expect:not-empty" => {
                self.execute_json_expect_not_empty(action, value_resolver, node, &action_path)
            }
            "json:match:length" => {
                self.execute_json_match_length(action, value_resolver, node, &action_path)
            }
            "json:expect:entries" => {
                self.execute_json_expect_entries(action, value_resolver, node, &action_path)
            }
            "check:exists" => self.execute_check_exists(action, value_resolver, node, &action_path),
            "expect:entries" | "expect:only-entries" => {
                self.execute_check_entries(action, value_resolver, node, &action_path)
            }
            "expect:count" => self.execute_expect_count(action, value_resolver, node, &action_path),
            "join" | "join-with" => self.execute_join(action, value_resolver, node, &action_path),
            "error" => self.execute_error(value_resolver, node, &action_path),
            "header:parse" => self.execute_header_parse(action, value_resolver, node, &action_path),
            "for-each" => self.execute_for_each(value_resolver, node, &action_path),
            _ => node.clone_with_result(NodeResult::Error(format!(
                "'{}' is not a valid action",
                action
            ))),
        }
    }

    fn execute_match(
        &mut self,
        action: &str,
        matcher: &str,
        value_resolver: &dyn ValueResolver,
        node: &ExecutionPlanNode,
        action_path: &[String],
    ) -> Result<ExecutionPlanNode, ExecutionPlanNode> {
        let (args, optional) = self
            .validate_args(3, 1, node, action, value_resolver, action_path)
            .map_err(|err| node.clone_with_result(NodeResult::Error(err.to_string())))?;

        let all_children = |args: &[ExecutionPlanNode]| {
            args.iter().chain(optional.iter()).cloned().collect_vec()
        };
        let arg_value = |index: usize| {
            args[index]
                .value()
                .unwrap_or_default()
                .value_or_error()
                .map_err(|err| ExecutionPlanNode {
                    node_type: node.node_type.clone(),
                    result: Some(NodeResult::Error(err.to_string())),
                    children: all_children(&args),
                })
        };
        let expected_value = arg_value(0)?;
        let actual_value = arg_value(1)?;
        let matcher_params = arg_value(2)?.as_json().unwrap_or_default();

        let attributes = match matcher_params {
            Value::Object(map) => map,
            _ => serde_json::Map::new(),
        };
        let rule = MatchingRule {
            name: matcher.to_string(),
            attributes,
        };
        let matcher_impl = self.context.matcher.clone();
        match matcher_impl.match_values(&rule, &expected_value, &actual_value) {
            Ok(()) => Ok(ExecutionPlanNode {
                node_type: node.node_type.clone(),
                result: Some(NodeResult::Value(NodeValue::Bool(true))),
                children: all_children(&args),
            }),
            Err(err) => {
                if let Some(error_node) = optional.first() {
                    // The optional fourth argument generates the error
                    // message, with the raw error text on the stack for it.
                    self.push_result(Some(NodeResult::Value(NodeValue::String(err.to_string()))));
                    let result = match self.walk_tree(action_path, error_node, value_resolver) {
                        Ok(error_node) => {
                            let message = match error_node.value() {
                                Some(NodeResult::Error(message)) if !message.is_empty() => message,
                                result => result
                                    .unwrap_or_default()
                                    .as_string()
                                    .filter(|s| !s.is_empty())
                                    .unwrap_or_else(|| err.to_string()),
                            };
                            Err(ExecutionPlanNode {
                                node_type: node.node_type.clone(),
                                result: Some(NodeResult::Error(message)),
                                children: args
                                    .iter()
                                    .cloned()
                                    .chain(once(error_node))
                                    .collect(),
                            })
                        }
                        Err(_) => Err(ExecutionPlanNode {
                            node_type: node.node_type.clone(),
                            result: Some(NodeResult::Error(err.to_string())),
                            children: all_children(&args),
                        }),
                    };
                    self.pop_result();
                    result
                } else {
                    Err(ExecutionPlanNode {
                        node_type: node.node_type.clone(),
                        result: Some(NodeResult::Error(err.to_string())),
                        children: all_children(&args),
                    })
                }
            }
        }
    }

    fn execute_change_case(
        &mut self,
        value_resolver: &dyn ValueResolver,
        node: &ExecutionPlanNode,
        action_path: &[String],
        upper_case: bool,
    ) -> ExecutionPlanNode {
        let (children, values) = match self.evaluate_children(value_resolver, node, action_path) {
            Ok(value) => value,
            Err(err_node) => return err_node,
        };

        let change = |s: &str| {
            if upper_case {
                s.to_uppercase()
            } else {
                s.to_lowercase()
            }
        };
        let results = values
            .iter()
            .map(|value| match value {
                NodeValue::String(s) => NodeValue::String(change(s)),
                NodeValue::StringList(list) => {
                    NodeValue::StringList(list.iter().map(|s| change(s)).collect())
                }
                NodeValue::Json(Value::String(s)) => NodeValue::String(change(s)),
                NodeValue::Json(json) => NodeValue::String(json.to_string()),
                _ => value.clone(),
            })
            .collect_vec();
        let result = if results.len() == 1 {
            results[0].clone()
        } else {
            NodeValue::List(results)
        };
        ExecutionPlanNode {
            node_type: node.node_type.clone(),
            result: Some(NodeResult::Value(result)),
            children,
        }
    }

    fn execute_to_string(
        &mut self,
        value_resolver: &dyn ValueResolver,
        node: &ExecutionPlanNode,
        action_path: &[String],
    ) -> ExecutionPlanNode {
        let (children, values) = match self.evaluate_children(value_resolver, node, action_path) {
            Ok(value) => value,
            Err(err_node) => return err_node,
        };

        let results = values
            .iter()
            .map(|value| match value {
                NodeValue::Null => NodeValue::String(String::default()),
                NodeValue::String(_) | NodeValue::StringList(_) => value.clone(),
                NodeValue::Json(Value::String(s)) => NodeValue::String(s.clone()),
                NodeValue::Json(json) => NodeValue::String(json.to_string()),
                _ => NodeValue::String(value.str_form()),
            })
            .collect_vec();
        let result = if results.len() == 1 {
            results[0].clone()
        } else {
            NodeValue::List(results)
        };
        ExecutionPlanNode {
            node_type: node.node_type.clone(),
            result: Some(NodeResult::Value(result)),
            children,
        }
    }

    fn execute_length(
        &mut self,
        action: &str,
        value_resolver: &dyn ValueResolver,
        node: &ExecutionPlanNode,
        action_path: &[String],
    ) -> ExecutionPlanNode {
        match self.validate_one_arg(node, action, value_resolver, action_path) {
            Ok(value) => {
                let arg = value.value().unwrap_or_default().as_value().unwrap_or_default();
                let result = match &arg {
                    NodeValue::Null => NodeResult::Value(NodeValue::UInt(0)),
                    NodeValue::String(s) => NodeResult::Value(NodeValue::UInt(s.len() as u64)),
                    NodeValue::MultiMap(m) => NodeResult::Value(NodeValue::UInt(m.len() as u64)),
                    NodeValue::StringList(l) => NodeResult::Value(NodeValue::UInt(l.len() as u64)),
                    NodeValue::Bytes(b) => NodeResult::Value(NodeValue::UInt(b.len() as u64)),
                    NodeValue::List(l) => NodeResult::Value(NodeValue::UInt(l.len() as u64)),
                    NodeValue::Json(Value::String(s)) => {
                        NodeResult::Value(NodeValue::UInt(s.len() as u64))
                    }
                    NodeValue::Json(Value::Array(a)) => {
                        NodeResult::Value(NodeValue::UInt(a.len() as u64))
                    }
                    NodeValue::Json(Value::Object(m)) => {
                        NodeResult::Value(NodeValue::UInt(m.len() as u64))
                    }
                    _ => NodeResult::Error(format!(
                        "'length' can't be used with a {} value",
                        arg.value_type()
                    )),
                };
                ExecutionPlanNode {
                    node_type: node.node_type.clone(),
                    result: Some(result),
                    children: vec![value],
                }
            }
            Err(err) => node.clone_with_result(NodeResult::Error(err.to_string())),
        }
    }

    fn execute_check_exists(
        &mut self,
        action: &str,
        value_resolver: &dyn ValueResolver,
        node: &ExecutionPlanNode,
        action_path: &[String],
    ) -> ExecutionPlanNode {
        match self.validate_one_arg(node, action, value_resolver, action_path) {
            Ok(value) => {
                let result = if let NodeResult::Value(value) = value.value().unwrap_or_default() {
                    NodeResult::Value(NodeValue::Bool(!matches!(value, NodeValue::Null)))
                } else {
                    NodeResult::Value(NodeValue::Bool(false))
                };
                ExecutionPlanNode {
                    node_type: node.node_type.clone(),
                    result: Some(result),
                    children: vec![value],
                }
            }
            Err(err) => node.clone_with_result(NodeResult::Error(err.to_string())),
        }
    }

    fn execute_convert_utf8(
        &mut self,
        action: &str,
        value_resolver: &dyn ValueResolver,
        node: &ExecutionPlanNode,
        action_path: &[String],
    ) -> ExecutionPlanNode {
        match self.validate_one_arg(node, action, value_resolver, action_path) {
            Ok(value) => {
                let arg = value.value().unwrap_or_default().as_value();
                let result = match &arg {
                    None | Some(NodeValue::Null) => {
                        Ok(NodeResult::Value(NodeValue::String(String::default())))
                    }
                    Some(NodeValue::String(s)) => {
                        Ok(NodeResult::Value(NodeValue::String(s.clone())))
                    }
                    Some(NodeValue::Bytes(b)) => Ok(NodeResult::Value(NodeValue::String(
                        String::from_utf8_lossy(b).to_string(),
                    ))),
                    Some(other) => Err(anyhow!(
                        "convert:UTF8 can not be used with {}",
                        other.value_type()
                    )),
                };
                match result {
                    Ok(result) => ExecutionPlanNode {
                        node_type: node.node_type.clone(),
                        result: Some(result),
                        children: vec![value],
                    },
                    Err(err) => ExecutionPlanNode {
                        node_type: node.node_type.clone(),
                        result: Some(NodeResult::Error(err.to_string())),
                        children: vec![value],
                    },
                }
            }
            Err(err) => node.clone_with_result(NodeResult::Error(err.to_string())),
        }
    }

    fn execute_expect_empty(
        &mut self,
        action: &str,
        value_resolver: &dyn ValueResolver,
        node: &ExecutionPlanNode,
        action_path: &[String],
    ) -> ExecutionPlanNode {
        match self.validate_args(1, 1, node, action, value_resolver, action_path) {
            Ok((values, optional)) => {
                let first = values[0].value().unwrap_or_default();
                if let NodeResult::Error(err) = &first {
                    return ExecutionPlanNode {
                        node_type: node.node_type.clone(),
                        result: Some(NodeResult::Error(err.clone())),
                        children: values.iter().chain(optional.iter()).cloned().collect(),
                    };
                }
                let result = match &first.as_value() {
                    None | Some(NodeValue::Null) => Ok(()),
                    Some(NodeValue::Bool(b)) => {
                        if *b {
                            Ok(())
                        } else {
                            Err(anyhow!("Expected BOOL(false) to be empty"))
                        }
                    }
                    Some(value @ NodeValue::String(s)) => {
                        empty_check(s.is_empty(), value)
                    }
                    Some(value @ NodeValue::MultiMap(m)) => empty_check(m.is_empty(), value),
                    Some(value @ NodeValue::StringList(l)) => empty_check(l.is_empty(), value),
                    Some(value @ NodeValue::List(l)) => empty_check(l.is_empty(), value),
                    Some(NodeValue::Bytes(bytes)) => {
                        if bytes.is_empty() {
                            Ok(())
                        } else {
                            Err(anyhow!(
                                "Expected byte array ({} bytes) to be empty",
                                bytes.len()
                            ))
                        }
                    }
                    Some(value @ NodeValue::UInt(ui)) => empty_check(*ui == 0, value),
                    Some(NodeValue::Json(json)) => json_empty_check(json),
                    Some(value) => Err(anyhow!("Expected {} to be empty", value.str_form())),
                };
                match result {
                    Ok(()) => ExecutionPlanNode {
                        node_type: node.node_type.clone(),
                        result: Some(NodeResult::Value(NodeValue::Bool(true))),
                        children: values.iter().chain(optional.iter()).cloned().collect(),
                    },
                    Err(err) => self.error_with_optional_message(
                        node,
                        &values,
                        &optional,
                        err.to_string(),
                        None,
                        value_resolver,
                        action_path,
                    ),
                }
            }
            Err(err) => node.clone_with_result(NodeResult::Error(err.to_string())),
        }
    }

    fn execute_if(
        &mut self,
        value_resolver: &dyn ValueResolver,
        node: &ExecutionPlanNode,
        action_path: &[String],
    ) -> ExecutionPlanNode {
        let Some(first_node) = node.children.first() else {
            return node.clone_with_result(NodeResult::Error(
                "'if' action requires at least one argument".to_string(),
            ));
        };
        let first = match self.walk_tree(action_path, first_node, value_resolver) {
            Ok(first) => first,
            Err(err) => {
                return node.clone_with_result(NodeResult::Error(err.to_string()));
            }
        };
        let node_result = first.value().unwrap_or_default();
        let mut children = node.children.clone();
        children[0] = first.clone();

        if !node_result.is_truthy() {
            // condition false: evaluate the optional else branch
            if node.children.len() > 2 {
                match self.walk_tree(action_path, &node.children[2], value_resolver) {
                    Ok(else_node) => {
                        children[2] = else_node.clone();
                        ExecutionPlanNode {
                            node_type: node.node_type.clone(),
                            result: else_node.result,
                            children,
                        }
                    }
                    Err(err) => ExecutionPlanNode {
                        node_type: node.node_type.clone(),
                        result: Some(NodeResult::Error(err.to_string())),
                        children,
                    },
                }
            } else {
                ExecutionPlanNode {
                    node_type: node.node_type.clone(),
                    result: Some(NodeResult::Value(NodeValue::Bool(false))),
                    children,
                }
            }
        } else if let Some(second_node) = node.children.get(1) {
            match self.walk_tree(action_path, second_node, value_resolver) {
                Ok(second) => {
                    let second_result = second.value().unwrap_or_default();
                    children[1] = second;
                    ExecutionPlanNode {
                        node_type: node.node_type.clone(),
                        result: Some(second_result.truthy()),
                        children,
                    }
                }
                Err(err) => {
                    debug!("evaluating the 'if' branch failed: {}", err);
                    ExecutionPlanNode {
                        node_type: node.node_type.clone(),
                        result: Some(NodeResult::Value(NodeValue::Bool(false))),
                        children,
                    }
                }
            }
        } else {
            ExecutionPlanNode {
                node_type: node.node_type.clone(),
                result: Some(node_result),
                children,
            }
        }
    }

    fn execute_tee(
        &mut self,
        value_resolver: &dyn ValueResolver,
        node: &ExecutionPlanNode,
        action_path: &[String],
    ) -> ExecutionPlanNode {
        let Some(first_node) = node.children.first() else {
            return node.clone_with_result(NodeResult::Ok);
        };
        match self.walk_tree(action_path, first_node, value_resolver) {
            Ok(first) => {
                let first_result = first.value().unwrap_or_default();
                if first_result.is_err() {
                    ExecutionPlanNode {
                        node_type: node.node_type.clone(),
                        result: Some(first_result),
                        children: once(first)
                            .chain(node.children.iter().dropping(1).cloned())
                            .collect(),
                    }
                } else {
                    // remaining children run with the first result on the
                    // stack as the current value
                    let mut result = NodeResult::Ok;
                    self.push_result(first.result.clone());
                    let mut child_results = vec![first.clone()];
                    for child in node.children.iter().dropping(1) {
                        match self.walk_tree(action_path, child, value_resolver) {
                            Ok(value) => {
                                result = result.and(&value.result);
                                child_results.push(value);
                            }
                            Err(err) => {
                                let node_result = NodeResult::Error(err.to_string());
                                result = result.and(&Some(node_result.clone()));
                                child_results.push(child.clone_with_result(node_result));
                            }
                        }
                    }
                    self.pop_result();
                    ExecutionPlanNode {
                        node_type: node.node_type.clone(),
                        result: Some(result.truthy()),
                        children: child_results,
                    }
                }
            }
            Err(err) => node.clone_with_result(NodeResult::Error(err.to_string())),
        }
    }

    fn execute_apply(&mut self, node: &ExecutionPlanNode) -> ExecutionPlanNode {
        if let Some(value) = self.value_stack.last() {
            ExecutionPlanNode {
                node_type: node.node_type.clone(),
                result: value.clone(),
                children: node.children.clone(),
            }
        } else {
            node.clone_with_result(NodeResult::Error(
                "No value to apply (stack is empty)".to_string(),
            ))
        }
    }

    fn execute_push(&mut self, node: &ExecutionPlanNode) -> ExecutionPlanNode {
        if let Some(value) = self.value_stack.last().cloned() {
            self.value_stack.push(value.clone());
            ExecutionPlanNode {
                node_type: node.node_type.clone(),
                result: value,
                children: node.children.clone(),
            }
        } else {
            node.clone_with_result(NodeResult::Error(
                "No value to push (stack is empty)".to_string(),
            ))
        }
    }

    fn execute_pop(&mut self, node: &ExecutionPlanNode) -> ExecutionPlanNode {
        if self.value_stack.pop().is_some() {
            ExecutionPlanNode {
                node_type: node.node_type.clone(),
                result: self.value_stack.last().cloned().flatten(),
                children: node.children.clone(),
            }
        } else {
            node.clone_with_result(NodeResult::Error(
                "No value to pop (stack is empty)".to_string(),
            ))
        }
    }

    fn execute_and(
        &mut self,
        value_resolver: &dyn ValueResolver,
        node: &ExecutionPlanNode,
        action_path: &[String],
    ) -> ExecutionPlanNode {
        match self.evaluate_children(value_resolver, node, action_path) {
            Ok((children, values)) => ExecutionPlanNode {
                node_type: node.node_type.clone(),
                result: Some(NodeResult::Value(
                    values
                        .iter()
                        .fold(NodeValue::Null, |result, value| result.and(value)),
                )),
                children,
            },
            Err(err_node) => err_node,
        }
    }

    fn execute_or(
        &mut self,
        value_resolver: &dyn ValueResolver,
        node: &ExecutionPlanNode,
        action_path: &[String],
    ) -> ExecutionPlanNode {
        match self.evaluate_children(value_resolver, node, action_path) {
            Ok((children, values)) => ExecutionPlanNode {
                node_type: node.node_type.clone(),
                result: Some(NodeResult::Value(
                    values
                        .iter()
                        .fold(NodeValue::Null, |result, value| result.or(value)),
                )),
                children,
            },
            Err(err_node) => err_node,
        }
    }

    fn execute_json_parse(
        &mut self,
        action: &str,
        value_resolver: &dyn ValueResolver,
        node: &ExecutionPlanNode,
        action_path: &[String],
    ) -> ExecutionPlanNode {
        match self.validate_one_arg(node, action, value_resolver, action_path) {
            Ok(value) => {
                let arg = value.value().unwrap_or_default().as_value();
                let result = match &arg {
                    None | Some(NodeValue::Null) => Ok(NodeResult::Value(NodeValue::Null)),
                    Some(NodeValue::String(s)) => serde_json::from_str(s)
                        .map(|json| NodeResult::Value(NodeValue::Json(json)))
                        .map_err(|err| anyhow!("json parse error - {}", err)),
                    Some(NodeValue::Bytes(b)) => serde_json::from_slice(b)
                        .map(|json| NodeResult::Value(NodeValue::Json(json)))
                        .map_err(|err| anyhow!("json parse error - {}", err)),
                    Some(other) => Err(anyhow!(
                        "json:parse can not be used with {}",
                        other.value_type()
                    )),
                };
                match result {
                    Ok(result) => ExecutionPlanNode {
                        node_type: node.node_type.clone(),
                        result: Some(result),
                        children: vec![value],
                    },
                    Err(err) => ExecutionPlanNode {
                        node_type: node.node_type.clone(),
                        result: Some(NodeResult::Error(err.to_string())),
                        children: vec![value],
                    },
                }
            }
            Err(err) => node.clone_with_result(NodeResult::Error(err.to_string())),
        }
    }

    fn execute_json_expect_empty(
        &mut self,
        action: &str,
        value_resolver: &dyn ValueResolver,
        node: &ExecutionPlanNode,
        action_path: &[String],
    ) -> ExecutionPlanNode {
        match self.validate_two_args(node, action, value_resolver, action_path) {
            Ok((first_node, second_node)) => {
                let children = vec![first_node.clone(), second_node.clone()];
                let result = json_type_arg(&first_node)
                    .and_then(|expected_type| {
                        let json = json_arg(&second_node)?;
                        json_check_type(&expected_type, &json)?;
                        json_empty_check(&json)
                    });
                match result {
                    Ok(()) => ExecutionPlanNode {
                        node_type: node.node_type.clone(),
                        result: Some(NodeResult::Value(NodeValue::Bool(true))),
                        children,
                    },
                    Err(err) => ExecutionPlanNode {
                        node_type: node.node_type.clone(),
                        result: Some(NodeResult::Error(err.to_string())),
                        children,
                    },
                }
            }
            Err(err) => node.clone_with_result(NodeResult::Error(err.to_string())),
        }
    }

    fn execute_json_expect_not_empty(
        &mut self,
        action: &str,
        value_resolver: &dyn ValueResolver,
        node: &ExecutionPlanNode,
        action_path: &[String],
    ) -> ExecutionPlanNode {
        match self.validate_two_args(node, action, value_resolver, action_path) {
            Ok((first_node, second_node)) => {
                let children = vec![first_node.clone(), second_node.clone()];
                let result = json_type_arg(&first_node)
                    .and_then(|expected_type| {
                        let json = json_arg(&second_node)?;
                        json_check_type(&expected_type, &json)?;
                        match json_empty_check(&json) {
                            Ok(()) => Err(anyhow!("Expected JSON ({}) to not be empty", json)),
                            Err(_) => Ok(()),
                        }
                    });
                match result {
                    Ok(()) => ExecutionPlanNode {
                        node_type: node.node_type.clone(),
                        result: Some(NodeResult::Value(NodeValue::Bool(true))),
                        children,
                    },
                    Err(err) => ExecutionPlanNode {
                        node_type: node.node_type.clone(),
                        result: Some(NodeResult::Error(err.to_string())),
                        children,
                    },
                }
            }
            Err(err) => node.clone_with_result(NodeResult::Error(err.to_string())),
        }
    }

    fn execute_json_match_length(
        &mut self,
        action: &str,
        value_resolver: &dyn ValueResolver,
        node: &ExecutionPlanNode,
        action_path: &[String],
    ) -> ExecutionPlanNode {
        match self.validate_three_args(node, action, value_resolver, action_path) {
            Ok((first_node, second_node, third_node)) => {
                let children = vec![first_node.clone(), second_node.clone(), third_node.clone()];
                let result = json_type_arg(&first_node).and_then(|expected_type| {
                    let length = second_node.value().unwrap_or_default();
                    let expected_length = length
                        .as_number()
                        .ok_or_else(|| anyhow!("'{}' is not a valid number", length))?;
                    let json = json_arg(&third_node)?;
                    json_check_type(&expected_type, &json)?;
                    json_check_length(expected_length as usize, &json)
                });
                match result {
                    Ok(()) => ExecutionPlanNode {
                        node_type: node.node_type.clone(),
                        result: Some(NodeResult::Value(NodeValue::Bool(true))),
                        children,
                    },
                    Err(err) => ExecutionPlanNode {
                        node_type: node.node_type.clone(),
                        result: Some(NodeResult::Error(err.to_string())),
                        children,
                    },
                }
            }
            Err(err) => node.clone_with_result(NodeResult::Error(err.to_string())),
        }
    }

    fn execute_json_expect_entries(
        &mut self,
        action: &str,
        value_resolver: &dyn ValueResolver,
        node: &ExecutionPlanNode,
        action_path: &[String],
    ) -> ExecutionPlanNode {
        match self.validate_three_args(node, action, value_resolver, action_path) {
            Ok((first_node, second_node, third_node)) => {
                let children = vec![first_node.clone(), second_node.clone(), third_node.clone()];
                let result = json_type_arg(&first_node).and_then(|expected_type| {
                    let keys = second_node.value().unwrap_or_default();
                    let expected_keys: HashSet<String> = keys
                        .as_slist()
                        .ok_or_else(|| anyhow!("'{}' is not a list of Strings", keys))?
                        .into_iter()
                        .collect();
                    let json = json_arg(&third_node)?;
                    json_check_type(&expected_type, &json)?;
                    match &json {
                        Value::Object(o) => {
                            let actual_keys: HashSet<String> = o.keys().cloned().collect();
                            let diff = expected_keys
                                .difference(&actual_keys)
                                .cloned()
                                .collect_vec();
                            if diff.is_empty() {
                                Ok(())
                            } else {
                                Err(anyhow!(
                                    "The following expected entries were missing from the actual Object: {}",
                                    diff.iter().sorted().join(", ")
                                ))
                            }
                        }
                        _ => Err(anyhow!(
                            "Was expecting a JSON Object, but got a {}",
                            json_type_of(&json)
                        )),
                    }
                });
                match result {
                    Ok(()) => ExecutionPlanNode {
                        node_type: node.node_type.clone(),
                        result: Some(NodeResult::Value(NodeValue::Bool(true))),
                        children,
                    },
                    Err(err) => ExecutionPlanNode {
                        node_type: node.node_type.clone(),
                        result: Some(NodeResult::Error(err.to_string())),
                        children,
                    },
                }
            }
            Err(err) => node.clone_with_result(NodeResult::Error(err.to_string())),
        }
    }

    fn execute_check_entries(
        &mut self,
        action: &str,
        value_resolver: &dyn ValueResolver,
        node: &ExecutionPlanNode,
        action_path: &[String],
    ) -> ExecutionPlanNode {
        match self.validate_args(2, 1, node, action, value_resolver, action_path) {
            Ok((values, optional)) => {
                let expected_keys: HashSet<String> = values[0]
                    .value()
                    .unwrap_or_default()
                    .as_value()
                    .unwrap_or_default()
                    .as_slist()
                    .unwrap_or_default()
                    .into_iter()
                    .collect();
                let second = values[1]
                    .value()
                    .unwrap_or_default()
                    .as_value()
                    .unwrap_or_default();
                let result = match &second {
                    NodeValue::MultiMap(map) => {
                        check_diff(action, &expected_keys, &map.keys().cloned().collect())
                    }
                    NodeValue::StringList(list) => {
                        check_diff(action, &expected_keys, &list.iter().cloned().collect())
                    }
                    NodeValue::String(s) => {
                        check_diff(action, &expected_keys, &HashSet::from([s.clone()]))
                    }
                    NodeValue::Json(Value::Object(map)) => {
                        check_diff(action, &expected_keys, &map.keys().cloned().collect())
                    }
                    NodeValue::Json(Value::Array(list)) => check_diff(
                        action,
                        &expected_keys,
                        &list.iter().map(|v| v.to_string()).collect(),
                    ),
                    _ => Err((
                        format!(
                            "'{}' can't be used with a {} value",
                            action,
                            second.value_type()
                        ),
                        None,
                    )),
                };
                match result {
                    Ok(()) => ExecutionPlanNode {
                        node_type: node.node_type.clone(),
                        result: Some(NodeResult::Ok),
                        children: values.iter().chain(optional.iter()).cloned().collect(),
                    },
                    Err((err, diff)) => {
                        debug!("{} failed: {}", action, err);
                        self.error_with_optional_message(
                            node,
                            &values,
                            &optional,
                            err,
                            diff,
                            value_resolver,
                            action_path,
                        )
                    }
                }
            }
            Err(err) => node.clone_with_result(NodeResult::Error(err.to_string())),
        }
    }

    fn execute_expect_count(
        &mut self,
        action: &str,
        value_resolver: &dyn ValueResolver,
        node: &ExecutionPlanNode,
        action_path: &[String],
    ) -> ExecutionPlanNode {
        match self.validate_args(2, 1, node, action, value_resolver, action_path) {
            Ok((values, optional)) => {
                let expected_length = values[0]
                    .value()
                    .unwrap_or_default()
                    .as_value()
                    .unwrap_or_default()
                    .as_uint()
                    .unwrap_or_default() as usize;
                let second = values[1]
                    .value()
                    .unwrap_or_default()
                    .as_value()
                    .unwrap_or_default();
                let result = match &second {
                    NodeValue::MultiMap(map) => count_check(
                        map.len(),
                        expected_length,
                        format!(
                            "Expected {} map entries but there were {}",
                            expected_length,
                            map.len()
                        ),
                    ),
                    NodeValue::StringList(list) => count_check(
                        list.len(),
                        expected_length,
                        format!(
                            "Expected {} items but there were {}",
                            expected_length,
                            list.len()
                        ),
                    ),
                    NodeValue::List(list) => count_check(
                        list.len(),
                        expected_length,
                        format!(
                            "Expected {} items but there were {}",
                            expected_length,
                            list.len()
                        ),
                    ),
                    NodeValue::String(s) => count_check(
                        s.len(),
                        expected_length,
                        format!(
                            "Expected a string with a length of {} but it was {}",
                            expected_length,
                            s.len()
                        ),
                    ),
                    NodeValue::Json(Value::Object(map)) => count_check(
                        map.len(),
                        expected_length,
                        format!(
                            "Expected {} object entries but there were {}",
                            expected_length,
                            map.len()
                        ),
                    ),
                    NodeValue::Json(Value::Array(list)) => count_check(
                        list.len(),
                        expected_length,
                        format!(
                            "Expected {} array items but there were {}",
                            expected_length,
                            list.len()
                        ),
                    ),
                    _ => Err(format!(
                        "'{}' can't be used with a {} value",
                        action,
                        second.value_type()
                    )),
                };
                match result {
                    Ok(()) => ExecutionPlanNode {
                        node_type: node.node_type.clone(),
                        result: Some(NodeResult::Ok),
                        children: values.iter().chain(optional.iter()).cloned().collect(),
                    },
                    Err(err) => {
                        debug!("expect:count failed: {}", err);
                        self.error_with_optional_message(
                            node,
                            &values,
                            &optional,
                            err,
                            None,
                            value_resolver,
                            action_path,
                        )
                    }
                }
            }
            Err(err) => node.clone_with_result(NodeResult::Error(err.to_string())),
        }
    }

    fn execute_join(
        &mut self,
        action: &str,
        value_resolver: &dyn ValueResolver,
        node: &ExecutionPlanNode,
        action_path: &[String],
    ) -> ExecutionPlanNode {
        let (children, values) = match self.evaluate_children(value_resolver, node, action_path) {
            Ok(value) => value,
            Err(err_node) => return err_node,
        };
        let str_values = string_forms(&values);

        let result = if action == "join-with" && !str_values.is_empty() {
            let separator = &str_values[0];
            str_values.iter().dropping(1).join(separator.as_str())
        } else {
            str_values.iter().join("")
        };

        ExecutionPlanNode {
            node_type: node.node_type.clone(),
            result: Some(NodeResult::Value(NodeValue::String(result))),
            children,
        }
    }

    fn execute_error(
        &mut self,
        value_resolver: &dyn ValueResolver,
        node: &ExecutionPlanNode,
        action_path: &[String],
    ) -> ExecutionPlanNode {
        let (children, values) = match self.evaluate_children(value_resolver, node, action_path) {
            Ok(value) => value,
            Err(err_node) => return err_node,
        };
        let result = string_forms(&values).iter().join("");
        ExecutionPlanNode {
            node_type: node.node_type.clone(),
            result: Some(NodeResult::Error(result)),
            children,
        }
    }

    fn execute_header_parse(
        &mut self,
        action: &str,
        value_resolver: &dyn ValueResolver,
        node: &ExecutionPlanNode,
        action_path: &[String],
    ) -> ExecutionPlanNode {
        match self.validate_one_arg(node, action, value_resolver, action_path) {
            Ok(value) => {
                let arg = value
                    .value()
                    .unwrap_or_default()
                    .as_string()
                    .unwrap_or_default();
                let (header_value, parameters) = parse_header_value(&arg);
                let parameter_map: serde_json::Map<String, Value> = parameters
                    .into_iter()
                    .map(|(k, v)| (k, Value::String(v)))
                    .collect();
                ExecutionPlanNode {
                    node_type: node.node_type.clone(),
                    result: Some(NodeResult::Value(NodeValue::Json(json!({
                        "value": header_value,
                        "parameters": parameter_map
                    })))),
                    children: vec![value],
                }
            }
            Err(err) => node.clone_with_result(NodeResult::Error(err.to_string())),
        }
    }

    fn execute_for_each(
        &mut self,
        value_resolver: &dyn ValueResolver,
        node: &ExecutionPlanNode,
        action_path: &[String],
    ) -> ExecutionPlanNode {
        let Some(first_node) = node.children.first() else {
            return node.clone_with_result(NodeResult::Ok);
        };
        match self.walk_tree(action_path, first_node, value_resolver) {
            Ok(first) => {
                let first_result = first.value().unwrap_or_default();
                if first_result.is_err() {
                    ExecutionPlanNode {
                        node_type: node.node_type.clone(),
                        result: Some(first_result),
                        children: once(first)
                            .chain(node.children.iter().dropping(1).cloned())
                            .collect(),
                    }
                } else {
                    let mut result = NodeResult::Ok;
                    let mut child_results = vec![first.clone()];

                    // The remaining children form the template, executed once
                    // per item with the wildcard index filled in.
                    let loop_items = first_result.as_value().unwrap_or_default().to_list();
                    for (index, _) in loop_items.iter().enumerate() {
                        for child in node.children.iter().dropping(1) {
                            let updated_child = inject_index(child, index);
                            match self.walk_tree(action_path, &updated_child, value_resolver) {
                                Ok(value) => {
                                    result = result.and(&value.result);
                                    child_results.push(value);
                                }
                                Err(err) => {
                                    let node_result = NodeResult::Error(err.to_string());
                                    result = result.and(&Some(node_result.clone()));
                                    child_results
                                        .push(updated_child.clone_with_result(node_result));
                                }
                            }
                        }
                    }

                    ExecutionPlanNode {
                        node_type: node.node_type.clone(),
                        result: Some(result.truthy()),
                        children: child_results,
                    }
                }
            }
            Err(err) => node.clone_with_result(NodeResult::Error(err.to_string())),
        }
    }

    // When a check fails and an optional message node was supplied, the
    // message node is evaluated (with any diff on the stack) to produce the
    // error text.
    #[allow(clippy::too_many_arguments)]
    fn error_with_optional_message(
        &mut self,
        node: &ExecutionPlanNode,
        values: &[ExecutionPlanNode],
        optional: &[ExecutionPlanNode],
        error: String,
        diff: Option<Vec<String>>,
        value_resolver: &dyn ValueResolver,
        action_path: &[String],
    ) -> ExecutionPlanNode {
        let Some(message_node) = optional.first() else {
            return ExecutionPlanNode {
                node_type: node.node_type.clone(),
                result: Some(NodeResult::Error(error)),
                children: values.iter().chain(optional.iter()).cloned().collect(),
            };
        };
        let pushed = diff.map(|diff| {
            self.push_result(Some(NodeResult::Value(NodeValue::StringList(diff))));
        });
        let result = match self.walk_tree(action_path, message_node, value_resolver) {
            Ok(value) => {
                let message = value
                    .value()
                    .unwrap_or_default()
                    .as_string()
                    .filter(|s| !s.is_empty())
                    .unwrap_or(error);
                ExecutionPlanNode {
                    node_type: node.node_type.clone(),
                    result: Some(NodeResult::Error(message)),
                    children: values.iter().cloned().chain(once(value)).collect(),
                }
            }
            Err(_) => ExecutionPlanNode {
                node_type: node.node_type.clone(),
                result: Some(NodeResult::Error(error)),
                children: values.iter().chain(optional.iter()).cloned().collect(),
            },
        };
        if pushed.is_some() {
            self.pop_result();
        }
        result
    }

    fn evaluate_children(
        &mut self,
        value_resolver: &dyn ValueResolver,
        node: &ExecutionPlanNode,
        path: &[String],
    ) -> Result<(Vec<ExecutionPlanNode>, Vec<NodeValue>), ExecutionPlanNode> {
        let mut children = vec![];
        let mut values = vec![];
        let mut loop_items = VecDeque::from(node.children.clone());

        while let Some(child) = loop_items.pop_front() {
            let value = if let Some(child_value) = child.value() {
                child_value
            } else {
                match self.walk_tree(path, &child, value_resolver) {
                    Ok(value) => {
                        if value.is_splat() {
                            for splat_child in value.children.iter().rev() {
                                loop_items.push_front(splat_child.clone());
                            }
                            children.push(value);
                            NodeResult::Ok
                        } else {
                            children.push(value.clone());
                            value.value().unwrap_or_default()
                        }
                    }
                    Err(err) => {
                        return Err(ExecutionPlanNode {
                            node_type: node.node_type.clone(),
                            result: Some(NodeResult::Error(err.to_string())),
                            children,
                        });
                    }
                }
            };

            match value {
                NodeResult::Ok => {}
                NodeResult::Value(value) => values.push(value),
                NodeResult::Error(err) => {
                    return Err(ExecutionPlanNode {
                        node_type: node.node_type.clone(),
                        result: Some(NodeResult::Error(err)),
                        children,
                    });
                }
            }
        }
        Ok((children, values))
    }

    fn push_result(&mut self, value: Option<NodeResult>) {
        self.value_stack.push(value);
    }

    fn update_result(&mut self, value: Option<NodeResult>) {
        if let Some(current) = self.value_stack.last_mut() {
            *current = value;
        } else {
            self.value_stack.push(value);
        }
    }

    fn pop_result(&mut self) -> Option<NodeResult> {
        self.value_stack.pop().flatten()
    }

    fn stack_value(&self) -> Option<NodeResult> {
        self.value_stack.last().cloned().flatten()
    }

    /// Resolve a path against the current stack value. Only JSON values can
    /// be resolved into.
    fn resolve_stack_value(&self, path: &DocPath) -> anyhow::Result<NodeValue> {
        let Some(result) = self.stack_value() else {
            return Err(anyhow!(
                "Can not resolve '{}', current value stack is either empty or contains an empty value",
                path
            ));
        };
        let NodeResult::Value(value) = result else {
            return Err(anyhow!(
                "Can not resolve '{}', current stack value does not contain a value",
                path
            ));
        };
        match value {
            NodeValue::Null => Err(anyhow!(
                "Can not resolve '{}', current stack value does not contain a value (is NULL)",
                path
            )),
            NodeValue::Json(json) => {
                if path.is_root() {
                    Ok(NodeValue::Json(json))
                } else {
                    let mut matches = resolve_json_values(&json, &path.tokens()[1..]);
                    trace!("resolved path {} -> {:?}", path, matches);
                    if matches.is_empty() {
                        Ok(NodeValue::Null)
                    } else if matches.len() == 1 {
                        Ok(NodeValue::Json(matches.remove(0)))
                    } else {
                        Ok(NodeValue::Json(Value::Array(matches)))
                    }
                }
            }
            _ => Err(anyhow!(
                "Can not resolve '{}', current stack value does not contain a value that is resolvable",
                path
            )),
        }
    }

    fn validate_one_arg(
        &mut self,
        node: &ExecutionPlanNode,
        action: &str,
        value_resolver: &dyn ValueResolver,
        path: &[String],
    ) -> anyhow::Result<ExecutionPlanNode> {
        if node.children.len() > 1 {
            Err(anyhow!(
                "{} takes only one argument, got {}",
                action,
                node.children.len()
            ))
        } else if let Some(argument) = node.children.first() {
            self.walk_tree(path, argument, value_resolver)
        } else {
            Err(anyhow!("{} requires one argument, got none", action))
        }
    }

    fn validate_two_args(
        &mut self,
        node: &ExecutionPlanNode,
        action: &str,
        value_resolver: &dyn ValueResolver,
        path: &[String],
    ) -> anyhow::Result<(ExecutionPlanNode, ExecutionPlanNode)> {
        if node.children.len() == 2 {
            let first = self.walk_tree(path, &node.children[0], value_resolver)?;
            let second = self.walk_tree(path, &node.children[1], value_resolver)?;
            Ok((first, second))
        } else {
            Err(anyhow!(
                "Action '{}' requires two arguments, got {}",
                action,
                node.children.len()
            ))
        }
    }

    fn validate_three_args(
        &mut self,
        node: &ExecutionPlanNode,
        action: &str,
        value_resolver: &dyn ValueResolver,
        path: &[String],
    ) -> anyhow::Result<(ExecutionPlanNode, ExecutionPlanNode, ExecutionPlanNode)> {
        if node.children.len() == 3 {
            let first = self.walk_tree(path, &node.children[0], value_resolver)?;
            let second = self.walk_tree(path, &node.children[1], value_resolver)?;
            let third = self.walk_tree(path, &node.children[2], value_resolver)?;
            Ok((first, second, third))
        } else {
            Err(anyhow!(
                "Action '{}' requires three arguments, got {}",
                action,
                node.children.len()
            ))
        }
    }

    fn validate_args(
        &mut self,
        required: usize,
        optional: usize,
        node: &ExecutionPlanNode,
        action: &str,
        value_resolver: &dyn ValueResolver,
        path: &[String],
    ) -> anyhow::Result<(Vec<ExecutionPlanNode>, Vec<ExecutionPlanNode>)> {
        if node.children.len() < required {
            Err(anyhow!(
                "{} requires {} arguments, got {}",
                action,
                required,
                node.children.len()
            ))
        } else if node.children.len() > required + optional {
            Err(anyhow!(
                "{} supports at most {} optional arguments, got {}",
                action,
                optional,
                node.children.len() - required
            ))
        } else {
            let mut required_args = vec![];
            for child in node.children.iter().take(required) {
                required_args.push(self.walk_tree(path, child, value_resolver)?);
            }
            Ok((
                required_args,
                node.children.iter().dropping(required).cloned().collect(),
            ))
        }
    }
}

fn empty_check(empty: bool, value: &NodeValue) -> anyhow::Result<()> {
    if empty {
        Ok(())
    } else {
        Err(anyhow!("Expected {} to be empty", value.str_form()))
    }
}

fn count_check(actual: usize, expected: usize, message: String) -> Result<(), String> {
    if actual == expected {
        Ok(())
    } else {
        Err(message)
    }
}

fn json_empty_check(json: &Value) -> anyhow::Result<()> {
    match json {
        Value::Null => Ok(()),
        Value::String(s) if s.is_empty() => Ok(()),
        Value::String(_) => Err(anyhow!("Expected JSON String ({}) to be empty", json)),
        Value::Array(a) if a.is_empty() => Ok(()),
        Value::Array(_) => Err(anyhow!("Expected JSON Array ({}) to be empty", json)),
        Value::Object(o) if o.is_empty() => Ok(()),
        Value::Object(_) => Err(anyhow!("Expected JSON Object ({}) to be empty", json)),
        _ => Err(anyhow!("Expected json ({}) to be empty", json)),
    }
}

fn json_type_arg(node: &ExecutionPlanNode) -> anyhow::Result<String> {
    let result = node.value().unwrap_or_default();
    result
        .as_string()
        .ok_or_else(|| anyhow!("'{}' is not a valid JSON type", result))
}

fn json_arg(node: &ExecutionPlanNode) -> anyhow::Result<Value> {
    let result = node.value().unwrap_or_default();
    match result.as_value() {
        Some(NodeValue::Json(json)) => Ok(json),
        Some(other) => Err(anyhow!(
            "Was expecting a JSON value, but got {}",
            other.str_form()
        )),
        None => Err(anyhow!("Was expecting a JSON value, but got {}", result)),
    }
}

fn json_check_type(expected_type: &str, json_value: &Value) -> anyhow::Result<()> {
    let matched = match expected_type {
        "NULL" => json_value.is_null(),
        "BOOL" => json_value.is_boolean(),
        "NUMBER" => json_value.is_number(),
        "STRING" => json_value.is_string(),
        "ARRAY" => json_value.is_array(),
        "OBJECT" => json_value.is_object(),
        _ => return Err(anyhow!("'{}' is not a valid JSON type", expected_type)),
    };
    if matched {
        Ok(())
    } else {
        Err(anyhow!(
            "Was expecting a JSON {} but got a {}",
            expected_type,
            json_type_of(json_value)
        ))
    }
}

fn json_check_length(length: usize, json: &Value) -> anyhow::Result<()> {
    match json {
        Value::Array(a) if a.len() != length => Err(anyhow!(
            "Was expecting a length of {}, but actual length is {}",
            length,
            a.len()
        )),
        Value::Object(o) if o.len() != length => Err(anyhow!(
            "Was expecting a length of {}, but actual length is {}",
            length,
            o.len()
        )),
        _ => Ok(()),
    }
}

fn json_type_of(json: &Value) -> &'static str {
    match json {
        Value::Null => "NULL",
        Value::Bool(_) => "Bool",
        Value::Number(_) => "Number",
        Value::String(_) => "String",
        Value::Array(_) => "Array",
        Value::Object(_) => "Object",
    }
}

fn check_diff(
    action: &str,
    expected_keys: &HashSet<String>,
    actual_keys: &HashSet<String>,
) -> Result<(), (String, Option<Vec<String>>)> {
    match action {
        "expect:entries" => {
            let diff = expected_keys
                .difference(actual_keys)
                .cloned()
                .sorted()
                .collect_vec();
            if diff.is_empty() {
                Ok(())
            } else {
                let keys = NodeValue::StringList(diff.clone());
                Err((
                    format!("The following expected entries were missing: {}", keys),
                    Some(diff),
                ))
            }
        }
        "expect:only-entries" => {
            let diff = actual_keys
                .difference(expected_keys)
                .cloned()
                .sorted()
                .collect_vec();
            if diff.is_empty() {
                Ok(())
            } else {
                let keys = NodeValue::StringList(diff.clone());
                Err((
                    format!("The following unexpected entries were received: {}", keys),
                    Some(diff),
                ))
            }
        }
        _ => Err((format!("'{}' is not a valid action", action), None)),
    }
}

// Converts values to the string fragments join, join-with and error
// concatenate. Kinds with no string rendering are skipped.
fn string_forms(values: &[NodeValue]) -> Vec<String> {
    values
        .iter()
        .flat_map(|value| match value {
            NodeValue::String(s) => vec![s.clone()],
            NodeValue::Bool(b) => vec![b.to_string()],
            NodeValue::UInt(u) => vec![u.to_string()],
            NodeValue::StringList(list) => list.clone(),
            NodeValue::MultiMap(_) | NodeValue::Bytes(_) | NodeValue::Namespaced(_, _) => {
                vec![value.str_form()]
            }
            NodeValue::Json(json) => vec![json.to_string()],
            _ => vec![],
        })
        .collect_vec()
}

// Replaces templated wildcard indexes with the concrete index for one
// iteration of a for-each loop.
fn inject_index(node: &ExecutionPlanNode, index: usize) -> ExecutionPlanNode {
    match &node.node_type {
        PlanNodeType::Container(label) => {
            if let Ok(path) = DocPath::new(label.clone()) {
                ExecutionPlanNode {
                    node_type: PlanNodeType::Container(
                        inject_index_in_path(&path, index).to_string(),
                    ),
                    result: node.result.clone(),
                    children: node
                        .children
                        .iter()
                        .map(|child| inject_index(child, index))
                        .collect(),
                }
            } else {
                node.clone_with_children(
                    node.children.iter().map(|child| inject_index(child, index)),
                )
            }
        }
        PlanNodeType::Action(_) | PlanNodeType::Pipeline | PlanNodeType::Splat => node
            .clone_with_children(node.children.iter().map(|child| inject_index(child, index))),
        PlanNodeType::ResolveCurrent(expression) => ExecutionPlanNode {
            node_type: PlanNodeType::ResolveCurrent(inject_index_in_path(expression, index)),
            result: node.result.clone(),
            children: vec![],
        },
        _ => node.clone(),
    }
}

fn inject_index_in_path(path: &DocPath, index: usize) -> DocPath {
    let mut tokens = path.tokens().to_vec();
    for token in &mut tokens {
        if *token == PathToken::StarIndex {
            *token = PathToken::Index(index);
            break;
        }
    }
    DocPath::from_tokens(tokens)
}

fn resolve_json_values(json: &Value, tokens: &[PathToken]) -> Vec<Value> {
    let Some(token) = tokens.first() else {
        return vec![json.clone()];
    };
    let rest = &tokens[1..];
    match token {
        PathToken::Root => resolve_json_values(json, rest),
        PathToken::Field(name) => json
            .get(name)
            .map(|value| resolve_json_values(value, rest))
            .unwrap_or_default(),
        PathToken::Index(index) => json
            .get(*index)
            .map(|value| resolve_json_values(value, rest))
            .unwrap_or_default(),
        PathToken::Star => match json {
            Value::Object(entries) => entries
                .values()
                .flat_map(|value| resolve_json_values(value, rest))
                .collect(),
            Value::Array(items) => items
                .iter()
                .flat_map(|value| resolve_json_values(value, rest))
                .collect(),
            _ => vec![],
        },
        PathToken::StarIndex => match json {
            Value::Array(items) => items
                .iter()
                .flat_map(|value| resolve_json_values(value, rest))
                .collect(),
            _ => vec![],
        },
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn walk(
        interpreter: &mut ExecutionPlanInterpreter,
        node: &ExecutionPlanNode,
    ) -> ExecutionPlanNode {
        let resolver = HttpRequestValueResolver::default();
        interpreter.walk_tree(&[], node, &resolver).unwrap()
    }

    #[test]
    fn test_walk_value_node() {
        let mut interpreter = ExecutionPlanInterpreter::new();
        let node = ExecutionPlanNode::value_node("test");
        let result = walk(&mut interpreter, &node);
        assert_eq!(
            result.result,
            Some(NodeResult::Value(NodeValue::String("test".to_string())))
        );
    }

    #[test]
    fn test_walk_namespaced_value_node() {
        let mut interpreter = ExecutionPlanInterpreter::new();
        let node = ExecutionPlanNode::value_node(NodeValue::Namespaced(
            "json".to_string(),
            "[1, 2]".to_string(),
        ));
        let result = walk(&mut interpreter, &node);
        assert_eq!(
            result.result,
            Some(NodeResult::Value(NodeValue::Json(serde_json::json!([
                1, 2
            ]))))
        );
    }

    #[test]
    fn test_container_node_combines_child_results() {
        let mut interpreter = ExecutionPlanInterpreter::new();
        let mut container = ExecutionPlanNode::container("test");
        container
            .add(ExecutionPlanNode::value_node(true))
            .add(ExecutionPlanNode::value_node(true));
        let result = walk(&mut interpreter, &container);
        assert_eq!(result.result, Some(NodeResult::Value(NodeValue::Bool(true))));

        let mut container = ExecutionPlanNode::container("test");
        container
            .add(ExecutionPlanNode::value_node(true))
            .add(ExecutionPlanNode::action("error").add(ExecutionPlanNode::value_node("boom")));
        let result = walk(&mut interpreter, &container);
        assert_eq!(result.result, Some(NodeResult::Error("boom".to_string())));
    }

    #[test]
    fn test_upper_case_action() {
        let mut interpreter = ExecutionPlanInterpreter::new();
        let mut node = ExecutionPlanNode::action("upper-case");
        node.add(ExecutionPlanNode::value_node("get"));
        let result = walk(&mut interpreter, &node);
        assert_eq!(
            result.result,
            Some(NodeResult::Value(NodeValue::String("GET".to_string())))
        );
    }

    #[test]
    fn test_match_equality_action() {
        let mut interpreter = ExecutionPlanInterpreter::new();
        let mut node = ExecutionPlanNode::action("match:equality");
        node.add(ExecutionPlanNode::value_node("GET"))
            .add(ExecutionPlanNode::value_node("POST"))
            .add(ExecutionPlanNode::value_node(NodeValue::Null));
        let result = walk(&mut interpreter, &node);
        assert_eq!(
            result.result,
            Some(NodeResult::Error(
                "Expected 'POST' to be equal to 'GET'".to_string()
            ))
        );
    }

    #[test]
    fn test_match_action_with_error_template() {
        let mut interpreter = ExecutionPlanInterpreter::new();
        let mut node = ExecutionPlanNode::action("match:equality");
        node.add(ExecutionPlanNode::value_node("application/json"))
            .add(ExecutionPlanNode::value_node("text/plain"))
            .add(ExecutionPlanNode::value_node(NodeValue::Null))
            .add(
                ExecutionPlanNode::action("error")
                    .add(ExecutionPlanNode::value_node("Body type error - "))
                    .add(ExecutionPlanNode::apply()),
            );
        let result = walk(&mut interpreter, &node);
        assert_eq!(
            result.result,
            Some(NodeResult::Error(
                "Body type error - Expected 'text/plain' to be equal to 'application/json'"
                    .to_string()
            ))
        );
    }

    #[test]
    fn test_if_action() {
        let mut interpreter = ExecutionPlanInterpreter::new();
        let mut node = ExecutionPlanNode::action("if");
        node.add(ExecutionPlanNode::value_node(true))
            .add(ExecutionPlanNode::value_node("then"));
        let result = walk(&mut interpreter, &node);
        assert_eq!(result.result, Some(NodeResult::Value(NodeValue::Bool(true))));

        let mut node = ExecutionPlanNode::action("if");
        node.add(ExecutionPlanNode::value_node(false))
            .add(ExecutionPlanNode::value_node("then"));
        let result = walk(&mut interpreter, &node);
        assert_eq!(
            result.result,
            Some(NodeResult::Value(NodeValue::Bool(false)))
        );

        let mut node = ExecutionPlanNode::action("if");
        node.add(ExecutionPlanNode::value_node(false))
            .add(ExecutionPlanNode::value_node("then"))
            .add(
                ExecutionPlanNode::action("error")
                    .add(ExecutionPlanNode::value_node("missing")),
            );
        let result = walk(&mut interpreter, &node);
        assert_eq!(result.result, Some(NodeResult::Error("missing".to_string())));
    }

    #[test]
    fn test_check_exists_action() {
        let mut interpreter = ExecutionPlanInterpreter::new();
        let mut node = ExecutionPlanNode::action("check:exists");
        node.add(ExecutionPlanNode::value_node("something"));
        let result = walk(&mut interpreter, &node);
        assert_eq!(result.result, Some(NodeResult::Value(NodeValue::Bool(true))));

        let mut node = ExecutionPlanNode::action("check:exists");
        node.add(ExecutionPlanNode::value_node(NodeValue::Null));
        let result = walk(&mut interpreter, &node);
        assert_eq!(
            result.result,
            Some(NodeResult::Value(NodeValue::Bool(false)))
        );
    }

    #[test]
    fn test_expect_empty_action() {
        let mut interpreter = ExecutionPlanInterpreter::new();
        let mut node = ExecutionPlanNode::action("expect:empty");
        node.add(ExecutionPlanNode::value_node(NodeValue::MultiMap(
            HashMap::new(),
        )));
        let result = walk(&mut interpreter, &node);
        assert_eq!(result.result, Some(NodeResult::Value(NodeValue::Bool(true))));

        let mut node = ExecutionPlanNode::action("expect:empty");
        node.add(ExecutionPlanNode::value_node(NodeValue::StringList(vec![
            "a".to_string(),
        ])));
        let result = walk(&mut interpreter, &node);
        assert_eq!(
            result.result,
            Some(NodeResult::Error("Expected ['a'] to be empty".to_string()))
        );
    }

    #[test]
    fn test_expect_entries_action() {
        let mut interpreter = ExecutionPlanInterpreter::new();
        let map = NodeValue::MultiMap(HashMap::from([(
            "a".to_string(),
            vec!["1".to_string()],
        )]));

        let mut node = ExecutionPlanNode::action("expect:entries");
        node.add(ExecutionPlanNode::value_node(NodeValue::StringList(vec![
            "a".to_string(),
            "b".to_string(),
        ])))
        .add(ExecutionPlanNode::value_node(map.clone()));
        let result = walk(&mut interpreter, &node);
        assert_eq!(
            result.result,
            Some(NodeResult::Error(
                "The following expected entries were missing: ['b']".to_string()
            ))
        );

        let mut node = ExecutionPlanNode::action("expect:only-entries");
        node.add(ExecutionPlanNode::value_node(NodeValue::StringList(vec![])))
            .add(ExecutionPlanNode::value_node(map));
        let result = walk(&mut interpreter, &node);
        assert_eq!(
            result.result,
            Some(NodeResult::Error(
                "The following unexpected entries were received: ['a']".to_string()
            ))
        );
    }

    #[test]
    fn test_entries_error_message_via_pipeline() {
        let mut interpreter = ExecutionPlanInterpreter::new();
        let mut node = ExecutionPlanNode::action("expect:entries");
        node.add(ExecutionPlanNode::value_node(NodeValue::StringList(vec![
            "a".to_string(),
        ])))
        .add(ExecutionPlanNode::value_node(NodeValue::MultiMap(
            HashMap::new(),
        )))
        .add(
            ExecutionPlanNode::action("join")
                .add(ExecutionPlanNode::value_node(
                    "The following expected query parameters were missing: ",
                ))
                .add(
                    ExecutionPlanNode::action("join-with")
                        .add(ExecutionPlanNode::value_node(", "))
                        .add(ExecutionPlanNode::splat().add(ExecutionPlanNode::apply())),
                ),
        );
        let result = walk(&mut interpreter, &node);
        assert_eq!(
            result.result,
            Some(NodeResult::Error(
                "The following expected query parameters were missing: a".to_string()
            ))
        );
    }

    #[test]
    fn test_join_with_action() {
        let mut interpreter = ExecutionPlanInterpreter::new();
        let mut node = ExecutionPlanNode::action("join-with");
        node.add(ExecutionPlanNode::value_node(", "))
            .add(ExecutionPlanNode::value_node("a"))
            .add(ExecutionPlanNode::value_node("b"));
        let result = walk(&mut interpreter, &node);
        assert_eq!(
            result.result,
            Some(NodeResult::Value(NodeValue::String("a, b".to_string())))
        );
    }

    #[test]
    fn test_convert_utf8_action() {
        let mut interpreter = ExecutionPlanInterpreter::new();
        let mut node = ExecutionPlanNode::action("convert:UTF8");
        node.add(ExecutionPlanNode::value_node(NodeValue::Bytes(
            b"hello".to_vec(),
        )));
        let result = walk(&mut interpreter, &node);
        assert_eq!(
            result.result,
            Some(NodeResult::Value(NodeValue::String("hello".to_string())))
        );
    }

    #[test]
    fn test_length_action() {
        let mut interpreter = ExecutionPlanInterpreter::new();
        let mut node = ExecutionPlanNode::action("length");
        node.add(ExecutionPlanNode::value_node(NodeValue::StringList(vec![
            "a".to_string(),
            "b".to_string(),
        ])));
        let result = walk(&mut interpreter, &node);
        assert_eq!(result.result, Some(NodeResult::Value(NodeValue::UInt(2))));
    }

    #[test]
    fn test_header_parse_action() {
        let mut interpreter = ExecutionPlanInterpreter::new();
        let mut node = ExecutionPlanNode::action("header:parse");
        node.add(ExecutionPlanNode::value_node(
            "application/json;charset=utf-8",
        ));
        let result = walk(&mut interpreter, &node);
        assert_eq!(
            result.result,
            Some(NodeResult::Value(NodeValue::Json(json!({
                "value": "application/json",
                "parameters": { "charset": "utf-8" }
            }))))
        );
    }

    #[test]
    fn test_tee_action_resolves_current_values() {
        let mut interpreter = ExecutionPlanInterpreter::new();
        let mut node = ExecutionPlanNode::action("tee");
        node.add(
            ExecutionPlanNode::action("header:parse")
                .add(ExecutionPlanNode::value_node("text/html;charset=utf-8")),
        )
        .add(
            ExecutionPlanNode::action("match:equality")
                .add(ExecutionPlanNode::value_node("text/html"))
                .add(
                    ExecutionPlanNode::action("to-string").add(
                        ExecutionPlanNode::resolve_current_value(
                            DocPath::root().join_field("value"),
                        ),
                    ),
                )
                .add(ExecutionPlanNode::value_node(NodeValue::Null)),
        );
        let result = walk(&mut interpreter, &node);
        assert_eq!(result.result, Some(NodeResult::Value(NodeValue::Bool(true))));
    }

    #[test]
    fn test_json_expect_entries_action() {
        let mut interpreter = ExecutionPlanInterpreter::new();
        let mut node = ExecutionPlanNode::action("json:expect:entries");
        node.add(ExecutionPlanNode::value_node("OBJECT"))
            .add(ExecutionPlanNode::value_node(NodeValue::StringList(vec![
                "a".to_string(),
                "b".to_string(),
            ])))
            .add(ExecutionPlanNode::value_node(NodeValue::Json(json!({
                "a": 1
            }))));
        let result = walk(&mut interpreter, &node);
        assert_eq!(
            result.result,
            Some(NodeResult::Error(
                "The following expected entries were missing from the actual Object: b"
                    .to_string()
            ))
        );
    }

    #[test]
    fn test_for_each_action_injects_indexes() {
        let mut interpreter = ExecutionPlanInterpreter::new();
        let mut node = ExecutionPlanNode::action("tee");
        node.add(ExecutionPlanNode::value_node(NodeValue::Namespaced(
            "json".to_string(),
            "[1, 2]".to_string(),
        )))
        .add(
            ExecutionPlanNode::action("for-each")
                .add(ExecutionPlanNode::resolve_current_value(DocPath::root()))
                .add(
                    ExecutionPlanNode::action("match:equality")
                        .add(ExecutionPlanNode::resolve_current_value(
                            DocPath::root().join("[*]"),
                        ))
                        .add(ExecutionPlanNode::resolve_current_value(
                            DocPath::root().join("[*]"),
                        ))
                        .add(ExecutionPlanNode::value_node(NodeValue::Null)),
                ),
        );
        let result = walk(&mut interpreter, &node);
        assert_eq!(result.result, Some(NodeResult::Value(NodeValue::Bool(true))));
    }

    #[test]
    fn test_resolve_stack_value() {
        let mut interpreter = ExecutionPlanInterpreter::new();
        interpreter.push_result(Some(NodeResult::Value(NodeValue::Json(json!({
            "a": { "b": [1, 2] }
        })))));
        assert_eq!(
            interpreter
                .resolve_stack_value(&DocPath::new_unwrap("$.a.b[1]"))
                .unwrap(),
            NodeValue::Json(json!(2))
        );
        assert_eq!(
            interpreter
                .resolve_stack_value(&DocPath::new_unwrap("$.a.c"))
                .unwrap(),
            NodeValue::Null
        );
        assert_eq!(
            interpreter
                .resolve_stack_value(&DocPath::new_unwrap("$.a.b[*]"))
                .unwrap(),
            NodeValue::Json(json!([1, 2]))
        );
    }
}
