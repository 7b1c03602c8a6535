//! The execution plan tree: typed nodes, canonical serialization, tree
//! queries and error aggregation.

use std::fmt::Write;

use covenant_models::DocPath;

use crate::result::NodeResult;
use crate::value::{escape, NodeValue};

const GREEN: &str = "\x1b[32m";
const RED: &str = "\x1b[31m";
const RESET: &str = "\x1b[0m";

/// Controls how deep the error aggregation traversals descend.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Terminator {
    /// Descend into every child
    All,
    /// Stop descending at nested containers, surfacing them as single units
    Containers,
}

/// The opcode of a plan node.
#[derive(Clone, Debug, PartialEq)]
pub enum PlanNodeType {
    /// Placeholder node, never walked
    Empty,
    /// Named grouping node, e.g. one per request part or per header key
    Container(String),
    /// Invokes a named operation against its child arguments
    Action(String),
    /// A literal value
    Value(NodeValue),
    /// Looks up a value from the root test context
    Resolve(DocPath),
    /// Looks up a value relative to the enclosing pipeline or splat scope
    ResolveCurrent(DocPath),
    /// Evaluates children left to right, each receiving the previous result
    Pipeline,
    /// Expands in place into its children's combined result
    Splat,
    /// Documentation only, never evaluated
    Annotation(String),
}

/// A node in an execution plan tree. Each node owns its children exclusively;
/// the node type is fixed at construction and only the result is written
/// during evaluation.
#[derive(Clone, Debug, PartialEq)]
pub struct ExecutionPlanNode {
    pub node_type: PlanNodeType,
    pub result: Option<NodeResult>,
    pub children: Vec<ExecutionPlanNode>,
}

impl ExecutionPlanNode {
    pub fn container(label: impl Into<String>) -> ExecutionPlanNode {
        ExecutionPlanNode {
            node_type: PlanNodeType::Container(label.into()),
            result: None,
            children: vec![],
        }
    }

    pub fn action(action: impl Into<String>) -> ExecutionPlanNode {
        ExecutionPlanNode {
            node_type: PlanNodeType::Action(action.into()),
            result: None,
            children: vec![],
        }
    }

    pub fn value_node(value: impl Into<NodeValue>) -> ExecutionPlanNode {
        ExecutionPlanNode {
            node_type: PlanNodeType::Value(value.into()),
            result: None,
            children: vec![],
        }
    }

    pub fn resolve_value(path: impl Into<DocPath>) -> ExecutionPlanNode {
        ExecutionPlanNode {
            node_type: PlanNodeType::Resolve(path.into()),
            result: None,
            children: vec![],
        }
    }

    pub fn resolve_current_value(path: impl Into<DocPath>) -> ExecutionPlanNode {
        ExecutionPlanNode {
            node_type: PlanNodeType::ResolveCurrent(path.into()),
            result: None,
            children: vec![],
        }
    }

    /// Shorthand for the `apply` action, which reads the current value off
    /// the evaluation stack.
    pub fn apply() -> ExecutionPlanNode {
        ExecutionPlanNode::action("apply")
    }

    pub fn pipeline() -> ExecutionPlanNode {
        ExecutionPlanNode {
            node_type: PlanNodeType::Pipeline,
            result: None,
            children: vec![],
        }
    }

    pub fn splat() -> ExecutionPlanNode {
        ExecutionPlanNode {
            node_type: PlanNodeType::Splat,
            result: None,
            children: vec![],
        }
    }

    pub fn annotation(description: impl Into<String>) -> ExecutionPlanNode {
        ExecutionPlanNode {
            node_type: PlanNodeType::Annotation(description.into()),
            result: None,
            children: vec![],
        }
    }

    /// Adds the node as a child.
    pub fn add(&mut self, node: impl Into<ExecutionPlanNode>) -> &mut Self {
        self.children.push(node.into());
        self
    }

    /// Pushes the node onto the front of the children.
    pub fn push_node(&mut self, node: ExecutionPlanNode) {
        self.children.insert(0, node);
    }

    /// A node is empty when it is an `Empty` placeholder or a branching node
    /// with no children. Leaf node kinds are never empty.
    pub fn is_empty(&self) -> bool {
        match &self.node_type {
            PlanNodeType::Empty => true,
            PlanNodeType::Value(_)
            | PlanNodeType::Resolve(_)
            | PlanNodeType::ResolveCurrent(_)
            | PlanNodeType::Annotation(_) => false,
            _ => self.children.is_empty(),
        }
    }

    /// Serialised text form of this node and its subtree.
    pub fn str_form(&self) -> String {
        let mut buffer = String::new();
        self.write_str_form(&mut buffer);
        buffer
    }

    fn write_str_form(&self, buffer: &mut String) {
        buffer.push('(');
        match &self.node_type {
            PlanNodeType::Empty => {}
            PlanNodeType::Container(label) => {
                buffer.push(':');
                buffer.push_str(&escape(label));
                buffer.push('(');
                self.write_str_form_children(buffer);
                buffer.push(')');
                self.write_result(buffer);
            }
            PlanNodeType::Action(action) => {
                buffer.push('%');
                buffer.push_str(action);
                buffer.push('(');
                self.write_str_form_children(buffer);
                buffer.push(')');
                self.write_result(buffer);
            }
            PlanNodeType::Value(value) => {
                buffer.push_str(&value.str_form());
                self.write_result(buffer);
            }
            PlanNodeType::Resolve(path) => {
                buffer.push_str(&path.to_string());
                self.write_result(buffer);
            }
            PlanNodeType::ResolveCurrent(path) => {
                buffer.push_str("~>");
                buffer.push_str(&path.to_string());
                self.write_result(buffer);
            }
            PlanNodeType::Pipeline => {
                buffer.push_str("->");
                buffer.push('(');
                self.write_str_form_children(buffer);
                buffer.push(')');
                self.write_result(buffer);
            }
            PlanNodeType::Splat => {
                buffer.push_str("**");
                buffer.push('(');
                self.write_str_form_children(buffer);
                buffer.push(')');
                self.write_result(buffer);
            }
            PlanNodeType::Annotation(description) => {
                buffer.push_str("#{");
                buffer.push_str(&escape(description));
                buffer.push('}');
            }
        }
        buffer.push(')');
    }

    fn write_str_form_children(&self, buffer: &mut String) {
        let mut first = true;
        for child in &self.children {
            if first {
                first = false;
            } else {
                buffer.push(',');
            }
            child.write_str_form(buffer);
        }
    }

    fn write_result(&self, buffer: &mut String) {
        if let Some(result) = &self.result {
            buffer.push_str("=>");
            let _ = write!(buffer, "{}", result);
        }
    }

    /// Human readable form of this node and its subtree, 2 spaces of
    /// indentation per depth.
    pub fn pretty_form(&self, buffer: &mut String, indent: usize) {
        let pad = " ".repeat(indent);
        match &self.node_type {
            PlanNodeType::Empty => {}
            PlanNodeType::Container(label) => {
                buffer.push_str(&pad);
                buffer.push(':');
                buffer.push_str(&escape(label));
                self.pretty_form_branch(buffer, indent, &pad);
            }
            PlanNodeType::Action(action) => {
                buffer.push_str(&pad);
                buffer.push('%');
                buffer.push_str(action);
                self.pretty_form_branch(buffer, indent, &pad);
            }
            PlanNodeType::Value(value) => {
                buffer.push_str(&pad);
                buffer.push_str(&value.str_form());
                self.write_pretty_result(buffer);
            }
            PlanNodeType::Resolve(path) => {
                buffer.push_str(&pad);
                buffer.push_str(&path.to_string());
                self.write_pretty_result(buffer);
            }
            PlanNodeType::ResolveCurrent(path) => {
                buffer.push_str(&pad);
                buffer.push_str("~>");
                buffer.push_str(&path.to_string());
                self.write_pretty_result(buffer);
            }
            PlanNodeType::Pipeline => {
                buffer.push_str(&pad);
                buffer.push_str("->");
                self.pretty_form_branch(buffer, indent, &pad);
            }
            PlanNodeType::Splat => {
                buffer.push_str(&pad);
                buffer.push_str("**");
                self.pretty_form_branch(buffer, indent, &pad);
            }
            PlanNodeType::Annotation(description) => {
                buffer.push_str(&pad);
                buffer.push_str("#{");
                buffer.push_str(&escape(description));
                buffer.push('}');
            }
        }
    }

    fn pretty_form_branch(&self, buffer: &mut String, indent: usize, pad: &str) {
        if self.is_empty() {
            buffer.push_str(" ()");
        } else {
            buffer.push_str(" (\n");
            let mut first = true;
            for child in &self.children {
                if first {
                    first = false;
                } else {
                    buffer.push_str(",\n");
                }
                child.pretty_form(buffer, indent + 2);
            }
            buffer.push('\n');
            buffer.push_str(pad);
            buffer.push(')');
        }
        self.write_pretty_result(buffer);
    }

    fn write_pretty_result(&self, buffer: &mut String) {
        if let Some(result) = &self.result {
            let _ = write!(buffer, " => {}", result);
        }
    }

    /// Render a console summary of the evaluated subtree. Only containers
    /// produce output lines; everything else just fans out to its children.
    pub fn generate_summary(&self, ansi_color: bool, buffer: &mut String, indent: usize) {
        if let PlanNodeType::Container(label) = &self.node_type {
            let pad = " ".repeat(indent);
            buffer.push_str(&pad);
            buffer.push_str(label);
            buffer.push(':');

            if let Some(annotation) = self.annotation_node() {
                buffer.push(' ');
                buffer.push_str(&annotation);
            }

            if let Some(result) = &self.result {
                let error_pad = " ".repeat(indent + label.len() + 2);
                if self.is_leaf_node() || self.is_terminal_container() {
                    if result.is_truthy() {
                        push_status(buffer, ansi_color, GREEN, "OK");
                    } else {
                        let errors = self.child_errors(Terminator::All);
                        if let NodeResult::Error(message) = result {
                            push_error(buffer, ansi_color, message);
                            for error in &errors {
                                buffer.push('\n');
                                buffer.push_str(&error_pad);
                                push_error(buffer, ansi_color, error);
                            }
                        } else if errors.len() == 1 {
                            push_error(buffer, ansi_color, &errors[0]);
                        } else if errors.is_empty() {
                            push_status(buffer, ansi_color, RED, "FAILED");
                        } else {
                            for error in &errors {
                                buffer.push('\n');
                                buffer.push_str(&error_pad);
                                push_error(buffer, ansi_color, error);
                            }
                        }
                    }
                } else {
                    let errors = self.child_errors(Terminator::Containers);
                    if let NodeResult::Error(message) = result {
                        push_error(buffer, ansi_color, message);
                        for error in &errors {
                            buffer.push('\n');
                            buffer.push_str(&error_pad);
                            push_error(buffer, ansi_color, error);
                        }
                    } else if errors.len() == 1 {
                        push_error(buffer, ansi_color, &errors[0]);
                    } else if !errors.is_empty() {
                        for error in &errors {
                            buffer.push('\n');
                            buffer.push_str(&error_pad);
                            push_error(buffer, ansi_color, error);
                        }
                    }
                }
            }

            buffer.push('\n');
            for child in &self.children {
                child.generate_summary(ansi_color, buffer, indent + 2);
            }
        } else {
            for child in &self.children {
                child.generate_summary(ansi_color, buffer, indent);
            }
        }
    }

    /// Walk the subtree to find a node matching the given path of node
    /// identifiers. Depth-first, first match wins, and the returned node is
    /// a detached copy of the matched subtree.
    pub fn fetch_node(&self, path: &[&str]) -> Option<ExecutionPlanNode> {
        match path.split_first() {
            None => None,
            Some((first, rest)) => {
                if self.matches(first) {
                    if rest.is_empty() {
                        Some(self.clone())
                    } else {
                        self.children.iter().find_map(|child| child.fetch_node(rest))
                    }
                } else {
                    None
                }
            }
        }
    }

    /// If this node matches a single path identifier. Value, empty and
    /// annotation nodes never match anything.
    pub fn matches(&self, identifier: &str) -> bool {
        match &self.node_type {
            PlanNodeType::Empty => false,
            PlanNodeType::Container(label) => format!(":{}", label) == identifier,
            PlanNodeType::Action(action) => format!("%{}", action) == identifier,
            PlanNodeType::Value(_) => false,
            PlanNodeType::Resolve(path) => path.to_string() == identifier,
            PlanNodeType::ResolveCurrent(path) => format!("~>{}", path) == identifier,
            PlanNodeType::Pipeline => identifier == "->",
            PlanNodeType::Splat => identifier == "**",
            PlanNodeType::Annotation(_) => false,
        }
    }

    pub fn is_splat(&self) -> bool {
        self.node_type == PlanNodeType::Splat
    }

    pub fn is_container(&self) -> bool {
        matches!(self.node_type, PlanNodeType::Container(_))
    }

    pub fn is_leaf_node(&self) -> bool {
        self.children.is_empty()
    }

    /// A container with no further containers anywhere below it.
    pub fn is_terminal_container(&self) -> bool {
        self.is_container() && !self.has_child_containers()
    }

    pub fn has_child_containers(&self) -> bool {
        self.children
            .iter()
            .any(|child| child.is_container() || child.has_child_containers())
    }

    /// The result of evaluating this node, if it has been evaluated.
    pub fn value(&self) -> Option<NodeResult> {
        self.result.clone()
    }

    /// The text of the first annotation child, if any.
    pub fn annotation_node(&self) -> Option<String> {
        self.children.iter().find_map(|child| match &child.node_type {
            PlanNodeType::Annotation(description) => Some(description.clone()),
            _ => None,
        })
    }

    /// Collect the error messages from the child nodes. With
    /// `Terminator::Containers` nested containers are not descended into;
    /// with `Terminator::All` the whole subtree is flattened.
    pub fn child_errors(&self, terminator: Terminator) -> Vec<String> {
        let mut errors = vec![];
        for child in &self.children {
            if !child.is_container() || terminator == Terminator::All {
                if let Some(NodeResult::Error(message)) = &child.result {
                    errors.push(message.clone());
                }
                errors.extend(child.child_errors(terminator));
            }
        }
        errors
    }

    /// The first error for this node: its own error result if set, else the
    /// first child error found without descending into nested containers.
    pub fn error(&self) -> Option<String> {
        if let Some(NodeResult::Error(message)) = &self.result {
            Some(message.clone())
        } else {
            self.child_errors(Terminator::Containers).first().cloned()
        }
    }

    /// All the errors for this node and its entire subtree.
    pub fn errors(&self) -> Vec<String> {
        let mut errors = vec![];
        if let Some(NodeResult::Error(message)) = &self.result {
            errors.push(message.clone());
        }
        errors.extend(self.child_errors(Terminator::All));
        errors
    }

    /// Fold over the depth-first traversal of the containers in this
    /// subtree. The callback sees every container descendant; other nodes
    /// are descended through but not passed to the callback.
    pub fn traverse_containers<Acc, F>(&self, initial: Acc, callback: &mut F) -> Acc
    where
        F: FnMut(Acc, &str, &ExecutionPlanNode) -> Acc,
    {
        let mut acc = initial;
        for child in &self.children {
            if let PlanNodeType::Container(label) = &child.node_type {
                acc = callback(acc, label, child);
            }
            acc = child.traverse_containers(acc, callback);
        }
        acc
    }

    /// Copy of this node with the result replaced.
    pub fn clone_with_result(&self, result: NodeResult) -> ExecutionPlanNode {
        ExecutionPlanNode {
            node_type: self.node_type.clone(),
            result: Some(result),
            children: self.children.clone(),
        }
    }

    /// Copy of this node with the children replaced.
    pub fn clone_with_children(
        &self,
        children: impl IntoIterator<Item = ExecutionPlanNode>,
    ) -> ExecutionPlanNode {
        ExecutionPlanNode {
            node_type: self.node_type.clone(),
            result: self.result.clone(),
            children: children.into_iter().collect(),
        }
    }
}

impl Default for ExecutionPlanNode {
    fn default() -> Self {
        ExecutionPlanNode {
            node_type: PlanNodeType::Empty,
            result: None,
            children: vec![],
        }
    }
}

impl From<&mut ExecutionPlanNode> for ExecutionPlanNode {
    fn from(node: &mut ExecutionPlanNode) -> Self {
        node.clone()
    }
}

impl From<&ExecutionPlanNode> for ExecutionPlanNode {
    fn from(node: &ExecutionPlanNode) -> Self {
        node.clone()
    }
}

fn push_status(buffer: &mut String, ansi_color: bool, color: &str, status: &str) {
    if ansi_color {
        let _ = write!(buffer, " - {}{}{}", color, status, RESET);
    } else {
        let _ = write!(buffer, " - {}", status);
    }
}

fn push_error(buffer: &mut String, ansi_color: bool, message: &str) {
    if ansi_color {
        let _ = write!(buffer, " - {}ERROR{} {}{}{}", RED, RESET, RED, message, RESET);
    } else {
        let _ = write!(buffer, " - ERROR {}", message);
    }
}

/// A complete execution plan: a tree with a distinguished root container.
#[derive(Clone, Debug, PartialEq)]
pub struct ExecutionPlan {
    pub plan_root: ExecutionPlanNode,
}

impl ExecutionPlan {
    /// New plan with a container root with the given label.
    pub fn new(label: impl Into<String>) -> ExecutionPlan {
        ExecutionPlan {
            plan_root: ExecutionPlanNode::container(label),
        }
    }

    /// Adds the node to the root of the plan. Empty nodes are dropped, so
    /// builders that produced nothing for a request part add nothing here.
    pub fn add(&mut self, node: ExecutionPlanNode) {
        if !node.is_empty() {
            self.plan_root.add(node);
        }
    }

    /// Serialised text form of the whole plan.
    pub fn str_form(&self) -> String {
        self.plan_root.str_form()
    }

    /// Human readable form of the whole plan.
    pub fn pretty_form(&self) -> String {
        let mut buffer = String::new();
        self.plan_root.pretty_form(&mut buffer, 0);
        buffer
    }

    /// Console summary of the evaluated plan.
    pub fn generate_summary(&self, ansi_color: bool) -> String {
        let mut buffer = String::new();
        self.plan_root.generate_summary(ansi_color, &mut buffer, 0);
        buffer
    }

    /// Fetch a copy of the node at the given path of node identifiers.
    pub fn fetch_node(&self, path: &[&str]) -> Option<ExecutionPlanNode> {
        self.plan_root.fetch_node(path)
    }
}

impl From<ExecutionPlanNode> for ExecutionPlan {
    fn from(node: ExecutionPlanNode) -> Self {
        ExecutionPlan { plan_root: node }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tree() -> ExecutionPlanNode {
        let mut method = ExecutionPlanNode::container("method");
        let mut action = ExecutionPlanNode::action("match:equality");
        action
            .add(ExecutionPlanNode::value_node("GET"))
            .add(ExecutionPlanNode::resolve_value(
                covenant_models::DocPath::new_unwrap("$.method"),
            ));
        method.add(action);
        let mut root = ExecutionPlanNode::container("request");
        root.add(method);
        root
    }

    #[test]
    fn test_str_form() {
        assert_eq!(
            sample_tree().str_form(),
            "(:request((:method((%match:equality(('GET'),($.method)))))))"
        );
    }

    #[test]
    fn test_str_form_quotes_labels_with_whitespace() {
        let mut container = ExecutionPlanNode::container("query parameters");
        container.add(ExecutionPlanNode::value_node(NodeValue::Bool(true)));
        assert_eq!(
            container.str_form(),
            "(:'query parameters'((BOOL(true))))"
        );
    }

    #[test]
    fn test_str_form_with_results() {
        let mut node = ExecutionPlanNode::action("check:exists");
        node.result = Some(NodeResult::Value(NodeValue::Bool(true)));
        let mut child = ExecutionPlanNode::resolve_value(covenant_models::DocPath::new_unwrap(
            "$.body",
        ));
        child.result = Some(NodeResult::Error("not found".to_string()));
        node.add(child);
        assert_eq!(
            node.str_form(),
            "(%check:exists(($.body=>ERROR(not found)))=>BOOL(true))"
        );
    }

    #[test]
    fn test_str_form_annotation_and_empty() {
        let annotation = ExecutionPlanNode::annotation("method must be GET");
        assert_eq!(annotation.str_form(), "(#{'method must be GET'})");
        assert_eq!(ExecutionPlanNode::default().str_form(), "()");
    }

    #[test]
    fn test_pretty_form() {
        let mut buffer = String::new();
        sample_tree().pretty_form(&mut buffer, 0);
        let expected = ":request (\n  :method (\n    %match:equality (\n      'GET',\n      $.method\n    )\n  )\n)";
        assert_eq!(buffer, expected);
    }

    #[test]
    fn test_pretty_form_empty_branch() {
        let container = ExecutionPlanNode::container("headers");
        let mut buffer = String::new();
        container.pretty_form(&mut buffer, 0);
        assert_eq!(buffer, ":headers ()");
    }

    #[test]
    fn test_is_empty() {
        assert!(ExecutionPlanNode::default().is_empty());
        assert!(ExecutionPlanNode::container("x").is_empty());
        assert!(ExecutionPlanNode::action("x").is_empty());
        assert!(!ExecutionPlanNode::value_node("x").is_empty());
        assert!(!ExecutionPlanNode::annotation("x").is_empty());
        assert!(!sample_tree().is_empty());
    }

    #[test]
    fn test_plan_add_ignores_empty_nodes() {
        let mut plan = ExecutionPlan::new("request");
        let before = plan.str_form();
        plan.add(ExecutionPlanNode::default());
        plan.add(ExecutionPlanNode::container("nothing"));
        assert_eq!(plan.str_form(), before);
    }

    #[test]
    fn test_fetch_node() {
        let tree = sample_tree();
        let fetched = tree
            .fetch_node(&[":request", ":method", "%match:equality"])
            .unwrap();
        assert_eq!(
            fetched.node_type,
            PlanNodeType::Action("match:equality".to_string())
        );
        assert_eq!(fetched.children.len(), 2);
        // no match for a wrong first segment or an empty path
        assert!(tree.fetch_node(&[":method"]).is_none());
        assert!(tree.fetch_node(&[]).is_none());
    }

    #[test]
    fn test_fetch_node_is_non_mutating() {
        let tree = sample_tree();
        let before = tree.str_form();
        let first = tree.fetch_node(&[":request", ":method"]).unwrap();
        let second = tree.fetch_node(&[":request", ":method"]).unwrap();
        assert_eq!(first, second);
        assert_eq!(tree.str_form(), before);
    }

    #[test]
    fn test_child_errors_terminators() {
        let mut inner_error = ExecutionPlanNode::action("match:equality");
        inner_error.result = Some(NodeResult::Error("inner error".to_string()));
        let mut inner = ExecutionPlanNode::container("inner");
        inner.add(inner_error);
        let mut outer = ExecutionPlanNode::container("outer");
        outer.add(inner);

        assert!(outer.child_errors(Terminator::Containers).is_empty());
        assert_eq!(
            outer.child_errors(Terminator::All),
            vec!["inner error".to_string()]
        );
    }

    #[test]
    fn test_error_prefers_own_result() {
        let mut child = ExecutionPlanNode::action("x");
        child.result = Some(NodeResult::Error("child error".to_string()));
        let mut node = ExecutionPlanNode::container("c");
        node.add(child);
        assert_eq!(node.error(), Some("child error".to_string()));
        node.result = Some(NodeResult::Error("own error".to_string()));
        assert_eq!(node.error(), Some("own error".to_string()));
        assert_eq!(
            node.errors(),
            vec!["own error".to_string(), "child error".to_string()]
        );
    }

    #[test]
    fn test_traverse_containers() {
        let mut leaf = ExecutionPlanNode::container("leaf");
        leaf.add(ExecutionPlanNode::value_node("x"));
        let mut pipeline = ExecutionPlanNode::pipeline();
        pipeline.add(leaf);
        let mut root = ExecutionPlanNode::container("root");
        root.add(pipeline);

        let labels = root.traverse_containers(vec![], &mut |mut acc: Vec<String>, label, _| {
            acc.push(label.to_string());
            acc
        });
        assert_eq!(labels, vec!["leaf".to_string()]);
    }

    #[test]
    fn test_generate_summary_ok_and_failed() {
        let mut method = ExecutionPlanNode::container("method");
        method.result = Some(NodeResult::Value(NodeValue::Bool(true)));
        let mut path = ExecutionPlanNode::container("path");
        path.result = Some(NodeResult::Value(NodeValue::Bool(false)));
        let mut root = ExecutionPlanNode::container("request");
        root.result = Some(NodeResult::Value(NodeValue::Bool(false)));
        root.add(method);
        root.add(path);

        let mut buffer = String::new();
        root.generate_summary(false, &mut buffer, 0);
        assert_eq!(buffer, "request:\n  method: - OK\n  path: - FAILED\n");
    }

    #[test]
    fn test_generate_summary_with_error() {
        let mut action = ExecutionPlanNode::action("match:equality");
        action.result = Some(NodeResult::Error("expected GET got POST".to_string()));
        let mut method = ExecutionPlanNode::container("method");
        method.result = Some(NodeResult::Value(NodeValue::Bool(false)));
        method.add(action);
        let mut buffer = String::new();
        method.generate_summary(false, &mut buffer, 0);
        assert_eq!(buffer, "method: - ERROR expected GET got POST\n");
    }
}
