//! Execution plan matching engine.
//!
//! Matching an actual HTTP request against an expected one is expressed as an
//! execution plan: a tree of typed nodes where containers group the work per
//! request part, action nodes invoke named comparisons, and resolve nodes
//! pull values out of the request under test. A plan is built once from the
//! expected request, executed once against the actual request, and the
//! evaluated tree is then rendered as a console summary or folded into a
//! structured mismatch report.
//!
//! The main entry points are [`build_request_plan`](builder::build_request_plan)
//! and [`execute_request_plan`](interpreter::execute_request_plan).

pub mod bodies;
pub mod builder;
pub mod context;
pub mod interpreter;
pub mod plan;
pub mod report;
pub mod resolver;
pub mod result;
pub mod value;

pub use builder::build_request_plan;
pub use context::{EqualityMatcher, MatchingConfig, PlanMatchingContext, RuleMatcher};
pub use interpreter::{execute_request_plan, ExecutionPlanInterpreter};
pub use plan::{ExecutionPlan, ExecutionPlanNode, PlanNodeType, Terminator};
pub use report::{BodyMatchResult, Mismatch, MismatchGroup, RequestMatchResult};
pub use result::NodeResult;
pub use value::NodeValue;
