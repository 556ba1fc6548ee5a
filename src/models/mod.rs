// Domain models for the tiered query dispatcher
// These types are deliberately free of I/O: queries, routing decisions,
// action/template definitions and execution plans are plain data that the
// registry, dictionary and router operate on.

pub mod action;
pub mod decision;
pub mod plan;
pub mod query;
pub mod template;

pub use action::{ActionDescriptor, ActionResult, DirectActionKind};
pub use decision::{FailureCode, RouteDecision, RouteOutcome, RouteResult, RouteState, Tier};
pub use plan::{ColumnInfo, ExecutionPlan, ResultSet, SchemaView};
pub use query::{Query, QueryContext};
pub use template::{TemplateEntry, TemplateGroup};
