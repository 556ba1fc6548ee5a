// KinderQuery - Tiered natural-language query dispatcher
// The AI-query core for a kindergarten-management backend: free-text queries
// are answered from a fixed action table, a curated template dictionary, or a
// constrained LLM-generated query, in that order.

//! # KinderQuery Library
//!
//! This is the main library crate for KinderQuery, the tiered dispatcher that
//! backs the "AI assistant" and "AI query" features of the management
//! backend. This file serves as the **library root** and defines the public
//! API that external crates can use.
//!
//! ## Core Components
//!
//! ### Domain Models
//! - [`Query`]: An immutable, normalized user query
//! - [`RouteDecision`]: Which tier answered, with confidence and candidates
//! - [`ActionDescriptor`]: One entry of the fixed tier-1 action table
//! - [`TemplateEntry`] / [`TemplateGroup`]: The curated tier-2 dictionary
//! - [`ExecutionPlan`]: A validated, bounded tier-3 query
//!
//! ### Dispatch Pipeline
//!
//! [`QueryDispatcher`] is the authoritative entry point. It runs an explicit
//! state machine per query:
//!
//! ```text
//! Received -> CacheCheck -> TryDirect -> TryTemplate -> Fallback -> Done | Failed
//! ```
//!
//! Each stage is a hard gate: the dispatcher never retries a lower tier once
//! it has escalated, cache hits short-circuit the whole pipeline, and the
//! fallback tier only executes text that survived the
//! [`fallback::GeneratedQueryValidator`] safety gate.
//!
//! ### Collaborators
//!
//! The two untrusted boundaries are modeled as traits so the pipeline can be
//! tested with deterministic fakes:
//! - [`llm::LlmClient`]: opaque `generate(prompt) -> text`
//! - [`fallback::ReadOnlyExecutor`]: bounded read-only statement execution
//!
//! ## Rust Learning Notes:
//!
//! ### Module System
//! Each `mod` declaration below pulls in a component of the dispatcher. The
//! `pub use` re-exports create a flat API so callers can write
//! `use kinderquery::QueryDispatcher` instead of navigating the hierarchy.

// Core domain models (queries, decisions, templates, plans)
pub mod models;

// Dispatcher configuration (thresholds, TTLs, allow-lists, tables)
pub mod config;

// Tier 1: fixed keyword -> action table
pub mod registry;

// Tier 2: curated template dictionary with IDF scoring
pub mod dictionary;

// Tier 3: constrained LLM-generated query execution
pub mod fallback;

// LLM collaborator boundary
pub mod llm;

// Result cache and single-flight table
pub mod cache;

// Fire-and-forget performance statistics
pub mod stats;

// The tier router / state machine
pub mod router;

// HTTP surface consumed by the admin dashboard and assistant frontend
pub mod api;

// Re-export core domain types for easy access
pub use models::{
    ActionDescriptor, // One tier-1 action table entry
    ActionResult,     // Output of a direct action handler
    DirectActionKind, // Count / Navigate / Aggregate handler kinds
    ExecutionPlan,    // Validated, bounded tier-3 query
    Query,            // Immutable normalized user query
    QueryContext,     // Identity/permission scope for a request
    ResultSet,        // Shaped rows + column metadata
    RouteDecision,    // Tier, confidence, candidates, state trace
    RouteOutcome,     // Done(result) or Failed(code, message)
    RouteResult,      // Outcome + decision, returned to callers
    RouteState,       // Named states of the dispatch FSM
    SchemaView,       // Whitelisted table/column view
    TemplateEntry,    // One tier-2 dictionary entry
    TemplateGroup,    // Category-grouped dictionary entries
    Tier,             // Direct | Template | Fallback
};

pub use cache::{CacheEntry, ResultCache};
pub use config::DispatcherConfig;
pub use dictionary::TemplateDictionary;
pub use registry::ActionRegistry;
pub use router::QueryDispatcher;
pub use stats::{StatsRecorder, StatsSnapshot};

// Re-export server types for convenience
pub use api::{DispatcherServer, DispatcherServerBuilder, ServerConfig};

// Core error types
// Using the `thiserror` crate to make error handling easier
use thiserror::Error;

/// Custom error types for dispatcher operations
///
/// `NoMatch` is deliberately absent: a query that matches neither the action
/// table nor the dictionary is a normal routing outcome (escalation), not an
/// error. Everything here is a genuine failure that a tier converts into a
/// typed [`models::RouteOutcome::Failed`] at its boundary.
#[derive(Error, Debug)]
pub enum DispatchError {
    /// Invalid inbound request (empty query, over-long query, bad params)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The generated query failed the safety gate and was never executed
    #[error("Generated query rejected: {0}")]
    ValidationRejected(String),

    /// The bounded read-only execution exceeded its statement timeout
    #[error("Execution timed out after {timeout_ms}ms")]
    ExecutionTimeout { timeout_ms: u64 },

    /// The bounded read-only execution failed
    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    /// The LLM collaborator was unreachable or returned an error
    #[error("Upstream LLM unavailable: {0}")]
    UpstreamUnavailable(String),

    /// Cache faults degrade to "compute fresh" and must never fail a request;
    /// this variant exists so cache internals can still report them for logs
    #[error("Cache error: {0}")]
    CacheError(String),

    /// Configuration could not be loaded or is inconsistent
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Truly unexpected errors (programming errors, poisoned state)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<std::io::Error> for DispatchError {
    fn from(err: std::io::Error) -> Self {
        DispatchError::Internal(err.to_string())
    }
}

/// Type alias for Results that use our custom error type
pub type Result<T> = std::result::Result<T, DispatchError>;
