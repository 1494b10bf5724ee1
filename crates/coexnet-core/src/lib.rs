//! # coexnet-core
//!
//! The deterministic query pipeline for coexpression searches - THE LOGIC.
//!
//! This crate turns user selections of genes and experiments into search
//! commands, and coexpression answers into a deduplicated, filterable graph.
//! The app crate drives it against a remote backend.
//!
//! ## Pipeline
//!
//! 1. `selection`: validate and trim selections for a search mode
//! 2. `registration`: work-queue of selections the backend must register
//! 3. `stringency`: plan server and display stringency
//! 4. `command`: build immutable search commands
//! 5. `graph` / `filter`: merge answers and render the graph
//!
//! `system` holds the search state machine and `session` the state shared by
//! every stage.
//!
//! ## Architectural Constraints
//!
//! - Has NO async, NO network dependencies (pure Rust)
//! - Ordered collections only, so every operation is reproducible
//! - Never panics; fallible operations return `CoexnetError`

// =============================================================================
// MODULES
// =============================================================================

pub mod command;
pub mod filter;
pub mod graph;
pub mod link;
pub mod primitives;
pub mod registration;
pub mod selection;
pub mod session;
pub mod stringency;
pub mod system;
pub mod types;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{
    CoexnetError, CoexpressionEdge, CoexpressionResult, EntityKind, ExperimentId, GeneId, GeneRef,
    Pick, Selection, SetId, TaxonId, member_count,
};

// =============================================================================
// RE-EXPORTS: Pipeline
// =============================================================================

pub use command::{
    CoexpressionSearchCommand, DifferentialExpressionSearchCommand, FactorId, FactorMap,
    SearchCommand, SearchScope,
};
pub use filter::{GraphData, GraphEdge, GraphFilterEngine, GraphNode, GraphSize, SizeTrim};
pub use graph::{
    CoexGraphBuilder, Extension, ExtensionPlan, MergeStats, PassOutcome, RerunPlan,
    ResultSummary, StringencyChange,
};
pub use link::CoexpressionLink;
pub use registration::{RegistrationBatch, RegistrationQueue};
pub use selection::{
    SearchMode, SelectionLimits, SelectionValidator, TrimAnswer, TrimPrompt, TrimReport,
    ValidatedSelections, Validation,
};
pub use session::SearchSession;
pub use stringency::StringencyPlan;

// =============================================================================
// RE-EXPORTS: System (from system module)
// =============================================================================

pub use system::{Dispatch, FailureReason, SearchKind, SearchState, StateEvent};
