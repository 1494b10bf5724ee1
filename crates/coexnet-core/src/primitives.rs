//! # Pipeline Primitives
//!
//! Fixed constants of the query pipeline.
//!
//! Limits that an operator may want to change live in `SelectionLimits` and
//! are configurable from the app; the values here are their defaults plus the
//! stringency constants, which are part of the numeric contract with the
//! backend and must not change.

// =============================================================================
// STRINGENCY
// =============================================================================

/// Lowest stringency the backend accepts.
pub const MIN_STRINGENCY: u32 = 2;

/// Highest display stringency the planner will choose.
pub const MAX_DISPLAY_STRINGENCY: u32 = 20;

/// Number of datasets that raise the planned display stringency by one.
pub const DATASETS_PER_STRINGENCY_STEP: u64 = 50;

/// Display stringencies up to this value are sent to the server unchanged.
///
/// Above it the server stringency is relaxed by a quarter so the client can
/// re-filter without another round trip.
pub const RELAXATION_THRESHOLD: u32 = 5;

// =============================================================================
// SELECTION LIMITS (defaults)
// =============================================================================

/// Maximum query genes for a coexpression search. Applied silently.
pub const DEFAULT_COEX_MAX_GENES: usize = 20;

/// Maximum genes for a classic differential expression search.
pub const DEFAULT_DIFF_EX_MAX_GENES: usize = 20;

/// Maximum experiments for a classic differential expression search.
pub const DEFAULT_DIFF_EX_MAX_EXPERIMENTS: usize = 20;

/// Maximum genes for a differential expression visualization.
pub const DEFAULT_DIFF_EX_VIZ_MAX_GENES: usize = 100;

/// Maximum experiments for a differential expression visualization.
pub const DEFAULT_DIFF_EX_VIZ_MAX_EXPERIMENTS: usize = 100;

/// Maximum query genes when searching from nodes of the graph.
pub const DEFAULT_VIZ_MAX_QUERY_GENES: usize = 20;

/// Prefix given to the name of a set truncated by trimming.
pub const TRIMMED_PREFIX: &str = "Trimmed ";

// =============================================================================
// REGISTRATION
// =============================================================================

/// Upper bound on registration round trips for one search.
///
/// One round for gene sets and one for experiment sets.
pub const MAX_REGISTRATION_ROUNDS: usize = 2;

// =============================================================================
// GRAPH
// =============================================================================

/// Thresholds on `node_degree_rank` separating the ten node-degree bins.
pub const NODE_DEGREE_BIN_THRESHOLDS: [f64; 9] = [0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8, 0.9];

/// Edge budget of the large graph-size preset.
pub const LARGE_GRAPH_EDGES: usize = 1000;

/// Edge budget of the medium graph-size preset.
pub const MEDIUM_GRAPH_EDGES: usize = 500;

/// Edge budget of the small graph-size preset.
pub const SMALL_GRAPH_EDGES: usize = 200;
