//! # Core Type Definitions
//!
//! This module contains the data model shared by every stage of the pipeline:
//! - Identifiers (`GeneId`, `ExperimentId`, `TaxonId`, `SetId`)
//! - Picker output and selections (`Pick`, `Selection`, `EntityKind`)
//! - Coexpression results (`GeneRef`, `CoexpressionEdge`, `CoexpressionResult`)
//! - Error types (`CoexnetError`)
//!
//! ## Determinism Guarantees
//!
//! All identifier types implement `Ord` so they can live in `BTreeMap`/`BTreeSet`.
//! The only floating-point value is `GeneRef::node_degree_rank`, which is
//! compared against fixed thresholds and never used in arithmetic.

use serde::{Deserialize, Serialize};
use thiserror::Error;

// =============================================================================
// IDENTIFIERS
// =============================================================================

/// Identifier of a gene on the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GeneId(pub u64);

/// Identifier of an expression experiment (dataset) on the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ExperimentId(pub u64);

/// Identifier of a taxon (species).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TaxonId(pub u64);

impl std::fmt::Display for GeneId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a gene or experiment set.
///
/// A set is ephemeral until the backend registers it for the session. On the
/// wire an ephemeral set has `null` or `-1` as its id; any other value is
/// treated as durable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "Option<i64>", into = "Option<i64>")]
pub enum SetId {
    /// Not yet known to the backend.
    Ephemeral,
    /// Registered (session-bound or persistent) set.
    Durable(i64),
}

impl SetId {
    /// Check whether this id refers to a registered set.
    #[must_use]
    pub const fn is_durable(self) -> bool {
        matches!(self, Self::Durable(_))
    }
}

impl From<Option<i64>> for SetId {
    fn from(raw: Option<i64>) -> Self {
        match raw {
            None | Some(-1) => Self::Ephemeral,
            Some(id) => Self::Durable(id),
        }
    }
}

impl From<SetId> for Option<i64> {
    fn from(id: SetId) -> Self {
        match id {
            SetId::Ephemeral => None,
            SetId::Durable(id) => Some(id),
        }
    }
}

// =============================================================================
// SELECTIONS
// =============================================================================

/// What a selection groups together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Gene,
    Experiment,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Gene => write!(f, "gene"),
            Self::Experiment => write!(f, "experiment"),
        }
    }
}

/// A group of genes or experiments picked by the user.
///
/// Member order is significant: trimming keeps the leading members.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Selection {
    /// Gene set or experiment set.
    pub kind: EntityKind,
    /// Backend id, ephemeral until registered.
    pub id: SetId,
    /// Member gene or experiment ids, in picker order.
    pub member_ids: Vec<u64>,
    /// Display name.
    pub name: String,
    /// Longer description (full gene name, experiment title).
    #[serde(default)]
    pub description: String,
    /// Taxon every member belongs to.
    pub taxon_id: TaxonId,
    /// Set when the member list differs from what the backend knows.
    #[serde(default)]
    pub modified: bool,
}

impl Selection {
    /// Create an ephemeral selection.
    #[must_use]
    pub fn ephemeral(
        kind: EntityKind,
        name: impl Into<String>,
        taxon_id: TaxonId,
        member_ids: Vec<u64>,
    ) -> Self {
        Self {
            kind,
            id: SetId::Ephemeral,
            member_ids,
            name: name.into(),
            description: String::new(),
            taxon_id,
            modified: false,
        }
    }

    /// Create a selection that already has a backend id.
    #[must_use]
    pub fn durable(
        kind: EntityKind,
        id: i64,
        name: impl Into<String>,
        taxon_id: TaxonId,
        member_ids: Vec<u64>,
    ) -> Self {
        Self {
            id: SetId::Durable(id),
            ..Self::ephemeral(kind, name, taxon_id, member_ids)
        }
    }

    /// Number of members.
    #[must_use]
    pub fn size(&self) -> usize {
        self.member_ids.len()
    }

    /// Check whether the backend already knows this selection.
    #[must_use]
    pub fn is_durable(&self) -> bool {
        self.id.is_durable()
    }
}

/// Sum of member counts across selections.
#[must_use]
pub fn member_count(selections: &[Selection]) -> usize {
    selections.iter().map(Selection::size).sum()
}

/// The raw output of a gene or experiment picker.
///
/// Pickers return either one entity or a set; the distinction is resolved
/// here, once, and everything downstream only sees `Selection`s.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Pick {
    /// A single gene or experiment.
    Single {
        kind: EntityKind,
        id: u64,
        /// Official symbol or short name.
        name: String,
        /// Official name or full title.
        #[serde(default)]
        description: String,
        taxon_id: TaxonId,
    },
    /// An existing or ad-hoc set.
    Set(Selection),
}

impl Pick {
    /// Resolve into a selection. Single picks become one-member ephemeral sets.
    #[must_use]
    pub fn into_selection(self) -> Selection {
        match self {
            Self::Single {
                kind,
                id,
                name,
                description,
                taxon_id,
            } => Selection {
                description,
                ..Selection::ephemeral(kind, name, taxon_id, vec![id])
            },
            Self::Set(selection) => selection,
        }
    }

    /// Which kind of entity was picked.
    #[must_use]
    pub fn kind(&self) -> EntityKind {
        match self {
            Self::Single { kind, .. } => *kind,
            Self::Set(selection) => selection.kind,
        }
    }
}

// =============================================================================
// COEXPRESSION RESULTS
// =============================================================================

/// A gene as reported in coexpression results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneRef {
    pub id: GeneId,
    pub official_symbol: String,
    #[serde(default)]
    pub official_name: String,
    /// Normalized connectivity in `[0, 1]`; higher means more specific.
    #[serde(default)]
    pub node_degree_rank: f64,
}

impl GeneRef {
    /// Create a gene reference with an empty name and zero rank.
    #[must_use]
    pub fn new(id: u64, official_symbol: impl Into<String>) -> Self {
        Self {
            id: GeneId(id),
            official_symbol: official_symbol.into(),
            official_name: String::new(),
            node_degree_rank: 0.0,
        }
    }
}

/// One coexpression relationship reported by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoexpressionEdge {
    pub query_gene: GeneRef,
    pub found_gene: GeneRef,
    /// Number of datasets supporting positive correlation.
    pub positive_support: u32,
    /// Number of datasets supporting negative correlation.
    pub negative_support: u32,
    /// Number of datasets in which the pair was tested.
    #[serde(default)]
    pub num_tested_in: u32,
}

impl CoexpressionEdge {
    /// Support used for stringency comparisons.
    #[must_use]
    pub fn support(&self) -> u32 {
        self.positive_support.max(self.negative_support)
    }

    /// Unordered pair key: the same for `(A, B)` and `(B, A)`.
    #[must_use]
    pub fn pair_key(&self) -> (GeneId, GeneId) {
        let (a, b) = (self.query_gene.id, self.found_gene.id);
        if a <= b { (a, b) } else { (b, a) }
    }

    /// Check whether either endpoint is the given gene.
    #[must_use]
    pub fn touches(&self, gene: GeneId) -> bool {
        self.query_gene.id == gene || self.found_gene.id == gene
    }
}

/// Answer of a coexpression search.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoexpressionResult {
    /// The genes the search was run for.
    #[serde(default)]
    pub query_genes: Vec<GeneRef>,
    /// Edges at or above the requested stringency.
    #[serde(default)]
    pub known_gene_results: Vec<CoexpressionEdge>,
    /// Human-readable summary from the backend.
    #[serde(default)]
    pub display_info: String,
    /// Number of datasets that could be used for the query.
    #[serde(default)]
    pub num_datasets_usable: usize,
    /// Server-side error message; a non-empty value means the search failed.
    #[serde(default)]
    pub error_state: Option<String>,
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors that can occur in the coexnet pipeline.
///
/// - No silent failures
/// - Use `Result<T, CoexnetError>` for fallible operations
/// - The core never panics; every error is recoverable by re-running the search
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoexnetError {
    /// No genes or no experiments were selected.
    #[error("Please select at least one gene and one experiment")]
    EmptySelection,

    /// A selection exceeds the limit for the search mode.
    #[error("Too many {kind}s selected: {count} (maximum {max})")]
    OverLimit {
        kind: EntityKind,
        count: usize,
        max: usize,
    },

    /// The backend did not register the session groups.
    #[error("Registration of session groups failed: {0}")]
    RegistrationFailed(String),

    /// The backend reported an error; the message is passed through verbatim.
    #[error("{0}")]
    SearchFailed(String),

    /// A graph operation was requested without selected nodes.
    #[error("No genes are selected")]
    NoSelectedNodes,

    /// Every selected node is already a query gene.
    #[error("All selected genes are already query genes")]
    NothingToExtend,

    /// A display stringency below the minimum was requested.
    #[error("Stringency {requested} is below the minimum of {min}")]
    InvalidStringency { requested: u32, min: u32 },

    /// The search state machine rejected an event.
    #[error("Invalid transition from {from} on {event}")]
    InvalidTransition { from: String, event: String },

    /// A command was built from a selection the backend does not know yet.
    #[error("Selection '{0}' has not been registered")]
    Unregistered(String),

    /// A bookmarkable link could not be parsed.
    #[error("Invalid link: {0}")]
    InvalidLink(String),

    /// The user cancelled before any network call was issued.
    #[error("Search cancelled")]
    Cancelled,
}

// =============================================================================
// TESTS
// =============================================================================
