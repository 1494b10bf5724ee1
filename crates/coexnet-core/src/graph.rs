//! # Coexpression Graph Builder
//!
//! Accumulates coexpression results into a deduplicated edge list and tracks
//! which genes are being queried.
//!
//! ## Fresh Query
//!
//! 1. `begin` with the planned command.
//! 2. `accept_first_pass` with the answer: edges touching a query gene.
//! 3. Unless only query-gene edges were requested, the builder asks for a
//!    complete search over every node, restricted to edges among them.
//! 4. `accept_complete` merges both answers.
//!
//! ## Extending And Re-running
//!
//! `plan_extension` adds selected nodes to the query genes, evicting the
//! oldest query genes when the cap would be exceeded. The extension's first
//! pass reports `NoMoreResults` when it found no new genes.
//!
//! `plan_rerun` replaces the query genes with the selected nodes.
//!
//! ## Dedup
//!
//! An edge between two genes is admitted once, whichever direction it was
//! reported in.

use crate::command::CoexpressionSearchCommand;
use crate::filter::{GraphData, GraphFilterEngine, GraphSize, SizeTrim};
use crate::primitives::MIN_STRINGENCY;
use crate::stringency::StringencyPlan;
use crate::{CoexnetError, CoexpressionEdge, CoexpressionResult, GeneId};
use std::collections::BTreeSet;
use std::fmt;

// =============================================================================
// OUTCOMES
// =============================================================================

/// What merging an answer did to the known edges.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    /// Edges newly admitted.
    pub admitted: usize,
    /// Edges skipped because the pair was already known.
    pub duplicates: usize,
    /// Known edges after the merge.
    pub total_edges: usize,
    /// Node genes after the merge.
    pub total_nodes: usize,
}

/// What to do after a first-pass answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassOutcome {
    /// The graph is ready.
    Merged(MergeStats),
    /// Run a complete search over `gene_ids` and pass it to `accept_complete`.
    NeedsComplete {
        command: CoexpressionSearchCommand,
        gene_ids: Vec<GeneId>,
    },
    /// An extension found no gene that is not already drawn.
    NoMoreResults,
}

/// Query genes to add, and the ones that make room for them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extension {
    pub added: Vec<GeneId>,
    /// Oldest query genes dropped to stay within the cap.
    pub evicted: Vec<GeneId>,
    /// First-pass search over the added genes.
    pub command: CoexpressionSearchCommand,
}

/// Outcome of planning an extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtensionPlan {
    /// Fits under the cap.
    Fits(Extension),
    /// Only fits by evicting query genes. The user must agree first.
    Overflow(Extension),
}

/// A replacement query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RerunPlan {
    pub gene_ids: Vec<GeneId>,
    /// More genes than the cap. Needs confirmation and drops neighbours.
    pub over_cap: bool,
}

/// Outcome of changing the display stringency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StringencyChange {
    /// Re-filtered from known edges.
    Filtered,
    /// Below what the server returned. Needs confirmation and a new search.
    RequiresSearch(CoexpressionSearchCommand),
}

/// Human-readable summary of a coexpression answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResultSummary {
    pub results: usize,
    pub datasets_usable: usize,
    pub query_genes: usize,
    pub stringency: u32,
}

impl ResultSummary {
    /// Summarize an answer for a search at `stringency`.
    #[must_use]
    pub fn of(result: &CoexpressionResult, stringency: u32) -> Self {
        Self {
            results: result.known_gene_results.len(),
            datasets_usable: result.num_datasets_usable,
            query_genes: result.query_genes.len(),
            stringency,
        }
    }
}

impl fmt::Display for ResultSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.results == 0 {
            return write!(f, "No results to display");
        }
        write!(
            f,
            "{} results from {} datasets usable in query for {} genes at stringency {}",
            self.results, self.datasets_usable, self.query_genes, self.stringency
        )
    }
}

// =============================================================================
// BUILDER
// =============================================================================

/// Graph state across searches.
#[derive(Debug, Clone)]
pub struct CoexGraphBuilder {
    command: Option<CoexpressionSearchCommand>,
    query_gene_ids: Vec<GeneId>,
    node_gene_ids: BTreeSet<GeneId>,
    known_edges: Vec<CoexpressionEdge>,
    seen_pairs: BTreeSet<(GeneId, GeneId)>,
    pending: Vec<CoexpressionEdge>,
    display_stringency: u32,
    restrict_to_query: bool,
}

impl Default for CoexGraphBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CoexGraphBuilder {
    /// Create an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self {
            command: None,
            query_gene_ids: Vec::new(),
            node_gene_ids: BTreeSet::new(),
            known_edges: Vec::new(),
            seen_pairs: BTreeSet::new(),
            pending: Vec::new(),
            display_stringency: MIN_STRINGENCY,
            restrict_to_query: true,
        }
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    /// The command of the current query, if any.
    #[must_use]
    pub fn command(&self) -> Option<&CoexpressionSearchCommand> {
        self.command.as_ref()
    }

    /// Query genes, oldest first.
    #[must_use]
    pub fn query_gene_ids(&self) -> &[GeneId] {
        &self.query_gene_ids
    }

    /// Every gene in the graph.
    #[must_use]
    pub fn node_gene_ids(&self) -> &BTreeSet<GeneId> {
        &self.node_gene_ids
    }

    /// Deduplicated edges, in arrival order.
    #[must_use]
    pub fn known_edges(&self) -> &[CoexpressionEdge] {
        &self.known_edges
    }

    /// Stringency the server used.
    #[must_use]
    pub fn results_stringency(&self) -> u32 {
        self.command
            .as_ref()
            .map(|c| c.stringency)
            .unwrap_or(MIN_STRINGENCY)
    }

    /// Stringency the graph is filtered at.
    #[must_use]
    pub fn display_stringency(&self) -> u32 {
        self.display_stringency
    }

    /// Check whether only edges among query genes are fetched.
    #[must_use]
    pub fn query_genes_only(&self) -> bool {
        self.command.as_ref().is_some_and(|c| c.query_genes_only)
    }

    /// Grow the graph from the query genes (the default) or show every edge.
    pub fn set_restrict_to_query(&mut self, restrict: bool) {
        self.restrict_to_query = restrict;
    }

    // -------------------------------------------------------------------------
    // Fresh query
    // -------------------------------------------------------------------------

    /// Start over with a new query.
    pub fn begin(&mut self, command: CoexpressionSearchCommand) {
        self.query_gene_ids = command.scope.gene_ids.iter().copied().collect();
        self.display_stringency = command.display_stringency;
        self.node_gene_ids.clear();
        self.known_edges.clear();
        self.seen_pairs.clear();
        self.pending.clear();
        self.command = Some(command);
    }

    /// Take the answer of the first search of a fresh query.
    pub fn accept_first_pass(
        &mut self,
        result: CoexpressionResult,
    ) -> Result<PassOutcome, CoexnetError> {
        let command = self.require_command("accept_first_pass")?;
        self.node_gene_ids.extend(result_gene_ids(&result));

        if command.query_genes_only || result.known_gene_results.is_empty() {
            return Ok(PassOutcome::Merged(self.merge(result.known_gene_results)));
        }

        self.pending = result.known_gene_results;
        Ok(self.needs_complete(&command))
    }

    /// Take the answer of a complete search.
    pub fn accept_complete(
        &mut self,
        result: CoexpressionResult,
    ) -> Result<MergeStats, CoexnetError> {
        self.require_command("accept_complete")?;
        let mut edges = std::mem::take(&mut self.pending);
        edges.extend(result.known_gene_results);
        Ok(self.merge(edges))
    }

    // -------------------------------------------------------------------------
    // Extend
    // -------------------------------------------------------------------------

    /// Plan adding selected nodes to the query genes.
    ///
    /// Fails with `NoSelectedNodes` when nothing is selected and with
    /// `NothingToExtend` when every selected gene is already queried.
    pub fn plan_extension(
        &self,
        selected: &[GeneId],
        max_query_genes: usize,
    ) -> Result<ExtensionPlan, CoexnetError> {
        if selected.is_empty() {
            return Err(CoexnetError::NoSelectedNodes);
        }
        let command = self.require_command("plan_extension")?;

        let mut added: Vec<GeneId> = Vec::new();
        for gene in selected {
            if !self.query_gene_ids.contains(gene) && !added.contains(gene) {
                added.push(*gene);
            }
        }
        added.truncate(max_query_genes);
        if added.is_empty() {
            return Err(CoexnetError::NothingToExtend);
        }

        let excess = (self.query_gene_ids.len() + added.len()).saturating_sub(max_query_genes);
        let evicted = self.query_gene_ids[..excess.min(self.query_gene_ids.len())].to_vec();

        let mut first_pass = command.for_genes(added.iter().copied());
        first_pass.query_genes_only = false;

        let extension = Extension {
            added,
            evicted,
            command: first_pass,
        };
        Ok(if extension.evicted.is_empty() {
            ExtensionPlan::Fits(extension)
        } else {
            ExtensionPlan::Overflow(extension)
        })
    }

    /// Commit an extension's changes to the query genes.
    pub fn apply_extension(&mut self, extension: &Extension) -> Result<(), CoexnetError> {
        let command = self.require_command("apply_extension")?;
        self.query_gene_ids.retain(|g| !extension.evicted.contains(g));
        self.query_gene_ids.extend(extension.added.iter().copied());
        self.command = Some(command.for_genes(self.query_gene_ids.iter().copied()));
        Ok(())
    }

    /// Take the answer of an extension's first search.
    pub fn accept_extension(
        &mut self,
        result: CoexpressionResult,
    ) -> Result<PassOutcome, CoexnetError> {
        let command = self.require_command("accept_extension")?;
        let new_nodes: Vec<GeneId> = result_gene_ids(&result)
            .filter(|g| !self.node_gene_ids.contains(g))
            .collect();
        if new_nodes.is_empty() {
            return Ok(PassOutcome::NoMoreResults);
        }
        self.node_gene_ids.extend(new_nodes);

        if command.query_genes_only {
            return Ok(PassOutcome::Merged(self.merge(result.known_gene_results)));
        }
        self.pending = result.known_gene_results;
        Ok(self.needs_complete(&command))
    }

    // -------------------------------------------------------------------------
    // Re-run
    // -------------------------------------------------------------------------

    /// Plan replacing the query genes with the selected nodes.
    pub fn plan_rerun(
        &self,
        selected: &[GeneId],
        max_query_genes: usize,
    ) -> Result<RerunPlan, CoexnetError> {
        if selected.is_empty() {
            return Err(CoexnetError::NoSelectedNodes);
        }
        let mut gene_ids: Vec<GeneId> = Vec::with_capacity(selected.len());
        for gene in selected {
            if !gene_ids.contains(gene) {
                gene_ids.push(*gene);
            }
        }
        Ok(RerunPlan {
            over_cap: gene_ids.len() > max_query_genes,
            gene_ids,
        })
    }

    /// Command for a re-run. Over-cap re-runs must be `confirmed`.
    pub fn rerun_command(
        &self,
        plan: &RerunPlan,
        confirmed: bool,
    ) -> Result<CoexpressionSearchCommand, CoexnetError> {
        if plan.over_cap && !confirmed {
            return Err(CoexnetError::Cancelled);
        }
        let base = self.require_command("rerun_command")?;
        let scope = base.for_genes(plan.gene_ids.iter().copied()).scope;
        Ok(CoexpressionSearchCommand::planned(
            scope,
            plan.over_cap || base.query_genes_only,
        ))
    }

    // -------------------------------------------------------------------------
    // Display
    // -------------------------------------------------------------------------

    /// Change the display stringency.
    ///
    /// Raising it, or lowering it no further than the server stringency,
    /// re-filters locally. Anything lower needs a new search.
    pub fn set_display_stringency(
        &mut self,
        display_stringency: u32,
    ) -> Result<StringencyChange, CoexnetError> {
        let plan = StringencyPlan::for_display(display_stringency)?;
        if display_stringency >= self.results_stringency() {
            self.display_stringency = display_stringency;
            return Ok(StringencyChange::Filtered);
        }
        let base = self.require_command("set_display_stringency")?;
        Ok(StringencyChange::RequiresSearch(CoexpressionSearchCommand::with_plan(
            base.scope.clone(),
            plan,
            base.query_genes_only,
        )))
    }

    /// Renderable graph at the display stringency.
    #[must_use]
    pub fn graph(&self) -> GraphData {
        let query = self.query_set();
        GraphFilterEngine::new(&self.known_edges, &query)
            .filter(self.display_stringency, self.restrict_to_query)
    }

    /// Renderable graph at the display stringency, narrowed by gene text.
    #[must_use]
    pub fn graph_matching(&self, text: &str) -> GraphData {
        let query = self.query_set();
        GraphFilterEngine::new(&self.known_edges, &query).filter_text(
            self.display_stringency,
            self.restrict_to_query,
            text,
        )
    }

    /// Known edges reduced to a size preset.
    #[must_use]
    pub fn trimmed(&self, size: GraphSize) -> SizeTrim {
        let query = self.query_set();
        GraphFilterEngine::new(&self.known_edges, &query)
            .trim_to_size(self.results_stringency(), size)
    }

    // -------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------

    fn require_command(&self, operation: &str) -> Result<CoexpressionSearchCommand, CoexnetError> {
        self.command
            .clone()
            .ok_or_else(|| CoexnetError::InvalidTransition {
                from: "no query".into(),
                event: operation.into(),
            })
    }

    fn needs_complete(&self, command: &CoexpressionSearchCommand) -> PassOutcome {
        let gene_ids: Vec<GeneId> = self.node_gene_ids.iter().copied().collect();
        PassOutcome::NeedsComplete {
            command: command.for_genes(gene_ids.iter().copied()).query_genes_only(),
            gene_ids,
        }
    }

    fn query_set(&self) -> BTreeSet<GeneId> {
        self.query_gene_ids.iter().copied().collect()
    }

    fn merge(&mut self, edges: Vec<CoexpressionEdge>) -> MergeStats {
        let mut stats = MergeStats::default();
        for edge in edges {
            if self.seen_pairs.insert(edge.pair_key()) {
                self.node_gene_ids.insert(edge.query_gene.id);
                self.node_gene_ids.insert(edge.found_gene.id);
                self.known_edges.push(edge);
                stats.admitted += 1;
            } else {
                stats.duplicates += 1;
            }
        }
        stats.total_edges = self.known_edges.len();
        stats.total_nodes = self.node_gene_ids.len();
        stats
    }
}

fn result_gene_ids(result: &CoexpressionResult) -> impl Iterator<Item = GeneId> + '_ {
    result.query_genes.iter().map(|g| g.id).chain(
        result
            .known_gene_results
            .iter()
            .flat_map(|e| [e.query_gene.id, e.found_gene.id]),
    )
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::command::SearchScope;
    use crate::{ExperimentId, GeneRef, TaxonId};

    fn edge(a: u64, b: u64, support: u32) -> CoexpressionEdge {
        CoexpressionEdge {
            query_gene: GeneRef::new(a, format!("G{a}")),
            found_gene: GeneRef::new(b, format!("G{b}")),
            positive_support: support,
            negative_support: 0,
            num_tested_in: support,
        }
    }

    fn result(query: &[u64], edges: Vec<CoexpressionEdge>) -> CoexpressionResult {
        CoexpressionResult {
            query_genes: query.iter().map(|g| GeneRef::new(*g, format!("G{g}"))).collect(),
            known_gene_results: edges,
            num_datasets_usable: 3,
            ..CoexpressionResult::default()
        }
    }

    fn command(genes: &[u64], query_genes_only: bool) -> CoexpressionSearchCommand {
        let scope = SearchScope {
            gene_ids: genes.iter().copied().map(GeneId).collect(),
            experiment_ids: (1..=3).map(ExperimentId).collect(),
            gene_set_ids: vec![1],
            experiment_set_ids: vec![2],
            taxon_id: TaxonId(1),
        };
        CoexpressionSearchCommand::planned(scope, query_genes_only)
    }

    fn fresh(genes: &[u64], first: CoexpressionResult) -> (CoexGraphBuilder, PassOutcome) {
        let mut builder = CoexGraphBuilder::new();
        builder.begin(command(genes, false));
        let outcome = builder.accept_first_pass(first).expect("first pass");
        (builder, outcome)
    }

    #[test]
    fn first_pass_requests_complete_search_over_nodes() {
        let (_, outcome) = fresh(&[1, 2], result(&[1, 2], vec![edge(1, 3, 4), edge(2, 4, 4)]));
        let PassOutcome::NeedsComplete { command, gene_ids } = outcome else {
            panic!("expected complete search");
        };
        assert_eq!(gene_ids, vec![GeneId(1), GeneId(2), GeneId(3), GeneId(4)]);
        assert!(command.query_genes_only);
        assert!(command.scope.gene_set_ids.is_empty());
    }

    #[test]
    fn query_genes_only_skips_complete_search() {
        let mut builder = CoexGraphBuilder::new();
        builder.begin(command(&[1, 2], true));
        let outcome = builder
            .accept_first_pass(result(&[1, 2], vec![edge(1, 2, 4)]))
            .expect("first pass");
        assert!(matches!(outcome, PassOutcome::Merged(stats) if stats.admitted == 1));
    }

    #[test]
    fn empty_first_pass_is_final() {
        let (builder, outcome) = fresh(&[1, 2], result(&[1, 2], vec![]));
        assert_eq!(
            outcome,
            PassOutcome::Merged(MergeStats {
                admitted: 0,
                duplicates: 0,
                total_edges: 0,
                total_nodes: 2,
            })
        );
        assert!(builder.graph().is_empty());
    }

    #[test]
    fn reversed_duplicate_is_merged_once() {
        let (mut builder, _) = fresh(&[1, 2], result(&[1, 2], vec![edge(1, 3, 5)]));
        let stats = builder
            .accept_complete(result(&[1, 3], vec![edge(3, 1, 5), edge(2, 3, 5)]))
            .expect("complete");
        assert_eq!(stats.admitted, 2);
        assert_eq!(stats.duplicates, 1);
        assert_eq!(builder.known_edges().len(), 2);
    }

    #[test]
    fn extension_without_new_genes_is_no_more_results() {
        let (mut builder, _) = fresh(&[1, 2], result(&[1, 2], vec![edge(1, 3, 5)]));
        builder
            .accept_complete(result(&[], vec![edge(2, 3, 5)]))
            .expect("complete");

        let ExtensionPlan::Fits(extension) =
            builder.plan_extension(&[GeneId(3)], 20).expect("plan")
        else {
            panic!("expected extension to fit");
        };
        assert_eq!(extension.added, vec![GeneId(3)]);
        assert!(!extension.command.query_genes_only);
        builder.apply_extension(&extension).expect("apply");

        let outcome = builder
            .accept_extension(result(&[3], vec![edge(3, 1, 5), edge(3, 2, 5)]))
            .expect("extension");
        assert_eq!(outcome, PassOutcome::NoMoreResults);
        assert_eq!(builder.query_gene_ids(), &[GeneId(1), GeneId(2), GeneId(3)]);
    }

    #[test]
    fn extension_with_new_genes_runs_complete_search() {
        let (mut builder, _) = fresh(&[1, 2], result(&[1, 2], vec![edge(1, 3, 5)]));
        builder.accept_complete(result(&[], vec![])).expect("complete");

        let ExtensionPlan::Fits(extension) =
            builder.plan_extension(&[GeneId(3)], 20).expect("plan")
        else {
            panic!("expected extension to fit");
        };
        builder.apply_extension(&extension).expect("apply");
        let outcome = builder
            .accept_extension(result(&[3], vec![edge(3, 9, 5)]))
            .expect("extension");
        let PassOutcome::NeedsComplete { gene_ids, .. } = outcome else {
            panic!("expected complete search");
        };
        assert!(gene_ids.contains(&GeneId(9)));

        builder.accept_complete(result(&[], vec![])).expect("complete");
        assert_eq!(builder.known_edges().len(), 2);
    }

    #[test]
    fn extension_over_cap_evicts_oldest() {
        let (builder, _) = fresh(&[1, 2, 3], result(&[1, 2, 3], vec![]));
        let plan = builder
            .plan_extension(&[GeneId(7), GeneId(8)], 4)
            .expect("plan");
        let ExtensionPlan::Overflow(extension) = plan else {
            panic!("expected overflow");
        };
        assert_eq!(extension.evicted, vec![GeneId(1)]);
    }

    #[test]
    fn extension_requires_new_query_genes() {
        let (builder, _) = fresh(&[1, 2], result(&[1, 2], vec![]));
        assert_eq!(
            builder.plan_extension(&[], 20),
            Err(CoexnetError::NoSelectedNodes)
        );
        assert_eq!(
            builder.plan_extension(&[GeneId(1)], 20),
            Err(CoexnetError::NothingToExtend)
        );
    }

    #[test]
    fn query_flag_is_not_sticky() {
        let (mut builder, _) = fresh(&[1, 2], result(&[1, 2], vec![edge(1, 3, 5)]));
        builder.accept_complete(result(&[], vec![])).expect("complete");
        let extension = Extension {
            added: vec![GeneId(3)],
            evicted: vec![GeneId(1)],
            command: command(&[3], false),
        };
        builder.apply_extension(&extension).expect("apply");

        let graph = builder.graph();
        let node = |id: u64| graph.nodes.iter().find(|n| n.gene_id == GeneId(id));
        assert!(!node(1).expect("node 1").is_query_node);
        assert!(node(3).expect("node 3").is_query_node);
    }

    #[test]
    fn rerun_over_cap_needs_confirmation() {
        let (builder, _) = fresh(&[1, 2], result(&[1, 2], vec![]));
        let selected: Vec<GeneId> = (1..=25).map(GeneId).collect();
        let plan = builder.plan_rerun(&selected, 20).expect("plan");
        assert!(plan.over_cap);
        assert_eq!(builder.rerun_command(&plan, false), Err(CoexnetError::Cancelled));

        let command = builder.rerun_command(&plan, true).expect("command");
        assert!(command.query_genes_only);
        assert_eq!(command.scope.gene_ids.len(), 25);
        assert_eq!(builder.plan_rerun(&[], 20), Err(CoexnetError::NoSelectedNodes));
    }

    #[test]
    fn lowering_below_server_stringency_needs_search() {
        let mut builder = CoexGraphBuilder::new();
        let scope = command(&[1, 2], false).scope;
        builder.begin(CoexpressionSearchCommand::with_plan(
            scope,
            StringencyPlan::for_display(10).expect("plan"),
            false,
        ));
        assert_eq!(builder.results_stringency(), 7);

        assert_eq!(
            builder.set_display_stringency(12).expect("raise"),
            StringencyChange::Filtered
        );
        assert_eq!(builder.display_stringency(), 12);
        assert_eq!(
            builder.set_display_stringency(7).expect("lower"),
            StringencyChange::Filtered
        );

        let StringencyChange::RequiresSearch(command) =
            builder.set_display_stringency(6).expect("lower further")
        else {
            panic!("expected new search");
        };
        assert_eq!(command.stringency, 4);
        assert_eq!(command.display_stringency, 6);
        assert_eq!(builder.display_stringency(), 7);

        assert!(matches!(
            builder.set_display_stringency(1),
            Err(CoexnetError::InvalidStringency { .. })
        ));
    }

    #[test]
    fn summary_message() {
        let answer = result(&[1, 2], vec![edge(1, 3, 5)]);
        assert_eq!(
            ResultSummary::of(&answer, 3).to_string(),
            "1 results from 3 datasets usable in query for 2 genes at stringency 3"
        );
        assert_eq!(
            ResultSummary::of(&CoexpressionResult::default(), 3).to_string(),
            "No results to display"
        );
    }
}
