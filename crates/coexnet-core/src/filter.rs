//! # Graph Filter Engine
//!
//! Turns the known coexpression edges into renderable nodes and edges at a
//! given stringency.
//!
//! ## Filtering
//!
//! An edge survives when its support clears the stringency. With
//! `restrict_to_query` the graph is grown from the query genes:
//!
//! 1. Pass 1 admits edges with a query gene at either end.
//! 2. Pass 2 re-scans and admits edges between two nodes already in the graph
//!    that pass 1 skipped because neither end is a query gene.
//!
//! Without the restriction every edge that clears the threshold is admitted
//! in pass 1 and pass 2 has nothing left to add.
//!
//! Output follows the order of the known edges. A node is created the first
//! time one of its admitted edges is scanned, and `is_query_node` is read from
//! the current query set on every call. The engine holds no mutable state, so
//! identical inputs always give identical output.

use crate::primitives::{
    LARGE_GRAPH_EDGES, MEDIUM_GRAPH_EDGES, NODE_DEGREE_BIN_THRESHOLDS, SMALL_GRAPH_EDGES,
};
use crate::{CoexpressionEdge, GeneId, GeneRef};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

// =============================================================================
// RENDERABLE GRAPH
// =============================================================================

/// A gene in the rendered graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphNode {
    /// Node label: the gene id as a string.
    pub id: String,
    pub gene_id: GeneId,
    pub official_symbol: String,
    pub official_name: String,
    pub is_query_node: bool,
    /// Specificity decile, 1 to 10.
    pub node_degree_bin: u8,
}

/// A coexpression link in the rendered graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphEdge {
    /// `"{min}-{max}"` of the two gene ids.
    pub id: String,
    pub source: String,
    pub target: String,
    pub positive_support: u32,
    pub negative_support: u32,
    pub support: u32,
    pub num_tested_in: u32,
}

/// Nodes and edges ready to draw.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphData {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

impl GraphData {
    /// Check whether nothing survived filtering.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty() && self.nodes.is_empty()
    }
}

/// Bin a node degree rank into deciles by threshold comparison.
///
/// Ranks below 0.1 (and NaN) fall into bin 1; ranks of 0.9 and above into 10.
#[must_use]
pub fn node_degree_bin(rank: f64) -> u8 {
    let above = NODE_DEGREE_BIN_THRESHOLDS
        .iter()
        .filter(|threshold| rank >= **threshold)
        .count();
    1 + above as u8
}

// =============================================================================
// SIZE PRESETS
// =============================================================================

/// How many edges the rendered graph may hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GraphSize {
    Large,
    Medium,
    Small,
}

impl GraphSize {
    /// Edge budget of this preset.
    #[must_use]
    pub const fn edge_budget(self) -> usize {
        match self {
            Self::Large => LARGE_GRAPH_EDGES,
            Self::Medium => MEDIUM_GRAPH_EDGES,
            Self::Small => SMALL_GRAPH_EDGES,
        }
    }
}

/// Result of reducing a graph to a size preset.
#[derive(Debug, Clone, PartialEq)]
pub struct SizeTrim {
    /// Edges kept, in known-edge order.
    pub edges: Vec<CoexpressionEdge>,
    /// Stringency applied to edges not touching a query gene, or `None` when
    /// everything fit.
    pub trim_stringency: Option<u32>,
}

// =============================================================================
// ENGINE
// =============================================================================

/// Read-only view over known edges and the current query genes.
#[derive(Debug, Clone, Copy)]
pub struct GraphFilterEngine<'a> {
    edges: &'a [CoexpressionEdge],
    query_gene_ids: &'a BTreeSet<GeneId>,
}

impl<'a> GraphFilterEngine<'a> {
    /// Create an engine over deduplicated edges.
    #[must_use]
    pub fn new(edges: &'a [CoexpressionEdge], query_gene_ids: &'a BTreeSet<GeneId>) -> Self {
        Self {
            edges,
            query_gene_ids,
        }
    }

    /// Edges surviving `stringency`, in known-edge order.
    #[must_use]
    pub fn filter_edges(&self, stringency: u32, restrict_to_query: bool) -> Vec<&'a CoexpressionEdge> {
        let passing: Vec<(usize, &CoexpressionEdge)> = self
            .edges
            .iter()
            .enumerate()
            .filter(|(_, edge)| edge.support() >= stringency)
            .collect();

        let mut admitted_nodes = BTreeSet::new();
        let mut admitted = BTreeSet::new();

        // Pass 1
        for (index, edge) in &passing {
            let anchored = !restrict_to_query
                || self.query_gene_ids.contains(&edge.query_gene.id)
                || self.query_gene_ids.contains(&edge.found_gene.id);
            if anchored {
                admitted.insert(*index);
                admitted_nodes.insert(edge.query_gene.id);
                admitted_nodes.insert(edge.found_gene.id);
            }
        }

        // Pass 2
        if restrict_to_query {
            for (index, edge) in &passing {
                if !admitted.contains(index)
                    && admitted_nodes.contains(&edge.query_gene.id)
                    && admitted_nodes.contains(&edge.found_gene.id)
                {
                    admitted.insert(*index);
                }
            }
        }

        passing
            .into_iter()
            .filter(|(index, _)| admitted.contains(index))
            .map(|(_, edge)| edge)
            .collect()
    }

    /// Renderable graph at `stringency`.
    #[must_use]
    pub fn filter(&self, stringency: u32, restrict_to_query: bool) -> GraphData {
        self.render(self.filter_edges(stringency, restrict_to_query))
    }

    /// Like `filter`, keeping only edges where either gene's symbol or name
    /// contains `text`, ignoring case. Blank text filters nothing.
    #[must_use]
    pub fn filter_text(&self, stringency: u32, restrict_to_query: bool, text: &str) -> GraphData {
        let needle = text.trim().to_lowercase();
        let edges = self
            .filter_edges(stringency, restrict_to_query)
            .into_iter()
            .filter(|edge| {
                needle.is_empty()
                    || matches_text(&edge.query_gene, &needle)
                    || matches_text(&edge.found_gene, &needle)
            })
            .collect();
        self.render(edges)
    }

    /// Reduce the edges to a size preset.
    ///
    /// Edges touching a query gene are always kept. Other edges are dropped at
    /// the lowest stringency, starting at `results_stringency`, that brings the
    /// total within budget.
    #[must_use]
    pub fn trim_to_size(&self, results_stringency: u32, size: GraphSize) -> SizeTrim {
        let budget = size.edge_budget();
        let touches_query = |edge: &CoexpressionEdge| {
            self.query_gene_ids.contains(&edge.query_gene.id)
                || self.query_gene_ids.contains(&edge.found_gene.id)
        };

        let anchored = self.edges.iter().filter(|e| touches_query(*e)).count();
        let others: Vec<u32> = self
            .edges
            .iter()
            .filter(|e| !touches_query(*e))
            .map(CoexpressionEdge::support)
            .collect();

        if anchored + others.len() <= budget {
            return SizeTrim {
                edges: self.edges.to_vec(),
                trim_stringency: None,
            };
        }

        let highest = others.iter().copied().max().unwrap_or(results_stringency);
        let mut trim_stringency = results_stringency.saturating_add(1);
        while trim_stringency <= highest {
            let kept = others.iter().filter(|s| **s >= trim_stringency).count();
            if anchored + kept <= budget {
                break;
            }
            trim_stringency += 1;
        }

        SizeTrim {
            edges: self
                .edges
                .iter()
                .filter(|e| touches_query(*e) || e.support() >= trim_stringency)
                .cloned()
                .collect(),
            trim_stringency: Some(trim_stringency),
        }
    }

    fn render(&self, edges: Vec<&CoexpressionEdge>) -> GraphData {
        let mut seen = BTreeSet::new();
        let mut graph = GraphData::default();

        for edge in edges {
            for gene in [&edge.query_gene, &edge.found_gene] {
                if seen.insert(gene.id) {
                    graph.nodes.push(GraphNode {
                        id: gene.id.to_string(),
                        gene_id: gene.id,
                        official_symbol: gene.official_symbol.clone(),
                        official_name: gene.official_name.clone(),
                        is_query_node: self.query_gene_ids.contains(&gene.id),
                        node_degree_bin: node_degree_bin(gene.node_degree_rank),
                    });
                }
            }

            let (low, high) = edge.pair_key();
            graph.edges.push(GraphEdge {
                id: format!("{low}-{high}"),
                source: edge.query_gene.id.to_string(),
                target: edge.found_gene.id.to_string(),
                positive_support: edge.positive_support,
                negative_support: edge.negative_support,
                support: edge.support(),
                num_tested_in: edge.num_tested_in,
            });
        }
        graph
    }
}

fn matches_text(gene: &GeneRef, needle: &str) -> bool {
    gene.official_symbol.to_lowercase().contains(needle)
        || gene.official_name.to_lowercase().contains(needle)
}

// =============================================================================
// TESTS
// =============================================================================
