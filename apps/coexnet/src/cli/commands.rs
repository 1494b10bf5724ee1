//! # CLI Command Implementations
//!
//! This module contains the actual implementations of CLI commands.

use super::{CliError, ModeArg};
use crate::backend::{HttpBackend, StaticFactors};
use crate::config::Config;
use crate::orchestrator::{RequestKind, SearchOrchestrator, SearchReport, SearchRequest};
use crate::prompt::FixedAnswers;
use coexnet_core::primitives::MIN_STRINGENCY;
use coexnet_core::{
    CoexGraphBuilder, CoexnetError, CoexpressionLink, CoexpressionResult,
    CoexpressionSearchCommand, EntityKind, ExperimentId, FactorMap, GeneId, GraphData,
    GraphSize, PassOutcome, Pick, ResultSummary, SearchScope, SizeTrim, StringencyPlan,
    TaxonId, TrimAnswer,
};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

// =============================================================================
// INPUT FILES
// =============================================================================

/// Maximum size of a picks or result file (50 MB).
const MAX_INPUT_FILE_SIZE: u64 = 50 * 1024 * 1024;

/// Read a regular file of bounded size.
fn read_input(path: &Path) -> Result<String, CliError> {
    let io_error = |message: String| CliError::Io {
        path: path.display().to_string(),
        message,
    };

    let metadata = std::fs::metadata(path).map_err(|e| io_error(e.to_string()))?;
    if !metadata.is_file() {
        return Err(io_error("not a regular file".into()));
    }
    if metadata.len() > MAX_INPUT_FILE_SIZE {
        return Err(io_error(format!(
            "file size {} bytes exceeds maximum allowed {} bytes",
            metadata.len(),
            MAX_INPUT_FILE_SIZE
        )));
    }
    std::fs::read_to_string(path).map_err(|e| io_error(e.to_string()))
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, CliError> {
    let content = read_input(path)?;
    serde_json::from_str(&content).map_err(|e| CliError::Json {
        path: path.display().to_string(),
        message: e.to_string(),
    })
}

/// Picker output saved as JSON.
#[derive(Debug, Default, Deserialize)]
struct PicksFile {
    #[serde(default)]
    genes: Vec<Pick>,
    #[serde(default)]
    experiments: Vec<Pick>,
}

fn single(kind: EntityKind, id: u64, taxon_id: TaxonId) -> Pick {
    Pick::Single {
        kind,
        id,
        name: id.to_string(),
        description: String::new(),
        taxon_id,
    }
}

fn print_json(value: &serde_json::Value) {
    println!(
        "{}",
        serde_json::to_string_pretty(value).unwrap_or_default()
    );
}

// =============================================================================
// SEARCH COMMAND
// =============================================================================

/// Options of the `search` command.
#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub input: Option<PathBuf>,
    pub genes: Vec<u64>,
    pub experiments: Vec<u64>,
    pub taxon: u64,
    pub mode: ModeArg,
    pub query_genes_only: bool,
    pub trim_answer: TrimAnswer,
    pub confirm: bool,
    pub factors: FactorMap,
    pub all_edges: bool,
    pub size: Option<GraphSize>,
    pub text: Option<String>,
}

impl From<ModeArg> for RequestKind {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Coex => Self::Coexpression,
            ModeArg::DiffEx => Self::DifferentialExpression,
            ModeArg::DiffExViz => Self::DifferentialExpressionVisualization,
            ModeArg::Both => Self::Both,
        }
    }
}

/// Run a search against the configured backend.
pub async fn cmd_search(
    config_path: &Path,
    json_mode: bool,
    verbose: bool,
    options: SearchOptions,
) -> Result<(), CliError> {
    let config = Config::load(config_path)?;

    let picks = match &options.input {
        Some(path) => read_json::<PicksFile>(path)?,
        None => PicksFile::default(),
    };
    let taxon_id = TaxonId(options.taxon);
    let mut genes = picks.genes;
    genes.extend(
        options
            .genes
            .iter()
            .map(|&id| single(EntityKind::Gene, id, taxon_id)),
    );
    let mut experiments = picks.experiments;
    experiments.extend(
        options
            .experiments
            .iter()
            .map(|&id| single(EntityKind::Experiment, id, taxon_id)),
    );

    tracing::info!(
        "Searching {} gene picks and {} experiment picks at {}",
        genes.len(),
        experiments.len(),
        config.backend.url
    );

    let backend = Arc::new(HttpBackend::new(
        config.backend.url.clone(),
        config.backend.api_key.clone(),
    ));
    let factors = Arc::new(StaticFactors::new(options.factors.clone()));
    let prompt = Arc::new(FixedAnswers {
        trim: options.trim_answer,
        confirm: options.confirm,
    });
    let mut orchestrator =
        SearchOrchestrator::new(backend, factors, prompt).with_limits(&config.limits);
    orchestrator.set_restrict_to_query(!options.all_edges);

    let report = orchestrator
        .go(SearchRequest {
            genes,
            experiments,
            kind: options.mode.into(),
            query_genes_only: options.query_genes_only,
        })
        .await?;

    let graph = match (&report.graph, &options.text) {
        (Some(_), Some(text)) => Some(orchestrator.graph().graph_matching(text)),
        (graph, _) => graph.clone(),
    };
    let size_trim = options
        .size
        .filter(|_| report.graph.is_some())
        .map(|size| orchestrator.graph().trimmed(size));

    if json_mode {
        print_json(&search_json(&report, graph.as_ref(), size_trim.as_ref()));
        return Ok(());
    }

    println!("State: {}", report.state);
    for trim in &report.trims {
        println!(
            "Trimmed {} selection: {} -> {} (maximum {})",
            trim.kind, trim.before, trim.after, trim.max
        );
    }
    if let Some(summary) = &report.summary {
        println!("{}", summary);
    }
    if let Some(graph) = &graph {
        print_graph(graph, verbose);
    }
    if let Some(trim) = &size_trim {
        print_size_trim(trim);
    }
    if let Some(diff_ex) = &report.diff_ex {
        println!("Differential expression:");
        println!(
            "{}",
            serde_json::to_string_pretty(&diff_ex.result).unwrap_or_default()
        );
        if diff_ex.visualization.is_some() {
            println!("Visualization payload received");
        }
    }
    if let Some(link) = &report.link {
        println!("Link: {}", link);
    }
    Ok(())
}

fn search_json(
    report: &SearchReport,
    graph: Option<&GraphData>,
    size_trim: Option<&SizeTrim>,
) -> serde_json::Value {
    serde_json::json!({
        "state": report.state.to_string(),
        "trims": report.trims,
        "summary": report.summary.map(|s| s.to_string()),
        "graph": graph,
        "size_trim": size_trim.map(size_trim_json),
        "differential_expression": report.diff_ex,
        "link": report.link.as_ref().map(|l| l.to_string()),
    })
}

fn size_trim_json(trim: &SizeTrim) -> serde_json::Value {
    serde_json::json!({
        "edges": trim.edges.len(),
        "trim_stringency": trim.trim_stringency,
    })
}

fn print_graph(graph: &GraphData, list_edges: bool) {
    let query_nodes = graph.nodes.iter().filter(|n| n.is_query_node).count();
    println!(
        "Graph: {} nodes ({} query), {} edges",
        graph.nodes.len(),
        query_nodes,
        graph.edges.len()
    );
    if !list_edges {
        return;
    }

    let symbols: BTreeMap<&str, &str> = graph
        .nodes
        .iter()
        .map(|n| (n.id.as_str(), n.official_symbol.as_str()))
        .collect();
    let symbol = |id: &str| symbols.get(id).copied().unwrap_or("?").to_string();
    for edge in &graph.edges {
        println!(
            "  {} - {}  support {} (+{}/-{}, tested in {})",
            symbol(&edge.source),
            symbol(&edge.target),
            edge.support,
            edge.positive_support,
            edge.negative_support,
            edge.num_tested_in
        );
    }
}

fn print_size_trim(trim: &SizeTrim) {
    match trim.trim_stringency {
        Some(stringency) => println!(
            "Edges not involving query genes have been trimmed at stringency {} ({} edges kept)",
            stringency,
            trim.edges.len()
        ),
        None => println!("Graph fits the size preset ({} edges)", trim.edges.len()),
    }
}

// =============================================================================
// STRINGENCY COMMAND
// =============================================================================

/// Show the stringency plan for a dataset count or a display stringency.
pub fn cmd_stringency(
    json_mode: bool,
    datasets: Option<usize>,
    display: Option<u32>,
) -> Result<(), CliError> {
    let plan = match (datasets, display) {
        (Some(datasets), _) => StringencyPlan::for_datasets(datasets),
        (None, Some(display)) => StringencyPlan::for_display(display)?,
        (None, None) => {
            return Err(CliError::InvalidArguments(
                "either --datasets or --display is required".into(),
            ));
        }
    };

    if json_mode {
        print_json(&serde_json::json!({
            "display_stringency": plan.display_stringency,
            "stringency": plan.stringency,
        }));
        return Ok(());
    }

    println!("Display stringency: {}", plan.display_stringency);
    println!("Server stringency:  {}", plan.stringency);
    Ok(())
}

// =============================================================================
// LINK COMMANDS
// =============================================================================

/// Print the bookmarkable link of a search.
pub fn cmd_link(
    json_mode: bool,
    genes: Vec<u64>,
    experiments: Vec<u64>,
    stringency: u32,
    taxon: u64,
    query_genes_only: bool,
) -> Result<(), CliError> {
    if genes.is_empty() {
        return Err(CliError::InvalidArguments(
            "at least one gene id is required".into(),
        ));
    }
    let link = CoexpressionLink {
        query_genes_only: query_genes_only && genes.len() >= 2,
        gene_ids: genes.into_iter().map(GeneId).collect(),
        stringency,
        taxon_id: TaxonId(taxon),
        experiment_ids: experiments.into_iter().map(ExperimentId).collect(),
    };

    if json_mode {
        print_json(&serde_json::json!({ "link": link.to_string() }));
    } else {
        println!("{}", link);
    }
    Ok(())
}

/// Parse a bookmarkable link and show what it searches.
pub fn cmd_link_parse(json_mode: bool, query: &str) -> Result<(), CliError> {
    let link = CoexpressionLink::parse(query)?;

    if json_mode {
        print_json(&serde_json::json!({
            "gene_ids": link.gene_ids,
            "stringency": link.stringency,
            "taxon_id": link.taxon_id,
            "experiment_ids": link.experiment_ids,
            "query_genes_only": link.query_genes_only,
        }));
        return Ok(());
    }

    println!("Genes:            {:?}", link.gene_ids.iter().map(|g| g.0).collect::<Vec<_>>());
    println!(
        "Experiments:      {:?}",
        link.experiment_ids.iter().map(|e| e.0).collect::<Vec<_>>()
    );
    println!("Stringency:       {}", link.stringency);
    println!("Taxon:            {}", link.taxon_id.0);
    println!("Query genes only: {}", link.query_genes_only);
    Ok(())
}

// =============================================================================
// FILTER COMMAND
// =============================================================================

/// Build the graph of a saved coexpression result and filter it.
pub fn cmd_filter(
    json_mode: bool,
    input: &Path,
    stringency: u32,
    results_stringency: u32,
    all_edges: bool,
    text: Option<&str>,
    size: Option<GraphSize>,
) -> Result<(), CliError> {
    let result: CoexpressionResult = read_json(input)?;
    let summary = ResultSummary::of(&result, results_stringency);
    let builder = offline_graph(result, stringency, results_stringency, all_edges)?;

    let graph = match text {
        Some(text) => builder.graph_matching(text),
        None => builder.graph(),
    };
    let size_trim = size.map(|size| builder.trimmed(size));

    if json_mode {
        print_json(&serde_json::json!({
            "summary": summary.to_string(),
            "graph": graph,
            "size_trim": size_trim.as_ref().map(size_trim_json),
        }));
        return Ok(());
    }

    println!("{}", summary);
    print_graph(&graph, true);
    if let Some(trim) = &size_trim {
        print_size_trim(trim);
    }
    Ok(())
}

/// Graph of a saved result, as if it had just been fetched.
fn offline_graph(
    result: CoexpressionResult,
    stringency: u32,
    results_stringency: u32,
    all_edges: bool,
) -> Result<CoexGraphBuilder, CliError> {
    for requested in [stringency, results_stringency] {
        if requested < MIN_STRINGENCY {
            return Err(CoexnetError::InvalidStringency {
                requested,
                min: MIN_STRINGENCY,
            }
            .into());
        }
    }

    // Only the query genes matter offline; the scope is never sent anywhere.
    let scope = SearchScope {
        gene_ids: result.query_genes.iter().map(|g| g.id).collect(),
        experiment_ids: BTreeSet::new(),
        gene_set_ids: Vec::new(),
        experiment_set_ids: Vec::new(),
        taxon_id: TaxonId(0),
    };
    let plan = StringencyPlan {
        stringency: results_stringency,
        display_stringency: stringency,
    };

    let mut builder = CoexGraphBuilder::new();
    builder.set_restrict_to_query(!all_edges);
    builder.begin(CoexpressionSearchCommand::with_plan(scope, plan, true));
    if let PassOutcome::NeedsComplete { .. } = builder.accept_first_pass(result)? {
        // A single query gene: the saved file holds every edge there is.
        builder.accept_complete(CoexpressionResult::default())?;
    }
    Ok(builder)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use coexnet_core::{CoexpressionEdge, GeneRef};
    use std::io::Write;

    fn edge(a: u64, b: u64, support: u32) -> CoexpressionEdge {
        CoexpressionEdge {
            query_gene: GeneRef::new(a, format!("G{a}")),
            found_gene: GeneRef::new(b, format!("G{b}")),
            positive_support: support,
            negative_support: 0,
            num_tested_in: 10,
        }
    }

    fn saved_result() -> CoexpressionResult {
        CoexpressionResult {
            query_genes: vec![GeneRef::new(1, "G1"), GeneRef::new(2, "G2")],
            known_gene_results: vec![edge(1, 3, 5), edge(3, 1, 5), edge(2, 4, 5), edge(3, 4, 6)],
            num_datasets_usable: 12,
            ..CoexpressionResult::default()
        }
    }

    fn write_json(value: &impl serde::Serialize) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(serde_json::to_string(value).expect("json").as_bytes())
            .expect("write");
        file
    }

    #[test]
    fn offline_graph_filters_at_display_stringency() {
        let builder = offline_graph(saved_result(), 5, 2, false).expect("graph");
        let graph = builder.graph();
        // Reversed 1-3 is merged; 3-4 joins two admitted neighbours.
        assert_eq!(graph.edges.len(), 3);
        assert!(graph.nodes.iter().any(|n| n.id == "1" && n.is_query_node));

        // Only 3-4 clears 6, and it touches no query gene.
        let strict = offline_graph(saved_result(), 6, 2, false).expect("graph");
        assert!(strict.graph().is_empty());
    }

    #[test]
    fn offline_graph_rejects_stringency_below_minimum() {
        assert!(matches!(
            offline_graph(saved_result(), 1, 2, false),
            Err(CliError::Pipeline(CoexnetError::InvalidStringency { .. }))
        ));
    }

    #[test]
    fn offline_graph_handles_single_query_gene() {
        let result = CoexpressionResult {
            query_genes: vec![GeneRef::new(1, "G1")],
            known_gene_results: vec![edge(1, 3, 4)],
            ..CoexpressionResult::default()
        };
        let builder = offline_graph(result, 2, 2, false).expect("graph");
        assert_eq!(builder.graph().edges.len(), 1);
    }

    #[test]
    fn filter_reads_saved_result() {
        let file = write_json(&saved_result());
        assert!(cmd_filter(true, file.path(), 2, 2, false, Some("g3"), Some(GraphSize::Small)).is_ok());
    }

    #[test]
    fn malformed_input_is_a_json_error() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(b"{ not json").expect("write");
        assert!(matches!(
            read_json::<CoexpressionResult>(file.path()),
            Err(CliError::Json { .. })
        ));
    }

    #[test]
    fn directory_is_not_an_input() {
        let dir = tempfile::tempdir().expect("temp dir");
        assert!(matches!(
            read_input(dir.path()),
            Err(CliError::Io { .. })
        ));
    }

    #[test]
    fn picks_file_accepts_singles_and_sets() {
        let file = write_json(&serde_json::json!({
            "genes": [
                { "type": "single", "kind": "gene", "id": 7, "name": "ACTB", "taxonId": 1 }
            ],
        }));
        let picks: PicksFile = read_json(file.path()).expect("picks");
        assert_eq!(picks.genes.len(), 1);
        assert!(picks.experiments.is_empty());
    }

    #[test]
    fn link_needs_genes() {
        assert!(matches!(
            cmd_link(false, Vec::new(), vec![10], 2, 1, false),
            Err(CliError::InvalidArguments(_))
        ));
        assert!(cmd_link(true, vec![3, 4], vec![10], 2, 9, true).is_ok());
    }

    #[test]
    fn stringency_command_validates_display() {
        assert!(cmd_stringency(true, Some(400), None).is_ok());
        assert!(cmd_stringency(true, None, Some(1)).is_err());
    }
}
