//! # coexnet CLI Module
//!
//! This module implements the CLI interface for coexnet.
//!
//! ## Available Commands
//!
//! - `search` - Run a coexpression and/or differential expression search
//! - `stringency` - Show the stringency plan for a dataset count
//! - `link` - Build or parse a bookmarkable search link
//! - `filter` - Re-filter a saved coexpression result offline

mod commands;

use crate::config::{ConfigError, DEFAULT_CONFIG_FILE};
use clap::{Parser, Subcommand, ValueEnum};
use coexnet_core::{CoexnetError, ExperimentId, FactorId, GraphSize, TrimAnswer};
use std::path::PathBuf;
use thiserror::Error;

pub use commands::*;

// =============================================================================
// ERRORS
// =============================================================================

/// Errors surfaced by CLI commands.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Pipeline(#[from] CoexnetError),

    #[error("Cannot read '{path}': {message}")]
    Io { path: String, message: String },

    #[error("Invalid JSON in '{path}': {message}")]
    Json { path: String, message: String },

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),
}

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// coexnet - gene coexpression network search
///
/// Validates gene and experiment selections, runs coexpression and
/// differential expression searches, and renders the coexpression graph.
#[derive(Parser, Debug)]
#[command(name = "coexnet")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress banner output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to the configuration file
    #[arg(short = 'c', long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a search against the configured backend
    Search {
        /// JSON file of picks: {"genes": [...], "experiments": [...]}
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Gene ids, each searched as a single pick (comma-separated)
        #[arg(short, long, value_delimiter = ',')]
        genes: Vec<u64>,

        /// Experiment ids, each searched as a single pick (comma-separated)
        #[arg(short, long, value_delimiter = ',')]
        experiments: Vec<u64>,

        /// Taxon of the gene and experiment ids
        #[arg(short, long, default_value = "1")]
        taxon: u64,

        /// Which searches to run
        #[arg(short, long, value_enum, default_value = "coex")]
        mode: ModeArg,

        /// Only fetch edges among the query genes
        #[arg(long)]
        query_genes_only: bool,

        /// Answer to an over-limit selection prompt
        #[arg(long, value_enum, default_value = "trim")]
        trim_answer: TrimArg,

        /// Confirm eviction, re-run and lower-stringency prompts
        #[arg(short, long)]
        yes: bool,

        /// Experimental factor per experiment, as EXPERIMENT=FACTOR
        #[arg(long = "factor", value_parser = parse_factor)]
        factors: Vec<(ExperimentId, FactorId)>,

        /// Show every edge instead of growing the graph from query genes
        #[arg(long)]
        all_edges: bool,

        /// Reduce the graph to a size preset
        #[arg(long, value_enum)]
        size: Option<SizeArg>,

        /// Only show edges whose genes match this text
        #[arg(long)]
        text: Option<String>,
    },

    /// Show the stringency plan
    Stringency {
        /// Plan for a search over this many datasets
        #[arg(short, long, conflicts_with = "display", required_unless_present = "display")]
        datasets: Option<usize>,

        /// Plan for lowering the display stringency to this value
        #[arg(short = 's', long)]
        display: Option<u32>,
    },

    /// Build a bookmarkable link, or parse one
    Link {
        /// Link query string to parse
        #[arg(short, long, conflicts_with_all = ["genes", "experiments"])]
        parse: Option<String>,

        /// Gene ids (comma-separated)
        #[arg(short, long, value_delimiter = ',')]
        genes: Vec<u64>,

        /// Experiment ids (comma-separated)
        #[arg(short, long, value_delimiter = ',')]
        experiments: Vec<u64>,

        /// Server stringency
        #[arg(short, long, default_value = "2")]
        stringency: u32,

        /// Taxon id
        #[arg(short, long, default_value = "1")]
        taxon: u64,

        /// Only edges among the query genes
        #[arg(long)]
        query_genes_only: bool,
    },

    /// Re-filter a saved coexpression result without network access
    Filter {
        /// Saved coexpression result (JSON)
        #[arg(short, long)]
        input: PathBuf,

        /// Display stringency to filter at
        #[arg(short, long, default_value = "2")]
        stringency: u32,

        /// Stringency the result was fetched at
        #[arg(short, long, default_value = "2")]
        results_stringency: u32,

        /// Show every edge instead of growing the graph from query genes
        #[arg(long)]
        all_edges: bool,

        /// Only show edges whose genes match this text
        #[arg(long)]
        text: Option<String>,

        /// Reduce the graph to a size preset
        #[arg(long, value_enum)]
        size: Option<SizeArg>,
    },
}

/// Search mode names on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    Coex,
    DiffEx,
    DiffExViz,
    Both,
}

/// Over-limit prompt answers on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TrimArg {
    Trim,
    Keep,
    Cancel,
}

impl From<TrimArg> for TrimAnswer {
    fn from(arg: TrimArg) -> Self {
        match arg {
            TrimArg::Trim => Self::Trim,
            TrimArg::Keep => Self::Keep,
            TrimArg::Cancel => Self::Cancel,
        }
    }
}

/// Graph size presets on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SizeArg {
    Large,
    Medium,
    Small,
}

impl From<SizeArg> for GraphSize {
    fn from(arg: SizeArg) -> Self {
        match arg {
            SizeArg::Large => Self::Large,
            SizeArg::Medium => Self::Medium,
            SizeArg::Small => Self::Small,
        }
    }
}

/// Parse `EXPERIMENT=FACTOR`.
fn parse_factor(raw: &str) -> Result<(ExperimentId, FactorId), String> {
    let (experiment, factor) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected EXPERIMENT=FACTOR, got '{raw}'"))?;
    let experiment = experiment
        .trim()
        .parse()
        .map_err(|e| format!("invalid experiment id '{experiment}': {e}"))?;
    let factor = factor
        .trim()
        .parse()
        .map_err(|e| format!("invalid factor id '{factor}': {e}"))?;
    Ok((ExperimentId(experiment), FactorId(factor)))
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
pub async fn execute(cli: Cli) -> Result<(), CliError> {
    let json_mode = cli.json_mode;

    match cli.command {
        Commands::Search {
            input,
            genes,
            experiments,
            taxon,
            mode,
            query_genes_only,
            trim_answer,
            yes,
            factors,
            all_edges,
            size,
            text,
        } => {
            let options = SearchOptions {
                input,
                genes,
                experiments,
                taxon,
                mode,
                query_genes_only,
                trim_answer: trim_answer.into(),
                confirm: yes,
                factors: factors.into_iter().collect(),
                all_edges,
                size: size.map(GraphSize::from),
                text,
            };
            cmd_search(&cli.config, json_mode, cli.verbose, options).await
        }
        Commands::Stringency { datasets, display } => cmd_stringency(json_mode, datasets, display),
        Commands::Link {
            parse,
            genes,
            experiments,
            stringency,
            taxon,
            query_genes_only,
        } => match parse {
            Some(query) => cmd_link_parse(json_mode, &query),
            None => cmd_link(json_mode, genes, experiments, stringency, taxon, query_genes_only),
        },
        Commands::Filter {
            input,
            stringency,
            results_stringency,
            all_edges,
            text,
            size,
        } => cmd_filter(
            json_mode,
            &input,
            stringency,
            results_stringency,
            all_edges,
            text.as_deref(),
            size.map(GraphSize::from),
        ),
    }
}

// =============================================================================
// TESTS
// =============================================================================
