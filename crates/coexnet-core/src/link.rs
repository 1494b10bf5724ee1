//! # Bookmarkable Links
//!
//! Query-string encoding of a coexpression search, so a page load can replay it.
//!
//! Format: `?g=1,2,3&s=3&t=1&ees=10,11[&q]`
//! - `g`: comma-joined gene ids
//! - `s`: server stringency
//! - `t`: taxon id
//! - `ees`: comma-joined experiment ids
//! - `q`: present when only edges among query genes were requested

use crate::command::CoexpressionSearchCommand;
use crate::{CoexnetError, ExperimentId, GeneId, TaxonId};
use std::fmt;

/// A replayable coexpression search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoexpressionLink {
    pub gene_ids: Vec<GeneId>,
    pub stringency: u32,
    pub taxon_id: TaxonId,
    pub experiment_ids: Vec<ExperimentId>,
    pub query_genes_only: bool,
}

impl CoexpressionLink {
    /// Link for a command.
    #[must_use]
    pub fn from_command(command: &CoexpressionSearchCommand) -> Self {
        Self {
            gene_ids: command.scope.gene_ids.iter().copied().collect(),
            stringency: command.stringency,
            taxon_id: command.scope.taxon_id,
            experiment_ids: command.scope.experiment_ids.iter().copied().collect(),
            query_genes_only: command.query_genes_only,
        }
    }

    /// Parse a query string, with or without the leading `?`.
    pub fn parse(query: &str) -> Result<Self, CoexnetError> {
        let query = query.strip_prefix('?').unwrap_or(query);

        let mut gene_ids = None;
        let mut stringency = None;
        let mut taxon_id = None;
        let mut experiment_ids = Vec::new();
        let mut query_genes_only = false;

        for pair in query.split('&').filter(|p| !p.is_empty()) {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            match key {
                "g" => gene_ids = Some(parse_ids(key, value)?),
                "s" => stringency = Some(parse_number(key, value)?),
                "t" => taxon_id = Some(TaxonId(parse_number(key, value)?)),
                "ees" => experiment_ids = parse_ids(key, value)?,
                "q" => query_genes_only = value.is_empty() || value == "true",
                _ => {}
            }
        }

        let gene_ids = gene_ids.ok_or_else(|| CoexnetError::InvalidLink("missing g".into()))?;
        Ok(Self {
            gene_ids: gene_ids.into_iter().map(GeneId).collect(),
            stringency: stringency.ok_or_else(|| CoexnetError::InvalidLink("missing s".into()))?,
            taxon_id: taxon_id.ok_or_else(|| CoexnetError::InvalidLink("missing t".into()))?,
            experiment_ids: experiment_ids.into_iter().map(ExperimentId).collect(),
            query_genes_only,
        })
    }
}

impl fmt::Display for CoexpressionLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "?g={}&s={}&t={}&ees={}",
            join(self.gene_ids.iter().map(|g| g.0)),
            self.stringency,
            self.taxon_id.0,
            join(self.experiment_ids.iter().map(|e| e.0)),
        )?;
        if self.query_genes_only {
            write!(f, "&q")?;
        }
        Ok(())
    }
}

fn join(ids: impl Iterator<Item = u64>) -> String {
    ids.map(|id| id.to_string()).collect::<Vec<_>>().join(",")
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, CoexnetError> {
    value
        .trim()
        .parse()
        .map_err(|_| CoexnetError::InvalidLink(format!("{key}={value}")))
}

fn parse_ids(key: &str, value: &str) -> Result<Vec<u64>, CoexnetError> {
    value
        .split(',')
        .filter(|s| !s.trim().is_empty())
        .map(|s| parse_number(key, s))
        .collect()
}

// =============================================================================
// TESTS
// =============================================================================
