//! # Search Commands
//!
//! Structured, immutable descriptions of a search, built once every selection
//! has a durable id.
//!
//! - `SearchScope`: the genes, experiments and sets a search covers
//! - `CoexpressionSearchCommand`: scope plus stringency and neighbour flags
//! - `DifferentialExpressionSearchCommand`: scope plus the chosen factors

use crate::stringency::StringencyPlan;
use crate::{CoexnetError, ExperimentId, GeneId, Selection, SetId, TaxonId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

// =============================================================================
// SCOPE
// =============================================================================

/// The entities a search runs over.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchScope {
    pub gene_ids: BTreeSet<GeneId>,
    pub experiment_ids: BTreeSet<ExperimentId>,
    pub gene_set_ids: Vec<i64>,
    pub experiment_set_ids: Vec<i64>,
    pub taxon_id: TaxonId,
}

impl SearchScope {
    /// Build the scope from registered selections.
    ///
    /// Fails with `Unregistered` if any selection is still ephemeral, and with
    /// `EmptySelection` if there are no genes.
    pub fn from_selections(
        genes: &[Selection],
        experiments: &[Selection],
    ) -> Result<Self, CoexnetError> {
        let taxon_id = genes
            .first()
            .map(|selection| selection.taxon_id)
            .ok_or(CoexnetError::EmptySelection)?;

        Ok(Self {
            gene_ids: genes
                .iter()
                .flat_map(|s| s.member_ids.iter().copied().map(GeneId))
                .collect(),
            experiment_ids: experiments
                .iter()
                .flat_map(|s| s.member_ids.iter().copied().map(ExperimentId))
                .collect(),
            gene_set_ids: durable_ids(genes)?,
            experiment_set_ids: durable_ids(experiments)?,
            taxon_id,
        })
    }
}

fn durable_ids(selections: &[Selection]) -> Result<Vec<i64>, CoexnetError> {
    selections
        .iter()
        .map(|selection| match selection.id {
            SetId::Durable(id) => Ok(id),
            SetId::Ephemeral => Err(CoexnetError::Unregistered(selection.name.clone())),
        })
        .collect()
}

// =============================================================================
// COEXPRESSION
// =============================================================================

/// A coexpression search request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoexpressionSearchCommand {
    #[serde(flatten)]
    pub scope: SearchScope,
    /// Server stringency.
    pub stringency: u32,
    /// Initial client-side filter.
    pub display_stringency: u32,
    /// Only return edges between query genes.
    pub query_genes_only: bool,
}

impl CoexpressionSearchCommand {
    /// Create a command for a scope, planning stringency from its dataset count.
    #[must_use]
    pub fn planned(scope: SearchScope, query_genes_only: bool) -> Self {
        let plan = StringencyPlan::for_datasets(scope.experiment_ids.len());
        Self::with_plan(scope, plan, query_genes_only)
    }

    /// Create a command with an explicit stringency plan.
    ///
    /// `query_genes_only` is dropped for fewer than two genes, where it would
    /// leave nothing to search for.
    #[must_use]
    pub fn with_plan(scope: SearchScope, plan: StringencyPlan, query_genes_only: bool) -> Self {
        Self {
            query_genes_only: query_genes_only && scope.gene_ids.len() >= 2,
            scope,
            stringency: plan.stringency,
            display_stringency: plan.display_stringency,
        }
    }

    /// The stringency plan this command carries.
    #[must_use]
    pub fn plan(&self) -> StringencyPlan {
        StringencyPlan {
            stringency: self.stringency,
            display_stringency: self.display_stringency,
        }
    }

    /// Same search over a different gene list. Gene sets no longer apply.
    #[must_use]
    pub fn for_genes(&self, gene_ids: impl IntoIterator<Item = GeneId>) -> Self {
        Self {
            scope: SearchScope {
                gene_ids: gene_ids.into_iter().collect(),
                gene_set_ids: Vec::new(),
                ..self.scope.clone()
            },
            ..self.clone()
        }
    }

    /// Same search restricted to edges among the query genes.
    #[must_use]
    pub fn query_genes_only(&self) -> Self {
        Self {
            query_genes_only: true,
            ..self.clone()
        }
    }
}

// =============================================================================
// DIFFERENTIAL EXPRESSION
// =============================================================================

/// Identifier of an experimental factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FactorId(pub u64);

/// Factor chosen for each experiment.
pub type FactorMap = BTreeMap<ExperimentId, FactorId>;

/// A differential expression search request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DifferentialExpressionSearchCommand {
    #[serde(flatten)]
    pub scope: SearchScope,
    pub factor_map: FactorMap,
    /// Request a heatmap visualization payload.
    pub visualization: bool,
}

/// A single-use search request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SearchCommand {
    Coexpression(CoexpressionSearchCommand),
    DifferentialExpression(DifferentialExpressionSearchCommand),
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EntityKind;

    fn registered_genes() -> Vec<Selection> {
        vec![
            Selection::durable(EntityKind::Gene, 3, "a", TaxonId(9), vec![5, 1]),
            Selection::durable(EntityKind::Gene, 4, "b", TaxonId(9), vec![1, 8]),
        ]
    }

    fn registered_experiments(n: u64) -> Vec<Selection> {
        vec![Selection::durable(
            EntityKind::Experiment,
            7,
            "ees",
            TaxonId(9),
            (1..=n).collect(),
        )]
    }

    #[test]
    fn scope_collects_members_and_set_ids() {
        let scope = SearchScope::from_selections(&registered_genes(), &registered_experiments(3))
            .expect("scope");
        let genes: Vec<_> = scope.gene_ids.iter().map(|g| g.0).collect();
        assert_eq!(genes, vec![1, 5, 8]);
        assert_eq!(scope.gene_set_ids, vec![3, 4]);
        assert_eq!(scope.experiment_set_ids, vec![7]);
        assert_eq!(scope.taxon_id, TaxonId(9));
    }

    #[test]
    fn scope_rejects_ephemeral_selection() {
        let genes = vec![Selection::ephemeral(
            EntityKind::Gene,
            "adhoc",
            TaxonId(1),
            vec![1],
        )];
        let result = SearchScope::from_selections(&genes, &registered_experiments(1));
        assert_eq!(result, Err(CoexnetError::Unregistered("adhoc".into())));
    }

    #[test]
    fn planned_command_uses_experiment_count() {
        let scope = SearchScope::from_selections(&registered_genes(), &registered_experiments(400))
            .expect("scope");
        let command = CoexpressionSearchCommand::planned(scope, false);
        assert_eq!(command.display_stringency, 10);
        assert_eq!(command.stringency, 7);
    }

    #[test]
    fn for_genes_drops_gene_sets() {
        let scope = SearchScope::from_selections(&registered_genes(), &registered_experiments(3))
            .expect("scope");
        let command = CoexpressionSearchCommand::planned(scope, false);
        let narrowed = command.for_genes([GeneId(42)]).query_genes_only();
        assert!(narrowed.scope.gene_set_ids.is_empty());
        assert_eq!(narrowed.scope.gene_ids.len(), 1);
        assert!(narrowed.query_genes_only);
        assert!(!command.query_genes_only);
    }

    #[test]
    fn single_gene_cannot_be_query_genes_only() {
        let genes = vec![Selection::durable(EntityKind::Gene, 3, "a", TaxonId(9), vec![5])];
        let scope =
            SearchScope::from_selections(&genes, &registered_experiments(3)).expect("scope");
        assert!(!CoexpressionSearchCommand::planned(scope, true).query_genes_only);
    }

    #[test]
    fn command_serializes_camel_case() {
        let scope = SearchScope::from_selections(&registered_genes(), &registered_experiments(1))
            .expect("scope");
        let json = serde_json::to_value(CoexpressionSearchCommand::planned(scope, true))
            .expect("serialize");
        assert_eq!(json["queryGenesOnly"], serde_json::json!(true));
        assert_eq!(json["geneIds"], serde_json::json!([1, 5, 8]));
        assert_eq!(json["displayStringency"], serde_json::json!(2));
    }
}
