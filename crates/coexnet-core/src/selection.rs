//! # Selection Validation
//!
//! Checks gene and experiment selections against the limits of a search mode
//! and trims oversized selections.
//!
//! - Coexpression searches trim genes silently to a hard cap.
//! - Differential expression searches ask the user: trim, keep, or cancel.
//! - Trimming keeps whole selections while they fit, truncates the first one
//!   that overflows, and drops everything after it.

use crate::primitives::{
    DEFAULT_COEX_MAX_GENES, DEFAULT_DIFF_EX_MAX_EXPERIMENTS, DEFAULT_DIFF_EX_MAX_GENES,
    DEFAULT_DIFF_EX_VIZ_MAX_EXPERIMENTS, DEFAULT_DIFF_EX_VIZ_MAX_GENES, TRIMMED_PREFIX,
};
use crate::{CoexnetError, EntityKind, Selection, SetId, member_count};
use serde::{Deserialize, Serialize};

// =============================================================================
// MODES & LIMITS
// =============================================================================

/// How the selections will be searched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SearchMode {
    /// Coexpression network search.
    Coexpression,
    /// Classic differential expression search.
    DifferentialExpression,
    /// Differential expression heatmap visualization.
    DifferentialExpressionVisualization,
}

/// Per-mode selection limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionLimits {
    pub coex_max_genes: usize,
    pub diff_ex_max_genes: usize,
    pub diff_ex_max_experiments: usize,
    pub diff_ex_viz_max_genes: usize,
    pub diff_ex_viz_max_experiments: usize,
}

impl Default for SelectionLimits {
    fn default() -> Self {
        Self {
            coex_max_genes: DEFAULT_COEX_MAX_GENES,
            diff_ex_max_genes: DEFAULT_DIFF_EX_MAX_GENES,
            diff_ex_max_experiments: DEFAULT_DIFF_EX_MAX_EXPERIMENTS,
            diff_ex_viz_max_genes: DEFAULT_DIFF_EX_VIZ_MAX_GENES,
            diff_ex_viz_max_experiments: DEFAULT_DIFF_EX_VIZ_MAX_EXPERIMENTS,
        }
    }
}

/// The caps that apply to one search mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeCaps {
    pub max_genes: Option<usize>,
    pub max_experiments: Option<usize>,
    /// Whether exceeding a cap asks the user instead of trimming silently.
    pub prompts: bool,
}

impl SelectionLimits {
    /// Caps for a mode. Coexpression searches run across every usable dataset,
    /// so only the gene count is capped there.
    #[must_use]
    pub fn caps(&self, mode: SearchMode) -> ModeCaps {
        match mode {
            SearchMode::Coexpression => ModeCaps {
                max_genes: Some(self.coex_max_genes),
                max_experiments: None,
                prompts: false,
            },
            SearchMode::DifferentialExpression => ModeCaps {
                max_genes: Some(self.diff_ex_max_genes),
                max_experiments: Some(self.diff_ex_max_experiments),
                prompts: true,
            },
            SearchMode::DifferentialExpressionVisualization => ModeCaps {
                max_genes: Some(self.diff_ex_viz_max_genes),
                max_experiments: Some(self.diff_ex_viz_max_experiments),
                prompts: true,
            },
        }
    }
}

// =============================================================================
// TRIMMING
// =============================================================================

/// Trim a selection list so that its total member count is at most `max`.
///
/// Selections are scanned in order. Those that fit within the remaining
/// budget are kept unchanged. The first selection that would overflow is
/// truncated to exactly fill the budget, becomes ephemeral and is renamed
/// with a "Trimmed " prefix. Everything after it is dropped.
#[must_use]
pub fn trim(selections: &[Selection], max: usize) -> Vec<Selection> {
    let mut kept = Vec::with_capacity(selections.len());
    let mut total = 0usize;

    for selection in selections {
        let size = selection.size();
        if total.saturating_add(size) <= max {
            kept.push(selection.clone());
            total += size;
            continue;
        }

        let remaining = max - total;
        if remaining > 0 {
            kept.push(Selection {
                id: SetId::Ephemeral,
                member_ids: selection.member_ids[..remaining].to_vec(),
                name: format!("{}{}", TRIMMED_PREFIX, selection.name),
                modified: true,
                ..selection.clone()
            });
        }
        break;
    }

    kept
}

/// Record of one trim applied to a selection list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrimReport {
    pub kind: EntityKind,
    pub before: usize,
    pub after: usize,
    pub max: usize,
}

// =============================================================================
// VALIDATION
// =============================================================================

/// Selections that passed validation, possibly trimmed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedSelections {
    pub genes: Vec<Selection>,
    pub experiments: Vec<Selection>,
    /// Trims that were applied (silently or on request).
    pub trims: Vec<TrimReport>,
}

/// The user's answer to an over-limit prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrimAnswer {
    /// Trim to the limits and continue.
    Trim,
    /// Continue with the selections as they are.
    Keep,
    /// Abort the search.
    Cancel,
}

/// An over-limit selection waiting for the user's decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrimPrompt {
    pub mode: SearchMode,
    pub gene_count: usize,
    pub experiment_count: usize,
    pub max_genes: Option<usize>,
    pub max_experiments: Option<usize>,
    genes: Vec<Selection>,
    experiments: Vec<Selection>,
}

impl TrimPrompt {
    /// Message shown to the user.
    #[must_use]
    pub fn message(&self) -> String {
        let mut parts = Vec::new();
        if let Some(max) = self.max_genes.filter(|&max| self.gene_count > max) {
            parts.push(format!("{} genes (maximum {})", self.gene_count, max));
        }
        if let Some(max) = self
            .max_experiments
            .filter(|&max| self.experiment_count > max)
        {
            parts.push(format!(
                "{} experiments (maximum {})",
                self.experiment_count, max
            ));
        }
        format!(
            "You selected {}. Trim the selection to the limit?",
            parts.join(" and ")
        )
    }

    /// Apply the user's answer.
    ///
    /// `Cancel` yields `CoexnetError::Cancelled`; no later stage may run.
    pub fn resolve(self, answer: TrimAnswer) -> Result<ValidatedSelections, CoexnetError> {
        match answer {
            TrimAnswer::Cancel => Err(CoexnetError::Cancelled),
            TrimAnswer::Keep => Ok(ValidatedSelections {
                genes: self.genes,
                experiments: self.experiments,
                trims: Vec::new(),
            }),
            TrimAnswer::Trim => {
                let mut trims = Vec::new();
                let genes = trim_kind(self.genes, EntityKind::Gene, self.max_genes, &mut trims);
                let experiments = trim_kind(
                    self.experiments,
                    EntityKind::Experiment,
                    self.max_experiments,
                    &mut trims,
                );
                Ok(ValidatedSelections {
                    genes,
                    experiments,
                    trims,
                })
            }
        }
    }
}

/// Outcome of validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validation {
    /// Continue to registration.
    Proceed(ValidatedSelections),
    /// Ask the user how to handle an oversized selection.
    PromptTrim(TrimPrompt),
}

/// Checks selections against the limits of a search mode.
#[derive(Debug, Clone, Copy, Default)]
pub struct SelectionValidator {
    limits: SelectionLimits,
}

impl SelectionValidator {
    /// Create a validator with the given limits.
    #[must_use]
    pub fn new(limits: SelectionLimits) -> Self {
        Self { limits }
    }

    /// The limits in effect.
    #[must_use]
    pub fn limits(&self) -> &SelectionLimits {
        &self.limits
    }

    /// Validate selections for a mode.
    ///
    /// Fails with `EmptySelection` if either list is empty. Coexpression
    /// searches are trimmed to the gene cap without asking.
    pub fn validate(
        &self,
        genes: Vec<Selection>,
        experiments: Vec<Selection>,
        mode: SearchMode,
    ) -> Result<Validation, CoexnetError> {
        if genes.is_empty() || experiments.is_empty() {
            return Err(CoexnetError::EmptySelection);
        }

        let caps = self.limits.caps(mode);
        let gene_count = member_count(&genes);
        let experiment_count = member_count(&experiments);
        let genes_over = caps.max_genes.is_some_and(|max| gene_count > max);
        let experiments_over = caps
            .max_experiments
            .is_some_and(|max| experiment_count > max);

        if !genes_over && !experiments_over {
            return Ok(Validation::Proceed(ValidatedSelections {
                genes,
                experiments,
                trims: Vec::new(),
            }));
        }

        if !caps.prompts {
            let mut trims = Vec::new();
            let genes = trim_kind(genes, EntityKind::Gene, caps.max_genes, &mut trims);
            let experiments = trim_kind(
                experiments,
                EntityKind::Experiment,
                caps.max_experiments,
                &mut trims,
            );
            return Ok(Validation::Proceed(ValidatedSelections {
                genes,
                experiments,
                trims,
            }));
        }

        Ok(Validation::PromptTrim(TrimPrompt {
            mode,
            gene_count,
            experiment_count,
            max_genes: caps.max_genes,
            max_experiments: caps.max_experiments,
            genes,
            experiments,
        }))
    }
}

/// Trim one list if it is over its cap, recording what was done.
fn trim_kind(
    selections: Vec<Selection>,
    kind: EntityKind,
    max: Option<usize>,
    trims: &mut Vec<TrimReport>,
) -> Vec<Selection> {
    let before = member_count(&selections);
    match max {
        Some(max) if before > max => {
            let trimmed = trim(&selections, max);
            trims.push(TrimReport {
                kind,
                before,
                after: member_count(&trimmed),
                max,
            });
            trimmed
        }
        _ => selections,
    }
}

// =============================================================================
// TESTS
// =============================================================================
