//! # User Prompts
//!
//! Questions the pipeline asks the user before continuing.
//!
//! The CLI answers them from flags; a UI would show dialogs.

use coexnet_core::{Extension, TrimAnswer, TrimPrompt};

/// Source of answers to pipeline questions.
pub trait UserPrompt: Send + Sync {
    /// Selections are over the limit of a differential expression search.
    fn trim(&self, prompt: &TrimPrompt) -> TrimAnswer;

    /// Extending the graph needs to evict the oldest query genes.
    fn confirm_eviction(&self, extension: &Extension) -> bool;

    /// Lowering the display stringency below what was fetched needs a new search.
    fn confirm_lower_stringency(&self, results_stringency: u32, requested: u32) -> bool;

    /// Re-running with more nodes than the cap drops the neighbour search.
    fn confirm_rerun_over_cap(&self, selected: usize, max: usize) -> bool;
}

/// Prompt answering every question the same way.
#[derive(Debug, Clone, Copy)]
pub struct FixedAnswers {
    pub trim: TrimAnswer,
    pub confirm: bool,
}

impl Default for FixedAnswers {
    fn default() -> Self {
        Self {
            trim: TrimAnswer::Trim,
            confirm: false,
        }
    }
}

impl UserPrompt for FixedAnswers {
    fn trim(&self, prompt: &TrimPrompt) -> TrimAnswer {
        tracing::warn!("{} Answering {:?}", prompt.message(), self.trim);
        self.trim
    }

    fn confirm_eviction(&self, extension: &Extension) -> bool {
        tracing::warn!(
            "Adding {} query genes evicts {} older ones. Confirmed: {}",
            extension.added.len(),
            extension.evicted.len(),
            self.confirm
        );
        self.confirm
    }

    fn confirm_lower_stringency(&self, results_stringency: u32, requested: u32) -> bool {
        tracing::warn!(
            "Stringency {} is below the fetched {}; a new search is needed. Confirmed: {}",
            requested,
            results_stringency,
            self.confirm
        );
        self.confirm
    }

    fn confirm_rerun_over_cap(&self, selected: usize, max: usize) -> bool {
        tracing::warn!(
            "{} nodes selected (maximum {}); only edges among them will be searched. Confirmed: {}",
            selected,
            max,
            self.confirm
        );
        self.confirm
    }
}
