//! # Search Session
//!
//! Everything one user's searches share: the state machine, which lanes of
//! the current search are still running, and the coexpression graph.
//!
//! Completion is tracked as a set of lanes rather than one flag per lane, so
//! the lane that completes second is the one that reports results ready.

use crate::graph::CoexGraphBuilder;
use crate::system::{Dispatch, FailureReason, SearchKind, SearchState, StateEvent};
use crate::CoexnetError;
use std::collections::BTreeSet;

/// State shared by every stage of a search.
#[derive(Debug, Clone, Default)]
pub struct SearchSession {
    state: SearchState,
    requested: BTreeSet<SearchKind>,
    completed: BTreeSet<SearchKind>,
    graph: CoexGraphBuilder,
}

impl SearchSession {
    /// Create an idle session.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> &SearchState {
        &self.state
    }

    /// Lanes launched by the current search.
    #[must_use]
    pub fn requested(&self) -> &BTreeSet<SearchKind> {
        &self.requested
    }

    /// Lanes of the current search that have completed.
    #[must_use]
    pub fn completed(&self) -> &BTreeSet<SearchKind> {
        &self.completed
    }

    /// The coexpression graph.
    #[must_use]
    pub fn graph(&self) -> &CoexGraphBuilder {
        &self.graph
    }

    /// The coexpression graph, for merging answers.
    pub fn graph_mut(&mut self) -> &mut CoexGraphBuilder {
        &mut self.graph
    }

    /// Apply an event and return the new state.
    pub fn apply(&mut self, event: &StateEvent) -> Result<&SearchState, CoexnetError> {
        self.state = self.state.transition(event)?;
        Ok(&self.state)
    }

    /// Start a new search.
    pub fn go(&mut self) -> Result<&SearchState, CoexnetError> {
        self.state = self.state.transition(&StateEvent::Go)?;
        self.requested.clear();
        self.completed.clear();
        Ok(&self.state)
    }

    /// Record that registration finished and which lanes now run.
    pub fn dispatch(&mut self, dispatch: Dispatch) -> Result<&SearchState, CoexnetError> {
        self.apply(&StateEvent::Registered(dispatch))?;
        self.requested = dispatch.kinds();
        self.completed.clear();
        Ok(&self.state)
    }

    /// Record that a lane finished.
    ///
    /// Returns `true` when this was the last outstanding lane.
    pub fn complete(&mut self, kind: SearchKind) -> Result<bool, CoexnetError> {
        if !self.requested.contains(&kind) || self.completed.contains(&kind) {
            return Err(CoexnetError::InvalidTransition {
                from: self.state.to_string(),
                event: format!("{kind:?} completed"),
            });
        }
        let outstanding_after = self.requested.len() - self.completed.len() - 1;
        self.apply(&StateEvent::Completed {
            kind,
            outstanding_after,
        })?;
        self.completed.insert(kind);
        Ok(outstanding_after == 0)
    }

    /// Record that no factors were chosen.
    ///
    /// A lone differential expression search is cancelled. In a dual search
    /// the coexpression lane has already been sent, so only the differential
    /// expression lane is dropped. Returns `true` when results are ready.
    pub fn decline_factors(&mut self) -> Result<bool, CoexnetError> {
        let kind = SearchKind::DifferentialExpression;
        if !self.requested.contains(&kind) || self.completed.contains(&kind) {
            return Err(CoexnetError::InvalidTransition {
                from: self.state.to_string(),
                event: "factors declined".into(),
            });
        }
        if self.requested.len() == 1 {
            self.apply(&StateEvent::Cancel)?;
            return Ok(false);
        }
        let outstanding_after = self.requested.len() - self.completed.len() - 1;
        self.apply(&StateEvent::FactorsDeclined { outstanding_after })?;
        self.completed.insert(kind);
        Ok(outstanding_after == 0)
    }

    /// Move to `Failed`, keeping the error's message verbatim.
    pub fn fail(&mut self, error: &CoexnetError) -> &SearchState {
        let message = match error {
            CoexnetError::SearchFailed(message) => message.clone(),
            other => other.to_string(),
        };
        self.state = SearchState::Failed {
            reason: FailureReason::from(error),
            message,
        };
        &self.state
    }
}

// =============================================================================
// TESTS
// =============================================================================
