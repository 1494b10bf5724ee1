//! # Search State Machine
//!
//! ```text
//! Idle -> ValidatingSelections -> RegisteringSessionGroups -+-> CoexSearching ----------------+-> ResultsReady
//!                  |                                        +-> ChoosingFactors -> DiffExSearching -+
//!                  +-> Cancelled                                   |
//!                                                                  +-> Cancelled
//! (any) -> Failed
//! ```
//!
//! | State | Leaves on |
//! |-------|-----------|
//! | Idle | `Go` |
//! | ValidatingSelections | `SelectionsAccepted`, `Cancel` |
//! | RegisteringSessionGroups | `Registered(dispatch)` |
//! | CoexSearching | `Completed` of the last outstanding search |
//! | ChoosingFactors | `FactorsChosen`, `FactorsDeclined`, `Cancel` |
//! | DiffExSearching | `Completed` of the last outstanding search |
//! | ResultsReady / Failed / Cancelled | `Go` (the user retries) |
//!
//! Cancellation is only accepted before a network search is dispatched. When
//! the coexpression lane of a dual search is already out, declining factors
//! drops the differential expression lane instead of cancelling.
//! Completion of one lane of a dual search leaves the state unchanged until
//! the other lane completes.

use crate::CoexnetError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

// =============================================================================
// SEARCH KINDS
// =============================================================================

/// One lane of a search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SearchKind {
    Coexpression,
    DifferentialExpression,
}

/// Which lanes run once registration is done.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Dispatch {
    Coexpression,
    DifferentialExpression,
    Both,
}

impl Dispatch {
    /// The lanes this dispatch launches.
    #[must_use]
    pub fn kinds(self) -> BTreeSet<SearchKind> {
        match self {
            Self::Coexpression => BTreeSet::from([SearchKind::Coexpression]),
            Self::DifferentialExpression => BTreeSet::from([SearchKind::DifferentialExpression]),
            Self::Both => BTreeSet::from([
                SearchKind::Coexpression,
                SearchKind::DifferentialExpression,
            ]),
        }
    }

    /// Check whether this dispatch includes a differential expression lane.
    #[must_use]
    pub fn includes_diff_ex(self) -> bool {
        matches!(self, Self::DifferentialExpression | Self::Both)
    }
}

// =============================================================================
// FAILURES
// =============================================================================

/// Why a search ended in `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureReason {
    EmptySelection,
    RegistrationFailed,
    SearchFailed,
    Internal,
}

impl From<&CoexnetError> for FailureReason {
    fn from(error: &CoexnetError) -> Self {
        match error {
            CoexnetError::EmptySelection => Self::EmptySelection,
            CoexnetError::RegistrationFailed(_) | CoexnetError::Unregistered(_) => {
                Self::RegistrationFailed
            }
            CoexnetError::SearchFailed(_) => Self::SearchFailed,
            _ => Self::Internal,
        }
    }
}

// =============================================================================
// STATES & EVENTS
// =============================================================================

/// Where a search is.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SearchState {
    #[default]
    Idle,
    ValidatingSelections,
    RegisteringSessionGroups,
    CoexSearching,
    ChoosingFactors,
    DiffExSearching,
    ResultsReady,
    Failed {
        reason: FailureReason,
        message: String,
    },
    Cancelled,
}

/// Input to the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateEvent {
    Go,
    SelectionsAccepted,
    Registered(Dispatch),
    FactorsChosen,
    /// No factors were chosen for the differential expression lane of a dual
    /// search. `outstanding_after` is what is still running.
    FactorsDeclined { outstanding_after: usize },
    /// A lane finished. `outstanding_after` is what is still running.
    Completed {
        kind: SearchKind,
        outstanding_after: usize,
    },
    Fail(FailureReason, String),
    Cancel,
}

impl std::fmt::Display for SearchState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Failed { reason, .. } => write!(f, "Failed({reason:?})"),
            other => write!(f, "{other:?}"),
        }
    }
}

impl SearchState {
    /// Check whether no further progress happens without a new `Go`.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::ResultsReady | Self::Failed { .. } | Self::Cancelled
        )
    }

    /// Check whether a network search may be in flight.
    #[must_use]
    pub fn is_searching(&self) -> bool {
        matches!(
            self,
            Self::CoexSearching | Self::ChoosingFactors | Self::DiffExSearching
        )
    }

    /// Compute the state after `event`.
    pub fn transition(&self, event: &StateEvent) -> Result<SearchState, CoexnetError> {
        use SearchState as S;
        use StateEvent as E;

        let next = match (self, event) {
            (_, E::Fail(reason, message)) => S::Failed {
                reason: *reason,
                message: message.clone(),
            },
            (S::Idle | S::ResultsReady | S::Failed { .. } | S::Cancelled, E::Go) => {
                S::ValidatingSelections
            }
            (S::ValidatingSelections, E::SelectionsAccepted) => S::RegisteringSessionGroups,
            (S::ValidatingSelections | S::ChoosingFactors, E::Cancel) => S::Cancelled,
            (S::RegisteringSessionGroups, E::Registered(Dispatch::Coexpression)) => {
                S::CoexSearching
            }
            (S::RegisteringSessionGroups, E::Registered(_)) => S::ChoosingFactors,
            (S::ChoosingFactors, E::FactorsChosen) => S::DiffExSearching,
            (S::ChoosingFactors, E::FactorsDeclined { outstanding_after }) => {
                if *outstanding_after == 0 {
                    S::ResultsReady
                } else {
                    S::CoexSearching
                }
            }
            // Factors are chosen before the differential expression lane starts.
            (
                S::CoexSearching | S::ChoosingFactors | S::DiffExSearching,
                E::Completed {
                    kind,
                    outstanding_after,
                },
            ) if !(*self == S::ChoosingFactors && *kind == SearchKind::DifferentialExpression) => {
                if *outstanding_after == 0 {
                    S::ResultsReady
                } else {
                    self.clone()
                }
            }
            _ => {
                return Err(CoexnetError::InvalidTransition {
                    from: self.to_string(),
                    event: format!("{event:?}"),
                });
            }
        };
        Ok(next)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn run(events: &[StateEvent]) -> Result<SearchState, CoexnetError> {
        let mut state = SearchState::Idle;
        for event in events {
            state = state.transition(event)?;
        }
        Ok(state)
    }

    #[test]
    fn coexpression_happy_path() {
        let state = run(&[
            StateEvent::Go,
            StateEvent::SelectionsAccepted,
            StateEvent::Registered(Dispatch::Coexpression),
            StateEvent::Completed {
                kind: SearchKind::Coexpression,
                outstanding_after: 0,
            },
        ])
        .expect("valid path");
        assert_eq!(state, SearchState::ResultsReady);
    }

    #[test]
    fn diff_ex_waits_for_factors() {
        let state = run(&[
            StateEvent::Go,
            StateEvent::SelectionsAccepted,
            StateEvent::Registered(Dispatch::DifferentialExpression),
        ])
        .expect("valid path");
        assert_eq!(state, SearchState::ChoosingFactors);
        assert_eq!(
            state.transition(&StateEvent::FactorsChosen).expect("chosen"),
            SearchState::DiffExSearching
        );
    }

    #[test]
    fn dual_search_joins_on_second_completion() {
        let state = run(&[
            StateEvent::Go,
            StateEvent::SelectionsAccepted,
            StateEvent::Registered(Dispatch::Both),
            StateEvent::Completed {
                kind: SearchKind::Coexpression,
                outstanding_after: 1,
            },
        ])
        .expect("valid path");
        assert_eq!(state, SearchState::ChoosingFactors);

        let state = state
            .transition(&StateEvent::FactorsChosen)
            .and_then(|s| {
                s.transition(&StateEvent::Completed {
                    kind: SearchKind::DifferentialExpression,
                    outstanding_after: 0,
                })
            })
            .expect("valid path");
        assert_eq!(state, SearchState::ResultsReady);
    }

    #[test]
    fn cancel_only_before_dispatch() {
        assert_eq!(
            run(&[StateEvent::Go, StateEvent::Cancel]).expect("cancel"),
            SearchState::Cancelled
        );
        assert!(
            run(&[
                StateEvent::Go,
                StateEvent::SelectionsAccepted,
                StateEvent::Registered(Dispatch::Coexpression),
                StateEvent::Cancel,
            ])
            .is_err()
        );
    }

    #[test]
    fn failure_reachable_from_anywhere() {
        let failed = SearchState::DiffExSearching
            .transition(&StateEvent::Fail(
                FailureReason::SearchFailed,
                "boom".into(),
            ))
            .expect("fail");
        assert!(failed.is_terminal());
        assert_eq!(
            failed.transition(&StateEvent::Go).expect("retry"),
            SearchState::ValidatingSelections
        );
    }

    #[test]
    fn diff_ex_cannot_complete_before_factors() {
        assert!(
            SearchState::ChoosingFactors
                .transition(&StateEvent::Completed {
                    kind: SearchKind::DifferentialExpression,
                    outstanding_after: 0,
                })
                .is_err()
        );
    }

    #[test]
    fn declined_factors_leave_coexpression_running() {
        assert_eq!(
            SearchState::ChoosingFactors
                .transition(&StateEvent::FactorsDeclined {
                    outstanding_after: 1
                })
                .expect("declined"),
            SearchState::CoexSearching
        );
        assert_eq!(
            SearchState::ChoosingFactors
                .transition(&StateEvent::FactorsDeclined {
                    outstanding_after: 0
                })
                .expect("declined"),
            SearchState::ResultsReady
        );
        assert!(
            SearchState::DiffExSearching
                .transition(&StateEvent::FactorsDeclined {
                    outstanding_after: 0
                })
                .is_err()
        );
    }

    #[test]
    fn go_while_searching_is_rejected() {
        assert!(SearchState::CoexSearching.transition(&StateEvent::Go).is_err());
    }

    #[test]
    fn failure_reason_from_error() {
        assert_eq!(
            FailureReason::from(&CoexnetError::SearchFailed("x".into())),
            FailureReason::SearchFailed
        );
        assert_eq!(
            FailureReason::from(&CoexnetError::EmptySelection),
            FailureReason::EmptySelection
        );
    }
}
