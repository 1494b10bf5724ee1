//! # Stringency Planning
//!
//! Derives the server and display stringency of a coexpression search from the
//! number of datasets it runs across.
//!
//! ```text
//! display = clamp(2 + round(n / 50), 2, 20)
//! results = display                        if display <= 5
//!         = display - round(display / 4)   otherwise
//! ```
//!
//! The results stringency sent to the server is relaxed below the display
//! stringency, so the client holds a superset it can re-filter locally.
//! Rounding is half-up and is done in integer arithmetic.

use crate::CoexnetError;
use crate::primitives::{
    DATASETS_PER_STRINGENCY_STEP, MAX_DISPLAY_STRINGENCY, MIN_STRINGENCY, RELAXATION_THRESHOLD,
};
use serde::{Deserialize, Serialize};

/// Stringencies chosen for one search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StringencyPlan {
    /// Stringency sent to the server.
    pub stringency: u32,
    /// Stringency the results are initially displayed at.
    pub display_stringency: u32,
}

impl StringencyPlan {
    /// Plan for a search over `num_experiment_ids` datasets.
    #[must_use]
    pub fn for_datasets(num_experiment_ids: usize) -> Self {
        let steps = round_div(num_experiment_ids as u64, DATASETS_PER_STRINGENCY_STEP);
        let unclamped = u64::from(MIN_STRINGENCY).saturating_add(steps);
        let display_stringency = unclamped.clamp(
            u64::from(MIN_STRINGENCY),
            u64::from(MAX_DISPLAY_STRINGENCY),
        ) as u32;

        Self {
            stringency: results_stringency(display_stringency),
            display_stringency,
        }
    }

    /// Plan for a display stringency picked by the user.
    ///
    /// Fails if `display_stringency` is below `MIN_STRINGENCY`.
    pub fn for_display(display_stringency: u32) -> Result<Self, CoexnetError> {
        if display_stringency < MIN_STRINGENCY {
            return Err(CoexnetError::InvalidStringency {
                requested: display_stringency,
                min: MIN_STRINGENCY,
            });
        }
        Ok(Self {
            stringency: results_stringency(display_stringency),
            display_stringency,
        })
    }
}

/// Server stringency to request for a display stringency.
#[must_use]
pub fn results_stringency(display_stringency: u32) -> u32 {
    if display_stringency <= RELAXATION_THRESHOLD {
        display_stringency
    } else {
        display_stringency - round_div(u64::from(display_stringency), 4) as u32
    }
}

/// `round(n / d)` with halves rounded up, for non-negative operands.
fn round_div(n: u64, d: u64) -> u64 {
    n.saturating_add(d / 2) / d
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_datasets_uses_minimum() {
        let plan = StringencyPlan::for_datasets(0);
        assert_eq!(plan.display_stringency, 2);
        assert_eq!(plan.stringency, 2);
    }

    #[test]
    fn half_steps_round_up() {
        // 25 / 50 = 0.5 -> 1
        assert_eq!(StringencyPlan::for_datasets(25).display_stringency, 3);
        assert_eq!(StringencyPlan::for_datasets(24).display_stringency, 2);
    }

    #[test]
    fn small_display_is_not_relaxed() {
        let plan = StringencyPlan::for_datasets(150);
        assert_eq!(plan.display_stringency, 5);
        assert_eq!(plan.stringency, 5);
    }

    #[test]
    fn large_display_is_relaxed_by_a_quarter() {
        let plan = StringencyPlan::for_datasets(400);
        assert_eq!(plan.display_stringency, 10);
        assert_eq!(plan.stringency, 7);
    }

    #[test]
    fn display_is_capped() {
        let plan = StringencyPlan::for_datasets(100_000);
        assert_eq!(plan.display_stringency, 20);
        assert_eq!(plan.stringency, 15);
    }

    #[test]
    fn display_below_minimum_is_rejected() {
        assert_eq!(
            StringencyPlan::for_display(1),
            Err(CoexnetError::InvalidStringency {
                requested: 1,
                min: 2
            })
        );
    }

    #[test]
    fn user_display_six_relaxes_to_four() {
        // 6 / 4 = 1.5 -> 2
        let plan = StringencyPlan::for_display(6).expect("plan");
        assert_eq!(plan.stringency, 4);
    }
}
