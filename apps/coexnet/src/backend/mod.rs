//! # Backend Seams
//!
//! The remote operations the pipeline consumes, and the factor chooser.
//!
//! - `CoexpressionBackend`: session group registration and the searches
//! - `FactorChooser`: picks one experimental factor per experiment
//! - `HttpBackend`: `CoexpressionBackend` over the REST API
//!
//! Calls are single-shot: no timeout and no retry. A hung call leaves the
//! search in its current state.

mod http;

pub use http::HttpBackend;

use async_trait::async_trait;
use coexnet_core::{
    CoexpressionResult, CoexpressionSearchCommand, DifferentialExpressionSearchCommand,
    EntityKind, ExperimentId, FactorMap, GeneId, Selection,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::oneshot;

// =============================================================================
// ERRORS
// =============================================================================

/// Errors from the backend transport.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BackendError {
    /// Cannot reach the backend.
    #[error("Cannot connect to backend at {0}")]
    ConnectionFailed(String),

    /// 401 Unauthorized - invalid or missing API key.
    #[error("Unauthorized: invalid or missing API key")]
    Unauthorized,

    /// 429 Too Many Requests.
    #[error("Rate limited: too many requests")]
    RateLimited,

    /// The backend answered with an error status. The body is its message.
    #[error("Server error ({0}): {1}")]
    ServerError(u16, String),

    /// Failed to parse the response body.
    #[error("Parse error: {0}")]
    ParseError(String),
}

impl BackendError {
    /// The message to show the user, verbatim from the server when it sent one.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::ServerError(_, body) if !body.trim().is_empty() => body.clone(),
            other => other.to_string(),
        }
    }
}

// =============================================================================
// RESULTS
// =============================================================================

/// Answer of a differential expression search.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffExResult {
    /// Result table, passed through untouched.
    #[serde(default)]
    pub result: Value,
    /// Heatmap payload, when a visualization was requested.
    #[serde(default)]
    pub visualization: Option<Value>,
}

// =============================================================================
// TRAITS
// =============================================================================

/// Remote operations of the coexpression service.
#[async_trait]
pub trait CoexpressionBackend: Send + Sync {
    /// Register ephemeral selections for the session. Returns them with
    /// durable ids, in the same order.
    async fn register_session_groups(
        &self,
        kind: EntityKind,
        selections: &[Selection],
        modification_based: bool,
    ) -> Result<Vec<Selection>, BackendError>;

    /// Edges touching the query genes.
    async fn coexpression_search(
        &self,
        command: &CoexpressionSearchCommand,
    ) -> Result<CoexpressionResult, BackendError>;

    /// Edges among `query_gene_ids`.
    async fn coexpression_search_complete(
        &self,
        command: &CoexpressionSearchCommand,
        query_gene_ids: &[GeneId],
    ) -> Result<CoexpressionResult, BackendError>;

    /// Differential expression of the genes across the experiments.
    async fn differential_expression_search(
        &self,
        command: &DifferentialExpressionSearchCommand,
    ) -> Result<DiffExResult, BackendError>;
}

/// Chooses the experimental factor to compare for each experiment.
pub trait FactorChooser: Send + Sync {
    /// Open the chooser.
    ///
    /// The receiver resolves once with the chosen factors. Dropping the
    /// sender without sending cancels the search.
    fn choose(&self, experiment_ids: &[ExperimentId]) -> oneshot::Receiver<FactorMap>;
}

/// Factor chooser answering from a fixed map.
///
/// Experiments missing from the map are left out; if none remain the search
/// is cancelled.
#[derive(Debug, Clone, Default)]
pub struct StaticFactors {
    factors: FactorMap,
}

impl StaticFactors {
    /// Create a chooser over known factors.
    #[must_use]
    pub fn new(factors: FactorMap) -> Self {
        Self { factors }
    }
}

impl FactorChooser for StaticFactors {
    fn choose(&self, experiment_ids: &[ExperimentId]) -> oneshot::Receiver<FactorMap> {
        let (tx, rx) = oneshot::channel();
        let chosen: FactorMap = experiment_ids
            .iter()
            .filter_map(|ee| self.factors.get(ee).map(|factor| (*ee, *factor)))
            .collect();

        if chosen.is_empty() {
            tracing::warn!("No factor chosen for any of {} experiments", experiment_ids.len());
        } else {
            // The receiver is still held by the caller.
            let _ = tx.send(chosen);
        }
        rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coexnet_core::FactorId;

    #[test]
    fn server_body_is_the_user_message() {
        let error = BackendError::ServerError(500, "Gene list too long".into());
        assert_eq!(error.user_message(), "Gene list too long");
        assert_eq!(
            BackendError::ServerError(502, String::new()).user_message(),
            "Server error (502): "
        );
    }

    #[tokio::test]
    async fn static_factors_resolve_once() {
        let chooser = StaticFactors::new(FactorMap::from([(ExperimentId(1), FactorId(9))]));
        let chosen = chooser
            .choose(&[ExperimentId(1), ExperimentId(2)])
            .await
            .expect("chosen");
        assert_eq!(chosen.len(), 1);
    }

    #[tokio::test]
    async fn static_factors_cancel_when_nothing_matches() {
        let chooser = StaticFactors::default();
        assert!(chooser.choose(&[ExperimentId(1)]).await.is_err());
    }
}
