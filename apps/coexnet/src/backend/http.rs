//! # HTTP Backend
//!
//! `CoexpressionBackend` over the coexpression service's REST API.
//!
//! | Operation | Endpoint |
//! |-----------|----------|
//! | register gene sets | `POST /session-groups/genes` |
//! | register experiment sets | `POST /session-groups/experiments` |
//! | coexpression search | `POST /coexpression/search` |
//! | complete search | `POST /coexpression/search-complete` |
//! | differential expression | `POST /differential-expression/search` |

use super::{BackendError, CoexpressionBackend, DiffExResult};
use async_trait::async_trait;
use coexnet_core::{
    CoexpressionResult, CoexpressionSearchCommand, DifferentialExpressionSearchCommand,
    EntityKind, GeneId, Selection,
};
use serde::de::DeserializeOwned;
use serde_json::json;

/// HTTP client for the coexpression service.
#[derive(Clone)]
pub struct HttpBackend {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl std::fmt::Debug for HttpBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpBackend")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl HttpBackend {
    /// Create a client pointing at the given service URL.
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    /// Build a request with optional Bearer auth.
    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let mut req = self.http.request(method, &url);
        if let Some(ref key) = self.api_key {
            req = req.bearer_auth(key);
        }
        req
    }

    /// Send a request and handle connection errors.
    async fn send(&self, req: reqwest::RequestBuilder) -> Result<reqwest::Response, BackendError> {
        req.send()
            .await
            .map_err(|e| BackendError::ConnectionFailed(format!("{}: {e}", self.base_url)))
    }

    /// Handle HTTP response: check status codes and parse JSON.
    async fn handle_response<T: DeserializeOwned>(
        &self,
        resp: reqwest::Response,
    ) -> Result<T, BackendError> {
        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(BackendError::Unauthorized);
        }
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(BackendError::RateLimited);
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(BackendError::ServerError(status.as_u16(), body));
        }
        resp.json::<T>()
            .await
            .map_err(|e| BackendError::ParseError(e.to_string()))
    }

    async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<T, BackendError> {
        let req = self.request(reqwest::Method::POST, path).json(body);
        let resp = self.send(req).await?;
        self.handle_response(resp).await
    }
}

fn session_group_path(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Gene => "/session-groups/genes",
        EntityKind::Experiment => "/session-groups/experiments",
    }
}

#[async_trait]
impl CoexpressionBackend for HttpBackend {
    async fn register_session_groups(
        &self,
        kind: EntityKind,
        selections: &[Selection],
        modification_based: bool,
    ) -> Result<Vec<Selection>, BackendError> {
        let body = json!({
            "selections": selections,
            "modificationBased": modification_based,
        });
        self.post(session_group_path(kind), &body).await
    }

    async fn coexpression_search(
        &self,
        command: &CoexpressionSearchCommand,
    ) -> Result<CoexpressionResult, BackendError> {
        let body = serde_json::to_value(command)
            .map_err(|e| BackendError::ParseError(e.to_string()))?;
        self.post("/coexpression/search", &body).await
    }

    async fn coexpression_search_complete(
        &self,
        command: &CoexpressionSearchCommand,
        query_gene_ids: &[GeneId],
    ) -> Result<CoexpressionResult, BackendError> {
        let body = json!({
            "command": command,
            "queryGeneIds": query_gene_ids,
        });
        self.post("/coexpression/search-complete", &body).await
    }

    async fn differential_expression_search(
        &self,
        command: &DifferentialExpressionSearchCommand,
    ) -> Result<DiffExResult, BackendError> {
        let body = serde_json::to_value(command)
            .map_err(|e| BackendError::ParseError(e.to_string()))?;
        self.post("/differential-expression/search", &body).await
    }
}
