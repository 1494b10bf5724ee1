//! # Search Orchestrator
//!
//! Drives the core pipeline against a backend:
//!
//! ```text
//! Idle → ValidatingSelections → RegisteringSessionGroups
//!      → CoexSearching                      → ResultsReady
//!      → ChoosingFactors → DiffExSearching  → ResultsReady
//! ```
//!
//! When both searches are requested they run as two lanes joined with
//! `tokio::join!` on the current task. Both lanes share one `SearchSession`
//! through a `RefCell`; no borrow is held across an await, and whichever lane
//! completes second reports results ready.
//!
//! Backend calls carry no timeout and no retry. Cancellation is only possible
//! before a call is issued. A failed extend or re-run keeps the graph it
//! started from and leaves the session in `Failed`.

use crate::backend::{BackendError, CoexpressionBackend, DiffExResult, FactorChooser};
use crate::config::LimitConfig;
use crate::prompt::UserPrompt;
use coexnet_core::primitives::DEFAULT_VIZ_MAX_QUERY_GENES;
use coexnet_core::registration::partition;
use coexnet_core::{
    CoexGraphBuilder, CoexnetError, CoexpressionLink, CoexpressionResult,
    CoexpressionSearchCommand, DifferentialExpressionSearchCommand, Dispatch, ExperimentId,
    Extension, ExtensionPlan, GeneId, GraphData, PassOutcome, Pick, RegistrationQueue,
    ResultSummary, SearchKind, SearchMode, SearchScope, SearchSession, SearchState, Selection,
    SelectionValidator, StateEvent, StringencyChange, TrimReport, ValidatedSelections, Validation,
};
use std::cell::RefCell;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

// =============================================================================
// REQUESTS & EVENTS
// =============================================================================

/// Which searches a request runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Coexpression,
    DifferentialExpression,
    DifferentialExpressionVisualization,
    /// Coexpression and classic differential expression together.
    Both,
}

impl RequestKind {
    /// Limits to validate against. Dual searches use the differential
    /// expression caps, which are the stricter of the two.
    fn validation_mode(self) -> SearchMode {
        match self {
            Self::Coexpression => SearchMode::Coexpression,
            Self::DifferentialExpression | Self::Both => SearchMode::DifferentialExpression,
            Self::DifferentialExpressionVisualization => {
                SearchMode::DifferentialExpressionVisualization
            }
        }
    }

    fn dispatch(self) -> Dispatch {
        match self {
            Self::Coexpression => Dispatch::Coexpression,
            Self::DifferentialExpression | Self::DifferentialExpressionVisualization => {
                Dispatch::DifferentialExpression
            }
            Self::Both => Dispatch::Both,
        }
    }
}

/// A search as the user asked for it.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub genes: Vec<Pick>,
    pub experiments: Vec<Pick>,
    pub kind: RequestKind,
    pub query_genes_only: bool,
}

/// Progress notifications, for a UI to render as they happen.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchEvent {
    StateChanged(SearchState),
    SelectionTrimmed(TrimReport),
    GraphReady {
        graph: GraphData,
        summary: ResultSummary,
    },
    DifferentialExpressionReady(DiffExResult),
    /// An extension found nothing new. The graph is unchanged.
    NoMoreResults,
    /// Every requested search has completed.
    ResultsReady,
}

/// Where a search ended up.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchReport {
    pub state: SearchState,
    pub trims: Vec<TrimReport>,
    pub graph: Option<GraphData>,
    pub summary: Option<ResultSummary>,
    pub diff_ex: Option<DiffExResult>,
    pub link: Option<CoexpressionLink>,
}

/// Outcome of a graph operation.
#[derive(Debug, Clone, PartialEq)]
pub enum GraphUpdate {
    Redrawn(GraphData),
    NoMoreResults,
    /// The user declined a confirmation. Nothing was sent.
    Cancelled,
}

// =============================================================================
// ORCHESTRATOR
// =============================================================================

/// Runs searches for one user session.
pub struct SearchOrchestrator {
    backend: Arc<dyn CoexpressionBackend>,
    factors: Arc<dyn FactorChooser>,
    prompt: Arc<dyn UserPrompt>,
    validator: SelectionValidator,
    viz_max_query_genes: usize,
    session: SearchSession,
    events: Option<mpsc::UnboundedSender<SearchEvent>>,
}

impl std::fmt::Debug for SearchOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchOrchestrator")
            .field("state", self.session.state())
            .field("validator", &self.validator)
            .field("viz_max_query_genes", &self.viz_max_query_genes)
            .finish()
    }
}

impl SearchOrchestrator {
    /// Create an orchestrator with default limits.
    pub fn new(
        backend: Arc<dyn CoexpressionBackend>,
        factors: Arc<dyn FactorChooser>,
        prompt: Arc<dyn UserPrompt>,
    ) -> Self {
        Self {
            backend,
            factors,
            prompt,
            validator: SelectionValidator::default(),
            viz_max_query_genes: DEFAULT_VIZ_MAX_QUERY_GENES,
            session: SearchSession::new(),
            events: None,
        }
    }

    /// Use configured selection caps.
    #[must_use]
    pub fn with_limits(mut self, limits: &LimitConfig) -> Self {
        self.validator = SelectionValidator::new(limits.selection_limits());
        self.viz_max_query_genes = limits.viz_max_query_genes;
        self
    }

    /// Send progress events to `events`.
    #[must_use]
    pub fn with_events(mut self, events: mpsc::UnboundedSender<SearchEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// The session state.
    pub fn session(&self) -> &SearchSession {
        &self.session
    }

    /// The coexpression graph.
    pub fn graph(&self) -> &CoexGraphBuilder {
        self.session.graph()
    }

    /// Bookmarkable link of the current coexpression query.
    pub fn link(&self) -> Option<CoexpressionLink> {
        self.session.graph().command().map(CoexpressionLink::from_command)
    }

    /// Choose between growing the graph from query genes and showing every edge.
    pub fn set_restrict_to_query(&mut self, restrict: bool) {
        self.session.graph_mut().set_restrict_to_query(restrict);
    }

    // -------------------------------------------------------------------------
    // Search
    // -------------------------------------------------------------------------

    /// Run a search from scratch.
    ///
    /// A cancelled search returns `Ok` with the `Cancelled` state. Failures
    /// leave the session in `Failed` and return the error.
    pub async fn go(&mut self, request: SearchRequest) -> Result<SearchReport, CoexnetError> {
        self.session.go()?;
        self.emit_state();

        let genes: Vec<Selection> = request.genes.into_iter().map(Pick::into_selection).collect();
        let experiments: Vec<Selection> = request
            .experiments
            .into_iter()
            .map(Pick::into_selection)
            .collect();

        let validated = match self.validate(genes, experiments, request.kind) {
            Ok(validated) => validated,
            Err(CoexnetError::Cancelled) => {
                info!("Search cancelled before registration");
                self.session.apply(&StateEvent::Cancel)?;
                self.emit_state();
                return Ok(self.report(Vec::new(), None, None));
            }
            Err(e) => return Err(self.fail(e)),
        };
        for trim in &validated.trims {
            warn!(
                "Trimmed {} selection from {} to {} (maximum {})",
                trim.kind, trim.before, trim.after, trim.max
            );
            self.emit(SearchEvent::SelectionTrimmed(trim.clone()));
        }
        let trims = validated.trims.clone();

        self.session.apply(&StateEvent::SelectionsAccepted)?;
        self.emit_state();

        let scope = match self.register(validated).await {
            Ok((genes, experiments)) => SearchScope::from_selections(&genes, &experiments),
            Err(e) => Err(e),
        };
        let scope = match scope {
            Ok(scope) => scope,
            Err(e) => return Err(self.fail(e)),
        };

        let dispatch = request.kind.dispatch();
        self.session.dispatch(dispatch)?;
        self.emit_state();

        let kinds = dispatch.kinds();
        let coex_command = kinds
            .contains(&SearchKind::Coexpression)
            .then(|| CoexpressionSearchCommand::planned(scope.clone(), request.query_genes_only));
        let diff_ex_scope = kinds.contains(&SearchKind::DifferentialExpression).then(|| {
            (
                scope,
                request.kind == RequestKind::DifferentialExpressionVisualization,
            )
        });

        let session = RefCell::new(std::mem::take(&mut self.session));
        let (coex, diff_ex) = {
            let this = &*self;
            tokio::join!(
                this.coex_lane(&session, coex_command),
                this.diff_ex_lane(&session, diff_ex_scope),
            )
        };
        self.session = session.into_inner();

        let summary = coex?;
        let diff_ex = diff_ex?;
        Ok(self.report(trims, summary, diff_ex))
    }

    fn validate(
        &self,
        genes: Vec<Selection>,
        experiments: Vec<Selection>,
        kind: RequestKind,
    ) -> Result<ValidatedSelections, CoexnetError> {
        match self
            .validator
            .validate(genes, experiments, kind.validation_mode())?
        {
            Validation::Proceed(validated) => Ok(validated),
            Validation::PromptTrim(prompt) => {
                let answer = self.prompt.trim(&prompt);
                prompt.resolve(answer)
            }
        }
    }

    /// Register ephemeral selections until every one is durable.
    async fn register(
        &self,
        validated: ValidatedSelections,
    ) -> Result<(Vec<Selection>, Vec<Selection>), CoexnetError> {
        let (durable_genes, ephemeral_genes) = partition(&validated.genes);
        let (durable_experiments, ephemeral_experiments) = partition(&validated.experiments);
        debug!(
            durable_genes = durable_genes.len(),
            ephemeral_genes = ephemeral_genes.len(),
            durable_experiments = durable_experiments.len(),
            ephemeral_experiments = ephemeral_experiments.len(),
            "Selections to register"
        );

        let mut queue = RegistrationQueue::new(validated.genes, validated.experiments);
        while let Some(batch) = queue.next_batch()? {
            info!(
                kind = %batch.kind,
                count = batch.selections.len(),
                modification_based = batch.modification_based,
                "Registering session groups"
            );
            let registered = self
                .backend
                .register_session_groups(batch.kind, &batch.selections, batch.modification_based)
                .await
                .map_err(|e| CoexnetError::RegistrationFailed(e.user_message()))?;
            queue.complete(batch, registered)?;
        }
        debug!(rounds = queue.rounds(), "Registration complete");
        queue.into_selections()
    }

    // -------------------------------------------------------------------------
    // Lanes
    // -------------------------------------------------------------------------

    async fn coex_lane(
        &self,
        session: &RefCell<SearchSession>,
        command: Option<CoexpressionSearchCommand>,
    ) -> Result<Option<ResultSummary>, CoexnetError> {
        let Some(command) = command else {
            return Ok(None);
        };
        session.borrow_mut().graph_mut().begin(command.clone());

        let outcome = match self.fresh_query(session, &command).await {
            Ok(summary) => self
                .complete_lane(session, SearchKind::Coexpression)
                .map(|()| Some(summary)),
            Err(e) => Err(e),
        };
        outcome.map_err(|e| self.fail_in(session, e))
    }

    async fn diff_ex_lane(
        &self,
        session: &RefCell<SearchSession>,
        scope: Option<(SearchScope, bool)>,
    ) -> Result<Option<DiffExResult>, CoexnetError> {
        let Some((scope, visualization)) = scope else {
            return Ok(None);
        };
        self.run_diff_ex(session, scope, visualization)
            .await
            .map_err(|e| self.fail_in(session, e))
    }

    async fn run_diff_ex(
        &self,
        session: &RefCell<SearchSession>,
        scope: SearchScope,
        visualization: bool,
    ) -> Result<Option<DiffExResult>, CoexnetError> {
        let experiment_ids: Vec<ExperimentId> = scope.experiment_ids.iter().copied().collect();
        info!(experiments = experiment_ids.len(), "Choosing factors");

        let Ok(factor_map) = self.factors.choose(&experiment_ids).await else {
            let mut session = session.borrow_mut();
            if !session.state().is_terminal() {
                info!("Factor choice cancelled");
                let ready = session.decline_factors()?;
                self.emit(SearchEvent::StateChanged(session.state().clone()));
                if ready {
                    info!("Results ready");
                    self.emit(SearchEvent::ResultsReady);
                }
            }
            return Ok(None);
        };

        {
            let mut session = session.borrow_mut();
            if session.state().is_terminal() {
                debug!(state = %session.state(), "Skipping differential expression search");
                return Ok(None);
            }
            session.apply(&StateEvent::FactorsChosen)?;
            self.emit(SearchEvent::StateChanged(session.state().clone()));
        }

        let command = DifferentialExpressionSearchCommand {
            scope,
            factor_map,
            visualization,
        };
        info!(
            genes = command.scope.gene_ids.len(),
            experiments = command.scope.experiment_ids.len(),
            visualization,
            "Differential expression search"
        );
        let result = self
            .backend
            .differential_expression_search(&command)
            .await
            .map_err(search_failed)?;

        self.emit(SearchEvent::DifferentialExpressionReady(result.clone()));
        self.complete_lane(session, SearchKind::DifferentialExpression)?;
        Ok(Some(result))
    }

    /// First pass, then the complete search over every node when needed.
    async fn fresh_query(
        &self,
        session: &RefCell<SearchSession>,
        command: &CoexpressionSearchCommand,
    ) -> Result<ResultSummary, CoexnetError> {
        info!(
            genes = command.scope.gene_ids.len(),
            experiments = command.scope.experiment_ids.len(),
            stringency = command.stringency,
            query_genes_only = command.query_genes_only,
            "Coexpression search"
        );
        let first = self.search(command).await?;
        let summary = ResultSummary::of(&first, command.stringency);
        if first.known_gene_results.is_empty() {
            warn!("{}", summary);
        }

        let outcome = session.borrow_mut().graph_mut().accept_first_pass(first)?;
        let stats = match outcome {
            PassOutcome::Merged(stats) => stats,
            PassOutcome::NeedsComplete { command, gene_ids } => {
                let complete = self.search_complete(&command, &gene_ids).await?;
                session.borrow_mut().graph_mut().accept_complete(complete)?
            }
            PassOutcome::NoMoreResults => return Ok(summary),
        };
        debug!(
            admitted = stats.admitted,
            duplicates = stats.duplicates,
            edges = stats.total_edges,
            nodes = stats.total_nodes,
            "Merged coexpression edges"
        );

        info!("{}", summary);
        let graph = session.borrow().graph().graph();
        self.emit(SearchEvent::GraphReady { graph, summary });
        Ok(summary)
    }

    /// Mark a lane done. Completions after the search ended are ignored.
    fn complete_lane(
        &self,
        session: &RefCell<SearchSession>,
        kind: SearchKind,
    ) -> Result<(), CoexnetError> {
        let mut session = session.borrow_mut();
        if session.state().is_terminal() {
            debug!(state = %session.state(), "{:?} completed after the search ended", kind);
            return Ok(());
        }
        let last = session.complete(kind)?;
        self.emit(SearchEvent::StateChanged(session.state().clone()));
        if last {
            info!("Results ready");
            self.emit(SearchEvent::ResultsReady);
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Graph operations
    // -------------------------------------------------------------------------

    /// Add selected nodes to the query genes and search from them.
    pub async fn extend(&mut self, selected: &[GeneId]) -> Result<GraphUpdate, CoexnetError> {
        let plan = self
            .session
            .graph()
            .plan_extension(selected, self.viz_max_query_genes)?;
        let extension = match plan {
            ExtensionPlan::Fits(extension) => extension,
            ExtensionPlan::Overflow(extension) => {
                if !self.prompt.confirm_eviction(&extension) {
                    return Ok(GraphUpdate::Cancelled);
                }
                extension
            }
        };
        let previous = self.session.graph().clone();
        match self.run_extension(&extension).await {
            Ok(update) => Ok(update),
            Err(e) => Err(self.restore(previous, e)),
        }
    }

    async fn run_extension(&mut self, extension: &Extension) -> Result<GraphUpdate, CoexnetError> {
        self.session.graph_mut().apply_extension(extension)?;
        info!(
            added = extension.added.len(),
            evicted = extension.evicted.len(),
            "Extending graph"
        );

        let result = self.search(&extension.command).await?;
        let summary = ResultSummary::of(&result, extension.command.stringency);
        let stats = match self.session.graph_mut().accept_extension(result)? {
            PassOutcome::NoMoreResults => {
                info!("No more results");
                self.emit(SearchEvent::NoMoreResults);
                return Ok(GraphUpdate::NoMoreResults);
            }
            PassOutcome::Merged(stats) => stats,
            PassOutcome::NeedsComplete { command, gene_ids } => {
                let complete = self.search_complete(&command, &gene_ids).await?;
                self.session.graph_mut().accept_complete(complete)?
            }
        };
        debug!(
            admitted = stats.admitted,
            duplicates = stats.duplicates,
            "Merged extension edges"
        );

        let graph = self.session.graph().graph();
        self.emit(SearchEvent::GraphReady {
            graph: graph.clone(),
            summary,
        });
        Ok(GraphUpdate::Redrawn(graph))
    }

    /// Replace the query genes with the selected nodes and search again.
    pub async fn rerun(&mut self, selected: &[GeneId]) -> Result<GraphUpdate, CoexnetError> {
        let max = self.viz_max_query_genes;
        let plan = self.session.graph().plan_rerun(selected, max)?;
        let confirmed = plan.over_cap && self.prompt.confirm_rerun_over_cap(plan.gene_ids.len(), max);
        let command = match self.session.graph().rerun_command(&plan, confirmed) {
            Ok(command) => command,
            Err(CoexnetError::Cancelled) => return Ok(GraphUpdate::Cancelled),
            Err(e) => return Err(e),
        };
        self.requery(command).await
    }

    /// Filter the graph at a new display stringency.
    ///
    /// Going below what the server returned asks for confirmation and
    /// searches again.
    pub async fn set_display_stringency(
        &mut self,
        display_stringency: u32,
    ) -> Result<GraphUpdate, CoexnetError> {
        match self
            .session
            .graph_mut()
            .set_display_stringency(display_stringency)?
        {
            StringencyChange::Filtered => Ok(GraphUpdate::Redrawn(self.session.graph().graph())),
            StringencyChange::RequiresSearch(command) => {
                let results_stringency = self.session.graph().results_stringency();
                if !self
                    .prompt
                    .confirm_lower_stringency(results_stringency, display_stringency)
                {
                    return Ok(GraphUpdate::Cancelled);
                }
                self.requery(command).await
            }
        }
    }

    async fn requery(
        &mut self,
        command: CoexpressionSearchCommand,
    ) -> Result<GraphUpdate, CoexnetError> {
        let previous = self.session.graph().clone();
        let session = RefCell::new(std::mem::take(&mut self.session));
        session.borrow_mut().graph_mut().begin(command.clone());
        let result = self.fresh_query(&session, &command).await;
        self.session = session.into_inner();
        match result {
            Ok(_) => Ok(GraphUpdate::Redrawn(self.session.graph().graph())),
            Err(e) => Err(self.restore(previous, e)),
        }
    }

    // -------------------------------------------------------------------------
    // Backend calls
    // -------------------------------------------------------------------------

    async fn search(
        &self,
        command: &CoexpressionSearchCommand,
    ) -> Result<CoexpressionResult, CoexnetError> {
        let result = self
            .backend
            .coexpression_search(command)
            .await
            .map_err(search_failed)?;
        checked(result)
    }

    async fn search_complete(
        &self,
        command: &CoexpressionSearchCommand,
        gene_ids: &[GeneId],
    ) -> Result<CoexpressionResult, CoexnetError> {
        info!(nodes = gene_ids.len(), "Complete coexpression search");
        let result = self
            .backend
            .coexpression_search_complete(command, gene_ids)
            .await
            .map_err(search_failed)?;
        checked(result)
    }

    // -------------------------------------------------------------------------
    // Reporting
    // -------------------------------------------------------------------------

    fn report(
        &self,
        trims: Vec<TrimReport>,
        summary: Option<ResultSummary>,
        diff_ex: Option<DiffExResult>,
    ) -> SearchReport {
        SearchReport {
            state: self.session.state().clone(),
            trims,
            graph: summary.map(|_| self.session.graph().graph()),
            summary,
            diff_ex,
            link: summary.and_then(|_| self.link()),
        }
    }

    /// Put back the graph a failed graph operation started from.
    fn restore(&mut self, previous: CoexGraphBuilder, error: CoexnetError) -> CoexnetError {
        *self.session.graph_mut() = previous;
        warn!("Kept the previous graph after a failed search");
        self.fail(error)
    }

    fn fail(&mut self, error: CoexnetError) -> CoexnetError {
        let state = self.session.fail(&error).clone();
        error!("Search failed: {}", error);
        self.emit(SearchEvent::StateChanged(state));
        error
    }

    fn fail_in(&self, session: &RefCell<SearchSession>, error: CoexnetError) -> CoexnetError {
        let state = session.borrow_mut().fail(&error).clone();
        error!("Search failed: {}", error);
        self.emit(SearchEvent::StateChanged(state));
        error
    }

    fn emit_state(&self) {
        let state = self.session.state().clone();
        info!(state = %state, "Search state");
        self.emit(SearchEvent::StateChanged(state));
    }

    fn emit(&self, event: SearchEvent) {
        if let Some(events) = &self.events {
            // A closed receiver means nobody is listening any more.
            let _ = events.send(event);
        }
    }
}

fn search_failed(error: BackendError) -> CoexnetError {
    CoexnetError::SearchFailed(error.user_message())
}

/// Turn a server-reported error state into `SearchFailed`.
fn checked(result: CoexpressionResult) -> Result<CoexpressionResult, CoexnetError> {
    if let Some(message) = result
        .error_state
        .as_deref()
        .filter(|message| !message.trim().is_empty())
    {
        return Err(CoexnetError::SearchFailed(message.to_string()));
    }
    Ok(result)
}

// =============================================================================
// TESTS
// =============================================================================
