//! # Pipeline Scenarios
//!
//! End-to-end walks through the core pipeline with hand-written backend
//! answers.

use coexnet_core::{
    CoexGraphBuilder, CoexnetError, CoexpressionEdge, CoexpressionLink, CoexpressionResult,
    CoexpressionSearchCommand, EntityKind, ExtensionPlan, GeneId, GeneRef, PassOutcome, Pick,
    RegistrationQueue, SearchMode, SearchScope, Selection, SelectionValidator, SetId,
    StringencyPlan, TaxonId, Validation,
};

fn edge(a: u64, b: u64, support: u32) -> CoexpressionEdge {
    CoexpressionEdge {
        query_gene: GeneRef::new(a, format!("G{a}")),
        found_gene: GeneRef::new(b, format!("G{b}")),
        positive_support: support,
        negative_support: 0,
        num_tested_in: support,
    }
}

fn answer(query: &[u64], edges: Vec<CoexpressionEdge>) -> CoexpressionResult {
    CoexpressionResult {
        query_genes: query.iter().map(|g| GeneRef::new(*g, format!("G{g}"))).collect(),
        known_gene_results: edges,
        ..CoexpressionResult::default()
    }
}

fn register_all(mut queue: RegistrationQueue) -> (Vec<Selection>, Vec<Selection>) {
    let mut next_id = 500;
    while let Some(batch) = queue.next_batch().expect("batch") {
        let registered = batch
            .selections
            .iter()
            .map(|s| {
                next_id += 1;
                Selection {
                    id: SetId::Durable(next_id),
                    ..s.clone()
                }
            })
            .collect();
        queue.complete(batch, registered).expect("complete");
    }
    queue.into_selections().expect("durable")
}

// =============================================================================
// SCENARIOS
// =============================================================================

#[test]
fn coexpression_over_cap_is_trimmed_without_prompt() {
    let genes = vec![Selection::ephemeral(
        EntityKind::Gene,
        "many",
        TaxonId(1),
        (1..=25).collect(),
    )];
    let experiments = vec![Selection::ephemeral(
        EntityKind::Experiment,
        "few",
        TaxonId(1),
        (1..=5).collect(),
    )];

    let validation = SelectionValidator::default()
        .validate(genes, experiments, SearchMode::Coexpression)
        .expect("validate");
    let Validation::Proceed(validated) = validation else {
        unreachable!("coexpression trims without asking");
    };

    let (genes, experiments) = register_all(RegistrationQueue::new(
        validated.genes,
        validated.experiments,
    ));
    let scope = SearchScope::from_selections(&genes, &experiments).expect("scope");
    let command = CoexpressionSearchCommand::planned(scope, false);

    let ids: Vec<u64> = command.scope.gene_ids.iter().map(|g| g.0).collect();
    assert_eq!(ids, (1..=20).collect::<Vec<_>>());
}

#[test]
fn stringency_for_150_datasets() {
    let plan = StringencyPlan::for_datasets(150);
    assert_eq!((plan.display_stringency, plan.stringency), (5, 5));
}

#[test]
fn stringency_for_400_datasets() {
    let plan = StringencyPlan::for_datasets(400);
    assert_eq!((plan.display_stringency, plan.stringency), (10, 7));
}

#[test]
fn both_directions_render_one_edge() {
    let scope = SearchScope {
        gene_ids: [GeneId(1), GeneId(2)].into(),
        experiment_ids: Default::default(),
        gene_set_ids: Vec::new(),
        experiment_set_ids: Vec::new(),
        taxon_id: TaxonId(1),
    };
    let mut builder = CoexGraphBuilder::new();
    builder.begin(CoexpressionSearchCommand::planned(scope, false));

    let outcome = builder
        .accept_first_pass(answer(&[1, 2], vec![edge(1, 2, 5)]))
        .expect("first pass");
    assert!(matches!(outcome, PassOutcome::NeedsComplete { .. }));
    builder
        .accept_complete(answer(&[], vec![edge(2, 1, 5)]))
        .expect("complete");

    let graph = builder.graph();
    assert_eq!(graph.edges.len(), 1);
    assert_eq!(graph.edges[0].id, "1-2");
}

#[test]
fn extending_into_known_nodes_reports_no_more_results() {
    let scope = SearchScope {
        gene_ids: [GeneId(1)].into(),
        experiment_ids: Default::default(),
        gene_set_ids: Vec::new(),
        experiment_set_ids: Vec::new(),
        taxon_id: TaxonId(1),
    };
    let mut builder = CoexGraphBuilder::new();
    builder.begin(CoexpressionSearchCommand::planned(scope, false));
    builder
        .accept_first_pass(answer(&[1], vec![edge(1, 2, 5), edge(1, 3, 5)]))
        .expect("first pass");
    builder
        .accept_complete(answer(&[], vec![edge(2, 3, 5)]))
        .expect("complete");

    let plan = builder
        .plan_extension(&[GeneId(2), GeneId(3)], 20)
        .expect("plan");
    let ExtensionPlan::Fits(extension) = plan else {
        unreachable!("well under the cap");
    };
    builder.apply_extension(&extension).expect("apply");

    let outcome = builder
        .accept_extension(answer(&[2, 3], vec![edge(2, 1, 5), edge(3, 2, 5)]))
        .expect("extension");
    assert_eq!(outcome, PassOutcome::NoMoreResults);
    assert_eq!(builder.known_edges().len(), 3);
}

#[test]
fn single_pick_becomes_one_member_set() {
    let pick = Pick::Single {
        kind: EntityKind::Gene,
        id: 7157,
        name: "TP53".into(),
        description: "tumor protein p53".into(),
        taxon_id: TaxonId(1),
    };
    let selection = pick.into_selection();
    assert_eq!(selection.member_ids, vec![7157]);
    assert_eq!(selection.name, "TP53");
    assert!(!selection.is_durable());
}

#[test]
fn link_replays_command() {
    let genes = vec![Selection::durable(EntityKind::Gene, 1, "g", TaxonId(9), vec![3, 4])];
    let experiments = vec![Selection::durable(
        EntityKind::Experiment,
        2,
        "e",
        TaxonId(9),
        vec![10, 11],
    )];
    let scope = SearchScope::from_selections(&genes, &experiments).expect("scope");
    let command = CoexpressionSearchCommand::planned(scope, true);

    let link = CoexpressionLink::from_command(&command);
    assert_eq!(link.to_string(), "?g=3,4&s=2&t=9&ees=10,11&q");
    assert_eq!(CoexpressionLink::parse(&link.to_string()), Ok(link));
}

#[test]
fn empty_selection_blocks_before_registration() {
    let result = SelectionValidator::default().validate(
        Vec::new(),
        Vec::new(),
        SearchMode::DifferentialExpression,
    );
    assert_eq!(result, Err(CoexnetError::EmptySelection));
}
