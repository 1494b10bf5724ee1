//! # Session Group Registration
//!
//! Search commands reference sets by durable id, so every ephemeral selection
//! must be registered with the backend first. This module is the work-queue
//! that decides what to register next; the app performs the remote call and
//! feeds the answer back.
//!
//! ## Protocol
//!
//! Each pass checks gene selections before experiment selections. A pass that
//! finds ephemeral selections of a kind yields one batch for them; once the
//! batch is answered the pass restarts from genes. The queue is done when a
//! pass finds nothing ephemeral. This bounds the work to
//! `MAX_REGISTRATION_ROUNDS` round trips: one for genes, one for experiments.
//!
//! Answers replace the ephemeral selections position by position. A selection
//! is never submitted twice: after replacement it is durable.

use crate::primitives::MAX_REGISTRATION_ROUNDS;
use crate::{CoexnetError, EntityKind, Selection};

/// One registration request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationBatch {
    /// Which list the selections belong to.
    pub kind: EntityKind,
    /// The ephemeral selections to register, in list order.
    pub selections: Vec<Selection>,
    /// True if any of the selections was edited or trimmed.
    pub modification_based: bool,
    positions: Vec<usize>,
}

/// Split selections into (durable, ephemeral) by reference, keeping order.
#[must_use]
pub fn partition(selections: &[Selection]) -> (Vec<&Selection>, Vec<&Selection>) {
    selections.iter().partition(|selection| selection.is_durable())
}

/// Work-queue of selections still needing registration.
#[derive(Debug, Clone)]
pub struct RegistrationQueue {
    genes: Vec<Selection>,
    experiments: Vec<Selection>,
    rounds: usize,
    in_flight: bool,
}

impl RegistrationQueue {
    /// Create a queue over validated selections.
    #[must_use]
    pub fn new(genes: Vec<Selection>, experiments: Vec<Selection>) -> Self {
        Self {
            genes,
            experiments,
            rounds: 0,
            in_flight: false,
        }
    }

    /// Number of batches handed out so far.
    #[must_use]
    pub fn rounds(&self) -> usize {
        self.rounds
    }

    /// Check whether every selection is durable.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.genes.iter().chain(&self.experiments).all(Selection::is_durable)
    }

    /// The next batch to register, or `None` when every selection is durable.
    ///
    /// Only one batch may be outstanding at a time.
    pub fn next_batch(&mut self) -> Result<Option<RegistrationBatch>, CoexnetError> {
        if self.in_flight {
            return Err(CoexnetError::InvalidTransition {
                from: "registration in flight".into(),
                event: "next_batch".into(),
            });
        }

        let (kind, list) = if self.genes.iter().any(|s| !s.is_durable()) {
            (EntityKind::Gene, &self.genes)
        } else if self.experiments.iter().any(|s| !s.is_durable()) {
            (EntityKind::Experiment, &self.experiments)
        } else {
            return Ok(None);
        };

        if self.rounds >= MAX_REGISTRATION_ROUNDS {
            return Err(CoexnetError::RegistrationFailed(format!(
                "{kind} sets still unregistered after {} rounds",
                self.rounds
            )));
        }

        let (positions, selections): (Vec<usize>, Vec<Selection>) = list
            .iter()
            .enumerate()
            .filter(|(_, selection)| !selection.is_durable())
            .map(|(i, selection)| (i, selection.clone()))
            .unzip();
        let modification_based = selections.iter().any(|s| s.modified);

        self.rounds += 1;
        self.in_flight = true;
        Ok(Some(RegistrationBatch {
            kind,
            selections,
            modification_based,
            positions,
        }))
    }

    /// Feed back the backend's answer for a batch.
    ///
    /// Fails with `RegistrationFailed` if the answer is empty, has the wrong
    /// length, or still contains ephemeral selections. On failure the queue
    /// keeps no partial state from the answer.
    pub fn complete(
        &mut self,
        batch: RegistrationBatch,
        registered: Vec<Selection>,
    ) -> Result<(), CoexnetError> {
        self.in_flight = false;

        if registered.is_empty() {
            return Err(CoexnetError::RegistrationFailed(format!(
                "no {} sets returned",
                batch.kind
            )));
        }
        if registered.len() != batch.positions.len() {
            return Err(CoexnetError::RegistrationFailed(format!(
                "expected {} {} sets, got {}",
                batch.positions.len(),
                batch.kind,
                registered.len()
            )));
        }
        if let Some(unregistered) = registered.iter().find(|s| !s.is_durable()) {
            return Err(CoexnetError::RegistrationFailed(format!(
                "'{}' came back without an id",
                unregistered.name
            )));
        }

        let list = match batch.kind {
            EntityKind::Gene => &mut self.genes,
            EntityKind::Experiment => &mut self.experiments,
        };
        for (position, selection) in batch.positions.into_iter().zip(registered) {
            list[position] = selection;
        }
        Ok(())
    }

    /// The selections, all durable.
    pub fn into_selections(self) -> Result<(Vec<Selection>, Vec<Selection>), CoexnetError> {
        if let Some(ephemeral) = self
            .genes
            .iter()
            .chain(&self.experiments)
            .find(|s| !s.is_durable())
        {
            return Err(CoexnetError::Unregistered(ephemeral.name.clone()));
        }
        Ok((self.genes, self.experiments))
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{SetId, TaxonId};

    fn ephemeral(kind: EntityKind, name: &str) -> Selection {
        Selection::ephemeral(kind, name, TaxonId(1), vec![1, 2])
    }

    fn register(batch: &RegistrationBatch, first_id: i64) -> Vec<Selection> {
        batch
            .selections
            .iter()
            .enumerate()
            .map(|(i, s)| Selection {
                id: SetId::Durable(first_id + i as i64),
                ..s.clone()
            })
            .collect()
    }

    #[test]
    fn durable_only_needs_no_rounds() {
        let mut queue = RegistrationQueue::new(
            vec![Selection::durable(EntityKind::Gene, 1, "g", TaxonId(1), vec![1])],
            vec![Selection::durable(EntityKind::Experiment, 2, "e", TaxonId(1), vec![1])],
        );
        assert_eq!(queue.next_batch().expect("batch"), None);
        assert_eq!(queue.rounds(), 0);
    }

    #[test]
    fn genes_register_before_experiments() {
        let mut queue = RegistrationQueue::new(
            vec![
                Selection::durable(EntityKind::Gene, 1, "known", TaxonId(1), vec![9]),
                ephemeral(EntityKind::Gene, "g"),
            ],
            vec![ephemeral(EntityKind::Experiment, "e")],
        );

        let batch = queue.next_batch().expect("batch").expect("genes pending");
        assert_eq!(batch.kind, EntityKind::Gene);
        assert_eq!(batch.selections.len(), 1);
        let answer = register(&batch, 100);
        queue.complete(batch, answer).expect("complete");

        let batch = queue.next_batch().expect("batch").expect("experiments pending");
        assert_eq!(batch.kind, EntityKind::Experiment);
        let answer = register(&batch, 200);
        queue.complete(batch, answer).expect("complete");

        assert_eq!(queue.next_batch().expect("batch"), None);
        assert_eq!(queue.rounds(), 2);

        let (genes, experiments) = queue.into_selections().expect("all durable");
        assert_eq!(genes[0].id, SetId::Durable(1));
        assert_eq!(genes[1].id, SetId::Durable(100));
        assert_eq!(experiments[0].id, SetId::Durable(200));
    }

    #[test]
    fn empty_answer_fails() {
        let mut queue =
            RegistrationQueue::new(vec![ephemeral(EntityKind::Gene, "g")], vec![]);
        let batch = queue.next_batch().expect("batch").expect("pending");
        let result = queue.complete(batch, vec![]);
        assert!(matches!(result, Err(CoexnetError::RegistrationFailed(_))));
    }

    #[test]
    fn answer_without_ids_fails() {
        let mut queue =
            RegistrationQueue::new(vec![ephemeral(EntityKind::Gene, "g")], vec![]);
        let batch = queue.next_batch().expect("batch").expect("pending");
        let echoed = batch.selections.clone();
        assert!(queue.complete(batch, echoed).is_err());
    }

    #[test]
    fn third_round_is_refused() {
        let mut queue =
            RegistrationQueue::new(vec![ephemeral(EntityKind::Gene, "g")], vec![]);
        for _ in 0..MAX_REGISTRATION_ROUNDS {
            let batch = queue.next_batch().expect("batch").expect("pending");
            // Keep something pending after every round.
            let answer = register(&batch, 1);
            queue.complete(batch, answer).expect("complete");
            queue.genes.push(ephemeral(EntityKind::Gene, "again"));
        }
        assert!(matches!(
            queue.next_batch(),
            Err(CoexnetError::RegistrationFailed(_))
        ));
    }

    #[test]
    fn batch_flags_modified_selections() {
        let mut trimmed = ephemeral(EntityKind::Gene, "Trimmed g");
        trimmed.modified = true;
        let mut queue = RegistrationQueue::new(vec![trimmed], vec![]);
        let batch = queue.next_batch().expect("batch").expect("pending");
        assert!(batch.modification_based);
    }

    #[test]
    fn only_one_batch_in_flight() {
        let mut queue = RegistrationQueue::new(
            vec![ephemeral(EntityKind::Gene, "g")],
            vec![ephemeral(EntityKind::Experiment, "e")],
        );
        let _batch = queue.next_batch().expect("batch");
        assert!(queue.next_batch().is_err());
    }

    #[test]
    fn partition_keeps_order() {
        let list = vec![
            ephemeral(EntityKind::Gene, "a"),
            Selection::durable(EntityKind::Gene, 4, "b", TaxonId(1), vec![1]),
            ephemeral(EntityKind::Gene, "c"),
        ];
        let (durable, pending) = partition(&list);
        assert_eq!(durable.len(), 1);
        assert_eq!(pending[0].name, "a");
        assert_eq!(pending[1].name, "c");
    }
}
