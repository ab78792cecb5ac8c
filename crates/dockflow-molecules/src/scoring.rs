//! Ranking of docking outcomes.

use serde::Serialize;
use std::cmp::Ordering;

use crate::docking::DockingOutcome;

/// Outcomes ordered for display and best-result selection.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RankedResultSet {
    /// At least one outcome carries a score. `succeeded` is sorted best
    /// (most negative) first; `failed` holds every unscored entry in input order.
    Ranked {
        succeeded: Vec<DockingOutcome>,
        failed: Vec<DockingOutcome>,
    },
    /// Nothing produced a score; the original list, untouched.
    AllFailed { outcomes: Vec<DockingOutcome> },
}

impl RankedResultSet {
    /// All entries in display order: ranked successes, then failures.
    pub fn entries(&self) -> impl Iterator<Item = &DockingOutcome> {
        let (head, tail): (&[DockingOutcome], &[DockingOutcome]) = match self {
            RankedResultSet::Ranked { succeeded, failed } => (succeeded.as_slice(), failed.as_slice()),
            RankedResultSet::AllFailed { outcomes } => (outcomes.as_slice(), &[][..]),
        };
        head.iter().chain(tail.iter())
    }

    pub fn best(&self) -> Option<&DockingOutcome> {
        match self {
            RankedResultSet::Ranked { succeeded, .. } => succeeded.first(),
            RankedResultSet::AllFailed { .. } => None,
        }
    }

    pub fn succeeded_count(&self) -> usize {
        match self {
            RankedResultSet::Ranked { succeeded, .. } => succeeded.len(),
            RankedResultSet::AllFailed { .. } => 0,
        }
    }

    pub fn failed_count(&self) -> usize {
        match self {
            RankedResultSet::Ranked { failed, .. } => failed.len(),
            RankedResultSet::AllFailed { outcomes } => outcomes.len(),
        }
    }

    pub fn len(&self) -> usize {
        self.succeeded_count() + self.failed_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_all_failed(&self) -> bool {
        matches!(self, RankedResultSet::AllFailed { .. })
    }

    pub fn summary(&self) -> String {
        format!("{} succeeded, {} failed", self.succeeded_count(), self.failed_count())
    }

    pub fn into_outcomes(self) -> Vec<DockingOutcome> {
        match self {
            RankedResultSet::Ranked { mut succeeded, failed } => {
                succeeded.extend(failed);
                succeeded
            }
            RankedResultSet::AllFailed { outcomes } => outcomes,
        }
    }
}

/// Orders outcomes ascending by score with a stable sort, so equal scores
/// keep their input order.
#[derive(Debug, Clone, Default)]
pub struct ResultRanker {}

impl ResultRanker {
    pub fn new() -> Self {
        Self {}
    }

    pub fn rank(&self, outcomes: Vec<DockingOutcome>) -> RankedResultSet {
        if outcomes.iter().all(|o| o.score().is_none()) {
            return RankedResultSet::AllFailed { outcomes };
        }

        let (mut succeeded, failed): (Vec<_>, Vec<_>) =
            outcomes.into_iter().partition(|o| o.score().is_some());

        succeeded.sort_by(|a, b| match (a.score(), b.score()) {
            (Some(x), Some(y)) => x.total_cmp(&y),
            _ => Ordering::Equal,
        });

        RankedResultSet::Ranked { succeeded, failed }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docking::{DockingMode, DockingOutcome};
    use crate::ligand::MoleculeDescriptor;
    use crate::service::DockingResponse;
    use dockflow_common::DockflowError;

    fn scored(index: usize, affinity: f64) -> DockingOutcome {
        let response = DockingResponse { best_affinity: Some(affinity), ..Default::default() };
        DockingOutcome::settle(
            index,
            MoleculeDescriptor::new(&format!("C{}", index), None),
            DockingMode::Standard,
            Ok(response),
        )
    }

    fn failed(index: usize) -> DockingOutcome {
        let err = DockflowError::RemoteRequest { status: Some(500), message: "boom".into() };
        DockingOutcome::failed(index, MoleculeDescriptor::new("X", None), &err)
    }

    fn scores(set: &RankedResultSet) -> Vec<Option<f64>> {
        set.entries().map(|o| o.affinity).collect()
    }

    #[test]
    fn test_rank_orders_ascending_and_keeps_failures() {
        let ranker = ResultRanker::new();
        let ranked = ranker.rank(vec![scored(0, -5.0), scored(1, -8.2), scored(2, -3.1), failed(3)]);

        assert_eq!(scores(&ranked), vec![Some(-8.2), Some(-5.0), Some(-3.1), None]);
        assert_eq!(ranked.succeeded_count(), 3);
        assert_eq!(ranked.failed_count(), 1);
        assert_eq!(ranked.best().map(|o| o.input_index), Some(1));
        assert_eq!(ranked.summary(), "3 succeeded, 1 failed");
    }

    #[test]
    fn test_rank_is_idempotent() {
        let ranker = ResultRanker::new();
        let once = ranker.rank(vec![failed(0), scored(1, -5.0), scored(2, -8.2), scored(3, -3.1)]);
        let twice = ranker.rank(once.clone().into_outcomes());
        assert_eq!(once, twice);
    }

    #[test]
    fn test_all_failed_returns_every_entry() {
        let ranker = ResultRanker::new();
        let ranked = ranker.rank(vec![failed(0), failed(1), failed(2)]);
        assert!(ranked.is_all_failed());
        assert_eq!(ranked.len(), 3);
        assert!(ranked.best().is_none());
        let order: Vec<usize> = ranked.entries().map(|o| o.input_index).collect();
        assert_eq!(order, vec![0, 1, 2]);
    }

    #[test]
    fn test_ties_keep_input_order() {
        let ranker = ResultRanker::new();
        let ranked = ranker.rank(vec![scored(0, -6.0), scored(1, -7.0), scored(2, -6.0), scored(3, -6.0)]);
        let order: Vec<usize> = ranked.entries().map(|o| o.input_index).collect();
        assert_eq!(order, vec![1, 0, 2, 3]);
    }

    #[test]
    fn test_empty_input_is_all_failed() {
        let ranked = ResultRanker::new().rank(Vec::new());
        assert!(ranked.is_all_failed());
        assert!(ranked.is_empty());
    }
}
