use crate::error::{PruneError, Result};
use crate::prune::pruned_set::PrunedSet;

/// Result of one selector call.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    /// Newly chosen indices, lowest score first.
    pub picked: Vec<usize>,
    /// The previous set extended with `picked`.
    pub pruned: PrunedSet,
}

impl Selection {
    /// Union of the previous set and this round's picks, ascending.
    pub fn indices(&self) -> Vec<usize> {
        self.pruned.iter().collect()
    }
}

/// Chooses the `k` lowest-scoring indices not already in `previous`.
///
/// Ties go to the lowest index. Asking for more indices than remain unpruned
/// is a capacity error rather than a short answer.
pub fn select_indices(scores: &[f64], previous: &PrunedSet, k: usize) -> Result<Selection> {
    if scores.len() != previous.width() {
        return Err(PruneError::ShapeMismatch {
            what: format!("{} score vector", previous.layer()),
            expected: vec![previous.width()],
            got: vec![scores.len()],
        });
    }
    if let Some(i) = scores.iter().position(|s| s.is_nan()) {
        return Err(PruneError::NumericalInstability(format!(
            "{} score at index {i} is NaN",
            previous.layer()
        )));
    }

    let mut candidates: Vec<usize> = (0..scores.len())
        .filter(|i| !previous.contains(*i))
        .collect();
    if candidates.len() < k {
        return Err(PruneError::Capacity {
            scope: previous.layer().to_string(),
            requested: k,
            available: candidates.len(),
        });
    }
    // Stable sort keeps ascending index order among equal scores.
    candidates.sort_by(|a, b| scores[*a].total_cmp(&scores[*b]));
    candidates.truncate(k);

    let mut pruned = previous.clone();
    for &i in &candidates {
        pruned.insert(i)?;
    }
    Ok(Selection {
        picked: candidates,
        pruned,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn picks_two_lowest_from_empty_set() {
        let scores = [5.0, 1.0, 9.0, 3.0, 7.0];
        let sel = select_indices(&scores, &PrunedSet::new("fc0", 5), 2).unwrap();
        assert_eq!(sel.picked, vec![1, 3]);
        assert_eq!(sel.indices(), vec![1, 3]);
    }

    #[test]
    fn skips_already_pruned_indices() {
        let scores = [5.0, 1.0, 9.0, 3.0, 7.0];
        let mut prev = PrunedSet::new("fc0", 5);
        prev.insert(1).unwrap();
        prev.insert(3).unwrap();
        let sel = select_indices(&scores, &prev, 1).unwrap();
        assert_eq!(sel.picked, vec![0]);
        assert_eq!(sel.indices(), vec![0, 1, 3]);
    }

    #[test]
    fn ties_resolve_to_lowest_index() {
        let sel = select_indices(&[2.0, 1.0, 1.0, 1.0], &PrunedSet::new("l", 4), 2).unwrap();
        assert_eq!(sel.picked, vec![1, 2]);
    }

    #[test]
    fn over_budget_is_capacity_error() {
        let mut prev = PrunedSet::new("fc0", 3);
        prev.insert(0).unwrap();
        let err = select_indices(&[1.0, 2.0, 3.0], &prev, 3).unwrap_err();
        assert!(matches!(err, PruneError::Capacity { requested: 3, available: 2, .. }));
    }

    #[test]
    fn nan_scores_are_rejected() {
        let err = select_indices(&[1.0, f64::NAN], &PrunedSet::new("fc0", 2), 1).unwrap_err();
        assert!(matches!(err, PruneError::NumericalInstability(_)));
    }

    #[test]
    fn score_length_must_match_width() {
        assert!(select_indices(&[1.0], &PrunedSet::new("fc0", 2), 1).is_err());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn picks_are_fresh_and_no_better_than_leftovers(
            scores in proptest::collection::vec(0.0f64..100.0, 1..40),
            k_frac in 0.0f64..1.0,
        ) {
            let prev = PrunedSet::new("layer", scores.len());
            let k = (scores.len() as f64 * k_frac) as usize;
            let sel = select_indices(&scores, &prev, k).unwrap();
            prop_assert_eq!(sel.picked.len(), k);
            prop_assert_eq!(sel.pruned.len(), k);
            let worst_pick = sel.picked.iter().map(|i| scores[*i]).fold(f64::NEG_INFINITY, f64::max);
            for i in 0..scores.len() {
                if !sel.pruned.contains(i) {
                    prop_assert!(scores[i] >= worst_pick);
                }
            }
        }
    }
}
