use crate::error::{PruneError, Result};
use crate::math::Matrix;
use crate::prune::pruned_set::PrunedSet;
use crate::prune::topology::ConvGroup;

/// Relevance scores for one conv group: `scores[filter][j]` belongs to the
/// layer at pruning-order position `group.positions.start + j`.
#[derive(Debug, Clone)]
pub struct GroupScores {
    pub group: ConvGroup,
    pub scores: Matrix,
}

/// One filter chosen by the global picker.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pick {
    /// Pruning-order position of the conv layer.
    pub position: usize,
    pub filter: usize,
    pub score: f64,
}

/// Chooses `count` filters across all conv groups, always taking the lowest
/// remaining score anywhere. Already-pruned cells are filtered out up front,
/// so the returned picks are distinct and non-decreasing in score.
///
/// Ties break on the lower filter index, then the lower layer position.
pub fn select_global(groups: &[GroupScores], pruned: &[PrunedSet], count: usize) -> Result<Vec<Pick>> {
    let mut candidates = Vec::new();
    for gs in groups {
        let layers = gs.group.positions.len();
        if gs.scores.rows != gs.group.width || gs.scores.cols != layers {
            return Err(PruneError::ShapeMismatch {
                what: format!("score matrix for width-{} group", gs.group.width),
                expected: vec![gs.group.width, layers],
                got: vec![gs.scores.rows, gs.scores.cols],
            });
        }
        if !gs.scores.all_finite() {
            return Err(PruneError::NumericalInstability(format!(
                "non-finite relevance score in width-{} group",
                gs.group.width
            )));
        }
        for (j, position) in gs.group.positions.clone().enumerate() {
            let set = pruned.get(position).ok_or_else(|| {
                PruneError::Invariant(format!("no pruned set for conv position {position}"))
            })?;
            candidates.extend(
                (0..set.width().min(gs.group.width))
                    .filter(|f| !set.contains(*f))
                    .map(|filter| Pick {
                        position,
                        filter,
                        score: gs.scores.get(filter, j),
                    }),
            );
        }
    }

    if candidates.len() < count {
        return Err(PruneError::Capacity {
            scope: "conv filters".to_string(),
            requested: count,
            available: candidates.len(),
        });
    }

    candidates.sort_by(|a, b| {
        a.score
            .total_cmp(&b.score)
            .then(a.filter.cmp(&b.filter))
            .then(a.position.cmp(&b.position))
    });
    candidates.truncate(count);
    Ok(candidates)
}
