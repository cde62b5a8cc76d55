use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::data::DataSource;
use crate::error::{PruneError, Result};
use crate::network::Network;
use crate::prune::class_weight::{class_scale, confusion_matrix};
use crate::prune::global::{select_global, GroupScores};
use crate::prune::masks::build_mask;
use crate::prune::pruned_set::PrunedSet;
use crate::prune::rate::prune_rate;
use crate::prune::relevance::RelevanceScorer;
use crate::prune::selector::select_indices;
use crate::prune::topology::PruneTopology;
use crate::train::loop_fn::evaluate;

/// Where the controller is within an epoch boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Training,
    Scoring,
    Pruning,
}

/// When and how much to prune.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PruneSchedule {
    /// Prune after every epoch `e` with `(e + 1) % every == 0` ...
    pub every: usize,
    /// ... as long as `e < until`.
    pub until: usize,
    /// Conv filters removed per round, allocated globally across layers.
    pub filters_per_round: usize,
    /// Hidden linear units removed per round.
    pub linear_units_per_round: usize,
}

impl PruneSchedule {
    pub fn is_round(&self, epoch: usize) -> bool {
        self.every > 0 && epoch < self.until && (epoch + 1) % self.every == 0
    }

    /// Number of rounds that fire in a run of `epochs` epochs.
    pub fn rounds_within(&self, epochs: usize) -> usize {
        (0..epochs.min(self.until))
            .filter(|&e| self.is_round(e))
            .count()
    }
}

/// Cumulative pruning decisions; everything needed to rebuild every mask.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PruningState {
    pub rounds: usize,
    /// One set per prunable conv, in pruning order (back to front).
    pub conv: Vec<PrunedSet>,
    /// Pruned units of the hidden linear layer.
    pub linear: PrunedSet,
}

impl PruningState {
    pub fn empty(topology: &PruneTopology) -> Self {
        PruningState {
            rounds: 0,
            conv: topology
                .convs()
                .iter()
                .map(|d| PrunedSet::new(&d.id, d.output_width))
                .collect(),
            linear: PrunedSet::new(&topology.hidden().id, topology.hidden().output_width),
        }
    }

    pub fn pruned_filters(&self) -> usize {
        self.conv.iter().map(PrunedSet::len).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PickRecord {
    pub layer: String,
    pub filter: usize,
    pub score: f64,
}

/// Outcome of one pruning round.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoundReport {
    pub epoch: usize,
    pub round: usize,
    /// Conv picks in selection order (non-decreasing score).
    pub picks: Vec<PickRecord>,
    /// Picks landing in each conv layer this round, pruning order.
    pub per_layer: Vec<(String, usize)>,
    pub linear_picked: Vec<usize>,
    /// Test accuracy in percent, measured right after masking.
    pub test_accuracy: f64,
    pub prune_rate: f64,
}

/// Decides when to prune, selects what to prune, and keeps every layer's
/// mask consistent with the cumulative pruned sets.
#[derive(Debug, Clone)]
pub struct PruningController {
    topology: PruneTopology,
    schedule: PruneSchedule,
    state: PruningState,
    phase: Phase,
}

impl PruningController {
    pub fn new(topology: PruneTopology, schedule: PruneSchedule) -> Self {
        let state = PruningState::empty(&topology);
        PruningController {
            topology,
            schedule,
            state,
            phase: Phase::Training,
        }
    }

    pub fn topology(&self) -> &PruneTopology {
        &self.topology
    }

    pub fn schedule(&self) -> &PruneSchedule {
        &self.schedule
    }

    pub fn state(&self) -> &PruningState {
        &self.state
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn should_prune(&self, epoch: usize) -> bool {
        self.schedule.is_round(epoch)
    }

    /// Replaces the bookkeeping with a previously saved state after checking
    /// it against this topology. Call `remask` afterwards.
    pub fn restore(&mut self, state: PruningState) -> Result<()> {
        let convs = self.topology.convs();
        if state.conv.len() != convs.len() {
            return Err(PruneError::Checkpoint(format!(
                "pruning state has {} conv sets, network has {} prunable convs",
                state.conv.len(),
                convs.len()
            )));
        }
        let expected = convs
            .iter()
            .map(|d| (d.id.as_str(), d.output_width))
            .chain(std::iter::once((
                self.topology.hidden().id.as_str(),
                self.topology.hidden().output_width,
            )));
        for (set, (id, width)) in state.conv.iter().chain(std::iter::once(&state.linear)).zip(expected) {
            if set.layer() != id || set.width() != width {
                return Err(PruneError::Checkpoint(format!(
                    "pruned set for {} (width {}) does not match layer {id} (width {width})",
                    set.layer(),
                    set.width()
                )));
            }
            set.validate()?;
        }
        self.state = state;
        Ok(())
    }

    /// Rebuilds every mask from the current pruned sets.
    pub fn remask(&self, network: &mut Network) -> Result<()> {
        apply_masks(&self.topology, &self.state, network)
    }

    /// Runs one full round: score, select, re-mask, then measure.
    ///
    /// The controller is back in `Phase::Training` afterwards, whether the
    /// round succeeded or not.
    pub fn prune_round<S: RelevanceScorer + ?Sized>(
        &mut self,
        epoch: usize,
        network: &mut Network,
        train: &mut dyn DataSource,
        test: &mut dyn DataSource,
        scorer: &mut S,
    ) -> Result<RoundReport> {
        let result = self.run_round(epoch, network, train, test, scorer);
        self.phase = Phase::Training;
        result
    }

    fn run_round<S: RelevanceScorer + ?Sized>(
        &mut self,
        epoch: usize,
        network: &mut Network,
        train: &mut dyn DataSource,
        test: &mut dyn DataSource,
        scorer: &mut S,
    ) -> Result<RoundReport> {
        let round = self.state.rounds + 1;
        self.phase = Phase::Scoring;
        info!(epoch, round, "pruning round: scoring");

        let class_acc = confusion_matrix(network, &mut *train)?;
        let scale = class_scale(&class_acc.accuracy);
        debug!(?scale, "class emphasis");

        let mut group_scores = Vec::with_capacity(self.topology.groups().len());
        for group in self.topology.groups() {
            let ids = self.topology.group_ids(group);
            let scores = scorer.score(network, &mut *train, &ids, group.width, &scale)?;
            group_scores.push(GroupScores {
                group: group.clone(),
                scores,
            });
        }

        let hidden = self.topology.hidden();
        let lin_scores = scorer.score(
            network,
            &mut *train,
            std::slice::from_ref(&hidden.id),
            hidden.output_width,
            &scale,
        )?;
        let linear = select_indices(
            &lin_scores.column(0),
            &self.state.linear,
            self.schedule.linear_units_per_round,
        )?;

        self.phase = Phase::Pruning;
        let picks = select_global(&group_scores, &self.state.conv, self.schedule.filters_per_round)?;

        let mut next = self.state.clone();
        next.linear = linear.pruned;
        for p in &picks {
            next.conv[p.position].insert(p.filter)?;
        }
        let mut per_layer = Vec::with_capacity(next.conv.len());
        for (pos, (before, after)) in self.state.conv.iter().zip(&next.conv).enumerate() {
            let landed = picks.iter().filter(|p| p.position == pos).count();
            if after.len() != before.len() + landed {
                return Err(PruneError::Invariant(format!(
                    "{} grew from {} to {} with {landed} picks",
                    after.layer(),
                    before.len(),
                    after.len()
                )));
            }
            per_layer.push((after.layer().to_string(), landed));
        }
        if next.linear.len() != self.state.linear.len() + linear.picked.len() {
            return Err(PruneError::Invariant(format!(
                "{} grew from {} to {} with {} picks",
                next.linear.layer(),
                self.state.linear.len(),
                next.linear.len(),
                linear.picked.len()
            )));
        }
        next.rounds = round;

        apply_masks(&self.topology, &next, network)?;
        self.state = next;

        let eval = evaluate(network, &mut *test, false)?;
        let rate = prune_rate(network);
        for (layer, n) in per_layer.iter().filter(|(_, n)| *n > 0) {
            debug!(layer = %layer, picks = n, "filters pruned this round");
        }
        info!(
            epoch,
            round,
            filters = picks.len(),
            linear_units = linear.picked.len(),
            total_filters = self.state.pruned_filters(),
            test_acc = format!("{:.3}%", eval.accuracy()),
            prune_rate = format!("{:.4}", rate.fraction()),
            "pruning round complete"
        );

        let convs = self.topology.convs();
        Ok(RoundReport {
            epoch,
            round,
            picks: picks
                .iter()
                .map(|p| PickRecord {
                    layer: convs[p.position].id.clone(),
                    filter: p.filter,
                    score: p.score,
                })
                .collect(),
            per_layer,
            linear_picked: linear.picked,
            test_accuracy: eval.accuracy(),
            prune_rate: rate.fraction(),
        })
    }
}

/// Re-masks every prunable layer, walking conv layers back to front so each
/// layer's input mask reads its upstream neighbour's finalized output set.
fn apply_masks(topology: &PruneTopology, state: &PruningState, network: &mut Network) -> Result<()> {
    for (i, desc) in topology.convs().iter().enumerate() {
        let upstream = desc.predecessor.as_ref().and_then(|_| state.conv.get(i + 1));
        let shape = network.maskable(&desc.id)?.weight_shape().to_vec();
        let mask = build_mask(desc, &shape, Some(&state.conv[i]), upstream)?;
        network.maskable_mut(&desc.id)?.set_mask(mask)?;
    }

    let hidden = topology.hidden();
    let shape = network.maskable(&hidden.id)?.weight_shape().to_vec();
    let mask = build_mask(hidden, &shape, Some(&state.linear), state.conv.first())?;
    network.maskable_mut(&hidden.id)?.set_mask(mask)?;

    let head = topology.head();
    let shape = network.maskable(&head.id)?.weight_shape().to_vec();
    let mask = build_mask(head, &shape, None, Some(&state.linear))?;
    network.maskable_mut(&head.id)?.set_mask(mask)?;
    Ok(())
}
