use rayon::prelude::*;

/// Value snapshot handed to a task at submission time.
///
/// Independent copies, never references: tasks run concurrently with
/// further driver mutation and must not observe it.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub z: Vec<f64>,
    pub local: Vec<f64>,
    pub dual: Vec<f64>,
}

/// The shared consensus variables of one run.
///
/// Holds the global consensus vector `z`, one dual variable and one local
/// estimate per partition, and an incrementally maintained running sum of
/// `local + dual` so each incorporation costs O(dimension) instead of
/// O(nchunks * dimension).
///
/// Single-writer discipline: only the driver control flow calls the
/// mutating methods, so no locking is needed.
#[derive(Debug)]
pub struct ConsensusState {
    z: Vec<f64>,
    z_prev: Vec<f64>,
    locals: Vec<Vec<f64>>,
    duals: Vec<Vec<f64>>,
    running_sum: Vec<f64>,
    rounds: usize,
    rho: f64,
    lambda: f64,
}

impl ConsensusState {
    /// Creates a zero-initialized state for `nchunks` partitions of the
    /// given parameter dimension.
    pub fn new(nchunks: usize, dim: usize, rho: f64, lambda: f64) -> Self {
        Self {
            z: vec![0.0; dim],
            z_prev: vec![0.0; dim],
            locals: vec![vec![0.0; dim]; nchunks],
            duals: vec![vec![0.0; dim]; nchunks],
            running_sum: vec![0.0; dim],
            rounds: 0,
            rho,
            lambda,
        }
    }

    /// Independent copies of the values a task for partition `i` computes
    /// against.
    pub fn snapshot(&self, i: usize) -> Snapshot {
        Snapshot {
            z: self.z.clone(),
            local: self.locals[i].clone(),
            dual: self.duals[i].clone(),
        }
    }

    /// Folds one completed local estimate into the consensus.
    ///
    /// Sets `LocalEstimate[i]`, recomputes `z` through the thresholded
    /// average, then advances `DualVariable[i]` by the residual
    /// `local - z`. One call is one round.
    pub fn incorporate(&mut self, i: usize, new_local: Vec<f64>) {
        self.apply_local(i, new_local);
        self.rounds += 1;
        self.refresh_consensus();
        self.advance_dual(i);
    }

    /// Batched variant: applies every drained estimate, recomputes `z`
    /// exactly once, then advances the dual of each touched partition.
    ///
    /// A batch of one is indistinguishable from `incorporate`.
    pub fn incorporate_batch(&mut self, updates: Vec<(usize, Vec<f64>)>) {
        if updates.is_empty() {
            return;
        }

        let mut touched = Vec::with_capacity(updates.len());
        for (i, new_local) in updates {
            self.apply_local(i, new_local);
            self.rounds += 1;
            if !touched.contains(&i) {
                touched.push(i);
            }
        }

        self.refresh_consensus();
        for i in touched {
            self.advance_dual(i);
        }
    }

    /// Replaces `LocalEstimate[i]`, keeping the running sum in step.
    fn apply_local(&mut self, i: usize, new_local: Vec<f64>) {
        let old = &mut self.locals[i];
        for (sum, (new, old)) in self.running_sum.iter_mut().zip(new_local.iter().zip(&*old)) {
            *sum += new - old;
        }
        *old = new_local;
    }

    /// Recomputes `z` from the running sum via soft-thresholding.
    ///
    /// While fewer than `nchunks` results have been incorporated the
    /// pre-threshold average is scaled by `nchunks / rounds` so the
    /// all-zero slots of partitions that have not reported yet do not
    /// bias the consensus toward zero.
    fn refresh_consensus(&mut self) {
        let nchunks = self.nchunks();
        let divisor = if self.rounds < nchunks {
            self.rounds as f64
        } else {
            nchunks as f64
        };
        let threshold = self.lambda / (self.rho * nchunks as f64);

        std::mem::swap(&mut self.z, &mut self.z_prev);
        self.z
            .par_iter_mut()
            .zip(self.running_sum.par_iter())
            .for_each(|(z, sum)| *z = soft_threshold(sum / divisor, threshold));
    }

    /// Accumulates the disagreement of partition `i` into its dual.
    fn advance_dual(&mut self, i: usize) {
        let dual = &mut self.duals[i];
        let local = &self.locals[i];
        for ((d, l), (z, sum)) in dual
            .iter_mut()
            .zip(local)
            .zip(self.z.iter().zip(self.running_sum.iter_mut()))
        {
            let step = l - z;
            *d += step;
            *sum += step;
        }
    }

    pub fn nchunks(&self) -> usize {
        self.locals.len()
    }

    pub fn dim(&self) -> usize {
        self.z.len()
    }

    /// Count of incorporated results so far.
    pub fn rounds(&self) -> usize {
        self.rounds
    }

    pub fn rho(&self) -> f64 {
        self.rho
    }

    /// The current global consensus vector.
    pub fn consensus(&self) -> &[f64] {
        &self.z
    }

    /// The consensus vector before the most recent refresh.
    pub fn previous_consensus(&self) -> &[f64] {
        &self.z_prev
    }

    pub fn local(&self, i: usize) -> &[f64] {
        &self.locals[i]
    }

    pub fn dual(&self, i: usize) -> &[f64] {
        &self.duals[i]
    }

    /// Sum over partitions of `||local_i - z||^2`.
    pub fn disagreement_sq(&self) -> f64 {
        self.locals
            .par_iter()
            .map(|local| {
                local
                    .iter()
                    .zip(&self.z)
                    .map(|(l, z)| (l - z) * (l - z))
                    .sum::<f64>()
            })
            .sum()
    }

    /// Norm of all local estimates stacked into one vector.
    pub fn locals_norm(&self) -> f64 {
        stacked_norm(&self.locals)
    }

    /// Norm of all dual variables stacked into one vector.
    pub fn duals_norm(&self) -> f64 {
        stacked_norm(&self.duals)
    }
}

/// The proximal operator of the L1 norm.
fn soft_threshold(v: f64, threshold: f64) -> f64 {
    if v > threshold {
        v - threshold
    } else if v < -threshold {
        v + threshold
    } else {
        0.0
    }
}

fn stacked_norm(rows: &[Vec<f64>]) -> f64 {
    rows.par_iter()
        .map(|row| row.iter().map(|v| v * v).sum::<f64>())
        .sum::<f64>()
        .sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn soft_threshold_shrinks_toward_zero() {
        assert_eq!(soft_threshold(3.0, 1.0), 2.0);
        assert_eq!(soft_threshold(-3.0, 1.0), -2.0);
        assert_eq!(soft_threshold(0.5, 1.0), 0.0);
        assert_eq!(soft_threshold(2.0, 0.0), 2.0);
    }

    #[test]
    fn early_round_scaling_compensates_missing_partitions() {
        // First result: the mean over 4 chunks would be [0.25, 0.25],
        // scaled by 4/1 it must come out as the raw estimate.
        let mut state = ConsensusState::new(4, 2, 1.0, 0.0);
        state.incorporate(0, vec![1.0, 1.0]);
        assert_eq!(state.consensus(), &[1.0, 1.0]);

        // Second result from another chunk: sum [2,2], divisor 2.
        state.incorporate(1, vec![1.0, 1.0]);
        assert_eq!(state.consensus(), &[1.0, 1.0]);
    }

    #[test]
    fn scaling_stops_after_nchunks_rounds() {
        let mut state = ConsensusState::new(2, 1, 1.0, 0.0);
        state.incorporate(0, vec![4.0]);
        state.incorporate(1, vec![4.0]);
        assert_eq!(state.rounds(), 2);

        // dual(0) = 4 - 4 = 0 after round one? No: round one sets z = 4
        // (scaled), dual(0) = 0; round two keeps z = 4, duals stay 0.
        // A third result for chunk 0 now averages over both chunks.
        state.incorporate(0, vec![8.0]);
        assert_eq!(state.consensus(), &[6.0]);
    }

    #[test]
    fn dual_update_is_exact() {
        let mut state = ConsensusState::new(3, 2, 1.0, 0.0);
        state.incorporate(1, vec![3.0, -3.0]);

        let z = state.consensus().to_vec();
        let dual_before = state.dual(1).to_vec();
        state.incorporate(1, vec![5.0, 1.0]);

        let z_new = state.consensus();
        for k in 0..2 {
            let expected = dual_before[k] + state.local(1)[k] - z_new[k];
            assert!((state.dual(1)[k] - expected).abs() < 1e-12);
        }
        assert_ne!(z, z_new);
    }

    #[test]
    fn batch_of_one_matches_single_update() {
        let mut single = ConsensusState::new(3, 2, 2.0, 0.5);
        let mut batched = ConsensusState::new(3, 2, 2.0, 0.5);

        single.incorporate(2, vec![1.5, -0.5]);
        batched.incorporate_batch(vec![(2, vec![1.5, -0.5])]);

        assert_eq!(single.consensus(), batched.consensus());
        assert_eq!(single.dual(2), batched.dual(2));
        assert_eq!(single.local(2), batched.local(2));
        assert_eq!(single.rounds(), batched.rounds());
    }

    #[test]
    fn batch_counts_every_result_as_a_round() {
        let mut state = ConsensusState::new(4, 1, 1.0, 0.0);
        state.incorporate_batch(vec![(0, vec![1.0]), (1, vec![1.0]), (2, vec![1.0])]);
        assert_eq!(state.rounds(), 3);
        // Sum 3, divisor 3 while still in the early-round regime.
        assert_eq!(state.consensus(), &[1.0]);
    }

    #[test]
    fn running_sum_matches_naive_recomputation() {
        let mut state = ConsensusState::new(3, 2, 1.5, 0.3);
        state.incorporate(0, vec![0.4, -1.2]);
        state.incorporate(2, vec![2.0, 0.1]);
        state.incorporate(0, vec![-0.7, 0.9]);
        state.incorporate(1, vec![1.1, 1.1]);

        for k in 0..2 {
            let naive: f64 = (0..3).map(|i| state.local(i)[k] + state.dual(i)[k]).sum();
            assert!((state.running_sum[k] - naive).abs() < 1e-12);
        }
    }
}
