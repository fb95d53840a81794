use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

use log::{debug, info, warn};
use rand::{Rng, SeedableRng, rngs::StdRng};

use crate::{
    config::DriverConfig,
    convergence::{ConvergenceTracker, Residuals},
    error::{ConfigErr, RunErr, SolveErr, StreamErr},
    partition::Partition,
    solver::LocalSolver,
    state::{ConsensusState, Snapshot},
    stream::ResultStream,
    substrate::{SolverPool, Substrate, TaskHandle, TaskInput},
};

/// Driver lifecycle phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Initial burst of `2 * width` tasks is being submitted.
    Warmup,
    /// One incorporation triggers exactly one resubmission.
    Steady,
    /// Stop criterion met, no new submissions.
    Draining,
    /// No pending tasks remain.
    Done,
}

/// Why a run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Both residual tolerances were satisfied.
    Converged,
    /// The incorporation-count cap was reached.
    MaxRounds,
    /// The wall-clock deadline passed.
    Deadline,
    /// The run was aborted; only appears in partial reports.
    Aborted,
}

/// Outcome of one run: the final consensus estimate plus diagnostics.
#[derive(Debug, Clone)]
pub struct RunReport {
    /// The last global consensus vector computed.
    pub consensus: Vec<f64>,
    /// Total incorporated results.
    pub rounds: usize,
    /// Discarded solve attempts.
    pub failures: usize,
    /// Wall-clock duration of the run.
    pub elapsed: Duration,
    /// The stop criterion that ended the run.
    pub stop: StopReason,
    /// Residual history, one record per observed round.
    pub residuals: Vec<Residuals>,
}

/// The async-ADMM orchestration loop.
///
/// A single control flow: submits tasks against value snapshots of the
/// consensus state, drains completions as they arrive, folds them in and
/// resubmits. All state mutation happens here, so workers and driver
/// never share mutable memory.
#[derive(Debug)]
pub struct Driver<S> {
    config: DriverConfig,
    state: ConsensusState,
    tracker: ConvergenceTracker,
    stream: ResultStream<S>,
    pending: HashMap<TaskHandle, usize>,
    rng: StdRng,
    nchunks: usize,
    phase: Phase,
    failures: usize,
    deadline: Option<Instant>,
}

impl<F: LocalSolver> Driver<SolverPool<F>> {
    /// Creates a driver over a local tokio-backed pool running `solver`
    /// against the given partitions.
    ///
    /// # Args
    /// * `config` - Run parameters; validated here, before the loop starts.
    /// * `partitions` - The immutable data chunks.
    /// * `solver` - The caller-supplied per-partition solver.
    ///
    /// # Returns
    /// A `ConfigErr` if any run parameter or partition shape is invalid.
    pub fn with_pool(
        config: DriverConfig,
        partitions: Vec<Partition>,
        solver: F,
    ) -> Result<Self, ConfigErr> {
        let Some(first) = partitions.first() else {
            return Err(ConfigErr::NoPartitions);
        };

        let dim = first.ncols();
        for (index, partition) in partitions.iter().enumerate() {
            if partition.ncols() != dim {
                return Err(ConfigErr::RaggedPartition {
                    index,
                    got: partition.ncols(),
                    expected: dim,
                });
            }
        }

        let nchunks = partitions.len();
        let pool = SolverPool::new(partitions.into(), solver);
        Self::new(config, nchunks, dim, pool)
    }
}

impl<S: Substrate> Driver<S> {
    /// Creates a driver over an arbitrary execution substrate.
    ///
    /// # Args
    /// * `config` - Run parameters; validated here, before the loop starts.
    /// * `nchunks` - Number of data partitions the substrate can solve.
    /// * `dim` - Parameter dimension.
    /// * `substrate` - The execution facility to submit tasks to.
    pub fn new(
        config: DriverConfig,
        nchunks: usize,
        dim: usize,
        substrate: S,
    ) -> Result<Self, ConfigErr> {
        config.validate()?;
        if nchunks == 0 || dim == 0 {
            return Err(ConfigErr::NoPartitions);
        }

        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        Ok(Self {
            state: ConsensusState::new(nchunks, dim, config.rho, config.lambda),
            tracker: ConvergenceTracker::new(config.abstol, config.reltol),
            stream: ResultStream::new(substrate),
            pending: HashMap::new(),
            rng,
            nchunks,
            phase: Phase::Warmup,
            failures: 0,
            deadline: None,
            config,
        })
    }

    /// The current lifecycle phase.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Runs the loop to completion.
    ///
    /// # Returns
    /// The final report, or `RunErr::SubstrateLost` carrying the partial
    /// report if the execution substrate became unreachable.
    pub async fn run(mut self) -> Result<RunReport, RunErr> {
        let started = Instant::now();
        self.deadline = self.config.max_time.map(|limit| started + limit);

        self.warmup();
        self.phase = Phase::Steady;
        info!(
            width = self.config.width,
            nchunks = self.nchunks,
            batched = self.config.batched;
            "warmup complete, entering steady state"
        );

        let stop = loop {
            let cycle = if self.config.batched {
                self.cycle_batched().await
            } else {
                self.cycle_single().await
            };

            match cycle {
                Ok(Some(stop)) => break stop,
                Ok(None) => {}
                Err(StreamErr::SubstrateLost) | Err(StreamErr::Exhausted) => {
                    return Err(self.abort(started));
                }
            }
        };

        self.drain(stop);
        Ok(self.report(started, stop))
    }

    /// Submits the initial burst of `2 * width` tasks against the
    /// zero-initialized state.
    fn warmup(&mut self) {
        for _ in 0..2 * self.config.width {
            self.submit_sampled();
        }
    }

    /// One steady-state cycle in single-update mode: drain one completion,
    /// incorporate it, check the stop predicate, resubmit.
    async fn cycle_single(&mut self) -> Result<Option<StopReason>, StreamErr> {
        let (handle, result) = self.stream.next_one().await?;
        let Some(partition) = self.pending.remove(&handle) else {
            return Ok(None);
        };

        match result {
            Ok(estimate) => self.incorporate_one(partition, estimate),
            Err(e) => self.record_failure(partition, e),
        }

        let stop = self.stop_reason();
        if stop.is_none() {
            self.submit_sampled();
        }
        Ok(stop)
    }

    /// One cycle in batched mode: drain every ready completion, recompute
    /// the consensus once, then submit one replacement per drained result.
    async fn cycle_batched(&mut self) -> Result<Option<StopReason>, StreamErr> {
        let batch = self.stream.next_batch().await?;

        let mut drained = 0;
        let mut updates = Vec::with_capacity(batch.len());
        for (handle, result) in batch {
            let Some(partition) = self.pending.remove(&handle) else {
                continue;
            };
            drained += 1;

            match result {
                Ok(estimate) => updates.push((partition, estimate)),
                Err(e) => self.record_failure(partition, e),
            }
        }

        if !updates.is_empty() {
            debug!(count = updates.len(); "incorporating batch");
            self.state.incorporate_batch(updates);
            self.tracker.observe(&self.state);
        }

        let stop = self.stop_reason();
        if stop.is_none() {
            for _ in 0..drained {
                self.submit_sampled();
            }
        }
        Ok(stop)
    }

    fn incorporate_one(&mut self, partition: usize, estimate: Vec<f64>) {
        self.state.incorporate(partition, estimate);
        self.tracker.observe(&self.state);
        debug!(partition, round = self.state.rounds(); "incorporated result");
    }

    /// A failed attempt leaves the state untouched; the replacement task
    /// is sampled fresh, never a verbatim retry.
    fn record_failure(&mut self, partition: usize, e: SolveErr) {
        self.failures += 1;
        warn!(partition; "discarding failed solve: {e}");
    }

    /// Samples a partition uniformly at random (with replacement, fairness
    /// intentionally not guaranteed), snapshots its state and submits a
    /// task for it.
    fn submit_sampled(&mut self) {
        let partition = self.rng.random_range(0..self.nchunks);
        let Snapshot { z, local, dual } = self.state.snapshot(partition);
        let handle = self.stream.submit(TaskInput {
            partition,
            z,
            local,
            dual,
            rho: self.config.rho,
        });
        self.pending.insert(handle, partition);
    }

    /// Stop predicate, checked once per incorporation cycle.
    fn stop_reason(&self) -> Option<StopReason> {
        if self.tracker.is_converged(self.nchunks) {
            return Some(StopReason::Converged);
        }
        if let Some(max) = self.config.max_rounds
            && self.state.rounds() >= max
        {
            return Some(StopReason::MaxRounds);
        }
        if let Some(deadline) = self.deadline
            && Instant::now() >= deadline
        {
            return Some(StopReason::Deadline);
        }
        None
    }

    /// Cancels outstanding work best-effort; late results are dropped by
    /// the stream's frontier, never incorporated.
    fn drain(&mut self, stop: StopReason) {
        self.phase = Phase::Draining;
        info!(outstanding = self.stream.outstanding(); "stop criterion met, draining: {stop:?}");
        self.stream.cancel_all();
        self.pending.clear();
        self.phase = Phase::Done;
    }

    fn abort(mut self, started: Instant) -> RunErr {
        warn!(rounds = self.state.rounds(); "execution substrate lost, aborting");
        self.pending.clear();
        RunErr::SubstrateLost {
            partial: Box::new(self.report(started, StopReason::Aborted)),
        }
    }

    fn report(self, started: Instant, stop: StopReason) -> RunReport {
        RunReport {
            consensus: self.state.consensus().to_vec(),
            rounds: self.state.rounds(),
            failures: self.failures,
            elapsed: started.elapsed(),
            stop,
            residuals: self.tracker.into_history(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::substrate::testing::ScriptedSubstrate;

    const WIDTH: usize = 2;
    const NCHUNKS: usize = 4;

    fn scripted_driver(max_rounds: usize) -> Driver<ScriptedSubstrate> {
        let mut config = DriverConfig::new(WIDTH, 1.0);
        config.max_rounds = Some(max_rounds);
        config.seed = Some(7);
        Driver::new(config, NCHUNKS, 1, ScriptedSubstrate::new()).unwrap()
    }

    #[test]
    fn rejects_invalid_setup_before_the_loop() {
        let config = DriverConfig::new(0, 1.0);
        let err = Driver::new(config, NCHUNKS, 1, ScriptedSubstrate::new()).unwrap_err();
        assert_eq!(err, ConfigErr::ZeroWidth);

        let mut config = DriverConfig::new(WIDTH, 1.0);
        config.max_rounds = Some(1);
        let err = Driver::new(config, 0, 1, ScriptedSubstrate::new()).unwrap_err();
        assert_eq!(err, ConfigErr::NoPartitions);
    }

    #[test]
    fn warmup_submits_double_width_burst() {
        let mut driver = scripted_driver(100);
        driver.warmup();

        assert_eq!(driver.stream.outstanding(), 2 * WIDTH);
        assert_eq!(driver.pending.len(), 2 * WIDTH);
        for (_, input) in &driver.stream.substrate_mut().submitted {
            assert!(input.partition < NCHUNKS);
            assert_eq!(input.z, vec![0.0]);
        }
    }

    #[tokio::test]
    async fn steady_cycle_preserves_in_flight_count() {
        let mut driver = scripted_driver(100);
        driver.warmup();

        let handle = driver.stream.substrate_mut().handle(0);
        driver
            .stream
            .substrate_mut()
            .complete(handle, Ok(vec![1.0]));

        let stop = driver.cycle_single().await.unwrap();
        assert_eq!(stop, None);
        assert_eq!(driver.stream.outstanding(), 2 * WIDTH);
        assert_eq!(driver.pending.len(), 2 * WIDTH);
        assert_eq!(driver.state.rounds(), 1);
    }

    #[tokio::test]
    async fn incorporation_targets_the_completed_partition() {
        let mut driver = scripted_driver(100);
        driver.warmup();

        let handle = driver.stream.substrate_mut().handle(1);
        let partition = driver.stream.substrate_mut().input(1).partition;
        driver
            .stream
            .substrate_mut()
            .complete(handle, Ok(vec![2.5]));

        driver.cycle_single().await.unwrap();
        assert_eq!(driver.state.local(partition), &[2.5]);
    }

    #[tokio::test]
    async fn failed_solve_is_discarded_and_replaced_in_the_same_cycle() {
        let mut driver = scripted_driver(100);
        driver.warmup();
        let submitted_before = driver.stream.substrate_mut().submitted.len();

        let handle = driver.stream.substrate_mut().handle(0);
        driver
            .stream
            .substrate_mut()
            .complete(handle, Err(SolveErr::new("diverged")));

        let stop = driver.cycle_single().await.unwrap();
        assert_eq!(stop, None);

        // State untouched, failure counted, replacement already submitted.
        assert_eq!(driver.state.rounds(), 0);
        assert_eq!(driver.state.consensus(), &[0.0]);
        assert_eq!(driver.failures, 1);
        assert_eq!(driver.stream.outstanding(), 2 * WIDTH);
        assert_eq!(
            driver.stream.substrate_mut().submitted.len(),
            submitted_before + 1
        );
    }

    #[tokio::test]
    async fn stopping_skips_resubmission_and_drains() {
        let mut driver = scripted_driver(1);
        driver.warmup();

        let handle = driver.stream.substrate_mut().handle(0);
        driver
            .stream
            .substrate_mut()
            .complete(handle, Ok(vec![1.0]));

        let stop = driver.cycle_single().await.unwrap();
        assert_eq!(stop, Some(StopReason::MaxRounds));
        assert_eq!(driver.stream.outstanding(), 2 * WIDTH - 1);

        driver.drain(StopReason::MaxRounds);
        assert_eq!(driver.phase(), Phase::Done);
        assert_eq!(driver.stream.outstanding(), 0);
        assert!(driver.pending.is_empty());
        assert_eq!(
            driver.stream.substrate_mut().cancelled.len(),
            2 * WIDTH - 1
        );
    }

    #[tokio::test]
    async fn batched_cycle_replaces_every_drained_result() {
        let mut driver = scripted_driver(100);
        driver.config.batched = true;
        driver.warmup();

        // Two completions ready at once, in completion order.
        for k in [2, 0] {
            let handle = driver.stream.substrate_mut().handle(k);
            driver
                .stream
                .substrate_mut()
                .complete(handle, Ok(vec![1.0]));
        }

        let stop = driver.cycle_batched().await.unwrap();
        assert_eq!(stop, None);
        assert_eq!(driver.state.rounds(), 2);
        assert_eq!(driver.stream.outstanding(), 2 * WIDTH);
        assert_eq!(driver.pending.len(), 2 * WIDTH);
    }

    #[tokio::test]
    async fn substrate_loss_aborts_with_partial_report() {
        let driver = scripted_driver(100);

        // The scripted substrate never completes anything: to the driver
        // it is indistinguishable from a vanished cluster.
        let err = driver.run().await.unwrap_err();
        let partial = err.partial();
        assert_eq!(partial.stop, StopReason::Aborted);
        assert_eq!(partial.rounds, 0);
        assert_eq!(partial.consensus, vec![0.0]);
    }
}
