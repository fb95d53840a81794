use std::{collections::HashSet, sync::Arc, time::Duration};

use tokio::{
    sync::mpsc::{self, UnboundedReceiver, UnboundedSender},
    task,
    time::timeout,
};

use super::{Substrate, TaskHandle, TaskInput, TaskResult};
use crate::{error::SolveErr, partition::Partition, solver::LocalSolver};

/// A local execution substrate backed by the tokio blocking pool.
///
/// Each submitted task runs the solver on a value snapshot via
/// `spawn_blocking` and reports back over a channel, so completions
/// arrive in completion order regardless of submission order. An optional
/// per-task timeout guards against solves that never finish; a timed-out
/// or panicked solve surfaces as a `SolveErr` like any other
/// computational failure.
pub struct SolverPool<F> {
    solver: Arc<F>,
    partitions: Arc<[Partition]>,
    tx: UnboundedSender<(TaskHandle, TaskResult)>,
    rx: UnboundedReceiver<(TaskHandle, TaskResult)>,
    next_id: u64,
    cancelled: HashSet<TaskHandle>,
    task_timeout: Option<Duration>,
}

impl<F: LocalSolver> SolverPool<F> {
    /// Creates a pool over the given partitions and solver.
    ///
    /// # Args
    /// * `partitions` - The immutable data partitions, shared with every task.
    /// * `solver` - The per-partition solver.
    pub fn new(partitions: Arc<[Partition]>, solver: F) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            solver: Arc::new(solver),
            partitions,
            tx,
            rx,
            next_id: 0,
            cancelled: HashSet::new(),
            task_timeout: None,
        }
    }

    /// Bounds every solve by a wall-clock timeout.
    pub fn with_task_timeout(mut self, task_timeout: Duration) -> Self {
        self.task_timeout = Some(task_timeout);
        self
    }

    /// Drops a completion if its handle was cancelled.
    fn admit(
        &mut self,
        completion: (TaskHandle, TaskResult),
    ) -> Option<(TaskHandle, TaskResult)> {
        if self.cancelled.remove(&completion.0) {
            None
        } else {
            Some(completion)
        }
    }
}

impl<F: LocalSolver> Substrate for SolverPool<F> {
    fn submit(&mut self, input: TaskInput) -> TaskHandle {
        let handle = TaskHandle::new(self.next_id);
        self.next_id += 1;

        let solver = Arc::clone(&self.solver);
        let partitions = Arc::clone(&self.partitions);
        let tx = self.tx.clone();
        let task_timeout = self.task_timeout;

        tokio::spawn(async move {
            let solve = task::spawn_blocking(move || {
                let partition = &partitions[input.partition];
                solver.solve(&input.z, &input.local, &input.dual, input.rho, partition)
            });

            let joined = match task_timeout {
                Some(limit) => match timeout(limit, solve).await {
                    Ok(joined) => joined,
                    Err(_) => {
                        let _ = tx.send((handle, Err(SolveErr::new("solve timed out"))));
                        return;
                    }
                },
                None => solve.await,
            };

            let result = match joined {
                Ok(result) => result,
                Err(_) => Err(SolveErr::new("solver panicked")),
            };

            let _ = tx.send((handle, result));
        });

        handle
    }

    fn cancel(&mut self, handle: TaskHandle) {
        // The blocking solve cannot be interrupted; its eventual result
        // is dropped instead.
        self.cancelled.insert(handle);
    }

    async fn next_completed(&mut self) -> Option<(TaskHandle, TaskResult)> {
        loop {
            // The pool owns a sender, so recv only returns None once the
            // runtime is torn down.
            let completion = self.rx.recv().await?;
            if let Some(completion) = self.admit(completion) {
                return Some(completion);
            }
        }
    }

    fn try_next_completed(&mut self) -> Option<(TaskHandle, TaskResult)> {
        loop {
            let completion = self.rx.try_recv().ok()?;
            if let Some(completion) = self.admit(completion) {
                return Some(completion);
            }
        }
    }
}
