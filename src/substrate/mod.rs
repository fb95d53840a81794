mod pool;
#[cfg(test)]
pub(crate) mod testing;

pub use pool::SolverPool;

use crate::error::SolveErr;

/// Opaque identifier for one in-flight task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskHandle(u64);

impl TaskHandle {
    pub(crate) fn new(id: u64) -> Self {
        Self(id)
    }
}

/// Everything a task computes against, captured by value at submission.
#[derive(Debug, Clone)]
pub struct TaskInput {
    /// Index of the partition this task was issued for.
    pub partition: usize,
    /// Consensus vector at submission time.
    pub z: Vec<f64>,
    /// Last local estimate for the partition at submission time.
    pub local: Vec<f64>,
    /// Dual variable for the partition at submission time.
    pub dual: Vec<f64>,
    /// ADMM penalty parameter.
    pub rho: f64,
}

/// Outcome of one task: a new local estimate or a computational failure.
pub type TaskResult = Result<Vec<f64>, SolveErr>;

/// The execution facility the driver submits work to.
///
/// Implementations may run tasks on local threads, a process pool or a
/// remote cluster; the driver only relies on non-blocking submission,
/// best-effort cancellation and completion-order delivery. `submit` makes
/// no promise about completion order.
#[trait_variant::make(Substrate: Send)]
pub trait SubstrateTemplate {
    /// Starts a task without blocking.
    ///
    /// # Returns
    /// A fresh handle, never reused within one substrate instance.
    fn submit(&mut self, input: TaskInput) -> TaskHandle;

    /// Best-effort cancellation; the result of a cancelled task is
    /// silently dropped and never delivered.
    fn cancel(&mut self, handle: TaskHandle);

    /// Suspends until one outstanding task completes.
    ///
    /// # Returns
    /// `None` if the substrate can no longer deliver completions.
    async fn next_completed(&mut self) -> Option<(TaskHandle, TaskResult)>;

    /// Returns a completed task if one is already waiting, without
    /// suspending.
    fn try_next_completed(&mut self) -> Option<(TaskHandle, TaskResult)>;
}
