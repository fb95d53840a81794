use std::collections::HashSet;

use crate::{
    error::StreamErr,
    substrate::{Substrate, TaskHandle, TaskInput, TaskResult},
};

/// Pull-based completion stream over an execution substrate.
///
/// Tracks the frontier of already-yielded handles so every completion is
/// delivered at most once, no matter how the substrate interleaves them.
/// New tasks may be added while draining is in progress.
#[derive(Debug)]
pub struct ResultStream<S> {
    substrate: S,
    outstanding: HashSet<TaskHandle>,
}

impl<S: Substrate> ResultStream<S> {
    pub fn new(substrate: S) -> Self {
        Self {
            substrate,
            outstanding: HashSet::new(),
        }
    }

    /// Registers an already-submitted handle for draining.
    pub fn add(&mut self, handle: TaskHandle) {
        self.outstanding.insert(handle);
    }

    /// Submits a task to the substrate and registers its handle.
    pub fn submit(&mut self, input: TaskInput) -> TaskHandle {
        let handle = self.substrate.submit(input);
        self.add(handle);
        handle
    }

    /// Number of registered tasks not yet yielded.
    pub fn outstanding(&self) -> usize {
        self.outstanding.len()
    }

    /// Suspends until exactly one outstanding task completes.
    ///
    /// # Returns
    /// `StreamErr::Exhausted` if nothing is outstanding, or
    /// `StreamErr::SubstrateLost` if the substrate stops delivering while
    /// tasks are still pending.
    pub async fn next_one(&mut self) -> Result<(TaskHandle, TaskResult), StreamErr> {
        loop {
            if self.outstanding.is_empty() {
                return Err(StreamErr::Exhausted);
            }

            let (handle, result) = self
                .substrate
                .next_completed()
                .await
                .ok_or(StreamErr::SubstrateLost)?;

            // Completions outside the frontier were already yielded or
            // cancelled; drop them.
            if self.outstanding.remove(&handle) {
                return Ok((handle, result));
            }
        }
    }

    /// Suspends until at least one task completes, then drains everything
    /// ready without further blocking, preserving completion order.
    pub async fn next_batch(&mut self) -> Result<Vec<(TaskHandle, TaskResult)>, StreamErr> {
        let mut batch = vec![self.next_one().await?];

        while let Some((handle, result)) = self.substrate.try_next_completed() {
            if self.outstanding.remove(&handle) {
                batch.push((handle, result));
            }
        }

        Ok(batch)
    }

    /// Best-effort cancellation of every outstanding task.
    ///
    /// Their late results are dropped by the frontier, never yielded.
    pub fn cancel_all(&mut self) {
        for handle in self.outstanding.drain() {
            self.substrate.cancel(handle);
        }
    }

    #[cfg(test)]
    pub(crate) fn substrate_mut(&mut self) -> &mut S {
        &mut self.substrate
    }
}
