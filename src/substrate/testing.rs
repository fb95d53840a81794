use std::collections::VecDeque;

use super::{Substrate, TaskHandle, TaskInput, TaskResult};

/// Test substrate with fully scripted completion order.
///
/// Nothing completes until the test says so, which makes interleavings
/// reproducible: stage completions with `complete`, flip `lost` to
/// simulate losing the execution substrate.
#[derive(Debug)]
pub(crate) struct ScriptedSubstrate {
    next_id: u64,
    pub(crate) submitted: Vec<(TaskHandle, TaskInput)>,
    pub(crate) ready: VecDeque<(TaskHandle, TaskResult)>,
    pub(crate) cancelled: Vec<TaskHandle>,
    pub(crate) lost: bool,
}

impl ScriptedSubstrate {
    pub(crate) fn new() -> Self {
        Self {
            next_id: 0,
            submitted: Vec::new(),
            ready: VecDeque::new(),
            cancelled: Vec::new(),
            lost: false,
        }
    }

    /// Marks a submitted task as completed with the given result.
    pub(crate) fn complete(&mut self, handle: TaskHandle, result: TaskResult) {
        self.ready.push_back((handle, result));
    }

    /// The input captured by the `k`-th submission.
    pub(crate) fn input(&self, k: usize) -> &TaskInput {
        &self.submitted[k].1
    }

    /// The handle of the `k`-th submission.
    pub(crate) fn handle(&self, k: usize) -> TaskHandle {
        self.submitted[k].0
    }
}

impl Substrate for ScriptedSubstrate {
    fn submit(&mut self, input: TaskInput) -> TaskHandle {
        let handle = TaskHandle::new(self.next_id);
        self.next_id += 1;
        self.submitted.push((handle, input));
        handle
    }

    fn cancel(&mut self, handle: TaskHandle) {
        self.cancelled.push(handle);
    }

    async fn next_completed(&mut self) -> Option<(TaskHandle, TaskResult)> {
        if self.lost {
            return None;
        }
        self.ready.pop_front()
    }

    fn try_next_completed(&mut self) -> Option<(TaskHandle, TaskResult)> {
        if self.lost {
            return None;
        }
        self.ready.pop_front()
    }
}
