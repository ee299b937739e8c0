//! In-memory suspension checkpoints.
//!
//! When a node suspends, the engine parks the entering state here under the
//! session's thread id. The scheduler polls for pending interrupts after
//! every run event and feeds the next inbound message back in as the resume
//! value. One slot per thread: a run has at most one outstanding interrupt.

use std::sync::{Arc, Mutex, MutexGuard};

use rustc_hash::FxHashMap;

use crate::state::{AgentId, ConversationState};

/// A pending human-in-the-loop interrupt.
#[derive(Clone, Debug, PartialEq)]
pub struct InterruptTask {
    /// The node that suspended and will re-run on resume.
    pub agent: AgentId,
    /// Why it suspended, for logs and diagnostics.
    pub reason: String,
}

#[derive(Debug)]
struct SuspendedRun {
    task: InterruptTask,
    state: ConversationState,
}

/// Shared store of suspended runs, keyed by thread id.
#[derive(Clone, Default)]
pub struct CheckpointStore {
    slots: Arc<Mutex<FxHashMap<String, SuspendedRun>>>,
}

impl CheckpointStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, FxHashMap<String, SuspendedRun>> {
        // A poisoned lock only means another thread panicked mid-access;
        // the map itself is still usable.
        self.slots.lock().unwrap_or_else(|poison| poison.into_inner())
    }

    /// Parks a suspended run. Replaces any previous slot for the thread.
    pub fn record_suspend(&self, thread_id: &str, task: InterruptTask, state: ConversationState) {
        self.lock()
            .insert(thread_id.to_string(), SuspendedRun { task, state });
    }

    /// The pending interrupt for a thread, if any.
    #[must_use]
    pub fn pending(&self, thread_id: &str) -> Option<InterruptTask> {
        self.lock().get(thread_id).map(|run| run.task.clone())
    }

    #[must_use]
    pub fn has_pending(&self, thread_id: &str) -> bool {
        self.lock().contains_key(thread_id)
    }

    /// Takes the suspended run for resumption, clearing the slot.
    #[must_use]
    pub fn take_suspended(&self, thread_id: &str) -> Option<(InterruptTask, ConversationState)> {
        self.lock()
            .remove(thread_id)
            .map(|run| (run.task, run.state))
    }

    /// Drops any suspended run for the thread.
    pub fn clear(&self, thread_id: &str) {
        self.lock().remove(thread_id);
    }
}
