//! The preemption manager.
//!
//! A slow path yields at designated checkpoints; the manager hands it
//! queued preempting tasks to run against the previously committed state,
//! and owns the decision to cancel the in-flight work outright when a new
//! edit makes it obsolete. No stackful coroutines: just a cooperative
//! "should I yield" check plus ownership of the mutable state copy.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use beryl_core::EpochManager;
use parking_lot::Mutex;

use crate::typechecker::Typechecker;

/// A task that runs on the typechecker thread between slow-path phases.
pub type PreemptTask = Box<dyn FnOnce(&mut Typechecker) + Send>;

/// Shared between the typechecker thread and the message loop.
pub struct PreemptionManager {
    tasks: Mutex<VecDeque<PreemptTask>>,
    slow_path_running: AtomicBool,
    epochs: Arc<EpochManager>,
}

impl PreemptionManager {
    /// Creates a manager bound to the typechecker's epoch state.
    pub fn new(epochs: Arc<EpochManager>) -> PreemptionManager {
        PreemptionManager {
            tasks: Mutex::new(VecDeque::new()),
            slow_path_running: AtomicBool::new(false),
            epochs,
        }
    }

    /// Queues `task` to preempt the in-flight slow path. Returns `false`
    /// (task given back) when no slow path is running, in which case the
    /// caller submits it to the ordinary queue instead.
    pub fn try_preempt(&self, task: PreemptTask) -> Result<(), PreemptTask> {
        // Hold the lock across the check so a slow path finishing
        // concurrently still drains the queue it saw.
        let mut tasks = self.tasks.lock();
        if !self.slow_path_running.load(Ordering::SeqCst) {
            return Err(task);
        }
        tasks.push_back(task);
        Ok(())
    }

    /// Requests cancellation of the in-flight slow path, if any. The
    /// running work observes it at its next checkpoint.
    pub fn cancel_in_flight(&self) {
        if self.slow_path_running.load(Ordering::SeqCst) {
            log::debug!("requesting cancellation of the in-flight slow path");
            self.epochs.request_cancellation();
        }
    }

    pub(crate) fn take_task(&self) -> Option<PreemptTask> {
        self.tasks.lock().pop_front()
    }

    pub(crate) fn set_slow_path_running(&self, running: bool) {
        // Taken under the task lock: once this returns false, no racing
        // `try_preempt` can still enqueue against the finished run.
        let _tasks = self.tasks.lock();
        self.slow_path_running.store(running, Ordering::SeqCst);
    }

    pub(crate) fn drain_into_queue(&self) -> Vec<PreemptTask> {
        self.tasks.lock().drain(..).collect()
    }
}
