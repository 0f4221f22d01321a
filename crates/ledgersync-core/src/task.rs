//! One-shot background tasks.
//!
//! Each retrieval pass or submission gets its own named thread and an owned
//! [`CancellationToken`]. The completion callback runs on that thread once
//! the work is done, before the handle reports the task as finished.

use crate::error::{SyncError, SyncResult};
use ledgersync_parser::CancellationToken;
use std::thread::JoinHandle;

pub struct TaskHandle<T> {
    name: String,
    token: CancellationToken,
    handle: JoinHandle<T>,
}

impl<T> TaskHandle<T> {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Ask the task to stop at its next cancellation check
    pub fn cancel(&self) {
        log::debug!(target: "ledgersync::task", "cancelling {}", self.name);
        self.token.cancel();
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the task and take its result
    pub fn join(self) -> SyncResult<T> {
        self.handle.join().map_err(|_| SyncError::Internal {
            message: format!("task '{}' panicked", self.name),
        })
    }
}

/// Run `work` on a new thread, then hand its result to `on_complete`
pub fn spawn_task<T, W, C>(name: &str, token: CancellationToken, work: W, on_complete: C) -> SyncResult<TaskHandle<T>>
where
    T: Send + 'static,
    W: FnOnce(CancellationToken) -> T + Send + 'static,
    C: FnOnce(&T) + Send + 'static,
{
    let task_token = token.clone();
    let task_name = name.to_string();
    let handle = std::thread::Builder::new()
        .name(format!("ledgersync-{}", name))
        .spawn(move || {
            log::debug!(target: "ledgersync::task", "{} started", task_name);
            let result = work(task_token);
            on_complete(&result);
            log::debug!(target: "ledgersync::task", "{} finished", task_name);
            result
        })
        .map_err(|e| SyncError::Internal {
            message: format!("cannot start task '{}': {}", name, e),
        })?;

    Ok(TaskHandle {
        name: name.to_string(),
        token,
        handle,
    })
}

// ==================== Tests ====================
