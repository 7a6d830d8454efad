//! Owns every long-running task.
//!
//! Tasks are spawned once during startup with fixed stack sizes and a common
//! priority. After [`TaskSupervisor::seal`] the task set is frozen for the life
//! of the process.

use anyhow::{bail, Context, Result};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::thread::{self, JoinHandle};
use tracing::{info, warn};

/// Priority shared by all sensing and notification tasks.
pub const TASK_PRIORITY: u8 = 5;

/// Fixed resource budget for one task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskSpec {
    pub name: &'static str,
    pub stack_size: usize,
    pub priority: u8,
}

impl TaskSpec {
    pub const fn new(name: &'static str, stack_size: usize) -> Self {
        Self {
            name,
            stack_size,
            priority: TASK_PRIORITY,
        }
    }
}

/// Cooperative stop signal. Device builds never clear it; tests and host
/// shutdown do.
#[derive(Debug, Clone)]
pub struct RunFlag {
    running: Arc<AtomicBool>,
}

impl RunFlag {
    pub fn new() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::Relaxed);
    }
}

impl Default for RunFlag {
    fn default() -> Self {
        Self::new()
    }
}

struct Task {
    spec: TaskSpec,
    handle: JoinHandle<()>,
}

#[derive(Default)]
pub struct TaskSupervisor {
    tasks: Vec<Task>,
    sealed: bool,
}

impl TaskSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start `body` on its own thread with the budget in `spec`.
    pub fn spawn<F>(&mut self, spec: TaskSpec, body: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        if self.sealed {
            bail!("task '{}' requested after startup completed", spec.name);
        }
        if self.tasks.iter().any(|task| task.spec.name == spec.name) {
            bail!("task '{}' already exists", spec.name);
        }
        let handle = thread::Builder::new()
            .name(spec.name.to_string())
            .stack_size(spec.stack_size)
            .spawn(body)
            .with_context(|| format!("failed to spawn task '{}'", spec.name))?;
        info!(
            task = spec.name,
            stack_bytes = spec.stack_size,
            priority = spec.priority,
            "task started"
        );
        self.tasks.push(Task { spec, handle });
        Ok(())
    }

    /// Freeze the task set. Called once the startup task hands over.
    pub fn seal(&mut self) {
        self.sealed = true;
        info!(tasks = self.tasks.len(), "steady state reached; startup task done");
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    pub fn task_names(&self) -> Vec<&'static str> {
        self.tasks.iter().map(|task| task.spec.name).collect()
    }

    /// Block until every task has returned. On the device this never happens.
    pub fn wait(self) {
        for task in self.tasks {
            if task.handle.join().is_err() {
                warn!(task = task.spec.name, "task panicked");
            } else {
                info!(task = task.spec.name, "task exited");
            }
        }
    }
}
