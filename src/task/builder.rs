//! Task builder for configuring task creation.

use crate::errors::SpawnError;
use crate::sched::priority;

/// Builder for configuring and creating new tasks.
///
/// ```ignore
/// let id = kernel.spawn(
///     TaskBuilder::new(worker)
///         .name("worker")
///         .priority(priority::HIGH)
///         .arg(3),
/// )?;
/// ```
#[derive(Debug, Clone, Copy)]
pub struct TaskBuilder {
    /// Task name (for debugging and `find`)
    name: &'static str,
    /// Entry point, called with `arg`
    entry: fn(usize),
    /// Opaque argument handed to `entry`
    arg: usize,
    /// Task priority (1-254, higher = more important)
    priority: u8,
    /// Whether the task is time-triggered
    time_triggered: bool,
}

impl TaskBuilder {
    /// Create a new task builder with default settings.
    pub fn new(entry: fn(usize)) -> Self {
        Self {
            name: "task",
            entry,
            arg: 0,
            priority: priority::NORMAL,
            time_triggered: false,
        }
    }

    /// Set the task name. Names are not copied, hence `'static`.
    pub fn name(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }

    /// Set the task priority.
    pub fn priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    /// Set the argument passed to the entry point.
    pub fn arg(mut self, arg: usize) -> Self {
        self.arg = arg;
        self
    }

    /// Make this a time-triggered task. It runs at the reserved top
    /// priority and cannot be suspended or deleted.
    pub fn time_triggered(mut self) -> Self {
        self.time_triggered = true;
        self
    }

    pub fn get_name(&self) -> &'static str {
        self.name
    }

    pub(crate) fn entry(&self) -> fn(usize) {
        self.entry
    }

    pub(crate) fn get_arg(&self) -> usize {
        self.arg
    }

    pub fn is_time_triggered(&self) -> bool {
        self.time_triggered
    }

    /// Priority the task will run at, after checking reserved ranks.
    pub fn effective_priority(&self) -> Result<u8, SpawnError> {
        if self.time_triggered {
            Ok(priority::TIME_TRIGGERED)
        } else if priority::is_reserved(self.priority) {
            Err(SpawnError::InvalidPriority(self.priority))
        } else {
            Ok(self.priority)
        }
    }
}
