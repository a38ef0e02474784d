//! Test helper utilities and common functionality.

use crate::arch::NoOpArch;
use crate::config::KernelConfig;
use crate::kernel::{Kernel, Outcome};
use crate::task::{TaskBuilder, TaskId, TaskStatus};

use alloc::vec::Vec;

pub(crate) type TestKernel = Kernel<NoOpArch>;

pub(crate) fn entry(_arg: usize) {}

/// Initialized kernel with the idle task running.
pub(crate) fn started_kernel() -> TestKernel {
    started_with(KernelConfig::DEFAULT)
}

pub(crate) fn started_with(config: KernelConfig) -> TestKernel {
    let k = Kernel::new(config);
    k.init().expect("init");
    k.start_first_task().expect("start");
    k
}

/// Spawn a named task at `priority`.
pub(crate) fn spawn(k: &TestKernel, name: &'static str, priority: u8) -> TaskId {
    k.spawn(TaskBuilder::new(entry).name(name).priority(priority))
        .expect("spawn")
}

/// Name of the running task.
pub(crate) fn running(k: &TestKernel) -> &'static str {
    let id = k.current().expect("no running task");
    k.task_name(id).expect("running task is live")
}

pub(crate) fn run_ticks(k: &TestKernel, n: u64) {
    for _ in 0..n {
        k.tick();
    }
}

/// Tick once per step until `deadline`, recording for each tick which of
/// `tasks` completed a wait on it.
pub(crate) fn collect_wakeups(
    k: &TestKernel,
    tasks: &[TaskId],
    deadline: u64,
) -> Vec<(u64, TaskId, Outcome)> {
    let mut woken = Vec::new();
    while k.tick_get() < deadline {
        k.tick();
        for &t in tasks {
            if let Some(outcome) = k.take_outcome(t).expect("live task") {
                woken.push((k.tick_get(), t, outcome));
            }
        }
    }
    woken
}

/// The running task must be the highest priority task that can run.
pub(crate) fn assert_dispatch_invariant(k: &TestKernel, tasks: &[TaskId]) {
    let current = k.current().expect("kernel started");
    let current_priority = k.priority_of(current).expect("running task is live");
    assert_eq!(k.status(current).unwrap(), TaskStatus::Running);
    for &t in tasks {
        match k.status(t).unwrap() {
            TaskStatus::Ready => assert!(
                k.priority_of(t).unwrap() <= current_priority,
                "{} is ready above the running task",
                t
            ),
            TaskStatus::Running => assert_eq!(t, current),
            _ => {}
        }
    }
}
