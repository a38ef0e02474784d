//! Priority-preemptive dispatcher.
//!
//! The running task is always the head of the readiness queue. Ready tasks
//! are ordered by priority with FIFO among equals, so a task that yields or
//! wakes goes behind every ready task of its own priority and round-robin
//! only happens when tasks give up the CPU voluntarily.
//!
//! This module owns the task-side queue bookkeeping: readiness, delay
//! deadlines and the blocked-on chains of mutexes and flag groups.

use crate::arch::Arch;
use crate::kernel::{KernelState, Outcome};
use crate::queue::{End, Key, Role};
use crate::task::{TaskState, WaitObject};
use crate::time::Tick;

/// Priority levels for tasks.
///
/// Higher numbers are more urgent. The two extremes are reserved.
pub mod priority {
    /// Idle priority - only the idle task runs here
    pub const IDLE: u8 = 0;

    /// Lowest priority available to applications
    pub const MIN: u8 = 1;

    /// Low priority - background tasks
    pub const LOW: u8 = 64;

    /// Normal priority - default for most tasks
    pub const NORMAL: u8 = 128;

    /// High priority - important system tasks
    pub const HIGH: u8 = 192;

    /// Highest priority available to applications
    pub const MAX: u8 = 254;

    /// Reserved for time-triggered tasks
    pub const TIME_TRIGGERED: u8 = 255;

    /// True for the ranks applications may not request.
    pub const fn is_reserved(priority: u8) -> bool {
        priority == IDLE || priority == TIME_TRIGGERED
    }
}

/// Readiness queue: keyed by priority, served from the head.
#[derive(Debug)]
pub struct ReadyRole;

/// Delay queue: keyed by absolute wake tick, soonest at the tail.
#[derive(Debug)]
pub struct DelayRole;

/// Blocked-on chain of a mutex or flag group: keyed by requester priority.
#[derive(Debug)]
pub struct ChainRole;

impl Role for ReadyRole {
    const FRONT: End = End::Head;
}

impl Role for DelayRole {
    const FRONT: End = End::Tail;
}

impl Role for ChainRole {
    const FRONT: End = End::Head;
}

impl<A: Arch> KernelState<A> {
    /// Queue a task for the CPU behind every ready task of equal priority.
    pub(crate) fn make_ready(&mut self, ix: usize) {
        let task = &mut self.tasks[ix];
        task.ready.set_value(Key::from(task.priority));
        self.ready.insert(&mut self.tasks, ix);
    }

    /// Take a ready task off the readiness queue and give it `reason`.
    pub(crate) fn unready(&mut self, ix: usize, reason: TaskState) {
        if self.tasks[ix].is_ready() {
            self.ready.remove(&mut self.tasks, ix);
        }
        self.tasks[ix].state.insert(reason);
    }

    /// Move the running task behind its equals.
    pub(crate) fn rotate(&mut self, ix: usize) {
        self.ready.remove(&mut self.tasks, ix);
        self.make_ready(ix);
    }

    /// Pick the readiness head. Returns the contexts to switch between if
    /// it differs from the running task.
    pub(crate) fn dispatch(&mut self) -> Option<(*mut A::SavedContext, *const A::SavedContext)> {
        let next = self.ready.front()?;
        if self.running == Some(next) {
            return None;
        }
        let prev = self.running.replace(next);

        let prev_ctx: *mut A::SavedContext = match prev {
            Some(p) => {
                log::trace!(
                    "switch {} -> {}",
                    self.tasks[p].name,
                    self.tasks[next].name
                );
                &mut *self.tasks[p].context
            }
            None => {
                log::trace!("first switch -> {}", self.tasks[next].name);
                &mut **self.boot_context.as_mut()?
            }
        };
        let next_ctx: *const A::SavedContext = &*self.tasks[next].context;
        Some((prev_ctx, next_ctx))
    }

    /// Put the running task to sleep on `reason`, optionally on the chain
    /// of `on` and optionally until `deadline`.
    pub(crate) fn block(
        &mut self,
        ix: usize,
        reason: TaskState,
        on: Option<WaitObject>,
        deadline: Option<Tick>,
    ) {
        self.unready(ix, reason);
        let task = &mut self.tasks[ix];
        task.outcome = None;
        task.blocked_on = on;
        if let Some(obj) = on {
            self.chain(ix, obj);
        }
        if let Some(at) = deadline {
            self.tasks[ix].state.insert(TaskState::DLY);
            self.tasks[ix].tick.set_value(at);
            self.delayed.insert(&mut self.tasks, ix);
        }
    }

    /// End whatever wait `ix` is in and hand it `outcome`.
    ///
    /// The task leaves the delay queue and its blocked-on chain; it becomes
    /// ready unless it is suspended.
    pub(crate) fn wake(&mut self, ix: usize, outcome: Outcome) {
        self.clear_wait(ix);
        let task = &mut self.tasks[ix];
        task.outcome = Some(outcome);
        if task.is_ready() {
            self.make_ready(ix);
        }
    }

    /// Drop a task from the delay queue and its blocked-on chain and clear
    /// its wait bits.
    pub(crate) fn clear_wait(&mut self, ix: usize) {
        if self.tasks[ix].state.contains(TaskState::DLY) {
            self.delayed.remove(&mut self.tasks, ix);
        }
        if let Some(obj) = self.tasks[ix].blocked_on.take() {
            self.unchain(ix, obj);
        }
        self.tasks[ix].state.remove(TaskState::WAIT_REASONS);
    }

    /// Wake every delayed task whose deadline is at or before `now`,
    /// soonest first.
    pub(crate) fn expire_delays(&mut self, now: Tick) {
        while let Some(ix) = self.delayed.front() {
            if self.tasks[ix].tick.value() > now {
                break;
            }
            let on = self.tasks[ix].blocked_on;
            let outcome = match on {
                None => Outcome::ok(0),
                Some(WaitObject::Mutex(_)) => Outcome::timed_out(0),
                Some(WaitObject::Flags(f)) => {
                    Outcome::timed_out(self.flags.get(f.handle()).map_or(0, |g| g.value))
                }
            };
            self.wake(ix, outcome);
            if let Some(WaitObject::Mutex(m)) = on {
                self.disinherit(m);
            }
        }
    }

    /// Change a task's priority and reposition it in the readiness queue or
    /// the chain it waits in.
    pub(crate) fn set_priority(&mut self, ix: usize, priority: u8) {
        if self.tasks[ix].priority == priority {
            return;
        }
        let ready = self.tasks[ix].is_ready();
        let chained = self.tasks[ix].blocked_on;

        if ready {
            self.ready.remove(&mut self.tasks, ix);
        }
        if let Some(obj) = chained {
            self.unchain(ix, obj);
        }
        self.tasks[ix].priority = priority;
        if ready {
            self.make_ready(ix);
        }
        if let Some(obj) = chained {
            self.chain(ix, obj);
        }
    }

    fn chain(&mut self, ix: usize, obj: WaitObject) {
        let KernelState {
            tasks,
            mutexes,
            flags,
            ..
        } = self;
        let key = Key::from(tasks[ix].priority);
        tasks[ix].chain.set_value(key);
        match obj {
            WaitObject::Mutex(m) => {
                if let Some(mutex) = mutexes.get_mut(m.handle()) {
                    mutex.waiters.insert(tasks, ix);
                }
            }
            WaitObject::Flags(f) => {
                if let Some(group) = flags.get_mut(f.handle()) {
                    group.waiters.insert(tasks, ix);
                }
            }
        }
    }

    fn unchain(&mut self, ix: usize, obj: WaitObject) {
        let KernelState {
            tasks,
            mutexes,
            flags,
            ..
        } = self;
        match obj {
            WaitObject::Mutex(m) => {
                if let Some(mutex) = mutexes.get_mut(m.handle()) {
                    mutex.waiters.remove(tasks, ix);
                }
            }
            WaitObject::Flags(f) => {
                if let Some(group) = flags.get_mut(f.handle()) {
                    group.waiters.remove(tasks, ix);
                }
            }
        }
    }
}
