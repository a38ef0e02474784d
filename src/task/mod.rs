//! Task control blocks and task lifecycle operations.
//!
//! A task starts out WAITING (as if it had stopped itself) and becomes
//! READY when started. Starts and stops are counted: a stop only takes
//! effect if it is not balanced by an earlier start, and a start only
//! readies the task once every stop has been matched.

use core::fmt;

use crate::arch::Arch;
use crate::errors::{KernelError, KernelResult, ObjectKind, PreconditionViolation, SpawnError};
use crate::kernel::{Kernel, KernelState, Outcome, Wait};
use crate::mem::Handle;
use crate::queue::{Link, Member};
use crate::sched::{priority, ChainRole, DelayRole, ReadyRole};
use crate::sync::{FlagsId, MutexId};
use crate::time::Tick;

extern crate alloc;
use alloc::boxed::Box;
use alloc::vec::Vec;

pub mod builder;

pub use builder::TaskBuilder;

/// Identifier of a task. Becomes stale once the task is deleted or reaped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(pub(crate) Handle);

impl TaskId {
    pub fn handle(self) -> Handle {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task#{}", self.0)
    }
}

bitflags::bitflags! {
    /// Task state word. Every set bit except the attribute bits is a reason
    /// the task cannot run; a task with none of them is ready.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TaskState: u16 {
        /// Exited, waiting to be reaped
        const DEAD = 1 << 0;
        /// Blocked on a resource
        const WAIT = 1 << 1;
        const SEM = 1 << 2;
        const MTX = 1 << 3;
        const SIG = 1 << 4;
        /// Has a deadline in the delay queue
        const DLY = 1 << 5;
        const FLAG = 1 << 6;
        /// Flag wait needs every bit of the mask
        const FLAG_ALL = 1 << 7;
        const MBOX = 1 << 8;
        /// Stopped itself (or never started)
        const STP = 1 << 9;
        const SUSPEND = 1 << 10;
        /// Time-triggered task
        const TT = 1 << 11;
        const TT_YIELD = 1 << 12;
        /// Record was allocated by the kernel
        const CREATE = 1 << 13;
    }
}

impl TaskState {
    /// Bits cleared when a wait ends, by resource or by deadline.
    pub const WAIT_REASONS: Self = Self::from_bits_retain(
        Self::WAIT.bits()
            | Self::SEM.bits()
            | Self::MTX.bits()
            | Self::SIG.bits()
            | Self::DLY.bits()
            | Self::FLAG.bits()
            | Self::FLAG_ALL.bits()
            | Self::MBOX.bits(),
    );

    /// Bits that keep a task off the readiness queue.
    pub const BLOCKING: Self = Self::from_bits_retain(
        Self::WAIT_REASONS.bits() | Self::DEAD.bits() | Self::STP.bits() | Self::SUSPEND.bits(),
    );
}

/// Coarse task state as reported by [`Kernel::status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    /// Created or stopped, waiting for `start`
    Waiting,
    Ready,
    Running,
    /// Delayed, blocked on a resource, or suspended
    Blocked(TaskState),
    /// Exited, not yet reaped
    Dead,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskStatus::Waiting => "WAITING",
            TaskStatus::Ready => "READY",
            TaskStatus::Running => "RUNNING",
            TaskStatus::Blocked(_) => "BLOCKED",
            TaskStatus::Dead => "DEAD",
        };
        f.pad(name)
    }
}

/// Object a blocked task sits in the chain of.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WaitObject {
    Mutex(MutexId),
    Flags(FlagsId),
}

/// Task control block.
pub struct Tcb<A: Arch> {
    pub(crate) id: TaskId,
    pub(crate) name: &'static str,
    /// Current priority, raised above `base_priority` while it owns a
    /// mutex someone more urgent waits for
    pub(crate) priority: u8,
    /// Priority as created or last set
    pub(crate) base_priority: u8,
    pub(crate) state: TaskState,
    /// Starts minus stops; the task is stopped while negative
    pub(crate) start_count: i8,
    pub(crate) ready: Link,
    pub(crate) tick: Link,
    pub(crate) chain: Link,
    pub(crate) blocked_on: Option<WaitObject>,
    /// Mask of the flag wait in progress
    pub(crate) flags_mask: u32,
    /// Result of the last wait, until collected
    pub(crate) outcome: Option<Outcome>,
    /// Number of mutexes owned
    pub(crate) held: u16,
    pub(crate) entry: fn(usize),
    pub(crate) arg: usize,
    /// Boxed so its address survives arena growth
    pub(crate) context: Box<A::SavedContext>,
}

impl<A: Arch> Tcb<A> {
    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn priority(&self) -> u8 {
        self.priority
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    pub fn entry(&self) -> (fn(usize), usize) {
        (self.entry, self.arg)
    }

    /// True if nothing keeps the task off the readiness queue.
    pub fn is_ready(&self) -> bool {
        !self.state.intersects(TaskState::BLOCKING)
    }

    fn is_protected(&self) -> bool {
        self.priority == priority::IDLE || self.state.contains(TaskState::TT)
    }
}

impl<A: Arch> Member<ReadyRole> for Tcb<A> {
    fn link(&self) -> &Link {
        &self.ready
    }
    fn link_mut(&mut self) -> &mut Link {
        &mut self.ready
    }
}

impl<A: Arch> Member<DelayRole> for Tcb<A> {
    fn link(&self) -> &Link {
        &self.tick
    }
    fn link_mut(&mut self) -> &mut Link {
        &mut self.tick
    }
}

impl<A: Arch> Member<ChainRole> for Tcb<A> {
    fn link(&self) -> &Link {
        &self.chain
    }
    fn link_mut(&mut self) -> &mut Link {
        &mut self.chain
    }
}

impl<A: Arch> KernelState<A> {
    /// Allocate a stopped task record.
    pub(crate) fn insert_task(&mut self, builder: TaskBuilder, priority: u8, tt: bool) -> usize {
        let mut context: Box<A::SavedContext> = Box::default();
        A::init_context(&mut *context, builder.entry(), builder.get_arg());

        let mut state = TaskState::STP | TaskState::CREATE;
        if tt {
            state |= TaskState::TT;
        }
        let handle = self.tasks.insert_with(|h| Tcb {
            id: TaskId(h),
            name: builder.get_name(),
            priority,
            base_priority: priority,
            state,
            start_count: -1,
            ready: Link::new(),
            tick: Link::new(),
            chain: Link::new(),
            blocked_on: None,
            flags_mask: 0,
            outcome: None,
            held: 0,
            entry: builder.entry(),
            arg: builder.get_arg(),
            context,
        });
        handle.index()
    }

    /// Count one start; ready the task once it balances its stops.
    pub(crate) fn start_task(&mut self, ix: usize) {
        let task = &mut self.tasks[ix];
        task.start_count = task.start_count.saturating_add(1);
        if task.start_count >= 0 && task.state.contains(TaskState::STP) {
            task.state.remove(TaskState::STP);
            if task.is_ready() {
                self.make_ready(ix);
            }
        }
    }

    pub(crate) fn task_index(&self, id: TaskId) -> KernelResult<usize> {
        if self.tasks.contains(id.0) {
            Ok(id.0.index())
        } else {
            Err(KernelError::stale(ObjectKind::Task))
        }
    }

    pub(crate) fn task_mut(&mut self, id: TaskId) -> KernelResult<&mut Tcb<A>> {
        self.tasks
            .get_mut(id.0)
            .ok_or(KernelError::stale(ObjectKind::Task))
    }

    /// Remove a task from every queue it is in.
    pub(crate) fn detach(&mut self, ix: usize) {
        if self.tasks[ix].is_ready() {
            self.ready.remove(&mut self.tasks, ix);
        }
        self.clear_wait(ix);
    }

    /// Free every dead task record whose context is no longer live.
    pub(crate) fn reap(&mut self) -> usize {
        let running = self.running;
        let dead: Vec<Handle> = self
            .tasks
            .iter()
            .filter(|(h, t)| t.state.contains(TaskState::DEAD) && Some(h.index()) != running)
            .map(|(h, _)| h)
            .collect();
        for &h in &dead {
            if let Some(task) = self.tasks.remove(h) {
                log::debug!("reaped task {}", task.name);
            }
        }
        dead.len()
    }

    fn status_of(&self, ix: usize) -> TaskStatus {
        let task = &self.tasks[ix];
        if task.state.contains(TaskState::DEAD) {
            TaskStatus::Dead
        } else if self.running == Some(ix) {
            TaskStatus::Running
        } else if task.is_ready() {
            TaskStatus::Ready
        } else if task.state.contains(TaskState::STP)
            && !task.state.intersects(TaskState::WAIT_REASONS | TaskState::SUSPEND)
        {
            TaskStatus::Waiting
        } else {
            TaskStatus::Blocked(task.state & TaskState::BLOCKING)
        }
    }
}

impl<A: Arch> Kernel<A> {
    /// Create a task in the WAITING state.
    pub fn create(&self, builder: TaskBuilder) -> KernelResult<TaskId> {
        if !self.is_initialized() {
            return Err(SpawnError::NotInitialized.into());
        }
        let priority = builder.effective_priority()?;
        let id = self.with_state(|st| {
            st.reap();
            let ix = st.insert_task(builder, priority, builder.is_time_triggered());
            st.tasks[ix].id
        });
        log::debug!("created task {} ({}) at priority {}", builder.get_name(), id, priority);
        Ok(id)
    }

    /// Create a task and start it.
    pub fn spawn(&self, builder: TaskBuilder) -> KernelResult<TaskId> {
        let id = self.create(builder)?;
        self.start(id)?;
        Ok(id)
    }

    /// Count a start for `task`, readying it once its stops are balanced.
    ///
    /// Callable from interrupt context.
    pub fn start(&self, task: TaskId) -> KernelResult<()> {
        self.with_state(|st| -> KernelResult<()> {
            let ix = st.task_index(task)?;
            let state = st.tasks[ix].state;
            if state.contains(TaskState::DEAD) {
                return Err(PreconditionViolation::WrongState(state).into());
            }
            st.start_task(ix);
            Ok(())
        })?;
        self.reschedule();
        Ok(())
    }

    /// Stop the calling task until a matching [`Kernel::start`].
    ///
    /// Has no effect if the task was started more often than stopped.
    pub fn stop(&self) -> KernelResult<()> {
        self.ensure_task_context()?;
        let stopped = self.with_state(|st| -> KernelResult<bool> {
            let me = st.caller()?;
            let task = &mut st.tasks[me];
            task.start_count = task.start_count.saturating_sub(1);
            if task.start_count < 0 {
                st.unready(me, TaskState::STP);
                Ok(true)
            } else {
                Ok(false)
            }
        })?;
        if stopped {
            self.reschedule();
        }
        Ok(())
    }

    /// Delete a task. It never runs again and its handle goes stale.
    ///
    /// The caller cannot delete itself, nor the idle task, a
    /// time-triggered task, or a task that owns a mutex.
    pub fn delete(&self, task: TaskId) -> KernelResult<()> {
        self.with_state(|st| -> KernelResult<()> {
            let ix = st.task_index(task)?;
            if st.running == Some(ix) {
                return Err(PreconditionViolation::DeleteSelf.into());
            }
            let tcb = &st.tasks[ix];
            if tcb.is_protected() {
                return Err(PreconditionViolation::ProtectedTask.into());
            }
            if tcb.held > 0 {
                return Err(PreconditionViolation::HoldsMutex.into());
            }
            let waited = tcb.blocked_on;
            st.detach(ix);
            if let Some(WaitObject::Mutex(m)) = waited {
                st.disinherit(m);
            }
            if let Some(tcb) = st.tasks.remove(task.0) {
                log::debug!("deleted task {}", tcb.name);
            }
            Ok(())
        })
    }

    /// Keep `task` off the CPU until [`Kernel::resume`]. A wait that
    /// completes meanwhile still completes; the task just stays parked.
    pub fn suspend(&self, task: TaskId) -> KernelResult<()> {
        self.with_state(|st| -> KernelResult<()> {
            let ix = st.task_index(task)?;
            let tcb = &st.tasks[ix];
            if tcb.is_protected() {
                return Err(PreconditionViolation::ProtectedTask.into());
            }
            if tcb.state.contains(TaskState::DEAD) {
                return Err(PreconditionViolation::WrongState(tcb.state).into());
            }
            st.unready(ix, TaskState::SUSPEND);
            Ok(())
        })?;
        self.reschedule();
        Ok(())
    }

    pub fn resume(&self, task: TaskId) -> KernelResult<()> {
        self.with_state(|st| -> KernelResult<()> {
            let ix = st.task_index(task)?;
            let tcb = &mut st.tasks[ix];
            if !tcb.state.contains(TaskState::SUSPEND) {
                return Err(PreconditionViolation::WrongState(tcb.state).into());
            }
            tcb.state.remove(TaskState::SUSPEND);
            if tcb.is_ready() {
                st.make_ready(ix);
            }
            Ok(())
        })?;
        self.reschedule();
        Ok(())
    }

    /// Delay the calling task for `ticks` ticks.
    ///
    /// A delay of 0 yields to ready tasks of the same priority. The next
    /// tick may come right away, so wait `t + 1` for at least `t` full
    /// tick periods.
    pub fn delay(&self, ticks: Tick) -> KernelResult<Wait<Outcome>> {
        self.ensure_task_context()?;
        if ticks == 0 {
            self.yield_now()?;
            return Ok(Wait::Done(Outcome::ok(0)));
        }
        let deadline = self.ticks.ticks().saturating_add(ticks);
        let me = self.with_state(|st| -> KernelResult<TaskId> {
            let me = st.caller()?;
            st.block(me, TaskState::empty(), None, Some(deadline));
            Ok(st.tasks[me].id)
        })?;
        Ok(self.suspend_caller(me))
    }

    /// Give the CPU to the next ready task of the same priority.
    pub fn yield_now(&self) -> KernelResult<()> {
        self.ensure_task_context()?;
        self.with_state(|st| -> KernelResult<()> {
            let me = st.running.ok_or(PreconditionViolation::NoCurrentTask)?;
            st.rotate(me);
            Ok(())
        })?;
        self.reschedule();
        Ok(())
    }

    /// Terminate the calling task. The record is reclaimed by a later
    /// [`Kernel::reap`].
    pub fn exit(&self) -> KernelResult<()> {
        self.ensure_task_context()?;
        self.with_state(|st| -> KernelResult<()> {
            let me = st.caller()?;
            if st.tasks[me].held > 0 {
                return Err(PreconditionViolation::HoldsMutex.into());
            }
            st.unready(me, TaskState::DEAD);
            log::debug!("task {} exited", st.tasks[me].name);
            Ok(())
        })?;
        self.reschedule();
        Ok(())
    }

    /// Free exited tasks. Returns how many were freed.
    pub fn reap(&self) -> usize {
        self.with_state(|st| st.reap())
    }

    /// The running task.
    pub fn current(&self) -> Option<TaskId> {
        self.with_state(|st| st.running.map(|ix| st.tasks[ix].id))
    }

    /// First live task named `name`, in creation slot order.
    pub fn find(&self, name: &str) -> Option<TaskId> {
        self.with_state(|st| {
            st.tasks
                .iter()
                .find(|(_, t)| t.name == name && !t.state.contains(TaskState::DEAD))
                .map(|(_, t)| t.id)
        })
    }

    pub fn task_name(&self, task: TaskId) -> KernelResult<&'static str> {
        self.with_state(|st| st.task_mut(task).map(|t| t.name))
    }

    pub fn status(&self, task: TaskId) -> KernelResult<TaskStatus> {
        self.with_state(|st| -> KernelResult<TaskStatus> {
            let ix = st.task_index(task)?;
            Ok(st.status_of(ix))
        })
    }

    /// Raw state word of `task`.
    pub fn task_state(&self, task: TaskId) -> KernelResult<TaskState> {
        self.with_state(|st| st.task_mut(task).map(|t| t.state))
    }

    /// Set the base priority of the calling task. While it owns a mutex
    /// with more urgent waiters it keeps running at theirs.
    pub fn priority_set(&self, priority: u8) -> KernelResult<()> {
        self.ensure_task_context()?;
        if priority::is_reserved(priority) {
            return Err(PreconditionViolation::ReservedPriority(priority).into());
        }
        self.with_state(|st| -> KernelResult<()> {
            let me = st.caller()?;
            if st.tasks[me].is_protected() {
                return Err(PreconditionViolation::ProtectedTask.into());
            }
            st.tasks[me].base_priority = priority;
            st.settle_priority(me);
            Ok(())
        })?;
        self.reschedule();
        Ok(())
    }

    /// Priority of the calling task.
    pub fn priority_get(&self) -> KernelResult<u8> {
        self.with_state(|st| -> KernelResult<u8> {
            let me = st.running.ok_or(PreconditionViolation::NoCurrentTask)?;
            Ok(st.tasks[me].priority)
        })
    }

    /// Current (possibly inherited) priority of `task`.
    pub fn priority_of(&self, task: TaskId) -> KernelResult<u8> {
        self.with_state(|st| st.task_mut(task).map(|t| t.priority))
    }

    /// Print every task to `out`.
    pub fn show_tasks(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        let rows: Vec<_> = self.with_state(|st| {
            st.tasks
                .iter()
                .map(|(h, t)| {
                    let wake = t
                        .state
                        .contains(TaskState::DLY)
                        .then(|| t.tick.value());
                    (t.name, t.priority, t.state, st.status_of(h.index()), wake)
                })
                .collect()
        });

        writeln!(out, "{:<16} {:>4} {:>6}  {:<8} {}", "Name", "Prio", "State", "Status", "Wake")?;
        for (name, prio, state, status, wake) in rows {
            write!(out, "{:<16} {:>4} {:#06x}  {:<8}", name, prio, state.bits(), status)?;
            match wake {
                Some(at) => writeln!(out, " {}", at)?,
                None => writeln!(out, " -")?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::NoOpArch;
    use crate::config::KernelConfig;

    fn entry(_: usize) {}

    fn started() -> Kernel<NoOpArch> {
        let k = Kernel::new(KernelConfig::DEFAULT);
        k.init().unwrap();
        k.start_first_task().unwrap();
        k
    }

    #[test]
    fn state_masks() {
        assert!(TaskState::BLOCKING.contains(TaskState::STP | TaskState::DLY));
        assert!(!TaskState::BLOCKING.intersects(TaskState::TT | TaskState::CREATE));
        assert!(!TaskState::WAIT_REASONS.contains(TaskState::SUSPEND));
        assert_eq!(TaskState::STP.bits(), 1 << 9);
    }

    #[test]
    fn create_waits_until_started() {
        let k = started();
        let t = k.create(TaskBuilder::new(entry).name("worker").priority(10)).unwrap();
        assert_eq!(k.status(t).unwrap(), TaskStatus::Waiting);
        assert_ne!(k.current(), Some(t));

        k.start(t).unwrap();
        assert_eq!(k.current(), Some(t));
        assert_eq!(k.status(t).unwrap(), TaskStatus::Running);
        assert!(k.task_state(t).unwrap().contains(TaskState::CREATE));
    }

    #[test]
    fn spawn_rejects_reserved_priority() {
        let k = started();
        let err = k.spawn(TaskBuilder::new(entry).priority(0)).unwrap_err();
        assert_eq!(err, KernelError::Spawn(SpawnError::InvalidPriority(0)));
    }

    #[test]
    fn spawn_before_init_fails() {
        let k: Kernel<NoOpArch> = Kernel::new(KernelConfig::DEFAULT);
        let err = k.spawn(TaskBuilder::new(entry)).unwrap_err();
        assert_eq!(err, KernelError::Spawn(SpawnError::NotInitialized));
    }

    #[test]
    fn stop_and_start_are_counted() {
        let k = started();
        let t = k.spawn(TaskBuilder::new(entry).priority(10)).unwrap();

        // An extra start absorbs the next stop.
        k.start(t).unwrap();
        k.stop().unwrap();
        assert_eq!(k.current(), Some(t));

        k.stop().unwrap();
        assert_eq!(k.status(t).unwrap(), TaskStatus::Waiting);
        assert_ne!(k.current(), Some(t));

        k.start(t).unwrap();
        assert_eq!(k.current(), Some(t));
    }

    #[test]
    fn suspend_and_resume() {
        let k = started();
        let low = k.spawn(TaskBuilder::new(entry).name("low").priority(5)).unwrap();
        let high = k.spawn(TaskBuilder::new(entry).name("high").priority(9)).unwrap();
        assert_eq!(k.current(), Some(high));

        k.suspend(high).unwrap();
        assert_eq!(k.current(), Some(low));
        assert_eq!(
            k.status(high).unwrap(),
            TaskStatus::Blocked(TaskState::SUSPEND)
        );

        k.resume(high).unwrap();
        assert_eq!(k.current(), Some(high));
        assert!(k
            .resume(high)
            .unwrap_err()
            .is_precondition(PreconditionViolation::WrongState(TaskState::CREATE)));
    }

    #[test]
    fn suspended_task_stays_parked_after_delay() {
        let k = started();
        let sleeper = k.spawn(TaskBuilder::new(entry).priority(20)).unwrap();
        let other = k.spawn(TaskBuilder::new(entry).priority(10)).unwrap();
        assert!(k.delay(3).unwrap().is_blocked());
        assert_eq!(k.current(), Some(other));

        k.suspend(sleeper).unwrap();
        for _ in 0..3 {
            k.tick();
        }
        assert_eq!(k.current(), Some(other));
        assert_eq!(
            k.status(sleeper).unwrap(),
            TaskStatus::Blocked(TaskState::SUSPEND)
        );
        assert_eq!(k.take_outcome(sleeper).unwrap(), Some(Outcome::ok(0)));

        k.resume(sleeper).unwrap();
        assert_eq!(k.current(), Some(sleeper));
    }

    #[test]
    fn protected_tasks() {
        let k = started();
        let idle = k.current().unwrap();
        let tt = k
            .create(TaskBuilder::new(entry).name("tt").time_triggered())
            .unwrap();
        assert_eq!(k.priority_of(tt).unwrap(), priority::TIME_TRIGGERED);

        for task in [idle, tt] {
            assert!(k
                .suspend(task)
                .unwrap_err()
                .is_precondition(PreconditionViolation::ProtectedTask));
        }
        assert!(k
            .delete(tt)
            .unwrap_err()
            .is_precondition(PreconditionViolation::ProtectedTask));
        assert!(k
            .delete(idle)
            .unwrap_err()
            .is_precondition(PreconditionViolation::DeleteSelf));
    }

    #[test]
    fn delete_makes_handle_stale() {
        let k = started();
        let runner = k.spawn(TaskBuilder::new(entry).priority(20)).unwrap();
        let victim = k.spawn(TaskBuilder::new(entry).priority(10)).unwrap();
        assert!(k
            .delete(runner)
            .unwrap_err()
            .is_precondition(PreconditionViolation::DeleteSelf));

        k.delete(victim).unwrap();
        assert_eq!(k.status(victim), Err(KernelError::stale(ObjectKind::Task)));
        assert_eq!(k.delete(victim), Err(KernelError::stale(ObjectKind::Task)));
    }

    #[test]
    fn delete_removes_delayed_task() {
        let k = started();
        let sleeper = k.spawn(TaskBuilder::new(entry).priority(20)).unwrap();
        let killer = k.spawn(TaskBuilder::new(entry).priority(10)).unwrap();
        assert!(k.delay(5).unwrap().is_blocked());
        assert_eq!(k.current(), Some(killer));

        k.delete(sleeper).unwrap();
        for _ in 0..10 {
            k.tick();
        }
        assert_eq!(k.current(), Some(killer));
    }

    #[test]
    fn exit_then_reap() {
        let k = started();
        let t = k.spawn(TaskBuilder::new(entry).name("short").priority(10)).unwrap();
        k.exit().unwrap();
        assert_eq!(k.status(t).unwrap(), TaskStatus::Dead);
        assert_eq!(k.find("short"), None);

        assert_eq!(k.reap(), 1);
        assert!(k.status(t).is_err());
        assert_eq!(k.reap(), 0);
    }

    #[test]
    fn priority_set_and_get() {
        let k = started();
        let a = k.spawn(TaskBuilder::new(entry).priority(10)).unwrap();
        let b = k.spawn(TaskBuilder::new(entry).priority(8)).unwrap();
        assert_eq!(k.current(), Some(a));
        assert_eq!(k.priority_get().unwrap(), 10);

        k.priority_set(5).unwrap();
        assert_eq!(k.current(), Some(b));
        assert_eq!(k.priority_of(a).unwrap(), 5);

        assert!(k
            .priority_set(255)
            .unwrap_err()
            .is_precondition(PreconditionViolation::ReservedPriority(255)));
    }

    #[test]
    fn find_and_names() {
        let k = started();
        let a = k.create(TaskBuilder::new(entry).name("alpha")).unwrap();
        let _b = k.create(TaskBuilder::new(entry).name("beta")).unwrap();
        assert_eq!(k.find("alpha"), Some(a));
        assert_eq!(k.find("gamma"), None);
        assert_eq!(k.task_name(a).unwrap(), "alpha");
    }

    #[test]
    fn show_lists_every_task() {
        let k = started();
        k.spawn(TaskBuilder::new(entry).name("shown").priority(3)).unwrap();
        let mut out = alloc::string::String::new();
        k.show_tasks(&mut out).unwrap();
        assert!(out.starts_with("Name"));
        assert!(out.contains("idle"));
        assert!(out.contains("shown"));
        assert!(out.contains("RUNNING"));
        assert_eq!(out.lines().count(), 3);
    }
}
