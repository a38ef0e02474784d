//! Event flag groups.
//!
//! A group is a 32-bit word. Tasks wait until all, or any, of the bits in
//! a mask are set. Setting bits never clears them again; waiters that want
//! edge semantics clear the bits they consumed.

use core::fmt;

use crate::arch::Arch;
use crate::errors::{KernelError, KernelResult, ObjectKind, PreconditionViolation};
use crate::kernel::{Kernel, KernelState, Outcome, Wait};
use crate::mem::Handle;
use crate::queue::SortedQueue;
use crate::sched::ChainRole;
use crate::task::{TaskId, TaskState, WaitObject};
use crate::time::Tick;

extern crate alloc;
use alloc::vec::Vec;

/// Identifier of a flag group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FlagsId(pub(crate) Handle);

impl FlagsId {
    pub fn handle(self) -> Handle {
        self.0
    }
}

impl fmt::Display for FlagsId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "flags#{}", self.0)
    }
}

/// Which bits of the mask must be set to end a wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitMode {
    /// Every bit of the mask
    All,
    /// At least one bit of the mask
    Any,
}

impl WaitMode {
    pub fn satisfied(self, value: u32, mask: u32) -> bool {
        match self {
            WaitMode::All => value & mask == mask,
            WaitMode::Any => value & mask != 0,
        }
    }

    fn of(state: TaskState) -> Self {
        if state.contains(TaskState::FLAG_ALL) {
            WaitMode::All
        } else {
            WaitMode::Any
        }
    }
}

pub(crate) struct FlagGroup {
    pub(crate) value: u32,
    pub(crate) waiters: SortedQueue<ChainRole>,
}

impl<A: Arch> KernelState<A> {
    fn group_mut(&mut self, id: FlagsId) -> KernelResult<&mut FlagGroup> {
        self.flags
            .get_mut(id.0)
            .ok_or(KernelError::stale(ObjectKind::Flags))
    }
}

impl<A: Arch> Kernel<A> {
    pub fn flags_create(&self, initial: u32) -> KernelResult<FlagsId> {
        self.ensure_initialized()?;
        let id = self.with_state(|st| {
            FlagsId(st.flags.insert(FlagGroup {
                value: initial,
                waiters: SortedQueue::new(),
            }))
        });
        self.objects.register(ObjectKind::Flags, id.0);
        Ok(id)
    }

    /// Free a flag group. Nobody may be waiting on it.
    pub fn flags_destroy(&self, flags: FlagsId) -> KernelResult<()> {
        self.with_state(|st| -> KernelResult<()> {
            if !st.group_mut(flags)?.waiters.is_empty() {
                return Err(PreconditionViolation::InUse(ObjectKind::Flags).into());
            }
            st.flags.remove(flags.0);
            Ok(())
        })?;
        self.objects.unregister(ObjectKind::Flags, flags.0);
        Ok(())
    }

    pub fn flags_get(&self, flags: FlagsId) -> KernelResult<u32> {
        self.with_state(|st| st.group_mut(flags).map(|g| g.value))
    }

    /// Set the bits in `mask` and wake every waiter that is now satisfied,
    /// in priority order. Callable from interrupt context.
    pub fn flags_set(&self, flags: FlagsId, mask: u32) -> KernelResult<()> {
        let woken = self.with_state(|st| -> KernelResult<usize> {
            let group = st.group_mut(flags)?;
            group.value |= mask;
            let value = group.value;

            let mut woken = 0;
            let mut cursor = group.waiters.head();
            while let Some(ix) = cursor {
                cursor = st.flags[flags.0.index()].waiters.next(&st.tasks, ix);
                let task = &st.tasks[ix];
                if WaitMode::of(task.state).satisfied(value, task.flags_mask) {
                    st.wake(ix, Outcome::ok(value));
                    woken += 1;
                }
            }
            Ok(woken)
        })?;
        if woken > 0 {
            self.reschedule();
        }
        Ok(())
    }

    /// Clear the bits in `mask`. Never wakes anyone.
    pub fn flags_clear(&self, flags: FlagsId, mask: u32) -> KernelResult<()> {
        self.with_state(|st| -> KernelResult<()> {
            st.group_mut(flags)?.value &= !mask;
            Ok(())
        })
    }

    /// Wait until every bit in `mask` is set. The outcome carries the
    /// group value at wake-up.
    pub fn flags_wait_all(&self, flags: FlagsId, mask: u32) -> KernelResult<Wait<Outcome>> {
        self.flags_wait(flags, mask, WaitMode::All, None)
    }

    pub fn flags_wait_all_timeout(
        &self,
        flags: FlagsId,
        mask: u32,
        ticks: Tick,
    ) -> KernelResult<Wait<Outcome>> {
        self.flags_wait(flags, mask, WaitMode::All, Some(ticks))
    }

    /// Wait until any bit in `mask` is set.
    pub fn flags_wait_any(&self, flags: FlagsId, mask: u32) -> KernelResult<Wait<Outcome>> {
        self.flags_wait(flags, mask, WaitMode::Any, None)
    }

    pub fn flags_wait_any_timeout(
        &self,
        flags: FlagsId,
        mask: u32,
        ticks: Tick,
    ) -> KernelResult<Wait<Outcome>> {
        self.flags_wait(flags, mask, WaitMode::Any, Some(ticks))
    }

    /// Wait on `flags` in `mode`, forever or for `timeout` ticks. A
    /// satisfied predicate returns at once with the current value; a zero
    /// timeout on an unsatisfied one times out at once.
    pub fn flags_wait(
        &self,
        flags: FlagsId,
        mask: u32,
        mode: WaitMode,
        timeout: Option<Tick>,
    ) -> KernelResult<Wait<Outcome>> {
        self.ensure_task_context()?;
        if mask == 0 {
            return Err(PreconditionViolation::EmptyMask.into());
        }
        let deadline = timeout.map(|t| self.ticks.ticks().saturating_add(t));

        let (me, immediate) = self.with_state(|st| -> KernelResult<(TaskId, Option<Outcome>)> {
            let ix = st.caller()?;
            let me = st.tasks[ix].id;
            let value = st.group_mut(flags)?.value;
            if mode.satisfied(value, mask) {
                return Ok((me, Some(Outcome::ok(value))));
            }
            if timeout == Some(0) {
                return Ok((me, Some(Outcome::timed_out(value))));
            }

            let mut reason = TaskState::WAIT | TaskState::FLAG;
            if mode == WaitMode::All {
                reason |= TaskState::FLAG_ALL;
            }
            st.tasks[ix].flags_mask = mask;
            st.block(ix, reason, Some(WaitObject::Flags(flags)), deadline);
            Ok((me, None))
        })?;

        match immediate {
            Some(outcome) => Ok(Wait::Done(outcome)),
            None => Ok(self.suspend_caller(me)),
        }
    }

    /// Name `flags` in the object table. Ignored if it is not recorded
    /// there.
    pub fn flags_set_name(&self, flags: FlagsId, name: &'static str) -> KernelResult<()> {
        self.with_state(|st| st.group_mut(flags).map(|_| ()))?;
        self.objects.set_name(ObjectKind::Flags, flags.0, name);
        Ok(())
    }

    /// Print every recorded flag group to `out`.
    pub fn show_flags(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        let mut entries = Vec::new();
        let error = self
            .objects
            .traverse(ObjectKind::Flags, |e| entries.push((e.handle, e.name)));

        writeln!(out, "{:<16} {:<10}  Waiters", "Name", "Value")?;
        for (handle, name) in entries {
            let row = self.with_state(|st| {
                st.flags.get(handle).map(|g| {
                    let waiters: Vec<(&'static str, u32)> = g
                        .waiters
                        .iter(&st.tasks)
                        .map(|ix| (st.tasks[ix].name, st.tasks[ix].flags_mask))
                        .collect();
                    (g.value, waiters)
                })
            });
            if let Some((value, waiters)) = row {
                write!(out, "{:<16} {:#010x} ", name.unwrap_or("-"), value)?;
                for (waiter, mask) in waiters {
                    write!(out, " {}({:#x})", waiter, mask)?;
                }
                writeln!(out)?;
            }
        }
        if let Some(error) = error {
            writeln!(out, "{}", error)?;
        }
        Ok(())
    }
}
