//! Recursive mutex with priority inheritance.
//!
//! While a task waits for a mutex, the owner runs at least at the waiter's
//! priority. If the owner is itself waiting for another mutex the boost is
//! passed along the chain of owners. Whenever a waiter leaves or a mutex
//! changes hands the owner's priority is recomputed from its base priority
//! and the top waiter of every mutex it still owns, so mutexes may be
//! released in any order.

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

/// Identifier of a mutex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MutexId(pub(crate) Handle);

impl MutexId {
    pub fn handle(self) -> Handle {
        self.0
    }
}

impl fmt::Display for MutexId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mutex#{}", self.0)
    }
}

pub(crate) struct Mutex {
    /// Recursion depth, 0 when unlocked
    pub(crate) depth: u32,
    pub(crate) owner: Option<TaskId>,
    pub(crate) waiters: SortedQueue<ChainRole>,
}

impl Mutex {
    const fn new() -> Self {
        Self {
            depth: 0,
            owner: None,
            waiters: SortedQueue::new(),
        }
    }
}

impl<A: Arch> KernelState<A> {
    /// Raise `holder` to `priority` and follow the chain of owners it is
    /// waiting on.
    pub(crate) fn inherit(&mut self, mut holder: usize, priority: u8) {
        while self.tasks[holder].priority < priority {
            log::debug!(
                "task {} inherits priority {} (was {})",
                self.tasks[holder].name,
                priority,
                self.tasks[holder].priority
            );
            self.set_priority(holder, priority);

            let next_owner = match self.tasks[holder].blocked_on {
                Some(WaitObject::Mutex(m)) => self.mutexes.get(m.0).and_then(|m| m.owner),
                _ => None,
            };
            match next_owner {
                Some(owner) => holder = owner.0.index(),
                None => break,
            }
        }
    }

    /// Priority `ix` is owed: its base priority, raised to the top waiter
    /// of every mutex it owns.
    pub(crate) fn effective_priority(&self, ix: usize) -> u8 {
        let id = self.tasks[ix].id;
        self.mutexes
            .iter()
            .filter(|(_, m)| m.owner == Some(id))
            .filter_map(|(_, m)| m.waiters.front())
            .map(|w| self.tasks[w].priority)
            .fold(self.tasks[ix].base_priority, u8::max)
    }

    /// Recompute the priority of `ix` after it lost a waiter or a mutex.
    pub(crate) fn settle_priority(&mut self, ix: usize) {
        let owed = self.effective_priority(ix);
        if owed != self.tasks[ix].priority {
            log::debug!(
                "task {} settles at priority {} (was {})",
                self.tasks[ix].name,
                owed,
                self.tasks[ix].priority
            );
            self.set_priority(ix, owed);
        }
    }

    /// Undo the boosts a waiter of `id` gave before it left the chain.
    ///
    /// Walks the same chain of owners as [`inherit`](Self::inherit) and
    /// stops at the first owner whose priority does not change.
    pub(crate) fn disinherit(&mut self, id: MutexId) {
        let mut owner = self.mutexes.get(id.0).and_then(|m| m.owner);
        while let Some(holder) = owner {
            let ix = holder.0.index();
            let before = self.tasks[ix].priority;
            self.settle_priority(ix);
            if self.tasks[ix].priority == before {
                break;
            }
            owner = match self.tasks[ix].blocked_on {
                Some(WaitObject::Mutex(m)) => self.mutexes.get(m.0).and_then(|m| m.owner),
                _ => None,
            };
        }
    }

    fn mutex_mut(&mut self, id: MutexId) -> KernelResult<&mut Mutex> {
        self.mutexes
            .get_mut(id.0)
            .ok_or(KernelError::stale(ObjectKind::Mutex))
    }
}

impl<A: Arch> Kernel<A> {
    pub fn mutex_create(&self) -> KernelResult<MutexId> {
        self.ensure_initialized()?;
        let id = self.with_state(|st| MutexId(st.mutexes.insert(Mutex::new())));
        self.objects.register(ObjectKind::Mutex, id.0);
        Ok(id)
    }

    /// Free a mutex. It must be unlocked with nobody waiting.
    pub fn mutex_destroy(&self, mutex: MutexId) -> KernelResult<()> {
        self.with_state(|st| -> KernelResult<()> {
            let m = st.mutex_mut(mutex)?;
            if m.depth > 0 || !m.waiters.is_empty() {
                return Err(PreconditionViolation::InUse(ObjectKind::Mutex).into());
            }
            st.mutexes.remove(mutex.0);
            Ok(())
        })?;
        self.objects.unregister(ObjectKind::Mutex, mutex.0);
        Ok(())
    }

    /// Lock `mutex`, waiting as long as it takes.
    pub fn mutex_lock(&self, mutex: MutexId) -> KernelResult<Wait<Outcome>> {
        self.lock(mutex, None)
    }

    /// Lock `mutex`, giving up after `ticks` ticks. With `ticks == 0` a
    /// held mutex times out at once.
    pub fn mutex_lock_timeout(&self, mutex: MutexId, ticks: Tick) -> KernelResult<Wait<Outcome>> {
        self.lock(mutex, Some(ticks))
    }

    fn lock(&self, mutex: MutexId, timeout: Option<Tick>) -> KernelResult<Wait<Outcome>> {
        self.ensure_task_context()?;
        let deadline = timeout.map(|t| self.ticks.ticks().saturating_add(t));

        let (me, immediate) = self.with_state(|st| -> KernelResult<(TaskId, Option<Outcome>)> {
            let ix = st.caller()?;
            let (me, my_priority) = (st.tasks[ix].id, st.tasks[ix].priority);
            let m = st.mutex_mut(mutex)?;
            match m.owner {
                None => {
                    m.owner = Some(me);
                    m.depth = 1;
                    st.tasks[ix].held += 1;
                    Ok((me, Some(Outcome::ok(0))))
                }
                Some(owner) if owner == me => {
                    m.depth += 1;
                    Ok((me, Some(Outcome::ok(0))))
                }
                Some(_) if timeout == Some(0) => Ok((me, Some(Outcome::timed_out(0)))),
                Some(owner) => {
                    st.inherit(owner.0.index(), my_priority);
                    st.block(
                        ix,
                        TaskState::WAIT | TaskState::MTX,
                        Some(WaitObject::Mutex(mutex)),
                        deadline,
                    );
                    Ok((me, None))
                }
            }
        })?;

        match immediate {
            Some(outcome) => Ok(Wait::Done(outcome)),
            None => Ok(self.suspend_caller(me)),
        }
    }

    /// Unlock `mutex`. Only the owner may unlock; the last unlock of a
    /// recursive lock passes ownership to the highest priority waiter and
    /// drops the owner to what its remaining mutexes still demand.
    pub fn mutex_unlock(&self, mutex: MutexId) -> KernelResult<()> {
        self.ensure_task_context()?;
        self.with_state(|st| -> KernelResult<()> {
            let ix = st.running.ok_or(PreconditionViolation::NoCurrentTask)?;
            let me = st.tasks[ix].id;
            let m = st.mutex_mut(mutex)?;
            if m.owner != Some(me) {
                return Err(PreconditionViolation::NotOwner.into());
            }
            m.depth -= 1;
            if m.depth > 0 {
                return Ok(());
            }
            let next = m.waiters.front();
            m.owner = None;
            st.tasks[ix].held -= 1;

            if let Some(next) = next {
                st.wake(next, Outcome::ok(0));
                let heir = &mut st.tasks[next];
                heir.held += 1;
                let heir_id = heir.id;
                log::debug!("{} handed from {} to {}", mutex, me, heir_id);

                let m = &mut st.mutexes[mutex.0.index()];
                m.owner = Some(heir_id);
                m.depth = 1;
                st.settle_priority(next);
            }
            st.settle_priority(ix);
            Ok(())
        })?;
        self.reschedule();
        Ok(())
    }

    /// Current owner of `mutex`.
    pub fn mutex_owner(&self, mutex: MutexId) -> KernelResult<Option<TaskId>> {
        self.with_state(|st| st.mutex_mut(mutex).map(|m| m.owner))
    }

    /// Name `mutex` in the object table. Ignored if it is not recorded
    /// there.
    pub fn mutex_set_name(&self, mutex: MutexId, name: &'static str) -> KernelResult<()> {
        self.with_state(|st| st.mutex_mut(mutex).map(|_| ()))?;
        self.objects.set_name(ObjectKind::Mutex, mutex.0, name);
        Ok(())
    }

    /// Print every recorded mutex to `out`.
    pub fn show_mutexes(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        let mut entries = Vec::new();
        let error = self
            .objects
            .traverse(ObjectKind::Mutex, |e| entries.push((e.handle, e.name)));

        writeln!(out, "{:<16} {:<16} {:>5}  Waiters", "Name", "Owner", "Depth")?;
        for (handle, name) in entries {
            let row = self.with_state(|st| {
                st.mutexes.get(handle).map(|m| {
                    let owner = m
                        .owner
                        .and_then(|o| st.tasks.get(o.0))
                        .map_or("-", |t| t.name);
                    let waiters: Vec<&'static str> =
                        m.waiters.iter(&st.tasks).map(|ix| st.tasks[ix].name).collect();
                    (owner, m.depth, waiters)
                })
            });
            if let Some((owner, depth, waiters)) = row {
                write!(out, "{:<16} {:<16} {:>5} ", name.unwrap_or("-"), owner, depth)?;
                for waiter in waiters {
                    write!(out, " {}", waiter)?;
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::NoOpArch;
    use crate::config::KernelConfig;
    use crate::kernel::WaitStatus;
    use crate::task::{TaskBuilder, TaskStatus};

    fn entry(_: usize) {}

    fn started() -> Kernel<NoOpArch> {
        let k = Kernel::new(KernelConfig::DEFAULT);
        k.init().unwrap();
        k.start_first_task().unwrap();
        k
    }

    #[test]
    fn uncontended_recursive_lock() {
        let k = started();
        let t = k.spawn(TaskBuilder::new(entry).priority(10)).unwrap();
        let m = k.mutex_create().unwrap();

        assert_eq!(k.mutex_lock(m).unwrap(), Wait::Done(Outcome::ok(0)));
        assert_eq!(k.mutex_lock(m).unwrap(), Wait::Done(Outcome::ok(0)));
        assert_eq!(k.mutex_owner(m).unwrap(), Some(t));

        k.mutex_unlock(m).unwrap();
        assert_eq!(k.mutex_owner(m).unwrap(), Some(t));
        k.mutex_unlock(m).unwrap();
        assert_eq!(k.mutex_owner(m).unwrap(), None);

        assert!(k
            .mutex_unlock(m)
            .unwrap_err()
            .is_precondition(PreconditionViolation::NotOwner));
    }

    #[test]
    fn holder_inherits_and_reverts() {
        let k = started();
        let low = k.spawn(TaskBuilder::new(entry).name("low").priority(5)).unwrap();
        let m = k.mutex_create().unwrap();
        assert!(k.mutex_lock(m).unwrap().done().is_some());

        let high = k.spawn(TaskBuilder::new(entry).name("high").priority(20)).unwrap();
        assert_eq!(k.current(), Some(high));
        assert!(k.mutex_lock(m).unwrap().is_blocked());

        assert_eq!(k.current(), Some(low));
        assert_eq!(k.priority_of(low).unwrap(), 20);
        assert_eq!(
            k.status(high).unwrap(),
            TaskStatus::Blocked(TaskState::WAIT | TaskState::MTX)
        );

        k.mutex_unlock(m).unwrap();
        assert_eq!(k.priority_of(low).unwrap(), 5);
        assert_eq!(k.current(), Some(high));
        assert_eq!(k.mutex_owner(m).unwrap(), Some(high));
        assert_eq!(k.take_outcome(high).unwrap(), Some(Outcome::ok(0)));
    }

    #[test]
    fn waiters_are_served_by_priority() {
        let k = started();
        let owner = k.spawn(TaskBuilder::new(entry).priority(30)).unwrap();
        let m = k.mutex_create().unwrap();
        let _ = k.mutex_lock(m).unwrap();
        assert!(k.delay(1).unwrap().is_blocked());

        let a = k.spawn(TaskBuilder::new(entry).name("a").priority(10)).unwrap();
        assert!(k.mutex_lock(m).unwrap().is_blocked());
        let b = k.spawn(TaskBuilder::new(entry).name("b").priority(15)).unwrap();
        assert!(k.mutex_lock(m).unwrap().is_blocked());

        k.tick();
        assert_eq!(k.current(), Some(owner));
        let _ = k.take_outcome(owner);
        k.mutex_unlock(m).unwrap();
        assert_eq!(k.mutex_owner(m).unwrap(), Some(b));
        assert_eq!(k.current(), Some(owner));

        // b owns it now; once it runs and unlocks, a is next.
        assert!(k.delay(1).unwrap().is_blocked());
        assert_eq!(k.current(), Some(b));
        k.mutex_unlock(m).unwrap();
        assert_eq!(k.mutex_owner(m).unwrap(), Some(a));
    }

    #[test]
    fn zero_timeout_on_held_mutex() {
        let k = started();
        let _owner = k.spawn(TaskBuilder::new(entry).priority(5)).unwrap();
        let m = k.mutex_create().unwrap();
        let _ = k.mutex_lock(m).unwrap();

        let other = k.spawn(TaskBuilder::new(entry).priority(9)).unwrap();
        assert_eq!(
            k.mutex_lock_timeout(m, 0).unwrap(),
            Wait::Done(Outcome::timed_out(0))
        );
        assert_eq!(k.current(), Some(other));
    }

    #[test]
    fn timed_lock_expires() {
        let k = started();
        let owner = k.spawn(TaskBuilder::new(entry).priority(5)).unwrap();
        let m = k.mutex_create().unwrap();
        let _ = k.mutex_lock(m).unwrap();

        let waiter = k.spawn(TaskBuilder::new(entry).priority(9)).unwrap();
        assert!(k.mutex_lock_timeout(m, 3).unwrap().is_blocked());
        assert_eq!(k.current(), Some(owner));

        for _ in 0..3 {
            k.tick();
        }
        let outcome = k.take_outcome(waiter).unwrap().unwrap();
        assert_eq!(outcome.status, WaitStatus::TimedOut);
        assert_eq!(k.current(), Some(waiter));
        assert_eq!(k.mutex_owner(m).unwrap(), Some(owner));
    }

    #[test]
    fn expired_waiter_unwinds_the_whole_chain() {
        let k = started();
        let low = k.spawn(TaskBuilder::new(entry).priority(3)).unwrap();
        let m1 = k.mutex_create().unwrap();
        let _ = k.mutex_lock(m1).unwrap();

        let mid = k.spawn(TaskBuilder::new(entry).priority(5)).unwrap();
        let m2 = k.mutex_create().unwrap();
        let _ = k.mutex_lock(m2).unwrap();
        assert!(k.mutex_lock(m1).unwrap().is_blocked());

        let high = k.spawn(TaskBuilder::new(entry).priority(9)).unwrap();
        assert!(k.mutex_lock_timeout(m2, 4).unwrap().is_blocked());
        assert_eq!(k.priority_of(low).unwrap(), 9);

        for _ in 0..4 {
            k.tick();
        }
        assert_eq!(k.current(), Some(high));
        assert_eq!(k.priority_of(mid).unwrap(), 5);
        // low still holds m1 for mid.
        assert_eq!(k.priority_of(low).unwrap(), 5);
    }

    #[test]
    fn priority_set_applies_once_the_boost_ends() {
        let k = started();
        let owner = k.spawn(TaskBuilder::new(entry).priority(5)).unwrap();
        let m = k.mutex_create().unwrap();
        let _ = k.mutex_lock(m).unwrap();
        let _high = k.spawn(TaskBuilder::new(entry).priority(20)).unwrap();
        assert!(k.mutex_lock(m).unwrap().is_blocked());

        k.priority_set(7).unwrap();
        assert_eq!(k.priority_of(owner).unwrap(), 20);
        k.mutex_unlock(m).unwrap();
        assert_eq!(k.priority_of(owner).unwrap(), 7);
    }

    #[test]
    fn destroy_rules() {
        let k = started();
        let owner = k.spawn(TaskBuilder::new(entry).priority(5)).unwrap();
        let m = k.mutex_create().unwrap();
        let _ = k.mutex_lock(m).unwrap();

        assert!(k
            .mutex_destroy(m)
            .unwrap_err()
            .is_precondition(PreconditionViolation::InUse(ObjectKind::Mutex)));

        let _other = k.spawn(TaskBuilder::new(entry).priority(3)).unwrap();
        assert!(k
            .delete(owner)
            .unwrap_err()
            .is_precondition(PreconditionViolation::DeleteSelf));

        k.mutex_unlock(m).unwrap();
        k.mutex_destroy(m).unwrap();
        assert_eq!(k.mutex_owner(m), Err(KernelError::stale(ObjectKind::Mutex)));
    }

    #[test]
    fn owner_cannot_be_deleted() {
        let k = started();
        let owner = k.spawn(TaskBuilder::new(entry).priority(5)).unwrap();
        let m = k.mutex_create().unwrap();
        let _ = k.mutex_lock(m).unwrap();
        assert!(k.delay(10).unwrap().is_blocked());

        let _killer = k.spawn(TaskBuilder::new(entry).priority(3)).unwrap();
        assert!(k
            .delete(owner)
            .unwrap_err()
            .is_precondition(PreconditionViolation::HoldsMutex));
    }

    #[test]
    fn show_names_owner_and_waiters() {
        let k = started();
        k.spawn(TaskBuilder::new(entry).name("holder").priority(5)).unwrap();
        let m = k.mutex_create().unwrap();
        k.mutex_set_name(m, "bus").unwrap();
        let _ = k.mutex_lock(m).unwrap();
        k.spawn(TaskBuilder::new(entry).name("waiter").priority(8)).unwrap();
        let _ = k.mutex_lock(m).unwrap();

        let mut out = alloc::string::String::new();
        k.show_mutexes(&mut out).unwrap();
        let row = out.lines().nth(1).unwrap();
        assert!(row.starts_with("bus"));
        assert!(row.contains("holder"));
        assert!(row.contains("waiter"));
    }
}
