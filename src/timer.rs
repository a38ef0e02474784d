//! Software timers driven by the tick.
//!
//! Armed timers sit in one deadline queue keyed by absolute expiry. Each
//! tick detaches the whole queue into a draining queue in O(1), fires the
//! expired members soonest first and merges the rest back. Starts issued by
//! callbacks during a drain land in the (now empty) armed queue, so a timer
//! restarted from its own callback never fires twice in one tick.
//!
//! Callbacks run in interrupt context with the kernel lock released. They
//! may start, stop and set timers or set flags but must not block.

use core::fmt;

use crate::arch::Arch;
use crate::errors::{KernelError, KernelResult, ObjectKind, PreconditionViolation};
use crate::kernel::{Kernel, KernelState};
use crate::mem::Handle;
use crate::queue::{End, Link, Member, Role};
use crate::time::Tick;

extern crate alloc;
use alloc::vec::Vec;

/// Identifier of a software timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(pub(crate) Handle);

impl TimerId {
    pub fn handle(self) -> Handle {
        self.0
    }
}

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timer#{}", self.0)
    }
}

/// Timer deadline queue: keyed by absolute expiry, soonest at the tail.
#[derive(Debug)]
pub struct TimerRole;

impl Role for TimerRole {
    const FRONT: End = End::Tail;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerMode {
    /// Disarms after firing once
    OneShot,
    /// Re-arms itself with the same timeout on every expiry
    Cyclic,
}

/// Timer callback, run from the tick with the timer and its argument.
pub type TimerCallback<A> = fn(&Kernel<A>, TimerId, usize);

pub(crate) struct Timer<A: Arch> {
    pub(crate) id: TimerId,
    /// Ticks from start to expiry; also the period of a cyclic timer
    pub(crate) timeout: Tick,
    pub(crate) mode: TimerMode,
    pub(crate) callback: TimerCallback<A>,
    pub(crate) arg: usize,
    pub(crate) armed: bool,
    /// Drain epoch current when the timer was last armed
    pub(crate) epoch: u64,
    pub(crate) link: Link,
}

impl<A: Arch> Member<TimerRole> for Timer<A> {
    fn link(&self) -> &Link {
        &self.link
    }
    fn link_mut(&mut self) -> &mut Link {
        &mut self.link
    }
}

impl<A: Arch> KernelState<A> {
    fn timer_index(&self, id: TimerId) -> KernelResult<usize> {
        if self.timers.contains(id.0) {
            Ok(id.0.index())
        } else {
            Err(KernelError::stale(ObjectKind::Timer))
        }
    }

    fn arm(&mut self, ix: usize, expiry: Tick) {
        let epoch = self.drain_epoch;
        let timer = &mut self.timers[ix];
        timer.armed = true;
        timer.epoch = epoch;
        timer.link.set_value(expiry);
        self.armed.insert(&mut self.timers, ix);
    }

    fn disarm(&mut self, ix: usize) {
        let timer = &self.timers[ix];
        if !timer.armed {
            return;
        }
        if self.draining_active && timer.epoch < self.drain_epoch {
            self.draining.remove(&mut self.timers, ix);
        } else {
            self.armed.remove(&mut self.timers, ix);
        }
        self.timers[ix].armed = false;
    }

    /// Detach every armed timer into the draining queue.
    pub(crate) fn begin_drain(&mut self) {
        self.drain_epoch += 1;
        self.armed.copy_into(&mut self.draining);
        self.draining_active = true;
    }

    /// Take the soonest draining timer if it has expired by `now`.
    ///
    /// A cyclic timer is re-armed before its callback is handed out; a
    /// one-shot timer is disarmed.
    pub(crate) fn next_expired(
        &mut self,
        now: Tick,
    ) -> Option<(TimerId, TimerCallback<A>, usize)> {
        let ix = self.draining.front()?;
        if self.timers[ix].link.value() > now {
            return None;
        }
        self.draining.remove(&mut self.timers, ix);

        let timer = &mut self.timers[ix];
        let fired = (timer.id, timer.callback, timer.arg);
        match timer.mode {
            TimerMode::Cyclic => {
                let expiry = now.saturating_add(timer.timeout);
                self.arm(ix, expiry);
            }
            TimerMode::OneShot => timer.armed = false,
        }
        Some(fired)
    }

    /// Merge the unexpired remainder back into the armed queue.
    pub(crate) fn end_drain(&mut self) {
        if self.armed.is_empty() {
            self.draining.copy_into(&mut self.armed);
        } else {
            while let Ok(ix) = self.draining.pop_front(&mut self.timers) {
                self.armed.insert(&mut self.timers, ix);
            }
        }
        self.draining_active = false;
    }
}

impl<A: Arch> Kernel<A> {
    /// Create a disarmed timer that calls `callback(kernel, id, arg)`
    /// `timeout` ticks after it is started.
    pub fn timer_create(
        &self,
        timeout: Tick,
        callback: TimerCallback<A>,
        arg: usize,
        mode: TimerMode,
    ) -> KernelResult<TimerId> {
        self.ensure_initialized()?;
        let id = self.with_state(|st| {
            TimerId(st.timers.insert_with(|handle| Timer {
                id: TimerId(handle),
                timeout,
                mode,
                callback,
                arg,
                armed: false,
                epoch: 0,
                link: Link::new(),
            }))
        });
        self.objects.register(ObjectKind::Timer, id.0);
        Ok(id)
    }

    /// Free a stopped timer.
    pub fn timer_destroy(&self, timer: TimerId) -> KernelResult<()> {
        self.with_state(|st| -> KernelResult<()> {
            let ix = st.timer_index(timer)?;
            if st.timers[ix].armed {
                return Err(PreconditionViolation::InUse(ObjectKind::Timer).into());
            }
            st.timers.remove(timer.0);
            Ok(())
        })?;
        self.objects.unregister(ObjectKind::Timer, timer.0);
        Ok(())
    }

    /// Arm the timer to expire `timeout` ticks from now.
    pub fn timer_start(&self, timer: TimerId) -> KernelResult<()> {
        let now = self.ticks.ticks();
        self.with_state(|st| -> KernelResult<()> {
            let ix = st.timer_index(timer)?;
            if st.timers[ix].armed {
                return Err(PreconditionViolation::TimerArmed.into());
            }
            let expiry = now.saturating_add(st.timers[ix].timeout);
            st.arm(ix, expiry);
            Ok(())
        })
    }

    /// Disarm the timer. Stopping a stopped timer does nothing.
    pub fn timer_stop(&self, timer: TimerId) -> KernelResult<()> {
        self.with_state(|st| -> KernelResult<()> {
            let ix = st.timer_index(timer)?;
            st.disarm(ix);
            Ok(())
        })
    }

    /// Change the timeout of a stopped timer.
    pub fn timer_set(&self, timer: TimerId, timeout: Tick) -> KernelResult<()> {
        self.with_state(|st| -> KernelResult<()> {
            let ix = st.timer_index(timer)?;
            if st.timers[ix].armed {
                return Err(PreconditionViolation::TimerArmed.into());
            }
            st.timers[ix].timeout = timeout;
            Ok(())
        })
    }

    pub fn timer_is_armed(&self, timer: TimerId) -> KernelResult<bool> {
        self.with_state(|st| -> KernelResult<bool> {
            let ix = st.timer_index(timer)?;
            Ok(st.timers[ix].armed)
        })
    }

    /// Absolute tick the timer fires at, if armed.
    pub fn timer_expiry(&self, timer: TimerId) -> KernelResult<Option<Tick>> {
        self.with_state(|st| -> KernelResult<Option<Tick>> {
            let ix = st.timer_index(timer)?;
            let t = &st.timers[ix];
            Ok(t.armed.then(|| t.link.value()))
        })
    }

    pub fn timer_set_name(&self, timer: TimerId, name: &'static str) -> KernelResult<()> {
        self.with_state(|st| st.timer_index(timer).map(|_| ()))?;
        self.objects.set_name(ObjectKind::Timer, timer.0, name);
        Ok(())
    }

    /// Print every recorded timer to `out`.
    pub fn show_timers(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        let mut entries = Vec::new();
        let error = self
            .objects
            .traverse(ObjectKind::Timer, |e| entries.push((e.handle, e.name)));

        writeln!(
            out,
            "{:<16} {:<8} {:>8} {:<6} Expiry",
            "Name", "Mode", "Timeout", "Armed"
        )?;
        for (handle, name) in entries {
            let row = self.with_state(|st| {
                st.timers
                    .get(handle)
                    .map(|t| (t.mode, t.timeout, t.armed, t.link.value()))
            });
            if let Some((mode, timeout, armed, expiry)) = row {
                let mode = match mode {
                    TimerMode::OneShot => "oneshot",
                    TimerMode::Cyclic => "cyclic",
                };
                write!(
                    out,
                    "{:<16} {:<8} {:>8} {:<6}",
                    name.unwrap_or("-"),
                    mode,
                    timeout,
                    if armed { "yes" } else { "no" }
                )?;
                if armed {
                    write!(out, " {}", expiry)?;
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
