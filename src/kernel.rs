//! Kernel abstraction tying the scheduler core together.
//!
//! [`Kernel`] owns every task, mutex, flag group and timer plus the queues
//! that order them. All state lives behind one spin lock that is only taken
//! with interrupts masked, so task code and the tick interrupt see the same
//! consistent picture.
//!
//! Subsystem operations are implemented next to their data:
//! task control in [`crate::task`], mutexes and flag groups in
//! [`crate::sync`], timers in [`crate::timer`].

use crate::arch::{critical, Arch, CriticalSection};
use crate::config::KernelConfig;
use crate::errors::{KernelResult, PreconditionViolation};
use crate::mem::Arena;
use crate::queue::SortedQueue;
use crate::registry::ObjectTable;
use crate::sched::{priority, DelayRole, ReadyRole};
use crate::sync::{FlagGroup, Mutex};
use crate::task::{Tcb, TaskBuilder, TaskId};
use crate::time::{Tick, TickCounter};
use crate::timer::{Timer, TimerRole};
use portable_atomic::{AtomicBool, AtomicPtr, AtomicU64, AtomicUsize, Ordering};

extern crate alloc;
use alloc::boxed::Box;

/// Global kernel reference for interrupt handlers.
static GLOBAL_KERNEL: AtomicPtr<()> = AtomicPtr::new(core::ptr::null_mut());

/// How a wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitStatus {
    /// The resource or condition was obtained
    Ok,
    /// The deadline passed first
    TimedOut,
}

/// Result delivered to a task when it leaves a blocking call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Outcome {
    pub status: WaitStatus,
    /// Flag value for flag waits, 0 otherwise
    pub value: u32,
}

impl Outcome {
    pub const fn ok(value: u32) -> Self {
        Self {
            status: WaitStatus::Ok,
            value,
        }
    }

    pub const fn timed_out(value: u32) -> Self {
        Self {
            status: WaitStatus::TimedOut,
            value,
        }
    }

    pub fn is_timeout(&self) -> bool {
        self.status == WaitStatus::TimedOut
    }
}

/// Return value of a call that may suspend the caller.
///
/// On a real port the caller is only resumed once its outcome is known, so
/// every call returns [`Wait::Done`]. On a port whose context switch returns
/// immediately (the host port) a call that had to block returns
/// [`Wait::Blocked`] and the outcome is later fetched with
/// [`Kernel::take_outcome`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum Wait<T> {
    Done(T),
    Blocked,
}

impl<T> Wait<T> {
    /// The completed value, if the call did not block.
    pub fn done(self) -> Option<T> {
        match self {
            Wait::Done(value) => Some(value),
            Wait::Blocked => None,
        }
    }

    pub fn is_blocked(&self) -> bool {
        matches!(self, Wait::Blocked)
    }
}

/// Everything guarded by the kernel lock.
pub(crate) struct KernelState<A: Arch> {
    pub(crate) tasks: Arena<Tcb<A>>,
    pub(crate) ready: SortedQueue<ReadyRole>,
    pub(crate) delayed: SortedQueue<DelayRole>,
    pub(crate) mutexes: Arena<Mutex>,
    pub(crate) flags: Arena<FlagGroup>,
    pub(crate) timers: Arena<Timer<A>>,
    /// Armed timers, soonest expiry at the tail
    pub(crate) armed: SortedQueue<TimerRole>,
    /// Timers detached by the tick currently being processed
    pub(crate) draining: SortedQueue<TimerRole>,
    /// Bumped at every drain; timers armed before the bump sit in `draining`
    pub(crate) drain_epoch: u64,
    pub(crate) draining_active: bool,
    /// Slot of the running task, always the readiness head once started
    pub(crate) running: Option<usize>,
    pub(crate) idle: Option<usize>,
    /// Context the first switch saves into
    pub(crate) boot_context: Option<Box<A::SavedContext>>,
}

impl<A: Arch> KernelState<A> {
    pub(crate) const fn new() -> Self {
        Self {
            tasks: Arena::new(),
            ready: SortedQueue::new(),
            delayed: SortedQueue::new(),
            mutexes: Arena::new(),
            flags: Arena::new(),
            timers: Arena::new(),
            armed: SortedQueue::new(),
            draining: SortedQueue::new(),
            drain_epoch: 0,
            draining_active: false,
            running: None,
            idle: None,
            boot_context: None,
        }
    }

    /// Slot of the task a blocking call acts for.
    pub(crate) fn caller(&self) -> KernelResult<usize> {
        let ix = self.running.ok_or(PreconditionViolation::NoCurrentTask)?;
        if Some(ix) == self.idle {
            return Err(PreconditionViolation::ProtectedTask.into());
        }
        Ok(ix)
    }
}

/// Main kernel handle.
///
/// # Type Parameters
///
/// * `A` - Architecture port
pub struct Kernel<A: Arch> {
    config: KernelConfig,
    pub(crate) state: spin::Mutex<KernelState<A>>,
    pub(crate) objects: ObjectTable,
    pub(crate) ticks: TickCounter,
    /// Nesting depth of interrupt handlers
    isr_depth: AtomicUsize,
    initialized: AtomicBool,
    /// Dispatching starts with [`Kernel::start_first_task`]
    started: AtomicBool,
    switches: AtomicU64,
}

impl<A: Arch> Kernel<A> {
    /// Create a new kernel instance.
    ///
    /// Nothing is allocated until [`Kernel::init`], so this can initialise
    /// a `static`.
    pub const fn new(config: KernelConfig) -> Self {
        Self {
            config,
            state: spin::Mutex::new(KernelState::new()),
            objects: ObjectTable::new(config.object_table_size),
            ticks: TickCounter::new(config.tick_hz),
            isr_depth: AtomicUsize::new(0),
            initialized: AtomicBool::new(false),
            started: AtomicBool::new(false),
            switches: AtomicU64::new(0),
        }
    }

    /// Initialize the kernel: allocate the object table and create the
    /// idle task.
    pub fn init(&self) -> KernelResult<()> {
        if self
            .initialized
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(PreconditionViolation::AlreadyInitialized.into());
        }

        self.objects.init();

        let idle = TaskBuilder::new(idle_entry).name(self.config.idle_name);
        self.with_state(|st| {
            st.boot_context = Some(Box::default());
            let ix = st.insert_task(idle, priority::IDLE, false);
            st.idle = Some(ix);
            st.start_task(ix);
        });

        log::debug!(
            "kernel initialized: {} Hz tick, {} object slots",
            self.config.tick_hz,
            self.config.object_table_size
        );
        Ok(())
    }

    /// Tear everything down and return to the uninitialized state.
    ///
    /// Drops every task and object and releases the object table.
    pub fn shutdown(&self) {
        self.with_state(|st| *st = KernelState::new());
        self.objects.shutdown();
        self.ticks.set(0);
        self.isr_depth.store(0, Ordering::Release);
        self.started.store(false, Ordering::Release);
        self.initialized.store(false, Ordering::Release);
        log::debug!("kernel shut down");
    }

    /// Check if the kernel has been initialized.
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    pub(crate) fn ensure_initialized(&self) -> KernelResult<()> {
        if self.is_initialized() {
            Ok(())
        } else {
            Err(PreconditionViolation::NotInitialized.into())
        }
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    /// Start dispatching: switch from the boot context to the highest
    /// priority ready task. Returns only on ports whose context switch
    /// returns.
    pub fn start_first_task(&self) -> KernelResult<()> {
        self.ensure_initialized()?;
        if self.started.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.reschedule();
        Ok(())
    }

    /// Number of context switches performed so far.
    pub fn context_switches(&self) -> u64 {
        self.switches.load(Ordering::Relaxed)
    }

    /// Run `f` on the kernel state with interrupts masked.
    pub(crate) fn with_state<R>(&self, f: impl FnOnce(&mut KernelState<A>) -> R) -> R {
        critical::with::<A, _>(|_cs| f(&mut self.state.lock()))
    }

    /// Switch to the readiness head if it is not already running.
    ///
    /// Deferred while an interrupt handler is active; [`Kernel::exit_isr`]
    /// calls it again on the way out.
    pub(crate) fn reschedule(&self) {
        if self.in_isr() || !self.started.load(Ordering::Acquire) {
            return;
        }
        let cs = CriticalSection::<A>::enter();
        let switch = self.state.lock().dispatch();
        if let Some((prev, next)) = switch {
            self.switches.fetch_add(1, Ordering::Relaxed);
            // SAFETY: both contexts are boxed inside records that stay alive
            // until after this switch: the previous task is either still
            // queued or dead but not yet reaped, and the next one is the
            // readiness head.
            unsafe { A::context_switch(prev, next) };
        }
        drop(cs);
    }

    /// Suspend the caller after it has been queued on a wait and collect
    /// its outcome once it runs again.
    pub(crate) fn suspend_caller(&self, me: TaskId) -> Wait<Outcome> {
        self.reschedule();
        match self.with_state(|st| st.tasks.get_mut(me.handle()).and_then(|t| t.outcome.take())) {
            Some(outcome) => Wait::Done(outcome),
            None => Wait::Blocked,
        }
    }

    /// Fetch the outcome of the last wait `task` completed, if it has not
    /// been collected yet.
    pub fn take_outcome(&self, task: TaskId) -> KernelResult<Option<Outcome>> {
        self.with_state(|st| st.task_mut(task).map(|t| t.outcome.take()))
    }

    /// Mark entry into an interrupt handler.
    ///
    /// Rescheduling requested while inside is postponed to the matching
    /// [`Kernel::exit_isr`].
    pub fn enter_isr(&self) {
        self.isr_depth.fetch_add(1, Ordering::AcqRel);
    }

    /// Mark exit from an interrupt handler, dispatching if this was the
    /// outermost one.
    pub fn exit_isr(&self) {
        let prev = self
            .isr_depth
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |d| d.checked_sub(1));
        debug_assert!(prev.is_ok(), "exit_isr without enter_isr");
        if prev == Ok(1) {
            self.reschedule();
        }
    }

    /// True while running in interrupt context.
    pub fn in_isr(&self) -> bool {
        self.isr_depth.load(Ordering::Acquire) > 0
    }

    pub(crate) fn ensure_task_context(&self) -> KernelResult<()> {
        if self.in_isr() {
            Err(PreconditionViolation::InterruptContext.into())
        } else {
            Ok(())
        }
    }

    /// Advance time by one tick.
    ///
    /// Called by the tick interrupt. Wakes every delayed task whose
    /// deadline has come, then fires expired timers soonest first. Timer
    /// callbacks run in interrupt context, outside the kernel lock.
    pub fn tick(&self) {
        self.enter_isr();
        let now = self.ticks.increment();

        self.with_state(|st| {
            st.expire_delays(now);
            st.begin_drain();
        });
        while let Some((id, callback, arg)) = self.with_state(|st| st.next_expired(now)) {
            log::trace!("timer {} fired at tick {}", id, now);
            callback(self, id, arg);
        }
        self.with_state(|st| st.end_drain());

        self.exit_isr();
    }

    /// Get the current tick.
    pub fn tick_get(&self) -> Tick {
        self.ticks.ticks()
    }

    /// Set the current tick. Mostly useful for tests.
    pub fn tick_set(&self, tick: Tick) {
        self.ticks.set(tick);
    }

    pub fn tick_to_ms(&self, ticks: Tick) -> u64 {
        self.ticks.ticks_to_ms(ticks)
    }

    /// Milliseconds to ticks, rounded up.
    pub fn tick_from_ms(&self, ms: u64) -> Tick {
        self.ticks.ms_to_ticks(ms)
    }

    /// Objects that could not be recorded in the object table.
    pub fn object_overflows(&self) -> u32 {
        self.objects.overflows()
    }

    /// Register this kernel as the global kernel for interrupt handlers.
    ///
    /// # Safety
    ///
    /// The kernel must outlive all interrupt handling (i.e., for the lifetime
    /// of the system), and only one port type may be registered.
    pub unsafe fn register_global(&'static self) {
        GLOBAL_KERNEL.store(self as *const _ as *mut (), Ordering::Release);
    }
}

/// Get the global kernel reference (for interrupt handlers).
///
/// Returns None if no kernel has been registered.
///
/// # Safety
///
/// `A` must be the port type of the kernel passed to
/// [`Kernel::register_global`].
pub unsafe fn get_global_kernel<A: Arch>() -> Option<&'static Kernel<A>> {
    let ptr = GLOBAL_KERNEL.load(Ordering::Acquire);
    if ptr.is_null() {
        None
    } else {
        // SAFETY: the caller guarantees the registered kernel has type
        // `Kernel<A>`; registration requires a `'static` reference.
        Some(unsafe { &*(ptr as *const Kernel<A>) })
    }
}

/// Body of the idle task: spin until something else is ready.
fn idle_entry(_arg: usize) {
    loop {
        core::hint::spin_loop();
    }
}
