#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![forbid(unreachable_pub)]

//! Priority-preemptive real-time scheduler core.
//!
//! The kernel dispatches the highest priority ready task and keeps every
//! ordering decision in one structure, a sorted intrusive queue, used in four
//! roles: readiness, delay deadlines, timer deadlines and the blocked-on
//! chains of synchronization objects.
//!
//! # Features
//!
//! - Tasks with fixed priorities 1-254, round-robin among equals on yield
//! - Tick-driven delays and timed waits
//! - Recursive mutexes with chained priority inheritance
//! - 32-bit event flag groups with all/any waits
//! - One-shot and cyclic software timers run from the tick
//! - Optional object table for naming and listing objects
//!
//! # Quick Start
//!
//! ```ignore
//! use preemptive_rtk::{Kernel, KernelConfig, TaskBuilder};
//!
//! static KERNEL: Kernel<Port> = Kernel::new(KernelConfig::DEFAULT);
//!
//! fn worker(_arg: usize) {
//!     loop {
//!         let _ = KERNEL.delay(10);
//!     }
//! }
//!
//! fn kernel_main() {
//!     KERNEL.init().expect("kernel init");
//!     KERNEL.spawn(TaskBuilder::new(worker).name("worker")).expect("spawn");
//!     KERNEL.start_first_task().expect("start");
//! }
//! ```
//!
//! # Architecture
//!
//! - [`queue`]: the sorted intrusive queue shared by every role
//! - [`sched`] and [`task`]: dispatcher and task state machine
//! - [`sync`]: priority-inheritance mutexes and event flags
//! - [`timer`]: software timers
//! - [`registry`]: debug object table behind the `show_*` listings
//! - [`arch`]: the port trait; [`arch::NoOpArch`] runs everything on the host

pub mod arch;
pub mod config;
pub mod errors;
pub mod kernel;
pub mod mem;
pub mod queue;
pub mod registry;
pub mod sched;
pub mod sync;
pub mod task;
pub mod time;
pub mod timer;

#[cfg(test)]
extern crate std;

extern crate alloc;

#[cfg(test)]
mod tests;

// Panic handler for bare-metal
#[cfg(all(not(test), target_os = "none"))]
use core::panic::PanicInfo;

#[cfg(all(not(test), target_os = "none"))]
#[panic_handler]
fn panic(_info: &PanicInfo) -> ! {
    // On panic, disable interrupts and halt
    #[cfg(target_arch = "aarch64")]
    unsafe {
        core::arch::asm!("msr daifset, #0xf", options(nomem, nostack));
    }
    loop {
        #[cfg(target_arch = "aarch64")]
        unsafe {
            core::arch::asm!("wfe", options(nomem, nostack));
        }
        #[cfg(not(target_arch = "aarch64"))]
        core::hint::spin_loop();
    }
}

// ============================================================================
// Public API
// ============================================================================

// Port layer
pub use arch::{Arch, DefaultArch, NoOpArch};

// Kernel
pub use config::KernelConfig;
pub use kernel::{Kernel, Outcome, Wait, WaitStatus};

// Tasks
pub use sched::priority;
pub use task::{TaskBuilder, TaskId, TaskState, TaskStatus};

// Synchronization
pub use sync::{FlagsId, MutexId, WaitMode};

// Timers
pub use timer::{TimerCallback, TimerId, TimerMode};

// Time
pub use time::Tick;

// Errors
pub use errors::{KernelError, KernelResult, ObjectKind, PreconditionViolation, SpawnError};
