//! Tick time base.
//!
//! All kernel timing is expressed in ticks of the periodic tick interrupt.
//! Deadlines are absolute tick values, so they order naturally in the
//! deadline queues.

pub mod tick;

pub use tick::TickCounter;

/// Absolute or relative tick count.
pub type Tick = u64;
