//! Tick counting and millisecond conversion.

use super::Tick;
use portable_atomic::{AtomicU64, Ordering};

/// Monotonic tick counter.
///
/// Advanced once per tick interrupt; read from any context without
/// entering a critical section.
pub struct TickCounter {
    /// Number of ticks since system start
    ticks: AtomicU64,
    /// Tick frequency in Hz
    frequency: u32,
}

impl TickCounter {
    /// Create a new tick counter with the given frequency.
    ///
    /// # Arguments
    ///
    /// * `frequency` - Tick frequency in Hz
    pub const fn new(frequency: u32) -> Self {
        Self {
            ticks: AtomicU64::new(0),
            frequency,
        }
    }

    /// Advance by one tick and return the new count.
    ///
    /// This should only be called from the tick handler.
    pub fn increment(&self) -> Tick {
        self.ticks.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Get the current tick count.
    pub fn ticks(&self) -> Tick {
        self.ticks.load(Ordering::Acquire)
    }

    /// Overwrite the tick count. Intended for tests and bring-up.
    pub fn set(&self, ticks: Tick) {
        self.ticks.store(ticks, Ordering::Release);
    }

    /// Get the tick frequency in Hz.
    pub fn frequency(&self) -> u32 {
        self.frequency
    }

    /// Convert ticks to milliseconds (truncating).
    pub fn ticks_to_ms(&self, ticks: Tick) -> u64 {
        ticks.saturating_mul(1000) / self.frequency as u64
    }

    /// Convert milliseconds to ticks, rounding up so a delay never
    /// undershoots the requested time.
    pub fn ms_to_ticks(&self, ms: u64) -> Tick {
        let scaled = ms.saturating_mul(self.frequency as u64);
        scaled / 1000 + u64::from(scaled % 1000 != 0)
    }
}
