//! Kernel configuration.

/// Tick frequency used by [`KernelConfig::DEFAULT`] (1 kHz = 1 ms ticks).
pub const TICK_HZ: u32 = 1000;

/// Slots in the debug object table by default.
pub const OBJECT_TABLE_SIZE: usize = 32;

/// Build-time parameters of a [`Kernel`](crate::Kernel).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelConfig {
    /// Tick interrupt frequency in Hz
    pub tick_hz: u32,
    /// Capacity of the debug object table; 0 disables it
    pub object_table_size: usize,
    /// Name given to the idle task
    pub idle_name: &'static str,
}

impl KernelConfig {
    pub const DEFAULT: Self = Self {
        tick_hz: TICK_HZ,
        object_table_size: OBJECT_TABLE_SIZE,
        idle_name: "idle",
    };

    pub const fn with_tick_hz(mut self, tick_hz: u32) -> Self {
        self.tick_hz = tick_hz;
        self
    }

    pub const fn with_object_table_size(mut self, size: usize) -> Self {
        self.object_table_size = size;
        self
    }
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}
