//! Storage for kernel objects.
//!
//! Tasks, mutexes, flag groups and timers live in generational arenas and are
//! addressed by handle. Queue links refer to arena slots by index, so a task
//! record is reachable from any queue it belongs to without pointer
//! arithmetic.

pub mod arena;

pub use arena::{Arena, Handle};
