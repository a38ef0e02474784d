//! Blocking synchronization objects.
//!
//! Both objects keep their waiters in a chain queue ordered by requester
//! priority with FIFO among equals. A waiter leaves the chain either when
//! the object satisfies it or when its deadline passes, whichever comes
//! first.

pub mod flags;
pub mod mutex;

pub use flags::{FlagsId, WaitMode};
pub use mutex::MutexId;

pub(crate) use flags::FlagGroup;
pub(crate) use mutex::Mutex;
