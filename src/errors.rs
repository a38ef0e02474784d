//! Error handling for the scheduler core.
//!
//! Contract violations are programmer errors and surface as
//! [`KernelError::Precondition`]. Timeouts are not errors: they are reported
//! as [`WaitStatus::TimedOut`](crate::kernel::WaitStatus) inside an ordinary
//! outcome. Exhausting the debug object table is neither; it only bumps a
//! counter.

#![allow(clippy::uninlined_format_args)]

use core::fmt;

use crate::task::TaskState;

/// Result type for kernel operations.
pub type KernelResult<T> = Result<T, KernelError>;

/// Top-level error type for all kernel operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelError {
    /// An operation was called in a state that violates its contract
    Precondition(PreconditionViolation),
    /// Task creation was rejected
    Spawn(SpawnError),
}

/// Kinds of kernel object addressed by a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    Task,
    Mutex,
    Flags,
    Timer,
}

/// Contract violations. None of these are retried by the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreconditionViolation {
    /// Kernel used before `init`
    NotInitialized,
    /// `init` called twice
    AlreadyInitialized,
    /// Pop on an empty queue
    EmptyQueue,
    /// Handle does not refer to a live object
    StaleHandle(ObjectKind),
    /// Task is not in the state the operation requires
    WrongState(TaskState),
    /// A task tried to delete itself
    DeleteSelf,
    /// Idle and time-triggered tasks cannot be suspended or deleted
    ProtectedTask,
    /// Task still owns at least one mutex
    HoldsMutex,
    /// Mutex unlocked by a task that does not own it
    NotOwner,
    /// Object destroyed while locked, armed or waited on
    InUse(ObjectKind),
    /// Timer started or reconfigured while armed
    TimerArmed,
    /// Blocking call from interrupt context
    InterruptContext,
    /// No task is running yet
    NoCurrentTask,
    /// Flag wait with an empty mask can never be satisfied
    EmptyMask,
    /// Priority 0 and 255 belong to the idle and time-triggered tasks
    ReservedPriority(u8),
}

/// Errors that can occur when creating tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpawnError {
    /// Priority is one of the reserved ranks
    InvalidPriority(u8),
    /// Kernel has not been initialized
    NotInitialized,
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KernelError::Precondition(e) => write!(f, "Precondition violated: {}", e),
            KernelError::Spawn(e) => write!(f, "Task spawn error: {}", e),
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ObjectKind::Task => "task",
            ObjectKind::Mutex => "mutex",
            ObjectKind::Flags => "flags",
            ObjectKind::Timer => "timer",
        };
        f.write_str(name)
    }
}

impl fmt::Display for PreconditionViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PreconditionViolation::NotInitialized => write!(f, "Kernel not initialized"),
            PreconditionViolation::AlreadyInitialized => write!(f, "Kernel already initialized"),
            PreconditionViolation::EmptyQueue => write!(f, "Pop on an empty queue"),
            PreconditionViolation::StaleHandle(kind) => write!(f, "Stale {} handle", kind),
            PreconditionViolation::WrongState(state) => {
                write!(f, "Task in wrong state: {:#06x}", state.bits())
            }
            PreconditionViolation::DeleteSelf => write!(f, "A task cannot delete itself"),
            PreconditionViolation::ProtectedTask => {
                write!(f, "Idle and time-triggered tasks cannot be suspended or deleted")
            }
            PreconditionViolation::HoldsMutex => write!(f, "Task still holds a mutex"),
            PreconditionViolation::NotOwner => write!(f, "Mutex not owned by caller"),
            PreconditionViolation::InUse(kind) => write!(f, "The {} is still in use", kind),
            PreconditionViolation::TimerArmed => write!(f, "Timer is armed"),
            PreconditionViolation::InterruptContext => {
                write!(f, "Blocking call from interrupt context")
            }
            PreconditionViolation::NoCurrentTask => write!(f, "No task is running"),
            PreconditionViolation::EmptyMask => write!(f, "Flag mask is empty"),
            PreconditionViolation::ReservedPriority(prio) => {
                write!(f, "Priority {} is reserved", prio)
            }
        }
    }
}

impl fmt::Display for SpawnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpawnError::InvalidPriority(prio) => write!(f, "Invalid priority: {}", prio),
            SpawnError::NotInitialized => write!(f, "Kernel not initialized"),
        }
    }
}

impl From<PreconditionViolation> for KernelError {
    fn from(error: PreconditionViolation) -> Self {
        KernelError::Precondition(error)
    }
}

impl From<SpawnError> for KernelError {
    fn from(error: SpawnError) -> Self {
        KernelError::Spawn(error)
    }
}

impl KernelError {
    /// Shorthand for a stale-handle violation.
    pub fn stale(kind: ObjectKind) -> Self {
        KernelError::Precondition(PreconditionViolation::StaleHandle(kind))
    }

    /// True if this error is the given precondition violation.
    pub fn is_precondition(&self, violation: PreconditionViolation) -> bool {
        matches!(self, KernelError::Precondition(v) if *v == violation)
    }
}
