//! Port layer: context switching and interrupt masking.
//!
//! The scheduler core never touches CPU registers itself. Everything
//! processor-specific goes through [`Arch`], implemented once per target.
//! [`NoOpArch`] is the host port: context switches return immediately, which
//! turns the kernel into a deterministic state machine for tests.

pub mod critical;

pub use critical::CriticalSection;

/// Architecture abstraction trait.
///
/// # Safety
///
/// Implementations involve direct hardware manipulation. All methods marked
/// as unsafe have specific preconditions that must be upheld by the caller.
pub trait Arch {
    /// Architecture-specific saved context type.
    ///
    /// Must contain all CPU state needed to fully restore a task.
    type SavedContext: Send + Default;

    /// Switch from one task context to another.
    ///
    /// Returns when `prev` is switched back to.
    ///
    /// # Safety
    ///
    /// - `prev` and `next` must point to valid, properly aligned contexts
    ///   that stay alive for the duration of the call
    /// - `next` must represent a valid execution state
    unsafe fn context_switch(prev: *mut Self::SavedContext, next: *const Self::SavedContext);

    /// Prepare a fresh context that starts at `entry(arg)`.
    ///
    /// The kernel switches with interrupts masked and a new task never
    /// returns through the code that masked them, so the context must
    /// start with interrupts enabled.
    fn init_context(ctx: &mut Self::SavedContext, entry: fn(usize), arg: usize);

    /// Enable interrupts on the current CPU.
    fn enable_interrupts();

    /// Disable interrupts on the current CPU.
    fn disable_interrupts();

    /// Check if interrupts are currently enabled.
    fn interrupts_enabled() -> bool;
}

/// A no-op architecture implementation for host testing.
///
/// `context_switch` returns at once, so a task that blocks "returns" from
/// its blocking call with [`Wait::Blocked`](crate::kernel::Wait) and its
/// outcome is collected later.
pub struct NoOpArch;

impl Arch for NoOpArch {
    type SavedContext = ();

    unsafe fn context_switch(_prev: *mut Self::SavedContext, _next: *const Self::SavedContext) {
        // No-op for testing
    }

    fn init_context(_ctx: &mut Self::SavedContext, _entry: fn(usize), _arg: usize) {}

    fn enable_interrupts() {}

    fn disable_interrupts() {}

    fn interrupts_enabled() -> bool {
        true
    }
}

/// Port used when none is chosen explicitly.
pub type DefaultArch = NoOpArch;
