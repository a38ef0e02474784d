//! Interrupt-disable token.
//!
//! Queue relinking that can be reached from both task and interrupt context
//! happens while a [`CriticalSection`] is alive. Sections nest: the previous
//! interrupt state is restored on drop, so an inner section never re-enables
//! interrupts an outer one disabled.

use core::marker::PhantomData;

use super::Arch;

/// Scoped interrupt masking for port `A`.
pub struct CriticalSection<A: Arch> {
    restore: bool,
    // Not Send: the token belongs to the CPU that disabled interrupts.
    _arch: PhantomData<*const A>,
}

impl<A: Arch> CriticalSection<A> {
    /// Disable interrupts until the returned token is dropped.
    pub fn enter() -> Self {
        let restore = A::interrupts_enabled();
        A::disable_interrupts();
        Self {
            restore,
            _arch: PhantomData,
        }
    }
}

impl<A: Arch> Drop for CriticalSection<A> {
    fn drop(&mut self) {
        if self.restore {
            A::enable_interrupts();
        }
    }
}

/// Run `f` with interrupts disabled.
pub fn with<A: Arch, R>(f: impl FnOnce(&CriticalSection<A>) -> R) -> R {
    let cs = CriticalSection::<A>::enter();
    f(&cs)
}
