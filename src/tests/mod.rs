//! Crate-level scenario tests.
//!
//! Everything here runs on [`NoOpArch`](crate::arch::NoOpArch): a context
//! switch only changes which task the kernel considers running, so each
//! test drives the kernel step by step and inspects the result.

mod helpers;
