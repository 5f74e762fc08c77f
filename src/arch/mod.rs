//! # Architecture Abstraction Layer
//!
//! The only platform-specific surface of the kernel. Each port provides two
//! primitives over a [`Context`]:
//!
//! - `init_stack`: lay out an initial register frame on a fresh stack so the
//!   first switch into it calls `entry(arg)`.
//! - `switch`: save the callee-saved registers and stack pointer of the
//!   running code into one context and resume another. The saved side
//!   continues after its `switch` call when something later switches back.
//!
//! Hosted ports (x86_64 SysV, AArch64) let the scheduler run and be tested
//! on a development machine; the Cortex-M4 port is the firmware target.

#[cfg(all(target_arch = "x86_64", not(windows)))]
mod x86_64;
#[cfg(all(target_arch = "x86_64", not(windows)))]
pub use self::x86_64::{init_stack, switch};

#[cfg(target_arch = "aarch64")]
mod aarch64;
#[cfg(target_arch = "aarch64")]
pub use self::aarch64::{init_stack, switch};

#[cfg(target_arch = "arm")]
mod cortex_m4;
#[cfg(target_arch = "arm")]
pub use self::cortex_m4::{init_stack, switch};

#[cfg(not(any(
    all(target_arch = "x86_64", not(windows)),
    target_arch = "aarch64",
    target_arch = "arm"
)))]
compile_error!("coopos has no context-switch port for this target");

/// Function a fresh stack starts executing. It receives the argument given
/// to `init_stack` and must never return: there is no frame to return to.
pub type EntryFn = unsafe extern "C" fn(arg: *mut u8) -> !;

/// Saved execution context.
///
/// Only the stack pointer lives here; every other callee-saved register is
/// pushed onto the owning stack by `switch`.
#[repr(C)]
#[derive(Debug)]
pub struct Context {
    pub(crate) sp: usize,
}

impl Context {
    pub const fn empty() -> Self {
        Self { sp: 0 }
    }

    /// True once a `switch` or `init_stack` has written this context.
    #[inline]
    pub fn is_saved(&self) -> bool {
        self.sp != 0
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::empty()
    }
}

/// Round a stack top down to `align` (a power of two).
#[inline]
pub(crate) fn align_down(addr: usize, align: usize) -> usize {
    addr & !(align - 1)
}
