//! # Execution Contexts
//!
//! The two primitives coroutines are built from:
//!
//! - [`State`]: a saved register/stack snapshot. Switching away from code
//!   captures it into a `State`; switching to that `State` later makes the
//!   earlier switch call return.
//! - [`Fork`]: an allocated execution stack plus the entry point that runs
//!   on it. Running a fork builds a fresh frame and transfers control onto
//!   the stack exactly once per activation; later transfers go through the
//!   `State` the fork's code saves when it suspends.
//!
//! Neither type tracks whether a `State` holds a live snapshot. The
//! generator layer owns that bookkeeping.

use alloc::alloc::{alloc, dealloc, Layout};
use core::cell::UnsafeCell;
use core::ptr::NonNull;

use crate::arch::{self, Context, EntryFn};
use crate::config::{MIN_STACK_SIZE, STACK_ALIGN};
use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Saved register context.
pub struct State {
    ctx: UnsafeCell<Context>,
}

impl State {
    pub const fn new() -> Self {
        Self {
            ctx: UnsafeCell::new(Context::empty()),
        }
    }

    /// Capture the running context into `self` and resume `to`.
    ///
    /// Returns when something switches back into `self`.
    ///
    /// # Safety
    /// `to` must hold a snapshot that has not been resumed since it was
    /// taken, and `self` must stay at the same address until it is resumed.
    #[inline]
    pub unsafe fn switch(&self, to: &State) {
        unsafe { arch::switch(self.ctx.get(), to.ctx.get()) }
    }

    fn as_ptr(&self) -> *mut Context {
        self.ctx.get()
    }
}

impl Default for State {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Fork
// ---------------------------------------------------------------------------

/// An allocated stack and the function that starts on it.
pub struct Fork {
    stack: NonNull<u8>,
    layout: Layout,
    entry: EntryFn,
}

impl Fork {
    /// Allocate a stack of at least `stack_size` bytes for `entry`.
    pub fn new(entry: EntryFn, stack_size: usize) -> Result<Self> {
        let size = stack_size.max(MIN_STACK_SIZE);
        let layout = Layout::from_size_align(size, STACK_ALIGN).map_err(|_| Error::OutOfMemory)?;
        // SAFETY: `layout` has a non-zero size.
        let stack = NonNull::new(unsafe { alloc(layout) }).ok_or(Error::OutOfMemory)?;

        Ok(Self {
            stack,
            layout,
            entry,
        })
    }

    pub fn stack_size(&self) -> usize {
        self.layout.size()
    }

    /// Lay out a fresh frame in `callee`, save the running context into
    /// `caller` and start `entry(arg)` on this fork's stack.
    ///
    /// # Safety
    /// Nothing may still be executing on this stack: any earlier activation
    /// must be abandoned for good. `caller` and `callee` must outlive the
    /// activation, and `arg` must be valid for whatever `entry` does with it.
    pub unsafe fn run(&self, arg: *mut u8, caller: &State, callee: &State) {
        unsafe {
            let top = self.stack.as_ptr().add(self.layout.size());
            arch::init_stack(callee.as_ptr(), top, self.entry, arg);
            caller.switch(callee);
        }
    }
}

impl Drop for Fork {
    fn drop(&mut self) {
        // SAFETY: allocated in `new` with the same layout.
        unsafe { dealloc(self.stack.as_ptr(), self.layout) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::Cell;

    struct Shuttle {
        caller: State,
        callee: State,
        trips: Cell<u32>,
    }

    unsafe extern "C" fn shuttle(arg: *mut u8) -> ! {
        let shuttle = unsafe { &*(arg as *const Shuttle) };
        loop {
            shuttle.trips.set(shuttle.trips.get() + 1);
            unsafe { shuttle.callee.switch(&shuttle.caller) };
        }
    }

    #[test]
    fn test_fork_allocates_minimum() {
        let fork = Fork::new(shuttle, 1).unwrap();
        assert_eq!(fork.stack_size(), MIN_STACK_SIZE);
    }

    #[test]
    fn test_fork_out_of_memory() {
        // Rejected by the layout, then by the allocator
        assert!(matches!(Fork::new(shuttle, usize::MAX), Err(Error::OutOfMemory)));
        assert!(matches!(
            Fork::new(shuttle, isize::MAX as usize - 64),
            Err(Error::OutOfMemory)
        ));
    }

    #[test]
    fn test_run_then_resume_state() {
        let fork = Fork::new(shuttle, 16 * 1024).unwrap();
        let s = Shuttle {
            caller: State::new(),
            callee: State::new(),
            trips: Cell::new(0),
        };
        let arg = &s as *const Shuttle as *mut u8;

        unsafe { fork.run(arg, &s.caller, &s.callee) };
        assert_eq!(s.trips.get(), 1);

        unsafe { s.caller.switch(&s.callee) };
        unsafe { s.caller.switch(&s.callee) };
        assert_eq!(s.trips.get(), 3);
    }
}
