//! # Generator
//!
//! A stackful coroutine built from one [`Fork`] and two [`State`]s: the
//! caller's snapshot (where `resume` was called) and the callee's snapshot
//! (where the body last suspended).
//!
//! ## State machine
//!
//! ```text
//!                 resume()                 suspend()
//!  ┌────────────┐ ───────► ┌─────────┐ ──────────────► ┌───────────┐
//!  │ NotStarted │          │ Running │                 │ Suspended │
//!  └────────────┘          └─────────┘ ◄────────────── └───────────┘
//!        ▲                      │          resume()
//!        │ rewind()             │ finish() / body returns
//!        │                 ┌──────────┐
//!        └──────────────── │ Finished │
//!                          └──────────┘
//! ```
//!
//! The tag is what makes the raw two-way switch safe to use: a snapshot is
//! resumed only from `Suspended`, so it is never resumed twice, and a
//! `Running` generator refuses a nested resume of itself.

use alloc::boxed::Box;
use core::cell::{Cell, UnsafeCell};
use core::fmt;
use core::ptr::NonNull;

use crate::context::{Fork, State};
use crate::error::{Error, Result};

/// Lifecycle of a [`Generator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneratorState {
    /// Never resumed, or rewound since it last ran.
    NotStarted,
    /// Parked at a suspension point, waiting for `resume`.
    Suspended,
    /// Executing on its own stack.
    Running,
    /// Completed. Stays here until rewound.
    Finished,
}

type Body = Box<dyn FnMut(&Yielder)>;

struct Inner {
    fork: Fork,
    caller: State,
    callee: State,
    state: Cell<GeneratorState>,
    body: UnsafeCell<Body>,
}

/// A suspendable, resumable function running on its own stack.
pub struct Generator {
    inner: NonNull<Inner>,
}

impl Generator {
    /// Create a generator that will run `body` on a stack of `stack_size`
    /// bytes. Nothing runs until the first [`resume`](Self::resume).
    pub fn new<F>(stack_size: usize, body: F) -> Result<Self>
    where
        F: FnMut(&Yielder) + 'static,
    {
        let fork = Fork::new(generator_entry, stack_size)?;
        let inner = Box::new(Inner {
            fork,
            caller: State::new(),
            callee: State::new(),
            state: Cell::new(GeneratorState::NotStarted),
            body: UnsafeCell::new(Box::new(body)),
        });

        Ok(Self {
            inner: NonNull::from(Box::leak(inner)),
        })
    }

    fn inner(&self) -> &Inner {
        // SAFETY: `inner` comes from `Box::leak` and lives until `drop`.
        unsafe { self.inner.as_ref() }
    }

    /// Run the body until it next suspends or finishes.
    ///
    /// Returns `false` if the generator was already finished or finished
    /// during this call, `true` if it is parked at a suspension point.
    pub fn resume(&mut self) -> bool {
        let inner = self.inner();
        match inner.state.get() {
            GeneratorState::Finished => return false,
            GeneratorState::Running => {
                log::warn!("refusing to resume a running generator");
                return false;
            }
            GeneratorState::NotStarted => {
                inner.state.set(GeneratorState::Running);
                let arg = self.inner.as_ptr() as *mut u8;
                // SAFETY: NotStarted means no activation is live on the
                // stack, and `inner` is heap-pinned for the generator's life.
                unsafe { inner.fork.run(arg, &inner.caller, &inner.callee) };
            }
            GeneratorState::Suspended => {
                inner.state.set(GeneratorState::Running);
                // SAFETY: Suspended means `callee` holds the snapshot taken
                // by `Yielder::suspend` and it has not been resumed since.
                unsafe { inner.caller.switch(&inner.callee) };
            }
        }
        inner.state.get() != GeneratorState::Finished
    }

    /// Reset to `NotStarted` so the next `resume` restarts the body from the
    /// top on the same stack.
    ///
    /// Rewinding a suspended generator abandons its frames without running
    /// their destructors.
    pub fn rewind(&mut self) -> Result<()> {
        let inner = self.inner();
        if inner.state.get() == GeneratorState::Running {
            return Err(Error::AlreadyRunning);
        }
        inner.state.set(GeneratorState::NotStarted);
        Ok(())
    }

    pub fn state(&self) -> GeneratorState {
        self.inner().state.get()
    }

    #[inline]
    pub fn is_finished(&self) -> bool {
        self.state() == GeneratorState::Finished
    }

    pub fn stack_size(&self) -> usize {
        self.inner().fork.stack_size()
    }
}

impl fmt::Debug for Generator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Generator")
            .field("state", &self.state())
            .field("stack_size", &self.stack_size())
            .finish()
    }
}

impl Drop for Generator {
    fn drop(&mut self) {
        // A generator dropped while suspended leaks whatever its stack
        // frames own: there is no unwinding across the switch.
        debug_assert!(
            self.state() != GeneratorState::Running,
            "generator dropped while running"
        );
        // SAFETY: produced by `Box::leak` in `new`, dropped exactly once.
        drop(unsafe { Box::from_raw(self.inner.as_ptr()) });
    }
}

/// Handle a generator body uses to hand control back to its caller.
pub struct Yielder {
    inner: NonNull<Inner>,
}

impl Yielder {
    fn inner(&self) -> &Inner {
        // SAFETY: a Yielder only exists on its generator's own stack, which
        // cannot outlive the generator.
        unsafe { self.inner.as_ref() }
    }

    /// Park the body and return control to the pending `resume` call.
    pub fn suspend(&self) {
        let inner = self.inner();
        inner.state.set(GeneratorState::Suspended);
        // SAFETY: `caller` was captured by the `resume` that is waiting
        // for us, and it is resumed once here.
        unsafe { inner.callee.switch(&inner.caller) };
    }

    /// Mark the generator finished and return control for good.
    pub fn finish(&self) -> ! {
        let inner = self.inner();
        inner.state.set(GeneratorState::Finished);
        loop {
            // `resume` never switches into a finished generator; a rewind
            // builds a fresh frame instead of coming back here.
            unsafe { inner.callee.switch(&inner.caller) };
        }
    }

    pub fn state(&self) -> GeneratorState {
        self.inner().state.get()
    }
}

unsafe extern "C" fn generator_entry(arg: *mut u8) -> ! {
    // SAFETY: `Generator::resume` passes the address of its heap `Inner`.
    let inner = unsafe { NonNull::new_unchecked(arg as *mut Inner) };
    let yielder = Yielder { inner };
    {
        // SAFETY: only this activation touches the body until it finishes
        // or is abandoned by a rewind.
        let body = unsafe { &mut *yielder.inner().body.get() };
        body(&yielder);
    }
    yielder.finish()
}
