use core::cell::Cell;

use crate::thread::{ThreadContext, ThreadId};

/// Who holds a [`Mutex`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Owner {
    /// Locked by thread identity.
    Thread(ThreadId),
    /// Locked under an explicit key, releasable by anyone presenting it.
    Key(usize),
}

/// Single-owner lock token.
///
/// There is no timeout: a mutex that is never released deadlocks whoever
/// waits on it.
#[derive(Debug, Default)]
pub struct Mutex {
    owner: Cell<Option<Owner>>,
}

impl Mutex {
    pub const fn new() -> Self {
        Self {
            owner: Cell::new(None),
        }
    }

    /// Wait until free, then take it as the running thread.
    pub fn lock(&self, cx: &ThreadContext<'_>) {
        self.acquire(cx, Owner::Thread(cx.id()));
    }

    /// Wait until free, then take it under `key`.
    pub fn lock_with_key(&self, cx: &ThreadContext<'_>, key: usize) {
        self.acquire(cx, Owner::Key(key));
    }

    fn acquire(&self, cx: &ThreadContext<'_>, owner: Owner) {
        while self.owner.get().is_some() {
            cx.yield_now();
        }
        self.owner.set(Some(owner));
    }

    /// Take the mutex as the running thread if it is free.
    pub fn try_lock(&self, cx: &ThreadContext<'_>) -> bool {
        if self.owner.get().is_some() {
            return false;
        }
        self.owner.set(Some(Owner::Thread(cx.id())));
        true
    }

    /// Release a mutex held by the running thread. Returns `false`, leaving
    /// the mutex untouched, when someone else holds it.
    pub fn unlock(&self, cx: &ThreadContext<'_>) -> bool {
        self.release(Owner::Thread(cx.id()))
    }

    /// Release a mutex held under `key`.
    pub fn unlock_with_key(&self, key: usize) -> bool {
        self.release(Owner::Key(key))
    }

    fn release(&self, claimant: Owner) -> bool {
        if self.owner.get() != Some(claimant) {
            return false;
        }
        self.owner.set(None);
        true
    }

    pub fn is_locked(&self) -> bool {
        self.owner.get().is_some()
    }

    pub fn owner(&self) -> Option<Owner> {
        self.owner.get()
    }
}
