//! # Threads
//!
//! A thread is a priority-tagged scheduling unit wrapping exactly one
//! [`Generator`]. Thread records live in the scheduler's arena and are
//! linked into a circular list by index; code running inside a thread sees
//! only its [`ThreadContext`].
//!
//! ## Steps
//!
//! Every [`ThreadContext::yield_now`] is one logical *step* of progress,
//! which is what [`Scheduler::sync`] counts. Two scoped regions change that:
//!
//! - [`ThreadContext::implicit`] clears the thread's `stepping` flag, so a
//!   run of internal yields shows up as no steps at all.
//! - [`ThreadContext::critical`] raises the scheduler-wide `blocked` flag.
//!   Yields inside it are not counted and the dispatcher stops rotating, so
//!   the region is observed from outside as a single atomic move.
//!
//! Both hand back a [`RegionGuard`] that restores the previous flag value
//! when dropped, whichever way the scope is left.
//!
//! [`Scheduler::sync`]: crate::scheduler::Scheduler::sync

use alloc::rc::Rc;
use core::cell::Cell;
use core::fmt;

use crate::config::ThreadConfig;
use crate::error::{Error, Result};
use crate::generator::{Generator, Yielder};

// ---------------------------------------------------------------------------
// Thread identity
// ---------------------------------------------------------------------------

/// Handle to a thread in a [`Scheduler`](crate::scheduler::Scheduler).
///
/// The generation makes handles to deleted threads stale instead of letting
/// them alias whatever reuses the slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ThreadId {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

impl ThreadId {
    /// Handle for arena slot `index`. Slots past `u32::MAX` cannot be
    /// named, which the arena reports as running out of memory.
    pub(crate) fn new(index: usize, generation: u32) -> Result<Self> {
        let index = u32::try_from(index).map_err(|_| Error::OutOfMemory)?;
        Ok(Self { index, generation })
    }

    #[inline]
    pub(crate) const fn slot(self) -> usize {
        self.index as usize
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "thread#{}.{}", self.index, self.generation)
    }
}

// ---------------------------------------------------------------------------
// Per-thread bookkeeping
// ---------------------------------------------------------------------------

/// Bookkeeping shared between a thread's arena record and the code running
/// inside it. Everything is a `Cell`: only one side runs at a time.
pub(crate) struct ThreadMeta {
    pub(crate) id: ThreadId,
    pub(crate) persistent: bool,
    /// Consecutive dispatcher turns per rotation, fixed at spawn.
    pub(crate) quota: u32,
    steps: Cell<u64>,
    stepping: Cell<bool>,
    /// Nesting depth of critical regions this thread has open.
    critical_depth: Cell<u32>,
    /// `blocked` as it was when the outermost critical region opened.
    critical_outer: Cell<bool>,
}

impl ThreadMeta {
    pub(crate) fn new(id: ThreadId, config: &ThreadConfig) -> Self {
        Self {
            id,
            persistent: config.persistent,
            quota: config.quota(),
            steps: Cell::new(0),
            stepping: Cell::new(true),
            critical_depth: Cell::new(0),
            critical_outer: Cell::new(false),
        }
    }

    #[inline]
    pub(crate) fn steps(&self) -> u64 {
        self.steps.get()
    }

    #[inline]
    pub(crate) fn stepping(&self) -> bool {
        self.stepping.get()
    }

    /// Close every region the thread left open when it stopped running for
    /// good (explicit finish skips the guards' destructors).
    pub(crate) fn release_regions(&self, blocked: &Cell<bool>) {
        if self.critical_depth.get() > 0 {
            blocked.set(self.critical_outer.get());
            self.critical_depth.set(0);
        }
        self.stepping.set(true);
    }
}

/// Arena record for one thread: the generator it owns plus its place in the
/// circular list.
pub(crate) struct Thread {
    pub(crate) meta: Rc<ThreadMeta>,
    /// `None` while checked out by whoever is resuming it.
    pub(crate) generator: Option<Generator>,
    /// Consecutive turns taken in the current rotation.
    pub(crate) budget: u32,
    pub(crate) prev: usize,
    pub(crate) next: usize,
}

impl Thread {
    pub(crate) fn new(meta: Rc<ThreadMeta>, generator: Generator, slot: usize) -> Self {
        Self {
            meta,
            generator: Some(generator),
            budget: 0,
            prev: slot,
            next: slot,
        }
    }

    /// Turns granted before the dispatcher rotates away.
    #[inline]
    pub(crate) fn quota(&self) -> u32 {
        self.meta.quota
    }
}

// ---------------------------------------------------------------------------
// Thread context
// ---------------------------------------------------------------------------

/// What a thread body sees of the kernel while it runs.
pub struct ThreadContext<'a> {
    yielder: &'a Yielder,
    meta: &'a ThreadMeta,
    blocked: &'a Cell<bool>,
}

impl<'a> ThreadContext<'a> {
    pub(crate) fn new(yielder: &'a Yielder, meta: &'a ThreadMeta, blocked: &'a Cell<bool>) -> Self {
        Self {
            yielder,
            meta,
            blocked,
        }
    }

    /// Identity of the running thread.
    #[inline]
    pub fn id(&self) -> ThreadId {
        self.meta.id
    }

    /// Steps this thread has taken so far.
    #[inline]
    pub fn steps(&self) -> u64 {
        self.meta.steps()
    }

    /// Whether a critical region is open anywhere in the scheduler.
    #[inline]
    pub fn is_blocked(&self) -> bool {
        self.blocked.get()
    }

    /// Hand control back to whoever resumed this thread.
    ///
    /// Counts one step unless inside an implicit or critical region.
    pub fn yield_now(&self) {
        if self.meta.stepping() && !self.blocked.get() {
            self.meta.steps.set(self.meta.steps.get() + 1);
        }
        self.yielder.suspend();
    }

    /// Finish the thread from anywhere in its body. Never returns.
    ///
    /// Regions opened by this thread are closed first. A persistent thread
    /// is restarted from the top by the dispatcher.
    pub fn finish(&self) -> ! {
        self.meta.release_regions(self.blocked);
        self.yielder.finish()
    }

    /// Open an implicit region: yields inside it are not counted as steps.
    pub fn implicit(&self) -> RegionGuard<'_> {
        RegionGuard::enter(&self.meta.stepping, false, None)
    }

    /// Open a critical region: the scheduler stops interleaving other
    /// threads and no yields are counted until the guard drops.
    pub fn critical(&self) -> RegionGuard<'_> {
        let depth = &self.meta.critical_depth;
        if depth.get() == 0 {
            self.meta.critical_outer.set(self.blocked.get());
        }
        depth.set(depth.get() + 1);
        RegionGuard::enter(self.blocked, true, Some(depth))
    }
}

impl fmt::Debug for ThreadContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadContext")
            .field("id", &self.meta.id)
            .field("steps", &self.meta.steps())
            .field("stepping", &self.meta.stepping())
            .field("blocked", &self.blocked.get())
            .finish()
    }
}

/// Restores a region flag to its previous value on drop.
#[must_use = "the region closes as soon as the guard is dropped"]
pub struct RegionGuard<'a> {
    flag: &'a Cell<bool>,
    prev: bool,
    depth: Option<&'a Cell<u32>>,
}

impl<'a> RegionGuard<'a> {
    fn enter(flag: &'a Cell<bool>, value: bool, depth: Option<&'a Cell<u32>>) -> Self {
        let prev = flag.replace(value);
        Self { flag, prev, depth }
    }
}

impl Drop for RegionGuard<'_> {
    fn drop(&mut self) {
        self.flag.set(self.prev);
        if let Some(depth) = self.depth {
            depth.set(depth.get().saturating_sub(1));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta() -> ThreadMeta {
        ThreadMeta::new(ThreadId::new(3, 1).unwrap(), &ThreadConfig::new().priority(2))
    }

    #[test]
    fn test_thread_id_display() {
        assert_eq!(alloc::format!("{}", ThreadId::new(4, 2).unwrap()), "thread#4.2");
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn test_thread_id_slot_overflow() {
        let last = u32::MAX as usize;
        assert_eq!(ThreadId::new(last, 0).unwrap().slot(), last);
        assert_eq!(ThreadId::new(last + 1, 0), Err(Error::OutOfMemory));
    }

    #[test]
    fn test_quota_fixed_at_spawn() {
        assert_eq!(meta().quota, 2);
        let idle = ThreadMeta::new(ThreadId::new(0, 0).unwrap(), &ThreadConfig::new().priority(0));
        assert_eq!(idle.quota, 1);
    }

    #[test]
    fn test_region_guard_restores() {
        let flag = Cell::new(false);
        {
            let _outer = RegionGuard::enter(&flag, true, None);
            assert!(flag.get());
            {
                let _inner = RegionGuard::enter(&flag, true, None);
                assert!(flag.get());
            }
            // Inner exit keeps the outer region open
            assert!(flag.get());
        }
        assert!(!flag.get());
    }

    #[test]
    fn test_release_regions() {
        let m = meta();
        let blocked = Cell::new(false);

        m.critical_outer.set(blocked.get());
        m.critical_depth.set(2);
        blocked.set(true);
        m.stepping.set(false);

        m.release_regions(&blocked);
        assert!(!blocked.get());
        assert!(m.stepping());
        assert_eq!(m.critical_depth.get(), 0);
    }

    #[test]
    fn test_release_regions_without_open_region() {
        let m = meta();
        // Someone else's critical region stays untouched
        let blocked = Cell::new(true);
        m.release_regions(&blocked);
        assert!(blocked.get());
    }
}
