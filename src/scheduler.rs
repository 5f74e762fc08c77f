//! # Scheduler
//!
//! Round-robin dispatcher over a circular list of threads.
//!
//! ## Thread list
//!
//! Thread records live in an arena of slots indexed by [`ThreadId`]; the
//! `prev`/`next` links are slot indices, so insertion and removal stay O(1)
//! without raw pointers. New threads are linked in at the head. The list
//! keeps `head`, `tail` and `current`, plus the global `blocked` flag raised
//! by critical regions.
//!
//! ```text
//!   head                       tail
//!    │                          │
//!    ▼                          ▼
//!  ┌────┐ next ┌────┐ next ┌────┐
//!  │ T3 │ ───► │ T2 │ ───► │ T1 │ ──┐
//!  └────┘      └────┘      └────┘   │
//!    ▲                              │
//!    └──────────────────────────────┘
//! ```
//!
//! ## Dispatch
//!
//! Each [`step`](Scheduler::step):
//! 1. **Resume** the current thread until it yields or finishes
//! 2. **Finished**: persistent threads are rewound, others deleted
//! 3. **Blocked**: while a critical region is open, stay on this thread
//! 4. **Quota**: otherwise count a turn and rotate to `next` once the
//!    thread has had `priority` consecutive turns
//!
//! Fairness rests entirely on thread bodies yielding; a body that never
//! yields stalls the scheduler.
//!
//! ## Driving one thread
//!
//! [`sync`](Scheduler::sync) bypasses the rotation and resumes a single
//! thread until it has taken a given number of steps. It must not be used
//! on a thread the dispatcher is driving at the same moment; the scheduler
//! refuses with [`Error::AlreadyRunning`] rather than resuming it twice.

use alloc::rc::Rc;
use alloc::vec::Vec;
use core::cell::{Cell, RefCell};

use crate::config::ThreadConfig;
use crate::error::{Error, Result};
use crate::generator::{Generator, GeneratorState};
use crate::thread::{Thread, ThreadContext, ThreadId, ThreadMeta};

// ---------------------------------------------------------------------------
// Thread list
// ---------------------------------------------------------------------------

struct Slot {
    generation: u32,
    thread: Option<Thread>,
}

/// Arena plus the circular list threaded through it.
struct ThreadList {
    slots: Vec<Slot>,
    free: Vec<usize>,
    head: Option<usize>,
    tail: Option<usize>,
    current: Option<usize>,
    len: usize,
}

impl ThreadList {
    const fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            head: None,
            tail: None,
            current: None,
            len: 0,
        }
    }

    /// The id the next insertion will get, reserving arena room for it.
    fn next_id(&mut self) -> Result<ThreadId> {
        if let Some(&index) = self.free.last() {
            return ThreadId::new(index, self.slots[index].generation);
        }
        let id = ThreadId::new(self.slots.len(), 0)?;
        self.slots.try_reserve(1).map_err(|_| Error::OutOfMemory)?;
        self.free.try_reserve(1).map_err(|_| Error::OutOfMemory)?;
        Ok(id)
    }

    fn get(&self, index: usize) -> Option<&Thread> {
        self.slots.get(index).and_then(|slot| slot.thread.as_ref())
    }

    fn get_mut(&mut self, index: usize) -> Option<&mut Thread> {
        self.slots.get_mut(index).and_then(|slot| slot.thread.as_mut())
    }

    fn resolve(&self, id: ThreadId) -> Result<&Thread> {
        match self.slots.get(id.slot()) {
            Some(slot) if slot.generation == id.generation => {
                slot.thread.as_ref().ok_or(Error::NoSuchThread)
            }
            _ => Err(Error::NoSuchThread),
        }
    }

    fn resolve_mut(&mut self, id: ThreadId) -> Result<&mut Thread> {
        match self.slots.get_mut(id.slot()) {
            Some(slot) if slot.generation == id.generation => {
                slot.thread.as_mut().ok_or(Error::NoSuchThread)
            }
            _ => Err(Error::NoSuchThread),
        }
    }

    /// Store `thread` under `id` (from [`next_id`](Self::next_id)) and link
    /// it in at the head.
    fn insert_head(&mut self, id: ThreadId, mut thread: Thread) {
        let index = id.slot();

        match (self.head, self.tail) {
            (Some(head), Some(tail)) => {
                thread.next = head;
                thread.prev = tail;
                if let Some(h) = self.get_mut(head) {
                    h.prev = index;
                }
                if let Some(t) = self.get_mut(tail) {
                    t.next = index;
                }
                self.head = Some(index);
            }
            _ => {
                // Empty list: the thread is its own neighbour
                thread.next = index;
                thread.prev = index;
                self.head = Some(index);
                self.tail = Some(index);
                self.current = Some(index);
            }
        }

        if self.free.last() == Some(&index) {
            self.free.pop();
            self.slots[index].thread = Some(thread);
        } else {
            self.slots.push(Slot {
                generation: id.generation,
                thread: Some(thread),
            });
        }
        self.len += 1;
    }

    /// Unlink the thread in slot `index`, free the slot and hand back the
    /// record.
    fn remove(&mut self, index: usize) -> Option<Thread> {
        let (prev, next) = {
            let thread = self.get(index)?;
            (thread.prev, thread.next)
        };

        if next == index {
            self.head = None;
            self.tail = None;
            self.current = None;
        } else {
            if let Some(p) = self.get_mut(prev) {
                p.next = next;
            }
            if let Some(n) = self.get_mut(next) {
                n.prev = prev;
            }
            if self.head == Some(index) {
                self.head = Some(next);
            }
            if self.tail == Some(index) {
                self.tail = Some(prev);
            }
            if self.current == Some(index) {
                self.current = Some(next);
            }
        }

        let slot = &mut self.slots[index];
        let thread = slot.thread.take();
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(index);
        self.len -= 1;
        thread
    }

    fn id_of(&self, index: usize) -> Option<ThreadId> {
        self.get(index).map(|thread| thread.meta.id)
    }
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// A cooperative scheduler: the thread list and its dispatch loop.
///
/// Independent schedulers do not share any state. Handles are `!Send`;
/// everything runs on the one hardware thread that owns the scheduler.
pub struct Scheduler {
    list: RefCell<ThreadList>,
    /// Raised by critical regions; shared with every thread body.
    blocked: Rc<Cell<bool>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            list: RefCell::new(ThreadList::new()),
            blocked: Rc::new(Cell::new(false)),
        }
    }

    /// Create a thread running `body` and link it in at the head of the
    /// list. The body does not start until the thread is dispatched or
    /// synced.
    pub fn spawn<F>(&self, config: ThreadConfig, mut body: F) -> Result<ThreadId>
    where
        F: FnMut(&ThreadContext<'_>) + 'static,
    {
        let mut list = self.list.borrow_mut();
        let id = list.next_id()?;

        let meta = Rc::new(ThreadMeta::new(id, &config));
        let inner_meta = meta.clone();
        let blocked = self.blocked.clone();
        let generator = Generator::new(config.effective_stack_size(), move |yielder| {
            let cx = ThreadContext::new(yielder, &inner_meta, &blocked);
            body(&cx);
        })?;

        list.insert_head(id, Thread::new(meta, generator, id.slot()));
        log::debug!(
            "spawned {} (priority {}, persistent {}, stack {} bytes)",
            id,
            config.priority,
            config.persistent,
            config.effective_stack_size()
        );
        Ok(id)
    }

    /// Unlink a thread and free its stack. The handle becomes stale.
    ///
    /// Deleting a thread that has not finished is the caller's business:
    /// whatever its suspended frames own is leaked, not dropped. Regions the
    /// thread left open are closed.
    ///
    /// A thread may delete itself. It keeps running until its next yield or
    /// until its body returns, and its generator is dropped once the resumer
    /// gets control back.
    pub fn delete(&self, id: ThreadId) -> Result<()> {
        let thread = {
            let mut list = self.list.borrow_mut();
            list.resolve(id)?;
            list.remove(id.slot()).ok_or(Error::NoSuchThread)?
        };
        thread.meta.release_regions(&self.blocked);

        match &thread.generator {
            Some(generator) if !generator.is_finished() => {
                log::warn!("deleting {} while {:?}", id, generator.state());
            }
            Some(_) => log::debug!("deleted {}", id),
            None => log::debug!("deleting {} while it is running", id),
        }
        // Dropped outside the list borrow: the body may own scheduler handles
        drop(thread);
        Ok(())
    }

    /// Resume one thread's generator directly.
    ///
    /// Returns whether the thread is still unfinished.
    fn resume(&self, id: ThreadId) -> Result<bool> {
        let mut generator = {
            let mut list = self.list.borrow_mut();
            let thread = list.resolve_mut(id)?;
            thread.generator.take().ok_or(Error::AlreadyRunning)?
        };

        let alive = generator.resume();

        let orphan = {
            let mut list = self.list.borrow_mut();
            match list.resolve_mut(id) {
                Ok(thread) => {
                    thread.generator = Some(generator);
                    None
                }
                // Deleted while it ran
                Err(_) => Some(generator),
            }
        };
        drop(orphan);
        Ok(alive)
    }

    /// Resume `id` until its step counter advanced by `steps` or it finishes.
    ///
    /// Returns the steps actually taken. Yields inside implicit or critical
    /// regions do not count, so a whole region passes within one call.
    pub fn sync(&self, id: ThreadId, steps: u64) -> Result<u64> {
        let meta = self.list.borrow().resolve(id)?.meta.clone();
        let start = meta.steps();

        while meta.steps() - start < steps {
            if !self.resume(id)? {
                meta.release_regions(&self.blocked);
                break;
            }
        }

        let taken = meta.steps() - start;
        log::trace!("synced {} by {} of {} steps", id, taken, steps);
        Ok(taken)
    }

    /// Resume `id` until it finishes. Returns the steps taken.
    pub fn wait(&self, id: ThreadId) -> Result<u64> {
        self.sync(id, u64::MAX)
    }

    /// Restart a finished persistent thread from the top of its body.
    pub fn rewind(&self, id: ThreadId) -> Result<()> {
        let mut list = self.list.borrow_mut();
        let thread = list.resolve_mut(id)?;
        let generator = thread.generator.as_mut().ok_or(Error::AlreadyRunning)?;

        if !generator.is_finished() {
            return Err(Error::NotFinished);
        }
        if !thread.meta.persistent {
            return Err(Error::NotPersistent);
        }

        generator.rewind()?;
        thread.meta.release_regions(&self.blocked);
        thread.budget = 0;
        log::debug!("rewound {}", id);
        Ok(())
    }

    /// Dispatch the current thread once.
    ///
    /// Returns `false` when there is nothing to run.
    pub fn step(&self) -> bool {
        let Some(id) = self.current() else {
            return false;
        };

        let alive = match self.resume(id) {
            Ok(alive) => alive,
            Err(err) => {
                // Being synced by a thread further up the stack
                log::trace!("skipping {}: {}", id, err);
                self.rotate(id);
                return true;
            }
        };
        log::trace!("dispatched {} (alive {})", id, alive);

        if !alive {
            let persistent = match self.list.borrow().resolve(id) {
                Ok(thread) => {
                    thread.meta.release_regions(&self.blocked);
                    thread.meta.persistent
                }
                // Deleted itself while running
                Err(_) => return true,
            };

            if persistent {
                if let Err(err) = self.rewind(id) {
                    log::warn!("failed to rewind {}: {}", id, err);
                }
                self.rotate(id);
            } else if let Err(err) = self.delete(id) {
                log::warn!("failed to reap {}: {}", id, err);
            }
            return true;
        }

        if self.blocked.get() {
            return true;
        }
        let quota_spent = match self.list.borrow_mut().resolve_mut(id) {
            Ok(thread) => {
                thread.budget += 1;
                thread.budget >= thread.quota()
            }
            Err(_) => false,
        };
        if quota_spent {
            self.rotate(id);
        }
        true
    }

    /// Move `current` past `id`, if `id` is still current.
    fn rotate(&self, id: ThreadId) {
        let mut list = self.list.borrow_mut();
        if list.current != Some(id.slot()) {
            return;
        }
        if let Ok(thread) = list.resolve_mut(id) {
            thread.budget = 0;
            let next = thread.next;
            list.current = Some(next);
        }
    }

    /// Dispatch forever.
    pub fn run(&self) -> ! {
        loop {
            if !self.step() {
                core::hint::spin_loop();
            }
        }
    }

    /// Dispatch until no threads remain. Never returns while a persistent
    /// thread exists.
    pub fn run_until_idle(&self) {
        while self.step() {}
    }

    // -----------------------------------------------------------------------
    // Introspection
    // -----------------------------------------------------------------------

    /// The thread the dispatcher will run next.
    pub fn current(&self) -> Option<ThreadId> {
        let list = self.list.borrow();
        list.current.and_then(|index| list.id_of(index))
    }

    pub fn len(&self) -> usize {
        self.list.borrow().len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: ThreadId) -> bool {
        self.list.borrow().resolve(id).is_ok()
    }

    /// Whether a critical region is open.
    pub fn is_blocked(&self) -> bool {
        self.blocked.get()
    }

    /// Steps `id` has taken since it was spawned.
    pub fn steps(&self, id: ThreadId) -> Result<u64> {
        Ok(self.list.borrow().resolve(id)?.meta.steps())
    }

    pub fn state(&self, id: ThreadId) -> Result<GeneratorState> {
        let list = self.list.borrow();
        let thread = list.resolve(id)?;
        Ok(thread
            .generator
            .as_ref()
            .map_or(GeneratorState::Running, |generator| generator.state()))
    }

    pub fn is_finished(&self, id: ThreadId) -> Result<bool> {
        Ok(self.state(id)? == GeneratorState::Finished)
    }

    /// Thread ids in list order, starting at the head.
    pub fn threads(&self) -> Vec<ThreadId> {
        let list = self.list.borrow();
        let mut ids = Vec::with_capacity(list.len);
        let mut cursor = list.head;
        while let Some(index) = cursor {
            let Some(thread) = list.get(index) else {
                break;
            };
            ids.push(thread.meta.id);
            cursor = Some(thread.next).filter(|&next| Some(next) != list.head);
        }
        ids
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
