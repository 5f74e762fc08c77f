use core::cell::Cell;

use crate::thread::ThreadContext;

/// Counting semaphore.
///
/// The count is unbounded: keeping it at or below a capacity is the
/// caller's discipline.
#[derive(Debug, Default)]
pub struct Semaphore {
    count: Cell<usize>,
}

impl Semaphore {
    pub const fn new(count: usize) -> Self {
        Self {
            count: Cell::new(count),
        }
    }

    /// Wait for a non-zero count, then take one.
    pub fn wait(&self, cx: &ThreadContext<'_>) {
        while self.count.get() == 0 {
            cx.yield_now();
        }
        self.count.set(self.count.get() - 1);
    }

    /// Take one if available, without waiting.
    pub fn try_wait(&self) -> bool {
        match self.count.get() {
            0 => false,
            n => {
                self.count.set(n - 1);
                true
            }
        }
    }

    pub fn signal(&self) {
        self.count.set(self.count.get() + 1);
    }

    pub fn count(&self) -> usize {
        self.count.get()
    }
}
