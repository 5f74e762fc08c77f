use alloc::vec::Vec;
use core::cell::RefCell;
use core::fmt;

use crate::error::{Error, Result};
use crate::thread::ThreadContext;

/// Fixed-capacity ring buffer.
struct Ring<T> {
    slots: Vec<Option<T>>,
    head: usize,
    len: usize,
}

impl<T> Ring<T> {
    fn with_capacity(capacity: usize) -> Result<Self> {
        let mut slots = Vec::new();
        slots
            .try_reserve_exact(capacity)
            .map_err(|_| Error::OutOfMemory)?;
        slots.resize_with(capacity, || None);
        Ok(Self {
            slots,
            head: 0,
            len: 0,
        })
    }

    fn capacity(&self) -> usize {
        self.slots.len()
    }

    fn is_full(&self) -> bool {
        self.len == self.capacity()
    }

    fn push(&mut self, value: T) -> core::result::Result<(), T> {
        if self.is_full() {
            return Err(value);
        }
        let tail = (self.head + self.len) % self.capacity();
        self.slots[tail] = Some(value);
        self.len += 1;
        Ok(())
    }

    fn pop(&mut self) -> Option<T> {
        if self.len == 0 {
            return None;
        }
        let value = self.slots[self.head].take();
        self.head = (self.head + 1) % self.capacity();
        self.len -= 1;
        value
    }
}

/// Bounded channel between threads of one scheduler.
///
/// A write is a rendezvous: after pushing, the writer keeps yielding until
/// the buffer is no longer full, so a write that fills the channel only
/// returns once a reader has drained an element.
pub struct Channel<T> {
    ring: RefCell<Ring<T>>,
}

impl<T> Channel<T> {
    /// Allocate a channel holding up to `capacity` elements.
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::ZeroCapacity);
        }
        Ok(Self {
            ring: RefCell::new(Ring::with_capacity(capacity)?),
        })
    }

    /// Wait for an element and take it.
    pub fn read(&self, cx: &ThreadContext<'_>) -> T {
        loop {
            if let Some(value) = self.try_read() {
                return value;
            }
            cx.yield_now();
        }
    }

    /// Wait for room, push `value`, then wait until the channel is no
    /// longer full.
    pub fn write(&self, cx: &ThreadContext<'_>, value: T) {
        let mut pending = value;
        loop {
            match self.try_write(pending) {
                Ok(()) => break,
                Err(value) => pending = value,
            }
            cx.yield_now();
        }
        while self.is_full() {
            cx.yield_now();
        }
    }

    /// Take an element if one is buffered.
    pub fn try_read(&self) -> Option<T> {
        self.ring.borrow_mut().pop()
    }

    /// Push without waiting. Hands the value back when full.
    pub fn try_write(&self, value: T) -> core::result::Result<(), T> {
        self.ring.borrow_mut().push(value)
    }

    pub fn is_empty(&self) -> bool {
        self.ring.borrow().len == 0
    }

    pub fn is_full(&self) -> bool {
        self.ring.borrow().is_full()
    }

    /// Free slots: `capacity - len`.
    pub fn stat(&self) -> usize {
        let ring = self.ring.borrow();
        ring.capacity() - ring.len
    }

    pub fn len(&self) -> usize {
        self.ring.borrow().len
    }

    pub fn capacity(&self) -> usize {
        self.ring.borrow().capacity()
    }
}

impl<T> fmt::Debug for Channel<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ThreadConfig;
    use crate::scheduler::Scheduler;
    use alloc::rc::Rc;
    use core::cell::Cell;

    #[test]
    fn test_zero_capacity() {
        assert_eq!(Channel::<u8>::new(0).unwrap_err(), Error::ZeroCapacity);
    }

    #[test]
    fn test_new_out_of_memory() {
        assert_eq!(
            Channel::<u64>::new(usize::MAX / 4).unwrap_err(),
            Error::OutOfMemory
        );
    }

    #[test]
    fn test_ring_wraps() {
        let ch = Channel::new(3).unwrap();
        for round in 0..4 {
            assert!(ch.try_write(round * 10).is_ok());
            assert!(ch.try_write(round * 10 + 1).is_ok());
            assert_eq!(ch.try_read(), Some(round * 10));
            assert_eq!(ch.try_read(), Some(round * 10 + 1));
        }
        assert!(ch.is_empty());
        assert_eq!(ch.stat(), 3);
    }

    #[test]
    fn test_try_write_full_returns_value() {
        let ch = Channel::new(1).unwrap();
        assert_eq!(ch.try_write('a'), Ok(()));
        assert_eq!(ch.try_write('b'), Err('b'));
        assert!(ch.is_full());
        assert_eq!(ch.stat(), 0);
    }

    #[test]
    fn test_write_waits_for_drain() {
        let s = Scheduler::new();
        let ch = Rc::new(Channel::new(2).unwrap());
        let done = Rc::new(Cell::new(false));

        let (tx, flag) = (ch.clone(), done.clone());
        let writer = s
            .spawn(ThreadConfig::new().stack_size(32 * 1024), move |cx| {
                tx.write(cx, 1);
                tx.write(cx, 2);
                flag.set(true);
            })
            .unwrap();

        // The second write fills the channel and spins
        assert_eq!(s.sync(writer, 2).unwrap(), 2);
        assert!(ch.is_full());
        assert!(!done.get());

        assert_eq!(ch.try_read(), Some(1));
        assert_eq!(s.wait(writer).unwrap(), 0);
        assert!(done.get());
        assert_eq!(ch.try_read(), Some(2));
        assert_eq!(ch.try_read(), None);
    }
}
