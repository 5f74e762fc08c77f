//! Contention scenarios for the yield-based synchronizers.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use coopos::{Channel, Mutex, Scheduler, Semaphore, ThreadConfig};

const STACK: usize = 32 * 1024;
const THREADS: usize = 16;

fn config() -> ThreadConfig {
    ThreadConfig::new().stack_size(STACK)
}

#[test]
fn mutex_excludes_sixteen_threads() {
    const KEY: usize = 0xC0FFEE;
    let s = Scheduler::new();
    let mutex = Rc::new(Mutex::new());
    let flag = Rc::new(Cell::new(false));
    let violations = Rc::new(Cell::new(0u32));
    let entries = Rc::new(Cell::new(0u32));

    for _ in 0..THREADS {
        let (m, f, bad, count) = (mutex.clone(), flag.clone(), violations.clone(), entries.clone());
        s.spawn(config(), move |cx| {
            for _ in 0..3 {
                m.lock_with_key(cx, KEY);
                let before = f.get();
                f.set(!before);
                cx.yield_now();
                cx.yield_now();
                f.set(!f.get());
                if f.get() != before {
                    bad.set(bad.get() + 1);
                }
                count.set(count.get() + 1);
                assert!(m.unlock_with_key(KEY));
                cx.yield_now();
            }
        })
        .unwrap();
    }

    s.run_until_idle();
    assert_eq!(violations.get(), 0);
    assert_eq!(entries.get(), 3 * THREADS as u32);
    assert!(!flag.get());
    assert!(!mutex.is_locked());
}

#[test]
fn mutex_by_identity_under_dispatcher() {
    let s = Scheduler::new();
    let mutex = Rc::new(Mutex::new());
    let holders = Rc::new(Cell::new(0u32));
    let peak = Rc::new(Cell::new(0u32));

    for priority in 1..=4u8 {
        let (m, inside, max) = (mutex.clone(), holders.clone(), peak.clone());
        s.spawn(config().priority(priority), move |cx| {
            for _ in 0..4 {
                m.lock(cx);
                inside.set(inside.get() + 1);
                max.set(max.get().max(inside.get()));
                cx.yield_now();
                inside.set(inside.get() - 1);
                m.unlock(cx);
                cx.yield_now();
            }
        })
        .unwrap();
    }

    s.run_until_idle();
    assert_eq!(peak.get(), 1);
    assert!(!mutex.is_locked());
}

#[test]
fn semaphore_bounds_sixteen_threads() {
    const CAPACITY: usize = 5;
    let s = Scheduler::new();
    let sem = Rc::new(Semaphore::new(CAPACITY));
    let in_use = Rc::new(Cell::new(0i64));
    let peak = Rc::new(Cell::new(0i64));
    let floor = Rc::new(Cell::new(0i64));

    for _ in 0..THREADS {
        let (gate, used, hi, lo) = (sem.clone(), in_use.clone(), peak.clone(), floor.clone());
        s.spawn(config(), move |cx| {
            for _ in 0..2 {
                gate.wait(cx);
                used.set(used.get() + 1);
                hi.set(hi.get().max(used.get()));
                for _ in 0..3 {
                    cx.yield_now();
                }
                used.set(used.get() - 1);
                lo.set(lo.get().min(used.get()));
                gate.signal();
                cx.yield_now();
            }
        })
        .unwrap();
    }

    s.run_until_idle();
    assert_eq!(peak.get(), CAPACITY as i64);
    assert_eq!(floor.get(), 0);
    assert_eq!(in_use.get(), 0);
    assert_eq!(sem.count(), CAPACITY);
}

fn check_stat(ch: &Channel<u32>) {
    assert_eq!(ch.stat(), ch.capacity() - ch.len());
}

#[test]
fn channel_handshake() {
    let s = Scheduler::new();
    let ch: Rc<Channel<u32>> = Rc::new(Channel::new(2).unwrap());
    let received = Rc::new(RefCell::new(Vec::new()));

    let (rx, log) = (ch.clone(), received.clone());
    let reader = s
        .spawn(config(), move |cx| {
            for _ in 0..3 {
                let value = rx.read(cx);
                log.borrow_mut().push(value);
            }
        })
        .unwrap();

    // Reading from an empty channel spins
    assert_eq!(s.sync(reader, 3).unwrap(), 3);
    assert!(received.borrow().is_empty());
    assert_eq!(ch.stat(), 2);

    let tx = ch.clone();
    let writer = s
        .spawn(config(), move |cx| {
            for value in 1..=3 {
                tx.write(cx, value);
            }
        })
        .unwrap();

    // The second write fills the channel and holds the writer there
    assert_eq!(s.sync(writer, 1).unwrap(), 1);
    assert!(ch.is_full());
    check_stat(&ch);
    assert_eq!(s.sync(writer, 2).unwrap(), 2);
    assert!(ch.is_full());

    // Draining releases the writer
    assert_eq!(s.sync(reader, 1).unwrap(), 1);
    assert_eq!(*received.borrow(), vec![1, 2]);
    assert!(ch.is_empty());
    check_stat(&ch);

    assert_eq!(s.wait(writer).unwrap(), 0);
    assert_eq!(ch.len(), 1);
    check_stat(&ch);

    assert_eq!(s.wait(reader).unwrap(), 0);
    assert_eq!(*received.borrow(), vec![1, 2, 3]);
    assert_eq!(ch.stat(), 2);
}

#[test]
fn channel_preserves_order_under_dispatcher() {
    const COUNT: u32 = 50;
    let s = Scheduler::new();
    let ch = Rc::new(Channel::new(3).unwrap());
    let received = Rc::new(RefCell::new(Vec::new()));

    let tx = ch.clone();
    s.spawn(config().priority(2), move |cx| {
        for value in 0..COUNT {
            tx.write(cx, value);
        }
    })
    .unwrap();

    let (rx, log) = (ch.clone(), received.clone());
    s.spawn(config(), move |cx| {
        for _ in 0..COUNT {
            log.borrow_mut().push(rx.read(cx));
            cx.yield_now();
        }
    })
    .unwrap();

    s.run_until_idle();
    assert_eq!(*received.borrow(), (0..COUNT).collect::<Vec<_>>());
    assert!(ch.is_empty());
}
