//! # Synchronization Primitives
//!
//! Mutex, semaphore and bounded channel for threads on one [`Scheduler`].
//!
//! None of them disable interrupts or use atomic instructions. Blocking is a
//! loop around [`ThreadContext::yield_now`], and correctness rests on only
//! one thread body executing at any instant: state lives in `Cell`s and
//! `RefCell`s that are never borrowed across a yield. Every wait loop yield
//! counts as a step, so a blocked thread driven by [`Scheduler::sync`]
//! reports progress instead of hanging the caller.
//!
//! Waiting forever is possible by construction (a mutex nobody releases, a
//! channel nobody drains). That is a liveness contract on the caller, not
//! something these types detect.
//!
//! [`Scheduler`]: crate::scheduler::Scheduler
//! [`Scheduler::sync`]: crate::scheduler::Scheduler::sync
//! [`ThreadContext::yield_now`]: crate::thread::ThreadContext::yield_now

mod channel;
mod mutex;
mod semaphore;

pub use self::channel::Channel;
pub use self::mutex::{Mutex, Owner};
pub use self::semaphore::Semaphore;
