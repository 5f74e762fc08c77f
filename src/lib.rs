//! # coopos: Cooperative Kernel Substrate
//!
//! Cooperative multithreading for resource-constrained devices, sitting
//! beneath driver and application code. No preemption, no atomics: threads
//! interleave only where they explicitly yield.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │               Drivers / Application Threads            │
//! ├────────────────────────────────────────────────────────┤
//! │  Synchronizers (sync/)                                 │
//! │  Mutex · Semaphore · Channel       (yield loops only)  │
//! ├──────────────────────────┬─────────────────────────────┤
//! │  Scheduler (scheduler.rs)│  Threads (thread.rs)        │
//! │  ─ spawn() · delete()    │  ─ ThreadContext            │
//! │  ─ sync() · wait()       │  ─ yield_now() · finish()   │
//! │  ─ step() · run()        │  ─ implicit() · critical()  │
//! ├──────────────────────────┴─────────────────────────────┤
//! │  Generator (generator.rs)                              │
//! │    resume() · suspend() · finish() · rewind()          │
//! ├────────────────────────────────────────────────────────┤
//! │  State · Fork (context.rs)                             │
//! ├────────────────────────────────────────────────────────┤
//! │  Arch Port (arch/): x86_64 · aarch64 · cortex_m4       │
//! │    switch() · init_stack()                             │
//! └────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Progress model
//!
//! Each counted yield is a *step*. [`Scheduler::sync`] resumes one thread
//! until it has taken a given number of steps, independent of the
//! round-robin dispatcher, which makes interleavings reproducible in tests.
//! Implicit regions hide internal yields from the step counter; critical
//! regions additionally stop the dispatcher from switching threads.
//!
//! ## Example
//!
//! ```
//! use coopos::{Scheduler, ThreadConfig};
//!
//! let scheduler = Scheduler::new();
//! let id = scheduler
//!     .spawn(ThreadConfig::new(), |cx| {
//!         for _ in 0..3 {
//!             cx.yield_now();
//!         }
//!     })
//!     .unwrap();
//!
//! assert_eq!(scheduler.sync(id, 2).unwrap(), 2);
//! assert_eq!(scheduler.wait(id).unwrap(), 1);
//! ```
//!
//! ## Memory model
//!
//! - Stacks, thread records and channel buffers come from the global
//!   allocator; failure is reported as [`Error::OutOfMemory`], never retried
//! - Everything is single-core: handles are `!Send` and shared state lives
//!   in `Cell`/`RefCell`

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod arch;
pub mod config;
pub mod context;
pub mod error;
pub mod generator;
pub mod scheduler;
pub mod sync;
pub mod thread;

pub use config::ThreadConfig;
pub use error::{Error, Result};
pub use generator::{Generator, GeneratorState, Yielder};
pub use scheduler::Scheduler;
pub use sync::{Channel, Mutex, Owner, Semaphore};
pub use thread::{RegionGuard, ThreadContext, ThreadId};
