//! # Errors
//!
//! Every fallible kernel call reports one of these. Allocation failure is
//! surfaced once at creation time and never retried.

/// Errors returned by the coopos kernel API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// The allocator could not provide a stack, thread slot or buffer.
    #[error("out of memory")]
    OutOfMemory,

    /// The thread handle is stale or was never issued by this scheduler.
    #[error("no such thread")]
    NoSuchThread,

    /// The operation needs a finished thread.
    #[error("thread has not finished")]
    NotFinished,

    /// Only persistent threads can be rewound.
    #[error("thread is not persistent")]
    NotPersistent,

    /// The coroutine is currently executing and cannot be resumed or
    /// rewound from here.
    #[error("thread is already running")]
    AlreadyRunning,

    /// A channel needs room for at least one element.
    #[error("channel capacity must be non-zero")]
    ZeroCapacity,
}

pub type Result<T> = core::result::Result<T, Error>;
