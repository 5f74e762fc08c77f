//! # coopos Configuration
//!
//! Compile-time constants governing stacks and scheduling, plus the
//! per-thread [`ThreadConfig`] handed to [`Scheduler::spawn`].
//!
//! [`Scheduler::spawn`]: crate::scheduler::Scheduler::spawn

/// Stack size in bytes used when a [`ThreadConfig`] leaves `stack_size` at 0.
/// Hosted builds get a roomier default because formatting and test harness
/// frames are far deeper than anything a firmware thread runs.
#[cfg(not(target_os = "none"))]
pub const DEFAULT_STACK_SIZE: usize = 64 * 1024;

/// Stack size in bytes used when a [`ThreadConfig`] leaves `stack_size` at 0.
#[cfg(target_os = "none")]
pub const DEFAULT_STACK_SIZE: usize = 2 * 1024;

/// Smallest stack a fork will allocate. Requests below this are rounded up:
/// the initial register frame alone takes up to 104 bytes on Cortex-M4F.
pub const MIN_STACK_SIZE: usize = 512;

/// Alignment of every allocated stack. 16 bytes satisfies the x86_64 SysV
/// and AArch64 ABIs and over-satisfies the 8 bytes AAPCS needs.
pub const STACK_ALIGN: usize = 16;

/// Priority used by [`ThreadConfig::default`]. A thread's priority is the
/// number of consecutive turns it gets before the scheduler moves on.
pub const DEFAULT_PRIORITY: u8 = 1;

/// Static configuration for a thread, set at creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadConfig {
    /// Restart the thread from the top when its body finishes, instead of
    /// removing it from the scheduler.
    pub persistent: bool,

    /// Consecutive scheduler turns granted per rotation. 0 behaves as 1.
    pub priority: u8,

    /// Stack size in bytes. If 0, uses [`DEFAULT_STACK_SIZE`].
    pub stack_size: usize,
}

impl ThreadConfig {
    /// A non-persistent thread with the default priority and stack.
    pub const fn new() -> Self {
        Self {
            persistent: false,
            priority: DEFAULT_PRIORITY,
            stack_size: 0,
        }
    }

    pub const fn persistent(mut self, persistent: bool) -> Self {
        self.persistent = persistent;
        self
    }

    pub const fn priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    pub const fn stack_size(mut self, stack_size: usize) -> Self {
        self.stack_size = stack_size;
        self
    }

    /// Returns the effective stack size, falling back to the system default
    /// and never going below [`MIN_STACK_SIZE`].
    #[inline]
    pub const fn effective_stack_size(&self) -> usize {
        let size = if self.stack_size > 0 {
            self.stack_size
        } else {
            DEFAULT_STACK_SIZE
        };
        if size < MIN_STACK_SIZE {
            MIN_STACK_SIZE
        } else {
            size
        }
    }

    /// Number of consecutive turns before the scheduler rotates.
    #[inline]
    pub const fn quota(&self) -> u32 {
        if self.priority == 0 {
            1
        } else {
            self.priority as u32
        }
    }
}

impl Default for ThreadConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_stack_size_default() {
        let config = ThreadConfig::new();
        assert_eq!(config.effective_stack_size(), DEFAULT_STACK_SIZE);
    }

    #[test]
    fn test_effective_stack_size_floor() {
        let config = ThreadConfig::new().stack_size(64);
        assert_eq!(config.effective_stack_size(), MIN_STACK_SIZE);

        let config = ThreadConfig::new().stack_size(8192);
        assert_eq!(config.effective_stack_size(), 8192);
    }

    #[test]
    fn test_quota() {
        assert_eq!(ThreadConfig::new().priority(0).quota(), 1);
        assert_eq!(ThreadConfig::new().priority(1).quota(), 1);
        assert_eq!(ThreadConfig::new().priority(4).quota(), 4);
    }
}
