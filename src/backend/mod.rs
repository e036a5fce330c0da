//!
//! Capability state I/O for the calling thread.
//!
//! The algebra in this crate never touches the kernel directly. Everything
//! that reads or writes live privilege state goes through a [`CapBackend`],
//! which keeps the codecs pure and lets tests substitute an in-memory model.

use std::sync::Arc;

use crate::error::CapError;
use crate::set::CapSet;
use crate::types::Value;

#[cfg(target_os = "linux")]
pub mod linux;
#[cfg(target_os = "linux")]
pub use linux::LinuxBackend;

#[cfg(any(test, feature = "test-utils"))]
pub mod memory;
#[cfg(any(test, feature = "test-utils"))]
pub use memory::MemoryBackend;

/// Thread-local privilege state that must not leak across a launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadState {
    pub caps: CapSet,
    pub secbits: u32,
    pub keep_caps: bool,
}

/// Reads and writes the calling thread's capability state.
///
/// Every method acts on the thread it is called from. Implementations must
/// not cache per-thread state across threads.
pub trait CapBackend: Send + Sync {
    /// Reads the calling thread's capability sets.
    fn get_proc(&self) -> Result<CapSet, CapError>;

    /// Replaces the calling thread's capability sets.
    fn set_proc(&self, set: &CapSet) -> Result<(), CapError>;

    /// Reads the capability sets of another process.
    fn get_pid(&self, pid: i32) -> Result<CapSet, CapError>;

    /// Generic process-control call. The request codes belong to the backend.
    fn prctl(&self, request: i32, args: [u64; 4]) -> Result<i32, CapError>;

    /// Like [`CapBackend::prctl`], for requests that write state.
    fn prctlw(&self, request: i32, args: [u64; 4]) -> Result<i32, CapError> {
        self.prctl(request, args)
    }

    /// True if `value` is still in the bounding set.
    fn get_bound(&self, value: Value) -> Result<bool, CapError>;

    /// Removes `value` from the bounding set.
    fn drop_bound(&self, value: Value) -> Result<(), CapError>;

    /// True if `value` is raised in the ambient set.
    fn get_ambient(&self, value: Value) -> Result<bool, CapError>;

    fn set_ambient(&self, value: Value, raised: bool) -> Result<(), CapError>;

    /// Lowers every ambient capability.
    fn reset_ambient(&self) -> Result<(), CapError>;

    fn get_secbits(&self) -> Result<u32, CapError>;

    fn set_secbits(&self, bits: u32) -> Result<(), CapError>;

    /// Whether permitted capabilities survive a change away from uid 0.
    fn keep_caps(&self) -> Result<bool, CapError>;

    fn set_keep_caps(&self, keep: bool) -> Result<(), CapError>;

    /// Snapshot of everything a launch must leave untouched.
    fn thread_state(&self) -> Result<ThreadState, CapError> {
        Ok(ThreadState {
            caps: self.get_proc()?,
            secbits: self.get_secbits()?,
            keep_caps: self.keep_caps()?,
        })
    }
}

/// The backend for the running platform, if there is one.
pub fn system_backend() -> Option<Arc<dyn CapBackend>> {
    #[cfg(target_os = "linux")]
    {
        Some(Arc::new(LinuxBackend::new()))
    }
    #[cfg(not(target_os = "linux"))]
    {
        None
    }
}
