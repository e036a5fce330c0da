#![deny(unsafe_code)]
#![deny(clippy::all)]
#![deny(deprecated)]

//!
//! Capset-Core is a capability algebra for the Linux privilege model.
//!
//! It represents Effective/Permitted/Inheritable capability sets over a value
//! universe that can grow with the kernel, converts them to and from a
//! compact text grammar and a versioned binary export, layers the
//! Inheritable/Ambient/Bounding (IAB) model on top, and runs
//! privilege-changing code on throwaway threads so that thread-local
//! privilege state never leaks.

// Values, flags and vectors shared by every module.
pub mod types;

// Bit addressing over the runtime-sized value space.
pub mod space;

// The capability set and its text and binary codecs.
pub mod set;

// Inheritable / Ambient / Bounding vectors.
pub mod iab;

// Thread-isolated launcher.
pub mod launch;

// Kernel-facing capability state I/O.
pub mod backend;

pub mod error;

pub use error::{CapError, LaunchError};
pub use iab::{Iab, IabDiff};
pub use launch::{Launcher, LAUNCH_SUPPORTED};
pub use set::{CapSet, Diff, ExportConfig, Exported};
pub use space::ValueSpace;
pub use types::{Flag, Value, Vector, NAMED_COUNT};

/// Installs a `fmt` subscriber for this crate's `tracing` events. Returns
/// false if a global subscriber was already set.
#[cfg(feature = "log")]
pub fn init_logging() -> bool {
    tracing_subscriber::fmt().try_init().is_ok()
}
