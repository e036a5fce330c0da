//!
//! Thread-isolated execution of privilege-changing code.
//!
//! Capability state, securebits and friends are per-thread kernel state. A
//! [`Launcher`] runs its function on a freshly spawned OS thread that nothing
//! else ever runs on, joins it, and lets it exit. Whatever the function does
//! to its thread's privileges dies with that thread: it cannot leak into the
//! caller or into later work that a pooled thread would have picked up.

use std::any::Any;
use std::sync::Arc;
use std::thread;

use crate::backend::{self, CapBackend};
use crate::error::LaunchError;

/// True where a launcher thread is guaranteed to be discarded after use and
/// its privilege state is private to it. [`Launcher::launch`] fails with
/// [`LaunchError::NoLaunch`] elsewhere.
pub const LAUNCH_SUPPORTED: bool = cfg!(target_os = "linux");

const THREAD_NAME: &str = "cap-launch";

/// Runs a function on its own short-lived OS thread.
pub struct Launcher<F> {
    func: F,
    backend: Option<Arc<dyn CapBackend>>,
}

impl<F> Launcher<F> {
    /// A launcher for `func`, checking the caller's state with the system backend.
    pub fn new(func: F) -> Self {
        Launcher {
            func,
            backend: backend::system_backend(),
        }
    }

    /// Uses `backend` to confirm the caller's thread state is unchanged.
    pub fn with_backend(mut self, backend: Arc<dyn CapBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Runs `func(data)` on a dedicated thread and waits for it.
    ///
    /// The function's own error comes back as [`LaunchError::Func`]. The
    /// other variants mean the launch itself failed: the platform cannot
    /// isolate the call, the thread could not be spawned, the function
    /// panicked, or the caller's thread state changed across the call.
    ///
    /// A changed caller state is reported as [`LaunchError::Leaked`] even
    /// when the function failed, and the function's result is dropped.
    pub fn launch<D, T, E>(&self, data: D) -> Result<T, LaunchError<E>>
    where
        F: Fn(D) -> Result<T, E> + Sync,
        D: Send,
        T: Send,
        E: Send,
    {
        if !LAUNCH_SUPPORTED {
            tracing::warn!("refusing to launch: thread isolation unavailable");
            return Err(LaunchError::NoLaunch);
        }

        let before = match &self.backend {
            Some(b) => Some(b.thread_state().map_err(LaunchError::State)?),
            None => None,
        };

        let func = &self.func;
        let joined = thread::scope(|s| {
            let handle = thread::Builder::new()
                .name(THREAD_NAME.into())
                .spawn_scoped(s, move || func(data))
                .map_err(LaunchError::Spawn)?;
            tracing::trace!("launcher thread started");
            handle
                .join()
                .map_err(|payload| LaunchError::Panicked(panic_message(payload.as_ref())))
        });
        tracing::trace!("launcher thread exited");

        if let (Some(b), Some(before)) = (&self.backend, before) {
            let after = b.thread_state().map_err(LaunchError::State)?;
            if after != before {
                tracing::warn!(?before, ?after, "caller thread state changed across launch");
                return Err(LaunchError::Leaked);
            }
        }

        joined?.map_err(LaunchError::Func)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
