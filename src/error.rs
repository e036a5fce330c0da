//!
//! Defines error types for capability set operations and the launcher.

/// Errors returned by value addressing, the codecs, the IAB model and the
/// capability backend.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CapError {
    /// A capability value (or vector index) lies outside the current value space.
    #[error("capability value {0} is out of range")]
    BadValue(u32),
    /// Capability or IAB text did not match the grammar.
    #[error("bad capability text: {0}")]
    BadText(String),
    /// A binary export could not be imported (length, version or range mismatch).
    #[error("bad capability export: {0}")]
    BadExport(String),
    /// The platform cannot guarantee that a launcher thread is discarded after use.
    #[error("launch is not supported on this platform")]
    NoLaunch,
    /// The capability state backend rejected a request.
    #[error("capability backend error: {0}")]
    Backend(String),
}

impl CapError {
    pub(crate) fn bad_text(detail: impl Into<String>) -> Self {
        CapError::BadText(detail.into())
    }

    pub(crate) fn bad_export(detail: impl Into<String>) -> Self {
        CapError::BadExport(detail.into())
    }
}

/// Outcome of a failed [`crate::launch::Launcher::launch`].
///
/// `Func` carries the wrapped function's own error untouched. Every other
/// variant is a failure of the launch machinery itself.
#[derive(Debug, thiserror::Error)]
pub enum LaunchError<E> {
    /// Launch refused to run the function because isolation cannot be guaranteed.
    #[error("launch is not supported on this platform")]
    NoLaunch,
    /// The dedicated OS thread could not be created.
    #[error("failed to spawn launcher thread: {0}")]
    Spawn(#[source] std::io::Error),
    /// The wrapped function panicked on the launcher thread.
    #[error("launched function panicked: {0}")]
    Panicked(String),
    /// The caller's thread state changed across the launch. Takes precedence
    /// over whatever the function returned, including its own error.
    #[error("launcher leaked privilege state into the calling thread")]
    Leaked,
    /// Reading the caller's thread state failed.
    #[error("failed to observe thread state: {0}")]
    State(#[source] CapError),
    /// The wrapped function returned an error.
    #[error("{0}")]
    Func(E),
}

impl<E> LaunchError<E> {
    /// Returns the wrapped function's error, if that is what this is.
    pub fn into_func(self) -> Option<E> {
        match self {
            LaunchError::Func(e) => Some(e),
            _ => None,
        }
    }
}
