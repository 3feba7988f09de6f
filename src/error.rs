use std::time::Duration;

use thiserror::Error;

/// Error taxonomy for the streaming layer.
///
/// Resolver/scheduler-level problems default to safe behavior instead of
/// surfacing here; what remains maps one-to-one onto HTTP statuses in the
/// server module.
#[derive(Debug, Error)]
pub enum StreamError {
    /// The content locator could not be reduced to a content-id.
    #[error("invalid content locator: {0}")]
    InvalidLocator(String),

    /// The requested byte range cannot be satisfied against the file length.
    /// Carries the total length so the 416 response can report `bytes */{total}`.
    #[error("range not satisfiable against length {total}")]
    UnsatisfiableRange { total: u64 },

    /// No live session for the content-id.
    #[error("content {0} not found")]
    ContentNotFound(String),

    /// File index out of bounds for the session's content.
    #[error("file index {0} not found")]
    FileNotFound(usize),

    /// The engine never reported metadata within the configured deadline.
    #[error("metadata not ready after {0:?}")]
    MetadataTimeout(Duration),

    /// The underlying swarm engine reported a terminal error. The owning
    /// session is torn down so the next request starts fresh.
    #[error("swarm engine failure: {0}")]
    Engine(#[source] anyhow::Error),
}
