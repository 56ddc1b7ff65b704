/// Errors surfaced by this crate.
///
/// Not every error here is fatal to a session: see the session driver for
/// how each variant maps to "record in the deferred-error slot and keep
/// going" versus "send a fatal record and stop".
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum RcpError {
    /// The peer sent something that does not parse as any known record, or
    /// a record was truncated before its terminator.
    #[error("protocol desync: {0}")]
    Desync(String),

    /// The peer sent a `0x01`-prefixed non-fatal error.
    #[error("peer reported error: {0}")]
    PeerNonFatal(String),

    /// The peer sent a `0x02`-prefixed fatal error.
    #[error("peer reported fatal error: {0}")]
    PeerFatal(String),

    /// A brace-expansion pattern had unbalanced braces.
    #[error("invalid brace pattern: {0}")]
    InvalidPattern(String),

    /// A local filesystem operation (open, read, write, stat, chmod,
    /// utimes) failed.
    #[error("{path}: {source}")]
    Io {
        /// Path the operation was acting on.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A name received from the peer would escape the current destination
    /// directory (absolute path, or contains `..`/`/`).
    #[error("unsafe path component in peer-supplied name: {0:?}")]
    UnsafeName(String),
}

impl RcpError {
    /// Wraps an I/O error with the path it occurred on.
    pub(crate) fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        RcpError::Io {
            path: path.into(),
            source,
        }
    }
}
