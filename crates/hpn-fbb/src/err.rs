/// Errors returned by fallible [`crate::Fbb`] operations.
///
/// Violations of the buffer's internal invariants (see the module docs on
/// [`crate::Fbb`]) are not represented here: those are unrecoverable and
/// abort the process, per the "Sanity" design of this buffer.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum FbbError {
    /// The operation would mutate a read-only buffer, or a buffer that is
    /// currently shared with a live child view.
    #[error("buffer is read-only or shared")]
    ReadOnly,

    /// The requested growth would carry the buffer past its configured
    /// maximum capacity.
    #[error("operation would exceed max capacity")]
    WouldExceedMax,

    /// A consume operation asked for more bytes than are available.
    #[error("requested {requested} bytes but only {available} are available")]
    InsufficientData {
        /// Number of bytes requested.
        requested: usize,
        /// Number of bytes actually available to consume.
        available: usize,
    },

    /// `set_max_capacity` was asked to set a ceiling below the buffer's
    /// current live size.
    #[error("new max capacity {requested} is below current live size {live_size}")]
    CapacityBelowLiveSize {
        /// The max capacity that was requested.
        requested: usize,
        /// The buffer's current live size.
        live_size: usize,
    },

    /// `set_max_capacity` was asked to exceed the hard ceiling this crate
    /// enforces regardless of caller intent.
    #[error("requested max capacity {requested} exceeds hard ceiling {ceiling}")]
    ExceedsHardCeiling {
        /// The max capacity that was requested.
        requested: usize,
        /// The hard ceiling enforced by this crate.
        ceiling: usize,
    },

    /// A child view's window does not lie inside its parent's live region.
    #[error("child window [{start}, {start}+{len}) is out of bounds for parent live size {live_size}")]
    WindowOutOfBounds {
        /// Window start offset requested.
        start: usize,
        /// Window length requested.
        len: usize,
        /// The parent's live size at the time of the request.
        live_size: usize,
    },
}
