/// Errors returned by fallible [`crate::Engine`] operations.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum TkeError {
    /// `install_key` was given key material of a length AES does not support.
    #[error("unsupported key length {0} bytes (expected 16, 24, or 32)")]
    UnsupportedKeyLength(usize),

    /// `process` was given buffers whose length is not a multiple of the
    /// cipher's 16-byte block size, or whose lengths disagree.
    #[error("buffer length {0} is not a multiple of the block size, or src/dst differ")]
    UnalignedLength(usize),

    /// `process` was called before any key had been installed.
    #[error("no key installed")]
    NotInstalled,
}
