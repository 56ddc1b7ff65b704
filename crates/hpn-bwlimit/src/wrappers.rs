use std::io::{self, Read, Write};
use std::sync::Arc;

use crate::limiter::BwLimiter;

/// Wraps a [`Read`] stream, reporting every completed read to a
/// [`BwLimiter`].
pub struct LimitedReader<R> {
    limiter: Arc<BwLimiter>,
    inner: R,
}

impl<R: Read> LimitedReader<R> {
    /// Wraps `inner`, throttling it against `limiter`.
    pub fn new(limiter: Arc<BwLimiter>, inner: R) -> Self {
        LimitedReader { limiter, inner }
    }

    /// Returns the wrapped stream.
    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read> Read for LimitedReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.limiter.account(n);
        Ok(n)
    }
}

/// Wraps a [`Write`] stream, reporting every completed write to a
/// [`BwLimiter`].
pub struct LimitedWriter<W> {
    limiter: Arc<BwLimiter>,
    inner: W,
}

impl<W: Write> LimitedWriter<W> {
    /// Wraps `inner`, throttling it against `limiter`.
    pub fn new(limiter: Arc<BwLimiter>, inner: W) -> Self {
        LimitedWriter { limiter, inner }
    }

    /// Returns the wrapped stream.
    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for LimitedWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.limiter.account(n);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod test {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use std::io::Cursor;

    #[test]
    fn reader_passes_bytes_through_unlimited() {
        let limiter = Arc::new(BwLimiter::new(0));
        let mut reader = LimitedReader::new(limiter, Cursor::new(b"hello world".to_vec()));
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"hello world");
    }

    #[test]
    fn writer_passes_bytes_through_unlimited() {
        let limiter = Arc::new(BwLimiter::new(0));
        let mut writer = LimitedWriter::new(limiter, Vec::new());
        writer.write_all(b"hello world").unwrap();
        assert_eq!(writer.into_inner(), b"hello world");
    }
}
