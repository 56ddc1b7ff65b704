//! Narrow traits at the boundary of what this crate owns: the peer
//! transport and progress reporting are both somebody else's problem.

use std::io::{Read, Write};

/// A pair of readable/writable byte streams to a peer process.
///
/// In the binary this is the stdin/stdout pipes of a spawned child; in
/// tests it is anything that implements `Read + Write`, such as a
/// `std::io::Cursor` or a local socket pair.
pub trait PeerLink: Read + Write {}

impl<T: Read + Write + ?Sized> PeerLink for T {}

/// Receives per-file progress notifications. The session driver calls
/// this as bytes cross the wire; rendering them is the caller's problem.
pub trait ProgressSink {
    /// `name` is the file currently in flight; `sent`/`total` are body
    /// bytes transferred and the total body size, respectively.
    fn on_file_progress(&self, name: &str, sent: u64, total: u64);
}

/// A [`ProgressSink`] that discards every notification.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullProgressSink;

impl ProgressSink for NullProgressSink {
    fn on_file_progress(&self, _name: &str, _sent: u64, _total: u64) {}
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn cursor_satisfies_peer_link() {
        fn assert_peer_link<T: PeerLink>(_: &T) {}
        let cursor = Cursor::new(Vec::<u8>::new());
        assert_peer_link(&cursor);
    }

    #[test]
    fn null_sink_does_not_panic() {
        NullProgressSink.on_file_progress("f", 1, 2);
    }
}
