//! Adapts the process's stdin/stdout into the single `Read + Write` type
//! [`hpn_scp::PeerLink`] expects, the way stock `scp -f`/`-t` treat their
//! inherited pipes as the peer link when re-invoked remotely.

use std::io::{self, Read, Stdin, Stdout, Write};

/// Stdin paired with stdout as one bidirectional stream.
pub struct StdioLink {
    input: Stdin,
    output: Stdout,
}

impl StdioLink {
    /// Takes ownership of the process's stdin/stdout handles.
    pub fn new() -> Self {
        StdioLink {
            input: io::stdin(),
            output: io::stdout(),
        }
    }
}

impl Default for StdioLink {
    fn default() -> Self {
        StdioLink::new()
    }
}

impl Read for StdioLink {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.input.read(buf)
    }
}

impl Write for StdioLink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.output.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.output.flush()
    }
}
