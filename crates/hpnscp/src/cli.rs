//! Command-line surface for the wrapper that drives [`hpn_scp::Session`].
//!
//! Only the flags that affect how *this* process behaves are modelled
//! here; anything about spawning a secure-channel program to reach a
//! remote peer (jump host, identity file, remote program path, port) is
//! accepted and validated but otherwise left to the caller's
//! transport — this binary only knows how to be one end of the pipe.

use std::path::PathBuf;

use clap::Parser;

/// Resumable remote-copy protocol driver.
#[derive(Debug, Parser)]
#[command(name = "hpnscp", version, about)]
pub struct Cli {
    /// Print a per-file summary as each transfer completes.
    #[arg(short = 'v', long)]
    pub verbose: bool,

    /// Suppress all non-error output.
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Recurse into directories.
    #[arg(short = 'r', long)]
    pub recursive: bool,

    /// Preserve modification and access times, and permission bits.
    #[arg(short = 'p', long = "preserve-times")]
    pub preserve: bool,

    /// Treat the destination as a directory even if it does not exist yet.
    #[arg(short = 'd', long = "force-directory-target")]
    pub target_is_directory: bool,

    /// Negotiate hash-based resume with the peer.
    #[arg(short = 'Z', long)]
    pub resume: bool,

    /// Cap transfer rate in kilobits/sec (0 or omitted means unlimited).
    #[arg(short = 'l', long = "bandwidth-limit", value_name = "KBPS")]
    pub bandwidth_limit_kbps: Option<u64>,

    /// Load session defaults from a config file before applying the flags
    /// above as overrides.
    #[arg(short = 'F', long = "config", value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Compression flag passed through to the secure-channel program;
    /// this driver does not interpret it.
    #[arg(short = 'C', long = "compress")]
    pub compress: bool,

    /// Cipher name passed through to the secure-channel program.
    #[arg(short = 'c', long = "cipher", value_name = "NAME")]
    pub cipher: Option<String>,

    /// Identity file passed through to the secure-channel program.
    #[arg(short = 'i', long = "identity-file", value_name = "PATH")]
    pub identity_file: Option<PathBuf>,

    /// Jump host passed through to the secure-channel program.
    #[arg(short = 'J', long = "jump-host", value_name = "HOST")]
    pub jump_host: Option<String>,

    /// Local port passed through to the secure-channel program.
    #[arg(short = 'P', long = "port")]
    pub port: Option<u16>,

    /// Path to this program, for re-invocation on the remote end.
    #[arg(long = "program-path", value_name = "PATH")]
    pub program_path: Option<PathBuf>,

    /// Path to this program on the remote host.
    #[arg(short = 'S', long = "remote-program-path", value_name = "PATH")]
    pub remote_program_path: Option<PathBuf>,

    /// Brace-expandable name pattern(s) the receiver should accept; only
    /// meaningful with `--to`.
    #[arg(long = "pattern", value_name = "PATTERN")]
    pub pattern: Vec<String>,

    #[command(subcommand)]
    pub mode: Mode,
}

/// Which end of the wire protocol this invocation plays. A real
/// deployment reaches this mode by having the secure-channel program
/// re-invoke the binary on the remote host; this binary does not spawn
/// that program itself (see the crate's `PeerLink` seam).
#[derive(Debug, clap::Subcommand)]
#[non_exhaustive]
pub enum Mode {
    /// Act as the sender: read `paths` from local disk and stream them to
    /// stdout as wire-protocol records, per the stock `scp -f` contract.
    From {
        /// Files or directories to send.
        paths: Vec<PathBuf>,
    },
    /// Act as the receiver: read wire-protocol records from stdin and
    /// write them under `destination`, per the stock `scp -t` contract.
    To {
        /// Directory (or, for a single non-recursive file, file path) to
        /// receive into.
        destination: PathBuf,
    },
}
