//! The session driver: walks a caller-supplied sequence of outbound items
//! (sender role) or drives the receiver's side of the wire protocol against
//! a destination directory (receiver role). Filesystem traversal itself is
//! somebody else's problem — this module only opens the files it is told
//! about and copies bytes.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rand::Rng;

use hpn_bwlimit::{BwLimiter, LimitedWriter};

use crate::brace;
use crate::config::SessionConfig;
use crate::err::RcpError;
use crate::hash;
use crate::seams::{NullProgressSink, PeerLink, ProgressSink};
use crate::wire::{self, ControlRecord, MatchIndicator, ReplyKind, Wire};

/// A single file to emit, already resolved to a path on disk.
#[derive(Debug, Clone)]
pub struct SendFile {
    /// Path to read the file's content from.
    pub path: PathBuf,
    /// Basename to announce to the peer.
    pub name: String,
    /// Permission bits (as from `fs::Permissions`, not a raw `st_mode`).
    pub mode: u32,
    /// `(mtime, atime)` in seconds, sent ahead of the file when the
    /// session has `preserve` set.
    pub times: Option<(u64, u64)>,
}

/// One entry in a sender's pre-enumerated walk. Built by the caller — this
/// crate does not look at the filesystem to decide what exists.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum SendItem {
    /// Send a regular file's content.
    File(SendFile),
    /// Enter a subdirectory (a matching `LeaveDir` must follow).
    EnterDir {
        /// Basename to announce to the peer.
        name: String,
        /// Permission bits.
        mode: u32,
        /// `(mtime, atime)` applied to the directory, if preserving.
        times: Option<(u64, u64)>,
    },
    /// Leave the directory most recently entered.
    LeaveDir,
}

/// Drives either side of the wire protocol over a [`PeerLink`].
pub struct Session<'a, L: PeerLink + ?Sized, P: ProgressSink = NullProgressSink> {
    wire: Wire<'a, L>,
    config: SessionConfig,
    progress: P,
    limiter: Option<Arc<BwLimiter>>,
    error_count: u32,
    deferred_error: Option<String>,
}

impl<'a, L: PeerLink + ?Sized> Session<'a, L, NullProgressSink> {
    /// Creates a session with no progress reporting.
    pub fn new(link: &'a mut L, config: SessionConfig) -> Self {
        Session::with_progress(link, config, NullProgressSink)
    }
}

impl<'a, L: PeerLink + ?Sized, P: ProgressSink> Session<'a, L, P> {
    /// Creates a session reporting per-file progress to `progress`.
    pub fn with_progress(link: &'a mut L, config: SessionConfig, progress: P) -> Self {
        let limiter = config
            .bandwidth_limit_kbps
            .filter(|&kbps| kbps > 0)
            .map(|kbps| Arc::new(BwLimiter::new(kbps.min(u64::from(u32::MAX)) as u32)));
        Session {
            wire: Wire::new(link),
            config,
            progress,
            limiter,
            error_count: 0,
            deferred_error: None,
        }
    }

    /// Non-fatal errors accumulated so far (peer-reported and local I/O).
    /// A caller exits 1 if this is nonzero at end of session.
    #[must_use]
    pub fn error_count(&self) -> u32 {
        self.error_count
    }

    // ---------------------------------------------------------------
    // Sender role
    // ---------------------------------------------------------------

    /// Sends every item in `items` in order, matching the wire shape a
    /// recursive walk would produce (`D`...`E` pairs bracketing a
    /// subtree's records).
    pub fn send_all(&mut self, items: &[SendItem]) -> Result<(), RcpError> {
        for item in items {
            match item {
                SendItem::File(file) => self.send_file(file)?,
                SendItem::EnterDir { name, mode, times } => {
                    if let Some((mtime, atime)) = times {
                        self.send_time(*mtime, *atime)?;
                    }
                    self.wire.send_line(&wire::encode_dir(*mode, name))?;
                    self.wire.recv_ack()?;
                }
                SendItem::LeaveDir => {
                    self.wire.send_line(wire::END_DIR)?;
                    self.wire.recv_ack()?;
                }
            }
        }
        Ok(())
    }

    fn send_time(&mut self, mtime: u64, atime: u64) -> Result<(), RcpError> {
        self.wire.send_line(&wire::encode_time(mtime, atime))?;
        self.wire.recv_ack()
    }

    fn send_file(&mut self, item: &SendFile) -> Result<(), RcpError> {
        if let Some((mtime, atime)) = item.times {
            self.send_time(mtime, atime)?;
        }

        let mut file = File::open(&item.path).map_err(|e| RcpError::io(item.path.display().to_string(), e))?;
        let size = file
            .metadata()
            .map_err(|e| RcpError::io(item.path.display().to_string(), e))?
            .len();

        let hash = if self.config.resume {
            let h = hash::hash_prefix(&file, size)?;
            file.seek(SeekFrom::Start(0))
                .map_err(|e| RcpError::io(item.path.display().to_string(), e))?;
            Some(h)
        } else {
            None
        };

        self.wire
            .send_line(&wire::encode_file(item.mode, size, &item.name, hash.as_deref()))?;

        if self.config.resume {
            self.send_resume_body(&mut file, size, &item.name)?;
        } else {
            self.wire.recv_ack()?;
            self.stream_bounded(&mut file, size, &item.name, size)?;
            self.wire.send_raw(&[0x00])?;
            self.wire.recv_ack()?;
        }
        Ok(())
    }

    /// Reads the receiver's `R`/`S`/`C` reply envelope and streams whatever
    /// portion of the file that outcome calls for (§4.3 resume extension,
    /// steps 2-3).
    fn send_resume_body(&mut self, file: &mut File, size: u64, name: &str) -> Result<(), RcpError> {
        let envelope = self.wire.recv_exact(wire::BUF_AND_HASH)?;
        let (kind, _mode, dest_size, dest_hash) = wire::decode_reply(&envelope)?;

        match kind {
            ReplyKind::Skip => {
                self.wire
                    .send_raw(&[wire::encode_match_indicator(MatchIndicator::Match)])?;
            }
            ReplyKind::Resume => {
                let prefix_hash = hash::hash_prefix(&*file, dest_size)?;
                file.seek(SeekFrom::Start(0)).map_err(|e| RcpError::io(name, e))?;
                if prefix_hash == dest_hash {
                    self.wire
                        .send_raw(&[wire::encode_match_indicator(MatchIndicator::Match)])?;
                    file.seek(SeekFrom::Start(dest_size)).map_err(|e| RcpError::io(name, e))?;
                    self.stream_bounded(file, size - dest_size, name, size)?;
                } else {
                    self.wire
                        .send_raw(&[wire::encode_match_indicator(MatchIndicator::Mismatch)])?;
                    self.stream_bounded(file, size, name, size)?;
                }
            }
            ReplyKind::Overwrite => {
                self.wire
                    .send_raw(&[wire::encode_match_indicator(MatchIndicator::Mismatch)])?;
                self.stream_bounded(file, size, name, size)?;
            }
        }
        self.wire.send_raw(&[0x00])?;
        self.wire.recv_ack()?;
        Ok(())
    }

    /// Streams exactly `n` bytes from `file`'s current position to the
    /// peer, reporting progress against `total`.
    fn stream_bounded(&mut self, file: &mut File, n: u64, name: &str, total: u64) -> Result<(), RcpError> {
        let mut remaining = n;
        let mut sent = total - n;
        let mut buf = [0u8; 8192];
        while remaining > 0 {
            let want = remaining.min(buf.len() as u64) as usize;
            let got = file.read(&mut buf[..want]).map_err(|e| RcpError::io(name, e))?;
            if got == 0 {
                break;
            }
            self.write_wire_bytes(&buf[..got])?;
            remaining -= got as u64;
            sent += got as u64;
            self.progress.on_file_progress(name, sent, total);
        }
        Ok(())
    }

    fn write_wire_bytes(&mut self, bytes: &[u8]) -> Result<(), RcpError> {
        if let Some(limiter) = &self.limiter {
            let mut limited = LimitedWriter::new(Arc::clone(limiter), self.wire.link_mut());
            limited.write_all(bytes).map_err(|e| RcpError::io("<peer>", e))
        } else {
            self.wire.send_raw(bytes)
        }
    }

    // ---------------------------------------------------------------
    // Receiver role
    // ---------------------------------------------------------------

    /// Drives the receiver side against `dest_root` until the peer closes
    /// the stream at the top level. `patterns`, if given, constrains which
    /// incoming basenames are accepted (after brace expansion); a name
    /// that matches nothing is a protocol desync, matching the stock
    /// tool's refusal to accept an unrequested name.
    pub fn receive_all(&mut self, dest_root: &Path, patterns: Option<&[String]>) -> Result<(), RcpError> {
        let allowed = match patterns {
            Some(pats) => {
                let mut expanded = Vec::new();
                for pat in pats {
                    expanded.extend(brace::expand_braces(pat)?);
                }
                Some(expanded)
            }
            None => None,
        };

        let mut stack = vec![DirFrame {
            path: dest_root.to_path_buf(),
            mode: 0o755,
            times: None,
        }];
        let mut pending_time: Option<(u64, u64)> = None;

        loop {
            let line = match self.wire.recv_line_opt()? {
                Some(line) => line,
                None if stack.len() == 1 => return Ok(()),
                None => return Err(RcpError::Desync("peer closed mid-directory".to_string())),
            };
            let record = wire::parse_control_line(&line)?;
            match record {
                ControlRecord::Time { mtime, atime } => {
                    pending_time = Some((mtime, atime));
                    self.wire.send_ack()?;
                }
                ControlRecord::Dir { mode, name } => {
                    self.validate_name(&name)?;
                    if let Some(allowed) = &allowed {
                        if !pattern_matches(&name, allowed) {
                            return Err(RcpError::UnsafeName(name));
                        }
                    }
                    let dir_path = stack.last().expect("root frame always present").path.join(&name);
                    fs::create_dir_all(&dir_path).map_err(|e| RcpError::io(dir_path.display().to_string(), e))?;
                    let mut perms = fs::metadata(&dir_path)
                        .map_err(|e| RcpError::io(dir_path.display().to_string(), e))?
                        .permissions();
                    #[cfg(unix)]
                    {
                        use std::os::unix::fs::PermissionsExt;
                        perms.set_mode(mode | 0o200);
                    }
                    fs::set_permissions(&dir_path, perms)
                        .map_err(|e| RcpError::io(dir_path.display().to_string(), e))?;
                    stack.push(DirFrame {
                        path: dir_path,
                        mode,
                        times: pending_time.take(),
                    });
                    self.wire.send_ack()?;
                }
                ControlRecord::EndDir => {
                    let frame = stack.pop().ok_or_else(|| RcpError::Desync("E with no open directory".to_string()))?;
                    if stack.is_empty() {
                        return Err(RcpError::Desync("E closed the root directory".to_string()));
                    }
                    if self.config.preserve {
                        apply_mode_and_times(&frame.path, frame.mode, frame.times);
                    }
                    self.wire.send_ack()?;
                }
                ControlRecord::File { mode, size, name, hash } => {
                    self.validate_name(&name)?;
                    if let Some(allowed) = &allowed {
                        if !pattern_matches(&name, allowed) {
                            return Err(RcpError::UnsafeName(name));
                        }
                    }
                    let dest_path = stack.last().expect("root frame always present").path.join(&name);
                    let times = pending_time.take();
                    self.receive_file(&dest_path, mode, size, hash.as_deref(), times)?;
                }
            }
        }
    }

    fn validate_name(&self, name: &str) -> Result<(), RcpError> {
        if name.is_empty() || name == "." || name == ".." || name.contains('/') {
            return Err(RcpError::UnsafeName(name.to_string()));
        }
        Ok(())
    }

    fn receive_file(
        &mut self,
        dest_path: &Path,
        mode: u32,
        size: u64,
        hash: Option<&str>,
        times: Option<(u64, u64)>,
    ) -> Result<(), RcpError> {
        let name = dest_path.to_string_lossy().into_owned();

        if self.config.resume && hash.is_some() {
            self.receive_resume(dest_path, mode, size, hash.expect("checked above"), &name)?;
        } else {
            self.wire.send_ack()?;
            let mut dest = File::create(dest_path).map_err(|e| RcpError::io(&name, e))?;
            self.drain_into(size, &mut dest, &name, size)?;
            self.finish_after_body(&name)?;
        }

        if self.config.preserve {
            apply_mode_and_times(dest_path, mode, times);
        }
        Ok(())
    }

    fn receive_resume(
        &mut self,
        dest_path: &Path,
        sender_mode: u32,
        sender_size: u64,
        sender_hash: &str,
        name: &str,
    ) -> Result<(), RcpError> {
        let dest_meta = fs::metadata(dest_path).ok();
        let dest_size = dest_meta.as_ref().map_or(0, fs::Metadata::len);
        let dest_mode = dest_meta.map_or(sender_mode, |m| mode_of(&m));

        let (kind, reply_hash) = if dest_size == 0 {
            (ReplyKind::Resume, hash::empty_hash())
        } else if dest_size == sender_size {
            let existing = File::open(dest_path).map_err(|e| RcpError::io(name, e))?;
            let whole_hash = hash::hash_prefix(existing, dest_size)?;
            if whole_hash == sender_hash {
                (ReplyKind::Skip, whole_hash)
            } else {
                (ReplyKind::Overwrite, whole_hash)
            }
        } else if dest_size < sender_size {
            let existing = File::open(dest_path).map_err(|e| RcpError::io(name, e))?;
            let prefix_hash = hash::hash_prefix(existing, dest_size)?;
            (ReplyKind::Resume, prefix_hash)
        } else {
            let existing = File::open(dest_path).map_err(|e| RcpError::io(name, e))?;
            let whole_hash = hash::hash_prefix(existing, sender_size)?;
            (ReplyKind::Overwrite, whole_hash)
        };

        self.wire
            .send_raw(&wire::encode_reply(kind, dest_mode, dest_size, &reply_hash))?;

        let indicator = wire::decode_match_indicator(self.wire.recv_byte()?)?;
        match (kind, indicator) {
            (ReplyKind::Skip, _) => {
                // Destination already matches; no body bytes follow.
            }
            (_, MatchIndicator::Match) => {
                self.receive_append(dest_path, sender_size, dest_size, name)?;
            }
            (_, MatchIndicator::Mismatch | MatchIndicator::NoResume) => {
                let mut dest = File::create(dest_path).map_err(|e| RcpError::io(name, e))?;
                self.drain_into(sender_size, &mut dest, name, sender_size)?;
            }
        }
        self.finish_after_body(name)
    }

    /// Receives the appended suffix into a randomly-suffixed sidecar file,
    /// then concatenates it onto the existing destination on success.
    fn receive_append(&mut self, dest_path: &Path, sender_size: u64, dest_size: u64, name: &str) -> Result<(), RcpError> {
        let suffix_len = sender_size - dest_size;
        let sidecar_path = sidecar_path_for(dest_path);
        let mut sidecar = File::create(&sidecar_path).map_err(|e| RcpError::io(name, e))?;
        self.drain_into(suffix_len, &mut sidecar, name, suffix_len)?;
        drop(sidecar);

        let mut sidecar = File::open(&sidecar_path).map_err(|e| RcpError::io(name, e))?;
        let mut dest = OpenOptions::new()
            .create(true)
            .append(true)
            .open(dest_path)
            .map_err(|e| RcpError::io(name, e))?;
        std::io::copy(&mut sidecar, &mut dest).map_err(|e| RcpError::io(name, e))?;
        drop(sidecar);
        let _ = fs::remove_file(&sidecar_path);
        Ok(())
    }

    /// Reads exactly `len` body bytes from the peer, writing them to
    /// `dest`. A write failure does not abort mid-record: it keeps
    /// draining from the peer to stay in sync and records the first error
    /// in the deferred-error slot, to be surfaced by
    /// [`finish_after_body`](Self::finish_after_body).
    fn drain_into(&mut self, len: u64, dest: &mut File, name: &str, total: u64) -> Result<(), RcpError> {
        let mut remaining = len;
        let mut received = total - len;
        while remaining > 0 {
            let want = remaining.min(8192) as usize;
            let chunk = self.wire.recv_exact(want)?;
            if self.deferred_error.is_none() {
                if let Err(e) = self.write_local(dest, &chunk) {
                    self.note_deferred_error(name, &e);
                }
            }
            remaining -= chunk.len() as u64;
            received += chunk.len() as u64;
            self.progress.on_file_progress(name, received, total);
        }
        Ok(())
    }

    fn write_local(&self, dest: &mut File, chunk: &[u8]) -> std::io::Result<()> {
        if let Some(limiter) = &self.limiter {
            limiter.account(chunk.len());
        }
        dest.write_all(chunk)
    }

    fn note_deferred_error(&mut self, name: &str, err: &std::io::Error) {
        if self.deferred_error.is_none() {
            self.deferred_error = Some(format!("{name}: {err}"));
        }
        self.error_count += 1;
    }

    /// Sends the trailing OK/error record after a file body and waits for
    /// the peer's own single `0x00` terminator plus ack, i.e. the
    /// epilogue common to every receive path.
    fn finish_after_body(&mut self, name: &str) -> Result<(), RcpError> {
        let terminator = self.wire.recv_byte()?;
        if terminator != 0x00 {
            return Err(RcpError::Desync(format!("expected body terminator, got {terminator:#04x}")));
        }
        match self.deferred_error.take() {
            Some(message) => {
                tracing::warn!(name, %message, "local I/O error during file receive");
                self.wire.send_error(false, &message)
            }
            None => {
                tracing::info!(name, "file received");
                self.wire.send_ack()
            }
        }
    }
}

/// Tracks one open destination directory level.
struct DirFrame {
    path: PathBuf,
    mode: u32,
    times: Option<(u64, u64)>,
}

#[cfg(unix)]
fn mode_of(meta: &fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn mode_of(_meta: &fs::Metadata) -> u32 {
    0o644
}

fn apply_mode_and_times(path: &Path, mode: u32, times: Option<(u64, u64)>) {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Err(e) = fs::set_permissions(path, fs::Permissions::from_mode(mode)) {
            tracing::warn!(path = %path.display(), error = %e, "failed to set mode");
        }
    }
    if let Some((mtime, atime)) = times {
        let mtime = filetime::FileTime::from_unix_time(i64::try_from(mtime).unwrap_or(0), 0);
        let atime = filetime::FileTime::from_unix_time(i64::try_from(atime).unwrap_or(0), 0);
        if let Err(e) = filetime::set_file_times(path, atime, mtime) {
            tracing::warn!(path = %path.display(), error = %e, "failed to set times");
        }
    }
}

fn sidecar_path_for(dest_path: &Path) -> PathBuf {
    const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
    let mut rng = rand::rng();
    let suffix: String = (0..8)
        .map(|_| ALPHABET[rng.random_range(0..ALPHABET.len())] as char)
        .collect();
    let mut name = dest_path.file_name().unwrap_or_default().to_os_string();
    name.push(".");
    name.push(suffix);
    dest_path.with_file_name(name)
}

/// Matches `name` against brace-expanded glob `patterns`, supporting `*`
/// (any run of characters) and `?` (a single character).
fn pattern_matches(name: &str, patterns: &[String]) -> bool {
    patterns.iter().any(|p| glob_match(name.as_bytes(), p.as_bytes()))
}

fn glob_match(name: &[u8], pattern: &[u8]) -> bool {
    match (name, pattern) {
        ([], []) => true,
        (_, [b'*', rest @ ..]) => {
            glob_match(name, rest) || (!name.is_empty() && glob_match(&name[1..], pattern))
        }
        ([n0, nrest @ ..], [b'?', prest @ ..]) => {
            let _ = n0;
            glob_match(nrest, prest)
        }
        ([n0, nrest @ ..], [p0, prest @ ..]) if n0 == p0 => glob_match(nrest, prest),
        _ => false,
    }
}

/// A two-ended in-memory [`PeerLink`] for tests: reads come from a fixed
/// preloaded buffer, writes accumulate separately, so a sender and a
/// receiver driven against the same "wire" in separate unit tests don't
/// have to share one position cursor.
#[cfg(test)]
struct Duplex {
    input: std::io::Cursor<Vec<u8>>,
    output: Vec<u8>,
}

#[cfg(test)]
impl Duplex {
    fn new(input: impl Into<Vec<u8>>) -> Self {
        Duplex {
            input: std::io::Cursor::new(input.into()),
            output: Vec::new(),
        }
    }
}

#[cfg(test)]
impl Read for Duplex {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.input.read(buf)
    }
}

#[cfg(test)]
impl Write for Duplex {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.output.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod test {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use tempfile::tempdir;

    fn cfg(resume: bool) -> SessionConfig {
        SessionConfig {
            recursive: true,
            preserve: false,
            target_is_directory: true,
            resume,
            bandwidth_limit_kbps: None,
            verbose: false,
            quiet: true,
        }
    }

    #[test]
    fn glob_star_and_question_mark() {
        assert!(glob_match(b"report.txt", b"*.txt"));
        assert!(glob_match(b"a1", b"a?"));
        assert!(!glob_match(b"a12", b"a?"));
    }

    #[test]
    fn wire_compat_plain_transfer_round_trips_bytes() {
        let dir = tempdir().unwrap();
        let src_path = dir.path().join("src.bin");
        fs::write(&src_path, b"hello world").unwrap();

        // Two acks: one after the `C` record, one after the body's `0x00`
        // terminator.
        let mut pipe = Duplex::new(vec![0x00, 0x00]);
        let mut sender = Session::new(&mut pipe, cfg(false));
        sender
            .send_all(&[SendItem::File(SendFile {
                path: src_path.clone(),
                name: "out.bin".to_string(),
                mode: 0o644,
                times: None,
            })])
            .unwrap();

        assert!(pipe.output.starts_with(b"C0644 11 out.bin\n"));
        assert!(pipe.output.ends_with(b"hello world\x00"));
    }

    #[test]
    fn receiver_writes_plain_file_and_acks() {
        let dir = tempdir().unwrap();
        let mut pipe = Duplex::new(*b"C0644 5 f.txt\nhello\x00");
        let mut recv = Session::new(&mut pipe, cfg(false));
        recv.receive_all(dir.path(), None).unwrap();
        assert_eq!(fs::read(dir.path().join("f.txt")).unwrap(), b"hello");
    }

    #[test]
    fn receiver_rejects_path_escaping_name() {
        let dir = tempdir().unwrap();
        let mut pipe = Duplex::new(*b"C0644 5 ../f.txt\n");
        let mut recv = Session::new(&mut pipe, cfg(false));
        let err = recv.receive_all(dir.path(), None).unwrap_err();
        assert!(matches!(err, RcpError::UnsafeName(_)));
    }

    #[test]
    fn receiver_stops_cleanly_at_top_level_eof() {
        let dir = tempdir().unwrap();
        let mut pipe = Duplex::new(Vec::new());
        let mut recv = Session::new(&mut pipe, cfg(false));
        recv.receive_all(dir.path(), None).unwrap();
    }

    #[test]
    fn append_resume_extends_destination_with_only_the_suffix() {
        let dir = tempdir().unwrap();
        let dest_path = dir.path().join("f.txt");
        fs::write(&dest_path, b"hello").unwrap();

        let full_hash = hash::hash_prefix(std::io::Cursor::new(b"hello world".to_vec()), 11).unwrap();
        let mut line = format!("C0644 11 {full_hash} f.txt\n").into_bytes();
        // Sender's resume reply is read by the receiver before it emits
        // its own reply, so only the match-indicator byte and suffix body
        // need to be preloaded here: the receiver's own `R`/`S`/`C` record
        // goes out on `pipe.output`, unread in this direction.
        line.push(b'M');
        line.extend_from_slice(b" world\x00");
        let mut pipe = Duplex::new(line);
        let mut recv = Session::new(&mut pipe, cfg(true));
        recv.receive_all(dir.path(), None).unwrap();
        assert_eq!(fs::read(&dest_path).unwrap(), b"hello world");
    }

    #[test]
    fn resume_to_absent_destination_creates_the_file() {
        let dir = tempdir().unwrap();
        let dest_path = dir.path().join("f.txt");
        assert!(!dest_path.exists());

        let full_hash = hash::hash_prefix(std::io::Cursor::new(b"hello world".to_vec()), 11).unwrap();
        let mut line = format!("C0644 11 {full_hash} f.txt\n").into_bytes();
        // An absent destination takes the `dest_size == 0` branch in
        // `receive_resume`, which always replies `Resume` against the
        // empty hash; the sender's empty prefix always matches that, so
        // it answers `Match` and the whole body arrives as an "append".
        line.push(b'M');
        line.extend_from_slice(b"hello world\x00");
        let mut pipe = Duplex::new(line);
        let mut recv = Session::new(&mut pipe, cfg(true));
        recv.receive_all(dir.path(), None).unwrap();
        assert_eq!(fs::read(&dest_path).unwrap(), b"hello world");
    }

    #[test]
    fn sidecar_path_has_expected_shape() {
        let path = sidecar_path_for(Path::new("/tmp/a/dest.bin"));
        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("dest.bin."));
        assert_eq!(name.len(), "dest.bin.".len() + 8);
    }
}
