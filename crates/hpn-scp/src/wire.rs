//! Wire-format encode/decode for the control protocol: the stock-peer
//! baseline (`T`/`C`/`D`/`E` records and acks) plus the resume extension's
//! fixed-envelope `R`/`S`/overwrite-`C` replies and match-indicator byte.

use std::io::{Read, Write};

use hpn_fbb::Fbb;

use crate::err::RcpError;
use crate::hash::HASH_LEN;
use crate::seams::PeerLink;

/// Fixed length of every resume out-of-band reply, so a stock peer that
/// reads a predictable number of bytes never desynchronises on one.
pub const BUF_AND_HASH: usize = HASH_LEN + 64;

/// A parsed line-oriented control record from the stock protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ControlRecord {
    /// `T<mtime> 0 <atime> 0`
    Time { mtime: u64, atime: u64 },
    /// `C<mode> <size> [<hash>] <name>`
    File {
        mode: u32,
        size: u64,
        name: String,
        hash: Option<String>,
    },
    /// `D<mode> 0 <name>`
    Dir { mode: u32, name: String },
    /// `E`
    EndDir,
}

/// The receiver's out-of-band reply to a resume-enabled `C` record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ReplyKind {
    /// No usable prefix: sender should send from byte 0.
    Resume,
    /// Whole-file hash matched: sender should skip the body.
    Skip,
    /// Sizes/hashes disagree in a way that rules out append: overwrite.
    Overwrite,
}

impl ReplyKind {
    fn leader(self) -> char {
        match self {
            ReplyKind::Resume => 'R',
            ReplyKind::Skip => 'S',
            ReplyKind::Overwrite => 'C',
        }
    }
}

/// The one-byte indicator the sender always emits after a resume reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum MatchIndicator {
    /// `M`: fragments match, receiver should append.
    Match,
    /// `F`: mismatch, receiver should overwrite from scratch.
    Mismatch,
    /// `0x00`: no resume applies, treat as a normal full transfer.
    NoResume,
}

fn desync(msg: impl Into<String>) -> RcpError {
    RcpError::Desync(msg.into())
}

fn fbb_err(e: hpn_fbb::FbbError) -> RcpError {
    desync(format!("framing buffer error: {e}"))
}

/// Formats a `T` record line.
pub fn encode_time(mtime: u64, atime: u64) -> String {
    format!("T{mtime} 0 {atime} 0\n")
}

/// Formats a `C` record line, with the resume hash field when present.
pub fn encode_file(mode: u32, size: u64, name: &str, hash: Option<&str>) -> String {
    match hash {
        Some(h) => format!("C{mode:04o} {size} {h} {name}\n"),
        None => format!("C{mode:04o} {size} {name}\n"),
    }
}

/// Formats a `D` record line.
pub fn encode_dir(mode: u32, name: &str) -> String {
    format!("D{mode:04o} 0 {name}\n")
}

/// The `E` record line.
pub const END_DIR: &str = "E\n";

/// Parses a single control line (without its trailing `\n`).
pub fn parse_control_line(line: &str) -> Result<ControlRecord, RcpError> {
    let mut chars = line.chars();
    let leader = chars.next().ok_or_else(|| desync("empty control record"))?;
    let rest = chars.as_str();
    match leader {
        'T' => parse_time(rest),
        'C' => parse_file(rest),
        'D' => parse_dir(rest),
        'E' => Ok(ControlRecord::EndDir),
        other => Err(desync(format!("unknown record leader {other:?}"))),
    }
}

fn parse_time(rest: &str) -> Result<ControlRecord, RcpError> {
    let mut parts = rest.split(' ');
    let mtime = parts
        .next()
        .ok_or_else(|| desync("truncated T record"))?
        .parse()
        .map_err(|_| desync("non-numeric mtime in T record"))?;
    parts.next(); // literal "0"
    let atime = parts
        .next()
        .ok_or_else(|| desync("truncated T record"))?
        .parse()
        .map_err(|_| desync("non-numeric atime in T record"))?;
    Ok(ControlRecord::Time { mtime, atime })
}

fn parse_file(rest: &str) -> Result<ControlRecord, RcpError> {
    let mut parts = rest.splitn(3, ' ');
    let mode = u32::from_str_radix(parts.next().ok_or_else(|| desync("truncated C record"))?, 8)
        .map_err(|_| desync("non-octal mode in C record"))?;
    let size: u64 = parts
        .next()
        .ok_or_else(|| desync("truncated C record"))?
        .parse()
        .map_err(|_| desync("non-numeric size in C record"))?;
    let remainder = parts.next().ok_or_else(|| desync("truncated C record"))?;

    let looks_like_hash = remainder.len() > HASH_LEN
        && remainder.as_bytes()[HASH_LEN] == b' '
        && remainder.as_bytes()[..HASH_LEN]
            .iter()
            .all(u8::is_ascii_hexdigit);

    let (hash, name) = if looks_like_hash {
        (
            Some(remainder[..HASH_LEN].to_string()),
            remainder[HASH_LEN + 1..].to_string(),
        )
    } else {
        (None, remainder.to_string())
    };
    Ok(ControlRecord::File {
        mode,
        size,
        name,
        hash,
    })
}

fn parse_dir(rest: &str) -> Result<ControlRecord, RcpError> {
    let mut parts = rest.splitn(3, ' ');
    let mode = u32::from_str_radix(parts.next().ok_or_else(|| desync("truncated D record"))?, 8)
        .map_err(|_| desync("non-octal mode in D record"))?;
    parts.next(); // literal "0"
    let name = parts
        .next()
        .ok_or_else(|| desync("truncated D record"))?
        .to_string();
    Ok(ControlRecord::Dir { mode, name })
}

/// Builds a fixed-`BUF_AND_HASH`-length resume reply envelope.
pub fn encode_reply(kind: ReplyKind, mode: u32, size: u64, hash: &str) -> Vec<u8> {
    let mut body = format!("{}{mode:04o} {size} {hash}", kind.leader());
    let target = BUF_AND_HASH - 1;
    if body.len() < target {
        body.push_str(&" ".repeat(target - body.len()));
    } else {
        body.truncate(target);
    }
    body.push('\n');
    body.into_bytes()
}

/// Parses a fixed-`BUF_AND_HASH`-length resume reply envelope.
pub fn decode_reply(envelope: &[u8]) -> Result<(ReplyKind, u32, u64, String), RcpError> {
    let text = std::str::from_utf8(envelope).map_err(|_| desync("non-UTF8 resume reply"))?;
    let text = text.trim_end_matches(['\n', ' ']);
    let mut chars = text.chars();
    let leader = chars.next().ok_or_else(|| desync("empty resume reply"))?;
    let kind = match leader {
        'R' => ReplyKind::Resume,
        'S' => ReplyKind::Skip,
        'C' => ReplyKind::Overwrite,
        other => return Err(desync(format!("unknown resume reply leader {other:?}"))),
    };
    let rest = chars.as_str();
    let mut parts = rest.splitn(3, ' ');
    let mode = u32::from_str_radix(
        parts.next().ok_or_else(|| desync("truncated resume reply"))?,
        8,
    )
    .map_err(|_| desync("non-octal mode in resume reply"))?;
    let size: u64 = parts
        .next()
        .ok_or_else(|| desync("truncated resume reply"))?
        .parse()
        .map_err(|_| desync("non-numeric size in resume reply"))?;
    let hash = parts
        .next()
        .ok_or_else(|| desync("truncated resume reply"))?
        .to_string();
    Ok((kind, mode, size, hash))
}

/// Encodes the one-byte match indicator the sender always sends when
/// resume is enabled.
pub fn encode_match_indicator(indicator: MatchIndicator) -> u8 {
    match indicator {
        MatchIndicator::Match => b'M',
        MatchIndicator::Mismatch => b'F',
        MatchIndicator::NoResume => 0,
    }
}

/// Decodes the one-byte match indicator.
pub fn decode_match_indicator(byte: u8) -> Result<MatchIndicator, RcpError> {
    match byte {
        b'M' => Ok(MatchIndicator::Match),
        b'F' => Ok(MatchIndicator::Mismatch),
        0 => Ok(MatchIndicator::NoResume),
        other => Err(desync(format!("unexpected match indicator byte {other:#04x}"))),
    }
}

/// Reads from, and writes to, a [`PeerLink`], using an [`Fbb`] as the
/// parsing source for inbound bytes the way the rest of this crate uses
/// it for every other staging buffer.
pub struct Wire<'a, L: PeerLink + ?Sized> {
    link: &'a mut L,
    recv: Fbb,
}

impl<'a, L: PeerLink + ?Sized> Wire<'a, L> {
    /// Wraps `link` for record-oriented reads and writes.
    pub fn new(link: &'a mut L) -> Self {
        Wire {
            link,
            recv: Fbb::create(),
        }
    }

    /// Writes `line` verbatim (it must already include its `\n`).
    pub fn send_line(&mut self, line: &str) -> Result<(), RcpError> {
        self.send_raw(line.as_bytes())
    }

    /// Writes raw bytes, e.g. a file body chunk or a padded envelope.
    pub fn send_raw(&mut self, bytes: &[u8]) -> Result<(), RcpError> {
        self.link.write_all(bytes).map_err(|e| RcpError::io("<peer>", e))
    }

    /// Writes the single-byte OK ack.
    pub fn send_ack(&mut self) -> Result<(), RcpError> {
        self.send_raw(&[0x00])
    }

    /// Writes a `0x01`/`0x02`-prefixed error record.
    pub fn send_error(&mut self, fatal: bool, message: &str) -> Result<(), RcpError> {
        let mut line = Vec::with_capacity(message.len() + 2);
        line.push(if fatal { 0x02 } else { 0x01 });
        line.extend_from_slice(message.as_bytes());
        line.push(b'\n');
        self.send_raw(&line)
    }

    /// Reads one `\n`-terminated line, without the terminator.
    pub fn recv_line(&mut self) -> Result<String, RcpError> {
        loop {
            let found = {
                let slice = self.recv.as_slice();
                slice.iter().position(|&b| b == b'\n')
            };
            if let Some(pos) = found {
                let line = {
                    let slice = self.recv.as_slice();
                    String::from_utf8_lossy(&slice[..pos]).into_owned()
                };
                self.recv.consume_head(pos + 1).map_err(fbb_err)?;
                return Ok(line);
            }
            self.fill_more()?;
        }
    }

    /// Reads one `\n`-terminated line like [`recv_line`](Self::recv_line),
    /// but returns `Ok(None)` instead of erroring when the peer closes the
    /// stream with no partial record buffered — the ordinary way a session
    /// ends, as opposed to a peer vanishing mid-record.
    pub fn recv_line_opt(&mut self) -> Result<Option<String>, RcpError> {
        loop {
            let found = {
                let slice = self.recv.as_slice();
                slice.iter().position(|&b| b == b'\n')
            };
            if let Some(pos) = found {
                let line = {
                    let slice = self.recv.as_slice();
                    String::from_utf8_lossy(&slice[..pos]).into_owned()
                };
                self.recv.consume_head(pos + 1).map_err(fbb_err)?;
                return Ok(Some(line));
            }
            if self.recv.available() == 0 {
                let mut probe = [0u8; 4096];
                let n = self.link.read(&mut probe).map_err(|e| RcpError::io("<peer>", e))?;
                if n == 0 {
                    return Ok(None);
                }
                self.recv.reserve(n).map_err(fbb_err)?;
                self.recv
                    .fill_reserved(n, |dst| dst.copy_from_slice(&probe[..n]))
                    .map_err(fbb_err)?;
                continue;
            }
            self.fill_more()?;
        }
    }

    /// Reads exactly `n` raw bytes (used for fixed-length resume envelopes
    /// and file body chunks).
    pub fn recv_exact(&mut self, n: usize) -> Result<Vec<u8>, RcpError> {
        while self.recv.available() < n {
            self.fill_more()?;
        }
        let out = self.recv.as_slice()[..n].to_vec();
        self.recv.consume_head(n).map_err(fbb_err)?;
        Ok(out)
    }

    /// Reads a single byte.
    pub fn recv_byte(&mut self) -> Result<u8, RcpError> {
        Ok(self.recv_exact(1)?[0])
    }

    /// Reads a one-byte ack: `Ok(())` for `0x00`, or the peer's message
    /// wrapped in the matching non-fatal/fatal error variant.
    pub fn recv_ack(&mut self) -> Result<(), RcpError> {
        match self.recv_byte()? {
            0x00 => Ok(()),
            0x01 => Err(RcpError::PeerNonFatal(self.recv_line()?)),
            0x02 => Err(RcpError::PeerFatal(self.recv_line()?)),
            other => Err(desync(format!("unexpected ack byte {other:#04x}"))),
        }
    }

    /// Underlying link, for direct streaming of a file body.
    pub fn link_mut(&mut self) -> &mut L {
        self.link
    }

    fn fill_more(&mut self) -> Result<(), RcpError> {
        let mut chunk = [0u8; 4096];
        let n = self.link.read(&mut chunk).map_err(|e| RcpError::io("<peer>", e))?;
        if n == 0 {
            return Err(desync("peer closed the stream mid-record"));
        }
        self.recv.reserve(n).map_err(fbb_err)?;
        self.recv
            .fill_reserved(n, |dst| dst.copy_from_slice(&chunk[..n]))
            .map_err(fbb_err)?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use std::io::Cursor;

    #[test]
    fn round_trip_file_record_without_hash() {
        let line = encode_file(0o644, 1234, "report.txt", None);
        assert_eq!(line, "C0644 1234 report.txt\n");
        let parsed = parse_control_line(line.trim_end_matches('\n')).unwrap();
        assert_eq!(
            parsed,
            ControlRecord::File {
                mode: 0o644,
                size: 1234,
                name: "report.txt".to_string(),
                hash: None,
            }
        );
    }

    #[test]
    fn round_trip_file_record_with_hash() {
        let hash = "a".repeat(HASH_LEN);
        let line = encode_file(0o600, 7, "f", Some(&hash));
        let parsed = parse_control_line(line.trim_end_matches('\n')).unwrap();
        assert_eq!(
            parsed,
            ControlRecord::File {
                mode: 0o600,
                size: 7,
                name: "f".to_string(),
                hash: Some(hash),
            }
        );
    }

    #[test]
    fn round_trip_dir_and_end_dir() {
        let line = encode_dir(0o755, "sub");
        assert_eq!(parse_control_line(line.trim_end_matches('\n')).unwrap(), ControlRecord::Dir {
            mode: 0o755,
            name: "sub".to_string(),
        });
        assert_eq!(parse_control_line("E").unwrap(), ControlRecord::EndDir);
    }

    #[test]
    fn round_trip_time_record() {
        let line = encode_time(1000, 2000);
        assert_eq!(
            parse_control_line(line.trim_end_matches('\n')).unwrap(),
            ControlRecord::Time { mtime: 1000, atime: 2000 }
        );
    }

    #[test]
    fn resume_reply_envelope_has_fixed_length() {
        let hash = "b".repeat(HASH_LEN);
        let envelope = encode_reply(ReplyKind::Skip, 0o644, 99, &hash);
        assert_eq!(envelope.len(), BUF_AND_HASH);
        let (kind, mode, size, decoded_hash) = decode_reply(&envelope).unwrap();
        assert_eq!(kind, ReplyKind::Skip);
        assert_eq!(mode, 0o644);
        assert_eq!(size, 99);
        assert_eq!(decoded_hash, hash);
    }

    #[test]
    fn match_indicator_round_trips() {
        for indicator in [MatchIndicator::Match, MatchIndicator::Mismatch, MatchIndicator::NoResume] {
            let byte = encode_match_indicator(indicator);
            assert_eq!(decode_match_indicator(byte).unwrap(), indicator);
        }
    }

    #[test]
    fn wire_reads_lines_split_across_reads() {
        let mut peer = Cursor::new(b"C0644 5 a.txt\n".to_vec());
        let mut wire = Wire::new(&mut peer);
        let line = wire.recv_line().unwrap();
        assert_eq!(line, "C0644 5 a.txt");
    }

    #[test]
    fn recv_line_opt_is_none_at_clean_eof() {
        let mut peer = Cursor::new(Vec::new());
        let mut wire = Wire::new(&mut peer);
        assert_eq!(wire.recv_line_opt().unwrap(), None);
    }

    #[test]
    fn recv_line_opt_reads_a_buffered_line_before_eof() {
        let mut peer = Cursor::new(b"E\n".to_vec());
        let mut wire = Wire::new(&mut peer);
        assert_eq!(wire.recv_line_opt().unwrap(), Some("E".to_string()));
        assert_eq!(wire.recv_line_opt().unwrap(), None);
    }

    #[test]
    fn wire_recv_ack_surfaces_peer_errors() {
        let mut peer = Cursor::new(b"\x01disk full\n".to_vec());
        let mut wire = Wire::new(&mut peer);
        let err = wire.recv_ack().unwrap_err();
        assert!(matches!(err, RcpError::PeerNonFatal(msg) if msg == "disk full"));
    }
}
