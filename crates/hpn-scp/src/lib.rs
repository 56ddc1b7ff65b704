#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_auto_cfg, doc_cfg))]

mod brace;
mod config;
mod err;
mod hash;
mod seams;
mod session;
mod wire;

pub use brace::expand_braces;
pub use config::{SessionConfig, SessionConfigBuilder};
pub use err::RcpError;
pub use hash::{empty_hash, hash_prefix, HASH_LEN};
pub use seams::{NullProgressSink, PeerLink, ProgressSink};
pub use session::{SendFile, SendItem, Session};
pub use wire::{ControlRecord, MatchIndicator, ReplyKind, BUF_AND_HASH};

/// A `Result` type for this crate.
pub type Result<T> = std::result::Result<T, RcpError>;
