#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_auto_cfg, doc_cfg))]

mod engine;
mod err;
mod queue;
mod worker;

pub use engine::{Engine, KQLEN, MAX_NUMKQ, MAX_THREADS};
pub use err::TkeError;

/// A `Result` type for this crate.
pub type Result<T> = std::result::Result<T, TkeError>;
