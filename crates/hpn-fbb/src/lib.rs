#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_auto_cfg, doc_cfg))]

mod buf;
mod err;

pub use buf::{Fbb, Stats};
pub use err::FbbError;

/// A `Result` type for this crate.
pub type Result<T> = std::result::Result<T, FbbError>;
