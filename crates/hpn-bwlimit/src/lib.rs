#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_auto_cfg, doc_cfg))]

mod limiter;
mod wrappers;

pub use limiter::BwLimiter;
pub use wrappers::{LimitedReader, LimitedWriter};
