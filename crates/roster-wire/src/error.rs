//! Error types for the roster-wire codec.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("frame length cannot be zero")]
  ZeroLength,

  #[error("frame length {length} exceeds limit {limit}")]
  TooLarge { length: usize, limit: usize },

  #[error("truncated frame: expected {expected} bytes, have {actual}")]
  Truncated { expected: usize, actual: usize },

  #[error("frame carries {0} trailing bytes")]
  TrailingBytes(usize),

  #[error("JSON error: {0}")]
  Json(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
