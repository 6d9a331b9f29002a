//! Error types for `roster-core`.

use thiserror::Error;

use crate::record::RecordId;

#[derive(Debug, Error)]
pub enum Error {
  /// A create collided with an existing record on the identity key.
  #[error("a record with identity key {0:?} already exists")]
  DuplicateKey(String),

  #[error("record not found: {0}")]
  NotFound(RecordId),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
  /// Whether this error is a rejected operation rather than a failure of the
  /// store itself.
  pub fn is_rejection(&self) -> bool {
    matches!(self, Self::DuplicateKey(_) | Self::NotFound(_))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
