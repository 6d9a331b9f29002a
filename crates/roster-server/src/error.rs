//! Error types for the roster server.

use std::{io, time::Duration};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// The listening socket could not be bound. Fatal at startup.
  #[error("failed to bind {address}: {source}")]
  Bind {
    address: String,
    #[source]
    source:  io::Error,
  },

  /// Rejected or failed store operation (duplicate key, missing record,
  /// backend failure).
  #[error(transparent)]
  Store(#[from] roster_core::Error),

  #[error("wire error: {0}")]
  Wire(#[from] roster_wire::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Why a message did not reach one recipient.
#[derive(Debug, Error)]
pub enum DeliveryError {
  #[error("client {0:?} is not connected")]
  NotFound(String),

  #[error("connection is closed")]
  Closed,

  #[error("send timed out after {0:?}")]
  Timeout(Duration),

  #[error("i/o error: {0}")]
  Io(#[from] io::Error),

  #[error("encode error: {0}")]
  Encode(#[from] roster_wire::Error),
}

impl DeliveryError {
  /// Whether the connection is unusable after this failure and must be
  /// dropped from the registry.
  pub fn drops_connection(&self) -> bool {
    matches!(self, Self::Timeout(_) | Self::Io(_))
  }
}
