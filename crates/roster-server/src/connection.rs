//! A handle to one client connection's write side.

use std::{
  fmt,
  pin::Pin,
  sync::atomic::{AtomicBool, AtomicU64, Ordering},
  time::Duration,
};

use tokio::{
  io::{AsyncWrite, AsyncWriteExt as _},
  sync::{Mutex, Notify},
};

use crate::error::DeliveryError;

type BoxWriter = Pin<Box<dyn AsyncWrite + Send>>;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Shared handle to a connected peer.
///
/// Held (behind an `Arc`) by the registry, the dispatcher and the session that
/// owns the read side. Frames are written whole under a lock so concurrent
/// senders never interleave bytes. Once closed, every send fails with
/// [`DeliveryError::Closed`] and the owning session is woken to tear down.
pub struct Connection {
  id:       u64,
  peer:     String,
  writer:   Mutex<Option<BoxWriter>>,
  closed:   AtomicBool,
  on_close: Notify,
}

impl Connection {
  pub fn new<W>(peer: impl Into<String>, writer: W) -> Self
  where
    W: AsyncWrite + Send + 'static,
  {
    let writer: BoxWriter = Box::pin(writer);
    Self {
      id:       NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
      peer:     peer.into(),
      writer:   Mutex::new(Some(writer)),
      closed:   AtomicBool::new(false),
      on_close: Notify::new(),
    }
  }

  /// Process-unique id; distinguishes a connection from its replacement
  /// under the same client id.
  pub fn id(&self) -> u64 { self.id }

  pub fn peer(&self) -> &str { &self.peer }

  pub fn is_closed(&self) -> bool { self.closed.load(Ordering::Acquire) }

  /// Mark the connection closed and wake its session. Idempotent.
  pub fn close(&self) {
    if !self.closed.swap(true, Ordering::AcqRel) {
      self.on_close.notify_one();
    }
  }

  /// Resolves once [`close`](Self::close) has been called.
  ///
  /// Only the owning session waits on this.
  pub async fn closed(&self) {
    if self.is_closed() {
      return;
    }
    self.on_close.notified().await;
  }

  /// Write one encoded frame and flush it within `timeout`.
  ///
  /// A write that fails or times out may leave a partial frame on the wire,
  /// so the writer is dropped and the connection closed before the lock is
  /// released. Sends queued behind it then fail with
  /// [`DeliveryError::Closed`].
  pub async fn send(&self, frame: &[u8], timeout: Duration) -> Result<(), DeliveryError> {
    if self.is_closed() {
      return Err(DeliveryError::Closed);
    }
    let mut guard = self.writer.lock().await;
    if self.is_closed() {
      return Err(DeliveryError::Closed);
    }
    let Some(writer) = guard.as_mut() else {
      return Err(DeliveryError::Closed);
    };

    let written = tokio::time::timeout(timeout, async {
      writer.write_all(frame).await?;
      writer.flush().await
    })
    .await;

    let outcome = match written {
      Ok(Ok(())) => return Ok(()),
      Ok(Err(e)) => DeliveryError::Io(e),
      Err(_) => DeliveryError::Timeout(timeout),
    };
    guard.take();
    self.close();
    Err(outcome)
  }

  /// Close the connection and shut down its write half.
  pub async fn shutdown(&self) {
    self.close();
    if let Some(mut writer) = self.writer.lock().await.take()
      && let Err(e) = writer.shutdown().await
    {
      tracing::debug!(peer = %self.peer, "error shutting down writer: {e}");
    }
  }
}

impl fmt::Debug for Connection {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Connection")
      .field("id", &self.id)
      .field("peer", &self.peer)
      .field("closed", &self.is_closed())
      .finish_non_exhaustive()
  }
}
