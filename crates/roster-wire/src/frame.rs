//! Frame encoding and incremental decoding.

use bytes::{Buf as _, BufMut as _, Bytes, BytesMut};
use roster_core::message::Message;

use crate::error::{Error, Result};

/// Size of the length prefix.
pub const HEADER_LEN: usize = 4;

/// Largest accepted payload. Checked against the header before any payload
/// bytes are buffered.
pub const MAX_FRAME_LEN: usize = 8 * 1024 * 1024;

// ─── Encode ──────────────────────────────────────────────────────────────────

/// Encode `message` as one complete frame.
pub fn encode(message: &Message) -> Result<Bytes> {
  let payload = serde_json::to_vec(message)?;
  check_len(payload.len())?;

  let mut frame = BytesMut::with_capacity(HEADER_LEN + payload.len());
  frame.put_u32(payload.len() as u32);
  frame.extend_from_slice(&payload);
  Ok(frame.freeze())
}

// ─── Decode ──────────────────────────────────────────────────────────────────

/// Decode exactly one complete frame.
///
/// Unlike [`FrameDecoder`], missing or surplus bytes are errors here.
pub fn decode(frame: &[u8]) -> Result<Message> {
  if frame.len() < HEADER_LEN {
    return Err(Error::Truncated {
      expected: HEADER_LEN,
      actual:   frame.len(),
    });
  }

  let len = declared_len(frame);
  check_len(len)?;

  let payload = &frame[HEADER_LEN..];
  if payload.len() < len {
    return Err(Error::Truncated {
      expected: len,
      actual:   payload.len(),
    });
  }
  if payload.len() > len {
    return Err(Error::TrailingBytes(payload.len() - len));
  }

  Ok(serde_json::from_slice(payload)?)
}

/// Buffers bytes from a stream and yields complete messages.
///
/// Partial frames stay buffered across calls to [`extend`](Self::extend);
/// a single read may yield zero, one or many messages. After an error the
/// stream position is unknown and the decoder should be discarded along with
/// the connection.
#[derive(Debug, Default)]
pub struct FrameDecoder {
  buf: BytesMut,
}

impl FrameDecoder {
  pub fn new() -> Self { Self::default() }

  /// Direct access to the internal buffer, for `AsyncReadExt::read_buf`.
  pub fn buffer_mut(&mut self) -> &mut BytesMut { &mut self.buf }

  pub fn extend(&mut self, bytes: &[u8]) { self.buf.extend_from_slice(bytes); }

  /// Number of buffered bytes not yet returned as a message.
  pub fn buffered(&self) -> usize { self.buf.len() }

  /// Pop the next complete message, or `None` if more bytes are needed.
  pub fn next_message(&mut self) -> Result<Option<Message>> {
    if self.buf.len() < HEADER_LEN {
      return Ok(None);
    }

    let len = declared_len(&self.buf);
    check_len(len)?;

    let total = HEADER_LEN + len;
    if self.buf.len() < total {
      self.buf.reserve(total - self.buf.len());
      return Ok(None);
    }

    let mut frame = self.buf.split_to(total);
    frame.advance(HEADER_LEN);
    Ok(Some(serde_json::from_slice(&frame)?))
  }

  /// Feed `bytes` and drain every message that is now complete.
  pub fn push(&mut self, bytes: &[u8]) -> Result<Vec<Message>> {
    self.extend(bytes);
    let mut out = Vec::new();
    while let Some(message) = self.next_message()? {
      out.push(message);
    }
    Ok(out)
  }

  /// Call at end of stream: leftover bytes mean the peer stopped mid-frame.
  pub fn finish(&self) -> Result<()> {
    if self.buf.is_empty() {
      return Ok(());
    }
    let expected = if self.buf.len() < HEADER_LEN {
      HEADER_LEN
    } else {
      HEADER_LEN + declared_len(&self.buf)
    };
    Err(Error::Truncated {
      expected,
      actual: self.buf.len(),
    })
  }
}

fn declared_len(buf: &[u8]) -> usize {
  u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize
}

fn check_len(len: usize) -> Result<()> {
  if len == 0 {
    return Err(Error::ZeroLength);
  }
  if len > MAX_FRAME_LEN {
    return Err(Error::TooLarge {
      length: len,
      limit:  MAX_FRAME_LEN,
    });
  }
  Ok(())
}
