//! Length-prefixed JSON framing for roster messages.
//!
//! Each frame is a 4-byte big-endian payload length followed by exactly that
//! many bytes of UTF-8 JSON (the message envelope). Transports may split or
//! coalesce frames arbitrarily, so readers feed raw bytes into a
//! [`FrameDecoder`] and pull out whole messages. Pure synchronous; no I/O.
//!
//! # Quick start
//!
//! ```
//! use roster_core::message::Message;
//! use roster_wire::{FrameDecoder, encode};
//!
//! let frame = encode(&Message::identify("c1")).unwrap();
//! let mut decoder = FrameDecoder::new();
//! decoder.extend(&frame[..3]);
//! assert!(decoder.next_message().unwrap().is_none());
//! decoder.extend(&frame[3..]);
//! assert_eq!(decoder.next_message().unwrap(), Some(Message::identify("c1")));
//! ```

pub mod error;
mod frame;

pub use error::{Error, Result};
pub use frame::{FrameDecoder, HEADER_LEN, MAX_FRAME_LEN, decode, encode};
