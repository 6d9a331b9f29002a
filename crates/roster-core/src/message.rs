//! The closed set of messages exchanged between server and clients.
//!
//! On the wire every message is an envelope `{"kind": ..., "payload": ...}`.
//! The kind is decoded once, at the boundary, into [`Message`]; kinds this
//! build does not know decode into [`Message::Unknown`] so that newer peers do
//! not break older ones.

use std::str::FromStr as _;

use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use strum::{Display, EnumString, IntoStaticStr};

use crate::record::{RecordId, Records};

// ─── Kind ────────────────────────────────────────────────────────────────────

/// Discriminant of a [`Message`], as written in the envelope's `kind` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, IntoStaticStr)]
pub enum MessageKind {
  Identify,
  Save,
  Delete,
  DeleteAll,
  Request,
  Rejected,
}

impl MessageKind {
  pub fn as_str(self) -> &'static str { self.into() }
}

// ─── Message ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "Envelope")]
pub enum Message {
  /// Sent once by a client immediately after connecting.
  Identify { client_id: String },
  /// Server → client push, or client → server create request.
  Save { records: Records },
  Delete { id: RecordId },
  DeleteAll,
  /// Client → server request for a single record.
  Request { id: RecordId },
  /// Server → client report that a create or request was refused.
  Rejected { reason: String },
  /// A kind this build does not understand.
  Unknown { kind: String, payload: Value },
}

impl Message {
  /// The kind as it appears on the wire.
  pub fn kind(&self) -> &str {
    match self {
      Self::Identify { .. } => MessageKind::Identify.as_str(),
      Self::Save { .. } => MessageKind::Save.as_str(),
      Self::Delete { .. } => MessageKind::Delete.as_str(),
      Self::DeleteAll => MessageKind::DeleteAll.as_str(),
      Self::Request { .. } => MessageKind::Request.as_str(),
      Self::Rejected { .. } => MessageKind::Rejected.as_str(),
      Self::Unknown { kind, .. } => kind,
    }
  }

  pub fn identify(client_id: impl Into<String>) -> Self {
    Self::Identify { client_id: client_id.into() }
  }

  pub fn save(records: impl Into<Records>) -> Self {
    Self::Save { records: records.into() }
  }

  pub fn rejected(reason: impl ToString) -> Self {
    Self::Rejected { reason: reason.to_string() }
  }
}

// ─── Envelope ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
struct Envelope {
  kind:    String,
  #[serde(default)]
  payload: Value,
}

// Payloads are owned when decoding and borrowed when encoding.

#[derive(Serialize, Deserialize)]
struct IdentifyPayload<T = String> {
  client_id: T,
}

#[derive(Serialize, Deserialize)]
struct SavePayload<T = Records> {
  records: T,
}

#[derive(Serialize, Deserialize)]
struct IdPayload {
  id: RecordId,
}

#[derive(Serialize, Deserialize)]
struct RejectedPayload<T = String> {
  reason: T,
}

impl TryFrom<Envelope> for Message {
  type Error = serde_json::Error;

  fn try_from(envelope: Envelope) -> Result<Self, Self::Error> {
    let Ok(kind) = MessageKind::from_str(&envelope.kind) else {
      return Ok(Self::Unknown {
        kind:    envelope.kind,
        payload: envelope.payload,
      });
    };

    let payload = envelope.payload;
    Ok(match kind {
      MessageKind::Identify => {
        let p: IdentifyPayload = serde_json::from_value(payload)?;
        Self::Identify { client_id: p.client_id }
      }
      MessageKind::Save => {
        let p: SavePayload = serde_json::from_value(payload)?;
        Self::Save { records: p.records }
      }
      MessageKind::Delete => {
        let p: IdPayload = serde_json::from_value(payload)?;
        Self::Delete { id: p.id }
      }
      MessageKind::DeleteAll => Self::DeleteAll,
      MessageKind::Request => {
        let p: IdPayload = serde_json::from_value(payload)?;
        Self::Request { id: p.id }
      }
      MessageKind::Rejected => {
        let p: RejectedPayload = serde_json::from_value(payload)?;
        Self::Rejected { reason: p.reason }
      }
    })
  }
}

/// Outgoing envelope, borrowing its payload from the message.
#[derive(Serialize)]
struct EnvelopeRef<'a, P> {
  kind:    &'a str,
  payload: P,
}

#[derive(Serialize)]
struct EmptyPayload {}

impl Serialize for Message {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    let kind = self.kind();
    match self {
      Self::Identify { client_id } => {
        let payload = IdentifyPayload { client_id: client_id.as_str() };
        EnvelopeRef { kind, payload }.serialize(serializer)
      }
      Self::Save { records } => {
        EnvelopeRef { kind, payload: SavePayload { records } }.serialize(serializer)
      }
      Self::Delete { id } | Self::Request { id } => {
        EnvelopeRef { kind, payload: IdPayload { id: *id } }.serialize(serializer)
      }
      Self::DeleteAll => EnvelopeRef { kind, payload: EmptyPayload {} }.serialize(serializer),
      Self::Rejected { reason } => {
        let payload = RejectedPayload { reason: reason.as_str() };
        EnvelopeRef { kind, payload }.serialize(serializer)
      }
      Self::Unknown { payload, .. } => EnvelopeRef { kind, payload }.serialize(serializer),
    }
  }
}
