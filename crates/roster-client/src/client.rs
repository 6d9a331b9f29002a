//! TCP client and local mirror maintenance.

use std::sync::Arc;

use anyhow::{Context, Result};
use roster_core::{
  message::Message,
  record::{NewRecord, RecordId},
  store::PersonnelStore,
};
use roster_wire::FrameDecoder;
use tokio::{
  io::{AsyncRead, AsyncReadExt as _, AsyncWriteExt as _},
  net::{
    TcpStream,
    tcp::{OwnedReadHalf, OwnedWriteHalf},
  },
  task::JoinHandle,
};

/// Write side of a connection to the roster server.
pub struct Client {
  client_id: String,
  writer:    OwnedWriteHalf,
}

impl Client {
  /// Connect to `addr` and identify as `client_id`.
  ///
  /// Returns the client and the read half, which the caller hands to
  /// [`spawn_inbound`] to receive pushed messages.
  pub async fn connect(addr: &str, client_id: impl Into<String>) -> Result<(Self, OwnedReadHalf)> {
    let stream = TcpStream::connect(addr)
      .await
      .with_context(|| format!("failed to connect to {addr}"))?;
    if let Err(e) = stream.set_nodelay(true) {
      tracing::debug!(%addr, "failed to set TCP_NODELAY: {e}");
    }
    let (reader, writer) = stream.into_split();

    let mut client = Self { client_id: client_id.into(), writer };
    client.send(&Message::identify(client.client_id.clone())).await?;
    tracing::info!(client_id = %client.client_id, %addr, "connected");
    Ok((client, reader))
  }

  pub fn client_id(&self) -> &str { &self.client_id }

  pub async fn send(&mut self, message: &Message) -> Result<()> {
    let frame = roster_wire::encode(message).context("failed to encode message")?;
    self.writer.write_all(&frame).await.context("failed to send message")?;
    self.writer.flush().await.context("failed to flush connection")?;
    Ok(())
  }

  /// Ask the server to create a record. The server replies with a `Save` of
  /// the stored record, or `Rejected`.
  pub async fn add(&mut self, record: NewRecord) -> Result<()> {
    self.send(&Message::save(record.with_id(0))).await
  }

  /// Ask the server to send one record.
  pub async fn request(&mut self, id: RecordId) -> Result<()> {
    self.send(&Message::Request { id }).await
  }

  /// Shut down the write half; the server sees end of stream.
  pub async fn close(mut self) -> Result<()> {
    self.writer.shutdown().await.context("failed to close connection")
  }
}

/// Apply one server-pushed message to the local mirror.
pub async fn apply<S: PersonnelStore>(store: &S, message: Message) -> Result<()> {
  match message {
    Message::Save { records } => {
      for record in records.into_vec() {
        let id = record.id;
        store.put(record).await.with_context(|| format!("failed to save record {id}"))?;
        tracing::info!(id, "record saved");
      }
    }
    Message::Delete { id } => match store.delete_by_id(id).await.map_err(Into::<roster_core::Error>::into) {
      Ok(()) => tracing::info!(id, "record deleted"),
      Err(roster_core::Error::NotFound(_)) => {
        tracing::warn!(id, "delete for a record not held locally");
      }
      Err(e) => return Err(e).with_context(|| format!("failed to delete record {id}")),
    },
    Message::DeleteAll => {
      let removed = store.delete_all().await.context("failed to delete all records")?;
      tracing::info!(removed, "all records deleted");
    }
    Message::Rejected { reason } => tracing::warn!("server rejected request: {reason}"),
    other => tracing::warn!(kind = other.kind(), "ignoring unexpected message"),
  }
  Ok(())
}

/// Read pushed messages until end of stream, applying each to `store`.
///
/// A framing error or a store failure ends the loop with an error.
pub async fn run_inbound<R, S>(mut reader: R, store: Arc<S>) -> Result<()>
where
  R: AsyncRead + Unpin,
  S: PersonnelStore,
{
  let mut decoder = FrameDecoder::new();
  loop {
    while let Some(message) = decoder.next_message().context("malformed frame from server")? {
      tracing::debug!(kind = message.kind(), "received message");
      apply(store.as_ref(), message).await?;
    }
    let read = reader
      .read_buf(decoder.buffer_mut())
      .await
      .context("failed to read from server")?;
    if read == 0 {
      decoder.finish().context("connection closed mid-frame")?;
      tracing::info!("server closed the connection");
      return Ok(());
    }
  }
}

pub fn spawn_inbound<R, S>(reader: R, store: Arc<S>) -> JoinHandle<Result<()>>
where
  R: AsyncRead + Unpin + Send + 'static,
  S: PersonnelStore + 'static,
{
  tokio::spawn(async move {
    let result = run_inbound(reader, store).await;
    if let Err(e) = &result {
      tracing::error!("inbound loop stopped: {e:#}");
    }
    result
  })
}
