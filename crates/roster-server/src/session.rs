//! Per-connection session handler.
//!
//! A session starts awaiting identification: until an `Identify` frame
//! arrives, everything else is discarded with a warning and nothing is
//! registered. On `Identify` the connection is registered under the client id
//! *before* any further frame is processed, so no broadcast can be issued to
//! a client that is not yet reachable. The active phase answers
//! client-originated requests. Any read error, framing error, end of stream,
//! or external close moves the session to its terminal state, which releases
//! the registry entry exactly once.

use std::sync::Arc;

use roster_core::{
  message::Message,
  record::{Record, Records},
  store::PersonnelStore,
};
use roster_wire::FrameDecoder;
use tokio::io::{AsyncRead, AsyncReadExt as _, AsyncWrite};
use tracing::Instrument as _;

use crate::{ServerState, connection::Connection};

enum Phase {
  AwaitingIdentify,
  Active { client_id: String },
}

/// Why the read loop ended.
enum Close {
  Eof,
  Closed,
  Read(std::io::Error),
  Framing(roster_wire::Error),
}

/// Drive one connection to completion.
///
/// Returns when the connection is closed; never propagates per-connection
/// errors to the caller.
pub async fn run<S, R, W>(state: ServerState<S>, peer: String, reader: R, writer: W)
where
  S: PersonnelStore + 'static,
  R: AsyncRead + Unpin + Send,
  W: AsyncWrite + Send + 'static,
{
  let span = tracing::info_span!("session", %peer, client_id = tracing::field::Empty);
  let connection = Arc::new(Connection::new(peer, writer));
  drive(state, connection, reader).instrument(span).await
}

async fn drive<S, R>(state: ServerState<S>, connection: Arc<Connection>, mut reader: R)
where
  S: PersonnelStore + 'static,
  R: AsyncRead + Unpin + Send,
{
  tracing::debug!("connection accepted, awaiting identification");
  let mut decoder = FrameDecoder::new();
  let mut phase = Phase::AwaitingIdentify;

  let close = 'read: loop {
    loop {
      match decoder.next_message() {
        Ok(Some(message)) => phase = step(&state, &connection, phase, message).await,
        Ok(None) => break,
        Err(e) => break 'read Close::Framing(e),
      }
    }

    tokio::select! {
      read = reader.read_buf(decoder.buffer_mut()) => match read {
        Ok(0) => break Close::Eof,
        Ok(_) => {}
        Err(e) => break Close::Read(e),
      },
      () = connection.closed() => break Close::Closed,
    }
  };

  match close {
    Close::Eof => match decoder.finish() {
      Ok(()) => tracing::info!("connection closed by peer"),
      Err(e) => tracing::warn!("connection closed mid-frame: {e}"),
    },
    Close::Closed => tracing::info!("connection closed by server"),
    Close::Read(e) => tracing::warn!("read error, closing connection: {e}"),
    Close::Framing(e) => tracing::warn!("framing error, closing connection: {e}"),
  }

  match &phase {
    Phase::Active { client_id } => {
      if state.registry.release(client_id, connection.id()) {
        tracing::info!("client deregistered");
      }
    }
    Phase::AwaitingIdentify => tracing::debug!("closed before identification"),
  }
  connection.shutdown().await;
}

async fn step<S>(
  state: &ServerState<S>,
  connection: &Arc<Connection>,
  phase: Phase,
  message: Message,
) -> Phase
where
  S: PersonnelStore + 'static,
{
  match phase {
    Phase::AwaitingIdentify => match message {
      Message::Identify { client_id } if !client_id.is_empty() => {
        tracing::Span::current().record("client_id", client_id.as_str());
        if let Some(old) = state.registry.register(&client_id, Arc::clone(connection)) {
          tracing::info!(superseded = old.peer(), "client re-identified, replacing session");
        } else {
          tracing::info!("client identified");
        }
        Phase::Active { client_id }
      }
      other => {
        tracing::warn!(kind = other.kind(), "discarding message received before identification");
        Phase::AwaitingIdentify
      }
    },
    Phase::Active { client_id } => {
      for reply in respond(state.store.as_ref(), message).await {
        if let Err(e) = state.dispatcher.deliver(&client_id, connection, &reply).await {
          tracing::warn!(kind = reply.kind(), "failed to reply: {e}");
        }
      }
      Phase::Active { client_id }
    }
  }
}

/// Apply one client-originated message and produce the replies for it.
async fn respond<S: PersonnelStore>(store: &S, message: Message) -> Vec<Message> {
  match message {
    Message::Save { records } => create_all(store, records).await,
    Message::Request { id } => match store.get_by_id(id).await {
      Ok(Some(record)) => vec![Message::save(record)],
      Ok(None) => vec![Message::rejected(roster_core::Error::NotFound(id))],
      Err(e) => {
        tracing::error!(id, "store read failed: {e}");
        vec![Message::rejected("store unavailable")]
      }
    },
    Message::Delete { .. } | Message::DeleteAll => {
      tracing::warn!("client attempted a delete");
      vec![Message::rejected("deletes are issued by the server operator only")]
    }
    other => {
      tracing::warn!(kind = other.kind(), "ignoring unexpected message");
      Vec::new()
    }
  }
}

/// Create each requested record. Stored records are echoed back with their
/// ids; each refused one yields its own `Rejected`.
async fn create_all<S: PersonnelStore>(store: &S, records: Records) -> Vec<Message> {
  let single = matches!(records, Records::One(_));
  let mut saved: Vec<Record> = Vec::new();
  let mut replies = Vec::new();

  for record in records.into_vec() {
    match store.create(record.into_new()).await.map_err(Into::<roster_core::Error>::into) {
      Ok(stored) => {
        tracing::info!(id = stored.id, "personnel record created by client");
        saved.push(stored);
      }
      Err(e) if e.is_rejection() => {
        tracing::warn!("create rejected: {e}");
        replies.push(Message::rejected(e));
      }
      Err(e) => {
        tracing::error!("store write failed: {e}");
        replies.push(Message::rejected("store unavailable"));
      }
    }
  }

  if !saved.is_empty() {
    let records = match (single, saved.len()) {
      (true, 1) => Records::from(saved.remove(0)),
      _ => Records::from(saved),
    };
    replies.insert(0, Message::Save { records });
  }
  replies
}

#[cfg(test)]
mod tests {
  use std::time::Duration;

  use roster_core::record::NewRecord;
  use roster_store_sqlite::SqliteStore;
  use roster_wire::encode;
  use tokio::{
    io::{AsyncWriteExt as _, DuplexStream},
    task::JoinHandle,
  };

  use super::*;

  async fn state() -> ServerState<SqliteStore> {
    let store = SqliteStore::open_in_memory().await.unwrap();
    ServerState::new(store, Duration::from_secs(1))
  }

  fn start(state: &ServerState<SqliteStore>) -> (DuplexStream, JoinHandle<()>) {
    let (client, server) = tokio::io::duplex(64 * 1024);
    let (reader, writer) = tokio::io::split(server);
    let handle = tokio::spawn(run(state.clone(), "test-peer".into(), reader, writer));
    (client, handle)
  }

  async fn send(client: &mut DuplexStream, message: &Message) {
    client.write_all(&encode(message).unwrap()).await.unwrap();
  }

  async fn recv(client: &mut DuplexStream, decoder: &mut FrameDecoder) -> Message {
    loop {
      if let Some(m) = decoder.next_message().unwrap() {
        return m;
      }
      let n = tokio::time::timeout(Duration::from_secs(5), client.read_buf(decoder.buffer_mut()))
        .await
        .expect("timed out waiting for a reply")
        .unwrap();
      assert!(n > 0, "session closed the stream");
    }
  }

  async fn wait_registered(state: &ServerState<SqliteStore>, client_id: &str) {
    for _ in 0..500 {
      if state.registry.get(client_id).is_some() {
        return;
      }
      tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("{client_id} never registered");
  }

  fn ada() -> Record { NewRecord::new("Ada", "Lovelace", "111").with_id(0) }

  #[tokio::test]
  async fn messages_before_identify_are_discarded() {
    let state = state().await;
    let (mut client, _handle) = start(&state);

    send(&mut client, &Message::save(ada())).await;
    send(&mut client, &Message::identify("c1")).await;
    wait_registered(&state, "c1").await;

    // Frames are handled in order, so the Save was seen and dropped.
    assert!(state.store.get_all().await.unwrap().is_empty());
  }

  #[tokio::test]
  async fn close_before_identify_never_registers() {
    let state = state().await;
    let (mut client, handle) = start(&state);

    send(&mut client, &Message::DeleteAll).await;
    drop(client);
    handle.await.unwrap();

    assert!(state.registry.is_empty());
  }

  #[tokio::test]
  async fn framing_error_closes_only_this_connection() {
    let state = state().await;
    let (mut good, _good_handle) = start(&state);
    let (mut bad, bad_handle) = start(&state);

    send(&mut good, &Message::identify("good")).await;
    send(&mut bad, &Message::identify("bad")).await;
    wait_registered(&state, "good").await;
    wait_registered(&state, "bad").await;

    bad.write_all(&[0, 0, 0, 0]).await.unwrap();
    bad_handle.await.unwrap();

    assert!(state.registry.get("bad").is_none());
    assert!(state.registry.get("good").is_some());
    let mut rest = Vec::new();
    assert_eq!(bad.read_to_end(&mut rest).await.unwrap(), 0);
  }

  #[tokio::test]
  async fn duplicate_create_is_rejected_and_session_stays_open() {
    let state = state().await;
    let (mut client, _handle) = start(&state);
    let mut decoder = FrameDecoder::new();

    send(&mut client, &Message::identify("c1")).await;
    send(&mut client, &Message::save(ada())).await;
    let Message::Save { records: Records::One(stored) } = recv(&mut client, &mut decoder).await
    else {
      panic!("expected the stored record back");
    };
    assert!(stored.id > 0);
    assert_eq!(stored.identity_key, "111");

    send(&mut client, &Message::save(ada())).await;
    assert!(matches!(recv(&mut client, &mut decoder).await, Message::Rejected { .. }));
    assert_eq!(state.store.get_all().await.unwrap(), vec![stored.clone()]);

    send(&mut client, &Message::Request { id: stored.id }).await;
    assert_eq!(recv(&mut client, &mut decoder).await, Message::save(stored));
    assert!(state.registry.get("c1").is_some());
  }

  #[tokio::test]
  async fn batch_create_reports_each_rejection() {
    let state = state().await;
    state.store.create(NewRecord::new("Old", "Timer", "222")).await.unwrap();
    let (mut client, _handle) = start(&state);
    let mut decoder = FrameDecoder::new();

    let batch = vec![ada(), NewRecord::new("Dup", "Key", "222").with_id(0)];
    send(&mut client, &Message::identify("c1")).await;
    send(&mut client, &Message::save(batch)).await;

    let Message::Save { records: Records::Many(saved) } = recv(&mut client, &mut decoder).await
    else {
      panic!("expected a batch back");
    };
    assert_eq!(saved.len(), 1);
    assert!(matches!(recv(&mut client, &mut decoder).await, Message::Rejected { .. }));
    assert_eq!(state.store.get_all().await.unwrap().len(), 2);
  }

  #[tokio::test]
  async fn client_deletes_and_missing_requests_are_rejected() {
    let state = state().await;
    let (mut client, _handle) = start(&state);
    let mut decoder = FrameDecoder::new();

    send(&mut client, &Message::identify("c1")).await;
    send(&mut client, &Message::DeleteAll).await;
    assert!(matches!(recv(&mut client, &mut decoder).await, Message::Rejected { .. }));

    send(&mut client, &Message::Request { id: 99 }).await;
    let Message::Rejected { reason } = recv(&mut client, &mut decoder).await else {
      panic!("expected a rejection");
    };
    assert!(reason.contains("99"), "reason: {reason}");
  }

  #[tokio::test]
  async fn superseded_session_ends_without_evicting_its_replacement() {
    let state = state().await;
    let (mut first, first_handle) = start(&state);
    send(&mut first, &Message::identify("c1")).await;
    wait_registered(&state, "c1").await;
    let first_id = state.registry.get("c1").unwrap().id();

    let (mut second, _second_handle) = start(&state);
    send(&mut second, &Message::identify("c1")).await;
    for _ in 0..500 {
      if state.registry.get("c1").is_some_and(|c| c.id() != first_id) {
        break;
      }
      tokio::time::sleep(Duration::from_millis(10)).await;
    }

    first_handle.await.unwrap();
    let current = state.registry.get("c1").expect("replacement still registered");
    assert_ne!(current.id(), first_id);
  }
}
