//! Fan-out of one message to one, all, or no registered clients.
//!
//! Delivery is fire-and-forget: there is no acknowledgement and no retry.
//! Each recipient gets its own outcome in the returned report, and one
//! recipient failing never stops delivery to the rest.

use std::{sync::Arc, time::Duration};

use bytes::Bytes;
use roster_core::message::Message;
use tokio::task::JoinSet;

use crate::{connection::Connection, error::DeliveryError, registry::Registry};

/// Who a message goes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
  One(String),
  All,
  None,
}

/// Outcome of sending to one recipient.
#[derive(Debug)]
pub struct Delivery {
  pub client_id: String,
  pub outcome:   Result<(), DeliveryError>,
}

impl Delivery {
  pub fn is_delivered(&self) -> bool { self.outcome.is_ok() }
}

/// Resolves targets against the [`Registry`] and writes frames to each
/// matching connection under a per-send timeout.
///
/// A recipient whose send times out or fails with an I/O error is closed and
/// released from the registry.
#[derive(Debug, Clone)]
pub struct Dispatcher {
  registry:     Arc<Registry>,
  send_timeout: Duration,
}

impl Dispatcher {
  pub fn new(registry: Arc<Registry>, send_timeout: Duration) -> Self {
    Self { registry, send_timeout }
  }

  pub fn registry(&self) -> &Arc<Registry> { &self.registry }

  /// Send `message` to every client matching `target`.
  ///
  /// The message is encoded once up front; an encoding failure is returned
  /// before anything is sent. The report is ordered by client id.
  pub async fn broadcast(
    &self,
    target: Target,
    message: &Message,
  ) -> Result<Vec<Delivery>, roster_wire::Error> {
    let frame = roster_wire::encode(message)?;

    let recipients: Vec<(String, Option<Arc<Connection>>)> = match target {
      Target::None => return Ok(Vec::new()),
      Target::One(client_id) => {
        let connection = self.registry.get(&client_id);
        vec![(client_id, connection)]
      }
      Target::All => self
        .registry
        .all()
        .into_iter()
        .map(|s| (s.client_id, Some(s.connection)))
        .collect(),
    };

    let mut report = Vec::with_capacity(recipients.len());
    let mut sends = JoinSet::new();

    for (client_id, connection) in recipients {
      let Some(connection) = connection else {
        report.push(Delivery {
          outcome: Err(DeliveryError::NotFound(client_id.clone())),
          client_id,
        });
        continue;
      };

      let dispatcher = self.clone();
      let frame = frame.clone();
      sends.spawn(async move {
        let outcome = dispatcher.send_frame(&client_id, &connection, &frame).await;
        Delivery { client_id, outcome }
      });
    }

    while let Some(joined) = sends.join_next().await {
      match joined {
        Ok(delivery) => report.push(delivery),
        Err(e) => tracing::error!("delivery task failed: {e}"),
      }
    }

    report.sort_by(|a, b| a.client_id.cmp(&b.client_id));
    tracing::debug!(
      kind = message.kind(),
      recipients = report.len(),
      failed = report.iter().filter(|d| !d.is_delivered()).count(),
      "broadcast finished"
    );
    Ok(report)
  }

  /// Send `message` on a connection the caller already holds, e.g. a session
  /// replying to its own client.
  pub async fn deliver(
    &self,
    client_id: &str,
    connection: &Connection,
    message: &Message,
  ) -> Result<(), DeliveryError> {
    let frame = roster_wire::encode(message)?;
    self.send_frame(client_id, connection, &frame).await
  }

  async fn send_frame(
    &self,
    client_id: &str,
    connection: &Connection,
    frame: &Bytes,
  ) -> Result<(), DeliveryError> {
    let outcome = connection.send(frame, self.send_timeout).await;

    if let Err(e) = &outcome
      && e.drops_connection()
    {
      tracing::warn!(client_id, peer = connection.peer(), "dropping client after failed send: {e}");
      connection.close();
      self.registry.release(client_id, connection.id());
    }
    outcome
  }
}

#[cfg(test)]
mod tests {
  use roster_core::record::NewRecord;
  use roster_wire::FrameDecoder;
  use tokio::io::{AsyncReadExt as _, DuplexStream};

  use super::*;

  fn dispatcher(timeout: Duration) -> Dispatcher {
    Dispatcher::new(Arc::new(Registry::new()), timeout)
  }

  /// Register a client whose peer end is returned for reading.
  fn connect(d: &Dispatcher, client_id: &str, buffer: usize) -> (Arc<Connection>, DuplexStream) {
    let (local, remote) = tokio::io::duplex(buffer);
    let conn = Arc::new(Connection::new(client_id, local));
    d.registry().register(client_id, Arc::clone(&conn));
    (conn, remote)
  }

  async fn read_one(remote: &mut DuplexStream) -> Message {
    let mut decoder = FrameDecoder::new();
    loop {
      if let Some(m) = decoder.next_message().unwrap() {
        return m;
      }
      let n = remote.read_buf(decoder.buffer_mut()).await.unwrap();
      assert!(n > 0, "stream ended before a full frame");
    }
  }

  fn save() -> Message { Message::save(NewRecord::new("Ada", "Lovelace", "1").with_id(1)) }

  #[tokio::test]
  async fn one_failed_recipient_does_not_affect_the_others() {
    let d = dispatcher(Duration::from_secs(1));
    let (_a, mut a_remote) = connect(&d, "a", 64 * 1024);
    let (b, b_remote) = connect(&d, "b", 64 * 1024);
    drop(b_remote);

    let report = d.broadcast(Target::All, &save()).await.unwrap();

    assert_eq!(report.len(), 2);
    assert_eq!(report[0].client_id, "a");
    assert!(report[0].is_delivered());
    assert_eq!(report[1].client_id, "b");
    assert!(matches!(report[1].outcome, Err(DeliveryError::Io(_))));

    assert_eq!(read_one(&mut a_remote).await, save());

    // The broken recipient is gone; the healthy one stays.
    assert!(b.is_closed());
    assert!(d.registry().get("b").is_none());
    assert!(d.registry().get("a").is_some());
  }

  #[tokio::test]
  async fn unknown_target_is_reported_not_fatal() {
    let d = dispatcher(Duration::from_secs(1));
    let (_a, _a_remote) = connect(&d, "a", 1024);

    let report = d.broadcast(Target::One("ghost".into()), &save()).await.unwrap();
    assert_eq!(report.len(), 1);
    assert!(matches!(report[0].outcome, Err(DeliveryError::NotFound(ref id)) if id == "ghost"));
    assert_eq!(d.registry().len(), 1);
  }

  #[tokio::test]
  async fn target_none_sends_nothing() {
    let d = dispatcher(Duration::from_secs(1));
    let (_a, _a_remote) = connect(&d, "a", 1024);
    assert!(d.broadcast(Target::None, &save()).await.unwrap().is_empty());
  }

  #[tokio::test]
  async fn one_target_reaches_only_that_client() {
    let d = dispatcher(Duration::from_secs(1));
    let (_a, mut a_remote) = connect(&d, "a", 1024);
    let (_b, mut b_remote) = connect(&d, "b", 1024);

    let report = d.broadcast(Target::One("b".into()), &Message::DeleteAll).await.unwrap();
    assert_eq!(report.len(), 1);
    assert!(report[0].is_delivered());
    assert_eq!(read_one(&mut b_remote).await, Message::DeleteAll);

    let mut buf = [0u8; 1];
    let nothing =
      tokio::time::timeout(Duration::from_millis(50), a_remote.read(&mut buf)).await;
    assert!(nothing.is_err(), "client a should not have received anything");
  }

  #[tokio::test]
  async fn stalled_recipient_times_out_without_blocking_others() {
    let d = dispatcher(Duration::from_millis(100));
    // A tiny pipe nobody reads from: the write cannot complete.
    let (slow, _slow_remote) = connect(&d, "slow", 8);
    let (_fast, mut fast_remote) = connect(&d, "fast", 64 * 1024);

    let report = d.broadcast(Target::All, &save()).await.unwrap();

    let fast = report.iter().find(|r| r.client_id == "fast").unwrap();
    let stalled = report.iter().find(|r| r.client_id == "slow").unwrap();
    assert!(fast.is_delivered());
    assert!(matches!(stalled.outcome, Err(DeliveryError::Timeout(_))));
    assert_eq!(read_one(&mut fast_remote).await, save());

    assert!(slow.is_closed());
    assert!(d.registry().get("slow").is_none());
  }

  #[tokio::test]
  async fn send_queued_behind_a_timed_out_frame_reports_closed() {
    let d = dispatcher(Duration::from_millis(100));
    let (a, mut a_remote) = connect(&d, "a", 16);

    let first = tokio::spawn({
      let (d, a) = (d.clone(), Arc::clone(&a));
      async move { d.deliver("a", &a, &save()).await }
    });
    // Let the first send take the writer and stall on the full pipe.
    tokio::time::sleep(Duration::from_millis(20)).await;
    let second = d.deliver("a", &a, &Message::DeleteAll).await;

    assert!(matches!(first.await.unwrap(), Err(DeliveryError::Timeout(_))));
    assert!(matches!(second, Err(DeliveryError::Closed)));
    assert!(d.registry().get("a").is_none());

    // Only the cut-off prefix of the first frame ever reaches the peer.
    let mut received = Vec::new();
    a_remote.read_to_end(&mut received).await.unwrap();
    assert_eq!(received.len(), 16);
    let mut decoder = FrameDecoder::new();
    decoder.extend(&received);
    assert!(decoder.next_message().unwrap().is_none());
  }

  #[tokio::test]
  async fn deliver_to_removed_connection_is_a_reported_no_op() {
    let d = dispatcher(Duration::from_secs(1));
    let (a, _a_remote) = connect(&d, "a", 1024);
    d.registry().deregister("a");

    let err = d.deliver("a", &a, &save()).await.unwrap_err();
    assert!(matches!(err, DeliveryError::Closed));
    let report = d.broadcast(Target::All, &save()).await.unwrap();
    assert!(report.is_empty());
  }
}
