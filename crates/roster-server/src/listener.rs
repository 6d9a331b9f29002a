//! TCP accept loop.

use std::{net::SocketAddr, time::Duration};

use roster_core::store::PersonnelStore;
use tokio::net::TcpListener;

use crate::{ServerState, error::Error, session};

/// Pause after a failed `accept`, e.g. when the process is out of file
/// descriptors.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// A bound listening socket.
pub struct Listener {
  inner: TcpListener,
}

impl Listener {
  /// Bind to `address` (`host:port`). Port 0 picks a free port.
  pub async fn bind(address: &str) -> Result<Self, Error> {
    let inner = TcpListener::bind(address).await.map_err(|source| Error::Bind {
      address: address.to_owned(),
      source,
    })?;
    Ok(Self { inner })
  }

  pub fn local_addr(&self) -> std::io::Result<SocketAddr> { self.inner.local_addr() }

  /// Accept connections forever, spawning one session task per connection.
  ///
  /// A failed accept is logged and retried; it never stops the loop.
  pub async fn run<S>(self, state: ServerState<S>)
  where
    S: PersonnelStore + 'static,
  {
    if let Ok(addr) = self.inner.local_addr() {
      tracing::info!(%addr, "accepting connections");
    }
    loop {
      let (stream, peer) = match self.inner.accept().await {
        Ok(accepted) => accepted,
        Err(e) => {
          tracing::warn!("accept failed: {e}");
          tokio::time::sleep(ACCEPT_BACKOFF).await;
          continue;
        }
      };

      if let Err(e) = stream.set_nodelay(true) {
        tracing::debug!(%peer, "failed to set TCP_NODELAY: {e}");
      }
      let (reader, writer) = stream.into_split();
      tokio::spawn(session::run(state.clone(), peer.to_string(), reader, writer));
    }
  }
}

/// Bind `address` and serve until the task is dropped.
pub async fn serve<S>(address: &str, state: ServerState<S>) -> Result<(), Error>
where
  S: PersonnelStore + 'static,
{
  Listener::bind(address).await?.run(state).await;
  Ok(())
}
