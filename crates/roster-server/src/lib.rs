//! Personnel record server.
//!
//! Accepts TCP clients, registers each under the id it sends in its
//! `Identify` handshake, and pushes record changes from the authoritative
//! [`PersonnelStore`] to one or all registered clients using the
//! length-prefixed JSON framing from `roster-wire`.

pub mod connection;
pub mod dispatch;
pub mod error;
pub mod listener;
pub mod operator;
pub mod registry;
pub mod session;


pub use dispatch::{Delivery, Dispatcher, Target};
pub use error::{DeliveryError, Error};
pub use listener::{Listener, serve};
pub use operator::Operator;
pub use registry::{ClientSession, Registry};

use std::{path::PathBuf, sync::Arc, time::Duration};

use roster_core::store::PersonnelStore;
use serde::Deserialize;

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `server.toml` and
/// `ROSTER_*` environment variables.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
  pub host:            String,
  pub port:            u16,
  pub store_path:      PathBuf,
  /// Upper bound on a single send before the recipient is dropped.
  pub send_timeout_ms: u64,
}

impl Default for ServerConfig {
  fn default() -> Self {
    Self {
      host:            "127.0.0.1".into(),
      port:            5000,
      store_path:      PathBuf::from("roster.sqlite"),
      send_timeout_ms: 2000,
    }
  }
}

impl ServerConfig {
  pub fn address(&self) -> String { format!("{}:{}", self.host, self.port) }

  pub fn send_timeout(&self) -> Duration { Duration::from_millis(self.send_timeout_ms) }
}

// ─── Server state ─────────────────────────────────────────────────────────────

/// Shared state handed to every session task and to the operator.
pub struct ServerState<S> {
  pub store:      Arc<S>,
  pub registry:   Arc<Registry>,
  pub dispatcher: Dispatcher,
}

impl<S> Clone for ServerState<S> {
  fn clone(&self) -> Self {
    Self {
      store:      Arc::clone(&self.store),
      registry:   Arc::clone(&self.registry),
      dispatcher: self.dispatcher.clone(),
    }
  }
}

impl<S: PersonnelStore> ServerState<S> {
  pub fn new(store: S, send_timeout: Duration) -> Self {
    let registry = Arc::new(Registry::new());
    Self {
      store: Arc::new(store),
      dispatcher: Dispatcher::new(Arc::clone(&registry), send_timeout),
      registry,
    }
  }
}
