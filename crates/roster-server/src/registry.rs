//! The client registry: which client ids are live, and on which connection.
//!
//! All methods take `&self` and are safe to call from any number of session
//! tasks and the dispatcher at once. The map itself is never handed out;
//! iteration goes through [`Registry::all`], which returns a point-in-time
//! copy.

use std::{
  collections::HashMap,
  sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use chrono::{DateTime, Utc};

use crate::connection::Connection;

/// One registered client.
#[derive(Debug, Clone)]
pub struct ClientSession {
  pub client_id:     String,
  pub connection:    Arc<Connection>,
  pub registered_at: DateTime<Utc>,
}

/// Thread-safe map from client id to its active connection.
///
/// A snapshot taken by [`all`](Self::all) may miss a registration that lands
/// while it is being copied, or include a client that deregisters right
/// after; delivery is best-effort, and sends to a connection that has since
/// closed fail with a reported error rather than a fault.
#[derive(Debug, Default)]
pub struct Registry {
  clients: RwLock<HashMap<String, ClientSession>>,
}

impl Registry {
  pub fn new() -> Self { Self::default() }

  // Every mutation is a single insert or remove, so a poisoned map is still
  // consistent.
  fn read(&self) -> RwLockReadGuard<'_, HashMap<String, ClientSession>> {
    self.clients.read().unwrap_or_else(PoisonError::into_inner)
  }

  fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, ClientSession>> {
    self.clients.write().unwrap_or_else(PoisonError::into_inner)
  }

  /// Register `connection` under `client_id`.
  ///
  /// Last writer wins: an existing entry is replaced and its connection is
  /// closed, then returned.
  pub fn register(
    &self,
    client_id: impl Into<String>,
    connection: Arc<Connection>,
  ) -> Option<Arc<Connection>> {
    let client_id = client_id.into();
    let session = ClientSession {
      client_id: client_id.clone(),
      connection,
      registered_at: Utc::now(),
    };

    let superseded = self.write().insert(client_id, session)?;
    superseded.connection.close();
    Some(superseded.connection)
  }

  /// Remove `client_id` whatever connection it is on, closing that
  /// connection.
  pub fn deregister(&self, client_id: &str) -> Option<ClientSession> {
    let removed = self.write().remove(client_id)?;
    removed.connection.close();
    Some(removed)
  }

  /// Remove `client_id` only if it is still registered on `connection_id`.
  ///
  /// Session teardown goes through here so that a superseded session never
  /// evicts its replacement. Returns whether an entry was removed; repeated
  /// calls are no-ops.
  pub fn release(&self, client_id: &str, connection_id: u64) -> bool {
    let mut clients = self.write();
    match clients.get(client_id) {
      Some(session) if session.connection.id() == connection_id => {
        clients.remove(client_id);
        true
      }
      _ => false,
    }
  }

  pub fn get(&self, client_id: &str) -> Option<Arc<Connection>> {
    self.read().get(client_id).map(|s| Arc::clone(&s.connection))
  }

  /// Point-in-time copy of every registered client, ordered by client id.
  pub fn all(&self) -> Vec<ClientSession> {
    let mut sessions: Vec<ClientSession> = self.read().values().cloned().collect();
    sessions.sort_by(|a, b| a.client_id.cmp(&b.client_id));
    sessions
  }

  pub fn len(&self) -> usize { self.read().len() }

  pub fn is_empty(&self) -> bool { self.read().is_empty() }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn conn() -> Arc<Connection> { Arc::new(Connection::new("test", tokio::io::sink())) }

  #[test]
  fn register_get_and_snapshot() {
    let registry = Registry::new();
    let b = conn();
    let a = conn();
    registry.register("b", Arc::clone(&b));
    registry.register("a", Arc::clone(&a));

    assert_eq!(registry.len(), 2);
    assert_eq!(registry.get("a").unwrap().id(), a.id());
    assert!(registry.get("zzz").is_none());

    let ids: Vec<_> = registry.all().into_iter().map(|s| s.client_id).collect();
    assert_eq!(ids, vec!["a", "b"]);
  }

  #[test]
  fn reregistering_replaces_and_closes_the_old_connection() {
    let registry = Registry::new();
    let old = conn();
    let new = conn();

    assert!(registry.register("c1", Arc::clone(&old)).is_none());
    let superseded = registry.register("c1", Arc::clone(&new)).unwrap();

    assert_eq!(superseded.id(), old.id());
    assert!(old.is_closed());
    assert!(!new.is_closed());
    assert_eq!(registry.len(), 1);
    assert_eq!(registry.get("c1").unwrap().id(), new.id());
  }

  #[test]
  fn release_only_removes_the_matching_connection() {
    let registry = Registry::new();
    let old = conn();
    let new = conn();
    registry.register("c1", Arc::clone(&old));
    registry.register("c1", Arc::clone(&new));

    // The superseded session tearing down must not evict its replacement.
    assert!(!registry.release("c1", old.id()));
    assert_eq!(registry.get("c1").unwrap().id(), new.id());

    assert!(registry.release("c1", new.id()));
    assert!(!registry.release("c1", new.id()));
    assert!(registry.is_empty());
  }

  #[test]
  fn deregister_closes_and_snapshot_no_longer_contains_it() {
    let registry = Registry::new();
    let c = conn();
    registry.register("c1", Arc::clone(&c));

    let removed = registry.deregister("c1").unwrap();
    assert_eq!(removed.connection.id(), c.id());
    assert!(c.is_closed());
    assert!(registry.all().is_empty());
    assert!(registry.deregister("c1").is_none());
  }

  #[test]
  fn concurrent_churn_never_returns_deregistered_handles() {
    let registry = Registry::new();
    let stable = conn();
    registry.register("stable", Arc::clone(&stable));

    std::thread::scope(|scope| {
      for t in 0..8 {
        let registry = &registry;
        scope.spawn(move || {
          for i in 0..200 {
            let id = format!("t{t}-{i}");
            let c = conn();
            registry.register(id.clone(), Arc::clone(&c));
            if i % 2 == 0 {
              registry.deregister(&id);
              let snapshot = registry.all();
              assert!(snapshot.iter().all(|s| s.client_id != id));
              assert!(snapshot.iter().all(|s| s.connection.id() != c.id()));
            }
            assert!(registry.all().iter().any(|s| s.client_id == "stable"));
          }
        });
      }
    });

    // Every even registration was removed, every odd one remains.
    assert_eq!(registry.len(), 1 + 8 * 100);
    assert!(registry.all().iter().all(|s| !s.connection.is_closed()));
  }
}
