//! Operator-initiated actions.
//!
//! Each action touches the authoritative store first and only broadcasts once
//! the store has accepted the change, so clients are never told about a change
//! that was not persisted. The returned delivery report lists one entry per
//! intended recipient.

use roster_core::{
  message::Message,
  record::{Record, RecordId},
  store::PersonnelStore,
};

use crate::{
  ServerState,
  dispatch::{Delivery, Target},
  error::{Error, Result},
  registry::ClientSession,
};

fn store_error(e: impl Into<roster_core::Error>) -> Error { Error::Store(e.into()) }

pub struct Operator<S> {
  state: ServerState<S>,
}

impl<S: PersonnelStore + 'static> Operator<S> {
  pub fn new(state: ServerState<S>) -> Self { Self { state } }

  /// Push one record to `target`. Fails with `NotFound` without sending
  /// anything if the record does not exist.
  pub async fn send_record(&self, target: Target, id: RecordId) -> Result<Vec<Delivery>> {
    let record = self
      .state
      .store
      .get_by_id(id)
      .await
      .map_err(store_error)?
      .ok_or(roster_core::Error::NotFound(id))?;

    tracing::info!(id, ?target, "sending record");
    Ok(self.state.dispatcher.broadcast(target, &Message::save(record)).await?)
  }

  /// Push every stored record to every connected client in a single `Save`.
  pub async fn send_all_records(&self) -> Result<(usize, Vec<Delivery>)> {
    let records: Vec<Record> = self.state.store.get_all().await.map_err(store_error)?;
    let count = records.len();

    tracing::info!(count, "sending all records");
    let report = self.state.dispatcher.broadcast(Target::All, &Message::save(records)).await?;
    Ok((count, report))
  }

  /// Delete one record from the store, then tell `target` to delete it.
  pub async fn delete_record(&self, target: Target, id: RecordId) -> Result<Vec<Delivery>> {
    self.state.store.delete_by_id(id).await.map_err(store_error)?;

    tracing::info!(id, ?target, "record deleted");
    Ok(self.state.dispatcher.broadcast(target, &Message::Delete { id }).await?)
  }

  /// Empty the store, then tell every client to do the same.
  pub async fn delete_all_records(&self) -> Result<(u64, Vec<Delivery>)> {
    let removed = self.state.store.delete_all().await.map_err(store_error)?;

    tracing::info!(removed, "all records deleted");
    let report = self.state.dispatcher.broadcast(Target::All, &Message::DeleteAll).await?;
    Ok((removed, report))
  }

  /// Currently registered clients, ordered by client id.
  pub fn clients(&self) -> Vec<ClientSession> { self.state.registry.all() }
}
