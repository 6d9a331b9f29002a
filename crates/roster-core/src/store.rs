//! The `PersonnelStore` trait.
//!
//! The trait is implemented by storage backends (e.g. `roster-store-sqlite`).
//! The server uses one as the authoritative record store; each client uses one
//! as its local mirror.

use std::future::Future;

use crate::record::{NewRecord, Record, RecordId};

/// Abstraction over a personnel record store backend.
///
/// Backends enforce uniqueness of [`Record::identity_key`]; a conflicting
/// create is a rejected write ([`crate::Error::DuplicateKey`]), never a crash.
///
/// All methods return `Send` futures so the trait can be used from connection
/// tasks on a multi-threaded tokio runtime.
pub trait PersonnelStore: Send + Sync {
  /// Backend error. Converts into [`crate::Error`] so callers can tell
  /// rejected operations apart from backend failures.
  type Error: std::error::Error + Send + Sync + Into<crate::Error> + 'static;

  /// Persist a new record and return it with its store-assigned id.
  fn create(
    &self,
    record: NewRecord,
  ) -> impl Future<Output = Result<Record, Self::Error>> + Send + '_;

  /// Retrieve a record by id. Returns `None` if not found.
  fn get_by_id(
    &self,
    id: RecordId,
  ) -> impl Future<Output = Result<Option<Record>, Self::Error>> + Send + '_;

  /// All records, ordered by id.
  fn get_all(&self) -> impl Future<Output = Result<Vec<Record>, Self::Error>> + Send + '_;

  /// Insert or replace a record under its existing id.
  ///
  /// Used by mirrors, which must keep the ids assigned by the authoritative
  /// store. A row colliding on the identity key is replaced as well.
  fn put(
    &self,
    record: Record,
  ) -> impl Future<Output = Result<Record, Self::Error>> + Send + '_;

  /// Delete a record by id. Fails with [`crate::Error::NotFound`] if absent.
  fn delete_by_id(
    &self,
    id: RecordId,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Delete every record, returning how many were removed.
  fn delete_all(&self) -> impl Future<Output = Result<u64, Self::Error>> + Send + '_;
}
