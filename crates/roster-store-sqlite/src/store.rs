//! [`SqliteStore`], the SQLite implementation of [`PersonnelStore`].

use std::path::{Path, PathBuf};

use roster_core::{
  record::{NewRecord, Record, RecordId},
  store::PersonnelStore,
};
use rusqlite::{ErrorCode, OptionalExtension as _};

use crate::{Result, schema::SCHEMA};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A personnel store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted. All calls
/// are serialised on the connection's worker thread, which is what makes the
/// store safe to share between connection tasks and the operator console.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

/// Expand a leading `~/` in a configured store path to the user's home
/// directory. Other paths are returned unchanged.
pub fn expand_home(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<Record> {
  Ok(Record {
    id:           row.get(0)?,
    name:         row.get(1)?,
    surname:      row.get(2)?,
    identity_key: row.get(3)?,
  })
}

// ─── PersonnelStore impl ─────────────────────────────────────────────────────

impl PersonnelStore for SqliteStore {
  type Error = crate::Error;

  async fn create(&self, record: NewRecord) -> Result<Record> {
    let row = record.clone();

    // `None` signals a unique-constraint violation on identity_key.
    let id: Option<RecordId> = self
      .conn
      .call(move |conn| {
        let res = conn.execute(
          "INSERT INTO personnel (name, surname, identity_key) VALUES (?1, ?2, ?3)",
          rusqlite::params![row.name, row.surname, row.identity_key],
        );
        match res {
          Ok(_) => Ok(Some(conn.last_insert_rowid())),
          Err(e) if e.sqlite_error_code() == Some(ErrorCode::ConstraintViolation) => {
            Ok(None)
          }
          Err(e) => Err(e.into()),
        }
      })
      .await?;

    match id {
      Some(id) => {
        tracing::debug!(id, "personnel record created");
        Ok(record.with_id(id))
      }
      None => Err(roster_core::Error::DuplicateKey(record.identity_key).into()),
    }
  }

  async fn get_by_id(&self, id: RecordId) -> Result<Option<Record>> {
    let record = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            "SELECT id, name, surname, identity_key FROM personnel WHERE id = ?1",
            rusqlite::params![id],
            row_to_record,
          )
          .optional()?)
      })
      .await?;
    Ok(record)
  }

  async fn get_all(&self) -> Result<Vec<Record>> {
    let records = self
      .conn
      .call(|conn| {
        let mut stmt = conn
          .prepare("SELECT id, name, surname, identity_key FROM personnel ORDER BY id")?;
        let rows = stmt
          .query_map([], row_to_record)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    Ok(records)
  }

  async fn put(&self, record: Record) -> Result<Record> {
    let row = record.clone();

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT OR REPLACE INTO personnel (id, name, surname, identity_key)
           VALUES (?1, ?2, ?3, ?4)",
          rusqlite::params![row.id, row.name, row.surname, row.identity_key],
        )?;
        Ok(())
      })
      .await?;

    Ok(record)
  }

  async fn delete_by_id(&self, id: RecordId) -> Result<()> {
    let removed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute("DELETE FROM personnel WHERE id = ?1", rusqlite::params![id])?)
      })
      .await?;

    if removed == 0 {
      return Err(roster_core::Error::NotFound(id).into());
    }
    tracing::debug!(id, "personnel record deleted");
    Ok(())
  }

  async fn delete_all(&self) -> Result<u64> {
    let removed = self
      .conn
      .call(|conn| Ok(conn.execute("DELETE FROM personnel", [])?))
      .await?;
    tracing::debug!(removed, "all personnel records deleted");
    Ok(removed as u64)
  }
}
