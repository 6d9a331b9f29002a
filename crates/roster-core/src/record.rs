//! Personnel records.

use serde::{Deserialize, Serialize};

/// Store-assigned record identifier.
pub type RecordId = i64;

/// A stored personnel record.
///
/// `id` is assigned by the authoritative store. Create requests coming from a
/// client carry no meaningful id, so it defaults to `0` when absent on the
/// wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
  #[serde(default)]
  pub id:           RecordId,
  pub name:         String,
  pub surname:      String,
  /// Globally unique identity field (SSN or equivalent).
  #[serde(alias = "ssn")]
  pub identity_key: String,
}

impl Record {
  /// Strip the id, producing the input for [`PersonnelStore::create`].
  ///
  /// [`PersonnelStore::create`]: crate::store::PersonnelStore::create
  pub fn into_new(self) -> NewRecord {
    NewRecord {
      name:         self.name,
      surname:      self.surname,
      identity_key: self.identity_key,
    }
  }
}

/// Input for creating a record; the store assigns the id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRecord {
  pub name:         String,
  pub surname:      String,
  pub identity_key: String,
}

impl NewRecord {
  pub fn new(
    name: impl Into<String>,
    surname: impl Into<String>,
    identity_key: impl Into<String>,
  ) -> Self {
    Self {
      name:         name.into(),
      surname:      surname.into(),
      identity_key: identity_key.into(),
    }
  }

  pub fn with_id(self, id: RecordId) -> Record {
    Record {
      id,
      name: self.name,
      surname: self.surname,
      identity_key: self.identity_key,
    }
  }
}

/// One record or a batch, as carried by a `Save` message.
///
/// The distinction is preserved on the wire: a single record serialises as a
/// JSON object, a batch as an array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Records {
  One(Record),
  Many(Vec<Record>),
}

impl Records {
  pub fn len(&self) -> usize {
    match self {
      Self::One(_) => 1,
      Self::Many(v) => v.len(),
    }
  }

  pub fn is_empty(&self) -> bool { self.len() == 0 }

  pub fn into_vec(self) -> Vec<Record> {
    match self {
      Self::One(r) => vec![r],
      Self::Many(v) => v,
    }
  }
}

impl From<Record> for Records {
  fn from(record: Record) -> Self { Self::One(record) }
}

impl From<Vec<Record>> for Records {
  fn from(records: Vec<Record>) -> Self { Self::Many(records) }
}
