//! Record mapping and the before-write extension point.

use rusqlite::Connection;
use serde::Serialize;
use std::fmt;

use crate::error::QuillResult;

/// Identifier of a persisted record type, e.g. `"blog.post"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct EntityType(&'static str);

impl EntityType {
    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    pub fn as_str(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// A record type stored in its own table.
///
/// Implementations own their SQL. `Database::save` drives the write so that
/// installed [`WriteHook`]s always run inside the same transaction.
pub trait Record: Serialize + Sized {
    /// Type identifier used for hook dispatch and revision keys.
    const ENTITY_TYPE: EntityType;

    /// Primary key, `None` until first saved.
    fn id(&self) -> Option<i64>;

    /// Called after a successful save with the row's primary key.
    fn set_id(&mut self, id: i64);

    /// Load the persisted row, `Ok(None)` when no row has this id.
    fn load(conn: &Connection, id: i64) -> QuillResult<Option<Self>>;

    /// Insert the record, returning the new primary key.
    ///
    /// A `None` id lets SQLite assign one.
    fn insert(&self, conn: &Connection) -> QuillResult<i64>;

    /// Update the existing row, returning the number of rows changed.
    fn update(&self, conn: &Connection) -> QuillResult<usize>;
}

/// Reads the currently persisted state of a record as JSON.
pub(crate) type StateReader<'a> =
    &'a dyn Fn(&Connection, i64) -> QuillResult<Option<serde_json::Value>>;

/// A write that is about to be applied.
///
/// Handed to every applicable [`WriteHook`] before the row is touched. The
/// connection is the open write transaction.
pub struct PendingWrite<'a> {
    conn: &'a Connection,
    entity_type: EntityType,
    entity_id: Option<i64>,
    reader: StateReader<'a>,
}

impl<'a> PendingWrite<'a> {
    pub(crate) fn new(
        conn: &'a Connection,
        entity_type: EntityType,
        entity_id: Option<i64>,
        reader: StateReader<'a>,
    ) -> Self {
        Self {
            conn,
            entity_type,
            entity_id,
            reader,
        }
    }

    /// Connection bound to the write transaction.
    pub fn connection(&self) -> &Connection {
        self.conn
    }

    pub fn entity_type(&self) -> EntityType {
        self.entity_type
    }

    pub fn entity_id(&self) -> Option<i64> {
        self.entity_id
    }

    /// Read the state currently persisted for this record.
    ///
    /// This is a fresh read from storage, not the caller's pending values.
    /// `Ok(None)` means the record has never been written.
    pub fn current_state(&self) -> QuillResult<Option<serde_json::Value>> {
        match self.entity_id {
            Some(id) => (self.reader)(self.conn, id),
            None => Ok(None),
        }
    }
}

/// Extension point invoked before a record write is applied.
///
/// Returning an error aborts the write and rolls back the transaction.
pub trait WriteHook: Send + Sync {
    /// Whether this hook wants writes of `entity_type`.
    fn applies_to(&self, entity_type: EntityType) -> bool;

    /// Run before the write lands.
    fn before_write(&self, write: &PendingWrite<'_>) -> QuillResult<()>;
}
