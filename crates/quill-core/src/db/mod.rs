//! SQLite persistence layer.
//!
//! A [`Database`] owns one connection behind a mutex. Every record write goes
//! through [`Database::save`], which runs as a single transaction:
//!
//! 1. installed [`WriteHook`]s that apply to the record's type run first and
//!    may read the currently persisted row,
//! 2. the new state is written (UPDATE, falling back to INSERT),
//! 3. the transaction commits.
//!
//! A failure at any step rolls the whole unit back.

mod record;

pub use record::{EntityType, PendingWrite, Record, WriteHook};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, Transaction};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

use crate::error::{QuillError, QuillResult};

/// Shared handle to the application database.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
    hooks: Arc<Vec<Arc<dyn WriteHook>>>,
}

impl Database {
    /// Open (or create) the database at `path`.
    ///
    /// `":memory:"` opens a private in-memory database.
    pub fn open(path: impl AsRef<Path>) -> QuillResult<Self> {
        let path = path.as_ref();
        let conn = if path.to_str() == Some(":memory:") {
            Connection::open_in_memory()?
        } else {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            Connection::open(path)?
        };
        debug!(path = %path.display(), "Opened database");
        Self::from_connection(conn)
    }

    /// Create an in-memory database (for testing).
    pub fn in_memory() -> QuillResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> QuillResult<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(crate::blog::SCHEMA)?;
        conn.execute_batch(crate::comments::SCHEMA)?;
        conn.execute_batch(crate::versioning::SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            hooks: Arc::new(Vec::new()),
        })
    }

    /// Install a before-write hook.
    pub fn with_hook(mut self, hook: Arc<dyn WriteHook>) -> Self {
        Arc::make_mut(&mut self.hooks).push(hook);
        self
    }

    fn lock(&self) -> QuillResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| QuillError::database("connection lock poisoned"))
    }

    /// Run a read against the connection.
    pub fn read<T>(&self, f: impl FnOnce(&Connection) -> QuillResult<T>) -> QuillResult<T> {
        let conn = self.lock()?;
        f(&conn)
    }

    /// Run `f` inside a transaction, committing only if it succeeds.
    pub fn transaction<T>(
        &self,
        f: impl FnOnce(&Transaction<'_>) -> QuillResult<T>,
    ) -> QuillResult<T> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }

    /// Load a record by primary key.
    pub fn get<R: Record>(&self, id: i64) -> QuillResult<Option<R>> {
        self.read(|conn| R::load(conn, id))
    }

    /// Persist `record`, running applicable hooks first in the same transaction.
    ///
    /// Records with an id are updated; when no row has that id the record is
    /// inserted with it. Returns the record's id, which is also stored back
    /// into `record`.
    pub fn save<R: Record>(&self, record: &mut R) -> QuillResult<i64> {
        self.transaction(|tx| self.save_in(tx, record))
    }

    /// Like [`save`](Self::save), but as one step of a larger transaction.
    ///
    /// Nothing is committed until the caller's transaction is.
    pub fn save_in<R: Record>(&self, tx: &Transaction<'_>, record: &mut R) -> QuillResult<i64> {
        let entity_type = R::ENTITY_TYPE;
        let hooks: Vec<&Arc<dyn WriteHook>> = self
            .hooks
            .iter()
            .filter(|hook| hook.applies_to(entity_type))
            .collect();

        let current = |conn: &Connection, id: i64| load_state::<R>(conn, id);
        let pending = PendingWrite::new(tx, entity_type, record.id(), &current);
        for hook in &hooks {
            hook.before_write(&pending)?;
        }

        let id = match record.id() {
            Some(id) if record.update(tx)? > 0 => id,
            _ => record.insert(tx)?,
        };

        record.set_id(id);
        debug!(entity_type = %entity_type, id, hooks = hooks.len(), "Saved record");
        Ok(id)
    }
}

fn load_state<R: Record>(conn: &Connection, id: i64) -> QuillResult<Option<serde_json::Value>> {
    R::load(conn, id)?
        .map(|record| serde_json::to_value(&record))
        .transpose()
        .map_err(QuillError::from)
}

/// Fixed-width RFC 3339 encoding so stored timestamps sort lexically.
pub(crate) fn encode_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn decode_timestamp(raw: &str) -> QuillResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| QuillError::timestamp(format!("invalid timestamp '{}': {}", raw, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::{params, OptionalExtension};
    use serde::Serialize;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const NOTE: EntityType = EntityType::new("test.note");

    #[derive(Debug, Clone, Serialize)]
    struct Note {
        id: Option<i64>,
        text: String,
    }

    impl Record for Note {
        const ENTITY_TYPE: EntityType = NOTE;

        fn id(&self) -> Option<i64> {
            self.id
        }

        fn set_id(&mut self, id: i64) {
            self.id = Some(id);
        }

        fn load(conn: &Connection, id: i64) -> QuillResult<Option<Self>> {
            Ok(conn
                .query_row("SELECT id, text FROM notes WHERE id = ?1", [id], |row| {
                    Ok(Note {
                        id: row.get(0)?,
                        text: row.get(1)?,
                    })
                })
                .optional()?)
        }

        fn insert(&self, conn: &Connection) -> QuillResult<i64> {
            conn.execute(
                "INSERT INTO notes (id, text) VALUES (?1, ?2)",
                params![self.id, self.text],
            )?;
            Ok(conn.last_insert_rowid())
        }

        fn update(&self, conn: &Connection) -> QuillResult<usize> {
            Ok(conn.execute(
                "UPDATE notes SET text = ?2 WHERE id = ?1",
                params![self.id, self.text],
            )?)
        }
    }

    #[derive(Default)]
    struct CountingHook {
        calls: AtomicUsize,
        with_state: AtomicUsize,
        fail: bool,
    }

    impl WriteHook for CountingHook {
        fn applies_to(&self, entity_type: EntityType) -> bool {
            entity_type == NOTE
        }

        fn before_write(&self, write: &PendingWrite<'_>) -> QuillResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if write.current_state()?.is_some() {
                self.with_state.fetch_add(1, Ordering::SeqCst);
            }
            if self.fail {
                return Err(QuillError::Internal("hook refused".to_string()));
            }
            Ok(())
        }
    }

    fn note_db(hook: Arc<CountingHook>) -> Database {
        let db = Database::in_memory().unwrap().with_hook(hook);
        db.read(|conn| {
            conn.execute_batch("CREATE TABLE notes (id INTEGER PRIMARY KEY, text TEXT NOT NULL)")?;
            Ok(())
        })
        .unwrap();
        db
    }

    #[test]
    fn test_save_inserts_then_updates() {
        let hook = Arc::new(CountingHook::default());
        let db = note_db(hook.clone());

        let mut note = Note {
            id: None,
            text: "first".to_string(),
        };
        let id = db.save(&mut note).unwrap();
        assert_eq!(note.id, Some(id));

        note.text = "second".to_string();
        assert_eq!(db.save(&mut note).unwrap(), id);

        let stored: Note = db.get(id).unwrap().unwrap();
        assert_eq!(stored.text, "second");
        assert_eq!(hook.calls.load(Ordering::SeqCst), 2);
        assert_eq!(hook.with_state.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_save_with_unknown_id_inserts() {
        let hook = Arc::new(CountingHook::default());
        let db = note_db(hook.clone());

        let mut note = Note {
            id: Some(77),
            text: "explicit".to_string(),
        };
        assert_eq!(db.save(&mut note).unwrap(), 77);
        assert!(db.get::<Note>(77).unwrap().is_some());
        assert_eq!(hook.with_state.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_hook_failure_rolls_back_write() {
        let hook = Arc::new(CountingHook {
            fail: true,
            ..Default::default()
        });
        let db = note_db(hook);

        let mut note = Note {
            id: None,
            text: "never".to_string(),
        };
        assert!(db.save(&mut note).is_err());
        assert!(note.id.is_none());

        let count: i64 = db
            .read(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM notes", [], |r| r.get(0))?))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_save_in_commits_with_the_transaction() {
        let hook = Arc::new(CountingHook::default());
        let db = note_db(hook.clone());

        let mut kept = Note {
            id: None,
            text: "kept".to_string(),
        };
        let result: QuillResult<()> = db.transaction(|tx| {
            db.save_in(tx, &mut kept)?;
            tx.execute_batch("INSERT INTO missing_table VALUES (1)")?;
            Ok(())
        });
        assert!(result.is_err());
        assert_eq!(hook.calls.load(Ordering::SeqCst), 1);

        let count: i64 = db
            .read(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM notes", [], |r| r.get(0))?))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_timestamps_sort_lexically() {
        let early = Utc::now();
        let late = early + chrono::Duration::milliseconds(5);
        assert!(encode_timestamp(&early) < encode_timestamp(&late));
        assert_eq!(encode_timestamp(&early).len(), encode_timestamp(&late).len());

        let decoded = decode_timestamp(&encode_timestamp(&early)).unwrap();
        assert!((early - decoded).num_microseconds().unwrap().abs() < 1);
        assert!(decode_timestamp("yesterday").is_err());
    }

    #[test]
    fn test_open_file_database_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("quill.db");
        Database::open(&path).unwrap();
        assert!(path.exists());
    }
}
