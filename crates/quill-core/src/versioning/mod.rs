//! Revision history for tracked entity types.
//!
//! Register a record type once at startup, install [`RevisionCapture`] on the
//! [`Database`](crate::db::Database), and every later update of that type
//! stores a [`Snapshot`] of the row as it was before the update. Creation
//! never produces a snapshot.
//!
//! ```ignore
//! let registry = Arc::new(RevisionRegistry::new());
//! registry.register_record::<Post>()?;
//! let db = Database::open(path)?.with_hook(Arc::new(RevisionCapture::new(registry)));
//!
//! let history = SnapshotStore::new(db.clone()).snapshots_for(&post);
//! for snapshot in &history {
//!     println!("{}", snapshot?.captured_at);
//! }
//! ```

mod capture;
mod registry;
mod snapshot;
mod store;

pub use capture::RevisionCapture;
pub use registry::RevisionRegistry;
pub use snapshot::Snapshot;
pub use store::{SnapshotIter, SnapshotQuery, SnapshotStore};

pub(crate) const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS revisions (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        entity_type TEXT NOT NULL,
        entity_id   INTEGER NOT NULL,
        captured_at TEXT NOT NULL,
        state       TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_revisions_entity_time
        ON revisions(entity_type, entity_id, captured_at DESC, id DESC);
"#;
