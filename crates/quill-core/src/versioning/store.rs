//! Read side of revision history.

use rusqlite::params;
use std::collections::VecDeque;

use super::snapshot::Snapshot;
use crate::db::{encode_timestamp, Database, EntityType, Record};
use crate::error::QuillResult;

/// Default number of rows fetched per page while iterating.
const DEFAULT_PAGE_SIZE: usize = 50;

/// Query access to captured snapshots.
#[derive(Clone)]
pub struct SnapshotStore {
    db: Database,
}

impl SnapshotStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Snapshots of `record`, newest first.
    ///
    /// A record that was never saved has no history and yields nothing.
    pub fn snapshots_for<R: Record>(&self, record: &R) -> SnapshotQuery {
        SnapshotQuery {
            db: self.db.clone(),
            key: record.id().map(|id| (R::ENTITY_TYPE, id)),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Snapshots for an explicit (type, id) key, newest first.
    pub fn snapshots_for_key(&self, entity_type: EntityType, entity_id: i64) -> SnapshotQuery {
        SnapshotQuery {
            db: self.db.clone(),
            key: Some((entity_type, entity_id)),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Total snapshots across all entities.
    pub fn count_all(&self) -> QuillResult<usize> {
        self.db.read(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM revisions", [], |row| row.get(0))?;
            Ok(count as usize)
        })
    }
}

/// Lazy description of one entity's history.
///
/// Nothing is read until iteration starts. Every call to [`iter`](Self::iter)
/// starts again from the newest snapshot, so the query can be replayed.
#[derive(Clone)]
pub struct SnapshotQuery {
    db: Database,
    key: Option<(EntityType, i64)>,
    page_size: usize,
}

impl SnapshotQuery {
    /// Rows fetched per round trip. Clamped to at least one.
    pub fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn iter(&self) -> SnapshotIter {
        SnapshotIter {
            db: self.db.clone(),
            key: self.key,
            page_size: self.page_size,
            buffer: VecDeque::new(),
            cursor: None,
            exhausted: self.key.is_none(),
        }
    }

    pub fn fetch_all(&self) -> QuillResult<Vec<Snapshot>> {
        self.iter().collect()
    }

    /// Most recent snapshot, if any.
    pub fn latest(&self) -> QuillResult<Option<Snapshot>> {
        self.iter().next().transpose()
    }

    pub fn count(&self) -> QuillResult<usize> {
        let Some((entity_type, entity_id)) = self.key else {
            return Ok(0);
        };
        self.db.read(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM revisions WHERE entity_type = ?1 AND entity_id = ?2",
                params![entity_type.as_str(), entity_id],
                |row| row.get(0),
            )?;
            Ok(count as usize)
        })
    }
}

impl<'a> IntoIterator for &'a SnapshotQuery {
    type Item = QuillResult<Snapshot>;
    type IntoIter = SnapshotIter;

    fn into_iter(self) -> SnapshotIter {
        self.iter()
    }
}

/// Page-at-a-time iterator over a [`SnapshotQuery`].
///
/// Uses keyset pagination on `(captured_at, id)` so the connection lock is
/// only held while a page is read.
pub struct SnapshotIter {
    db: Database,
    key: Option<(EntityType, i64)>,
    page_size: usize,
    buffer: VecDeque<Snapshot>,
    cursor: Option<(String, i64)>,
    exhausted: bool,
}

impl SnapshotIter {
    fn fetch_page(&self) -> QuillResult<Vec<Snapshot>> {
        let Some((entity_type, entity_id)) = self.key else {
            return Ok(Vec::new());
        };
        let limit = self.page_size as i64;

        self.db.read(|conn| {
            let rows = match &self.cursor {
                None => {
                    let mut stmt = conn.prepare(&format!(
                        r#"SELECT {} FROM revisions
                           WHERE entity_type = ?1 AND entity_id = ?2
                           ORDER BY captured_at DESC, id DESC
                           LIMIT ?3"#,
                        Snapshot::COLUMNS
                    ))?;
                    let mapped = stmt.query_map(
                        params![entity_type.as_str(), entity_id, limit],
                        |row| Ok(Snapshot::from_row(row)),
                    )?;
                    mapped
                        .map(|r| r.map_err(Into::into).and_then(|inner| inner))
                        .collect::<QuillResult<Vec<_>>>()?
                }
                Some((captured_at, last_id)) => {
                    let mut stmt = conn.prepare(&format!(
                        r#"SELECT {} FROM revisions
                           WHERE entity_type = ?1 AND entity_id = ?2
                             AND (captured_at < ?3 OR (captured_at = ?3 AND id < ?4))
                           ORDER BY captured_at DESC, id DESC
                           LIMIT ?5"#,
                        Snapshot::COLUMNS
                    ))?;
                    let mapped = stmt.query_map(
                        params![entity_type.as_str(), entity_id, captured_at, last_id, limit],
                        |row| Ok(Snapshot::from_row(row)),
                    )?;
                    mapped
                        .map(|r| r.map_err(Into::into).and_then(|inner| inner))
                        .collect::<QuillResult<Vec<_>>>()?
                }
            };
            Ok(rows)
        })
    }
}

impl Iterator for SnapshotIter {
    type Item = QuillResult<Snapshot>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffer.is_empty() && !self.exhausted {
            match self.fetch_page() {
                Ok(page) => {
                    if page.len() < self.page_size {
                        self.exhausted = true;
                    }
                    if let Some(last) = page.last() {
                        self.cursor = Some((encode_timestamp(&last.captured_at), last.id));
                    }
                    self.buffer.extend(page);
                }
                Err(e) => {
                    self.exhausted = true;
                    return Some(Err(e));
                }
            }
        }
        self.buffer.pop_front().map(Ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::versioning::snapshot::insert_snapshot;
    use chrono::{Duration, Utc};
    use serde_json::json;

    const POST: EntityType = EntityType::new("blog.post");
    const PAGE: EntityType = EntityType::new("pages.page");

    fn seed(db: &Database, entity_type: EntityType, entity_id: i64, count: i64) {
        let base = Utc::now() - Duration::hours(count);
        db.transaction(|tx| {
            for i in 0..count {
                insert_snapshot(
                    tx,
                    entity_type,
                    entity_id,
                    base + Duration::minutes(i),
                    &json!({ "revision": i }),
                )?;
            }
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_newest_first_across_pages() {
        let db = Database::in_memory().unwrap();
        seed(&db, POST, 1, 7);
        let store = SnapshotStore::new(db);

        let all = store
            .snapshots_for_key(POST, 1)
            .page_size(3)
            .fetch_all()
            .unwrap();
        let revisions: Vec<i64> = all
            .iter()
            .map(|s| s.field::<i64>("revision").unwrap().unwrap())
            .collect();
        assert_eq!(revisions, vec![6, 5, 4, 3, 2, 1, 0]);
    }

    #[test]
    fn test_query_is_restartable() {
        let db = Database::in_memory().unwrap();
        seed(&db, POST, 1, 2);
        let store = SnapshotStore::new(db.clone());
        let query = store.snapshots_for_key(POST, 1);

        assert_eq!(query.iter().count(), 2);

        // Rows added after the first pass show up in the next one.
        seed(&db, POST, 1, 1);
        assert_eq!(query.iter().count(), 3);
        assert_eq!(query.count().unwrap(), 3);
    }

    #[test]
    fn test_filters_by_type_and_id() {
        let db = Database::in_memory().unwrap();
        seed(&db, POST, 1, 2);
        seed(&db, POST, 2, 3);
        seed(&db, PAGE, 1, 4);
        let store = SnapshotStore::new(db);

        assert_eq!(store.snapshots_for_key(POST, 1).count().unwrap(), 2);
        assert_eq!(store.snapshots_for_key(POST, 2).fetch_all().unwrap().len(), 3);
        assert_eq!(store.snapshots_for_key(PAGE, 1).iter().count(), 4);
        assert!(store.snapshots_for_key(PAGE, 2).latest().unwrap().is_none());
        assert_eq!(store.count_all().unwrap(), 9);
    }

    #[test]
    fn test_same_timestamp_ties_break_by_id() {
        let db = Database::in_memory().unwrap();
        let at = Utc::now();
        db.transaction(|tx| {
            insert_snapshot(tx, POST, 1, at, &json!({"n": 1}))?;
            insert_snapshot(tx, POST, 1, at, &json!({"n": 2}))?;
            insert_snapshot(tx, POST, 1, at, &json!({"n": 3}))?;
            Ok(())
        })
        .unwrap();

        let store = SnapshotStore::new(db);
        let order: Vec<i64> = store
            .snapshots_for_key(POST, 1)
            .page_size(1)
            .iter()
            .map(|s| s.unwrap().field::<i64>("n").unwrap().unwrap())
            .collect();
        assert_eq!(order, vec![3, 2, 1]);
    }
}
