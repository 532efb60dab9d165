//! Snapshot records: the before-image of a tracked entity.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};

use crate::db::{decode_timestamp, encode_timestamp, EntityType};
use crate::error::{QuillError, QuillResult};

/// State of a tracked entity as it was persisted just before an update.
///
/// Snapshots are immutable; they are only ever inserted and read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Storage key, increasing in capture order.
    pub id: i64,
    /// Type of the entity this snapshot belongs to.
    pub entity_type: String,
    /// Primary key of the entity.
    pub entity_id: i64,
    /// When the before-image was captured.
    pub captured_at: DateTime<Utc>,
    /// The persisted state prior to the write.
    pub state: serde_json::Value,
}

impl Snapshot {
    /// Decode one field of the before-image.
    pub fn field<T: serde::de::DeserializeOwned>(&self, name: &str) -> QuillResult<Option<T>> {
        self.state
            .get(name)
            .cloned()
            .map(serde_json::from_value)
            .transpose()
            .map_err(QuillError::from)
    }

    pub(crate) const COLUMNS: &'static str = "id, entity_type, entity_id, captured_at, state";

    pub(crate) fn from_row(row: &rusqlite::Row<'_>) -> QuillResult<Self> {
        let captured_at: String = row.get(3)?;
        let state: String = row.get(4)?;
        Ok(Self {
            id: row.get(0)?,
            entity_type: row.get(1)?,
            entity_id: row.get(2)?,
            captured_at: decode_timestamp(&captured_at)?,
            state: serde_json::from_str(&state)?,
        })
    }
}

/// Insert a snapshot row on `conn`, normally the open write transaction.
pub(crate) fn insert_snapshot(
    conn: &Connection,
    entity_type: EntityType,
    entity_id: i64,
    captured_at: DateTime<Utc>,
    state: &serde_json::Value,
) -> QuillResult<Snapshot> {
    conn.execute(
        r#"INSERT INTO revisions (entity_type, entity_id, captured_at, state)
           VALUES (?1, ?2, ?3, ?4)"#,
        params![
            entity_type.as_str(),
            entity_id,
            encode_timestamp(&captured_at),
            serde_json::to_string(state)?,
        ],
    )?;

    Ok(Snapshot {
        id: conn.last_insert_rowid(),
        entity_type: entity_type.as_str().to_string(),
        entity_id,
        captured_at,
        state: state.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_field_access() {
        let snapshot = Snapshot {
            id: 1,
            entity_type: "blog.post".to_string(),
            entity_id: 7,
            captured_at: Utc::now(),
            state: json!({"title": "A", "active": true}),
        };

        assert_eq!(snapshot.field::<String>("title").unwrap(), Some("A".to_string()));
        assert_eq!(snapshot.field::<bool>("active").unwrap(), Some(true));
        assert_eq!(snapshot.field::<String>("missing").unwrap(), None);
        assert!(snapshot.field::<i64>("title").is_err());
    }
}
