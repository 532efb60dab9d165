//! Before-write hook that records a snapshot of the prior state.

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, error};

use super::registry::RevisionRegistry;
use super::snapshot::insert_snapshot;
use crate::db::{EntityType, PendingWrite, WriteHook};
use crate::error::{QuillError, QuillResult};

/// Captures a before-image of every update to a tracked entity type.
///
/// Installed on a [`Database`](crate::db::Database) with `with_hook`. The
/// snapshot is written on the write's own transaction, so a failed capture
/// aborts the write and a failed write discards the snapshot.
pub struct RevisionCapture {
    registry: Arc<RevisionRegistry>,
}

impl RevisionCapture {
    pub fn new(registry: Arc<RevisionRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<RevisionRegistry> {
        &self.registry
    }
}

impl WriteHook for RevisionCapture {
    fn applies_to(&self, entity_type: EntityType) -> bool {
        self.registry.is_tracked(entity_type)
    }

    fn before_write(&self, write: &PendingWrite<'_>) -> QuillResult<()> {
        let entity_type = write.entity_type();
        if !self.registry.is_tracked(entity_type) {
            error!(
                entity_type = %entity_type,
                "Revision capture invoked for an untracked entity type"
            );
            return Err(QuillError::Internal(format!(
                "revision capture invoked for untracked entity type '{}'",
                entity_type
            )));
        }

        // Creation: nothing persisted yet, so there is no before-image.
        let Some(entity_id) = write.entity_id() else {
            return Ok(());
        };
        let state = match write.current_state() {
            Ok(Some(state)) => state,
            Ok(None) => return Ok(()),
            Err(e) => {
                error!(
                    entity_type = %entity_type,
                    entity_id,
                    error = %e,
                    "Failed to read before-image, aborting write"
                );
                return Err(e);
            }
        };

        let snapshot = insert_snapshot(
            write.connection(),
            entity_type,
            entity_id,
            Utc::now(),
            &state,
        )?;
        debug!(
            entity_type = %entity_type,
            entity_id,
            snapshot_id = snapshot.id,
            "Captured revision"
        );
        Ok(())
    }
}
