//! Registry of entity types under revision tracking.

use std::collections::HashSet;
use std::sync::{PoisonError, RwLock};
use tracing::info;

use crate::db::{EntityType, Record};
use crate::error::{QuillError, QuillResult};

/// Set of entity types that opted into revisioning.
///
/// Constructed once at startup and shared by `Arc` with whatever installs the
/// capture hook. Registration is append-only for the registry's lifetime.
#[derive(Debug, Default)]
pub struct RevisionRegistry {
    tracked: RwLock<HashSet<EntityType>>,
}

impl RevisionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking revisions for `entity_type`.
    ///
    /// Registering the same type twice is a programming error and fails with
    /// [`QuillError::AlreadyRegistered`].
    pub fn register(&self, entity_type: EntityType) -> QuillResult<()> {
        let mut tracked = self
            .tracked
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if !tracked.insert(entity_type) {
            return Err(QuillError::already_registered(entity_type.as_str()));
        }
        info!(entity_type = %entity_type, "Registered entity type for revisions");
        Ok(())
    }

    /// Register a record type by its declared entity type.
    pub fn register_record<R: Record>(&self) -> QuillResult<()> {
        self.register(R::ENTITY_TYPE)
    }

    pub fn is_tracked(&self, entity_type: EntityType) -> bool {
        self.tracked
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&entity_type)
    }

    /// Tracked types in name order.
    pub fn tracked(&self) -> Vec<EntityType> {
        let mut types: Vec<EntityType> = self
            .tracked
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .copied()
            .collect();
        types.sort();
        types
    }
}
