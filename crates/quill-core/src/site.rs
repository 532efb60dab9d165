//! Application wiring: one handle over the database, revision tracking,
//! posts and comments.

use std::sync::Arc;
use tracing::info;

use crate::blog::{Post, PostStore};
use crate::comments::CommentService;
use crate::config::QuillConfig;
use crate::db::Database;
use crate::error::QuillResult;
use crate::mail::{create_mailer, Mailer};
use crate::versioning::{RevisionCapture, RevisionRegistry, SnapshotStore};

/// A ready-to-use blog backend.
///
/// Posts are registered for revision tracking at construction, so every
/// update made through [`Site::posts`] records the post's previous state.
#[derive(Clone)]
pub struct Site {
    db: Database,
    registry: Arc<RevisionRegistry>,
    posts: PostStore,
    comments: CommentService,
    snapshots: SnapshotStore,
}

impl Site {
    /// Open the configured database and mailer.
    pub fn open(config: &QuillConfig) -> QuillResult<Self> {
        let db = Database::open(&config.database_path)?;
        let mailer = create_mailer(&config.mail)?;
        Self::with_parts(db, mailer, config)
    }

    /// Build a site over an existing database and mailer.
    ///
    /// `db` must not already carry a revision capture hook.
    pub fn with_parts(
        db: Database,
        mailer: Arc<dyn Mailer>,
        config: &QuillConfig,
    ) -> QuillResult<Self> {
        let registry = Arc::new(RevisionRegistry::new());
        registry.register_record::<Post>()?;
        let db = db.with_hook(Arc::new(RevisionCapture::new(registry.clone())));

        let tracked: Vec<String> = registry.tracked().iter().map(|t| t.to_string()).collect();
        info!(tracked = ?tracked, "Revision tracking enabled");

        Ok(Self {
            posts: PostStore::new(db.clone()),
            comments: CommentService::new(
                db.clone(),
                mailer,
                config.site.clone(),
                &config.mail,
            ),
            snapshots: SnapshotStore::new(db.clone()),
            registry,
            db,
        })
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn registry(&self) -> &Arc<RevisionRegistry> {
        &self.registry
    }

    pub fn posts(&self) -> &PostStore {
        &self.posts
    }

    pub fn comments(&self) -> &CommentService {
        &self.comments
    }

    pub fn snapshots(&self) -> &SnapshotStore {
        &self.snapshots
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Record;
    use crate::mail::LogMailer;

    #[test]
    fn test_posts_are_tracked() {
        let config = QuillConfig::builder().database_path(":memory:").build();
        let site = Site::open(&config).unwrap();
        assert!(site.registry().is_tracked(Post::ENTITY_TYPE));

        let mut post = site.posts().create(Post::new("One", "body")).unwrap();
        post.title = "Two".to_string();
        site.posts().update(&mut post).unwrap();

        assert_eq!(site.posts().history(&post).count().unwrap(), 1);
        assert_eq!(site.snapshots().count_all().unwrap(), 1);
    }

    #[test]
    fn test_with_parts_uses_given_database() {
        let db = Database::in_memory().unwrap();
        let site = Site::with_parts(db, Arc::new(LogMailer), &QuillConfig::default()).unwrap();
        site.posts().create(Post::new("Kept", "body")).unwrap();
        assert!(site.posts().get_by_slug("kept").unwrap().is_some());
    }
}
