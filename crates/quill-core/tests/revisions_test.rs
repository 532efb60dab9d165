//! Integration tests for post revision history.
//!
//! Exercises registration, capture on update and snapshot queries through the
//! public API, including rollback when capture hits a storage fault.

use quill_core::{
    Database, ErrorCode, LogMailer, Post, QuillConfig, QuillError, Record, RevisionCapture,
    RevisionRegistry, Site, SnapshotStore,
};
use rusqlite::params;
use std::sync::Arc;

fn site() -> Site {
    let db = Database::in_memory().unwrap();
    Site::with_parts(db, Arc::new(LogMailer), &QuillConfig::default()).unwrap()
}

fn stored_title(site: &Site, id: i64) -> String {
    site.database()
        .read(|conn| {
            Ok(conn.query_row("SELECT title FROM posts WHERE id = ?1", params![id], |row| {
                row.get(0)
            })?)
        })
        .unwrap()
}

/// Register, create "A", update to "B", then "C": two snapshots, newest holds "B".
#[test]
fn test_title_history_scenario() {
    let site = site();
    let posts = site.posts();

    let mut post = posts.create(Post::new("A", "body").active(true)).unwrap();
    post.title = "B".to_string();
    posts.update(&mut post).unwrap();
    post.title = "C".to_string();
    posts.update(&mut post).unwrap();

    let history = posts.history(&post).fetch_all().unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].field::<String>("title").unwrap().as_deref(), Some("B"));
    assert_eq!(history[1].field::<String>("title").unwrap().as_deref(), Some("A"));
    assert!(history.iter().all(|s| s.entity_id == post.id.unwrap()));
    assert!(history.iter().all(|s| s.entity_type == "blog.post"));
}

#[test]
fn test_creation_produces_no_snapshot() {
    let site = site();
    let post = site.posts().create(Post::new("Fresh", "body")).unwrap();

    assert_eq!(site.posts().history(&post).count().unwrap(), 0);
    assert!(site.posts().history(&post).latest().unwrap().is_none());
    assert_eq!(site.snapshots().count_all().unwrap(), 0);
}

#[test]
fn test_n_updates_give_n_snapshots_newest_first() {
    let site = site();
    let posts = site.posts();
    let mut post = posts.create(Post::new("Draft 0", "body")).unwrap();

    for n in 1..=7 {
        post.title = format!("Draft {}", n);
        posts.update(&mut post).unwrap();
    }

    let history = posts.history(&post).page_size(3).fetch_all().unwrap();
    assert_eq!(history.len(), 7);
    for pair in history.windows(2) {
        assert!(pair[0].captured_at >= pair[1].captured_at);
        assert!(pair[0].id > pair[1].id);
    }
    assert_eq!(
        history[0].field::<String>("title").unwrap().as_deref(),
        Some("Draft 6")
    );
}

#[test]
fn test_history_is_per_post() {
    let site = site();
    let posts = site.posts();
    let mut first = posts.create(Post::new("First", "body")).unwrap();
    let mut second = posts.create(Post::new("Second", "body")).unwrap();

    first.body = "edited".to_string();
    posts.update(&mut first).unwrap();
    second.body = "edited".to_string();
    posts.update(&mut second).unwrap();
    second.body = "edited again".to_string();
    posts.update(&mut second).unwrap();

    assert_eq!(posts.history(&first).count().unwrap(), 1);
    assert_eq!(posts.history(&second).count().unwrap(), 2);
    assert_eq!(
        posts.history(&second).latest().unwrap().unwrap().field::<String>("body").unwrap().as_deref(),
        Some("edited")
    );
}

#[test]
fn test_duplicate_registration_fails() {
    let registry = RevisionRegistry::new();
    registry.register_record::<Post>().unwrap();

    let err = registry.register_record::<Post>().unwrap_err();
    assert!(matches!(err, QuillError::AlreadyRegistered { .. }));
    assert_eq!(err.code(), ErrorCode::RevAlreadyRegistered);
    assert_eq!(registry.tracked(), vec![Post::ENTITY_TYPE]);
}

#[test]
fn test_untracked_database_keeps_no_history() {
    let registry = Arc::new(RevisionRegistry::new());
    let db = Database::in_memory()
        .unwrap()
        .with_hook(Arc::new(RevisionCapture::new(registry)));

    let mut post = Post::new("Plain", "body");
    db.save(&mut post).unwrap();
    post.title = "Still plain".to_string();
    db.save(&mut post).unwrap();

    assert_eq!(SnapshotStore::new(db).snapshots_for(&post).count().unwrap(), 0);
}

#[test]
fn test_unreadable_before_image_rolls_back_update() {
    let site = site();
    let post = site.posts().create(Post::new("Original", "body")).unwrap();
    let id = post.id.unwrap();

    site.database()
        .transaction(|tx| {
            Ok(tx.execute(
                "UPDATE posts SET create_date = 'garbage' WHERE id = ?1",
                params![id],
            )?)
        })
        .unwrap();

    let mut changed = post.clone();
    changed.title = "Changed".to_string();
    let err = site.database().save(&mut changed).unwrap_err();

    assert!(matches!(err, QuillError::Parse { .. }));
    assert_eq!(stored_title(&site, id), "Original");
    assert_eq!(site.snapshots().count_all().unwrap(), 0);
}

#[test]
fn test_failed_snapshot_write_rolls_back_update() {
    let site = site();
    let mut post = site.posts().create(Post::new("Original", "body")).unwrap();
    let id = post.id.unwrap();

    site.database()
        .transaction(|tx| Ok(tx.execute_batch("DROP TABLE revisions")?))
        .unwrap();

    post.title = "Changed".to_string();
    assert!(site.posts().update(&mut post).is_err());
    assert_eq!(stored_title(&site, id), "Original");
}

#[test]
fn test_history_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let config = QuillConfig::builder()
        .database_path(dir.path().join("blog.db"))
        .build();

    let id = {
        let site = Site::open(&config).unwrap();
        let mut post = site.posts().create(Post::new("Before", "body")).unwrap();
        post.title = "After".to_string();
        site.posts().update(&mut post).unwrap();
        post.id.unwrap()
    };

    let site = Site::open(&config).unwrap();
    let post = site.posts().get(id).unwrap().unwrap();
    assert_eq!(post.title, "After");
    let latest = site.posts().history(&post).latest().unwrap().unwrap();
    assert_eq!(latest.field::<String>("title").unwrap().as_deref(), Some("Before"));
}
