//! Reader comments and the notification fan-out that follows a submission.

mod comment;
mod service;

pub use comment::{Comment, CommentForm, NotificationRecipient};
pub use service::{AcceptedComment, CommentService, NotificationReport, Submission};

pub(crate) const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS comments (
        id           INTEGER PRIMARY KEY AUTOINCREMENT,
        post_id      INTEGER NOT NULL REFERENCES posts(id) ON DELETE CASCADE,
        name         TEXT NOT NULL,
        email        TEXT NOT NULL,
        url          TEXT,
        body         TEXT NOT NULL,
        submitted_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_comments_post
        ON comments(post_id, submitted_at);

    CREATE TABLE IF NOT EXISTS notification_recipients (
        id            INTEGER PRIMARY KEY AUTOINCREMENT,
        post_id       INTEGER NOT NULL REFERENCES posts(id) ON DELETE CASCADE,
        comment_id    INTEGER REFERENCES comments(id) ON DELETE SET NULL,
        email_address TEXT NOT NULL,
        wants_email   INTEGER NOT NULL DEFAULT 1,
        token         TEXT NOT NULL UNIQUE
    );

    CREATE INDEX IF NOT EXISTS idx_notification_recipients_post
        ON notification_recipients(post_id, wants_email);
"#;
