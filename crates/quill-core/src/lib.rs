//! quill-core - Core library for quill.
//!
//! Blog posts with tags, reader comments with email notifications, and a
//! revisioning layer that snapshots the previous state of a tracked record
//! before every update.
//!
//! # Example
//!
//! ```ignore
//! use quill_core::{Post, QuillConfig, Site};
//!
//! let site = Site::open(&QuillConfig::from_env()?)?;
//! let mut post = site.posts().create(Post::new("Hello", "First post"))?;
//!
//! post.title = "Hello, world".to_string();
//! site.posts().update(&mut post)?;
//!
//! // The title as it was before the update
//! let previous = site.posts().history(&post).latest()?;
//! ```

pub mod blog;
pub mod comments;
pub mod config;
pub mod db;
pub mod error;
pub mod mail;
pub mod site;
pub mod versioning;

// Re-export commonly used types
pub use blog::{Archive, MarkupType, Post, PostStore};
pub use comments::{
    AcceptedComment, Comment, CommentForm, CommentService, NotificationRecipient,
    NotificationReport, Submission,
};
pub use config::{MailConfig, QuillConfig, SiteConfig, SmtpConfig};
pub use db::{Database, EntityType, PendingWrite, Record, WriteHook};
pub use error::{ErrorCode, QuillError, QuillResult};
pub use mail::{create_mailer, LogMailer, Mail, Mailer, SmtpMailer};
pub use site::Site;
pub use versioning::{RevisionCapture, RevisionRegistry, Snapshot, SnapshotQuery, SnapshotStore};
