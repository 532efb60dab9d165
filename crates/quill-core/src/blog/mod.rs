//! Blog posts and their listing queries.

mod markup;
mod post;
mod store;

pub use markup::rst_to_html;
pub use post::{parse_month, slugify, MarkupType, Post, TITLE_MAX_LEN};
pub use store::{Archive, PostStore};

pub(crate) const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS posts (
        id              INTEGER PRIMARY KEY AUTOINCREMENT,
        title           TEXT NOT NULL,
        slug            TEXT NOT NULL UNIQUE,
        body            TEXT NOT NULL,
        markup_type     TEXT NOT NULL DEFAULT 'html',
        active          INTEGER NOT NULL DEFAULT 0,
        create_date     TEXT NOT NULL,
        pub_date        TEXT NOT NULL,
        enable_comments INTEGER NOT NULL DEFAULT 1,
        tags            TEXT NOT NULL DEFAULT ''
    );

    CREATE INDEX IF NOT EXISTS idx_posts_pub_date
        ON posts(pub_date DESC);
"#;
