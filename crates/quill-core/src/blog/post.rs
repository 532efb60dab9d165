//! Blog post record.

use chrono::{DateTime, Datelike, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;
use std::str::FromStr;
use strum::{Display, EnumString};

use super::markup::rst_to_html;
use crate::db::{decode_timestamp, encode_timestamp, EntityType, Record};
use crate::error::{QuillError, QuillResult};

/// Maximum title length in characters.
pub const TITLE_MAX_LEN: usize = 100;

/// Maximum generated slug length.
const SLUG_MAX_LEN: usize = 50;

/// Years whose timestamps keep a fixed-width, lexically sortable encoding.
const STORABLE_YEARS: RangeInclusive<i32> = 0..=9999;

static SLUG_SEPARATORS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9]+").unwrap());
static VALID_SLUG: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z0-9]+(?:[-_][a-z0-9]+)*$").unwrap());

/// How a post body is written.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum MarkupType {
    #[default]
    Html,
    Rst,
}

/// A blog post.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: Option<i64>,
    pub title: String,
    /// URL component, unique across posts. Derived from the title when empty.
    pub slug: String,
    pub body: String,
    #[serde(default)]
    pub markup_type: MarkupType,
    /// Inactive posts are only visible to privileged readers.
    pub active: bool,
    pub create_date: DateTime<Utc>,
    pub pub_date: DateTime<Utc>,
    pub enable_comments: bool,
    /// Free-form tag string, see [`Post::tag_list`].
    #[serde(default)]
    pub tags: String,
}

impl Post {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: None,
            title: title.into(),
            slug: String::new(),
            body: body.into(),
            markup_type: MarkupType::Html,
            active: false,
            create_date: now,
            pub_date: now,
            enable_comments: true,
            tags: String::new(),
        }
    }

    /// Builder: set slug
    pub fn with_slug(mut self, slug: impl Into<String>) -> Self {
        self.slug = slug.into();
        self
    }

    /// Builder: set tags
    pub fn with_tags(mut self, tags: impl Into<String>) -> Self {
        self.tags = tags.into();
        self
    }

    /// Builder: set markup type
    pub fn with_markup(mut self, markup_type: MarkupType) -> Self {
        self.markup_type = markup_type;
        self
    }

    /// Builder: set publication date
    pub fn published_at(mut self, pub_date: DateTime<Utc>) -> Self {
        self.pub_date = pub_date;
        self
    }

    /// Builder: mark active
    pub fn active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    /// Builder: allow or refuse comments
    pub fn comments_enabled(mut self, enabled: bool) -> Self {
        self.enable_comments = enabled;
        self
    }

    /// Tags split on commas and whitespace, deduplicated in first-seen order.
    pub fn tag_list(&self) -> Vec<String> {
        let mut tags: Vec<String> = Vec::new();
        for tag in self.tags.split(|c: char| c == ',' || c.is_whitespace()) {
            let tag = tag.trim();
            if !tag.is_empty() && !tags.iter().any(|t| t == tag) {
                tags.push(tag.to_string());
            }
        }
        tags
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tag_list().iter().any(|t| t == tag)
    }

    /// Active and with a publication date that has passed.
    pub fn is_published(&self) -> bool {
        self.active && self.pub_date <= Utc::now()
    }

    /// The body as HTML: reStructuredText is rendered, HTML passes through.
    pub fn render_body(&self) -> QuillResult<String> {
        match self.markup_type {
            MarkupType::Html => Ok(self.body.clone()),
            MarkupType::Rst => rst_to_html(&self.body),
        }
    }

    /// Date-based URL path, e.g. `/2008/jan/05/hello-world/`.
    pub fn permalink(&self) -> String {
        format!(
            "{}{}/",
            self.pub_date.format("/%Y/%b/%d/").to_string().to_lowercase(),
            self.slug
        )
    }

    /// Fill in derived fields and check constraints before a write.
    pub(crate) fn prepare(&mut self) -> QuillResult<()> {
        let title = self.title.trim();
        if title.is_empty() {
            return Err(QuillError::missing_field("title"));
        }
        if title.chars().count() > TITLE_MAX_LEN {
            return Err(QuillError::invalid_field(
                "title",
                format!("must be at most {} characters", TITLE_MAX_LEN),
            ));
        }
        if self.slug.trim().is_empty() {
            self.slug = slugify(title);
            if self.slug.is_empty() {
                return Err(QuillError::invalid_field(
                    "slug",
                    "could not be derived from the title, set one explicitly",
                ));
            }
        }
        if !VALID_SLUG.is_match(&self.slug) {
            return Err(QuillError::invalid_field(
                "slug",
                format!("'{}' must contain only lowercase letters, digits, '-' or '_'", self.slug),
            ));
        }
        for (field, date) in [("create_date", &self.create_date), ("pub_date", &self.pub_date)] {
            if !STORABLE_YEARS.contains(&date.year()) {
                return Err(QuillError::invalid_field(
                    field,
                    format!(
                        "year {} is outside {}..={}",
                        date.year(),
                        STORABLE_YEARS.start(),
                        STORABLE_YEARS.end()
                    ),
                ));
            }
        }
        Ok(())
    }

    pub(crate) const COLUMNS: &'static str = "id, title, slug, body, markup_type, active, \
         create_date, pub_date, enable_comments, tags";

    pub(crate) fn from_row(row: &rusqlite::Row<'_>) -> QuillResult<Self> {
        let markup_type: String = row.get(4)?;
        let create_date: String = row.get(6)?;
        let pub_date: String = row.get(7)?;
        Ok(Self {
            id: row.get(0)?,
            title: row.get(1)?,
            slug: row.get(2)?,
            body: row.get(3)?,
            markup_type: MarkupType::from_str(&markup_type)
                .map_err(|e| QuillError::parse(format!("markup type '{}': {}", markup_type, e)))?,
            active: row.get(5)?,
            create_date: decode_timestamp(&create_date)?,
            pub_date: decode_timestamp(&pub_date)?,
            enable_comments: row.get(8)?,
            tags: row.get(9)?,
        })
    }
}

impl Record for Post {
    const ENTITY_TYPE: EntityType = EntityType::new("blog.post");

    fn id(&self) -> Option<i64> {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = Some(id);
    }

    fn load(conn: &Connection, id: i64) -> QuillResult<Option<Self>> {
        conn.query_row(
            &format!("SELECT {} FROM posts WHERE id = ?1", Self::COLUMNS),
            params![id],
            |row| Ok(Self::from_row(row)),
        )
        .optional()?
        .transpose()
    }

    fn insert(&self, conn: &Connection) -> QuillResult<i64> {
        conn.execute(
            r#"INSERT INTO posts
               (id, title, slug, body, markup_type, active,
                create_date, pub_date, enable_comments, tags)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"#,
            params![
                self.id,
                self.title,
                self.slug,
                self.body,
                self.markup_type.to_string(),
                self.active,
                encode_timestamp(&self.create_date),
                encode_timestamp(&self.pub_date),
                self.enable_comments,
                self.tags,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn update(&self, conn: &Connection) -> QuillResult<usize> {
        Ok(conn.execute(
            r#"UPDATE posts SET
                 title = ?2, slug = ?3, body = ?4, markup_type = ?5, active = ?6,
                 create_date = ?7, pub_date = ?8, enable_comments = ?9, tags = ?10
               WHERE id = ?1"#,
            params![
                self.id,
                self.title,
                self.slug,
                self.body,
                self.markup_type.to_string(),
                self.active,
                encode_timestamp(&self.create_date),
                encode_timestamp(&self.pub_date),
                self.enable_comments,
                self.tags,
            ],
        )?)
    }
}

/// Derive a URL slug from free text.
///
/// Lowercases, collapses every run of non-alphanumeric ASCII into a single
/// `-`, and truncates to 50 characters.
pub fn slugify(text: &str) -> String {
    let lowered = text.to_lowercase();
    let slug = SLUG_SEPARATORS.replace_all(&lowered, "-");
    let slug: String = slug.trim_matches('-').chars().take(SLUG_MAX_LEN).collect();
    slug.trim_end_matches('-').to_string()
}

/// Parse a month given as a number (`"1"`..`"12"`) or an English
/// abbreviation (`"jan"`).
pub fn parse_month(value: &str) -> Option<u32> {
    const MONTHS: [&str; 12] = [
        "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
    ];
    if let Ok(n) = value.parse::<u32>() {
        return (1..=12).contains(&n).then_some(n);
    }
    let lowered = value.to_lowercase();
    MONTHS
        .iter()
        .position(|m| *m == lowered)
        .map(|i| i as u32 + 1)
}
