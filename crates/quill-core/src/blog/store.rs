//! Post persistence and listing queries.

use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, TimeZone, Utc};
use rusqlite::{params, OptionalExtension, ToSql};
use tracing::info;

use super::post::Post;
use crate::db::{encode_timestamp, Database};
use crate::error::{QuillError, QuillResult};
use crate::versioning::{SnapshotQuery, SnapshotStore};

/// Date-based archive selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Archive {
    Year(i32),
    Month(i32, u32),
    Day(i32, u32, u32),
}

impl Archive {
    /// Half-open UTC range `[start, end)` covered by this archive.
    pub fn bounds(&self) -> QuillResult<(DateTime<Utc>, DateTime<Utc>)> {
        let (start, end) = match *self {
            Archive::Year(y) => (date(y, 1, 1)?, date(y + 1, 1, 1)?),
            Archive::Month(y, m) => {
                let start = date(y, m, 1)?;
                let end = if m == 12 { date(y + 1, 1, 1)? } else { date(y, m + 1, 1)? };
                (start, end)
            }
            Archive::Day(y, m, d) => {
                let start = date(y, m, d)?;
                let end = start
                    .succ_opt()
                    .ok_or_else(|| QuillError::validation("date out of range"))?;
                (start, end)
            }
        };
        Ok((midnight(start), midnight(end)))
    }
}

fn date(year: i32, month: u32, day: u32) -> QuillResult<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, day).ok_or_else(|| {
        QuillError::validation(format!("invalid archive date {:04}-{:02}-{:02}", year, month, day))
    })
}

fn midnight(day: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&day.and_time(NaiveTime::default()))
}

/// Reads and writes posts.
///
/// Writes go through [`Database::save`], so any installed revision capture
/// sees every update. Non-privileged reads only return active posts whose
/// publication date has passed.
#[derive(Clone)]
pub struct PostStore {
    db: Database,
    snapshots: SnapshotStore,
}

impl PostStore {
    pub fn new(db: Database) -> Self {
        Self {
            snapshots: SnapshotStore::new(db.clone()),
            db,
        }
    }

    /// Insert a new post.
    pub fn create(&self, mut post: Post) -> QuillResult<Post> {
        if post.id.is_some() {
            return Err(QuillError::invalid_field("id", "new posts must not carry an id"));
        }
        post.prepare()?;
        self.ensure_slug_free(&post)?;
        let id = self.db.save(&mut post)?;
        info!(post_id = id, slug = %post.slug, "Created post");
        Ok(post)
    }

    /// Persist changes to an existing post.
    pub fn update(&self, post: &mut Post) -> QuillResult<()> {
        let id = post.id.ok_or_else(|| QuillError::missing_field("id"))?;
        if self.get(id)?.is_none() {
            return Err(QuillError::not_found("blog.post", id));
        }
        post.prepare()?;
        self.ensure_slug_free(post)?;
        self.db.save(post)?;
        info!(post_id = id, slug = %post.slug, "Updated post");
        Ok(())
    }

    fn ensure_slug_free(&self, post: &Post) -> QuillResult<()> {
        match self.get_by_slug(&post.slug)? {
            Some(existing) if existing.id != post.id => Err(QuillError::invalid_field(
                "slug",
                format!("'{}' is already used by another post", post.slug),
            )),
            _ => Ok(()),
        }
    }

    pub fn get(&self, id: i64) -> QuillResult<Option<Post>> {
        self.db.get(id)
    }

    /// Load a post by id if the reader may see it.
    pub fn get_visible(&self, id: i64, privileged: bool) -> QuillResult<Option<Post>> {
        Ok(self.get(id)?.filter(|post| is_visible(post, privileged)))
    }

    pub fn get_by_slug(&self, slug: &str) -> QuillResult<Option<Post>> {
        self.db.read(|conn| {
            conn.query_row(
                &format!("SELECT {} FROM posts WHERE slug = ?1", Post::COLUMNS),
                params![slug],
                |row| Ok(Post::from_row(row)),
            )
            .optional()?
            .transpose()
        })
    }

    /// All posts the reader may see, newest publication first.
    pub fn visible(&self, privileged: bool) -> QuillResult<Vec<Post>> {
        self.query(privileged, None, None)
    }

    /// The `limit` most recently published posts.
    pub fn latest(&self, limit: usize, privileged: bool) -> QuillResult<Vec<Post>> {
        self.query(privileged, None, Some(limit))
    }

    /// Posts published within the archive period.
    pub fn archive(&self, archive: Archive, privileged: bool) -> QuillResult<Vec<Post>> {
        let bounds = archive.bounds()?;
        self.query(privileged, Some(bounds), None)
    }

    /// Visible posts carrying `tag`.
    pub fn tagged(&self, tag: &str, privileged: bool) -> QuillResult<Vec<Post>> {
        Ok(self
            .visible(privileged)?
            .into_iter()
            .filter(|post| post.has_tag(tag))
            .collect())
    }

    /// Look up a single post by its permalink components.
    pub fn detail(
        &self,
        year: i32,
        month: u32,
        day: u32,
        slug: &str,
        privileged: bool,
    ) -> QuillResult<Option<Post>> {
        let Some(post) = self.get_by_slug(slug)? else {
            return Ok(None);
        };
        let date = post.pub_date.date_naive();
        let on_day = date.year() == year && date.month() == month && date.day() == day;
        Ok((on_day && is_visible(&post, privileged)).then_some(post))
    }

    /// Revision history of `post`, newest first.
    pub fn history(&self, post: &Post) -> SnapshotQuery {
        self.snapshots.snapshots_for(post)
    }

    fn query(
        &self,
        privileged: bool,
        range: Option<(DateTime<Utc>, DateTime<Utc>)>,
        limit: Option<usize>,
    ) -> QuillResult<Vec<Post>> {
        let mut sql = format!("SELECT {} FROM posts WHERE 1 = 1", Post::COLUMNS);
        let mut args: Vec<Box<dyn ToSql>> = Vec::new();

        if !privileged {
            args.push(Box::new(encode_timestamp(&Utc::now())));
            sql.push_str(&format!(" AND active = 1 AND pub_date <= ?{}", args.len()));
        }
        if let Some((start, end)) = range {
            args.push(Box::new(encode_timestamp(&start)));
            sql.push_str(&format!(" AND pub_date >= ?{}", args.len()));
            args.push(Box::new(encode_timestamp(&end)));
            sql.push_str(&format!(" AND pub_date < ?{}", args.len()));
        }
        sql.push_str(" ORDER BY pub_date DESC, id DESC");
        if let Some(limit) = limit {
            args.push(Box::new(limit as i64));
            sql.push_str(&format!(" LIMIT ?{}", args.len()));
        }

        self.db.read(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let refs: Vec<&dyn ToSql> = args.iter().map(|a| a.as_ref()).collect();
            let rows = stmt.query_map(refs.as_slice(), |row| Ok(Post::from_row(row)))?;
            rows.map(|r| r.map_err(Into::into).and_then(|inner| inner))
                .collect()
        })
    }
}

fn is_visible(post: &Post, privileged: bool) -> bool {
    privileged || post.is_published()
}
