//! Comment and notification opt-in records.

use chrono::{DateTime, Utc};
use lettre::Address;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::{decode_timestamp, encode_timestamp, EntityType, Record};
use crate::error::{QuillError, QuillResult};

/// A reader comment attached to a post.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: Option<i64>,
    pub post_id: i64,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub body: String,
    pub submitted_at: DateTime<Utc>,
}

impl Comment {
    pub(crate) const COLUMNS: &'static str = "id, post_id, name, email, url, body, submitted_at";

    pub(crate) fn from_row(row: &rusqlite::Row<'_>) -> QuillResult<Self> {
        let submitted_at: String = row.get(6)?;
        Ok(Self {
            id: row.get(0)?,
            post_id: row.get(1)?,
            name: row.get(2)?,
            email: row.get(3)?,
            url: row.get(4)?,
            body: row.get(5)?,
            submitted_at: decode_timestamp(&submitted_at)?,
        })
    }
}

impl Record for Comment {
    const ENTITY_TYPE: EntityType = EntityType::new("comments.comment");

    fn id(&self) -> Option<i64> {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = Some(id);
    }

    fn load(conn: &Connection, id: i64) -> QuillResult<Option<Self>> {
        conn.query_row(
            &format!("SELECT {} FROM comments WHERE id = ?1", Self::COLUMNS),
            params![id],
            |row| Ok(Self::from_row(row)),
        )
        .optional()?
        .transpose()
    }

    fn insert(&self, conn: &Connection) -> QuillResult<i64> {
        conn.execute(
            r#"INSERT INTO comments (id, post_id, name, email, url, body, submitted_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"#,
            params![
                self.id,
                self.post_id,
                self.name,
                self.email,
                self.url,
                self.body,
                encode_timestamp(&self.submitted_at),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn update(&self, conn: &Connection) -> QuillResult<usize> {
        Ok(conn.execute(
            r#"UPDATE comments SET post_id = ?2, name = ?3, email = ?4, url = ?5,
                 body = ?6, submitted_at = ?7
               WHERE id = ?1"#,
            params![
                self.id,
                self.post_id,
                self.name,
                self.email,
                self.url,
                self.body,
                encode_timestamp(&self.submitted_at),
            ],
        )?)
    }
}

/// An address that asked to hear about new comments on a post.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationRecipient {
    pub id: Option<i64>,
    pub post_id: i64,
    /// Comment whose submission recorded the opt-in.
    pub comment_id: Option<i64>,
    pub email_address: String,
    pub wants_email: bool,
    /// Secret carried by the unsubscribe link mailed to this address.
    pub token: String,
}

impl NotificationRecipient {
    pub(crate) const COLUMNS: &'static str = "id, post_id, comment_id, email_address, wants_email, token";

    /// A fresh opt-in with its own unsubscribe token.
    pub fn new(post_id: i64, comment_id: Option<i64>, email_address: impl Into<String>) -> Self {
        Self {
            id: None,
            post_id,
            comment_id,
            email_address: email_address.into(),
            wants_email: true,
            token: Uuid::new_v4().simple().to_string(),
        }
    }

    pub(crate) fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            post_id: row.get(1)?,
            comment_id: row.get(2)?,
            email_address: row.get(3)?,
            wants_email: row.get(4)?,
            token: row.get(5)?,
        })
    }
}

impl Record for NotificationRecipient {
    const ENTITY_TYPE: EntityType = EntityType::new("comments.notification_recipient");

    fn id(&self) -> Option<i64> {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = Some(id);
    }

    fn load(conn: &Connection, id: i64) -> QuillResult<Option<Self>> {
        Ok(conn
            .query_row(
                &format!(
                    "SELECT {} FROM notification_recipients WHERE id = ?1",
                    Self::COLUMNS
                ),
                params![id],
                Self::from_row,
            )
            .optional()?)
    }

    fn insert(&self, conn: &Connection) -> QuillResult<i64> {
        conn.execute(
            r#"INSERT INTO notification_recipients
               (id, post_id, comment_id, email_address, wants_email, token)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6)"#,
            params![
                self.id,
                self.post_id,
                self.comment_id,
                self.email_address,
                self.wants_email,
                self.token,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn update(&self, conn: &Connection) -> QuillResult<usize> {
        Ok(conn.execute(
            r#"UPDATE notification_recipients
               SET post_id = ?2, comment_id = ?3, email_address = ?4, wants_email = ?5,
                   token = ?6
               WHERE id = ?1"#,
            params![
                self.id,
                self.post_id,
                self.comment_id,
                self.email_address,
                self.wants_email,
                self.token,
            ],
        )?)
    }
}

/// Submitted comment form.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CommentForm {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub url: Option<String>,
    pub comment: String,
    /// Opt in to mail about later comments on the same post.
    #[serde(default)]
    pub email_notification: bool,
}

impl CommentForm {
    pub fn validate(&self) -> QuillResult<()> {
        if self.name.trim().is_empty() {
            return Err(QuillError::missing_field("name"));
        }
        if self.comment.trim().is_empty() {
            return Err(QuillError::missing_field("comment"));
        }
        if self.email.trim().is_empty() {
            return Err(QuillError::missing_field("email"));
        }
        self.email
            .trim()
            .parse::<Address>()
            .map_err(|e| QuillError::invalid_field("email", e.to_string()))?;
        Ok(())
    }

    pub(crate) fn into_comment(self, post_id: i64) -> Comment {
        Comment {
            id: None,
            post_id,
            name: self.name.trim().to_string(),
            email: self.email.trim().to_string(),
            url: self.url.map(|u| u.trim().to_string()).filter(|u| !u.is_empty()),
            body: self.comment,
            submitted_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form() -> CommentForm {
        CommentForm {
            name: "Ada".to_string(),
            email: "ada@example.com".to_string(),
            url: Some("  ".to_string()),
            comment: "Nice post".to_string(),
            email_notification: true,
        }
    }

    #[test]
    fn test_valid_form() {
        assert!(form().validate().is_ok());
        let comment = form().into_comment(3);
        assert_eq!(comment.post_id, 3);
        assert!(comment.url.is_none());
    }

    #[test]
    fn test_recipient_tokens_are_unique() {
        let first = NotificationRecipient::new(1, None, "a@example.com");
        let second = NotificationRecipient::new(1, None, "a@example.com");
        assert!(first.wants_email);
        assert_eq!(first.token.len(), 32);
        assert_ne!(first.token, second.token);
    }

    #[test]
    fn test_invalid_forms() {
        let mut no_name = form();
        no_name.name = " ".to_string();
        assert!(no_name.validate().is_err());

        let mut bad_email = form();
        bad_email.email = "ada at example".to_string();
        assert!(bad_email.validate().is_err());

        let mut empty = form();
        empty.comment.clear();
        assert!(empty.validate().is_err());
    }
}
