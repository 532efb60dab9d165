//! Comment submission and notification fan-out.

use futures::future::join_all;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use super::comment::{Comment, CommentForm, NotificationRecipient};
use crate::blog::Post;
use crate::config::{MailConfig, SiteConfig};
use crate::db::Database;
use crate::error::{ErrorCode, QuillError, QuillResult};
use crate::mail::{Mail, Mailer};

/// Outcome of one notification fan-out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct NotificationReport {
    pub sent: usize,
    pub failed: usize,
}

/// A stored comment together with everyone to notify about it.
#[derive(Debug, Clone)]
pub struct AcceptedComment {
    pub comment: Comment,
    pub recipients: Vec<NotificationRecipient>,
}

/// Result of a successful comment submission.
#[derive(Debug, Clone, Serialize)]
pub struct Submission {
    pub comment: Comment,
    pub notifications: NotificationReport,
}

/// Accepts comments and mails everyone who opted in on the post.
#[derive(Clone)]
pub struct CommentService {
    db: Database,
    mailer: Arc<dyn Mailer>,
    site: SiteConfig,
    from: String,
}

impl CommentService {
    pub fn new(db: Database, mailer: Arc<dyn Mailer>, site: SiteConfig, mail: &MailConfig) -> Self {
        Self {
            db,
            mailer,
            site,
            from: mail.from.clone(),
        }
    }

    /// Store a comment on `post` and notify opted-in readers.
    ///
    /// Notification is best effort: failed sends are logged and counted but
    /// never fail the submission.
    pub async fn submit(&self, post: &Post, form: CommentForm) -> QuillResult<Submission> {
        let accepted = self.accept(post, form)?;
        let notifications = self.notify(post, &accepted).await;
        Ok(Submission {
            comment: accepted.comment,
            notifications,
        })
    }

    /// Validate and store a comment without sending any mail.
    ///
    /// The comment and the submitter's opt-in are written in one
    /// transaction. This blocks on the database; async callers should run it
    /// on a blocking thread and then call [`notify`](Self::notify).
    pub fn accept(&self, post: &Post, form: CommentForm) -> QuillResult<AcceptedComment> {
        let post_id = post.id.ok_or_else(|| QuillError::missing_field("post_id"))?;
        if !post.enable_comments {
            return Err(QuillError::Validation {
                message: format!("comments are closed on '{}'", post.title),
                code: ErrorCode::ValCommentsClosed,
                details: Default::default(),
            });
        }
        form.validate()?;

        let wants_email = form.email_notification;
        let mut comment = form.into_comment(post_id);
        let comment_id = self.db.transaction(|tx| {
            let comment_id = self.db.save_in(tx, &mut comment)?;
            if wants_email {
                let mut recipient =
                    NotificationRecipient::new(post_id, Some(comment_id), comment.email.clone());
                self.db.save_in(tx, &mut recipient)?;
            }
            Ok(comment_id)
        })?;
        info!(post_id, comment_id, wants_email, "Comment submitted");

        let recipients = match self.recipients_for(post_id) {
            Ok(recipients) => recipients,
            Err(e) => {
                warn!(post_id, error = %e, "Could not load notification recipients");
                Vec::new()
            }
        };
        Ok(AcceptedComment {
            comment,
            recipients,
        })
    }

    /// Comments on a post, oldest first.
    pub fn comments_for(&self, post_id: i64) -> QuillResult<Vec<Comment>> {
        self.db.read(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM comments WHERE post_id = ?1 ORDER BY submitted_at ASC, id ASC",
                Comment::COLUMNS
            ))?;
            let rows = stmt.query_map(params![post_id], |row| Ok(Comment::from_row(row)))?;
            rows.map(|r| r.map_err(Into::into).and_then(|inner| inner))
                .collect()
        })
    }

    /// Opt-ins that currently want mail about `post_id`, one per address.
    ///
    /// Addresses compare case-insensitively; the earliest opt-in wins.
    pub fn recipients_for(&self, post_id: i64) -> QuillResult<Vec<NotificationRecipient>> {
        self.db.read(|conn| {
            let mut stmt = conn.prepare(&format!(
                r#"SELECT {} FROM notification_recipients
                   WHERE id IN (
                       SELECT MIN(id) FROM notification_recipients
                       WHERE post_id = ?1 AND wants_email = 1
                       GROUP BY email_address COLLATE NOCASE
                   )
                   ORDER BY id"#,
                NotificationRecipient::COLUMNS
            ))?;
            let rows = stmt.query_map(params![post_id], NotificationRecipient::from_row)?;
            rows.collect::<Result<Vec<_>, _>>().map_err(QuillError::from)
        })
    }

    /// Stop notifications about `post_id` for `email`.
    ///
    /// Returns how many opt-ins were switched off.
    pub fn unsubscribe(&self, post_id: i64, email: &str) -> QuillResult<usize> {
        let changed = self.db.transaction(|tx| switch_off(tx, post_id, email.trim()))?;
        info!(post_id, changed, "Unsubscribed from comment notifications");
        Ok(changed)
    }

    /// Stop notifications for whoever was mailed the unsubscribe `token`.
    ///
    /// Every opt-in of that address on the post is switched off. Unknown
    /// tokens are reported as not found.
    pub fn unsubscribe_with_token(&self, post_id: i64, token: &str) -> QuillResult<usize> {
        let changed = self.db.transaction(|tx| {
            let email: Option<String> = tx
                .query_row(
                    "SELECT email_address FROM notification_recipients WHERE post_id = ?1 AND token = ?2",
                    params![post_id, token.trim()],
                    |row| row.get(0),
                )
                .optional()?;
            let email = email
                .ok_or_else(|| QuillError::not_found_message("unknown unsubscribe link"))?;
            switch_off(tx, post_id, &email)
        })?;
        info!(post_id, changed, "Unsubscribed from comment notifications");
        Ok(changed)
    }

    /// The message sent to `recipient` about a new comment on `post`.
    pub fn notification_for(
        &self,
        post: &Post,
        comment: &Comment,
        recipient: &NotificationRecipient,
    ) -> Mail {
        let subject = format!("{}: A comment was posted to {}", self.site.name, post.title);
        let comment_url = format!(
            "{}{}#c{}",
            self.site.base_url,
            post.permalink(),
            comment.id.unwrap_or_default()
        );
        let token: String =
            url::form_urlencoded::byte_serialize(recipient.token.as_bytes()).collect();
        let unsubscribe_url = format!(
            "{}/posts/{}/unsubscribe?token={}",
            self.site.base_url,
            post.id.unwrap_or_default(),
            token
        );
        let body = format!(
            "A comment was posted to the blog post {}. Here is the URL to that\n\
             comment:\n\n    {}\n\n\
             If you no longer want to receive e-mail notifications for this post please\n\
             use this URL:\n\n    {}\n\n\
             Thanks!\n",
            post.title, comment_url, unsubscribe_url
        );
        Mail::new(
            subject,
            body,
            self.from.clone(),
            vec![recipient.email_address.clone()],
        )
    }

    /// Mail every recipient of `accepted` concurrently.
    pub async fn notify(&self, post: &Post, accepted: &AcceptedComment) -> NotificationReport {
        let sends = accepted.recipients.iter().map(|recipient| async move {
            let mail = self.notification_for(post, &accepted.comment, recipient);
            (recipient, self.mailer.send_mail(&mail).await)
        });

        let mut report = NotificationReport::default();
        for (recipient, result) in join_all(sends).await {
            match result {
                Ok(()) => report.sent += 1,
                Err(e) => {
                    report.failed += 1;
                    warn!(recipient = %recipient.email_address, error = %e, "Comment notification failed");
                }
            }
        }
        if !accepted.recipients.is_empty() {
            info!(
                post_id = post.id.unwrap_or_default(),
                sent = report.sent,
                failed = report.failed,
                "Comment notifications sent"
            );
        }
        report
    }
}

fn switch_off(conn: &Connection, post_id: i64, email: &str) -> QuillResult<usize> {
    Ok(conn.execute(
        r#"UPDATE notification_recipients SET wants_email = 0
           WHERE post_id = ?1 AND email_address = ?2 COLLATE NOCASE AND wants_email = 1"#,
        params![post_id, email],
    )?)
}
