//! Integration tests for comment submission and notification fan-out.

use async_trait::async_trait;
use quill_core::{
    CommentForm, Database, ErrorCode, Mail, Mailer, Post, QuillConfig, QuillError, QuillResult,
    Site, SiteConfig,
};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

/// Records every attempted send and fails for configured addresses.
#[derive(Default)]
struct RecordingMailer {
    attempts: Mutex<Vec<Mail>>,
    failing: HashSet<String>,
}

impl RecordingMailer {
    fn failing_for(address: &str) -> Self {
        Self {
            failing: [address.to_string()].into_iter().collect(),
            ..Default::default()
        }
    }

    fn recipients(&self) -> Vec<String> {
        let mut to: Vec<String> = self
            .attempts
            .lock()
            .unwrap()
            .iter()
            .flat_map(|mail| mail.to.clone())
            .collect();
        to.sort();
        to
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send_mail(&self, mail: &Mail) -> QuillResult<()> {
        self.attempts.lock().unwrap().push(mail.clone());
        if mail.to.iter().any(|to| self.failing.contains(to)) {
            return Err(QuillError::mail(
                ErrorCode::MailDeliveryFailed,
                "connection refused",
            ));
        }
        Ok(())
    }
}

fn site_with(mailer: Arc<RecordingMailer>) -> (Site, Post) {
    let config = QuillConfig::builder()
        .site(SiteConfig {
            name: "oebfare".to_string(),
            base_url: "https://blog.example.com".to_string(),
            ..Default::default()
        })
        .build();
    let site = Site::with_parts(Database::in_memory().unwrap(), mailer, &config).unwrap();
    let post = site
        .posts()
        .create(Post::new("Release notes", "body").active(true))
        .unwrap();
    (site, post)
}

fn form(name: &str, email: &str, notify: bool) -> CommentForm {
    CommentForm {
        name: name.to_string(),
        email: email.to_string(),
        url: None,
        comment: format!("Comment from {}", name),
        email_notification: notify,
    }
}

async fn opt_in(site: &Site, post: &Post, name: &str, email: &str) {
    site.comments()
        .submit(post, form(name, email, true))
        .await
        .unwrap();
}

/// Two earlier opt-ins plus a new one: exactly three sends.
#[tokio::test]
async fn test_three_recipients_three_sends() {
    let mailer = Arc::new(RecordingMailer::default());
    let (site, post) = site_with(mailer.clone());
    opt_in(&site, &post, "Ann", "ann@example.com").await;
    opt_in(&site, &post, "Bob", "bob@example.com").await;
    mailer.attempts.lock().unwrap().clear();

    let submission = site
        .comments()
        .submit(&post, form("Cy", "cy@example.com", true))
        .await
        .unwrap();

    assert_eq!(submission.notifications.sent, 3);
    assert_eq!(submission.notifications.failed, 0);
    assert_eq!(
        mailer.recipients(),
        vec!["ann@example.com", "bob@example.com", "cy@example.com"]
    );

    let attempts = mailer.attempts.lock().unwrap();
    let mail = &attempts[0];
    assert_eq!(mail.subject, "oebfare: A comment was posted to Release notes");
    assert!(mail.body.contains(&format!(
        "https://blog.example.com{}#c{}",
        post.permalink(),
        submission.comment.id.unwrap()
    )));
    assert!(mail
        .body
        .contains(&format!("https://blog.example.com/posts/{}/unsubscribe?token=", post.id.unwrap())));
}

/// One failing recipient does not stop the other two.
#[tokio::test]
async fn test_failing_send_is_isolated() {
    let mailer = Arc::new(RecordingMailer::failing_for("bob@example.com"));
    let (site, post) = site_with(mailer.clone());
    opt_in(&site, &post, "Ann", "ann@example.com").await;
    opt_in(&site, &post, "Bob", "bob@example.com").await;
    mailer.attempts.lock().unwrap().clear();

    let submission = site
        .comments()
        .submit(&post, form("Cy", "cy@example.com", true))
        .await
        .unwrap();

    assert_eq!(submission.notifications.sent, 2);
    assert_eq!(submission.notifications.failed, 1);
    assert_eq!(mailer.recipients().len(), 3);
    assert_eq!(site.comments().comments_for(post.id.unwrap()).unwrap().len(), 3);
}

#[tokio::test]
async fn test_repeat_opt_in_mails_once() {
    let mailer = Arc::new(RecordingMailer::default());
    let (site, post) = site_with(mailer.clone());
    opt_in(&site, &post, "Ann", "ann@example.com").await;
    opt_in(&site, &post, "Ann", "ANN@example.com").await;
    mailer.attempts.lock().unwrap().clear();

    let submission = site
        .comments()
        .submit(&post, form("Bob", "bob@example.com", false))
        .await
        .unwrap();

    assert_eq!(submission.notifications.sent, 1);
    assert_eq!(site.comments().recipients_for(post.id.unwrap()).unwrap().len(), 1);
}

#[tokio::test]
async fn test_unsubscribed_address_gets_nothing() {
    let mailer = Arc::new(RecordingMailer::default());
    let (site, post) = site_with(mailer.clone());
    let post_id = post.id.unwrap();
    opt_in(&site, &post, "Ann", "ann@example.com").await;
    opt_in(&site, &post, "Bob", "bob@example.com").await;

    assert_eq!(site.comments().unsubscribe(post_id, "ann@example.com").unwrap(), 1);
    mailer.attempts.lock().unwrap().clear();

    site.comments()
        .submit(&post, form("Cy", "cy@example.com", false))
        .await
        .unwrap();
    assert_eq!(mailer.recipients(), vec!["bob@example.com"]);
}

/// The token in a mailed link only opts out the address it was sent to.
#[tokio::test]
async fn test_mailed_link_unsubscribes_its_recipient() {
    let mailer = Arc::new(RecordingMailer::default());
    let (site, post) = site_with(mailer.clone());
    let post_id = post.id.unwrap();
    opt_in(&site, &post, "Ann", "ann@example.com").await;
    opt_in(&site, &post, "Bob", "bob@example.com").await;

    let token = {
        let attempts = mailer.attempts.lock().unwrap();
        let mail = attempts
            .iter()
            .find(|mail| mail.to == vec!["ann@example.com".to_string()])
            .unwrap();
        let (_, token) = mail.body.split_once("unsubscribe?token=").unwrap();
        token.split_whitespace().next().unwrap().to_string()
    };
    assert_eq!(site.comments().unsubscribe_with_token(post_id, &token).unwrap(), 1);
    mailer.attempts.lock().unwrap().clear();

    site.comments()
        .submit(&post, form("Cy", "cy@example.com", false))
        .await
        .unwrap();
    assert_eq!(mailer.recipients(), vec!["bob@example.com"]);
}

#[tokio::test]
async fn test_closed_comments_send_nothing() {
    let mailer = Arc::new(RecordingMailer::default());
    let (site, mut post) = site_with(mailer.clone());
    opt_in(&site, &post, "Ann", "ann@example.com").await;
    post.enable_comments = false;
    site.posts().update(&mut post).unwrap();
    mailer.attempts.lock().unwrap().clear();

    let err = site
        .comments()
        .submit(&post, form("Cy", "cy@example.com", true))
        .await
        .unwrap_err();

    assert_eq!(err.code(), ErrorCode::ValCommentsClosed);
    assert!(mailer.recipients().is_empty());
    assert_eq!(site.comments().comments_for(post.id.unwrap()).unwrap().len(), 1);
}

#[tokio::test]
async fn test_invalid_form_is_rejected() {
    let mailer = Arc::new(RecordingMailer::default());
    let (site, post) = site_with(mailer.clone());

    let err = site
        .comments()
        .submit(&post, form("Cy", "not an address", true))
        .await
        .unwrap_err();

    assert!(matches!(err, QuillError::Validation { .. }));
    assert!(site.comments().comments_for(post.id.unwrap()).unwrap().is_empty());
    assert!(mailer.recipients().is_empty());
}
