//! Outbound mail boundary.
//!
//! The notification flow only builds [`Mail`] values; delivery is the job of
//! a [`Mailer`]. [`SmtpMailer`] talks to a real SMTP server, [`LogMailer`]
//! writes messages to the log and is used when no server is configured.

use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

use crate::config::{MailConfig, SmtpConfig};
use crate::error::{ErrorCode, QuillError, QuillResult};

/// A plain-text message ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Mail {
    pub subject: String,
    pub body: String,
    pub from: String,
    pub to: Vec<String>,
}

impl Mail {
    pub fn new(
        subject: impl Into<String>,
        body: impl Into<String>,
        from: impl Into<String>,
        to: Vec<String>,
    ) -> Self {
        Self {
            subject: subject.into(),
            body: body.into(),
            from: from.into(),
            to,
        }
    }
}

/// Delivers mail.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_mail(&self, mail: &Mail) -> QuillResult<()>;
}

/// Mailer that only logs what it would send.
#[derive(Debug, Default, Clone)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send_mail(&self, mail: &Mail) -> QuillResult<()> {
        info!(
            from = %mail.from,
            to = ?mail.to,
            subject = %mail.subject,
            "Mail not delivered (no SMTP server configured)"
        );
        Ok(())
    }
}

/// SMTP mailer backed by lettre's async transport.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpMailer {
    pub fn new(config: &SmtpConfig) -> QuillResult<Self> {
        let transport = match (&config.username, &config.password) {
            (Some(user), Some(password)) => {
                AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
                    .map_err(|e| {
                        QuillError::Configuration(format!("SMTP relay '{}': {}", config.host, e))
                    })?
                    .credentials(Credentials::new(user.clone(), password.clone()))
                    .port(config.port)
                    .build()
            }
            // No authentication (for local development SMTP servers)
            _ => AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
                .port(config.port)
                .build(),
        };
        Ok(Self { transport })
    }

    pub(crate) fn build_message(mail: &Mail) -> QuillResult<Message> {
        let mut builder = Message::builder()
            .from(parse_mailbox(&mail.from)?)
            .subject(mail.subject.clone())
            .header(ContentType::TEXT_PLAIN);
        for to in &mail.to {
            builder = builder.to(parse_mailbox(to)?);
        }
        builder
            .body(mail.body.clone())
            .map_err(|e| QuillError::mail(ErrorCode::MailBuildFailed, e.to_string()))
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send_mail(&self, mail: &Mail) -> QuillResult<()> {
        let message = Self::build_message(mail)?;
        self.transport.send(message).await.map_err(|e| {
            QuillError::mail(
                ErrorCode::MailDeliveryFailed,
                format!("SMTP delivery to {:?} failed: {}", mail.to, e),
            )
        })?;
        Ok(())
    }
}

fn parse_mailbox(address: &str) -> QuillResult<Mailbox> {
    address.parse().map_err(|e| {
        QuillError::mail(
            ErrorCode::MailInvalidAddress,
            format!("invalid address '{}': {}", address, e),
        )
    })
}

/// Build the mailer selected by configuration.
pub fn create_mailer(config: &MailConfig) -> QuillResult<Arc<dyn Mailer>> {
    match &config.smtp {
        Some(smtp) => {
            info!(host = %smtp.host, port = smtp.port, "Using SMTP mailer");
            Ok(Arc::new(SmtpMailer::new(smtp)?))
        }
        None => {
            info!("No SMTP server configured, mail will only be logged");
            Ok(Arc::new(LogMailer))
        }
    }
}
