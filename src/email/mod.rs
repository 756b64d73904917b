//! Outbound email
//!
//! Messages are composed here and handed to a [`Mailer`]. The shipped
//! [`LogMailer`] only records them in the log; a real transport plugs in
//! behind the same trait.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

const SUBJECT_PREFIX: &str = "toDo app";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
    /// The body carries a credential and must not reach the log
    pub sensitive: bool,
}

impl EmailMessage {
    pub fn verification(from: &str, to: &str, verification_link: &str) -> Self {
        Self {
            from: from.to_string(),
            to: to.to_string(),
            subject: format!("{SUBJECT_PREFIX}: Welcome!"),
            body: format!(
                "Thanks for signing up.\n\n\
                 Please confirm your email address by following this link:\n{verification_link}\n"
            ),
            sensitive: false,
        }
    }

    pub fn new_password(from: &str, to: &str, new_password: &str) -> Self {
        Self {
            from: from.to_string(),
            to: to.to_string(),
            subject: format!("{SUBJECT_PREFIX}: Your new password"),
            body: format!(
                "Your password has been reset.\n\n\
                 Your new password is: {new_password}\n\n\
                 Please change it after signing in.\n"
            ),
            sensitive: true,
        }
    }

    /// Body as it may appear in logs
    pub fn loggable_body(&self) -> &str {
        if self.sensitive {
            "[redacted]"
        } else {
            &self.body
        }
    }
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: EmailMessage) -> anyhow::Result<()>;
}

/// Writes each message to the log instead of delivering it
#[derive(Debug, Default, Clone)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, message: EmailMessage) -> anyhow::Result<()> {
        info!(
            to = %message.to,
            from = %message.from,
            subject = %message.subject,
            "Email message"
        );
        debug!(to = %message.to, "Email body:\n{}", message.loggable_body());
        Ok(())
    }
}

/// Keeps sent messages in memory, for inspection in tests
#[derive(Debug, Default, Clone)]
pub struct RecordingMailer {
    sent: Arc<Mutex<Vec<EmailMessage>>>,
}

impl RecordingMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn sent(&self) -> Vec<EmailMessage> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, message: EmailMessage) -> anyhow::Result<()> {
        self.sent.lock().await.push(message);
        Ok(())
    }
}
