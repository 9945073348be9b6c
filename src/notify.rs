//! Failure alerts for the backup scheduler

use std::sync::Arc;
use async_trait::async_trait;
use chrono::NaiveDateTime;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use minijinja::{context, Environment};
use tracing::info;

use crate::clock::Clock;
use crate::config::EmailConfig;
use crate::database::{BackupError, Result};

const FAILURE_SUBJECT: &str = "Backup Failed";

const FAILURE_TEMPLATE: &str = "\
{{ app }} Backup Failure Alert

Time: {{ failed_at }}
Error: {{ error }}

Please check the backup system and ensure the database is being backed up properly.

---
This is an automated message from {{ app }}.
";

/// Something that can tell a human a backup failed
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Whether enough settings are present to attempt delivery
    fn is_configured(&self) -> bool;

    async fn send_failure_alert(&self, message: &str) -> Result<()>;
}

/// Plain-text alert body for a failed backup
pub fn render_failure_alert(app: &str, failed_at: NaiveDateTime, error: &str) -> Result<String> {
    Environment::new()
        .render_str(
            FAILURE_TEMPLATE,
            context! {
                app => app,
                failed_at => failed_at.format("%Y-%m-%d %H:%M:%S").to_string(),
                error => error,
            },
        )
        .map_err(|e| BackupError::Notify(e.to_string()))
}

/// Sends alerts as email over SMTP
pub struct EmailNotifier {
    config: EmailConfig,
    app_name: String,
    clock: Arc<dyn Clock>,
}

impl EmailNotifier {
    pub fn new(config: EmailConfig, app_name: &str, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            app_name: app_name.to_string(),
            clock,
        }
    }

    fn recipients(&self) -> Vec<&str> {
        self.config
            .to
            .split(',')
            .map(str::trim)
            .filter(|addr| !addr.is_empty())
            .collect()
    }

    fn build_message(&self, body: String) -> Result<Message> {
        let from: Mailbox = self
            .config
            .from
            .parse()
            .map_err(|e| BackupError::Notify(format!("invalid from address: {}", e)))?;

        let mut builder = Message::builder()
            .from(from)
            .subject(format!("[{}] {}", self.app_name, FAILURE_SUBJECT))
            .header(ContentType::TEXT_PLAIN);

        for recipient in self.recipients() {
            let to: Mailbox = recipient
                .parse()
                .map_err(|e| BackupError::Notify(format!("invalid recipient {}: {}", recipient, e)))?;
            builder = builder.to(to);
        }

        builder
            .body(body)
            .map_err(|e| BackupError::Notify(e.to_string()))
    }

    fn transport(&self) -> Result<AsyncSmtpTransport<Tokio1Executor>> {
        let builder = if self.config.use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.config.host)
                .map_err(|e| BackupError::Notify(e.to_string()))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&self.config.host)
        };

        let mut builder = builder.port(self.config.port);
        if !self.config.user.is_empty() && !self.config.password.is_empty() {
            builder = builder.credentials(Credentials::new(
                self.config.user.clone(),
                self.config.password.clone(),
            ));
        }

        Ok(builder.build())
    }
}

#[async_trait]
impl Notifier for EmailNotifier {
    fn is_configured(&self) -> bool {
        !self.config.host.is_empty()
            && self.config.port != 0
            && !self.config.from.is_empty()
            && !self.recipients().is_empty()
    }

    async fn send_failure_alert(&self, message: &str) -> Result<()> {
        if !self.is_configured() {
            return Err(BackupError::Config("email alerts are not configured".to_string()));
        }

        let body = render_failure_alert(&self.app_name, self.clock.now(), message)?;
        let email = self.build_message(body)?;

        self.transport()?
            .send(email)
            .await
            .map_err(|e| BackupError::Notify(e.to_string()))?;

        info!(to = %self.config.to, "Backup failure alert sent");
        Ok(())
    }
}
