//! Outbound e-mail
//!
//! [`HttpMailer`] posts to a transactional mail API (Resend-compatible JSON
//! body, bearer token). Without configuration the server falls back to
//! [`LogMailer`], which only records what would have been sent.

use std::env;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum MailError {
    #[error("Mail transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Mail API rejected message ({status}): {body}")]
    Rejected { status: StatusCode, body: String },

    #[error("Mail API timeout after {0}s")]
    Timeout(u64),
}

impl MailError {
    /// Transport failures, throttling and server errors are worth retrying
    pub fn is_retryable(&self) -> bool {
        match self {
            MailError::Http(_) | MailError::Timeout(_) => true,
            MailError::Rejected { status, .. } => {
                status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct OutgoingEmail {
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub html: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), MailError>;

    /// Default sender address
    fn sender(&self) -> &str;

    /// Short name for health reporting
    fn kind(&self) -> &'static str;
}

pub struct HttpMailer {
    client: Client,
    url: String,
    token: String,
    from: String,
}

impl HttpMailer {
    /// Read `MAIL_API_URL`, `MAIL_API_TOKEN` and `MAIL_FROM`; `None` if the API is not configured
    pub fn from_env(timeout: Duration) -> Option<Result<Self, MailError>> {
        let url = env::var("MAIL_API_URL").ok().filter(|v| !v.is_empty())?;
        let token = env::var("MAIL_API_TOKEN").unwrap_or_default();
        let from = env::var("MAIL_FROM")
            .unwrap_or_else(|_| "SpendLocal <noreply@spendlocal.com>".to_string());
        Some(Self::new(url, token, from, timeout))
    }

    pub fn new(
        url: impl Into<String>,
        token: impl Into<String>,
        from: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, MailError> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            url: url.into(),
            token: token.into(),
            from: from.into(),
        })
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), MailError> {
        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.token)
            .json(email)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            info!(subject = %email.subject, to = ?email.to, "E-mail sent");
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(MailError::Rejected { status, body })
        }
    }

    fn sender(&self) -> &str {
        &self.from
    }

    fn kind(&self) -> &'static str {
        "http"
    }
}

/// Logs messages instead of sending them
pub struct LogMailer {
    from: String,
}

impl LogMailer {
    pub fn new(from: impl Into<String>) -> Self {
        Self { from: from.into() }
    }
}

impl Default for LogMailer {
    fn default() -> Self {
        Self::new("SpendLocal <noreply@spendlocal.com>")
    }
}

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), MailError> {
        info!(
            subject = %email.subject,
            to = ?email.to,
            bytes = email.html.len(),
            "Mail API not configured, message logged only"
        );
        Ok(())
    }

    fn sender(&self) -> &str {
        &self.from
    }

    fn kind(&self) -> &'static str {
        "log"
    }
}
