use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::Serialize;
use thiserror::Error;
use tracing::debug;
use url::Url;

use bizops_notify_core::{EmailBatch, EmailSender, SendError};

/// Client for the hosted "send email" function.
#[derive(Clone)]
pub struct HttpMailer {
    http: Client,
    base_url: Url,
    api_key: Option<String>,
    from: String,
}

impl HttpMailer {
    /// Creates a new mailer with the provided HTTP instance and configuration.
    pub fn new(base_url: Url, from: impl Into<String>, http: Client) -> Self {
        Self {
            http,
            base_url,
            api_key: None,
            from: from.into(),
        }
    }

    /// Sends `Authorization: Bearer <key>` with every request.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Posts one email addressed to every recipient of the request.
    pub async fn send(&self, request: &SendEmailRequest<'_>) -> Result<(), MailerError> {
        if request.to.is_empty() {
            return Err(MailerError::NoRecipients);
        }

        let url = self.base_url.join("send-email")?;
        let mut builder = self.http.post(url).json(request);
        if let Some(api_key) = &self.api_key {
            builder = builder.bearer_auth(api_key);
        }
        let response = builder.send().await?;

        ensure_success(response).await
    }
}

#[async_trait]
impl EmailSender for HttpMailer {
    async fn send_batch(&self, batch: &EmailBatch) -> Result<(), SendError> {
        let request = SendEmailRequest {
            from: &self.from,
            to: batch.addresses.iter().map(String::as_str).collect(),
            subject: &batch.title,
            message: &batch.message,
            priority: batch.priority.as_str(),
        };
        debug!(
            stage = "mailer",
            recipients = request.to.len(),
            priority = request.priority,
            "sending escalation email"
        );
        self.send(&request).await.map_err(SendError::from)
    }
}

/// Body accepted by the email function.
#[derive(Debug, Serialize)]
pub struct SendEmailRequest<'a> {
    pub from: &'a str,
    pub to: Vec<&'a str>,
    pub subject: &'a str,
    pub message: &'a str,
    pub priority: &'a str,
}

/// Email sender used when no mail endpoint is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledMailer;

#[async_trait]
impl EmailSender for DisabledMailer {
    async fn send_batch(&self, _batch: &EmailBatch) -> Result<(), SendError> {
        Err(SendError::Disabled)
    }
}

/// Errors produced by the mailer client.
#[derive(Debug, Error)]
pub enum MailerError {
    #[error("email request has no recipients")]
    NoRecipients,
    #[error("failed to build url: {0}")]
    Url(#[from] url::ParseError),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected status {status}: {body}")]
    Status { status: StatusCode, body: String },
}

impl From<MailerError> for SendError {
    fn from(err: MailerError) -> Self {
        match err {
            MailerError::NoRecipients => Self::Invalid("email request has no recipients".into()),
            MailerError::Url(err) => Self::Invalid(err.to_string()),
            MailerError::Http(err) => Self::Transport(err.to_string()),
            MailerError::Status { status, body } => Self::Rejected {
                status: status.as_u16(),
                body,
            },
        }
    }
}

async fn ensure_success(response: Response) -> Result<(), MailerError> {
    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<unavailable>"));
        return Err(MailerError::Status { status, body });
    }
    Ok(())
}
