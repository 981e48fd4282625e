//! Outbound email over an HTTP mail API.
//!
//! Messages are posted as JSON (`from`, `to`, `subject`, `html`) with a
//! bearer key, the shape accepted by Resend-style transactional mail APIs.

use async_trait::async_trait;
use serde::Serialize;

use crate::config::EmailConfig;
use crate::providers::sanitize_http_error_body;
use crate::telegram::ui::escape_html;

/// A rendered email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    /// Recipient address.
    pub to: String,
    /// Subject line.
    pub subject: String,
    /// HTML body.
    pub html: String,
}

/// Errors from sending email.
#[derive(Debug, thiserror::Error)]
pub enum EmailError {
    /// HTTP transport failure.
    #[error("email request failed: {0}")]
    Request(#[from] reqwest::Error),
    /// The mail API rejected the message.
    #[error("email API returned status {status}: {body}")]
    HttpStatus {
        /// HTTP status code.
        status: u16,
        /// Sanitized response body.
        body: String,
    },
}

/// Anything that can deliver an [`OutgoingEmail`].
#[async_trait]
pub trait EmailSender: Send + Sync {
    /// Send one message.
    ///
    /// # Errors
    ///
    /// Returns [`EmailError`] when the message was not accepted.
    async fn send(&self, email: &OutgoingEmail) -> Result<(), EmailError>;
}

/// Mail API request body.
#[doc(hidden)]
#[derive(Debug, Serialize)]
pub struct EmailPayload<'a> {
    /// Sender.
    pub from: &'a str,
    /// Recipients.
    pub to: Vec<&'a str>,
    /// Subject line.
    pub subject: &'a str,
    /// HTML body.
    pub html: &'a str,
}

/// Build the JSON body for `email` sent from `from`.
#[doc(hidden)]
pub fn build_payload<'a>(from: &'a str, email: &'a OutgoingEmail) -> EmailPayload<'a> {
    EmailPayload {
        from,
        to: vec![email.to.as_str()],
        subject: &email.subject,
        html: &email.html,
    }
}

/// [`EmailSender`] posting to an HTTP mail API.
#[derive(Clone)]
pub struct HttpEmailSender {
    api_url: String,
    api_key: String,
    from: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for HttpEmailSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpEmailSender")
            .field("api_url", &self.api_url)
            .field("from", &self.from)
            .field("api_key", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

impl HttpEmailSender {
    /// Sender posting to `api_url`.
    pub fn new(api_url: String, api_key: String, from: String) -> Self {
        Self {
            api_url,
            api_key,
            from,
            client: reqwest::Client::new(),
        }
    }

    /// Build from config; `None` when no API key is configured.
    pub fn from_config(config: &EmailConfig) -> Option<Self> {
        let key = config.api_key.as_deref().map(str::trim).filter(|k| !k.is_empty())?;
        Some(Self::new(
            config.api_url.clone(),
            key.to_owned(),
            config.from.clone(),
        ))
    }
}

#[async_trait]
impl EmailSender for HttpEmailSender {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), EmailError> {
        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&build_payload(&self.from, email))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EmailError::HttpStatus {
                status: status.as_u16(),
                body: sanitize_http_error_body(&body),
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Templates
// ---------------------------------------------------------------------------

const ACCENT: &str = "#4A90E2";

fn wrap(title: &str, inner: &str) -> String {
    format!(
        "<div style=\"font-family: Arial, sans-serif; max-width: 600px; margin: 0 auto; padding: 20px;\">\
         <h2 style=\"color: {ACCENT};\">{title}</h2>{inner}\
         <hr style=\"border: none; border-top: 1px solid #eee; margin: 24px 0;\">\
         <p style=\"color: #999; font-size: 12px;\">Sent by AstraNote</p></div>"
    )
}

/// Verification email carrying `code`.
pub fn otp_email(to: &str, code: &str, expiry_minutes: i64) -> OutgoingEmail {
    let inner = format!(
        "<p>Your verification code is:</p>\
         <p style=\"font-size: 32px; font-weight: bold; letter-spacing: 6px; color: {ACCENT};\">{code}</p>\
         <p>The code expires in {expiry_minutes} minutes. If you did not request it, ignore this email.</p>",
        code = escape_html(code),
    );
    OutgoingEmail {
        to: to.to_owned(),
        subject: "Your AstraNote verification code".to_owned(),
        html: wrap("\u{1F510} Verify your email", &inner),
    }
}

/// Reminder email carrying the user's `message`.
pub fn reminder_email(to: &str, message: &str) -> OutgoingEmail {
    let inner = format!(
        "<p style=\"font-size: 18px; background: #f5f8fc; padding: 16px; border-left: 4px solid {ACCENT};\">{}</p>",
        escape_html(message),
    );
    OutgoingEmail {
        to: to.to_owned(),
        subject: "\u{23F0} Reminder".to_owned(),
        html: wrap("\u{23F0} Reminder", &inner),
    }
}
