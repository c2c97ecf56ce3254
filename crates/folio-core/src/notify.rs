//! Contact notification email through the Resend HTTP API.

use crate::config::MailSettings;
use crate::contact::ContactRow;
use crate::error::NotifyError;
use serde::Deserialize;
use std::time::Duration;

const RESEND_URL: &str = "https://api.resend.com/emails";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifyOutcome {
    Sent { id: String },
    /// Mail settings incomplete; nothing was sent.
    Skipped,
}

#[derive(Deserialize)]
struct SendResponse {
    #[serde(default)]
    id: String,
}

pub struct ContactNotifier {
    client: reqwest::Client,
    settings: MailSettings,
    endpoint: String,
}

impl ContactNotifier {
    pub fn new(settings: MailSettings) -> Self {
        Self::with_endpoint(settings, RESEND_URL)
    }

    pub fn with_endpoint(settings: MailSettings, endpoint: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            settings,
            endpoint: endpoint.into(),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.settings.is_configured()
    }

    pub async fn notify(&self, contact: &ContactRow) -> Result<NotifyOutcome, NotifyError> {
        let (Some(api_key), Some(recipient)) = (&self.settings.api_key, &self.settings.recipient) else {
            tracing::warn!(target: "folio::contact", id = contact.id, "Mail not configured; notification skipped");
            return Ok(NotifyOutcome::Skipped);
        };

        let body = serde_json::json!({
            "from": self.settings.from,
            "to": [recipient],
            "reply_to": contact.email,
            "subject": format!("New Contact: {}", contact.subject),
            "html": render_html(contact),
        });
        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(NotifyError::Api {
                status: status.as_u16(),
                body,
            });
        }
        let sent: SendResponse = resp.json().await?;
        tracing::info!(target: "folio::contact", id = contact.id, email_id = %sent.id, "Notification sent");
        Ok(NotifyOutcome::Sent { id: sent.id })
    }
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

fn render_html(c: &ContactRow) -> String {
    let phone = c
        .phone
        .as_deref()
        .map(|p| format!("<p><strong>Phone:</strong> {}</p>", html_escape(p)))
        .unwrap_or_default();
    let received = chrono::DateTime::from_timestamp_millis(c.created_at_ms)
        .map(|t| t.format("%Y-%m-%d %H:%M UTC").to_string())
        .unwrap_or_default();
    format!(
        r#"<h2>New Contact Form Submission</h2>
<p><strong>Subject:</strong> {subject}</p>
<p><strong>Name:</strong> {name}</p>
<p><strong>Email:</strong> <a href="mailto:{email}">{email}</a></p>
{phone}<p><strong>Message:</strong></p>
<pre style="white-space: pre-wrap">{message}</pre>
<p style="color:#666;font-size:12px">Received {received}</p>"#,
        subject = html_escape(&c.subject),
        name = html_escape(&c.name),
        email = html_escape(&c.email),
        phone = phone,
        message = html_escape(&c.message),
        received = received,
    )
}
