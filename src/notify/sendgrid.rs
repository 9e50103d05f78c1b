use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::time::Duration;

use super::{Notifier, NotifyError, ALERT_TITLE};

pub const SENDGRID_API_URL: &str = "https://api.sendgrid.com/v3/mail/send";

/// Email alerts through the SendGrid v3 mail API
pub struct SendGridNotifier {
    client: Client,
    url: String,
    api_key: String,
    sender: String,
    recipient: String,
}

impl SendGridNotifier {
    pub fn new(api_key: &str, sender: &str, recipient: &str) -> Self {
        Self::with_url(SENDGRID_API_URL, api_key, sender, recipient)
    }

    pub fn with_url(url: impl Into<String>, api_key: &str, sender: &str, recipient: &str) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
            url: url.into(),
            api_key: api_key.to_string(),
            sender: sender.to_string(),
            recipient: recipient.to_string(),
        }
    }
}

#[async_trait]
impl Notifier for SendGridNotifier {
    async fn send(&self, message: &str) -> Result<(), NotifyError> {
        let payload = json!({
            "personalizations": [{ "to": [{ "email": self.recipient }] }],
            "from": { "email": self.sender },
            "subject": ALERT_TITLE,
            "content": [{ "type": "text/plain", "value": message }],
        });

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await?;

        // 202 Accepted on success
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Api {
                service: "sendgrid",
                status: status.as_u16(),
                body,
            });
        }

        tracing::debug!("Email notification sent to {}", self.recipient);
        Ok(())
    }
}
