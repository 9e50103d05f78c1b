use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

use super::{Notifier, NotifyError, ALERT_TITLE};

pub const PUSHOVER_API_URL: &str = "https://api.pushover.net/1/messages.json";

/// Push notifications through Pushover
pub struct PushoverNotifier {
    client: Client,
    url: String,
    token: String,
    user: String,
}

impl PushoverNotifier {
    pub fn new(token: &str, user: &str) -> Self {
        Self::with_url(PUSHOVER_API_URL, token, user)
    }

    pub fn with_url(url: impl Into<String>, token: &str, user: &str) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
            url: url.into(),
            token: token.to_string(),
            user: user.to_string(),
        }
    }
}

#[async_trait]
impl Notifier for PushoverNotifier {
    async fn send(&self, message: &str) -> Result<(), NotifyError> {
        let form = [
            ("token", self.token.as_str()),
            ("user", self.user.as_str()),
            ("title", ALERT_TITLE),
            ("message", message),
        ];

        let response = self.client.post(&self.url).form(&form).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Api {
                service: "pushover",
                status: status.as_u16(),
                body,
            });
        }

        tracing::debug!("Push notification sent");
        Ok(())
    }
}
