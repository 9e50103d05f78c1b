// Outbound alerts about trades and failures
pub mod pushover;
pub mod sendgrid;

pub use pushover::PushoverNotifier;
pub use sendgrid::SendGridNotifier;

use async_trait::async_trait;

use crate::config::NotificationConfig;

/// Title / subject line on every alert
pub const ALERT_TITLE: &str = "DCA Bot Alert";

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("network error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{service} rejected the message ({status}): {body}")]
    Api {
        service: &'static str,
        status: u16,
        body: String,
    },
}

/// Delivery of a plain-text message. Failures never affect trading.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, message: &str) -> Result<(), NotifyError>;
}

/// Writes alerts to the log only
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, message: &str) -> Result<(), NotifyError> {
        tracing::info!("🔔 {}", message);
        Ok(())
    }
}

/// Fans a message out to every channel
///
/// Each channel is attempted even when an earlier one fails; the first error is returned.
#[derive(Default)]
pub struct NotifierSet {
    channels: Vec<Box<dyn Notifier>>,
}

impl NotifierSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, channel: impl Notifier + 'static) -> Self {
        self.channels.push(Box::new(channel));
        self
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Channels enabled in config, always including the log
    pub fn from_config(config: &NotificationConfig) -> Self {
        let mut set = Self::new().with(LogNotifier);

        if let Some(pushover) = &config.pushover {
            set = set.with(PushoverNotifier::new(&pushover.token, &pushover.user));
        }
        if let Some(email) = &config.email {
            set = set.with(SendGridNotifier::new(
                &email.api_key,
                &email.sender,
                &email.recipient,
            ));
        }

        tracing::info!("🔔 {} notification channel(s) enabled", set.len());
        set
    }
}

#[async_trait]
impl Notifier for NotifierSet {
    async fn send(&self, message: &str) -> Result<(), NotifyError> {
        let mut first_error = None;

        for channel in &self.channels {
            if let Err(e) = channel.send(message).await {
                tracing::warn!("Notification channel failed: {}", e);
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EmailConfig, PushoverConfig};
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Recording(Arc<Mutex<Vec<String>>>);

    #[async_trait]
    impl Notifier for Recording {
        async fn send(&self, message: &str) -> Result<(), NotifyError> {
            self.0.lock().unwrap().push(message.to_string());
            Ok(())
        }
    }

    struct Failing;

    #[async_trait]
    impl Notifier for Failing {
        async fn send(&self, _message: &str) -> Result<(), NotifyError> {
            Err(NotifyError::Api {
                service: "test",
                status: 500,
                body: "down".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn test_set_reaches_every_channel_despite_failure() {
        let recorder = Recording::default();
        let set = NotifierSet::new().with(Failing).with(recorder.clone());

        let result = set.send("bought").await;

        assert!(matches!(result, Err(NotifyError::Api { status: 500, .. })));
        assert_eq!(*recorder.0.lock().unwrap(), vec!["bought".to_string()]);
    }

    #[tokio::test]
    async fn test_log_notifier_succeeds() {
        assert!(LogNotifier.send("hello").await.is_ok());
    }

    #[test]
    fn test_from_config_channel_count() {
        assert_eq!(NotifierSet::from_config(&NotificationConfig::default()).len(), 1);

        let config = NotificationConfig {
            pushover: Some(PushoverConfig {
                token: "t".to_string(),
                user: "u".to_string(),
            }),
            email: Some(EmailConfig {
                api_key: "k".to_string(),
                sender: "a@example.com".to_string(),
                recipient: "b@example.com".to_string(),
            }),
        };
        assert_eq!(NotifierSet::from_config(&config).len(), 3);
    }
}
