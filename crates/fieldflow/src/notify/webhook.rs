use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};

use super::{Channel, Envelope, LogNotifier, Notifier, NotifyError};
use crate::config::NotifySettings;

/// POSTs each envelope as JSON to the channel's configured URL.
pub struct WebhookNotifier {
    http: Client,
    urls: HashMap<Channel, String>,
    fallback: LogNotifier,
}

impl WebhookNotifier {
    pub fn new(settings: &NotifySettings, timeout: Duration) -> Result<Self, NotifyError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NotifyError::Http(e.to_string()))?;

        let urls = [
            (Channel::Customer, &settings.customer_webhook_url),
            (Channel::Office, &settings.office_webhook_url),
            (Channel::Accounting, &settings.accounting_webhook_url),
        ]
        .into_iter()
        .filter_map(|(channel, url)| url.clone().map(|u| (channel, u)))
        .collect();

        Ok(Self {
            http,
            urls,
            fallback: LogNotifier,
        })
    }

    pub fn has_url(&self, channel: Channel) -> bool {
        self.urls.contains_key(&channel)
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, channel: Channel, envelope: &Envelope) -> Result<(), NotifyError> {
        let Some(url) = self.urls.get(&channel) else {
            return self.fallback.send(channel, envelope).await;
        };

        let resp = self
            .http
            .post(url)
            .json(envelope)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    NotifyError::Timeout
                } else {
                    NotifyError::Http(e.to_string())
                }
            })?;

        match resp.status() {
            s if s.is_success() => {
                tracing::debug!(%channel, event = envelope.event, "notification delivered");
                Ok(())
            }
            StatusCode::TOO_MANY_REQUESTS => Err(NotifyError::RateLimited),
            s => Err(NotifyError::Rejected { status: s.as_u16() }),
        }
    }
}
