use serde::Serialize;
use tracing::warn;

/// Fire-and-forget webhook sink. Failures are logged and swallowed — a
/// notification outage must never fail a backup or restore.
#[derive(Clone)]
pub struct NotificationSink {
    client: reqwest::Client,
    webhook_url: Option<String>,
}

#[derive(Serialize)]
pub struct BackupNotification<'a> {
    pub event: &'a str,
    pub server: &'a str,
    pub database: &'a str,
    pub backup_id: String,
    pub message: &'a str,
}

impl NotificationSink {
    pub fn new(webhook_url: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            webhook_url,
        }
    }

    pub async fn notify(&self, payload: &BackupNotification<'_>) {
        let Some(url) = &self.webhook_url else {
            return;
        };

        if let Err(err) = self.client.post(url).json(payload).send().await {
            warn!(error = %err, "webhook notification delivery failed");
        }
    }
}
