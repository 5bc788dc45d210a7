use async_trait::async_trait;
use serde_json::json;

use crate::{Notifier, NotifyError};

/// Generic JSON webhook channel (Discord-compatible payload shape).
pub struct WebhookChannel {
    url: String,
    client: reqwest::Client,
    max_bytes: usize,
}

impl WebhookChannel {
    pub fn new(url: String, max_bytes: usize) -> Self {
        WebhookChannel { url, client: reqwest::Client::new(), max_bytes }
    }
}

#[async_trait]
impl Notifier for WebhookChannel {
    fn name(&self) -> &str {
        "webhook"
    }

    fn max_bytes(&self) -> Option<usize> {
        Some(self.max_bytes)
    }

    async fn send_text(&self, subject: &str, body: &str) -> Result<(), NotifyError> {
        let payload = json!({ "content": format!("**{subject}**\n{body}") });
        let response = self
            .client
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| NotifyError::Webhook(e.to_string()))?;
        if !response.status().is_success() {
            return Err(NotifyError::Webhook(format!("HTTP {}", response.status())));
        }
        Ok(())
    }
}

/// Email-shaped channel over an HTTP relay endpoint. The SMTP wire
/// itself stays outside this crate; the relay accepts
/// `{to, subject, body}` JSON.
pub struct EmailChannel {
    relay_url: String,
    recipients: Vec<String>,
    client: reqwest::Client,
    max_bytes: usize,
}

impl EmailChannel {
    pub fn new(relay_url: String, recipients: Vec<String>, max_bytes: usize) -> Self {
        EmailChannel { relay_url, recipients, client: reqwest::Client::new(), max_bytes }
    }
}

#[async_trait]
impl Notifier for EmailChannel {
    fn name(&self) -> &str {
        "email"
    }

    fn max_bytes(&self) -> Option<usize> {
        Some(self.max_bytes)
    }

    fn recipients(&self) -> Vec<String> {
        self.recipients.clone()
    }

    async fn send_text(&self, subject: &str, body: &str) -> Result<(), NotifyError> {
        let payload = json!({
            "to": self.recipients,
            "subject": subject,
            "body": body,
        });
        let response = self
            .client
            .post(&self.relay_url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| NotifyError::Email(e.to_string()))?;
        if !response.status().is_success() {
            return Err(NotifyError::Email(format!("HTTP {}", response.status())));
        }
        Ok(())
    }
}

/// Test channel that records everything it is asked to send.
#[derive(Default)]
pub struct RecordingChannel {
    pub name: String,
    pub recipients: Vec<String>,
    pub max_bytes: Option<usize>,
    pub sent: std::sync::Mutex<Vec<(String, String)>>,
}

impl RecordingChannel {
    pub fn new(name: &str, recipients: Vec<String>, max_bytes: Option<usize>) -> Self {
        RecordingChannel {
            name: name.to_string(),
            recipients,
            max_bytes,
            sent: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn messages(&self) -> Vec<(String, String)> {
        self.sent.lock().expect("recording lock").clone()
    }
}

#[async_trait]
impl Notifier for RecordingChannel {
    fn name(&self) -> &str {
        &self.name
    }

    fn max_bytes(&self) -> Option<usize> {
        self.max_bytes
    }

    fn recipients(&self) -> Vec<String> {
        self.recipients.clone()
    }

    async fn send_text(&self, subject: &str, body: &str) -> Result<(), NotifyError> {
        self.sent
            .lock()
            .expect("recording lock")
            .push((subject.to_string(), body.to_string()));
        Ok(())
    }
}
