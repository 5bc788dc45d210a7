mod channels;
mod chunk;
mod dispatch;
mod format;

pub use channels::{EmailChannel, RecordingChannel, WebhookChannel};
pub use chunk::chunk_report;
pub use dispatch::{DispatchPolicy, Dispatcher, GroupRouting};
pub use format::render_report;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("webhook error: {0}")]
    Webhook(String),
    #[error("email error: {0}")]
    Email(String),
    #[error("configuration error: {0}")]
    Config(String),
}

/// One notification transport. Channels with a byte limit receive
/// pre-chunked pages; `max_bytes` drives the chunker.
#[async_trait]
pub trait Notifier: Send + Sync {
    fn name(&self) -> &str;

    /// Hard per-message byte limit, None for unlimited.
    fn max_bytes(&self) -> Option<usize>;

    /// Recipients this channel serves (email-class channels); used by
    /// group routing. Empty means "all traffic".
    fn recipients(&self) -> Vec<String> {
        Vec::new()
    }

    async fn send_text(&self, subject: &str, body: &str) -> Result<(), NotifyError>;
}
