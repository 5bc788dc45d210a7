use std::sync::Arc;
use std::time::Duration;

use analysis_core::AnalysisReport;

use crate::chunk::chunk_report;
use crate::format::render_report;
use crate::Notifier;

/// STOCK_GROUP_N -> EMAIL_GROUP_N routing table. Index-aligned; a stock
/// group without an email group falls through to every channel.
#[derive(Debug, Clone, Default)]
pub struct GroupRouting {
    pub stock_groups: Vec<Vec<String>>,
    pub email_groups: Vec<Vec<String>>,
}

impl GroupRouting {
    /// Emails a ticker's reports route to, or None for "all channels".
    fn emails_for(&self, ticker: &str) -> Option<&[String]> {
        let idx = self
            .stock_groups
            .iter()
            .position(|group| group.iter().any(|t| t == ticker))?;
        self.email_groups.get(idx).map(|v| v.as_slice())
    }
}

#[derive(Debug, Clone)]
pub struct DispatchPolicy {
    pub summary_only: bool,
    /// Merge a batch into one message per channel vs one per ticker.
    pub merge_batch: bool,
    pub routing: GroupRouting,
    /// Pause between chunk sends, to stay under channel rate limits.
    pub inter_chunk_delay: Duration,
}

impl Default for DispatchPolicy {
    fn default() -> Self {
        DispatchPolicy {
            summary_only: false,
            merge_batch: true,
            routing: GroupRouting::default(),
            inter_chunk_delay: Duration::from_millis(500),
        }
    }
}

/// Fans reports out to channels with routing and chunking.
pub struct Dispatcher {
    channels: Vec<Arc<dyn Notifier>>,
    policy: DispatchPolicy,
}

impl Dispatcher {
    pub fn new(channels: Vec<Arc<dyn Notifier>>, policy: DispatchPolicy) -> Self {
        Dispatcher { channels, policy }
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Dispatch one batch. Failed tickers are summarized in one line,
    /// never sent as reports.
    pub async fn dispatch_batch(&self, reports: &[AnalysisReport], failed: &[String]) {
        if self.channels.is_empty() || (reports.is_empty() && failed.is_empty()) {
            return;
        }

        if self.policy.merge_batch {
            let mut merged = String::new();
            for report in reports {
                merged.push_str(&render_report(report, self.policy.summary_only));
                merged.push_str("\n---\n\n");
            }
            if !failed.is_empty() {
                merged.push_str(&format!("{} ticker(s) failed: {}\n", failed.len(), failed.join(", ")));
            }
            let subject = format!("Watchlist analysis ({} reports)", reports.len());
            // Merged batches go to every channel; group routing applies
            // to per-ticker dispatch only.
            for channel in &self.channels {
                self.send_chunked(channel.as_ref(), &subject, &merged).await;
            }
            return;
        }

        for report in reports {
            self.dispatch_single(report).await;
        }
        if !failed.is_empty() {
            let line = format!("{} ticker(s) failed: {}", failed.len(), failed.join(", "));
            for channel in &self.channels {
                self.send_chunked(channel.as_ref(), "Watchlist analysis failures", &line).await;
            }
        }
    }

    /// Dispatch one report, honoring per-group email routing.
    pub async fn dispatch_single(&self, report: &AnalysisReport) {
        let body = render_report(report, self.policy.summary_only);
        let subject = format!("{} ({})", report.meta.name, report.meta.ticker);
        let routed = self.policy.routing.emails_for(&report.meta.ticker);

        for channel in &self.channels {
            if let Some(emails) = routed {
                let recipients = channel.recipients();
                // Email-class channels are filtered by group membership;
                // recipient-less channels receive everything.
                if !recipients.is_empty() && !recipients.iter().any(|r| emails.contains(r)) {
                    continue;
                }
            }
            self.send_chunked(channel.as_ref(), &subject, &body).await;
        }
    }

    /// Market reviews ignore group routing and go to every channel.
    pub async fn dispatch_market_review(&self, report: &AnalysisReport) {
        let body = render_report(report, self.policy.summary_only);
        let subject = format!("Market review: {}", report.meta.name);
        for channel in &self.channels {
            self.send_chunked(channel.as_ref(), &subject, &body).await;
        }
    }

    async fn send_chunked(&self, channel: &dyn Notifier, subject: &str, body: &str) {
        let chunks = match channel.max_bytes() {
            Some(limit) => chunk_report(body, limit),
            None => vec![body.to_string()],
        };
        let total = chunks.len();
        for (i, chunk) in chunks.into_iter().enumerate() {
            if let Err(e) = channel.send_text(subject, &chunk).await {
                tracing::warn!("channel {} failed on chunk {}/{}: {e}", channel.name(), i + 1, total);
                return;
            }
            if i + 1 < total {
                tokio::time::sleep(self.policy.inter_chunk_delay).await;
            }
        }
        tracing::debug!("sent {total} chunk(s) via {}", channel.name());
    }
}
