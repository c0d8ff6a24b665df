// Announcement boundary.
//
// The chat layer lives outside this crate; all we own is a webhook POST.
// Announcements are fire-and-forget: a down webhook never fails a trade.

use serde::Serialize;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
pub struct Announcement {
    pub id: Uuid,
    pub content: String,
}

impl Announcement {
    pub fn new(content: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            content,
        }
    }

    pub fn trade(market_id: i64, quantity: f64, share_type: &str, p_yes_before: f64, p_yes_after: f64) -> Self {
        Self::new(format!(
            "👀 Someone traded {} {} share(s) on market #{}. Δ P(yes) {:.2}% → {:.2}%",
            quantity.abs(),
            share_type,
            market_id,
            p_yes_before,
            p_yes_after,
        ))
    }

    pub fn status_change(market_id: i64, question: &str, status: &str) -> Self {
        Self::new(format!(
            "📣 Market #{} \"{}\" is now: {}",
            market_id, question, status
        ))
    }
}

#[derive(Clone)]
pub struct Notifier {
    webhook_url: Option<String>,
    client: reqwest::Client,
}

impl Notifier {
    pub fn new(webhook_url: Option<String>) -> Self {
        Self {
            webhook_url,
            client: reqwest::Client::new(),
        }
    }

    /// POST the announcement to the configured webhook, if any. Errors are
    /// logged and swallowed.
    pub async fn announce(&self, announcement: Announcement) {
        let url = match &self.webhook_url {
            Some(url) => url,
            None => {
                debug!(content = %announcement.content, "no webhook configured, announcement dropped");
                return;
            }
        };

        match self.client.post(url).json(&announcement).send().await {
            Ok(resp) if !resp.status().is_success() => {
                warn!(status = %resp.status(), "webhook rejected announcement");
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "webhook announcement failed"),
        }
    }
}
