//! Best-effort delivery of created tickets to the external task-routing
//! service. Dispatch is a one-way message send with no return channel: the
//! creation handler enqueues a [`Notification`] and never learns whether it
//! was delivered. Lost notifications are an accepted, logged loss.

use async_trait::async_trait;
use derive_more::{Display, From};
use serde::Serialize;
use time::OffsetDateTime;
use tokio::{sync::mpsc, task};

use crate::config;

/// Everything the task-routing service needs to assign a created ticket to
/// an agent.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub ticket_id: crate::api::ticket::Id,
    pub title: String,
    pub description: String,
    pub customer_name: String,
    pub customer_phone: String,
    pub origin: String,
    pub channel: &'static str,
    pub priority: Priority,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

pub const CHANNEL: &str = "support-ticket";

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    /// Fixed keyword buckets scanned over title and description,
    /// case-insensitively. The first matching bucket wins.
    pub fn for_content(title: &str, description: &str) -> Self {
        const HIGH: &[&str] = &["urgent", "emergency", "down"];
        const MEDIUM: &[&str] = &["bug", "error", "broken"];

        let content = format!("{title} {description}").to_lowercase();
        if HIGH.iter().any(|kw| content.contains(kw)) {
            Self::High
        } else if MEDIUM.iter().any(|kw| content.contains(kw)) {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

/// Maps the inbound request's `Referer` address to a partner tag.
///
/// Heuristic provenance only, not an authenticated identity: anything not
/// matching a known partner domain becomes `"Unknown"`.
pub fn origin(
    partners: &[config::Partner],
    referer: Option<&str>,
) -> String {
    referer
        .map(str::to_lowercase)
        .and_then(|referer| {
            partners
                .iter()
                .find(|p| referer.contains(&p.domain.to_lowercase()))
        })
        .map(|p| p.tag.clone())
        .unwrap_or_else(|| "Unknown".into())
}

#[derive(Debug, Display, derive_more::Error, From)]
pub enum Error {
    #[from]
    Http(reqwest::Error),

    #[display("sink is closed")]
    Closed,
}

/// Where notifications end up. Production uses [`HttpSink`]; tests
/// substitute a capturing fake.
#[async_trait]
pub trait Sink: Send + Sync + 'static {
    async fn deliver(&self, notification: &Notification)
        -> Result<(), Error>;
}

/// Authenticated HTTP POST to the configured task-routing endpoint.
pub struct HttpSink {
    http: reqwest::Client,
    endpoint: String,
    account_sid: String,
    auth_token: String,
}

impl HttpSink {
    pub fn new(config: config::Notifier) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: config.endpoint,
            account_sid: config.account_sid,
            auth_token: config.auth_token,
        }
    }
}

#[async_trait]
impl Sink for HttpSink {
    async fn deliver(
        &self,
        notification: &Notification,
    ) -> Result<(), Error> {
        self.http
            .post(&self.endpoint)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .json(notification)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

/// Handle for enqueueing notifications. A background worker drains the
/// queue into the sink; delivery failures are logged and discarded, never
/// retried.
#[derive(Clone)]
pub struct Notifier(mpsc::UnboundedSender<Notification>);

impl Notifier {
    pub fn spawn(sink: impl Sink) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Notification>();
        task::spawn(async move {
            while let Some(notification) = rx.recv().await {
                if let Err(e) = sink.deliver(&notification).await {
                    tracing::warn!(
                        ticket_id = %notification.ticket_id,
                        "failed to route ticket to support: {e}",
                    );
                }
            }
        });
        Self(tx)
    }

    /// Notifier with no worker behind it. Used when the task-routing
    /// section is missing from the configuration.
    pub fn disabled() -> Self {
        let (tx, _) = mpsc::unbounded_channel();
        Self(tx)
    }

    pub fn send(&self, notification: Notification) {
        // The receiver is gone when routing is disabled.
        let _ = self.0.send(notification);
    }
}
