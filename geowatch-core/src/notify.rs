//! Outbound notification intents.
//!
//! The crawl core never sends email or webhooks itself; it pushes typed
//! intents onto a channel consumed by an external delivery component.

use crate::types::UserId;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentKind {
    CheckupCompleted,
    DriftWarning,
    RetestReminder,
    QuotaWarning,
    RenewalReminder,
    WeeklyDigest,
    PaymentReceived,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationIntent {
    pub kind: IntentKind,
    pub recipient_user_id: UserId,
    pub title: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl NotificationIntent {
    pub fn new(
        kind: IntentKind,
        recipient_user_id: UserId,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            recipient_user_id,
            title: title.into(),
            message: message.into(),
            link: None,
            metadata: None,
        }
    }

    pub fn with_link(mut self, link: impl Into<String>) -> Self {
        self.link = Some(link.into());
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Cloneable producer half of the intent channel. Dropping every receiver
/// turns sends into no-ops rather than errors.
#[derive(Debug, Clone)]
pub struct Notifier {
    tx: mpsc::UnboundedSender<NotificationIntent>,
}

impl Notifier {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<NotificationIntent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// A notifier whose intents go nowhere; handy in tests and one-off tools.
    pub fn disconnected() -> Self {
        let (tx, _rx) = mpsc::unbounded_channel();
        Self { tx }
    }

    pub fn emit(&self, intent: NotificationIntent) {
        // Without a receiver the intent is dropped on the floor, which is
        // exactly what detached tools want.
        let _ = self.tx.send(intent);
    }
}
