use serde::{Deserialize, Serialize};

use crate::types::{Contact, Message, MessageStatus};

/// A real-time notification for connected subscribers.
///
/// Delivery is fire-and-forget and at-most-once: a disconnected subscriber
/// silently misses events, and the REST API is the source of truth for
/// catch-up. The serialized form is the WebSocket wire shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    NewMessage {
        message: Message,
    },
    MessageStatusUpdate {
        message_id: String,
        status: MessageStatus,
    },
    /// Media backfill completed; subscribers can patch the one message
    /// instead of reloading the contact's history.
    MessageUpdated {
        message_id: String,
        contact_id: String,
        media_path: String,
    },
    ContactUpdated {
        contact: Contact,
    },
    CampaignProgress {
        campaign_id: String,
        progress: i64,
        sent_count: i64,
        failed_count: i64,
        total: i64,
    },
    /// Critical account alert: the provider reported a ban or restriction on
    /// a channel.
    ChannelIssue {
        channel_id: String,
        detail: String,
    },
}

impl Event {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NewMessage { .. } => "new_message",
            Self::MessageStatusUpdate { .. } => "message_status_update",
            Self::MessageUpdated { .. } => "message_updated",
            Self::ContactUpdated { .. } => "contact_updated",
            Self::CampaignProgress { .. } => "campaign_progress",
            Self::ChannelIssue { .. } => "channel_issue",
        }
    }
}

/// Broadcast seam between the pipelines and the real-time layer.
///
/// Emission never fails and never blocks: implementations drop events when no
/// subscriber is listening.
pub trait EventBus: Send + Sync {
    fn emit(&self, event: Event);
}

/// Discards every event. Used in tests and headless tooling.
pub struct NoopEventBus;

impl EventBus for NoopEventBus {
    fn emit(&self, _event: Event) {}
}
