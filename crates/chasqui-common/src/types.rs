use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A provider-registered sending identity (one business phone number).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Channel {
    pub id: String,
    pub name: String,
    /// Public phone number in display form.
    pub phone_number: String,
    /// Provider-side phone identifier used to address API calls and to match
    /// inbound webhook metadata.
    pub phone_id: String,
    #[serde(default, skip_serializing)]
    pub access_token: Option<String>,
    /// Webhook signing secret for this channel. A payload naming a channel
    /// that has no secret is rejected; the globally configured secret only
    /// covers payloads that name no known channel.
    #[serde(default, skip_serializing)]
    pub app_secret: Option<String>,
    pub status: ChannelStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChannelStatus {
    Connected,
    Disconnected,
}

impl ChannelStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connected => "CONNECTED",
            Self::Disconnected => "DISCONNECTED",
        }
    }

    pub fn from_db(value: &str) -> Result<Self> {
        match value {
            "CONNECTED" => Ok(Self::Connected),
            "DISCONNECTED" => Ok(Self::Disconnected),
            other => Err(Error::Database(format!("unknown channel status: {other}"))),
        }
    }
}

/// A conversational counterpart, keyed by canonical phone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contact {
    pub id: String,
    pub phone: String,
    pub name: String,
    pub avatar: String,
    pub last_active: DateTime<Utc>,
    pub unread_count: i64,
    pub tags: Vec<String>,
    pub notes: String,
    pub email: Option<String>,
    pub birthday: Option<NaiveDate>,
    pub company: Option<String>,
    pub custom_fields: serde_json::Value,
}

/// Reserved tag applied when a contact sends the opt-out keyword.
pub const OPTOUT_TAG: &str = "BLOCKED_OPTOUT";

/// One delivery unit in either direction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Provider-assigned id for inbound, provider-assigned-or-synthetic for
    /// outbound. This is the dedup key.
    pub id: String,
    pub direction: MessageDirection,
    pub content_type: String,
    pub body: String,
    pub media_path: Option<String>,
    pub status: MessageStatus,
    /// Provider error detail for failed outbound sends.
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub contact_id: String,
    pub channel_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageDirection {
    Inbound,
    Outbound,
}

impl MessageDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inbound => "inbound",
            Self::Outbound => "outbound",
        }
    }

    pub fn from_db(value: &str) -> Result<Self> {
        match value {
            "inbound" => Ok(Self::Inbound),
            "outbound" => Ok(Self::Outbound),
            other => Err(Error::Database(format!(
                "unknown message direction: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Pending,
    Sent,
    Delivered,
    Read,
    Failed,
}

impl MessageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Sent => "sent",
            Self::Delivered => "delivered",
            Self::Read => "read",
            Self::Failed => "failed",
        }
    }

    pub fn from_db(value: &str) -> Result<Self> {
        match value {
            "pending" => Ok(Self::Pending),
            "sent" => Ok(Self::Sent),
            "delivered" => Ok(Self::Delivered),
            "read" => Ok(Self::Read),
            "failed" => Ok(Self::Failed),
            other => Err(Error::Database(format!("unknown message status: {other}"))),
        }
    }

    /// Parses a provider status callback value. Same wire values as the
    /// database encoding.
    pub fn from_provider(value: &str) -> Option<Self> {
        Self::from_db(value).ok()
    }
}

/// A bulk-send job targeting a computed recipient segment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Campaign {
    pub id: String,
    pub name: String,
    pub template_id: String,
    pub channel_id: String,
    /// Tag filter; `None` targets every contact.
    pub target_tag: Option<String>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub delay_min: u64,
    pub delay_max: u64,
    pub recipient_count: i64,
    pub sent_count: i64,
    pub failed_count: i64,
    pub progress: i64,
    pub status: CampaignStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CampaignStatus {
    Scheduled,
    Sending,
    Sent,
    Failed,
    Cancelled,
}

impl CampaignStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scheduled => "SCHEDULED",
            Self::Sending => "SENDING",
            Self::Sent => "SENT",
            Self::Failed => "FAILED",
            Self::Cancelled => "CANCELLED",
        }
    }

    pub fn from_db(value: &str) -> Result<Self> {
        match value {
            "SCHEDULED" => Ok(Self::Scheduled),
            "SENDING" => Ok(Self::Sending),
            "SENT" => Ok(Self::Sent),
            "FAILED" => Ok(Self::Failed),
            "CANCELLED" => Ok(Self::Cancelled),
            other => Err(Error::Database(format!("unknown campaign status: {other}"))),
        }
    }
}

/// A pre-approved outbound message shape, referenced by campaigns. Managed
/// outside this system; only the record is persisted here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Template {
    pub id: String,
    /// Name as registered with the provider.
    pub name: String,
    pub language: String,
    pub category: Option<String>,
    pub body: Option<String>,
}

/// A CRM label, referenced by contact tag sets and campaign filters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tag {
    pub id: String,
    pub name: String,
    pub color: String,
}
