//! Typed view of the provider's webhook envelope: an object carrying
//! entries, each with changes, each change holding messages, delivery
//! statuses, or an account-level update.

use chrono::{DateTime, Utc};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct WebhookPayload {
    #[serde(default)]
    pub object: Option<String>,
    #[serde(default)]
    pub entry: Vec<Entry>,
}

#[derive(Debug, Deserialize)]
pub struct Entry {
    #[serde(default)]
    pub changes: Vec<Change>,
}

#[derive(Debug, Deserialize)]
pub struct Change {
    pub value: ChangeValue,
}

#[derive(Debug, Deserialize)]
pub struct ChangeValue {
    #[serde(default)]
    pub metadata: Option<Metadata>,
    #[serde(default)]
    pub contacts: Vec<WebhookContact>,
    #[serde(default)]
    pub messages: Vec<InboundMessage>,
    #[serde(default)]
    pub statuses: Vec<StatusUpdate>,
    /// Present when the provider reports a ban or restriction on the
    /// receiving account.
    #[serde(default)]
    pub account_update: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct Metadata {
    #[serde(default)]
    pub phone_number_id: Option<String>,
    #[serde(default)]
    pub display_phone_number: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct WebhookContact {
    pub wa_id: String,
    #[serde(default)]
    pub profile: Option<Profile>,
}

#[derive(Debug, Deserialize)]
pub struct Profile {
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct InboundMessage {
    pub id: String,
    pub from: String,
    /// Provider timestamp: unix seconds as a string.
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub text: Option<TextContent>,
    #[serde(default)]
    pub button: Option<ButtonContent>,
    #[serde(default)]
    pub interactive: Option<InteractiveContent>,
    #[serde(default)]
    pub image: Option<MediaContent>,
    #[serde(default)]
    pub audio: Option<MediaContent>,
    #[serde(default)]
    pub video: Option<MediaContent>,
    #[serde(default)]
    pub document: Option<MediaContent>,
    #[serde(default)]
    pub sticker: Option<MediaContent>,
}

#[derive(Debug, Deserialize)]
pub struct TextContent {
    pub body: String,
}

#[derive(Debug, Deserialize)]
pub struct ButtonContent {
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct InteractiveContent {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub button_reply: Option<Reply>,
    #[serde(default)]
    pub list_reply: Option<Reply>,
}

#[derive(Debug, Deserialize)]
pub struct Reply {
    pub title: String,
}

#[derive(Debug, Deserialize)]
pub struct MediaContent {
    pub id: String,
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StatusUpdate {
    /// Message id the callback refers to.
    pub id: String,
    pub status: String,
}

impl InboundMessage {
    /// Human-readable summary of the typed payload: the text body, a button
    /// or interactive reply title, a media caption, or a bracketed type tag
    /// for non-text content without one.
    pub fn extract_text(&self) -> String {
        match self.kind.as_str() {
            "text" => self
                .text
                .as_ref()
                .map(|t| t.body.clone())
                .unwrap_or_default(),
            "button" => self
                .button
                .as_ref()
                .map(|b| b.text.clone())
                .unwrap_or_default(),
            "interactive" => self
                .interactive
                .as_ref()
                .and_then(|i| {
                    i.button_reply
                        .as_ref()
                        .or(i.list_reply.as_ref())
                        .map(|r| r.title.clone())
                })
                .unwrap_or_default(),
            "image" => caption_or(&self.image, "[IMAGE]"),
            "audio" => "[AUDIO]".to_string(),
            "video" => caption_or(&self.video, "[VIDEO]"),
            "document" => self
                .document
                .as_ref()
                .and_then(|d| d.caption.clone().or_else(|| d.filename.clone()))
                .unwrap_or_else(|| "[DOCUMENT]".to_string()),
            "sticker" => "[STICKER]".to_string(),
            other => format!("[{}]", other.to_uppercase()),
        }
    }

    /// Media object id, for the types that carry one.
    pub fn media_id(&self) -> Option<&str> {
        let content = match self.kind.as_str() {
            "image" => &self.image,
            "audio" => &self.audio,
            "video" => &self.video,
            "document" => &self.document,
            "sticker" => &self.sticker,
            _ => &None,
        };
        content.as_ref().map(|m| m.id.as_str())
    }

    /// Provider timestamp (unix seconds), falling back to now when absent or
    /// unparseable.
    pub fn provider_timestamp(&self) -> DateTime<Utc> {
        self.timestamp
            .as_deref()
            .and_then(|t| t.parse::<i64>().ok())
            .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
            .unwrap_or_else(Utc::now)
    }
}

fn caption_or(content: &Option<MediaContent>, fallback: &str) -> String {
    content
        .as_ref()
        .and_then(|m| m.caption.clone())
        .unwrap_or_else(|| fallback.to_string())
}

impl ChangeValue {
    /// Display name the provider reported for a sender, if any.
    pub fn display_name_for(&self, wa_id: &str) -> Option<String> {
        self.contacts
            .iter()
            .find(|c| c.wa_id == wa_id)
            .and_then(|c| c.profile.as_ref())
            .and_then(|p| p.name.clone())
    }
}

impl WebhookPayload {
    /// The provider phone identifier naming the receiving channel, taken
    /// from the first change that carries metadata.
    pub fn channel_phone_id(&self) -> Option<&str> {
        self.entry
            .iter()
            .flat_map(|e| e.changes.iter())
            .find_map(|c| c.value.metadata.as_ref())
            .and_then(|m| m.phone_number_id.as_deref())
    }
}
