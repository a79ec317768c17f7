use std::sync::Arc;

use chasqui_common::{Channel, ChannelStatus, Event, EventBus, MessageStatus, Result};
use chasqui_db::{Database, InboundOutcome, NewInbound};
use chasqui_provider::{MediaFetcher, resolve_credentials};
use tracing::{debug, info, warn};

use crate::payload::{ChangeValue, InboundMessage, StatusUpdate, WebhookPayload};

/// Reserved keyword a contact sends to stop receiving messages.
pub const OPTOUT_KEYWORD: &str = "BAJA";

/// The inbound pipeline. Signature verification happens upstream, on the raw
/// request bytes; this component takes the parsed envelope and runs contact
/// resolution, transactional persistence, opt-out handling, event emission,
/// and the detached media backfill.
pub struct MessageIngestor {
    db: Arc<Database>,
    events: Arc<dyn EventBus>,
    media: Arc<MediaFetcher>,
}

impl MessageIngestor {
    pub fn new(db: Arc<Database>, events: Arc<dyn EventBus>, media: Arc<MediaFetcher>) -> Self {
        Self { db, events, media }
    }

    /// Processes every change in a verified webhook payload. Individual
    /// message failures are isolated: one bad change does not abort the
    /// rest of the envelope.
    pub fn process(&self, payload: &WebhookPayload) -> Result<()> {
        for entry in &payload.entry {
            for change in &entry.changes {
                let value = &change.value;

                let channel = value
                    .metadata
                    .as_ref()
                    .and_then(|m| m.phone_number_id.as_deref())
                    .and_then(|phone_id| match self.db.channel_by_phone_id(phone_id) {
                        Ok(found) => found,
                        Err(e) => {
                            warn!("channel lookup failed for {phone_id}: {e}");
                            None
                        }
                    });

                if let Some(update) = &value.account_update {
                    self.handle_account_update(channel.as_ref(), update);
                }

                for status in &value.statuses {
                    self.handle_status(status);
                }

                for message in &value.messages {
                    if let Err(e) = self.handle_message(value, channel.as_ref(), message) {
                        warn!("failed to ingest message {}: {e}", message.id);
                    }
                }
            }
        }

        Ok(())
    }

    fn handle_message(
        &self,
        value: &ChangeValue,
        channel: Option<&Channel>,
        message: &InboundMessage,
    ) -> Result<()> {
        let text = message.extract_text();
        let opt_out = text.eq_ignore_ascii_case(OPTOUT_KEYWORD);

        let outcome = self.db.record_inbound(NewInbound {
            id: message.id.clone(),
            content_type: message.kind.clone(),
            body: text,
            timestamp: message.provider_timestamp(),
            sender_phone: message.from.clone(),
            sender_name: value.display_name_for(&message.from),
            channel_id: channel.map(|c| c.id.clone()),
            opt_out,
        })?;

        match outcome {
            InboundOutcome::Recorded { message: stored, contact } => {
                info!(
                    "message {} from {} [{}] recorded",
                    stored.id,
                    contact.phone,
                    channel.map(|c| c.name.as_str()).unwrap_or("unknown channel"),
                );

                self.events.emit(Event::NewMessage {
                    message: stored.clone(),
                });
                self.events.emit(Event::ContactUpdated {
                    contact: contact.clone(),
                });

                if let Some(media_id) = message.media_id() {
                    self.spawn_media_backfill(channel, media_id, &stored.id, &contact.id);
                }
            }
            InboundOutcome::OptedOut { contact } => {
                info!("contact {} opted out via keyword", contact.phone);
                self.events.emit(Event::ContactUpdated { contact });
            }
            InboundOutcome::Duplicate => {
                debug!("duplicate delivery of message {}, ignoring", message.id);
            }
        }

        Ok(())
    }

    /// Media retrieval is best-effort and never blocks ingestion: no
    /// channel or no credentials simply skips the backfill.
    fn spawn_media_backfill(
        &self,
        channel: Option<&Channel>,
        media_id: &str,
        message_id: &str,
        contact_id: &str,
    ) {
        let Some(channel) = channel else {
            warn!("no channel resolved, skipping media backfill for {media_id}");
            return;
        };

        match resolve_credentials(channel) {
            Ok(creds) => self.media.spawn_fetch(
                creds,
                media_id.to_string(),
                message_id.to_string(),
                contact_id.to_string(),
            ),
            Err(e) => warn!("skipping media backfill for {media_id}: {e}"),
        }
    }

    fn handle_status(&self, status: &StatusUpdate) {
        let Some(parsed) = MessageStatus::from_provider(&status.status) else {
            warn!("unknown delivery status '{}' for {}", status.status, status.id);
            return;
        };

        match self.db.update_message_status(&status.id, parsed) {
            Ok(true) => {
                info!("message {} -> {}", status.id, parsed.as_str());
                self.events.emit(Event::MessageStatusUpdate {
                    message_id: status.id.clone(),
                    status: parsed,
                });
            }
            Ok(false) => debug!("status callback for unknown message {}", status.id),
            Err(e) => warn!("failed to apply status callback for {}: {e}", status.id),
        }
    }

    /// The one place outside channel management allowed to flip a channel's
    /// connection status.
    fn handle_account_update(&self, channel: Option<&Channel>, update: &serde_json::Value) {
        let detail = update.to_string();

        let Some(channel) = channel else {
            warn!("account update for unresolved channel: {detail}");
            return;
        };

        warn!("provider reported account issue on channel {}: {detail}", channel.name);
        if let Err(e) = self
            .db
            .set_channel_status(&channel.id, ChannelStatus::Disconnected)
        {
            warn!("failed to disconnect channel {}: {e}", channel.id);
        }

        self.events.emit(Event::ChannelIssue {
            channel_id: channel.id.clone(),
            detail,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::MessageIngestor;
    use chasqui_common::types::OPTOUT_TAG;
    use chasqui_common::{ChannelStatus, MessageStatus, NoopEventBus};
    use chasqui_db::{Database, channels::NewChannel};
    use chasqui_provider::{MediaFetcher, OutboundGateway};
    use std::sync::Arc;
    use std::time::Duration;

    fn ingestor_with_db() -> (MessageIngestor, Arc<Database>) {
        let db = Arc::new(Database::in_memory().expect("in-memory database"));
        let gateway = Arc::new(
            OutboundGateway::new("http://127.0.0.1:0", Duration::from_secs(1))
                .expect("client should build"),
        );
        let media = Arc::new(MediaFetcher::new(
            gateway,
            Arc::clone(&db),
            Arc::new(NoopEventBus),
            std::env::temp_dir(),
        ));
        let ingestor = MessageIngestor::new(Arc::clone(&db), Arc::new(NoopEventBus), media);
        (ingestor, db)
    }

    fn text_payload(message_id: &str, from: &str, body: &str) -> super::WebhookPayload {
        serde_json::from_value(serde_json::json!({
            "object": "whatsapp_business_account",
            "entry": [{ "changes": [{ "value": {
                "metadata": { "phone_number_id": "111222333" },
                "contacts": [{ "wa_id": from, "profile": { "name": "Renzo" } }],
                "messages": [{
                    "id": message_id,
                    "from": from,
                    "timestamp": "1722945600",
                    "type": "text",
                    "text": { "body": body },
                }],
            }}]}],
        }))
        .expect("payload should parse")
    }

    #[tokio::test]
    async fn first_text_message_creates_contact_and_history() {
        let (ingestor, db) = ingestor_with_db();

        ingestor
            .process(&text_payload("wamid.1", "5492645280229", "hola"))
            .expect("process should succeed");

        let contacts = db.list_contacts().expect("list contacts");
        assert_eq!(contacts.len(), 1);
        assert_eq!(contacts[0].phone, "5492645280229");
        assert_eq!(contacts[0].name, "Renzo");
        assert_eq!(contacts[0].unread_count, 1);

        let history = db
            .messages_for_contact(&contacts[0].id)
            .expect("history");
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].body, "hola");
        assert_eq!(history[0].status, MessageStatus::Delivered);
    }

    #[tokio::test]
    async fn optout_keyword_tags_without_storing_a_message() {
        let (ingestor, db) = ingestor_with_db();

        ingestor
            .process(&text_payload("wamid.1", "5492645280229", "hola"))
            .expect("first message");
        ingestor
            .process(&text_payload("wamid.2", "5492645280229", "baja"))
            .expect("opt-out message");

        let contacts = db.list_contacts().expect("list");
        assert!(contacts[0].tags.iter().any(|t| t == OPTOUT_TAG));
        assert_eq!(db.message_count().expect("count"), 1);
    }

    #[tokio::test]
    async fn reprocessing_the_same_payload_is_idempotent() {
        let (ingestor, db) = ingestor_with_db();
        let payload = text_payload("wamid.1", "5492645280229", "hola");

        ingestor.process(&payload).expect("first delivery");
        ingestor.process(&payload).expect("redelivery");

        assert_eq!(db.message_count().expect("count"), 1);
        assert_eq!(db.list_contacts().expect("list")[0].unread_count, 1);
    }

    #[tokio::test]
    async fn status_callbacks_update_stored_messages() {
        let (ingestor, db) = ingestor_with_db();
        ingestor
            .process(&text_payload("wamid.1", "5492645280229", "hola"))
            .expect("seed message");

        let callback: super::WebhookPayload = serde_json::from_value(serde_json::json!({
            "entry": [{ "changes": [{ "value": {
                "statuses": [
                    { "id": "wamid.1", "status": "read" },
                    { "id": "wamid.unknown", "status": "delivered" },
                ],
            }}]}],
        }))
        .expect("callback should parse");

        ingestor.process(&callback).expect("status processing");
        assert_eq!(
            db.get_message("wamid.1").expect("load").status,
            MessageStatus::Read
        );
    }

    #[tokio::test]
    async fn account_update_disconnects_the_owning_channel() {
        let (ingestor, db) = ingestor_with_db();
        let channel = db
            .insert_channel(NewChannel {
                name: "Ventas".to_string(),
                phone_number: "+54 264 400-1000".to_string(),
                phone_id: "111222333".to_string(),
                access_token: Some("tok".to_string()),
                app_secret: None,
            })
            .expect("insert channel");

        let payload: super::WebhookPayload = serde_json::from_value(serde_json::json!({
            "entry": [{ "changes": [{ "value": {
                "metadata": { "phone_number_id": "111222333" },
                "account_update": { "event": "DISABLED" },
            }}]}],
        }))
        .expect("payload should parse");

        ingestor.process(&payload).expect("process");
        assert_eq!(
            db.get_channel(&channel.id).expect("reload").status,
            ChannelStatus::Disconnected
        );
    }

    #[tokio::test]
    async fn media_message_without_credentials_still_records_the_text_fallback() {
        let (ingestor, db) = ingestor_with_db();

        let payload: super::WebhookPayload = serde_json::from_value(serde_json::json!({
            "entry": [{ "changes": [{ "value": {
                "messages": [{
                    "id": "wamid.media",
                    "from": "5492645280229",
                    "type": "image",
                    "image": { "id": "media-1" },
                }],
            }}]}],
        }))
        .expect("payload should parse");

        ingestor.process(&payload).expect("process");

        let message = db.get_message("wamid.media").expect("load");
        assert_eq!(message.body, "[IMAGE]");
        assert!(message.media_path.is_none());
    }
}
