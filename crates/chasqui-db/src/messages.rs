use chasqui_common::types::OPTOUT_TAG;
use chasqui_common::{Contact, Error, Message, MessageDirection, MessageStatus, Result};
use chrono::{DateTime, Utc};
use rusqlite::{Row, params};
use tracing::info;

use crate::contacts::resolve_in_tx;
use crate::store::{Database, decode_err, parse_timestamp};

/// One inbound message event, already reduced to its text summary by the
/// ingestion layer.
#[derive(Debug, Clone)]
pub struct NewInbound {
    /// Provider-assigned message id; the dedup key.
    pub id: String,
    pub content_type: String,
    pub body: String,
    pub timestamp: DateTime<Utc>,
    pub sender_phone: String,
    pub sender_name: Option<String>,
    pub channel_id: Option<String>,
    /// The extracted text matched the reserved opt-out keyword.
    pub opt_out: bool,
}

#[derive(Debug)]
pub enum InboundOutcome {
    /// Message persisted; contact counters already reflect it.
    Recorded { message: Message, contact: Contact },
    /// Opt-out keyword: the contact was tagged, no message row was written.
    OptedOut { contact: Contact },
    /// The provider re-delivered an id we already stored. No-op.
    Duplicate,
}

impl Database {
    /// Records one inbound message atomically: contact resolution (with
    /// legacy-phone migration), the message row, and the contact's
    /// unread/last-active bump all commit or roll back together.
    ///
    /// Re-delivery of an already-stored provider id rolls the transaction
    /// back and reports [`InboundOutcome::Duplicate`].
    pub fn record_inbound(&self, inbound: NewInbound) -> Result<InboundOutcome> {
        let mut conn = self.connection()?;
        let tx = conn
            .transaction()
            .map_err(|e| Error::Database(format!("failed to start transaction: {e}")))?;

        let contact = resolve_in_tx(&tx, &inbound.sender_phone, inbound.sender_name.as_deref())?;

        if inbound.opt_out {
            let mut tags = contact.tags.clone();
            if !tags.iter().any(|t| t == OPTOUT_TAG) {
                tags.push(OPTOUT_TAG.to_string());
            }
            tx.execute(
                "UPDATE contacts SET tags = ? WHERE id = ?",
                params![serde_json::to_string(&tags)?, contact.id],
            )
            .map_err(|e| Error::Database(format!("failed to tag opt-out: {e}")))?;
            tx.commit()
                .map_err(|e| Error::Database(format!("failed to commit opt-out: {e}")))?;

            info!("contact {} opted out, tagged {OPTOUT_TAG}", contact.phone);
            return Ok(InboundOutcome::OptedOut {
                contact: Contact { tags, ..contact },
            });
        }

        let message = Message {
            id: inbound.id,
            direction: MessageDirection::Inbound,
            content_type: inbound.content_type,
            body: inbound.body,
            media_path: None,
            status: MessageStatus::Delivered,
            error: None,
            timestamp: inbound.timestamp,
            contact_id: contact.id.clone(),
            channel_id: inbound.channel_id,
        };

        let inserted = tx.execute(
            "INSERT INTO messages (id, direction, content_type, body, media_path, status, timestamp, contact_id, channel_id)
             VALUES (?, ?, ?, ?, NULL, ?, ?, ?, ?)",
            params![
                message.id,
                message.direction.as_str(),
                message.content_type,
                message.body,
                message.status.as_str(),
                message.timestamp.to_rfc3339(),
                message.contact_id,
                message.channel_id,
            ],
        );

        if let Err(e) = inserted {
            if is_unique_violation(&e) {
                // Same provider id delivered twice: dropping the transaction
                // also rolls back any contact-name refresh above.
                return Ok(InboundOutcome::Duplicate);
            }
            return Err(Error::Database(format!("failed to insert message: {e}")));
        }

        let now = Utc::now();
        tx.execute(
            "UPDATE contacts SET unread_count = unread_count + 1, last_active = ? WHERE id = ?",
            params![now.to_rfc3339(), contact.id],
        )
        .map_err(|e| Error::Database(format!("failed to bump contact counters: {e}")))?;

        tx.commit()
            .map_err(|e| Error::Database(format!("failed to commit inbound message: {e}")))?;

        let contact = Contact {
            unread_count: contact.unread_count + 1,
            last_active: now,
            ..contact
        };
        Ok(InboundOutcome::Recorded { message, contact })
    }

    /// Persists an outbound message (sent or failed) and refreshes the
    /// contact's last-active timestamp in the same transaction.
    pub fn insert_outbound(&self, message: &Message) -> Result<()> {
        let mut conn = self.connection()?;
        let tx = conn
            .transaction()
            .map_err(|e| Error::Database(format!("failed to start transaction: {e}")))?;

        tx.execute(
            "INSERT INTO messages (id, direction, content_type, body, media_path, status, error, timestamp, contact_id, channel_id)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                message.id,
                message.direction.as_str(),
                message.content_type,
                message.body,
                message.media_path,
                message.status.as_str(),
                message.error,
                message.timestamp.to_rfc3339(),
                message.contact_id,
                message.channel_id,
            ],
        )
        .map_err(|e| Error::Database(format!("failed to insert outbound message: {e}")))?;

        tx.execute(
            "UPDATE contacts SET last_active = ? WHERE id = ?",
            params![message.timestamp.to_rfc3339(), message.contact_id],
        )
        .map_err(|e| Error::Database(format!("failed to touch contact: {e}")))?;

        tx.commit()
            .map_err(|e| Error::Database(format!("failed to commit outbound message: {e}")))
    }

    /// Applies a provider delivery-status callback. Returns `false` when the
    /// message id is unknown (callbacks for ids we never stored are ignored).
    pub fn update_message_status(&self, message_id: &str, status: MessageStatus) -> Result<bool> {
        let conn = self.connection()?;
        let changed = conn
            .execute(
                "UPDATE messages SET status = ? WHERE id = ?",
                params![status.as_str(), message_id],
            )
            .map_err(|e| Error::Database(format!("failed to update message status: {e}")))?;
        Ok(changed > 0)
    }

    /// Media backfill: the only mutation allowed on a message after its
    /// terminal status.
    pub fn set_media_path(&self, message_id: &str, media_path: &str) -> Result<()> {
        let conn = self.connection()?;
        let changed = conn
            .execute(
                "UPDATE messages SET media_path = ? WHERE id = ?",
                params![media_path, message_id],
            )
            .map_err(|e| Error::Database(format!("failed to set media path: {e}")))?;
        if changed == 0 {
            return Err(Error::NotFound(format!("message {message_id}")));
        }
        Ok(())
    }

    pub fn get_message(&self, id: &str) -> Result<Message> {
        let conn = self.connection()?;
        conn.query_row(
            &format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?"),
            params![id],
            row_to_message,
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => Error::NotFound(format!("message {id}")),
            other => Error::Database(format!("failed to load message: {other}")),
        })
    }

    /// Chat history for one contact, ordered by timestamp.
    pub fn messages_for_contact(&self, contact_id: &str) -> Result<Vec<Message>> {
        let conn = self.connection()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages
                 WHERE contact_id = ?
                 ORDER BY datetime(timestamp) ASC"
            ))
            .map_err(|e| Error::Database(format!("failed to prepare history query: {e}")))?;

        let rows = stmt
            .query_map(params![contact_id], row_to_message)
            .map_err(|e| Error::Database(format!("failed to query history: {e}")))?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::Database(format!("failed to collect history: {e}")))
    }

    pub fn message_count(&self) -> Result<i64> {
        let conn = self.connection()?;
        conn.query_row("SELECT count(*) FROM messages", [], |row| row.get(0))
            .map_err(|e| Error::Database(format!("failed to count messages: {e}")))
    }
}

const MESSAGE_COLUMNS: &str =
    "id, direction, content_type, body, media_path, status, error, timestamp, contact_id, channel_id";

fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(inner, _)
            if inner.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

fn row_to_message(row: &Row<'_>) -> rusqlite::Result<Message> {
    let direction_str: String = row.get(1)?;
    let status_str: String = row.get(5)?;
    let timestamp_str: String = row.get(7)?;

    Ok(Message {
        id: row.get(0)?,
        direction: MessageDirection::from_db(&direction_str).map_err(decode_err)?,
        content_type: row.get(2)?,
        body: row.get(3)?,
        media_path: row.get(4)?,
        status: MessageStatus::from_db(&status_str).map_err(decode_err)?,
        error: row.get(6)?,
        timestamp: parse_timestamp(&timestamp_str).map_err(decode_err)?,
        contact_id: row.get(8)?,
        channel_id: row.get(9)?,
    })
}

#[cfg(test)]
mod tests {
    use super::{InboundOutcome, NewInbound};
    use chasqui_common::types::OPTOUT_TAG;
    use chasqui_common::{MessageStatus, phone};
    use chrono::Utc;

    use crate::store::Database;

    fn inbound(id: &str, phone: &str, body: &str) -> NewInbound {
        NewInbound {
            id: id.to_string(),
            content_type: "text".to_string(),
            body: body.to_string(),
            timestamp: Utc::now(),
            sender_phone: phone.to_string(),
            sender_name: Some("Renzo".to_string()),
            channel_id: None,
            opt_out: false,
        }
    }

    #[test]
    fn first_inbound_creates_contact_and_message() {
        let db = Database::in_memory().expect("in-memory database");

        let outcome = db
            .record_inbound(inbound("wamid.1", "5492645280229", "hola"))
            .expect("record should succeed");

        let InboundOutcome::Recorded { message, contact } = outcome else {
            panic!("expected Recorded outcome");
        };
        assert_eq!(contact.phone, "5492645280229");
        assert_eq!(contact.unread_count, 1);
        assert_eq!(message.body, "hola");
        assert_eq!(message.status, MessageStatus::Delivered);
        assert!(message.media_path.is_none());
    }

    #[test]
    fn duplicate_provider_id_is_a_no_op() {
        let db = Database::in_memory().expect("in-memory database");

        db.record_inbound(inbound("wamid.1", "5492645280229", "hola"))
            .expect("first record");
        let second = db
            .record_inbound(inbound("wamid.1", "5492645280229", "hola"))
            .expect("duplicate should not error");

        assert!(matches!(second, InboundOutcome::Duplicate));
        assert_eq!(db.message_count().expect("count"), 1);

        // The unread counter only moved once.
        let contacts = db.list_contacts().expect("list");
        assert_eq!(contacts[0].unread_count, 1);
    }

    #[test]
    fn legacy_contact_is_migrated_not_duplicated() {
        let db = Database::in_memory().expect("in-memory database");
        // Stored before normalization, in the bare 54 form.
        {
            let conn = db.connection().expect("lock");
            conn.execute(
                "INSERT INTO contacts (id, phone, name, last_active, tags) VALUES ('c-1', '542645280229', 'Renzo Original', ?, '[\"VIP\"]')",
                [Utc::now().to_rfc3339()],
            )
            .expect("seed legacy contact");
        }

        let outcome = db
            .record_inbound(inbound("wamid.2", "5492645280229", "hola de nuevo"))
            .expect("record");

        let InboundOutcome::Recorded { contact, .. } = outcome else {
            panic!("expected Recorded outcome");
        };
        assert_eq!(contact.id, "c-1");
        assert_eq!(contact.phone, "5492645280229");
        assert_eq!(contact.tags, vec!["VIP".to_string()]);
        assert_eq!(db.list_contacts().expect("list").len(), 1);
    }

    #[test]
    fn opt_out_tags_the_contact_and_writes_no_message() {
        let db = Database::in_memory().expect("in-memory database");
        db.record_inbound(inbound("wamid.1", "5492645280229", "hola"))
            .expect("first record");

        let mut baja = inbound("wamid.2", "5492645280229", "BAJA");
        baja.opt_out = true;
        let outcome = db.record_inbound(baja).expect("opt-out record");

        let InboundOutcome::OptedOut { contact } = outcome else {
            panic!("expected OptedOut outcome");
        };
        assert!(contact.tags.iter().any(|t| t == OPTOUT_TAG));
        assert_eq!(db.message_count().expect("count"), 1);
    }

    #[test]
    fn status_callback_updates_known_messages_only() {
        let db = Database::in_memory().expect("in-memory database");
        db.record_inbound(inbound("wamid.1", "5492645280229", "hola"))
            .expect("record");

        assert!(
            db.update_message_status("wamid.1", MessageStatus::Read)
                .expect("update")
        );
        assert!(
            !db.update_message_status("wamid.unknown", MessageStatus::Read)
                .expect("unknown id is ignored")
        );

        assert_eq!(
            db.get_message("wamid.1").expect("load").status,
            MessageStatus::Read
        );
    }

    #[test]
    fn history_is_ordered_by_timestamp() {
        let db = Database::in_memory().expect("in-memory database");
        let mut early = inbound("wamid.early", "5492645280229", "first");
        early.timestamp = Utc::now() - chrono::Duration::minutes(5);
        let late = inbound("wamid.late", "5492645280229", "second");

        db.record_inbound(late).expect("late");
        db.record_inbound(early).expect("early");

        let contact = &db.list_contacts().expect("list")[0];
        let history = db.messages_for_contact(&contact.id).expect("history");
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].body, "first");
        assert_eq!(history[1].body, "second");
    }

    #[test]
    fn wire_format_addresses_resolve_to_the_same_contact() {
        let db = Database::in_memory().expect("in-memory database");
        let canonical = "5492645280229";

        db.record_inbound(inbound("wamid.1", canonical, "hola"))
            .expect("canonical form");
        db.record_inbound(inbound("wamid.2", &phone::wire_format(canonical), "hola"))
            .expect("wire form");

        assert_eq!(db.list_contacts().expect("list").len(), 1);
    }
}
