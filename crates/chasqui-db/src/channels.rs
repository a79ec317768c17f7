use chasqui_common::{Channel, ChannelStatus, Error, Result};
use rusqlite::{OptionalExtension, Row, params};
use tracing::warn;
use uuid::Uuid;

use crate::store::{Database, decode_err};

/// Insert shape for a new sending identity. Channel management itself lives
/// outside this system; this exists for bootstrap tooling and tests.
#[derive(Debug, Clone)]
pub struct NewChannel {
    pub name: String,
    pub phone_number: String,
    pub phone_id: String,
    pub access_token: Option<String>,
    pub app_secret: Option<String>,
}

impl Database {
    pub fn insert_channel(&self, new: NewChannel) -> Result<Channel> {
        let channel = Channel {
            id: Uuid::new_v4().to_string(),
            name: new.name,
            phone_number: new.phone_number,
            phone_id: new.phone_id,
            access_token: new.access_token,
            app_secret: new.app_secret,
            status: ChannelStatus::Connected,
        };

        let conn = self.connection()?;
        conn.execute(
            "INSERT INTO channels (id, name, phone_number, phone_id, access_token, app_secret, status)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            params![
                channel.id,
                channel.name,
                channel.phone_number,
                channel.phone_id,
                channel.access_token,
                channel.app_secret,
                channel.status.as_str(),
            ],
        )
        .map_err(|e| Error::Database(format!("failed to insert channel: {e}")))?;

        Ok(channel)
    }

    pub fn get_channel(&self, id: &str) -> Result<Channel> {
        let conn = self.connection()?;
        conn.query_row(
            &format!("SELECT {CHANNEL_COLUMNS} FROM channels WHERE id = ?"),
            params![id],
            row_to_channel,
        )
        .optional()
        .map_err(|e| Error::Database(format!("failed to load channel: {e}")))?
        .ok_or_else(|| Error::NotFound(format!("channel {id}")))
    }

    /// Resolves the receiving channel for an inbound webhook by the
    /// provider-side phone identifier.
    pub fn channel_by_phone_id(&self, phone_id: &str) -> Result<Option<Channel>> {
        let conn = self.connection()?;
        conn.query_row(
            &format!("SELECT {CHANNEL_COLUMNS} FROM channels WHERE phone_id = ?"),
            params![phone_id],
            row_to_channel,
        )
        .optional()
        .map_err(|e| Error::Database(format!("failed to query channel by phone id: {e}")))
    }

    pub fn list_channels(&self) -> Result<Vec<Channel>> {
        let conn = self.connection()?;
        let mut stmt = conn
            .prepare(&format!("SELECT {CHANNEL_COLUMNS} FROM channels ORDER BY name"))
            .map_err(|e| Error::Database(format!("failed to prepare channel list: {e}")))?;

        let rows = stmt
            .query_map([], row_to_channel)
            .map_err(|e| Error::Database(format!("failed to list channels: {e}")))?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::Database(format!("failed to collect channels: {e}")))
    }

    /// Flips a channel's connection status. Outside channel management, the
    /// only caller is the ingestion pipeline's account-ban handling.
    pub fn set_channel_status(&self, id: &str, status: ChannelStatus) -> Result<()> {
        let conn = self.connection()?;
        let changed = conn
            .execute(
                "UPDATE channels SET status = ? WHERE id = ?",
                params![status.as_str(), id],
            )
            .map_err(|e| Error::Database(format!("failed to update channel status: {e}")))?;

        if changed == 0 {
            warn!("status update for unknown channel {id}");
            return Err(Error::NotFound(format!("channel {id}")));
        }
        Ok(())
    }
}

const CHANNEL_COLUMNS: &str =
    "id, name, phone_number, phone_id, access_token, app_secret, status";

fn row_to_channel(row: &Row<'_>) -> rusqlite::Result<Channel> {
    let status_str: String = row.get(6)?;

    Ok(Channel {
        id: row.get(0)?,
        name: row.get(1)?,
        phone_number: row.get(2)?,
        phone_id: row.get(3)?,
        access_token: row.get(4)?,
        app_secret: row.get(5)?,
        status: ChannelStatus::from_db(&status_str).map_err(decode_err)?,
    })
}

#[cfg(test)]
mod tests {
    use super::NewChannel;
    use chasqui_common::ChannelStatus;

    use crate::store::Database;

    fn sample() -> NewChannel {
        NewChannel {
            name: "Ventas".to_string(),
            phone_number: "+54 264 400-1000".to_string(),
            phone_id: "111222333".to_string(),
            access_token: Some("token-a".to_string()),
            app_secret: Some("secret-a".to_string()),
        }
    }

    #[test]
    fn channel_round_trips_by_phone_id() {
        let db = Database::in_memory().expect("in-memory database");
        let created = db.insert_channel(sample()).expect("insert");

        let found = db
            .channel_by_phone_id("111222333")
            .expect("query")
            .expect("channel should exist");
        assert_eq!(found.id, created.id);
        assert_eq!(found.status, ChannelStatus::Connected);

        assert!(
            db.channel_by_phone_id("999")
                .expect("query")
                .is_none()
        );
    }

    #[test]
    fn account_ban_flips_status_to_disconnected() {
        let db = Database::in_memory().expect("in-memory database");
        let created = db.insert_channel(sample()).expect("insert");

        db.set_channel_status(&created.id, ChannelStatus::Disconnected)
            .expect("status flip");

        let reloaded = db.get_channel(&created.id).expect("reload");
        assert_eq!(reloaded.status, ChannelStatus::Disconnected);
    }
}
