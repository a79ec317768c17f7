/// Migration system for tracking and applying database schema changes.
///
/// Each migration has a version number and a SQL statement, applied in order
/// on open.
pub struct Migration {
    pub version: u32,
    pub name: &'static str,
    pub sql: &'static str,
}

pub const HUB_SCHEMA_V1: Migration = Migration {
    version: 1,
    name: "initial_schema",
    sql: "CREATE TABLE IF NOT EXISTS channels (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            phone_number TEXT NOT NULL,
            phone_id TEXT NOT NULL UNIQUE,
            access_token TEXT,
            app_secret TEXT,
            status TEXT NOT NULL DEFAULT 'CONNECTED'
        );

        CREATE TABLE IF NOT EXISTS contacts (
            id TEXT PRIMARY KEY,
            phone TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            avatar TEXT NOT NULL DEFAULT '',
            last_active TEXT NOT NULL,
            unread_count INTEGER NOT NULL DEFAULT 0,
            tags TEXT NOT NULL DEFAULT '[]',
            notes TEXT NOT NULL DEFAULT '',
            email TEXT,
            birthday TEXT,
            company TEXT,
            custom_fields TEXT NOT NULL DEFAULT '{}'
        );
        CREATE INDEX IF NOT EXISTS idx_contacts_last_active
            ON contacts(last_active);

        CREATE TABLE IF NOT EXISTS messages (
            id TEXT PRIMARY KEY,
            direction TEXT NOT NULL,
            content_type TEXT NOT NULL DEFAULT 'text',
            body TEXT NOT NULL DEFAULT '',
            media_path TEXT,
            status TEXT NOT NULL DEFAULT 'sent',
            error TEXT,
            timestamp TEXT NOT NULL,
            contact_id TEXT NOT NULL REFERENCES contacts(id),
            channel_id TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_messages_contact_ts
            ON messages(contact_id, timestamp);
        CREATE INDEX IF NOT EXISTS idx_messages_status
            ON messages(status);

        CREATE TABLE IF NOT EXISTS templates (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            language TEXT NOT NULL DEFAULT 'es',
            category TEXT,
            body TEXT
        );

        CREATE TABLE IF NOT EXISTS tags (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            color TEXT NOT NULL DEFAULT 'bg-gray-500'
        );

        CREATE TABLE IF NOT EXISTS campaigns (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            template_id TEXT NOT NULL,
            channel_id TEXT NOT NULL,
            target_tag TEXT,
            scheduled_at TEXT,
            delay_min INTEGER NOT NULL DEFAULT 2,
            delay_max INTEGER NOT NULL DEFAULT 8,
            recipient_count INTEGER NOT NULL DEFAULT 0,
            sent_count INTEGER NOT NULL DEFAULT 0,
            failed_count INTEGER NOT NULL DEFAULT 0,
            progress INTEGER NOT NULL DEFAULT 0,
            status TEXT NOT NULL DEFAULT 'SCHEDULED',
            created_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_campaigns_status
            ON campaigns(status, scheduled_at);",
};
