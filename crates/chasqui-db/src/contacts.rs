use chasqui_common::{Contact, Error, Result, phone};
use chrono::{NaiveDate, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use tracing::info;
use uuid::Uuid;

use crate::store::{Database, decode_err, parse_timestamp};

/// Field-level update for a contact; `None` leaves the column untouched.
#[derive(Debug, Default, Clone)]
pub struct ContactPatch {
    pub name: Option<String>,
    pub tags: Option<Vec<String>>,
    pub notes: Option<String>,
    pub unread_count: Option<i64>,
    pub email: Option<String>,
    pub birthday: Option<NaiveDate>,
    pub company: Option<String>,
    pub custom_fields: Option<serde_json::Value>,
}

impl Database {
    /// Manual contact creation: find-or-create by canonical phone. An
    /// existing contact gets the provided fields merged in.
    pub fn create_contact(
        &self,
        raw_phone: &str,
        name: Option<&str>,
        tags: Vec<String>,
        notes: Option<&str>,
    ) -> Result<Contact> {
        let canonical = phone::canonicalize(raw_phone);
        if canonical.is_empty() {
            return Err(Error::Other("phone is required".into()));
        }

        let conn = self.connection()?;
        if let Some(existing) = contact_by_phone(&conn, &canonical)? {
            let merged_name = name.unwrap_or(&existing.name);
            let merged_notes = notes.unwrap_or(&existing.notes);
            let tags_json = serde_json::to_string(if tags.is_empty() {
                &existing.tags
            } else {
                &tags
            })?;
            conn.execute(
                "UPDATE contacts SET name = ?, tags = ?, notes = ? WHERE id = ?",
                params![merged_name, tags_json, merged_notes, existing.id],
            )
            .map_err(|e| Error::Database(format!("failed to update contact: {e}")))?;
            return contact_by_id(&conn, &existing.id)?
                .ok_or_else(|| Error::NotFound(format!("contact {}", existing.id)));
        }

        let contact = insert_contact(&conn, &canonical, name, tags, notes.unwrap_or(""))?;
        Ok(contact)
    }

    pub fn get_contact(&self, id: &str) -> Result<Contact> {
        let conn = self.connection()?;
        contact_by_id(&conn, id)?.ok_or_else(|| Error::NotFound(format!("contact {id}")))
    }

    /// Contacts ordered by most recent activity, newest first.
    pub fn list_contacts(&self) -> Result<Vec<Contact>> {
        let conn = self.connection()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {CONTACT_COLUMNS} FROM contacts ORDER BY datetime(last_active) DESC"
            ))
            .map_err(|e| Error::Database(format!("failed to prepare contact list: {e}")))?;

        let rows = stmt
            .query_map([], row_to_contact)
            .map_err(|e| Error::Database(format!("failed to list contacts: {e}")))?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::Database(format!("failed to collect contacts: {e}")))
    }

    pub fn update_contact(&self, id: &str, patch: ContactPatch) -> Result<Contact> {
        let conn = self.connection()?;
        let current =
            contact_by_id(&conn, id)?.ok_or_else(|| Error::NotFound(format!("contact {id}")))?;

        let tags_json = serde_json::to_string(patch.tags.as_ref().unwrap_or(&current.tags))?;
        let custom_json = serde_json::to_string(
            patch
                .custom_fields
                .as_ref()
                .unwrap_or(&current.custom_fields),
        )?;
        let birthday = patch
            .birthday
            .or(current.birthday)
            .map(|d| d.format("%Y-%m-%d").to_string());

        conn.execute(
            "UPDATE contacts
             SET name = ?, tags = ?, notes = ?, unread_count = ?, email = ?,
                 birthday = ?, company = ?, custom_fields = ?
             WHERE id = ?",
            params![
                patch.name.unwrap_or(current.name),
                tags_json,
                patch.notes.unwrap_or(current.notes),
                patch.unread_count.unwrap_or(current.unread_count),
                patch.email.or(current.email),
                birthday,
                patch.company.or(current.company),
                custom_json,
                id,
            ],
        )
        .map_err(|e| Error::Database(format!("failed to update contact: {e}")))?;

        contact_by_id(&conn, id)?.ok_or_else(|| Error::NotFound(format!("contact {id}")))
    }

    /// Deletes a contact and purges its message history in one transaction.
    pub fn delete_contact(&self, id: &str) -> Result<()> {
        let mut conn = self.connection()?;
        let tx = conn
            .transaction()
            .map_err(|e| Error::Database(format!("failed to start transaction: {e}")))?;

        tx.execute("DELETE FROM messages WHERE contact_id = ?", params![id])
            .map_err(|e| Error::Database(format!("failed to purge messages: {e}")))?;
        let deleted = tx
            .execute("DELETE FROM contacts WHERE id = ?", params![id])
            .map_err(|e| Error::Database(format!("failed to delete contact: {e}")))?;

        if deleted == 0 {
            return Err(Error::NotFound(format!("contact {id}")));
        }

        tx.commit()
            .map_err(|e| Error::Database(format!("failed to commit delete: {e}")))?;
        info!("deleted contact {id} and its messages");
        Ok(())
    }

    pub fn all_contacts(&self) -> Result<Vec<Contact>> {
        self.list_contacts()
    }

    /// Contacts whose tag set contains `tag`.
    pub fn contacts_with_tag(&self, tag: &str) -> Result<Vec<Contact>> {
        Ok(self
            .list_contacts()?
            .into_iter()
            .filter(|c| c.tags.iter().any(|t| t == tag))
            .collect())
    }
}

pub(crate) const CONTACT_COLUMNS: &str =
    "id, phone, name, avatar, last_active, unread_count, tags, notes, email, birthday, company, custom_fields";

/// Find-or-create-or-migrate resolution used inside the ingestion
/// transaction. Canonicalizes the sender phone, migrates a legacy-format row
/// in place (same id, tags, history), or creates a new contact. A differing
/// non-empty provider display name updates the stored one.
pub(crate) fn resolve_in_tx(
    conn: &Connection,
    raw_phone: &str,
    name: Option<&str>,
) -> Result<Contact> {
    let canonical = phone::canonicalize(raw_phone);

    if let Some(contact) = contact_by_phone(conn, &canonical)? {
        return refresh_name(conn, contact, name);
    }

    if let Some(legacy) = phone::legacy_form(&canonical)
        && let Some(contact) = contact_by_phone(conn, &legacy)?
    {
        info!(
            "migrating contact {} phone {} -> {}",
            contact.id, legacy, canonical
        );
        conn.execute(
            "UPDATE contacts SET phone = ? WHERE id = ?",
            params![canonical, contact.id],
        )
        .map_err(|e| Error::Database(format!("failed to migrate contact phone: {e}")))?;
        let migrated = Contact {
            phone: canonical,
            ..contact
        };
        return refresh_name(conn, migrated, name);
    }

    insert_contact(conn, &canonical, name, Vec::new(), "")
}

fn refresh_name(conn: &Connection, contact: Contact, name: Option<&str>) -> Result<Contact> {
    match name {
        Some(n) if !n.is_empty() && n != contact.name => {
            conn.execute(
                "UPDATE contacts SET name = ? WHERE id = ?",
                params![n, contact.id],
            )
            .map_err(|e| Error::Database(format!("failed to update contact name: {e}")))?;
            Ok(Contact {
                name: n.to_string(),
                ..contact
            })
        }
        _ => Ok(contact),
    }
}

fn insert_contact(
    conn: &Connection,
    canonical: &str,
    name: Option<&str>,
    tags: Vec<String>,
    notes: &str,
) -> Result<Contact> {
    let display = name.filter(|n| !n.is_empty()).unwrap_or(canonical);
    let contact = Contact {
        id: Uuid::new_v4().to_string(),
        phone: canonical.to_string(),
        name: display.to_string(),
        avatar: avatar_url(display),
        last_active: Utc::now(),
        unread_count: 0,
        tags,
        notes: notes.to_string(),
        email: None,
        birthday: None,
        company: None,
        custom_fields: serde_json::json!({}),
    };

    conn.execute(
        "INSERT INTO contacts (id, phone, name, avatar, last_active, unread_count, tags, notes, custom_fields)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        params![
            contact.id,
            contact.phone,
            contact.name,
            contact.avatar,
            contact.last_active.to_rfc3339(),
            contact.unread_count,
            serde_json::to_string(&contact.tags)?,
            contact.notes,
            "{}",
        ],
    )
    .map_err(|e| Error::Database(format!("failed to insert contact: {e}")))?;

    Ok(contact)
}

fn avatar_url(name: &str) -> String {
    let encoded = name.replace(' ', "+");
    format!("https://ui-avatars.com/api/?name={encoded}&background=random")
}

pub(crate) fn contact_by_phone(conn: &Connection, phone: &str) -> Result<Option<Contact>> {
    conn.query_row(
        &format!("SELECT {CONTACT_COLUMNS} FROM contacts WHERE phone = ?"),
        params![phone],
        row_to_contact,
    )
    .optional()
    .map_err(|e| Error::Database(format!("failed to query contact by phone: {e}")))
}

pub(crate) fn contact_by_id(conn: &Connection, id: &str) -> Result<Option<Contact>> {
    conn.query_row(
        &format!("SELECT {CONTACT_COLUMNS} FROM contacts WHERE id = ?"),
        params![id],
        row_to_contact,
    )
    .optional()
    .map_err(|e| Error::Database(format!("failed to query contact by id: {e}")))
}

pub(crate) fn row_to_contact(row: &Row<'_>) -> rusqlite::Result<Contact> {
    let last_active_str: String = row.get(4)?;
    let last_active = parse_timestamp(&last_active_str).map_err(decode_err)?;

    let tags_str: String = row.get(6)?;
    let tags: Vec<String> = serde_json::from_str(&tags_str).unwrap_or_default();

    let birthday: Option<String> = row.get(9)?;
    let birthday = birthday
        .as_deref()
        .map(|b| NaiveDate::parse_from_str(b, "%Y-%m-%d").map_err(decode_err))
        .transpose()?;

    let custom_str: String = row.get(11)?;
    let custom_fields = serde_json::from_str(&custom_str).unwrap_or(serde_json::json!({}));

    Ok(Contact {
        id: row.get(0)?,
        phone: row.get(1)?,
        name: row.get(2)?,
        avatar: row.get(3)?,
        last_active,
        unread_count: row.get(5)?,
        tags,
        notes: row.get(7)?,
        email: row.get(8)?,
        birthday,
        company: row.get(10)?,
        custom_fields,
    })
}
