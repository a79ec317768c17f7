//! Template and tag records. Both are managed by an out-of-scope surface;
//! this system only reads them (campaign execution, segment filters) and
//! persists the rows they live in.

use chasqui_common::{Error, Result, Tag, Template};
use rusqlite::{OptionalExtension, params};
use uuid::Uuid;

use crate::store::Database;

impl Database {
    pub fn insert_template(
        &self,
        name: &str,
        language: &str,
        category: Option<&str>,
        body: Option<&str>,
    ) -> Result<Template> {
        let template = Template {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            language: language.to_string(),
            category: category.map(str::to_string),
            body: body.map(str::to_string),
        };

        let conn = self.connection()?;
        conn.execute(
            "INSERT INTO templates (id, name, language, category, body) VALUES (?, ?, ?, ?, ?)",
            params![
                template.id,
                template.name,
                template.language,
                template.category,
                template.body,
            ],
        )
        .map_err(|e| Error::Database(format!("failed to insert template: {e}")))?;

        Ok(template)
    }

    pub fn get_template(&self, id: &str) -> Result<Option<Template>> {
        let conn = self.connection()?;
        conn.query_row(
            "SELECT id, name, language, category, body FROM templates WHERE id = ?",
            params![id],
            |row| {
                Ok(Template {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    language: row.get(2)?,
                    category: row.get(3)?,
                    body: row.get(4)?,
                })
            },
        )
        .optional()
        .map_err(|e| Error::Database(format!("failed to load template: {e}")))
    }

    pub fn insert_tag(&self, name: &str, color: &str) -> Result<Tag> {
        let tag = Tag {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            color: color.to_string(),
        };

        let conn = self.connection()?;
        conn.execute(
            "INSERT INTO tags (id, name, color) VALUES (?, ?, ?)",
            params![tag.id, tag.name, tag.color],
        )
        .map_err(|e| Error::Database(format!("failed to insert tag: {e}")))?;

        Ok(tag)
    }

    pub fn list_tags(&self) -> Result<Vec<Tag>> {
        let conn = self.connection()?;
        let mut stmt = conn
            .prepare("SELECT id, name, color FROM tags ORDER BY name")
            .map_err(|e| Error::Database(format!("failed to prepare tag list: {e}")))?;

        let rows = stmt
            .query_map([], |row| {
                Ok(Tag {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    color: row.get(2)?,
                })
            })
            .map_err(|e| Error::Database(format!("failed to list tags: {e}")))?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::Database(format!("failed to collect tags: {e}")))
    }
}
