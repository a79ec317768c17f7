use chasqui_common::{Contact, Result};
use chasqui_db::Database;

/// Computes a campaign's recipient set: every contact, or the contacts
/// holding the target tag.
///
/// The result is captured into a `Vec` once per run and the executor
/// iterates that stable sequence, so progress accounting does not depend on
/// the storage layer's retrieval order staying put mid-run.
pub fn resolve_segment(db: &Database, target_tag: Option<&str>) -> Result<Vec<Contact>> {
    match target_tag {
        Some(tag) => db.contacts_with_tag(tag),
        None => db.all_contacts(),
    }
}
