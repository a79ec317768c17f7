use chasqui_common::{Campaign, CampaignStatus, Error, Result};
use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, Row, params};
use tracing::info;
use uuid::Uuid;

use crate::store::{Database, decode_err, parse_timestamp};

#[derive(Debug, Clone)]
pub struct NewCampaign {
    pub name: String,
    pub template_id: String,
    pub channel_id: String,
    pub target_tag: Option<String>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub delay_min: u64,
    pub delay_max: u64,
}

impl Database {
    pub fn create_campaign(&self, new: NewCampaign) -> Result<Campaign> {
        let campaign = Campaign {
            id: Uuid::new_v4().to_string(),
            name: new.name,
            template_id: new.template_id,
            channel_id: new.channel_id,
            target_tag: new.target_tag,
            scheduled_at: new.scheduled_at,
            delay_min: new.delay_min,
            delay_max: new.delay_max.max(new.delay_min),
            recipient_count: 0,
            sent_count: 0,
            failed_count: 0,
            progress: 0,
            status: CampaignStatus::Scheduled,
            created_at: Utc::now(),
        };

        let conn = self.connection()?;
        conn.execute(
            "INSERT INTO campaigns (id, name, template_id, channel_id, target_tag, scheduled_at,
                                    delay_min, delay_max, status, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                campaign.id,
                campaign.name,
                campaign.template_id,
                campaign.channel_id,
                campaign.target_tag,
                campaign.scheduled_at.map(|t| t.to_rfc3339()),
                campaign.delay_min as i64,
                campaign.delay_max as i64,
                campaign.status.as_str(),
                campaign.created_at.to_rfc3339(),
            ],
        )
        .map_err(|e| Error::Database(format!("failed to insert campaign: {e}")))?;

        Ok(campaign)
    }

    pub fn get_campaign(&self, id: &str) -> Result<Campaign> {
        let conn = self.connection()?;
        conn.query_row(
            &format!("SELECT {CAMPAIGN_COLUMNS} FROM campaigns WHERE id = ?"),
            params![id],
            row_to_campaign,
        )
        .optional()
        .map_err(|e| Error::Database(format!("failed to load campaign: {e}")))?
        .ok_or_else(|| Error::NotFound(format!("campaign {id}")))
    }

    pub fn list_campaigns(&self) -> Result<Vec<Campaign>> {
        let conn = self.connection()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {CAMPAIGN_COLUMNS} FROM campaigns ORDER BY datetime(created_at) DESC"
            ))
            .map_err(|e| Error::Database(format!("failed to prepare campaign list: {e}")))?;

        let rows = stmt
            .query_map([], row_to_campaign)
            .map_err(|e| Error::Database(format!("failed to list campaigns: {e}")))?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::Database(format!("failed to collect campaigns: {e}")))
    }

    /// Campaigns whose scheduled time has come. Cancelled and already-claimed
    /// campaigns never match.
    pub fn due_campaigns(&self, now: DateTime<Utc>) -> Result<Vec<Campaign>> {
        let conn = self.connection()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {CAMPAIGN_COLUMNS} FROM campaigns
                 WHERE status = 'SCHEDULED'
                   AND scheduled_at IS NOT NULL
                   AND datetime(scheduled_at) <= datetime(?)"
            ))
            .map_err(|e| Error::Database(format!("failed to prepare due query: {e}")))?;

        let rows = stmt
            .query_map(params![now.to_rfc3339()], row_to_campaign)
            .map_err(|e| Error::Database(format!("failed to query due campaigns: {e}")))?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::Database(format!("failed to collect due campaigns: {e}")))
    }

    /// Conditional claim: `SCHEDULED → SENDING`. Returns `false` when the
    /// campaign is not in the expected prior state, which is how a manual
    /// trigger and the scheduler lose the race against each other.
    pub fn try_claim_campaign(&self, id: &str) -> Result<bool> {
        let conn = self.connection()?;
        let changed = conn
            .execute(
                "UPDATE campaigns SET status = 'SENDING' WHERE id = ? AND status = 'SCHEDULED'",
                params![id],
            )
            .map_err(|e| Error::Database(format!("failed to claim campaign: {e}")))?;
        Ok(changed > 0)
    }

    /// Conditional cancel: only a still-`SCHEDULED` campaign can be
    /// cancelled. Returns `false` otherwise.
    pub fn cancel_campaign(&self, id: &str) -> Result<bool> {
        let conn = self.connection()?;
        let changed = conn
            .execute(
                "UPDATE campaigns SET status = 'CANCELLED' WHERE id = ? AND status = 'SCHEDULED'",
                params![id],
            )
            .map_err(|e| Error::Database(format!("failed to cancel campaign: {e}")))?;
        if changed > 0 {
            info!("campaign {id} cancelled");
        }
        Ok(changed > 0)
    }

    pub fn set_campaign_recipients(&self, id: &str, recipient_count: i64) -> Result<()> {
        let conn = self.connection()?;
        conn.execute(
            "UPDATE campaigns SET recipient_count = ? WHERE id = ?",
            params![recipient_count, id],
        )
        .map_err(|e| Error::Database(format!("failed to set recipient count: {e}")))?;
        Ok(())
    }

    /// Persists per-recipient progress. Progress is an integer percentage
    /// and only ever moves forward during a run.
    pub fn update_campaign_progress(
        &self,
        id: &str,
        sent_count: i64,
        failed_count: i64,
        progress: i64,
    ) -> Result<()> {
        let conn = self.connection()?;
        conn.execute(
            "UPDATE campaigns SET sent_count = ?, failed_count = ?, progress = ? WHERE id = ?",
            params![sent_count, failed_count, progress, id],
        )
        .map_err(|e| Error::Database(format!("failed to update campaign progress: {e}")))?;
        Ok(())
    }

    /// Terminal transition out of `SENDING`; progress is forced to 100.
    pub fn finish_campaign(&self, id: &str, status: CampaignStatus) -> Result<()> {
        let conn = self.connection()?;
        conn.execute(
            "UPDATE campaigns SET status = ?, progress = 100 WHERE id = ? AND status = 'SENDING'",
            params![status.as_str(), id],
        )
        .map_err(|e| Error::Database(format!("failed to finish campaign: {e}")))?;
        Ok(())
    }
}

const CAMPAIGN_COLUMNS: &str = "id, name, template_id, channel_id, target_tag, scheduled_at, \
     delay_min, delay_max, recipient_count, sent_count, failed_count, progress, status, created_at";

fn row_to_campaign(row: &Row<'_>) -> rusqlite::Result<Campaign> {
    let scheduled_at: Option<String> = row.get(5)?;
    let scheduled_at = scheduled_at
        .as_deref()
        .map(|s| parse_timestamp(s).map_err(decode_err))
        .transpose()?;

    let status_str: String = row.get(12)?;
    let created_at_str: String = row.get(13)?;

    Ok(Campaign {
        id: row.get(0)?,
        name: row.get(1)?,
        template_id: row.get(2)?,
        channel_id: row.get(3)?,
        target_tag: row.get(4)?,
        scheduled_at,
        delay_min: row.get::<_, i64>(6)? as u64,
        delay_max: row.get::<_, i64>(7)? as u64,
        recipient_count: row.get(8)?,
        sent_count: row.get(9)?,
        failed_count: row.get(10)?,
        progress: row.get(11)?,
        status: CampaignStatus::from_db(&status_str).map_err(decode_err)?,
        created_at: parse_timestamp(&created_at_str).map_err(decode_err)?,
    })
}

#[cfg(test)]
mod tests {
    use super::NewCampaign;
    use chasqui_common::CampaignStatus;
    use chrono::{Duration, Utc};

    use crate::store::Database;

    fn new_campaign(scheduled: Option<chrono::DateTime<Utc>>) -> NewCampaign {
        NewCampaign {
            name: "Promo".to_string(),
            template_id: "tpl-1".to_string(),
            channel_id: "ch-1".to_string(),
            target_tag: None,
            scheduled_at: scheduled,
            delay_min: 2,
            delay_max: 8,
        }
    }

    #[test]
    fn claim_succeeds_exactly_once() {
        let db = Database::in_memory().expect("in-memory database");
        let campaign = db.create_campaign(new_campaign(None)).expect("create");

        assert!(db.try_claim_campaign(&campaign.id).expect("first claim"));
        assert!(!db.try_claim_campaign(&campaign.id).expect("second claim"));

        let reloaded = db.get_campaign(&campaign.id).expect("reload");
        assert_eq!(reloaded.status, CampaignStatus::Sending);
    }

    #[test]
    fn cancel_only_applies_while_scheduled() {
        let db = Database::in_memory().expect("in-memory database");
        let campaign = db.create_campaign(new_campaign(None)).expect("create");

        db.try_claim_campaign(&campaign.id).expect("claim");
        assert!(!db.cancel_campaign(&campaign.id).expect("cancel after claim"));

        let other = db.create_campaign(new_campaign(None)).expect("create other");
        assert!(db.cancel_campaign(&other.id).expect("cancel scheduled"));
        assert_eq!(
            db.get_campaign(&other.id).expect("reload").status,
            CampaignStatus::Cancelled
        );
    }

    #[test]
    fn due_query_skips_cancelled_and_future_campaigns() {
        let db = Database::in_memory().expect("in-memory database");
        let now = Utc::now();

        let due = db
            .create_campaign(new_campaign(Some(now - Duration::minutes(1))))
            .expect("due");
        let future = db
            .create_campaign(new_campaign(Some(now + Duration::hours(1))))
            .expect("future");
        let cancelled = db
            .create_campaign(new_campaign(Some(now - Duration::minutes(1))))
            .expect("cancelled");
        db.cancel_campaign(&cancelled.id).expect("cancel");

        let found = db.due_campaigns(now).expect("due query");
        let ids: Vec<&str> = found.iter().map(|c| c.id.as_str()).collect();
        assert!(ids.contains(&due.id.as_str()));
        assert!(!ids.contains(&future.id.as_str()));
        assert!(!ids.contains(&cancelled.id.as_str()));
    }

    #[test]
    fn finish_forces_progress_to_one_hundred() {
        let db = Database::in_memory().expect("in-memory database");
        let campaign = db.create_campaign(new_campaign(None)).expect("create");

        db.try_claim_campaign(&campaign.id).expect("claim");
        db.update_campaign_progress(&campaign.id, 2, 1, 66)
            .expect("progress");
        db.finish_campaign(&campaign.id, CampaignStatus::Sent)
            .expect("finish");

        let reloaded = db.get_campaign(&campaign.id).expect("reload");
        assert_eq!(reloaded.status, CampaignStatus::Sent);
        assert_eq!(reloaded.progress, 100);
        assert_eq!(reloaded.sent_count, 2);
        assert_eq!(reloaded.failed_count, 1);
    }

    #[test]
    fn finish_cannot_move_a_terminal_campaign_backwards() {
        let db = Database::in_memory().expect("in-memory database");
        let campaign = db.create_campaign(new_campaign(None)).expect("create");

        db.try_claim_campaign(&campaign.id).expect("claim");
        db.finish_campaign(&campaign.id, CampaignStatus::Sent)
            .expect("finish");
        // A late finish attempt does not re-enter SENDING or rewrite status.
        db.finish_campaign(&campaign.id, CampaignStatus::Failed)
            .expect("late finish is a no-op");

        assert_eq!(
            db.get_campaign(&campaign.id).expect("reload").status,
            CampaignStatus::Sent
        );
    }
}
