use std::sync::Arc;
use std::time::Duration;

use chasqui_common::{Campaign, CampaignStatus, Event, EventBus, Result};
use chasqui_db::Database;
use chasqui_provider::{Credentials, OutboundGateway, resolve_credentials};
use dashmap::DashMap;
use rand::Rng;
use tracing::{info, warn};

use crate::segment::resolve_segment;

/// Runs one campaign to completion: jittered per-recipient dispatch with
/// partial-failure accounting and live progress events.
///
/// Two guards keep a campaign from running twice (a manual trigger racing
/// the scheduler): an in-process running-id set, and the storage layer's
/// conditional `SCHEDULED → SENDING` claim. The loser of either race
/// returns without sending. Once `SENDING`, a run has no cancellation
/// point and proceeds to completion.
pub struct CampaignExecutor {
    db: Arc<Database>,
    gateway: Arc<OutboundGateway>,
    events: Arc<dyn EventBus>,
    running: DashMap<String, ()>,
}

impl CampaignExecutor {
    pub fn new(db: Arc<Database>, gateway: Arc<OutboundGateway>, events: Arc<dyn EventBus>) -> Self {
        Self {
            db,
            gateway,
            events,
            running: DashMap::new(),
        }
    }

    pub fn is_running(&self, campaign_id: &str) -> bool {
        self.running.contains_key(campaign_id)
    }

    pub async fn execute(&self, campaign_id: &str) -> Result<()> {
        if self.running.insert(campaign_id.to_string(), ()).is_some() {
            info!("campaign {campaign_id} is already executing, ignoring trigger");
            return Ok(());
        }

        let result = self.run(campaign_id).await;
        self.running.remove(campaign_id);
        result
    }

    async fn run(&self, campaign_id: &str) -> Result<()> {
        let campaign = self.db.get_campaign(campaign_id)?;

        if !self.db.try_claim_campaign(campaign_id)? {
            info!(
                "campaign {campaign_id} is not claimable (status {}), ignoring trigger",
                campaign.status.as_str()
            );
            return Ok(());
        }

        let Some(template) = self.db.get_template(&campaign.template_id)? else {
            warn!(
                "campaign {campaign_id} references missing template {}, failing",
                campaign.template_id
            );
            self.db.finish_campaign(campaign_id, CampaignStatus::Failed)?;
            return Ok(());
        };

        let recipients = resolve_segment(&self.db, campaign.target_tag.as_deref())?;
        let total = recipients.len() as i64;
        self.db.set_campaign_recipients(campaign_id, total)?;

        info!(
            "starting campaign [{}] to {total} contacts via template [{}]",
            campaign.name, template.name
        );

        if recipients.is_empty() {
            self.db.finish_campaign(campaign_id, CampaignStatus::Sent)?;
            self.emit_progress(&campaign, 100, 0, 0, 0);
            return Ok(());
        }

        let creds = match self
            .db
            .get_channel(&campaign.channel_id)
            .and_then(|channel| resolve_credentials(&channel))
        {
            Ok(creds) => Some(creds),
            Err(e) => {
                warn!("campaign {campaign_id} has no usable credentials: {e}");
                None
            }
        };

        let mut sent_count: i64 = 0;
        let mut failed_count: i64 = 0;

        for (index, contact) in recipients.iter().enumerate() {
            self.jitter(campaign.delay_min, campaign.delay_max).await;

            match self
                .send_one(creds.as_ref(), &template.name, &template.language, &contact.phone)
                .await
            {
                Ok(provider_id) => {
                    sent_count += 1;
                    info!("campaign {campaign_id}: sent {provider_id} to {}", contact.phone);
                }
                Err(e) => {
                    failed_count += 1;
                    warn!("campaign {campaign_id}: send to {} failed: {e}", contact.phone);
                }
            }

            let processed = (index + 1) as i64;
            let progress = ((processed as f64 / total as f64) * 100.0).round() as i64;
            self.db
                .update_campaign_progress(campaign_id, sent_count, failed_count, progress)?;
            self.emit_progress(&campaign, progress, sent_count, failed_count, total);
        }

        let status = if failed_count == total {
            CampaignStatus::Failed
        } else {
            CampaignStatus::Sent
        };
        self.db.finish_campaign(campaign_id, status)?;

        info!(
            "campaign [{}] finished: {sent_count} sent, {failed_count} failed",
            campaign.name
        );
        Ok(())
    }

    async fn send_one(
        &self,
        creds: Option<&Credentials>,
        template_name: &str,
        language: &str,
        phone: &str,
    ) -> Result<String> {
        let creds = creds.ok_or_else(|| {
            chasqui_common::Error::Channel("no credentials resolved for campaign channel".into())
        })?;

        self.gateway
            .send_template(creds, phone, template_name, language, &[])
            .await
    }

    /// Randomized inter-message delay, to avoid bursty send patterns a
    /// provider's abuse detection would flag. The sleep is a cooperative
    /// suspension point: other campaigns and webhook ingestion stay
    /// responsive while one campaign is mid-dispatch.
    async fn jitter(&self, delay_min: u64, delay_max: u64) {
        let upper = delay_max.max(delay_min);
        let secs = rand::rng().random_range(delay_min..=upper);
        if secs > 0 {
            tokio::time::sleep(Duration::from_secs(secs)).await;
        }
    }

    fn emit_progress(
        &self,
        campaign: &Campaign,
        progress: i64,
        sent_count: i64,
        failed_count: i64,
        total: i64,
    ) {
        self.events.emit(Event::CampaignProgress {
            campaign_id: campaign.id.clone(),
            progress,
            sent_count,
            failed_count,
            total,
        });
    }
}
