use std::sync::Arc;
use std::time::Duration;

use chasqui_db::Database;
use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::executor::CampaignExecutor;

/// How often the scheduler looks for due campaigns.
const POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Promotes due, time-scheduled campaigns into execution.
///
/// Each tick queries campaigns whose scheduled time has come and fires their
/// executor detached. One campaign's failure never stops the poller or the
/// other promotions.
pub struct CampaignScheduler {
    db: Arc<Database>,
    executor: Arc<CampaignExecutor>,
}

impl CampaignScheduler {
    pub fn new(db: Arc<Database>, executor: Arc<CampaignExecutor>) -> Self {
        Self { db, executor }
    }

    /// Spawns the polling loop. The first tick runs immediately, so
    /// campaigns that came due while the process was down are promoted at
    /// startup.
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        info!(
            "campaign scheduler started, polling every {}s",
            POLL_INTERVAL.as_secs()
        );
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(POLL_INTERVAL);
            loop {
                interval.tick().await;
                self.tick().await;
            }
        })
    }

    pub async fn tick(&self) {
        let due = match self.db.due_campaigns(Utc::now()) {
            Ok(due) => due,
            Err(e) => {
                warn!("scheduler could not query due campaigns: {e}");
                return;
            }
        };

        if due.is_empty() {
            return;
        }

        info!("promoting {} due campaign(s)", due.len());
        for campaign in due {
            let executor = Arc::clone(&self.executor);
            let id = campaign.id.clone();
            let name = campaign.name.clone();
            tokio::spawn(async move {
                info!("executing scheduled campaign [{name}]");
                if let Err(e) = executor.execute(&id).await {
                    error!("scheduled campaign {id} failed: {e}");
                }
            });
        }
    }
}
