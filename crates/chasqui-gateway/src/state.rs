use std::sync::Arc;

use chasqui_campaigns::CampaignExecutor;
use chasqui_config::AppConfig;
use chasqui_db::Database;
use chasqui_ingest::MessageIngestor;
use chasqui_provider::OutboundGateway;

use crate::events::BroadcastBus;

/// Shared application state accessible from all request handlers.
pub struct AppState {
    pub config: AppConfig,
    pub db: Arc<Database>,
    pub provider: Arc<OutboundGateway>,
    pub events: Arc<BroadcastBus>,
    pub ingestor: MessageIngestor,
    pub executor: Arc<CampaignExecutor>,
}

pub type SharedState = Arc<AppState>;
