use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chasqui_campaigns::CampaignExecutor;
use chasqui_common::{EventBus, Result};
use chasqui_config::AppConfig;
use chasqui_db::Database;
use chasqui_ingest::MessageIngestor;
use chasqui_provider::{MediaFetcher, OutboundGateway};

use crate::state::{AppState, SharedState};

/// Opens the database under `data_dir` and wires the full state graph.
pub fn build_state(config: AppConfig, data_dir: &Path) -> Result<SharedState> {
    let db = Arc::new(Database::open(&data_dir.join("chasqui.db"))?);
    assemble(config, db, data_dir.join("media"))
}

/// Wires the state graph around an already-open database. Tests use this
/// with an in-memory store.
pub fn assemble(config: AppConfig, db: Arc<Database>, media_dir: PathBuf) -> Result<SharedState> {
    let events = Arc::new(crate::events::BroadcastBus::new());
    let bus: Arc<dyn EventBus> = events.clone();

    let provider = Arc::new(OutboundGateway::new(
        config.provider.api_base.clone(),
        Duration::from_secs(config.provider.timeout_secs),
    )?);

    let media = Arc::new(MediaFetcher::new(
        Arc::clone(&provider),
        Arc::clone(&db),
        Arc::clone(&bus),
        media_dir,
    ));

    let ingestor = MessageIngestor::new(Arc::clone(&db), Arc::clone(&bus), media);
    let executor = Arc::new(CampaignExecutor::new(
        Arc::clone(&db),
        Arc::clone(&provider),
        bus,
    ));

    Ok(Arc::new(AppState {
        config,
        db,
        provider,
        events,
        ingestor,
        executor,
    }))
}
