use std::path::PathBuf;
use std::sync::Arc;

use chasqui_campaigns::CampaignScheduler;
use chasqui_common::Result;
use chasqui_config::AppConfig;
use tokio::net::TcpListener;
use tracing::info;

use crate::bootstrap::build_state;
use crate::router::build_router;

/// The main gateway server: binds a port, serves the webhook + REST API +
/// WebSocket, and keeps the campaign scheduler running.
pub struct GatewayServer {
    config: AppConfig,
    data_dir: PathBuf,
}

impl GatewayServer {
    pub fn new(config: AppConfig, data_dir: PathBuf) -> Self {
        Self { config, data_dir }
    }

    pub async fn run(self) -> Result<()> {
        let addr = format!("{}:{}", self.config.gateway.host, self.config.gateway.port);

        let state = build_state(self.config, &self.data_dir)?;

        let scheduler = Arc::new(CampaignScheduler::new(
            Arc::clone(&state.db),
            Arc::clone(&state.executor),
        ));
        scheduler.spawn();

        let app = build_router(state);

        let listener = TcpListener::bind(&addr).await?;
        info!("chasqui gateway listening on {}", addr);

        axum::serve(listener, app)
            .await
            .map_err(|e| chasqui_common::Error::Gateway(format!("server error: {e}")))?;

        Ok(())
    }
}
