pub mod api;
pub mod bootstrap;
pub mod events;
pub mod router;
pub mod server;
pub mod state;
pub mod webhook;
pub mod ws;

pub use bootstrap::build_state;
pub use events::BroadcastBus;
pub use server::GatewayServer;
pub use state::{AppState, SharedState};
