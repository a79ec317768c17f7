use axum::Router;
use axum::routing::{get, post, put};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::SharedState;
use crate::{api, webhook, ws};

/// Build the main application router with all routes.
pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(api::health))
        .route("/webhook", get(webhook::verify_webhook).post(webhook::receive_webhook))
        .route("/ws", get(ws::ws_handler))
        .route("/api/status", get(api::status))
        .route("/api/contacts", get(api::list_contacts).post(api::create_contact))
        .route(
            "/api/contacts/{id}",
            put(api::update_contact).delete(api::delete_contact),
        )
        .route("/api/messages/{contact_id}", get(api::contact_messages))
        .route("/api/send", post(api::send_message))
        .route("/api/send-media", post(api::send_media_message))
        .route("/api/campaigns", get(api::list_campaigns).post(api::create_campaign))
        .route("/api/campaigns/{id}/execute", post(api::execute_campaign))
        .route("/api/campaigns/{id}/cancel", post(api::cancel_campaign))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
