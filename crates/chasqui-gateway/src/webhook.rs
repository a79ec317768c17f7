use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use bytes::Bytes;
use chasqui_ingest::WebhookPayload;
use chasqui_ingest::signature::{handshake_accepts, verify_signature};
use serde::Deserialize;
use tracing::{info, warn};

use crate::state::SharedState;

const SIGNATURE_HEADER: &str = "x-hub-signature-256";

#[derive(Deserialize)]
pub struct VerifyParams {
    #[serde(rename = "hub.mode")]
    pub mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    pub verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    pub challenge: Option<String>,
}

/// GET handler for the provider's webhook verification handshake: echoes the
/// challenge when the verify token matches.
pub async fn verify_webhook(
    State(state): State<SharedState>,
    Query(params): Query<VerifyParams>,
) -> impl IntoResponse {
    let mode = params.mode.as_deref().unwrap_or("");
    let token = params.verify_token.as_deref().unwrap_or("");
    let challenge = params.challenge.as_deref().unwrap_or("");

    if handshake_accepts(state.config.provider.verify_token.as_deref(), mode, token) {
        info!("webhook verified");
        (StatusCode::OK, challenge.to_string())
    } else {
        warn!("webhook verification failed — token mismatch");
        (StatusCode::FORBIDDEN, "invalid verify token".to_string())
    }
}

/// POST handler for provider events. The signature is checked over the exact
/// raw request bytes before anything touches the database.
pub async fn receive_webhook(
    State(state): State<SharedState>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let Some(signature) = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
    else {
        warn!("webhook missing signature header");
        return (StatusCode::UNAUTHORIZED, "missing signature");
    };

    let payload: WebhookPayload = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(e) => {
            warn!("unparseable webhook payload: {e}");
            return (StatusCode::BAD_REQUEST, "invalid payload");
        }
    };

    let Some(secret) = resolve_signing_secret(&state, &payload) else {
        warn!("no signing secret configured for this payload, rejecting");
        return (StatusCode::FORBIDDEN, "no signing secret configured");
    };

    if let Err(e) = verify_signature(&secret, &body, signature) {
        warn!("webhook signature rejected: {e}");
        return (StatusCode::FORBIDDEN, "invalid signature");
    }

    match state.ingestor.process(&payload) {
        Ok(()) => (StatusCode::OK, "ok"),
        Err(e) => {
            warn!("webhook processing failed: {e}");
            (StatusCode::INTERNAL_SERVER_ERROR, "processing failed")
        }
    }
}

/// Secret resolution: the channel named by the payload must use its own
/// secret; a channel without one is rejected, never trusted blindly. The
/// global secret only covers payloads that name no known channel.
fn resolve_signing_secret(state: &SharedState, payload: &WebhookPayload) -> Option<String> {
    match payload.channel_phone_id() {
        Some(phone_id) => match state.db.channel_by_phone_id(phone_id) {
            Ok(Some(channel)) => channel.app_secret,
            Ok(None) => state.config.provider.app_secret.clone(),
            Err(e) => {
                warn!("channel lookup failed during signature resolution: {e}");
                None
            }
        },
        None => state.config.provider.app_secret.clone(),
    }
}
