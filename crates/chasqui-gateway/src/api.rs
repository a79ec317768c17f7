use axum::Json;
use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use chasqui_common::{Error, Event, EventBus, Message, MessageDirection, MessageStatus};
use chasqui_db::{ContactPatch, NewCampaign};
use chasqui_provider::resolve_credentials;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{error, warn};
use uuid::Uuid;

use crate::state::SharedState;

pub async fn health() -> &'static str {
    "ok"
}

pub async fn status(State(state): State<SharedState>) -> impl IntoResponse {
    let contacts = state.db.list_contacts().map(|c| c.len()).unwrap_or(0);
    let channels = state.db.list_channels().unwrap_or_default();
    let campaigns = state.db.list_campaigns().map(|c| c.len()).unwrap_or(0);

    Json(serde_json::json!({
        "status": "running",
        "contacts": contacts,
        "channels": channels,
        "campaigns": campaigns,
        "subscribers": state.events.subscriber_count(),
    }))
}

// ---- contacts ----

#[derive(Deserialize)]
pub struct CreateContactRequest {
    pub phone: String,
    pub name: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub notes: Option<String>,
}

pub async fn list_contacts(State(state): State<SharedState>) -> impl IntoResponse {
    match state.db.list_contacts() {
        Ok(contacts) => Json(contacts).into_response(),
        Err(e) => internal_error(e),
    }
}

pub async fn create_contact(
    State(state): State<SharedState>,
    Json(body): Json<CreateContactRequest>,
) -> impl IntoResponse {
    if body.phone.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "phone is required");
    }

    match state.db.create_contact(
        &body.phone,
        body.name.as_deref(),
        body.tags,
        body.notes.as_deref(),
    ) {
        Ok(contact) => (StatusCode::CREATED, Json(contact)).into_response(),
        Err(e) => internal_error(e),
    }
}

#[derive(Deserialize)]
pub struct UpdateContactRequest {
    pub name: Option<String>,
    pub tags: Option<Vec<String>>,
    pub notes: Option<String>,
    pub unread_count: Option<i64>,
    pub email: Option<String>,
    pub birthday: Option<chrono::NaiveDate>,
    pub company: Option<String>,
    pub custom_fields: Option<serde_json::Value>,
}

pub async fn update_contact(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(body): Json<UpdateContactRequest>,
) -> impl IntoResponse {
    let patch = ContactPatch {
        name: body.name,
        tags: body.tags,
        notes: body.notes,
        unread_count: body.unread_count,
        email: body.email,
        birthday: body.birthday,
        company: body.company,
        custom_fields: body.custom_fields,
    };

    match state.db.update_contact(&id, patch) {
        Ok(contact) => {
            state.events.emit(Event::ContactUpdated {
                contact: contact.clone(),
            });
            Json(contact).into_response()
        }
        Err(Error::NotFound(_)) => error_response(StatusCode::NOT_FOUND, "contact not found"),
        Err(e) => internal_error(e),
    }
}

pub async fn delete_contact(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.db.delete_contact(&id) {
        Ok(()) => Json(serde_json::json!({ "success": true })).into_response(),
        Err(Error::NotFound(_)) => error_response(StatusCode::NOT_FOUND, "contact not found"),
        Err(e) => internal_error(e),
    }
}

// ---- messages ----

pub async fn contact_messages(
    State(state): State<SharedState>,
    Path(contact_id): Path<String>,
) -> impl IntoResponse {
    match state.db.messages_for_contact(&contact_id) {
        Ok(messages) => Json(messages).into_response(),
        Err(e) => internal_error(e),
    }
}

#[derive(Deserialize)]
pub struct SendRequest {
    pub contact_id: String,
    pub text: String,
    pub channel_id: String,
}

/// Sends a text message and persists the outcome either way: a failed send
/// is stored with status `failed` and the provider's error, so the operator
/// can tell it apart from a delivered one.
pub async fn send_message(
    State(state): State<SharedState>,
    Json(body): Json<SendRequest>,
) -> impl IntoResponse {
    if body.text.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "text is required");
    }

    let contact = match state.db.get_contact(&body.contact_id) {
        Ok(contact) => contact,
        Err(Error::NotFound(_)) => {
            return error_response(StatusCode::NOT_FOUND, "contact not found");
        }
        Err(e) => return internal_error(e),
    };

    let attempt = match state.db.get_channel(&body.channel_id) {
        Ok(channel) => match resolve_credentials(&channel) {
            Ok(creds) => {
                state
                    .provider
                    .send_text(&creds, &contact.phone, &body.text)
                    .await
            }
            Err(e) => Err(e),
        },
        Err(e) => Err(e),
    };

    finish_outbound(
        &state,
        attempt,
        "text",
        &body.text,
        &contact.id,
        &body.channel_id,
    )
}

/// Multipart upload-and-send: the file goes to the provider's media
/// endpoint, then out to the contact by media id.
pub async fn send_media_message(
    State(state): State<SharedState>,
    mut multipart: Multipart,
) -> impl IntoResponse {
    let mut contact_id = None;
    let mut channel_id = None;
    let mut caption: Option<String> = None;
    let mut file: Option<(Vec<u8>, String, String)> = None;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                return error_response(StatusCode::BAD_REQUEST, &format!("bad multipart: {e}"));
            }
        };

        match field.name().unwrap_or("") {
            "contact_id" => contact_id = field.text().await.ok(),
            "channel_id" => channel_id = field.text().await.ok(),
            "caption" => caption = field.text().await.ok(),
            "media" => {
                let mime = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let filename = field.file_name().unwrap_or("upload.bin").to_string();
                match field.bytes().await {
                    Ok(bytes) => file = Some((bytes.to_vec(), mime, filename)),
                    Err(e) => {
                        return error_response(
                            StatusCode::BAD_REQUEST,
                            &format!("failed to read media: {e}"),
                        );
                    }
                }
            }
            _ => {}
        }
    }

    let (Some(contact_id), Some(channel_id), Some((bytes, mime, filename))) =
        (contact_id, channel_id, file)
    else {
        return error_response(
            StatusCode::BAD_REQUEST,
            "contact_id, channel_id, and media are required",
        );
    };

    let contact = match state.db.get_contact(&contact_id) {
        Ok(contact) => contact,
        Err(Error::NotFound(_)) => {
            return error_response(StatusCode::NOT_FOUND, "contact not found");
        }
        Err(e) => return internal_error(e),
    };

    let kind = media_kind(&mime);
    let attempt = match state.db.get_channel(&channel_id) {
        Ok(channel) => match resolve_credentials(&channel) {
            Ok(creds) => {
                match state
                    .provider
                    .upload_media(&creds, bytes, &mime, &filename)
                    .await
                {
                    Ok(media_id) => {
                        state
                            .provider
                            .send_media(&creds, &contact.phone, kind, &media_id, caption.as_deref())
                            .await
                    }
                    Err(e) => Err(e),
                }
            }
            Err(e) => Err(e),
        },
        Err(e) => Err(e),
    };

    let body = caption.unwrap_or_else(|| format!("[{}]", kind.to_uppercase()));
    finish_outbound(&state, attempt, kind, &body, &contact.id, &channel_id)
}

fn media_kind(mime: &str) -> &'static str {
    match mime.split('/').next().unwrap_or("") {
        "image" => "image",
        "video" => "video",
        "audio" => "audio",
        _ => "document",
    }
}

/// Persists the outbound message for a send attempt and shapes the response.
fn finish_outbound(
    state: &SharedState,
    attempt: chasqui_common::Result<String>,
    content_type: &str,
    body: &str,
    contact_id: &str,
    channel_id: &str,
) -> axum::response::Response {
    let message = match &attempt {
        Ok(provider_id) => Message {
            id: provider_id.clone(),
            direction: MessageDirection::Outbound,
            content_type: content_type.to_string(),
            body: body.to_string(),
            media_path: None,
            status: MessageStatus::Sent,
            error: None,
            timestamp: Utc::now(),
            contact_id: contact_id.to_string(),
            channel_id: Some(channel_id.to_string()),
        },
        Err(e) => Message {
            id: format!("failed-{}", Uuid::new_v4()),
            direction: MessageDirection::Outbound,
            content_type: content_type.to_string(),
            body: body.to_string(),
            media_path: None,
            status: MessageStatus::Failed,
            error: Some(e.to_string()),
            timestamp: Utc::now(),
            contact_id: contact_id.to_string(),
            channel_id: Some(channel_id.to_string()),
        },
    };

    if let Err(e) = state.db.insert_outbound(&message) {
        error!("failed to persist outbound message: {e}");
        return internal_error(e);
    }

    state.events.emit(Event::NewMessage {
        message: message.clone(),
    });

    match attempt {
        Ok(_) => Json(message).into_response(),
        Err(e) => {
            warn!("outbound send failed: {e}");
            (
                StatusCode::BAD_GATEWAY,
                Json(serde_json::json!({
                    "error": "send failed",
                    "details": e.to_string(),
                    "message": message,
                })),
            )
                .into_response()
        }
    }
}

// ---- campaigns ----

#[derive(Deserialize)]
pub struct CreateCampaignRequest {
    pub name: String,
    pub template_id: String,
    pub channel_id: String,
    pub target_tag: Option<String>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub delay_min: Option<u64>,
    pub delay_max: Option<u64>,
}

pub async fn list_campaigns(State(state): State<SharedState>) -> impl IntoResponse {
    match state.db.list_campaigns() {
        Ok(campaigns) => Json(campaigns).into_response(),
        Err(e) => internal_error(e),
    }
}

/// Creates a campaign. Without a scheduled time, execution starts
/// immediately as a detached task; with one, the scheduler promotes it when
/// due.
pub async fn create_campaign(
    State(state): State<SharedState>,
    Json(body): Json<CreateCampaignRequest>,
) -> impl IntoResponse {
    let campaign = match state.db.create_campaign(NewCampaign {
        name: body.name,
        template_id: body.template_id,
        channel_id: body.channel_id,
        target_tag: body.target_tag,
        scheduled_at: body.scheduled_at,
        delay_min: body.delay_min.unwrap_or(2),
        delay_max: body.delay_max.unwrap_or(8),
    }) {
        Ok(campaign) => campaign,
        Err(e) => return internal_error(e),
    };

    if campaign.scheduled_at.is_none() {
        spawn_execution(state, campaign.id.clone());
    }

    (StatusCode::CREATED, Json(campaign)).into_response()
}

pub async fn execute_campaign(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let campaign = match state.db.get_campaign(&id) {
        Ok(campaign) => campaign,
        Err(Error::NotFound(_)) => {
            return error_response(StatusCode::NOT_FOUND, "campaign not found");
        }
        Err(e) => return internal_error(e),
    };

    spawn_execution(state, campaign.id.clone());
    (StatusCode::ACCEPTED, Json(campaign)).into_response()
}

pub async fn cancel_campaign(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.db.cancel_campaign(&id) {
        Ok(true) => match state.db.get_campaign(&id) {
            Ok(campaign) => Json(campaign).into_response(),
            Err(e) => internal_error(e),
        },
        Ok(false) => error_response(
            StatusCode::CONFLICT,
            "only a scheduled campaign can be cancelled",
        ),
        Err(e) => internal_error(e),
    }
}

fn spawn_execution(state: SharedState, campaign_id: String) {
    let executor = Arc::clone(&state.executor);
    tokio::spawn(async move {
        if let Err(e) = executor.execute(&campaign_id).await {
            error!("campaign {campaign_id} execution failed: {e}");
        }
    });
}

// ---- helpers ----

fn error_response(status: StatusCode, reason: &str) -> axum::response::Response {
    (status, Json(serde_json::json!({ "error": reason }))).into_response()
}

fn internal_error(e: Error) -> axum::response::Response {
    error!("request failed: {e}");
    error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string())
}
