use std::path::PathBuf;
use std::sync::Arc;

use chasqui_common::{Error, Event, EventBus, Result};
use chasqui_db::Database;
use tracing::{info, warn};

use crate::api::OutboundGateway;
use crate::credentials::Credentials;

/// Best-effort retrieval of media referenced by inbound messages.
///
/// Contract: **at most one attempt per media object**. The fetch runs
/// detached from the ingestion path; any failure (network, missing
/// credential, unmapped type) is logged and leaves the owning message's
/// media path null permanently. There is no retry queue; the message row
/// with its text fallback stays visible either way.
pub struct MediaFetcher {
    gateway: Arc<OutboundGateway>,
    db: Arc<Database>,
    events: Arc<dyn EventBus>,
    media_dir: PathBuf,
}

impl MediaFetcher {
    pub fn new(
        gateway: Arc<OutboundGateway>,
        db: Arc<Database>,
        events: Arc<dyn EventBus>,
        media_dir: PathBuf,
    ) -> Self {
        Self {
            gateway,
            db,
            events,
            media_dir,
        }
    }

    /// Fire-and-forget entry point used by the ingestion pipeline.
    pub fn spawn_fetch(
        self: &Arc<Self>,
        creds: Credentials,
        media_id: String,
        message_id: String,
        contact_id: String,
    ) {
        let fetcher = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = fetcher
                .fetch(&creds, &media_id, &message_id, &contact_id)
                .await
            {
                warn!("media backfill for message {message_id} abandoned: {e}");
            }
        });
    }

    /// One attempt: metadata → download → persist → message backfill → event.
    pub async fn fetch(
        &self,
        creds: &Credentials,
        media_id: &str,
        message_id: &str,
        contact_id: &str,
    ) -> Result<()> {
        let metadata = self.gateway.media_metadata(creds, media_id).await?;
        let bytes = self.gateway.download_media(creds, &metadata.url).await?;

        let ext = extension_for(metadata.mime_type.as_deref());
        let filename = format!("{media_id}{ext}");
        let target = self.media_dir.join(&filename);

        tokio::fs::create_dir_all(&self.media_dir)
            .await
            .map_err(|e| Error::Media(format!("failed to create media dir: {e}")))?;
        tokio::fs::write(&target, &bytes)
            .await
            .map_err(|e| Error::Media(format!("failed to write {}: {e}", target.display())))?;

        let media_path = format!("/uploads/media/{filename}");
        self.db.set_media_path(message_id, &media_path)?;

        info!("media {media_id} saved to {media_path}");
        self.events.emit(Event::MessageUpdated {
            message_id: message_id.to_string(),
            contact_id: contact_id.to_string(),
            media_path,
        });

        Ok(())
    }
}

/// MIME → file extension, defaulting to a generic binary extension for
/// anything unmapped. MIME parameters (`; codecs=…`) are ignored.
fn extension_for(mime_type: Option<&str>) -> &'static str {
    let essence = mime_type
        .unwrap_or("")
        .split(';')
        .next()
        .unwrap_or("")
        .trim();

    match essence {
        "image/jpeg" => ".jpg",
        "image/png" => ".png",
        "image/webp" => ".webp",
        "image/gif" => ".gif",
        "audio/ogg" => ".ogg",
        "audio/mpeg" => ".mp3",
        "video/mp4" => ".mp4",
        "application/pdf" => ".pdf",
        _ => ".bin",
    }
}

#[cfg(test)]
mod tests {
    use super::{MediaFetcher, extension_for};
    use crate::api::OutboundGateway;
    use crate::credentials::Credentials;
    use chasqui_common::NoopEventBus;
    use chasqui_db::{Database, NewInbound};
    use chrono::Utc;
    use std::sync::Arc;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn mime_map_covers_the_common_types_and_defaults_to_bin() {
        assert_eq!(extension_for(Some("image/jpeg")), ".jpg");
        assert_eq!(extension_for(Some("audio/ogg; codecs=opus")), ".ogg");
        assert_eq!(extension_for(Some("application/x-unknown")), ".bin");
        assert_eq!(extension_for(None), ".bin");
    }

    fn seeded_db() -> Arc<Database> {
        let db = Database::in_memory().expect("in-memory database");
        db.record_inbound(NewInbound {
            id: "wamid.media.1".to_string(),
            content_type: "image".to_string(),
            body: "[IMAGE]".to_string(),
            timestamp: Utc::now(),
            sender_phone: "5492645280229".to_string(),
            sender_name: None,
            channel_id: None,
            opt_out: false,
        })
        .expect("seed message");
        Arc::new(db)
    }

    fn creds() -> Credentials {
        Credentials {
            access_token: "tok".to_string(),
            phone_id: "111".to_string(),
        }
    }

    #[tokio::test]
    async fn successful_fetch_backfills_the_media_path() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/media-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "url": format!("{}/binary/media-1", server.uri()),
                "mime_type": "image/jpeg",
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/binary/media-1"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0xFF, 0xD8, 0xFF]))
            .mount(&server)
            .await;

        let db = seeded_db();
        let media_dir = std::env::temp_dir().join(format!("chasqui-media-test-{}", std::process::id()));
        let fetcher = MediaFetcher::new(
            Arc::new(OutboundGateway::new(server.uri(), Duration::from_secs(5)).expect("client")),
            Arc::clone(&db),
            Arc::new(NoopEventBus),
            media_dir.clone(),
        );

        fetcher
            .fetch(&creds(), "media-1", "wamid.media.1", "c-1")
            .await
            .expect("fetch should succeed");

        let message = db.get_message("wamid.media.1").expect("load message");
        assert_eq!(
            message.media_path.as_deref(),
            Some("/uploads/media/media-1.jpg")
        );
        assert!(media_dir.join("media-1.jpg").exists());

        let _ = std::fs::remove_dir_all(media_dir);
    }

    #[tokio::test]
    async fn failed_download_leaves_the_media_path_null() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/media-2"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let db = seeded_db();
        let fetcher = MediaFetcher::new(
            Arc::new(OutboundGateway::new(server.uri(), Duration::from_secs(5)).expect("client")),
            Arc::clone(&db),
            Arc::new(NoopEventBus),
            std::env::temp_dir(),
        );

        fetcher
            .fetch(&creds(), "media-2", "wamid.media.1", "c-1")
            .await
            .expect_err("fetch should fail");

        let message = db.get_message("wamid.media.1").expect("load message");
        assert!(message.media_path.is_none());
    }
}
