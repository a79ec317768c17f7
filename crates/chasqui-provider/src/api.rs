use std::time::Duration;

use bytes::Bytes;
use chasqui_common::{Error, Result, phone};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::credentials::Credentials;

/// Typed wrapper over the provider's Graph API.
///
/// Every call is addressed with a per-channel [`Credentials`] pair and
/// inherits the client's finite timeout, so a hung provider call cannot
/// stall a dispatch loop indefinitely. Outbound phone numbers are converted
/// to the provider's wire form here and nowhere else.
pub struct OutboundGateway {
    client: Client,
    base: String,
}

#[derive(Serialize)]
struct TextBody {
    body: String,
}

#[derive(Serialize)]
struct TextMessage {
    messaging_product: &'static str,
    recipient_type: &'static str,
    to: String,
    #[serde(rename = "type")]
    msg_type: &'static str,
    text: TextBody,
}

#[derive(Serialize)]
struct TemplateMessage {
    messaging_product: &'static str,
    to: String,
    #[serde(rename = "type")]
    msg_type: &'static str,
    template: TemplatePayload,
}

#[derive(Serialize)]
struct TemplatePayload {
    name: String,
    language: LanguageCode,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    components: Vec<TemplateComponent>,
}

#[derive(Serialize)]
struct LanguageCode {
    code: String,
}

#[derive(Serialize)]
struct TemplateComponent {
    #[serde(rename = "type")]
    component_type: &'static str,
    parameters: Vec<TemplateParameter>,
}

#[derive(Serialize)]
struct TemplateParameter {
    #[serde(rename = "type")]
    parameter_type: &'static str,
    text: String,
}

#[derive(Serialize)]
struct MediaMessage {
    messaging_product: &'static str,
    to: String,
    #[serde(rename = "type")]
    msg_type: String,
    #[serde(flatten)]
    media: serde_json::Value,
}

#[derive(Deserialize)]
struct SendResponse {
    messages: Vec<SentMessage>,
}

#[derive(Deserialize)]
struct SentMessage {
    id: String,
}

#[derive(Deserialize)]
struct UploadResponse {
    id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MediaMetadata {
    pub url: String,
    #[serde(default)]
    pub mime_type: Option<String>,
}

#[derive(Deserialize)]
struct PhoneMetadata {
    id: String,
    #[serde(default)]
    display_phone_number: Option<String>,
}

impl OutboundGateway {
    pub fn new(base: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Provider(format!("failed to build http client: {e}")))?;

        Ok(Self {
            client,
            base: base.into(),
        })
    }

    /// Send a plain text message. Returns the provider-assigned message id.
    pub async fn send_text(&self, creds: &Credentials, to: &str, text: &str) -> Result<String> {
        let msg = TextMessage {
            messaging_product: "whatsapp",
            recipient_type: "individual",
            to: phone::wire_format(to),
            msg_type: "text",
            text: TextBody {
                body: text.to_string(),
            },
        };

        self.post_message(creds, &msg).await
    }

    /// Send a pre-approved template, with optional positional body
    /// parameters filling `{{1}}`, `{{2}}`, …
    pub async fn send_template(
        &self,
        creds: &Credentials,
        to: &str,
        template_name: &str,
        language: &str,
        parameters: &[String],
    ) -> Result<String> {
        let components = if parameters.is_empty() {
            Vec::new()
        } else {
            vec![TemplateComponent {
                component_type: "body",
                parameters: parameters
                    .iter()
                    .map(|p| TemplateParameter {
                        parameter_type: "text",
                        text: p.clone(),
                    })
                    .collect(),
            }]
        };

        let msg = TemplateMessage {
            messaging_product: "whatsapp",
            to: phone::wire_format(to),
            msg_type: "template",
            template: TemplatePayload {
                name: template_name.to_string(),
                language: LanguageCode {
                    code: language.to_string(),
                },
                components,
            },
        };

        self.post_message(creds, &msg).await
    }

    /// Send previously uploaded media (by provider media id) or a hosted
    /// link, with an optional caption.
    pub async fn send_media(
        &self,
        creds: &Credentials,
        to: &str,
        kind: &str,
        media_id: &str,
        caption: Option<&str>,
    ) -> Result<String> {
        let mut media = serde_json::json!({ kind: { "id": media_id } });
        if let Some(caption) = caption {
            media[kind]["caption"] = serde_json::Value::String(caption.to_string());
        }

        let msg = MediaMessage {
            messaging_product: "whatsapp",
            to: phone::wire_format(to),
            msg_type: kind.to_string(),
            media,
        };

        self.post_message(creds, &msg).await
    }

    /// Upload media bytes; returns the provider media id to send with.
    pub async fn upload_media(
        &self,
        creds: &Credentials,
        bytes: Vec<u8>,
        mime_type: &str,
        filename: &str,
    ) -> Result<String> {
        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(filename.to_string())
            .mime_str(mime_type)
            .map_err(|e| Error::Provider(format!("invalid media mime type: {e}")))?;
        let form = reqwest::multipart::Form::new()
            .text("messaging_product", "whatsapp")
            .text("type", mime_type.to_string())
            .part("file", part);

        let resp = self
            .client
            .post(format!("{}/{}/media", self.base, creds.phone_id))
            .bearer_auth(&creds.access_token)
            .multipart(form)
            .send()
            .await
            .map_err(|e| Error::Provider(format!("media upload failed: {e}")))?;

        let resp = check_status(resp, "upload_media").await?;
        let upload: UploadResponse = resp
            .json()
            .await
            .map_err(|e| Error::Provider(format!("invalid upload response: {e}")))?;
        Ok(upload.id)
    }

    /// Fetch media metadata: the short-lived download URL and declared MIME
    /// type for a media object referenced by an inbound message.
    pub async fn media_metadata(
        &self,
        creds: &Credentials,
        media_id: &str,
    ) -> Result<MediaMetadata> {
        let resp = self
            .client
            .get(format!("{}/{media_id}", self.base))
            .bearer_auth(&creds.access_token)
            .send()
            .await
            .map_err(|e| Error::Provider(format!("media metadata fetch failed: {e}")))?;

        let resp = check_status(resp, "media_metadata").await?;
        resp.json()
            .await
            .map_err(|e| Error::Provider(format!("invalid media metadata: {e}")))
    }

    /// Download the media binary from a metadata URL. The URL is short-lived
    /// and must be fetched with the same credential.
    pub async fn download_media(&self, creds: &Credentials, url: &str) -> Result<Bytes> {
        let resp = self
            .client
            .get(url)
            .bearer_auth(&creds.access_token)
            .send()
            .await
            .map_err(|e| Error::Provider(format!("media download failed: {e}")))?;

        let resp = check_status(resp, "download_media").await?;
        resp.bytes()
            .await
            .map_err(|e| Error::Provider(format!("failed to read media body: {e}")))
    }

    /// Check a credential pair against the provider: fetches the phone
    /// metadata and verifies the returned identifier matches.
    pub async fn verify_credentials(&self, creds: &Credentials) -> Result<()> {
        let resp = self
            .client
            .get(format!("{}/{}", self.base, creds.phone_id))
            .query(&[("fields", "id,display_phone_number")])
            .bearer_auth(&creds.access_token)
            .send()
            .await
            .map_err(|e| Error::Provider(format!("credential check failed: {e}")))?;

        let resp = check_status(resp, "verify_credentials").await?;
        let metadata: PhoneMetadata = resp
            .json()
            .await
            .map_err(|e| Error::Provider(format!("invalid phone metadata: {e}")))?;

        if metadata.id != creds.phone_id {
            return Err(Error::Channel(format!(
                "credential mismatch: provider returned phone id {} for {}",
                metadata.id, creds.phone_id
            )));
        }

        if let Some(number) = metadata.display_phone_number {
            tracing::info!("credentials verified for {number}");
        }
        Ok(())
    }

    async fn post_message<T: Serialize>(&self, creds: &Credentials, msg: &T) -> Result<String> {
        let resp = self
            .client
            .post(format!("{}/{}/messages", self.base, creds.phone_id))
            .bearer_auth(&creds.access_token)
            .json(msg)
            .send()
            .await
            .map_err(|e| Error::Provider(format!("send failed: {e}")))?;

        let resp = check_status(resp, "send").await?;
        let sent: SendResponse = resp
            .json()
            .await
            .map_err(|e| Error::Provider(format!("invalid send response: {e}")))?;

        sent.messages
            .into_iter()
            .next()
            .map(|m| m.id)
            .ok_or_else(|| Error::Provider("send response carried no message id".into()))
    }
}

async fn check_status(resp: reqwest::Response, op: &str) -> Result<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let body = resp.text().await.unwrap_or_default();
    warn!("provider {op} error {status}: {body}");
    Err(Error::Provider(format!("{op} error {status}: {body}")))
}

#[cfg(test)]
mod tests {
    use super::OutboundGateway;
    use crate::credentials::Credentials;
    use std::time::Duration;
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn creds() -> Credentials {
        Credentials {
            access_token: "test-token".to_string(),
            phone_id: "111222333".to_string(),
        }
    }

    fn gateway(server: &MockServer) -> OutboundGateway {
        OutboundGateway::new(server.uri(), Duration::from_secs(5)).expect("client should build")
    }

    #[tokio::test]
    async fn send_text_uses_the_wire_phone_format() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/111222333/messages"))
            .and(body_partial_json(serde_json::json!({
                "to": "542645280229",
                "type": "text",
                "text": { "body": "hola" },
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "messages": [{ "id": "wamid.out.1" }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let id = gateway(&server)
            .send_text(&creds(), "5492645280229", "hola")
            .await
            .expect("send should succeed");
        assert_eq!(id, "wamid.out.1");
    }

    #[tokio::test]
    async fn send_template_includes_positional_parameters() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/111222333/messages"))
            .and(body_partial_json(serde_json::json!({
                "type": "template",
                "template": {
                    "name": "promo_agosto",
                    "language": { "code": "es" },
                    "components": [{
                        "type": "body",
                        "parameters": [
                            { "type": "text", "text": "Renzo" },
                        ],
                    }],
                },
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "messages": [{ "id": "wamid.out.2" }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let id = gateway(&server)
            .send_template(
                &creds(),
                "5492645280229",
                "promo_agosto",
                "es",
                &["Renzo".to_string()],
            )
            .await
            .expect("template send should succeed");
        assert_eq!(id, "wamid.out.2");
    }

    #[tokio::test]
    async fn provider_errors_surface_status_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/111222333/messages"))
            .respond_with(
                ResponseTemplate::new(400)
                    .set_body_json(serde_json::json!({ "error": { "message": "bad recipient" } })),
            )
            .mount(&server)
            .await;

        let err = gateway(&server)
            .send_text(&creds(), "5492645280229", "hola")
            .await
            .expect_err("send should fail");
        let detail = err.to_string();
        assert!(detail.contains("400"), "missing status in: {detail}");
        assert!(detail.contains("bad recipient"), "missing body in: {detail}");
    }

    #[tokio::test]
    async fn verify_credentials_rejects_a_mismatched_phone_id() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/111222333"))
            .and(query_param("fields", "id,display_phone_number"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "999000111",
                "display_phone_number": "+54 264 400 1000",
            })))
            .mount(&server)
            .await;

        let err = gateway(&server)
            .verify_credentials(&creds())
            .await
            .expect_err("mismatch should fail");
        assert!(err.to_string().contains("mismatch"));
    }

    #[tokio::test]
    async fn verify_credentials_accepts_a_matching_phone_id() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/111222333"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "111222333",
            })))
            .mount(&server)
            .await;

        gateway(&server)
            .verify_credentials(&creds())
            .await
            .expect("matching id should verify");
    }
}
