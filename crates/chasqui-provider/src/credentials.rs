use chasqui_common::{Channel, Error, Result};

/// Bearer credential pair for one channel's provider API calls.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub access_token: String,
    pub phone_id: String,
}

/// The only credential-resolution path in the system. A channel missing its
/// token or phone identifier is a hard stop: callers must fail the specific
/// operation rather than fall back to another channel's credentials.
pub fn resolve_credentials(channel: &Channel) -> Result<Credentials> {
    let access_token = channel
        .access_token
        .as_deref()
        .filter(|t| !t.is_empty())
        .ok_or_else(|| Error::Channel(format!("channel {} has no access token", channel.id)))?;

    if channel.phone_id.is_empty() {
        return Err(Error::Channel(format!(
            "channel {} has no phone identifier",
            channel.id
        )));
    }

    Ok(Credentials {
        access_token: access_token.to_string(),
        phone_id: channel.phone_id.clone(),
    })
}
