pub mod api;
pub mod credentials;
pub mod media;

pub use api::{MediaMetadata, OutboundGateway};
pub use credentials::{Credentials, resolve_credentials};
pub use media::MediaFetcher;
