pub mod ingestor;
pub mod payload;
pub mod signature;

pub use ingestor::{MessageIngestor, OPTOUT_KEYWORD};
pub use payload::WebhookPayload;
