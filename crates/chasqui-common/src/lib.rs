pub mod error;
pub mod events;
pub mod phone;
pub mod types;

pub use error::{Error, Result};
pub use events::{Event, EventBus, NoopEventBus};
pub use types::{
    Campaign, CampaignStatus, Channel, ChannelStatus, Contact, Message, MessageDirection,
    MessageStatus, Tag, Template,
};
