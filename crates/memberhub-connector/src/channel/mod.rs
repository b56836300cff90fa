//! Cross-context message channel

mod bridge;
mod listener;
mod message;

pub use listener::{ChannelError, MessageChannel, Subscription};
pub use message::{parse_redirect_url, FlowMessage};
