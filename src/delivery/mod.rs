//! Delivery collaborators for flushed albums.

mod channel;
mod webhook;

pub use channel::{ChannelDelivery, Delivered};
pub use webhook::WebhookDelivery;
