use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::mpsc;

use crate::album_buffer::{AlbumDelivery, SessionContext};

/// A payload handed to a [`ChannelDelivery`]
#[derive(Debug, Clone)]
pub struct Delivered {
    pub session: SessionContext,
    pub payload: Map<String, Value>,
}

/// Forwards every delivered payload to an in-process channel.
pub struct ChannelDelivery {
    sender: mpsc::UnboundedSender<Delivered>,
}

impl ChannelDelivery {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Delivered>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl AlbumDelivery for ChannelDelivery {
    async fn deliver(&self, session: &SessionContext, payload: Map<String, Value>) {
        let delivered = Delivered {
            session: session.clone(),
            payload,
        };

        if self.sender.send(delivered).is_err() {
            tracing::debug!(
                target: "album_relay::delivery::channel",
                "Receiver dropped, discarding payload"
            );
        }
    }
}
