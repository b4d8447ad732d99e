//! Routing of incoming message envelopes: album media goes through the
//! [`AlbumBuffer`], everything else is delivered as it arrives.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Map, Value, json};

use crate::album_buffer::{
    AlbumBuffer, AlbumDelivery, AlbumMessage, AlbumMetadata, SessionContext,
};
use crate::error::Result;
use crate::key_extractor::parent_message_key;

/// Type tag of payloads for messages that are not part of an album
pub const MESSAGE_PAYLOAD_TYPE: &str = "Message";

/// One incoming message
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    #[serde(flatten)]
    pub message: AlbumMessage,

    #[serde(default)]
    pub chat: String,

    #[serde(default)]
    pub sender: String,

    #[serde(default)]
    pub sender_alt: String,

    #[serde(default)]
    pub caption: String,

    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,

    /// Raw context info, searched for the album's parent message key
    #[serde(default)]
    pub context_info: Option<Value>,
}

impl Envelope {
    /// The album this message belongs to, if any
    pub fn album_id(&self) -> Option<String> {
        self.context_info.as_ref().and_then(parent_message_key)
    }

    fn metadata(&self, session: &SessionContext) -> AlbumMetadata {
        AlbumMetadata {
            chat: self.chat.clone(),
            sender: self.sender.clone(),
            sender_alt: self.sender_alt.clone(),
            caption: self.caption.clone(),
            timestamp: self.timestamp,
            session: session.clone(),
        }
    }

    fn into_message_payload(self) -> Result<Map<String, Value>> {
        let mut payload = Map::new();
        payload.insert("type".to_string(), json!(MESSAGE_PAYLOAD_TYPE));
        payload.insert("chat".to_string(), json!(self.chat));
        payload.insert("sender".to_string(), json!(self.sender));
        payload.insert("caption".to_string(), json!(self.caption));
        payload.insert("message".to_string(), serde_json::to_value(&self.message)?);
        Ok(payload)
    }
}

/// Sends `envelope` on its way.
///
/// Album media is added to `buffer` while grouping is enabled. Any other
/// message, and every message while grouping is disabled, goes straight to
/// `delivery`. Returns `true` when the envelope was buffered.
///
/// # Errors
///
/// Propagates [`AlbumBuffer::add_message`] failures and serialization errors
/// of directly delivered messages.
pub async fn route(
    buffer: &AlbumBuffer,
    delivery: &dyn AlbumDelivery,
    session: &SessionContext,
    envelope: Envelope,
) -> Result<bool> {
    match envelope.album_id() {
        Some(album_id) if buffer.is_enabled() => {
            let metadata = envelope.metadata(session);
            buffer.add_message(&album_id, envelope.message, metadata)?;
            Ok(true)
        }
        _ => {
            tracing::debug!(
                target: "album_relay::router",
                "Delivering message {} directly",
                envelope.message.id
            );
            let payload = envelope.into_message_payload()?;
            delivery.deliver(session, payload).await;
            Ok(false)
        }
    }
}
