use std::sync::Arc;

use async_trait::async_trait;
use chrono::SecondsFormat;
use serde_json::{Map, Value};

use super::types::{ALBUM_PAYLOAD_TYPE, AlbumPayload, PendingAlbum, SessionContext};
use crate::error::Result;

/// Receiver of flushed albums, typically a webhook sender.
///
/// Delivery is fire-and-forget from the buffer's point of view: the buffer
/// neither retries nor inspects the outcome, so implementations handle and
/// report their own failures.
#[async_trait]
pub trait AlbumDelivery: Send + Sync {
    /// Deliver one flattened album payload on behalf of `session`
    async fn deliver(&self, session: &SessionContext, payload: Map<String, Value>);
}

impl AlbumPayload {
    /// Builds the payload for a flushed album, handing back its session.
    pub(crate) fn from_album(album: PendingAlbum) -> (SessionContext, Self) {
        let payload = Self {
            kind: ALBUM_PAYLOAD_TYPE.to_string(),
            album_id: album.album_id,
            // The webhook reads `sender` as the alternate id and `senderLid`
            // as the sender JID.
            sender: album.sender_alt,
            sender_lid: Some(album.sender).filter(|jid| !jid.is_empty()),
            chat: album.chat,
            caption: Some(album.caption).filter(|caption| !caption.is_empty()),
            timestamp: album.created_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            total_images: album.messages.len(),
            images: album.messages,
        };

        (album.session, payload)
    }

    /// Flattens the payload into the key/value map used on the wire.
    pub fn into_map(self) -> Result<Map<String, Value>> {
        let value = serde_json::to_value(self)?;
        Ok(serde_json::from_value(value)?)
    }
}

/// Turns flushed albums into payloads and hands them to the delivery side.
pub(crate) struct FlushDispatcher {
    delivery: Arc<dyn AlbumDelivery>,
}

impl FlushDispatcher {
    pub fn new(delivery: Arc<dyn AlbumDelivery>) -> Self {
        Self { delivery }
    }

    pub async fn dispatch(&self, album: PendingAlbum) {
        let (session, payload) = AlbumPayload::from_album(album);

        tracing::info!(
            target: "album_relay::album_buffer::dispatcher",
            "Flushing album {} with {} images from chat {}",
            payload.album_id,
            payload.total_images,
            payload.chat
        );

        let album_id = payload.album_id.clone();
        match payload.into_map() {
            Ok(map) => self.delivery.deliver(&session, map).await,
            Err(e) => {
                tracing::error!(
                    target: "album_relay::album_buffer::dispatcher",
                    "Failed to serialize album {}: {}",
                    album_id,
                    e
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::album_buffer::types::{AlbumMessage, AlbumMetadata};
    use chrono::{DateTime, Utc};
    use serde_json::json;

    fn album_with(caption: &str, sender_alt: &str, messages: Vec<AlbumMessage>) -> PendingAlbum {
        let metadata = AlbumMetadata {
            chat: "chat@g.us".to_string(),
            sender: "sender@s.whatsapp.net".to_string(),
            sender_alt: sender_alt.to_string(),
            caption: caption.to_string(),
            timestamp: Some(
                DateTime::parse_from_rfc3339("2024-03-01T14:30:45+02:00")
                    .unwrap()
                    .with_timezone(&Utc),
            ),
            session: SessionContext {
                user_id: "user-1".to_string(),
                token: "token-1".to_string(),
                webhook_url: None,
            },
        };

        let mut album = PendingAlbum::new("ALBUM1", metadata);
        album.messages = messages;
        album
    }

    fn message(id: &str) -> AlbumMessage {
        AlbumMessage {
            id: id.to_string(),
            url: Some(format!("https://media.example/{id}")),
            mime_type: Some("image/jpeg".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_payload_from_album() {
        let album = album_with("hi", "1234@lid", vec![message("m1"), message("m2")]);

        let (session, payload) = AlbumPayload::from_album(album);

        assert_eq!(session.user_id, "user-1");
        assert_eq!(payload.kind, "MessageAlbum");
        assert_eq!(payload.album_id, "ALBUM1");
        assert_eq!(payload.sender, "1234@lid");
        assert_eq!(payload.sender_lid.as_deref(), Some("sender@s.whatsapp.net"));
        assert_eq!(payload.caption.as_deref(), Some("hi"));
        assert_eq!(payload.timestamp, "2024-03-01T12:30:45Z");
        assert_eq!(payload.total_images, 2);
        let ids: Vec<&str> = payload.images.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["m1", "m2"]);
    }

    #[test]
    fn test_payload_map_omits_empty_optionals() {
        let album = album_with("", "", vec![message("m1")]);
        let (_, payload) = AlbumPayload::from_album(album);

        let map = payload.into_map().unwrap();
        assert_eq!(
            Value::Object(map),
            json!({
                "type": "MessageAlbum",
                "albumId": "ALBUM1",
                "sender": "",
                "senderLid": "sender@s.whatsapp.net",
                "chat": "chat@g.us",
                "timestamp": "2024-03-01T12:30:45Z",
                "totalImages": 1,
                "images": [{
                    "id": "m1",
                    "url": "https://media.example/m1",
                    "mimeType": "image/jpeg"
                }]
            })
        );
    }
}
