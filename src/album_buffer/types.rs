use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::scheduler::FlushTimer;

/// Type tag carried by every flushed album payload.
pub const ALBUM_PAYLOAD_TYPE: &str = "MessageAlbum";

/// A single media item belonging to an album
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AlbumMessage {
    /// Message id, unique within the album
    pub id: String,

    /// Remote location of the media, if it was uploaded somewhere
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Inline media bytes, carried on the wire as standard base64
    #[serde(
        rename = "base64",
        default,
        with = "base64_data",
        skip_serializing_if = "Option::is_none"
    )]
    pub data: Option<Vec<u8>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,

    /// Object storage metadata, passed through untouched
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub s3: Map<String, Value>,
}

mod base64_data {
    use base64::{Engine as _, engine::general_purpose};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(data: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match data {
            Some(bytes) => serializer.serialize_str(&general_purpose::STANDARD.encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<String>::deserialize(deserializer)?
            .filter(|encoded| !encoded.is_empty())
            .map(|encoded| {
                general_purpose::STANDARD
                    .decode(encoded)
                    .map_err(serde::de::Error::custom)
            })
            .transpose()
    }
}

/// Credentials and routing for the session an album was received on.
///
/// The buffer never looks inside; it is handed back to the delivery
/// collaborator together with the flushed payload.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct SessionContext {
    pub user_id: String,
    pub token: String,
    pub webhook_url: Option<String>,
}

impl std::fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionContext")
            .field("user_id", &self.user_id)
            .field("token", &"<REDACTED>")
            .field("webhook_url", &self.webhook_url)
            .finish()
    }
}

/// Metadata supplied with every message added to the buffer.
///
/// Only the first message of an album seeds the album; later messages can
/// contribute nothing but a caption. Missing fields stay empty.
#[derive(Debug, Clone, Default)]
pub struct AlbumMetadata {
    /// Chat the album was posted in
    pub chat: String,

    /// Sender JID, delivered as `senderLid`
    pub sender: String,

    /// Alternate sender id, delivered as `sender`; empty when unknown
    pub sender_alt: String,

    pub caption: String,

    /// When the message was sent; defaults to the moment the album is opened
    pub timestamp: Option<DateTime<Utc>>,

    pub session: SessionContext,
}

/// An album that is still collecting messages.
pub(crate) struct PendingAlbum {
    pub album_id: String,
    pub chat: String,
    pub sender: String,
    pub sender_alt: String,
    pub caption: String,
    pub created_at: DateTime<Utc>,
    pub messages: Vec<AlbumMessage>,
    pub session: SessionContext,

    /// Generation of the timer currently armed for this album
    pub generation: u64,

    /// Present exactly while the album is stored in the buffer
    pub timer: Option<FlushTimer>,
}

impl PendingAlbum {
    pub fn new(album_id: &str, metadata: AlbumMetadata) -> Self {
        Self {
            album_id: album_id.to_owned(),
            chat: metadata.chat,
            sender: metadata.sender,
            sender_alt: metadata.sender_alt,
            caption: metadata.caption,
            created_at: metadata.timestamp.unwrap_or_else(Utc::now),
            messages: Vec::new(),
            session: metadata.session,
            generation: 0,
            timer: None,
        }
    }

    /// Adopts `incoming` only while the album has no caption yet.
    pub fn merge_caption(&mut self, incoming: &str) {
        if self.caption.is_empty() && !incoming.is_empty() {
            self.caption = incoming.to_owned();
        }
    }
}

/// The immutable snapshot of a flushed album as sent to the webhook.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AlbumPayload {
    #[serde(rename = "type")]
    pub kind: String,

    pub album_id: String,

    /// Alternate sender id of the album
    pub sender: String,

    /// Sender JID, omitted when unknown
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_lid: Option<String>,

    pub chat: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,

    /// RFC3339 creation time of the album
    pub timestamp: String,

    pub total_images: usize,

    pub images: Vec<AlbumMessage>,
}
