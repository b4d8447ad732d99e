//! Album id extraction from message context envelopes.
//!
//! Media messages that belong to an album carry a reference to the album's
//! parent message under `messageAssociation.parentMessageKey.ID`. The
//! envelope is loosely structured, so any level may be missing or have an
//! unexpected shape.

use serde::Deserialize;
use serde_json::Value;

const PARENT_MESSAGE_KEY_PATH: &str = "/messageAssociation/parentMessageKey/ID";

/// Returns the album id referenced by a message context, if any.
///
/// Yields `None` when a level is absent, is not an object, or when the id is
/// not a non-empty string.
pub fn parent_message_key(context: &Value) -> Option<String> {
    context
        .pointer(PARENT_MESSAGE_KEY_PATH)
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .map(str::to_owned)
}

/// Typed view of the parts of a message context the relay cares about.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MessageContext {
    #[serde(default)]
    pub message_association: Option<MessageAssociation>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MessageAssociation {
    #[serde(default)]
    pub parent_message_key: Option<ParentMessageKey>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct ParentMessageKey {
    #[serde(rename = "ID", default)]
    pub id: Option<String>,
}

impl MessageContext {
    pub fn album_id(&self) -> Option<&str> {
        self.message_association
            .as_ref()?
            .parent_message_key
            .as_ref()?
            .id
            .as_deref()
            .filter(|id| !id.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_finds_parent_message_key() {
        let context = json!({
            "messageAssociation": {
                "parentMessageKey": { "ID": "3EB0ALBUM", "fromMe": false }
            },
            "stanzaId": "ignored"
        });

        assert_eq!(parent_message_key(&context), Some("3EB0ALBUM".to_string()));
    }

    #[test]
    fn test_missing_levels_are_not_found() {
        assert_eq!(parent_message_key(&Value::Null), None);
        assert_eq!(parent_message_key(&json!({})), None);
        assert_eq!(parent_message_key(&json!({ "messageAssociation": {} })), None);
        assert_eq!(
            parent_message_key(&json!({ "messageAssociation": { "parentMessageKey": {} } })),
            None
        );
    }

    #[test]
    fn test_wrong_shapes_are_not_found() {
        assert_eq!(parent_message_key(&json!("just a string")), None);
        assert_eq!(parent_message_key(&json!({ "messageAssociation": 7 })), None);
        assert_eq!(
            parent_message_key(&json!({ "messageAssociation": { "parentMessageKey": ["ID"] } })),
            None
        );
        assert_eq!(
            parent_message_key(&json!({
                "messageAssociation": { "parentMessageKey": { "ID": 42 } }
            })),
            None
        );
    }

    #[test]
    fn test_empty_id_is_not_found() {
        let context = json!({
            "messageAssociation": { "parentMessageKey": { "ID": "" } }
        });
        assert_eq!(parent_message_key(&context), None);
    }

    #[test]
    fn test_typed_context_matches_pointer_lookup() {
        let raw = json!({
            "messageAssociation": { "parentMessageKey": { "ID": "ALBUM1" } }
        });
        let context: MessageContext = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(context.album_id(), Some("ALBUM1"));
        assert_eq!(parent_message_key(&raw).as_deref(), context.album_id());

        let empty: MessageContext = serde_json::from_value(json!({})).unwrap();
        assert_eq!(empty.album_id(), None);

        let blank: MessageContext = serde_json::from_value(json!({
            "messageAssociation": { "parentMessageKey": { "ID": "" } }
        }))
        .unwrap();
        assert_eq!(blank.album_id(), None);
    }
}
