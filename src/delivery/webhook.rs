use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::album_buffer::{AlbumDelivery, SessionContext};
use crate::error::Result;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Posts flushed albums as JSON to the session's webhook.
///
/// Sessions without a webhook of their own fall back to the URL given at
/// construction; when neither exists the payload is dropped. Failed requests
/// are logged and not retried.
pub struct WebhookDelivery {
    client: reqwest::Client,
    fallback_url: Option<String>,
}

impl WebhookDelivery {
    pub fn new(fallback_url: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            fallback_url,
        })
    }

    fn target_url<'a>(&'a self, session: &'a SessionContext) -> Option<&'a str> {
        session
            .webhook_url
            .as_deref()
            .filter(|url| !url.is_empty())
            .or(self.fallback_url.as_deref())
    }

    /// Sends one payload to `url`, failing on transport errors and non-2xx statuses.
    pub async fn post(
        &self,
        url: &str,
        session: &SessionContext,
        payload: &Map<String, Value>,
    ) -> Result<()> {
        let mut request = self.client.post(url).json(payload);
        if !session.token.is_empty() {
            request = request.header("token", &session.token);
        }
        if !session.user_id.is_empty() {
            request = request.header("userId", &session.user_id);
        }

        request.send().await?.error_for_status()?;
        Ok(())
    }
}

#[async_trait]
impl AlbumDelivery for WebhookDelivery {
    async fn deliver(&self, session: &SessionContext, payload: Map<String, Value>) {
        let Some(url) = self.target_url(session) else {
            tracing::debug!(
                target: "album_relay::delivery::webhook",
                "No webhook configured for user {}, dropping payload",
                session.user_id
            );
            return;
        };

        match self.post(url, session, &payload).await {
            Ok(()) => {
                tracing::debug!(
                    target: "album_relay::delivery::webhook",
                    "Delivered payload for user {} to {}",
                    session.user_id,
                    url
                );
            }
            Err(e) => {
                tracing::warn!(
                    target: "album_relay::delivery::webhook",
                    "Webhook delivery to {} failed: {}",
                    url,
                    e
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;

    fn payload() -> Map<String, Value> {
        let mut payload = Map::new();
        payload.insert("type".to_string(), json!("MessageAlbum"));
        payload.insert("albumId".to_string(), json!("ALBUM1"));
        payload.insert("totalImages".to_string(), json!(2));
        payload
    }

    fn session(webhook_url: Option<String>) -> SessionContext {
        SessionContext {
            user_id: "user-1".to_string(),
            token: "token-1".to_string(),
            webhook_url,
        }
    }

    #[tokio::test]
    async fn test_posts_payload_to_session_webhook() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/hook")
            .match_header("token", "token-1")
            .match_header("userId", "user-1")
            .match_body(Matcher::Json(json!({
                "type": "MessageAlbum",
                "albumId": "ALBUM1",
                "totalImages": 2
            })))
            .with_status(200)
            .create_async()
            .await;

        let delivery = WebhookDelivery::new(None).unwrap();
        delivery
            .deliver(&session(Some(format!("{}/hook", server.url()))), payload())
            .await;

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_falls_back_to_default_url() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/fallback")
            .with_status(204)
            .create_async()
            .await;

        let delivery = WebhookDelivery::new(Some(format!("{}/fallback", server.url()))).unwrap();
        delivery.deliver(&session(None), payload()).await;

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_error_status_is_reported_by_post_and_swallowed_by_deliver() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/hook")
            .with_status(500)
            .expect(2)
            .create_async()
            .await;

        let url = format!("{}/hook", server.url());
        let delivery = WebhookDelivery::new(None).unwrap();

        let res = delivery.post(&url, &session(None), &payload()).await;
        assert!(res.is_err());

        // Must not panic or retry
        delivery.deliver(&session(Some(url)), payload()).await;

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_no_url_skips_delivery() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        let delivery = WebhookDelivery::new(None).unwrap();
        delivery.deliver(&session(Some(String::new())), payload()).await;

        mock.assert_async().await;
    }
}
