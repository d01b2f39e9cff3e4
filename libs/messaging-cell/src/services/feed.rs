// libs/messaging-cell/src/services/feed.rs
use anyhow::Result;
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use shared_config::AppConfig;
use shared_database::realtime::RealtimeClient;

use crate::models::Message;

pub type MessageStream = BoxStream<'static, Message>;

/// Push source of newly inserted messages. Dropping the returned stream
/// releases whatever the subscription holds on the server.
#[async_trait]
pub trait MessageFeed: Send + Sync {
    async fn subscribe(&self, conversation_id: &str, auth_token: &str) -> Result<MessageStream>;
}

/// Change feed backed by the hosted store's realtime service.
pub struct RealtimeMessageFeed {
    client: RealtimeClient,
}

impl RealtimeMessageFeed {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: RealtimeClient::new(config),
        }
    }
}

#[async_trait]
impl MessageFeed for RealtimeMessageFeed {
    async fn subscribe(&self, conversation_id: &str, auth_token: &str) -> Result<MessageStream> {
        let subscription = self.client.subscribe_inserts(
            &format!("messages:{}", conversation_id),
            "messages",
            &format!("conversation_id=eq.{}", conversation_id),
            auth_token,
        ).await?;

        let messages = stream::unfold(subscription, |mut subscription| async move {
            loop {
                let record = subscription.next_record().await?;
                match serde_json::from_value::<Message>(record) {
                    Ok(message) => return Some((message, subscription)),
                    Err(e) => warn!("Dropping malformed message payload on {}: {}", subscription.topic(), e),
                }
            }
        });

        Ok(messages.boxed())
    }
}

/// In-process feed. Used when no realtime service is configured: the API
/// publishes every message it stores, and live clients of the same
/// process receive it.
#[derive(Clone)]
pub struct LocalMessageFeed {
    sender: broadcast::Sender<Message>,
}

impl LocalMessageFeed {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(1000);
        Self { sender }
    }

    /// Returns the number of subscribers that will see `message`.
    pub fn publish(&self, message: Message) -> usize {
        match self.sender.send(message) {
            Ok(receivers) => receivers,
            Err(_) => {
                debug!("No live subscribers for published message");
                0
            }
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for LocalMessageFeed {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageFeed for LocalMessageFeed {
    async fn subscribe(&self, conversation_id: &str, _auth_token: &str) -> Result<MessageStream> {
        let receiver = self.sender.subscribe();
        let conversation_id = conversation_id.to_string();

        let messages = stream::unfold((receiver, conversation_id), |(mut receiver, conversation_id)| async move {
            loop {
                match receiver.recv().await {
                    Ok(message) if message.conversation_id == conversation_id => {
                        return Some((message, (receiver, conversation_id)));
                    }
                    Ok(_) => continue,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Live feed for {} lagged, {} messages skipped", conversation_id, skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        });

        Ok(messages.boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn message(id: &str, conversation_id: &str) -> Message {
        Message {
            id: id.to_string(),
            conversation_id: conversation_id.to_string(),
            sender_id: "alice".to_string(),
            recipient_id: "bob".to_string(),
            content: "hi".to_string(),
            created_at: Utc::now(),
            is_read: false,
        }
    }

    #[tokio::test]
    async fn test_local_feed_filters_by_conversation() {
        let feed = LocalMessageFeed::new();
        let mut stream = feed.subscribe("c1", "token").await.unwrap();

        feed.publish(message("m1", "c2"));
        feed.publish(message("m2", "c1"));

        let received = stream.next().await.unwrap();
        assert_eq!(received.id, "m2");
    }

    #[tokio::test]
    async fn test_dropping_stream_releases_subscriber() {
        let feed = LocalMessageFeed::new();
        let stream = feed.subscribe("c1", "token").await.unwrap();
        assert_eq!(feed.subscriber_count(), 1);

        drop(stream);
        assert_eq!(feed.subscriber_count(), 0);
        assert_eq!(feed.publish(message("m1", "c1")), 0);
    }
}
