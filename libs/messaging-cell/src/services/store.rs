// libs/messaging-cell/src/services/store.rs
use anyhow::Result;
use async_trait::async_trait;
use reqwest::Method;
use serde_json::json;
use std::sync::Arc;
use tracing::debug;

use shared_database::supabase::SupabaseClient;

use crate::models::{Conversation, Message, NewMessage};

/// Persistence operations the messaging core needs from the hosted store.
#[async_trait]
pub trait MessagingStore: Send + Sync {
    /// The conversation whose sides are exactly `{a, b}`, if any.
    async fn find_conversation(&self, a: &str, b: &str, auth_token: &str) -> Result<Option<Conversation>>;

    async fn get_conversation(&self, conversation_id: &str, auth_token: &str) -> Result<Option<Conversation>>;

    async fn create_conversation(&self, user1_id: &str, user2_id: &str, auth_token: &str) -> Result<Conversation>;

    /// Messages of a conversation in ascending `created_at` order.
    async fn list_messages(&self, conversation_id: &str, auth_token: &str) -> Result<Vec<Message>>;

    /// Flip `is_read` for all `message_ids` in one update.
    async fn mark_read(&self, message_ids: &[String], auth_token: &str) -> Result<()>;

    async fn insert_message(&self, message: &NewMessage, auth_token: &str) -> Result<Message>;
}

pub struct SupabaseMessagingStore {
    supabase: Arc<SupabaseClient>,
}

impl SupabaseMessagingStore {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }
}

fn encode(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}

#[async_trait]
impl MessagingStore for SupabaseMessagingStore {
    async fn find_conversation(&self, a: &str, b: &str, auth_token: &str) -> Result<Option<Conversation>> {
        let (a, b) = (encode(a), encode(b));
        let path = format!(
            "/rest/v1/conversations?select=*&or=(and(user1_id.eq.{a},user2_id.eq.{b}),and(user1_id.eq.{b},user2_id.eq.{a}))&limit=1",
        );

        let mut rows: Vec<Conversation> = self.supabase.request(
            Method::GET,
            &path,
            Some(auth_token),
            None,
        ).await?;

        Ok(if rows.is_empty() { None } else { Some(rows.swap_remove(0)) })
    }

    async fn get_conversation(&self, conversation_id: &str, auth_token: &str) -> Result<Option<Conversation>> {
        let path = format!("/rest/v1/conversations?select=*&id=eq.{}&limit=1", encode(conversation_id));
        let mut rows: Vec<Conversation> = self.supabase.request(Method::GET, &path, Some(auth_token), None).await?;

        Ok(rows.pop())
    }

    async fn create_conversation(&self, user1_id: &str, user2_id: &str, auth_token: &str) -> Result<Conversation> {
        debug!("Creating conversation between {} and {}", user1_id, user2_id);
        self.supabase.insert_returning(
            "conversations",
            json!({ "user1_id": user1_id, "user2_id": user2_id }),
            auth_token,
        ).await
    }

    async fn list_messages(&self, conversation_id: &str, auth_token: &str) -> Result<Vec<Message>> {
        let path = format!(
            "/rest/v1/messages?select=*&conversation_id=eq.{}&order=created_at.asc",
            encode(conversation_id)
        );

        self.supabase.request(Method::GET, &path, Some(auth_token), None).await
    }

    async fn mark_read(&self, message_ids: &[String], auth_token: &str) -> Result<()> {
        if message_ids.is_empty() {
            return Ok(());
        }

        let ids: Vec<String> = message_ids.iter().map(|id| encode(id)).collect();
        let path = format!("/rest/v1/messages?id=in.({})", ids.join(","));

        self.supabase.execute(
            Method::PATCH,
            &path,
            Some(auth_token),
            Some(json!({ "is_read": true })),
        ).await
    }

    async fn insert_message(&self, message: &NewMessage, auth_token: &str) -> Result<Message> {
        self.supabase.insert_returning("messages", serde_json::to_value(message)?, auth_token).await
    }
}
