// libs/messaging-cell/src/services/conversation.rs
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use shared_database::supabase::is_conflict;
use shared_utils::session::SessionContext;

use crate::models::{Conversation, MessagingError};
use crate::services::store::MessagingStore;

/// Finds or lazily creates the single conversation between the signed-in
/// user and a counterpart.
pub struct ConversationResolver {
    store: Arc<dyn MessagingStore>,
    session: Arc<SessionContext>,
}

impl ConversationResolver {
    pub fn new(store: Arc<dyn MessagingStore>, session: Arc<SessionContext>) -> Self {
        Self { store, session }
    }

    pub async fn resolve(&self, counterpart_id: &str) -> Result<String, MessagingError> {
        self.resolve_conversation(counterpart_id).await.map(|conversation| conversation.id)
    }

    pub async fn resolve_conversation(&self, counterpart_id: &str) -> Result<Conversation, MessagingError> {
        let session = self.session.current().ok_or(MessagingError::AuthRequired)?;
        let self_id = session.user_id();

        if counterpart_id.trim().is_empty() || counterpart_id == self_id {
            return Err(MessagingError::InvalidParticipant);
        }

        let token = session.access_token.as_str();

        if let Some(existing) = self.find_pair(self_id, counterpart_id, token).await? {
            debug!("Found conversation {} for {} and {}", existing.id, self_id, counterpart_id);
            return Ok(existing);
        }

        match self.store.create_conversation(self_id, counterpart_id, token).await {
            Ok(created) => {
                info!("Created conversation {} between {} and {}", created.id, self_id, counterpart_id);
                Ok(created)
            }
            Err(e) if is_conflict(&e) => {
                // The other participant created it between our lookup and insert.
                warn!("Conversation for {} and {} created concurrently, re-reading", self_id, counterpart_id);
                self.find_pair(self_id, counterpart_id, token)
                    .await?
                    .ok_or_else(|| MessagingError::StorageError(
                        "conversation conflict reported but no conversation found".to_string(),
                    ))
            }
            Err(e) => {
                error!("Failed to create conversation: {}", e);
                Err(MessagingError::StorageError(e.to_string()))
            }
        }
    }

    async fn find_pair(&self, a: &str, b: &str, token: &str) -> Result<Option<Conversation>, MessagingError> {
        let found = self.store.find_conversation(a, b, token).await.map_err(|e| {
            error!("Failed to look up conversation: {}", e);
            MessagingError::StorageError(e.to_string())
        })?;

        // Never hand out a conversation that is not exactly this pair.
        Ok(found.filter(|conversation| conversation.is_between(a, b)))
    }
}
