// libs/messaging-cell/src/services/channel.rs
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use shared_utils::session::SessionContext;

use crate::models::{Counterpart, Message, MessagingError, NewMessage};
use crate::services::feed::MessageFeed;
use crate::services::store::MessagingStore;

/// History of the open conversation. Shared between the channel and its
/// live forwarding task; every insertion goes through [`append`].
///
/// [`append`]: ChannelState::append
#[derive(Debug, Default)]
struct ChannelState {
    conversation_id: Option<String>,
    messages: Vec<Message>,
    known_ids: HashSet<String>,
    draft: String,
}

impl ChannelState {
    fn reset(&mut self, conversation_id: Option<String>) {
        self.conversation_id = conversation_id;
        self.messages.clear();
        self.known_ids.clear();
    }

    /// Insert keeping `created_at` order. Rejects known ids and messages
    /// of any conversation other than the open one.
    fn append(&mut self, message: Message) -> bool {
        if self.conversation_id.as_deref() != Some(message.conversation_id.as_str()) {
            return false;
        }
        if !self.known_ids.insert(message.id.clone()) {
            return false;
        }

        let position = self
            .messages
            .partition_point(|existing| existing.created_at <= message.created_at);
        self.messages.insert(position, message);
        true
    }

    /// Replace history with a fresh fetch, keeping anything delivered
    /// live that the fetch did not include yet.
    fn merge_history(&mut self, fetched: Vec<Message>) {
        let fetched_ids: HashSet<&str> = fetched.iter().map(|m| m.id.as_str()).collect();
        let carried: Vec<Message> = self
            .messages
            .iter()
            .filter(|m| !fetched_ids.contains(m.id.as_str()))
            .cloned()
            .collect();

        let conversation_id = self.conversation_id.take();
        self.reset(conversation_id);

        for message in fetched.into_iter().chain(carried) {
            self.append(message);
        }
    }

    fn mark_read_local(&mut self, ids: &[String]) {
        for message in self.messages.iter_mut().filter(|m| ids.contains(&m.id)) {
            message.is_read = true;
        }
    }
}

/// Clears its flag when dropped, including when the owning future is
/// cancelled mid-request.
struct FlagGuard<'a>(&'a AtomicBool);

impl<'a> FlagGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for FlagGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// A standing live subscription. Dropping the handle stops delivery and
/// releases the underlying feed subscription.
#[derive(Debug)]
pub struct LiveSubscription {
    conversation_id: String,
    task: JoinHandle<()>,
}

impl LiveSubscription {
    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    pub fn is_active(&self) -> bool {
        !self.task.is_finished()
    }

    pub fn unsubscribe(self) {
        debug!("Unsubscribing from conversation {}", self.conversation_id);
    }
}

impl Drop for LiveSubscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Ordered message history of one conversation plus its live feed.
pub struct MessageChannel {
    store: Arc<dyn MessagingStore>,
    feed: Arc<dyn MessageFeed>,
    session: Arc<SessionContext>,
    counterpart: Counterpart,
    state: Arc<Mutex<ChannelState>>,
    live: Mutex<Option<LiveSubscription>>,
    sending: AtomicBool,
    loading: AtomicBool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MessageChannel {
    pub fn new(
        store: Arc<dyn MessagingStore>,
        feed: Arc<dyn MessageFeed>,
        session: Arc<SessionContext>,
        counterpart: Counterpart,
    ) -> Self {
        Self {
            store,
            feed,
            session,
            counterpart,
            state: Arc::new(Mutex::new(ChannelState::default())),
            live: Mutex::new(None),
            sending: AtomicBool::new(false),
            loading: AtomicBool::new(false),
        }
    }

    pub fn counterpart(&self) -> &Counterpart {
        &self.counterpart
    }

    pub fn conversation_id(&self) -> Option<String> {
        lock(&self.state).conversation_id.clone()
    }

    pub fn messages(&self) -> Vec<Message> {
        lock(&self.state).messages.clone()
    }

    pub fn draft(&self) -> String {
        lock(&self.state).draft.clone()
    }

    pub fn set_draft(&self, text: &str) {
        lock(&self.state).draft = text.to_string();
    }

    pub fn is_sending(&self) -> bool {
        self.sending.load(Ordering::Acquire)
    }

    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::Acquire)
    }

    pub fn is_live(&self) -> bool {
        lock(&self.live).as_ref().is_some_and(LiveSubscription::is_active)
    }

    /// Point the channel at `conversation_id` without a live feed. Any
    /// previous subscription is released and history is cleared.
    pub fn attach(&self, conversation_id: &str) {
        self.close();
        lock(&self.state).reset(Some(conversation_id.to_string()));
    }

    /// Switch to `conversation_id`: subscribe first, then load history.
    /// Messages landing between the two are absorbed by id de-duplication.
    ///
    /// When the live feed cannot be established the history is still
    /// loaded and `SubscriptionError` is returned so the view can render
    /// static history.
    pub async fn open<F>(&self, conversation_id: &str, on_insert: F) -> Result<Vec<Message>, MessagingError>
    where
        F: FnMut(&Message) + Send + 'static,
    {
        self.attach(conversation_id);

        let subscription_error = match self.subscribe(conversation_id, on_insert).await {
            Ok(subscription) => {
                *lock(&self.live) = Some(subscription);
                None
            }
            Err(e) => {
                warn!("Continuing without live updates for {}: {}", conversation_id, e);
                Some(e)
            }
        };

        let history = self.load_history().await?;

        match subscription_error {
            Some(e) => Err(e),
            None => Ok(history),
        }
    }

    /// Tear down the live subscription, if any.
    pub fn close(&self) {
        if let Some(subscription) = lock(&self.live).take() {
            subscription.unsubscribe();
        }
    }

    /// Fetch the full history and mark everything addressed to the caller
    /// as read in one batched update. The previous history is kept when
    /// the fetch fails.
    pub async fn load_history(&self) -> Result<Vec<Message>, MessagingError> {
        let conversation_id = self.conversation_id().ok_or(MessagingError::NoConversation)?;
        let session = self.session.current().ok_or(MessagingError::AuthRequired)?;
        let token = session.access_token.as_str();

        let _loading = FlagGuard::acquire(&self.loading)
            .ok_or_else(|| MessagingError::StorageError("history is already loading".to_string()))?;

        let fetched = self.store.list_messages(&conversation_id, token).await.map_err(|e| {
            error!("Error fetching messages for {}: {}", conversation_id, e);
            MessagingError::StorageError(e.to_string())
        })?;

        let unread: Vec<String> = fetched
            .iter()
            .filter(|m| m.is_unread_for(session.user_id()))
            .map(|m| m.id.clone())
            .collect();

        {
            let mut state = lock(&self.state);
            if state.conversation_id.as_deref() != Some(conversation_id.as_str()) {
                debug!("Conversation switched while loading {}, discarding fetch", conversation_id);
                return Ok(state.messages.clone());
            }
            state.merge_history(fetched);
        }

        if !unread.is_empty() {
            if let Err(e) = self.store.mark_read(&unread, token).await {
                warn!("Failed to mark {} messages read: {}", unread.len(), e);
                return Err(MessagingError::StorageError(e.to_string()));
            }
            lock(&self.state).mark_read_local(&unread);
            debug!("Marked {} messages read in {}", unread.len(), conversation_id);
        }

        Ok(self.messages())
    }

    /// Re-fetch the history of the open conversation.
    pub async fn refresh(&self) -> Result<Vec<Message>, MessagingError> {
        self.load_history().await
    }

    /// Route a message through the de-duplicating append path. Returns
    /// false when it was already present or belongs elsewhere.
    pub fn append(&self, message: Message) -> bool {
        lock(&self.state).append(message)
    }

    /// Send `text` directly. A failed delivery leaves it behind as the
    /// draft; local rejections leave the draft untouched.
    pub async fn send(&self, text: &str) -> Result<Message, MessagingError> {
        let result = self.submit(text.trim().to_string()).await;
        if let Err(MessagingError::SendError(_)) = &result {
            self.set_draft(text);
        }
        result
    }

    /// Send the current draft. The draft survives any failure.
    pub async fn send_draft(&self) -> Result<Message, MessagingError> {
        let content = lock(&self.state).draft.trim().to_string();
        self.submit(content).await
    }

    async fn submit(&self, content: String) -> Result<Message, MessagingError> {
        if content.is_empty() {
            return Err(MessagingError::EmptyMessage);
        }
        let conversation_id = self.conversation_id().ok_or(MessagingError::NoConversation)?;
        let _sending = FlagGuard::acquire(&self.sending).ok_or(MessagingError::SendInFlight)?;
        let session = self.session.current().ok_or(MessagingError::AuthRequired)?;

        let new_message = NewMessage {
            conversation_id,
            sender_id: session.user_id().to_string(),
            recipient_id: self.counterpart.id.clone(),
            content,
            is_read: false,
        };

        let stored = self
            .store
            .insert_message(&new_message, &session.access_token)
            .await
            .map_err(|e| {
                error!("Error sending message: {}", e);
                MessagingError::SendError(e.to_string())
            })?;

        {
            let mut state = lock(&self.state);
            if state.draft.trim() == new_message.content {
                state.draft.clear();
            }
            state.append(stored.clone());
        }

        info!("Message {} sent in conversation {}", stored.id, stored.conversation_id);
        Ok(stored)
    }

    /// Open a live feed for the channel's current conversation. Every new
    /// message id reaches `on_insert` exactly once, in arrival order;
    /// incoming messages addressed to the caller are marked read.
    pub async fn subscribe<F>(&self, conversation_id: &str, mut on_insert: F) -> Result<LiveSubscription, MessagingError>
    where
        F: FnMut(&Message) + Send + 'static,
    {
        if self.conversation_id().as_deref() != Some(conversation_id) {
            return Err(MessagingError::NoConversation);
        }
        let session = self.session.current().ok_or(MessagingError::AuthRequired)?;

        let mut stream = self
            .feed
            .subscribe(conversation_id, &session.access_token)
            .await
            .map_err(|e| MessagingError::SubscriptionError(e.to_string()))?;

        let state = Arc::clone(&self.state);
        let store = Arc::clone(&self.store);
        let user_id = session.user_id().to_string();
        let token = session.access_token.clone();
        let task_conversation = conversation_id.to_string();

        let task = tokio::spawn(async move {
            while let Some(message) = stream.next().await {
                if message.conversation_id != task_conversation {
                    continue;
                }

                if !lock(&state).append(message.clone()) {
                    debug!("Ignoring duplicate delivery of message {}", message.id);
                    continue;
                }

                on_insert(&message);

                if message.is_unread_for(&user_id) {
                    let ids = [message.id.clone()];
                    match store.mark_read(&ids, &token).await {
                        Ok(()) => lock(&state).mark_read_local(&ids),
                        Err(e) => warn!("Failed to mark message {} read: {}", message.id, e),
                    }
                }
            }
            debug!("Live feed for conversation {} ended", task_conversation);
        });

        info!("Live subscription opened for conversation {}", conversation_id);
        Ok(LiveSubscription {
            conversation_id: conversation_id.to_string(),
            task,
        })
    }
}

impl Drop for MessageChannel {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn message(id: &str, conversation_id: &str, minute: u32) -> Message {
        Message {
            id: id.to_string(),
            conversation_id: conversation_id.to_string(),
            sender_id: "alice".to_string(),
            recipient_id: "bob".to_string(),
            content: format!("message {}", id),
            created_at: Utc.with_ymd_and_hms(2025, 1, 1, 9, minute, 0).unwrap(),
            is_read: false,
        }
    }

    fn ids(state: &ChannelState) -> Vec<&str> {
        state.messages.iter().map(|m| m.id.as_str()).collect()
    }

    #[test]
    fn test_append_dedupes_and_orders() {
        let mut state = ChannelState::default();
        state.reset(Some("c1".to_string()));

        assert!(state.append(message("m2", "c1", 5)));
        assert!(state.append(message("m1", "c1", 1)));
        assert!(!state.append(message("m2", "c1", 5)));
        assert!(state.append(message("m3", "c1", 5)));

        assert_eq!(ids(&state), vec!["m1", "m2", "m3"]);
    }

    #[test]
    fn test_append_rejects_other_conversations() {
        let mut state = ChannelState::default();
        state.reset(Some("c1".to_string()));

        assert!(!state.append(message("m1", "c2", 1)));
        assert!(state.messages.is_empty());
    }

    #[test]
    fn test_merge_keeps_live_only_messages() {
        let mut state = ChannelState::default();
        state.reset(Some("c1".to_string()));
        state.append(message("live", "c1", 30));

        let mut fetched_copy = message("m1", "c1", 1);
        fetched_copy.is_read = true;
        state.merge_history(vec![fetched_copy, message("m2", "c1", 2)]);

        assert_eq!(ids(&state), vec!["m1", "m2", "live"]);
        assert!(state.messages[0].is_read);
    }

    #[test]
    fn test_flag_guard_releases_on_drop() {
        let flag = AtomicBool::new(false);
        {
            let _guard = FlagGuard::acquire(&flag).unwrap();
            assert!(FlagGuard::acquire(&flag).is_none());
        }
        assert!(FlagGuard::acquire(&flag).is_some());
    }
}
