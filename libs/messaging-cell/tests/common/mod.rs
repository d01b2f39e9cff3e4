#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use tokio::sync::Notify;

use messaging_cell::models::{Conversation, Message, NewMessage};
use messaging_cell::services::feed::LocalMessageFeed;
use messaging_cell::services::store::MessagingStore;
use shared_database::supabase::DatabaseError;

#[derive(Default)]
struct Tables {
    conversations: Vec<Conversation>,
    messages: Vec<Message>,
    next_id: i64,
}

/// Store double with the hosted store's observable behaviour: unique
/// unordered pairs, ascending history, and an INSERT event on the feed
/// for every stored message.
pub struct InMemoryStore {
    tables: Mutex<Tables>,
    feed: LocalMessageFeed,
    calls: AtomicUsize,
    pub fail_inserts: AtomicBool,
    pub fail_lists: AtomicBool,
    pub fail_mark_read: AtomicBool,
    /// Next create loses a race: the pair is inserted by "someone else"
    /// and the call reports a uniqueness conflict.
    pub race_on_create: AtomicBool,
    pub mark_read_batches: Mutex<Vec<Vec<String>>>,
    /// When set, the next insert signals `insert_started` and then waits
    /// for the gate to be notified.
    insert_gate: Mutex<Option<Arc<Notify>>>,
    pub insert_started: Notify,
}

pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 1, 9, 0, 0).unwrap()
}

impl InMemoryStore {
    pub fn new(feed: LocalMessageFeed) -> Arc<Self> {
        Arc::new(Self {
            tables: Mutex::new(Tables::default()),
            feed,
            calls: AtomicUsize::new(0),
            fail_inserts: AtomicBool::new(false),
            fail_lists: AtomicBool::new(false),
            fail_mark_read: AtomicBool::new(false),
            race_on_create: AtomicBool::new(false),
            mark_read_batches: Mutex::new(Vec::new()),
            insert_gate: Mutex::new(None),
            insert_started: Notify::new(),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn conversation_count(&self) -> usize {
        self.tables.lock().unwrap().conversations.len()
    }

    pub fn stored_message(&self, id: &str) -> Option<Message> {
        self.tables.lock().unwrap().messages.iter().find(|m| m.id == id).cloned()
    }

    fn next_id(tables: &mut Tables, prefix: &str) -> (String, DateTime<Utc>) {
        tables.next_id += 1;
        (format!("{}{}", prefix, tables.next_id), base_time() + Duration::minutes(tables.next_id))
    }

    /// Insert a row directly, as another client would, without publishing it.
    pub fn seed_message(&self, conversation_id: &str, sender_id: &str, recipient_id: &str, content: &str) -> Message {
        let mut tables = self.tables.lock().unwrap();
        let (id, created_at) = Self::next_id(&mut tables, "m");
        let message = Message {
            id,
            conversation_id: conversation_id.to_string(),
            sender_id: sender_id.to_string(),
            recipient_id: recipient_id.to_string(),
            content: content.to_string(),
            created_at,
            is_read: false,
        };
        tables.messages.push(message.clone());
        message
    }

    pub fn seed_conversation(&self, user1_id: &str, user2_id: &str) -> Conversation {
        let mut tables = self.tables.lock().unwrap();
        let (id, created_at) = Self::next_id(&mut tables, "c");
        let conversation = Conversation {
            id,
            user1_id: user1_id.to_string(),
            user2_id: user2_id.to_string(),
            created_at: Some(created_at),
        };
        tables.conversations.push(conversation.clone());
        conversation
    }

    /// Hold the next insert until the returned gate is notified.
    pub fn hold_next_insert(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.insert_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    fn touch(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl MessagingStore for InMemoryStore {
    async fn find_conversation(&self, a: &str, b: &str, _auth_token: &str) -> Result<Option<Conversation>> {
        self.touch();
        let tables = self.tables.lock().unwrap();
        Ok(tables.conversations.iter().find(|c| c.is_between(a, b)).cloned())
    }

    async fn get_conversation(&self, conversation_id: &str, _auth_token: &str) -> Result<Option<Conversation>> {
        self.touch();
        let tables = self.tables.lock().unwrap();
        Ok(tables.conversations.iter().find(|c| c.id == conversation_id).cloned())
    }

    async fn create_conversation(&self, user1_id: &str, user2_id: &str, _auth_token: &str) -> Result<Conversation> {
        self.touch();
        if self.race_on_create.swap(false, Ordering::SeqCst) {
            self.seed_conversation(user2_id, user1_id);
        }

        let exists = self
            .tables
            .lock()
            .unwrap()
            .conversations
            .iter()
            .any(|c| c.is_between(user1_id, user2_id));
        if exists {
            return Err(DatabaseError::Conflict("duplicate key value violates unique constraint".to_string()).into());
        }

        Ok(self.seed_conversation(user1_id, user2_id))
    }

    async fn list_messages(&self, conversation_id: &str, _auth_token: &str) -> Result<Vec<Message>> {
        self.touch();
        if self.fail_lists.load(Ordering::SeqCst) {
            return Err(anyhow!("connection reset"));
        }
        let tables = self.tables.lock().unwrap();
        let mut messages: Vec<Message> = tables
            .messages
            .iter()
            .filter(|m| m.conversation_id == conversation_id)
            .cloned()
            .collect();
        messages.sort_by_key(|m| m.created_at);
        Ok(messages)
    }

    async fn mark_read(&self, message_ids: &[String], _auth_token: &str) -> Result<()> {
        self.touch();
        if self.fail_mark_read.load(Ordering::SeqCst) {
            return Err(anyhow!("permission denied"));
        }
        self.mark_read_batches.lock().unwrap().push(message_ids.to_vec());
        let mut tables = self.tables.lock().unwrap();
        for message in tables.messages.iter_mut().filter(|m| message_ids.contains(&m.id)) {
            message.is_read = true;
        }
        Ok(())
    }

    async fn insert_message(&self, message: &NewMessage, _auth_token: &str) -> Result<Message> {
        self.touch();
        let gate = self.insert_gate.lock().unwrap().take();
        if let Some(gate) = gate {
            self.insert_started.notify_one();
            gate.notified().await;
        }
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(anyhow!("network unreachable"));
        }
        let stored = self.seed_message(&message.conversation_id, &message.sender_id, &message.recipient_id, &message.content);
        self.feed.publish(stored.clone());
        Ok(stored)
    }
}
