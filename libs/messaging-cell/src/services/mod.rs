pub mod channel;
pub mod conversation;
pub mod feed;
pub mod formatting;
pub mod store;

pub use channel::{LiveSubscription, MessageChannel};
pub use conversation::ConversationResolver;
pub use feed::{LocalMessageFeed, MessageFeed, MessageStream, RealtimeMessageFeed};
pub use store::{MessagingStore, SupabaseMessagingStore};
