// libs/messaging-cell/src/router.rs
use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tracing::info;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;
use shared_utils::extractor::auth_middleware;

use crate::handlers;
use crate::services::feed::{LocalMessageFeed, MessageFeed, RealtimeMessageFeed};
use crate::services::store::{MessagingStore, SupabaseMessagingStore};

/// Backends shared by all messaging requests.
#[derive(Clone)]
pub struct MessagingState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn MessagingStore>,
    pub feed: Arc<dyn MessageFeed>,
    pub local_feed: LocalMessageFeed,
}

impl MessagingState {
    pub fn new(
        config: Arc<AppConfig>,
        store: Arc<dyn MessagingStore>,
        feed: Arc<dyn MessageFeed>,
        local_feed: LocalMessageFeed,
    ) -> Self {
        Self { config, store, feed, local_feed }
    }

    /// PostgREST store plus the realtime feed when one is configured,
    /// otherwise the in-process feed.
    pub fn from_config(config: Arc<AppConfig>) -> Self {
        let store: Arc<dyn MessagingStore> =
            Arc::new(SupabaseMessagingStore::new(Arc::new(SupabaseClient::new(&config))));
        let local_feed = LocalMessageFeed::new();

        let feed: Arc<dyn MessageFeed> = if config.is_realtime_configured() {
            info!("Live messages via realtime at {}", config.realtime_url());
            Arc::new(RealtimeMessageFeed::new(&config))
        } else {
            info!("Realtime not configured, live messages limited to this process");
            Arc::new(local_feed.clone())
        };

        Self::new(config, store, feed, local_feed)
    }
}

pub fn messaging_routes(state: MessagingState) -> Router {
    let protected_routes = Router::new()
        .route("/", post(handlers::resolve_conversation))
        .route("/{conversation_id}/messages", get(handlers::get_messages).post(handlers::send_message))
        .route("/{conversation_id}/live", get(handlers::live_messages))
        .layer(middleware::from_fn_with_state(state.config.clone(), auth_middleware));

    Router::new()
        .merge(protected_routes)
        .with_state(state)
}
