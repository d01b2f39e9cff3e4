// libs/messaging-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
        Extension, Path, State,
    },
    response::Response,
    Json,
};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use shared_models::error::AppError;
use shared_utils::session::SessionContext;

use crate::models::{
    Counterpart, LiveEvent, Message, MessagingError, ResolveConversationRequest,
    ResolveConversationResponse, SendMessageRequest,
};
use crate::router::MessagingState;
use crate::services::channel::MessageChannel;
use crate::services::conversation::ConversationResolver;
use crate::services::formatting::{conversation_summary, group_by_day};

// ==============================================================================
// CONVERSATION HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn resolve_conversation(
    State(state): State<MessagingState>,
    Extension(session): Extension<Arc<SessionContext>>,
    Json(request): Json<ResolveConversationRequest>,
) -> Result<Json<ResolveConversationResponse>, AppError> {
    let resolver = ConversationResolver::new(state.store.clone(), session);
    let conversation_id = resolver.resolve(&request.counterpart_id).await?;

    Ok(Json(ResolveConversationResponse { conversation_id }))
}

/// Channel attached to `conversation_id` after checking the caller is one
/// of its two participants.
async fn channel_for(
    state: &MessagingState,
    session: Arc<SessionContext>,
    conversation_id: &str,
) -> Result<MessageChannel, AppError> {
    let current = session.current().ok_or(MessagingError::AuthRequired)?;
    let user_id = current.user_id();

    let conversation = state
        .store
        .get_conversation(conversation_id, &current.access_token)
        .await
        .map_err(|e| MessagingError::StorageError(e.to_string()))?
        .filter(|conversation| conversation.involves(user_id))
        .ok_or_else(|| AppError::NotFound("Conversation not found".to_string()))?;

    let counterpart_id = conversation
        .counterpart_of(user_id)
        .ok_or(MessagingError::InvalidParticipant)?
        .to_string();

    let channel = MessageChannel::new(
        state.store.clone(),
        state.feed.clone(),
        session,
        Counterpart::new(counterpart_id),
    );
    channel.attach(&conversation.id);
    Ok(channel)
}

// ==============================================================================
// MESSAGE HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn get_messages(
    State(state): State<MessagingState>,
    Extension(session): Extension<Arc<SessionContext>>,
    Path(conversation_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let channel = channel_for(&state, session, &conversation_id).await?;
    let messages = channel.load_history().await?;
    let days = group_by_day(&messages, &state.config.local_offset());

    Ok(Json(json!({
        "conversation_id": conversation_id,
        "summary": conversation_summary(messages.len()),
        "days": days,
        "messages": messages,
    })))
}

#[axum::debug_handler]
pub async fn send_message(
    State(state): State<MessagingState>,
    Extension(session): Extension<Arc<SessionContext>>,
    Path(conversation_id): Path<String>,
    Json(request): Json<SendMessageRequest>,
) -> Result<Json<Value>, AppError> {
    let channel = channel_for(&state, session, &conversation_id).await?;

    if channel.counterpart().id != request.recipient_id {
        return Err(AppError::BadRequest("Recipient is not part of this conversation".to_string()));
    }

    let message = channel.send(&request.content).await?;
    let delivered = state.local_feed.publish(message.clone());
    debug!("Message {} delivered to {} local subscribers", message.id, delivered);

    Ok(Json(json!({
        "success": true,
        "message": message,
    })))
}

// ==============================================================================
// LIVE UPDATES
// ==============================================================================

/// Upgrade to a websocket that first carries the full history and then
/// every message inserted into the conversation.
pub async fn live_messages(
    State(state): State<MessagingState>,
    Extension(session): Extension<Arc<SessionContext>>,
    Path(conversation_id): Path<String>,
    ws: WebSocketUpgrade,
) -> Result<Response, AppError> {
    let channel = channel_for(&state, session, &conversation_id).await?;
    info!("Live connection requested for conversation {}", conversation_id);

    Ok(ws.on_upgrade(move |socket| stream_conversation(socket, channel, conversation_id)))
}

async fn send_event(socket: &mut WebSocket, event: &LiveEvent) -> bool {
    let payload = match serde_json::to_string(event) {
        Ok(payload) => payload,
        Err(e) => {
            warn!("Failed to encode live event: {}", e);
            return false;
        }
    };
    socket.send(WsMessage::Text(payload.into())).await.is_ok()
}

async fn stream_conversation(mut socket: WebSocket, channel: MessageChannel, conversation_id: String) {
    let (sender, mut inserted) = mpsc::unbounded_channel::<Message>();

    let opened = channel
        .open(&conversation_id, move |message| {
            let _ = sender.send(message.clone());
        })
        .await;

    match opened {
        Ok(messages) => {
            if !send_event(&mut socket, &LiveEvent::History { messages }).await {
                return;
            }
        }
        Err(e @ MessagingError::SubscriptionError(_)) => {
            // Static history is still worth showing.
            let messages = channel.messages();
            send_event(&mut socket, &LiveEvent::History { messages }).await;
            send_event(&mut socket, &LiveEvent::Error { notice: e.notice() }).await;
            return;
        }
        Err(e) => {
            send_event(&mut socket, &LiveEvent::Error { notice: e.notice() }).await;
            return;
        }
    }

    loop {
        tokio::select! {
            message = inserted.recv() => {
                let Some(message) = message else { break };
                if !send_event(&mut socket, &LiveEvent::Message { message }).await {
                    break;
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(WsMessage::Close(_))) | None => break,
                    Some(Err(e)) => {
                        debug!("Live socket for {} errored: {}", conversation_id, e);
                        break;
                    }
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    channel.close();
    info!("Live connection closed for conversation {}", conversation_id);
}
