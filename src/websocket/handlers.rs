use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::services::{ChatService, MessageService};
use crate::state::AppState;
use crate::websocket::events::{ClientEvent, ServerEvent};

#[derive(Debug, Deserialize)]
pub struct WsParams {
    /// Verified upstream by the auth gateway; this service trusts it.
    pub user_id: Uuid,
}

pub async fn ws_handler(
    State(state): State<AppState>,
    Query(params): Query<WsParams>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    if params.user_id.is_nil() {
        return StatusCode::BAD_REQUEST.into_response();
    }
    ws.on_upgrade(move |socket| handle_socket(state, params, socket))
        .into_response()
}

async fn handle_socket(state: AppState, params: WsParams, socket: WebSocket) {
    let connection_id = Uuid::new_v4();
    debug!(user_id = %params.user_id, %connection_id, "websocket connected");

    let (mut sink, mut stream) = socket.split();

    // Single writer task per connection; both direct replies and broadcasts
    // funnel through this channel.
    let (tx, mut rx) = unbounded_channel::<Message>();
    let writer = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sink.send(msg).await.is_err() {
                break;
            }
        }
    });

    while let Some(incoming) = stream.next().await {
        match incoming {
            Ok(Message::Text(txt)) => {
                handle_client_text(&state, &params, connection_id, &tx, &txt).await;
            }
            Ok(Message::Close(_)) | Err(_) => break,
            // Ping/pong handled by the framework; binary frames ignored.
            Ok(_) => {}
        }
    }

    state.registry.remove_connection(connection_id).await;
    writer.abort();
    debug!(user_id = %params.user_id, %connection_id, "websocket disconnected");
}

/// Per-event error boundary: nothing that happens while handling one event may
/// take down the connection or leak past it. Failures become an `error` event
/// to this connection only.
async fn handle_client_text(
    state: &AppState,
    params: &WsParams,
    connection_id: Uuid,
    tx: &UnboundedSender<Message>,
    txt: &str,
) {
    let event = match serde_json::from_str::<ClientEvent>(txt) {
        Ok(event) => event,
        Err(e) => {
            debug!(user_id = %params.user_id, error = %e, "unparseable client event");
            let err = AppError::InvalidArgument("unrecognized event payload".into());
            reply(tx, &ServerEvent::from_error(&err));
            return;
        }
    };

    if let Err(err) = dispatch_event(state, params, connection_id, tx, event).await {
        warn!(user_id = %params.user_id, error = %err, code = err.code(), "event handler failed");
        reply(tx, &ServerEvent::from_error(&err));
    }
}

async fn dispatch_event(
    state: &AppState,
    params: &WsParams,
    connection_id: Uuid,
    tx: &UnboundedSender<Message>,
    event: ClientEvent,
) -> AppResult<()> {
    let store = state.store.as_ref();
    match event {
        ClientEvent::Join {
            user_id,
            other_user_id,
        } => {
            ensure_self(params, user_id)?;
            let joined = ChatService::join_conversation(
                store,
                user_id,
                other_user_id,
                state.config.history_page_limit,
            )
            .await?;
            state
                .registry
                .subscribe(joined.conversation.id, connection_id, tx.clone())
                .await;
            reply(
                tx,
                &ServerEvent::ConversationJoined {
                    conversation_id: joined.conversation.id,
                    counterpart: joined.counterpart,
                    last_message: joined.last_message,
                    messages: joined.messages,
                },
            );
        }
        ClientEvent::Send {
            conversation_id,
            sender_id,
            content,
            message_type,
            recipients,
        } => {
            ensure_self(params, sender_id)?;
            let message = MessageService::send_message(
                store,
                conversation_id,
                sender_id,
                content,
                message_type,
                recipients,
            )
            .await?;
            let frame = ServerEvent::MessageNew { message }
                .to_ws_message()
                .map_err(|e| AppError::Internal(format!("serialize broadcast: {e}")))?;
            state.registry.broadcast(conversation_id, frame).await;
        }
        ClientEvent::Delivered { message_id } => {
            // The recipient is this connection's user.
            MessageService::mark_delivered(store, message_id, params.user_id).await?;
        }
        ClientEvent::Read { message_id } => {
            MessageService::mark_read(store, message_id).await?;
        }
        ClientEvent::ListMessages {
            conversation_id,
            limit,
            offset,
        } => {
            let limit = limit
                .unwrap_or(state.config.history_page_limit)
                .clamp(1, crate::config::MAX_HISTORY_PAGE);
            let offset = offset.unwrap_or(0).max(0);
            let messages =
                MessageService::list_messages(store, conversation_id, limit, offset).await?;
            reply(
                tx,
                &ServerEvent::MessageHistory {
                    conversation_id,
                    messages,
                },
            );
        }
        ClientEvent::ListConversations {
            user_id,
            limit,
            offset,
        } => {
            ensure_self(params, user_id)?;
            let limit = limit
                .unwrap_or(state.config.conversation_page_limit)
                .clamp(1, crate::config::MAX_HISTORY_PAGE);
            let offset = offset.unwrap_or(0).max(0);
            let conversations =
                ChatService::list_conversations(store, user_id, limit, offset).await?;
            reply(tx, &ServerEvent::ConversationList { conversations });
        }
    }
    Ok(())
}

fn ensure_self(params: &WsParams, claimed: Uuid) -> AppResult<()> {
    if claimed != params.user_id {
        return Err(AppError::InvalidArgument(
            "event user does not match this connection".into(),
        ));
    }
    Ok(())
}

/// Best-effort reply to the originating connection; a closed channel means the
/// client is already gone.
fn reply(tx: &UnboundedSender<Message>, event: &ServerEvent) {
    match event.to_ws_message() {
        Ok(frame) => {
            let _ = tx.send(frame);
        }
        Err(e) => warn!(error = %e, "failed to serialize server event"),
    }
}
