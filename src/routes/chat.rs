use anyhow::{anyhow, Context};
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::{auth::AuthUser, errors::ServerError, ratelimit, types::Sender, AppState};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/chat", post(chat))
        .route("/chat/history/:contract_id", get(chat_history))
}

#[derive(Deserialize)]
pub struct ChatReq {
    pub contract_id: i64,
    pub message: String,
}

#[derive(Serialize)]
pub struct ChatResp {
    pub response: String,
}

#[derive(Serialize)]
pub struct MessageResp {
    pub sender: Sender,
    pub content: String,
    pub timestamp: String,
}

#[derive(Serialize)]
pub struct ChatHistoryResp {
    pub chat_id: i64,
    pub messages: Vec<MessageResp>,
}

#[instrument(name = "Chatting about contract", skip_all, fields(user_id = auth.0.id))]
pub async fn chat(
    State(state): State<AppState>,
    auth: AuthUser,
    payload: Result<Json<ChatReq>, JsonRejection>,
) -> Result<Json<ChatResp>, ServerError> {
    let AuthUser(user) = auth;
    let Json(payload) =
        payload.map_err(|err| ServerError::ValidationError(anyhow!(err.body_text())))?;
    let message = payload.message.trim();
    if message.is_empty() {
        return Err(ServerError::ValidationError(anyhow!("Message must not be empty")));
    }
    ratelimit::check(&state.limits.chat, user.id)?;

    let contract = state
        .db
        .select_contract_for_user(payload.contract_id, user.id)
        .await
        .context("Failed to select contract")
        .map_err(ServerError::DbError)?
        .ok_or_else(|| ServerError::NotFound(anyhow!("Contract not found")))?;

    let existing = state
        .db
        .select_chat(user.id, contract.id)
        .await
        .context("Failed to select chat")
        .map_err(ServerError::DbError)?;
    let history = match &existing {
        Some(chat) => state
            .db
            .query_messages(chat.id)
            .await
            .context("Failed to query messages")
            .map_err(ServerError::DbError)?,
        None => Vec::new(),
    };

    let reply = state
        .assistant
        .reply(&contract.content, &history, message)
        .await
        .map_err(ServerError::OpenAIAPIError)?;

    let exchange = state
        .db
        .record_exchange(user.id, contract.id, message, &reply)
        .await
        .context("Failed to save chat messages")
        .map_err(ServerError::DbError)?;
    if exchange.chat_created {
        tracing::info!(
            chat_id = exchange.chat.id,
            contract_id = contract.id,
            "Chat started"
        );
    }

    Ok(Json(ChatResp { response: reply }))
}

#[instrument(name = "Fetching chat history", skip_all, fields(user_id = auth.0.id))]
pub async fn chat_history(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(contract_id): Path<i64>,
) -> Result<Json<ChatHistoryResp>, ServerError> {
    let AuthUser(user) = auth;
    ratelimit::check(&state.limits.history, user.id)?;

    let chat = state
        .db
        .select_chat(user.id, contract_id)
        .await
        .context("Failed to select chat")
        .map_err(ServerError::DbError)?
        .ok_or_else(|| ServerError::NotFound(anyhow!("Chat history not found.")))?;

    let messages = state
        .db
        .query_messages(chat.id)
        .await
        .context("Failed to query messages")
        .map_err(ServerError::DbError)?
        .into_iter()
        .map(|m| MessageResp {
            sender: m.sender,
            content: m.content,
            timestamp: m.timestamp.to_rfc3339(),
        })
        .collect();

    Ok(Json(ChatHistoryResp {
        chat_id: chat.id,
        messages,
    }))
}
