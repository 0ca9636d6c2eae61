use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use iachat_contract::{ChatReply, ChatRequest, HistoryEntry};
use iachat_llm::{ChatMessage, CompletionRequest};
use serde_json::{json, Value};
use tracing::info;

use crate::app::{write_log, AppState};

fn history_messages(history: &[HistoryEntry]) -> Vec<ChatMessage> {
    history
        .iter()
        .filter_map(|entry| match entry.role.as_str() {
            "user" => Some(ChatMessage::user(entry.content.clone())),
            "assistant" => Some(ChatMessage::assistant(entry.content.clone())),
            _ => None,
        })
        .collect()
}

pub(crate) async fn post_chat(
    State(state): State<AppState>,
    Json(payload): Json<ChatRequest>,
) -> Result<impl IntoResponse, (StatusCode, Json<Value>)> {
    let message = payload.message.trim();
    if message.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "empty_message" })),
        ));
    }

    let model = payload
        .model
        .as_deref()
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .unwrap_or(state.settings.default_model.as_str())
        .to_string();

    let mut messages = history_messages(&payload.history);
    messages.push(ChatMessage::user(message));

    let request = CompletionRequest {
        model: model.clone(),
        messages,
    };

    match state.model.complete(&request).await {
        Ok(completion) => {
            info!(
                model = %completion.model,
                prompt_tokens = completion.prompt_tokens,
                completion_tokens = completion.completion_tokens,
                "chat completion"
            );
            Ok((
                StatusCode::OK,
                Json(ChatReply {
                    reply: completion.content,
                    model: completion.model,
                }),
            ))
        }
        Err(err) => {
            write_log(&state, "error", &format!("chat with {model} failed: {err}")).await;
            Err((
                StatusCode::BAD_GATEWAY,
                Json(json!({ "error": "model_unavailable", "detail": err.to_string() })),
            ))
        }
    }
}
