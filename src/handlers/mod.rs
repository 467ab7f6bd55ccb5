// src/handlers/mod.rs
pub mod auth;
pub mod chats;
pub mod generate;
pub mod ui;

use crate::models::auth::{Claims, ErrorResponse};
use crate::models::chat::Chat;
use crate::models::StoreError;
use crate::project::ProjectError;
use crate::workspace::registry::SharedWorkspace;
use crate::workspace::WorkspaceError;
use crate::AppState;
use axum::http::StatusCode;
use axum::response::Json;

pub type ApiError = (StatusCode, Json<ErrorResponse>);
pub type ApiResult<T> = Result<T, ApiError>;

pub fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            success: false,
            message: message.into(),
        }),
    )
}

pub fn internal_error(context: &str, err: impl std::fmt::Display) -> ApiError {
    tracing::error!("{}: {}", context, err);
    api_error(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
}

pub fn store_error(context: &str, err: StoreError) -> ApiError {
    match err {
        StoreError::NotFound => api_error(StatusCode::NOT_FOUND, "Chat not found"),
        StoreError::Database(e) => internal_error(context, e),
    }
}

pub fn workspace_error(err: WorkspaceError) -> ApiError {
    match err {
        WorkspaceError::AlreadyGenerating => api_error(StatusCode::CONFLICT, err.to_string()),
        WorkspaceError::NoFileSelected => api_error(StatusCode::BAD_REQUEST, err.to_string()),
        WorkspaceError::Project(ProjectError::FileNotFound(_)) => {
            api_error(StatusCode::NOT_FOUND, err.to_string())
        }
        WorkspaceError::Project(e) => internal_error("Workspace file error", e),
    }
}

pub fn caller_id(claims: &Claims) -> ApiResult<i32> {
    claims
        .user_id()
        .ok_or_else(|| api_error(StatusCode::UNAUTHORIZED, "Invalid token subject"))
}

/// Loads a chat owned by the caller. Other users' chats are reported as missing.
pub async fn load_owned_chat(state: &AppState, chat_id: &str, claims: &Claims) -> ApiResult<Chat> {
    let user_id = caller_id(claims)?;
    match Chat::find_for_user(&state.db_pool, chat_id, user_id).await {
        Ok(Some(chat)) => Ok(chat),
        Ok(None) => Err(api_error(StatusCode::NOT_FOUND, "Chat not found")),
        Err(e) => Err(store_error("Database error loading chat", e)),
    }
}

/// Loads an owned chat and opens (or reuses) its workspace.
pub async fn open_owned_workspace(
    state: &AppState,
    chat_id: &str,
    claims: &Claims,
) -> ApiResult<(Chat, SharedWorkspace)> {
    let chat = load_owned_chat(state, chat_id, claims).await?;
    let workspace = state.workspaces.open(&chat).await;
    Ok((chat, workspace))
}
