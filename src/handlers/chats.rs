// src/handlers/chats.rs
use super::{
    api_error, caller_id, internal_error, load_owned_chat, open_owned_workspace, store_error,
    workspace_error, ApiResult,
};
use crate::handlers::auth::verify_jwt_token;
use crate::middleware::auth::auth_middleware;
use crate::models::auth::Claims;
use crate::models::chat::{Chat, ChatSummary, CreateChatRequest};
use crate::project::export::{export_zip, EXPORT_FILE_NAME};
use crate::project::preview::{render_sandbox_document, PreviewSlot, PreviewSlots, SANDBOX_CSP};
use crate::workspace::{WorkspaceEvent, WorkspaceSnapshot};
use crate::AppState;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Extension, Path, Query,
    },
    http::{header, StatusCode},
    response::{Html, IntoResponse, Json, Response},
    routing::{get, Router},
};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

pub fn chat_routes() -> Router {
    let public_routes = Router::new().route("/ws/chats/:id", get(workspace_socket));

    let protected_routes = Router::new()
        .route("/api/chats", get(list_chats).post(create_chat))
        .route("/api/chats/:id", get(get_chat))
        .route("/api/chats/:id/workspace", get(get_workspace))
        .route("/api/chats/:id/files", axum::routing::put(edit_file))
        .route("/api/chats/:id/files/*path", get(select_file))
        .route("/api/chats/:id/preview", get(preview_document))
        .route("/api/chats/:id/export", get(export_project))
        .route_layer(axum::middleware::from_fn(auth_middleware));

    public_routes.merge(protected_routes)
}

async fn list_chats(
    Extension(state): Extension<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<Vec<ChatSummary>>> {
    let user_id = caller_id(&claims)?;
    let chats = Chat::list_for_user(&state.db_pool, user_id)
        .await
        .map_err(|e| store_error("Database error listing chats", e))?;
    Ok(Json(chats))
}

async fn create_chat(
    Extension(state): Extension<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    payload: Option<Json<CreateChatRequest>>,
) -> ApiResult<(StatusCode, Json<Chat>)> {
    let user_id = caller_id(&claims)?;
    let request = payload.map(|Json(request)| request).unwrap_or_default();
    let chat = Chat::create(&state.db_pool, user_id, request.name.as_deref())
        .await
        .map_err(|e| store_error("Database error creating chat", e))?;
    tracing::info!("💬 Created chat {} for user {}", chat.id, user_id);
    Ok((StatusCode::CREATED, Json(chat)))
}

async fn get_chat(
    Extension(state): Extension<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    Path(chat_id): Path<String>,
) -> ApiResult<Json<Chat>> {
    let chat = load_owned_chat(&state, &chat_id, &claims).await?;
    Ok(Json(chat))
}

async fn get_workspace(
    Extension(state): Extension<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    Path(chat_id): Path<String>,
) -> ApiResult<Json<WorkspaceSnapshot>> {
    let (_, workspace) = open_owned_workspace(&state, &chat_id, &claims).await?;
    let snapshot = workspace.lock().await.snapshot();
    Ok(Json(snapshot))
}

#[derive(Debug, Serialize)]
struct SelectedFile {
    path: String,
    content: String,
}

async fn select_file(
    Extension(state): Extension<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    Path((chat_id, path)): Path<(String, String)>,
) -> ApiResult<Json<SelectedFile>> {
    let (_, workspace) = open_owned_workspace(&state, &chat_id, &claims).await?;
    let mut workspace = workspace.lock().await;
    let file = workspace.select_file(&path).map_err(workspace_error)?;
    Ok(Json(SelectedFile {
        path: file.path.clone(),
        content: file.content.clone(),
    }))
}

#[derive(Debug, Deserialize)]
struct EditFileRequest {
    path: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct EditFileResponse {
    success: bool,
    path: String,
    preview_slot: Option<PreviewSlot>,
    preview: PreviewSlots,
}

/// Local edit of one file. The projected column is persisted when the file
/// feeds the preview; `files_json` is only rewritten by generations.
async fn edit_file(
    Extension(state): Extension<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    Path(chat_id): Path<String>,
    Json(payload): Json<EditFileRequest>,
) -> ApiResult<Json<EditFileResponse>> {
    let (_, workspace) = open_owned_workspace(&state, &chat_id, &claims).await?;

    let (preview_slot, preview) = {
        let mut workspace = workspace.lock().await;
        workspace.select_file(&payload.path).map_err(workspace_error)?;
        let slot = workspace.edit_selected(&payload.content).map_err(workspace_error)?;
        (slot, workspace.preview().clone())
    };

    let persisted = match preview_slot {
        Some(PreviewSlot::Js) => {
            Chat::update_projection(&state.db_pool, &chat_id, None, Some(&payload.content)).await
        }
        Some(PreviewSlot::Css) => {
            Chat::update_projection(&state.db_pool, &chat_id, Some(&payload.content), None).await
        }
        None => Ok(()),
    };
    persisted.map_err(|e| store_error("Database error saving edit", e))?;

    Ok(Json(EditFileResponse {
        success: true,
        path: payload.path,
        preview_slot,
        preview,
    }))
}

async fn preview_document(
    Extension(state): Extension<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    Path(chat_id): Path<String>,
) -> ApiResult<Response> {
    let (_, workspace) = open_owned_workspace(&state, &chat_id, &claims).await?;
    let document = render_sandbox_document(workspace.lock().await.preview());
    Ok(([(header::CONTENT_SECURITY_POLICY, SANDBOX_CSP)], Html(document)).into_response())
}

async fn export_project(
    Extension(state): Extension<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    Path(chat_id): Path<String>,
) -> ApiResult<Response> {
    let (_, workspace) = open_owned_workspace(&state, &chat_id, &claims).await?;
    let files = workspace.lock().await.files().to_vec();

    let archive = tokio::task::spawn_blocking(move || export_zip(&files))
        .await
        .map_err(|e| internal_error("Export task failed", e))?
        .map_err(|e| internal_error("Failed to build zip archive", e))?;

    tracing::info!("📦 Exported chat {} ({} bytes)", chat_id, archive.len());

    let disposition = format!("attachment; filename=\"{}\"", EXPORT_FILE_NAME);
    Ok((
        [
            (header::CONTENT_TYPE, "application/zip".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        archive,
    )
        .into_response())
}

#[derive(Debug, Deserialize)]
struct SocketQuery {
    token: Option<String>,
}

/// Browsers cannot set headers on websocket upgrades, so the JWT comes in
/// the query string.
async fn workspace_socket(
    ws: WebSocketUpgrade,
    Path(chat_id): Path<String>,
    Query(query): Query<SocketQuery>,
    Extension(state): Extension<Arc<AppState>>,
) -> ApiResult<Response> {
    let token = query
        .token
        .ok_or_else(|| api_error(StatusCode::UNAUTHORIZED, "Missing token"))?;
    let claims = verify_jwt_token(&token, &state.config.jwt_secret).map_err(|e| {
        tracing::warn!("WebSocket JWT verification failed: {}", e);
        api_error(StatusCode::UNAUTHORIZED, "Invalid or expired token")
    })?;

    let (_, workspace) = open_owned_workspace(&state, &chat_id, &claims).await?;
    Ok(ws.on_upgrade(move |socket| stream_workspace_events(socket, chat_id, workspace)))
}

async fn stream_workspace_events(
    socket: WebSocket,
    chat_id: String,
    workspace: crate::workspace::registry::SharedWorkspace,
) {
    let (mut sender, mut receiver) = socket.split();

    let (snapshot, mut events) = {
        let workspace = workspace.lock().await;
        (workspace.snapshot(), workspace.subscribe())
    };

    let hello = json!({ "type": "snapshot", "workspace": snapshot }).to_string();
    if sender.send(Message::Text(hello)).await.is_err() {
        return;
    }
    tracing::info!("🔌 WebSocket attached to chat {}", chat_id);

    loop {
        tokio::select! {
            event = events.recv() => {
                let (payload, detached) = match event {
                    Ok(event) => match serde_json::to_string(&event) {
                        Ok(payload) => (payload, event == WorkspaceEvent::Detached),
                        Err(e) => {
                            tracing::error!("Failed to serialize workspace event: {}", e);
                            continue;
                        }
                    },
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!("WebSocket for chat {} lagged by {} events", chat_id, skipped);
                        (json!({ "type": "resync" }).to_string(), false)
                    }
                    Err(RecvError::Closed) => break,
                };
                if sender.send(Message::Text(payload)).await.is_err() || detached {
                    // Detached sockets close; the client reconnects to the reloaded workspace.
                    break;
                }
            }
            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    tracing::info!("🔌 WebSocket for chat {} closed", chat_id);
}
