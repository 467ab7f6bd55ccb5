// src/handlers/generate.rs
use super::{
    api_error, caller_id, internal_error, open_owned_workspace, store_error, workspace_error, ApiError,
    ApiResult,
};
use crate::generation::poller::{FilesSnapshotSource, PollState};
use crate::generation::workflow::{WorkflowCallback, WorkflowDispatch};
use crate::generation::{
    CodeGenerator, GenerationOutcome, GenerationRequest, OutputMode, GENERIC_FAILURE_MESSAGE,
};
use crate::middleware::auth::auth_middleware;
use crate::middleware::rate_limit::{rate_limit_middleware, RateLimiter};
use crate::models::auth::{Claims, User};
use crate::models::chat::{chat_name_from_prompt, Chat, GenerationUpdate};
use crate::models::StoreError;
use crate::project::preview::PreviewSlots;
use crate::project::scaffold::default_scaffold;
use crate::project::{find_file, to_files_json, validate_file_paths, GeneratedFile, ENTRY_PAGE_PATH};
use crate::workspace::registry::SharedWorkspace;
use crate::AppState;
use axum::{
    extract::{rejection::JsonRejection, Extension, Path},
    http::{HeaderMap, StatusCode},
    response::Json,
    routing::{get, post, Router},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const TOKENS_PER_GENERATION: i32 = 5;
pub const CALLBACK_SECRET_HEADER: &str = "x-callback-secret";
const INSUFFICIENT_TOKENS_MESSAGE: &str = "Insufficient tokens.";

pub fn generate_routes() -> Router {
    let dispatch_routes = Router::new()
        .route("/api/generate", post(generate))
        .route("/api/chats/:id/generate-async", post(generate_async))
        .layer(axum::middleware::from_fn_with_state(
            RateLimiter::generation(),
            rate_limit_middleware,
        ));

    let status_routes = Router::new()
        .route("/api/chats/:id/generation", get(generation_status).delete(cancel_generation));

    let protected_routes = dispatch_routes
        .merge(status_routes)
        .route_layer(axum::middleware::from_fn(auth_middleware));

    let callback_routes = Router::new().route("/api/workflow/callback", post(workflow_callback));

    protected_routes.merge(callback_routes)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    chat_id: String,
    prompt: String,
    #[serde(default)]
    mode: OutputMode,
}

#[derive(Debug, Serialize)]
struct GenerateResponse {
    success: bool,
    name: String,
    files: Vec<GeneratedFile>,
    preview: PreviewSlots,
    tokens_remaining: i32,
}

/// Synchronous generation: one LLM call, then token debit and chat update in
/// a single transaction.
async fn generate(
    Extension(state): Extension<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<GenerateRequest>,
) -> ApiResult<Json<GenerateResponse>> {
    let prompt = payload.prompt.trim();
    if prompt.is_empty() || payload.chat_id.is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "Prompt and chat id are required"));
    }

    let user_id = caller_id(&claims)?;
    let (_, workspace) = open_owned_workspace(&state, &payload.chat_id, &claims).await?;

    let balance = User::token_balance(&state.db_pool, user_id)
        .await
        .map_err(|e| store_error("Database error reading token balance", e))?;
    ensure_balance(balance)?;

    let generator = state
        .generator
        .clone()
        .ok_or_else(|| api_error(StatusCode::SERVICE_UNAVAILABLE, "Code generation is not configured"))?;

    let request = {
        let mut workspace = workspace.lock().await;
        workspace.begin_generation().map_err(workspace_error)?;
        GenerationRequest {
            prompt: prompt.to_string(),
            mode: payload.mode,
            files: workspace.files().to_vec(),
            preview: workspace.preview().clone(),
        }
    };

    // Runs detached so a dropped connection cannot leave the workspace generating.
    let chat_id = payload.chat_id.clone();
    let prompt = prompt.to_string();
    tokio::spawn(run_generation(state, workspace, generator, request, user_id, chat_id, prompt))
        .await
        .map_err(|e| internal_error("Generation task failed", e))?
}

async fn run_generation(
    state: Arc<AppState>,
    workspace: SharedWorkspace,
    generator: Arc<dyn CodeGenerator>,
    request: GenerationRequest,
    user_id: i32,
    chat_id: String,
    prompt: String,
) -> ApiResult<Json<GenerateResponse>> {
    let response = match generator.generate(&request).await {
        Ok(response) => response,
        Err(e) => {
            tracing::error!("❌ Generation with {} failed: {}", generator.name(), e);
            workspace.lock().await.fail_generation(e.user_message());
            return Err(api_error(StatusCode::INTERNAL_SERVER_ERROR, e.user_message()));
        }
    };

    let outcome = response.into_outcome(&default_scaffold());
    let name = chat_name_from_prompt(Some(&prompt));

    let tokens_remaining = match persist_generation(&state, user_id, &chat_id, &name, &outcome).await {
        Ok(Some(remaining)) => remaining,
        Ok(None) => {
            workspace.lock().await.fail_generation(INSUFFICIENT_TOKENS_MESSAGE);
            return Err(insufficient_tokens());
        }
        Err(e) => {
            workspace.lock().await.fail_generation(GENERIC_FAILURE_MESSAGE);
            return Err(e);
        }
    };

    workspace.lock().await.complete_generation(outcome.clone());
    tracing::info!(
        "✨ Chat {} regenerated ({} files), user {} has {} tokens left",
        chat_id,
        outcome.files.len(),
        user_id,
        tokens_remaining
    );

    Ok(Json(GenerateResponse {
        success: true,
        name,
        files: outcome.files,
        preview: outcome.preview,
        tokens_remaining,
    }))
}

/// Debits the generation cost and writes the outcome. Returns `None` when the
/// balance no longer covers the cost; nothing is written in that case.
async fn persist_generation(
    state: &AppState,
    user_id: i32,
    chat_id: &str,
    name: &str,
    outcome: &GenerationOutcome,
) -> ApiResult<Option<i32>> {
    let files_json = to_files_json(&outcome.files).map_err(|e| internal_error("Failed to serialize files", e))?;

    let mut tx = state
        .db_pool
        .begin()
        .await
        .map_err(|e| internal_error("Failed to start transaction", e))?;

    let remaining = User::debit_tokens(&mut *tx, user_id, TOKENS_PER_GENERATION)
        .await
        .map_err(|e| store_error("Database error debiting tokens", e))?;
    let Some(remaining) = remaining else {
        // Dropping the transaction rolls it back.
        return Ok(None);
    };

    let update = GenerationUpdate {
        name,
        html_code: &outcome.preview.html,
        css_code: &outcome.preview.css,
        jsx_code: &outcome.preview.js,
        files_json: &files_json,
    };
    Chat::apply_generation(&mut *tx, chat_id, &update)
        .await
        .map_err(|e| store_error("Database error saving generation", e))?;

    tx.commit()
        .await
        .map_err(|e| internal_error("Failed to commit generation", e))?;

    Ok(Some(remaining))
}

#[derive(Debug, Deserialize)]
struct GenerateAsyncRequest {
    prompt: String,
}

#[derive(Debug, Serialize)]
struct GenerationStatusResponse {
    success: bool,
    generating: bool,
    error: Option<String>,
    poll: Option<PollState>,
}

/// Hands the prompt to the workflow webhook and starts waiting for its
/// callback to change the stored files.
async fn generate_async(
    Extension(state): Extension<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    Path(chat_id): Path<String>,
    Json(payload): Json<GenerateAsyncRequest>,
) -> ApiResult<(StatusCode, Json<GenerationStatusResponse>)> {
    let prompt = payload.prompt.trim();
    if prompt.is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "Prompt is required"));
    }

    let workflow = state
        .workflow_client
        .clone()
        .ok_or_else(|| api_error(StatusCode::SERVICE_UNAVAILABLE, "Workflow webhook is not configured"))?;
    let (_, workspace) = open_owned_workspace(&state, &chat_id, &claims).await?;

    let frontend_code = {
        let mut workspace = workspace.lock().await;
        workspace.begin_generation().map_err(workspace_error)?;
        find_file(workspace.files(), ENTRY_PAGE_PATH)
            .map(|file| file.content.clone())
            .unwrap_or_default()
    };

    // Baseline is read before dispatch so a fast callback still counts as a change.
    let baseline = match state.db_pool.files_json(&chat_id).await {
        Ok(baseline) => baseline,
        Err(e) => {
            workspace.lock().await.fail_generation(GENERIC_FAILURE_MESSAGE);
            return Err(store_error("Database error reading chat files", e));
        }
    };

    let dispatch = WorkflowDispatch {
        prompt: prompt.to_string(),
        chat_id: chat_id.clone(),
        frontend_code,
        backend_code: String::new(),
    };
    if let Err(e) = workflow.dispatch(&dispatch).await {
        workspace.lock().await.fail_generation(e.user_message());
        return Err(api_error(StatusCode::BAD_GATEWAY, e.user_message()));
    }

    let source: Arc<dyn FilesSnapshotSource> = Arc::new(state.db_pool.clone());
    let poll = state
        .workspaces
        .start_poll(workspace, source, baseline, state.config.poll)
        .await;

    Ok((
        StatusCode::ACCEPTED,
        Json(GenerationStatusResponse {
            success: true,
            generating: true,
            error: None,
            poll: Some(poll.state()),
        }),
    ))
}

async fn generation_status(
    Extension(state): Extension<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    Path(chat_id): Path<String>,
) -> ApiResult<Json<GenerationStatusResponse>> {
    let (_, workspace) = open_owned_workspace(&state, &chat_id, &claims).await?;
    let (generating, error) = {
        let workspace = workspace.lock().await;
        (workspace.is_generating(), workspace.error().map(str::to_string))
    };

    Ok(Json(GenerationStatusResponse {
        success: true,
        generating,
        error,
        poll: state.workspaces.poll_state(&chat_id).await,
    }))
}

/// Stops waiting for the workflow. The workflow itself keeps running; a late
/// callback still lands in the store.
async fn cancel_generation(
    Extension(state): Extension<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    Path(chat_id): Path<String>,
) -> ApiResult<Json<GenerationStatusResponse>> {
    open_owned_workspace(&state, &chat_id, &claims).await?;

    if !state.workspaces.cancel_poll(&chat_id).await {
        return Err(api_error(StatusCode::NOT_FOUND, "No asynchronous generation in progress"));
    }
    tracing::info!("🛑 Cancelled generation poll for chat {}", chat_id);

    Ok(Json(GenerationStatusResponse {
        success: true,
        generating: false,
        error: None,
        poll: Some(PollState::Cancelled),
    }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CallbackResponse {
    success: bool,
    message: String,
    updated_chat_id: String,
}

/// Result delivery from the workflow. Persists the merged file set; the
/// poller of the open workspace notices the change.
async fn workflow_callback(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<WorkflowCallback>, JsonRejection>,
) -> ApiResult<Json<CallbackResponse>> {
    check_callback_secret(state.config.workflow_callback_secret.as_deref(), &headers)?;

    let Json(callback) = payload.map_err(|e| {
        tracing::error!("Invalid workflow callback body: {}", e);
        api_error(StatusCode::BAD_REQUEST, "Invalid data: chatId or files missing or malformed.")
    })?;

    let outcome = callback_outcome(&callback)?;
    let files_json = to_files_json(&outcome.files).map_err(|e| internal_error("Failed to serialize files", e))?;
    let name = chat_name_from_prompt(callback.prompt.as_deref());

    let update = GenerationUpdate {
        name: &name,
        html_code: "",
        css_code: &outcome.preview.css,
        jsx_code: &outcome.preview.js,
        files_json: &files_json,
    };
    match Chat::apply_generation(&state.db_pool, &callback.chat_id, &update).await {
        Ok(()) => {}
        Err(StoreError::NotFound) => return Err(api_error(StatusCode::NOT_FOUND, "Chat not found")),
        Err(e) => return Err(store_error("Database error applying workflow callback", e)),
    }

    // An in-flight poll picks the change up itself. Otherwise the open
    // workspace is left as it is and the next open reloads from the store.
    state.workspaces.detach_if_idle(&callback.chat_id).await;

    tracing::info!(
        "📬 Chat {} updated via workflow callback ({} files)",
        callback.chat_id,
        callback.files.len()
    );

    Ok(Json(CallbackResponse {
        success: true,
        message: "Project data updated successfully.".to_string(),
        updated_chat_id: callback.chat_id,
    }))
}

fn ensure_balance(balance: i32) -> ApiResult<()> {
    if balance < TOKENS_PER_GENERATION {
        return Err(insufficient_tokens());
    }
    Ok(())
}

fn insufficient_tokens() -> ApiError {
    api_error(StatusCode::PAYMENT_REQUIRED, INSUFFICIENT_TOKENS_MESSAGE)
}

/// Callbacks must carry the shared secret when one is configured.
fn check_callback_secret(expected: Option<&str>, headers: &HeaderMap) -> ApiResult<()> {
    let Some(expected) = expected else {
        return Ok(());
    };
    let provided = headers
        .get(CALLBACK_SECRET_HEADER)
        .and_then(|value| value.to_str().ok());
    if provided != Some(expected) {
        tracing::warn!("Workflow callback rejected: bad or missing secret");
        return Err(api_error(StatusCode::UNAUTHORIZED, "Invalid callback secret"));
    }
    Ok(())
}

/// Validates a callback and lays its files over the scaffold.
fn callback_outcome(callback: &WorkflowCallback) -> ApiResult<GenerationOutcome> {
    if callback.chat_id.is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "Invalid data: chatId is required."));
    }
    validate_file_paths(&callback.files).map_err(|e| api_error(StatusCode::BAD_REQUEST, e.to_string()))?;
    Ok(GenerationOutcome::from_files(&default_scaffold(), &callback.files))
}
