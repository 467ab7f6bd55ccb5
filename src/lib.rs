// lib.rs - Libelula: prompt-to-UI workspace server
pub mod config;
pub mod db;
pub mod gemini_client;
pub mod generation;
pub mod handlers;
pub mod mailer;
pub mod middleware;
pub mod models;
pub mod project;
pub mod workspace;

use axum::{extract::Extension, response::Json, routing::get, Router};
use config::Config;
use generation::workflow::WorkflowClient;
use generation::CodeGenerator;
use mailer::Mailer;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use workspace::registry::SharedWorkspaceRegistry;

// AppState holds the pool, the optional generation backends, and the open workspaces
pub struct AppState {
    pub config: Config,
    pub db_pool: sqlx::PgPool,
    pub generator: Option<Arc<dyn CodeGenerator>>, // 🤖 synchronous LLM backend
    pub workflow_client: Option<WorkflowClient>, // 🔁 asynchronous workflow backend
    pub mailer: Arc<dyn Mailer>,
    pub workspaces: SharedWorkspaceRegistry,
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(handlers::ui::ui_routes())
        .merge(handlers::auth::auth_routes())
        .merge(handlers::auth::user_routes())
        .merge(handlers::chats::chat_routes())
        .merge(handlers::generate::generate_routes())
        .route("/api/status", get(api_status))
        .layer(axum::middleware::from_fn(middleware::logging::request_logging_middleware))
        .layer(CorsLayer::permissive())
        .layer(Extension(state))
}

async fn api_status(Extension(state): Extension<Arc<AppState>>) -> Json<Value> {
    let db_status = match sqlx::query("SELECT 1").fetch_one(&state.db_pool).await {
        Ok(_) => "healthy",
        Err(_) => "unhealthy",
    };

    let generator_status = match &state.generator {
        Some(generator) => generator.name().to_string(),
        None => "not_configured".to_string(),
    };
    let workflow_status = if state.workflow_client.is_some() { "configured" } else { "not_configured" };

    Json(json!({
        "status": "ok",
        "service": "libelula",
        "version": env!("CARGO_PKG_VERSION"),
        "services": {
            "database": db_status,
            "generator": generator_status,
            "workflow": workflow_status,
        },
        "open_workspaces": state.workspaces.open_count().await,
    }))
}

pub fn init_logging() -> Result<(), Box<dyn std::error::Error>> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cfg!(debug_assertions) {
            "debug,libelula=trace,sqlx=info,reqwest=info,hyper=info,tower=info".to_string()
        } else {
            "info,libelula=info,sqlx=warn,reqwest=warn,hyper=warn,tower=warn".to_string()
        }
    });

    let env_filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&log_level))?;

    let fmt_layer = if std::env::var("LOG_FORMAT").as_deref() == Ok("json") {
        // JSON for log aggregation
        fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .with_target(true)
            .with_thread_ids(true)
            .boxed()
    } else {
        fmt::layer()
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()?;

    Ok(())
}
