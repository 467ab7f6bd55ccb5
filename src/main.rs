use libelula::config::Config;
use libelula::gemini_client::GeminiClient;
use libelula::generation::workflow::WorkflowClient;
use libelula::generation::CodeGenerator;
use libelula::mailer::LogMailer;
use libelula::workspace::registry::{WorkspaceRegistry, DEFAULT_IDLE_TTL, DEFAULT_SWEEP_INTERVAL};
use libelula::{build_router, db, init_logging, AppState};
use std::net::SocketAddr;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    init_logging()?;

    let config = Config::from_env()?;

    let db_pool = db::create_pool(&config.database_url).await?;

    // Initialize Gemini client if API key is provided
    let generator: Option<Arc<dyn CodeGenerator>> = match config.gemini_api_key.clone() {
        Some(api_key) => {
            tracing::info!("Initializing Gemini AI client ({})...", config.gemini_model);
            Some(Arc::new(GeminiClient::new(api_key, config.gemini_model.clone())) as Arc<dyn CodeGenerator>)
        }
        None => {
            tracing::warn!("GEMINI_API_KEY not found. Synchronous generation will be disabled.");
            None
        }
    };

    let workflow_client = match config.workflow_webhook_url.clone() {
        Some(url) => {
            tracing::info!("🔁 Workflow backend configured at {}", url);
            Some(WorkflowClient::new(url))
        }
        None => {
            tracing::warn!("WORKFLOW_WEBHOOK_URL not found. Asynchronous generation will be disabled.");
            None
        }
    };

    if config.workflow_callback_secret.is_none() && workflow_client.is_some() {
        tracing::warn!("⚠️ WORKFLOW_CALLBACK_SECRET not set, workflow callbacks are unauthenticated");
    }

    let bind_addr = config.bind_addr;
    let shared_state = Arc::new(AppState {
        config,
        db_pool,
        generator,
        workflow_client,
        mailer: Arc::new(LogMailer),
        workspaces: Arc::new(WorkspaceRegistry::new()),
    });

    // Drop workspaces nobody has touched for a while
    shared_state
        .workspaces
        .spawn_sweeper(DEFAULT_SWEEP_INTERVAL, DEFAULT_IDLE_TTL);
    tracing::info!("🧹 Workspace sweeper started (idle TTL {:?})", DEFAULT_IDLE_TTL);

    let app = build_router(shared_state);

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!("🐉 Libelula listening on {}", listener.local_addr()?);

    // ConnectInfo provides socket addresses for rate limiting
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;

    Ok(())
}
