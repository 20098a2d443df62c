use std::sync::Arc;

use anyhow::Context;

use feedback_triage::api::{ApiState, api_routes};
use feedback_triage::board::TrelloConnector;
use feedback_triage::config::AppConfig;
use feedback_triage::feed::XFeedClient;
use feedback_triage::jobs::JobManager;
use feedback_triage::llm::create_provider;
use feedback_triage::pipeline::{LlmClassifier, WorkflowOrchestrator};
use feedback_triage::store::{JobStore, LibSqlBackend};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = AppConfig::from_env().context("Failed to load configuration")?;

    eprintln!("Feedback Triage v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Model: {}", config.llm.model);
    eprintln!("   Database: {}", config.db_path.display());
    eprintln!("   API: http://0.0.0.0:{}/api/v1/workflows", config.port);

    // ── Clients ─────────────────────────────────────────────────────────
    let llm = create_provider(&config.llm).context("Failed to create LLM provider")?;
    let feed =
        Arc::new(XFeedClient::new(config.x_bearer_token.clone()).with_base_url(&config.x_base_url));
    let classifier = Arc::new(LlmClassifier::new(llm));
    let boards = Arc::new(TrelloConnector::new(&config.trello_base_url));
    let orchestrator = Arc::new(WorkflowOrchestrator::new(feed, classifier, boards));

    // ── Database ────────────────────────────────────────────────────────
    let store: Arc<dyn JobStore> = Arc::new(
        LibSqlBackend::new_local(&config.db_path)
            .await
            .with_context(|| format!("Failed to open database at {}", config.db_path.display()))?,
    );

    // ── HTTP server ─────────────────────────────────────────────────────
    let app = api_routes(ApiState {
        jobs: JobManager::new(store, orchestrator),
    });

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port))
        .await
        .with_context(|| format!("Failed to bind port {}", config.port))?;
    tracing::info!(port = config.port, "Workflow API server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("Shutting down");
        })
        .await
        .context("HTTP server error")?;

    Ok(())
}
