use axum::{routing::get, Router};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor, GovernorLayer,
};
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rust_pipeline_api::config::Config;
use rust_pipeline_api::connectivity::ConnectivityMonitor;
use rust_pipeline_api::execution::ActionExecutionService;
use rust_pipeline_api::gateway_client::CrmGatewayClient;
use rust_pipeline_api::handlers::{self, AppState};
use rust_pipeline_api::offline_queue::{GatewayReplayer, OfflineQueueService};
use rust_pipeline_api::pipeline::PipelineBoard;
use rust_pipeline_api::storage::{BlobStore, JsonFileStore};

/// Interval between CRM health probes driving the connectivity flag.
const CONNECTIVITY_PROBE_INTERVAL: Duration = Duration::from_secs(15);

/// Delay before the startup queue drain.
const STARTUP_DRAIN_DELAY: Duration = Duration::from_secs(2);

/// Main entry point for the application.
///
/// Initializes logging, configuration, the blob store, the CRM gateway
/// client and the domain services; spawns the connectivity watcher and the
/// startup queue drain; then serves the HTTP API.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rust_pipeline_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    let gateway = CrmGatewayClient::new(config.crm_base_url.clone(), config.crm_token.clone())?;
    tracing::info!("✓ CRM gateway client initialized: {}", config.crm_base_url);

    let store: Arc<dyn BlobStore> =
        Arc::new(JsonFileStore::new(config.offline_store_path.clone()));

    let initially_online = gateway.health().await;
    let connectivity = Arc::new(ConnectivityMonitor::new(initially_online));
    tracing::info!(
        "CRM reachable at startup: {}",
        if initially_online { "yes" } else { "no" }
    );

    let queue = Arc::new(OfflineQueueService::new(
        store.clone(),
        GatewayReplayer::new(gateway.clone()),
        connectivity.clone(),
        config.queue_max_retries,
        Duration::from_secs(config.queue_retry_delay_secs),
    ));

    let execution = ActionExecutionService::new(
        store.clone(),
        gateway.clone(),
        connectivity.clone(),
        queue.clone(),
        config.whatsapp_country_code.clone(),
    );

    let board = PipelineBoard::new(gateway.clone());
    match board.seed().await {
        Ok(count) => tracing::info!("✓ Board seeded with {} opportunities", count),
        Err(e) => tracing::warn!("Board seed failed, starting empty: {}", e),
    }

    let app_state = Arc::new(AppState {
        board,
        execution,
        queue: queue.clone(),
        connectivity: connectivity.clone(),
    });

    // Connectivity watcher: probes the CRM and drains the queue on every
    // offline-to-online transition.
    {
        let gateway = gateway.clone();
        let connectivity = connectivity.clone();
        let queue = queue.clone();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(CONNECTIVITY_PROBE_INTERVAL).await;
                let came_online = connectivity.set_online(gateway.health().await);
                if came_online {
                    if let Err(e) = queue.process().await {
                        tracing::error!("Queue drain after reconnect failed: {}", e);
                    }
                }
            }
        });
    }

    // Startup drain: replay anything left over from the previous run.
    {
        let connectivity = connectivity.clone();
        let queue = queue.clone();
        tokio::spawn(async move {
            tokio::time::sleep(STARTUP_DRAIN_DELAY).await;
            if connectivity.is_online() {
                match queue.process().await {
                    Ok(report) if report.replayed + report.dropped > 0 => {
                        tracing::info!(
                            "Startup drain: {} replayed, {} dropped, {} remaining",
                            report.replayed,
                            report.dropped,
                            report.remaining
                        );
                    }
                    Ok(_) => {}
                    Err(e) => tracing::error!("Startup queue drain failed: {}", e),
                }
            }
        });
    }

    // Configure rate limiter: 10 requests/second per IP, burst of 20
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(10)
            .burst_size(20)
            .key_extractor(SmartIpKeyExtractor)
            .finish()
            .unwrap(),
    );

    let protected_routes = handlers::api_router(app_state.clone()).layer(
        ServiceBuilder::new()
            // Request size limit: 5MB max payload
            .layer(RequestBodyLimitLayer::new(5 * 1024 * 1024))
            .layer(GovernorLayer {
                config: governor_conf,
            }),
    );

    // Health check bypasses rate limiting
    let app = Router::new()
        .route("/health", get(handlers::health))
        .with_state(app_state)
        .merge(protected_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
