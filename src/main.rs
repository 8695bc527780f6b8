mod core;
mod features;
mod shared;

use crate::core::config::{AppConfig, Config};
use crate::core::openapi::ApiDoc;
use crate::core::{database, middleware};
use crate::features::deploys::{
    routes as deploys_routes, DeployControllerConfig, DeployControllerRegistry,
    PgDeployStateStore, RemoteDeployTrigger,
};
use crate::features::rate_limits::{
    routes as rate_limits_routes, PgRateLimitStore, RateLimitService, RateLimitSweeper,
};
use axum::Router;
use std::sync::Arc;
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::{DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::Level;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

fn main() -> anyhow::Result<()> {
    // Build Tokio runtime with configurable worker threads
    let worker_threads = std::env::var("TOKIO_WORKER_THREADS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|p| p.get())
                .unwrap_or(4)
        });

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(worker_threads)
        .enable_all()
        .build()?;

    runtime.block_on(async_main(worker_threads))
}

async fn async_main(worker_threads: usize) -> anyhow::Result<()> {
    // Load .env file BEFORE initializing logger so RUST_LOG is available
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().map_err(|e| anyhow::anyhow!(e))?;
    tracing::info!(
        "Configuration loaded (tokio_worker_threads={}, pid={})",
        worker_threads,
        std::process::id()
    );

    let pool = database::create_pool(&config.database).await?;
    tracing::info!("Database connection pool created");

    tracing::info!("Running database migrations...");
    database::run_migrations(&pool)
        .await
        .map_err(|e| anyhow::anyhow!("Migration failed: {}", e))?;
    tracing::info!("Database migrations completed successfully");

    // Rate limiting
    let rate_limit_service = Arc::new(RateLimitService::new(Arc::new(PgRateLimitStore::new(
        pool.clone(),
    ))));
    let sweeper = RateLimitSweeper::new(
        Arc::clone(&rate_limit_service),
        config.rate_limit.sweep_interval,
    );
    tokio::spawn(async move {
        sweeper.run().await;
    });
    tracing::info!("Rate limit service initialized, sweeper spawned");

    // Deploy controllers
    let deploy_config = DeployControllerConfig::from_config(&config.deploy);
    let missing = deploy_config.environment.missing();
    if !missing.is_empty() {
        // Not fatal: each run reports the same list until it is fixed
        tracing::warn!("Deploy runs will fail until set: {}", missing.join(", "));
    }
    if deploy_config.targets.is_empty() {
        tracing::warn!("DEPLOY_TARGETS is empty; every deploy route will answer 404");
    }
    if !config.remote_deploy.enabled {
        tracing::info!("Remote deploy triggering disabled; runs finish as local_only");
    }
    let deploy_registry = Arc::new(DeployControllerRegistry::new(
        deploy_config,
        Arc::new(PgDeployStateStore::new(pool.clone())),
        Arc::new(RemoteDeployTrigger::new(config.remote_deploy.clone())),
    ));
    tracing::info!("Deploy controller registry initialized");

    let app = build_router(&config.app, deploy_registry, rate_limit_service);

    let addr = config.app.server_address();
    let listener = bind_listener(&addr)?;
    tracing::info!("Server listening on http://{}", addr);
    tracing::info!("Swagger UI available at http://{}/swagger-ui/", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

fn build_router(
    app_config: &AppConfig,
    deploy_registry: Arc<DeployControllerRegistry>,
    rate_limit_service: Arc<RateLimitService>,
) -> Router {
    let swagger = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    async fn health_check() -> axum::http::StatusCode {
        axum::http::StatusCode::OK
    }
    let health_route = Router::new().route("/health", axum::routing::get(health_check));

    Router::new()
        .merge(swagger)
        .merge(deploys_routes::routes(
            deploy_registry,
            Arc::clone(&rate_limit_service),
        ))
        .merge(rate_limits_routes::routes(rate_limit_service))
        .merge(health_route)
        .layer(middleware::cors_layer(app_config.cors_allowed_origins.clone()))
        // Propagate X-Request-Id to response headers
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(middleware::MakeSpanWithRequestId)
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        // Generate X-Request-Id using UUID v7 (or use client-provided one)
        .layer(SetRequestIdLayer::x_request_id(middleware::MakeRequestUuid))
}

/// TCP listener tuned for many short-lived API connections
fn bind_listener(addr: &str) -> anyhow::Result<tokio::net::TcpListener> {
    let socket_addr: std::net::SocketAddr = addr
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid address: {}", e))?;

    let socket = socket2::Socket::new(
        socket2::Domain::for_address(socket_addr),
        socket2::Type::STREAM,
        Some(socket2::Protocol::TCP),
    )?;

    socket.set_reuse_address(true)?;
    socket.set_nodelay(true)?;

    let keepalive = socket2::TcpKeepalive::new().with_time(std::time::Duration::from_secs(60));
    socket.set_tcp_keepalive(&keepalive)?;

    socket.set_nonblocking(true)?;
    socket.bind(&socket_addr.into())?;
    socket.listen(1024)?;

    Ok(tokio::net::TcpListener::from_std(socket.into())?)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
