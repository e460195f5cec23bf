//! HTTP server for redressd

use crate::middleware::{body_size_limit, rate_limit_middleware, RateLimiter};
use crate::routes;
use anyhow::{Context, Result};
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderValue, Method};
use axum::{middleware, Router};
use chrono::Duration as ChronoDuration;
use redress_common::config::Config;
use redress_common::credentials::PasswordHasher;
use redress_common::token::TokenSigner;
use redress_common::Store;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Application state shared across handlers
pub struct AppState {
    pub store: Store,
    pub signer: TokenSigner,
    pub hasher: PasswordHasher,
    pub config: Config,
    pub start_time: Instant,
}

pub type AppStateArc = Arc<AppState>;

impl AppState {
    pub fn new(store: Store, config: Config) -> Self {
        if config.auth.uses_insecure_secret() {
            warn!("Token secret is the built-in default; set REDRESS_TOKEN_SECRET");
        }
        Self {
            signer: TokenSigner::new(
                &config.auth.token_secret,
                ChronoDuration::days(config.auth.token_ttl_days),
            ),
            hasher: PasswordHasher::new(config.auth.hash_iterations),
            store,
            config,
            start_time: Instant::now(),
        }
    }
}

fn cors_layer(client_url: &str) -> Result<CorsLayer> {
    let origin: HeaderValue = client_url
        .parse()
        .with_context(|| format!("invalid client_url {:?}", client_url))?;
    Ok(CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_credentials(true))
}

/// Build the full application router
pub fn build_router(state: AppStateArc, limiter: RateLimiter) -> Result<Router> {
    let max_body = state.config.server.max_body_bytes;
    let cors = cors_layer(&state.config.server.client_url)?;

    // rate limiting covers /api only
    let api = Router::new()
        .merge(routes::health_routes())
        .merge(routes::auth::auth_routes())
        .merge(routes::complaints::complaint_routes())
        .merge(routes::admin::admin_routes())
        .layer(middleware::from_fn_with_state(limiter, rate_limit_middleware));

    Ok(Router::new()
        .merge(routes::root_routes())
        .merge(api)
        .fallback(routes::not_found)
        .with_state(state)
        // chunked bodies are cut off by the inner limit
        .layer(RequestBodyLimitLayer::new(max_body))
        .layer(middleware::from_fn_with_state(max_body, body_size_limit))
        .layer(cors)
        .layer(TraceLayer::new_for_http()))
}

/// Run the HTTP server until ctrl-c or SIGTERM
pub async fn run(config: Config) -> Result<()> {
    let store = Store::open(config.database.location())
        .await
        .context("opening database")?;
    let limiter = RateLimiter::from_config(&config.rate_limit);
    let bind = config.server.bind.clone();
    let state = Arc::new(AppState::new(store, config));

    let app = build_router(state, limiter.clone())?;

    let sweeper = tokio::spawn(async move {
        let mut tick = tokio::time::interval(limiter.window().max(Duration::from_secs(1)));
        loop {
            tick.tick().await;
            limiter.cleanup().await;
        }
    });

    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("binding {}", bind))?;
    info!("  Listening on http://{}", bind);

    let service = app.into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, service)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sweeper.abort();
    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
