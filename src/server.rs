use axum::routing::{get, post};
use axum::{middleware, Router};
use std::net::SocketAddr;
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::error::ThrottlerResult;
use crate::handlers::{
    check_rate_limit, get_stats, health_check, readiness_check, AppState, SharedState,
};
use crate::health;
use crate::middleware::{enforce_quota, logging_middleware};
use crate::resolver::PolicyResolver;
use crate::throttler::Throttler;

/// Build the router. Every route goes through the quota check, keyed by
/// its route pattern.
pub fn create_app(state: SharedState) -> Router {
    Router::new()
        .route("/check", post(check_rate_limit))
        .route("/stats", get(get_stats))
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route_layer(middleware::from_fn_with_state(state.clone(), enforce_quota))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive())
                .layer(middleware::from_fn(logging_middleware)),
        )
}

pub struct Server {
    app: Router,
    bind_addr: SocketAddr,
}

impl Server {
    pub fn new(config: &Config) -> ThrottlerResult<Self> {
        let resolver = PolicyResolver::new(config.load_policies()?)?;
        tracing::info!(rules = resolver.rule_count(), "Loaded quota rules");

        let throttler = Throttler::new(config.throttle_options(), resolver)?;

        Ok(Self {
            app: create_app(AppState::new(throttler)),
            bind_addr: config.bind_addr,
        })
    }

    pub async fn run(self) -> ThrottlerResult<()> {
        let listener = tokio::net::TcpListener::bind(self.bind_addr).await?;
        health::mark_started();

        tracing::info!("Throttler server listening on {}", self.bind_addr);
        tracing::info!("Health check available at /health");

        // Peer addresses back the caller key when no proxy header is present.
        axum::serve(
            listener,
            self.app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await?;

        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        },
    }
}
