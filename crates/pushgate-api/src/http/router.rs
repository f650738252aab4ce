//! Router construction and server host for the gateway API.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::{
    Router,
    http::Request,
    middleware,
    routing::{get, post},
};
use pushgate_telemetry::Metrics;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::Span;

use crate::config::ApiConfig;
use crate::dispatch::SharedDispatcher;
use crate::http::admin;
use crate::http::admission::{ip_allowlist, require_https, security_headers};
use crate::http::auth::{admit, require_admin};
use crate::http::health::{health, metrics};
use crate::http::notify::submit_notification;
use crate::http::rate_limit::rate_limit;
use crate::state::ApiState;
use crate::store::SharedStore;

/// Axum router wrapper that hosts the gateway services.
pub struct ApiServer {
    router: Router,
}

impl ApiServer {
    /// Construct the server with shared dependencies wired through state.
    #[must_use]
    pub fn new(
        store: SharedStore,
        dispatcher: SharedDispatcher,
        config: ApiConfig,
        metrics: Metrics,
    ) -> Self {
        let admin_base_path = config.admin_base_path.clone();
        let state = Arc::new(ApiState::new(
            store,
            dispatcher,
            config.admission,
            metrics,
        ));
        let router = Self::build_router(&state, &admin_base_path);
        Self { router }
    }

    fn build_router(state: &Arc<ApiState>, admin_base_path: &str) -> Router {
        let trace_layer = TraceLayer::new_for_http()
            .make_span_with(|request: &Request<_>| {
                tracing::info_span!(
                    "http.request",
                    method = %request.method(),
                    route = %request.uri().path(),
                    status_code = tracing::field::Empty,
                    latency_ms = tracing::field::Empty
                )
            })
            .on_response(
                |response: &axum::response::Response, latency: Duration, span: &Span| {
                    span.record("status_code", response.status().as_u16());
                    let latency_ms = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
                    span.record("latency_ms", latency_ms);
                },
            );

        let perimeter = ServiceBuilder::new()
            .layer(trace_layer)
            .layer(middleware::from_fn(security_headers))
            .layer(middleware::from_fn_with_state(state.clone(), require_https))
            .layer(middleware::from_fn_with_state(state.clone(), ip_allowlist))
            .layer(middleware::from_fn_with_state(state.clone(), rate_limit));

        let admin_routes = admin::router()
            .layer(middleware::from_fn_with_state(state.clone(), require_admin));

        Router::new()
            .route(
                "/v1/notify",
                post(submit_notification)
                    .route_layer(middleware::from_fn_with_state(state.clone(), admit)),
            )
            .nest(admin_base_path, admin_routes)
            .route("/health", get(health))
            .route("/metrics", get(metrics))
            .layer(perimeter)
            .with_state(state.clone())
    }

    /// Serve the API on the supplied address until `shutdown` resolves.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener fails to bind or the server
    /// terminates unexpectedly.
    pub async fn serve<F>(self, addr: SocketAddr, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        tracing::info!("Starting API on {}", addr);
        let listener = TcpListener::bind(addr).await?;
        axum::serve(
            listener,
            self.router
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown)
        .await?;
        Ok(())
    }

    #[cfg(test)]
    pub(crate) const fn router(&self) -> &Router {
        &self.router
    }
}
