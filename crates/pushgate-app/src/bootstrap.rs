//! Boot sequence: config, durable stores, admin bootstrap, provider mux,
//! HTTP listener, and graceful shutdown.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use pushgate_api::{ApiConfig, ApiServer, PgStore, SharedDispatcher, SharedStore};
use pushgate_data::{AdminBootstrap, AdminSettings, CredentialStore, NonceStore};
use pushgate_push::{MuxConfig, ProviderMux};
use pushgate_telemetry::{LoggingConfig, Metrics, init_logging};
use tracing::{info, warn};

use crate::config::GatewayConfig;
use crate::error::{AppError, AppResult};

const INFLIGHT_SAMPLE_PERIOD: Duration = Duration::from_secs(30);

/// Entry point for the gateway boot sequence.
///
/// # Errors
///
/// Returns an error if configuration, store connection, bootstrap writes,
/// or the HTTP listener fail.
pub async fn run_app() -> AppResult<()> {
    let config = GatewayConfig::from_env()?;
    init_logging(&LoggingConfig::default())
        .map_err(|err| AppError::telemetry("telemetry.init", err))?;
    info!("Pushgate bootstrap starting");

    let store = CredentialStore::connect(&config.database_url)
        .await
        .map_err(|err| AppError::data("credential_store.connect", err))?;

    let settings = store
        .ensure_admin_settings(
            config.admin_base_path.as_deref(),
            config.admin_session_secret.as_deref(),
        )
        .await
        .map_err(|err| AppError::data("credential_store.ensure_admin_settings", err))?;
    announce_admin_settings(&settings);

    let bootstrap = store
        .ensure_admin_user(
            &config.admin_bootstrap_user,
            config.admin_bootstrap_password.as_deref(),
        )
        .await
        .map_err(|err| AppError::data("credential_store.ensure_admin_user", err))?;
    announce_admin_user(&bootstrap);

    let nonces = NonceStore::new(store.pool().clone());
    let metrics =
        Metrics::new().map_err(|err| AppError::telemetry("telemetry.metrics", err))?;
    let mux = Arc::new(ProviderMux::new(MuxConfig {
        apns_max_streams: config.apns_max_listeners,
    }));
    let sampler = spawn_inflight_sampler(Arc::clone(&mux), metrics.clone());

    let facade: SharedStore = Arc::new(PgStore::new(store.clone(), nonces));
    let dispatcher: SharedDispatcher = Arc::clone(&mux) as SharedDispatcher;
    let server = ApiServer::new(
        facade,
        dispatcher,
        ApiConfig {
            admission: config.admission.clone(),
            admin_base_path: settings.base_path.clone(),
        },
        metrics,
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    print_banner(addr, &settings.base_path);

    let serve_result = server.serve(addr, shutdown_signal()).await;

    sampler.abort();
    if let Err(err) = sampler.await
        && !err.is_cancelled()
    {
        warn!(error = %err, "inflight sampler join failed");
    }

    info!("HTTP listener stopped; draining providers");
    mux.shutdown().await;
    store.pool().close().await;

    serve_result.map_err(|err| AppError::api_server("api_server.serve", err))?;
    info!("Pushgate shutdown complete");
    Ok(())
}

fn announce_admin_settings(settings: &AdminSettings) {
    if settings.generated_path {
        println!("Generated admin base path: {}", settings.base_path);
    }
    if settings.generated_secret {
        println!("Generated admin session secret: {}", settings.session_secret);
    }
    if settings.weak_path {
        warn!(
            base_path = %settings.base_path,
            "admin base path is guessable; consider a longer random path"
        );
    }
}

fn announce_admin_user(bootstrap: &AdminBootstrap) {
    if !bootstrap.created {
        return;
    }
    if let Some(password) = &bootstrap.generated_password {
        println!(
            "Generated admin password for '{}': {password}",
            bootstrap.username
        );
    }
    info!(username = %bootstrap.username, "admin bootstrap user ready");
}

fn print_banner(addr: SocketAddr, admin_base_path: &str) {
    println!("Pushgate listening on http://{addr}");
    println!("Admin surface mounted at {admin_base_path}");
    println!("Data plane: POST /v1/notify  Health: GET /health");
}

fn spawn_inflight_sampler(
    mux: Arc<ProviderMux>,
    metrics: Metrics,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(INFLIGHT_SAMPLE_PERIOD);
        loop {
            ticker.tick().await;
            for (app_id, streams) in mux.apns_inflight() {
                metrics.set_apns_inflight(&app_id, streams);
            }
        }
    })
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to install SIGINT handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    info!("shutdown signal received; draining in-flight requests");
}
