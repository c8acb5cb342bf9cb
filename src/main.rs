use anyhow::anyhow;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use leonaar::app::auth::TokenVerifier;
use leonaar::config::{AppConfig, CatalogBackend};
use leonaar::http;
use leonaar::infra::catalog::Catalog;
use leonaar::infra::db::Db;
use leonaar::infra::memory::MemoryCatalog;
use leonaar::jobs::reconciler::Reconciler;
use leonaar::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;

    let catalog: Arc<dyn Catalog> = match config.catalog {
        CatalogBackend::Postgres => {
            let db = Db::connect(&config).await?;
            if config.run_migrations {
                db.run_migrations(&config.migrations_dir).await?;
            }
            Arc::new(db)
        }
        CatalogBackend::Memory => {
            tracing::warn!("using in-memory catalog, records are lost on exit");
            Arc::new(MemoryCatalog::new())
        }
    };

    let tokens = TokenVerifier::new(config.paseto_access_key, config.token_issuer.clone());
    let state = AppState::new(catalog, &config.photos, tokens);
    state.photos.storage().ensure_root().await?;

    match config.app_mode.as_str() {
        "api" => {
            let app = http::with_service_layers(
                http::router(state),
                &config.cors_allowed_origins,
            );
            let listener = tokio::net::TcpListener::bind(&config.http_addr).await?;
            tracing::info!(
                storage_root = %config.photos.storage_root.display(),
                "listening on {}",
                config.http_addr
            );

            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal())
                .await?;
        }
        "worker" => {
            tracing::info!("starting worker mode");
            let reconciler = Reconciler::new(
                state.catalog.clone(),
                state.photos.clone(),
                Duration::from_secs(config.reconcile_grace_seconds),
                config.reconcile_batch_size,
            );
            tokio::select! {
                result = reconciler.run(Duration::from_secs(config.reconcile_interval_seconds)) => {
                    result?;
                }
                _ = shutdown_signal() => {}
            }
        }
        other => return Err(anyhow!("unknown APP_MODE: {}", other)),
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to install SIGTERM handler");
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received");
}
