use std::sync::Arc;

use anyhow::Context;
use axum::http::{header::CONTENT_TYPE, HeaderValue, Method};
use interviewlab::{
    app, auth, config::Config, db, execute::PistonClient, reconcile, stream::StreamClient, sync,
    AppState, SessionService,
};
use tokio::{net::TcpListener, signal};
use tower_http::cors::CorsLayer;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let config = Config::from_env()?;

    let db_pool = db::connect(&config.database_url, config.db_max_connections)
        .await
        .context("connecting to the database")?;
    info!("database ready");

    let stream = Arc::new(StreamClient::new(&config.stream, config.adapter_timeout)?);
    let sessions = SessionService::new(db_pool.clone(), stream.clone(), config.adapter_timeout);

    let (sync_queue, sync_rx) = sync::SyncQueue::new(&config.webhook_secret);
    let consumer = sync::spawn_consumer(db_pool.clone(), stream.clone(), sync_rx, sync::RetryPolicy::default());

    let reconciler = (!config.reconcile_interval.is_zero()).then(|| {
        reconcile::spawn(sessions.clone(), config.reconcile_interval, config.reconcile_grace)
    });

    let app_state = AppState {
        db_pool: db_pool.clone(),
        clients: auth::Clients::from_config(&config.idp)?,
        sessions,
        chat: stream,
        sync: sync_queue,
        piston: PistonClient::new(&config.piston_url, config.adapter_timeout)?,
    };

    let cors = CorsLayer::new()
        .allow_origin(config.idp.client_url.parse::<HeaderValue>().context("CLIENT_URL")?)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE]);

    let app = app(app_state, config.cookie_secure).layer(cors);

    let address = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("binding {address}"))?;
    info!("server running on {address}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // The router (and with it every queue sender) is gone, so the consumer
    // finishes whatever is still queued and exits.
    if let Some(reconciler) = reconciler {
        reconciler.abort();
    }
    consumer.await?;
    db_pool.close().await;

    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("received Ctrl+C, shutting down"),
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
                info!("received terminate signal, shutting down");
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
