use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use tokio::{net::TcpListener, signal};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use aquasense_service::{
    api::{self, AppState},
    config::{Config, SourceKind},
    context::DashboardContext,
    firebase::FirebaseClient,
    reading_cache::ReadingCache,
    session::SubscriptionController,
    source::{FirebaseStreamSource, HttpPollSource, ReadingSource, SimulatedSource},
    weather::WeatherClient,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env (ignore error if file absent, env vars may be set externally)
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let config = Config::from_env()?;

    // Per-request timeouts are applied by each client; this only bounds connects.
    let http = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(5))
        .build()
        .context("Failed to build HTTP client")?;

    let firebase = FirebaseClient::new(&config, http.clone());
    let source = build_source(&config, &firebase, http.clone());
    let weather = WeatherClient::from_config(&config, http);
    if weather.is_none() {
        info!("WEATHER_API_KEY not set; weather lookup disabled");
    }

    let controller = SubscriptionController::new(source, ReadingCache::new());
    info!(source = controller.source_name(), "Reading source ready");

    let state = AppState {
        controller: controller.clone(),
        auth: Arc::new(firebase),
        weather,
        context: DashboardContext::new(),
    };

    let addr = format!("{}:{}", config.server_host, config.server_port);
    let listener = TcpListener::bind(&addr).await?;
    info!(addr = %addr, "HTTP server listening");

    axum::serve(listener, api::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Detach whatever feed is still running before the runtime goes away.
    controller.on_identity_change(None).await;
    info!("Shutdown complete");

    Ok(())
}

fn build_source(config: &Config, firebase: &FirebaseClient, http: reqwest::Client) -> Arc<dyn ReadingSource> {
    match config.source {
        SourceKind::Http => Arc::new(HttpPollSource::new(
            http,
            config.sensor_urls.clone(),
            config.poll_interval,
            config.request_timeout,
        )),
        SourceKind::Firebase => Arc::new(FirebaseStreamSource::new(
            firebase.clone(),
            config.reconnect_delay,
        )),
        SourceKind::Simulated => Arc::new(SimulatedSource::new(
            Arc::new(firebase.clone()),
            config.poll_interval,
            config.sim_seed,
        )),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
