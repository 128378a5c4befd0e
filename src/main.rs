mod config;

use clap::Parser as _;
use config::Config;
use switchyard::routing::{ConfigFile, RoutingTable};
use switchyard::{
    AppState, build_metrics_layer_and_handle, build_metrics_router, build_router, client,
};
use tokio::net::TcpListener;
use tracing::{error, info, instrument};

#[tokio::main]
#[instrument]
pub async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Config::parse().validate()?;
    info!("Starting proxy with config: {:?}", cli);

    let config_file = ConfigFile::load(&cli.config).await?;
    let listen_addr = config_file.listen_addr.clone();

    // An empty server list fails here, at startup, rather than per-request.
    let table = RoutingTable::from_config(config_file)
        .map_err(|e| anyhow::anyhow!("Failed to build routing table: {}", e))?;

    let http_client =
        client::create_hyper_client(cli.pool_idle_timeout_secs, cli.pool_max_idle_per_host);
    let app_state = AppState::with_client(table, http_client);
    let mut router = build_router(app_state);

    if cli.metrics {
        let (prometheus_layer, handle) = build_metrics_layer_and_handle(cli.metrics_prefix);
        router = router.layer(prometheus_layer);

        let metrics_addr = format!("0.0.0.0:{}", cli.metrics_port);
        let metrics_listener = TcpListener::bind(&metrics_addr).await?;
        info!("Metrics server listening on {}", metrics_addr);
        tokio::spawn(async move {
            if let Err(e) = axum::serve(metrics_listener, build_metrics_router(handle)).await {
                error!("Metrics server error: {}", e);
            }
        });
    }

    let listener = TcpListener::bind(&listen_addr).await?;
    info!("Proxy listening on {}", listen_addr);

    axum::serve(listener, router).await?;

    Ok(())
}
