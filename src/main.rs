use std::sync::Arc;

use anyhow::Context;
use signal_gate::config::AgentConfig;
use signal_gate::decision::{DecisionClient, LocalDefault, RemoteAuthority};
use signal_gate::filters::pipeline::FilterPipeline;
use signal_gate::intake::{build_router, serve, AppState, SignalProcessor};
use signal_gate::ledger::TradeLedger;
use signal_gate::store::{ConfigRefresher, ConfigStore};
use signal_gate::telemetry::logging::init_tracing;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Reads .env before anything else looks at the environment
    let (config, config_warnings) = AgentConfig::load_or_default();

    let _log_guard = init_tracing(&config.paths.log_dir, config.telemetry.log_format)?;
    for warning in &config_warnings {
        warn!("{warning}");
    }
    config.validate().context("Invalid agent configuration")?;

    info!("================================================");
    info!("  signal-gate v{}", env!("CARGO_PKG_VERSION"));
    info!("  Webhook signal intake and trade gate");
    info!("================================================");

    // Config documents
    ConfigStore::ensure_defaults(&config.paths.config_dir)
        .await
        .with_context(|| {
            format!(
                "Failed to create default config documents in {}",
                config.paths.config_dir.display()
            )
        })?;
    let store = Arc::new(ConfigStore::open(config.paths.config_dir.clone()).await);
    let snapshot = store.current().await;
    info!(
        "Config v{} loaded from {}: {} allowed symbols, order quantity {}",
        snapshot.version,
        store.dir().display(),
        snapshot.trading.allowed_symbols.len(),
        snapshot.trading.order_quantity
    );
    if snapshot.connections.decision_credential().is_none() {
        warn!("No decision API key configured; every passing signal will be held");
    }

    // Ledger
    let ledger = Arc::new(
        TradeLedger::open(&config.paths.ledger_path).with_context(|| {
            format!(
                "Failed to open trade ledger at {}",
                config.paths.ledger_path.display()
            )
        })?,
    );
    match TradeLedger::read_entries(ledger.path()) {
        Ok(entries) => info!("Trade ledger holds {} existing entries", entries.len()),
        Err(e) => warn!("Could not read existing ledger entries: {e}"),
    }

    // Decision authority
    let decision: Arc<dyn DecisionClient> = match &config.decision.endpoint {
        Some(endpoint) => {
            info!(
                "Remote decision authority at {endpoint} (timeout {}s)",
                config.decision.timeout_secs
            );
            Arc::new(RemoteAuthority::new(endpoint.clone(), config.decision_timeout())?)
        }
        None => {
            warn!("DECISION_ENDPOINT not set; using local default (HOLD)");
            Arc::new(LocalDefault)
        }
    };

    let pipeline = FilterPipeline::standard();
    for (name, kind) in pipeline.layout() {
        info!("Gate {name}: {kind:?}");
    }

    let processor = Arc::new(SignalProcessor::new(
        pipeline,
        decision,
        ledger,
        store.clone(),
    ));

    // Shutdown channel
    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    // Remote config refresh
    if let Some(base) = &config.refresh.remote_base {
        let refresher = Arc::new(ConfigRefresher::new(
            base.clone(),
            config.refresh_interval(),
            store.clone(),
        )?);
        info!(
            "Refreshing config from {base} every {}s",
            config.refresh.interval_secs
        );
        refresher.start(shutdown_tx.subscribe());
    }

    // Periodic summary
    {
        let processor = processor.clone();
        let mut shutdown_rx = shutdown_tx.subscribe();
        let period = std::time::Duration::from_secs(config.telemetry.summary_interval_secs.max(1));
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        processor.stats().log_summary();
                        processor.latency().log_summary();
                    }
                    _ = shutdown_rx.recv() => break,
                }
            }
        });
    }

    let addr = config.listen_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    let state = Arc::new(AppState::new(processor.clone(), config.server.max_in_flight));
    let router = build_router(state);

    let shutdown = {
        let shutdown_tx = shutdown_tx.clone();
        async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {e}");
                std::future::pending::<()>().await;
            }
            info!("Shutdown signal received. Draining in-flight signals...");
            let _ = shutdown_tx.send(());
        }
    };

    serve(listener, router, shutdown).await?;

    processor.stats().log_summary();
    processor.latency().log_summary();
    info!("signal-gate shutdown complete.");
    Ok(())
}
