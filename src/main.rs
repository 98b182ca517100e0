use std::sync::Arc;

use anyhow::Context;

use wa_relay::config::RelayConfig;
use wa_relay::conversation::{ConversationStore, SnapshotFile, SnapshotWorker};
use wa_relay::gateway::GreenApiClient;
use wa_relay::llm::create_provider;
use wa_relay::pipeline::Relay;
use wa_relay::server::relay_routes;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = RelayConfig::from_env().unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        eprintln!("  export GREEN_API_ID=... GREEN_API_TOKEN=... ANTHROPIC_API_KEY=sk-ant-...");
        std::process::exit(1);
    });

    let admission = &config.policy.admission;
    eprintln!("📱 WhatsApp Relay v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Model: {}", config.llm.model);
    eprintln!("   Webhook: http://0.0.0.0:{}/webhook", config.port);
    if admission.reply_all {
        eprintln!("   Mode: reply to all ({} blacklisted)", admission.blacklist.len());
    } else {
        eprintln!("   Mode: whitelist ({} numbers)", admission.whitelist.len());
    }
    match &config.policy.operator {
        Some(operator) => eprintln!("   Operator: {} ({})", config.policy.operator_name, operator),
        None => eprintln!("   Operator: none (commands disabled)"),
    }
    eprintln!("   Pause: {} min", config.policy.pause_duration.num_minutes());
    eprintln!("   Memory: {}\n", config.memory_file.display());

    // ── Conversation memory ─────────────────────────────────────────────
    let snapshot_file = SnapshotFile::new(&config.memory_file);
    let snapshot = snapshot_file.load().await.unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Could not load conversation snapshot, starting empty");
        Default::default()
    });
    let store = ConversationStore::from_snapshot(snapshot);
    let worker = SnapshotWorker::spawn(store.clone(), snapshot_file, config.snapshot_interval);

    // ── Relay ───────────────────────────────────────────────────────────
    let relay = Arc::new(Relay::new(
        config.policy.clone(),
        store,
        Arc::new(GreenApiClient::new(config.gateway.clone())),
        create_provider(&config.llm),
        worker.trigger(),
    ));

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port))
        .await
        .with_context(|| format!("failed to bind port {}", config.port))?;
    tracing::info!(port = config.port, "Webhook server started");

    axum::serve(listener, relay_routes(relay))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("Shutting down, flushing conversations");
    worker.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to listen for SIGTERM");
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
